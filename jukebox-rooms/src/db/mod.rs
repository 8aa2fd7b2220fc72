use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{id} doesn't exist")]
    NotFound {
        resource: &'static str,
        id: String,
    },
}

/// Represents a type that can durably store rooms, tracks, votes, and
/// memberships. The implementation must provide atomic read-modify-write per
/// entity: in particular, creating a vote or membership that already exists
/// must fail with [DatabaseError::Conflict] rather than duplicating it.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()>;

    async fn create_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    async fn delete_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;

    async fn tracks_by_room(&self, room_id: PrimaryKey) -> Result<Vec<TrackData>>;
    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData>;
    async fn delete_track(&self, track_id: PrimaryKey) -> Result<()>;

    async fn votes_by_room(&self, room_id: PrimaryKey) -> Result<Vec<VoteData>>;
    async fn create_vote(&self, track_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    async fn delete_vote(&self, track_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
}

impl DatabaseError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Whether this error is a uniqueness conflict, which some callers treat
    /// as a benign no-op.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
