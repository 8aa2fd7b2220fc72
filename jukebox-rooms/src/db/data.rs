use chrono::{DateTime, Utc};
use serde::Serialize;

/// The type used for primary keys in the database.
pub type PrimaryKey = u32;

/// A listening room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub title: String,
    /// The sole identity allowed to issue playback transitions.
    pub administrator_id: PrimaryKey,
    /// Everyone participating in the room, administrator included.
    pub member_ids: Vec<PrimaryKey>,
}

/// A persisted track. The vote score is deliberately absent, since it is
/// derived from the vote records and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub uploader_id: PrimaryKey,
    pub title: String,
    /// Where the audio bytes live in the blob store.
    pub key: String,
    pub duration_in_seconds: f32,
    /// The arrival time, used as the ranking tie-break. Never changes.
    pub created_at: DateTime<Utc>,
}

/// A single identity's endorsement of a track.
/// Note: `track_id` and `user_id` are unique together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoteData {
    pub track_id: PrimaryKey,
    pub user_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewRoom {
    pub title: String,
    /// The administrator of the new room.
    pub user_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewTrack {
    pub room_id: PrimaryKey,
    pub uploader_id: PrimaryKey,
    pub title: String,
    pub key: String,
    pub duration_in_seconds: f32,
    pub created_at: DateTime<Utc>,
}
