mod room;

use std::sync::Arc;

use log::warn;
use thiserror::Error;

pub use room::*;

use jukebox_core::TimelineError;

use crate::{
    BlobError, DatabaseError, JukeboxContext, NewRoom, NewTrack, PrimaryKey, Track, VoteOutcome,
};

/// Creates, restores, and operates on rooms. Anything that touches the
/// database or the blob store goes through here; purely in-memory playback
/// transitions live on [Room] itself.
pub struct RoomManager {
    context: JukeboxContext,
}

/// A track registered by the upload collaborator, after it has stored the
/// audio bytes under `key`.
#[derive(Debug)]
pub struct NewUpload {
    pub title: String,
    pub key: String,
    pub duration_in_seconds: f32,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("{resource}:{id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("user {user_id} is not allowed to {action}")]
    Forbidden {
        user_id: PrimaryKey,
        action: &'static str,
    },
    #[error("{0}")]
    InvalidState(&'static str),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{resource} already exists")]
    Conflict { resource: &'static str },
    #[error(transparent)]
    Database(DatabaseError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl RoomError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

impl From<TimelineError> for RoomError {
    fn from(value: TimelineError) -> Self {
        match value {
            TimelineError::Empty => Self::InvalidState("the room has no current track"),
            TimelineError::NotPlaying => Self::InvalidState("the room is not playing"),
            TimelineError::AlreadyPlaying => Self::InvalidState("the room is already playing"),
            TimelineError::OutOfRange { position, duration } => Self::InvalidArgument(format!(
                "position {position} is outside the track, which is {duration} seconds long"
            )),
        }
    }
}

impl From<DatabaseError> for RoomError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, id } => Self::NotFound { resource, id },
            DatabaseError::Conflict { resource, .. } => Self::Conflict { resource },
            e => Self::Database(e),
        }
    }
}

impl RoomManager {
    pub fn new(context: &JukeboxContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Restores the rooms and their queues from the database on init.
    pub async fn restore(&self) -> Result<(), DatabaseError> {
        let rooms = self.context.database.list_rooms().await?;

        for data in rooms {
            let room = Arc::new(Room::new(&self.context, data));

            let tracks = self.context.database.tracks_by_room(room.id()).await?;
            let votes = self.context.database.votes_by_room(room.id()).await?;

            room.restore_state(
                tracks,
                votes.into_iter().map(|v| (v.track_id, v.user_id)).collect(),
            );

            self.context.rooms.insert(room.id(), room);
        }

        Ok(())
    }

    /// Creates a new room. The creating identity becomes its administrator.
    pub async fn create_room(&self, new_room: NewRoom) -> Result<Arc<Room>, RoomError> {
        let data = self.context.database.create_room(new_room).await?;
        let room = Arc::new(Room::new(&self.context, data));

        self.context.rooms.insert(room.id(), room.clone());

        Ok(room)
    }

    /// Deletes a room and everything in it. Administrator only.
    pub async fn delete_room(&self, actor: PrimaryKey, room_id: PrimaryKey) -> Result<(), RoomError> {
        let room = self.room_by_id(room_id)?;
        room.ensure_administrator(actor, "delete the room")?;

        self.context.database.delete_room(room_id).await?;
        self.context.rooms.remove(&room_id);
        self.context.broadcaster.remove_room(room_id);

        Ok(())
    }

    pub fn room_by_id(&self, room_id: PrimaryKey) -> Result<Arc<Room>, RoomError> {
        self.context
            .rooms
            .get(&room_id)
            .map(|r| r.clone())
            .ok_or_else(|| RoomError::not_found("room", room_id))
    }

    /// All rooms currently in memory.
    pub fn list_all(&self) -> Vec<Arc<Room>> {
        self.context.rooms.iter().map(|r| r.clone()).collect()
    }

    /// Adds the identity to the room. Joining twice is a no-op.
    pub async fn join(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<(), RoomError> {
        let room = self.room_by_id(room_id)?;

        match self.context.database.create_member(room_id, user_id).await {
            Ok(()) => {
                room.add_member(user_id);
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the identity from the room, along with its subscriptions.
    /// Leaving a room one is not in is a no-op.
    pub async fn leave(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<(), RoomError> {
        let room = self.room_by_id(room_id)?;

        if room.administrator_id() == user_id {
            return Err(RoomError::InvalidState(
                "the administrator cannot leave their own room",
            ));
        }

        match self.context.database.delete_member(room_id, user_id).await {
            Ok(()) => {
                room.remove_member(user_id);
                Ok(())
            }
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Registers an uploaded track in the room's queue.
    ///
    /// When the room is idle, the arrival silently starts playing through
    /// the same entry point an explicit start uses. A failed auto-start
    /// never fails the upload; the room just stays idle.
    pub async fn add_track(
        &self,
        room_id: PrimaryKey,
        actor: PrimaryKey,
        upload: NewUpload,
    ) -> Result<Track, RoomError> {
        let room = self.room_by_id(room_id)?;
        room.ensure_participant(actor, "add tracks to the room")?;

        if upload.duration_in_seconds <= 0. {
            return Err(RoomError::InvalidArgument(format!(
                "track duration must be positive, got {}",
                upload.duration_in_seconds
            )));
        }

        let data = self
            .context
            .database
            .create_track(NewTrack {
                room_id,
                uploader_id: actor,
                title: upload.title,
                key: upload.key,
                duration_in_seconds: upload.duration_in_seconds,
                created_at: self.context.now(),
            })
            .await?;

        let track = room.insert_track(actor, data);

        if room.is_idle() {
            self.try_auto_start(&room, actor, &track).await;
        }

        Ok(track)
    }

    async fn try_auto_start(&self, room: &Room, actor: PrimaryKey, track: &Track) {
        match self.context.blobs.exists(&track.data.key).await {
            Ok(true) => {
                room.start_track_if_idle(actor, track.id());
            }
            Ok(false) => warn!(
                "Track {} has no stored audio yet, room {} stays idle",
                track.id(),
                room.id()
            ),
            Err(e) => warn!("Auto-start skipped for room {}: {e}", room.id()),
        }
    }

    /// Starts playback of a track in the room. Administrator only, and the
    /// track's audio must actually be present in the blob store.
    pub async fn start(
        &self,
        room_id: PrimaryKey,
        actor: PrimaryKey,
        track_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        let room = self.room_by_id(room_id)?;
        room.ensure_administrator(actor, "start playback")?;

        let track = room
            .track(track_id)
            .ok_or_else(|| RoomError::not_found("track", track_id))?;

        let playable = self.context.blobs.exists(&track.data.key).await?;

        if !playable {
            return Err(RoomError::not_found("track audio", track_id));
        }

        room.start_track(actor, track_id)
    }

    /// Deletes a track from the room and the database. Allowed for the
    /// administrator and the uploader, unless the track is playing.
    pub async fn remove_track(
        &self,
        room_id: PrimaryKey,
        actor: PrimaryKey,
        track_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        let room = self.room_by_id(room_id)?;
        room.ensure_track_removable(actor, track_id)?;

        self.context.database.delete_track(track_id).await?;
        room.evict_track(actor, track_id);

        Ok(())
    }

    /// Casts the actor's vote for a track. Voting again for the same track
    /// is acknowledged without being applied.
    pub async fn vote(
        &self,
        room_id: PrimaryKey,
        actor: PrimaryKey,
        track_id: PrimaryKey,
    ) -> Result<VoteOutcome, RoomError> {
        let room = self.room_by_id(room_id)?;
        room.ensure_participant(actor, "vote in the room")?;

        if !room.has_track(track_id) {
            return Err(RoomError::not_found("track", track_id));
        }

        match self.context.database.create_vote(track_id, actor).await {
            Ok(()) => Ok(room.apply_vote(actor, track_id)),
            Err(e) if e.is_conflict() => Ok(VoteOutcome {
                applied: false,
                new_score: room.current_score(track_id),
                order_changed: false,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Withdraws the actor's vote. Withdrawing a vote that was never cast
    /// is acknowledged without being applied.
    pub async fn unvote(
        &self,
        room_id: PrimaryKey,
        actor: PrimaryKey,
        track_id: PrimaryKey,
    ) -> Result<VoteOutcome, RoomError> {
        let room = self.room_by_id(room_id)?;
        room.ensure_participant(actor, "vote in the room")?;

        if !room.has_track(track_id) {
            return Err(RoomError::not_found("track", track_id));
        }

        match self.context.database.delete_vote(track_id, actor).await {
            Ok(()) => Ok(room.apply_unvote(actor, track_id)),
            Err(DatabaseError::NotFound { .. }) => Ok(VoteOutcome {
                applied: false,
                new_score: room.current_score(track_id),
                order_changed: false,
            }),
            Err(e) => Err(e.into()),
        }
    }
}
