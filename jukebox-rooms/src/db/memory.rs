use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use crossbeam::atomic::AtomicCell;
use parking_lot::RwLock;

use super::{Database, DatabaseError, NewRoom, NewTrack, PrimaryKey, Result, RoomData, TrackData, VoteData};

/// An in-memory [Database], used by tests and embedded deployments.
///
/// Every operation takes the state lock for its full duration, which is what
/// gives each entity its atomic read-modify-write guarantee.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    next_key: AtomicCell<PrimaryKey>,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    rooms: HashMap<PrimaryKey, StoredRoom>,
    tracks: HashMap<PrimaryKey, TrackData>,
    members: HashSet<(PrimaryKey, PrimaryKey)>,
    votes: HashSet<(PrimaryKey, PrimaryKey)>,
}

#[derive(Debug)]
struct StoredRoom {
    title: String,
    administrator_id: PrimaryKey,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Default::default()
    }

    fn next_key(&self) -> PrimaryKey {
        self.next_key.fetch_add(1) + 1
    }
}

impl State {
    fn room_data(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let room = self
            .rooms
            .get(&room_id)
            .ok_or(DatabaseError::not_found("room", room_id))?;

        let mut member_ids: Vec<_> = self
            .members
            .iter()
            .filter(|(r, _)| *r == room_id)
            .map(|(_, u)| *u)
            .collect();

        member_ids.sort_unstable();

        Ok(RoomData {
            id: room_id,
            title: room.title.clone(),
            administrator_id: room.administrator_id,
            member_ids,
        })
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        let state = self.state.read();

        let mut ids: Vec<_> = state.rooms.keys().copied().collect();
        ids.sort_unstable();

        ids.into_iter().map(|id| state.room_data(id)).collect()
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.state.read().room_data(room_id)
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let id = self.next_key();
        let mut state = self.state.write();

        state.rooms.insert(
            id,
            StoredRoom {
                title: new_room.title,
                administrator_id: new_room.user_id,
            },
        );

        // The administrator is always a member of their own room
        state.members.insert((id, new_room.user_id));

        state.room_data(id)
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.write();

        state
            .rooms
            .remove(&room_id)
            .ok_or(DatabaseError::not_found("room", room_id))?;

        let track_ids: HashSet<_> = state
            .tracks
            .iter()
            .filter(|(_, t)| t.room_id == room_id)
            .map(|(id, _)| *id)
            .collect();

        state.tracks.retain(|id, _| !track_ids.contains(id));
        state.votes.retain(|(track, _)| !track_ids.contains(track));
        state.members.retain(|(room, _)| *room != room_id);

        Ok(())
    }

    async fn create_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.write();

        if !state.rooms.contains_key(&room_id) {
            return Err(DatabaseError::not_found("room", room_id));
        }

        if !state.members.insert((room_id, user_id)) {
            return Err(DatabaseError::Conflict {
                resource: "member",
                field: "user_id",
                value: user_id.to_string(),
            });
        }

        Ok(())
    }

    async fn delete_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.write();

        if !state.members.remove(&(room_id, user_id)) {
            return Err(DatabaseError::not_found("member", user_id));
        }

        Ok(())
    }

    async fn tracks_by_room(&self, room_id: PrimaryKey) -> Result<Vec<TrackData>> {
        let state = self.state.read();

        let mut tracks: Vec<_> = state
            .tracks
            .values()
            .filter(|t| t.room_id == room_id)
            .cloned()
            .collect();

        tracks.sort_by_key(|t| t.id);

        Ok(tracks)
    }

    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData> {
        let mut state = self.state.write();

        if !state.rooms.contains_key(&new_track.room_id) {
            return Err(DatabaseError::not_found("room", new_track.room_id));
        }

        let id = self.next_key();
        let track = TrackData {
            id,
            room_id: new_track.room_id,
            uploader_id: new_track.uploader_id,
            title: new_track.title,
            key: new_track.key,
            duration_in_seconds: new_track.duration_in_seconds,
            created_at: new_track.created_at,
        };

        state.tracks.insert(id, track.clone());

        Ok(track)
    }

    async fn delete_track(&self, track_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.write();

        state
            .tracks
            .remove(&track_id)
            .ok_or(DatabaseError::not_found("track", track_id))?;

        state.votes.retain(|(track, _)| *track != track_id);

        Ok(())
    }

    async fn votes_by_room(&self, room_id: PrimaryKey) -> Result<Vec<VoteData>> {
        let state = self.state.read();

        let votes = state
            .votes
            .iter()
            .filter(|(track, _)| {
                state
                    .tracks
                    .get(track)
                    .map(|t| t.room_id == room_id)
                    .unwrap_or(false)
            })
            .map(|(track_id, user_id)| VoteData {
                track_id: *track_id,
                user_id: *user_id,
            })
            .collect();

        Ok(votes)
    }

    async fn create_vote(&self, track_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.write();

        if !state.tracks.contains_key(&track_id) {
            return Err(DatabaseError::not_found("track", track_id));
        }

        if !state.votes.insert((track_id, user_id)) {
            return Err(DatabaseError::Conflict {
                resource: "vote",
                field: "user_id",
                value: user_id.to_string(),
            });
        }

        Ok(())
    }

    async fn delete_vote(&self, track_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.write();

        if !state.votes.remove(&(track_id, user_id)) {
            return Err(DatabaseError::not_found("vote", track_id));
        }

        Ok(())
    }
}
