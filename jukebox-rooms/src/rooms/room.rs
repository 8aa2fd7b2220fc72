use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use jukebox_core::Timeline;

use crate::{
    JukeboxContext, PrimaryKey, RankedQueue, RoomData, RoomEventKind, StopReason, Subscription,
    Track, TrackData, VoteOutcome,
};

use super::RoomError;

/// A listening room: one administrator-controlled timeline, a voting-ranked
/// queue, and the participants observing both.
pub struct Room {
    id: PrimaryKey,
    context: JukeboxContext,
    data: Mutex<RoomData>,
    /// The timeline and queue share one lock, making every playback
    /// transition and queue mutation atomic with respect to this room.
    /// Operations on different rooms never contend.
    session: Mutex<PlaybackSession>,
}

struct PlaybackSession {
    timeline: Timeline<Track>,
    queue: RankedQueue,
}

/// A playback transition requested by an actor. Each operation is its own
/// variant with exactly the fields it needs, so a calling layer validates
/// the shape before anything reaches the room.
///
/// Starting a track is absent here because it first has to confirm the audio
/// exists, which happens in [super::RoomManager::start].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum PlaybackCommand {
    Pause,
    Resume,
    Seek { position: f32 },
    Skip,
    Stop,
}

/// A snapshot of a room's playback, readable by any participant. Carries the
/// server clock so observers can compensate for propagation delay, and
/// enough timestamps to reconstruct the position at any later instant.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub is_playing: bool,
    pub current_track: Option<Track>,
    pub position: Option<f32>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub server_time: DateTime<Utc>,
}

impl Room {
    pub fn new(context: &JukeboxContext, data: RoomData) -> Self {
        Self {
            id: data.id,
            context: context.clone(),
            data: Mutex::new(data),
            session: Mutex::new(PlaybackSession {
                timeline: Timeline::new(),
                queue: RankedQueue::new(),
            }),
        }
    }

    pub fn id(&self) -> PrimaryKey {
        self.id
    }

    pub fn data(&self) -> RoomData {
        self.data.lock().clone()
    }

    /// Attaches a participant to the room's event fan-out.
    pub fn subscribe(&self, user_id: PrimaryKey) -> Result<Subscription, RoomError> {
        self.ensure_participant(user_id, "subscribe to room events")?;

        Ok(self.context.broadcaster.subscribe(self.id, user_id))
    }

    // Playback transitions. All of these serialize on the session lock, so
    // two concurrent commands against the same room always observe each
    // other's completed state.

    /// Dispatches a typed command to the matching transition.
    pub fn perform(&self, actor: PrimaryKey, command: PlaybackCommand) -> Result<(), RoomError> {
        match command {
            PlaybackCommand::Pause => self.pause(actor).map(|_| ()),
            PlaybackCommand::Resume => self.resume(actor).map(|_| ()),
            PlaybackCommand::Seek { position } => self.seek(actor, position).map(|_| ()),
            PlaybackCommand::Skip => self.skip(actor),
            PlaybackCommand::Stop => self.stop(actor),
        }
    }

    /// Suspends playback at the current position.
    pub fn pause(&self, actor: PrimaryKey) -> Result<f32, RoomError> {
        self.ensure_administrator(actor, "pause playback")?;

        let mut session = self.session.lock();
        let position = session.timeline.pause(self.context.now())?;

        info!("Room {} paused at {position:.3}s", self.id);
        self.emit(actor, RoomEventKind::Paused { position });

        Ok(position)
    }

    /// Continues playback from where it was paused.
    pub fn resume(&self, actor: PrimaryKey) -> Result<f32, RoomError> {
        self.ensure_administrator(actor, "resume playback")?;

        let mut session = self.session.lock();
        let position = session.timeline.resume(self.context.now())?;

        info!("Room {} resumed at {position:.3}s", self.id);
        self.emit(actor, RoomEventKind::Resumed { position });

        Ok(position)
    }

    /// Moves playback to the given position, preserving the play state.
    pub fn seek(&self, actor: PrimaryKey, position: f32) -> Result<f32, RoomError> {
        self.ensure_administrator(actor, "seek playback")?;

        let mut session = self.session.lock();
        let position = session.timeline.seek(position, self.context.now())?;

        info!("Room {} seeked to {position:.3}s", self.id);
        self.emit(actor, RoomEventKind::Seeked { position });

        Ok(position)
    }

    /// Advances to the highest-ranked track other than the current one, or
    /// clears the room when the current track is the only one left.
    pub fn skip(&self, actor: PrimaryKey) -> Result<(), RoomError> {
        self.ensure_administrator(actor, "skip the current track")?;

        let mut session = self.session.lock();

        let current = session
            .timeline
            .item()
            .cloned()
            .ok_or(RoomError::InvalidState("the room has no current track"))?;

        match session.queue.next_after(current.id()) {
            Some(next) => {
                self.start_locked(&mut session, actor, next.clone());
                self.emit(
                    actor,
                    RoomEventKind::Skipped {
                        previous: current.id(),
                        next: next.id(),
                    },
                );
            }
            None => {
                session.timeline.clear();

                info!("Room {} ran out of queue and stopped", self.id);
                self.emit(
                    actor,
                    RoomEventKind::Stopped {
                        reason: StopReason::QueueEmpty,
                    },
                );
            }
        }

        Ok(())
    }

    /// Unconditionally clears playback, leaving the room idle.
    pub fn stop(&self, actor: PrimaryKey) -> Result<(), RoomError> {
        self.ensure_administrator(actor, "stop playback")?;

        let mut session = self.session.lock();
        session.timeline.clear();

        info!("Room {} stopped by its administrator", self.id);
        self.emit(
            actor,
            RoomEventKind::Stopped {
                reason: StopReason::AdministratorStop,
            },
        );

        Ok(())
    }

    /// The room's playback as of now.
    pub fn status(&self, actor: PrimaryKey) -> Result<RoomStatus, RoomError> {
        self.ensure_participant(actor, "read the room status")?;

        let session = self.session.lock();
        let now = self.context.now();

        // The timeline's copy of the track carries the score it had when
        // playback started, so the queue's copy is preferred.
        let current_track = session.timeline.item().map(|item| {
            session
                .queue
                .get(item.id())
                .cloned()
                .unwrap_or_else(|| item.clone())
        });

        Ok(RoomStatus {
            is_playing: session.timeline.is_playing(),
            current_track,
            position: session.timeline.position(now),
            started_at: session.timeline.started_at(),
            paused_at: session.timeline.paused_at(),
            server_time: now,
        })
    }

    /// The ranked queue as of the latest committed mutation.
    pub fn queue(&self, actor: PrimaryKey) -> Result<Vec<Track>, RoomError> {
        self.ensure_participant(actor, "read the room queue")?;

        Ok(self.session.lock().queue.in_order())
    }

    /// Starts playback of the given track. Used by the explicit start
    /// command, the silent auto-start on upload, and skip advancement, so
    /// the state machine cannot diverge between them.
    pub(crate) fn start_track(
        &self,
        actor: PrimaryKey,
        track_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        let mut session = self.session.lock();

        let track = session
            .queue
            .get(track_id)
            .cloned()
            .ok_or_else(|| RoomError::not_found("track", track_id))?;

        self.start_locked(&mut session, actor, track);
        Ok(())
    }

    /// Starts the track only if nothing currently occupies the timeline.
    /// Returns whether playback actually began. The idle check happens under
    /// the session lock, so two concurrent uploads cannot both win.
    pub(crate) fn start_track_if_idle(&self, actor: PrimaryKey, track_id: PrimaryKey) -> bool {
        let mut session = self.session.lock();

        if session.timeline.item().is_some() {
            return false;
        }

        let Some(track) = session.queue.get(track_id).cloned() else {
            return false;
        };

        self.start_locked(&mut session, actor, track);
        true
    }

    fn start_locked(&self, session: &mut PlaybackSession, actor: PrimaryKey, track: Track) {
        let now = self.context.now();
        let track_id = track.id();

        session.timeline.start(track, now);

        info!("Room {} started track {track_id}", self.id);
        self.emit(
            actor,
            RoomEventKind::Started {
                track_id,
                started_at: now,
                position: 0.,
            },
        );
    }

    // Queue mutations

    /// Adds a freshly persisted track to the queue.
    pub(crate) fn insert_track(&self, actor: PrimaryKey, data: TrackData) -> Track {
        let mut session = self.session.lock();
        let track_id = data.id;

        session.queue.insert(data);
        self.emit(actor, RoomEventKind::TrackAdded { track_id });

        session
            .queue
            .get(track_id)
            .cloned()
            .expect("track exists after insertion")
    }

    /// Checks that the actor may delete the track and that it is not
    /// currently playing. The deletion itself happens after the record is
    /// gone from the database.
    pub(crate) fn ensure_track_removable(
        &self,
        actor: PrimaryKey,
        track_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        let session = self.session.lock();

        let track = session
            .queue
            .get(track_id)
            .ok_or_else(|| RoomError::not_found("track", track_id))?;

        if actor != self.administrator_id() && actor != track.data.uploader_id {
            return Err(RoomError::Forbidden {
                user_id: actor,
                action: "delete this track",
            });
        }

        if session.timeline.item().map(|t| t.id()) == Some(track_id) {
            return Err(RoomError::InvalidState(
                "the track is currently playing and cannot be deleted",
            ));
        }

        Ok(())
    }

    /// Drops the track from the queue.
    pub(crate) fn evict_track(&self, actor: PrimaryKey, track_id: PrimaryKey) {
        let mut session = self.session.lock();

        if session.queue.remove(track_id).is_some() {
            self.emit(actor, RoomEventKind::TrackRemoved { track_id });
        }
    }

    /// Records a committed vote, recounting the score and reporting order
    /// changes to the room.
    pub(crate) fn apply_vote(&self, actor: PrimaryKey, track_id: PrimaryKey) -> VoteOutcome {
        let mut session = self.session.lock();

        // The track can vanish between the vote committing and this
        // recount, if a concurrent deletion won. The cascade on the track
        // row already dropped the vote, so there is nothing to record.
        let Some(outcome) = session.queue.register_vote(track_id, actor) else {
            return VoteOutcome {
                applied: false,
                new_score: 0,
                order_changed: false,
            };
        };

        if outcome.applied {
            self.emit(
                actor,
                RoomEventKind::Voted {
                    track_id,
                    score: outcome.new_score,
                },
            );
        }

        if outcome.order_changed {
            self.emit(
                actor,
                RoomEventKind::QueueReordered {
                    order: session.queue.ordering(),
                },
            );
        }

        outcome
    }

    /// Records a committed vote withdrawal.
    pub(crate) fn apply_unvote(&self, actor: PrimaryKey, track_id: PrimaryKey) -> VoteOutcome {
        let mut session = self.session.lock();

        let Some(outcome) = session.queue.unregister_vote(track_id, actor) else {
            return VoteOutcome {
                applied: false,
                new_score: 0,
                order_changed: false,
            };
        };

        if outcome.applied {
            self.emit(
                actor,
                RoomEventKind::Unvoted {
                    track_id,
                    score: outcome.new_score,
                },
            );
        }

        if outcome.order_changed {
            self.emit(
                actor,
                RoomEventKind::QueueReordered {
                    order: session.queue.ordering(),
                },
            );
        }

        outcome
    }

    /// The current score of a track, for reporting benign duplicate votes.
    pub(crate) fn current_score(&self, track_id: PrimaryKey) -> usize {
        self.session
            .lock()
            .queue
            .get(track_id)
            .map(|t| t.vote_score)
            .unwrap_or_default()
    }

    pub(crate) fn has_track(&self, track_id: PrimaryKey) -> bool {
        self.session.lock().queue.get(track_id).is_some()
    }

    pub(crate) fn track(&self, track_id: PrimaryKey) -> Option<Track> {
        self.session.lock().queue.get(track_id).cloned()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.session.lock().timeline.item().is_none()
    }

    /// Rebuilds the queue from persisted records without emitting events.
    pub(crate) fn restore_state(
        &self,
        tracks: Vec<TrackData>,
        votes: Vec<(PrimaryKey, PrimaryKey)>,
    ) {
        let mut session = self.session.lock();

        for track in tracks {
            session.queue.insert(track);
        }

        for (track_id, user_id) in votes {
            session.queue.restore_vote(track_id, user_id);
        }
    }

    // Membership

    /// Registers an added member to the room.
    pub(crate) fn add_member(&self, user_id: PrimaryKey) {
        let mut data = self.data.lock();

        if !data.member_ids.contains(&user_id) {
            data.member_ids.push(user_id);
        }

        drop(data);

        info!("User {user_id} joined room {}", self.id);
        self.emit(user_id, RoomEventKind::UserJoined { user_id });
    }

    /// Removes a member, dropping any subscriptions they hold.
    pub(crate) fn remove_member(&self, user_id: PrimaryKey) {
        self.data.lock().member_ids.retain(|id| *id != user_id);
        self.context.broadcaster.unsubscribe(self.id, user_id);

        info!("User {user_id} left room {}", self.id);
        self.emit(user_id, RoomEventKind::UserLeft { user_id });
    }

    pub fn administrator_id(&self) -> PrimaryKey {
        self.data.lock().administrator_id
    }

    pub fn is_participant(&self, user_id: PrimaryKey) -> bool {
        self.data.lock().member_ids.contains(&user_id)
    }

    pub(crate) fn ensure_administrator(
        &self,
        user_id: PrimaryKey,
        action: &'static str,
    ) -> Result<(), RoomError> {
        if self.administrator_id() != user_id {
            return Err(RoomError::Forbidden { user_id, action });
        }

        Ok(())
    }

    pub(crate) fn ensure_participant(
        &self,
        user_id: PrimaryKey,
        action: &'static str,
    ) -> Result<(), RoomError> {
        if !self.is_participant(user_id) {
            return Err(RoomError::Forbidden { user_id, action });
        }

        Ok(())
    }

    fn emit(&self, actor: PrimaryKey, kind: RoomEventKind) {
        self.context.emit(self.id, actor, kind);
    }
}
