use chrono::{DateTime, Utc};

use jukebox_core::{seconds_between, Config};
use jukebox_rooms::{RoomEvent, RoomEventKind, RoomStatus};

/// Keeps a local playback position consistent with a room's broadcast
/// timeline.
///
/// Timing events carry the server clock at emission, so the expected local
/// position is the event's position plus however long the event took to
/// arrive. Corrections smaller than the configured tolerance are suppressed,
/// since repeatedly seeking by a few milliseconds is audible where the drift
/// itself is not.
///
/// Events are only nudges; the accumulated drift between them is corrected
/// by periodically feeding a fresh status snapshot to [Reconciler::reconcile].
pub struct Reconciler {
    config: Config,
    playback: LocalPlayback,
}

/// What the reconciler believes the local player is doing.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LocalPlayback {
    Idle,
    Playing {
        /// The position the player was last set to, and the local instant
        /// that happened at.
        position: f32,
        anchored_at: DateTime<Utc>,
    },
    Paused {
        position: f32,
    },
}

/// An adjustment the local player has to make.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Seek to the position and make sure playback is running.
    Play { position: f32 },
    /// Stop playback, pinned at the position.
    Pause { position: f32 },
    /// Clear playback entirely.
    Stop,
}

impl Reconciler {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            playback: LocalPlayback::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The local position as of the given instant, if anything is playing
    /// or paused.
    pub fn position(&self, local_now: DateTime<Utc>) -> Option<f32> {
        match self.playback {
            LocalPlayback::Idle => None,
            LocalPlayback::Paused { position } => Some(position),
            LocalPlayback::Playing {
                position,
                anchored_at,
            } => Some(position + seconds_between(anchored_at, local_now)),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.playback, LocalPlayback::Playing { .. })
    }

    /// Consumes a broadcast event, returning the correction the local player
    /// has to make, if any.
    pub fn observe(&mut self, event: &RoomEvent, local_now: DateTime<Utc>) -> Option<Correction> {
        match &event.kind {
            RoomEventKind::Started { position, .. } | RoomEventKind::Resumed { position } => {
                let expected = position + seconds_between(event.server_time, local_now);
                self.play_at(expected, local_now)
            }
            RoomEventKind::Seeked { position } => {
                // Seeking does not change the play state. While paused the
                // position stands still, so there is no delay to compensate.
                if matches!(self.playback, LocalPlayback::Paused { .. }) {
                    self.pause_at(*position)
                } else {
                    let expected = position + seconds_between(event.server_time, local_now);
                    self.play_at(expected, local_now)
                }
            }
            RoomEventKind::Paused { position } => self.pause_at(*position),
            RoomEventKind::Stopped { .. } => self.stop(),
            _ => None,
        }
    }

    /// Reconciles against a status snapshot, which corrects the clock drift
    /// that accumulates between discrete events and recovers from missed
    /// ones.
    pub fn reconcile(&mut self, status: &RoomStatus, local_now: DateTime<Utc>) -> Option<Correction> {
        match (status.is_playing, status.position) {
            (true, Some(position)) => {
                let expected = position + seconds_between(status.server_time, local_now);
                self.play_at(expected, local_now)
            }
            (false, Some(position)) => self.pause_at(position),
            _ => self.stop(),
        }
    }

    fn play_at(&mut self, expected: f32, local_now: DateTime<Utc>) -> Option<Correction> {
        if let LocalPlayback::Playing { .. } = self.playback {
            let current = self
                .position(local_now)
                .unwrap_or_default();

            if (expected - current).abs() <= self.config.sync_tolerance_in_seconds {
                return None;
            }
        }

        self.playback = LocalPlayback::Playing {
            position: expected,
            anchored_at: local_now,
        };

        Some(Correction::Play { position: expected })
    }

    fn pause_at(&mut self, position: f32) -> Option<Correction> {
        if let LocalPlayback::Paused { position: current } = self.playback {
            if (current - position).abs() <= self.config.sync_tolerance_in_seconds {
                return None;
            }
        }

        self.playback = LocalPlayback::Paused { position };
        Some(Correction::Pause { position })
    }

    fn stop(&mut self) -> Option<Correction> {
        if self.playback == LocalPlayback::Idle {
            return None;
        }

        self.playback = LocalPlayback::Idle;
        Some(Correction::Stop)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, TimeZone};
    use jukebox_rooms::StopReason;

    fn instant(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(millis)
    }

    fn event(kind: RoomEventKind, server_time: DateTime<Utc>) -> RoomEvent {
        RoomEvent {
            room_id: 1,
            server_time,
            actor: 1,
            kind,
        }
    }

    fn started(position: f32, server_time: DateTime<Utc>) -> RoomEvent {
        event(
            RoomEventKind::Started {
                track_id: 1,
                started_at: server_time,
                position,
            },
            server_time,
        )
    }

    #[test]
    fn compensates_for_propagation_delay() {
        let mut reconciler = Reconciler::new(Config::default());

        // The event was emitted 250ms before it arrived
        let correction = reconciler.observe(&started(0., instant(0)), instant(250));

        assert_eq!(correction, Some(Correction::Play { position: 0.25 }));
    }

    #[test]
    fn suppresses_corrections_within_tolerance() {
        let mut reconciler = Reconciler::new(Config::default());

        reconciler.observe(&started(0., instant(0)), instant(0));

        // Ten seconds in, a seek lands exactly where playback already is
        let on_time = event(RoomEventKind::Seeked { position: 10. }, instant(10_000));
        assert_eq!(reconciler.observe(&on_time, instant(10_000)), None);

        // A 50ms disagreement is inside the 100ms tolerance
        let close = event(RoomEventKind::Seeked { position: 10.05 }, instant(10_000));
        assert_eq!(reconciler.observe(&close, instant(10_000)), None);
    }

    #[test]
    fn corrects_drift_beyond_tolerance() {
        let mut reconciler = Reconciler::new(Config::default());

        reconciler.observe(&started(0., instant(0)), instant(0));

        let far = event(RoomEventKind::Seeked { position: 42. }, instant(10_000));

        assert_eq!(
            reconciler.observe(&far, instant(10_000)),
            Some(Correction::Play { position: 42. })
        );
        assert_eq!(reconciler.position(instant(10_000)), Some(42.));
    }

    #[test]
    fn pausing_pins_the_event_position() {
        let mut reconciler = Reconciler::new(Config::default());

        reconciler.observe(&started(0., instant(0)), instant(0));

        let paused = event(RoomEventKind::Paused { position: 30. }, instant(30_000));
        assert_eq!(
            reconciler.observe(&paused, instant(30_200)),
            Some(Correction::Pause { position: 30. })
        );

        // Pinned: the position no longer moves with local time
        assert_eq!(reconciler.position(instant(90_000)), Some(30.));
        assert!(!reconciler.is_playing());
    }

    #[test]
    fn seeking_while_paused_stays_paused() {
        let mut reconciler = Reconciler::new(Config::default());

        reconciler.observe(&started(0., instant(0)), instant(0));
        reconciler.observe(
            &event(RoomEventKind::Paused { position: 30. }, instant(30_000)),
            instant(30_000),
        );

        let seeked = event(RoomEventKind::Seeked { position: 5. }, instant(31_000));
        assert_eq!(
            reconciler.observe(&seeked, instant(31_200)),
            Some(Correction::Pause { position: 5. })
        );
        assert!(!reconciler.is_playing());
    }

    #[test]
    fn stop_clears_local_playback_once() {
        let mut reconciler = Reconciler::new(Config::default());

        reconciler.observe(&started(0., instant(0)), instant(0));

        let stopped = event(
            RoomEventKind::Stopped {
                reason: StopReason::QueueEmpty,
            },
            instant(1_000),
        );

        assert_eq!(
            reconciler.observe(&stopped.clone(), instant(1_000)),
            Some(Correction::Stop)
        );
        assert_eq!(reconciler.observe(&stopped, instant(1_001)), None);
        assert_eq!(reconciler.position(instant(2_000)), None);
    }

    #[test]
    fn status_snapshots_correct_accumulated_drift() {
        let mut reconciler = Reconciler::new(Config::default());

        reconciler.observe(&started(0., instant(0)), instant(0));

        // The server reports a second more progress than the local clock
        // accumulated
        let status = RoomStatus {
            is_playing: true,
            current_track: None,
            position: Some(11.),
            started_at: None,
            paused_at: None,
            server_time: instant(10_000),
        };

        assert_eq!(
            reconciler.reconcile(&status, instant(10_000)),
            Some(Correction::Play { position: 11. })
        );

        // A snapshot agreeing with local playback changes nothing
        let agreeing = RoomStatus {
            position: Some(12.),
            server_time: instant(11_000),
            ..status
        };

        assert_eq!(reconciler.reconcile(&agreeing, instant(11_000)), None);
    }

    #[test]
    fn queue_events_do_not_disturb_playback() {
        let mut reconciler = Reconciler::new(Config::default());

        reconciler.observe(&started(0., instant(0)), instant(0));

        let voted = event(
            RoomEventKind::Voted {
                track_id: 2,
                score: 1,
            },
            instant(500),
        );

        assert_eq!(reconciler.observe(&voted, instant(500)), None);
        assert!(reconciler.is_playing());
    }
}
