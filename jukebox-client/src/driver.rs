use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use log::warn;

use jukebox_core::Clock;
use jukebox_rooms::{RoomError, RoomEvent, RoomStatus};

use crate::{Correction, Reconciler};

/// The local audio output that corrections are applied to.
pub trait PlayerControl: Send {
    fn play_at(&mut self, position: f32);
    fn pause_at(&mut self, position: f32);
    fn stop(&mut self);
}

/// Fetches a fresh status snapshot from the coordinator, however the
/// transport reaches it.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self) -> Result<RoomStatus, RoomError>;
}

/// Follows a room until its event stream ends.
///
/// Broadcast events steer the local player as they arrive. While playing,
/// the coordinator is polled on the configured resync interval to correct
/// the clock drift that builds up between events; a failed poll is logged
/// and playback continues uncorrected until the next one.
pub async fn run<E, S, P>(
    mut reconciler: Reconciler,
    mut events: E,
    status: S,
    mut player: P,
    clock: Arc<dyn Clock>,
) where
    E: Stream<Item = RoomEvent> + Unpin,
    S: StatusSource,
    P: PlayerControl,
{
    let mut resync = tokio::time::interval(reconciler.config().resync_interval());

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    apply(reconciler.observe(&event, clock.now()), &mut player);
                }
                None => break,
            },
            _ = resync.tick() => {
                if !reconciler.is_playing() {
                    continue;
                }

                match status.status().await {
                    Ok(snapshot) => {
                        apply(reconciler.reconcile(&snapshot, clock.now()), &mut player);
                    }
                    Err(e) => warn!("Resync failed, keeping local playback: {e}"),
                }
            }
        }
    }
}

fn apply<P: PlayerControl>(correction: Option<Correction>, player: &mut P) {
    match correction {
        Some(Correction::Play { position }) => player.play_at(position),
        Some(Correction::Pause { position }) => player.pause_at(position),
        Some(Correction::Stop) => player.stop(),
        None => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use futures_util::stream;
    use jukebox_core::{Config, SystemClock};
    use jukebox_rooms::RoomEventKind;

    #[derive(Default)]
    struct RecordingPlayer {
        corrections: Vec<Correction>,
    }

    impl PlayerControl for &mut RecordingPlayer {
        fn play_at(&mut self, position: f32) {
            self.corrections.push(Correction::Play { position });
        }

        fn pause_at(&mut self, position: f32) {
            self.corrections.push(Correction::Pause { position });
        }

        fn stop(&mut self) {
            self.corrections.push(Correction::Stop);
        }
    }

    struct NoStatus;

    #[async_trait]
    impl StatusSource for NoStatus {
        async fn status(&self) -> Result<RoomStatus, RoomError> {
            Err(RoomError::InvalidState("no status in this test"))
        }
    }

    #[tokio::test]
    async fn applies_corrections_until_the_stream_ends() {
        let now = Utc::now();

        let events = vec![
            RoomEvent {
                room_id: 1,
                server_time: now,
                actor: 1,
                kind: RoomEventKind::Started {
                    track_id: 1,
                    started_at: now,
                    position: 0.,
                },
            },
            RoomEvent {
                room_id: 1,
                server_time: now,
                actor: 1,
                kind: RoomEventKind::Paused { position: 30. },
            },
        ];

        let mut player = RecordingPlayer::default();

        run(
            Reconciler::new(Config::default()),
            stream::iter(events),
            NoStatus,
            &mut player,
            Arc::new(SystemClock),
        )
        .await;

        assert_eq!(player.corrections.len(), 2);
        assert!(matches!(player.corrections[0], Correction::Play { .. }));
        assert_eq!(
            player.corrections[1],
            Correction::Pause { position: 30. }
        );
    }
}
