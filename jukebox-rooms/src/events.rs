use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::PrimaryKey;

/// A committed state change in a room, broadcast to its subscribers.
///
/// Events are notifications of deltas, not the system of record. An observer
/// that misses one recovers by fetching the room's status and reconciling,
/// never by replaying events.
#[derive(Debug, Clone, Serialize)]
pub struct RoomEvent {
    pub room_id: PrimaryKey,
    /// The server clock at emission, which observers compensate their own
    /// clock against.
    pub server_time: DateTime<Utc>,
    /// The identity whose action produced the event.
    pub actor: PrimaryKey,
    #[serde(flatten)]
    pub kind: RoomEventKind,
}

/// What happened, with the payload specific to each kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RoomEventKind {
    /// Playback of a track began from position zero.
    Started {
        track_id: PrimaryKey,
        started_at: DateTime<Utc>,
        position: f32,
    },
    /// Playback was suspended at the given position.
    Paused { position: f32 },
    /// Playback continued from the given position.
    Resumed { position: f32 },
    /// Playback moved to the given position without changing play state.
    Seeked { position: f32 },
    /// The current track was skipped in favor of the next ranked one.
    /// Accompanied by a `started` event for the next track.
    Skipped {
        previous: PrimaryKey,
        next: PrimaryKey,
    },
    /// Playback cleared, leaving the room idle.
    Stopped { reason: StopReason },
    /// A track arrived in the queue.
    TrackAdded { track_id: PrimaryKey },
    /// A track was explicitly deleted.
    TrackRemoved { track_id: PrimaryKey },
    /// A vote was cast. Carries the freshly recounted score.
    Voted { track_id: PrimaryKey, score: usize },
    /// A vote was withdrawn. Carries the freshly recounted score.
    Unvoted { track_id: PrimaryKey, score: usize },
    /// A mutation changed the ranked order of the queue.
    QueueReordered { order: Vec<PrimaryKey> },
    UserJoined { user_id: PrimaryKey },
    UserLeft { user_id: PrimaryKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QueueEmpty,
    AdministratorStop,
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn events_serialize_with_a_flat_type_tag() {
        let event = RoomEvent {
            room_id: 3,
            server_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            actor: 7,
            kind: RoomEventKind::Started {
                track_id: 12,
                started_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                position: 0.,
            },
        };

        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "started");
        assert_eq!(value["room_id"], 3);
        assert_eq!(value["actor"], 7);
        assert_eq!(value["track_id"], 12);
        assert_eq!(value["position"], 0.);
        assert!(value["server_time"].is_string());
    }

    #[test]
    fn stop_reasons_serialize_as_snake_case() {
        let value = serde_json::to_value(StopReason::QueueEmpty).unwrap();
        assert_eq!(value, "queue_empty");

        let value = serde_json::to_value(StopReason::AdministratorStop).unwrap();
        assert_eq!(value, "administrator_stop");
    }
}
