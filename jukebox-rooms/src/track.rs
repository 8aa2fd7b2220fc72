use serde::Serialize;

use jukebox_core::Playable;

use crate::{PrimaryKey, TrackData};

/// A track in a room's queue, together with its current vote standing.
///
/// The score is denormalized here for cheap reads, but it is only ever
/// written by recounting the vote set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    #[serde(flatten)]
    pub data: TrackData,
    pub vote_score: usize,
}

impl Track {
    pub fn new(data: TrackData) -> Self {
        Self {
            data,
            vote_score: 0,
        }
    }

    pub fn id(&self) -> PrimaryKey {
        self.data.id
    }
}

impl Playable for Track {
    fn duration(&self) -> f32 {
        self.data.duration_in_seconds
    }
}

#[cfg(test)]
impl Track {
    /// Creates a bare track for queue tests. `age` spaces out the arrival
    /// times, lower meaning earlier.
    pub(crate) fn mock(id: PrimaryKey, age: i64) -> Self {
        use chrono::{Duration, TimeZone, Utc};

        Self::new(TrackData {
            id,
            room_id: 1,
            uploader_id: 1,
            title: format!("track {id}"),
            key: format!("track-{id}"),
            duration_in_seconds: 180.,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(age),
        })
    }
}
