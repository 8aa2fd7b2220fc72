use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// An item that can occupy a [Timeline].
pub trait Playable {
    /// The length of the item, in seconds.
    fn duration(&self) -> f32;
}

/// The authoritative playback timeline of a single room.
///
/// The timeline stores the instant at which position zero would have
/// occurred, shifting that instant across pauses, so the current position is
/// always `now - started_at` while playing and `paused_at - started_at` while
/// paused. Any observer holding the two timestamps can reconstruct its own
/// position without further messages.
///
/// The timeline itself is not thread safe. Callers are expected to wrap it in
/// their own mutual exclusion boundary, since transitions usually need to be
/// atomic with surrounding state changes.
#[derive(Debug, Default, Clone)]
pub struct Timeline<T> {
    state: TimelineState<T>,
}

/// The state of a [Timeline].
///
/// Field combinations that would violate consistency, such as a playing
/// timeline with a pause instant, cannot be represented.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum TimelineState<T> {
    #[default]
    Idle,
    Playing {
        item: T,
        started_at: DateTime<Utc>,
    },
    Paused {
        item: T,
        started_at: DateTime<Utc>,
        paused_at: DateTime<Utc>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum TimelineError {
    #[error("the timeline has no item")]
    Empty,
    #[error("the timeline is not playing")]
    NotPlaying,
    #[error("the timeline is already playing")]
    AlreadyPlaying,
    #[error("position {position} is outside the item, which is {duration} seconds long")]
    OutOfRange { position: f32, duration: f32 },
}

impl<T> Timeline<T>
where
    T: Playable + Clone,
{
    pub fn new() -> Self {
        Self {
            state: TimelineState::Idle,
        }
    }

    /// Puts a new item on the timeline and starts playing it from position
    /// zero, replacing whatever was there before.
    pub fn start(&mut self, item: T, now: DateTime<Utc>) {
        self.state = TimelineState::Playing {
            item,
            started_at: now,
        };
    }

    /// Suspends playback, returning the position at which it stopped.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<f32, TimelineError> {
        match &self.state {
            TimelineState::Idle => Err(TimelineError::Empty),
            TimelineState::Paused { .. } => Err(TimelineError::NotPlaying),
            TimelineState::Playing { item, started_at } => {
                let position = seconds_between(*started_at, now);

                self.state = TimelineState::Paused {
                    item: item.clone(),
                    started_at: *started_at,
                    paused_at: now,
                };

                Ok(position)
            }
        }
    }

    /// Continues playback from where it was paused, returning that position.
    ///
    /// The start instant is shifted forward by the time spent paused, which
    /// keeps `now - started_at` correct without storing the position itself.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<f32, TimelineError> {
        match &self.state {
            TimelineState::Idle => Err(TimelineError::Empty),
            TimelineState::Playing { .. } => Err(TimelineError::AlreadyPlaying),
            TimelineState::Paused {
                item,
                started_at,
                paused_at,
            } => {
                let position = seconds_between(*started_at, *paused_at);
                let paused_duration = now - *paused_at;

                self.state = TimelineState::Playing {
                    item: item.clone(),
                    started_at: *started_at + paused_duration,
                };

                Ok(position)
            }
        }
    }

    /// Moves playback to the given position without changing whether the
    /// timeline is playing. A paused timeline stays paused, with its pause
    /// instant reset to now so the elapsed-time formula stays consistent.
    pub fn seek(&mut self, position: f32, now: DateTime<Utc>) -> Result<f32, TimelineError> {
        let item = match &self.state {
            TimelineState::Idle => return Err(TimelineError::Empty),
            TimelineState::Playing { item, .. } => item,
            TimelineState::Paused { item, .. } => item,
        };

        let duration = item.duration();

        if position < 0. || position > duration {
            return Err(TimelineError::OutOfRange { position, duration });
        }

        let started_at = now - seconds_to_duration(position);

        self.state = match &self.state {
            TimelineState::Idle => unreachable!(),
            TimelineState::Playing { item, .. } => TimelineState::Playing {
                item: item.clone(),
                started_at,
            },
            TimelineState::Paused { item, .. } => TimelineState::Paused {
                item: item.clone(),
                started_at,
                paused_at: now,
            },
        };

        Ok(position)
    }

    /// Takes the timeline back to idle, dropping the current item.
    pub fn clear(&mut self) {
        self.state = TimelineState::Idle;
    }

    /// The position as of the given instant, if anything is on the timeline.
    pub fn position(&self, now: DateTime<Utc>) -> Option<f32> {
        match &self.state {
            TimelineState::Idle => None,
            TimelineState::Playing { started_at, .. } => Some(seconds_between(*started_at, now)),
            TimelineState::Paused {
                started_at,
                paused_at,
                ..
            } => Some(seconds_between(*started_at, *paused_at)),
        }
    }

    /// The item currently on the timeline, if any.
    pub fn item(&self) -> Option<&T> {
        match &self.state {
            TimelineState::Idle => None,
            TimelineState::Playing { item, .. } => Some(item),
            TimelineState::Paused { item, .. } => Some(item),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, TimelineState::Playing { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            TimelineState::Idle => None,
            TimelineState::Playing { started_at, .. } => Some(*started_at),
            TimelineState::Paused { started_at, .. } => Some(*started_at),
        }
    }

    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            TimelineState::Paused { paused_at, .. } => Some(*paused_at),
            _ => None,
        }
    }

    pub fn state(&self) -> &TimelineState<T> {
        &self.state
    }
}

/// The elapsed seconds from one instant to another.
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f32 {
    (to - from).num_milliseconds() as f32 / 1000.
}

/// Converts seconds to a [Duration] with millisecond precision.
pub fn seconds_to_duration(seconds: f32) -> Duration {
    Duration::milliseconds((seconds * 1000.) as i64)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    struct Song(f32);

    impl Playable for Song {
        fn duration(&self) -> f32 {
            self.0
        }
    }

    fn instant(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn position_tracks_elapsed_time() {
        let mut timeline = Timeline::new();

        timeline.start(Song(180.), instant(0));

        assert!(timeline.is_playing());
        assert_eq!(timeline.position(instant(0)), Some(0.));
        assert_eq!(timeline.position(instant(42)), Some(42.));
    }

    #[test]
    fn pause_freezes_position() {
        let mut timeline = Timeline::new();

        timeline.start(Song(180.), instant(0));
        let position = timeline.pause(instant(30)).unwrap();

        assert_eq!(position, 30.);
        assert!(!timeline.is_playing());

        // The position does not move while paused
        assert_eq!(timeline.position(instant(100)), Some(30.));
    }

    #[test]
    fn resume_returns_to_the_paused_position() {
        let mut timeline = Timeline::new();

        timeline.start(Song(180.), instant(0));
        timeline.pause(instant(30)).unwrap();

        // 15 seconds pass while paused
        let position = timeline.resume(instant(45)).unwrap();

        assert_eq!(position, 30.);
        assert_eq!(timeline.position(instant(45)), Some(30.));
        assert_eq!(timeline.position(instant(50)), Some(35.));
    }

    #[test]
    fn pause_resume_round_trip_is_independent_of_pause_length() {
        for pause_length in [1, 10, 600] {
            let mut timeline = Timeline::new();

            timeline.start(Song(300.), instant(0));
            timeline.pause(instant(25)).unwrap();

            let position = timeline.resume(instant(25 + pause_length)).unwrap();
            assert_eq!(position, 25.);
        }
    }

    #[test]
    fn seek_moves_position_and_keeps_pause_state() {
        let mut timeline = Timeline::new();

        timeline.start(Song(180.), instant(0));
        timeline.seek(90., instant(10)).unwrap();

        assert!(timeline.is_playing());
        assert_eq!(timeline.position(instant(10)), Some(90.));

        timeline.pause(instant(20)).unwrap();
        timeline.seek(5., instant(30)).unwrap();

        assert!(!timeline.is_playing());
        assert_eq!(timeline.position(instant(60)), Some(5.));
        // The pause instant moves to the seek instant
        assert_eq!(timeline.paused_at(), Some(instant(30)));
    }

    #[test]
    fn seek_rejects_positions_outside_the_item() {
        let mut timeline = Timeline::new();

        timeline.start(Song(180.), instant(0));

        assert_eq!(
            timeline.seek(-1., instant(1)),
            Err(TimelineError::OutOfRange {
                position: -1.,
                duration: 180.
            })
        );

        assert_eq!(
            timeline.seek(181., instant(1)),
            Err(TimelineError::OutOfRange {
                position: 181.,
                duration: 180.
            })
        );
    }

    #[test]
    fn transitions_reject_wrong_states() {
        let mut timeline: Timeline<Song> = Timeline::new();

        assert_eq!(timeline.pause(instant(0)), Err(TimelineError::Empty));
        assert_eq!(timeline.resume(instant(0)), Err(TimelineError::Empty));
        assert_eq!(timeline.seek(0., instant(0)), Err(TimelineError::Empty));

        timeline.start(Song(180.), instant(0));
        assert_eq!(
            timeline.resume(instant(1)),
            Err(TimelineError::AlreadyPlaying)
        );

        timeline.pause(instant(2)).unwrap();
        assert_eq!(timeline.pause(instant(3)), Err(TimelineError::NotPlaying));
    }

    #[test]
    fn clear_returns_to_idle() {
        let mut timeline = Timeline::new();

        timeline.start(Song(180.), instant(0));
        timeline.clear();

        assert!(timeline.item().is_none());
        assert!(timeline.position(instant(10)).is_none());
        assert!(timeline.started_at().is_none());
    }
}
