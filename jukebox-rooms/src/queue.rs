use std::collections::{HashMap, HashSet};

use crate::{PrimaryKey, Track, TrackData};

/// The voting-ranked queue of a single room's tracks.
///
/// This is pure bookkeeping with no side effects: vote mutations recount the
/// score from the vote set and report whether the resulting order changed.
/// Callers are expected to hold their room's lock around mutations, which
/// makes every recount observe the vote set at commit time.
#[derive(Debug, Default)]
pub struct RankedQueue {
    /// Kept in insertion order, which is the final ranking tie-break.
    tracks: Vec<Track>,
    votes: HashMap<PrimaryKey, HashSet<PrimaryKey>>,
}

/// The result of a vote mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteOutcome {
    /// False when the vote already existed (or didn't, for removals),
    /// making the call a benign no-op.
    pub applied: bool,
    /// The score recounted from the vote set after the mutation.
    pub new_score: usize,
    /// Whether the full queue ordering changed as a result. Ties can shuffle
    /// positions even when only one track's score moved, so this compares
    /// complete orderings rather than the mutated track alone.
    pub order_changed: bool,
}

impl RankedQueue {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a track to the back of the arrival order with a score counted
    /// from any votes already registered for it.
    pub fn insert(&mut self, data: TrackData) {
        let id = data.id;
        let mut track = Track::new(data);

        track.vote_score = self.votes.get(&id).map(|v| v.len()).unwrap_or_default();
        self.tracks.push(track);
    }

    /// Removes a track and its votes, returning the track if it existed.
    pub fn remove(&mut self, track_id: PrimaryKey) -> Option<Track> {
        let index = self.tracks.iter().position(|t| t.id() == track_id)?;

        self.votes.remove(&track_id);
        Some(self.tracks.remove(index))
    }

    pub fn get(&self, track_id: PrimaryKey) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The tracks in ranked order.
    pub fn in_order(&self) -> Vec<Track> {
        order(&self.tracks)
    }

    /// The ranked order as track ids.
    pub fn ordering(&self) -> Vec<PrimaryKey> {
        self.in_order().iter().map(|t| t.id()).collect()
    }

    /// The highest-ranked track other than the given one, which is what a
    /// skip advances to.
    pub fn next_after(&self, current: PrimaryKey) -> Option<Track> {
        self.in_order().into_iter().find(|t| t.id() != current)
    }

    /// Registers a vote, returning [None] if the track is not in the queue.
    /// Voting twice is reported as an unapplied outcome rather than an error.
    pub fn register_vote(&mut self, track_id: PrimaryKey, voter: PrimaryKey) -> Option<VoteOutcome> {
        self.get(track_id)?;

        let before = self.ordering();
        let applied = self.votes.entry(track_id).or_default().insert(voter);
        let new_score = self.recount(track_id);

        Some(VoteOutcome {
            applied,
            new_score,
            order_changed: applied && self.ordering() != before,
        })
    }

    /// Removes a vote, returning [None] if the track is not in the queue.
    /// Removing a vote that was never cast is an unapplied outcome.
    pub fn unregister_vote(
        &mut self,
        track_id: PrimaryKey,
        voter: PrimaryKey,
    ) -> Option<VoteOutcome> {
        self.get(track_id)?;

        let before = self.ordering();
        let applied = self
            .votes
            .get_mut(&track_id)
            .map(|v| v.remove(&voter))
            .unwrap_or_default();
        let new_score = self.recount(track_id);

        Some(VoteOutcome {
            applied,
            new_score,
            order_changed: applied && self.ordering() != before,
        })
    }

    /// Restores a vote set without emitting outcomes, used when rebuilding a
    /// room from persisted records.
    pub fn restore_vote(&mut self, track_id: PrimaryKey, voter: PrimaryKey) {
        self.votes.entry(track_id).or_default().insert(voter);
        self.recount(track_id);
    }

    /// Writes the track's score as a fresh count of its vote set. The score
    /// must never be derived from its previous value, so that concurrent
    /// add/remove interleavings converge on the true cardinality.
    fn recount(&mut self, track_id: PrimaryKey) -> usize {
        let count = self.votes.get(&track_id).map(|v| v.len()).unwrap_or_default();

        if let Some(track) = self.tracks.iter_mut().find(|t| t.id() == track_id) {
            track.vote_score = count;
        }

        count
    }
}

/// Orders tracks by vote score descending, then arrival time ascending.
/// Stable beyond that: tracks that tie completely keep the order they were
/// given in. Pure and safe to call from any number of readers.
pub fn order(tracks: &[Track]) -> Vec<Track> {
    let mut ordered = tracks.to_vec();

    ordered.sort_by(|a, b| {
        b.vote_score
            .cmp(&a.vote_score)
            .then(a.data.created_at.cmp(&b.data.created_at))
    });

    ordered
}
