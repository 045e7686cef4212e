//! Ack bookkeeping for a candidate vote.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::quorum::QuorumVerifier;
use crate::vote::Vote;
use crate::Sid;

/// Tracks which senders acknowledged a candidate, under the current
/// membership view and, during a reconfiguration, the pending one too.
///
/// The candidate only wins once it holds a quorum under *every* seeded
/// verifier. That is what makes an in-flight membership change safe: no
/// vote can conclude with a majority in only one of the two worlds.
#[derive(Clone)]
pub struct VoteTracker {
    views: Vec<(Arc<dyn QuorumVerifier>, HashSet<Sid>)>,
}

impl VoteTracker {
    /// A tracker with no acks yet.
    pub fn new(current: Arc<dyn QuorumVerifier>, pending: Option<Arc<dyn QuorumVerifier>>) -> Self {
        let mut views = vec![(current, HashSet::new())];
        if let Some(qv) = pending {
            views.push((qv, HashSet::new()));
        }
        Self { views }
    }

    /// Seeds a tracker and records an ack for every vote in `votes` that
    /// names the same candidate as `candidate`.
    pub fn for_candidate(
        current: Arc<dyn QuorumVerifier>,
        pending: Option<Arc<dyn QuorumVerifier>>,
        votes: &HashMap<Sid, Vote>,
        candidate: &Vote,
    ) -> Self {
        let mut tracker = Self::new(current, pending);
        for (sid, vote) in votes {
            if candidate.same_candidate(vote) {
                tracker.add_ack(*sid);
            }
        }
        tracker
    }

    /// Records an ack from `sid` in every view.
    pub fn add_ack(&mut self, sid: Sid) {
        for (_, acks) in &mut self.views {
            acks.insert(sid);
        }
    }

    /// True iff every seeded verifier reports a quorum of acks.
    pub fn has_all_quorums(&self) -> bool {
        self.views.iter().all(|(qv, acks)| qv.contains_quorum(acks))
    }

    /// Acked sids under the current-config view.
    pub fn ack_set(&self) -> &HashSet<Sid> {
        &self.views[0].1
    }
}

impl std::fmt::Debug for VoteTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("VoteTracker");
        for (i, (qv, acks)) in self.views.iter().enumerate() {
            d.field(&format!("view{i}_version"), &qv.version());
            d.field(&format!("view{i}_acks"), acks);
        }
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::MajorityQuorum;

    fn qv(sids: &[Sid]) -> Arc<dyn QuorumVerifier> {
        Arc::new(MajorityQuorum::with_voters(sids.iter().copied()))
    }

    #[test]
    fn single_view_quorum() {
        let mut tracker = VoteTracker::new(qv(&[1, 2, 3]), None);
        tracker.add_ack(1);
        assert!(!tracker.has_all_quorums());
        tracker.add_ack(2);
        assert!(tracker.has_all_quorums());
    }

    #[test]
    fn dual_view_requires_both_quorums() {
        // Current config {1,2,3}, pending config {1,2,3,4,5}.
        let mut tracker = VoteTracker::new(qv(&[1, 2, 3]), Some(qv(&[1, 2, 3, 4, 5])));
        tracker.add_ack(1);
        tracker.add_ack(2);
        // Quorum of the current view but only 2 of 5 in the pending one.
        assert!(!tracker.has_all_quorums());
        tracker.add_ack(4);
        assert!(tracker.has_all_quorums());
    }

    #[test]
    fn for_candidate_counts_matching_votes_only() {
        let mut votes = HashMap::new();
        votes.insert(1, Vote::with_epoch(3, 5, 1, 0));
        votes.insert(2, Vote::with_epoch(3, 5, 1, 0));
        votes.insert(3, Vote::with_epoch(2, 9, 1, 0));

        let candidate = Vote::with_epoch(3, 5, 1, 0);
        let tracker = VoteTracker::for_candidate(qv(&[1, 2, 3]), None, &votes, &candidate);
        assert!(tracker.has_all_quorums());
        assert_eq!(tracker.ack_set().len(), 2);

        let loser = Vote::with_epoch(2, 9, 1, 0);
        let tracker = VoteTracker::for_candidate(qv(&[1, 2, 3]), None, &votes, &loser);
        assert!(!tracker.has_all_quorums());
    }

    #[test]
    fn votes_in_other_rounds_still_ack_the_same_candidate() {
        let mut votes = HashMap::new();
        votes.insert(1, Vote::with_epoch(2, 5, 6, 1));
        votes.insert(2, Vote::with_epoch(2, 5, 7, 1));

        let candidate = Vote::with_epoch(2, 5, 7, 1);
        let tracker = VoteTracker::for_candidate(qv(&[1, 2, 3]), None, &votes, &candidate);
        assert!(tracker.has_all_quorums());
    }

    #[test]
    fn duplicate_acks_count_once() {
        let mut tracker = VoteTracker::new(qv(&[1, 2, 3]), None);
        tracker.add_ack(1);
        tracker.add_ack(1);
        assert!(!tracker.has_all_quorums());
    }
}
