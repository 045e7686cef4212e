//! The parent-peer seam.
//!
//! The election core never touches process-global state: everything it
//! needs from the hosting peer — identity, log position, committed vote,
//! membership views, reconfiguration — comes through [`QuorumPeer`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ElectionError;
use crate::quorum::QuorumVerifier;
use crate::tracker::VoteTracker;
use crate::vote::Vote;
use crate::Sid;

/// Lifecycle state of a peer, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Searching for a leader.
    Looking,
    /// Synchronizing with an elected leader.
    Following,
    /// Elected leader.
    Leading,
    /// Non-voting learner.
    Observing,
}

impl PeerState {
    /// Maps a wire integer to a peer state. Unknown values yield `None`
    /// and the frame is discarded by the receive worker.
    pub fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(PeerState::Looking),
            1 => Some(PeerState::Following),
            2 => Some(PeerState::Leading),
            3 => Some(PeerState::Observing),
            _ => None,
        }
    }

    /// The wire integer for this state.
    pub fn to_wire(self) -> i32 {
        match self {
            PeerState::Looking => 0,
            PeerState::Following => 1,
            PeerState::Leading => 2,
            PeerState::Observing => 3,
        }
    }
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PeerState::Looking => "LOOKING",
            PeerState::Following => "FOLLOWING",
            PeerState::Leading => "LEADING",
            PeerState::Observing => "OBSERVING",
        };
        f.write_str(s)
    }
}

/// Whether a peer votes or only learns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerType {
    /// Full voting member.
    Participant,
    /// Learner that never votes and never proposes itself.
    Observer,
}

/// Everything the election borrows from the peer that hosts it.
///
/// Implementations use interior mutability; the trait is shared as
/// `Arc<dyn QuorumPeer>` between the core and both workers.
pub trait QuorumPeer: Send + Sync {
    /// This peer's server id.
    fn id(&self) -> Sid;

    /// Participant or observer.
    fn learner_type(&self) -> LearnerType;

    /// Highest transaction id in the local log.
    fn last_logged_zxid(&self) -> i64;

    /// The accepted epoch from persistent state.
    fn current_epoch(&self) -> i64;

    /// Current lifecycle state.
    fn peer_state(&self) -> PeerState;

    /// Transitions the peer's lifecycle state.
    fn set_peer_state(&self, state: PeerState);

    /// The committed vote, used when replying to peers that are still
    /// looking after this peer has settled.
    fn current_vote(&self) -> Vote;

    /// Union of voter sids across the current and any pending config.
    fn voting_view(&self) -> HashSet<Sid>;

    /// The active quorum verifier.
    fn quorum_verifier(&self) -> Arc<dyn QuorumVerifier>;

    /// A pending reconfig's verifier, if one has been proposed but not
    /// yet activated.
    fn last_seen_quorum_verifier(&self) -> Option<Arc<dyn QuorumVerifier>>;

    /// Parses a serialized quorum config received on the wire.
    fn config_from_string(&self, config: &str) -> Result<Arc<dyn QuorumVerifier>, ElectionError>;

    /// Applies a reconfiguration learned from a notification frame.
    ///
    /// Returns true when the new config actually changed the membership
    /// view (in which case a LOOKING peer must abandon its current round).
    fn process_reconfig(&self, verifier: Arc<dyn QuorumVerifier>) -> bool;

    /// Leader-subsystem hook: a peer that is still LOOKING contacted us
    /// while we lead; the leader will re-send its ballot.
    fn report_looking_sid(&self, _sid: Sid) {}

    /// Leader-subsystem hook: the ack set that elected this peer, handed
    /// over once after the election concludes.
    fn set_leading_vote_set(&self, _vote_set: VoteTracker) {}
}

/// A self-contained [`QuorumPeer`] backed by in-process state.
///
/// Embeddings that already have a peer object implement the trait over it;
/// simulations and tests use this one directly.
pub struct LocalPeer {
    id: Sid,
    learner_type: LearnerType,
    last_logged_zxid: std::sync::atomic::AtomicI64,
    current_epoch: std::sync::atomic::AtomicI64,
    state: std::sync::Mutex<PeerState>,
    current_vote: std::sync::Mutex<Vote>,
    quorum_verifier: std::sync::Mutex<Arc<dyn QuorumVerifier>>,
    last_seen_verifier: std::sync::Mutex<Option<Arc<dyn QuorumVerifier>>>,
    looking_sids: std::sync::Mutex<Vec<Sid>>,
    leading_vote_set: std::sync::Mutex<Option<VoteTracker>>,
}

impl LocalPeer {
    /// A participant with an empty log at epoch zero.
    pub fn new(id: Sid, verifier: Arc<dyn QuorumVerifier>) -> Self {
        Self {
            id,
            learner_type: LearnerType::Participant,
            last_logged_zxid: std::sync::atomic::AtomicI64::new(0),
            current_epoch: std::sync::atomic::AtomicI64::new(0),
            state: std::sync::Mutex::new(PeerState::Looking),
            current_vote: std::sync::Mutex::new(Vote::new(id, 0, 0)),
            quorum_verifier: std::sync::Mutex::new(verifier),
            last_seen_verifier: std::sync::Mutex::new(None),
            looking_sids: std::sync::Mutex::new(Vec::new()),
            leading_vote_set: std::sync::Mutex::new(None),
        }
    }

    pub fn observer(id: Sid, verifier: Arc<dyn QuorumVerifier>) -> Self {
        let mut peer = Self::new(id, verifier);
        peer.learner_type = LearnerType::Observer;
        peer
    }

    pub fn set_last_logged_zxid(&self, zxid: i64) {
        self.last_logged_zxid
            .store(zxid, std::sync::atomic::Ordering::SeqCst);
        let mut vote = self.current_vote.lock().unwrap();
        vote.zxid = zxid;
    }

    pub fn set_current_epoch(&self, epoch: i64) {
        self.current_epoch
            .store(epoch, std::sync::atomic::Ordering::SeqCst);
        let mut vote = self.current_vote.lock().unwrap();
        vote.peer_epoch = epoch;
    }

    pub fn set_current_vote(&self, vote: Vote) {
        *self.current_vote.lock().unwrap() = vote;
    }

    pub fn set_last_seen_quorum_verifier(&self, verifier: Arc<dyn QuorumVerifier>) {
        *self.last_seen_verifier.lock().unwrap() = Some(verifier);
    }

    /// Sids that contacted this peer while it was leading.
    pub fn looking_sids(&self) -> Vec<Sid> {
        self.looking_sids.lock().unwrap().clone()
    }

    /// The ack set handed over by the election, if this peer won one.
    pub fn leading_vote_set(&self) -> Option<VoteTracker> {
        self.leading_vote_set.lock().unwrap().clone()
    }
}

impl QuorumPeer for LocalPeer {
    fn id(&self) -> Sid {
        self.id
    }

    fn learner_type(&self) -> LearnerType {
        self.learner_type
    }

    fn last_logged_zxid(&self) -> i64 {
        self.last_logged_zxid.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn current_epoch(&self) -> i64 {
        self.current_epoch.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn peer_state(&self) -> PeerState {
        *self.state.lock().unwrap()
    }

    fn set_peer_state(&self, state: PeerState) {
        *self.state.lock().unwrap() = state;
    }

    fn current_vote(&self) -> Vote {
        *self.current_vote.lock().unwrap()
    }

    fn voting_view(&self) -> HashSet<Sid> {
        let mut view: HashSet<Sid> = self
            .quorum_verifier
            .lock()
            .unwrap()
            .voting_members()
            .clone();
        if let Some(next) = self.last_seen_verifier.lock().unwrap().as_ref() {
            view.extend(next.voting_members());
        }
        view
    }

    fn quorum_verifier(&self) -> Arc<dyn QuorumVerifier> {
        Arc::clone(&self.quorum_verifier.lock().unwrap())
    }

    fn last_seen_quorum_verifier(&self) -> Option<Arc<dyn QuorumVerifier>> {
        self.last_seen_verifier.lock().unwrap().clone()
    }

    fn config_from_string(&self, config: &str) -> Result<Arc<dyn QuorumVerifier>, ElectionError> {
        Ok(Arc::new(crate::quorum::MajorityQuorum::parse(config)?))
    }

    fn process_reconfig(&self, verifier: Arc<dyn QuorumVerifier>) -> bool {
        let mut current = self.quorum_verifier.lock().unwrap();
        let changed = current.to_config_string() != verifier.to_config_string();
        *current = verifier;
        changed
    }

    fn report_looking_sid(&self, sid: Sid) {
        self.looking_sids.lock().unwrap().push(sid);
    }

    fn set_leading_vote_set(&self, vote_set: VoteTracker) {
        *self.leading_vote_set.lock().unwrap() = Some(vote_set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::MajorityQuorum;

    #[test]
    fn local_peer_reconfig_reports_real_changes_only() {
        let peer = LocalPeer::new(1, Arc::new(MajorityQuorum::with_voters([1, 2, 3])));

        let same = peer
            .config_from_string(&peer.quorum_verifier().to_config_string())
            .unwrap();
        assert!(!peer.process_reconfig(same), "identical config is not a change");

        let grown = peer
            .config_from_string(
                "server.1=10.0.0.1:2888:3888\n\
                 server.2=10.0.0.2:2888:3888\n\
                 server.3=10.0.0.3:2888:3888\n\
                 server.4=10.0.0.4:2888:3888\n\
                 version=1",
            )
            .unwrap();
        assert!(peer.process_reconfig(grown));
        assert_eq!(peer.quorum_verifier().voting_members().len(), 4);
    }

    #[test]
    fn voting_view_unions_current_and_pending_configs() {
        let peer = LocalPeer::new(1, Arc::new(MajorityQuorum::with_voters([1, 2, 3])));
        assert_eq!(peer.voting_view().len(), 3);

        peer.set_last_seen_quorum_verifier(Arc::new(MajorityQuorum::with_voters([2, 3, 4, 5])));
        let view = peer.voting_view();
        assert_eq!(view.len(), 5);
        assert!(view.contains(&1) && view.contains(&5));
    }

    #[test]
    fn local_peer_tracks_log_position_in_current_vote() {
        let peer = LocalPeer::new(2, Arc::new(MajorityQuorum::with_voters([1, 2, 3])));
        peer.set_last_logged_zxid(0x200000001);
        peer.set_current_epoch(2);
        let vote = peer.current_vote();
        assert_eq!(vote.leader, 2);
        assert_eq!(vote.zxid, 0x200000001);
        assert_eq!(vote.peer_epoch, 2);
    }

    #[test]
    fn wire_mapping_roundtrip() {
        for state in [
            PeerState::Looking,
            PeerState::Following,
            PeerState::Leading,
            PeerState::Observing,
        ] {
            assert_eq!(PeerState::from_wire(state.to_wire()), Some(state));
        }
    }

    #[test]
    fn unknown_wire_state_rejected() {
        assert_eq!(PeerState::from_wire(4), None);
        assert_eq!(PeerState::from_wire(-1), None);
        assert_eq!(PeerState::from_wire(i32::MAX), None);
    }
}
