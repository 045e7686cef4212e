//! Ballots exchanged during leader election.

use crate::peer::PeerState;
use crate::Sid;

/// A ballot naming a proposed (or committed) leader.
///
/// `election_epoch` labels the round the ballot was cast in and is `-1`
/// when the ballot was rebuilt from the local proposal outside of any
/// particular round. Two ballots name the same candidate when their
/// `(leader, zxid, peer_epoch)` triples match; see [`Vote::same_candidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    /// Proposed leader sid.
    pub leader: Sid,
    /// Last transaction id in the proposed leader's log.
    pub zxid: i64,
    /// Election round the ballot belongs to.
    pub election_epoch: i64,
    /// Accepted leader-tenure counter of the proposed leader.
    pub peer_epoch: i64,
    /// State of the peer that cast the ballot.
    pub state: PeerState,
    /// Wire format version the ballot arrived with (0 for local ballots).
    pub version: i32,
}

impl Vote {
    /// A ballot outside any round, as held in the local proposal.
    pub fn new(leader: Sid, zxid: i64, peer_epoch: i64) -> Self {
        Self {
            leader,
            zxid,
            election_epoch: -1,
            peer_epoch,
            state: PeerState::Looking,
            version: 0,
        }
    }

    /// A ballot cast in a specific round.
    pub fn with_epoch(leader: Sid, zxid: i64, election_epoch: i64, peer_epoch: i64) -> Self {
        Self {
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            state: PeerState::Looking,
            version: 0,
        }
    }

    /// A ballot carrying the caster's state, as recorded from peers that
    /// already follow or lead.
    pub fn with_state(
        leader: Sid,
        zxid: i64,
        election_epoch: i64,
        peer_epoch: i64,
        state: PeerState,
    ) -> Self {
        Self {
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            state,
            version: 0,
        }
    }

    /// Whether two ballots name the same candidate.
    ///
    /// Round labels and caster state are deliberately ignored: peers in
    /// different rounds (or already following) still count toward the same
    /// candidate as long as they agree on who leads and how far its log
    /// reaches.
    pub fn same_candidate(&self, other: &Vote) -> bool {
        self.leader == other.leader
            && self.zxid == other.zxid
            && self.peer_epoch == other.peer_epoch
    }
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(leader={}, zxid=0x{:x}, round=0x{:x}, peerEpoch=0x{:x})",
            self.leader, self.zxid, self.election_epoch, self.peer_epoch
        )
    }
}
