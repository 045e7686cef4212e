//! keystone-election: fast leader election for the keystone coordination
//! service.
//!
//! Given an ensemble of peers that each hold a persistent transaction log,
//! this crate lets the live peers agree on a single leader — the peer whose
//! log is at least as up-to-date as any other majority-reachable peer — so
//! the service can start log synchronization and request ordering under it.
//!
//! # Architecture
//!
//! - **Wire codec**: compact big-endian notification frames, three
//!   generations accepted on decode
//! - **Messaging workers**: a send and a receive task bridging the
//!   [`Transport`] to the election core over FIFO queues
//! - **Election core**: the `look_for_leader` state machine — proposal,
//!   logical round clock, per-sender vote sets, quorum detection with a
//!   finalization window
//! - **Quorum layer**: pluggable majority predicates, including an
//!   oracle-arbitrated variant for 2-node ensembles, evaluated across
//!   overlapping configs during reconfiguration
//!
//! The TCP link layer, persistent state, and post-election synchronization
//! stay outside: the crate consumes them through the [`Transport`] and
//! [`QuorumPeer`] traits.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use keystone_election::{
//!     ElectionConfig, FastLeaderElection, InMemoryNetwork, LocalPeer, MajorityQuorum,
//! };
//!
//! let quorum = Arc::new(MajorityQuorum::with_voters([1, 2, 3]));
//! let network = InMemoryNetwork::new();
//! let peer = Arc::new(LocalPeer::new(1, quorum));
//! let election = FastLeaderElection::new(peer, network.register(1), ElectionConfig::default());
//! election.start();
//! let winner = election.look_for_leader().await;
//! ```

mod config;
mod election;
mod error;
mod message;
mod peer;
mod quorum;
mod tracker;
mod transport;
mod vote;

/// Server identifier, unique per peer. `i64::MIN` is reserved as the
/// "no candidate" sentinel used by non-participants.
pub type Sid = i64;

pub use config::ElectionConfig;
pub use election::FastLeaderElection;
pub use error::ElectionError;
pub use message::{encode_legacy, Notification, ToSend, WireNotification, CURRENT_VERSION};
pub use peer::{LearnerType, LocalPeer, PeerState, QuorumPeer};
pub use quorum::{MajorityQuorum, Oracle, OracleMajority, QuorumServer, QuorumVerifier};
pub use tracker::VoteTracker;
pub use transport::{InMemoryNetwork, InMemoryTransport, Transport};
pub use vote::Vote;
