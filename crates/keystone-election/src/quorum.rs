//! Quorum membership and the majority predicate.
//!
//! The election never hardcodes "n/2 + 1": every quorum decision goes
//! through a [`QuorumVerifier`], so a reconfiguration can swap the
//! membership (and an oracle-backed verifier can arbitrate 2-node
//! ensembles) without touching the state machine.
//!
//! Configs travel on the wire as a UTF-8 properties block:
//!
//! ```text
//! server.1=10.0.0.1:2888:3888:participant
//! server.2=10.0.0.2:2888:3888:participant
//! server.3=10.0.0.3:2888:3888:observer
//! version=1b
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::ElectionError;
use crate::peer::LearnerType;
use crate::tracker::VoteTracker;
use crate::Sid;

/// Pluggable majority predicate over a membership view.
pub trait QuorumVerifier: Send + Sync {
    /// Voting weight of a sid. Zero means non-voter.
    fn weight(&self, sid: Sid) -> i64;

    /// Whether the given ack set constitutes a quorum.
    fn contains_quorum(&self, acks: &HashSet<Sid>) -> bool;

    /// Sids allowed to vote under this config.
    fn voting_members(&self) -> &HashSet<Sid>;

    /// Monotonically increasing config version.
    fn version(&self) -> i64;

    /// Serialized form carried in notification frames.
    fn to_config_string(&self) -> String;

    /// Whether this verifier defers tied decisions to an external arbiter.
    fn needs_oracle(&self) -> bool {
        false
    }

    /// Consults the arbiter for mastership. Only meaningful when
    /// [`needs_oracle`](Self::needs_oracle) is true.
    fn ask_oracle(&self) -> bool {
        true
    }

    /// Re-checks a previously computed vote set after a notification
    /// timeout. Only oracle-backed verifiers ever confirm here.
    fn revalidate_vote_set(&self, vote_set: Option<&VoteTracker>, extended_timeout: bool) -> bool {
        let _ = (vote_set, extended_timeout);
        false
    }
}

/// One `server.N=` entry of a quorum config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumServer {
    /// `host:quorum_port:election_port` — opaque to the election itself,
    /// the transport resolves it.
    pub addr: String,
    /// Participant or observer.
    pub role: LearnerType,
}

/// Simple majority over the participant sids of a config.
#[derive(Debug, Clone)]
pub struct MajorityQuorum {
    servers: BTreeMap<Sid, QuorumServer>,
    voters: HashSet<Sid>,
    version: i64,
}

impl MajorityQuorum {
    /// Builds a config from explicit server entries.
    pub fn from_servers(servers: BTreeMap<Sid, QuorumServer>, version: i64) -> Self {
        let voters = servers
            .iter()
            .filter(|(_, s)| s.role == LearnerType::Participant)
            .map(|(sid, _)| *sid)
            .collect();
        Self {
            servers,
            voters,
            version,
        }
    }

    /// Convenience: a version-0 config of participants with placeholder
    /// addresses. Addresses are opaque to the election, so simulations and
    /// tests that run over an in-process transport never resolve them.
    pub fn with_voters(sids: impl IntoIterator<Item = Sid>) -> Self {
        let servers = sids
            .into_iter()
            .map(|sid| {
                (
                    sid,
                    QuorumServer {
                        addr: format!("127.0.0.1:{}:{}", 2888 + sid, 3888 + sid),
                        role: LearnerType::Participant,
                    },
                )
            })
            .collect();
        Self::from_servers(servers, 0)
    }

    /// Parses the properties block described in the module docs.
    pub fn parse(config: &str) -> Result<Self, ElectionError> {
        let mut servers = BTreeMap::new();
        let mut version = 0;

        for line in config.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(hex) = line.strip_prefix("version=") {
                version = i64::from_str_radix(hex.trim_start_matches("0x"), 16)
                    .map_err(|_| ElectionError::bad_config(format!("bad version '{hex}'")))?;
                continue;
            }
            let rest = line
                .strip_prefix("server.")
                .ok_or_else(|| ElectionError::bad_config(format!("unrecognized line '{line}'")))?;
            let (sid_str, spec) = rest
                .split_once('=')
                .ok_or_else(|| ElectionError::bad_config(format!("missing '=' in '{line}'")))?;
            let sid: Sid = sid_str
                .parse()
                .map_err(|_| ElectionError::bad_config(format!("bad sid '{sid_str}'")))?;

            // An optional ";client_addr" suffix may follow the server spec.
            let spec = spec.split(';').next().unwrap_or(spec);
            let parts: Vec<&str> = spec.split(':').collect();
            if parts.len() < 3 || parts.len() > 4 {
                return Err(ElectionError::bad_config(format!(
                    "expected host:port:port[:role], got '{spec}'"
                )));
            }
            let role = match parts.get(3).copied() {
                None | Some("participant") => LearnerType::Participant,
                Some("observer") => LearnerType::Observer,
                Some(other) => {
                    return Err(ElectionError::bad_config(format!("unknown role '{other}'")));
                }
            };
            servers.insert(
                sid,
                QuorumServer {
                    addr: parts[..3].join(":"),
                    role,
                },
            );
        }

        if servers.is_empty() {
            return Err(ElectionError::bad_config("config names no servers"));
        }
        Ok(Self::from_servers(servers, version))
    }

    /// All configured servers, voters and observers alike.
    pub fn servers(&self) -> &BTreeMap<Sid, QuorumServer> {
        &self.servers
    }

    fn voting_acks(&self, acks: &HashSet<Sid>) -> usize {
        acks.iter().filter(|sid| self.voters.contains(*sid)).count()
    }
}

impl QuorumVerifier for MajorityQuorum {
    fn weight(&self, sid: Sid) -> i64 {
        if self.voters.contains(&sid) {
            1
        } else {
            0
        }
    }

    fn contains_quorum(&self, acks: &HashSet<Sid>) -> bool {
        self.voting_acks(acks) > self.voters.len() / 2
    }

    fn voting_members(&self) -> &HashSet<Sid> {
        &self.voters
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn to_config_string(&self) -> String {
        let mut out = String::new();
        for (sid, server) in &self.servers {
            let role = match server.role {
                LearnerType::Participant => "participant",
                LearnerType::Observer => "observer",
            };
            out.push_str(&format!("server.{sid}={}:{role}\n", server.addr));
        }
        out.push_str(&format!("version={:x}", self.version));
        out
    }
}

/// External arbiter consulted by [`OracleMajority`] when exactly half of
/// the voters acknowledge a candidate.
pub trait Oracle: Send + Sync {
    /// Whether the arbiter grants mastership to this side.
    fn grants_mastership(&self) -> bool;
}

/// Majority verifier with an external tie-breaker for even splits.
///
/// A 2-node ensemble can never assemble a strict majority once one node is
/// down; the arbiter decides whether the surviving node may make progress.
pub struct OracleMajority {
    inner: MajorityQuorum,
    oracle: Arc<dyn Oracle>,
}

impl OracleMajority {
    pub fn new(inner: MajorityQuorum, oracle: Arc<dyn Oracle>) -> Self {
        Self { inner, oracle }
    }
}

impl QuorumVerifier for OracleMajority {
    fn weight(&self, sid: Sid) -> i64 {
        self.inner.weight(sid)
    }

    fn contains_quorum(&self, acks: &HashSet<Sid>) -> bool {
        let votes = self.inner.voting_acks(acks);
        let total = self.inner.voters.len();
        if 2 * votes > total {
            return true;
        }
        // Exactly half: the arbiter owns the decision.
        2 * votes == total && votes > 0 && self.oracle.grants_mastership()
    }

    fn voting_members(&self) -> &HashSet<Sid> {
        self.inner.voting_members()
    }

    fn version(&self) -> i64 {
        self.inner.version()
    }

    fn to_config_string(&self) -> String {
        self.inner.to_config_string()
    }

    fn needs_oracle(&self) -> bool {
        true
    }

    fn ask_oracle(&self) -> bool {
        self.oracle.grants_mastership()
    }

    fn revalidate_vote_set(&self, vote_set: Option<&VoteTracker>, extended_timeout: bool) -> bool {
        extended_timeout && vote_set.is_some_and(|vs| vs.has_all_quorums())
    }
}
