//! The election state machine and its messaging workers.
//!
//! Three tasks cooperate per peer:
//!
//! 1. the **send worker** drains the outbound queue and encodes frames for
//!    the transport,
//! 2. the **receive worker** decodes inbound frames, applies piggybacked
//!    reconfigurations, answers peers that are behind or excluded, and
//!    feeds the core's inbound queue,
//! 3. the **core** ([`FastLeaderElection::look_for_leader`]) runs the vote
//!    exchange until the ensemble agrees on a leader.
//!
//! The exchange is push-based: every change of the local proposal is
//! broadcast to the full voting view, and received ballots are compared by
//! `(peer_epoch, zxid, leader)` so that the most advanced log always wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ElectionConfig;
use crate::error::ElectionError;
use crate::message::{Notification, ToSend, WireNotification, MIN_FRAME_LEN};
use crate::peer::{LearnerType, PeerState, QuorumPeer};
use crate::tracker::VoteTracker;
use crate::transport::Transport;
use crate::vote::Vote;
use crate::Sid;

/// How long the workers block on their queues before re-checking the stop
/// flag.
const WORKER_POLL: Duration = Duration::from_secs(3);

/// The proposal triple, guarded by the core monitor.
#[derive(Debug, Clone, Copy)]
struct Proposal {
    leader: Sid,
    zxid: i64,
    peer_epoch: i64,
}

/// State shared between the core and both workers.
struct Core {
    peer: Arc<dyn QuorumPeer>,
    transport: Arc<dyn Transport>,
    config: ElectionConfig,
    /// Election round counter. Single writer (the core); the receive
    /// worker reads it for replies to lagging peers.
    logical_clock: AtomicI64,
    proposal: Mutex<Proposal>,
    /// Ack set that elected the local peer, held until the leader
    /// subsystem picks it up.
    leading_vote_set: Mutex<Option<VoteTracker>>,
    stop: AtomicBool,
    send_tx: mpsc::UnboundedSender<ToSend>,
    recv_tx: mpsc::UnboundedSender<Notification>,
}

impl Core {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn clock(&self) -> i64 {
        self.logical_clock.load(Ordering::SeqCst)
    }

    fn proposal(&self) -> Proposal {
        *self.proposal.lock().unwrap()
    }

    fn update_proposal(&self, leader: Sid, zxid: i64, peer_epoch: i64) {
        let mut proposal = self.proposal.lock().unwrap();
        debug!(
            "updating proposal: {} (new leader), 0x{:x} (new zxid), {} (old leader), 0x{:x} (old zxid)",
            leader, zxid, proposal.leader, proposal.zxid
        );
        *proposal = Proposal {
            leader,
            zxid,
            peer_epoch,
        };
    }

    fn get_vote(&self) -> Vote {
        let proposal = self.proposal.lock().unwrap();
        Vote::new(proposal.leader, proposal.zxid, proposal.peer_epoch)
    }

    fn valid_voter(&self, sid: Sid) -> bool {
        self.peer.voting_view().contains(&sid)
    }

    /// Initial leader proposal: ourselves, unless we cannot vote.
    fn init_id(&self) -> Sid {
        if self
            .peer
            .quorum_verifier()
            .voting_members()
            .contains(&self.peer.id())
        {
            self.peer.id()
        } else {
            i64::MIN
        }
    }

    fn init_last_logged_zxid(&self) -> i64 {
        if self.peer.learner_type() == LearnerType::Participant {
            self.peer.last_logged_zxid()
        } else {
            i64::MIN
        }
    }

    fn init_peer_epoch(&self) -> i64 {
        if self.peer.learner_type() == LearnerType::Participant {
            self.peer.current_epoch()
        } else {
            i64::MIN
        }
    }

    /// FOLLOWING for participants, OBSERVING for observers.
    fn learning_state(&self) -> PeerState {
        if self.peer.learner_type() == LearnerType::Participant {
            PeerState::Following
        } else {
            PeerState::Observing
        }
    }

    /// Whether the candidate ballot beats the current one. A candidate
    /// with zero voting weight never wins.
    fn total_order_predicate(
        &self,
        new_leader: Sid,
        new_zxid: i64,
        new_epoch: i64,
        cur_leader: Sid,
        cur_zxid: i64,
        cur_epoch: i64,
    ) -> bool {
        if self.peer.quorum_verifier().weight(new_leader) == 0 {
            return false;
        }
        new_epoch > cur_epoch
            || (new_epoch == cur_epoch
                && (new_zxid > cur_zxid || (new_zxid == cur_zxid && new_leader > cur_leader)))
    }

    /// Collects acks for `candidate` under the current config and, during
    /// a reconfiguration, the pending one as well.
    fn vote_tracker(&self, votes: &HashMap<Sid, Vote>, candidate: &Vote) -> VoteTracker {
        let current = self.peer.quorum_verifier();
        let pending = self
            .peer
            .last_seen_quorum_verifier()
            .filter(|qv| qv.version() > current.version());
        VoteTracker::for_candidate(current, pending, votes, candidate)
    }

    /// Guards against re-electing a crashed leader: a remote leader must
    /// itself have acked that it is LEADING; electing ourselves must
    /// happen in the current round.
    fn check_leader(&self, votes: &HashMap<Sid, Vote>, leader: Sid, election_epoch: i64) -> bool {
        if leader != self.peer.id() {
            match votes.get(&leader) {
                None => false,
                Some(vote) => vote.state == PeerState::Leading,
            }
        } else {
            self.clock() == election_epoch
        }
    }

    /// Broadcasts the current proposal to every voter in the current and
    /// next config.
    fn send_notifications(&self) {
        let proposal = self.proposal();
        let clock = self.clock();
        for sid in self.peer.voting_view() {
            let qv = self.peer.quorum_verifier();
            debug!(
                "sending notification: {} (n.leader), 0x{:x} (n.zxid), 0x{:x} (n.round), {} (recipient), {} (myid), 0x{:x} (n.peerEpoch)",
                proposal.leader,
                proposal.zxid,
                clock,
                sid,
                self.peer.id(),
                proposal.peer_epoch
            );
            let _ = self.send_tx.send(ToSend {
                sid,
                leader: proposal.leader,
                zxid: proposal.zxid,
                election_epoch: clock,
                peer_epoch: proposal.peer_epoch,
                state: PeerState::Looking,
                config: Bytes::from(qv.to_config_string()),
            });
        }
    }

    /// Transitions the local peer for the elected leader; a win parks the
    /// ack set for the leader subsystem.
    fn set_peer_state_for(&self, proposed_leader: Sid, vote_set: Option<&VoteTracker>) {
        let state = if proposed_leader == self.peer.id() {
            PeerState::Leading
        } else {
            self.learning_state()
        };
        self.peer.set_peer_state(state);
        if state == PeerState::Leading {
            *self.leading_vote_set.lock().unwrap() = vote_set.cloned();
        }
    }

    fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        *self.proposal.lock().unwrap() = Proposal {
            leader: -1,
            zxid: -1,
            peer_epoch: -1,
        };
        *self.leading_vote_set.lock().unwrap() = None;
        debug!("shutting down transport");
        self.transport.halt();
        debug!("election is down");
    }
}

/// Fast leader election over a push-based notification exchange.
///
/// Construct once per peer, [`start`](Self::start) the workers, then call
/// [`look_for_leader`](Self::look_for_leader) every time the peer enters
/// the LOOKING state.
pub struct FastLeaderElection {
    core: Arc<Core>,
    recv_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Notification>>,
    send_rx: Mutex<Option<mpsc::UnboundedReceiver<ToSend>>>,
}

impl FastLeaderElection {
    pub fn new(
        peer: Arc<dyn QuorumPeer>,
        transport: Arc<dyn Transport>,
        config: ElectionConfig,
    ) -> Self {
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (recv_tx, recv_rx) = mpsc::unbounded_channel();
        let core = Arc::new(Core {
            peer,
            transport,
            config,
            logical_clock: AtomicI64::new(0),
            proposal: Mutex::new(Proposal {
                leader: -1,
                zxid: -1,
                peer_epoch: -1,
            }),
            leading_vote_set: Mutex::new(None),
            stop: AtomicBool::new(false),
            send_tx,
            recv_tx,
        });
        Self {
            core,
            recv_rx: tokio::sync::Mutex::new(recv_rx),
            send_rx: Mutex::new(Some(send_rx)),
        }
    }

    /// Spawns the send and receive workers onto the current runtime.
    /// Idempotent; both workers exit once [`shutdown`](Self::shutdown) is
    /// called.
    pub fn start(&self) {
        let Some(send_rx) = self.send_rx.lock().unwrap().take() else {
            return;
        };
        tokio::spawn(send_worker(Arc::clone(&self.core), send_rx));
        tokio::spawn(receive_worker(Arc::clone(&self.core)));
    }

    /// Stops all three loops and halts the transport. The workers exit at
    /// their next poll timeout.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    /// The current proposal as a ballot.
    pub fn get_vote(&self) -> Vote {
        self.core.get_vote()
    }

    /// The current election round.
    pub fn logical_clock(&self) -> i64 {
        self.core.clock()
    }

    /// Runs one election round and returns the winning ballot, or `None`
    /// when the election was shut down (directly, or because a
    /// reconfiguration invalidated the round).
    pub async fn look_for_leader(&self) -> Option<Vote> {
        let core = &self.core;
        let mut recv = self.recv_rx.lock().await;

        // Ballots of the current round, sender -> vote.
        let mut recvset: HashMap<Sid, Vote> = HashMap::new();
        // FOLLOWING/LEADING ballots from any round, for joining an
        // ensemble whose election we missed.
        let mut outofelection: HashMap<Sid, Vote> = HashMap::new();

        let mut not_timeout = core.config.min_notification_interval;
        // One-slot look-ahead for ballots pushed back out of the
        // finalization window.
        let mut pushback: Option<Notification> = None;
        // The tracker from the last LOOKING evaluation; consulted by the
        // oracle revalidation on timeouts.
        let mut vote_set: Option<VoteTracker> = None;

        {
            let mut proposal = core.proposal.lock().unwrap();
            core.logical_clock.fetch_add(1, Ordering::SeqCst);
            *proposal = Proposal {
                leader: core.init_id(),
                zxid: core.init_last_logged_zxid(),
                peer_epoch: core.init_peer_epoch(),
            };
        }
        info!(
            "new election round: my id = {}, proposed zxid = 0x{:x}",
            core.peer.id(),
            core.proposal().zxid
        );
        core.send_notifications();

        while core.peer.peer_state() == PeerState::Looking && !core.stopped() {
            let next = match pushback.take() {
                Some(n) => Some(n),
                None => timeout(not_timeout, recv.recv()).await.ok().flatten(),
            };

            let Some(n) = next else {
                // No ballots: either everything we queued went out and the
                // ensemble is quiet, or connections are gone.
                if core.transport.have_delivered() {
                    core.send_notifications();
                } else {
                    core.transport.connect_all().await;
                }
                not_timeout = (not_timeout * 2).min(core.config.max_notification_interval);

                // A mastership arbiter can conclude the round for us when
                // the other half of a 2-node ensemble is gone.
                let qv = core.peer.quorum_verifier();
                if qv.revalidate_vote_set(
                    vote_set.as_ref(),
                    not_timeout != core.config.min_notification_interval,
                ) {
                    let proposal = core.proposal();
                    core.set_peer_state_for(proposal.leader, vote_set.as_ref());
                    let end_vote = Vote::with_epoch(
                        proposal.leader,
                        proposal.zxid,
                        core.clock(),
                        proposal.peer_epoch,
                    );
                    self.leave_instance(&end_vote, &mut recv, &mut pushback);
                    return Some(end_vote);
                }

                info!("notification timeout: {} ms", not_timeout.as_millis());
                continue;
            };

            if !core.valid_voter(n.sid) || !core.valid_voter(n.leader) {
                if !core.valid_voter(n.leader) {
                    warn!(
                        "ignoring notification for non-member sid {} from sid {}",
                        n.leader, n.sid
                    );
                }
                if !core.valid_voter(n.sid) {
                    warn!(
                        "ignoring notification for sid {} from non-voter sid {}",
                        n.leader, n.sid
                    );
                }
                continue;
            }

            match n.state {
                PeerState::Looking => {
                    if core.init_last_logged_zxid() == -1 {
                        debug!("ignoring notification while our zxid is -1");
                        continue;
                    }
                    if n.zxid == -1 {
                        debug!("ignoring notification from member {} with -1 zxid", n.sid);
                        continue;
                    }

                    if n.election_epoch > core.clock() {
                        // The sender is in a newer round: join it and
                        // restart the comparison from our own identity.
                        core.logical_clock.store(n.election_epoch, Ordering::SeqCst);
                        recvset.clear();
                        if core.total_order_predicate(
                            n.leader,
                            n.zxid,
                            n.peer_epoch,
                            core.init_id(),
                            core.init_last_logged_zxid(),
                            core.init_peer_epoch(),
                        ) {
                            core.update_proposal(n.leader, n.zxid, n.peer_epoch);
                        } else {
                            core.update_proposal(
                                core.init_id(),
                                core.init_last_logged_zxid(),
                                core.init_peer_epoch(),
                            );
                        }
                        core.send_notifications();
                    } else if n.election_epoch < core.clock() {
                        debug!(
                            "notification round is stale: n.round = 0x{:x}, our round = 0x{:x}",
                            n.election_epoch,
                            core.clock()
                        );
                        continue;
                    } else {
                        let proposal = core.proposal();
                        if core.total_order_predicate(
                            n.leader,
                            n.zxid,
                            n.peer_epoch,
                            proposal.leader,
                            proposal.zxid,
                            proposal.peer_epoch,
                        ) {
                            core.update_proposal(n.leader, n.zxid, n.peer_epoch);
                            core.send_notifications();
                        }
                    }

                    debug!(
                        "adding vote: from = {}, leader = {}, zxid = 0x{:x}, round = 0x{:x}",
                        n.sid, n.leader, n.zxid, n.election_epoch
                    );
                    recvset.insert(
                        n.sid,
                        Vote::with_epoch(n.leader, n.zxid, n.election_epoch, n.peer_epoch),
                    );

                    let proposal = core.proposal();
                    let candidate = Vote::with_epoch(
                        proposal.leader,
                        proposal.zxid,
                        core.clock(),
                        proposal.peer_epoch,
                    );
                    let tracker = core.vote_tracker(&recvset, &candidate);
                    let quorum = tracker.has_all_quorums();
                    vote_set = Some(tracker);

                    if quorum {
                        // Quorum reached; give a strictly better ballot one
                        // last window to preempt the commit.
                        let preempted = loop {
                            match timeout(core.config.finalize_wait, recv.recv()).await {
                                Ok(Some(better)) => {
                                    let proposal = core.proposal();
                                    if core.total_order_predicate(
                                        better.leader,
                                        better.zxid,
                                        better.peer_epoch,
                                        proposal.leader,
                                        proposal.zxid,
                                        proposal.peer_epoch,
                                    ) {
                                        break Some(better);
                                    }
                                    // Ballots that don't beat the proposal
                                    // are consumed and dropped.
                                }
                                _ => break None,
                            }
                        };

                        match preempted {
                            Some(better) => pushback = Some(better),
                            None => {
                                let proposal = core.proposal();
                                core.set_peer_state_for(proposal.leader, vote_set.as_ref());
                                let end_vote = Vote::with_epoch(
                                    proposal.leader,
                                    proposal.zxid,
                                    core.clock(),
                                    proposal.peer_epoch,
                                );
                                self.leave_instance(&end_vote, &mut recv, &mut pushback);
                                return Some(end_vote);
                            }
                        }
                    }
                }

                PeerState::Observing => {
                    debug!("notification from observer: {}", n.sid);
                }

                PeerState::Following => {
                    if let Some(end_vote) = self.received_following_notification(
                        &mut recvset,
                        &mut outofelection,
                        &n,
                    ) {
                        self.leave_instance(&end_vote, &mut recv, &mut pushback);
                        return Some(end_vote);
                    }
                }

                PeerState::Leading => {
                    if let Some(end_vote) = self.received_leading_notification(
                        &mut recvset,
                        &mut outofelection,
                        vote_set.as_ref(),
                        &n,
                    ) {
                        self.leave_instance(&end_vote, &mut recv, &mut pushback);
                        return Some(end_vote);
                    }
                }
            }
        }
        None
    }

    /// A FOLLOWING (or LEADING, via the shared path) sender reports a
    /// concluded election; try to join it.
    fn received_following_notification(
        &self,
        recvset: &mut HashMap<Sid, Vote>,
        outofelection: &mut HashMap<Sid, Vote>,
        n: &Notification,
    ) -> Option<Vote> {
        let core = &self.core;
        let vote = Vote::with_state(n.leader, n.zxid, n.election_epoch, n.peer_epoch, n.state);

        // Same round: the concluded vote also counts in recvset.
        if n.election_epoch == core.clock() {
            recvset.insert(n.sid, vote);
            let tracker = core.vote_tracker(recvset, &vote);
            if tracker.has_all_quorums() && core.check_leader(recvset, n.leader, n.election_epoch)
            {
                core.set_peer_state_for(n.leader, Some(&tracker));
                return Some(Vote::with_epoch(n.leader, n.zxid, n.election_epoch, n.peer_epoch));
            }
        }

        // Any round: verify a majority follows the same leader before
        // joining an established ensemble.
        outofelection.insert(n.sid, vote);
        let tracker = core.vote_tracker(outofelection, &vote);
        if tracker.has_all_quorums() && core.check_leader(outofelection, n.leader, n.election_epoch)
        {
            {
                let _proposal = core.proposal.lock().unwrap();
                core.logical_clock.store(n.election_epoch, Ordering::SeqCst);
                core.set_peer_state_for(n.leader, Some(&tracker));
            }
            return Some(Vote::with_epoch(n.leader, n.zxid, n.election_epoch, n.peer_epoch));
        }
        None
    }

    /// A LEADING sender: join as usual, or let the mastership arbiter
    /// settle a 2-node recovery.
    ///
    /// When the arbiter refuses mastership to this side, the notified
    /// leader must be the one the arbiter granted it to, so it is adopted
    /// without a fresh quorum — the tracker handed to `set_peer_state_for`
    /// is the last one computed earlier in the round, possibly none.
    fn received_leading_notification(
        &self,
        recvset: &mut HashMap<Sid, Vote>,
        outofelection: &mut HashMap<Sid, Vote>,
        vote_set: Option<&VoteTracker>,
        n: &Notification,
    ) -> Option<Vote> {
        if let Some(end_vote) = self.received_following_notification(recvset, outofelection, n) {
            return Some(end_vote);
        }
        let core = &self.core;
        let qv = core.peer.quorum_verifier();
        if qv.needs_oracle() && !qv.ask_oracle() {
            info!("oracle indicates to follow");
            core.set_peer_state_for(n.leader, vote_set);
            return Some(Vote::with_epoch(n.leader, n.zxid, n.election_epoch, n.peer_epoch));
        }
        if qv.needs_oracle() {
            info!("oracle indicates not to follow");
        }
        None
    }

    /// Concludes the round: logs the outcome and drains stale ballots.
    fn leave_instance(
        &self,
        vote: &Vote,
        recv: &mut mpsc::UnboundedReceiver<Notification>,
        pushback: &mut Option<Notification>,
    ) {
        debug!(
            "leaving election instance: leader = {}, zxid = 0x{:x}, my id = {}, my state = {}",
            vote.leader,
            vote.zxid,
            self.core.peer.id(),
            self.core.peer.peer_state()
        );
        pushback.take();
        while recv.try_recv().is_ok() {}
    }
}

/// Drains the outbound queue, encoding each notification for the wire.
async fn send_worker(core: Arc<Core>, mut send_rx: mpsc::UnboundedReceiver<ToSend>) {
    loop {
        if core.stopped() {
            break;
        }
        match timeout(WORKER_POLL, send_rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(m)) => {
                let frame = m.encode();
                core.transport.send_to(m.sid, frame).await;
            }
        }
    }
    info!("send worker is down");
}

/// Pulls raw frames from the transport and turns them into vetted
/// notifications for the core.
async fn receive_worker(core: Arc<Core>) {
    while !core.stopped() {
        let Some((sid, frame)) = core.transport.poll_recv(WORKER_POLL).await else {
            continue;
        };

        if frame.len() < MIN_FRAME_LEN {
            error!(
                "{}",
                ElectionError::ShortFrame {
                    sid,
                    len: frame.len()
                }
            );
            continue;
        }

        let wire = match WireNotification::decode(&frame) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(
                    "skipping partial or malformed notification from sid {} ({} bytes): {}",
                    sid,
                    frame.len(),
                    e
                );
                continue;
            }
        };

        // A frame can piggyback a newer quorum config; adopting one while
        // LOOKING invalidates the current round.
        let mut notification_qv = None;
        if let Some(config) = wire.config.as_deref() {
            match core.peer.config_from_string(config) {
                Ok(rqv) => {
                    let current = core.peer.quorum_verifier();
                    if rqv.version() > current.version() {
                        info!(
                            "{} received config version 0x{:x}, mine is 0x{:x}",
                            core.peer.id(),
                            rqv.version(),
                            current.version()
                        );
                        if core.peer.peer_state() == PeerState::Looking {
                            debug!("processing reconfig during election");
                            if core.peer.process_reconfig(Arc::clone(&rqv)) {
                                info!("membership changed, restarting leader election");
                                core.shutdown();
                                break;
                            }
                        } else {
                            debug!("skipping reconfig, state: {}", core.peer.peer_state());
                        }
                    }
                    notification_qv = Some(rqv);
                }
                Err(e) => {
                    error!("failed to process config received from sid {}: {}", sid, e);
                }
            }
        }

        // Non-voters get told right away who we believe leads.
        if !core.valid_voter(sid) {
            let current = core.peer.current_vote();
            let qv = core.peer.quorum_verifier();
            let _ = core.send_tx.send(ToSend {
                sid,
                leader: current.leader,
                zxid: current.zxid,
                election_epoch: core.clock(),
                peer_epoch: current.peer_epoch,
                state: core.peer.peer_state(),
                config: Bytes::from(qv.to_config_string()),
            });
            continue;
        }

        let Some(sender_state) = PeerState::from_wire(wire.state) else {
            debug!(
                "discarding notification with unrecognized state {} from sid {}",
                wire.state, sid
            );
            continue;
        };

        let n = Notification {
            sid,
            leader: wire.leader,
            zxid: wire.zxid,
            election_epoch: wire.election_epoch,
            peer_epoch: wire.peer_epoch,
            state: sender_state,
            version: wire.version,
            qv: notification_qv,
        };
        info!(my_state = %core.peer.peer_state(), notification = ?n, "received notification");

        if core.peer.peer_state() == PeerState::Looking {
            let stale_round = n.election_epoch < core.clock();
            let _ = core.recv_tx.send(n);

            // A looking sender stuck in an older round gets our current
            // ballot so it can catch up.
            if sender_state == PeerState::Looking && stale_round {
                let vote = core.get_vote();
                let qv = core.peer.quorum_verifier();
                let _ = core.send_tx.send(ToSend {
                    sid,
                    leader: vote.leader,
                    zxid: vote.zxid,
                    election_epoch: core.clock(),
                    peer_epoch: vote.peer_epoch,
                    state: core.peer.peer_state(),
                    config: Bytes::from(qv.to_config_string()),
                });
            }
        } else if sender_state == PeerState::Looking {
            // We have settled but the sender is still looking: send back
            // the committed ballot, at the round it was committed in.
            if core.peer.peer_state() == PeerState::Leading {
                if let Some(vote_set) = core.leading_vote_set.lock().unwrap().take() {
                    core.peer.set_leading_vote_set(vote_set);
                }
                core.peer.report_looking_sid(sid);
            }
            let current = core.peer.current_vote();
            debug!(
                "sending committed ballot: my id = {}, recipient = {}, zxid = 0x{:x}, leader = {}",
                core.peer.id(),
                sid,
                current.zxid,
                current.leader
            );
            let qv = core.peer.quorum_verifier();
            let _ = core.send_tx.send(ToSend {
                sid,
                leader: current.leader,
                zxid: current.zxid,
                election_epoch: current.election_epoch,
                peer_epoch: current.peer_epoch,
                state: core.peer.peer_state(),
                config: Bytes::from(qv.to_config_string()),
            });
        }
    }
    info!("receive worker is down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::LocalPeer;
    use crate::quorum::MajorityQuorum;
    use crate::transport::InMemoryNetwork;

    fn election_for(sid: Sid, voters: &[Sid]) -> (FastLeaderElection, Arc<LocalPeer>) {
        let peer = Arc::new(LocalPeer::new(
            sid,
            Arc::new(MajorityQuorum::with_voters(voters.iter().copied())),
        ));
        let net = InMemoryNetwork::new();
        let transport = net.register(sid);
        let election = FastLeaderElection::new(
            Arc::clone(&peer) as Arc<dyn QuorumPeer>,
            transport,
            ElectionConfig::default(),
        );
        (election, peer)
    }

    #[tokio::test]
    async fn comparator_orders_epoch_then_zxid_then_sid() {
        let (election, _) = election_for(1, &[1, 2, 3]);
        let core = &election.core;

        // Higher peer epoch wins regardless of the rest.
        assert!(core.total_order_predicate(2, 0, 5, 3, 100, 4));
        // Equal epoch: higher zxid wins.
        assert!(core.total_order_predicate(2, 6, 1, 3, 5, 1));
        assert!(!core.total_order_predicate(2, 5, 1, 3, 6, 1));
        // Full tie on (epoch, zxid): higher sid wins.
        assert!(core.total_order_predicate(3, 5, 1, 2, 5, 1));
        assert!(!core.total_order_predicate(2, 5, 1, 3, 5, 1));
        // Exact tie is not a win.
        assert!(!core.total_order_predicate(2, 5, 1, 2, 5, 1));
    }

    #[tokio::test]
    async fn comparator_rejects_zero_weight_candidates() {
        let (election, _) = election_for(1, &[1, 2, 3]);
        let core = &election.core;
        // Sid 9 is not in the voting view: it never wins, even with the
        // best log in the ensemble.
        assert!(!core.total_order_predicate(9, i64::MAX, i64::MAX, 1, 0, 0));
    }

    #[tokio::test]
    async fn comparator_is_antisymmetric_for_voters() {
        let (election, _) = election_for(1, &[1, 2, 3]);
        let core = &election.core;
        let ballots = [(1, 0, 0), (2, 0, 0), (2, 5, 0), (3, 5, 0), (3, 5, 1)];
        for a in ballots {
            for b in ballots {
                if a == b {
                    continue;
                }
                let forward = core.total_order_predicate(a.0, a.1, a.2, b.0, b.1, b.2);
                let backward = core.total_order_predicate(b.0, b.1, b.2, a.0, a.1, a.2);
                assert!(forward != backward, "ballots {a:?} and {b:?} must be ordered");
            }
        }
    }

    #[tokio::test]
    async fn check_leader_requires_leading_ack_from_remote_leader() {
        let (election, _) = election_for(1, &[1, 2, 3]);
        let core = &election.core;

        let mut votes = HashMap::new();
        votes.insert(2, Vote::with_state(3, 5, 1, 0, PeerState::Following));

        // Nobody heard from sid 3 itself.
        assert!(!core.check_leader(&votes, 3, 1));

        // A FOLLOWING ballot from 3 is not enough.
        votes.insert(3, Vote::with_state(3, 5, 1, 0, PeerState::Following));
        assert!(!core.check_leader(&votes, 3, 1));

        // Only 3 claiming LEADING settles it.
        votes.insert(3, Vote::with_state(3, 5, 1, 0, PeerState::Leading));
        assert!(core.check_leader(&votes, 3, 1));
    }

    #[tokio::test]
    async fn check_leader_self_requires_current_round() {
        let (election, _) = election_for(1, &[1, 2, 3]);
        let core = &election.core;
        core.logical_clock.store(7, Ordering::SeqCst);

        let votes = HashMap::new();
        assert!(core.check_leader(&votes, 1, 7));
        assert!(!core.check_leader(&votes, 1, 6));
    }

    #[tokio::test]
    async fn vote_tracker_spans_pending_config() {
        let (election, peer) = election_for(1, &[1, 2, 3]);
        let core = &election.core;

        let pending = MajorityQuorum::parse(
            "server.1=10.0.0.1:2888:3888\n\
             server.2=10.0.0.2:2888:3888\n\
             server.3=10.0.0.3:2888:3888\n\
             server.4=10.0.0.4:2888:3888\n\
             server.5=10.0.0.5:2888:3888\n\
             version=1",
        )
        .unwrap();
        peer.set_last_seen_quorum_verifier(Arc::new(pending));

        let candidate = Vote::with_epoch(3, 5, 1, 0);
        let mut votes = HashMap::new();
        votes.insert(1, candidate);
        votes.insert(2, candidate);
        // A quorum of the current config alone must not conclude while the
        // pending config still lacks one.
        let tracker = core.vote_tracker(&votes, &candidate);
        assert!(!tracker.has_all_quorums());

        votes.insert(4, candidate);
        let tracker = core.vote_tracker(&votes, &candidate);
        assert!(tracker.has_all_quorums());
    }

    #[tokio::test]
    async fn proposal_reads_are_consistent() {
        let (election, _) = election_for(2, &[1, 2, 3]);
        election.core.update_proposal(3, 42, 1);
        let vote = election.get_vote();
        assert_eq!(vote.leader, 3);
        assert_eq!(vote.zxid, 42);
        assert_eq!(vote.peer_epoch, 1);
        assert_eq!(vote.election_epoch, -1);
    }

    #[tokio::test]
    async fn shutdown_clears_proposal_and_stops_loops() {
        let (election, _) = election_for(1, &[1, 2, 3]);
        election.core.update_proposal(1, 10, 0);
        election.shutdown();
        assert!(election.core.stopped());
        assert_eq!(election.get_vote().leader, -1);
        assert!(election.look_for_leader().await.is_none());
    }

    #[tokio::test]
    async fn observer_never_proposes_itself() {
        let qv = Arc::new(MajorityQuorum::with_voters([1, 2, 3]));
        let peer = Arc::new(LocalPeer::observer(4, qv));
        let net = InMemoryNetwork::new();
        let election = FastLeaderElection::new(
            Arc::clone(&peer) as Arc<dyn QuorumPeer>,
            net.register(4),
            ElectionConfig::default(),
        );
        assert_eq!(election.core.init_id(), i64::MIN);
        assert_eq!(election.core.init_last_logged_zxid(), i64::MIN);
        assert_eq!(election.core.init_peer_epoch(), i64::MIN);
        assert_eq!(election.core.learning_state(), PeerState::Observing);
    }

    #[tokio::test]
    async fn participant_outside_voting_members_gets_sentinel_id() {
        // A participant that is not a voter of the current config must not
        // propose itself.
        let (election, peer) = election_for(4, &[1, 2, 3]);
        assert_eq!(election.core.init_id(), i64::MIN);
        // Its log position still counts, though.
        peer.set_last_logged_zxid(9);
        assert_eq!(election.core.init_last_logged_zxid(), 9);
    }
}
