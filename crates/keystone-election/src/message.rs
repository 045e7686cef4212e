//! Binary wire format for election notifications.
//!
//! All multi-byte integers are big-endian. Three frame generations are
//! accepted on the inbound path:
//!
//! | Length | Contents |
//! |---|---|
//! | 28 | state, leader, zxid, election epoch (peer epoch derived from zxid) |
//! | 40 | adds peer epoch and a version word that is ignored on decode |
//! | ≥44 | adds a real version word; version > 1 appends a length-prefixed quorum config |
//!
//! Outbound frames are always the current version-2 layout; the 40-byte
//! version-1 builder survives for compatibility tests.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ElectionError;
use crate::peer::PeerState;
use crate::quorum::QuorumVerifier;
use crate::Sid;

/// Wire format version of frames this peer emits.
pub const CURRENT_VERSION: i32 = 0x2;

/// Minimum frame length any protocol generation has ever produced.
pub const MIN_FRAME_LEN: usize = 28;

// Safe read helpers that return an error instead of panicking on
// truncated input.

fn safe_get_i32(buf: &mut &[u8]) -> Result<i32, ElectionError> {
    if buf.len() < 4 {
        return Err(ElectionError::Truncated {
            needed: 4 - buf.len(),
        });
    }
    Ok(buf.get_i32())
}

fn safe_get_i64(buf: &mut &[u8]) -> Result<i64, ElectionError> {
    if buf.len() < 8 {
        return Err(ElectionError::Truncated {
            needed: 8 - buf.len(),
        });
    }
    Ok(buf.get_i64())
}

/// A decoded notification frame, before the receive worker has vetted the
/// sender or mapped its state.
///
/// `state` stays a raw integer here: the courtesy-reply path for
/// non-voters runs before unknown states are discarded, so mapping happens
/// in the worker, not in the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireNotification {
    pub state: i32,
    pub leader: Sid,
    pub zxid: i64,
    pub election_epoch: i64,
    pub peer_epoch: i64,
    pub version: i32,
    pub config: Option<String>,
}

impl WireNotification {
    /// Decodes a frame of any supported generation.
    pub fn decode(frame: &[u8]) -> Result<Self, ElectionError> {
        let len = frame.len();
        let mut buf = frame;

        let state = safe_get_i32(&mut buf)?;
        let leader = safe_get_i64(&mut buf)?;
        let zxid = safe_get_i64(&mut buf)?;
        let election_epoch = safe_get_i64(&mut buf)?;

        if len == 28 {
            // Oldest generation: the peer epoch lives in the zxid's high
            // half.
            return Ok(Self {
                state,
                leader,
                zxid,
                election_epoch,
                peer_epoch: zxid >> 32,
                version: 0,
                config: None,
            });
        }

        let peer_epoch = safe_get_i64(&mut buf)?;

        // The 40-byte generation carries a version word but predates every
        // consumer of it; the word is deliberately not read.
        let version = if len == 40 { 0 } else { safe_get_i32(&mut buf)? };

        let config = if version > 0x1 {
            let config_len = safe_get_i32(&mut buf)?;
            if config_len < 0 || config_len as usize > len {
                return Err(ElectionError::InvalidConfigLength {
                    len: config_len,
                    frame: len,
                });
            }
            let config_len = config_len as usize;
            if buf.len() < config_len {
                return Err(ElectionError::Truncated {
                    needed: config_len - buf.len(),
                });
            }
            let text = std::str::from_utf8(&buf[..config_len])
                .map_err(|_| ElectionError::ConfigNotUtf8)?;
            Some(text.to_owned())
        } else {
            None
        };

        Ok(Self {
            state,
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            version,
            config,
        })
    }
}

/// A vetted inbound notification, as consumed by the election core.
#[derive(Clone)]
pub struct Notification {
    /// Sender's sid, as reported by the transport.
    pub sid: Sid,
    pub leader: Sid,
    pub zxid: i64,
    pub election_epoch: i64,
    pub peer_epoch: i64,
    /// Sender's lifecycle state.
    pub state: PeerState,
    /// Wire format version the frame arrived with.
    pub version: i32,
    /// Quorum config carried by version ≥ 2 frames, already parsed.
    pub qv: Option<Arc<dyn QuorumVerifier>>,
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("sid", &self.sid)
            .field("leader", &self.leader)
            .field("zxid", &format_args!("0x{:x}", self.zxid))
            .field("election_epoch", &format_args!("0x{:x}", self.election_epoch))
            .field("peer_epoch", &format_args!("0x{:x}", self.peer_epoch))
            .field("state", &self.state)
            .field("version", &self.version)
            .field("config_version", &self.qv.as_ref().map(|qv| qv.version()))
            .finish()
    }
}

/// An outbound notification addressed to one peer.
#[derive(Debug, Clone)]
pub struct ToSend {
    /// Recipient sid.
    pub sid: Sid,
    pub leader: Sid,
    pub zxid: i64,
    pub election_epoch: i64,
    pub peer_epoch: i64,
    /// Local peer's state at enqueue time.
    pub state: PeerState,
    /// Serialized quorum config appended to the frame.
    pub config: Bytes,
}

impl ToSend {
    /// Encodes the current version-2 frame with a config trailer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(44 + self.config.len());
        buf.put_i32(self.state.to_wire());
        buf.put_i64(self.leader);
        buf.put_i64(self.zxid);
        buf.put_i64(self.election_epoch);
        buf.put_i64(self.peer_epoch);
        buf.put_i32(CURRENT_VERSION);
        buf.put_i32(self.config.len() as i32);
        buf.put_slice(&self.config);
        buf.freeze()
    }
}

/// Builds the 40-byte version-1 frame with no config trailer.
pub fn encode_legacy(
    state: PeerState,
    leader: Sid,
    zxid: i64,
    election_epoch: i64,
    peer_epoch: i64,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(40);
    buf.put_i32(state.to_wire());
    buf.put_i64(leader);
    buf.put_i64(zxid);
    buf.put_i64(election_epoch);
    buf.put_i64(peer_epoch);
    buf.put_i32(0x1);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ToSend {
        ToSend {
            sid: 2,
            leader: 3,
            zxid: 0x5_0000_002a,
            election_epoch: 7,
            peer_epoch: 5,
            state: PeerState::Looking,
            config: Bytes::from_static(b"server.1=10.0.0.1:2888:3888:participant\nversion=1"),
        }
    }

    #[test]
    fn current_frame_roundtrip() {
        let msg = sample();
        let frame = msg.encode();
        assert_eq!(frame.len(), 44 + msg.config.len());

        let wire = WireNotification::decode(&frame).unwrap();
        assert_eq!(wire.state, 0);
        assert_eq!(wire.leader, 3);
        assert_eq!(wire.zxid, 0x5_0000_002a);
        assert_eq!(wire.election_epoch, 7);
        assert_eq!(wire.peer_epoch, 5);
        assert_eq!(wire.version, CURRENT_VERSION);
        assert_eq!(
            wire.config.as_deref(),
            Some("server.1=10.0.0.1:2888:3888:participant\nversion=1")
        );
    }

    #[test]
    fn empty_config_roundtrip() {
        let mut msg = sample();
        msg.config = Bytes::new();
        let frame = msg.encode();
        assert_eq!(frame.len(), 44);
        let wire = WireNotification::decode(&frame).unwrap();
        assert_eq!(wire.config.as_deref(), Some(""));
    }

    #[test]
    fn legacy_40_byte_frame_has_no_version() {
        let frame = encode_legacy(PeerState::Leading, 1, 0x2a, 4, 0);
        assert_eq!(frame.len(), 40);

        let wire = WireNotification::decode(&frame).unwrap();
        assert_eq!(wire.state, 2);
        assert_eq!(wire.leader, 1);
        assert_eq!(wire.zxid, 0x2a);
        assert_eq!(wire.election_epoch, 4);
        assert_eq!(wire.peer_epoch, 0);
        // The trailing version word of a 40-byte frame predates every
        // consumer and is ignored.
        assert_eq!(wire.version, 0);
        assert_eq!(wire.config, None);
    }

    #[test]
    fn legacy_28_byte_frame_derives_peer_epoch() {
        let mut buf = BytesMut::new();
        buf.put_i32(1); // FOLLOWING
        buf.put_i64(5); // leader
        buf.put_i64(0x0000_0003_0000_0007); // zxid: epoch 3 in the high half
        buf.put_i64(9); // election epoch
        assert_eq!(buf.len(), 28);

        let wire = WireNotification::decode(&buf).unwrap();
        assert_eq!(wire.peer_epoch, 3);
        assert_eq!(wire.version, 0);
        assert_eq!(wire.config, None);
    }

    #[test]
    fn truncated_frames_rejected() {
        // Between generations: enough for the 28-byte prefix, not enough
        // for the peer epoch.
        let mut buf = BytesMut::new();
        buf.put_i32(0);
        buf.put_i64(1);
        buf.put_i64(2);
        buf.put_i64(3);
        buf.put_i32(4);
        assert_eq!(buf.len(), 32);
        assert!(matches!(
            WireNotification::decode(&buf),
            Err(ElectionError::Truncated { .. })
        ));
    }

    #[test]
    fn negative_config_length_rejected() {
        let mut frame = BytesMut::from(&sample().encode()[..]);
        frame[40..44].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(matches!(
            WireNotification::decode(&frame),
            Err(ElectionError::InvalidConfigLength { len: -1, .. })
        ));
    }

    #[test]
    fn oversized_config_length_rejected() {
        let mut frame = BytesMut::from(&sample().encode()[..]);
        frame[40..44].copy_from_slice(&i32::MAX.to_be_bytes());
        assert!(matches!(
            WireNotification::decode(&frame),
            Err(ElectionError::InvalidConfigLength { .. })
        ));
    }

    #[test]
    fn config_shorter_than_declared_rejected() {
        let msg = sample();
        let frame = msg.encode();
        // Chop the trailer in half: the declared length no longer fits.
        let cut = frame.len() - msg.config.len() / 2;
        assert!(matches!(
            WireNotification::decode(&frame[..cut]),
            Err(ElectionError::Truncated { .. })
        ));
    }

    #[test]
    fn non_utf8_config_rejected() {
        let mut msg = sample();
        msg.config = Bytes::from_static(&[0xff, 0xfe, 0x01]);
        let frame = msg.encode();
        assert!(matches!(
            WireNotification::decode(&frame),
            Err(ElectionError::ConfigNotUtf8)
        ));
    }

    #[test]
    fn unknown_state_survives_decode() {
        // Unknown states are the receive worker's problem: the non-voter
        // courtesy path runs before state mapping.
        let frame = encode_legacy(PeerState::Looking, 1, 2, 3, 4);
        let mut raw = BytesMut::from(&frame[..]);
        raw[0..4].copy_from_slice(&7i32.to_be_bytes());
        let wire = WireNotification::decode(&raw).unwrap();
        assert_eq!(wire.state, 7);
        assert_eq!(PeerState::from_wire(wire.state), None);
    }
}
