//! The tagged-variant message envelope: a common header plus one of
//! three typed bodies, each with a client-originated and proxy-originated
//! shape. Dispatch is a pattern match on `msg_id` (per the REDESIGN FLAG
//! replacing the source's inheritance-based dispatch with a sum type),
//! not a trait object hierarchy.

use crate::codec::{Decoder, Encoder};
use crate::error::ClkmgrError;
use crate::events::{CompositeMask, EventMask};
use crate::timebase::{Threshold, TimeBaseCfg, TimeBaseSnapshot};

/// Width of the client-id field, carried verbatim from
/// `original_source/clkmgr/common/util.hpp`'s `TRANSPORT_CLIENT_ID_LEN`.
pub const CLIENT_ID_LEN: usize = 512;

/// Reserved session id meaning "no session" / allocation failure.
pub const INVALID_SESSION_ID: u16 = 0xFFFF;

/// Length of the common header as actually laid out by its fields
/// (`u8 + u8 + u16 + u16 + 512` = 518 bytes). spec.md's prose states 524
/// bytes for this header in two places; the field-by-field layout is the
/// operationally binding definition since every encoder/decoder in this
/// crate is built against it, so this constant is derived from the
/// fields rather than hardcoded to the prose figure.
pub const HEADER_LEN: usize = 1 + 1 + 2 + 2 + CLIENT_ID_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgId {
    Connect = 0,
    Subscribe = 1,
    Notify = 2,
}

impl MsgId {
    pub fn from_u8(v: u8) -> Result<Self, ClkmgrError> {
        match v {
            0 => Ok(MsgId::Connect),
            1 => Ok(MsgId::Subscribe),
            2 => Ok(MsgId::Notify),
            other => Err(ClkmgrError::UnknownMsgId(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckKind {
    None = 0,
    Success = 1,
    Failure = 2,
}

impl AckKind {
    pub fn from_u8(v: u8) -> Result<Self, ClkmgrError> {
        match v {
            0 => Ok(AckKind::None),
            1 => Ok(AckKind::Success),
            2 => Ok(AckKind::Failure),
            other => Err(ClkmgrError::UnknownAckKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub ack_kind: AckKind,
    pub session_id: u16,
    pub client_id: [u8; CLIENT_ID_LEN],
}

impl Header {
    pub fn new(session_id: u16, client_id_str: &str) -> Self {
        Header {
            ack_kind: AckKind::None,
            session_id,
            client_id: pack_client_id(client_id_str),
        }
    }

    pub fn client_id_str(&self) -> String {
        let end = self.client_id.iter().position(|&b| b == 0).unwrap_or(CLIENT_ID_LEN);
        String::from_utf8_lossy(&self.client_id[..end]).into_owned()
    }

    fn encode(&self, msg_id: MsgId, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_u8(msg_id as u8)?;
        enc.put_u8(self.ack_kind as u8)?;
        enc.put_u16(self.session_id)?;
        enc.put_u16(0)?; // reserved
        enc.put_fixed_array(&self.client_id)?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<(MsgId, Header), ClkmgrError> {
        let msg_id = MsgId::from_u8(dec.get_u8()?)?;
        let ack_kind = AckKind::from_u8(dec.get_u8()?)?;
        let session_id = dec.get_u16()?;
        let _reserved = dec.get_u16()?;
        let client_id = dec.get_fixed_array::<CLIENT_ID_LEN>()?;
        Ok((
            msg_id,
            Header {
                ack_kind,
                session_id,
                client_id,
            },
        ))
    }
}

/// Zero-pad (or truncate) a caller-supplied client id into the fixed
/// wire field.
pub fn pack_client_id(s: &str) -> [u8; CLIENT_ID_LEN] {
    let mut out = [0u8; CLIENT_ID_LEN];
    let bytes = s.as_bytes();
    let n = bytes.len().min(CLIENT_ID_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectBody {
    /// Only populated on a `Success` reply; empty on a request or a
    /// `Failure` reply.
    pub timebases: Vec<TimeBaseCfg>,
}

impl ConnectBody {
    fn encode(&self, ack_kind: AckKind, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        if ack_kind == AckKind::Success {
            enc.put_u32(self.timebases.len() as u32)?;
            for tb in &self.timebases {
                tb.encode(enc)?;
            }
        }
        Ok(())
    }

    fn decode(ack_kind: AckKind, dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        if ack_kind != AckKind::Success {
            return Ok(ConnectBody { timebases: Vec::new() });
        }
        let count = dec.get_u32()? as usize;
        let mut timebases = Vec::with_capacity(count);
        for _ in 0..count {
            timebases.push(TimeBaseCfg::decode(dec)?);
        }
        Ok(ConnectBody { timebases })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeBody {
    pub time_base_index: u32,
    pub event_mask: EventMask,
    pub composite_mask: CompositeMask,
    pub thresholds: Vec<Threshold>,
    /// Only populated on a `Success` reply.
    pub snapshot: Option<TimeBaseSnapshot>,
}

impl SubscribeBody {
    fn encode(&self, ack_kind: AckKind, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_u32(self.time_base_index)?;
        enc.put_u32(self.event_mask.bits())?;
        enc.put_u32(self.composite_mask.bits())?;
        enc.put_u32(self.thresholds.len() as u32)?;
        for t in &self.thresholds {
            t.encode(enc)?;
        }
        if ack_kind == AckKind::Success {
            if let Some(snap) = &self.snapshot {
                snap.encode(enc)?;
            }
        }
        Ok(())
    }

    fn decode(ack_kind: AckKind, dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        let time_base_index = dec.get_u32()?;
        let event_mask = EventMask::from_bits_truncate(dec.get_u32()?);
        let composite_mask = CompositeMask::from_bits_truncate(dec.get_u32()?);
        let count = dec.get_u32()? as usize;
        let mut thresholds = Vec::with_capacity(count);
        for _ in 0..count {
            thresholds.push(Threshold::decode(dec)?);
        }
        let snapshot = if ack_kind == AckKind::Success && dec.remaining() > 0 {
            Some(TimeBaseSnapshot::decode(dec)?)
        } else {
            None
        };
        Ok(SubscribeBody {
            time_base_index,
            event_mask,
            composite_mask,
            thresholds,
            snapshot,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyBody {
    pub time_base_index: u32,
    pub snapshot: TimeBaseSnapshot,
}

impl NotifyBody {
    fn encode(&self, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_u32(self.time_base_index)?;
        self.snapshot.encode(enc)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        let time_base_index = dec.get_u32()?;
        let snapshot = TimeBaseSnapshot::decode(dec)?;
        Ok(NotifyBody {
            time_base_index,
            snapshot,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connect { header: Header, body: ConnectBody },
    Subscribe { header: Header, body: SubscribeBody },
    Notify { header: Header, body: NotifyBody },
}

impl Message {
    pub fn header(&self) -> &Header {
        match self {
            Message::Connect { header, .. } => header,
            Message::Subscribe { header, .. } => header,
            Message::Notify { header, .. } => header,
        }
    }

    pub fn build(&self) -> Result<Vec<u8>, ClkmgrError> {
        let mut enc = Encoder::new();
        match self {
            Message::Connect { header, body } => {
                header.encode(MsgId::Connect, &mut enc)?;
                body.encode(header.ack_kind, &mut enc)?;
            }
            Message::Subscribe { header, body } => {
                header.encode(MsgId::Subscribe, &mut enc)?;
                body.encode(header.ack_kind, &mut enc)?;
            }
            Message::Notify { header, body } => {
                header.encode(MsgId::Notify, &mut enc)?;
                body.encode(&mut enc)?;
            }
        }
        Ok(enc.into_bytes())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ClkmgrError> {
        let mut dec = Decoder::new(bytes);
        let (msg_id, header) = Header::decode(&mut dec)?;
        Ok(match msg_id {
            MsgId::Connect => Message::Connect {
                body: ConnectBody::decode(header.ack_kind, &mut dec)?,
                header,
            },
            MsgId::Subscribe => Message::Subscribe {
                body: SubscribeBody::decode(header.ack_kind, &mut dec)?,
                header,
            },
            MsgId::Notify => Message::Notify {
                body: NotifyBody::decode(&mut dec)?,
                header,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebase::{PtpSnapshot, ThresholdKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn client_id_packs_and_unpacks() {
        let header = Header::new(12, "client-a");
        assert_eq!(header.client_id_str(), "client-a");
        assert_eq!(header.client_id.len(), CLIENT_ID_LEN);
    }

    #[test]
    fn round_trip_subscribe_request() {
        // Mirrors the spec's scenario 6 fixture: session_id=12,
        // timeBaseIndex=1, event_mask=0x1F, composite_mask=0x07, one
        // threshold (kind=GmOffset, upper=1000, lower=-1000). The total
        // byte length is asserted against the field layout, not the
        // prose figures in spec.md section 8 (524/24), which are
        // inconsistent with the field-by-field wire layout in section 6.
        let header = Header::new(12, "scenario6");
        let body = SubscribeBody {
            time_base_index: 1,
            event_mask: EventMask::from_bits_truncate(0x1F),
            composite_mask: CompositeMask::from_bits_truncate(0x07),
            thresholds: vec![Threshold::new(ThresholdKind::GmOffset, -1000, 1000).unwrap()],
            snapshot: None,
        };
        let msg = Message::Subscribe {
            header,
            body: body.clone(),
        };
        let bytes = msg.build().unwrap();
        let expected_body_len = 4 + 4 + 4 + 4 + (1 + 4 + 4);
        assert_eq!(bytes.len(), HEADER_LEN + expected_body_len);

        let parsed = Message::parse(&bytes).unwrap();
        match parsed {
            Message::Subscribe { header, body: got } => {
                assert_eq!(header.session_id, 12);
                assert_eq!(got, body);
            }
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_connect_success_reply() {
        let mut header = Header::new(7, "client-b");
        header.ack_kind = AckKind::Success;
        let body = ConnectBody {
            timebases: vec![TimeBaseCfg {
                time_base_index: 1,
                name: "tb1".into(),
                interface_name: "eth0".into(),
                transport_specific: 1,
                domain_number: 0,
                have_sys: true,
                have_ptp: true,
            }],
        };
        let msg = Message::Connect {
            header,
            body: body.clone(),
        };
        let bytes = msg.build().unwrap();
        let parsed = Message::parse(&bytes).unwrap();
        match parsed {
            Message::Connect { body: got, .. } => assert_eq!(got, body),
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_notify() {
        let header = Header::new(3, "client-c");
        let body = NotifyBody {
            time_base_index: 1,
            snapshot: TimeBaseSnapshot {
                ptp: Some(PtpSnapshot {
                    offset_ns: 500,
                    gm_identity: [0; 8],
                    as_capable: true,
                    synced_to_primary: true,
                    instance_id: 0,
                    sync_interval_us: 1_000_000,
                }),
                sys: None,
            },
        };
        let msg = Message::Notify {
            header,
            body: body.clone(),
        };
        let bytes = msg.build().unwrap();
        let parsed = Message::parse(&bytes).unwrap();
        match parsed {
            Message::Notify { body: got, .. } => assert_eq!(got, body),
            other => panic!("expected Notify, got {other:?}"),
        }
    }

    #[test]
    fn unknown_msg_id_is_rejected() {
        let mut bytes = Header::new(0, "x")
            .encode_for_test();
        bytes[0] = 0xff;
        assert!(matches!(Message::parse(&bytes), Err(ClkmgrError::UnknownMsgId(0xff))));
    }

    impl Header {
        /// Test-only helper to get raw encoded header bytes regardless
        /// of msg_id, used to build malformed fixtures.
        fn encode_for_test(&self) -> Vec<u8> {
            let mut enc = Encoder::new();
            self.encode(MsgId::Connect, &mut enc).unwrap();
            enc.into_bytes()
        }
    }
}
