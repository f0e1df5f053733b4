//! The data model shared by every crate: time-base configuration,
//! per-source snapshots, and subscription thresholds.

use serde::{Deserialize, Serialize};

use crate::codec::{Decoder, Encoder};
use crate::error::ClkmgrError;

/// Configuration-immutable description of a time base, as handed out in
/// a `Connect` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBaseCfg {
    pub time_base_index: u32,
    pub name: String,
    pub interface_name: String,
    pub transport_specific: u8,
    pub domain_number: u8,
    pub have_sys: bool,
    pub have_ptp: bool,
}

impl TimeBaseCfg {
    pub fn encode(&self, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_u32(self.time_base_index)?;
        enc.put_str(&self.name)?;
        enc.put_str(&self.interface_name)?;
        enc.put_u8(self.transport_specific)?;
        enc.put_u8(self.domain_number)?;
        enc.put_bool(self.have_sys)?;
        enc.put_bool(self.have_ptp)?;
        Ok(())
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        Ok(TimeBaseCfg {
            time_base_index: dec.get_u32()?,
            name: dec.get_str()?,
            interface_name: dec.get_str()?,
            transport_specific: dec.get_u8()?,
            domain_number: dec.get_u8()?,
            have_sys: dec.get_bool()?,
            have_ptp: dec.get_bool()?,
        })
    }
}

/// One PTP instance's latest polled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtpSnapshot {
    pub offset_ns: i64,
    pub gm_identity: [u8; 8],
    pub as_capable: bool,
    pub synced_to_primary: bool,
    pub instance_id: u8,
    pub sync_interval_us: i64,
}

impl PtpSnapshot {
    pub fn encode(&self, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_i64(self.offset_ns)?;
        enc.put_fixed_array(&self.gm_identity)?;
        enc.put_bool(self.as_capable)?;
        enc.put_bool(self.synced_to_primary)?;
        enc.put_u8(self.instance_id)?;
        enc.put_i64(self.sync_interval_us)?;
        Ok(())
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        Ok(PtpSnapshot {
            offset_ns: dec.get_i64()?,
            gm_identity: dec.get_fixed_array::<8>()?,
            as_capable: dec.get_bool()?,
            synced_to_primary: dec.get_bool()?,
            instance_id: dec.get_u8()?,
            sync_interval_us: dec.get_i64()?,
        })
    }
}

/// One system (chrony) instance's latest polled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysSnapshot {
    pub offset_ns: i64,
    pub reference_id: u32,
    pub poll_interval_us: i64,
}

impl SysSnapshot {
    pub fn encode(&self, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_i64(self.offset_ns)?;
        enc.put_u32(self.reference_id)?;
        enc.put_i64(self.poll_interval_us)?;
        Ok(())
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        Ok(SysSnapshot {
            offset_ns: dec.get_i64()?,
            reference_id: dec.get_u32()?,
            poll_interval_us: dec.get_i64()?,
        })
    }
}

/// Which clock snapshots are present in a `Notify` or `Subscribe` reply.
pub const WHICH_PTP: u8 = 0x01;
pub const WHICH_SYS: u8 = 0x02;
pub const WHICH_BOTH: u8 = 0x03;

/// The aggregated state for one time base, as cached by the proxy and
/// handed to a freshly subscribed client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBaseSnapshot {
    pub ptp: Option<PtpSnapshot>,
    pub sys: Option<SysSnapshot>,
}

impl TimeBaseSnapshot {
    pub fn which(&self) -> u8 {
        let mut w = 0u8;
        if self.ptp.is_some() {
            w |= WHICH_PTP;
        }
        if self.sys.is_some() {
            w |= WHICH_SYS;
        }
        w
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_u8(self.which())?;
        if let Some(ptp) = &self.ptp {
            ptp.encode(enc)?;
        }
        if let Some(sys) = &self.sys {
            sys.encode(enc)?;
        }
        Ok(())
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        let which = dec.get_u8()?;
        let ptp = if which & WHICH_PTP != 0 {
            Some(PtpSnapshot::decode(dec)?)
        } else {
            None
        };
        let sys = if which & WHICH_SYS != 0 {
            Some(SysSnapshot::decode(dec)?)
        } else {
            None
        };
        Ok(TimeBaseSnapshot { ptp, sys })
    }
}

/// Which logical quantity a `Threshold` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ThresholdKind {
    GmOffset = 0,
    SysOffset = 1,
}

impl ThresholdKind {
    pub fn from_u8(v: u8) -> Result<Self, ClkmgrError> {
        match v {
            0 => Ok(ThresholdKind::GmOffset),
            1 => Ok(ThresholdKind::SysOffset),
            other => Err(ClkmgrError::MalformedField(format!(
                "unknown threshold kind {other}"
            ))),
        }
    }
}

/// Inclusive-exclusive-on-neither bound, i.e. strict `lower < x < upper`.
/// Admission rule: `upper > lower`, checked by `Threshold::new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub kind: ThresholdKind,
    pub lower: i32,
    pub upper: i32,
}

impl Threshold {
    pub fn new(kind: ThresholdKind, lower: i32, upper: i32) -> Result<Self, ClkmgrError> {
        if upper <= lower {
            return Err(ClkmgrError::InvalidThreshold { upper, lower });
        }
        Ok(Threshold { kind, lower, upper })
    }

    pub fn in_range(&self, value: i64) -> bool {
        (self.lower as i64) < value && value < (self.upper as i64)
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<(), ClkmgrError> {
        enc.put_u8(self.kind as u8)?;
        enc.put_i32(self.upper)?;
        enc.put_i32(self.lower)?;
        Ok(())
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, ClkmgrError> {
        let kind = ThresholdKind::from_u8(dec.get_u8()?)?;
        let upper = dec.get_i32()?;
        let lower = dec.get_i32()?;
        Threshold::new(kind, lower, upper)
    }
}
