//! Event and composite-event bit masks (32-bit throughout, per the
//! spec's resolution of the `composite_event_mask` bit-width ambiguity
//! found in the original source).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EventMask: u32 {
        const OFFSET_IN_RANGE = 1 << 0;
        const SYNCED_TO_GM    = 1 << 1;
        const AS_CAPABLE      = 1 << 2;
        const GM_CHANGED      = 1 << 3;
    }
}

/// The composite mask is a subset of `{AsCapable, SyncedToGm, OffsetInRange}`,
/// AND-combined. Reuses `EventMask`'s bit positions; `GM_CHANGED` is not a
/// legal composite member but is rejected at subscription admission time,
/// not at the type level.
pub type CompositeMask = EventMask;

/// Bits legal inside a composite mask.
pub const COMPOSITE_LEGAL_BITS: EventMask = EventMask::from_bits_truncate(
    EventMask::OFFSET_IN_RANGE.bits() | EventMask::SYNCED_TO_GM.bits() | EventMask::AS_CAPABLE.bits(),
);

impl Default for EventMask {
    fn default() -> Self {
        EventMask::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_legal_bits_excludes_gm_changed() {
        assert!(!COMPOSITE_LEGAL_BITS.contains(EventMask::GM_CHANGED));
        assert!(COMPOSITE_LEGAL_BITS.contains(EventMask::AS_CAPABLE));
    }
}
