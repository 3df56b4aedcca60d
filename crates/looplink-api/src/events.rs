//! I/O interest and condition mask

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// Bitmask of I/O interests (what a watch asks for) and conditions (what the
/// foreign loop observed). The same mask type is used in both directions, so
/// `observed & requested` yields the reportable readiness.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IoEvents(u8);

impl IoEvents {
    /// Empty mask.
    pub const NONE: IoEvents = IoEvents(0);

    /// Readable interest/condition.
    pub const READABLE: IoEvents = IoEvents(0b01);

    /// Writable interest/condition.
    pub const WRITABLE: IoEvents = IoEvents(0b10);

    /// True if no bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: IoEvents) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit representation.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Reconstruct from raw bits; unknown bits are dropped.
    pub fn from_bits(bits: u8) -> IoEvents {
        IoEvents(bits & (Self::READABLE.0 | Self::WRITABLE.0))
    }
}

impl BitOr for IoEvents {
    type Output = IoEvents;

    fn bitor(self, rhs: IoEvents) -> IoEvents {
        IoEvents(self.0 | rhs.0)
    }
}

impl BitOrAssign for IoEvents {
    fn bitor_assign(&mut self, rhs: IoEvents) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for IoEvents {
    type Output = IoEvents;

    fn bitand(self, rhs: IoEvents) -> IoEvents {
        IoEvents(self.0 & rhs.0)
    }
}

impl BitAndAssign for IoEvents {
    fn bitand_assign(&mut self, rhs: IoEvents) {
        self.0 &= rhs.0;
    }
}

impl fmt::Debug for IoEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Self::READABLE), self.contains(Self::WRITABLE)) {
            (true, true) => write!(f, "IoEvents(READABLE | WRITABLE)"),
            (true, false) => write!(f, "IoEvents(READABLE)"),
            (false, true) => write!(f, "IoEvents(WRITABLE)"),
            (false, false) => write!(f, "IoEvents(NONE)"),
        }
    }
}
