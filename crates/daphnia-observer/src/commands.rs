//! Per-tick message deduplication.
//!
//! At most one message of each kind is honored per observer per tick.
//! Later duplicates in the same tick are counted as skipped, which feeds
//! the server/client rate statistics.

/// Set of message type bytes already handled this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandledKinds {
    bits: u128,
}

impl HandledKinds {
    /// Mark `type_byte` handled. Returns `false` if it already was.
    pub fn claim(&mut self, type_byte: u8) -> bool {
        let Some(mask) = 1_u128.checked_shl(u32::from(type_byte)) else {
            // Type bytes past 127 are never deduplicated.
            return true;
        };
        if self.bits & mask != 0 {
            return false;
        }
        self.bits |= mask;
        true
    }

    /// Whether `type_byte` was handled this tick.
    pub fn contains(&self, type_byte: u8) -> bool {
        match 1_u128.checked_shl(u32::from(type_byte)) {
            Some(mask) => self.bits & mask != 0,
            None => false,
        }
    }

    /// Forget everything (start of a new tick).
    pub const fn clear(&mut self) {
        self.bits = 0;
    }
}
