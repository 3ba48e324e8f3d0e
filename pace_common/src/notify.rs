//! Task-notification bit word.
//!
//! The tick dispatcher posts a single word to every subscribed task; tasks
//! test individual bits. Bit 2 is the periodic tick, matching the wire
//! convention of the board firmware's notification mask.

use bitflags::bitflags;

bitflags! {
    /// Bits carried by one task notification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NotifyBits: u32 {
        /// Run-start request.
        const START    = 0x01;
        /// Run-stop request.
        const STOP     = 0x02;
        /// 1 ms periodic tick.
        const PERIODIC = 0x04;
    }
}

impl Default for NotifyBits {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_is_bit_two() {
        assert_eq!(NotifyBits::PERIODIC.bits(), 0b100);
    }

    #[test]
    fn bits_combine_and_test() {
        let n = NotifyBits::PERIODIC | NotifyBits::STOP;
        assert!(n.contains(NotifyBits::PERIODIC));
        assert!(n.contains(NotifyBits::STOP));
        assert!(!n.contains(NotifyBits::START));
    }
}
