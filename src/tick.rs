//! # Timekeeping
//!
//! The monotonic tick counter and the deadline arithmetic built on top of
//! it. A [`Tick`] wraps silently; every comparison between two ticks goes
//! through [`before`], which compares the *signed* difference rather than
//! the raw values so that a list sorted by deadline stays correctly
//! ordered across wraparound.

/// A point in time, measured in SysTick ticks since `sys_init()`.
///
/// 32 bits at [`crate::config::TICK_HZ`] (1 kHz) wrap around after about
/// 49.7 days; [`before`] is wraparound-safe as long as the two ticks being
/// compared are never more than `u32::MAX / 2` ticks apart, which holds
/// for any deadline computed by adding a plausible delay to "now".
pub type Tick = u32;

/// Returns `true` if `a` is before `b` on the tick timeline, tolerating
/// wraparound by comparing the signed difference `a - b`.
///
/// This is the comparison the timer list and every deadline check use
/// instead of `a < b`, which would misorder entries once the tick counter
/// wraps past `u32::MAX`.
#[inline]
pub const fn before(a: Tick, b: Tick) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Returns `true` if `a` is at or before `b` on the tick timeline.
#[inline]
pub const fn at_or_before(a: Tick, b: Tick) -> bool {
    (a.wrapping_sub(b) as i32) <= 0
}

/// A requested wait duration, as accepted by every blocking wait
/// primitive operation.
///
/// `IMMEDIATE` and `INFINITE` are the two sentinels recognized everywhere
/// a deadline is accepted: `IMMEDIATE` never blocks — effectively the
/// same code path as the non-blocking variant of the same operation —
/// and `INFINITE` blocks without ever being linked into the timer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Do not block; fail fast with `TIMEOUT` if the operation cannot
    /// complete inline. ISR-safe.
    Immediate,
    /// Block without a timer entry — wait as long as it takes.
    Infinite,
    /// Block for up to this many ticks from the moment the call blocks.
    Ticks(u32),
    /// Block until this absolute tick, rather than a duration from now.
    Until(Tick),
}

impl Delay {
    /// Resolve this delay to an absolute deadline given the current tick,
    /// if it implies one. `Immediate` and `Infinite` have no deadline.
    #[inline]
    pub const fn deadline(self, now: Tick) -> Option<Tick> {
        match self {
            Delay::Immediate | Delay::Infinite => None,
            Delay::Ticks(d) => Some(now.wrapping_add(d)),
            Delay::Until(t) => Some(t),
        }
    }

    #[inline]
    pub const fn is_immediate(self) -> bool {
        matches!(self, Delay::Immediate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_handles_simple_order() {
        assert!(before(1, 2));
        assert!(!before(2, 1));
        assert!(!before(5, 5));
    }

    #[test]
    fn before_handles_wraparound() {
        let near_max = u32::MAX - 2;
        let wrapped = 3u32; // wrapped past u32::MAX
        assert!(before(near_max, wrapped));
        assert!(!before(wrapped, near_max));
    }

    #[test]
    fn at_or_before_includes_equal() {
        assert!(at_or_before(5, 5));
        assert!(at_or_before(4, 5));
        assert!(!at_or_before(6, 5));
    }

    #[test]
    fn delay_deadline_resolution() {
        assert_eq!(Delay::Immediate.deadline(100), None);
        assert_eq!(Delay::Infinite.deadline(100), None);
        assert_eq!(Delay::Ticks(10).deadline(100), Some(110));
        assert_eq!(Delay::Until(250).deadline(100), Some(250));
    }

    #[test]
    fn ticks_deadline_wraps() {
        assert_eq!(Delay::Ticks(10).deadline(u32::MAX - 2), Some(7));
    }
}
