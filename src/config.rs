//! # Kernel Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time — no dynamic allocation.

/// Maximum number of tasks the system can manage simultaneously, including
/// the idle task created by [`crate::kernel::sys_init`].
///
/// This bounds the static TCB array. Increase with care — each task
/// consumes `STACK_SIZE` bytes of RAM.
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. Determines scheduler tick granularity.
pub const TICK_HZ: u32 = 1000;

/// Default time slice in ticks. A task runs for this many ticks before
/// the scheduler preempts it in favor of the next ready task at the same
/// priority (round-robin within a band).
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Per-task stack size in bytes. Must be large enough for the deepest
/// call chain plus the hardware exception frame (32 bytes) and the
/// software-saved context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// Priority assigned to the idle task. Priorities are smaller-is-higher,
/// so the idle task gets the numerically largest (lowest) priority.
pub const IDLE_PRIORITY: u8 = u8::MAX;

/// Width, in bytes, of the little-endian length prefix stored ahead of
/// every frame in a message buffer. Fixed at 16 bits to decouple the
/// wire format from a host's native `unsigned` width.
pub const MSG_PREFIX_BYTES: usize = 2;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
