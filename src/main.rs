//! # EqOS Example Firmware
//!
//! Demonstrates the kernel core end to end: a producer and a consumer
//! task exchanging frames over a shared [`MessageBuffer`], alongside a
//! periodic task and a sporadic high-priority task that only use the
//! scheduler's timing and yield primitives. The idle task is created
//! automatically by [`kernel::sys_init`].
//!
//! | Task | Priority | Role |
//! |------|----------|------|
//! | `producer_task` | 2 | Sends a growing counter frame every tick, blocking while the buffer is full |
//! | `consumer_task` | 2 | Drains frames, blocking while the buffer is empty |
//! | `periodic_task` | 3 | Wakes every 100 ticks via `sleep_for`, does fixed work, sleeps again |
//! | `sporadic_task` | 1 | Short burst of work, then yields until next burst |
//! | idle | 255 (lowest) | `wfi` loop — created by `sys_init` |

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use eqos::kernel;
use eqos::msgbuf::MessageBuffer;
use eqos::task::TaskConfig;

/// Capacity of the shared message buffer, in bytes (prefixes included).
const MSG_BUF_LIMIT: usize = 64;

/// The buffer producer/consumer tasks exchange frames through.
///
/// Follows the same static-plus-raw-pointer pattern [`kernel`] uses for
/// the scheduler: initialized once in `main`, then reached by every task
/// through the pointer below, since tasks cannot otherwise share a
/// mutable reference across their independent stacks.
static mut MSG_BUF: MessageBuffer<MSG_BUF_LIMIT> = MessageBuffer::new();
static mut MSG_BUF_PTR: *mut MessageBuffer<MSG_BUF_LIMIT> = core::ptr::null_mut();

fn msg_buf() -> &'static mut MessageBuffer<MSG_BUF_LIMIT> {
    unsafe { &mut *MSG_BUF_PTR }
}

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Sends an incrementing 4-byte counter frame once per tick, blocking
/// (`msg_send`) whenever the buffer has no room — exercising the
/// blocking-send side of the wait/wake framework.
extern "C" fn producer_task(_arg: usize) {
    let mut counter: u32 = 0;
    loop {
        let frame = counter.to_le_bytes();
        kernel::msg_send(msg_buf(), &frame);
        counter = counter.wrapping_add(1);
        kernel::sleep_for(1);
    }
}

/// Drains one frame at a time, blocking (`msg_wait`) whenever the buffer
/// is empty — exercising the blocking-receive side.
extern "C" fn consumer_task(_arg: usize) {
    let mut out = [0u8; 4];
    loop {
        let n = kernel::msg_wait(msg_buf(), &mut out);
        let _counter = if n == 4 { u32::from_le_bytes(out) } else { 0 };
        // A real consumer would act on `_counter` here.
    }
}

/// Periodic task: wakes every 100 ticks, does a fixed amount of work,
/// and sleeps again — the `sleep_for`/`sleep_until` half of the task
/// lifecycle API.
extern "C" fn periodic_task(_arg: usize) {
    loop {
        let mut work: u32 = 0;
        for _ in 0..5000 {
            work = work.wrapping_add(1);
        }
        let _ = work;
        kernel::sleep_for(100);
    }
}

/// Sporadic task: a short burst of work followed by a voluntary yield,
/// standing in for an event-driven task that has nothing to do between
/// bursts other than give up the remainder of its time slice.
extern "C" fn sporadic_task(_arg: usize) {
    loop {
        let mut result: u32 = 0;
        for _ in 0..2000 {
            result = result.wrapping_add(1);
        }
        let _ = result;
        kernel::yield_task();
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point: initializes the kernel, wires up the shared
/// message buffer, creates the demo tasks, and starts the scheduler.
/// Never returns.
#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::sys_init();

    unsafe {
        MSG_BUF_PTR = &mut MSG_BUF as *mut MessageBuffer<MSG_BUF_LIMIT>;
    }

    kernel::create_task(
        producer_task,
        0,
        TaskConfig {
            priority: 2,
            time_slice: 10,
        },
    )
    .expect("failed to create producer_task");

    kernel::create_task(
        consumer_task,
        0,
        TaskConfig {
            priority: 2,
            time_slice: 10,
        },
    )
    .expect("failed to create consumer_task");

    kernel::create_task(
        periodic_task,
        0,
        TaskConfig {
            priority: 3,
            time_slice: 10,
        },
    )
    .expect("failed to create periodic_task");

    kernel::create_task(
        sporadic_task,
        0,
        TaskConfig {
            priority: 1,
            time_slice: 5,
        },
    )
    .expect("failed to create sporadic_task");

    kernel::sys_start(cp)
}
