//! # EqOS — a preemptive real-time executive for Cortex-M4
//!
//! A small, `no_std` kernel core: a priority-based preemptive scheduler,
//! a deferred context-switch protocol (PendSV), a tick-driven timer
//! wheel, and a generic blocking-primitive framework that every waitable
//! object — here, the message buffer — is built on.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     Application tasks                      │
//! ├───────────────────────────────────────────────────────────┤
//! │                  Kernel API (kernel.rs)                     │
//! │   sys_init() · create_task() · sys_start() · yield_task()   │
//! │           msg_wait/msg_send/msg_take/msg_give/...            │
//! ├──────────────┬──────────────────┬───────────────────────────┤
//! │  Scheduler   │  Message buffer  │   Synchronization          │
//! │  scheduler.rs│  msgbuf.rs       │   sync.rs                  │
//! │  ─ tick()    │  ─ wait/send     │   ─ critical_section()     │
//! │  ─ schedule()│  ─ take/give/push│                            │
//! │  ─ park/wake │  ─ kill/delete   │                            │
//! ├──────────────┴──────────────────┴───────────────────────────┤
//! │   Intrusive list (list.rs) · TCB (task.rs) · tick (tick.rs)  │
//! ├───────────────────────────────────────────────────────────┤
//! │              Arch port (arch/cortex_m4.rs)                  │
//! │     PendSV · SysTick · context switch · stack init           │
//! ├───────────────────────────────────────────────────────────┤
//! │               ARM Cortex-M4 hardware (Thumb-2)               │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling model
//!
//! Static-priority preemptive scheduling (smaller value = higher
//! priority), round-robin within a priority band. The ready list is kept
//! sorted on every mutation, so dispatch is an O(1) head read. All
//! kernel data is protected by raising the interrupt-priority mask
//! ([`sync::critical_section`]) rather than per-object locks; the sole
//! suspension point is leaving that critical section inside the
//! wait/wake framework ([`scheduler::Scheduler::park`]).
//!
//! ## Memory model
//!
//! - No heap, no `alloc` — every task pool and buffer is statically
//!   sized at compile time (see [`config`]).
//! - Fixed-size TCB array (`config::MAX_TASKS` slots).
//! - Per-task stack inline in its TCB (`config::STACK_SIZE` bytes).
//! - All shared mutable state is touched only from within
//!   [`sync::critical_section`].

#![no_std]

pub mod arch;
pub mod config;
pub mod error;
pub mod kernel;
pub mod list;
pub mod msgbuf;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod tick;
