//! # Task Control Block
//!
//! The TCB is the unit of scheduling: one per task, stored inline in a
//! static array (the task pool) owned by the [`crate::scheduler::Scheduler`].
//! No task is ever heap-allocated, moved, or freed — a "free" slot is
//! simply a TCB with `active == false` waiting to be reinitialized.
//!
//! A TCB carries two independent embedded link fields (see [`crate::list`]):
//! `link`, used by the ready list *or* by whichever wait queue currently
//! holds the task (never both at once), and `timer_link`, used only by the
//! process-wide timer list. A task with a finite timeout is linked into
//! both simultaneously.

use crate::config::{DEFAULT_TIME_SLICE, MAX_TASKS, STACK_SIZE};
use crate::error::Event;
use crate::list::{TaskLink, TaskList, ReadyOrWait};
use crate::tick::Tick;

/// Index of a task within the task pool. Stable for the task's lifetime.
pub type TaskId = usize;

/// The static array of TCBs the whole kernel operates over.
pub type TaskPool = [TaskControlBlock; MAX_TASKS];

/// A task's entry point: called with the single `arg` word supplied at
/// creation. Never expected to return — the trampoline sends a task whose
/// entry does return into a parked `task_exit` loop (see
/// [`crate::scheduler::task_exit`]).
pub type TaskEntry = extern "C" fn(usize);

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///        create()                  schedule()
///   NEW ──────────► READY ───────────────────────► RUNNING
///                      ▲                               │
///                      │         preempt / time slice   │
///                      └───────────────────────────────┘
///                      ▲                               │
///                      │            wake()              │  wait()
///                      │                                ▼
///             BLOCKED ◄─────────────────────────── (parked)
///                      │
///                      │  (finite timeout also links the timer list)
///                      ▼
///                  DELAYED ──── timeout / wake() ──► READY
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but never yet dispatched.
    New,
    /// Ready to run, linked into the ready list.
    Ready,
    /// Currently executing — the ready list's head.
    Running,
    /// Parked on a wait queue with no timeout; only `wake` resumes it.
    Blocked,
    /// Parked on a wait queue *and* the timer list; either `wake` or the
    /// timer deadline elapsing resumes it.
    Delayed,
    /// Suspended by the kernel; not eligible for scheduling or for the
    /// ready list until explicitly resumed.
    Suspended,
    /// Finished; the slot is reclaimable.
    Terminated,
}

// ---------------------------------------------------------------------------
// Task configuration (fixed at creation)
// ---------------------------------------------------------------------------

/// Static configuration for a task, supplied at creation time.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Base priority. Smaller value means higher priority; fixed for the
    /// task's lifetime — this core does not implement priority inheritance.
    pub priority: u8,

    /// Time slice in ticks. `0` means "use [`DEFAULT_TIME_SLICE`]".
    pub time_slice: u32,
}

impl TaskConfig {
    /// The time slice actually used, substituting the system default for
    /// an unset (`0`) value.
    #[inline]
    pub const fn effective_time_slice(&self) -> u32 {
        if self.time_slice > 0 {
            self.time_slice
        } else {
            DEFAULT_TIME_SLICE
        }
    }
}

// ---------------------------------------------------------------------------
// Pending I/O — the "waker performs the transfer" handoff
// ---------------------------------------------------------------------------

/// A raw view into a blocked caller's still-live stack frame, left behind
/// so that whichever task wakes it can copy data directly into or out of
/// it before publishing the wake event.
///
/// This is how the wait/wake framework's happens-before guarantee is
/// actually realized: a wake that publishes a value into the event slot
/// happens-before the woken task's resumption observes it. Rather than
/// waking the task and hoping it re-acquires the resource on a retry
/// loop (which a higher-priority task could race ahead of), the waker
/// does the transfer itself while still holding the critical section,
/// then marks the peer Ready with the outcome already decided.
#[derive(Clone, Copy)]
pub struct PendingIo {
    pub ptr: *mut u8,
    pub len: usize,
}

// Safety: `ptr` always points into the owning task's own stack-resident
// buffer, which stays alive and untouched while the task is parked (the
// task cannot run concurrently with the critical section that reads or
// writes through this pointer).
unsafe impl Send for PendingIo {}
unsafe impl Sync for PendingIo {}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// The Task Control Block: everything the kernel needs to schedule,
/// context-switch, and park/wake a task.
pub struct TaskControlBlock {
    /// Index into the task pool; identical to this TCB's [`TaskId`].
    pub id: TaskId,

    /// Current execution state.
    pub state: TaskState,

    /// Fixed configuration (priority, time slice).
    pub config: TaskConfig,

    /// Ready-or-wait embedded link. Used by the ready list when `Ready`
    /// or `Running`; used by a waitable object's wait queue when
    /// `Blocked` or `Delayed`. Never both at once.
    pub link: TaskLink,

    /// Timer-list embedded link. Populated only while `state == Delayed`.
    pub timer_link: TaskLink,

    /// Absolute wakeup deadline, valid only while `state == Delayed`.
    pub deadline: Option<Tick>,

    /// Back-reference to whichever wait queue currently holds this task,
    /// so that a timeout can dequeue it from the right list without the
    /// waitable object needing to be consulted. `None` whenever the task
    /// is not parked on any wait queue (including while on the timer list
    /// for a plain `sleep_for`/`sleep_until`, which has no wait queue).
    pub wait_queue: Option<*mut TaskList<ReadyOrWait>>,

    /// Left behind by a blocking call so the task that eventually wakes
    /// this one can transfer data directly into/out of its stack frame.
    pub pending_io: Option<PendingIo>,

    /// The outcome of the most recent wait, published by whichever woke
    /// this task (or by the timeout path). Read by the blocking call
    /// immediately after it resumes.
    pub wake_event: Option<Event>,

    /// Entry function, called with `arg` on first dispatch. `None` for an
    /// unallocated slot.
    pub entry: Option<TaskEntry>,
    pub arg: usize,

    /// Saved stack pointer (PSP), updated on every context switch.
    pub stack_pointer: *mut u32,

    /// Per-task stack memory, 8-byte aligned per the ARM AAPCS.
    #[repr(align(8))]
    pub stack: [u8; STACK_SIZE],

    /// Ticks remaining in the current time slice.
    pub ticks_remaining: u32,

    /// Whether this slot holds a live task (`true`) or is free (`false`).
    pub active: bool,
}

// Safety: the raw pointers here (`wait_queue`, `stack_pointer`) are only
// ever dereferenced from within a kernel critical section, and each points
// either into this task's own stack or into a wait queue that outlives the
// task's membership in it.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An empty (unallocated) TCB, used to fill the static task pool.
    pub const fn empty() -> Self {
        Self {
            id: 0,
            state: TaskState::Terminated,
            config: TaskConfig {
                priority: 0,
                time_slice: 0,
            },
            link: TaskLink::new(),
            timer_link: TaskLink::new(),
            deadline: None,
            wait_queue: None,
            pending_io: None,
            wake_event: None,
            entry: None,
            arg: 0,
            stack_pointer: core::ptr::null_mut(),
            stack: [0u8; STACK_SIZE],
            ticks_remaining: 0,
            active: false,
        }
    }

    /// Initialize a freshly allocated slot for a new task. Leaves the
    /// task in state `New`; the caller links it into the ready list and
    /// transitions it to `Ready` once its initial stack frame is built
    /// (see [`crate::scheduler::init_task_stack`]).
    pub fn init(&mut self, id: TaskId, config: TaskConfig, entry: TaskEntry, arg: usize) {
        self.id = id;
        self.state = TaskState::New;
        self.config = config;
        self.link = TaskLink::new();
        self.timer_link = TaskLink::new();
        self.deadline = None;
        self.wait_queue = None;
        self.pending_io = None;
        self.wake_event = None;
        self.entry = Some(entry);
        self.arg = arg;
        self.ticks_remaining = config.effective_time_slice();
        self.active = true;
    }

    /// Whether this task is eligible to be scheduled right now.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Whether this task is parked waiting on something (an object, a
    /// timer, or both).
    #[inline]
    pub fn is_waiting(&self) -> bool {
        matches!(self.state, TaskState::Blocked | TaskState::Delayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry(_arg: usize) {}

    #[test]
    fn empty_tcb_is_inactive_and_terminated() {
        let tcb = TaskControlBlock::empty();
        assert!(!tcb.active);
        assert_eq!(tcb.state, TaskState::Terminated);
    }

    #[test]
    fn init_sets_new_state_and_time_slice() {
        let mut tcb = TaskControlBlock::empty();
        let config = TaskConfig {
            priority: 5,
            time_slice: 15,
        };
        tcb.init(2, config, dummy_entry, 0xdead);

        assert!(tcb.active);
        assert_eq!(tcb.state, TaskState::New);
        assert_eq!(tcb.config.priority, 5);
        assert_eq!(tcb.ticks_remaining, 15);
        assert_eq!(tcb.arg, 0xdead);
        assert!(tcb.wait_queue.is_none());
        assert!(tcb.pending_io.is_none());
    }

    #[test]
    fn init_falls_back_to_default_time_slice() {
        let mut tcb = TaskControlBlock::empty();
        let config = TaskConfig {
            priority: 1,
            time_slice: 0,
        };
        tcb.init(0, config, dummy_entry, 0);
        assert_eq!(tcb.ticks_remaining, DEFAULT_TIME_SLICE);
    }

    #[test]
    fn is_runnable_reflects_state() {
        let mut tcb = TaskControlBlock::empty();
        tcb.init(0, TaskConfig { priority: 0, time_slice: 0 }, dummy_entry, 0);
        assert!(!tcb.is_runnable(), "New tasks are not yet runnable");

        tcb.state = TaskState::Ready;
        assert!(tcb.is_runnable());

        tcb.state = TaskState::Running;
        assert!(tcb.is_runnable());

        tcb.state = TaskState::Blocked;
        assert!(!tcb.is_runnable());
        assert!(tcb.is_waiting());
    }

    #[test]
    fn delayed_state_is_both_waiting_and_timed() {
        let mut tcb = TaskControlBlock::empty();
        tcb.init(0, TaskConfig { priority: 0, time_slice: 0 }, dummy_entry, 0);
        tcb.state = TaskState::Delayed;
        tcb.deadline = Some(1234);
        assert!(tcb.is_waiting());
        assert_eq!(tcb.deadline, Some(1234));
    }
}
