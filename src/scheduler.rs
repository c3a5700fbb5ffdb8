//! # Scheduler
//!
//! The preemptive, priority-based scheduler core: the ready list, the
//! timer list, and the generic wait/wake framework every blocking
//! primitive (currently just the message buffer) is built on.
//!
//! ## Scheduling algorithm
//!
//! The ready list is kept sorted ascending by priority at all times, so
//! [`Scheduler::schedule`] is an O(1) head read rather than a linear scan.
//! Insertion (`create_task`, `wake_one`/`wake_all`, a time-sliced task
//! re-joining its priority band) is O(n) in the number of ready tasks,
//! an acceptable tradeoff for the timer list too: simplicity over a
//! fixed, small task count.
//!
//! Every SysTick, [`Scheduler::tick`]:
//! 1. decrements the running task's time slice, requeuing it at the tail
//!    of its priority band (round-robin within a band) on expiry;
//! 2. walks the timer list, waking with `Event::Timeout` any task whose
//!    deadline has elapsed.
//!
//! Either can set `needs_reschedule`, which the SysTick/PendSV handlers
//! consult to decide whether to actually pend a context switch.

use crate::config::MAX_TASKS;
use crate::error::{Event, KernelError};
use crate::list::{ReadyOrWait, TaskList, TimerList};
use crate::task::{PendingIo, TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskPool, TaskState};
use crate::tick::{Delay, Tick};

/// The central scheduler state: the task pool, the ready list, the timer
/// list, and bookkeeping for the currently running task.
///
/// Stored as a single global behind a raw pointer in `kernel.rs`, exactly
/// as the interrupt handlers need to reach it without taking a borrow
/// that would outlive a single critical section.
pub struct Scheduler {
    /// Every TCB, allocated or not. Index 0 is reserved for the idle task
    /// created by [`crate::kernel::sys_init`].
    pub tasks: TaskPool,

    /// Ready-list cursor. Sorted ascending by priority; the head is
    /// always the task to dispatch next.
    pub ready: TaskList<ReadyOrWait>,

    /// Process-wide timer list, sorted ascending by deadline.
    pub timer: TaskList<TimerList>,

    /// Index of the currently running task. `None` only before the first
    /// `schedule()` call.
    pub current: Option<TaskId>,

    /// Number of allocated task slots (including idle).
    pub task_count: usize,

    /// Monotonic tick counter, advanced once per `tick()` call.
    pub tick_count: Tick,

    /// Set whenever `tick()` or the wait/wake framework changes the
    /// ready list in a way that might change who should be running.
    pub needs_reschedule: bool,
}

impl Scheduler {
    /// A scheduler with no tasks yet. [`crate::kernel::sys_init`] creates
    /// the idle task immediately after constructing this.
    pub const fn new() -> Self {
        Self {
            tasks: [const { TaskControlBlock::empty() }; MAX_TASKS],
            ready: TaskList::new(),
            timer: TaskList::new(),
            current: None,
            task_count: 0,
            tick_count: 0,
            needs_reschedule: false,
        }
    }

    /// Register a new task, build its initial stack frame, and place it
    /// on the ready list.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        arg: usize,
        config: TaskConfig,
    ) -> Result<TaskId, KernelError> {
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::TooManyTasks);
        }

        let id = self.task_count;
        self.tasks[id].init(id, config, entry, arg);
        init_task_stack(&mut self.tasks[id], entry, arg);
        self.tasks[id].state = TaskState::Ready;

        self.ready.insert_by(&mut self.tasks, id, |a, b, pool| {
            pool[a].config.priority < pool[b].config.priority
        });

        self.task_count += 1;
        Ok(id)
    }

    /// Called once per SysTick. Returns whether a reschedule is now due.
    pub fn tick(&mut self) -> bool {
        self.tick_count = self.tick_count.wrapping_add(1);

        if let Some(current) = self.current {
            if self.tasks[current].active && self.tasks[current].ticks_remaining > 0 {
                self.tasks[current].ticks_remaining -= 1;
                if self.tasks[current].ticks_remaining == 0 {
                    self.requeue_after_time_slice(current);
                }
            }
        }

        self.expire_timers();

        self.needs_reschedule
    }

    /// Move a task whose time slice has expired to the tail of its
    /// priority band (round-robin within a band) and refresh its slice.
    fn requeue_after_time_slice(&mut self, idx: TaskId) {
        self.tasks[idx].state = TaskState::Ready;
        self.tasks[idx].ticks_remaining = self.tasks[idx].config.effective_time_slice();

        self.ready.remove(&mut self.tasks, idx);
        let priority = self.tasks[idx].config.priority;
        self.ready.insert_by(&mut self.tasks, idx, |_, node, pool| {
            // Behind all tasks of equal-or-higher priority: only strictly
            // lower-priority (numerically larger) nodes are "before" us.
            priority < pool[node].config.priority
        });

        self.needs_reschedule = true;
    }

    /// Wake, with `Event::Timeout`, every timer-list entry whose deadline
    /// has elapsed.
    fn expire_timers(&mut self) {
        while let Some(idx) = self.timer.front() {
            let deadline = match self.tasks[idx].deadline {
                Some(d) => d,
                None => break,
            };
            if !crate::tick::at_or_before(deadline, self.tick_count) {
                break;
            }

            self.timer.remove(&mut self.tasks, idx);

            if let Some(queue_ptr) = self.tasks[idx].wait_queue.take() {
                // Safety: `wait_queue` only ever points at a `TaskList`
                // owned by the waitable object this task is parked on,
                // which outlives the task's membership in it — the task
                // cannot be removed from it from anywhere but inside a
                // critical section, which we are already in.
                let queue = unsafe { &mut *queue_ptr };
                queue.remove(&mut self.tasks, idx);
            }

            self.wake_resume(idx, Event::Timeout);
        }
    }

    /// Select the next task to run: the ready list's head.
    ///
    /// Never returns a task incapable of running — the idle task is
    /// always ready — so this is total.
    pub fn schedule(&mut self) -> TaskId {
        let next = self
            .ready
            .front()
            .expect("ready list is empty; idle task must always be ready");

        if let Some(prev) = self.current {
            if self.tasks[prev].state == TaskState::Running {
                self.tasks[prev].state = TaskState::Ready;
            }
        }

        self.tasks[next].state = TaskState::Running;
        self.current = Some(next);
        self.needs_reschedule = false;
        next
    }

    /// Voluntarily yield the CPU: requeue the current task at the tail of
    /// its priority band and request a reschedule.
    pub fn yield_current(&mut self) {
        if let Some(current) = self.current {
            self.requeue_after_time_slice(current);
        }
    }

    /// Suspend `idx`: remove it from the ready list (or its wait queue,
    /// canceling any pending timeout) and mark it
    /// [`TaskState::Suspended`], making it ineligible for scheduling
    /// until [`Scheduler::resume`] is called.
    pub fn suspend(&mut self, idx: TaskId) {
        if self.tasks[idx].state == TaskState::Suspended {
            return;
        }

        self.cancel_timer(idx);
        if let Some(queue_ptr) = self.tasks[idx].wait_queue.take() {
            // Safety: see `expire_timers` — same invariant applies.
            let queue = unsafe { &mut *queue_ptr };
            queue.remove(&mut self.tasks, idx);
        } else {
            self.ready.remove(&mut self.tasks, idx);
        }

        self.tasks[idx].state = TaskState::Suspended;
        if self.current == Some(idx) {
            self.needs_reschedule = true;
        }
    }

    /// Resume a task previously suspended with [`Scheduler::suspend`]:
    /// mark it [`TaskState::Ready`] and reinsert it into the ready list
    /// at its configured priority.
    pub fn resume(&mut self, idx: TaskId) {
        if self.tasks[idx].state != TaskState::Suspended {
            return;
        }
        self.tasks[idx].state = TaskState::Ready;
        self.tasks[idx].ticks_remaining = self.tasks[idx].config.effective_time_slice();
        let priority = self.tasks[idx].config.priority;
        self.ready.insert_by(&mut self.tasks, idx, |_, node, pool| {
            priority < pool[node].config.priority
        });
        self.needs_reschedule = true;
    }

    /// Block the current task until `delay` elapses, with no wait queue
    /// of its own — a plain timed sleep backing `sleep_until`/
    /// `sleep_for`. `Delay::Immediate` and `Delay::Infinite` have no
    /// deadline and are treated as an ordinary yield, since neither
    /// "sleep zero ticks" nor "sleep forever with no waker" is a
    /// meaningful blocking sleep.
    pub fn sleep(&mut self, delay: Delay) -> TaskId {
        let current = self.current.expect("sleep called before first schedule()");

        let deadline = match delay.deadline(self.tick_count) {
            Some(d) => d,
            None => {
                self.yield_current();
                return current;
            }
        };

        self.ready.remove(&mut self.tasks, current);

        self.tasks[current].deadline = Some(deadline);
        self.tasks[current].pending_io = None;
        self.tasks[current].wake_event = None;
        self.tasks[current].state = TaskState::Delayed;

        self.timer.insert_by(&mut self.tasks, current, |_, node, pool| {
            crate::tick::before(deadline, pool[node].deadline.unwrap_or(deadline))
        });

        self.needs_reschedule = true;
        current
    }

    /// Park the current task on `queue` (and, if `delay` implies a
    /// deadline, on the timer list too), leaving `pending` behind for
    /// whoever wakes it. Transitions the task out of `Running` and
    /// requests a reschedule. The caller must follow this with the
    /// architecture's context-switch request (see
    /// [`crate::kernel::yield_task`]) — this function only updates
    /// kernel data structures.
    pub fn park(
        &mut self,
        queue: &mut TaskList<ReadyOrWait>,
        delay: Delay,
        pending: Option<PendingIo>,
    ) -> TaskId {
        let current = self.current.expect("park called before first schedule()");

        self.ready.remove(&mut self.tasks, current);

        let deadline = delay.deadline(self.tick_count);
        self.tasks[current].deadline = deadline;
        self.tasks[current].pending_io = pending;
        self.tasks[current].wake_event = None;
        self.tasks[current].state = if deadline.is_some() {
            TaskState::Delayed
        } else {
            TaskState::Blocked
        };

        let priority = self.tasks[current].config.priority;
        queue.insert_by(&mut self.tasks, current, |_, node, pool| {
            priority < pool[node].config.priority
        });
        self.tasks[current].wait_queue = Some(queue as *mut _);

        if let Some(d) = deadline {
            self.timer.insert_by(&mut self.tasks, current, |_, node, pool| {
                crate::tick::before(d, pool[node].deadline.unwrap_or(d))
            });
        }

        self.needs_reschedule = true;
        current
    }

    /// Wake the highest-priority (then longest-waiting) task parked on
    /// `queue`, publishing `event` into its event slot. Returns the woken
    /// task's id, or `None` if `queue` was empty.
    pub fn wake_one(&mut self, queue: &mut TaskList<ReadyOrWait>, event: Event) -> Option<TaskId> {
        let idx = queue.pop_front(&mut self.tasks)?;
        self.cancel_timer(idx);
        self.wake_resume(idx, event);
        Some(idx)
    }

    /// Wake every task parked on `queue` with the same `event` — used by
    /// `kill`/`delete` (`Event::Stopped`), always in priority order since
    /// `queue` is priority-sorted.
    pub fn wake_all(&mut self, queue: &mut TaskList<ReadyOrWait>, event: Event) {
        while self.wake_one(queue, event).is_some() {}
    }

    fn cancel_timer(&mut self, idx: TaskId) {
        if self.tasks[idx].deadline.take().is_some() {
            self.timer.remove(&mut self.tasks, idx);
        }
    }

    fn wake_resume(&mut self, idx: TaskId, event: Event) {
        self.tasks[idx].wake_event = Some(event);
        self.tasks[idx].wait_queue = None;
        self.tasks[idx].state = TaskState::Ready;
        let priority = self.tasks[idx].config.priority;
        self.ready.insert_by(&mut self.tasks, idx, |_, node, pool| {
            priority < pool[node].config.priority
        });
        self.needs_reschedule = true;
    }

    /// Take the event published for `idx` by the wake that resumed it.
    /// Must only be called immediately after a parked task resumes.
    pub fn take_wake_event(&mut self, idx: TaskId) -> Event {
        self.tasks[idx]
            .wake_event
            .take()
            .expect("task resumed without a published wake event")
    }

    pub fn current_tcb(&self) -> &TaskControlBlock {
        &self.tasks[self.current.expect("no current task")]
    }

    pub fn current_tcb_mut(&mut self) -> &mut TaskControlBlock {
        &mut self.tasks[self.current.expect("no current task")]
    }
}

// ---------------------------------------------------------------------------
// Stack initialization helper
// ---------------------------------------------------------------------------

/// Build the initial stack frame for a not-yet-dispatched task, so the
/// first PendSV "return" starts executing `entry(arg)`.
///
/// ## Stack layout (top = high address, growing down)
///
/// ```text
/// [Hardware-stacked frame]   <- initial PSP points here
///   xPSR  (Thumb bit set)
///   PC    (entry)
///   LR    (task_exit)
///   R12   (0)
///   R3    (0)
///   R2    (0)
///   R1    (0)
///   R0    (arg)
/// [Software-saved context]
///   R11   (0)
///   R10   (0)
///   R9    (0)
///   R8    (0)
///   R7    (0)
///   R6    (0)
///   R5    (0)
///   R4    (0)              <- stack_pointer after init
/// ```
fn init_task_stack(tcb: &mut TaskControlBlock, entry: TaskEntry, arg: usize) {
    let stack_top = tcb.stack.as_ptr() as usize + crate::config::STACK_SIZE;
    let aligned_top = stack_top & !0x07;

    // 16 registers (8 software-saved + 8 hardware-stacked).
    let frame_ptr = (aligned_top - 16 * 4) as *mut u32;

    unsafe {
        for i in 0..8 {
            *frame_ptr.add(i) = 0; // R4..R11
        }

        *frame_ptr.add(8) = arg as u32; // R0 — first argument
        *frame_ptr.add(9) = 0; // R1
        *frame_ptr.add(10) = 0; // R2
        *frame_ptr.add(11) = 0; // R3
        *frame_ptr.add(12) = 0; // R12
        *frame_ptr.add(13) = task_exit as u32; // LR
        *frame_ptr.add(14) = entry as u32; // PC
        *frame_ptr.add(15) = 0x0100_0000; // xPSR, Thumb bit set
    }

    tcb.stack_pointer = frame_ptr;
}

/// Where control lands if a task's entry function ever returns (it
/// shouldn't — task entries run forever). Parks the CPU rather than
/// falling off into undefined memory.
pub extern "C" fn task_exit(_arg: usize) {
    loop {
        cortex_m::asm::wfi();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry(_arg: usize) {}

    fn config(priority: u8) -> TaskConfig {
        TaskConfig {
            priority,
            time_slice: 4,
        }
    }

    #[test]
    fn create_task_orders_ready_list_by_priority() {
        let mut sched = Scheduler::new();
        let low = sched.create_task(dummy_entry, 0, config(5)).unwrap();
        let high = sched.create_task(dummy_entry, 0, config(1)).unwrap();
        let mid = sched.create_task(dummy_entry, 0, config(3)).unwrap();

        assert_eq!(sched.ready.front(), Some(high));
        assert!(sched.ready.iter(&sched.tasks).eq([high, mid, low]));
    }

    #[test]
    fn schedule_picks_ready_list_head_and_marks_running() {
        let mut sched = Scheduler::new();
        let t0 = sched.create_task(dummy_entry, 0, config(5)).unwrap();
        let picked = sched.schedule();
        assert_eq!(picked, t0);
        assert_eq!(sched.tasks[t0].state, TaskState::Running);
        assert_eq!(sched.current, Some(t0));
    }

    #[test]
    fn time_slice_expiry_requeues_same_priority_band_round_robin() {
        let mut sched = Scheduler::new();
        let a = sched.create_task(dummy_entry, 0, config(2)).unwrap();
        let b = sched.create_task(dummy_entry, 0, config(2)).unwrap();
        sched.schedule(); // picks a (FIFO within the band)
        assert_eq!(sched.current, Some(a));

        for _ in 0..4 {
            sched.tick();
        }
        assert!(sched.needs_reschedule);
        // a requeued behind b at the same priority
        assert_eq!(sched.ready.front(), Some(b));

        let picked = sched.schedule();
        assert_eq!(picked, b);
    }

    #[test]
    fn park_and_wake_one_round_trip() {
        let mut sched = Scheduler::new();
        let t0 = sched.create_task(dummy_entry, 0, config(5)).unwrap();
        sched.schedule();
        assert_eq!(sched.current, Some(t0));

        let mut queue: TaskList<ReadyOrWait> = TaskList::new();
        sched.park(&mut queue, Delay::Infinite, None);
        assert_eq!(sched.tasks[t0].state, TaskState::Blocked);
        assert!(sched.ready.is_empty());

        let woken = sched.wake_one(&mut queue, Event::Success(3)).unwrap();
        assert_eq!(woken, t0);
        assert_eq!(sched.tasks[t0].state, TaskState::Ready);
        assert_eq!(sched.take_wake_event(t0), Event::Success(3));
    }

    #[test]
    fn timed_park_wakes_via_timeout_when_deadline_elapses() {
        let mut sched = Scheduler::new();
        let t0 = sched.create_task(dummy_entry, 0, config(5)).unwrap();
        sched.schedule();

        let mut queue: TaskList<ReadyOrWait> = TaskList::new();
        sched.park(&mut queue, Delay::Ticks(3), None);
        assert_eq!(sched.tasks[t0].state, TaskState::Delayed);

        sched.tick();
        sched.tick();
        assert!(!queue.is_empty(), "must not time out early");

        sched.tick();
        assert!(queue.is_empty(), "timeout must dequeue from the wait queue");
        assert_eq!(sched.tasks[t0].state, TaskState::Ready);
        assert_eq!(sched.take_wake_event(t0), Event::Timeout);
    }

    #[test]
    fn sleep_removes_task_from_ready_list_until_it_wakes() {
        let mut sched = Scheduler::new();
        let t0 = sched.create_task(dummy_entry, 0, config(5)).unwrap();
        sched.schedule();

        sched.sleep(Delay::Ticks(2));
        assert_eq!(sched.tasks[t0].state, TaskState::Delayed);
        assert!(
            sched.ready.is_empty(),
            "a sleeping task must not remain linked into the ready list"
        );

        sched.tick();
        assert!(sched.ready.is_empty(), "must not wake early");
        sched.tick();
        assert_eq!(sched.tasks[t0].state, TaskState::Ready);
        assert_eq!(sched.ready.front(), Some(t0));
    }

    #[test]
    fn wake_all_drains_in_priority_order() {
        let mut sched = Scheduler::new();
        let low = sched.create_task(dummy_entry, 0, config(5)).unwrap();
        sched.schedule();
        let mid = sched.create_task(dummy_entry, 0, config(3)).unwrap();
        let high = sched.create_task(dummy_entry, 0, config(1)).unwrap();

        let mut queue: TaskList<ReadyOrWait> = TaskList::new();
        // Park in arrival order low, mid, high; priority sort reorders.
        sched.current = Some(low);
        sched.park(&mut queue, Delay::Infinite, None);
        sched.current = Some(mid);
        sched.tasks[mid].state = TaskState::Running;
        sched.park(&mut queue, Delay::Infinite, None);
        sched.current = Some(high);
        sched.tasks[high].state = TaskState::Running;
        sched.park(&mut queue, Delay::Infinite, None);

        sched.wake_all(&mut queue, Event::Stopped);
        assert!(queue.is_empty());
        for id in [low, mid, high] {
            assert_eq!(sched.tasks[id].wake_event, Some(Event::Stopped));
        }
    }
}
