//! # Message Buffer
//!
//! The canonical waitable object: a ring buffer of length-prefixed
//! frames, with two independent wait directions — producers parked
//! because there is no room for their frame, and consumers parked
//! because the buffer is empty — sharing a single [`TaskList`] (`queue`)
//! (a message buffer can never have both a waiting producer and a
//! waiting consumer at once: `count == 0` and `count == limit` are
//! mutually exclusive).
//!
//! Frames are stored as `[len: u16 little-endian][len bytes of payload]`,
//! packed contiguously and wrapping modulo `N`. The prefix width is fixed
//! at 16 bits rather than tied to a host's native `unsigned` width.

use crate::error::Event;
use crate::list::{ReadyOrWait, TaskList};
use crate::scheduler::Scheduler;
use crate::task::PendingIo;
use crate::tick::Delay;

use crate::config::MSG_PREFIX_BYTES;

/// The result of a blocking wait/send attempt made while already holding
/// the kernel critical section.
///
/// [`WaitResult::Done`] means the transfer completed inline — no context
/// switch needed. [`WaitResult::Blocked`] means the calling task has been
/// parked on the buffer's wait queue (and, for a finite delay, the timer
/// list); the caller (see `kernel::msg_wait_until`/`msg_send_until`) must
/// leave the critical section and request a context switch, then, once
/// control resumes here after the eventual wake, read the published event
/// off the task's event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Completed without blocking; carries the number of bytes
    /// transferred.
    Done(usize),
    /// Parked; the caller must yield and, on resumption, consult the
    /// event slot via [`Scheduler::take_wake_event`].
    Blocked,
}

/// A fixed-capacity message buffer: `N` is the total number of bytes the
/// ring can hold, prefixes included.
///
/// `res` mirrors a reservation/ownership field some message-buffer
/// designs carry, but this crate never dynamically allocates a buffer,
/// so it is always `None`; it exists only so [`MessageBuffer::delete`]
/// has a well-defined meaning distinct from [`MessageBuffer::kill`].
pub struct MessageBuffer<const N: usize> {
    data: [u8; N],
    head: usize,
    tail: usize,
    count: usize,
    size: usize,
    queue: TaskList<ReadyOrWait>,
    res: Option<()>,
    killed: bool,
}

impl<const N: usize> MessageBuffer<N> {
    /// An empty message buffer. `N` must be at least `MSG_PREFIX_BYTES + 1`
    /// for any frame to ever fit; a smaller `N` is not rejected here (the
    /// constructor never fails, matching `msg_init`) but every send
    /// operation on it will fail fast with `0`, since no payload can ever
    /// satisfy `MSG_PREFIX_BYTES + payload.len() <= N`.
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            head: 0,
            tail: 0,
            count: 0,
            size: 0,
            queue: TaskList::new(),
            res: None,
            killed: false,
        }
    }

    /// Bytes currently stored, including length prefixes (`count`).
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// ISR-safe alias of [`MessageBuffer::count`].
    #[inline]
    pub fn count_isr(&self) -> usize {
        self.count()
    }

    /// Free space remaining (`limit - count`).
    #[inline]
    pub fn space(&self) -> usize {
        N - self.count
    }

    /// ISR-safe alias of [`MessageBuffer::space`].
    #[inline]
    pub fn space_isr(&self) -> usize {
        self.space()
    }

    fn room_for(&self, payload_len: usize) -> bool {
        MSG_PREFIX_BYTES + payload_len <= self.space()
    }

    fn write_u16_le(&mut self, mut at: usize, value: u16) {
        let bytes = value.to_le_bytes();
        for b in bytes {
            self.data[at] = b;
            at = (at + 1) % N;
        }
    }

    fn read_u16_le(&self, mut at: usize) -> u16 {
        let mut bytes = [0u8; 2];
        for b in bytes.iter_mut() {
            *b = self.data[at];
            at = (at + 1) % N;
        }
        u16::from_le_bytes(bytes)
    }

    /// Append one frame's prefix and payload at `tail`. Caller must have
    /// already verified `room_for(payload.len())`.
    fn push_frame(&mut self, payload: &[u8]) {
        self.write_u16_le(self.tail, payload.len() as u16);
        self.tail = (self.tail + MSG_PREFIX_BYTES) % N;
        for &b in payload {
            self.data[self.tail] = b;
            self.tail = (self.tail + 1) % N;
        }
        self.count += MSG_PREFIX_BYTES + payload.len();
        if self.size == 0 {
            self.size = self.read_u16_le(self.head) as usize;
        }
    }

    /// Pop the frame at `head` into `out`, truncating to `out.len()` and
    /// discarding the rest of the frame. Returns the number of bytes
    /// actually copied.
    fn pop_frame(&mut self, out: &mut [u8]) -> usize {
        let frame_len = self.read_u16_le(self.head) as usize;
        let mut at = (self.head + MSG_PREFIX_BYTES) % N;

        let delivered = frame_len.min(out.len());
        for slot in out.iter_mut().take(delivered) {
            *slot = self.data[at];
            at = (at + 1) % N;
        }

        self.head = (self.head + MSG_PREFIX_BYTES + frame_len) % N;
        self.count -= MSG_PREFIX_BYTES + frame_len;
        self.size = if self.count == 0 {
            0
        } else {
            self.read_u16_le(self.head) as usize
        };
        delivered
    }

    // -----------------------------------------------------------------
    // Receive side
    // -----------------------------------------------------------------

    /// Blocking receive: park until a frame is available, until `delay`
    /// elapses, or until the buffer is killed. Follows the generic
    /// wait/wake protocol in [`Scheduler::park`]. Must be called with the
    /// kernel critical section already held (see `kernel::msg_wait_until`,
    /// which is the only intended caller).
    pub fn wait_until(&mut self, sched: &mut Scheduler, out: &mut [u8], delay: Delay) -> WaitResult {
        if self.count > 0 {
            return WaitResult::Done(self.complete_receive(sched, out));
        }
        if self.killed || delay.is_immediate() {
            return WaitResult::Done(0);
        }

        let pending = PendingIo {
            ptr: out.as_mut_ptr(),
            len: out.len(),
        };
        sched.park(&mut self.queue, delay, Some(pending));
        WaitResult::Blocked
    }

    /// Convenience layer over [`MessageBuffer::wait_until`]: wait for up
    /// to `delay` ticks (or forever/never per the sentinels), rather than
    /// until an absolute deadline.
    pub fn wait_for(&mut self, sched: &mut Scheduler, out: &mut [u8], delay: Delay) -> WaitResult {
        self.wait_until(sched, out, delay)
    }

    /// Non-blocking receive: never parks. Returns `0` if the buffer is
    /// empty.
    pub fn take(&mut self, sched: &mut Scheduler, out: &mut [u8]) -> usize {
        if self.count == 0 {
            return 0;
        }
        self.complete_receive(sched, out)
    }

    /// ISR-safe alias of [`MessageBuffer::take`].
    #[inline]
    pub fn take_isr(&mut self, sched: &mut Scheduler, out: &mut [u8]) -> usize {
        self.take(sched, out)
    }

    /// Deliver the head frame into `out` and, if a producer is now
    /// unblocked by the freed space, wake exactly one of them — letting
    /// the waker (this call) perform the producer's transfer directly, so
    /// the woken task observes the completed transfer the instant it
    /// resumes.
    fn complete_receive(&mut self, sched: &mut Scheduler, out: &mut [u8]) -> usize {
        let delivered = self.pop_frame(out);
        self.wake_one_producer(sched);
        delivered
    }

    fn wake_one_producer(&mut self, sched: &mut Scheduler) {
        let Some(idx) = self.queue.front() else {
            return;
        };
        let pending = match sched.tasks[idx].pending_io {
            Some(p) => p,
            None => return,
        };
        let payload = unsafe { core::slice::from_raw_parts(pending.ptr, pending.len) };
        if !self.room_for(payload.len()) {
            return;
        }
        self.push_frame(payload);
        sched.wake_one(&mut self.queue, Event::Success(payload.len()));
    }

    // -----------------------------------------------------------------
    // Send side
    // -----------------------------------------------------------------

    /// Blocking send: park until there is room, until `delay` elapses, or
    /// until the buffer is killed. Must be called with the kernel
    /// critical section already held (see `kernel::msg_send_until`).
    pub fn send_until(&mut self, sched: &mut Scheduler, payload: &[u8], delay: Delay) -> WaitResult {
        if payload.is_empty() || MSG_PREFIX_BYTES + payload.len() > N {
            return WaitResult::Done(0);
        }
        if self.room_for(payload.len()) {
            return WaitResult::Done(self.complete_send(sched, payload));
        }
        if self.killed || delay.is_immediate() {
            return WaitResult::Done(0);
        }

        let pending = PendingIo {
            ptr: payload.as_ptr() as *mut u8,
            len: payload.len(),
        };
        sched.park(&mut self.queue, delay, Some(pending));
        WaitResult::Blocked
    }

    /// Convenience layer over [`MessageBuffer::send_until`]: wait for up
    /// to `delay` ticks rather than until an absolute deadline.
    pub fn send_for(&mut self, sched: &mut Scheduler, payload: &[u8], delay: Delay) -> WaitResult {
        self.send_until(sched, payload, delay)
    }

    /// Non-blocking send: never parks. Returns `0` if there is no room
    /// (or the payload can never fit, or is empty).
    pub fn give(&mut self, sched: &mut Scheduler, payload: &[u8]) -> usize {
        if payload.is_empty() || MSG_PREFIX_BYTES + payload.len() > N || !self.room_for(payload.len()) {
            return 0;
        }
        self.complete_send(sched, payload)
    }

    /// ISR-safe alias of [`MessageBuffer::give`].
    #[inline]
    pub fn give_isr(&mut self, sched: &mut Scheduler, payload: &[u8]) -> usize {
        self.give(sched, payload)
    }

    /// Non-blocking send that evicts the oldest frame(s) if necessary to
    /// make room. Eviction is unconditional and silent — any producer
    /// whose already-buffered frame gets discarded this way was woken
    /// with its transfer already counted when it was originally pushed,
    /// so there is nothing further to report.
    pub fn push(&mut self, sched: &mut Scheduler, payload: &[u8]) -> usize {
        if payload.is_empty() || MSG_PREFIX_BYTES + payload.len() > N {
            return 0;
        }
        while !self.room_for(payload.len()) && self.count > 0 {
            let mut discard = [0u8; 0];
            self.pop_frame(&mut discard);
            // The frame just discarded may have unblocked a producer
            // whose own frame then fits; `complete_send` below handles
            // that wake normally. A producer parked on a *still*-too-large
            // frame stays parked.
        }
        if !self.room_for(payload.len()) {
            return 0;
        }
        self.complete_send(sched, payload)
    }

    /// ISR-safe alias of [`MessageBuffer::push`].
    #[inline]
    pub fn push_isr(&mut self, sched: &mut Scheduler, payload: &[u8]) -> usize {
        self.push(sched, payload)
    }

    fn complete_send(&mut self, sched: &mut Scheduler, payload: &[u8]) -> usize {
        self.push_frame(payload);
        self.wake_one_consumer(sched);
        payload.len()
    }

    fn wake_one_consumer(&mut self, sched: &mut Scheduler) {
        let Some(idx) = self.queue.front() else {
            return;
        };
        if self.count == 0 {
            return;
        }
        let pending = match sched.tasks[idx].pending_io {
            Some(p) => p,
            None => return,
        };
        let out = unsafe { core::slice::from_raw_parts_mut(pending.ptr, pending.len) };
        let delivered = self.pop_frame(out);
        sched.wake_one(&mut self.queue, Event::Success(delivered));
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Drain the wait queue with `Event::Stopped`, per priority order
    /// (the queue is always priority-sorted), and zero the buffer. After
    /// this call every operation behaves as on a freshly-reset, empty
    /// buffer except that blocking calls fail fast instead of parking.
    pub fn kill(&mut self, sched: &mut Scheduler) {
        sched.wake_all(&mut self.queue, Event::Stopped);
        self.head = 0;
        self.tail = 0;
        self.count = 0;
        self.size = 0;
        self.killed = true;
    }

    /// `kill`, then release the owning resource handle if present. This
    /// crate never allocates one, so `delete` is `kill` plus clearing the
    /// (always-`None`) `res` field, kept for structural parity with the
    /// original.
    pub fn delete(&mut self, sched: &mut Scheduler) {
        self.kill(sched);
        self.res = None;
    }
}

impl<const N: usize> Default for MessageBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskConfig;

    extern "C" fn dummy_entry(_arg: usize) {}

    fn sched_with_task(priority: u8) -> (Scheduler, usize) {
        let mut sched = Scheduler::new();
        let id = sched
            .create_task(
                dummy_entry,
                0,
                TaskConfig {
                    priority,
                    time_slice: 10,
                },
            )
            .unwrap();
        sched.schedule();
        (sched, id)
    }

    #[test]
    fn frame_round_trip() {
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<16> = MessageBuffer::new();

        let sent = buf.give(&mut sched, &[0x01, 0x02, 0x03]);
        assert_eq!(sent, 3);
        assert_eq!(buf.count(), 2 + 3);

        let mut out = [0u8; 8];
        let received = buf.take(&mut sched, &mut out);
        assert_eq!(received, 3);
        assert_eq!(&out[..3], &[0x01, 0x02, 0x03]);
        assert_eq!(buf.count(), 0);
    }

    #[test]
    fn truncated_receive_discards_remainder_of_frame() {
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<16> = MessageBuffer::new();

        buf.give(&mut sched, &[0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48]);

        let mut out = [0u8; 4];
        let received = buf.take(&mut sched, &mut out);
        assert_eq!(received, 4);
        assert_eq!(out, [0x41, 0x42, 0x43, 0x44]);
        assert_eq!(buf.count(), 0, "the rest of the frame is discarded, not left queued");
    }

    #[test]
    fn zero_length_send_is_a_noop() {
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<16> = MessageBuffer::new();
        assert_eq!(buf.give(&mut sched, &[]), 0);
        assert_eq!(buf.count(), 0);
    }

    #[test]
    fn oversized_send_fails_immediately() {
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<8> = MessageBuffer::new();
        let huge = [0u8; 9];
        assert_eq!(buf.give(&mut sched, &huge), 0);
    }

    #[test]
    fn payload_that_leaves_no_room_for_its_own_prefix_fails_immediately() {
        // N=8, MSG_PREFIX_BYTES=2: a 7- or 8-byte payload fits the raw
        // buffer length but can never coexist with its own length prefix,
        // so it must fail fast rather than park forever on a blocking
        // send.
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<8> = MessageBuffer::new();

        assert_eq!(buf.give(&mut sched, &[0u8; 8]), 0);
        assert_eq!(buf.give(&mut sched, &[0u8; 7]), 0);
        assert_eq!(buf.push(&mut sched, &[0u8; 8]), 0);
        assert_eq!(
            buf.send_until(&mut sched, &[0u8; 8], Delay::Infinite),
            WaitResult::Done(0),
            "a frame that can never fit must not block, even with an infinite delay"
        );
        assert!(buf.queue.is_empty());
    }

    #[test]
    fn take_on_empty_buffer_returns_zero() {
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<16> = MessageBuffer::new();
        let mut out = [0u8; 4];
        assert_eq!(buf.take(&mut sched, &mut out), 0);
    }

    #[test]
    fn immediate_send_and_receive_never_block() {
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<4> = MessageBuffer::new();
        // limit=4 leaves room for only a 2-byte prefix + 0 or 1 payload byte
        // at a time; a 3-byte payload can never fit.
        let payload = [1u8, 2, 3];
        assert_eq!(
            buf.send_until(&mut sched, &payload, Delay::Immediate),
            WaitResult::Done(0)
        );

        let mut out = [0u8; 4];
        assert_eq!(
            buf.wait_until(&mut sched, &mut out, Delay::Immediate),
            WaitResult::Done(0)
        );
    }

    #[test]
    fn push_evicts_oldest_frame_to_make_room() {
        let (mut sched, _t) = sched_with_task(2);
        // limit=8, prefix=2: one 4-byte frame consumes all 6 remaining
        // bytes-with-prefix capacity that still leaves room for another.
        let mut buf: MessageBuffer<8> = MessageBuffer::new();

        assert_eq!(buf.give(&mut sched, &[1, 2, 3, 4]), 4);
        assert_eq!(buf.count(), 6);

        // No room for a second 4-byte frame via `give`.
        assert_eq!(buf.give(&mut sched, &[5, 6, 7, 8]), 0);

        // `push` evicts the first frame, then fits the new one.
        let pushed = buf.push(&mut sched, &[5, 6, 7, 8]);
        assert_eq!(pushed, 4);
        assert_eq!(buf.count(), 6);

        let mut out = [0u8; 4];
        assert_eq!(buf.take(&mut sched, &mut out), 4);
        assert_eq!(out, [5, 6, 7, 8]);
    }

    #[test]
    fn kill_drains_wait_queue_with_stopped() {
        let (mut sched, _lo) = sched_with_task(1);
        let mut buf: MessageBuffer<16> = MessageBuffer::new();

        // Park a consumer on the empty buffer.
        let mut out = [0u8; 4];
        buf.wait_until(&mut sched, &mut out, Delay::Infinite);
        assert!(!buf.queue.is_empty());

        buf.kill(&mut sched);
        assert!(buf.queue.is_empty());
    }

    #[test]
    fn count_zero_iff_size_zero_invariant() {
        let (mut sched, _t) = sched_with_task(2);
        let mut buf: MessageBuffer<16> = MessageBuffer::new();
        assert_eq!(buf.count, 0);
        assert_eq!(buf.size, 0);

        buf.give(&mut sched, &[9, 9]);
        assert!(buf.count > 0);
        assert!(buf.size > 0);

        let mut out = [0u8; 4];
        buf.take(&mut sched, &mut out);
        assert_eq!(buf.count, 0);
        assert_eq!(buf.size, 0);
    }
}
