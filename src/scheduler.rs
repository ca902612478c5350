/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Interface consumed from the local discrete-event scheduler.
 *
 * The scheduler owns the event queue and the platform clock. The
 * federate runtime calls into it with the runtime mutex held, so
 * implementations must not call back into the runtime and must use
 * their own interior mutability.
 */
use crate::tag::{Instant, Interval};

/// Opaque handle for the trigger wired to an input port by code
/// generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trigger(pub usize);

/// Handle for a scheduled event. Zero means no event was scheduled.
pub type ScheduleHandle = i32;

pub trait Scheduler: Send + Sync {
    /// Return the trigger for the action corresponding to the specified
    /// port ID, or None if the ID is out of range.
    fn trigger_for_port(&self, port_id: u16) -> Option<Trigger>;

    /**
     * Schedule an event on the given trigger at the given offset from
     * the current logical time, taking ownership of the payload.
     * Negative offsets are clamped to zero (tardy-message policy).
     */
    fn schedule(&self, trigger: Trigger, extra_delay: Interval, payload: Vec<u8>) -> ScheduleHandle;

    /// Timestamp of the earliest event on the event queue, if any.
    fn event_queue_head_time(&self) -> Option<Instant>;

    /// Block until the physical clock reaches the given time. The wait
    /// is cooperative and may return early.
    fn wait_until(&self, physical_time: Instant);

    /// Current reading of the platform clock, in nanoseconds.
    fn now_physical(&self) -> Instant;
}

/**
 * A scheduler with an empty event queue, for a federate that produces
 * no local events and only participates in start/stop coordination.
 * Useful as the binary's default and as a connectivity harness.
 */
pub struct IdleScheduler {}

impl IdleScheduler {
    pub fn new() -> IdleScheduler {
        IdleScheduler {}
    }
}

impl Scheduler for IdleScheduler {
    fn trigger_for_port(&self, _port_id: u16) -> Option<Trigger> {
        None
    }

    fn schedule(&self, _trigger: Trigger, _extra_delay: Interval, _payload: Vec<u8>) -> ScheduleHandle {
        0
    }

    fn event_queue_head_time(&self) -> Option<Instant> {
        None
    }

    fn wait_until(&self, physical_time: Instant) {
        let now = self.now_physical();
        if physical_time > now {
            std::thread::sleep(std::time::Duration::from_nanos((physical_time - now) as u64));
        }
    }

    fn now_physical(&self) -> Instant {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_nanos() as Instant,
            Err(..) => 0,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    use std::cmp::Reverse;
    use std::sync::Mutex;

    use priority_queue::PriorityQueue;

    /// A scheduler double that records every schedule() call and serves
    /// the event-queue head from a priority queue the test can fill.
    pub struct RecordingScheduler {
        scheduled: Mutex<Vec<(Trigger, Interval, Vec<u8>)>>,
        event_queue: Mutex<PriorityQueue<Instant, Reverse<Instant>>>,
        physical_time: Mutex<Instant>,
    }

    impl RecordingScheduler {
        pub fn new() -> RecordingScheduler {
            RecordingScheduler {
                scheduled: Mutex::new(Vec::new()),
                event_queue: Mutex::new(PriorityQueue::new()),
                physical_time: Mutex::new(0),
            }
        }

        pub fn scheduled(&self) -> Vec<(Trigger, Interval, Vec<u8>)> {
            self.scheduled.lock().unwrap().clone()
        }

        pub fn push_event(&self, time: Instant) {
            self.event_queue.lock().unwrap().push(time, Reverse(time));
        }

        pub fn set_physical_time(&self, time: Instant) {
            *self.physical_time.lock().unwrap() = time;
        }
    }

    impl Scheduler for RecordingScheduler {
        fn trigger_for_port(&self, port_id: u16) -> Option<Trigger> {
            Some(Trigger(port_id as usize))
        }

        fn schedule(
            &self,
            trigger: Trigger,
            extra_delay: Interval,
            payload: Vec<u8>,
        ) -> ScheduleHandle {
            let mut scheduled = self.scheduled.lock().unwrap();
            scheduled.push((trigger, extra_delay, payload));
            scheduled.len() as ScheduleHandle
        }

        fn event_queue_head_time(&self) -> Option<Instant> {
            self.event_queue
                .lock()
                .unwrap()
                .peek()
                .map(|(time, _)| *time)
        }

        fn wait_until(&self, _physical_time: Instant) {}

        fn now_physical(&self) -> Instant {
            *self.physical_time.lock().unwrap()
        }
    }
}
