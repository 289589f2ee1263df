//! Discrete-event timeline.
//!
//! Events are delivered in order of simulated time; events scheduled for the
//! same instant are delivered in the order they were scheduled. The
//! scheduler is single-threaded and every handler runs to completion before
//! the next event is popped, so a run is a pure function of its inputs and
//! its RNG seed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Scheduled<E> {
    time_ns: f64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    // Reversed so that the max-heap pops the earliest (time, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time_ns
            .total_cmp(&self.time_ns)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered event queue with deterministic tie-breaking.
pub struct Scheduler<E> {
    now_ns: f64,
    seq: u64,
    queue: BinaryHeap<Scheduled<E>>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    /// Creates an empty scheduler at time zero.
    pub fn new() -> Self {
        Self {
            now_ns: 0.0,
            seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Current simulated time in nanoseconds.
    pub fn now(&self) -> f64 {
        self.now_ns
    }

    /// Number of events not yet delivered.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedules `event` at absolute time `time_ns`.
    ///
    /// Times in the past are clamped to now; the timeline never runs
    /// backwards.
    pub fn schedule_at(&mut self, time_ns: f64, event: E) {
        let time_ns = time_ns.max(self.now_ns);
        self.queue.push(Scheduled {
            time_ns,
            seq: self.seq,
            event,
        });
        self.seq += 1;
    }

    /// Schedules `event` after a delay from now.
    pub fn schedule_in(&mut self, delay_ns: f64, event: E) {
        self.schedule_at(self.now_ns + delay_ns, event);
    }

    /// Pops the next event if it is due no later than `until_ns`, advancing
    /// the clock to its time.
    pub fn next_until(&mut self, until_ns: f64) -> Option<(f64, E)> {
        if self.queue.peek()?.time_ns > until_ns {
            return None;
        }
        let Scheduled { time_ns, event, .. } = self.queue.pop()?;
        self.now_ns = time_ns;
        Some((time_ns, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_pop_in_time_order() {
        let mut s = Scheduler::new();
        s.schedule_at(30.0, "c");
        s.schedule_at(10.0, "a");
        s.schedule_at(20.0, "b");
        let order: Vec<_> = std::iter::from_fn(|| s.next_until(f64::INFINITY))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
        assert_eq!(s.now(), 30.0);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut s = Scheduler::new();
        for i in 0..16 {
            s.schedule_at(5.0, i);
        }
        let order: Vec<_> = std::iter::from_fn(|| s.next_until(5.0))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(order, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn horizon_is_inclusive_and_leaves_later_events() {
        let mut s = Scheduler::new();
        s.schedule_at(10.0, 1);
        s.schedule_at(10.5, 2);
        assert_eq!(s.next_until(10.0), Some((10.0, 1)));
        assert_eq!(s.next_until(10.0), None);
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn relative_scheduling_uses_current_time() {
        let mut s = Scheduler::new();
        s.schedule_at(100.0, 0);
        s.next_until(f64::INFINITY);
        s.schedule_in(5.0, 1);
        s.schedule_at(1.0, 2);
        assert_eq!(s.next_until(f64::INFINITY), Some((100.0, 2)));
        assert_eq!(s.next_until(f64::INFINITY), Some((105.0, 1)));
    }
}
