//! Timer management for the event loop.
//!
//! Timers are owned by objects and fire through the event queue. Firing is
//! two-phase: `pop_due` moves a due timer into a pending event, and the loop
//! calls `confirm_fire` at dispatch time. A cancel or owner destroy between
//! the two phases wins, and the queued fire is silently skipped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::error::TimerError;
use crate::object::ObjectId;

new_key_type! {
    /// Unique identifier for an armed timer.
    pub struct TimerId;
}

/// Whether a timer fires once or repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once, then disarms.
    OneShot,
    /// Fires at every interval until canceled.
    Repeating,
}

struct TimerData {
    owner: ObjectId,
    next_fire: Instant,
    interval: Duration,
    kind: TimerKind,
    /// Registration order, breaks ties between identical deadlines.
    seq: u64,
}

/// Heap entry ordered so the earliest deadline pops first; equal deadlines
/// pop in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
    seq: u64,
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Owns all armed timers and answers "when does the next one fire".
#[derive(Default)]
pub struct TimerManager {
    timers: SlotMap<TimerId, TimerData>,
    heap: BinaryHeap<TimerQueueEntry>,
    next_seq: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `owner`. A zero-duration one-shot fires on the next
    /// loop turn; a zero-interval repeating timer is rejected.
    pub fn start(
        &mut self,
        owner: ObjectId,
        duration: Duration,
        kind: TimerKind,
    ) -> Result<TimerId, TimerError> {
        if kind == TimerKind::Repeating && duration.is_zero() {
            return Err(TimerError::InvalidDuration);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let fire_time = Instant::now() + duration;
        let id = self.timers.insert(TimerData {
            owner,
            next_fire: fire_time,
            interval: duration,
            kind,
            seq,
        });
        self.heap.push(TimerQueueEntry { id, fire_time, seq });
        tracing::trace!(
            target: "arbor_core::timer",
            ?id,
            ?owner,
            ?duration,
            ?kind,
            "timer armed"
        );
        Ok(id)
    }

    /// Disarm a timer. Returns `false` if it was not armed (already fired,
    /// canceled, or purged). Stale heap entries are skipped lazily.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let canceled = self.timers.remove(id).is_some();
        if canceled {
            tracing::trace!(target: "arbor_core::timer", ?id, "timer canceled");
        }
        canceled
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    pub fn owner_of(&self, id: TimerId) -> Option<ObjectId> {
        self.timers.get(id).map(|t| t.owner)
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Pop every timer due at `now`, in deadline-then-registration order,
    /// returning `(timer, owner)` pairs for the loop to enqueue as events.
    ///
    /// Repeating timers are rescheduled immediately; one-shot timers stay
    /// armed until [`confirm_fire`](Self::confirm_fire) so cancellation can
    /// still win against the queued event.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(TimerId, ObjectId)> {
        let mut due = Vec::new();
        while let Some(head) = self.heap.peek() {
            if head.fire_time > now {
                break;
            }
            let Some(entry) = self.heap.pop() else { break };
            let Some(timer) = self.timers.get_mut(entry.id) else {
                // Canceled after arming; drop the stale entry.
                continue;
            };
            if timer.kind == TimerKind::Repeating {
                timer.next_fire = now + timer.interval;
                self.heap.push(TimerQueueEntry {
                    id: entry.id,
                    fire_time: timer.next_fire,
                    seq: timer.seq,
                });
            }
            due.push((entry.id, timer.owner));
        }
        due
    }

    /// Second phase of firing, called at dispatch time. Returns `false` if
    /// the timer was canceled or purged after its fire event was queued.
    /// Confirming a one-shot disarms it.
    pub fn confirm_fire(&mut self, id: TimerId) -> bool {
        match self.timers.get(id) {
            None => false,
            Some(timer) => {
                if timer.kind == TimerKind::OneShot {
                    self.timers.remove(id);
                }
                true
            }
        }
    }

    /// Time until the next armed timer fires: `Some(ZERO)` if one is already
    /// due, `None` if nothing is armed.
    pub fn time_until_next(&mut self, now: Instant) -> Option<Duration> {
        // Drop canceled timers from the front of the heap.
        while let Some(head) = self.heap.peek() {
            if self.timers.contains_key(head.id) {
                break;
            }
            self.heap.pop();
        }
        self.heap.peek().map(|head| {
            if head.fire_time > now {
                head.fire_time - now
            } else {
                Duration::ZERO
            }
        })
    }

    /// Disarm every timer owned by one of the `dead` objects.
    pub fn purge_owners(&mut self, dead: &[ObjectId]) -> usize {
        let doomed: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, timer)| dead.contains(&timer.owner))
            .map(|(id, _)| id)
            .collect();
        for &id in &doomed {
            self.timers.remove(id);
        }
        doomed.len()
    }
}
