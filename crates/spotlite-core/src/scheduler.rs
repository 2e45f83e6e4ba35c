#![forbid(unsafe_code)]

//! Cancellable, host-clocked tasks.
//!
//! The controller never sleeps or spawns. It schedules work into named
//! slots and the host advances time (`setTimeout` in the browser, explicit
//! steps in tests). Each slot holds at most one pending task: scheduling
//! into an occupied slot replaces the pending task, which is how a debounce
//! window restarts and how a stale settle delay is dropped.
//!
//! Paint-deferred work is separate from timers: it runs on the host's next
//! animation frame, not after a delay.

use core::time::Duration;

/// Timer slots owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Quiescence window after relevant mutations.
    CorrectionDebounce,
    /// Delay between neutralising and deleting the theme styles.
    StyleSettle,
}

impl TaskKind {
    /// All timer slots.
    pub const ALL: [TaskKind; 2] = [TaskKind::CorrectionDebounce, TaskKind::StyleSettle];

    const fn slot(self) -> usize {
        match self {
            TaskKind::CorrectionDebounce => 0,
            TaskKind::StyleSettle => 1,
        }
    }
}

/// Deterministic monotonic clock controlled by the host.
#[derive(Debug, Default, Clone)]
pub struct DeterministicClock {
    now: Duration,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    /// Current monotonic time.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Move to `now`; going backwards is ignored.
    pub fn set(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    /// Advance monotonic time by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledTask {
    due: Duration,
    seq: u64,
}

/// Slot-per-kind task scheduler.
#[derive(Debug, Default, Clone)]
pub struct TaskScheduler {
    clock: DeterministicClock,
    slots: [Option<ScheduledTask>; 2],
    paint_pending: bool,
    next_seq: u64,
}

impl TaskScheduler {
    /// Create an idle scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current host time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Schedule `kind` to fire after `delay`, replacing any pending task of
    /// the same kind. Returns whether a pending task was replaced.
    pub fn schedule(&mut self, kind: TaskKind, delay: Duration) -> bool {
        let task = ScheduledTask {
            due: self.clock.now().saturating_add(delay),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let replaced = self.slots[kind.slot()].replace(task).is_some();
        tracing::debug!(?kind, delay_ms = delay.as_millis() as u64, replaced, "task scheduled");
        replaced
    }

    /// Cancel the pending task of `kind`. Returns whether one was pending.
    pub fn cancel(&mut self, kind: TaskKind) -> bool {
        self.slots[kind.slot()].take().is_some()
    }

    /// Whether a task of `kind` is pending.
    #[must_use]
    pub fn is_pending(&self, kind: TaskKind) -> bool {
        self.slots[kind.slot()].is_some()
    }

    /// Request work on the next animation frame. Returns `false` when a
    /// request was already outstanding.
    pub fn request_paint(&mut self) -> bool {
        !std::mem::replace(&mut self.paint_pending, true)
    }

    /// Consume the outstanding paint request, if any.
    pub fn take_paint(&mut self) -> bool {
        std::mem::take(&mut self.paint_pending)
    }

    /// Drop the outstanding paint request.
    pub fn cancel_paint(&mut self) -> bool {
        self.take_paint()
    }

    /// Whether work is waiting for the next animation frame.
    #[must_use]
    pub fn is_paint_pending(&self) -> bool {
        self.paint_pending
    }

    /// Cancel every timer and paint request.
    pub fn cancel_all(&mut self) {
        self.slots = [None; 2];
        self.paint_pending = false;
    }

    /// Time from now until the earliest pending timer.
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.slots
            .iter()
            .flatten()
            .map(|task| task.due.saturating_sub(now))
            .min()
    }

    /// Advance time by `dt` and return the timers that came due, in
    /// deadline order (ties in scheduling order).
    pub fn advance(&mut self, dt: Duration) -> Vec<TaskKind> {
        self.clock.advance(dt);
        self.collect_due()
    }

    /// Move time to the absolute host time `now` and return due timers.
    pub fn advance_to(&mut self, now: Duration) -> Vec<TaskKind> {
        self.clock.set(now);
        self.collect_due()
    }

    fn collect_due(&mut self) -> Vec<TaskKind> {
        let now = self.clock.now();
        let mut due: Vec<(ScheduledTask, TaskKind)> = Vec::new();
        for kind in TaskKind::ALL {
            let slot = &mut self.slots[kind.slot()];
            if slot.is_some_and(|task| task.due <= now)
                && let Some(task) = slot.take()
            {
                due.push((task, kind));
            }
        }
        due.sort_by_key(|(task, _)| (task.due, task.seq));
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}
