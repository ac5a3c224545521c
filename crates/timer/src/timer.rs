// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::executor::Executor;
use crate::scheduler::Scheduler;
use crate::time::MillisSinceEpoch;


/// Completion body run each time the timer fires.
pub type Completion = Arc<dyn Fn() + Send + Sync + 'static>;

/// A pausable, resumable one-shot or repeating timer on top of a
/// [`Scheduler`] and an [`Executor`].
///
/// The timer owns at most one live scheduler registration at any time. Every
/// state transition is serialized through one internal lock, so control calls
/// may race freely with each other and with the deadline callback; a callback
/// belonging to a cancelled or replaced registration is detected and ignored.
///
/// Cloning is cheap and yields another handle to the same timer. Dropping the
/// last handle cancels any live registration without running the completion.
pub struct Timer<S, E>
where
    S: Scheduler,
    E: Executor,
{
    inner: Arc<Inner<S, E>>,
}

impl<S, E> Timer<S, E>
where
    S: Scheduler,
    E: Executor,
{
    /// Creates a timer in the idle state.
    ///
    /// No scheduling side effect happens here; call [`Timer::start`] to
    /// activate the countdown. `timeout` is the time between firings for a
    /// repeating timer, or until the single firing for a one-shot timer.
    pub fn new(
        timeout: Duration,
        repeats: bool,
        completion: impl Fn() + Send + Sync + 'static,
        scheduler: S,
        executor: E,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| Inner {
            weak: weak.clone(),
            scheduler,
            executor,
            completion: Arc::new(completion),
            repeats,
            shared: Mutex::new(Shared {
                state: State::Idle,
                timeout,
                registration_seq: 0,
            }),
        });
        Self { inner }
    }

    /// Equivalent to [`Timer::new`] followed by [`Timer::start`].
    pub fn scheduled(
        timeout: Duration,
        repeats: bool,
        completion: impl Fn() + Send + Sync + 'static,
        scheduler: S,
        executor: E,
    ) -> Self {
        let timer = Self::new(timeout, repeats, completion, scheduler, executor);
        timer.start();
        timer
    }

    /// Starts the countdown: registers one deadline callback due at
    /// `now() + timeout`.
    ///
    /// Only an idle timer starts. Calling `start` on a scheduled timer is an
    /// idempotent no-op (the existing registration is kept), on a paused
    /// timer it is a no-op ([`Timer::resume`] is the only way out of pause),
    /// and an invalidated timer is never resurrected.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Whether the timer currently has a live deadline registration.
    pub fn is_scheduled(&self) -> bool {
        self.inner.is_scheduled()
    }

    /// Time left until the next firing.
    ///
    /// While scheduled this is `deadline - now()`, clamped to zero once the
    /// deadline has elapsed but the callback has not run yet. While paused it
    /// is the snapshot captured at pause time. For an idle timer it is the
    /// full configured timeout; for an invalidated timer it is zero.
    pub fn remaining_time(&self) -> Duration {
        self.inner.remaining_time()
    }

    /// Absolute point in time of the next firing, present only while the
    /// timer is scheduled.
    pub fn timeout_deadline(&self) -> Option<MillisSinceEpoch> {
        self.inner.timeout_deadline()
    }

    /// Pauses the countdown, capturing the exact remaining time.
    ///
    /// Returns `false` and has no effect unless the timer is scheduled.
    pub fn pause(&self) -> bool {
        self.inner.pause()
    }

    /// Resumes a paused countdown with the remaining time captured at pause.
    ///
    /// Returns `false` and has no effect unless the timer is paused. For a
    /// repeating timer the shortened interval applies only to the first
    /// post-resume firing; later cycles use the full timeout again.
    pub fn resume(&self) -> bool {
        self.inner.resume()
    }

    /// Replaces the timeout duration.
    ///
    /// A scheduled timer is re-registered with a deadline of
    /// `now() + timeout`; an idle timer counts down from the new value on the
    /// next [`Timer::start`]; a paused timer resumes with the new value
    /// instead of its pause snapshot. Returns `false` and has no effect on an
    /// invalidated timer.
    pub fn reset_timeout(&self, timeout: Duration) -> bool {
        self.inner.reset_timeout(timeout)
    }

    /// Fires now, ignoring the clock, then invalidates the timer.
    ///
    /// The completion is submitted exactly once regardless of the current
    /// state and of `repeats`; any pending registration is cancelled first so
    /// the regular deadline callback cannot also fire. Idempotent: on an
    /// already invalidated timer this is a no-op.
    pub fn fire_and_invalidate(&self) {
        self.inner.fire_and_invalidate();
    }

    /// Cancels any live registration and invalidates the timer without
    /// running the completion. Idempotent.
    ///
    /// A completion already handed to the executor before this call still
    /// runs; invalidation never retracts in-flight work.
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }
}

impl<S, E> Clone for Timer<S, E>
where
    S: Scheduler,
    E: Executor,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, E> fmt::Debug for Timer<S, E>
where
    S: Scheduler,
    E: Executor,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("Timer")
            .field("state", &shared.state.name())
            .field("timeout", &shared.timeout)
            .field("repeats", &self.inner.repeats)
            .finish()
    }
}

struct Inner<S, E>
where
    S: Scheduler,
    E: Executor,
{
    weak: Weak<Inner<S, E>>,
    scheduler: S,
    executor: E,
    completion: Completion,
    repeats: bool,
    shared: Mutex<Shared<S::Handle>>,
}

struct Shared<H> {
    state: State<H>,
    timeout: Duration,
    // Bumped on every new registration. A deadline callback carries the value
    // it was registered under; a mismatch means the registration was
    // cancelled or replaced after the callback was already in flight.
    registration_seq: u64,
}

enum State<H> {
    Idle,
    Scheduled {
        deadline: MillisSinceEpoch,
        seq: u64,
        handle: H,
    },
    Paused {
        remaining: Duration,
    },
    Invalidated,
}

impl<H> State<H> {
    fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Scheduled { .. } => "scheduled",
            State::Paused { .. } => "paused",
            State::Invalidated => "invalidated",
        }
    }
}

impl<S, E> Inner<S, E>
where
    S: Scheduler,
    E: Executor,
{
    fn start(&self) {
        let mut shared = self.shared.lock();
        if let State::Idle = shared.state {
            let timeout = shared.timeout;
            self.register(&mut shared, timeout);
        } else {
            // At most one live registration: re-starting a scheduled timer
            // keeps the existing one, and nothing resurrects a dead timer.
            trace!("Ignoring start on {} timer.", shared.state.name());
        }
    }

    fn is_scheduled(&self) -> bool {
        matches!(self.shared.lock().state, State::Scheduled { .. })
    }

    fn remaining_time(&self) -> Duration {
        let shared = self.shared.lock();
        match &shared.state {
            State::Scheduled { deadline, .. } => {
                deadline.saturating_duration_since(self.scheduler.now())
            }
            State::Paused { remaining } => *remaining,
            State::Idle => shared.timeout,
            State::Invalidated => Duration::ZERO,
        }
    }

    fn timeout_deadline(&self) -> Option<MillisSinceEpoch> {
        match &self.shared.lock().state {
            State::Scheduled { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    fn pause(&self) -> bool {
        let mut shared = self.shared.lock();
        match mem::replace(&mut shared.state, State::Idle) {
            State::Scheduled {
                deadline, handle, ..
            } => {
                let remaining = deadline.saturating_duration_since(self.scheduler.now());
                self.scheduler.cancel(handle);
                shared.state = State::Paused { remaining };
                trace!("Paused timer with {remaining:?} remaining.");
                true
            }
            other => {
                trace!("Refusing to pause {} timer.", other.name());
                shared.state = other;
                false
            }
        }
    }

    fn resume(&self) -> bool {
        let mut shared = self.shared.lock();
        match mem::replace(&mut shared.state, State::Idle) {
            State::Paused { remaining } => {
                self.register(&mut shared, remaining);
                trace!("Resumed timer with {remaining:?} remaining.");
                true
            }
            other => {
                trace!("Refusing to resume {} timer.", other.name());
                shared.state = other;
                false
            }
        }
    }

    fn reset_timeout(&self, timeout: Duration) -> bool {
        let mut shared = self.shared.lock();
        match mem::replace(&mut shared.state, State::Idle) {
            State::Scheduled { handle, .. } => {
                self.scheduler.cancel(handle);
                shared.timeout = timeout;
                self.register(&mut shared, timeout);
                trace!("Reset timeout of scheduled timer to {timeout:?}.");
                true
            }
            State::Idle => {
                shared.timeout = timeout;
                true
            }
            State::Paused { .. } => {
                // The next resume counts down from the new timeout, not from
                // the snapshot captured at pause time.
                shared.timeout = timeout;
                shared.state = State::Paused { remaining: timeout };
                true
            }
            State::Invalidated => {
                trace!("Refusing to reset timeout of invalidated timer.");
                shared.state = State::Invalidated;
                false
            }
        }
    }

    fn fire_and_invalidate(&self) {
        let fire = {
            let mut shared = self.shared.lock();
            match mem::replace(&mut shared.state, State::Invalidated) {
                State::Scheduled { handle, .. } => {
                    // The pending registration must not also fire.
                    self.scheduler.cancel(handle);
                    true
                }
                State::Idle | State::Paused { .. } => true,
                State::Invalidated => {
                    trace!("Ignoring fire_and_invalidate on invalidated timer.");
                    false
                }
            }
        };
        if fire {
            trace!("Forced terminal fire.");
            self.submit_completion();
        }
    }

    fn invalidate(&self) {
        let mut shared = self.shared.lock();
        if let State::Scheduled { handle, .. } =
            mem::replace(&mut shared.state, State::Invalidated)
        {
            self.scheduler.cancel(handle);
            trace!("Invalidated timer and cancelled its registration.");
        }
    }

    /// Registers a deadline callback due `delay` from now and moves into
    /// `Scheduled`. Must run under the state lock; any previous registration
    /// must already be cancelled or spent.
    fn register(&self, shared: &mut Shared<S::Handle>, delay: Duration) {
        let deadline = self.scheduler.now() + delay;
        shared.registration_seq += 1;
        let seq = shared.registration_seq;
        let weak = self.weak.clone();
        let handle = self.scheduler.schedule(
            deadline,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_deadline(seq);
                }
            }),
        );
        shared.state = State::Scheduled {
            deadline,
            seq,
            handle,
        };
        trace!("Registered deadline callback due at {deadline}.");
    }

    fn on_deadline(&self, seq: u64) {
        let fire = {
            let mut shared = self.shared.lock();
            let live =
                matches!(&shared.state, State::Scheduled { seq: current, .. } if *current == seq);
            if live {
                // The registration that delivered this callback is spent; the
                // state overwrite below drops its handle without cancelling.
                if self.repeats {
                    let timeout = shared.timeout;
                    self.register(&mut shared, timeout);
                } else {
                    shared.state = State::Invalidated;
                    trace!("Invalidated one-shot timer after firing.");
                }
            } else {
                trace!("Ignoring stale deadline callback.");
            }
            live
        };
        // Submitted with the lock released so a completion may control its
        // own timer, whatever the executor.
        if fire {
            self.submit_completion();
        }
    }

    fn submit_completion(&self) {
        let completion = Arc::clone(&self.completion);
        self.executor.submit(Box::new(move || (*completion)()));
    }
}

impl<S, E> Drop for Inner<S, E>
where
    S: Scheduler,
    E: Executor,
{
    fn drop(&mut self) {
        let shared = self.shared.get_mut();
        if let State::Scheduled { handle, .. } =
            mem::replace(&mut shared.state, State::Invalidated)
        {
            self.scheduler.cancel(handle);
        }
    }
}
