// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tokio::task::AbortHandle;

use crate::time::MillisSinceEpoch;

/// Callback invoked when a scheduled deadline is reached.
pub type OnFire = Box<dyn FnOnce() + Send + 'static>;

/// External capability providing one-shot deadline notifications.
///
/// # Contract
/// `on_fire` is invoked at or after `deadline`, at most once per handle, on an
/// unspecified thread. A handle owns exactly one registration. `cancel` is
/// best-effort: a callback that is already running keeps running, and
/// cancelling a handle whose callback has already been delivered is a no-op.
/// Both `schedule` and `cancel` must not block the caller.
pub trait Scheduler: Send + Sync + 'static {
    type Handle: Send;

    /// Current wall-clock reading used for all deadline arithmetic.
    fn now(&self) -> MillisSinceEpoch;

    /// Registers `on_fire` to run once `deadline` is reached.
    fn schedule(&self, deadline: MillisSinceEpoch, on_fire: OnFire) -> Self::Handle;

    /// Cancels the registration behind `handle`.
    fn cancel(&self, handle: Self::Handle);
}

/// [`Scheduler`] on top of the tokio runtime.
///
/// Each registration is a spawned task sleeping until the deadline; deadlines
/// that already passed fire as soon as the runtime schedules the task. Must be
/// used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    type Handle = AbortHandle;

    fn now(&self) -> MillisSinceEpoch {
        MillisSinceEpoch::now()
    }

    fn schedule(&self, deadline: MillisSinceEpoch, on_fire: OnFire) -> Self::Handle {
        let task = tokio::spawn(async move {
            let delay = deadline.saturating_duration_since(MillisSinceEpoch::now());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            on_fire();
        });
        task.abort_handle()
    }

    fn cancel(&self, handle: Self::Handle) {
        // Abort only takes effect at an await point; once the sleep has
        // elapsed the callback can still be delivered. Callers must tolerate
        // a post-cancel delivery, per the trait contract.
        handle.abort();
    }
}

#[cfg(test)]
pub mod tests {
    use super::{OnFire, Scheduler, TokioScheduler};
    use crate::time::MillisSinceEpoch;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use test_log::test;

    /// Scheduler with manually advanced time.
    ///
    /// Registrations with deadlines at or before the current time are fired in
    /// `(deadline, registration id)` order whenever time advances. A deadline
    /// that is already due at `schedule` time fires on the next advancement
    /// (`advance_time_by(Duration::ZERO)` pumps them without moving time).
    #[derive(Clone)]
    pub struct ManualScheduler {
        inner: Arc<Mutex<InnerManualScheduler>>,
    }

    impl ManualScheduler {
        pub fn new(time: MillisSinceEpoch) -> Self {
            Self {
                inner: Arc::new(Mutex::new(InnerManualScheduler {
                    time,
                    next_registration_id: 0,
                    registrations: Vec::new(),
                })),
            }
        }

        pub fn advance_time_by(&self, duration: Duration) {
            let time = self.inner.lock().unwrap().time + duration;
            self.advance_time_to(time);
        }

        pub fn advance_time_to(&self, time: MillisSinceEpoch) {
            {
                let mut inner = self.inner.lock().unwrap();
                assert!(inner.time <= time);
                inner.time = time;
            }
            self.fire_due_registrations();
        }

        pub fn pending_registrations(&self) -> usize {
            self.inner.lock().unwrap().registrations.len()
        }

        // Due registrations are popped and invoked one at a time with the lock
        // released: a callback may re-register through this same scheduler.
        fn fire_due_registrations(&self) {
            loop {
                let due = self.inner.lock().unwrap().pop_due();
                match due {
                    Some(registration) => (registration.on_fire)(),
                    None => break,
                }
            }
        }
    }

    impl Scheduler for ManualScheduler {
        type Handle = u64;

        fn now(&self) -> MillisSinceEpoch {
            self.inner.lock().unwrap().time
        }

        fn schedule(&self, deadline: MillisSinceEpoch, on_fire: OnFire) -> Self::Handle {
            let mut inner = self.inner.lock().unwrap();
            inner.next_registration_id += 1;
            let id = inner.next_registration_id;
            inner.registrations.push(Registration {
                id,
                deadline,
                on_fire,
            });
            id
        }

        fn cancel(&self, handle: Self::Handle) {
            self.inner
                .lock()
                .unwrap()
                .registrations
                .retain(|registration| registration.id != handle);
        }
    }

    struct InnerManualScheduler {
        time: MillisSinceEpoch,
        next_registration_id: u64,
        registrations: Vec<Registration>,
    }

    impl InnerManualScheduler {
        fn pop_due(&mut self) -> Option<Registration> {
            let due = self
                .registrations
                .iter()
                .enumerate()
                .filter(|(_, registration)| registration.deadline <= self.time)
                .min_by_key(|(_, registration)| (registration.deadline, registration.id))
                .map(|(index, _)| index)?;
            Some(self.registrations.swap_remove(due))
        }
    }

    struct Registration {
        id: u64,
        deadline: MillisSinceEpoch,
        on_fire: OnFire,
    }

    #[test]
    fn due_registrations_fire_in_deadline_order() {
        let scheduler = ManualScheduler::new(MillisSinceEpoch::UNIX_EPOCH);
        let fired = Arc::new(Mutex::new(Vec::new()));

        for (value, deadline_ms) in [(1u64, 20u64), (2, 10), (3, 30)] {
            let fired = Arc::clone(&fired);
            scheduler.schedule(
                MillisSinceEpoch::new(deadline_ms),
                Box::new(move || fired.lock().unwrap().push(value)),
            );
        }

        scheduler.advance_time_by(Duration::from_millis(25));
        assert_eq!(*fired.lock().unwrap(), vec![2, 1]);
        assert_eq!(scheduler.pending_registrations(), 1);

        scheduler.advance_time_by(Duration::from_millis(5));
        assert_eq!(*fired.lock().unwrap(), vec![2, 1, 3]);
        assert_eq!(scheduler.pending_registrations(), 0);
    }

    #[test]
    fn cancelled_registration_does_not_fire() {
        let scheduler = ManualScheduler::new(MillisSinceEpoch::UNIX_EPOCH);
        let fired = Arc::new(Mutex::new(Vec::new()));

        let fired_by_first = Arc::clone(&fired);
        let first = scheduler.schedule(
            MillisSinceEpoch::new(10),
            Box::new(move || fired_by_first.lock().unwrap().push(1u64)),
        );
        let fired_by_second = Arc::clone(&fired);
        scheduler.schedule(
            MillisSinceEpoch::new(10),
            Box::new(move || fired_by_second.lock().unwrap().push(2u64)),
        );

        scheduler.cancel(first);
        scheduler.advance_time_by(Duration::from_millis(10));

        assert_eq!(*fired.lock().unwrap(), vec![2]);
    }

    #[test(tokio::test)]
    async fn tokio_scheduler_fires_at_deadline() {
        let scheduler = TokioScheduler::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let deadline = scheduler.now() + Duration::from_millis(5);
        scheduler.schedule(
            deadline,
            Box::new(move || {
                let _ = tx.send(MillisSinceEpoch::now());
            }),
        );

        let fired_at = rx.await.expect("deadline callback should fire");
        assert!(fired_at >= deadline);
    }

    #[test(tokio::test)]
    async fn tokio_scheduler_cancel_prevents_firing() {
        let scheduler = TokioScheduler::new();
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();

        let handle = scheduler.schedule(
            scheduler.now() + Duration::from_millis(20),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        scheduler.cancel(handle);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
