// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tokio::sync::mpsc;
use tracing::trace;

/// A unit of work submitted to an [`Executor`].
pub type UnitOfWork = Box<dyn FnOnce() + Send + 'static>;

/// External capability that runs submitted units of work.
///
/// # Contract
/// Units submitted through the same executor run in submission order. `submit`
/// must not block the caller and nothing is awaited by the submitter.
/// Implementations may run the work inline on the submitting thread
/// ([`InlineExecutor`]) or hand it to a queue ([`TokioExecutor`]).
pub trait Executor: Send + Sync + 'static {
    fn submit(&self, work: UnitOfWork);
}

/// Runs every unit of work inline on the submitting thread.
///
/// Deterministic execution order, used by simulations and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl InlineExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for InlineExecutor {
    fn submit(&self, work: UnitOfWork) {
        work();
    }
}

/// Serial [`Executor`] on top of the tokio runtime.
///
/// Units of work are fed through an unbounded channel into a single drain
/// task, which gives FIFO execution. Cloning yields another sender into the
/// same queue. The drain task stops once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    tx: mpsc::UnboundedSender<UnitOfWork>,
}

impl TokioExecutor {
    /// Spawns the drain task on the current tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UnitOfWork>();
        tokio::spawn(async move {
            while let Some(work) = rx.recv().await {
                work();
            }
        });
        Self { tx }
    }
}

impl Executor for TokioExecutor {
    fn submit(&self, work: UnitOfWork) {
        if self.tx.send(work).is_err() {
            trace!("Dropping unit of work because the executor has shut down.");
        }
    }
}
