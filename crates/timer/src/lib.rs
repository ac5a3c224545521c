// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Pausable, resumable one-shot and repeating timer.
//!
//! [`Timer`] wraps a single countdown on top of two injected capabilities: a
//! [`Scheduler`] providing one-shot deadline notifications and an [`Executor`]
//! running the completion bodies. Pausing captures the exact remaining time,
//! and resuming counts down from that snapshot before returning to the full
//! cadence. Default tokio-backed implementations of both capabilities are
//! provided.

mod executor;
mod options;
mod scheduler;
mod time;
mod timer;

pub use executor::{Executor, InlineExecutor, TokioExecutor, UnitOfWork};
pub use options::{InvalidTimeoutError, Options, OptionsBuilder, OptionsBuilderError};
pub use scheduler::{OnFire, Scheduler, TokioScheduler};
pub use time::MillisSinceEpoch;
pub use timer::{Completion, Timer};
