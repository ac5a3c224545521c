// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use serde_with::serde_as;

use crate::executor::Executor;
use crate::scheduler::Scheduler;
use crate::timer::Timer;

#[derive(Debug, thiserror::Error)]
#[error("timeout must be a finite, non-negative number of seconds, got {0}")]
pub struct InvalidTimeoutError(f64);

/// # Timer options
#[serde_as]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, derive_builder::Builder)]
pub struct Options {
    /// Time between firings for a repeating timer, or until the single firing
    /// for a one-shot timer.
    #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
    #[builder(setter(into))]
    pub timeout: humantime::Duration,

    /// Whether the timer reschedules itself after each firing. Default is
    /// `false`.
    #[serde(default)]
    #[builder(default)]
    pub repeats: bool,
}

impl Options {
    /// Builds options from a floating-point number of seconds, failing fast
    /// on NaN, negative, and non-finite timeouts instead of clamping them.
    pub fn from_secs(timeout_secs: f64, repeats: bool) -> Result<Self, InvalidTimeoutError> {
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .map_err(|_| InvalidTimeoutError(timeout_secs))?;
        Ok(Self {
            timeout: timeout.into(),
            repeats,
        })
    }

    pub fn build<S, E>(
        self,
        completion: impl Fn() + Send + Sync + 'static,
        scheduler: S,
        executor: E,
    ) -> Timer<S, E>
    where
        S: Scheduler,
        E: Executor,
    {
        Timer::new(
            self.timeout.into(),
            self.repeats,
            completion,
            scheduler,
            executor,
        )
    }
}
