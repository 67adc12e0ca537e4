// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry policy for transient chain and API errors.
//!
//! Per-request semantic failures (decoding, authorization) are never
//! retried; this wrapper exists for RPC timeouts and flaky providers only.

use std::{future::Future, time::Duration};

use anyhow::{anyhow, Result};

/// Retries after the first attempt, so total attempts = OPERATION_RETRIES + 1.
pub const OPERATION_RETRIES: usize = 2;

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_DELAY: Duration = Duration::from_millis(500);
const BACKOFF_MULTIPLIER: f64 = 1.5;
const MAX_DELAY: Duration = Duration::from_secs(5);

fn retry_delay(retry_count: usize) -> Duration {
    if retry_count == 0 {
        return INITIAL_DELAY;
    }
    let backoff =
        INITIAL_DELAY.as_millis() as f64 * BACKOFF_MULTIPLIER.powi(retry_count as i32);
    Duration::from_millis(backoff.min(MAX_DELAY.as_millis() as f64) as u64)
}

/// Run `op` with per-attempt timeout and exponential backoff between
/// attempts. The error of the final attempt is returned on exhaustion.
pub async fn with_retries<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..=OPERATION_RETRIES {
        match tokio::time::timeout(ATTEMPT_TIMEOUT, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(
                    "{label} failed (attempt {}/{}): {err:#}",
                    attempt + 1,
                    OPERATION_RETRIES + 1
                );
                last_err = Some(err);
            }
            Err(_) => {
                tracing::warn!(
                    "{label} timed out after {ATTEMPT_TIMEOUT:?} (attempt {}/{})",
                    attempt + 1,
                    OPERATION_RETRIES + 1
                );
                last_err = Some(anyhow!("operation timed out"));
            }
        }

        if attempt < OPERATION_RETRIES {
            tokio::time::sleep(retry_delay(attempt)).await;
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{label} failed with no attempts made")))
}
