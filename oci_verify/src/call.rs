//
// Copyright 2025 The Project Oak Authors
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
//

use core::{future::Future, time::Duration};

use anyhow::Context;
use oci_verify_types::AdapterTimeout;
use tokio::sync::Semaphore;

/// Gate for calls into stores and verifiers: bounds how many run at once and
/// how long each may take.
#[derive(Debug)]
pub struct AdapterCalls {
    permits: Semaphore,
    timeout: Duration,
}

impl AdapterCalls {
    pub fn new(max_concurrency: usize, timeout: Duration) -> Self {
        Self { permits: Semaphore::new(max_concurrency.max(1)), timeout }
    }

    /// Runs `call` once a permit is available. If it has not finished after
    /// the per-call timeout it is dropped and an [`AdapterTimeout`] is
    /// returned.
    pub async fn run<T, F>(&self, operation: &str, call: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let _permit = self.permits.acquire().await.context("adapter call limiter closed")?;
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{operation} timed out after {:?}", self.timeout);
                Err(AdapterTimeout { operation: operation.to_string(), after: self.timeout }.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let calls = AdapterCalls::new(1, Duration::from_millis(50));

        let result = calls
            .run("list", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        let error = result.unwrap_err();
        assert_that!(error.downcast_ref::<AdapterTimeout>().is_some(), eq(true));
    }

    #[tokio::test]
    async fn fast_call_passes_result_through() {
        let calls = AdapterCalls::new(1, Duration::from_secs(5));

        assert_that!(calls.run("fetch", async { Ok(7) }).await, ok(eq(&7)));
    }
}
