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

use core::time::Duration;
use std::sync::Arc;

use oci_spec::distribution::ParseError;
use oci_verify_types::{PolicyError, StoreFailure, SubjectReference, VerificationReport};
use thiserror::Error;
use tokio::time::Instant;

use crate::{adapters::AdapterProvider, call::AdapterCalls, traversal::Traversal};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Limits applied to every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Deadline for a whole request, resolution included.
    pub request_timeout: Duration,
    /// Deadline for each individual store or verifier call.
    pub adapter_timeout: Duration,
    /// Upper bound on concurrent adapter calls and sibling subtrees.
    pub max_concurrency: usize,
    /// How many levels of attachments below the subject are visited.
    pub max_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyParameters {
    pub subject: String,
    /// Artifact types of the subject's direct attachments to verify. Empty
    /// means all of them.
    pub artifact_types: Vec<String>,
    /// Adapter scope to verify with. `None` selects the default set.
    pub scope: Option<String>,
}

impl VerifyParameters {
    pub fn new(subject: &str) -> Self {
        Self { subject: subject.to_string(), ..Default::default() }
    }

    pub fn with_artifact_types(mut self, artifact_types: Vec<String>) -> Self {
        self.artifact_types = artifact_types;
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }
}

/// Errors that abort a request. Store and verifier failures that the
/// traversal can work around are recorded in the report instead.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("invalid subject reference {reference}")]
    InvalidReference {
        reference: String,
        #[source]
        source: ParseError,
    },
    #[error("no referrer store is configured")]
    NoStoresConfigured,
    #[error("no adapters are configured for scope {}", .0.as_deref().unwrap_or("<default>"))]
    UnknownScope(Option<String>),
    #[error("could not resolve {subject}: {}", describe(.failures))]
    Resolution { subject: String, failures: Vec<StoreFailure> },
    #[error("could not list attachments of {subject}: {}", describe(.failures))]
    Listing { subject: String, failures: Vec<StoreFailure> },
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("verification of {subject} did not finish within {timeout:?}")]
    DeadlineExceeded { subject: String, timeout: Duration },
}

fn describe(failures: &[StoreFailure]) -> String {
    if failures.is_empty() {
        return "no store could serve the request".to_string();
    }
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.store, failure.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Entry point for verifying subjects.
///
/// An executor holds no per-request state and can serve concurrent requests;
/// the adapters are looked up from the provider at the start of each one.
pub struct Executor {
    provider: Arc<dyn AdapterProvider>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(provider: Arc<dyn AdapterProvider>, config: ExecutorConfig) -> Self {
        Self { provider, config }
    }

    /// Resolves the subject, verifies its attachment tree and returns the
    /// report.
    ///
    /// If the request deadline passes first, everything done so far is
    /// dropped (in-flight plugin processes are killed) and
    /// [`ExecutorError::DeadlineExceeded`] is returned.
    pub async fn verify_subject(
        &self,
        parameters: &VerifyParameters,
    ) -> Result<VerificationReport, ExecutorError> {
        let start = Instant::now();
        let subject = SubjectReference::parse(&parameters.subject).map_err(|source| {
            ExecutorError::InvalidReference { reference: parameters.subject.clone(), source }
        })?;
        let adapters = self
            .provider
            .adapters(parameters.scope.as_deref())
            .ok_or_else(|| ExecutorError::UnknownScope(parameters.scope.clone()))?;
        if adapters.stores.is_empty() {
            return Err(ExecutorError::NoStoresConfigured);
        }
        log::info!(
            "verifying {subject} with policy {} ({} stores, {} verifiers)",
            adapters.policy.kind(),
            adapters.stores.len(),
            adapters.verifiers.len()
        );

        let calls = AdapterCalls::new(self.config.max_concurrency, self.config.adapter_timeout);
        let traversal = Traversal::new(
            &adapters,
            &calls,
            self.config.max_concurrency,
            self.config.max_depth,
        );
        let run = async {
            let resolved = traversal.resolve(&subject).await?;
            let root = traversal.traverse(&subject, &resolved, &parameters.artifact_types).await?;
            Ok::<_, ExecutorError>((resolved, root))
        };
        let (resolved, root) = tokio::time::timeout(self.config.request_timeout, run)
            .await
            .map_err(|_| ExecutorError::DeadlineExceeded {
                subject: subject.to_string(),
                timeout: self.config.request_timeout,
            })??;

        let duration_millis = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!("verified {subject}: success={} in {duration_millis}ms", root.is_success);
        Ok(VerificationReport {
            root,
            subject_digest: resolved.digest().unwrap_or_default().to_string(),
            artifact_types: parameters.artifact_types.clone(),
            duration_millis,
        })
    }
}
