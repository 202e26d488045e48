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

use thiserror::Error;

use crate::{
    descriptor::AttachmentDescriptor,
    outcome::{VerificationOutcome, VERIFIER_EXECUTION_FAILED, VERIFIER_TIMEOUT},
    reference::SubjectReference,
    store::AdapterTimeout,
};

/// Summary of a nested node as seen by the policy aggregating its parent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NestedVerdict {
    pub subject: String,
    pub artifact_type: String,
    pub is_success: bool,
}

/// Input to [`Policy::overall_verify_result`].
#[derive(Clone, Debug, PartialEq)]
pub enum AggregationItem {
    Outcome(VerificationOutcome),
    Nested(NestedVerdict),
}

impl AggregationItem {
    pub fn is_success(&self) -> bool {
        match self {
            AggregationItem::Outcome(outcome) => outcome.is_success,
            AggregationItem::Nested(verdict) => verdict.is_success,
        }
    }
}

/// Where a verifier error happened.
#[derive(Clone, Debug)]
pub struct ErrorContext {
    pub subject: SubjectReference,
    pub descriptor: AttachmentDescriptor,
    pub verifier_name: String,
    pub verifier_type: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid policy configuration: {0}")]
    Configuration(String),
    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
}

/// Decides what gets verified, when to stop, how errors count and whether a
/// set of results is acceptable.
///
/// A policy is consulted many times per request and must answer the same
/// way for the same inputs.
pub trait Policy: Send + Sync {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    fn verify_needed(&self, subject: &SubjectReference, descriptor: &AttachmentDescriptor)
        -> bool;

    /// Called after a failed outcome. Returning false stops dispatching
    /// further verifiers for this attachment.
    fn continue_verify_on_failure(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        outcome: &VerificationOutcome,
    ) -> bool;

    fn error_to_verify_result(
        &self,
        context: &ErrorContext,
        error: &anyhow::Error,
    ) -> VerificationOutcome;

    fn overall_verify_result(&self, items: &[AggregationItem]) -> Result<bool, PolicyError>;
}

/// Converts a verifier error into a failed outcome, tagging timeouts
/// separately from other failures.
pub fn error_outcome(context: &ErrorContext, error: &anyhow::Error) -> VerificationOutcome {
    let reason = if error.downcast_ref::<AdapterTimeout>().is_some() {
        VERIFIER_TIMEOUT
    } else {
        VERIFIER_EXECUTION_FAILED
    };
    VerificationOutcome::failure(
        &context.verifier_name,
        &context.verifier_type,
        format!("{error:#}"),
    )
    .with_error_reason(reason)
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use googletest::prelude::*;

    use super::*;

    fn context() -> ErrorContext {
        ErrorContext {
            subject: SubjectReference::parse("localhost:5000/app:v1").unwrap(),
            descriptor: AttachmentDescriptor::default(),
            verifier_name: "sig".to_string(),
            verifier_type: "signature".to_string(),
        }
    }

    #[test]
    fn timeout_errors_get_timeout_reason() {
        let error = anyhow::Error::new(AdapterTimeout {
            operation: "verify".to_string(),
            after: Duration::from_millis(10),
        });

        let outcome = error_outcome(&context(), &error);

        assert_that!(outcome.is_success, eq(false));
        assert_that!(outcome.error_reason.as_deref(), some(eq(VERIFIER_TIMEOUT)));
    }

    #[test]
    fn other_errors_get_execution_failed_reason() {
        let error = anyhow::anyhow!("boom").context("while verifying");

        let outcome = error_outcome(&context(), &error);

        assert_that!(outcome.verifier_name, eq("sig"));
        assert_that!(outcome.message, eq("while verifying: boom"));
        assert_that!(outcome.error_reason.as_deref(), some(eq(VERIFIER_EXECUTION_FAILED)));
    }
}
