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

use std::sync::Arc;

use oci_verify_types::{
    AttachmentDescriptor, ErrorContext, Policy, ReferrerStore, SubjectReference,
    VerificationOutcome, Verifier,
};

use crate::call::AdapterCalls;

/// What running the verifiers on one attachment produced.
#[derive(Debug, Default)]
pub(crate) struct Dispatch {
    pub outcomes: Vec<VerificationOutcome>,
    /// Nested artifact types declared by the verifiers that ran, in
    /// registration order and without duplicates.
    pub nested_artifact_types: Vec<String>,
}

pub(crate) struct Dispatcher<'a> {
    pub verifiers: &'a [Arc<dyn Verifier>],
    pub policy: &'a dyn Policy,
    pub calls: &'a AdapterCalls,
}

impl Dispatcher<'_> {
    /// Runs the verifiers that accept `descriptor`, one at a time in
    /// registration order, stopping early if the policy says so after a
    /// failure.
    pub async fn dispatch(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        store: &dyn ReferrerStore,
    ) -> Dispatch {
        let mut dispatch = Dispatch::default();
        for verifier in self.verifiers.iter().filter(|v| v.can_verify(descriptor)) {
            for nested in verifier.nested_artifact_types() {
                if !dispatch.nested_artifact_types.contains(nested) {
                    dispatch.nested_artifact_types.push(nested.clone());
                }
            }

            let operation = format!("verifier {} on {}", verifier.name(), descriptor.digest);
            let outcome =
                match self.calls.run(&operation, verifier.verify(subject, descriptor, store)).await
                {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        log::warn!("{operation} failed: {err:#}");
                        let context = ErrorContext {
                            subject: subject.clone(),
                            descriptor: descriptor.clone(),
                            verifier_name: verifier.name().to_string(),
                            verifier_type: verifier.verifier_type().to_string(),
                        };
                        self.policy.error_to_verify_result(&context, &err)
                    }
                };
            log::debug!("{operation}: success={}", outcome.is_success);

            let stop = !outcome.is_success
                && !self.policy.continue_verify_on_failure(subject, descriptor, &outcome);
            dispatch.outcomes.push(outcome);
            if stop {
                break;
            }
        }
        dispatch
    }
}
