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

use oci_verify_types::{
    policy::error_outcome, AggregationItem, AttachmentDescriptor, ErrorContext, Policy,
    PolicyError, SubjectReference, VerificationOutcome,
};

/// Verifies every attachment and stops at the first failure.
///
/// A node passes only if there is at least one result and every result is
/// successful, so a subject without attachments fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictPolicy;

impl Policy for StrictPolicy {
    fn kind(&self) -> &'static str {
        "strict"
    }

    fn verify_needed(&self, _: &SubjectReference, _: &AttachmentDescriptor) -> bool {
        true
    }

    fn continue_verify_on_failure(
        &self,
        _: &SubjectReference,
        _: &AttachmentDescriptor,
        _: &VerificationOutcome,
    ) -> bool {
        false
    }

    fn error_to_verify_result(
        &self,
        context: &ErrorContext,
        error: &anyhow::Error,
    ) -> VerificationOutcome {
        error_outcome(context, error)
    }

    fn overall_verify_result(&self, items: &[AggregationItem]) -> Result<bool, PolicyError> {
        Ok(!items.is_empty() && items.iter().all(AggregationItem::is_success))
    }
}
