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

use async_trait::async_trait;

use crate::{
    descriptor::AttachmentDescriptor, outcome::VerificationOutcome,
    reference::SubjectReference, store::ReferrerStore,
};

/// Checks a single kind of attachment.
#[async_trait]
pub trait Verifier: Send + Sync {
    fn name(&self) -> &str;

    fn verifier_type(&self) -> &str;

    /// Whether this verifier applies to the given attachment. Verifiers that
    /// return false are not invoked for it.
    fn can_verify(&self, descriptor: &AttachmentDescriptor) -> bool;

    /// Verifies `descriptor`, an attachment of `subject`. Content is read
    /// through the store the attachment was listed from.
    ///
    /// An `Err` means the verifier could not reach a decision; the policy
    /// turns it into an outcome.
    async fn verify(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        store: &dyn ReferrerStore,
    ) -> anyhow::Result<VerificationOutcome>;

    /// Artifact types whose attachments must themselves be verified when
    /// this verifier has been run on an attachment.
    fn nested_artifact_types(&self) -> &[String] {
        &[]
    }
}
