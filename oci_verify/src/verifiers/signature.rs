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

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use oci_verify_types::{
    AttachmentDescriptor, ReferrerStore, SubjectReference, VerificationOutcome, Verifier,
};
use p256::{
    ecdsa::{signature::Verifier as _, Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
};
use serde::Deserialize;

use super::VerifierScope;

pub const SIGNATURE_ARTIFACT_TYPE: &str = "application/vnd.oci-verify.signature.v1+der";
pub const SIGNATURE_MISMATCH: &str = "SIGNATURE_MISMATCH";
pub const SIGNATURE_MALFORMED: &str = "SIGNATURE_MALFORMED";
pub const SUBJECT_MISMATCH: &str = "SUBJECT_MISMATCH";

const VERIFIER_TYPE: &str = "signature";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSettings {
    #[serde(flatten)]
    pub scope: VerifierScope,
    /// PEM-encoded public keys.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Files holding PEM-encoded public keys, relative to the configuration
    /// file.
    #[serde(default)]
    pub key_files: Vec<PathBuf>,
}

/// Verifies ECDSA P-256 signatures over the digest string of the signed
/// subject (for example `sha256:2c26...`).
///
/// The signature is the first blob of the attachment manifest, DER encoded.
/// A signature made by any one of the configured keys is accepted.
pub struct SignatureVerifier {
    name: String,
    scope: VerifierScope,
    keys: Vec<VerifyingKey>,
}

impl SignatureVerifier {
    pub fn new(name: &str, scope: VerifierScope, keys: Vec<VerifyingKey>) -> Self {
        Self { name: name.to_string(), scope: scope.or_default_type(SIGNATURE_ARTIFACT_TYPE), keys }
    }

    pub fn from_settings(
        name: &str,
        settings: SignatureSettings,
        base_dir: &Path,
    ) -> anyhow::Result<Self> {
        let mut pems = settings.keys;
        for path in &settings.key_files {
            let path = base_dir.join(path);
            pems.push(
                std::fs::read_to_string(&path)
                    .with_context(|| format!("could not read key file {}", path.display()))?,
            );
        }
        if pems.is_empty() {
            anyhow::bail!("signature verifier {name} has no keys configured");
        }
        let keys = pems
            .iter()
            .map(|pem| {
                VerifyingKey::from_public_key_pem(pem)
                    .map_err(|err| anyhow::anyhow!("failed to parse public key: {err}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::new(name, settings.scope, keys))
    }

    fn failure(&self, message: String, reason: &str) -> VerificationOutcome {
        VerificationOutcome::failure(&self.name, VERIFIER_TYPE, message).with_error_reason(reason)
    }
}

#[async_trait]
impl Verifier for SignatureVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn verifier_type(&self) -> &str {
        VERIFIER_TYPE
    }

    fn can_verify(&self, descriptor: &AttachmentDescriptor) -> bool {
        self.scope.accepts(descriptor)
    }

    async fn verify(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        store: &dyn ReferrerStore,
    ) -> anyhow::Result<VerificationOutcome> {
        let subject_digest =
            subject.digest().with_context(|| format!("subject {subject} is not resolved"))?;
        let manifest = store
            .fetch_manifest(subject, descriptor)
            .await
            .with_context(|| format!("fetching signature manifest {}", descriptor.digest))?;

        if let Some(signed) = &manifest.subject {
            if signed.digest != subject_digest {
                return Ok(self.failure(
                    format!("signature is for {}, not {subject_digest}", signed.digest),
                    SUBJECT_MISMATCH,
                ));
            }
        }

        let Some(blob) = manifest.blobs.first() else {
            return Ok(self.failure(
                format!("signature manifest {} has no blobs", descriptor.digest),
                SIGNATURE_MALFORMED,
            ));
        };
        let encoded = store
            .fetch_blob(subject, &blob.digest)
            .await
            .with_context(|| format!("fetching signature blob {}", blob.digest))?;
        let signature = match Signature::from_der(&encoded) {
            Ok(signature) => signature,
            Err(err) => {
                let message = format!("invalid DER signature: {err}");
                return Ok(self.failure(message, SIGNATURE_MALFORMED));
            }
        };

        if self.keys.iter().any(|key| key.verify(subject_digest.as_bytes(), &signature).is_ok()) {
            Ok(VerificationOutcome::success(
                &self.name,
                VERIFIER_TYPE,
                format!("signature over {subject_digest} verified"),
            ))
        } else {
            Ok(self.failure(
                format!("signature over {subject_digest} does not match any configured key"),
                SIGNATURE_MISMATCH,
            ))
        }
    }

    fn nested_artifact_types(&self) -> &[String] {
        &self.scope.nested_artifact_types
    }
}
