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

use anyhow::Context;
use async_trait::async_trait;
use oci_verify_types::{
    AttachmentDescriptor, ReferrerStore, SubjectReference, VerificationOutcome, Verifier,
};
use serde::Deserialize;
use serde_json::json;

use super::PluginCommand;
use crate::verifiers::VerifierScope;

pub const VERIFY: &str = "VERIFY";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginVerifierSettings {
    #[serde(flatten)]
    pub scope: VerifierScope,
    /// Passed to the plugin untouched.
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    is_success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_reason: Option<String>,
    #[serde(default)]
    extensions: Option<serde_json::Value>,
}

/// A verifier backed by a plugin executable.
///
/// The plugin receives the subject and the attachment descriptor, plus the
/// name of the store the attachment came from so that it can fetch content
/// itself.
pub struct PluginVerifier {
    name: String,
    verifier_type: String,
    command: PluginCommand,
    scope: VerifierScope,
    config: serde_json::Value,
}

impl PluginVerifier {
    pub fn new(
        name: &str,
        verifier_type: &str,
        command: PluginCommand,
        settings: PluginVerifierSettings,
    ) -> Self {
        Self {
            name: name.to_string(),
            verifier_type: verifier_type.to_string(),
            command,
            scope: settings.scope,
            config: settings.config,
        }
    }
}

#[async_trait]
impl Verifier for PluginVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn verifier_type(&self) -> &str {
        &self.verifier_type
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
        let request = json!({
            "config": self.config,
            "subject": subject.to_string(),
            "descriptor": descriptor,
            "store": store.name(),
        });
        let response: VerifyResponse = self
            .command
            .run(VERIFY, subject, &request)
            .await
            .with_context(|| format!("plugin verifier {} failed", self.name))?;

        Ok(VerificationOutcome {
            verifier_name: self.name.clone(),
            verifier_type: self.verifier_type.clone(),
            is_success: response.is_success,
            message: response.message,
            error_reason: response.error_reason,
            extensions: response.extensions,
        })
    }

    fn nested_artifact_types(&self) -> &[String] {
        &self.scope.nested_artifact_types
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use googletest::prelude::*;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn maps_plugin_response_to_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vuln-scan");
        fs::write(
            &path,
            concat!(
                "#!/bin/sh\ncat > /dev/null\n",
                r#"echo '{"isSuccess": false, "message": "2 critical", "#,
                r#""errorReason": "CVE_FOUND"}'"#,
                "\n",
            ),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        let verifier = PluginVerifier::new(
            "scan",
            "vuln-scan",
            PluginCommand::new(path),
            PluginVerifierSettings {
                scope: VerifierScope {
                    artifact_types: vec!["application/sarif+json".to_string()],
                    nested_artifact_types: vec![],
                },
                config: serde_json::Value::Null,
            },
        );
        let descriptor = AttachmentDescriptor::new("sha256:01", "application/sarif+json", "", 0);
        let subject = SubjectReference::parse("localhost:5000/app:v1").unwrap();

        let outcome =
            verifier.verify(&subject, &descriptor, &MemoryStore::new("memory")).await.unwrap();

        assert_that!(outcome.verifier_name, eq("scan"));
        assert_that!(outcome.verifier_type, eq("vuln-scan"));
        assert_that!(outcome.is_success, eq(false));
        assert_that!(outcome.message, eq("2 critical"));
        assert_that!(outcome.error_reason.as_deref(), some(eq("CVE_FOUND")));
    }
}
