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

use serde::{Deserialize, Serialize};

/// Reason attached to outcomes synthesized from a verifier that failed to
/// run at all.
pub const VERIFIER_EXECUTION_FAILED: &str = "VERIFIER_EXECUTION_FAILED";

/// Reason attached to outcomes synthesized from a verifier that ran past its
/// deadline.
pub const VERIFIER_TIMEOUT: &str = "VERIFIER_TIMEOUT";

/// Result of one verifier applied to one attachment.
///
/// Only the name, success flag, message and error reason are part of the
/// serialized report. The verifier type and the free-form extensions stay in
/// memory for policies and callers that want them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    #[serde(rename = "name")]
    pub verifier_name: String,
    #[serde(skip)]
    pub verifier_type: String,
    pub is_success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip)]
    pub extensions: Option<serde_json::Value>,
}

impl VerificationOutcome {
    pub fn success(verifier_name: &str, verifier_type: &str, message: impl Into<String>) -> Self {
        Self {
            verifier_name: verifier_name.to_string(),
            verifier_type: verifier_type.to_string(),
            is_success: true,
            message: message.into(),
            error_reason: None,
            extensions: None,
        }
    }

    pub fn failure(verifier_name: &str, verifier_type: &str, message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            ..Self::success(verifier_name, verifier_type, message)
        }
    }

    pub fn with_error_reason(mut self, reason: &str) -> Self {
        self.error_reason = Some(reason.to_string());
        self
    }

    pub fn with_extensions(mut self, extensions: serde_json::Value) -> Self {
        self.extensions = Some(extensions);
        self
    }
}
