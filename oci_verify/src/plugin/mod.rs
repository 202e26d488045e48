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

//! Stores and verifiers implemented by external executables.
//!
//! A plugin is run once per operation. It receives the operation name, the
//! subject and the protocol version as environment variables and a JSON
//! request on stdin, and answers on stdout. A non-zero exit status is a
//! failure whose stderr is reported back.

mod store;
mod verifier;

use std::{
    io::ErrorKind,
    path::PathBuf,
    process::{ExitStatus, Stdio},
};

use oci_verify_types::SubjectReference;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

pub use self::{
    store::{PluginStore, GET_BLOB, GET_MANIFEST, LIST_REFERRERS, RESOLVE_SUBJECT},
    verifier::{PluginVerifier, PluginVerifierSettings, VERIFY},
};

pub const COMMAND_ENV: &str = "OCI_VERIFY_COMMAND";
pub const SUBJECT_ENV: &str = "OCI_VERIFY_SUBJECT";
pub const VERSION_ENV: &str = "OCI_VERIFY_VERSION";
pub const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("could not start plugin {}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not exchange data with plugin")]
    Io(#[from] std::io::Error),
    #[error("could not encode plugin request")]
    Request(#[source] serde_json::Error),
    #[error("plugin exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("could not decode plugin response")]
    Output(#[source] serde_json::Error),
}

/// An executable speaking the plugin protocol.
#[derive(Clone, Debug)]
pub struct PluginCommand {
    path: PathBuf,
}

impl PluginCommand {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Runs `command` and returns what the plugin wrote to stdout.
    ///
    /// The child is killed if the returned future is dropped before it
    /// exits.
    pub async fn run_raw<R: Serialize>(
        &self,
        command: &str,
        subject: &SubjectReference,
        request: &R,
    ) -> Result<Vec<u8>, PluginError> {
        let input = serde_json::to_vec(request).map_err(PluginError::Request)?;
        log::debug!("running plugin {} {command} for {subject}", self.path.display());

        let mut child = Command::new(&self.path)
            .env(COMMAND_ENV, command)
            .env(SUBJECT_ENV, subject.to_string())
            .env(VERSION_ENV, PROTOCOL_VERSION)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Spawn { path: self.path.clone(), source })?;

        // Stdin is written while stdout and stderr are drained.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // Plugins that ignore their input may exit before reading it.
                match stdin.write_all(&input).await {
                    Err(err) if err.kind() != ErrorKind::BrokenPipe => return Err(err),
                    _ => {}
                }
            }
            Ok(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        fed?;
        if !output.status.success() {
            return Err(PluginError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Runs `command` and decodes its JSON response.
    pub async fn run<R: Serialize, T: DeserializeOwned>(
        &self,
        command: &str,
        subject: &SubjectReference,
        request: &R,
    ) -> Result<T, PluginError> {
        let stdout = self.run_raw(command, subject, request).await?;
        serde_json::from_slice(&stdout).map_err(PluginError::Output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt, path::Path};

    use googletest::prelude::*;

    use super::*;

    fn script(dir: &Path, body: &str) -> PluginCommand {
        let path = dir.join("plugin.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        PluginCommand::new(path)
    }

    fn subject() -> SubjectReference {
        SubjectReference::parse("localhost:5000/app:v1").unwrap()
    }

    #[tokio::test]
    async fn passes_command_in_environment() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = script(
            dir.path(),
            concat!(
                r#"cat > /dev/null; "#,
                r#"printf '{"command":"%s","version":"%s"}' "#,
                r#""$OCI_VERIFY_COMMAND" "$OCI_VERIFY_VERSION""#,
            ),
        );

        let response: serde_json::Value =
            plugin.run("VERIFY", &subject(), &serde_json::json!({})).await.unwrap();

        assert_that!(
            response,
            eq(&serde_json::json!({"command": "VERIFY", "version": PROTOCOL_VERSION}))
        );
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = script(dir.path(), "echo 'no such subject' >&2; exit 3");

        let result = plugin.run_raw("GET_BLOB", &subject(), &serde_json::json!({})).await;

        let error = result.unwrap_err();
        assert_that!(matches!(error, PluginError::Failed { .. }), eq(true));
        assert_that!(error.to_string(), contains_substring("no such subject"));
    }

    #[tokio::test]
    async fn output_is_drained_while_request_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = script(dir.path(), "head -c 262144 /dev/zero; cat > /dev/null");
        let request = serde_json::json!({ "padding": "x".repeat(262144) });

        let result = tokio::time::timeout(
            core::time::Duration::from_secs(30),
            plugin.run_raw("GET_BLOB", &subject(), &request),
        )
        .await;

        let stdout = result.unwrap().unwrap();
        assert_that!(stdout.len(), eq(262144));
    }

    #[tokio::test]
    async fn missing_executable_fails_to_spawn() {
        let plugin = PluginCommand::new("/nonexistent/oci-verify-plugin");

        let result = plugin.run_raw("VERIFY", &subject(), &serde_json::json!({})).await;

        assert_that!(result, err(matches_pattern!(PluginError::Spawn { .. })));
    }
}
