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

use std::{io::Write, sync::Arc};

use anyhow::Context;
use clap::Parser;
use oci_verify::{Executor, VerifyParameters};

use crate::flags::Target;

#[derive(Parser, Debug)]
#[command(about = "Verify the attachments of a subject and print the report")]
pub struct VerifyCommand {
    #[command(flatten)]
    pub target: Target,

    #[arg(
        long = "artifact-type",
        help = "Only verify direct attachments of this artifact type. May be repeated."
    )]
    pub artifact_types: Vec<String>,
}

impl VerifyCommand {
    pub async fn run(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        let (config, provider) = self.target.load()?;
        let executor = Executor::new(Arc::from(provider), config.executor_config());

        let mut parameters = VerifyParameters::new(&self.target.subject)
            .with_artifact_types(self.artifact_types.clone());
        parameters.scope = self.target.scope.clone();
        let report = executor.verify_subject(&parameters).await?;
        if !report.is_success() {
            log::warn!("{} did not pass verification", self.target.subject);
        }

        serde_json::to_writer_pretty(&mut *writer, &report)
            .context("could not serialize report to JSON")?;
        writeln!(writer).context("could not write report")?;
        Ok(())
    }
}
