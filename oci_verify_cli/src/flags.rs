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

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use oci_verify::{config::Config, registry::AdapterRegistry, AdapterProvider, AdapterSet};
use oci_verify_types::SubjectReference;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Stdout,
    File(String),
}

impl Output {
    pub fn open(&self) -> anyhow::Result<Box<dyn Write>> {
        let writer: Box<dyn Write> = match self {
            Output::Stdout => Box::new(io::stdout()),
            Output::File(path) => Box::new(
                fs::File::create(path)
                    .with_context(|| format!("could not create output file {path}"))?,
            ),
        };
        Ok(writer)
    }
}

impl From<&str> for Output {
    fn from(path: &str) -> Self {
        if path == "-" || path.is_empty() {
            Output::Stdout
        } else {
            Output::File(path.to_string())
        }
    }
}

/// What to operate on: a subject and the configuration to reach it with.
#[derive(Parser, Debug)]
pub struct Target {
    #[arg(long, help = "Reference of the subject, e.g. registry.example/app:v1")]
    pub subject: String,

    #[arg(long, help = "Path to the configuration file (JSON, or TOML if it ends in .toml)")]
    pub config: PathBuf,

    #[arg(long, help = "Adapter scope to use instead of the default adapters")]
    pub scope: Option<String>,
}

impl Target {
    pub fn reference(&self) -> anyhow::Result<SubjectReference> {
        SubjectReference::parse(&self.subject)
            .with_context(|| format!("invalid subject reference {}", self.subject))
    }

    /// Loads the configuration and builds its adapters. Relative paths in
    /// the configuration are resolved against the file's directory.
    pub fn load(&self) -> anyhow::Result<(Config, Box<dyn AdapterProvider>)> {
        let config = Config::load(&self.config)?;
        let base_dir = self.config.parent().unwrap_or(Path::new("."));
        let provider = config
            .build_provider(&AdapterRegistry::default(), base_dir)
            .with_context(|| format!("could not set up adapters from {}", self.config.display()))?;
        Ok((config, Box::new(provider)))
    }

    /// The adapter set selected by `--scope`.
    pub fn adapters(&self, provider: &dyn AdapterProvider) -> anyhow::Result<Arc<AdapterSet>> {
        provider.adapters(self.scope.as_deref()).with_context(|| match &self.scope {
            Some(scope) => format!("no adapters are configured for scope {scope}"),
            None => "no default adapters are configured".to_string(),
        })
    }
}
