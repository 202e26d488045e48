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

mod flags;
mod referrer;
mod verify;

use std::io::Write;

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        help = "Path to write the output to. Use '-' for stdout.",
        default_value = "-"
    )]
    output: flags::Output,

    #[arg(long, global = true, help = "Disable all logging")]
    silent: bool,
}

impl Args {
    /// Runs the command and writes what it produced. The output file is
    /// only created once the command has succeeded.
    async fn run(&self) -> anyhow::Result<()> {
        let mut produced = Vec::new();
        self.command.run(&mut produced).await?;
        let mut writer = self.output.open()?;
        writer.write_all(&produced).context("could not write output")?;
        writer.flush().context("could not flush output")
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    Verify(verify::VerifyCommand),
    Referrer(referrer::Referrer),
}

impl Commands {
    async fn run(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        match self {
            Self::Verify(args) => args.run(writer).await,
            Self::Referrer(args) => args.run(writer).await,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));
    if args.silent {
        logger.filter_level(log::LevelFilter::Off);
    }
    logger.init();

    if let Err(err) = args.run().await {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
