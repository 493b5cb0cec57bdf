// Copyright 2025 RustFS Team
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

use clap::{Args, Parser, Subcommand};
use operator::context::Settings;
use operator::{crd, run};
use std::time::Duration;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "chainops-op")]
#[command(about = "Blockchain full-node Kubernetes operator CLI", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Output CRDs in YAML
    Crd {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Run the controllers
    Server(ServerArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// Seconds before retrying after a transient failure
    #[arg(long, env = "CHAINOPS_REQUEUE_SECS", default_value_t = 5)]
    requeue_secs: u64,

    /// Seconds before retrying after an unrecoverable failure
    #[arg(long, env = "CHAINOPS_UNRECOVERABLE_REQUEUE_SECS", default_value_t = 300)]
    unrecoverable_requeue_secs: u64,

    /// Upper bound in seconds on a single reconcile pass
    #[arg(long, env = "CHAINOPS_RECONCILE_TIMEOUT_SECS", default_value_t = 60)]
    reconcile_timeout_secs: u64,

    /// Seconds between checks on a snapshot that is not ready yet
    #[arg(long, env = "CHAINOPS_SNAPSHOT_POLL_SECS", default_value_t = 10)]
    snapshot_poll_secs: u64,
}

impl From<ServerArgs> for Settings {
    fn from(args: ServerArgs) -> Self {
        Settings {
            requeue: Duration::from_secs(args.requeue_secs),
            unrecoverable_requeue: Duration::from_secs(args.unrecoverable_requeue_secs),
            reconcile_timeout: Duration::from_secs(args.reconcile_timeout_secs),
            snapshot_poll: Duration::from_secs(args.snapshot_poll_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd { file } => crd(file).await?,
        Commands::Server(args) => run(args.into()).await?,
    }

    Ok(())
}
