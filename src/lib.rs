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

#![allow(clippy::single_match)]

use crate::context::{Context, Settings};
use crate::reconcile::{error_policy, reconcile_fullnode, reconcile_snapshot};
use crate::types::v1alpha1::fullnode::FullNode;
use crate::types::v1alpha1::snapshot::ScheduledVolumeSnapshot;
use futures::StreamExt;
use k8s_openapi::api::core::v1 as corev1;
use kube::CustomResourceExt;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod context;
pub mod diff;
pub mod error;
pub mod reconcile;
pub mod rollout;
pub mod store;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let client = Client::try_default().await?;
    let context = Arc::new(Context::new(client.clone(), settings));
    info!("starting controllers with {:?}", context.settings());

    let fullnodes = Controller::new(
        Api::<FullNode>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<corev1::Pod>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<corev1::PersistentVolumeClaim>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(reconcile_fullnode, error_policy, context.clone())
    .for_each(|res| async move {
        match res {
            Ok((fullnode, _)) => info!("reconciled successful, object{:?}", fullnode.name),
            Err(e) => warn!("fullnode reconcile failed: {}", e),
        }
    });

    let snapshots = Controller::new(
        Api::<ScheduledVolumeSnapshot>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(reconcile_snapshot, error_policy, context)
    .for_each(|res| async move {
        match res {
            Ok((svs, _)) => info!("reconciled successful, object{:?}", svs.name),
            Err(e) => warn!("scheduledvolumesnapshot reconcile failed: {}", e),
        }
    });

    futures::join!(fullnodes, snapshots);

    Ok(())
}

/// Renders every CRD this operator serves as a multi-document YAML stream.
pub fn crd_yaml() -> Result<String, serde_yaml_ng::Error> {
    Ok([
        serde_yaml_ng::to_string(&FullNode::crd())?,
        serde_yaml_ng::to_string(&ScheduledVolumeSnapshot::crd())?,
    ]
    .join("---\n"))
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer.write_all(crd_yaml()?.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}
