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

//! Controller entry for `ScheduledVolumeSnapshot`.

use super::{Error, warn_event, with_deadline};
use crate::context::{Context, Settings};
use crate::store::Store;
use crate::types::v1alpha1::snapshot::ScheduledVolumeSnapshot;
use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod candidate;
pub mod lifecycle;
pub mod retention;
pub mod scheduler;

/// Runs one lifecycle pass and persists the resulting status, successful or not.
pub async fn sync_snapshot<S: Store>(
    store: &S,
    svs: &ScheduledVolumeSnapshot,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let ns = svs.namespace()?;
    let mut status = svs.status.clone().unwrap_or_default();

    let result = with_deadline(
        settings.reconcile_timeout,
        lifecycle::step(store, svs, &mut status, now, settings),
    )
    .await;

    status.observed_generation = svs.metadata.generation;
    if let Err(e) = &result {
        status.status_message = Some(e.to_string());
    }

    // Only this controller writes the scheduler's status, so it is replaced whole.
    store
        .update_status::<ScheduledVolumeSnapshot, _>(&svs.name(), &ns, move |current| {
            *current = status;
        })
        .await?;

    match result {
        Ok(action) => Ok(action),
        Err(e) => {
            if !e.is_transient() {
                warn_event(store, svs, &e.to_string()).await;
            }
            Err(e.into())
        }
    }
}

pub async fn reconcile_snapshot(
    svs: Arc<ScheduledVolumeSnapshot>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let ns = svs.namespace()?;
    let latest = ctx
        .get::<ScheduledVolumeSnapshot>(&svs.name(), &ns)
        .await?;

    if latest.metadata.deletion_timestamp.is_some() {
        debug!(
            "scheduledvolumesnapshot {} is deleted, releasing its pod",
            latest.name()
        );
        if let Err(e) = lifecycle::release(ctx.as_ref(), &latest, Utc::now(), ctx.settings()).await
        {
            warn!("failed to release pod for {}: {e}", latest.name());
        }
        return Ok(Action::await_change());
    }

    sync_snapshot(ctx.as_ref(), &latest, ctx.settings(), Utc::now()).await
}
