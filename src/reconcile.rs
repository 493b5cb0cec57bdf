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

use crate::context::{Context, Settings};
use crate::error::ReconcileError;
use crate::store::Store;
use crate::types::v1alpha1::fullnode::FullNode;
use crate::types::v1alpha1::status::fullnode::Phase;
use crate::{context, types};
use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use snafu::Snafu;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub mod ordinal_set;
pub mod pod;
pub mod pvc;
pub mod snapshot;

pub use snapshot::reconcile_snapshot;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Reconcile { source: ReconcileError },
}

impl Error {
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Context { .. } => true,
            Error::Types { .. } => false,
            Error::Reconcile { source } => source.is_transient(),
        }
    }
}

/// Runs `pass`, turning an expired deadline into a transient failure.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    pass: impl Future<Output = Result<T, ReconcileError>>,
) -> Result<T, ReconcileError> {
    match tokio::time::timeout(deadline, pass).await {
        Ok(result) => result,
        Err(_) => Err(ReconcileError::transient(format!(
            "reconcile pass did not finish within {}s",
            deadline.as_secs()
        ))),
    }
}

/// Publishes a Warning event, logging instead of failing when that is not possible.
pub(crate) async fn warn_event<S: Store, K: crate::store::KubeObject>(
    store: &S,
    object: &K,
    message: &str,
) {
    if let Err(e) = store
        .record(object, EventType::Warning, "ReconcileFailed", message)
        .await
    {
        warn!("failed to record event for {}: {e}", object.name_any());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convergence {
    pub settled: bool,
    pub available_replicas: i32,
}

/// One pass over a fullnode's volumes, then its pods.
pub async fn converge<S: Store>(
    store: &S,
    fullnode: &FullNode,
    now: DateTime<Utc>,
) -> Result<Convergence, ReconcileError> {
    let pvcs = pvc::reconcile_pvcs(store, fullnode, now).await?;
    let pods = pod::reconcile_pods(store, fullnode, now).await?;

    Ok(Convergence {
        settled: !pvcs.needs_requeue() && !pods.needs_requeue(),
        available_replicas: pods.available,
    })
}

/// Converges `fullnode` and records the outcome in its status.
pub async fn sync_fullnode<S: Store>(
    store: &S,
    fullnode: &FullNode,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let ns = fullnode.namespace()?;
    let result = with_deadline(settings.reconcile_timeout, converge(store, fullnode, now)).await;

    let generation = fullnode.meta().generation;
    let (phase, message, available) = match &result {
        Ok(c) if c.settled => (Phase::Complete, None, Some(c.available_replicas)),
        Ok(c) => (Phase::Progressing, None, Some(c.available_replicas)),
        Err(e) if e.is_transient() => (Phase::Progressing, Some(e.to_string()), None),
        Err(e) => (Phase::Error, Some(e.to_string()), None),
    };
    store
        .update_status::<FullNode, _>(&fullnode.name(), &ns, move |status| {
            status.observed_generation = generation;
            status.phase = phase;
            status.status_message = message;
            if let Some(available) = available {
                status.available_replicas = available;
            }
        })
        .await?;

    match result {
        Ok(c) if c.settled => {
            debug!("fullnode {} settled", fullnode.name());
            Ok(Action::await_change())
        }
        Ok(_) => Ok(Action::requeue(settings.requeue)),
        Err(e) => {
            if !e.is_transient() {
                warn_event(store, fullnode, &e.to_string()).await;
            }
            Err(e.into())
        }
    }
}

pub async fn reconcile_fullnode(fullnode: Arc<FullNode>, ctx: Arc<Context>) -> Result<Action, Error> {
    let ns = fullnode.namespace()?;
    let latest = ctx.get::<FullNode>(&fullnode.name(), &ns).await?;

    if latest.metadata.deletion_timestamp.is_some() {
        debug!(
            "fullnode {} is deleted, deletion_timestamp is {:?}",
            fullnode.name(),
            latest.metadata.deletion_timestamp
        );
        return Ok(Action::await_change());
    }

    sync_fullnode(ctx.as_ref(), &latest, ctx.settings(), Utc::now()).await
}

pub fn error_policy<K: Resource>(object: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    let settings = ctx.settings();
    match error {
        Error::Context { source } if source.is_not_found() => {
            info!("{} is gone: {error}", object.name_any());
            Action::await_change()
        }
        Error::Context { source } if source.is_conflict() => {
            debug!("{} was modified concurrently, retrying", object.name_any());
            Action::requeue(settings.requeue)
        }
        e if e.is_transient() => {
            warn!("reconcile of {} failed, retrying: {error}", object.name_any());
            Action::requeue(settings.requeue)
        }
        _ => {
            error!("reconcile of {} failed: {error}", object.name_any());
            Action::requeue(settings.unrecoverable_requeue)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::{FakeStore, create_test_fullnode, mark_bound, mark_ready, test_creation_time};
    use crate::types::v1alpha1::status::fullnode::{ScheduledSnapshot, Status};
    use k8s_openapi::api::core::v1 as corev1;

    #[tokio::test]
    async fn test_new_fullnode_converges_in_two_passes() {
        let store = FakeStore::default();
        let fullnode = create_test_fullnode(3);
        store.insert(fullnode.clone());
        let settings = Settings::default();
        let now = test_creation_time() + chrono::Duration::minutes(5);

        let action = sync_fullnode(&store, &fullnode, &settings, now).await.unwrap();
        assert_eq!(action, Action::requeue(settings.requeue));
        assert_eq!(store.all::<corev1::Pod>().len(), 3);
        assert_eq!(store.all::<corev1::PersistentVolumeClaim>().len(), 3);
        let status = store.find::<FullNode>("cosmoshub").unwrap().status.unwrap();
        assert_eq!(status.phase, Phase::Progressing);
        assert_eq!(status.observed_generation, Some(1));

        store.modify::<corev1::Pod>(|pod| mark_ready(pod, test_creation_time()));
        store.modify::<corev1::PersistentVolumeClaim>(mark_bound);

        let action = sync_fullnode(&store, &fullnode, &settings, now).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(store.deleted().is_empty());
        let status = store.find::<FullNode>("cosmoshub").unwrap().status.unwrap();
        assert_eq!(status.phase, Phase::Complete);
        assert_eq!(status.available_replicas, 3);
    }

    #[tokio::test]
    async fn test_quiesced_pod_is_not_recreated() {
        let store = FakeStore::default();
        let mut fullnode = create_test_fullnode(3);
        let mut status = Status::default();
        status.scheduled_snapshots.insert(
            "default.hourly".to_owned(),
            ScheduledSnapshot {
                pod_candidate: "cosmoshub-1".to_owned(),
            },
        );
        fullnode.status = Some(status);
        store.insert(fullnode.clone());

        sync_fullnode(&store, &fullnode, &Settings::default(), test_creation_time())
            .await
            .unwrap();

        assert!(store.find::<corev1::Pod>("cosmoshub-1").is_none());
        assert!(store.find::<corev1::Pod>("cosmoshub-2").is_some());
        assert!(store.find::<corev1::PersistentVolumeClaim>("pvc-cosmoshub-1").is_some());

        // Entries written by snapshot schedulers survive our status writes.
        let status = store.find::<FullNode>("cosmoshub").unwrap().status.unwrap();
        assert_eq!(status.scheduled_snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_transient() {
        let err = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ReconcileError>(())
        })
        .await
        .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ReconcileError::unrecoverable("invalid schedule").into();
        assert!(!err.is_transient());

        let err: Error = ReconcileError::transient("conflict").into();
        assert!(err.is_transient());

        let err: Error = types::error::Error::NoNamespace.into();
        assert!(!err.is_transient());
    }
}
