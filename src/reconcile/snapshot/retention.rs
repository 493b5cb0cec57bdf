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

//! Retention of VolumeSnapshots created by a scheduler.

use crate::error::ReconcileError;
use crate::store::Store;
use crate::types::volume_snapshot::VolumeSnapshot;
use crate::utils::time::to_datetime;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{error, info};

fn created_at(snapshot: &VolumeSnapshot) -> Option<DateTime<Utc>> {
    snapshot
        .status
        .as_ref()
        .and_then(|s| s.creation_time.as_ref())
        .and_then(to_datetime)
}

/// Snapshots beyond the `limit` most recent ones. Snapshots without a
/// creation time are neither counted nor returned.
pub fn select_expired(snapshots: Vec<VolumeSnapshot>, limit: usize) -> Vec<VolumeSnapshot> {
    let mut dated: Vec<(DateTime<Utc>, VolumeSnapshot)> = snapshots
        .into_iter()
        .filter_map(|s| created_at(&s).map(|at| (at, s)))
        .collect();
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter().skip(limit).map(|(_, s)| s).collect()
}

/// Deletes expired snapshots matching `selector`, returning the names removed.
///
/// Every expired snapshot gets a delete attempt; failures are collected into
/// one aggregate error.
pub async fn prune<S: Store>(
    store: &S,
    namespace: &str,
    selector: &str,
    limit: usize,
) -> Result<Vec<String>, ReconcileError> {
    let snapshots: Vec<VolumeSnapshot> = store
        .list(namespace, selector)
        .await
        .map_err(ReconcileError::transient)?;

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for snapshot in select_expired(snapshots, limit) {
        let name = snapshot.name_any();
        match store.delete::<VolumeSnapshot>(&name, namespace).await {
            Ok(()) => {
                info!("deleted volumesnapshot {namespace}/{name} past retention limit {limit}");
                deleted.push(name);
            }
            Err(e) => {
                error!("failed to delete volumesnapshot {namespace}/{name}: {e}");
                errors.push(ReconcileError::transient(format!(
                    "delete volumesnapshot {name}: {e}"
                )));
            }
        }
    }

    match ReconcileError::aggregate(errors) {
        Some(err) => Err(err),
        None => Ok(deleted),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::{FakeStore, test_creation_time};
    use crate::types::volume_snapshot::{VolumeSnapshotSpec, VolumeSnapshotStatus};
    use crate::utils::meta::SOURCE_LABEL;
    use crate::utils::time::to_time;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

    fn snapshot(name: &str, hours_after: Option<i64>) -> VolumeSnapshot {
        VolumeSnapshot {
            metadata: metav1::ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                labels: Some(
                    [(SOURCE_LABEL.to_owned(), "hourly".to_owned())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            spec: VolumeSnapshotSpec::default(),
            status: hours_after.map(|h| VolumeSnapshotStatus {
                ready_to_use: Some(true),
                creation_time: to_time(test_creation_time() + chrono::Duration::hours(h)),
                ..Default::default()
            }),
        }
    }

    fn seeded() -> FakeStore {
        let store = FakeStore::default();
        for h in 0..8 {
            store.insert(snapshot(&format!("snap-{h}"), Some(h)));
        }
        store.insert(snapshot("no-status", None));
        store
    }

    #[test]
    fn test_select_expired_keeps_most_recent() {
        let snapshots: Vec<_> = (0..8)
            .map(|h| snapshot(&format!("snap-{h}"), Some(h)))
            .chain([snapshot("no-status", None)])
            .collect();

        let mut expired: Vec<_> = select_expired(snapshots, 5)
            .iter()
            .map(|s| s.name_any())
            .collect();
        expired.sort();
        assert_eq!(expired, vec!["snap-0", "snap-1", "snap-2"]);
    }

    #[test]
    fn test_untimestamped_snapshots_do_not_count() {
        let snapshots = vec![
            snapshot("a", None),
            snapshot("b", None),
            snapshot("c", Some(1)),
        ];
        assert!(select_expired(snapshots, 1).is_empty());
    }

    #[tokio::test]
    async fn test_prune_deletes_oldest_beyond_limit() {
        let store = seeded();
        let selector = format!("{SOURCE_LABEL}=hourly");

        let mut deleted = prune(&store, "default", &selector, 5).await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["snap-0", "snap-1", "snap-2"]);
        assert!(store.find::<VolumeSnapshot>("no-status").is_some());
        assert_eq!(store.all::<VolumeSnapshot>().len(), 6);
    }

    #[tokio::test]
    async fn test_prune_continues_past_failures() {
        let store = seeded();
        store.fail_delete_of("snap-1");
        let selector = format!("{SOURCE_LABEL}=hourly");

        let err = prune(&store, "default", &selector, 5).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("snap-1"));

        let remaining: Vec<_> = store
            .all::<VolumeSnapshot>()
            .iter()
            .map(|s| s.name_any())
            .collect();
        assert!(!remaining.contains(&"snap-0".to_owned()));
        assert!(remaining.contains(&"snap-1".to_owned()));
        assert!(!remaining.contains(&"snap-2".to_owned()));
    }

    #[tokio::test]
    async fn test_prune_ignores_other_sources() {
        let store = seeded();
        let selector = format!("{SOURCE_LABEL}=daily");
        assert!(prune(&store, "default", &selector, 0).await.unwrap().is_empty());
    }
}
