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

use crate::error::ReconcileError;
use crate::reconcile::ordinal_set::{OrdinalKind, OrdinalSet, Outcome, UpdateStrategy};
use crate::store::Store;
use crate::types::v1alpha1::fullnode::FullNode;
use crate::utils::meta::{POD_HASH_ANNOTATION, label_selector};
use crate::utils::time::is_pod_available;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;

impl OrdinalKind for corev1::Pod {
    const STRATEGY: UpdateStrategy = UpdateStrategy::RecreateOnDelete;

    fn is_available(&self, min_ready: chrono::Duration, now: DateTime<Utc>) -> bool {
        is_pod_available(self, min_ready, now)
    }

    fn needs_update(current: &Self, desired: &Self) -> bool {
        current.annotations().get(POD_HASH_ANNOTATION)
            != desired.annotations().get(POD_HASH_ANNOTATION)
    }
}

/// Converges the fullnode's pods.
pub async fn reconcile_pods<S: Store>(
    store: &S,
    fullnode: &FullNode,
    now: DateTime<Utc>,
) -> Result<Outcome, ReconcileError> {
    let namespace = fullnode.namespace().map_err(ReconcileError::unrecoverable)?;
    let mut selector = fullnode.selector_labels();
    selector.insert(
        crate::utils::meta::COMPONENT_LABEL.to_owned(),
        crate::types::v1alpha1::fullnode::POD_COMPONENT.to_owned(),
    );

    OrdinalSet {
        namespace: &namespace,
        selector: label_selector(&selector),
        owner_ref: fullnode.new_owner_ref(),
        max_unavailable: fullnode.max_unavailable(),
        min_ready: fullnode.min_ready(),
    }
    .reconcile(store, fullnode.desired_pods(), now)
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::{FakeStore, create_test_fullnode};

    #[test]
    fn test_hash_mismatch_needs_update() {
        let fullnode = create_test_fullnode(1);
        let current = fullnode.new_pod(0);
        let mut desired = current.clone();
        assert!(!corev1::Pod::needs_update(&current, &desired));

        desired
            .annotations_mut()
            .insert(POD_HASH_ANNOTATION.to_owned(), "other".to_owned());
        assert!(corev1::Pod::needs_update(&current, &desired));
    }

    #[tokio::test]
    async fn test_reconcile_pods_creates_all_ordinals() {
        let store = FakeStore::default();
        let fullnode = create_test_fullnode(3);

        let outcome = reconcile_pods(&store, &fullnode, Utc::now()).await.unwrap();

        assert!(outcome.needs_requeue());
        let mut names: Vec<_> = store
            .all::<corev1::Pod>()
            .iter()
            .map(|p| p.name_any())
            .collect();
        names.sort();
        assert_eq!(names, vec!["cosmoshub-0", "cosmoshub-1", "cosmoshub-2"]);
    }

    #[tokio::test]
    async fn test_reconcile_pods_removes_quiesced_candidate() {
        let store = FakeStore::default();
        let mut fullnode = create_test_fullnode(2);
        for pod in fullnode.desired_pods() {
            store.insert(pod);
        }

        let mut status = crate::types::v1alpha1::status::fullnode::Status::default();
        status.scheduled_snapshots.insert(
            "default.hourly".to_owned(),
            crate::types::v1alpha1::status::fullnode::ScheduledSnapshot {
                pod_candidate: "cosmoshub-1".to_owned(),
            },
        );
        fullnode.status = Some(status);

        reconcile_pods(&store, &fullnode, Utc::now()).await.unwrap();
        assert_eq!(store.deleted(), vec!["Pod/cosmoshub-1"]);
    }
}
