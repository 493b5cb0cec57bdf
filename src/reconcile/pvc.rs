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
use crate::types::v1alpha1::fullnode::{FullNode, PVC_COMPONENT};
use crate::utils::meta::{COMPONENT_LABEL, label_selector};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

fn requested_storage(pvc: &corev1::PersistentVolumeClaim) -> Option<&Quantity> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
}

impl OrdinalKind for corev1::PersistentVolumeClaim {
    // Deleting a volume would throw away chain data.
    const STRATEGY: UpdateStrategy = UpdateStrategy::InPlacePatch;

    fn is_available(&self, _min_ready: chrono::Duration, _now: DateTime<Utc>) -> bool {
        self.metadata.deletion_timestamp.is_none()
            && self
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == "Bound")
    }

    fn needs_update(current: &Self, desired: &Self) -> bool {
        requested_storage(current) != requested_storage(desired)
    }

    fn update_patch(desired: &Self) -> serde_json::Value {
        serde_json::json!({
            "spec": { "resources": { "requests": { "storage": requested_storage(desired) } } }
        })
    }
}

/// Converges the fullnode's volumes.
pub async fn reconcile_pvcs<S: Store>(
    store: &S,
    fullnode: &FullNode,
    now: DateTime<Utc>,
) -> Result<Outcome, ReconcileError> {
    let namespace = fullnode.namespace().map_err(ReconcileError::unrecoverable)?;
    let mut selector = fullnode.selector_labels();
    selector.insert(COMPONENT_LABEL.to_owned(), PVC_COMPONENT.to_owned());

    OrdinalSet {
        namespace: &namespace,
        selector: label_selector(&selector),
        owner_ref: fullnode.new_owner_ref(),
        max_unavailable: fullnode.max_unavailable(),
        min_ready: fullnode.min_ready(),
    }
    .reconcile(store, fullnode.desired_pvcs(), now)
    .await
}
