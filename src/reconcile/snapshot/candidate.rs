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

//! Picks the pod, and its volume, that will be taken down for a snapshot.

use crate::error::ReconcileError;
use crate::store::Store;
use crate::types::v1alpha1::fullnode::{FullNode, POD_COMPONENT};
use crate::types::v1alpha1::status::snapshot::Candidate;
use crate::utils::meta::{COMPONENT_LABEL, label_selector, ordinal_annotation, pod_pvc_name};
use crate::utils::time::is_pod_ready;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "{} in-sync pods is below the minimum of {} required to take one down",
        in_sync,
        min_available
    ))]
    TooFewInSync { in_sync: usize, min_available: usize },

    #[snafu(display(
        "pod with ordinal {} is not among the in-sync pods [{}]",
        ordinal,
        in_sync.join(", ")
    ))]
    PinnedNotInSync { ordinal: i32, in_sync: Vec<String> },

    #[snafu(display("pod {} has no persistent volume claim", pod))]
    NoVolume { pod: String },
}

/// Whether the pod may serve as a snapshot source. Sync state reported on the
/// fullnode wins; without it, readiness decides.
pub fn is_in_sync(pod: &corev1::Pod, fullnode: &FullNode) -> bool {
    let reported = fullnode
        .status
        .as_ref()
        .and_then(|s| s.sync_info.get(&pod.name_any()))
        .and_then(|info| info.in_sync);
    pod.metadata.deletion_timestamp.is_none() && reported.unwrap_or_else(|| is_pod_ready(pod))
}

fn ordinal_of(pod: &corev1::Pod) -> Option<i32> {
    ordinal_annotation(pod).and_then(|raw| raw.parse().ok())
}

/// Chooses one in-sync pod of `fullnode`.
///
/// Fails unless at least `min_available` pods are in sync. With `pin` set the
/// pod with that ordinal must be among them. All failures are transient since
/// pods may catch up later.
pub async fn find_candidate<S: Store>(
    store: &S,
    fullnode: &FullNode,
    min_available: usize,
    pin: Option<i32>,
) -> Result<Candidate, ReconcileError> {
    let namespace = fullnode.namespace().map_err(ReconcileError::unrecoverable)?;
    let mut selector = fullnode.selector_labels();
    selector.insert(COMPONENT_LABEL.to_owned(), POD_COMPONENT.to_owned());

    let mut pods: Vec<corev1::Pod> = store
        .list(&namespace, &label_selector(&selector))
        .await
        .map_err(ReconcileError::transient)?;
    pods.retain(|pod| is_in_sync(pod, fullnode));
    pods.sort_by_key(|pod| ordinal_of(pod).unwrap_or(i32::MAX));

    select(pods, min_available, pin).map_err(ReconcileError::transient)
}

fn select(pods: Vec<corev1::Pod>, min_available: usize, pin: Option<i32>) -> Result<Candidate, Error> {
    if pods.len() < min_available {
        return TooFewInSyncSnafu {
            in_sync: pods.len(),
            min_available,
        }
        .fail();
    }

    let chosen = match pin {
        Some(ordinal) => pods
            .iter()
            .find(|pod| ordinal_of(pod) == Some(ordinal))
            .ok_or_else(|| Error::PinnedNotInSync {
                ordinal,
                in_sync: pods.iter().map(|p| p.name_any()).collect(),
            })?,
        None => match pods.first() {
            Some(pod) => pod,
            None => {
                return TooFewInSyncSnafu {
                    in_sync: 0usize,
                    min_available,
                }
                .fail();
            }
        },
    };

    let pod_name = chosen.name_any();
    let pvc_name = pod_pvc_name(chosen).ok_or_else(|| Error::NoVolume {
        pod: pod_name.clone(),
    })?;

    Ok(Candidate {
        pod_name,
        pvc_name,
        pod_labels: chosen.labels().clone(),
    })
}
