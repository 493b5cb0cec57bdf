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

use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use std::collections::BTreeMap;

pub const GROUP: &str = "chainops.io";
pub const OPERATOR_NAME: &str = "chainops-operator";

/// Position of a member within its ordinal set, stored as a decimal string.
pub const ORDINAL_ANNOTATION: &str = const_str::concat!(GROUP, "/ordinal");
pub const POD_HASH_ANNOTATION: &str = const_str::concat!(GROUP, "/pod-spec-hash");

/// Links a VolumeSnapshot to the ScheduledVolumeSnapshot that created it.
pub const SOURCE_LABEL: &str = const_str::concat!(GROUP, "/source");

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Renders a label map as an equality-based label selector, e.g. `a=b,c=d`.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn ordinal_annotation<K: ResourceExt>(obj: &K) -> Option<&str> {
    obj.annotations().get(ORDINAL_ANNOTATION).map(String::as_str)
}

/// Name of the first PersistentVolumeClaim mounted by the pod.
pub fn pod_pvc_name(pod: &corev1::Pod) -> Option<String> {
    pod.spec
        .as_ref()?
        .volumes
        .as_ref()?
        .iter()
        .find_map(|v| v.persistent_volume_claim.as_ref())
        .map(|claim| claim.claim_name.clone())
}
