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

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::utils::meta::{
    COMPONENT_LABEL, INSTANCE_LABEL, MANAGED_BY_LABEL, NAME_LABEL, OPERATOR_NAME,
};
use k8s_openapi::Resource as _;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::collections::BTreeMap;

mod workloads;

pub use workloads::{POD_COMPONENT, PVC_COMPONENT};

pub const DEFAULT_MOUNT_PATH: &str = "/home/operator/data";
pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "chainops.io",
    version = "v1alpha1",
    kind = "FullNode",
    namespaced,
    status = "crate::types::v1alpha1::status::fullnode::Status",
    shortname = "fn",
    plural = "fullnodes",
    singular = "fullnode",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct FullNodeSpec {
    #[x_kube(validation = Rule::new("self >= 0").message("replicas must not be negative"))]
    pub replicas: i32,

    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<corev1::EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    pub volume_claim_template: VolumeClaimTemplate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_strategy: Option<RolloutStrategy>,

    /// Seconds a pod must stay Ready before it counts as available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ready_seconds: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimTemplate {
    /// Requested storage, e.g. `500Gi`.
    pub storage: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,

    /// Restore new volumes from an existing VolumeSnapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<corev1::TypedLocalObjectReference>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    /// Absolute number or percentage (`"25%"`) of replicas that may be
    /// unavailable during an update. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
}

impl FullNode {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// a new owner reference for fullnode
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Labels shared by every pod and volume of this fullnode.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        [
            (NAME_LABEL.to_owned(), Self::kind(&()).to_lowercase()),
            (INSTANCE_LABEL.to_owned(), self.name()),
        ]
        .into_iter()
        .collect()
    }

    pub fn labels_for(&self, component: &str) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(MANAGED_BY_LABEL.to_owned(), OPERATOR_NAME.to_owned());
        labels.insert(COMPONENT_LABEL.to_owned(), component.to_owned());
        labels
    }

    pub fn pod_name(&self, ordinal: i32) -> String {
        format!("{}-{}", self.name(), ordinal)
    }

    pub fn pvc_name(&self, ordinal: i32) -> String {
        format!("pvc-{}-{}", self.name(), ordinal)
    }

    pub fn max_unavailable(&self) -> Option<&IntOrString> {
        self.spec
            .rollout_strategy
            .as_ref()
            .and_then(|s| s.max_unavailable.as_ref())
    }

    pub fn min_ready(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.spec.min_ready_seconds.unwrap_or(0).max(0) as i64)
    }

    /// Pods withheld from the desired set because a snapshot has them quiesced.
    pub fn quiesced_pods(&self) -> Vec<String> {
        self.status
            .as_ref()
            .map(|s| {
                s.scheduled_snapshots
                    .values()
                    .map(|entry| entry.pod_candidate.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
