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
use crate::utils::meta::SOURCE_LABEL;
use kube::{CustomResource, KubeSchema, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::collections::BTreeMap;

pub const DEFAULT_LIMIT: i32 = 3;
pub const DEFAULT_MIN_AVAILABLE: i32 = 2;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "chainops.io",
    version = "v1alpha1",
    kind = "ScheduledVolumeSnapshot",
    namespaced,
    status = "crate::types::v1alpha1::status::snapshot::Status",
    shortname = "svs",
    plural = "scheduledvolumesnapshots",
    singular = "scheduledvolumesnapshot",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Last Snapshot", "type":"string", "jsonPath":".status.lastSnapshot.name"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledVolumeSnapshotSpec {
    pub full_node_ref: FullNodeRef,

    /// Standard five field cron expression, evaluated in UTC.
    #[x_kube(validation = Rule::new("self != ''").message("schedule must not be empty"))]
    pub schedule: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,

    /// Number of ready snapshots to retain. Defaults to 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,

    /// Minimum in-sync pods required before one is taken down. Defaults to 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<i32>,

    /// Always snapshot the pod with this ordinal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_ordinal: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct FullNodeRef {
    pub name: String,

    /// Defaults to the namespace of the ScheduledVolumeSnapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ScheduledVolumeSnapshot {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// Key under which this scheduler registers its quiesced pod on the fullnode.
    pub fn status_key(&self) -> String {
        format!(
            "{}.{}",
            ResourceExt::namespace(self).unwrap_or_default(),
            self.name()
        )
    }

    pub fn fullnode_namespace(&self) -> Result<String, types::error::Error> {
        match &self.spec.full_node_ref.namespace {
            Some(ns) if !ns.is_empty() => Ok(ns.clone()),
            _ => self.namespace(),
        }
    }

    pub fn limit(&self) -> usize {
        self.spec.limit.unwrap_or(DEFAULT_LIMIT).max(0) as usize
    }

    pub fn min_available(&self) -> usize {
        self.spec.min_available.unwrap_or(DEFAULT_MIN_AVAILABLE).max(0) as usize
    }

    pub fn is_suspended(&self) -> bool {
        self.spec.suspend.unwrap_or(false)
    }

    /// Labels placed on every VolumeSnapshot this scheduler creates.
    pub fn snapshot_labels(&self) -> BTreeMap<String, String> {
        [(SOURCE_LABEL.to_owned(), self.name())].into_iter().collect()
    }
}
