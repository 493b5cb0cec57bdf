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

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub phase: Phase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    #[serde(default)]
    pub available_replicas: i32,

    /// Per-pod sync state keyed by pod name, reported by the chain sync monitor.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sync_info: BTreeMap<String, PodSyncInfo>,

    /// Pods temporarily removed for a snapshot, keyed by `<namespace>.<scheduler name>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scheduled_snapshots: BTreeMap<String, ScheduledSnapshot>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq, Display)]
pub enum Phase {
    #[default]
    #[strum(to_string = "Progressing")]
    Progressing,

    #[strum(to_string = "Complete")]
    Complete,

    #[strum(to_string = "Error")]
    Error,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSyncInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_sync: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSnapshot {
    pub pod_candidate: String,
}
