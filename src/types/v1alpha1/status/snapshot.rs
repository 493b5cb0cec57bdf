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

use crate::types::volume_snapshot::VolumeSnapshotStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

/// Number of completed snapshots kept in status.
pub const HISTORY_LIMIT: usize = 5;

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub phase: Phase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    /// Pod and volume currently quiesced for a snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Candidate>,

    /// Most recently created snapshot, ready or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_snapshot: Option<SnapshotRecord>,

    /// Completed snapshots, most recent first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<SnapshotRecord>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq, Display)]
pub enum Phase {
    #[default]
    #[strum(to_string = "WaitingForNext")]
    WaitingForNext,

    #[strum(to_string = "FindingCandidate")]
    FindingCandidate,

    #[strum(to_string = "DeletingPod")]
    DeletingPod,

    #[strum(to_string = "WaitingForPodDeletion")]
    WaitingForPodDeletion,

    #[strum(to_string = "CreatingSnapshot")]
    CreatingSnapshot,

    #[strum(to_string = "WaitingForSnapshotCreation")]
    WaitingForSnapshotCreation,

    #[strum(to_string = "RestoringPod")]
    RestoringPod,

    #[strum(to_string = "Suspended")]
    Suspended,

    #[strum(to_string = "MissingCRDs")]
    MissingCRDs,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub pod_name: String,

    pub pvc_name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_labels: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub name: String,

    pub started_at: metav1::Time,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VolumeSnapshotStatus>,
}

impl SnapshotRecord {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(VolumeSnapshotStatus::is_ready)
    }
}

impl Status {
    /// Pushes a completed snapshot to the front of the bounded history.
    pub fn push_history(&mut self, record: SnapshotRecord) {
        self.history.retain(|r| r.name != record.name);
        self.history.insert(0, record);
        self.history.truncate(HISTORY_LIMIT);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(name: &str, hour: u32) -> SnapshotRecord {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
        SnapshotRecord {
            name: name.to_owned(),
            started_at: crate::utils::time::to_time(started).unwrap(),
            status: None,
        }
    }

    #[test]
    fn test_history_is_bounded_and_most_recent_first() {
        let mut status = Status::default();
        for hour in 0..7 {
            status.push_history(record(&format!("snap-{hour}"), hour));
        }

        let names: Vec<_> = status.history.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["snap-6", "snap-5", "snap-4", "snap-3", "snap-2"]);
    }

    #[test]
    fn test_history_does_not_duplicate_a_record() {
        let mut status = Status::default();
        status.push_history(record("snap-1", 1));
        status.push_history(record("snap-1", 1));
        assert_eq!(status.history.len(), 1);
    }

    #[test]
    fn test_phase_serializes_as_plain_string() {
        let value = serde_json::to_value(Phase::WaitingForSnapshotCreation).unwrap();
        assert_eq!(value, serde_json::json!("WaitingForSnapshotCreation"));
        assert_eq!(Phase::MissingCRDs.to_string(), "MissingCRDs");
    }
}
