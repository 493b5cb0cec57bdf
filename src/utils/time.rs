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

//! Conversions between `chrono` timestamps and the apimachinery `Time` wrapper.
//!
//! `Time` is converted through its RFC 3339 wire form so the helpers do not
//! depend on which datetime library backs `k8s-openapi`.

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

pub fn to_datetime(time: &metav1::Time) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn to_time(dt: DateTime<Utc>) -> Option<metav1::Time> {
    let raw = dt.to_rfc3339_opts(SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(raw)).ok()
}

/// Time since which the pod has continuously reported `Ready=True`.
pub fn pod_ready_since(pod: &corev1::Pod) -> Option<DateTime<Utc>> {
    let condition = pod
        .status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == "Ready")?;
    if condition.status != "True" {
        return None;
    }
    // A ready condition without a transition time is treated as ready forever.
    Some(
        condition
            .last_transition_time
            .as_ref()
            .and_then(to_datetime)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

pub fn is_pod_ready(pod: &corev1::Pod) -> bool {
    pod_ready_since(pod).is_some()
}

/// A pod is available once it has been ready for at least `min_ready`.
pub fn is_pod_available(pod: &corev1::Pod, min_ready: chrono::Duration, now: DateTime<Utc>) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    match pod_ready_since(pod) {
        Some(since) => min_ready <= chrono::Duration::zero() || since + min_ready <= now,
        None => false,
    }
}
