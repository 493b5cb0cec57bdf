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

//! Rollout budget: how many replicas may be taken down for an update at once.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::warn;

/// Resolves `max_unavailable` against `desired`, rounding percentages down and
/// never returning less than one.
pub fn resolve_max_unavailable(max_unavailable: Option<&IntOrString>, desired: i32) -> i32 {
    let resolved = match max_unavailable {
        None => 1,
        Some(IntOrString::Int(n)) => *n,
        Some(IntOrString::String(raw)) => match parse_percent(raw) {
            Some(percent) => {
                let desired = i64::from(desired.max(0));
                (desired.saturating_mul(percent) / 100).clamp(0, desired) as i32
            }
            None => {
                warn!("invalid maxUnavailable {raw:?}, falling back to 1");
                1
            }
        },
    };
    resolved.max(1)
}

fn parse_percent(raw: &str) -> Option<i64> {
    raw.trim()
        .strip_suffix('%')
        .and_then(|n| n.trim().parse::<i64>().ok())
        .filter(|n| *n >= 0)
}

/// Number of replicas, taken from the head of the ordinal-sorted update
/// queue, that may be updated during this pass.
///
/// Panics if `desired < 1` or `ready < 0`.
pub fn compute_rollout(max_unavailable: Option<&IntOrString>, desired: i32, ready: i32) -> i32 {
    assert!(desired >= 1, "desired replicas must be at least 1, got {desired}");
    assert!(ready >= 0, "ready replicas must not be negative, got {ready}");

    let unavailable = resolve_max_unavailable(max_unavailable, desired);
    let min_available = desired - unavailable;
    if ready <= min_available {
        return 0;
    }

    (unavailable - (desired - ready)).clamp(0, desired)
}
