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

//! Two-phase convergence of one kind of ordinal resource for one owner.
//!
//! Phase one scales: missing members are created and surplus members deleted.
//! Only once the set has neither does phase two roll changed members out, a
//! few at a time, as allowed by the rollout budget.

use crate::diff::diff;
use crate::error::ReconcileError;
use crate::rollout::compute_rollout;
use crate::store::{KubeObject, Store};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::{debug, info};

/// How a member whose content changed is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Delete the member; the next pass recreates it from the desired state.
    RecreateOnDelete,
    /// Merge-patch the member's mutable fields in place.
    InPlacePatch,
}

/// A resource kind managed as an ordinal set.
pub trait OrdinalKind: KubeObject {
    const STRATEGY: UpdateStrategy;

    /// Whether the member counts toward availability for the rollout budget.
    fn is_available(&self, min_ready: chrono::Duration, now: DateTime<Utc>) -> bool;

    /// Whether the live member differs from its desired form.
    fn needs_update(current: &Self, desired: &Self) -> bool;

    /// Merge patch applied for [`UpdateStrategy::InPlacePatch`].
    fn update_patch(desired: &Self) -> serde_json::Value {
        serde_json::json!({ "metadata": { "annotations": desired.annotations() } })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Settled,
    Requeue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub reconciled: Reconciled,
    /// Live members that were available at the start of the pass.
    pub available: i32,
}

impl Outcome {
    pub fn needs_requeue(&self) -> bool {
        self.reconciled == Reconciled::Requeue
    }
}

/// The owner-scoped parameters of one ordinal set.
#[derive(Debug, Clone)]
pub struct OrdinalSet<'a> {
    pub namespace: &'a str,
    /// Label selector matching every live member of the set.
    pub selector: String,
    pub owner_ref: metav1::OwnerReference,
    pub max_unavailable: Option<&'a IntOrString>,
    pub min_ready: chrono::Duration,
}

impl OrdinalSet<'_> {
    pub async fn reconcile<K, S>(
        &self,
        store: &S,
        desired: Vec<K>,
        now: DateTime<Utc>,
    ) -> Result<Outcome, ReconcileError>
    where
        K: OrdinalKind,
        S: Store,
    {
        let kind = K::kind(&());
        let current: Vec<K> = store
            .list(self.namespace, &self.selector)
            .await
            .map_err(ReconcileError::transient)?;

        let available = current
            .iter()
            .filter(|obj| obj.is_available(self.min_ready, now))
            .count() as i32;
        let desired_count = desired.len() as i32;

        let changes = diff(current, desired, |current, desired| {
            !K::needs_update(current, desired)
        });

        if changes.is_scaling() {
            for mut obj in changes.creates {
                obj.meta_mut().owner_references = Some(vec![self.owner_ref.clone()]);
                info!("creating {kind} {}", obj.name_any());
                store
                    .create(&obj, self.namespace)
                    .await
                    .map_err(ReconcileError::transient)?;
            }
            for obj in changes.deletes {
                info!("deleting {kind} {}", obj.name_any());
                store
                    .delete::<K>(&obj.name_any(), self.namespace)
                    .await
                    .map_err(ReconcileError::transient)?;
            }
            return Ok(Outcome {
                reconciled: Reconciled::Requeue,
                available,
            });
        }

        if desired_count == 0 {
            return Ok(Outcome {
                reconciled: Reconciled::Settled,
                available,
            });
        }

        let pending = changes.updates.len();
        if pending > 0 {
            let budget = compute_rollout(self.max_unavailable, desired_count, available) as usize;
            debug!(
                "{kind} rollout: {pending} pending, {available}/{desired_count} available, budget {budget}"
            );

            for obj in changes.updates.into_iter().take(budget) {
                let name = obj.name_any();
                match K::STRATEGY {
                    UpdateStrategy::RecreateOnDelete => {
                        info!("deleting {kind} {name} for update");
                        store
                            .delete::<K>(&name, self.namespace)
                            .await
                            .map_err(ReconcileError::transient)?;
                    }
                    UpdateStrategy::InPlacePatch => {
                        info!("patching {kind} {name}");
                        store
                            .patch::<K>(&name, self.namespace, &K::update_patch(&obj))
                            .await
                            .map_err(ReconcileError::transient)?;
                    }
                }
            }
        }

        let reconciled = if pending > 0 || available < desired_count {
            Reconciled::Requeue
        } else {
            Reconciled::Settled
        };

        Ok(Outcome {
            reconciled,
            available,
        })
    }
}
