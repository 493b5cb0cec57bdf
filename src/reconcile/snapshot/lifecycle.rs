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

//! Phase machine that takes one scheduled snapshot from trigger to restore.
//!
//! Each call to [`step`] advances the machine as far as it can without
//! waiting on the cluster, then returns how long to wait before the next
//! pass. The phase lives in the scheduler's status; the caller reads it at
//! the start of a pass and persists it at the end.

use super::{candidate, retention, scheduler};
use crate::context::Settings;
use crate::error::ReconcileError;
use crate::store::Store;
use crate::types::v1alpha1::fullnode::FullNode;
use crate::types::v1alpha1::snapshot::ScheduledVolumeSnapshot;
use crate::types::v1alpha1::status::fullnode::ScheduledSnapshot;
use crate::types::v1alpha1::status::snapshot::{Candidate, Phase, SnapshotRecord, Status};
use crate::types::volume_snapshot::{
    VOLUME_SNAPSHOT_CRD, VolumeSnapshot, VolumeSnapshotSource, VolumeSnapshotSpec,
};
use crate::utils::meta::label_selector;
use crate::utils::time::to_time;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on phase transitions within a single pass.
const MAX_TRANSITIONS: usize = 16;

enum Next {
    Continue,
    Wait(Duration),
}

struct Pass<'a, S> {
    store: &'a S,
    svs: &'a ScheduledVolumeSnapshot,
    namespace: String,
    now: DateTime<Utc>,
    settings: &'a Settings,
}

/// Advances `status` through as many phases as possible.
pub async fn step<S: Store>(
    store: &S,
    svs: &ScheduledVolumeSnapshot,
    status: &mut Status,
    now: DateTime<Utc>,
    settings: &Settings,
) -> Result<Action, ReconcileError> {
    let installed = store
        .crd_installed::<VolumeSnapshot>()
        .await
        .map_err(ReconcileError::transient)?;
    if !installed {
        status.phase = Phase::MissingCRDs;
        return Err(ReconcileError::unrecoverable(format!(
            "CustomResourceDefinition {VOLUME_SNAPSHOT_CRD} is not installed"
        )));
    }
    if status.phase == Phase::MissingCRDs {
        info!("{VOLUME_SNAPSHOT_CRD} is now installed");
        status.phase = Phase::WaitingForNext;
    }

    let pass = Pass {
        store,
        svs,
        namespace: svs
            .fullnode_namespace()
            .map_err(ReconcileError::unrecoverable)?,
        now,
        settings,
    };

    if svs.is_suspended() {
        if status.candidate.is_some()
            && let Next::Wait(after) = pass.restore_pod(status).await?
        {
            return Ok(Action::requeue(after));
        }
        if status.phase != Phase::Suspended {
            info!("scheduledvolumesnapshot {} suspended", svs.name());
        }
        status.phase = Phase::Suspended;
        status.status_message = None;
        return Ok(Action::await_change());
    }
    if status.phase == Phase::Suspended {
        info!("scheduledvolumesnapshot {} resumed", svs.name());
        status.phase = Phase::WaitingForNext;
    }

    for _ in 0..MAX_TRANSITIONS {
        let phase = status.phase.clone();
        let next = match phase {
            Phase::WaitingForNext => pass.wait_for_next(status).await?,
            Phase::FindingCandidate => pass.find_candidate(status).await?,
            Phase::DeletingPod => pass.delete_pod(status).await?,
            Phase::WaitingForPodDeletion => pass.wait_for_pod_deletion(status).await?,
            Phase::CreatingSnapshot => pass.create_snapshot(status).await?,
            Phase::WaitingForSnapshotCreation => pass.wait_for_snapshot(status).await?,
            Phase::RestoringPod => pass.restore_pod(status).await?,
            Phase::Suspended | Phase::MissingCRDs => {
                status.phase = Phase::WaitingForNext;
                Next::Continue
            }
        };
        match next {
            Next::Wait(after) => return Ok(Action::requeue(after)),
            Next::Continue => debug!(
                "scheduledvolumesnapshot {}: {phase} -> {}",
                svs.name(),
                status.phase
            ),
        }
    }

    Ok(Action::requeue(settings.requeue))
}

/// Hands any pod quiesced by `svs` back to its fullnode.
pub async fn release<S: Store>(
    store: &S,
    svs: &ScheduledVolumeSnapshot,
    now: DateTime<Utc>,
    settings: &Settings,
) -> Result<(), ReconcileError> {
    let pass = Pass {
        store,
        svs,
        namespace: svs
            .fullnode_namespace()
            .map_err(ReconcileError::unrecoverable)?,
        now,
        settings,
    };
    pass.mark_quiesced(None).await
}

impl<S: Store> Pass<'_, S> {
    fn fullnode_name(&self) -> &str {
        &self.svs.spec.full_node_ref.name
    }

    async fn notify(&self, event_type: EventType, reason: &str, message: &str) {
        if let Err(e) = self.store.record(self.svs, event_type, reason, message).await {
            warn!("failed to record {reason} event: {e}");
        }
    }

    /// Registers or clears this scheduler's quiesced pod on the fullnode.
    async fn mark_quiesced(&self, pod: Option<&str>) -> Result<(), ReconcileError> {
        let exists = self
            .store
            .get_opt::<FullNode>(self.fullnode_name(), &self.namespace)
            .await
            .map_err(ReconcileError::transient)?
            .is_some();
        if !exists {
            return if pod.is_some() {
                Err(ReconcileError::transient(format!(
                    "fullnode {}/{} not found",
                    self.namespace,
                    self.fullnode_name()
                )))
            } else {
                Ok(())
            };
        }

        let key = self.svs.status_key();
        let pod = pod.map(str::to_owned);
        self.store
            .update_status::<FullNode, _>(self.fullnode_name(), &self.namespace, move |status| {
                match pod {
                    Some(pod_candidate) => {
                        status
                            .scheduled_snapshots
                            .insert(key, ScheduledSnapshot { pod_candidate });
                    }
                    None => {
                        status.scheduled_snapshots.remove(&key);
                    }
                }
            })
            .await
            .map_err(ReconcileError::transient)?;
        Ok(())
    }

    async fn pod_exists(&self, name: &str) -> Result<bool, ReconcileError> {
        Ok(self
            .store
            .get_opt::<corev1::Pod>(name, &self.namespace)
            .await
            .map_err(ReconcileError::transient)?
            .is_some())
    }

    async fn wait_for_next(&self, status: &mut Status) -> Result<Next, ReconcileError> {
        let wait = scheduler::calc_next(
            self.store,
            self.svs,
            status,
            self.now,
            self.settings.snapshot_poll,
        )
        .await?;
        if wait.is_zero() {
            status.status_message = None;
            status.phase = Phase::FindingCandidate;
            return Ok(Next::Continue);
        }
        status.status_message = Some(format!("next snapshot in {}s", wait.as_secs()));
        Ok(Next::Wait(wait))
    }

    async fn find_candidate(&self, status: &mut Status) -> Result<Next, ReconcileError> {
        let fullnode = self
            .store
            .get_opt::<FullNode>(self.fullnode_name(), &self.namespace)
            .await
            .map_err(ReconcileError::transient)?
            .ok_or_else(|| {
                ReconcileError::transient(format!(
                    "fullnode {}/{} not found",
                    self.namespace,
                    self.fullnode_name()
                ))
            })?;

        let chosen = candidate::find_candidate(
            self.store,
            &fullnode,
            self.svs.min_available(),
            self.svs.spec.candidate_ordinal,
        )
        .await?;
        info!(
            "selected pod {} with volume {} for snapshot",
            chosen.pod_name, chosen.pvc_name
        );
        status.candidate = Some(chosen);
        status.phase = Phase::DeletingPod;
        Ok(Next::Continue)
    }

    fn candidate<'s>(&self, status: &'s Status) -> Result<&'s Candidate, ReconcileError> {
        status.candidate.as_ref().ok_or_else(|| {
            ReconcileError::transient(format!(
                "phase {} requires a candidate but none is recorded",
                status.phase
            ))
        })
    }

    async fn delete_pod(&self, status: &mut Status) -> Result<Next, ReconcileError> {
        let Some(candidate) = status.candidate.clone() else {
            status.phase = Phase::FindingCandidate;
            return Ok(Next::Continue);
        };

        self.mark_quiesced(Some(&candidate.pod_name)).await?;
        self.store
            .delete::<corev1::Pod>(&candidate.pod_name, &self.namespace)
            .await
            .map_err(ReconcileError::transient)?;
        info!("deleted pod {}/{} for snapshot", self.namespace, candidate.pod_name);
        self.notify(
            EventType::Normal,
            "PodDeleted",
            &format!(
                "Deleted pod {} to snapshot volume {}",
                candidate.pod_name, candidate.pvc_name
            ),
        )
        .await;

        status.phase = Phase::WaitingForPodDeletion;
        Ok(Next::Continue)
    }

    async fn wait_for_pod_deletion(&self, status: &mut Status) -> Result<Next, ReconcileError> {
        let pod_name = self.candidate(status)?.pod_name.clone();
        if self.pod_exists(&pod_name).await? {
            status.status_message = Some(format!("waiting for pod {pod_name} to terminate"));
            return Ok(Next::Wait(self.settings.requeue));
        }
        status.status_message = None;
        status.phase = Phase::CreatingSnapshot;
        Ok(Next::Continue)
    }

    fn new_snapshot(&self, name: &str, candidate: &Candidate) -> VolumeSnapshot {
        let mut labels = candidate.pod_labels.clone();
        labels.extend(self.svs.snapshot_labels());

        VolumeSnapshot {
            metadata: metav1::ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: VolumeSnapshotSpec {
                source: VolumeSnapshotSource {
                    persistent_volume_claim_name: Some(candidate.pvc_name.clone()),
                    volume_snapshot_content_name: None,
                },
                volume_snapshot_class_name: self.svs.spec.volume_snapshot_class_name.clone(),
            },
            status: None,
        }
    }

    /// A snapshot of `pvc_name` this scheduler created that is not ready yet.
    ///
    /// Creating a snapshot and persisting its name are separate writes; if the
    /// second one fails the next pass finds the first snapshot here.
    async fn in_flight_snapshot(
        &self,
        pvc_name: &str,
    ) -> Result<Option<VolumeSnapshot>, ReconcileError> {
        let selector = label_selector(&self.svs.snapshot_labels());
        let snapshots = self
            .store
            .list::<VolumeSnapshot>(&self.namespace, &selector)
            .await
            .map_err(ReconcileError::transient)?;
        Ok(snapshots.into_iter().find(|snapshot| {
            !snapshot.is_ready()
                && snapshot.spec.source.persistent_volume_claim_name.as_deref() == Some(pvc_name)
        }))
    }

    async fn create_snapshot(&self, status: &mut Status) -> Result<Next, ReconcileError> {
        let candidate = self.candidate(status)?.clone();

        let (name, created_at) = match self.in_flight_snapshot(&candidate.pvc_name).await? {
            Some(snapshot) => {
                info!(
                    "volumesnapshot {}/{} of {} is already in progress",
                    self.namespace,
                    snapshot.name_any(),
                    candidate.pvc_name
                );
                (snapshot.name_any(), snapshot.metadata.creation_timestamp)
            }
            None => {
                let name = format!("{}-{}", self.svs.name(), self.now.format("%Y%m%d%H%M%S"));
                self.store
                    .create(&self.new_snapshot(&name, &candidate), &self.namespace)
                    .await
                    .map_err(ReconcileError::transient)?;
                info!(
                    "created volumesnapshot {}/{name} from {}",
                    self.namespace, candidate.pvc_name
                );
                self.notify(
                    EventType::Normal,
                    "SnapshotCreated",
                    &format!("Created VolumeSnapshot {name} from {}", candidate.pvc_name),
                )
                .await;
                (name, None)
            }
        };

        let started_at = match created_at.or_else(|| to_time(self.now)) {
            Some(started_at) => started_at,
            None => {
                return Err(ReconcileError::unrecoverable(format!(
                    "cannot represent {} as a timestamp",
                    self.now
                )));
            }
        };
        status.last_snapshot = Some(SnapshotRecord {
            name,
            started_at,
            status: None,
        });
        status.phase = Phase::WaitingForSnapshotCreation;
        Ok(Next::Wait(self.settings.snapshot_poll))
    }

    async fn wait_for_snapshot(&self, status: &mut Status) -> Result<Next, ReconcileError> {
        let Some(last) = status.last_snapshot.as_mut() else {
            status.phase = Phase::RestoringPod;
            return Ok(Next::Continue);
        };

        let snapshot = self
            .store
            .get_opt::<VolumeSnapshot>(&last.name, &self.namespace)
            .await
            .map_err(ReconcileError::transient)?;
        let Some(snapshot) = snapshot else {
            warn!(
                "volumesnapshot {} disappeared before becoming ready, treating it as complete",
                last.name
            );
            status.phase = Phase::RestoringPod;
            return Ok(Next::Continue);
        };

        last.status = snapshot.status.clone();
        if !snapshot.is_ready() {
            let detail = snapshot
                .status
                .as_ref()
                .and_then(|s| s.error.as_ref())
                .and_then(|e| e.message.clone());
            status.status_message = Some(match detail {
                Some(detail) => format!("waiting for snapshot {}: {detail}", last.name),
                None => format!("waiting for snapshot {} to become ready", last.name),
            });
            return Ok(Next::Wait(self.settings.snapshot_poll));
        }

        info!("volumesnapshot {} is ready to use", last.name);
        let record = last.clone();
        status.push_history(record);
        status.status_message = None;
        status.phase = Phase::RestoringPod;
        Ok(Next::Continue)
    }

    /// Hands the candidate pod back to the fullnode and prunes old snapshots
    /// once it is running again.
    async fn restore_pod(&self, status: &mut Status) -> Result<Next, ReconcileError> {
        let Some(candidate) = status.candidate.clone() else {
            status.phase = Phase::WaitingForNext;
            return Ok(Next::Continue);
        };

        self.mark_quiesced(None).await?;
        if !self.pod_exists(&candidate.pod_name).await? {
            status.phase = Phase::RestoringPod;
            status.status_message =
                Some(format!("waiting for pod {} to be recreated", candidate.pod_name));
            return Ok(Next::Wait(self.settings.requeue));
        }

        info!("pod {}/{} restored", self.namespace, candidate.pod_name);
        status.candidate = None;
        status.status_message = None;
        status.phase = Phase::WaitingForNext;

        let selector = label_selector(&self.svs.snapshot_labels());
        let pruned =
            retention::prune(self.store, &self.namespace, &selector, self.svs.limit()).await?;
        for name in pruned {
            self.notify(
                EventType::Normal,
                "SnapshotPruned",
                &format!("Deleted VolumeSnapshot {name} past the retention limit"),
            )
            .await;
        }
        Ok(Next::Continue)
    }
}
