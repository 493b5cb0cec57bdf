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

use super::{DEFAULT_ACCESS_MODE, DEFAULT_MOUNT_PATH, FullNode};
use crate::utils::meta::{ORDINAL_ANNOTATION, POD_HASH_ANNOTATION};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const NODE_CONTAINER_NAME: &str = "node";
const DATA_VOLUME_NAME: &str = "vol-chain-home";

pub const POD_COMPONENT: &str = "fullnode";
pub const PVC_COMPONENT: &str = "pvc";

fn ordinal_annotations(ordinal: i32) -> BTreeMap<String, String> {
    [(ORDINAL_ANNOTATION.to_owned(), ordinal.to_string())]
        .into_iter()
        .collect()
}

/// Hex encoded sha256 of the serialized pod spec and labels.
pub fn pod_spec_hash(pod: &corev1::Pod) -> String {
    let mut hasher = Sha256::new();
    if let Ok(spec) = serde_json::to_vec(&pod.spec) {
        hasher.update(&spec);
    }
    if let Ok(labels) = serde_json::to_vec(&pod.metadata.labels) {
        hasher.update(&labels);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl FullNode {
    /// Desired pods, one per ordinal, minus the ones quiesced for a snapshot.
    pub fn desired_pods(&self) -> Vec<corev1::Pod> {
        let quiesced = self.quiesced_pods();
        (0..self.spec.replicas.max(0))
            .map(|ordinal| self.new_pod(ordinal))
            .filter(|pod| {
                pod.metadata
                    .name
                    .as_ref()
                    .is_none_or(|name| !quiesced.contains(name))
            })
            .collect()
    }

    /// Desired volumes, one per ordinal.
    pub fn desired_pvcs(&self) -> Vec<corev1::PersistentVolumeClaim> {
        (0..self.spec.replicas.max(0))
            .map(|ordinal| self.new_pvc(ordinal))
            .collect()
    }

    pub fn new_pod(&self, ordinal: i32) -> corev1::Pod {
        let mount_path = self
            .spec
            .volume_claim_template
            .mount_path
            .clone()
            .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_owned());

        let container = corev1::Container {
            name: NODE_CONTAINER_NAME.to_owned(),
            image: Some(self.spec.image.clone()),
            image_pull_policy: self.spec.image_pull_policy.clone(),
            args: if self.spec.args.is_empty() {
                None
            } else {
                Some(self.spec.args.clone())
            },
            env: if self.spec.env.is_empty() {
                None
            } else {
                Some(self.spec.env.clone())
            },
            resources: self.spec.resources.clone(),
            volume_mounts: Some(vec![corev1::VolumeMount {
                name: DATA_VOLUME_NAME.to_owned(),
                mount_path,
                ..Default::default()
            }]),
            ..Default::default()
        };

        let mut pod = corev1::Pod {
            metadata: metav1::ObjectMeta {
                name: Some(self.pod_name(ordinal)),
                namespace: self.namespace().ok(),
                labels: Some(self.labels_for(POD_COMPONENT)),
                annotations: Some(ordinal_annotations(ordinal)),
                ..Default::default()
            },
            spec: Some(corev1::PodSpec {
                hostname: Some(self.pod_name(ordinal)),
                service_account_name: self.spec.service_account_name.clone(),
                containers: vec![container],
                volumes: Some(vec![corev1::Volume {
                    name: DATA_VOLUME_NAME.to_owned(),
                    persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
                        claim_name: self.pvc_name(ordinal),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                restart_policy: Some("Always".to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let hash = pod_spec_hash(&pod);
        pod.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(POD_HASH_ANNOTATION.to_owned(), hash);
        pod
    }

    pub fn new_pvc(&self, ordinal: i32) -> corev1::PersistentVolumeClaim {
        let template = &self.spec.volume_claim_template;
        let access_modes = if template.access_modes.is_empty() {
            vec![DEFAULT_ACCESS_MODE.to_owned()]
        } else {
            template.access_modes.clone()
        };

        let requests: BTreeMap<String, Quantity> =
            [("storage".to_owned(), Quantity(template.storage.clone()))]
                .into_iter()
                .collect();

        corev1::PersistentVolumeClaim {
            metadata: metav1::ObjectMeta {
                name: Some(self.pvc_name(ordinal)),
                namespace: self.namespace().ok(),
                labels: Some(self.labels_for(PVC_COMPONENT)),
                annotations: Some(ordinal_annotations(ordinal)),
                ..Default::default()
            },
            spec: Some(corev1::PersistentVolumeClaimSpec {
                access_modes: Some(access_modes),
                storage_class_name: template.storage_class_name.clone(),
                resources: Some(corev1::VolumeResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                data_source: template.data_source.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
