//  Copyright 2025 RustFS Team
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http:www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Shared fixtures for unit tests: object builders and an in-memory [`Store`].

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::context::Error;
use crate::store::{KubeObject, Store, replace_status};
use crate::types;
use crate::types::v1alpha1::fullnode::{FullNode, FullNodeSpec, VolumeClaimTemplate};
use crate::types::v1alpha1::snapshot::{
    FullNodeRef, ScheduledVolumeSnapshot, ScheduledVolumeSnapshotSpec,
};
use crate::utils::meta::ORDINAL_ANNOTATION;
use crate::utils::time::to_time;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::core::object::HasStatus;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

pub fn test_creation_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn create_test_fullnode(replicas: i32) -> FullNode {
    FullNode {
        metadata: metav1::ObjectMeta {
            name: Some("cosmoshub".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("test-uid-123".to_string()),
            generation: Some(1),
            creation_timestamp: to_time(test_creation_time()),
            ..Default::default()
        },
        spec: FullNodeSpec {
            replicas,
            image: "ghcr.io/chain/gaia:v18".to_string(),
            volume_claim_template: VolumeClaimTemplate {
                storage: "100Gi".to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
        status: None,
    }
}

pub fn create_test_svs(name: &str, schedule: &str) -> ScheduledVolumeSnapshot {
    ScheduledVolumeSnapshot {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some("test-svs-uid".to_string()),
            generation: Some(1),
            creation_timestamp: to_time(test_creation_time()),
            ..Default::default()
        },
        spec: ScheduledVolumeSnapshotSpec {
            full_node_ref: FullNodeRef {
                name: "cosmoshub".to_string(),
                namespace: None,
            },
            schedule: schedule.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// A bare pod carrying only a name, an ordinal and an image.
pub fn ordinal_pod(name: &str, ordinal: i64, image: &str) -> corev1::Pod {
    corev1::Pod {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(
                [(ORDINAL_ANNOTATION.to_string(), ordinal.to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        spec: Some(corev1::PodSpec {
            containers: vec![corev1::Container {
                name: "node".to_string(),
                image: Some(image.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn mark_ready(pod: &mut corev1::Pod, since: DateTime<Utc>) {
    pod.status = Some(corev1::PodStatus {
        phase: Some("Running".to_string()),
        conditions: Some(vec![corev1::PodCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            last_transition_time: to_time(since),
            ..Default::default()
        }]),
        ..Default::default()
    });
}

pub fn ready_pod(name: &str, ordinal: i64, since: Option<DateTime<Utc>>) -> corev1::Pod {
    let mut pod = ordinal_pod(name, ordinal, "v1");
    mark_ready(&mut pod, since.unwrap_or_else(test_creation_time));
    pod
}

pub fn unready_pod(name: &str, ordinal: i64) -> corev1::Pod {
    let mut pod = ordinal_pod(name, ordinal, "v1");
    pod.status = Some(corev1::PodStatus {
        phase: Some("Pending".to_string()),
        conditions: Some(vec![corev1::PodCondition {
            type_: "Ready".to_string(),
            status: "False".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
    pod
}

pub fn mark_bound(pvc: &mut corev1::PersistentVolumeClaim) {
    pvc.status = Some(corev1::PersistentVolumeClaimStatus {
        phase: Some("Bound".to_string()),
        ..Default::default()
    });
}

type Key = (String, String, String);

fn key_of<T: KubeObject>(name: &str, namespace: &str) -> Key {
    (
        T::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn merge(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            if let Value::Object(existing) = target {
                for (k, v) in fields {
                    if v.is_null() {
                        existing.remove(k);
                    } else {
                        merge(existing.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// Returns true when every `k=v` term of `selector` matches `labels`.
fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

fn injected(msg: String) -> Error {
    Error::Types {
        source: types::error::Error::InternalError { msg },
    }
}

/// In-memory [`Store`] keyed by kind, namespace and name.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<Key, Value>>,
    deleted: Mutex<Vec<String>>,
    patched: Mutex<Vec<String>>,
    events: Mutex<Vec<String>>,
    missing_crds: Mutex<BTreeSet<String>>,
    failing_deletes: Mutex<BTreeSet<String>>,
}

impl FakeStore {
    pub fn insert<T: KubeObject>(&self, obj: T) {
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let key = key_of::<T>(&obj.name_any(), &namespace);
        self.objects
            .lock()
            .unwrap()
            .insert(key, serde_json::to_value(&obj).unwrap());
    }

    pub fn all<T: KubeObject>(&self) -> Vec<T> {
        let kind = T::kind(&()).to_string();
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, v)| serde_json::from_value(v.clone()).unwrap())
            .collect()
    }

    pub fn find<T: KubeObject>(&self, name: &str) -> Option<T> {
        self.all::<T>().into_iter().find(|o| o.name_any() == name)
    }

    /// Drops an object without recording a delete, as the cluster would.
    pub fn remove<T: KubeObject>(&self, name: &str, namespace: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&key_of::<T>(name, namespace));
    }

    pub fn modify<T: KubeObject>(&self, mut f: impl FnMut(&mut T)) {
        for mut obj in self.all::<T>() {
            f(&mut obj);
            self.insert(obj);
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn patched(&self) -> Vec<String> {
        self.patched.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn remove_crd<T: KubeObject>(&self) {
        self.missing_crds
            .lock()
            .unwrap()
            .insert(T::kind(&()).to_string());
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn list<T: KubeObject>(&self, namespace: &str, selector: &str) -> Result<Vec<T>, Error> {
        let kind = T::kind(&()).to_string();
        let objects = self.objects.lock().unwrap();
        let mut items = Vec::new();
        for ((k, ns, _), value) in objects.iter() {
            if *k != kind || ns != namespace {
                continue;
            }
            let obj: T = serde_json::from_value(value.clone())?;
            if selector_matches(selector, obj.labels()) {
                items.push(obj);
            }
        }
        Ok(items)
    }

    async fn get_opt<T: KubeObject>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<T>, Error> {
        let objects = self.objects.lock().unwrap();
        match objects.get(&key_of::<T>(name, namespace)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<T: KubeObject>(&self, resource: &T, namespace: &str) -> Result<T, Error> {
        let key = key_of::<T>(&resource.name_any(), namespace);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(injected(format!("{} already exists", resource.name_any())));
        }
        let mut created = resource.clone();
        created.meta_mut().namespace = Some(namespace.to_string());
        objects.insert(key, serde_json::to_value(&created)?);
        Ok(created)
    }

    async fn delete<T: KubeObject>(&self, name: &str, namespace: &str) -> Result<(), Error> {
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(injected(format!("delete of {name} refused")));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&key_of::<T>(name, namespace));
        self.deleted
            .lock()
            .unwrap()
            .push(format!("{}/{name}", T::kind(&())));
        Ok(())
    }

    async fn patch<T: KubeObject>(
        &self,
        name: &str,
        namespace: &str,
        patch: &Value,
    ) -> Result<T, Error> {
        let key = key_of::<T>(name, namespace);
        let mut objects = self.objects.lock().unwrap();
        let Some(value) = objects.get_mut(&key) else {
            return Err(injected(format!("{name} not found")));
        };
        merge(value, patch);
        self.patched
            .lock()
            .unwrap()
            .push(format!("{}/{name}", T::kind(&())));
        Ok(serde_json::from_value(value.clone())?)
    }

    async fn update_status<T, F>(&self, name: &str, namespace: &str, update: F) -> Result<T, Error>
    where
        T: KubeObject + HasStatus,
        T::Status: Default + Clone + Serialize + Send,
        F: FnOnce(&mut T::Status) + Send,
    {
        let key = key_of::<T>(name, namespace);
        let mut objects = self.objects.lock().unwrap();
        let Some(value) = objects.get_mut(&key) else {
            return Err(injected(format!("{name} not found")));
        };
        let latest: T = serde_json::from_value(value.clone())?;
        let body = serde_json::to_value(replace_status(latest, update))?;

        // The server swaps in the status from the body wholesale and rejects a
        // stale resource version.
        let stored_version = value["metadata"]["resourceVersion"].clone();
        if body["metadata"]["resourceVersion"] != stored_version {
            return Err(injected(format!("{name} was modified concurrently")));
        }
        let revision = stored_version
            .as_str()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let object = value.as_object_mut().unwrap();
        match body.get("status") {
            Some(status) => object.insert("status".to_owned(), status.clone()),
            None => object.remove("status"),
        };
        value["metadata"]["resourceVersion"] = Value::String((revision + 1).to_string());
        Ok(serde_json::from_value(value.clone())?)
    }

    async fn record<T: KubeObject>(
        &self,
        resource: &T,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.events
            .lock()
            .unwrap()
            .push(format!("{reason}: {message}"));
        Ok(())
    }

    async fn crd_installed<T: KubeObject>(&self) -> Result<bool, Error> {
        Ok(!self
            .missing_crds
            .lock()
            .unwrap()
            .contains(T::kind(&()).as_ref()))
    }
}

#[test]
fn test_selector_matches_every_term() {
    let labels: BTreeMap<String, String> = [
        ("a".to_owned(), "1".to_owned()),
        ("b".to_owned(), "2".to_owned()),
    ]
    .into_iter()
    .collect();
    assert!(selector_matches("a=1,b=2", &labels));
    assert!(!selector_matches("a=2", &labels));
    assert!(!selector_matches("c=1", &labels));
    assert!(selector_matches("", &labels));
}

#[tokio::test]
async fn test_status_write_removes_cleared_fields_and_bumps_revision() {
    use crate::types::v1alpha1::status::fullnode::ScheduledSnapshot;

    let store = FakeStore::default();
    store.insert(create_test_fullnode(3));
    store
        .update_status::<FullNode, _>("cosmoshub", "default", |status| {
            status.scheduled_snapshots.insert(
                "default.hourly".to_owned(),
                ScheduledSnapshot {
                    pod_candidate: "cosmoshub-1".to_owned(),
                },
            );
        })
        .await
        .unwrap();

    let written = store
        .update_status::<FullNode, _>("cosmoshub", "default", |status| {
            status.scheduled_snapshots.remove("default.hourly");
        })
        .await
        .unwrap();

    let stored = store.find::<FullNode>("cosmoshub").unwrap();
    assert!(stored.status.unwrap().scheduled_snapshots.is_empty());
    assert_eq!(written.metadata.resource_version.as_deref(), Some("2"));
}
