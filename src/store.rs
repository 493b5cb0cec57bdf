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

//! Cluster reader/writer used by the reconcilers.
//!
//! [`crate::context::Context`] implements it against the API server; the unit
//! tests use an in-memory implementation.

use crate::context::Error;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use kube::core::object::HasStatus;
use kube::runtime::events::EventType;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// A namespaced, statically typed kube object.
pub trait KubeObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<T> KubeObject for T where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Lists objects in `namespace` matching an equality label selector.
    async fn list<T: KubeObject>(&self, namespace: &str, selector: &str) -> Result<Vec<T>, Error>;

    async fn get_opt<T: KubeObject>(&self, name: &str, namespace: &str)
    -> Result<Option<T>, Error>;

    async fn create<T: KubeObject>(&self, resource: &T, namespace: &str) -> Result<T, Error>;

    /// Deletes with foreground propagation. A missing object is not an error.
    async fn delete<T: KubeObject>(&self, name: &str, namespace: &str) -> Result<(), Error>;

    /// Applies a JSON merge patch.
    async fn patch<T: KubeObject>(
        &self,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<T, Error>;

    /// Reads the object fresh, applies `update` to its status and replaces the
    /// whole status, conditioned on the resource version that was read.
    async fn update_status<T, F>(&self, name: &str, namespace: &str, update: F) -> Result<T, Error>
    where
        T: KubeObject + HasStatus,
        T::Status: Default + Clone + Serialize + Send,
        F: FnOnce(&mut T::Status) + Send;

    async fn record<T: KubeObject>(
        &self,
        resource: &T,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error>;

    /// Whether the CustomResourceDefinition backing `T` is installed.
    async fn crd_installed<T: KubeObject>(&self) -> Result<bool, Error>;
}

/// Applies `update` to the status of `object`, producing the body of a status
/// replacement. The body keeps the resource version of `object`, so writing it
/// is a conditional update.
///
/// Status fields are serialized with `skip_serializing_if`; a field cleared by
/// `update` is absent from the body and therefore removed by the replacement.
pub(crate) fn replace_status<T, F>(mut object: T, update: F) -> T
where
    T: HasStatus,
    T::Status: Default + Clone,
    F: FnOnce(&mut T::Status),
{
    let mut status = object.status().cloned().unwrap_or_default();
    update(&mut status);
    *object.status_mut() = Some(status);
    object
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::create_test_fullnode;
    use crate::types::v1alpha1::status::fullnode::{ScheduledSnapshot, Status};

    #[test]
    fn test_cleared_status_fields_are_absent_from_the_replacement() {
        let mut fullnode = create_test_fullnode(3);
        fullnode.metadata.resource_version = Some("42".to_owned());
        let mut status = Status::default();
        status.scheduled_snapshots.insert(
            "default.hourly".to_owned(),
            ScheduledSnapshot {
                pod_candidate: "cosmoshub-1".to_owned(),
            },
        );
        status.status_message = Some("waiting".to_owned());
        fullnode.status = Some(status);

        let body = replace_status(fullnode, |status| {
            status.scheduled_snapshots.remove("default.hourly");
            status.status_message = None;
        });
        let body = serde_json::to_value(&body).unwrap();

        assert_eq!(body["metadata"]["resourceVersion"], "42");
        let status = body["status"].as_object().unwrap();
        assert!(!status.contains_key("scheduledSnapshots"));
        assert!(!status.contains_key("statusMessage"));
    }
}
