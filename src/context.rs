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

use crate::store::{KubeObject, Store, replace_status};
use crate::types;
use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::object::HasStatus;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, api::Api};
use serde::Serialize;
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

fn api_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(ae) => Some(ae.code),
        _ => None,
    }
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube { source } => api_code(source) == Some(404),
            _ => false,
        }
    }

    /// Optimistic-concurrency failure: someone else wrote the object first.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube { source } => api_code(source) == Some(409),
            _ => false,
        }
    }
}

/// Tunables shared by the controllers.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Requeue delay after a transient failure or while waiting on the cluster.
    pub requeue: Duration,
    /// Requeue delay after an unrecoverable failure.
    pub unrecoverable_requeue: Duration,
    /// Upper bound on a single reconcile pass.
    pub reconcile_timeout: Duration,
    /// Poll interval while a snapshot is not yet ready to use.
    pub snapshot_poll: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            requeue: Duration::from_secs(5),
            unrecoverable_requeue: Duration::from_secs(300),
            reconcile_timeout: Duration::from_secs(60),
            snapshot_poll: Duration::from_secs(10),
        }
    }
}

pub struct Context {
    pub(crate) client: kube::Client,
    pub(crate) recorder: Recorder,
    pub(crate) settings: Settings,
}

impl Context {
    pub fn new(client: kube::Client, settings: Settings) -> Self {
        let reporter = Reporter {
            controller: crate::utils::meta::OPERATOR_NAME.into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        let recorder = Recorder::new(client.clone(), reporter);
        Self {
            client,
            recorder,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn get<T: KubeObject>(&self, name: &str, namespace: &str) -> Result<T, Error> {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).context(KubeSnafu).await
    }
}

#[async_trait]
impl Store for Context {
    async fn list<T: KubeObject>(&self, namespace: &str, selector: &str) -> Result<Vec<T>, Error> {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(selector))
            .context(KubeSnafu)
            .await?;
        Ok(list.items)
    }

    async fn get_opt<T: KubeObject>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<T>, Error> {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).context(KubeSnafu).await
    }

    async fn create<T: KubeObject>(&self, resource: &T, namespace: &str) -> Result<T, Error> {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), resource)
            .context(KubeSnafu)
            .await
    }

    async fn delete<T: KubeObject>(&self, name: &str, namespace: &str) -> Result<(), Error> {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        match api
            .delete(name, &DeleteParams::foreground())
            .context(KubeSnafu)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("{} {name} already gone", T::kind(&()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn patch<T: KubeObject>(
        &self,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<T, Error> {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .context(KubeSnafu)
            .await
    }

    async fn update_status<T, F>(&self, name: &str, namespace: &str, update: F) -> Result<T, Error>
    where
        T: KubeObject + HasStatus,
        T::Status: Default + Clone + Serialize + Send,
        F: FnOnce(&mut T::Status) + Send,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        let latest = api.get(name).context(KubeSnafu).await?;

        // The body carries the resource version that was read; a concurrent
        // update surfaces as a 409.
        let body = replace_status(latest, update);
        api.replace_status(name, &PostParams::default(), &body)
            .context(KubeSnafu)
            .await
    }

    async fn record<T: KubeObject>(
        &self,
        resource: &T,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &resource.object_ref(&()),
            )
            .context(RecordSnafu)
            .await
    }

    async fn crd_installed<T: KubeObject>(&self) -> Result<bool, Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let name = format!("{}.{}", T::plural(&()), T::group(&()));
        let crd = api.get_opt(&name).context(KubeSnafu).await?;
        Ok(crd.is_some())
    }
}
