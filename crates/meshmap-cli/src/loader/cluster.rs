//! Cluster-backed loader

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{DynamicObject, ListParams, ObjectList};
use kube::{Api, Client};
use tracing::{debug, info, warn};

use meshmap_common::kube_utils::{
    create_client_with_timeout, HasApiResource, DEFAULT_CONNECT_TIMEOUT,
};
use meshmap_common::resources::{
    DestinationRule, EnvoyFilter, Gateway, ServiceEntry, VirtualService, WorkloadEntry,
};
use meshmap_common::{Error, NamespaceResources, ResourceSnapshot, Result};

use super::ResourceLoader;
use crate::config::ExplorerConfig;

type Decode<T> = fn(&DynamicObject) -> Result<T>;

/// Lists the eight resource kinds of each namespace from the API server
#[derive(Clone)]
pub struct KubeResourceLoader {
    client: Client,
    timeout: Duration,
}

impl KubeResourceLoader {
    /// Loader over `client`; every listing is bounded by `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build a client from the configured kubeconfig (or inferred config)
    pub async fn from_config(config: &ExplorerConfig) -> Result<Self> {
        let client = create_client_with_timeout(
            config.kubeconfig.as_deref(),
            DEFAULT_CONNECT_TIMEOUT,
            config.request_timeout(),
        )
        .await?;
        Ok(Self::new(client, config.request_timeout()))
    }

    async fn load_namespace(&self, namespace: &str) -> Result<NamespaceResources> {
        let (
            virtual_services,
            destination_rules,
            gateways,
            service_entries,
            workload_entries,
            envoy_filters,
            services,
            pods,
        ) = futures::try_join!(
            self.list_istio::<VirtualService>(namespace, VirtualService::from_dynamic),
            self.list_istio::<DestinationRule>(namespace, DestinationRule::from_dynamic),
            self.list_istio::<Gateway>(namespace, Gateway::from_dynamic),
            self.list_istio::<ServiceEntry>(namespace, ServiceEntry::from_dynamic),
            self.list_istio::<WorkloadEntry>(namespace, WorkloadEntry::from_dynamic),
            self.list_istio::<EnvoyFilter>(namespace, EnvoyFilter::from_dynamic),
            self.list_core::<Service>(namespace, "Service"),
            self.list_core::<Pod>(namespace, "Pod"),
        )?;

        let resources = NamespaceResources {
            namespace: namespace.to_string(),
            virtual_services,
            destination_rules,
            gateways,
            service_entries,
            workload_entries,
            envoy_filters,
            services,
            pods,
        };
        debug!(namespace, resources = resources.len(), "Listed namespace");
        Ok(resources)
    }

    async fn list_istio<T: HasApiResource>(
        &self,
        namespace: &str,
        decode: Decode<T>,
    ) -> Result<Vec<T>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &T::api_resource());
        let lp = ListParams::default();
        let items = self.list_or_empty(namespace, T::KIND, api.list(&lp)).await?;

        let mut decoded = Vec::with_capacity(items.len());
        for obj in &items {
            match decode(obj) {
                Ok(resource) => decoded.push(resource),
                Err(e) => warn!(
                    namespace,
                    kind = T::KIND,
                    error = %e,
                    "Skipping undecodable resource"
                ),
            }
        }
        Ok(decoded)
    }

    async fn list_core<K>(&self, namespace: &str, kind: &str) -> Result<Vec<K>>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default();
        self.list_or_empty(namespace, kind, api.list(&lp)).await
    }

    /// Bound a listing by the request timeout; a 404 (CRD not installed)
    /// becomes an empty list
    async fn list_or_empty<K>(
        &self,
        namespace: &str,
        kind: &str,
        list: impl Future<Output = kube::Result<ObjectList<K>>>,
    ) -> Result<Vec<K>>
    where
        K: Clone,
    {
        match tokio::time::timeout(self.timeout, list).await {
            Err(_) => Err(Error::load(
                namespace,
                format!("listing {} timed out after {:?}", kind, self.timeout),
            )),
            Ok(Err(kube::Error::Api(ae))) if ae.code == 404 => {
                debug!(namespace, kind, "Resource kind not served, treating as empty");
                Ok(Vec::new())
            }
            Ok(Err(e)) => Err(Error::load_from_kube(namespace, &e)),
            Ok(Ok(list)) => Ok(list.items),
        }
    }
}

#[async_trait]
impl ResourceLoader for KubeResourceLoader {
    async fn load(
        &self,
        namespace: &str,
        extra_namespaces: &[String],
    ) -> Result<ResourceSnapshot> {
        let primary = self.load_namespace(namespace);
        let extras = futures::future::try_join_all(
            extra_namespaces.iter().map(|ns| self.load_namespace(ns)),
        );
        let (primary, extras) = futures::try_join!(primary, extras)?;

        let snapshot = extras
            .into_iter()
            .fold(ResourceSnapshot::new(primary), ResourceSnapshot::with_extra);
        info!(
            namespace,
            extra_namespaces = snapshot.extras.len(),
            virtual_services = snapshot.primary.virtual_services.len(),
            "Loaded resource snapshot"
        );
        Ok(snapshot)
    }
}
