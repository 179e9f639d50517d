use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::adoption::{ObjectKey, COMPONENT_LABEL_VALUE};
use crate::crd::{CatalogSource, CatalogSourceStatus};
use crate::error::{Error, Result};

/// Deletes are idempotent: deleting an object that is already gone succeeds.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn create_service_account(&self, service_account: &ServiceAccount) -> Result<ServiceAccount>;
    async fn delete_service_account(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_role(&self, role: &Role) -> Result<Role>;
    async fn delete_role(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding>;
    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_pod(&self, pod: &Pod) -> Result<Pod>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_service(&self, service: &Service) -> Result<Service>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    async fn update_catalog_source_status(
        &self,
        source: &CatalogSource,
        status: &CatalogSourceStatus,
    ) -> Result<CatalogSource>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComponentClient: Send + Sync {
    /// Add `label` to the object, conditional on `resource_version` when given.
    async fn add_component_label(
        &self,
        key: &ObjectKey,
        resource_version: Option<String>,
        label: &str,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    field_manager: String,
}

impl KubeClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..PatchParams::default()
        }
    }

    async fn create<K>(&self, object: &K) -> Result<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let namespace = object
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        let created = api.create(&self.post_params(), object).await?;
        debug!(kind = K::kind(&()).as_ref(), name = %created.name_any(), "created");
        Ok(created)
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };

        match api.delete(name, &params).await {
            Ok(_) => {
                debug!(kind = K::kind(&()).as_ref(), name, "deleted");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    fn component_api(&self, key: &ObjectKey) -> Result<Api<DynamicObject>> {
        let resource = key.kind.api_resource();
        Ok(match label_scope(key)? {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        })
    }
}

fn label_scope(key: &ObjectKey) -> Result<Option<&str>> {
    if !key.kind.is_namespaced() {
        return Ok(None);
    }
    key.namespace
        .as_deref()
        .map(Some)
        .ok_or(Error::MissingField("metadata.namespace"))
}

fn label_patch(resource_version: Option<String>, label: &str) -> Value {
    let mut metadata = Map::new();
    metadata.insert("labels".to_string(), json!({ label: COMPONENT_LABEL_VALUE }));
    if let Some(resource_version) = resource_version {
        metadata.insert("resourceVersion".to_string(), Value::String(resource_version));
    }
    json!({ "metadata": metadata })
}

fn status_patch(resource_version: Option<String>, status: &CatalogSourceStatus) -> Result<Value> {
    let mut patch = Map::new();
    if let Some(resource_version) = resource_version {
        patch.insert(
            "metadata".to_string(),
            json!({ "resourceVersion": resource_version }),
        );
    }
    patch.insert("status".to_string(), serde_json::to_value(status)?);
    Ok(Value::Object(patch))
}

#[async_trait]
impl RegistryClient for KubeClient {
    async fn create_service_account(&self, service_account: &ServiceAccount) -> Result<ServiceAccount> {
        self.create(service_account).await
    }

    async fn delete_service_account(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<ServiceAccount>(namespace, name).await
    }

    async fn create_role(&self, role: &Role) -> Result<Role> {
        self.create(role).await
    }

    async fn delete_role(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Role>(namespace, name).await
    }

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding> {
        self.create(role_binding).await
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<RoleBinding>(namespace, name).await
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        self.create(pod).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Pod>(namespace, name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        self.create(service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Service>(namespace, name).await
    }

    async fn update_catalog_source_status(
        &self,
        source: &CatalogSource,
        status: &CatalogSourceStatus,
    ) -> Result<CatalogSource> {
        let namespace = source
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        let api: Api<CatalogSource> = Api::namespaced(self.client.clone(), &namespace);
        let patch = status_patch(source.resource_version(), status)?;

        let updated = api
            .patch_status(&source.name_any(), &self.patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(updated)
    }
}

#[async_trait]
impl ComponentClient for KubeClient {
    async fn add_component_label(
        &self,
        key: &ObjectKey,
        resource_version: Option<String>,
        label: &str,
    ) -> Result<()> {
        let api = self.component_api(key)?;
        let patch = label_patch(resource_version, label);

        api.patch(&key.name, &self.patch_params(), &Patch::Merge(&patch))
            .await?;
        debug!(object = %key, label, "labeled");
        Ok(())
    }
}
