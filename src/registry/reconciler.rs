use std::sync::Arc;

use k8s_openapi::api::core::v1 as core;
use k8s_openapi::api::rbac::v1 as rbac;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::cache::RegistryCache;
use crate::client::RegistryClient;
use crate::crd::{CatalogSource, CatalogSourceStatus, ConfigMapResourceReference};
use crate::error::{ChildKind, Error, Result};
use crate::registry::desired::{
    pod_name_prefix, registry_children, role_binding_name, role_name, service_account_name,
    service_name, stable_selector, versioned_labels, RegistrySource,
};
use crate::registry::status::{project_status, Clock};

#[derive(Clone, Debug, PartialEq)]
pub enum EnsureOutcome {
    Unchanged,
    Rebuilt(CatalogSourceStatus),
}

pub struct RegistryReconciler {
    cache: Arc<dyn RegistryCache>,
    client: Arc<dyn RegistryClient>,
    clock: Arc<dyn Clock>,
    image: String,
}

impl RegistryReconciler {
    pub fn new(
        cache: Arc<dyn RegistryCache>,
        client: Arc<dyn RegistryClient>,
        clock: Arc<dyn Clock>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            client,
            clock,
            image: image.into(),
        }
    }

    // Fixed order; the first failure ends the pass.
    #[instrument(
        skip_all,
        fields(
            catalog_source = %catalog_source.name_any(),
            namespace = %catalog_source.namespace().unwrap_or_default(),
        )
    )]
    pub async fn ensure_registry_server(&self, catalog_source: &CatalogSource) -> Result<EnsureOutcome> {
        let source = RegistrySource::from_catalog_source(catalog_source)?;

        let config_map = self
            .cache
            .config_map(&source.namespace, &source.config_map)
            .ok_or_else(|| Error::ContentSourceMissing {
                namespace: source.namespace.clone(),
                name: source.config_map.clone(),
            })?;
        let current = ConfigMapResourceReference {
            name: config_map.name_any(),
            namespace: config_map
                .namespace()
                .unwrap_or_else(|| source.namespace.clone()),
            uid: config_map.uid().unwrap_or_default(),
            resource_version: config_map.resource_version().unwrap_or_default(),
        };

        let mut status = catalog_source.status.clone().unwrap_or_default();
        let changed = status
            .config_map_reference
            .as_ref()
            .map_or(true, |observed| observed.resource_version != current.resource_version);
        if changed {
            debug!(
                content_version = %current.resource_version,
                "content changed since last sync"
            );
            status.config_map_reference = Some(current.clone());
        }

        // no endpoint recorded yet: nothing existing can be trusted
        let force_all = status.registry_service.is_none();
        let rebuild_pod =
            force_all || changed || !self.has_serving_pod(&source, &current.resource_version);

        let children = registry_children(&source, &self.image, &current.resource_version);

        self.ensure_service_account(&source, &children.service_account, force_all)
            .await
            .map_err(Error::ensuring(
                ChildKind::ServiceAccount,
                service_account_name(&source),
            ))?;
        self.ensure_role(&source, &children.role, force_all)
            .await
            .map_err(Error::ensuring(ChildKind::Role, role_name(&source)))?;
        self.ensure_role_binding(&source, &children.role_binding, force_all)
            .await
            .map_err(Error::ensuring(ChildKind::RoleBinding, role_binding_name(&source)))?;
        self.ensure_pod(&source, &children.pod, rebuild_pod).await?;
        self.ensure_service(&source, &children.service, force_all)
            .await
            .map_err(Error::ensuring(ChildKind::Service, service_name(&source)))?;

        if !rebuild_pod {
            debug!("registry server up to date");
            return Ok(EnsureOutcome::Unchanged);
        }

        let now = self.clock.now();
        let registry_service = project_status(&children.service, now)?;
        let address = registry_service.address();
        status.registry_service = Some(registry_service);
        status.last_sync = Some(Time(now));

        self.client
            .update_catalog_source_status(catalog_source, &status)
            .await
            .map_err(|err| Error::StatusUpdate {
                name: source.name.clone(),
                source: Box::new(err),
            })?;

        info!(
            %address,
            content_version = %current.resource_version,
            "registry server rebuilt"
        );
        Ok(EnsureOutcome::Rebuilt(status))
    }

    fn has_serving_pod(&self, source: &RegistrySource, content_version: &str) -> bool {
        let selector = versioned_labels(source, content_version).selector();
        let pods = self.cache.pods(&source.namespace, &selector);
        if pods.len() > 1 {
            warn!(%selector, count = pods.len(), "multiple registry pods serve the same content");
        }
        !pods.is_empty()
    }

    async fn ensure_service_account(
        &self,
        source: &RegistrySource,
        desired: &core::ServiceAccount,
        overwrite: bool,
    ) -> Result<()> {
        let name = desired.name_any();
        if self.cache.service_account(&source.namespace, &name).is_some() {
            if !overwrite {
                return Ok(());
            }
            self.client
                .delete_service_account(&source.namespace, &name)
                .await?;
        }
        self.client.create_service_account(desired).await?;
        debug!(service_account = %name, "ensured service account");
        Ok(())
    }

    async fn ensure_role(&self, source: &RegistrySource, desired: &rbac::Role, overwrite: bool) -> Result<()> {
        let name = desired.name_any();
        if self.cache.role(&source.namespace, &name).is_some() {
            if !overwrite {
                return Ok(());
            }
            self.client.delete_role(&source.namespace, &name).await?;
        }
        self.client.create_role(desired).await?;
        debug!(role = %name, "ensured role");
        Ok(())
    }

    async fn ensure_role_binding(
        &self,
        source: &RegistrySource,
        desired: &rbac::RoleBinding,
        overwrite: bool,
    ) -> Result<()> {
        let name = desired.name_any();
        if self.cache.role_binding(&source.namespace, &name).is_some() {
            if !overwrite {
                return Ok(());
            }
            self.client
                .delete_role_binding(&source.namespace, &name)
                .await?;
        }
        self.client.create_role_binding(desired).await?;
        debug!(role_binding = %name, "ensured role binding");
        Ok(())
    }

    async fn ensure_pod(&self, source: &RegistrySource, desired: &core::Pod, overwrite: bool) -> Result<()> {
        let selector = stable_selector(source);
        let existing = self.cache.pods(&source.namespace, &selector);
        if existing.len() > 1 {
            warn!(%selector, count = existing.len(), "multiple registry pods found");
        }

        if !existing.is_empty() {
            if !overwrite {
                return Ok(());
            }
            for old in &existing {
                let name = old.name_any();
                self.client
                    .delete_pod(&source.namespace, &name)
                    .await
                    .map_err(Error::ensuring(ChildKind::Pod, name.clone()))?;
                debug!(pod = %name, "deleted registry pod");
            }
        }

        let created = self
            .client
            .create_pod(desired)
            .await
            .map_err(Error::ensuring(ChildKind::Pod, pod_name_prefix(source)))?;
        info!(pod = %created.name_any(), "created registry pod");
        Ok(())
    }

    async fn ensure_service(
        &self,
        source: &RegistrySource,
        desired: &core::Service,
        overwrite: bool,
    ) -> Result<()> {
        let name = desired.name_any();
        if self.cache.service(&source.namespace, &name).is_some() {
            if !overwrite {
                return Ok(());
            }
            self.client.delete_service(&source.namespace, &name).await?;
        }
        self.client.create_service(desired).await?;
        debug!(service = %name, "ensured service");
        Ok(())
    }
}
