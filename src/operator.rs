use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DynamicObject};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::adoption::{AdoptionEngine, ParentKey};
use crate::cache::{CacheWatches, ClusterCache};
use crate::client::KubeClient;
use crate::config::OperatorConfig;
use crate::context::Context;
use crate::crd::CatalogSource;
use crate::error::{Error, Result};
use crate::registry::desired::CATALOG_SOURCE_LABEL;
use crate::registry::{RegistryReconciler, SystemClock};

pub struct Operator {
    config: OperatorConfig,
}

impl Operator {
    pub fn new(config: OperatorConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;
        let client = Client::try_default().await.map_err(Error::Kube)?;

        let parent_resource = self.config.adoption_parent.api_resource();
        info!(
            parent = %parent_resource.kind,
            image = %self.config.registry_image,
            workers = self.config.workers,
            "Starting catalog operator"
        );

        let (cache, CacheWatches { sync, components }) =
            ClusterCache::start(&client, parent_resource.clone());
        let cache = Arc::new(cache);
        let kube_client = Arc::new(KubeClient::new(client.clone(), &self.config.field_manager));

        let ctx = Arc::new(Context::new(
            RegistryReconciler::new(
                cache.clone(),
                kube_client.clone(),
                Arc::new(SystemClock),
                &self.config.registry_image,
            ),
            AdoptionEngine::new(cache.clone(), kube_client, &parent_resource.kind),
            self.config.clone(),
        ));

        let workers = self.config.workers;
        let concurrency = u16::try_from(workers).unwrap_or(u16::MAX);
        let controller_config = controller::Config::default().concurrency(concurrency);

        let controllers = async move {
            // every store must have listed before a reconcile reads it
            cache.wait_until_ready().await?;
            info!("Caches synced");

            let catalog_sources = Controller::new(
                Api::<CatalogSource>::all(client.clone()),
                WatcherConfig::default(),
            )
            .owns(
                Api::<Pod>::all(client.clone()),
                WatcherConfig::default().labels(CATALOG_SOURCE_LABEL),
            )
            .with_config(controller_config.clone())
            .shutdown_on_signal()
            .run(reconcile_catalog_source, error_policy, ctx.clone())
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!(%object, "Reconciled catalog source"),
                    Err(e) => warn!(error = %e, "Catalog source reconciliation failed"),
                }
            });

            let parents = Controller::new_with(
                Api::<DynamicObject>::all_with(client.clone(), &parent_resource),
                WatcherConfig::default(),
                parent_resource.clone(),
            )
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile_parent, error_policy, ctx.clone())
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!(%object, "Adopted components of parent"),
                    Err(e) => warn!(error = %e, "Component adoption failed"),
                }
            });

            let components = components.for_each_concurrent(workers, move |key| {
                let ctx = ctx.clone();
                async move {
                    if let Err(e) = ctx.adoption.adopt_object(&key).await {
                        warn!(object = %key, error = %e, "Component adoption failed");
                    }
                }
            });

            // the controllers end on shutdown signal; the component stream does not
            tokio::select! {
                _ = futures::future::join(catalog_sources, parents) => {}
                _ = components => {}
            }
            Ok::<_, Error>(())
        };

        tokio::select! {
            result = controllers => result?,
            _ = sync => {}
        }

        info!("Catalog operator stopped");
        Ok(())
    }
}

async fn reconcile_catalog_source(source: Arc<CatalogSource>, ctx: Arc<Context>) -> Result<Action> {
    if source.meta().deletion_timestamp.is_some() {
        // children carry owner references and are garbage collected
        return Ok(Action::await_change());
    }

    ctx.registry.ensure_registry_server(&source).await?;
    Ok(ctx.done())
}

async fn reconcile_parent(parent: Arc<DynamicObject>, ctx: Arc<Context>) -> Result<Action> {
    let Some(namespace) = parent.namespace() else {
        return Ok(Action::await_change());
    };
    if parent.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    ctx.adoption
        .adopt_components(&ParentKey::new(namespace, parent.name_any()))
        .await?;
    Ok(ctx.done())
}

fn error_policy<K: Resource>(object: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        name = %object.name_any(),
        namespace = %object.namespace().unwrap_or_default(),
        error = %error,
        "Reconcile failed"
    );
    ctx.retry(error)
}
