use std::fmt::Debug;
use std::hash::Hash;

use futures::channel::mpsc;
use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::adoption::{cluster_service_version_resource, ComponentKind, ObjectKey};
use crate::error::Result;
use crate::registry::desired::CATALOG_SOURCE_LABEL;
use crate::types::Selector;

pub trait RegistryCache: Send + Sync {
    fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap>;
    fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount>;
    fn role(&self, namespace: &str, name: &str) -> Option<Role>;
    fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding>;
    fn service(&self, namespace: &str, name: &str) -> Option<Service>;
    /// Pods in `namespace` matching `selector`, ordered by name.
    fn pods(&self, namespace: &str, selector: &Selector) -> Vec<Pod>;
}

#[cfg_attr(test, automock)]
pub trait ComponentCache: Send + Sync {
    fn component(&self, key: &ObjectKey) -> Option<ObjectMeta>;
    fn components(&self, kind: ComponentKind) -> Vec<ObjectMeta>;
    fn parent(&self, namespace: &str, name: &str) -> Option<ObjectMeta>;
    /// The parent in `namespace` whose status names `csv` as installed.
    fn installing_parent(&self, namespace: &str, csv: &str) -> Option<ObjectMeta>;
}

#[derive(Clone)]
pub struct ClusterCache {
    config_maps: Store<ConfigMap>,
    service_accounts: Store<ServiceAccount>,
    roles: Store<Role>,
    role_bindings: Store<RoleBinding>,
    services: Store<Service>,
    pods: Store<Pod>,
    deployments: Store<Deployment>,
    secrets: Store<Secret>,
    cluster_roles: Store<ClusterRole>,
    cluster_role_bindings: Store<ClusterRoleBinding>,
    crds: Store<CustomResourceDefinition>,
    api_services: Store<APIService>,
    csvs: Store<DynamicObject>,
    csv_resource: ApiResource,
    parents: Store<DynamicObject>,
    parent_resource: ApiResource,
}

pub struct CacheWatches {
    /// Drives every reflector. Never completes.
    pub sync: BoxFuture<'static, ()>,
    pub components: BoxStream<'static, ObjectKey>,
}

impl ClusterCache {
    pub fn start(client: &Client, parent_resource: ApiResource) -> (Self, CacheWatches) {
        let csv_resource = cluster_service_version_resource();

        let (config_maps, config_map_events) = reflect(client, ComponentKind::ConfigMap);
        let (service_accounts, service_account_events) =
            reflect(client, ComponentKind::ServiceAccount);
        let (roles, role_events) = reflect(client, ComponentKind::Role);
        let (role_bindings, role_binding_events) = reflect(client, ComponentKind::RoleBinding);
        let (services, service_events) = reflect(client, ComponentKind::Service);
        let (deployments, deployment_events) = reflect(client, ComponentKind::Deployment);
        let (secrets, secret_events) = reflect(client, ComponentKind::Secret);
        let (cluster_roles, cluster_role_events) = reflect(client, ComponentKind::ClusterRole);
        let (cluster_role_bindings, cluster_role_binding_events) =
            reflect(client, ComponentKind::ClusterRoleBinding);
        let (crds, crd_events) = reflect(client, ComponentKind::CustomResourceDefinition);
        let (api_services, api_service_events) = reflect(client, ComponentKind::ApiService);
        let (csvs, csv_events) = reflect_dynamic(client, &csv_resource);

        // registry pods are the only pods this operator reads
        let (pods, pod_writer) = reflector::store();
        let pod_watch = drive(
            "registry pod",
            reflector(
                pod_writer,
                watcher(
                    Api::<Pod>::all(client.clone()),
                    watcher::Config::default().labels(CATALOG_SOURCE_LABEL),
                ),
            ),
        );

        let parent_writer = Writer::new(parent_resource.clone());
        let parents = parent_writer.as_reader();
        let parent_watch = drive(
            "adoption parent",
            reflector(
                parent_writer,
                watcher(
                    Api::<DynamicObject>::all_with(client.clone(), &parent_resource),
                    watcher::Config::default(),
                ),
            ),
        );

        // events are buffered so the stores keep syncing while adoption is gated
        let (sender, components) = mpsc::unbounded();
        let component_watch = stream::select_all(vec![
            config_map_events,
            service_account_events,
            role_events,
            role_binding_events,
            service_events,
            deployment_events,
            secret_events,
            cluster_role_events,
            cluster_role_binding_events,
            crd_events,
            api_service_events,
            csv_events,
        ])
        .for_each(move |key| {
            let _ = sender.unbounded_send(key);
            future::ready(())
        });

        let sync = future::join3(pod_watch, parent_watch, component_watch)
            .map(|_| ())
            .boxed();

        let cache = Self {
            config_maps,
            service_accounts,
            roles,
            role_bindings,
            services,
            pods,
            deployments,
            secrets,
            cluster_roles,
            cluster_role_bindings,
            crds,
            api_services,
            csvs,
            csv_resource,
            parents,
            parent_resource,
        };

        (
            cache,
            CacheWatches {
                sync,
                components: components.boxed(),
            },
        )
    }

    /// Resolves once every store has completed its initial list.
    pub async fn wait_until_ready(&self) -> Result<()> {
        future::try_join_all([
            self.config_maps.wait_until_ready().boxed(),
            self.service_accounts.wait_until_ready().boxed(),
            self.roles.wait_until_ready().boxed(),
            self.role_bindings.wait_until_ready().boxed(),
            self.services.wait_until_ready().boxed(),
            self.pods.wait_until_ready().boxed(),
            self.deployments.wait_until_ready().boxed(),
            self.secrets.wait_until_ready().boxed(),
            self.cluster_roles.wait_until_ready().boxed(),
            self.cluster_role_bindings.wait_until_ready().boxed(),
            self.crds.wait_until_ready().boxed(),
            self.api_services.wait_until_ready().boxed(),
            self.csvs.wait_until_ready().boxed(),
            self.parents.wait_until_ready().boxed(),
        ])
        .await?;
        Ok(())
    }
}

fn drive<K, S>(what: &'static str, events: S) -> BoxFuture<'static, ()>
where
    S: Stream<Item = watcher::Result<watcher::Event<K>>> + Send + 'static,
{
    events
        .default_backoff()
        .for_each(move |event| {
            if let Err(err) = event {
                warn!(error = %err, "{what} watch failed");
            }
            future::ready(())
        })
        .boxed()
}

fn applied_keys<K, S>(kind: ComponentKind, events: S) -> BoxStream<'static, ObjectKey>
where
    K: Resource + Send + 'static,
    S: Stream<Item = watcher::Result<watcher::Event<K>>> + Send + 'static,
{
    events
        .default_backoff()
        .applied_objects()
        .filter_map(move |applied| {
            future::ready(match applied {
                Ok(object) => Some(ObjectKey::new(kind, object.namespace(), object.name_any())),
                Err(err) => {
                    warn!(%kind, error = %err, "component watch failed");
                    None
                }
            })
        })
        .boxed()
}

fn reflect<K>(client: &Client, kind: ComponentKind) -> (Store<K>, BoxStream<'static, ObjectKey>)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store();
    let events = reflector(
        writer,
        watcher(Api::<K>::all(client.clone()), watcher::Config::default()),
    );
    (reader, applied_keys(kind, events))
}

fn reflect_dynamic(
    client: &Client,
    resource: &ApiResource,
) -> (Store<DynamicObject>, BoxStream<'static, ObjectKey>) {
    let writer = Writer::new(resource.clone());
    let reader = writer.as_reader();
    let events = reflector(
        writer,
        watcher(
            Api::<DynamicObject>::all_with(client.clone(), resource),
            watcher::Config::default(),
        ),
    );
    (reader, applied_keys(ComponentKind::ClusterServiceVersion, events))
}

fn object_ref<K>(key: &ObjectKey, dyntype: K::DynamicType) -> ObjectRef<K>
where
    K: Resource,
{
    let object_ref = ObjectRef::new_with(&key.name, dyntype);
    match &key.namespace {
        Some(namespace) => object_ref.within(namespace),
        None => object_ref,
    }
}

fn get<K>(store: &Store<K>, namespace: &str, name: &str) -> Option<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store
        .get(&ObjectRef::new(name).within(namespace))
        .map(|object| object.as_ref().clone())
}

fn meta<K>(store: &Store<K>, key: &ObjectKey, dyntype: K::DynamicType) -> Option<ObjectMeta>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store
        .get(&object_ref(key, dyntype))
        .map(|object| object.meta().clone())
}

fn metas<K>(store: &Store<K>) -> Vec<ObjectMeta>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store
        .state()
        .iter()
        .map(|object| object.meta().clone())
        .collect()
}

fn installed_csv(parent: &DynamicObject) -> Option<&str> {
    parent
        .data
        .pointer("/status/installedCSV")
        .and_then(Value::as_str)
}

impl RegistryCache for ClusterCache {
    fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        get(&self.config_maps, namespace, name)
    }

    fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount> {
        get(&self.service_accounts, namespace, name)
    }

    fn role(&self, namespace: &str, name: &str) -> Option<Role> {
        get(&self.roles, namespace, name)
    }

    fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        get(&self.role_bindings, namespace, name)
    }

    fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        get(&self.services, namespace, name)
    }

    fn pods(&self, namespace: &str, selector: &Selector) -> Vec<Pod> {
        let mut pods: Vec<Pod> = self
            .pods
            .state()
            .iter()
            .filter(|pod| pod.namespace().as_deref() == Some(namespace))
            .filter(|pod| selector.matches(pod.metadata.labels.as_ref()))
            .map(|pod| pod.as_ref().clone())
            .collect();
        pods.sort_by_key(|pod| pod.name_any());
        pods
    }
}

impl ComponentCache for ClusterCache {
    fn component(&self, key: &ObjectKey) -> Option<ObjectMeta> {
        match key.kind {
            ComponentKind::Deployment => meta(&self.deployments, key, ()),
            ComponentKind::Service => meta(&self.services, key, ()),
            ComponentKind::ServiceAccount => meta(&self.service_accounts, key, ()),
            ComponentKind::Secret => meta(&self.secrets, key, ()),
            ComponentKind::ConfigMap => meta(&self.config_maps, key, ()),
            ComponentKind::Role => meta(&self.roles, key, ()),
            ComponentKind::RoleBinding => meta(&self.role_bindings, key, ()),
            ComponentKind::ClusterRole => meta(&self.cluster_roles, key, ()),
            ComponentKind::ClusterRoleBinding => meta(&self.cluster_role_bindings, key, ()),
            ComponentKind::CustomResourceDefinition => meta(&self.crds, key, ()),
            ComponentKind::ApiService => meta(&self.api_services, key, ()),
            ComponentKind::ClusterServiceVersion => {
                meta(&self.csvs, key, self.csv_resource.clone())
            }
        }
    }

    fn components(&self, kind: ComponentKind) -> Vec<ObjectMeta> {
        match kind {
            ComponentKind::Deployment => metas(&self.deployments),
            ComponentKind::Service => metas(&self.services),
            ComponentKind::ServiceAccount => metas(&self.service_accounts),
            ComponentKind::Secret => metas(&self.secrets),
            ComponentKind::ConfigMap => metas(&self.config_maps),
            ComponentKind::Role => metas(&self.roles),
            ComponentKind::RoleBinding => metas(&self.role_bindings),
            ComponentKind::ClusterRole => metas(&self.cluster_roles),
            ComponentKind::ClusterRoleBinding => metas(&self.cluster_role_bindings),
            ComponentKind::CustomResourceDefinition => metas(&self.crds),
            ComponentKind::ApiService => metas(&self.api_services),
            ComponentKind::ClusterServiceVersion => metas(&self.csvs),
        }
    }

    fn parent(&self, namespace: &str, name: &str) -> Option<ObjectMeta> {
        let object_ref =
            ObjectRef::new_with(name, self.parent_resource.clone()).within(namespace);
        self.parents
            .get(&object_ref)
            .map(|parent| parent.metadata.clone())
    }

    fn installing_parent(&self, namespace: &str, csv: &str) -> Option<ObjectMeta> {
        self.parents
            .state()
            .iter()
            .filter(|parent| parent.metadata.namespace.as_deref() == Some(namespace))
            .find(|parent| installed_csv(parent) == Some(csv))
            .map(|parent| parent.metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParentKind;
    use kube::runtime::reflector::Lookup;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Writers {
        config_maps: Writer<ConfigMap>,
        service_accounts: Writer<ServiceAccount>,
        roles: Writer<Role>,
        role_bindings: Writer<RoleBinding>,
        services: Writer<Service>,
        pods: Writer<Pod>,
        deployments: Writer<Deployment>,
        secrets: Writer<Secret>,
        cluster_roles: Writer<ClusterRole>,
        cluster_role_bindings: Writer<ClusterRoleBinding>,
        crds: Writer<CustomResourceDefinition>,
        api_services: Writer<APIService>,
        csvs: Writer<DynamicObject>,
        parents: Writer<DynamicObject>,
    }

    fn list<K>(writer: &mut Writer<K>, objects: Vec<K>)
    where
        K: Lookup + Clone + 'static,
        K::DynamicType: Eq + Hash + Clone,
    {
        writer.apply_watcher_event(&watcher::Event::Init);
        for object in objects {
            writer.apply_watcher_event(&watcher::Event::InitApply(object));
        }
        writer.apply_watcher_event(&watcher::Event::InitDone);
    }

    impl Writers {
        fn new() -> Self {
            Self {
                config_maps: Writer::default(),
                service_accounts: Writer::default(),
                roles: Writer::default(),
                role_bindings: Writer::default(),
                services: Writer::default(),
                pods: Writer::default(),
                deployments: Writer::default(),
                secrets: Writer::default(),
                cluster_roles: Writer::default(),
                cluster_role_bindings: Writer::default(),
                crds: Writer::default(),
                api_services: Writer::default(),
                csvs: Writer::new(cluster_service_version_resource()),
                parents: Writer::new(ParentKind::default().api_resource()),
            }
        }

        fn cache(&self) -> ClusterCache {
            ClusterCache {
                config_maps: self.config_maps.as_reader(),
                service_accounts: self.service_accounts.as_reader(),
                roles: self.roles.as_reader(),
                role_bindings: self.role_bindings.as_reader(),
                services: self.services.as_reader(),
                pods: self.pods.as_reader(),
                deployments: self.deployments.as_reader(),
                secrets: self.secrets.as_reader(),
                cluster_roles: self.cluster_roles.as_reader(),
                cluster_role_bindings: self.cluster_role_bindings.as_reader(),
                crds: self.crds.as_reader(),
                api_services: self.api_services.as_reader(),
                csvs: self.csvs.as_reader(),
                csv_resource: cluster_service_version_resource(),
                parents: self.parents.as_reader(),
                parent_resource: ParentKind::default().api_resource(),
            }
        }

        fn list_empty_except_pods(&mut self) {
            list(&mut self.config_maps, vec![]);
            list(&mut self.service_accounts, vec![]);
            list(&mut self.roles, vec![]);
            list(&mut self.role_bindings, vec![]);
            list(&mut self.services, vec![]);
            list(&mut self.deployments, vec![]);
            list(&mut self.secrets, vec![]);
            list(&mut self.cluster_roles, vec![]);
            list(&mut self.cluster_role_bindings, vec![]);
            list(&mut self.crds, vec![]);
            list(&mut self.api_services, vec![]);
            list(&mut self.csvs, vec![]);
            list(&mut self.parents, vec![]);
        }
    }

    fn pod(namespace: &str, name: &str, source: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: source.map(|source| {
                    BTreeMap::from([(CATALOG_SOURCE_LABEL.to_string(), source.to_string())])
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn subscription(namespace: &str, name: &str, installed: &str) -> DynamicObject {
        DynamicObject::new(name, &ParentKind::default().api_resource())
            .within(namespace)
            .data(json!({ "status": { "installedCSV": installed } }))
    }

    #[test]
    fn pods_are_filtered_by_namespace_and_selector_and_sorted() {
        let mut writers = Writers::new();
        list(
            &mut writers.pods,
            vec![
                pod("olm", "ops-registry-b", Some("ops")),
                pod("olm", "ops-registry-a", Some("ops")),
                pod("olm", "other-registry", Some("other")),
                pod("default", "ops-registry-c", Some("ops")),
                pod("olm", "unlabeled", None),
            ],
        );
        let cache = writers.cache();

        let selector = Selector::new().match_labels(CATALOG_SOURCE_LABEL, "ops");
        let names: Vec<String> = cache
            .pods("olm", &selector)
            .iter()
            .map(|pod| pod.name_any())
            .collect();

        assert_eq!(names, vec!["ops-registry-a", "ops-registry-b"]);
    }

    #[test]
    fn cluster_scoped_components_are_found_without_namespace() {
        let mut writers = Writers::new();
        list(
            &mut writers.cluster_roles,
            vec![ClusterRole {
                metadata: ObjectMeta {
                    name: Some("etcd-reader".to_string()),
                    uid: Some("cr-uid".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            }],
        );
        list(
            &mut writers.secrets,
            vec![Secret {
                metadata: ObjectMeta {
                    name: Some("token".to_string()),
                    namespace: Some("operators".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            }],
        );
        let cache = writers.cache();

        let role = cache.component(&ObjectKey::cluster(ComponentKind::ClusterRole, "etcd-reader"));
        assert_eq!(role.and_then(|meta| meta.uid).as_deref(), Some("cr-uid"));

        assert!(cache
            .component(&ObjectKey::namespaced(ComponentKind::Secret, "operators", "token"))
            .is_some());
        assert!(cache
            .component(&ObjectKey::namespaced(ComponentKind::Secret, "default", "token"))
            .is_none());
        assert_eq!(cache.components(ComponentKind::ClusterRole).len(), 1);
    }

    #[test]
    fn installed_csv_resolves_to_its_subscription() {
        let mut writers = Writers::new();
        list(
            &mut writers.parents,
            vec![
                subscription("operators", "etcd", "etcdoperator.v0.9.4"),
                subscription("staging", "etcd", "etcdoperator.v0.9.2"),
            ],
        );
        list(
            &mut writers.csvs,
            vec![DynamicObject::new("etcdoperator.v0.9.4", &cluster_service_version_resource())
                .within("operators")],
        );
        let cache = writers.cache();

        let parent = cache.installing_parent("operators", "etcdoperator.v0.9.4");
        assert_eq!(parent.and_then(|meta| meta.name).as_deref(), Some("etcd"));
        assert!(cache.installing_parent("operators", "etcdoperator.v0.9.2").is_none());
        assert!(cache.parent("staging", "etcd").is_some());
        assert!(cache
            .component(&ObjectKey::namespaced(
                ComponentKind::ClusterServiceVersion,
                "operators",
                "etcdoperator.v0.9.4"
            ))
            .is_some());
    }

    #[tokio::test]
    async fn ready_only_after_every_store_has_listed() {
        let mut writers = Writers::new();
        let cache = writers.cache();
        writers.list_empty_except_pods();

        let pending = tokio::time::timeout(Duration::from_millis(50), cache.wait_until_ready()).await;
        assert!(pending.is_err());

        list(&mut writers.pods, vec![]);
        tokio::time::timeout(Duration::from_secs(5), cache.wait_until_ready())
            .await
            .expect("stores synced")
            .unwrap();
    }
}
