#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use catalog_operator::adoption::{AdoptionEngine, ObjectKey};
use catalog_operator::cache::{ComponentCache, RegistryCache};
use catalog_operator::client::{ComponentClient, RegistryClient};
use catalog_operator::crd::{CatalogSource, CatalogSourceSpec, CatalogSourceStatus};
use catalog_operator::registry::{Clock, RegistryReconciler};
use catalog_operator::types::Selector;
use catalog_operator::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;

pub const IMAGE: &str = "quay.io/example/configmap-registry:test";
pub const PARENT_KIND: &str = "Subscription";

type Key = (String, String);

/// A mutation observed by the fake API server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Write {
    Create { kind: &'static str, name: String },
    Delete { kind: &'static str, name: String },
    Status { name: String },
    Label { object: ObjectKey, label: String },
}

#[derive(Default)]
pub struct State {
    config_maps: BTreeMap<Key, ConfigMap>,
    service_accounts: BTreeMap<Key, ServiceAccount>,
    roles: BTreeMap<Key, Role>,
    role_bindings: BTreeMap<Key, RoleBinding>,
    pods: BTreeMap<Key, Pod>,
    services: BTreeMap<Key, Service>,
    catalog_sources: BTreeMap<Key, CatalogSource>,
    components: HashMap<ObjectKey, ObjectMeta>,
    parents: BTreeMap<Key, ObjectMeta>,
    installed: BTreeMap<Key, String>,
    writes: Vec<Write>,
    failing_creates: HashSet<&'static str>,
    failing_deletes: HashSet<&'static str>,
    failing_labels: HashSet<String>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// Object kinds the fake stores, each in its own table.
pub trait Stored: Resource<DynamicType = ()> + Clone {
    const KIND: &'static str;
    fn table(state: &mut State) -> &mut BTreeMap<Key, Self>;
}

macro_rules! stored {
    ($ty:ty, $kind:literal, $field:ident) => {
        impl Stored for $ty {
            const KIND: &'static str = $kind;
            fn table(state: &mut State) -> &mut BTreeMap<Key, Self> {
                &mut state.$field
            }
        }
    };
}

stored!(ConfigMap, "ConfigMap", config_maps);
stored!(ServiceAccount, "ServiceAccount", service_accounts);
stored!(Role, "Role", roles);
stored!(RoleBinding, "RoleBinding", role_bindings);
stored!(Pod, "Pod", pods);
stored!(Service, "Service", services);
stored!(CatalogSource, "CatalogSource", catalog_sources);

fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} (injected)"),
        reason: reason.to_string(),
        code,
    }))
}

fn key_of<K: Resource>(object: &K) -> Key {
    (
        object.meta().namespace.clone().unwrap_or_default(),
        object.meta().name.clone().unwrap_or_default(),
    )
}

/// In-memory API server plus a perfectly synced cache of it.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store `object` as if created out of band, assigning uid and version.
    pub fn insert<K: Stored>(&self, mut object: K) -> K {
        let mut state = self.state.lock();
        let revision = state.next_revision();
        let meta = object.meta_mut();
        if meta.name.is_none() {
            let prefix = meta.generate_name.clone().unwrap_or_default();
            meta.name = Some(format!("{prefix}{revision:05}"));
        }
        meta.resource_version = Some(revision.to_string());
        meta.uid.get_or_insert_with(|| format!("uid-{revision}"));

        K::table(&mut state).insert(key_of(&object), object.clone());
        object
    }

    pub fn get<K: Stored>(&self, namespace: &str, name: &str) -> Option<K> {
        let mut state = self.state.lock();
        K::table(&mut state)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn all<K: Stored>(&self, namespace: &str) -> Vec<K> {
        let mut state = self.state.lock();
        K::table(&mut state)
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, object)| object.clone())
            .collect()
    }

    pub fn add_config_map(&self, namespace: &str, name: &str) -> ConfigMap {
        self.insert(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// Simulate a content edit: the ConfigMap gets a new resource version.
    pub fn edit_config_map(&self, namespace: &str, name: &str) -> String {
        let mut state = self.state.lock();
        let revision = state.next_revision();
        let config_map = state
            .config_maps
            .get_mut(&(namespace.to_string(), name.to_string()))
            .expect("config map exists");
        config_map.metadata.resource_version = Some(revision.to_string());
        revision.to_string()
    }

    pub fn add_catalog_source(&self, namespace: &str, name: &str, config_map: &str) -> CatalogSource {
        let mut source = CatalogSource::new(
            name,
            CatalogSourceSpec {
                config_map: config_map.to_string(),
                ..Default::default()
            },
        );
        source.metadata.namespace = Some(namespace.to_string());
        self.insert(source)
    }

    pub fn catalog_source(&self, namespace: &str, name: &str) -> CatalogSource {
        self.get(namespace, name).expect("catalog source exists")
    }

    pub fn add_component(&self, key: ObjectKey, mut meta: ObjectMeta) -> ObjectMeta {
        let mut state = self.state.lock();
        let revision = state.next_revision();
        meta.name = Some(key.name.clone());
        meta.namespace = key.namespace.clone();
        meta.resource_version = Some(revision.to_string());
        meta.uid.get_or_insert_with(|| format!("uid-{revision}"));
        state.components.insert(key, meta.clone());
        meta
    }

    pub fn component_labels(&self, key: &ObjectKey) -> BTreeMap<String, String> {
        self.state
            .lock()
            .components
            .get(key)
            .and_then(|meta| meta.labels.clone())
            .unwrap_or_default()
    }

    pub fn add_parent(&self, namespace: &str, name: &str, uid: &str) {
        self.state.lock().parents.insert(
            (namespace.to_string(), name.to_string()),
            ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
        );
    }

    /// Record `csv` as the installed CSV in the parent's status.
    pub fn install(&self, namespace: &str, parent: &str, csv: &str) {
        self.state
            .lock()
            .installed
            .insert((namespace.to_string(), parent.to_string()), csv.to_string());
    }

    pub fn fail_create(&self, kind: &'static str) {
        self.state.lock().failing_creates.insert(kind);
    }

    pub fn fail_delete(&self, kind: &'static str) {
        self.state.lock().failing_deletes.insert(kind);
    }

    pub fn fail_label(&self, name: &str) {
        self.state.lock().failing_labels.insert(name.to_string());
    }

    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing_creates.clear();
        state.failing_deletes.clear();
        state.failing_labels.clear();
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    fn create<K: Stored>(&self, object: &K) -> Result<K> {
        {
            let mut state = self.state.lock();
            if state.failing_creates.contains(K::KIND) {
                return Err(api_error(500, "InternalError"));
            }
            if object.meta().name.is_some() && K::table(&mut state).contains_key(&key_of(object)) {
                return Err(api_error(409, "AlreadyExists"));
            }
        }

        let created = self.insert(object.clone());
        self.state.lock().writes.push(Write::Create {
            kind: K::KIND,
            name: created.name_any(),
        });
        Ok(created)
    }

    fn delete<K: Stored>(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_deletes.contains(K::KIND) {
            return Err(api_error(500, "InternalError"));
        }
        if K::table(&mut state)
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
        {
            state.writes.push(Write::Delete {
                kind: K::KIND,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn cached<K: Stored>(&self, namespace: &str, name: &str) -> Option<K> {
        self.get(namespace, name)
    }
}

impl RegistryCache for FakeCluster {
    fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.cached(namespace, name)
    }

    fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount> {
        self.cached(namespace, name)
    }

    fn role(&self, namespace: &str, name: &str) -> Option<Role> {
        self.cached(namespace, name)
    }

    fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.cached(namespace, name)
    }

    fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.cached(namespace, name)
    }

    fn pods(&self, namespace: &str, selector: &Selector) -> Vec<Pod> {
        self.all::<Pod>(namespace)
            .into_iter()
            .filter(|pod| selector.matches(pod.metadata.labels.as_ref()))
            .collect()
    }
}

#[async_trait]
impl RegistryClient for FakeCluster {
    async fn create_service_account(&self, service_account: &ServiceAccount) -> Result<ServiceAccount> {
        self.create(service_account)
    }

    async fn delete_service_account(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<ServiceAccount>(namespace, name)
    }

    async fn create_role(&self, role: &Role) -> Result<Role> {
        self.create(role)
    }

    async fn delete_role(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Role>(namespace, name)
    }

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding> {
        self.create(role_binding)
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<RoleBinding>(namespace, name)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        self.create(pod)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Pod>(namespace, name)
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        self.create(service)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Service>(namespace, name)
    }

    async fn update_catalog_source_status(
        &self,
        source: &CatalogSource,
        status: &CatalogSourceStatus,
    ) -> Result<CatalogSource> {
        let mut state = self.state.lock();
        if state.failing_creates.contains("CatalogSourceStatus") {
            return Err(api_error(500, "InternalError"));
        }

        let revision = state.next_revision();
        let stored = state
            .catalog_sources
            .get_mut(&key_of(source))
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if stored.resource_version() != source.resource_version() {
            return Err(api_error(409, "Conflict"));
        }

        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(revision.to_string());
        let updated = stored.clone();
        state.writes.push(Write::Status {
            name: source.name_any(),
        });
        Ok(updated)
    }
}

impl ComponentCache for FakeCluster {
    fn component(&self, key: &ObjectKey) -> Option<ObjectMeta> {
        self.state.lock().components.get(key).cloned()
    }

    fn components(&self, kind: catalog_operator::adoption::ComponentKind) -> Vec<ObjectMeta> {
        let state = self.state.lock();
        let mut metas: Vec<ObjectMeta> = state
            .components
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, meta)| meta.clone())
            .collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    fn parent(&self, namespace: &str, name: &str) -> Option<ObjectMeta> {
        self.state
            .lock()
            .parents
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn installing_parent(&self, namespace: &str, csv: &str) -> Option<ObjectMeta> {
        let state = self.state.lock();
        state
            .installed
            .iter()
            .find(|((ns, _), installed)| ns == namespace && installed.as_str() == csv)
            .and_then(|(key, _)| state.parents.get(key).cloned())
    }
}

#[async_trait]
impl ComponentClient for FakeCluster {
    async fn add_component_label(
        &self,
        key: &ObjectKey,
        resource_version: Option<String>,
        label: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_labels.contains(&key.name) {
            return Err(api_error(500, "InternalError"));
        }

        let revision = state.next_revision();
        let meta = state
            .components
            .get_mut(key)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if resource_version.is_some() && meta.resource_version != resource_version {
            return Err(api_error(409, "Conflict"));
        }

        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(label.to_string(), String::new());
        meta.resource_version = Some(revision.to_string());
        state.writes.push(Write::Label {
            object: key.clone(),
            label: label.to_string(),
        });
        Ok(())
    }
}

/// A clock stopped at a fixed instant.
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn epoch() -> Self {
        Self(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn registry_reconciler(cluster: &Arc<FakeCluster>) -> RegistryReconciler {
    RegistryReconciler::new(
        cluster.clone(),
        cluster.clone(),
        Arc::new(FixedClock::epoch()),
        IMAGE,
    )
}

pub fn adoption_engine(cluster: &Arc<FakeCluster>) -> AdoptionEngine {
    AdoptionEngine::new(cluster.clone(), cluster.clone(), PARENT_KIND)
}
