pub mod adoption;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod crd;
pub mod error;
pub mod operator;
pub mod ownership;
pub mod registry;
pub mod types;

pub use config::OperatorConfig;
pub use context::Context;
pub use error::{Error, Result};
pub use operator::Operator;

pub mod prelude {
    pub use crate::adoption::{
        component_label_key, Adoption, AdoptionEngine, AdoptionReport, ComponentKind, ObjectKey,
        ParentKey,
    };
    pub use crate::cache::{ComponentCache, RegistryCache};
    pub use crate::client::{ComponentClient, RegistryClient};
    pub use crate::config::OperatorConfig;
    pub use crate::crd::{
        CatalogSource, CatalogSourceSpec, CatalogSourceStatus, ConfigMapResourceReference,
        RegistryServiceStatus,
    };
    pub use crate::error::{Error, Result};
    pub use crate::operator::Operator;
    pub use crate::registry::{Clock, EnsureOutcome, RegistryReconciler};

    pub use std::sync::Arc;
}
