use kube::runtime::controller::Action;

use crate::adoption::AdoptionEngine;
use crate::config::OperatorConfig;
use crate::error::Error;
use crate::registry::RegistryReconciler;

pub struct Context {
    pub registry: RegistryReconciler,
    pub adoption: AdoptionEngine,
    pub config: OperatorConfig,
}

impl Context {
    pub fn new(registry: RegistryReconciler, adoption: AdoptionEngine, config: OperatorConfig) -> Self {
        Self {
            registry,
            adoption,
            config,
        }
    }

    pub fn done(&self) -> Action {
        Action::requeue(self.config.resync)
    }

    pub fn retry(&self, error: &Error) -> Action {
        retry_action(&self.config, error)
    }
}

/// Transient failures (stale reads, create races) retry on the short delay;
/// permanent ones wait for the object to change.
pub fn retry_action(config: &OperatorConfig, error: &Error) -> Action {
    if error.is_permanent() {
        Action::await_change()
    } else if error.is_transient() {
        Action::requeue(config.conflict_requeue)
    } else {
        Action::requeue(config.error_requeue)
    }
}
