pub mod desired;
mod reconciler;
mod status;

pub use reconciler::{EnsureOutcome, RegistryReconciler};
pub use status::{project_status, Clock, SystemClock};
