pub mod kinds;
pub mod ready;
pub mod revision;
pub(crate) mod state;
pub mod tracker;

pub use kinds::TrackedController;
pub use ready::{
    DaemonSetReadiness, DeploymentReadiness, ReadinessCalculator, StatefulSetReadiness,
};
pub use tracker::{ControllerOutputs, ControllerTracker};
