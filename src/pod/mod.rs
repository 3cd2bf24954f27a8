pub mod status;
pub mod tracker;

pub use tracker::{PodOutputs, PodTracker};
