use std::fmt::Debug;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::NamespaceResourceScope;
use serde::de::DeserializeOwned;

use crate::controller::ready::{
    DaemonSetReadiness, DeploymentReadiness, ReadinessCalculator, StatefulSetReadiness,
};
use crate::controller::revision;

/// A workload controller kind the tracker can follow.
///
/// Implementations adapt the per-kind shape of spec and status to the one
/// generic merge engine; readiness interpretation lives in the kind's
/// [`ReadinessCalculator`].
pub trait TrackedController:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// Short kind prefix used in feed output, e.g. `deploy`.
    const SHORT_KIND: &'static str;

    /// Whether pods of this kind are versioned through intermediate
    /// revision objects (ReplicaSets) worth watching.
    const USES_REVISIONS: bool;

    fn desired_replicas(&self) -> i32;

    fn pod_selector(&self) -> Option<LabelSelector>;

    /// Current rollout revision of the controller, for kinds that stamp one.
    fn current_revision(&self) -> Option<String>;

    fn readiness() -> Box<dyn ReadinessCalculator<Self>>;
}

impl TrackedController for Deployment {
    const SHORT_KIND: &'static str = "deploy";
    const USES_REVISIONS: bool = true;

    fn desired_replicas(&self) -> i32 {
        self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
    }

    fn pod_selector(&self) -> Option<LabelSelector> {
        self.spec.as_ref().map(|s| s.selector.clone())
    }

    fn current_revision(&self) -> Option<String> {
        revision::annotation_revision(&self.metadata)
    }

    fn readiness() -> Box<dyn ReadinessCalculator<Self>> {
        Box::new(DeploymentReadiness)
    }
}

impl TrackedController for StatefulSet {
    const SHORT_KIND: &'static str = "sts";
    const USES_REVISIONS: bool = false;

    fn desired_replicas(&self) -> i32 {
        self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
    }

    fn pod_selector(&self) -> Option<LabelSelector> {
        self.spec.as_ref().map(|s| s.selector.clone())
    }

    fn current_revision(&self) -> Option<String> {
        None
    }

    fn readiness() -> Box<dyn ReadinessCalculator<Self>> {
        Box::new(StatefulSetReadiness)
    }
}

impl TrackedController for DaemonSet {
    const SHORT_KIND: &'static str = "ds";
    const USES_REVISIONS: bool = false;

    fn desired_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .map(|s| s.desired_number_scheduled)
            .unwrap_or(0)
    }

    fn pod_selector(&self) -> Option<LabelSelector> {
        self.spec.as_ref().map(|s| s.selector.clone())
    }

    fn current_revision(&self) -> Option<String> {
        None
    }

    fn readiness() -> Box<dyn ReadinessCalculator<Self>> {
        Box::new(DaemonSetReadiness)
    }
}
