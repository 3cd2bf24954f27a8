use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};

use crate::controller::revision;
use crate::types::{ReadyStatus, RevisionCount};

/// Interprets controller-specific status fields into a [`ReadyStatus`].
///
/// The tracker only watches the previous→current edge of `is_ready`;
/// everything kind-specific lives behind this trait.
pub trait ReadinessCalculator<C>: Send + Sync {
    fn ready_status(
        &self,
        prev: Option<&C>,
        current: &C,
        revisions: &BTreeMap<String, ReplicaSet>,
    ) -> ReadyStatus;
}

pub struct DeploymentReadiness;

impl ReadinessCalculator<Deployment> for DeploymentReadiness {
    fn ready_status(
        &self,
        _prev: Option<&Deployment>,
        current: &Deployment,
        revisions: &BTreeMap<String, ReplicaSet>,
    ) -> ReadyStatus {
        let generation = current.metadata.generation;
        let desired = current.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let status = current.status.clone().unwrap_or_default();

        let observed = status.observed_generation;
        let total = status.replicas.unwrap_or(0);
        let updated = status.updated_replicas.unwrap_or(0);
        let available = status.available_replicas.unwrap_or(0);

        let current_revision = revision::annotation_revision(&current.metadata);
        let revision_counts = revisions
            .iter()
            .map(|(name, rs)| RevisionCount {
                name: name.clone(),
                is_new: revision::is_new(current_revision.as_deref(), rs),
                desired: rs.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0),
                ready: rs.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0),
            })
            .collect();

        let (is_ready, message) = if observed.unwrap_or(0) < generation.unwrap_or(0) {
            (false, "waiting for spec update to be observed".to_string())
        } else if updated < desired {
            (
                false,
                format!("waiting for replicas to be updated: {updated}/{desired}"),
            )
        } else if total > updated {
            (
                false,
                format!("waiting for {} old replicas to terminate", total - updated),
            )
        } else if available < desired {
            (
                false,
                format!("waiting for replicas to become available: {available}/{desired}"),
            )
        } else {
            (true, format!("{desired} replicas available"))
        };

        ReadyStatus {
            is_ready,
            message,
            revisions: revision_counts,
        }
    }
}

pub struct StatefulSetReadiness;

impl ReadinessCalculator<StatefulSet> for StatefulSetReadiness {
    fn ready_status(
        &self,
        _prev: Option<&StatefulSet>,
        current: &StatefulSet,
        _revisions: &BTreeMap<String, ReplicaSet>,
    ) -> ReadyStatus {
        let generation = current.metadata.generation;
        let desired = current.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let status = current.status.clone().unwrap_or_default();

        let observed = status.observed_generation;
        let ready = status.ready_replicas.unwrap_or(0);
        let updated = status.updated_replicas.unwrap_or(0);
        let revision_settled = match (&status.current_revision, &status.update_revision) {
            (Some(cur), Some(upd)) => cur == upd,
            _ => true,
        };

        let (is_ready, message) = if observed.unwrap_or(0) < generation.unwrap_or(0) {
            (false, "waiting for spec update to be observed".to_string())
        } else if updated < desired {
            (
                false,
                format!("waiting for replicas to be updated: {updated}/{desired}"),
            )
        } else if !revision_settled {
            (false, "waiting for revision rollout to settle".to_string())
        } else if ready < desired {
            (
                false,
                format!("waiting for replicas to become ready: {ready}/{desired}"),
            )
        } else {
            (true, format!("{desired} replicas ready"))
        };

        ReadyStatus {
            is_ready,
            message,
            revisions: Vec::new(),
        }
    }
}

pub struct DaemonSetReadiness;

impl ReadinessCalculator<DaemonSet> for DaemonSetReadiness {
    fn ready_status(
        &self,
        _prev: Option<&DaemonSet>,
        current: &DaemonSet,
        _revisions: &BTreeMap<String, ReplicaSet>,
    ) -> ReadyStatus {
        let generation = current.metadata.generation;
        let status = current.status.clone().unwrap_or_default();

        let observed = status.observed_generation;
        let desired = status.desired_number_scheduled;
        let updated = status.updated_number_scheduled.unwrap_or(0);
        let available = status.number_available.unwrap_or(0);

        let (is_ready, message) = if observed.unwrap_or(0) < generation.unwrap_or(0) {
            (false, "waiting for spec update to be observed".to_string())
        } else if updated < desired {
            (
                false,
                format!("waiting for pods to be updated: {updated}/{desired}"),
            )
        } else if available < desired {
            (
                false,
                format!("waiting for pods to become available: {available}/{desired}"),
            )
        } else {
            (true, format!("{desired} pods available"))
        };

        ReadyStatus {
            is_ready,
            message,
            revisions: Vec::new(),
        }
    }
}
