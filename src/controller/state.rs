use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::controller::ready::ReadinessCalculator;
use crate::controller::revision;
use crate::controller::TrackedController;
use crate::types::{ControllerStatus, PodRef, PodStatus, ReadyStatus, ResourceRef, RevisionRef};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) enum ControllerPhase {
    #[default]
    Pending,
    Started,
    Failed,
    Deleted,
}

pub(crate) struct ControllerObservation {
    pub first_added: bool,
    pub initially_ready: bool,
    pub became_ready: bool,
    pub status: ControllerStatus,
}

/// The merge engine's mutable state, kept apart from channel I/O so the
/// dispatch rules stay testable with hand-built objects.
pub(crate) struct TrackState<C: TrackedController> {
    resource: ResourceRef,
    pub phase: ControllerPhase,
    pub last_object: Option<C>,
    current_ready: bool,
    ready_status: ReadyStatus,
    failed_reason: String,
    pub known_revisions: BTreeMap<String, ReplicaSet>,
    pod_statuses: BTreeMap<String, PodStatus>,
    pub tracked_pods: Vec<String>,
    pub final_status: Option<ControllerStatus>,
    calculator: Box<dyn ReadinessCalculator<C>>,
}

impl<C: TrackedController> TrackState<C> {
    pub fn new(resource: ResourceRef, calculator: Box<dyn ReadinessCalculator<C>>) -> Self {
        Self {
            resource,
            phase: ControllerPhase::Pending,
            last_object: None,
            current_ready: false,
            ready_status: ReadyStatus::default(),
            failed_reason: String::new(),
            known_revisions: BTreeMap::new(),
            pod_statuses: BTreeMap::new(),
            tracked_pods: Vec::new(),
            final_status: None,
            calculator,
        }
    }

    /// Folds a controller snapshot in: recomputes readiness, tracks the
    /// rising edge and freezes the final status on it.
    pub fn observe_controller(&mut self, object: C) -> ControllerObservation {
        let prev = self.last_object.take();
        self.ready_status =
            self.calculator
                .ready_status(prev.as_ref(), &object, &self.known_revisions);

        let prev_ready = self.current_ready;
        self.current_ready = self.ready_status.is_ready;
        self.last_object = Some(object);

        let first_added = self.phase == ControllerPhase::Pending;
        if first_added {
            self.phase = ControllerPhase::Started;
        }

        let status = self.status();
        let became_ready = !prev_ready && self.current_ready;
        if became_ready {
            self.final_status = Some(status.clone());
        }

        ControllerObservation {
            first_added,
            initially_ready: self.current_ready,
            became_ready,
            status,
        }
    }

    /// The controller resource disappeared; status reports are empty from
    /// here on.
    pub fn observe_deleted(&mut self) -> ControllerStatus {
        self.last_object = None;
        self.current_ready = false;
        self.ready_status = ReadyStatus::default();
        self.phase = ControllerPhase::Deleted;
        ControllerStatus::default()
    }

    /// An external failure classification. Returns the status to report, if
    /// a controller snapshot exists to report against.
    pub fn observe_failed(&mut self, reason: &str) -> Option<ControllerStatus> {
        self.phase = ControllerPhase::Failed;
        self.failed_reason = reason.to_string();
        self.last_object.is_some().then(|| self.status())
    }

    pub fn observe_revision_added(&mut self, rs: ReplicaSet) -> RevisionRef {
        let name = rs.name_any();
        self.known_revisions.insert(name.clone(), rs);
        RevisionRef {
            is_new: self.revision_is_new(&name),
            name,
        }
    }

    pub fn observe_revision_modified(&mut self, rs: ReplicaSet) {
        self.known_revisions.insert(rs.name_any(), rs);
    }

    pub fn observe_revision_deleted(&mut self, name: &str) {
        self.known_revisions.remove(name);
    }

    /// Registers a pod for tracking. Returns `None` when the pod is already
    /// tracked (e.g. re-announced after a watch re-list).
    pub fn observe_pod_added(&mut self, pod: &Pod) -> Option<PodRef> {
        let name = pod.name_any();
        if self.tracked_pods.contains(&name) {
            return None;
        }
        self.tracked_pods.push(name.clone());

        Some(PodRef {
            revision: self.pod_revision(pod),
            name,
        })
    }

    pub fn pod_done(&mut self, name: &str) {
        if let Some(pos) = self.tracked_pods.iter().position(|n| n == name) {
            self.tracked_pods.remove(pos);
        }
    }

    pub fn merge_pod_status(&mut self, name: String, status: PodStatus) -> Option<ControllerStatus> {
        self.pod_statuses.insert(name, status);
        self.last_object.is_some().then(|| self.status())
    }

    pub fn pod_revision(&self, pod: &Pod) -> Option<RevisionRef> {
        revision::owner_revision_name(pod).map(|name| RevisionRef {
            is_new: self.revision_is_new(&name),
            name,
        })
    }

    /// Re-stamps `is_new` against the current controller generation; the
    /// value captured when the event was produced may be stale.
    pub fn refresh_revision(&self, revision: Option<RevisionRef>) -> Option<RevisionRef> {
        revision.map(|r| RevisionRef {
            is_new: self.revision_is_new(&r.name),
            name: r.name,
        })
    }

    pub fn revision_is_new(&self, name: &str) -> bool {
        let current = match self.last_object.as_ref().and_then(|o| o.current_revision()) {
            Some(rev) => rev,
            None => return false,
        };
        self.known_revisions
            .get(name)
            .map(|rs| revision::is_new(Some(&current), rs))
            .unwrap_or(false)
    }

    pub fn status(&self) -> ControllerStatus {
        let object = match self.last_object.as_ref() {
            Some(object) => object,
            None => return ControllerStatus::default(),
        };

        ControllerStatus {
            resource: self.resource.full_name(),
            desired_replicas: object.desired_replicas(),
            ready: self.ready_status.clone(),
            is_failed: self.phase == ControllerPhase::Failed,
            failed_reason: self.failed_reason.clone(),
            pods: self.pod_statuses.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap as Map;

    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
        LabelSelector, ObjectMeta, OwnerReference,
    };

    use super::*;
    use crate::controller::revision::REVISION_ANNOTATION;
    use crate::types::PodPhase;

    fn state() -> TrackState<Deployment> {
        TrackState::new(
            ResourceRef::new("deploy", "ns", "web"),
            <Deployment as TrackedController>::readiness(),
        )
    }

    fn deployment(revision: &str, desired: i32, ready: bool) -> Deployment {
        let counts = if ready { desired } else { 0 };
        Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                generation: Some(1),
                annotations: Some(Map::from([(
                    REVISION_ANNOTATION.to_string(),
                    revision.to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                selector: LabelSelector::default(),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(1),
                replicas: Some(counts),
                updated_replicas: Some(counts),
                available_replicas: Some(counts),
                ready_replicas: Some(counts),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn replica_set(name: &str, revision: &str) -> ReplicaSet {
        ReplicaSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: Some(Map::from([(
                    REVISION_ANNOTATION.to_string(),
                    revision.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pod(name: &str, owner_rs: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                owner_references: Some(vec![OwnerReference {
                    kind: "ReplicaSet".to_string(),
                    name: owner_rs.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn happy_rollout_edges() {
        let mut state = state();

        let first = state.observe_controller(deployment("1", 2, false));
        assert!(first.first_added);
        assert!(!first.initially_ready);
        assert!(!first.became_ready);

        let revision = state.observe_revision_added(replica_set("web-a", "1"));
        assert!(revision.is_new);

        let p1 = state.observe_pod_added(&pod("web-a-1", "web-a")).unwrap();
        assert_eq!(p1.revision.as_ref().unwrap().name, "web-a");
        assert!(p1.revision.as_ref().unwrap().is_new);
        let p2 = state.observe_pod_added(&pod("web-a-2", "web-a")).unwrap();
        assert_eq!(p2.name, "web-a-2");
        assert_eq!(state.tracked_pods.len(), 2);

        let rolled = state.observe_controller(deployment("1", 2, true));
        assert!(!rolled.first_added);
        assert!(rolled.became_ready);
        assert!(state.final_status.is_some());

        // Ready is edge-triggered: a second ready snapshot is quiet.
        let again = state.observe_controller(deployment("1", 2, true));
        assert!(!again.became_ready);
    }

    #[test]
    fn pod_added_twice_is_deduplicated() {
        let mut state = state();
        state.observe_controller(deployment("1", 1, false));

        assert!(state.observe_pod_added(&pod("web-a-1", "web-a")).is_some());
        assert!(state.observe_pod_added(&pod("web-a-1", "web-a")).is_none());
        assert_eq!(state.tracked_pods, vec!["web-a-1".to_string()]);

        state.pod_done("web-a-1");
        assert!(state.tracked_pods.is_empty());

        // Gone from the tracked set, a re-announce starts tracking again.
        assert!(state.observe_pod_added(&pod("web-a-1", "web-a")).is_some());
    }

    #[test]
    fn deletion_empties_reports_and_disarms_revisions() {
        let mut state = state();
        state.observe_controller(deployment("1", 1, false));
        state.observe_revision_added(replica_set("web-a", "1"));

        let empty = state.observe_deleted();
        assert_eq!(empty.resource, "");
        assert!(empty.pods.is_empty());
        assert_eq!(state.phase, ControllerPhase::Deleted);

        // No controller object left: recomputations stay calm and degrade
        // to `is_new = false`.
        let refreshed = state.refresh_revision(Some(RevisionRef {
            name: "web-a".to_string(),
            is_new: true,
        }));
        assert!(!refreshed.unwrap().is_new);

        assert!(state
            .merge_pod_status("web-a-1".to_string(), PodStatus::default())
            .is_none());
    }

    #[test]
    fn refresh_restamps_stale_revisions() {
        let mut state = state();
        state.observe_controller(deployment("1", 1, false));
        state.observe_revision_added(replica_set("web-a", "1"));

        let captured = state.pod_revision(&pod("web-a-1", "web-a"));
        assert!(captured.as_ref().unwrap().is_new);

        // Generation moves on: the captured value is stale now.
        state.observe_controller(deployment("2", 1, false));
        state.observe_revision_added(replica_set("web-b", "2"));

        let refreshed = state.refresh_revision(captured).unwrap();
        assert!(!refreshed.is_new);
        assert!(state.revision_is_new("web-b"));
    }

    #[test]
    fn failure_reason_lands_in_status_reports() {
        let mut state = state();
        state.observe_controller(deployment("1", 1, false));

        let report = state.observe_failed("FailedCreate: quota exceeded").unwrap();
        assert!(report.is_failed);
        assert_eq!(report.failed_reason, "FailedCreate: quota exceeded");

        let merged = state
            .merge_pod_status(
                "web-a-1".to_string(),
                PodStatus {
                    phase: PodPhase::Pending,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(merged.pods.contains_key("web-a-1"));
        assert!(merged.is_failed);
    }

    #[test]
    fn failure_without_object_reports_nothing() {
        let mut state = state();
        assert!(state.observe_failed("boom").is_none());
    }
}
