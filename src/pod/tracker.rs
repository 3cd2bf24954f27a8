use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use chrono::{DateTime, Utc};
use kube::api::Api;
use kube::{Client, ResourceExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::container::ContainerTracker;
use crate::errors::{TrackError, TrackResult};
use crate::informer::{EventsInformer, Informer, ObjectEvent};
use crate::pod::status;
use crate::types::{
    ContainerError, ContainerKind, ContainerLogChunk, ContainerRef, ContainerState, PodPhase,
    PodStatus, ResourceRef,
};

/// Receiver side of one pod tracker, consumed by the feed adapter or by a
/// controller tracker's fan-in task.
pub struct PodOutputs {
    pub added: mpsc::Receiver<()>,
    pub ready: mpsc::Receiver<()>,
    pub succeeded: mpsc::Receiver<()>,
    pub failed: mpsc::Receiver<()>,
    pub event_msg: mpsc::Receiver<String>,
    pub status_report: mpsc::Receiver<PodStatus>,
    pub log_chunk: mpsc::Receiver<ContainerLogChunk>,
    pub container_error: mpsc::Receiver<ContainerError>,
}

pub(crate) enum PodOutcome {
    Succeeded,
    Failed,
}

pub(crate) struct PodObservation {
    pub became_ready: bool,
    pub container_errors: Vec<ContainerError>,
    pub status: PodStatus,
    pub outcome: Option<PodOutcome>,
}

/// Pure pod-side tracking state: container states, the live-children set and
/// the readiness edge. Channel I/O stays in the tracker loop.
#[derive(Default)]
pub(crate) struct PodState {
    added: bool,
    ready: bool,
    pub(crate) container_states: BTreeMap<String, ContainerState>,
    pub(crate) tracked_containers: Vec<String>,
}

impl PodState {
    pub fn added(&self) -> bool {
        self.added
    }

    pub fn mark_added(&mut self) {
        self.added = true;
    }

    pub fn start_tracking(&mut self, name: &str) {
        self.container_states
            .insert(name.to_string(), ContainerState::Initial);
        self.tracked_containers.push(name.to_string());
    }

    pub fn container_done(&mut self, name: &str) {
        if let Some(pos) = self.tracked_containers.iter().position(|n| n == name) {
            self.tracked_containers.remove(pos);
        }
    }

    /// Folds a pod snapshot into the tracked state.
    pub fn observe(&mut self, pod: &Pod) -> PodObservation {
        let mut container_errors = Vec::new();

        for cs in status::all_container_statuses(pod) {
            let next = status::container_state(cs);
            let entry = self.container_states.entry(cs.name.clone()).or_default();
            // Terminated is sticky; everything else follows the snapshot.
            if *entry != ContainerState::Terminated && *entry != next {
                tracing::debug!(container = %cs.name, from = ?*entry, to = ?next, "container state changed");
                *entry = next;
            }
            if let Some(err) = status::waiting_error(cs) {
                container_errors.push(err);
            }
        }

        let snapshot = status::pod_status(pod);
        let became_ready = !self.ready && snapshot.ready;
        self.ready = snapshot.ready;
        let outcome = self.completion(snapshot.phase);

        PodObservation {
            became_ready,
            container_errors,
            status: snapshot,
            outcome,
        }
    }

    /// A pod is complete only once every container tracker has signalled
    /// done and the phase is terminal.
    pub fn completion(&self, phase: PodPhase) -> Option<PodOutcome> {
        if !self.tracked_containers.is_empty() {
            return None;
        }
        match phase {
            PodPhase::Succeeded => Some(PodOutcome::Succeeded),
            PodPhase::Failed => Some(PodOutcome::Failed),
            _ => None,
        }
    }
}

/// Tracks one pod: a single-name informer drives the loop, a container
/// tracker per (init) container follows logs, and the loop keeps the
/// container trackers fed with observed states.
pub struct PodTracker {
    client: Client,
    api: Api<Pod>,
    resource: ResourceRef,
    logs_from_time: Option<DateTime<Utc>>,
    cancel: CancellationToken,

    added_tx: mpsc::Sender<()>,
    ready_tx: mpsc::Sender<()>,
    succeeded_tx: mpsc::Sender<()>,
    failed_tx: mpsc::Sender<()>,
    event_msg_tx: mpsc::Sender<String>,
    status_tx: mpsc::Sender<PodStatus>,
    log_tx: mpsc::Sender<ContainerLogChunk>,
    error_tx: mpsc::Sender<ContainerError>,

    state: PodState,
    container_feeds: BTreeMap<String, watch::Sender<ContainerState>>,
    last_object: Option<Pod>,
}

impl PodTracker {
    pub fn new(
        client: Client,
        namespace: &str,
        name: &str,
        logs_from_time: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> (Self, PodOutputs) {
        let api: Api<Pod> = Api::namespaced(client.clone(), namespace);

        let (added_tx, added) = mpsc::channel(1);
        let (ready_tx, ready) = mpsc::channel(1);
        let (succeeded_tx, succeeded) = mpsc::channel(1);
        let (failed_tx, failed) = mpsc::channel(1);
        let (event_msg_tx, event_msg) = mpsc::channel(1);
        let (status_tx, status_report) = mpsc::channel(100);
        let (log_tx, log_chunk) = mpsc::channel(1000);
        let (error_tx, container_error) = mpsc::channel(1);

        let tracker = Self {
            client,
            api,
            resource: ResourceRef::new("po", namespace, name),
            logs_from_time,
            cancel,
            added_tx,
            ready_tx,
            succeeded_tx,
            failed_tx,
            event_msg_tx,
            status_tx,
            log_tx,
            error_tx,
            state: PodState::default(),
            container_feeds: BTreeMap::new(),
            last_object: None,
        };

        let outputs = PodOutputs {
            added,
            ready,
            succeeded,
            failed,
            event_msg,
            status_report,
            log_chunk,
            container_error,
        };

        (tracker, outputs)
    }

    pub async fn track(mut self) -> TrackResult<()> {
        let (objects_tx, mut objects_rx) = mpsc::channel::<ObjectEvent<Pod>>(4);
        let (errors_tx, mut errors_rx) = mpsc::channel::<TrackError>(1);
        let (container_done_tx, mut container_done_rx) = mpsc::channel::<String>(10);

        Informer::named(
            self.api.clone(),
            self.resource.full_name(),
            &self.resource.name,
            objects_tx,
            self.cancel.clone(),
        )
        .spawn(errors_tx.clone());

        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                Some(item) = objects_rx.recv() => match item {
                    ObjectEvent::Added(pod) => {
                        if !self.state.added() {
                            self.state.mark_added();
                            let _ = self.added_tx.send(()).await;
                            self.start_container_trackers(&container_done_tx, &errors_tx).await?;
                            self.start_events_informer(&pod, &errors_tx);
                        }
                        if self.handle_object(pod).await? {
                            return Ok(());
                        }
                    }
                    ObjectEvent::Modified(pod) => {
                        if self.handle_object(pod).await? {
                            return Ok(());
                        }
                    }
                    ObjectEvent::Deleted(_) => {
                        tracing::debug!(pod = %self.resource.full_name(), "resource gone; stop tracking");
                        return Ok(());
                    }
                },

                Some(name) = container_done_rx.recv() => {
                    self.state.container_done(&name);
                    if let Some(pod) = self.last_object.clone() {
                        if self.handle_object(pod).await? {
                            return Ok(());
                        }
                    }
                }

                Some(err) = errors_rx.recv() => return Err(err),

                _ = cancel.cancelled() => return Err(TrackError::Timeout),
            }
        }
    }

    async fn handle_object(&mut self, pod: Pod) -> TrackResult<bool> {
        let observation = self.state.observe(&pod);
        self.last_object = Some(pod);

        for (name, state) in &self.state.container_states {
            if let Some(feed) = self.container_feeds.get(name) {
                feed.send_replace(*state);
            }
        }

        for err in observation.container_errors {
            let _ = self.error_tx.send(err).await;
        }

        let _ = self.status_tx.send(observation.status).await;

        if observation.became_ready {
            let _ = self.ready_tx.send(()).await;
        }

        match observation.outcome {
            Some(PodOutcome::Succeeded) => {
                let _ = self.succeeded_tx.send(()).await;
                Ok(true)
            }
            Some(PodOutcome::Failed) => {
                let _ = self.failed_tx.send(()).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Enumerates init and main containers from the pod manifest and spawns
    /// one container tracker per name.
    async fn start_container_trackers(
        &mut self,
        container_done_tx: &mpsc::Sender<String>,
        errors_tx: &mpsc::Sender<TrackError>,
    ) -> TrackResult<()> {
        let manifest = self.api.get(&self.resource.name).await?;
        let spec = manifest.spec.unwrap_or_default();

        let mut containers: Vec<(String, ContainerKind)> = Vec::new();
        for c in spec.init_containers.iter().flatten() {
            containers.push((c.name.clone(), ContainerKind::Init));
        }
        for c in &spec.containers {
            containers.push((c.name.clone(), ContainerKind::Main));
        }

        for (name, kind) in containers {
            let (feed_tx, feed_rx) = watch::channel(ContainerState::Initial);
            self.container_feeds.insert(name.clone(), feed_tx);
            self.state.start_tracking(&name);

            let tracker = ContainerTracker::new(
                ContainerRef {
                    pod: self.resource.name.clone(),
                    container: name.clone(),
                    kind,
                },
                self.api.clone(),
                feed_rx,
                self.log_tx.clone(),
                self.logs_from_time,
                self.cancel.clone(),
            );

            let errors = errors_tx.clone();
            let done = container_done_tx.clone();
            let pod_name = self.resource.full_name();
            tokio::spawn(async move {
                tracing::debug!(pod = %pod_name, container = %name, "tracking container");
                if let Err(err) = tracker.track().await {
                    let _ = errors.send(err).await;
                }
                let _ = done.send(name).await;
            });
        }

        Ok(())
    }

    fn start_events_informer(&self, pod: &Pod, errors_tx: &mpsc::Sender<TrackError>) {
        EventsInformer::new(
            self.client.clone(),
            self.resource.clone(),
            pod.uid(),
            self.event_msg_tx.clone(),
            self.cancel.clone(),
        )
        .spawn(errors_tx.clone());
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{
        ContainerState as K8sContainerState, ContainerStateRunning, ContainerStateTerminated,
        ContainerStateWaiting, ContainerStatus, PodCondition, PodStatus as K8sPodStatus,
    };

    use super::*;

    fn container(name: &str, state: K8sContainerState) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            state: Some(state),
            ..Default::default()
        }
    }

    fn running() -> K8sContainerState {
        K8sContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        }
    }

    fn terminated() -> K8sContainerState {
        K8sContainerState {
            terminated: Some(ContainerStateTerminated::default()),
            ..Default::default()
        }
    }

    fn waiting(reason: &str) -> K8sContainerState {
        K8sContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some(reason.to_string()),
                message: Some("back-off".to_string()),
            }),
            ..Default::default()
        }
    }

    fn pod(phase: &str, statuses: Vec<ContainerStatus>) -> Pod {
        Pod {
            status: Some(K8sPodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(statuses),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn image_pull_backoff_surfaces_container_error() {
        let mut state = PodState::default();
        state.start_tracking("main");

        let obs = state.observe(&pod("Pending", vec![container("main", waiting("ImagePullBackOff"))]));
        assert_eq!(obs.container_errors.len(), 1);
        assert_eq!(obs.container_errors[0].message, "ImagePullBackOff: back-off");
        assert!(obs.outcome.is_none());
    }

    #[test]
    fn completion_needs_empty_tracked_set_and_terminal_phase() {
        let mut state = PodState::default();
        state.start_tracking("main");

        // Terminal phase alone is not enough while a container is tracked.
        let obs = state.observe(&pod("Succeeded", vec![container("main", terminated())]));
        assert!(obs.outcome.is_none());

        state.container_done("main");
        assert!(matches!(
            state.completion(PodPhase::Succeeded),
            Some(PodOutcome::Succeeded)
        ));
        assert!(matches!(
            state.completion(PodPhase::Failed),
            Some(PodOutcome::Failed)
        ));
        assert!(state.completion(PodPhase::Running).is_none());
    }

    #[test]
    fn init_and_main_containers_complete_in_turn() {
        let mut state = PodState::default();
        state.start_tracking("init");
        state.start_tracking("main");

        state.container_done("init");
        assert!(state.completion(PodPhase::Succeeded).is_none());

        state.container_done("main");
        assert!(matches!(
            state.completion(PodPhase::Succeeded),
            Some(PodOutcome::Succeeded)
        ));
    }

    #[test]
    fn terminated_state_is_sticky() {
        let mut state = PodState::default();
        state.start_tracking("main");

        state.observe(&pod("Running", vec![container("main", terminated())]));
        state.observe(&pod("Running", vec![container("main", waiting("CrashLoopBackOff"))]));

        assert_eq!(
            state.container_states.get("main"),
            Some(&ContainerState::Terminated)
        );
    }

    #[test]
    fn ready_edge_fires_once_per_rise() {
        let mut state = PodState::default();

        let mut ready_pod = pod("Running", vec![container("main", running())]);
        ready_pod.status.as_mut().unwrap().conditions = Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]);

        assert!(state.observe(&ready_pod).became_ready);
        assert!(!state.observe(&ready_pod).became_ready);

        let unready = pod("Running", vec![container("main", running())]);
        assert!(!state.observe(&unready).became_ready);
        assert!(state.observe(&ready_pod).became_ready);
    }
}
