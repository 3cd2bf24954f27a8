use std::sync::Arc;

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use chrono::{DateTime, Utc};
use kube::api::Api;
use kube::{Client, ResourceExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::controller::state::TrackState;
use crate::controller::TrackedController;
use crate::errors::{TrackError, TrackResult};
use crate::informer::{DefaultFailureClassifier, EventsInformer, FailureClassifier, Informer, ObjectEvent};
use crate::kube::selector::selector_string;
use crate::pod::PodTracker;
use crate::types::{
    ControllerStatus, DeletedPolicy, Options, PodError, PodLogChunk, PodRef, PodStatus,
    ResourceRef, RevisionRef,
};

/// Receiver side of a controller tracker, consumed by the feed adapter.
///
/// Capacities form the feed contract: lifecycle channels are edge-triggered
/// notifications, log chunks are bursty, pod errors apply backpressure.
pub struct ControllerOutputs {
    pub added: mpsc::Receiver<bool>,
    pub ready: mpsc::Receiver<()>,
    pub failed: mpsc::Receiver<String>,
    pub event_msg: mpsc::Receiver<String>,
    pub added_revision: mpsc::Receiver<RevisionRef>,
    pub added_pod: mpsc::Receiver<PodRef>,
    pub pod_log_chunk: mpsc::Receiver<PodLogChunk>,
    pub pod_error: mpsc::Receiver<PodError>,
    pub status_report: mpsc::Receiver<ControllerStatus>,
}

/// Sender endpoints handed to per-pod fan-in tasks. Children only ever hold
/// these, never the tracker itself.
struct PodFanIn {
    log: mpsc::Sender<PodLogChunk>,
    error: mpsc::Sender<PodError>,
    event_msg: mpsc::Sender<String>,
    status: mpsc::Sender<(String, PodStatus)>,
    done: mpsc::Sender<String>,
    errors: mpsc::Sender<TrackError>,
}

/// The top-level merge engine for one workload controller.
///
/// Runs the controller informer immediately; the revision, pods and events
/// informers start on the first `Added` (they need the live object for its
/// selector and uid). Every observed pod gets its own [`PodTracker`] plus a
/// fan-in task that retags pod output with the pod name and revision.
pub struct ControllerTracker<C: TrackedController> {
    client: Client,
    api: Api<C>,
    resource: ResourceRef,
    logs_from_time: Option<DateTime<Utc>>,
    on_deleted: DeletedPolicy,
    classifier: Arc<dyn FailureClassifier>,
    cancel: CancellationToken,

    added_tx: mpsc::Sender<bool>,
    ready_tx: mpsc::Sender<()>,
    failed_tx: mpsc::Sender<String>,
    event_msg_tx: mpsc::Sender<String>,
    added_revision_tx: mpsc::Sender<RevisionRef>,
    added_pod_tx: mpsc::Sender<PodRef>,
    pod_log_tx: mpsc::Sender<PodLogChunk>,
    pod_error_tx: mpsc::Sender<PodError>,
    status_tx: mpsc::Sender<ControllerStatus>,

    state: TrackState<C>,
}

impl<C: TrackedController> ControllerTracker<C> {
    pub fn new(
        client: Client,
        namespace: &str,
        name: &str,
        opts: &Options,
        cancel: CancellationToken,
    ) -> (Self, ControllerOutputs) {
        let api: Api<C> = Api::namespaced(client.clone(), namespace);
        let resource = ResourceRef::new(C::SHORT_KIND, namespace, name);

        let (added_tx, added) = mpsc::channel(1);
        let (ready_tx, ready) = mpsc::channel(1);
        let (failed_tx, failed) = mpsc::channel(1);
        let (event_msg_tx, event_msg) = mpsc::channel(1);
        let (added_revision_tx, added_revision) = mpsc::channel(10);
        let (added_pod_tx, added_pod) = mpsc::channel(10);
        let (pod_log_tx, pod_log_chunk) = mpsc::channel(1000);
        let (pod_error_tx, pod_error) = mpsc::channel(1);
        let (status_tx, status_report) = mpsc::channel(100);

        let tracker = Self {
            client,
            api,
            resource: resource.clone(),
            logs_from_time: opts.logs_from_time,
            on_deleted: opts.on_deleted,
            classifier: Arc::new(DefaultFailureClassifier),
            cancel,
            added_tx,
            ready_tx,
            failed_tx,
            event_msg_tx,
            added_revision_tx,
            added_pod_tx,
            pod_log_tx,
            pod_error_tx,
            status_tx,
            state: TrackState::new(resource, C::readiness()),
        };

        let outputs = ControllerOutputs {
            added,
            ready,
            failed,
            event_msg,
            added_revision,
            added_pod,
            pod_log_chunk,
            pod_error,
            status_report,
        };

        (tracker, outputs)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn track(mut self) -> TrackResult<()> {
        let (controller_tx, mut controller_rx) = mpsc::channel::<ObjectEvent<C>>(1);
        let (revisions_tx, mut revisions_rx) = mpsc::channel::<ObjectEvent<ReplicaSet>>(1);
        let (pods_tx, mut pods_rx) = mpsc::channel::<ObjectEvent<Pod>>(1);
        let (resource_failed_tx, mut resource_failed_rx) = mpsc::channel::<String>(1);
        let (errors_tx, mut errors_rx) = mpsc::channel::<TrackError>(1);

        let (pod_done_tx, mut pod_done_rx) = mpsc::channel::<String>(1);
        let (pod_status_tx, mut pod_status_rx) = mpsc::channel::<(String, PodStatus)>(1);
        let (rs_log_tx, mut rs_log_rx) = mpsc::channel::<PodLogChunk>(1000);
        let (rs_error_tx, mut rs_error_rx) = mpsc::channel::<PodError>(1);

        Informer::named(
            self.api.clone(),
            self.resource.full_name(),
            &self.resource.name,
            controller_tx,
            self.cancel.clone(),
        )
        .spawn(errors_tx.clone());

        let cancel = self.cancel.clone();
        let mut children_started = false;

        loop {
            tokio::select! {
                Some(item) = controller_rx.recv() => match item {
                    ObjectEvent::Added(object) => {
                        let uid = object.uid();
                        let observation = self.state.observe_controller(object);

                        let _ = self.status_tx.send(observation.status).await;
                        if observation.first_added {
                            tracing::debug!(resource = %self.resource.full_name(), ready = observation.initially_ready, "resource added");
                            let _ = self.added_tx.send(observation.initially_ready).await;
                        } else if observation.became_ready {
                            let _ = self.ready_tx.send(()).await;
                        }

                        if !children_started {
                            children_started = true;
                            self.start_children(
                                uid,
                                revisions_tx.clone(),
                                pods_tx.clone(),
                                resource_failed_tx.clone(),
                                errors_tx.clone(),
                            )?;
                        }
                    }
                    ObjectEvent::Modified(object) => {
                        let observation = self.state.observe_controller(object);
                        let _ = self.status_tx.send(observation.status).await;
                        if observation.became_ready {
                            tracing::debug!(resource = %self.resource.full_name(), "resource became ready");
                            let _ = self.ready_tx.send(()).await;
                        }
                    }
                    ObjectEvent::Deleted(_) => {
                        let status = self.state.observe_deleted();
                        let _ = self.status_tx.send(status).await;

                        match self.on_deleted {
                            DeletedPolicy::Fail => {
                                let _ = self.failed_tx.send("resource deleted".to_string()).await;
                            }
                            DeletedPolicy::Stop => {
                                tracing::debug!(resource = %self.resource.full_name(), "resource deleted; stopping");
                                return Ok(());
                            }
                        }
                    }
                },

                Some(reason) = resource_failed_rx.recv() => {
                    if let Some(status) = self.state.observe_failed(&reason) {
                        let _ = self.status_tx.send(status).await;
                    }
                    let _ = self.failed_tx.send(reason).await;
                },

                Some(item) = revisions_rx.recv() => match item {
                    ObjectEvent::Added(rs) => {
                        let revision = self.state.observe_revision_added(rs);
                        let _ = self.added_revision_tx.send(revision).await;
                    }
                    ObjectEvent::Modified(rs) => self.state.observe_revision_modified(rs),
                    ObjectEvent::Deleted(rs) => self.state.observe_revision_deleted(&rs.name_any()),
                },

                Some(item) = pods_rx.recv() => {
                    if let ObjectEvent::Added(pod) = item {
                        if let Some(pod_ref) = self.state.observe_pod_added(&pod) {
                            tracing::debug!(pod = %pod_ref.name, "pod added");
                            let _ = self.added_pod_tx.send(pod_ref.clone()).await;
                            self.spawn_pod_tracker(
                                pod_ref,
                                PodFanIn {
                                    log: rs_log_tx.clone(),
                                    error: rs_error_tx.clone(),
                                    event_msg: self.event_msg_tx.clone(),
                                    status: pod_status_tx.clone(),
                                    done: pod_done_tx.clone(),
                                    errors: errors_tx.clone(),
                                },
                            );
                        }
                    }
                },

                Some(name) = pod_done_rx.recv() => {
                    self.state.pod_done(&name);
                },

                Some((name, status)) = pod_status_rx.recv() => {
                    if let Some(report) = self.state.merge_pod_status(name, status) {
                        let _ = self.status_tx.send(report).await;
                    }
                },

                Some(mut chunk) = rs_log_rx.recv() => {
                    chunk.revision = self.state.refresh_revision(chunk.revision);
                    let _ = self.pod_log_tx.send(chunk).await;
                },

                Some(mut error) = rs_error_rx.recv() => {
                    error.revision = self.state.refresh_revision(error.revision);
                    let _ = self.pod_error_tx.send(error).await;
                },

                Some(err) = errors_rx.recv() => return Err(err),

                _ = cancel.cancelled() => return Err(TrackError::Interrupted),
            }
        }
    }

    /// Starts the informers that need the live controller object: revisions
    /// and pods (selector), events (uid).
    fn start_children(
        &self,
        uid: Option<String>,
        revisions_tx: mpsc::Sender<ObjectEvent<ReplicaSet>>,
        pods_tx: mpsc::Sender<ObjectEvent<Pod>>,
        resource_failed_tx: mpsc::Sender<String>,
        errors_tx: mpsc::Sender<TrackError>,
    ) -> TrackResult<()> {
        let selector = self
            .state
            .last_object
            .as_ref()
            .and_then(|o| o.pod_selector())
            .as_ref()
            .and_then(selector_string)
            .ok_or_else(|| {
                TrackError::Other(format!(
                    "{} has no pod selector",
                    self.resource.full_name()
                ))
            })?;

        if C::USES_REVISIONS {
            let rs_api: Api<ReplicaSet> =
                Api::namespaced(self.client.clone(), &self.resource.namespace);
            Informer::labeled(
                rs_api,
                format!("rs of {}", self.resource.full_name()),
                &selector,
                revisions_tx,
                self.cancel.clone(),
            )
            .spawn(errors_tx.clone());
        }

        let pods_api: Api<Pod> = Api::namespaced(self.client.clone(), &self.resource.namespace);
        Informer::labeled(
            pods_api,
            format!("po of {}", self.resource.full_name()),
            &selector,
            pods_tx,
            self.cancel.clone(),
        )
        .spawn(errors_tx.clone());

        EventsInformer::new(
            self.client.clone(),
            self.resource.clone(),
            uid,
            self.event_msg_tx.clone(),
            self.cancel.clone(),
        )
        .with_failed(resource_failed_tx)
        .with_classifier(self.classifier.clone())
        .spawn(errors_tx);

        Ok(())
    }

    /// One pod tracker plus one fan-in task per observed pod. The fan-in
    /// retags chunks and errors with the pod name and its revision (the
    /// loop re-stamps `is_new` on forward), prefixes event messages with
    /// `po/<name> `, and drains the lifecycle signals the controller
    /// re-derives itself.
    fn spawn_pod_tracker(&self, pod_ref: PodRef, fan_in: PodFanIn) {
        let (tracker, mut out) = PodTracker::new(
            self.client.clone(),
            &self.resource.namespace,
            &pod_ref.name,
            self.logs_from_time,
            self.cancel.clone(),
        );

        let (result_tx, mut result_rx) = oneshot::channel::<TrackResult<()>>();
        tokio::spawn(async move {
            let _ = result_tx.send(tracker.track().await);
        });

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let pod_name = pod_ref.name;
            let revision = pod_ref.revision;

            loop {
                // Biased with completion last: buffered pod output (the
                // final status report in particular) drains before the
                // done signal is taken.
                tokio::select! {
                    biased;

                    Some(error) = out.container_error.recv() => {
                        let _ = fan_in.error.send(PodError {
                            pod_name: pod_name.clone(),
                            revision: revision.clone(),
                            error,
                        }).await;
                    }
                    Some(msg) = out.event_msg.recv() => {
                        let _ = fan_in.event_msg.send(format!("po/{pod_name} {msg}")).await;
                    }
                    Some(status) = out.status_report.recv() => {
                        let _ = fan_in.status.send((pod_name.clone(), status)).await;
                    }
                    Some(_) = out.added.recv() => {}
                    Some(_) = out.ready.recv() => {}
                    Some(_) = out.succeeded.recv() => {}
                    Some(_) = out.failed.recv() => {}
                    Some(chunk) = out.log_chunk.recv() => {
                        let _ = fan_in.log.send(PodLogChunk {
                            pod_name: pod_name.clone(),
                            revision: revision.clone(),
                            chunk,
                        }).await;
                    }
                    result = &mut result_rx => {
                        match result {
                            Ok(Ok(())) => {
                                let _ = fan_in.done.send(pod_name.clone()).await;
                            }
                            Ok(Err(TrackError::Timeout)) if cancel.is_cancelled() => {}
                            Ok(Err(err)) => {
                                let _ = fan_in.errors.send(err).await;
                            }
                            Err(_) => {}
                        }
                        return;
                    }
                }
            }
        });
    }
}
