use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::Client;
use tokio::sync::oneshot;

use crate::controller::{ControllerOutputs, ControllerTracker, TrackedController};
use crate::errors::{FeedResult, Flow, TrackResult};
use crate::types::{
    ControllerStatus, FeedEvent, Options, PodError, PodLogChunk, PodRef, RevisionRef,
};

/// Consumer side of a controller tracker. Every callback defaults to a
/// no-op; implement the ones you care about. Returning [`Flow::Stop`] shuts
/// the tracker down cleanly; returning an error aborts with that error.
pub trait ControllerFeed {
    fn added(&mut self, _ready: bool) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn ready(&mut self) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn failed(&mut self, _reason: &str) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn event_msg(&mut self, _msg: &str) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn added_revision(&mut self, _revision: &RevisionRef) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn added_pod(&mut self, _pod: &PodRef) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn pod_log_chunk(&mut self, _chunk: &PodLogChunk) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn pod_error(&mut self, _error: &PodError) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn status_report(&mut self, _status: &ControllerStatus) -> FeedResult {
        Ok(Flow::Continue)
    }
}

/// Invokes the callback matching one feed event.
pub fn dispatch(feed: &mut dyn ControllerFeed, event: &FeedEvent) -> FeedResult {
    match event {
        FeedEvent::Added { ready } => feed.added(*ready),
        FeedEvent::Ready => feed.ready(),
        FeedEvent::Failed { reason } => feed.failed(reason),
        FeedEvent::EventMessage { message } => feed.event_msg(message),
        FeedEvent::AddedRevision(revision) => feed.added_revision(revision),
        FeedEvent::AddedPod(pod) => feed.added_pod(pod),
        FeedEvent::PodLogChunk(chunk) => feed.pod_log_chunk(chunk),
        FeedEvent::PodError(error) => feed.pod_error(error),
        FeedEvent::StatusReport(status) => feed.status_report(status),
    }
}

pub async fn track_deployment(
    name: &str,
    namespace: &str,
    client: Client,
    feed: &mut dyn ControllerFeed,
    opts: Options,
) -> TrackResult<()> {
    track_controller::<Deployment>(name, namespace, client, feed, opts).await
}

pub async fn track_statefulset(
    name: &str,
    namespace: &str,
    client: Client,
    feed: &mut dyn ControllerFeed,
    opts: Options,
) -> TrackResult<()> {
    track_controller::<StatefulSet>(name, namespace, client, feed, opts).await
}

pub async fn track_daemonset(
    name: &str,
    namespace: &str,
    client: Client,
    feed: &mut dyn ControllerFeed,
    opts: Options,
) -> TrackResult<()> {
    track_controller::<DaemonSet>(name, namespace, client, feed, opts).await
}

/// Tracks one controller rollout, invoking `feed` callbacks in feed order
/// until the consumer stops the track, an error surfaces, or the root
/// token is cancelled.
pub async fn track_controller<C: TrackedController>(
    name: &str,
    namespace: &str,
    client: Client,
    feed: &mut dyn ControllerFeed,
    opts: Options,
) -> TrackResult<()> {
    let cancel = super::root_token(&opts);
    let (tracker, mut out) = ControllerTracker::<C>::new(client, namespace, name, &opts, cancel.clone());

    let (result_tx, mut result_rx) = oneshot::channel::<TrackResult<()>>();
    tokio::spawn(async move {
        let _ = result_tx.send(tracker.track().await);
    });

    loop {
        // Biased so lifecycle events outrank the bursty channels: `added`
        // lands before `ready`/`failed`, `added_pod` before that pod's
        // errors and log chunks.
        let event = tokio::select! {
            biased;

            Some(ready) = out.added.recv() => FeedEvent::Added { ready },
            Some(()) = out.ready.recv() => FeedEvent::Ready,
            Some(reason) = out.failed.recv() => FeedEvent::Failed { reason },
            Some(message) = out.event_msg.recv() => FeedEvent::EventMessage { message },
            Some(revision) = out.added_revision.recv() => FeedEvent::AddedRevision(revision),
            Some(pod) = out.added_pod.recv() => FeedEvent::AddedPod(pod),
            Some(error) = out.pod_error.recv() => FeedEvent::PodError(error),
            Some(status) = out.status_report.recv() => FeedEvent::StatusReport(status),
            Some(chunk) = out.pod_log_chunk.recv() => FeedEvent::PodLogChunk(chunk),

            result = &mut result_rx => {
                cancel.cancel();
                return result.unwrap_or(Ok(()));
            }
        };

        match dispatch(feed, &event) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => {
                cancel.cancel();
                drain(out, result_rx).await;
                return Ok(());
            }
            Err(err) => {
                cancel.cancel();
                drain(out, result_rx).await;
                return Err(err);
            }
        }
    }
}

/// After a consumer-requested stop: keep the tracker's output channels
/// flowing (without invoking callbacks) so its loop can observe the
/// cancellation instead of blocking on a full channel.
async fn drain(mut out: ControllerOutputs, mut result_rx: oneshot::Receiver<TrackResult<()>>) {
    loop {
        tokio::select! {
            biased;

            Some(_) = out.added.recv() => {}
            Some(_) = out.ready.recv() => {}
            Some(_) = out.failed.recv() => {}
            Some(_) = out.event_msg.recv() => {}
            Some(_) = out.added_revision.recv() => {}
            Some(_) = out.added_pod.recv() => {}
            Some(_) = out.pod_error.recv() => {}
            Some(_) = out.status_report.recv() => {}
            Some(_) = out.pod_log_chunk.recv() => {}

            _ = &mut result_rx => return,
        }
    }
}
