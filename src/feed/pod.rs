use kube::Client;
use tokio::sync::oneshot;

use crate::errors::{FeedResult, Flow, TrackResult};
use crate::pod::{PodOutputs, PodTracker};
use crate::types::{ContainerError, ContainerLogChunk, Options, PodStatus};

/// Consumer side of a single-pod tracker; same contract as
/// [`ControllerFeed`](crate::feed::ControllerFeed).
pub trait PodFeed {
    fn added(&mut self) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn ready(&mut self) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn succeeded(&mut self) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn failed(&mut self) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn event_msg(&mut self, _msg: &str) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn container_log_chunk(&mut self, _chunk: &ContainerLogChunk) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn container_error(&mut self, _error: &ContainerError) -> FeedResult {
        Ok(Flow::Continue)
    }

    fn status_report(&mut self, _status: &PodStatus) -> FeedResult {
        Ok(Flow::Continue)
    }
}

/// Tracks one pod to completion, invoking `feed` callbacks in feed order.
pub async fn track_pod(
    name: &str,
    namespace: &str,
    client: Client,
    feed: &mut dyn PodFeed,
    opts: Options,
) -> TrackResult<()> {
    let cancel = super::root_token(&opts);
    let (tracker, mut out) = PodTracker::new(
        client,
        namespace,
        name,
        opts.logs_from_time,
        cancel.clone(),
    );

    let (result_tx, mut result_rx) = oneshot::channel::<TrackResult<()>>();
    tokio::spawn(async move {
        let _ = result_tx.send(tracker.track().await);
    });

    loop {
        let invoked = tokio::select! {
            biased;

            Some(()) = out.added.recv() => feed.added(),
            Some(()) = out.ready.recv() => feed.ready(),
            Some(()) = out.succeeded.recv() => feed.succeeded(),
            Some(()) = out.failed.recv() => feed.failed(),
            Some(msg) = out.event_msg.recv() => feed.event_msg(&msg),
            Some(error) = out.container_error.recv() => feed.container_error(&error),
            Some(status) = out.status_report.recv() => feed.status_report(&status),
            Some(chunk) = out.log_chunk.recv() => feed.container_log_chunk(&chunk),

            result = &mut result_rx => {
                cancel.cancel();
                return result.unwrap_or(Ok(()));
            }
        };

        match invoked {
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

async fn drain(mut out: PodOutputs, mut result_rx: oneshot::Receiver<TrackResult<()>>) {
    loop {
        tokio::select! {
            biased;

            Some(_) = out.added.recv() => {}
            Some(_) = out.ready.recv() => {}
            Some(_) = out.succeeded.recv() => {}
            Some(_) = out.failed.recv() => {}
            Some(_) = out.event_msg.recv() => {}
            Some(_) = out.container_error.recv() => {}
            Some(_) = out.status_report.recv() => {}
            Some(_) = out.log_chunk.recv() => {}

            _ = &mut result_rx => return,
        }
    }
}
