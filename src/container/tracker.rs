use futures::AsyncReadExt;
use k8s_openapi::api::core::v1::Pod;
use chrono::{DateTime, Utc};
use kube::api::{Api, LogParams};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

use crate::container::LineSplitter;
use crate::errors::{TrackError, TrackResult};
use crate::types::{ContainerLogChunk, ContainerRef, ContainerState};

const STATE_POLL: Duration = Duration::from_millis(200);
const READ_BUF: usize = 64 * 1024;

/// Tracks one container of one pod.
///
/// Polls the container state fed by the pod tracker until the container has
/// started (or already finished), then follows its log to EOF. The log is
/// streamed at most once per tracker; restarts are left to the log endpoint
/// (`follow=true` keeps the server side attached).
pub struct ContainerTracker {
    container: ContainerRef,
    api: Api<Pod>,
    state: watch::Receiver<ContainerState>,
    logs: mpsc::Sender<ContainerLogChunk>,
    logs_from_time: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl ContainerTracker {
    pub fn new(
        container: ContainerRef,
        api: Api<Pod>,
        state: watch::Receiver<ContainerState>,
        logs: mpsc::Sender<ContainerLogChunk>,
        logs_from_time: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            container,
            api,
            state,
            logs,
            logs_from_time,
            cancel,
        }
    }

    pub async fn track(self) -> TrackResult<()> {
        let mut tick = interval(STATE_POLL);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TrackError::Timeout),
                _ = tick.tick() => {}
            }

            let state = *self.state.borrow();
            match state {
                ContainerState::Running | ContainerState::Terminated => {
                    return self.follow_logs().await;
                }
                ContainerState::Initial | ContainerState::Waiting => {}
            }
        }
    }

    async fn follow_logs(self) -> TrackResult<()> {
        tracing::debug!(
            pod = %self.container.pod,
            container = %self.container.container,
            "following container log"
        );

        let params = LogParams {
            container: Some(self.container.container.clone()),
            follow: true,
            timestamps: true,
            since_time: self.logs_from_time,
            ..Default::default()
        };

        let reader = self.api.log_stream(&self.container.pod, &params).await?;
        futures::pin_mut!(reader);

        let mut splitter = LineSplitter::new();
        let mut buf = vec![0u8; READ_BUF];

        loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => return Err(TrackError::Timeout),
                read = reader.read(&mut buf) => read?,
            };

            if n == 0 {
                // EOF: an unterminated trailing line is dropped, matching the
                // framing rule.
                return Ok(());
            }

            let lines = splitter.push(&buf[..n]);
            if lines.is_empty() {
                continue;
            }

            let chunk = ContainerLogChunk {
                container_name: self.container.container.clone(),
                lines,
            };
            if self.logs.send(chunk).await.is_err() {
                return Ok(());
            }
        }
    }
}
