//! Ready-made feeds that narrate a rollout to stdout, used by the CLI.

pub mod format;

use std::io::{self, Write};

use kube::Client;
use serde_json::json;

use crate::errors::{FeedResult, Flow, TrackResult};
use crate::feed::{self, ControllerFeed, PodFeed};
use crate::follow::format::LineFormatter;
use crate::types::{
    ContainerError, ContainerLogChunk, ControllerStatus, FeedEvent, Options, PodError,
    PodLogChunk, PodRef, PodStatus, RevisionRef,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct OutputConfig {
    /// Emit newline-delimited JSON feed events instead of narration.
    pub json: bool,
    pub color: bool,
    /// Prefix log lines with their kubelet timestamps.
    pub timestamps: bool,
}

pub async fn deployment(
    name: &str,
    namespace: &str,
    client: Client,
    opts: Options,
    output: OutputConfig,
    stop_on_ready: bool,
) -> TrackResult<()> {
    let mut feed = FollowFeed::new(format!("deploy/{name}"), output, stop_on_ready);
    feed::track_deployment(name, namespace, client, &mut feed, opts).await
}

pub async fn statefulset(
    name: &str,
    namespace: &str,
    client: Client,
    opts: Options,
    output: OutputConfig,
    stop_on_ready: bool,
) -> TrackResult<()> {
    let mut feed = FollowFeed::new(format!("sts/{name}"), output, stop_on_ready);
    feed::track_statefulset(name, namespace, client, &mut feed, opts).await
}

pub async fn daemonset(
    name: &str,
    namespace: &str,
    client: Client,
    opts: Options,
    output: OutputConfig,
    stop_on_ready: bool,
) -> TrackResult<()> {
    let mut feed = FollowFeed::new(format!("ds/{name}"), output, stop_on_ready);
    feed::track_daemonset(name, namespace, client, &mut feed, opts).await
}

pub async fn pod(
    name: &str,
    namespace: &str,
    client: Client,
    opts: Options,
    output: OutputConfig,
) -> TrackResult<()> {
    let mut feed = PodFollowFeed {
        name: name.to_string(),
        formatter: LineFormatter::new(format!("po/{name}"), output.color, output.timestamps),
        output,
    };
    feed::track_pod(name, namespace, client, &mut feed, opts).await
}

/// Prints controller feed events as narration or NDJSON.
pub struct FollowFeed {
    formatter: LineFormatter,
    output: OutputConfig,
    stop_on_ready: bool,
    last_status_message: String,
}

impl FollowFeed {
    pub fn new(resource: String, output: OutputConfig, stop_on_ready: bool) -> Self {
        Self {
            formatter: LineFormatter::new(resource, output.color, output.timestamps),
            output,
            stop_on_ready,
            last_status_message: String::new(),
        }
    }

    fn emit_json(&self, event: &FeedEvent) -> FeedResult {
        let mut out = io::stdout().lock();
        serde_json::to_writer(&mut out, event)?;
        finish_line(&mut out)
    }

    fn print(&self, line: &str) -> FeedResult {
        let mut out = io::stdout().lock();
        if let Err(err) = out.write_all(line.as_bytes()) {
            return write_error(err);
        }
        finish_line(&mut out)
    }
}

fn finish_line(out: &mut impl Write) -> FeedResult {
    if let Err(err) = out.write_all(b"\n").and_then(|()| out.flush()) {
        return write_error(err);
    }
    Ok(Flow::Continue)
}

// Downstream going away (e.g. `kube-rollout ... | head`) is a clean stop.
fn write_error(err: io::Error) -> FeedResult {
    if err.kind() == io::ErrorKind::BrokenPipe {
        Ok(Flow::Stop)
    } else {
        Err(err.into())
    }
}

impl ControllerFeed for FollowFeed {
    fn added(&mut self, ready: bool) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::Added { ready });
        }
        let text = if ready { "appears to be ready" } else { "added" };
        self.print(&self.formatter.narrate(text))
    }

    fn ready(&mut self) -> FeedResult {
        let flow = if self.output.json {
            self.emit_json(&FeedEvent::Ready)?
        } else {
            self.print(&self.formatter.narrate("become READY"))?
        };

        if self.stop_on_ready {
            return Ok(Flow::Stop);
        }
        Ok(flow)
    }

    fn failed(&mut self, reason: &str) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::Failed {
                reason: reason.to_string(),
            });
        }
        self.print(&self.formatter.narrate(&format!("FAIL: {reason}")))
    }

    fn event_msg(&mut self, msg: &str) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::EventMessage {
                message: msg.to_string(),
            });
        }
        self.print(&self.formatter.narrate(&format!("event: {msg}")))
    }

    fn added_revision(&mut self, revision: &RevisionRef) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::AddedRevision(revision.clone()));
        }
        let suffix = if revision.is_new { " (new)" } else { "" };
        self.print(
            &self
                .formatter
                .narrate(&format!("rs/{}{} added", revision.name, suffix)),
        )
    }

    fn added_pod(&mut self, pod: &PodRef) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::AddedPod(pod.clone()));
        }
        self.print(&self.formatter.narrate_pod(&pod.name, "added"))
    }

    fn pod_log_chunk(&mut self, chunk: &PodLogChunk) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::PodLogChunk(chunk.clone()));
        }
        for line in &chunk.chunk.lines {
            match self.print(&self.formatter.log_line(
                &chunk.pod_name,
                &chunk.chunk.container_name,
                &line.timestamp,
                &line.data,
            ))? {
                Flow::Continue => {}
                Flow::Stop => return Ok(Flow::Stop),
            }
        }
        Ok(Flow::Continue)
    }

    fn pod_error(&mut self, error: &PodError) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::PodError(error.clone()));
        }
        self.print(&self.formatter.narrate_pod(
            &error.pod_name,
            &format!("{} error: {}", error.error.container_name, error.error.message),
        ))
    }

    fn status_report(&mut self, status: &ControllerStatus) -> FeedResult {
        if self.output.json {
            return self.emit_json(&FeedEvent::StatusReport(status.clone()));
        }
        // Narrate progress only when it changes, the reports themselves are
        // far too chatty for a terminal.
        if status.ready.message.is_empty() || status.ready.message == self.last_status_message {
            return Ok(Flow::Continue);
        }
        self.last_status_message = status.ready.message.clone();
        self.print(&self.formatter.narrate(&format!("status: {}", status.ready.message)))
    }
}

/// Prints single-pod feed events as narration or NDJSON.
pub struct PodFollowFeed {
    name: String,
    formatter: LineFormatter,
    output: OutputConfig,
}

impl PodFollowFeed {
    fn emit_json(&self, value: serde_json::Value) -> FeedResult {
        let mut out = io::stdout().lock();
        serde_json::to_writer(&mut out, &value)?;
        finish_line(&mut out)
    }

    fn narrate(&self, text: &str) -> FeedResult {
        if self.output.json {
            return self.emit_json(json!({"event": text, "pod": self.name.clone()}));
        }
        let line = self.formatter.narrate(text);
        let mut out = io::stdout().lock();
        if let Err(err) = out.write_all(line.as_bytes()) {
            return write_error(err);
        }
        finish_line(&mut out)
    }
}

impl PodFeed for PodFollowFeed {
    fn added(&mut self) -> FeedResult {
        self.narrate("added")
    }

    fn ready(&mut self) -> FeedResult {
        self.narrate("become READY")
    }

    fn succeeded(&mut self) -> FeedResult {
        self.narrate("SUCCEEDED")
    }

    fn failed(&mut self) -> FeedResult {
        self.narrate("FAILED")
    }

    fn event_msg(&mut self, msg: &str) -> FeedResult {
        self.narrate(&format!("event: {msg}"))
    }

    fn container_log_chunk(&mut self, chunk: &ContainerLogChunk) -> FeedResult {
        if self.output.json {
            return self.emit_json(json!({
                "event": "log_chunk",
                "pod": self.name.clone(),
                "container": chunk.container_name.clone(),
                "lines": chunk.lines.clone(),
            }));
        }
        for line in &chunk.lines {
            let rendered = self.formatter.log_line(
                &self.name,
                &chunk.container_name,
                &line.timestamp,
                &line.data,
            );
            let mut out = io::stdout().lock();
            if let Err(err) = out.write_all(rendered.as_bytes()) {
                return write_error(err);
            }
            match finish_line(&mut out)? {
                Flow::Continue => {}
                Flow::Stop => return Ok(Flow::Stop),
            }
        }
        Ok(Flow::Continue)
    }

    fn container_error(&mut self, error: &ContainerError) -> FeedResult {
        self.narrate(&format!(
            "{} error: {}",
            error.container_name, error.message
        ))
    }

    fn status_report(&mut self, _status: &PodStatus) -> FeedResult {
        Ok(Flow::Continue)
    }
}
