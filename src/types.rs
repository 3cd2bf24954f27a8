use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Identity of a tracked cluster object.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ResourceRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Short form used in feed output, e.g. `deploy/my-app`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

/// One generation of pods under a controller (a ReplicaSet for deployments).
/// `is_new` is true iff the revision matches the controller's current
/// generation at the time the value was computed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RevisionRef {
    pub name: String,
    pub is_new: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PodRef {
    pub name: String,
    pub revision: Option<RevisionRef>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ContainerKind {
    Init,
    Main,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ContainerRef {
    pub pod: String,
    pub container: String,
    pub kind: ContainerKind,
}

/// Observed container lifecycle state. Monotonic except that `Terminated`
/// stays `Terminated`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum ContainerState {
    #[default]
    Initial,
    Waiting,
    Running,
    Terminated,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

/// Snapshot of one pod, as carried on status reports.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PodStatus {
    pub phase: PodPhase,
    pub ready: bool,
    pub restarts: i32,
    pub container_states: BTreeMap<String, ContainerState>,
    pub last_transition: Option<Time>,
}

/// One log line as framed by the log endpoint with `timestamps=true`:
/// everything up to the first space is the timestamp, the rest is payload.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: String,
    pub data: String,
}

/// Non-empty batch of log lines from one container.
#[derive(Clone, Debug, Serialize)]
pub struct ContainerLogChunk {
    pub container_name: String,
    pub lines: Vec<LogLine>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PodLogChunk {
    pub pod_name: String,
    pub revision: Option<RevisionRef>,
    #[serde(flatten)]
    pub chunk: ContainerLogChunk,
}

#[derive(Clone, Debug, Serialize)]
pub struct ContainerError {
    pub container_name: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PodError {
    pub pod_name: String,
    pub revision: Option<RevisionRef>,
    #[serde(flatten)]
    pub error: ContainerError,
}

/// Readiness summary for a controller at one point in time.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReadyStatus {
    pub is_ready: bool,
    pub message: String,
    pub revisions: Vec<RevisionCount>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RevisionCount {
    pub name: String,
    pub is_new: bool,
    pub desired: i32,
    pub ready: i32,
}

/// Aggregate status of a tracked controller. Emitted empty when the
/// controller resource disappears.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ControllerStatus {
    pub resource: String,
    pub desired_replicas: i32,
    pub ready: ReadyStatus,
    pub is_failed: bool,
    pub failed_reason: String,
    pub pods: BTreeMap<String, PodStatus>,
}

/// Everything a controller tracker can tell its consumer, as one tagged
/// union. The feed adapter reads tracker channels and dispatches these to
/// the consumer's callbacks in arrival order.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    Added { ready: bool },
    Ready,
    Failed { reason: String },
    EventMessage { message: String },
    AddedRevision(RevisionRef),
    AddedPod(PodRef),
    PodLogChunk(PodLogChunk),
    PodError(PodError),
    StatusReport(ControllerStatus),
}

/// What to do when the tracked controller resource is deleted mid-rollout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DeletedPolicy {
    /// Emit `Failed("resource deleted")` and keep tracking.
    #[default]
    Fail,
    /// Emit an empty status report and stop cleanly.
    Stop,
}

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Cancel the whole track invocation after this long.
    pub timeout: Option<Duration>,
    /// Forwarded to pod trackers as `since_time` on log requests.
    pub logs_from_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Child trackers are cancelled when this token fires.
    pub parent: Option<CancellationToken>,
    pub on_deleted: DeletedPolicy,
}
