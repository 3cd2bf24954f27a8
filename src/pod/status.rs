use k8s_openapi::api::core::v1::{ContainerStatus, Pod};

use crate::types::{ContainerError, ContainerState, PodPhase, PodStatus};

/// Waiting reasons that are surfaced as per-pod errors while the rollout is
/// in flight.
const ERROR_REASONS: &[&str] = &["ImagePullBackOff", "ErrImagePull", "CrashLoopBackOff"];

pub fn pod_phase(pod: &Pod) -> PodPhase {
    match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    }
}

pub fn pod_is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// All container statuses of a pod, init containers first.
pub fn all_container_statuses(pod: &Pod) -> Vec<&ContainerStatus> {
    let status = match pod.status.as_ref() {
        Some(status) => status,
        None => return Vec::new(),
    };

    status
        .init_container_statuses
        .iter()
        .flatten()
        .chain(status.container_statuses.iter().flatten())
        .collect()
}

pub fn container_state(status: &ContainerStatus) -> ContainerState {
    let state = match status.state.as_ref() {
        Some(state) => state,
        None => return ContainerState::Initial,
    };

    if state.terminated.is_some() {
        ContainerState::Terminated
    } else if state.running.is_some() {
        ContainerState::Running
    } else if state.waiting.is_some() {
        ContainerState::Waiting
    } else {
        ContainerState::Initial
    }
}

/// Error to report for a waiting container, if its reason is one of the
/// image/back-off conditions.
pub fn waiting_error(status: &ContainerStatus) -> Option<ContainerError> {
    let waiting = status.state.as_ref()?.waiting.as_ref()?;
    let reason = waiting.reason.as_deref()?;

    if !ERROR_REASONS.contains(&reason) {
        return None;
    }

    Some(ContainerError {
        container_name: status.name.clone(),
        message: format!("{reason}: {}", waiting.message.as_deref().unwrap_or("")),
    })
}

/// Snapshot of a pod for status reports.
pub fn pod_status(pod: &Pod) -> PodStatus {
    let mut snapshot = PodStatus {
        phase: pod_phase(pod),
        ready: pod_is_ready(pod),
        ..Default::default()
    };

    for status in all_container_statuses(pod) {
        snapshot.restarts += status.restart_count;
        snapshot
            .container_states
            .insert(status.name.clone(), container_state(status));
    }

    snapshot.last_transition = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .filter_map(|c| c.last_transition_time.as_ref())
                .max_by(|a, b| a.0.cmp(&b.0))
                .cloned()
        });

    snapshot
}
