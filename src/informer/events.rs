use std::sync::Arc;

use k8s_openapi::api::core::v1::Event;
use kube::api::Api;
use kube::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::TrackError;
use crate::informer::{Informer, ObjectEvent};
use crate::types::ResourceRef;

/// Decides whether a cluster event means the tracked rollout has failed.
/// Returns the failure reason to report, or `None` for informational events.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, event: &Event) -> Option<String>;
}

/// Treats warning events with well-known fatal reasons as rollout failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFailureClassifier;

const FAILURE_REASONS: &[&str] = &["Failed", "FailedCreate", "FailedScheduling"];

impl FailureClassifier for DefaultFailureClassifier {
    fn classify(&self, event: &Event) -> Option<String> {
        if event.type_.as_deref() != Some("Warning") {
            return None;
        }
        let reason = event.reason.as_deref()?;
        if FAILURE_REASONS.contains(&reason) {
            Some(format_event(event))
        } else {
            None
        }
    }
}

pub fn format_event(event: &Event) -> String {
    let reason = event.reason.as_deref().unwrap_or("Unknown");
    let message = event.message.as_deref().unwrap_or("").trim_end();
    format!("{reason}: {message}")
}

/// Watches `core/v1 Event` objects for one involved object.
///
/// History present at startup only seeds the resource version; every event
/// observed afterwards is either classified as a failure (`failed` channel)
/// or forwarded as informational text (`messages` channel).
pub struct EventsInformer {
    client: Client,
    object: ResourceRef,
    uid: Option<String>,
    messages: mpsc::Sender<String>,
    failed: Option<mpsc::Sender<String>>,
    classifier: Arc<dyn FailureClassifier>,
    cancel: CancellationToken,
}

impl EventsInformer {
    pub fn new(
        client: Client,
        object: ResourceRef,
        uid: Option<String>,
        messages: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            object,
            uid,
            messages,
            failed: None,
            classifier: Arc::new(DefaultFailureClassifier),
            cancel,
        }
    }

    /// Route classified failures to a dedicated channel instead of the
    /// message stream.
    pub fn with_failed(mut self, failed: mpsc::Sender<String>) -> Self {
        self.failed = Some(failed);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn spawn(self, errors: mpsc::Sender<TrackError>) {
        let api: Api<Event> = Api::namespaced(self.client.clone(), &self.object.namespace);
        let selector = self.field_selector();
        let (tx, mut rx) = mpsc::channel::<ObjectEvent<Event>>(16);

        Informer::fields(
            api,
            format!("events for {}", self.object.full_name()),
            &selector,
            tx,
            self.cancel.clone(),
        )
        .skip_initial()
        .spawn(errors);

        let messages = self.messages;
        let failed = self.failed;
        let classifier = self.classifier;

        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let event = match item {
                    ObjectEvent::Added(event) | ObjectEvent::Modified(event) => event,
                    ObjectEvent::Deleted(_) => continue,
                };

                let sent = match (classifier.classify(&event), &failed) {
                    (Some(reason), Some(failed)) => failed.send(reason).await,
                    (Some(reason), None) => messages.send(reason).await,
                    (None, _) => messages.send(format_event(&event)).await,
                };
                if sent.is_err() {
                    return;
                }
            }
        });
    }

    fn field_selector(&self) -> String {
        let mut selector = format!(
            "involvedObject.name={},involvedObject.namespace={}",
            self.object.name, self.object.namespace
        );
        if let Some(uid) = &self.uid {
            selector.push_str(&format!(",involvedObject.uid={uid}"));
        }
        selector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(type_: &str, reason: &str, message: &str) -> Event {
        Event {
            type_: Some(type_.to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn warning_with_fatal_reason_is_failure() {
        let classified = DefaultFailureClassifier
            .classify(&event("Warning", "FailedCreate", "pods \"web-1\" is forbidden"));
        assert_eq!(
            classified.as_deref(),
            Some("FailedCreate: pods \"web-1\" is forbidden")
        );
    }

    #[test]
    fn normal_events_are_informational() {
        assert_eq!(
            DefaultFailureClassifier.classify(&event("Normal", "ScalingReplicaSet", "scaled up")),
            None
        );
    }

    #[test]
    fn warnings_with_other_reasons_pass_through() {
        assert_eq!(
            DefaultFailureClassifier.classify(&event("Warning", "Unhealthy", "probe failed")),
            None
        );
    }
}
