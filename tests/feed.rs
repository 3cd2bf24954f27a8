use kube_rollout::errors::{FeedResult, Flow};
use kube_rollout::feed::{dispatch, ControllerFeed};
use kube_rollout::types::{
    ContainerError, ContainerLogChunk, ControllerStatus, FeedEvent, LogLine, PodError,
    PodLogChunk, PodRef, RevisionRef,
};

#[derive(Default)]
struct RecordingFeed {
    seen: Vec<String>,
    stop_on_ready: bool,
}

impl ControllerFeed for RecordingFeed {
    fn added(&mut self, ready: bool) -> FeedResult {
        self.seen.push(format!("added({ready})"));
        Ok(Flow::Continue)
    }

    fn ready(&mut self) -> FeedResult {
        self.seen.push("ready".to_string());
        if self.stop_on_ready {
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    fn failed(&mut self, reason: &str) -> FeedResult {
        self.seen.push(format!("failed({reason})"));
        Ok(Flow::Continue)
    }

    fn event_msg(&mut self, msg: &str) -> FeedResult {
        self.seen.push(format!("event({msg})"));
        Ok(Flow::Continue)
    }

    fn added_revision(&mut self, revision: &RevisionRef) -> FeedResult {
        self.seen
            .push(format!("revision({}, new={})", revision.name, revision.is_new));
        Ok(Flow::Continue)
    }

    fn added_pod(&mut self, pod: &PodRef) -> FeedResult {
        self.seen.push(format!("pod({})", pod.name));
        Ok(Flow::Continue)
    }

    fn pod_log_chunk(&mut self, chunk: &PodLogChunk) -> FeedResult {
        self.seen.push(format!(
            "log({}/{}, {} lines)",
            chunk.pod_name,
            chunk.chunk.container_name,
            chunk.chunk.lines.len()
        ));
        Ok(Flow::Continue)
    }

    fn pod_error(&mut self, error: &PodError) -> FeedResult {
        self.seen
            .push(format!("pod_error({}: {})", error.pod_name, error.error.message));
        Ok(Flow::Continue)
    }

    fn status_report(&mut self, _status: &ControllerStatus) -> FeedResult {
        self.seen.push("status".to_string());
        Ok(Flow::Continue)
    }
}

fn happy_rollout_events() -> Vec<FeedEvent> {
    vec![
        FeedEvent::Added { ready: false },
        FeedEvent::AddedRevision(RevisionRef {
            name: "web-a".to_string(),
            is_new: true,
        }),
        FeedEvent::AddedPod(PodRef {
            name: "web-a-1".to_string(),
            revision: Some(RevisionRef {
                name: "web-a".to_string(),
                is_new: true,
            }),
        }),
        FeedEvent::PodLogChunk(PodLogChunk {
            pod_name: "web-a-1".to_string(),
            revision: None,
            chunk: ContainerLogChunk {
                container_name: "app".to_string(),
                lines: vec![LogLine {
                    timestamp: "2024-01-01T00:00:00Z".to_string(),
                    data: "listening".to_string(),
                }],
            },
        }),
        FeedEvent::StatusReport(ControllerStatus::default()),
        FeedEvent::Ready,
    ]
}

#[test]
fn dispatch_routes_every_event_to_its_callback() {
    let mut feed = RecordingFeed::default();

    for event in happy_rollout_events() {
        assert_eq!(dispatch(&mut feed, &event).unwrap(), Flow::Continue);
    }

    assert_eq!(
        feed.seen,
        vec![
            "added(false)",
            "revision(web-a, new=true)",
            "pod(web-a-1)",
            "log(web-a-1/app, 1 lines)",
            "status",
            "ready",
        ]
    );
}

#[test]
fn stop_from_a_callback_flows_back_to_the_adapter() {
    let mut feed = RecordingFeed {
        stop_on_ready: true,
        ..Default::default()
    };

    assert_eq!(dispatch(&mut feed, &FeedEvent::Ready).unwrap(), Flow::Stop);
}

#[test]
fn unimplemented_callbacks_default_to_continue() {
    struct Silent;
    impl ControllerFeed for Silent {}

    let mut feed = Silent;
    for event in happy_rollout_events() {
        assert_eq!(dispatch(&mut feed, &event).unwrap(), Flow::Continue);
    }
}

#[test]
fn feed_events_serialize_as_tagged_ndjson_objects() {
    let added = serde_json::to_value(FeedEvent::Added { ready: false }).unwrap();
    assert_eq!(added["event"], "added");
    assert_eq!(added["ready"], false);

    let failed = serde_json::to_value(FeedEvent::Failed {
        reason: "resource deleted".to_string(),
    })
    .unwrap();
    assert_eq!(failed["event"], "failed");
    assert_eq!(failed["reason"], "resource deleted");

    let chunk = serde_json::to_value(FeedEvent::PodLogChunk(PodLogChunk {
        pod_name: "web-a-1".to_string(),
        revision: Some(RevisionRef {
            name: "web-a".to_string(),
            is_new: true,
        }),
        chunk: ContainerLogChunk {
            container_name: "app".to_string(),
            lines: vec![LogLine {
                timestamp: "2024-01-01T00:00:00Z".to_string(),
                data: "listening".to_string(),
            }],
        },
    }))
    .unwrap();
    assert_eq!(chunk["event"], "pod_log_chunk");
    assert_eq!(chunk["pod_name"], "web-a-1");
    assert_eq!(chunk["container_name"], "app");
    assert_eq!(chunk["lines"][0]["data"], "listening");

    let error = serde_json::to_value(FeedEvent::PodError(PodError {
        pod_name: "web-a-1".to_string(),
        revision: None,
        error: ContainerError {
            container_name: "app".to_string(),
            message: "ImagePullBackOff: back-off".to_string(),
        },
    }))
    .unwrap();
    assert_eq!(error["event"], "pod_error");
    assert_eq!(error["message"], "ImagePullBackOff: back-off");
}
