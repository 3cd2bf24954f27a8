pub mod cli;
pub mod config;
pub mod container;
pub mod controller;
pub mod errors;
pub mod feed;
pub mod follow;
pub mod informer;
pub mod kube;
pub mod logging;
pub mod pod;
pub mod shutdown;
pub mod types;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, TargetKind};
use crate::errors::TrackResult;
use crate::types::Options;

pub use crate::errors::{FeedResult, Flow, TrackError};
pub use crate::feed::{
    track_daemonset, track_deployment, track_pod, track_statefulset, ControllerFeed, PodFeed,
};

pub async fn run(config: Config) -> TrackResult<()> {
    let client = crate::kube::client::make_client().await?;

    // One root token per invocation; signals cancel it and every tracker
    // task inherits the cancellation.
    let cancel = CancellationToken::new();
    shutdown::cancel_on_signal(cancel.clone());

    let opts = Options {
        timeout: config.timeout,
        logs_from_time: config
            .logs_since_now
            .then(chrono::Utc::now),
        parent: Some(cancel),
        on_deleted: config.on_deleted,
    };

    let namespace = config.namespace.clone();
    let output = config.output;

    match config.kind {
        TargetKind::Deployment => {
            follow::deployment(
                &config.name,
                &namespace,
                client,
                opts,
                output,
                config.stop_on_ready,
            )
            .await
        }
        TargetKind::StatefulSet => {
            follow::statefulset(
                &config.name,
                &namespace,
                client,
                opts,
                output,
                config.stop_on_ready,
            )
            .await
        }
        TargetKind::DaemonSet => {
            follow::daemonset(
                &config.name,
                &namespace,
                client,
                opts,
                output,
                config.stop_on_ready,
            )
            .await
        }
        TargetKind::Pod => follow::pod(&config.name, &namespace, client, opts, output).await,
    }
}
