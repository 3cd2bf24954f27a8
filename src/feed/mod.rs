pub mod controller;
pub mod pod;

use tokio_util::sync::CancellationToken;

pub use controller::{
    dispatch, track_controller, track_daemonset, track_deployment, track_statefulset,
    ControllerFeed,
};
pub use pod::{track_pod, PodFeed};

use crate::types::Options;

/// Root token for one track invocation: child of the caller's token when
/// given, and armed with the optional timeout.
pub(crate) fn root_token(opts: &Options) -> CancellationToken {
    let token = opts
        .parent
        .as_ref()
        .map(|parent| parent.child_token())
        .unwrap_or_default();

    if let Some(timeout) = opts.timeout {
        let armed = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = armed.cancelled() => {}
                _ = tokio::time::sleep(timeout) => armed.cancel(),
            }
        });
    }

    token
}
