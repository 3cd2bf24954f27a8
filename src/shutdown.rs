use tokio_util::sync::CancellationToken;

/// Cancels the token on SIGINT, and on SIGTERM where available. Trackers
/// parented on the token wind down and their track calls return
/// `TrackError::Interrupted`.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let interrupt = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = interrupt => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = interrupt.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = interrupt.await;
        }

        tracing::info!("interrupt received; stopping");
        token.cancel();
    });
}
