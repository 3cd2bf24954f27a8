use std::fmt::Debug;

use futures::TryStreamExt;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::errors::{TrackError, TrackResult};

/// Typed item delivered by an [`Informer`] on its sink channel.
#[derive(Clone, Debug)]
pub enum ObjectEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K> ObjectEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            ObjectEvent::Added(o) | ObjectEvent::Modified(o) | ObjectEvent::Deleted(o) => o,
        }
    }
}

enum Step {
    Watching,
    Relist,
    SinkClosed,
}

const RELIST_DELAY: Duration = Duration::from_secs(1);

/// List-then-watch loop bound to one kind of object.
///
/// Performs an initial list, records the returned resource version, then
/// watches from that version. Broken transports and expired resource
/// versions are healed in place by re-listing; consumers must tolerate
/// repeated `Added` items for objects they already know. Server `Error`
/// events and decode mismatches are fatal and surface on the `errors`
/// channel given to [`Informer::spawn`].
///
/// The sink is bounded: a stalled consumer stalls the watch instead of
/// dropping events.
pub struct Informer<K> {
    api: Api<K>,
    describe: String,
    list_params: ListParams,
    watch_params: WatchParams,
    seed_added: bool,
    tx: mpsc::Sender<ObjectEvent<K>>,
    cancel: CancellationToken,
}

impl<K> Informer<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Informer over the single object `metadata.name=<name>`.
    pub fn named(
        api: Api<K>,
        describe: impl Into<String>,
        name: &str,
        tx: mpsc::Sender<ObjectEvent<K>>,
        cancel: CancellationToken,
    ) -> Self {
        let fields = format!("metadata.name={name}");
        Self {
            api,
            describe: describe.into(),
            list_params: ListParams::default().fields(&fields),
            watch_params: WatchParams::default().fields(&fields).disable_bookmarks(),
            seed_added: true,
            tx,
            cancel,
        }
    }

    /// Informer over every object matching a label selector.
    pub fn labeled(
        api: Api<K>,
        describe: impl Into<String>,
        label_selector: &str,
        tx: mpsc::Sender<ObjectEvent<K>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            describe: describe.into(),
            list_params: ListParams::default().labels(label_selector),
            watch_params: WatchParams::default()
                .labels(label_selector)
                .disable_bookmarks(),
            seed_added: true,
            tx,
            cancel,
        }
    }

    /// Informer over every object matching a field selector.
    pub fn fields(
        api: Api<K>,
        describe: impl Into<String>,
        field_selector: &str,
        tx: mpsc::Sender<ObjectEvent<K>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            describe: describe.into(),
            list_params: ListParams::default().fields(field_selector),
            watch_params: WatchParams::default()
                .fields(field_selector)
                .disable_bookmarks(),
            seed_added: true,
            tx,
            cancel,
        }
    }

    /// Do not replay the initial list as `Added` items; the list only seeds
    /// the resource version. Used by the events informer, which must not
    /// re-deliver history predating the tracker.
    pub fn skip_initial(mut self) -> Self {
        self.seed_added = false;
        self
    }

    /// Runs the informer on its own task, reporting a fatal error (if any)
    /// on `errors`.
    pub fn spawn(self, errors: mpsc::Sender<TrackError>) {
        tokio::spawn(async move {
            let describe = self.describe.clone();
            match self.run().await {
                Ok(()) => tracing::debug!(informer = %describe, "informer done"),
                Err(err) => {
                    tracing::debug!(informer = %describe, error = %err, "informer failed");
                    let _ = errors.send(err).await;
                }
            }
        });
    }

    async fn run(self) -> TrackResult<()> {
        let api = self.api.clone();
        let watch_params = self.watch_params.clone();
        let mut first_cycle = true;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if !first_cycle {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(()),
                    _ = sleep(RELIST_DELAY) => {}
                }
            }
            first_cycle = false;

            let list = match api.list(&self.list_params).await {
                Ok(list) => list,
                Err(err) if is_transient(&err) => {
                    tracing::warn!(informer = %self.describe, error = %err, "list failed; retrying");
                    continue;
                }
                Err(err) => return Err(fatal(err)),
            };
            let mut version = list.metadata.resource_version.clone().unwrap_or_default();

            if self.seed_added {
                for object in list.items {
                    if self.send(ObjectEvent::Added(object)).await.is_err() {
                        return Ok(());
                    }
                }
            }

            // The watch stream borrows its request inputs; keep them in
            // locals distinct from the version bookkeeping.
            let from_version = version.clone();
            let stream = match api.watch(&watch_params, &from_version).await {
                Ok(s) => s,
                Err(err) if is_transient(&err) => {
                    tracing::warn!(informer = %self.describe, error = %err, "watch failed; re-listing");
                    continue;
                }
                Err(err) => return Err(fatal(err)),
            };
            futures::pin_mut!(stream);

            loop {
                let item = tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(()),
                    item = stream.try_next() => item,
                };

                match item {
                    Ok(Some(event)) => match self.handle(event, &mut version).await? {
                        Step::Watching => {}
                        Step::Relist => break,
                        Step::SinkClosed => return Ok(()),
                    },
                    Ok(None) => {
                        tracing::debug!(informer = %self.describe, "watch stream ended; re-listing");
                        break;
                    }
                    Err(err) if is_transient(&err) => {
                        tracing::warn!(informer = %self.describe, error = %err, "watch broken; re-listing");
                        break;
                    }
                    Err(err) => return Err(fatal(err)),
                }
            }
        }
    }

    async fn handle(&self, event: WatchEvent<K>, version: &mut String) -> TrackResult<Step> {
        let item = match event {
            WatchEvent::Added(object) => ObjectEvent::Added(object),
            WatchEvent::Modified(object) => ObjectEvent::Modified(object),
            WatchEvent::Deleted(object) => ObjectEvent::Deleted(object),
            WatchEvent::Bookmark(_) => return Ok(Step::Watching),
            WatchEvent::Error(response) if response.code == 410 => {
                tracing::debug!(informer = %self.describe, "resource version expired; re-listing");
                return Ok(Step::Relist);
            }
            WatchEvent::Error(response) => {
                return Err(TrackError::Watch(format!(
                    "{}: {} (reason {}, code {})",
                    self.describe, response.message, response.reason, response.code
                )));
            }
        };

        if let Some(rv) = item.object().resource_version() {
            *version = rv;
        }

        match self.send(item).await {
            Ok(()) => Ok(Step::Watching),
            Err(()) => Ok(Step::SinkClosed),
        }
    }

    async fn send(&self, item: ObjectEvent<K>) -> Result<(), ()> {
        // Receiver gone means the owning tracker returned; not an error.
        self.tx.send(item).await.map_err(|_| ())
    }
}

fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(response) => response.code == 429 || response.code >= 500,
        kube::Error::SerdeError(_) => false,
        _ => true,
    }
}

fn fatal(err: kube::Error) -> TrackError {
    match err {
        kube::Error::SerdeError(e) => TrackError::UnexpectedKind(e.to_string()),
        other => TrackError::Kube(other),
    }
}
