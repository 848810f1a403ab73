use futures::{Stream, StreamExt};
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    common::ResourceKey,
    state::{State, Stored, StorageError},
};

/// Folds one watch event into the state.
///
/// Objects listed during a (re)list are buffered and swapped in as a whole once the list is done, so objects
/// deleted while the watch was down disappear. The first completed list marks the kind as synced.
pub fn apply_event<K: Stored>(state: &State, buffer: &mut Vec<K>, event: watcher::Event<K>) -> Result<bool, StorageError> {
    match event {
        watcher::Event::Init => {
            buffer.clear();
            Ok(false)
        }
        watcher::Event::InitApply(object) => {
            buffer.push(object);
            Ok(false)
        }
        watcher::Event::InitDone => {
            let changed = state.replace(std::mem::take(buffer))?;
            state.mark_synced::<K>()?;
            Ok(changed)
        }
        watcher::Event::Apply(object) => state.apply(object),
        watcher::Event::Delete(object) => state.delete::<K>(&ResourceKey::from_resource(&object)),
    }
}

async fn run<K, S>(state: State, stream: S) -> crate::Result<()>
where
    K: Stored,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
{
    let kind = K::kind(&());
    info!("{kind} watcher started");
    let mut buffer = vec![];
    let mut stream = std::pin::pin!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                if apply_event(&state, &mut buffer, event)? {
                    debug!("{kind} changed");
                }
            }
            Err(e) => warn!("{kind} watcher error {e:?}"),
        }
    }
    info!("{kind} watcher stopped");
    Ok(())
}

/// Streams every object of one kind into the state.
pub async fn watch<K>(client: Client, state: State) -> crate::Result<()>
where
    K: Stored + DeserializeOwned + std::fmt::Debug,
{
    let api: Api<K> = Api::all(client);
    run(state, watcher(api, watcher::Config::default()).default_backoff()).await
}
