//! Remote sync adapter.
//!
//! Bridges the remote state source and the store's reactive slices:
//!   - `subscribe_all` registers one watch per collection,
//!   - `load_collection` fetches a snapshot and heals a missing top-level field
//!     (the healed snapshot is written back),
//!   - `spawn_consumer` drains one subscription on a background task and hands
//!     each pushed snapshot to the store.
//!
//! Watches are registered before the initial load, so a change landing between
//! the two is buffered rather than lost.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::error::{StoreError, StoreResult};
use crate::remote::{RemoteStateSource, Subscription};
use crate::repo::{decode_snapshot, Collection, DecodedSnapshot, Entity};
use crate::store::Store;

/// Opens a subscription for every collection.
pub async fn subscribe_all(remote: &dyn RemoteStateSource) -> StoreResult<Vec<(Collection, Subscription)>> {
  let mut subs = Vec::with_capacity(Collection::ALL.len());
  for collection in Collection::ALL {
    subs.push((collection, remote.watch(collection.key()).await?));
  }
  Ok(subs)
}

/// Loads the records of `T`'s collection from the remote. When the snapshot
/// had to be healed, `healed` carries the value written back so the caller can
/// recognize its echo.
#[instrument(level = "info", skip(remote), fields(key = T::COLLECTION.key()))]
pub async fn load_collection<T: Entity>(remote: &dyn RemoteStateSource) -> StoreResult<DecodedSnapshot<T>> {
  let collection = T::COLLECTION;
  let raw = remote.load(collection.key()).await?;
  let decoded = decode_snapshot::<T>(raw)
    .map_err(|reason| StoreError::MalformedSnapshot { collection, reason })?;

  if let Some(healed) = &decoded.healed {
    info!(target: "sync", key = collection.key(), field = collection.field(), "Snapshot missing top-level field; initialized empty");
    remote.save(collection.key(), healed.clone()).await?;
  }
  info!(target: "sync", key = collection.key(), records = decoded.records.len(), "Collection loaded");
  Ok(decoded)
}

/// Background consumer of one collection's pushes. Cancelled on drop.
#[derive(Debug)]
pub struct WatchGuard {
  collection: Collection,
  task: JoinHandle<()>,
}

impl WatchGuard {
  pub fn collection(&self) -> Collection { self.collection }

  pub fn cancel(&self) {
    self.task.abort();
  }
}

impl Drop for WatchGuard {
  fn drop(&mut self) {
    self.task.abort();
  }
}

/// Feeds pushed snapshots of `collection` into `store`, one at a time and in
/// delivery order. Holds only a weak handle so the store can be dropped.
pub fn spawn_consumer(store: &Arc<Store>, collection: Collection, mut sub: Subscription) -> WatchGuard {
  let weak: Weak<Store> = Arc::downgrade(store);
  let task = tokio::spawn(async move {
    while let Some(snapshot) = sub.recv().await {
      let Some(store) = weak.upgrade() else { break };
      store.apply_remote(collection, snapshot).await;
    }
    debug!(target: "sync", key = sub.key(), "Watch consumer finished");
  });
  WatchGuard { collection, task }
}
