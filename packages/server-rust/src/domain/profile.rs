//! Profile repository boundary and its memoized read path.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use profile_core::{CreateProfile, Profile};
use uuid::Uuid;

use crate::cache::MemoizingExecutor;

/// Persistence for profiles. `user_uuid` is unique across profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_by_user_uuid(&self, user_uuid: &str) -> anyhow::Result<Option<Profile>>;

    async fn get(&self, uuid: Uuid) -> anyhow::Result<Option<Profile>>;

    /// Inserts a new profile with a fresh primary key.
    async fn create(&self, cmd: CreateProfile) -> anyhow::Result<Profile>;

    /// Replaces every field of an existing profile, keeping its key.
    async fn update(&self, uuid: Uuid, cmd: CreateProfile) -> anyhow::Result<Profile>;

    /// Removes a profile. Returns whether it existed.
    async fn delete(&self, uuid: Uuid) -> anyhow::Result<bool>;
}

/// In-memory [`ProfileStore`].
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<Uuid, Profile>,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn find_by_user(&self, user_uuid: &str) -> Option<Profile> {
        self.profiles
            .iter()
            .find(|entry| entry.user_uuid == user_uuid)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_by_user_uuid(&self, user_uuid: &str) -> anyhow::Result<Option<Profile>> {
        Ok(self.find_by_user(user_uuid))
    }

    async fn get(&self, uuid: Uuid) -> anyhow::Result<Option<Profile>> {
        Ok(self.profiles.get(&uuid).map(|p| p.clone()))
    }

    async fn create(&self, cmd: CreateProfile) -> anyhow::Result<Profile> {
        if self.find_by_user(&cmd.user_uuid).is_some() {
            anyhow::bail!("profile for user {} already exists", cmd.user_uuid);
        }
        let profile = Profile::from_create(cmd);
        self.profiles.insert(profile.uuid, profile.clone());
        Ok(profile)
    }

    async fn update(&self, uuid: Uuid, cmd: CreateProfile) -> anyhow::Result<Profile> {
        let Some(mut entry) = self.profiles.get_mut(&uuid) else {
            anyhow::bail!("profile {uuid} does not exist");
        };
        let file_uuid = entry.file_uuid.take();
        *entry = Profile {
            file_uuid,
            ..Profile::with_uuid(uuid, cmd)
        };
        Ok(entry.clone())
    }

    async fn delete(&self, uuid: Uuid) -> anyhow::Result<bool> {
        Ok(self.profiles.remove(&uuid).is_some())
    }
}

/// Serves profile reads through the memoizing executor.
///
/// Results, including "not found", stay cached for the executor's TTL;
/// writes through the underlying store are not reflected until then.
pub struct CachedProfileReader {
    store: Arc<dyn ProfileStore>,
    executor: MemoizingExecutor,
}

impl CachedProfileReader {
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>, executor: MemoizingExecutor) -> Self {
        Self { store, executor }
    }

    /// # Errors
    ///
    /// Returns the store's error on a cache miss. Cache failures never
    /// surface.
    pub async fn get_by_user_uuid(&self, user_uuid: &str) -> anyhow::Result<Option<Profile>> {
        self.executor
            .cached("profile::get_by_user_uuid", &(user_uuid,), || {
                self.store.get_by_user_uuid(user_uuid)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns the store's error on a cache miss.
    pub async fn get(&self, uuid: Uuid) -> anyhow::Result<Option<Profile>> {
        self.executor
            .cached("profile::get", &(uuid,), || self.store.get(uuid))
            .await
    }
}
