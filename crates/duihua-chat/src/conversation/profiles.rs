//! Counterpart profile cache shared by every list subscription of an index.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::UserProfile;

#[derive(Clone, Default)]
pub struct ProfileCache {
    profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.read().await.get(user_id).cloned()
    }

    pub async fn insert(&self, user_id: &str, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(user_id.to_string(), profile);
    }

    /// Cached profiles for the given ids; ids not yet cached are skipped.
    pub async fn get_many<'a, I>(&self, user_ids: I) -> HashMap<String, UserProfile>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let profiles = self.profiles.read().await;
        user_ids
            .into_iter()
            .filter_map(|id| profiles.get(id).map(|p| (id.to_string(), p.clone())))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}
