use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionCache, StoreError};

/// Process-local session cache.
#[derive(Default)]
pub struct InMemorySessionCache {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get_raw(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(user_id).cloned())
    }

    async fn set_raw(&self, user_id: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(user_id.to_string(), value);
        Ok(())
    }
}
