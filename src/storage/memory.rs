//! Process-local entity store.
//!
//! Keeps entities in insertion order and enforces identifier uniqueness the
//! way a primary key would. Fault toggles let tests drive the storage error
//! paths without a database.

use tokio::sync::RwLock;
use uuid::Uuid;

use async_trait::async_trait;

use super::{EntityStore, Result, StorageError};
use crate::entities::FormEntity;

pub struct MemoryStore<E> {
    entities: RwLock<Vec<E>>,
    fail_on_create: RwLock<bool>,
    fail_on_list: RwLock<bool>,
}

impl<E> Default for MemoryStore<E> {
    fn default() -> Self {
        Self {
            entities: RwLock::new(Vec::new()),
            fail_on_create: RwLock::new(false),
            fail_on_list: RwLock::new(false),
        }
    }
}

impl<E: FormEntity> MemoryStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        *self.fail_on_create.write().await = fail;
    }

    pub async fn set_fail_on_list(&self, fail: bool) {
        *self.fail_on_list.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl<E: FormEntity> EntityStore<E> for MemoryStore<E> {
    async fn create(&self, entity: E) -> Result<()> {
        if *self.fail_on_create.read().await {
            return Err(StorageError::Unexpected("store unavailable".to_string()));
        }

        let mut entities = self.entities.write().await;
        if entities.iter().any(|e| e.id() == entity.id()) {
            return Err(StorageError::Integrity(format!(
                "duplicate primary key {}",
                entity.id()
            )));
        }
        entities.push(entity);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<E>> {
        if *self.fail_on_list.read().await {
            return Err(StorageError::Unexpected("store unavailable".to_string()));
        }
        Ok(self.entities.read().await.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<E> {
        self.entities
            .read()
            .await
            .iter()
            .find(|e| e.id() == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }
}
