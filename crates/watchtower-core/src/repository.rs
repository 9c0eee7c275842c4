//! Repository abstraction with a concurrent in-memory implementation

use crate::error::{CoreError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Anything stored in a repository
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

/// CRUD access to a collection of entities
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert or replace an entity, keyed by its id
    fn save(&self, entity: T) -> Result<T>;

    fn get(&self, id: Uuid) -> Result<T>;

    fn list(&self) -> Vec<T>;

    /// Entities matching `predicate`
    fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T>;

    fn delete(&self, id: Uuid) -> Result<T>;

    fn count(&self) -> usize;

    fn clear(&self);
}

/// Thread-safe in-memory repository
#[derive(Debug)]
pub struct InMemoryRepository<T: Entity> {
    name: &'static str,
    entries: Arc<DashMap<Uuid, T>>,
}

impl<T: Entity> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Entity> InMemoryRepository<T> {
    /// `name` is used in not-found errors
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Apply `f` to the stored entity in place and return the updated copy
    pub fn update<F, R>(&self, id: Uuid, f: F) -> Result<(T, R)>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let mut entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| self.not_found(id))?;
        let out = f(entry.value_mut())?;
        Ok((entry.value().clone(), out))
    }

    fn not_found(&self, id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{} {}", self.name, id))
    }
}

impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    fn save(&self, entity: T) -> Result<T> {
        self.entries.insert(entity.id(), entity.clone());
        Ok(entity)
    }

    fn get(&self, id: Uuid) -> Result<T> {
        self.entries
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| self.not_found(id))
    }

    fn list(&self) -> Vec<T> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T> {
        self.entries
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    fn delete(&self, id: Uuid) -> Result<T> {
        self.entries
            .remove(&id)
            .map(|(_, v)| v)
            .ok_or_else(|| self.not_found(id))
    }

    fn count(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}
