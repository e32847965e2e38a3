//! The document store is an external service boundary (per the system's
//! design, kept separate from the broker). This module defines the
//! narrow per-entity storage trait each component drives and ships an
//! in-memory implementation used for local development and tests; C7's
//! vector store is the one entity concretely backed by Postgres +
//! pgvector (see `crate::vector::postgres`), since it is the component
//! whose storage shape (a SQL table with a vector column) is most worth
//! grounding in a real query rather than a generic map.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

pub use memory::InMemoryStore;

#[async_trait]
pub trait Store<T>: Send + Sync
where
    T: Clone + Send + Sync,
{
    async fn get(&self, id: Uuid) -> Option<T>;
    async fn put(&self, id: Uuid, value: T);
    async fn delete(&self, id: Uuid) -> Option<T>;
    async fn list(&self) -> Vec<T>;
}
