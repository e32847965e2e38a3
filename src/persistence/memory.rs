use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::Store;

pub struct InMemoryStore<T> {
    items: DashMap<Uuid, T>,
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self { items: DashMap::new() }
    }
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Store<T> for InMemoryStore<T>
where
    T: Clone + Send + Sync,
{
    async fn get(&self, id: Uuid) -> Option<T> {
        self.items.get(&id).map(|e| e.clone())
    }

    async fn put(&self, id: Uuid, value: T) {
        self.items.insert(id, value);
    }

    async fn delete(&self, id: Uuid) -> Option<T> {
        self.items.remove(&id).map(|(_, v)| v)
    }

    async fn list(&self) -> Vec<T> {
        self.items.iter().map(|e| e.value().clone()).collect()
    }
}

impl<T: Clone> InMemoryStore<T> {
    /// Read-modify-write under the shard's entry lock, so two concurrent
    /// callers for the same `id` can't both observe the pre-patch value
    /// and clobber each other's write (as a separate `get` + `put` would).
    pub fn update(&self, id: Uuid, mut patch: impl FnMut(&mut T)) -> Option<T> {
        let mut entry = self.items.get_mut(&id)?;
        patch(&mut entry);
        Some(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store: InMemoryStore<String> = InMemoryStore::new();
        let id = Uuid::new_v4();
        store.put(id, "hello".to_string()).await;
        assert_eq!(store.get(id).await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store: InMemoryStore<u32> = InMemoryStore::new();
        let id = Uuid::new_v4();
        store.put(id, 7).await;
        assert_eq!(store.delete(id).await, Some(7));
        assert_eq!(store.get(id).await, None);
    }
}
