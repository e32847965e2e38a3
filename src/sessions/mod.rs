//! C9 — session store: lifecycle, statistics, checkpoint references.

use chrono::Utc;
use uuid::Uuid;

use crate::error::SessionError;
use crate::models::session::Checkpoint;
use crate::models::{Session, SessionStatus};
use crate::persistence::{InMemoryStore, Store};

pub struct SessionStore {
    sessions: InMemoryStore<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: InMemoryStore::new() }
    }

    pub async fn create(&self, session: Session) -> Session {
        self.sessions.put(session.session_id, session.clone()).await;
        session
    }

    /// Fetches the session if it exists, otherwise provisions one under
    /// the caller-supplied id. Lets a reasoning client start a chain
    /// against a session id it minted itself, without a separate
    /// session-creation round trip.
    pub async fn get_or_create(&self, id: Uuid, project_id: &str) -> Session {
        match self.get(id).await {
            Ok(session) => session,
            Err(_) => self.create(Session::builder().session_id(id).project_id(project_id.to_string()).build()).await,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        self.sessions.get(id).await.ok_or(SessionError::NotFound(id))
    }

    pub async fn list(&self) -> Vec<Session> {
        self.sessions.list().await
    }

    /// Merges `metadata`/`context`/`statistics` dot-wise; `lastActivity`
    /// is refreshed on every update regardless of which fields changed.
    /// Applied atomically against the store's entry lock so two concurrent
    /// updates for the same session (e.g. two `next_step_number` calls)
    /// can't both read the pre-update value and produce the same result.
    pub async fn update(&self, id: Uuid, mut patch: impl FnMut(&mut Session)) -> Result<Session, SessionError> {
        self.sessions
            .update(id, |s| {
                patch(s);
                s.touch();
            })
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn end(&self, id: Uuid, status: SessionStatus) -> Result<Session, SessionError> {
        self.update(id, |s| s.status = status).await
    }

    pub async fn checkpoint(&self, id: Uuid, data: serde_json::Value) -> Result<Checkpoint, SessionError> {
        let checkpoint = Checkpoint { id: Uuid::new_v4(), created_at: Utc::now(), data };
        self.update(id, |s| s.checkpoints.push(checkpoint.clone())).await?;
        Ok(checkpoint)
    }

    pub async fn list_checkpoints(&self, id: Uuid) -> Result<Vec<Checkpoint>, SessionError> {
        Ok(self.get(id).await?.checkpoints)
    }

    /// Restoration semantics (revert session metadata only vs. also
    /// revert the reasoning chain) are an open question in the source
    /// design and are deliberately left unimplemented here rather than
    /// guessed.
    pub async fn restore_checkpoint(&self, _id: Uuid, _checkpoint_id: Uuid) -> Result<(), SessionError> {
        Err(SessionError::RestoreUnsupported)
    }

    /// Atomically bumps `chain_length` and returns the step number the
    /// caller should assign to the new reasoning step. Used only by the
    /// reasoning store, which owns step ordering.
    pub(crate) async fn next_step_number(&self, id: Uuid) -> Result<u32, SessionError> {
        let session = self.update(id, |s| {
            s.chain_length += 1;
            s.statistics.reasoning_steps += 1;
        }).await?;
        Ok(session.chain_length)
    }

    pub(crate) async fn chain_length(&self, id: Uuid) -> Result<u32, SessionError> {
        Ok(self.get(id).await?.chain_length)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> Session {
        Session::builder().project_id("proj-1".to_string()).build()
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = SessionStore::new();
        let created = store.create(new_session()).await;
        let fetched = store.get(created.session_id).await.unwrap();
        assert_eq!(fetched.session_id, created.session_id);
    }

    #[tokio::test]
    async fn update_refreshes_last_activity() {
        let store = SessionStore::new();
        let created = store.create(new_session()).await;
        let before = created.statistics.last_activity;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = store.update(created.session_id, |s| s.context.git_branch = Some("main".to_string())).await.unwrap();
        assert!(updated.statistics.last_activity > before);
    }

    #[tokio::test]
    async fn get_or_create_provisions_a_missing_session_once() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        let first = store.get_or_create(id, "proj-1").await;
        assert_eq!(first.session_id, id);
        let second = store.get_or_create(id, "proj-1").await;
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn restore_checkpoint_is_unsupported() {
        let store = SessionStore::new();
        let created = store.create(new_session()).await;
        let result = store.restore_checkpoint(created.session_id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(SessionError::RestoreUnsupported)));
    }

    #[tokio::test]
    async fn next_step_number_increments_monotonically() {
        let store = SessionStore::new();
        let created = store.create(new_session()).await;
        assert_eq!(store.next_step_number(created.session_id).await.unwrap(), 1);
        assert_eq!(store.next_step_number(created.session_id).await.unwrap(), 2);
    }
}
