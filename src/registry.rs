//! In-memory directory of live sessions.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::gateway::SandboxGateway;
use crate::language::Language;
use crate::session::Session;

/// Summary of a live session for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub language: Option<Language>,
    pub age_secs: u64,
}

/// Concurrency-safe map from session id to [`Session`].
///
/// The map lock is held only for single lookups, inserts and removals,
/// never across a gateway call.
pub struct SessionRegistry {
    gateway: Arc<dyn SandboxGateway>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(gateway: Arc<dyn SandboxGateway>) -> Self {
        Self {
            gateway,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session registered under `session_id`, or provision a new
    /// one for `language`.
    ///
    /// An existing session is returned as is; `language` is not checked
    /// against it.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        language: &str,
    ) -> Result<(Arc<Session>, String)> {
        if let Some(id) = session_id {
            if let Some(session) = self.sessions.read().await.get(id) {
                if session.language().map(|l| l.as_str()) != Some(language) {
                    debug!(session_id = %id, requested = %language, "Ignoring language for existing session");
                }
                debug!(session_id = %id, "Reusing session");
                return Ok((Arc::clone(session), id.to_string()));
            }
        }

        let id = new_session_id();
        let session = Arc::new(Session::new(id.clone(), Arc::clone(&self.gateway)));
        session.initialize(language).await?;

        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::clone(&session));
        info!(session_id = %id, %language, "Created session");

        Ok((session, id))
    }

    pub async fn lookup(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Unregister the session and destroy its sandbox.
    ///
    /// The entry is gone before teardown starts, so no new caller can reach
    /// a session that is being destroyed. Callers already holding it wait on
    /// the session lock and then see it destroyed.
    pub async fn remove(&self, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        info!(session_id = %session_id, "Removing session");
        session.destroy().await
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let now = Instant::now();
        let mut list: Vec<SessionSummary> = sessions.values().map(|s| summarize(s, now)).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn summary(&self, session_id: &str) -> Result<SessionSummary> {
        let session = self.lookup(session_id).await?;
        Ok(summarize(&session, Instant::now()))
    }
}

fn summarize(session: &Session, now: Instant) -> SessionSummary {
    SessionSummary {
        id: session.id().to_string(),
        language: session.language(),
        age_secs: now.duration_since(session.created_at()).as_secs(),
    }
}

/// `session-<unix millis>-<random suffix>`. The suffix keeps ids unique when
/// two sessions are created in the same millisecond.
fn new_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("session-{}-{}", millis, &suffix[..8])
}
