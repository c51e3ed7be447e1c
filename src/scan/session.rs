//! Session handles for authenticated remote access.
//!
//! The crate never builds credentials. A [`Session`] wraps whatever client
//! state the embedding application provides; scanners downcast it back.
//! [`SessionPool`] reuses one session per profile.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::ScannerError;

/// Profile name used when none is given.
pub const DEFAULT_PROFILE: &str = "default";

// == Session ==
/// Cheap to clone, shared read-only by every worker.
#[derive(Clone)]
pub struct Session {
    profile: Arc<str>,
    client: Arc<dyn Any + Send + Sync>,
}

impl Session {
    /// Wraps `client` state for `profile`.
    pub fn new<C>(profile: impl Into<String>, client: C) -> Self
    where
        C: Any + Send + Sync,
    {
        let profile: String = profile.into();
        Self {
            profile: Arc::from(profile),
            client: Arc::new(client),
        }
    }

    /// A session carrying no client state, for scanners that need none.
    pub fn anonymous() -> Self {
        Self::new(DEFAULT_PROFILE, ())
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Borrows the client state as `C`, if that is what it holds.
    pub fn client<C: Any + Send + Sync>(&self) -> Option<&C> {
        self.client.downcast_ref::<C>()
    }

    /// Returns true when both handles share the same client state.
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

// == Session Pool ==
type SessionFactory = dyn Fn(&str) -> Result<Session, ScannerError> + Send + Sync;

/// Builds sessions on first use and hands out clones afterwards.
pub struct SessionPool {
    factory: Box<SessionFactory>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionPool {
    /// Creates a pool that builds sessions with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Result<Session, ScannerError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `profile`, building it on first request.
    ///
    /// Creation happens under the pool lock, so concurrent callers asking for
    /// the same profile get the same session. Failed builds are not cached.
    pub fn get(&self, profile: Option<&str>) -> Result<Session, ScannerError> {
        let profile = profile.unwrap_or(DEFAULT_PROFILE);
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ScannerError::Other("session pool lock poisoned".to_string()))?;

        if let Some(session) = sessions.get(profile) {
            return Ok(session.clone());
        }

        let session = (self.factory)(profile)?;
        debug!(profile, "Created session");
        sessions.insert(profile.to_string(), session.clone());
        Ok(session)
    }

    /// Number of sessions built so far.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}
