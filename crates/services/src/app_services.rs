use std::sync::Arc;

use backend::{ApiConfig, Backend, BackendHealth, HttpBackend, InMemoryBackend, SessionIdentity};

use crate::error::AppServicesError;
use crate::retry::RetryConfig;
use crate::sessions::ExamSessionService;
use crate::Clock;

/// Assembles app-facing services over one backend.
#[derive(Clone)]
pub struct AppServices {
    identity: SessionIdentity,
    http: Option<Arc<HttpBackend>>,
    sessions: Arc<ExamSessionService>,
}

impl AppServices {
    /// Build services backed by the REST API.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Api` if the HTTP client cannot be built.
    pub fn new_http(
        config: ApiConfig,
        identity: SessionIdentity,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let retry = RetryConfig::from_api(&config);
        let http = Arc::new(HttpBackend::new(config, identity.clone())?);
        let backend = Backend::from_http(&http);
        let sessions =
            Arc::new(ExamSessionService::new(clock, identity.clone(), backend).with_retry(retry));

        Ok(Self {
            identity,
            http: Some(http),
            sessions,
        })
    }

    /// Build services over an in-memory backend (offline demo and tests).
    #[must_use]
    pub fn in_memory(repo: &InMemoryBackend, identity: SessionIdentity, clock: Clock) -> Self {
        let sessions = Arc::new(ExamSessionService::new(
            clock,
            identity.clone(),
            Backend::in_memory(repo),
        ));
        Self {
            identity,
            http: None,
            sessions,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<ExamSessionService> {
        Arc::clone(&self.sessions)
    }

    /// Backend reachability. The in-memory backend is always available.
    pub async fn health(&self) -> BackendHealth {
        match &self.http {
            Some(http) => http.health().await,
            None => BackendHealth {
                available: true,
                status: "in-memory".to_owned(),
            },
        }
    }
}
