use std::fmt;
use uuid::Uuid;

/// Who the backend talks to on behalf of the session.
///
/// Authenticated users send a bearer token; guests send a locally generated
/// session id so the backend can still group their answers.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    Authenticated { token: String },
    Anonymous { session_id: String },
}

impl SessionIdentity {
    #[must_use]
    pub fn authenticated(token: impl Into<String>) -> Self {
        SessionIdentity::Authenticated {
            token: token.into(),
        }
    }

    /// Fresh guest identity with an `anon_<uuid>` session id.
    #[must_use]
    pub fn anonymous() -> Self {
        SessionIdentity::Anonymous {
            session_id: format!("anon_{}", Uuid::new_v4().simple()),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionIdentity::Authenticated { .. })
    }

    /// Header name and value to attach to every request.
    #[must_use]
    pub fn header(&self) -> (&'static str, String) {
        match self {
            SessionIdentity::Authenticated { token } => ("Authorization", format!("Bearer {token}")),
            SessionIdentity::Anonymous { session_id } => ("X-Session-ID", session_id.clone()),
        }
    }
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionIdentity::Authenticated { .. } => f
                .debug_struct("Authenticated")
                .field("token", &"<redacted>")
                .finish(),
            SessionIdentity::Anonymous { session_id } => f
                .debug_struct("Anonymous")
                .field("session_id", session_id)
                .finish(),
        }
    }
}
