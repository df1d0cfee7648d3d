use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored account. Retention only looks at `id` and `registered_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

/// Fields supplied when creating an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub login: String,
    #[serde(default)]
    pub email: String,
    /// Defaults to the insertion time when `None`.
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

impl NewUser {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            email: String::new(),
            registered_at: None,
        }
    }

    pub fn registered_at(mut self, at: DateTime<Utc>) -> Self {
        self.registered_at = Some(at);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}
