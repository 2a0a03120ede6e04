use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::{Role, RoleSet};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::password::hash_password;

/// Identity record owned by the user store. The service only reads it, apart
/// from registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub enabled: bool,
    pub account_non_expired: bool,
    pub account_non_locked: bool,
    pub credentials_non_expired: bool,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub roles: RoleSet,
}

/// Profile view of a principal; the password hash never leaves the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub roles: RoleSet,
    pub enabled: bool,
    pub account_non_expired: bool,
    pub account_non_locked: bool,
    pub credentials_non_expired: bool,
    pub created_date: DateTime<Utc>,
    pub last_modified_date: DateTime<Utc>,
}

impl From<&Principal> for UserResponse {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id,
            username: p.username.clone(),
            email: p.email.clone(),
            roles: p.roles.clone(),
            enabled: p.enabled,
            account_non_expired: p.account_non_expired,
            account_non_locked: p.account_non_locked,
            credentials_non_expired: p.credentials_non_expired,
            created_date: p.created_at,
            last_modified_date: p.updated_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user store unavailable: {0}")]
    Unavailable(String),
    #[error("{field} already exists: {value}")]
    Conflict { field: &'static str, value: String },
}

/// Persistence capability for principals. Implementations live outside this
/// crate apart from the in-memory one.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;
    async fn insert(&self, principal: NewPrincipal) -> Result<Principal, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_email(email).await?.is_some())
    }
}

#[derive(Debug)]
pub struct InMemoryUserStore {
    principals: RwLock<HashMap<i64, Principal>>,
    next_id: AtomicI64,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            principals: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.principals.read().await.len()
    }

    /// Test hook to flip account-state flags on an existing principal.
    pub async fn update<F>(&self, username: &str, f: F) -> bool
    where
        F: FnOnce(&mut Principal),
    {
        let mut guard = self.principals.write().await;
        match guard.values_mut().find(|p| p.username == username) {
            Some(principal) => {
                f(principal);
                principal.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        let guard = self.principals.read().await;
        Ok(guard.values().find(|p| p.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let guard = self.principals.read().await;
        Ok(guard
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let mut guard = self.principals.write().await;
        if guard.values().any(|p| p.username == new.username) {
            return Err(StoreError::Conflict {
                field: "username",
                value: new.username,
            });
        }
        if guard.values().any(|p| p.email.eq_ignore_ascii_case(&new.email)) {
            return Err(StoreError::Conflict {
                field: "email",
                value: new.email,
            });
        }

        let now = Utc::now();
        let principal = Principal {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            enabled: true,
            account_non_expired: true,
            account_non_locked: true,
            credentials_non_expired: true,
            roles: new.roles,
            created_at: now,
            updated_at: now,
        };
        guard.insert(principal.id, principal.clone());
        Ok(principal)
    }
}

pub struct DemoUser {
    pub username: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub role: Role,
}

pub const DEMO_USERS: [DemoUser; 3] = [
    DemoUser {
        username: "admin",
        email: "admin@example.com",
        password: "admin123",
        role: Role::Admin,
    },
    DemoUser {
        username: "user",
        email: "user@example.com",
        password: "user123",
        role: Role::User,
    },
    DemoUser {
        username: "test",
        email: "test@example.com",
        password: "test123",
        role: Role::User,
    },
];

/// Insert the demo principals that are not present yet. Returns how many were
/// created.
pub async fn seed_demo_users(store: &dyn UserStore) -> anyhow::Result<usize> {
    let mut created = 0;
    for demo in &DEMO_USERS {
        if store.username_exists(demo.username).await? {
            continue;
        }
        let password = demo.password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
        match store
            .insert(NewPrincipal {
                username: demo.username.to_string(),
                email: demo.email.to_string(),
                password_hash,
                roles: RoleSet::single(demo.role),
            })
            .await
        {
            Ok(principal) => {
                info!(username = %principal.username, roles = %principal.roles, "seeded demo user");
                created += 1;
            }
            Err(StoreError::Conflict { field, value }) => {
                warn!(field, value = %value, "demo user already present");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(created)
}
