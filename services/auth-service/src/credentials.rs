use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common_auth::{AuthError, RoleSet};
use tracing::{debug, warn};

use crate::password::{verify_against_dummy, verify_password};
use crate::store::{Principal, StoreError, UserStore, DEMO_USERS};

/// Whether credential checks may fall back to the built-in demo principals
/// when the user store cannot be reached. Never enabled in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegradedMode {
    #[default]
    Disabled,
    BuiltInPrincipals,
}

impl DegradedMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, DegradedMode::BuiltInPrincipals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Store,
    BuiltIn,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Store => "store",
            CredentialSource::BuiltIn => "built_in",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifiedPrincipal {
    pub principal: Principal,
    pub source: CredentialSource,
}

/// Run a store call under the configured deadline. Elapsed deadlines count as
/// an outage.
pub async fn with_store_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "store call exceeded {}ms",
            timeout.as_millis()
        ))),
    }
}

#[derive(Clone)]
pub struct CredentialValidator {
    store: Arc<dyn UserStore>,
    degraded: DegradedMode,
    store_timeout: Duration,
}

impl CredentialValidator {
    pub fn new(store: Arc<dyn UserStore>, degraded: DegradedMode, store_timeout: Duration) -> Self {
        Self {
            store,
            degraded,
            store_timeout,
        }
    }

    pub fn degraded_mode(&self) -> DegradedMode {
        self.degraded
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Username first, then email; first match wins.
    pub async fn lookup(&self, identifier: &str) -> Result<Option<Principal>, StoreError> {
        let by_username =
            with_store_timeout(self.store_timeout, self.store.find_by_username(identifier)).await?;
        if by_username.is_some() {
            return Ok(by_username);
        }
        with_store_timeout(self.store_timeout, self.store.find_by_email(identifier)).await
    }

    /// Boolean form of [`CredentialValidator::authenticate`]; never errors.
    pub async fn validate(&self, identifier: &str, raw_password: &str) -> bool {
        self.authenticate(identifier, raw_password).await.is_ok()
    }

    pub async fn authenticate(
        &self,
        identifier: &str,
        raw_password: &str,
    ) -> Result<VerifiedPrincipal, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || raw_password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let principal = match self.lookup(identifier).await {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                debug!(identifier = %identifier, "no principal for identifier");
                let password = raw_password.to_string();
                let _ = tokio::task::spawn_blocking(move || verify_against_dummy(&password)).await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(StoreError::Unavailable(cause)) => {
                return self.fallback(identifier, raw_password, cause);
            }
            Err(err) => return Err(AuthError::StoreUnavailable(err.to_string())),
        };

        let password = raw_password.to_string();
        let stored_hash = principal.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(|err| AuthError::StoreUnavailable(format!("password check aborted: {err}")))?;
        if !matches {
            debug!(username = %principal.username, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        // Only a caller holding the password learns the account state.
        check_account_state(&principal)?;

        Ok(VerifiedPrincipal {
            principal,
            source: CredentialSource::Store,
        })
    }

    fn fallback(
        &self,
        identifier: &str,
        raw_password: &str,
        cause: String,
    ) -> Result<VerifiedPrincipal, AuthError> {
        if !self.degraded.is_enabled() {
            warn!(cause = %cause, "user store unavailable");
            return Err(AuthError::StoreUnavailable(cause));
        }

        warn!(cause = %cause, "user store unavailable; checking built-in principals");
        built_in_principal(identifier, raw_password)
            .map(|principal| VerifiedPrincipal {
                principal,
                source: CredentialSource::BuiltIn,
            })
            .ok_or(AuthError::InvalidCredentials)
    }
}

fn check_account_state(principal: &Principal) -> Result<(), AuthError> {
    if !principal.enabled {
        return Err(AuthError::AccountDisabled);
    }
    if !principal.account_non_locked {
        return Err(AuthError::AccountLocked);
    }
    if !principal.account_non_expired {
        return Err(AuthError::AccountExpired);
    }
    if !principal.credentials_non_expired {
        return Err(AuthError::CredentialsExpired);
    }
    Ok(())
}

fn built_in_principal(identifier: &str, raw_password: &str) -> Option<Principal> {
    let demo = DEMO_USERS
        .iter()
        .find(|demo| demo.username == identifier && demo.password == raw_password)?;
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    Some(Principal {
        id: 0,
        username: demo.username.to_string(),
        email: demo.email.to_string(),
        password_hash: String::new(),
        enabled: true,
        account_non_expired: true,
        account_non_locked: true,
        credentials_non_expired: true,
        roles: RoleSet::single(demo.role),
        created_at: epoch,
        updated_at: epoch,
    })
}
