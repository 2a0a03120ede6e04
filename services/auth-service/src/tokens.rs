use std::sync::Arc;
use std::time::Duration;

use common_auth::{AuthError, AuthResult, Token, TokenCodec};
use tracing::{debug, info};

use crate::authority::AuthorityResolver;
use crate::credentials::{CredentialSource, CredentialValidator};

pub struct IssuedToken {
    pub token: Token,
    pub source: CredentialSource,
}

/// Login and refresh orchestration. Holds no state of its own beyond its
/// collaborators.
#[derive(Clone)]
pub struct TokenService {
    codec: Arc<TokenCodec>,
    validator: CredentialValidator,
    authority: AuthorityResolver,
}

impl TokenService {
    pub fn new(codec: Arc<TokenCodec>, validator: CredentialValidator) -> Self {
        Self {
            codec,
            validator,
            authority: AuthorityResolver,
        }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn validator(&self) -> &CredentialValidator {
        &self.validator
    }

    pub fn authority(&self) -> &AuthorityResolver {
        &self.authority
    }

    /// Credential check, role resolution, then a token with the default TTL.
    /// The subject is the principal's username even for email logins.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let verified = self.validator.authenticate(identifier, password).await?;
        let roles = self.authority.role_set_for(&verified.principal);
        let token = self
            .codec
            .encode_default(&verified.principal.username, &roles)?;
        info!(
            username = %token.subject(),
            roles = %roles,
            source = verified.source.as_str(),
            "token issued"
        );
        Ok(IssuedToken {
            token,
            source: verified.source,
        })
    }

    /// Re-mint a still-valid token with the same subject and roles. The old
    /// token stays valid until its own expiry. The new expiry is always
    /// strictly later than the old one.
    pub async fn refresh(&self, presented: &str) -> Result<Token, AuthError> {
        let current = self.codec.verify(presented)?;
        let now = self.codec.now();
        let mut ttl = self.codec.config().ttl;

        let default_expiry = now.timestamp() + self.codec.config().ttl_seconds();
        let floor = current.expires_at().timestamp() + 1;
        if default_expiry < floor {
            let extra = u64::try_from(floor - default_expiry).unwrap_or(1);
            ttl += Duration::from_secs(extra);
        }

        let token = self.codec.encode(current.subject(), current.roles(), ttl)?;
        debug!(username = %token.subject(), "token refreshed");
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> AuthResult {
        self.codec.decode(token)
    }
}
