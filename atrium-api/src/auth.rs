//! Authentication Module
//!
//! Issues and verifies HMAC-signed bearer tokens carrying a subject and a
//! role, checks them against an external revocation list, and exchanges
//! username/password pairs for tokens.
//!
//! Expiry is checked here rather than inside `jsonwebtoken` so the clock
//! can be injected and the leeway applied in one place.

use ::async_trait::async_trait;
use atrium_core::{AtriumResult, Clock, Principal, Role, SystemClock};
use atrium_storage::StoredCredential;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Secret used when none is configured. Refused in production.
pub const INSECURE_DEFAULT_SECRET: &str = "CHANGE_ME_DEV_ONLY";

/// Shortest secret accepted in production.
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Tracing target for token issuance and login outcomes.
pub const AUDIT_TARGET: &str = "atrium::audit";

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// Type-safe JWT secret that prevents accidental logging.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret. Empty secrets are rejected.
    pub fn new(secret: impl Into<String>) -> ApiResult<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(ApiError::missing_field("jwt_secret"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Get the length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Check if the secret is the insecure default.
    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl Default for JwtSecret {
    fn default() -> Self {
        Self(SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into()))
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Token service configuration.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: JwtSecret,
    pub jwt_algorithm: Algorithm,
    /// Lifetime of issued tokens in seconds.
    pub token_lifetime_secs: i64,
    /// Clock skew tolerance applied to the expiry comparison.
    pub leeway_secs: i64,
    /// Upper bound on revocation lookups.
    pub auth_timeout: Duration,
    /// Deployment environment name (`development`, `production`, ...).
    pub environment: String,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .field("leeway_secs", &self.leeway_secs)
            .field("auth_timeout", &self.auth_timeout)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret::default(),
            jwt_algorithm: Algorithm::HS256,
            token_lifetime_secs: 3600,
            leeway_secs: 5,
            auth_timeout: Duration::from_millis(500),
            environment: "development".to_string(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `ATRIUM_JWT_SECRET`: HMAC signing secret
    /// - `ATRIUM_TOKEN_LIFETIME_SECS`: token lifetime (default: 3600)
    /// - `ATRIUM_TOKEN_LEEWAY_SECS`: clock skew tolerance (default: 5)
    /// - `ATRIUM_AUTH_TIMEOUT_MS`: revocation lookup bound (default: 500)
    /// - `ATRIUM_ENVIRONMENT`: deployment environment (default: development)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secret = std::env::var("ATRIUM_JWT_SECRET")
            .ok()
            .and_then(|s| JwtSecret::new(s).ok())
            .unwrap_or_default();

        Self {
            jwt_secret: secret,
            token_lifetime_secs: std::env::var("ATRIUM_TOKEN_LIFETIME_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.token_lifetime_secs),
            leeway_secs: std::env::var("ATRIUM_TOKEN_LEEWAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.leeway_secs),
            auth_timeout: std::env::var("ATRIUM_AUTH_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.auth_timeout),
            environment: std::env::var("ATRIUM_ENVIRONMENT")
                .unwrap_or_else(|_| defaults.environment.clone())
                .to_lowercase(),
            ..defaults
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production" || self.environment == "prod"
    }

    /// Refuse insecure secrets in production. In development, warn and continue.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let is_production = self.is_production();

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Cannot start in production with the default JWT secret. \
                     Set ATRIUM_JWT_SECRET to a secure value. ATRIUM_ENVIRONMENT={}",
                    self.environment
                )));
            }
            tracing::warn!(
                "Using the default JWT secret. Acceptable for local development only; \
                 set ATRIUM_JWT_SECRET (at least {} characters) before deploying.",
                MIN_PRODUCTION_SECRET_LEN
            );
        }

        if self.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least {} characters long.",
                    self.jwt_secret.len(),
                    MIN_PRODUCTION_SECRET_LEN
                )));
            } else if !self.jwt_secret.is_insecure_default() {
                tracing::warn!(
                    chars = self.jwt_secret.len(),
                    "JWT secret is short; production requires at least {} characters",
                    MIN_PRODUCTION_SECRET_LEN
                );
            }
        }

        if self.token_lifetime_secs <= 0 {
            return Err(ApiError::invalid_input(
                "ATRIUM_TOKEN_LIFETIME_SECS must be positive",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// CLAIMS AND VERDICTS
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token id, looked up in the revocation list
    pub jti: String,
}

impl Claims {
    pub fn new(subject: impl Into<String>, role: Role, issued_at: i64, lifetime_secs: i64) -> Self {
        Self {
            sub: subject.into(),
            role,
            iat: issued_at,
            exp: issued_at.saturating_add(lifetime_secs),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Expired once `now` reaches `exp` plus the leeway.
    pub fn is_expired_at(&self, now: i64, leeway_secs: i64) -> bool {
        now >= self.exp.saturating_add(leeway_secs)
    }

    pub fn into_principal(self) -> Principal {
        Principal {
            subject: self.sub,
            role: self.role,
            expires_at: self.exp,
            token_id: Some(self.jti),
        }
    }
}

/// Result of inspecting a presented token. Every outcome must be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerdict {
    Valid(Principal),
    Expired,
    Malformed(String),
    Revoked,
}

impl TokenVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenVerdict::Valid(_))
    }

    pub fn into_result(self) -> Result<Principal, AuthError> {
        match self {
            TokenVerdict::Valid(principal) => Ok(principal),
            TokenVerdict::Expired => Err(AuthError::Expired),
            TokenVerdict::Malformed(reason) => Err(AuthError::Malformed(reason)),
            TokenVerdict::Revoked => Err(AuthError::Revoked),
        }
    }
}

/// Authentication failures. Terminal for the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,

    #[error("token malformed: {0}")]
    Malformed(String),

    #[error("token revoked")]
    Revoked,

    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid credentials")]
    InvalidCredentials,
}

/// What a successful login hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    /// Expiry as a Unix timestamp.
    pub expires_at: i64,
    /// Seconds from issuance until expiry.
    pub expires_in: i64,
    pub subject: String,
    pub role: Role,
}

// ============================================================================
// REVOCATION
// ============================================================================

/// External set of revoked token ids.
#[async_trait]
pub trait RevocationList: Send + Sync {
    async fn is_revoked(&self, token_id: &str) -> AtriumResult<bool>;
}

/// Revocation list held in process memory.
///
/// Entries remember the token's own expiry so they can be dropped once the
/// token would be rejected as expired anyway.
#[derive(Debug, Default)]
pub struct InMemoryRevocationList {
    revoked: DashMap<String, i64>,
}

impl InMemoryRevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, token_id: impl Into<String>, expires_at: i64) {
        self.revoked.insert(token_id.into(), expires_at);
    }

    /// Forget revocations whose tokens expired before `now`. Returns how many were dropped.
    pub fn purge_expired(&self, now_epoch_secs: i64) -> usize {
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at > now_epoch_secs);
        before.saturating_sub(self.revoked.len())
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[async_trait]
impl RevocationList for InMemoryRevocationList {
    async fn is_revoked(&self, token_id: &str) -> AtriumResult<bool> {
        Ok(self.revoked.contains_key(token_id))
    }
}

// ============================================================================
// PASSWORDS
// ============================================================================

/// Password hashing and checking. Hashes are opaque strings to everyone else.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, password: &str, hash: &str) -> bool;

    /// Hash a new password for storage.
    fn hash_password(&self, password: &str) -> String;
}

/// Salted SHA-256 hashes stored as `salt$hex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestPasswordVerifier;

impl DigestPasswordVerifier {
    /// Produce a `salt$hex` hash for `password`.
    pub fn hash(salt: &str, password: &str) -> String {
        format!("{}${}", salt, Self::digest(salt, password))
    }

    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b"$");
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PasswordVerifier for DigestPasswordVerifier {
    fn verify(&self, password: &str, hash: &str) -> bool {
        let Some((salt, expected)) = hash.split_once('$') else {
            return false;
        };
        let actual = Self::digest(salt, password);
        // Length is public; compare the rest without early exit.
        actual.len() == expected.len()
            && actual
                .bytes()
                .zip(expected.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    fn hash_password(&self, password: &str) -> String {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        Self::hash(&salt, password)
    }
}

/// Check a password against the stored credential, if any.
///
/// Unknown users and wrong passwords are indistinguishable to the caller.
pub fn check_credentials<'a>(
    verifier: &dyn PasswordVerifier,
    credential: Option<&'a StoredCredential>,
    password: &str,
) -> Result<&'a StoredCredential, AuthError> {
    match credential {
        Some(credential) if verifier.verify(password, &credential.password_hash) => Ok(credential),
        _ => Err(AuthError::InvalidCredentials),
    }
}

// ============================================================================
// TOKEN SERVICE
// ============================================================================

/// Issues tokens and turns presented tokens back into principals.
#[derive(Clone)]
pub struct TokenService {
    config: AuthConfig,
    revocations: Arc<dyn RevocationList>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: AuthConfig, revocations: Arc<dyn RevocationList>) -> Self {
        Self {
            config,
            revocations,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Sign a token for `subject` with the configured lifetime.
    pub fn issue(&self, subject: &str, role: Role) -> ApiResult<IssuedToken> {
        let now = self.now()?;
        let claims = Claims::new(subject, role, now, self.config.token_lifetime_secs);

        let encoding_key = EncodingKey::from_secret(self.config.jwt_secret.expose().as_bytes());
        let header = Header::new(self.config.jwt_algorithm);
        let access_token = encode(&header, &claims, &encoding_key)
            .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))?;

        tracing::info!(
            target: AUDIT_TARGET,
            subject = %claims.sub,
            role = claims.role.as_str(),
            jti = %claims.jti,
            expires_at = claims.exp,
            "token issued"
        );

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_at: claims.exp,
            expires_in: claims.exp - claims.iat,
            subject: claims.sub,
            role: claims.role,
        })
    }

    /// Check signature and expiry. Never consults the revocation list, so
    /// the verdict is never `Revoked`.
    pub fn decode(&self, token: &str) -> TokenVerdict {
        let decoding_key = DecodingKey::from_secret(self.config.jwt_secret.expose().as_bytes());

        // Signature only; expiry is checked below against our clock.
        let mut validation = Validation::new(self.config.jwt_algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

        let claims = match decode::<Claims>(token, &decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                let reason = match e.kind() {
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        "signature is invalid".to_string()
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => "token is invalid".to_string(),
                    _ => format!("validation failed: {}", e),
                };
                return TokenVerdict::Malformed(reason);
            }
        };

        let now = self.config.clock.now_epoch_secs();
        if claims.is_expired_at(now, self.config.leeway_secs) {
            return TokenVerdict::Expired;
        }
        TokenVerdict::Valid(claims.into_principal())
    }

    /// Full verification including the revocation list, bounded by the
    /// configured auth timeout.
    pub async fn verify(&self, token: &str) -> Result<TokenVerdict, AuthError> {
        let principal = match self.decode(token) {
            TokenVerdict::Valid(principal) => principal,
            other => return Ok(other),
        };
        let Some(jti) = principal.token_id.as_deref() else {
            return Ok(TokenVerdict::Malformed("missing token id".to_string()));
        };

        let lookup = tokio::time::timeout(self.config.auth_timeout, self.revocations.is_revoked(jti));
        match lookup.await {
            Ok(Ok(true)) => Ok(TokenVerdict::Revoked),
            Ok(Ok(false)) => Ok(TokenVerdict::Valid(principal)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "revocation lookup failed");
                Err(AuthError::Unavailable("revocation lookup failed".to_string()))
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.config.auth_timeout, "revocation lookup timed out");
                Err(AuthError::Unavailable("revocation lookup timed out".to_string()))
            }
        }
    }

    /// Turn a bearer token into a principal.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        self.verify(token).await?.into_result()
    }

    fn now(&self) -> ApiResult<i64> {
        let now = self.config.clock.now_epoch_secs();
        if now < 0 {
            tracing::error!(timestamp = now, "clock returned pre-epoch time");
            return Err(ApiError::internal_error("Server time configuration error"));
        }
        Ok(now)
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// No header means an anonymous request. A header with any other scheme is
/// treated as a malformed credential rather than ignored.
pub fn extract_bearer(header: Option<&str>) -> Result<Option<&str>, AuthError> {
    let Some(header) = header else {
        return Ok(None);
    };
    let header = header.trim();
    let (scheme, token) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed("expected Bearer scheme".to_string()));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Malformed("empty bearer token".to_string()));
    }
    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::test_clocks;
    use atrium_core::{FixedClock, ManualClock};
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn test_config(clock: Arc<dyn Clock>) -> AuthConfig {
        AuthConfig {
            jwt_secret: JwtSecret::new("test_secret_with_enough_length_0123456789")
                .expect("Test secret should be valid"),
            ..AuthConfig::default()
        }
        .with_clock(clock)
    }

    fn service(clock: Arc<dyn Clock>) -> (TokenService, Arc<InMemoryRevocationList>) {
        let revocations = Arc::new(InMemoryRevocationList::new());
        (
            TokenService::new(test_config(clock), revocations.clone()),
            revocations,
        )
    }

    #[tokio::test]
    async fn test_issue_then_authenticate_returns_same_identity() {
        let (tokens, _) = service(Arc::new(FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH)));
        let issued = tokens.issue("u1", Role::User).expect("issue");

        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 3600);
        assert_eq!(issued.expires_at, test_clocks::VALID_EPOCH + 3600);

        let principal = tokens.authenticate(&issued.access_token).await.expect("valid");
        assert_eq!(principal.subject, "u1");
        assert_eq!(principal.role, Role::User);
        assert_eq!(principal.expires_at, issued.expires_at);
        assert!(principal.token_id.is_some());
    }

    #[tokio::test]
    async fn test_fifteen_minute_token_expires_between_fourteen_and_sixteen() {
        let clock = Arc::new(ManualClock::at_epoch_secs(test_clocks::VALID_EPOCH));
        let mut config = test_config(clock.clone());
        config.token_lifetime_secs = 15 * 60;
        let tokens = TokenService::new(config, Arc::new(InMemoryRevocationList::new()));
        let issued = tokens.issue("u1", Role::User).expect("issue");

        clock.advance(Duration::from_secs(14 * 60));
        assert!(tokens.authenticate(&issued.access_token).await.is_ok());

        clock.advance(Duration::from_secs(2 * 60));
        assert_eq!(
            tokens.authenticate(&issued.access_token).await,
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_leeway_boundary() {
        let claims = Claims::new("u1", Role::User, 1_000, 100);
        assert!(!claims.is_expired_at(1_099, 0));
        assert!(claims.is_expired_at(1_100, 0));
        assert!(!claims.is_expired_at(1_104, 5));
        assert!(claims.is_expired_at(1_105, 5));
    }

    #[test]
    fn test_token_from_expired_era_is_expired_now() {
        let past = Arc::new(FixedClock::at_epoch_secs(test_clocks::EXPIRED_EPOCH));
        let (old, _) = service(past);
        let issued = old.issue("u1", Role::Admin).expect("issue");

        let (now, _) = service(Arc::new(FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH)));
        assert_eq!(now.decode(&issued.access_token), TokenVerdict::Expired);
    }

    #[test]
    fn test_tampered_and_foreign_tokens_are_malformed() {
        let clock = Arc::new(FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH));
        let (tokens, _) = service(clock.clone());
        let issued = tokens.issue("u1", Role::User).expect("issue");

        let mut tampered = issued.access_token.clone();
        tampered.push('x');
        assert!(matches!(tokens.decode(&tampered), TokenVerdict::Malformed(_)));
        assert!(matches!(tokens.decode("not-a-token"), TokenVerdict::Malformed(_)));

        let mut other = test_config(clock);
        other.jwt_secret = JwtSecret::new("a_completely_different_secret_value_xyz").expect("secret");
        let foreign = TokenService::new(other, Arc::new(InMemoryRevocationList::new()));
        assert!(matches!(
            foreign.decode(&issued.access_token),
            TokenVerdict::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected() {
        let (tokens, revocations) =
            service(Arc::new(FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH)));
        let issued = tokens.issue("u1", Role::User).expect("issue");
        let principal = tokens.authenticate(&issued.access_token).await.expect("valid");

        revocations.revoke(principal.token_id.clone().unwrap_or_default(), principal.expires_at);
        assert_eq!(
            tokens.verify(&issued.access_token).await,
            Ok(TokenVerdict::Revoked)
        );
        // Decoding alone does not consult the list.
        assert!(tokens.decode(&issued.access_token).is_valid());
    }

    struct StalledRevocations;

    #[async_trait]
    impl RevocationList for StalledRevocations {
        async fn is_revoked(&self, _token_id: &str) -> AtriumResult<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_revocation_lookup_is_bounded() {
        let mut config = test_config(Arc::new(FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH)));
        config.auth_timeout = Duration::from_millis(20);
        let tokens = TokenService::new(config, Arc::new(StalledRevocations));
        let issued = tokens.issue("u1", Role::User).expect("issue");

        let result = tokens.authenticate(&issued.access_token).await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
    }

    #[test]
    fn test_purge_drops_only_expired_revocations() {
        let list = InMemoryRevocationList::new();
        list.revoke("old", 100);
        list.revoke("live", 300);
        assert_eq!(list.purge_expired(200), 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(None), Ok(None));
        assert_eq!(extract_bearer(Some("Bearer abc")), Ok(Some("abc")));
        assert_eq!(extract_bearer(Some("bearer   abc ")), Ok(Some("abc")));
        assert!(matches!(
            extract_bearer(Some("Basic abc")),
            Err(AuthError::Malformed(_))
        ));
        assert!(matches!(
            extract_bearer(Some("Bearer ")),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_digest_password_verifier() {
        let hash = DigestPasswordVerifier::hash("pepper", "hunter2");
        assert!(hash.starts_with("pepper$"));
        assert!(DigestPasswordVerifier.verify("hunter2", &hash));
        assert!(!DigestPasswordVerifier.verify("hunter3", &hash));
        assert!(!DigestPasswordVerifier.verify("hunter2", "no-separator"));

        let first = DigestPasswordVerifier.hash_password("hunter2");
        let second = DigestPasswordVerifier.hash_password("hunter2");
        assert_ne!(first, second, "each hash gets its own salt");
        assert!(DigestPasswordVerifier.verify("hunter2", &first));
        assert!(DigestPasswordVerifier.verify("hunter2", &second));
    }

    #[test]
    fn test_check_credentials_hides_which_part_failed() {
        let credential = StoredCredential {
            user_id: Uuid::nil(),
            username: "ada".to_string(),
            password_hash: DigestPasswordVerifier::hash("s", "right"),
            role: Role::User,
        };
        let verifier = DigestPasswordVerifier;
        assert!(check_credentials(&verifier, Some(&credential), "right").is_ok());
        assert_eq!(
            check_credentials(&verifier, Some(&credential), "wrong"),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            check_credentials(&verifier, None, "right"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = JwtSecret::new("super-secret-value").expect("secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("REDACTED"));
        assert!(JwtSecret::new("   ").is_err());
    }

    #[test]
    fn test_production_rejects_default_and_short_secrets() {
        let mut config = AuthConfig {
            environment: "production".to_string(),
            ..AuthConfig::default()
        };
        assert!(config.validate_for_production().is_err());

        config.jwt_secret = JwtSecret::new("short").expect("secret");
        assert!(config.validate_for_production().is_err());

        config.jwt_secret = JwtSecret::new("x".repeat(MIN_PRODUCTION_SECRET_LEN)).expect("secret");
        assert!(config.validate_for_production().is_ok());

        config.environment = "development".to_string();
        config.jwt_secret = JwtSecret::default();
        assert!(config.validate_for_production().is_ok());
    }

    #[test]
    fn test_from_env_reads_overrides_and_ignores_garbage() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _secret = EnvVarGuard::set("ATRIUM_JWT_SECRET", Some("env-secret"));
        let _lifetime = EnvVarGuard::set("ATRIUM_TOKEN_LIFETIME_SECS", Some("900"));
        let _leeway = EnvVarGuard::set("ATRIUM_TOKEN_LEEWAY_SECS", Some("not-a-number"));
        let _env = EnvVarGuard::set("ATRIUM_ENVIRONMENT", Some("PROD"));

        let config = AuthConfig::from_env();
        assert_eq!(config.jwt_secret.expose(), "env-secret");
        assert_eq!(config.token_lifetime_secs, 900);
        assert_eq!(config.leeway_secs, 5);
        assert!(config.is_production());
    }
}
