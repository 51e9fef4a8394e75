//! Service Configuration Module
//!
//! Everything the binary needs, loaded from environment variables with
//! development-friendly defaults. Unparseable numbers fall back to their
//! defaults; only an invalid bind address or an insecure production secret
//! stops startup.

use atrium_core::ResourceKind;
use atrium_storage::CacheConfig;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::telemetry::TelemetryConfig;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Admin account created at startup when both variables are set.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: SecretString,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    /// Upper bound on every store call.
    pub store_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub telemetry: TelemetryConfig,
    pub admin: Option<AdminBootstrap>,
}

impl ServiceConfig {
    /// Load the configuration from the environment.
    ///
    /// Environment variables:
    /// - `ATRIUM_CACHE_TTL_SECS`: default TTL for every kind (default: 60)
    /// - `ATRIUM_CACHE_TTL_USER_SECS`, `ATRIUM_CACHE_TTL_ADDRESS_SECS`: per-kind TTL
    /// - `ATRIUM_CACHE_OBJECT_CAPACITY`: LRU bound for objects (default: 3000)
    /// - `ATRIUM_CACHE_LIST_CAPACITY`: LRU bound for list pages (default: 400)
    /// - `ATRIUM_STORE_TIMEOUT_MS`: store call bound (default: 2000)
    /// - `ATRIUM_BIND_ADDR`: listen address (default: 127.0.0.1:8080)
    /// - `ATRIUM_ADMIN_USERNAME`, `ATRIUM_ADMIN_PASSWORD`: bootstrap admin
    ///
    /// Token settings are read by [`AuthConfig::from_env`] and logging by
    /// [`TelemetryConfig::from_env`].
    pub fn from_env() -> ApiResult<Self> {
        let bind_raw =
            std::env::var("ATRIUM_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", bind_raw, e))
        })?;

        Ok(Self {
            auth: AuthConfig::from_env(),
            cache: cache_config_from_env(),
            store_timeout: env_parse::<u64>("ATRIUM_STORE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(2000)),
            bind_addr,
            telemetry: TelemetryConfig::from_env(),
            admin: admin_from_env(),
        })
    }

    /// Startup checks that must hold before serving traffic.
    pub fn validate(&self) -> ApiResult<()> {
        self.auth.validate_for_production()?;
        if self.store_timeout.is_zero() {
            return Err(ApiError::invalid_input(
                "ATRIUM_STORE_TIMEOUT_MS must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Cache settings from the environment.
pub fn cache_config_from_env() -> CacheConfig {
    let defaults = CacheConfig::default();
    let mut config = CacheConfig::new()
        .with_ttl(
            env_parse::<u64>("ATRIUM_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
        )
        .with_object_capacity(
            env_parse("ATRIUM_CACHE_OBJECT_CAPACITY").unwrap_or(defaults.object_capacity),
        )
        .with_list_capacity(
            env_parse("ATRIUM_CACHE_LIST_CAPACITY").unwrap_or(defaults.list_capacity),
        );

    for kind in ResourceKind::ALL {
        let var = format!("ATRIUM_CACHE_TTL_{}_SECS", kind.as_str().to_uppercase());
        if let Some(secs) = env_parse::<u64>(&var) {
            config = config.with_kind_ttl(kind, Duration::from_secs(secs));
        }
    }
    config
}

fn admin_from_env() -> Option<AdminBootstrap> {
    let username = std::env::var("ATRIUM_ADMIN_USERNAME").ok()?;
    let password = std::env::var("ATRIUM_ADMIN_PASSWORD").ok()?;
    if username.trim().is_empty() || password.is_empty() {
        return None;
    }
    Some(AdminBootstrap {
        username: username.trim().to_string(),
        password: SecretString::new(password.into()),
    })
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
