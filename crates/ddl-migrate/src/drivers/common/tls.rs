//! TLS settings shared by the MySQL and PostgreSQL connections.
//!
//! Both engines take the same `ssl_mode` values. PostgreSQL gets a rustls
//! connector built here; MySQL maps the mode onto sqlx's own setting.

use std::sync::Arc;

use rustls::ClientConfig;
use sqlx::mysql::MySqlSslMode;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::info;

use crate::error::{MigrateError, Result};

/// SSL modes accepted in `connection.ssl_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    #[default]
    Disable,
    /// TLS with certificate verification against the bundled roots.
    Require,
    /// TLS with certificate and hostname verification.
    VerifyFull,
}

impl SslMode {
    /// Parse an SSL mode from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" | "" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(MigrateError::Config(format!(
                "Invalid ssl_mode '{}'. Valid values: disable, require, verify-full",
                other
            ))),
        }
    }

    /// Check if this mode requires TLS.
    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Equivalent sqlx setting for MySQL connections.
    pub fn mysql(&self) -> MySqlSslMode {
        match self {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Require => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        }
    }
}

/// Builder for PostgreSQL TLS connectors.
pub struct TlsBuilder {
    ssl_mode: SslMode,
}

impl TlsBuilder {
    pub fn new(ssl_mode: SslMode) -> Self {
        Self { ssl_mode }
    }

    /// Create a TLS builder from an ssl_mode string.
    pub fn parse(ssl_mode: &str) -> Result<Self> {
        Ok(Self::new(SslMode::parse(ssl_mode)?))
    }

    /// Build a connector for deadpool-postgres, or None when TLS is disabled.
    pub fn build(&self) -> Result<Option<MakeRustlsConnect>> {
        if !self.ssl_mode.requires_tls() {
            return Ok(None);
        }
        Ok(Some(MakeRustlsConnect::new(self.build_client_config()?)))
    }

    /// rustls client config verifying against the webpki roots.
    pub fn build_client_config(&self) -> Result<ClientConfig> {
        if !self.ssl_mode.requires_tls() {
            return Err(MigrateError::Config(
                "Cannot build TLS config for ssl_mode=disable".into(),
            ));
        }

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| MigrateError::Config(format!("TLS setup failed: {}", e)))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        info!(
            "ssl_mode={:?}: certificate and hostname verification enabled",
            self.ssl_mode
        );
        Ok(config)
    }
}
