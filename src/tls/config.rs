//! Session context configuration
//!
//! Builders for the client and server [`SessionContext`]. Every OpenSSL call
//! is deferred to `build()` so a failure can name the step that failed. On
//! error the half-configured OpenSSL builder is dropped, which frees it.

use super::Role;
use openssl::error::ErrorStack;
use openssl::ssl::{SslContext, SslContextBuilder, SslContextRef, SslFiletype, SslMethod, SslVerifyMode};
use std::path::{Path, PathBuf};

/// Default TLS 1.3 cipher suite
pub const DEFAULT_TLS13_CIPHERSUITES: &str = "TLS_CHACHA20_POLY1305_SHA256";

/// Default TLS 1.2 cipher list
pub const DEFAULT_TLS12_CIPHER_LIST: &str = "ECDHE-ECDSA-AES128-GCM-SHA256";

/// Maximum certificate chain depth accepted from the peer
pub const DEFAULT_VERIFY_DEPTH: u32 = 5;

/// Context construction errors, one per configuration step
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("SSL context creation failed: {0}")]
    Create(#[source] ErrorStack),

    #[error("Load CA cert {} failed: {source}", .path.display())]
    TrustRoot {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    #[error("Setting TLS1.3 cipher suites {ciphers:?} failed: {source}")]
    Tls13Ciphers {
        ciphers: String,
        #[source]
        source: ErrorStack,
    },

    #[error("Setting TLS1.2 cipher list {ciphers:?} failed: {source}")]
    Tls12Ciphers {
        ciphers: String,
        #[source]
        source: ErrorStack,
    },

    #[error("Load cert {} failed: {source}", .path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    #[error("Load key {} failed: {source}", .path.display())]
    PrivateKey {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    #[error("Private key does not match certificate: {0}")]
    KeyMismatch(#[source] ErrorStack),

    #[error("Load client CA {} failed: {source}", .path.display())]
    ClientCa {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    #[error("Server context requires a certificate and private key")]
    MissingIdentity,
}

/// Client certificate verification mode (server-side)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientVerify {
    /// Don't request client certificates
    #[default]
    None,
    /// Request client certificate but don't require it
    Optional,
    /// Require client certificate
    Required,
}

/// Certificate and private key presented by one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl Identity {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Identity { cert: cert.into(), key: key.into() }
    }
}

/// `.der` files are read as ASN.1, everything else as PEM
pub fn filetype_for(path: &Path) -> SslFiletype {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("der") => SslFiletype::ASN1,
        _ => SslFiletype::PEM,
    }
}

/// Shared configuration from which sessions of one role are created
///
/// Sessions hold their own reference to the underlying OpenSSL context, so
/// dropping the `SessionContext` while sessions are still alive is safe; the
/// harness nevertheless releases it only after every session is closed.
pub struct SessionContext {
    ctx: SslContext,
    role: Role,
}

impl SessionContext {
    /// Create a new client context builder
    pub fn client() -> ClientContextBuilder {
        ClientContextBuilder::new()
    }

    /// Create a new server context builder
    pub fn server() -> ServerContextBuilder {
        ServerContextBuilder::new()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn ssl_context(&self) -> &SslContextRef {
        &self.ctx
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext").field("role", &self.role).finish()
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        tracing::debug!(role = %self.role, "SSL context released");
    }
}

/// Client context builder
#[derive(Debug, Clone)]
pub struct ClientContextBuilder {
    trust_roots: Vec<PathBuf>,
    ciphersuites: String,
    cipher_list: String,
    verify_depth: u32,
    identity: Option<Identity>,
}

impl ClientContextBuilder {
    fn new() -> Self {
        ClientContextBuilder {
            trust_roots: Vec::new(),
            ciphersuites: DEFAULT_TLS13_CIPHERSUITES.to_string(),
            cipher_list: DEFAULT_TLS12_CIPHER_LIST.to_string(),
            verify_depth: DEFAULT_VERIFY_DEPTH,
            identity: None,
        }
    }

    /// Add a PEM bundle of trusted roots
    pub fn trust_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_roots.push(path.into());
        self
    }

    /// Add several PEM bundles of trusted roots, loaded in order
    pub fn trust_roots<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.trust_roots.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Set cipher suites (for TLS 1.3)
    pub fn ciphersuites(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphersuites = ciphers.into();
        self
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.cipher_list = ciphers.into();
        self
    }

    pub fn verify_depth(mut self, depth: u32) -> Self {
        self.verify_depth = depth;
        self
    }

    /// Present a client certificate (client authentication)
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Build the context, applying each setting in order
    pub fn build(self) -> Result<SessionContext, ContextError> {
        let mut builder =
            SslContextBuilder::new(SslMethod::tls_client()).map_err(ContextError::Create)?;

        for path in &self.trust_roots {
            builder
                .set_ca_file(path)
                .map_err(|source| ContextError::TrustRoot { path: path.clone(), source })?;
            tracing::debug!(path = %path.display(), "loaded CA cert");
        }

        set_ciphers(&mut builder, &self.ciphersuites, &self.cipher_list)?;

        builder.set_verify(SslVerifyMode::PEER);
        builder.set_verify_depth(self.verify_depth);

        if let Some(identity) = &self.identity {
            load_identity(&mut builder, identity)?;
        }

        tracing::info!(
            roots = self.trust_roots.len(),
            client_auth = self.identity.is_some(),
            "client SSL context created"
        );

        Ok(SessionContext { ctx: builder.build(), role: Role::Client })
    }
}

/// Server context builder
#[derive(Debug, Clone, Default)]
pub struct ServerContextBuilder {
    identity: Option<Identity>,
    ciphersuites: Option<String>,
    cipher_list: Option<String>,
    client_verify: ClientVerify,
    client_ca: Option<PathBuf>,
}

impl ServerContextBuilder {
    fn new() -> Self {
        ServerContextBuilder::default()
    }

    /// Certificate and private key presented to clients
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set cipher suites (for TLS 1.3); library defaults when unset
    pub fn ciphersuites(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphersuites = Some(ciphers.into());
        self
    }

    /// Set cipher list (for TLS <= 1.2); library defaults when unset
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.cipher_list = Some(ciphers.into());
        self
    }

    /// Set client certificate verification mode and the CA bundle used for it
    pub fn client_verify(mut self, mode: ClientVerify, ca: Option<PathBuf>) -> Self {
        self.client_verify = mode;
        self.client_ca = ca;
        self
    }

    /// Build the context
    pub fn build(self) -> Result<SessionContext, ContextError> {
        let identity = self.identity.as_ref().ok_or(ContextError::MissingIdentity)?;

        let mut builder =
            SslContextBuilder::new(SslMethod::tls_server()).map_err(ContextError::Create)?;

        load_identity(&mut builder, identity)?;

        if let Some(ciphersuites) = &self.ciphersuites {
            builder.set_ciphersuites(ciphersuites).map_err(|source| {
                ContextError::Tls13Ciphers { ciphers: ciphersuites.clone(), source }
            })?;
        }
        if let Some(cipher_list) = &self.cipher_list {
            builder.set_cipher_list(cipher_list).map_err(|source| {
                ContextError::Tls12Ciphers { ciphers: cipher_list.clone(), source }
            })?;
        }

        if let Some(path) = &self.client_ca {
            builder
                .set_ca_file(path)
                .map_err(|source| ContextError::ClientCa { path: path.clone(), source })?;
        }

        let verify_mode = match self.client_verify {
            ClientVerify::None => SslVerifyMode::NONE,
            ClientVerify::Optional => SslVerifyMode::PEER,
            ClientVerify::Required => SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
        };
        builder.set_verify(verify_mode);

        tracing::info!(client_verify = ?self.client_verify, "server SSL context created");

        Ok(SessionContext { ctx: builder.build(), role: Role::Server })
    }
}

fn set_ciphers(
    builder: &mut SslContextBuilder,
    ciphersuites: &str,
    cipher_list: &str,
) -> Result<(), ContextError> {
    builder.set_ciphersuites(ciphersuites).map_err(|source| ContextError::Tls13Ciphers {
        ciphers: ciphersuites.to_string(),
        source,
    })?;
    builder.set_cipher_list(cipher_list).map_err(|source| ContextError::Tls12Ciphers {
        ciphers: cipher_list.to_string(),
        source,
    })?;
    Ok(())
}

fn load_identity(builder: &mut SslContextBuilder, identity: &Identity) -> Result<(), ContextError> {
    builder
        .set_certificate_file(&identity.cert, filetype_for(&identity.cert))
        .map_err(|source| ContextError::Certificate { path: identity.cert.clone(), source })?;
    tracing::debug!(path = %identity.cert.display(), "loaded cert");

    builder
        .set_private_key_file(&identity.key, filetype_for(&identity.key))
        .map_err(|source| ContextError::PrivateKey { path: identity.key.clone(), source })?;
    tracing::debug!(path = %identity.key.display(), "loaded key");

    builder.check_private_key().map_err(ContextError::KeyMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::pki::DemoPki;

    #[test]
    fn test_filetype_by_extension() {
        assert_eq!(filetype_for(Path::new("a/client_key.der")).as_raw(), SslFiletype::ASN1.as_raw());
        assert_eq!(filetype_for(Path::new("a/KEY.DER")).as_raw(), SslFiletype::ASN1.as_raw());
        assert_eq!(filetype_for(Path::new("a/rootcert.pem")).as_raw(), SslFiletype::PEM.as_raw());
        assert_eq!(filetype_for(Path::new("a/noext")).as_raw(), SslFiletype::PEM.as_raw());
    }

    #[test]
    fn test_client_context_with_demo_pki() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoPki::generate().unwrap().write_to(dir.path()).unwrap();

        let ctx = SessionContext::client()
            .trust_root(&paths.root_cert)
            .identity(Identity::new(&paths.client_cert, &paths.client_key))
            .build()
            .unwrap();

        assert_eq!(ctx.role(), Role::Client);
        assert_eq!(ctx.ssl_context().verify_mode(), SslVerifyMode::PEER);
    }

    #[test]
    fn test_missing_trust_root_names_path() {
        let err = SessionContext::client()
            .trust_root("/nonexistent/rootcert.pem")
            .build()
            .unwrap_err();

        match err {
            ContextError::TrustRoot { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/rootcert.pem"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_bad_ciphers_name_the_step() {
        let err = SessionContext::client()
            .ciphersuites("NOT_A_SUITE")
            .build()
            .unwrap_err();
        assert!(matches!(err, ContextError::Tls13Ciphers { .. }));

        let err = SessionContext::client()
            .cipher_list("NOT-A-CIPHER")
            .build()
            .unwrap_err();
        assert!(matches!(err, ContextError::Tls12Ciphers { .. }));
    }

    #[test]
    fn test_client_identity_errors() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoPki::generate().unwrap().write_to(dir.path()).unwrap();

        let err = SessionContext::client()
            .identity(Identity::new(dir.path().join("missing.der"), &paths.client_key))
            .build()
            .unwrap_err();
        assert!(matches!(err, ContextError::Certificate { .. }));

        let err = SessionContext::client()
            .identity(Identity::new(&paths.client_cert, dir.path().join("missing.der")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ContextError::PrivateKey { .. }));

        // Server key does not belong to the client certificate
        let err = SessionContext::client()
            .identity(Identity::new(&paths.client_cert, &paths.server_key))
            .build()
            .unwrap_err();
        assert!(matches!(err, ContextError::PrivateKey { .. } | ContextError::KeyMismatch(_)));
    }

    #[test]
    fn test_server_context() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoPki::generate().unwrap().write_to(dir.path()).unwrap();

        assert!(matches!(
            SessionContext::server().build().unwrap_err(),
            ContextError::MissingIdentity
        ));

        let ctx = SessionContext::server()
            .identity(Identity::new(&paths.server_cert, &paths.server_key))
            .client_verify(ClientVerify::Required, Some(paths.root_cert.clone()))
            .build()
            .unwrap();

        assert_eq!(ctx.role(), Role::Server);
        assert_eq!(
            ctx.ssl_context().verify_mode(),
            SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
        );
    }
}
