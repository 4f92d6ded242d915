//! Cycle drivers
//!
//! One client cycle is connect, wrap, handshake, one request/response and
//! close. One server cycle is accept, wrap, handshake, the canned exchanges
//! and close. `run_client` and `run_server` build a context once, repeat the
//! cycle under a [`BenchmarkLoop`] and release the context on every exit path.

use crate::bench::{BenchmarkConfig, BenchmarkLoop, BenchmarkResult, RunBudget};
use crate::cleanup::cleanup;
use crate::net::{self, Endpoint, ListenSocket, TransportOptions};
use crate::protocol::{self, REQUEST, RESPONSES};
use crate::tls::{ClientVerify, Identity, KeyExchangeGroups, SecureSession, SessionContext};
use crate::{Error, Result};
use bytes::Bytes;
use std::path::PathBuf;

/// Everything a client run needs
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: Endpoint,
    pub transport: TransportOptions,
    /// CA files trusted for server verification
    pub trust_roots: Vec<PathBuf>,
    /// Client certificate and key, loaded only when `bench.client_auth()` is set
    pub identity: Identity,
    pub ciphersuites: Option<String>,
    pub cipher_list: Option<String>,
    pub groups: KeyExchangeGroups,
    pub bench: BenchmarkConfig,
}

/// Everything a server run needs
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub endpoint: Endpoint,
    pub transport: TransportOptions,
    pub identity: Identity,
    pub groups: KeyExchangeGroups,
    /// Request/response exchanges per connection, 1 or 2
    pub exchanges: usize,
    pub budget: RunBudget,
    /// Require client certificates signed by this CA
    pub client_verify: Option<PathBuf>,
}

/// Build the client context described by `settings`
pub fn client_context(settings: &ClientSettings) -> Result<SessionContext> {
    let mut builder = SessionContext::client().trust_roots(settings.trust_roots.iter().cloned());
    if let Some(ciphersuites) = &settings.ciphersuites {
        builder = builder.ciphersuites(ciphersuites.clone());
    }
    if let Some(cipher_list) = &settings.cipher_list {
        builder = builder.cipher_list(cipher_list.clone());
    }
    if settings.bench.client_auth() {
        builder = builder.identity(settings.identity.clone());
    }
    Ok(builder.build()?)
}

/// Build the server context described by `settings`
pub fn server_context(settings: &ServerSettings) -> Result<SessionContext> {
    let mut builder = SessionContext::server().identity(settings.identity.clone());
    if let Some(ca) = &settings.client_verify {
        builder = builder.client_verify(ClientVerify::Required, Some(ca.clone()));
    }
    Ok(builder.build()?)
}

/// One complete client cycle; returns the server's response
pub fn client_cycle(
    context: &SessionContext,
    endpoint: &Endpoint,
    options: &TransportOptions,
    groups: &KeyExchangeGroups,
) -> Result<Bytes> {
    let connection = net::connect(endpoint, options)?;
    tracing::debug!(%endpoint, attempts = connection.attempts(), "TCP connected");

    let session = SecureSession::wrap(context, connection, groups)?;
    run_session(session, |session| protocol::client_transaction(session, REQUEST))
}

/// One complete server cycle; returns the number of exchanges served
pub fn server_cycle(
    context: &SessionContext,
    listener: &ListenSocket,
    options: &TransportOptions,
    groups: &KeyExchangeGroups,
    responses: &[&[u8]],
) -> Result<usize> {
    let connection = net::accept(listener, options)?;
    tracing::debug!(peer = %connection.peer(), "TCP connection accepted");

    let session = SecureSession::wrap(context, connection, groups)?;
    run_session(session, |session| protocol::server_transaction(session, responses))
}

fn run_session<T, F>(mut session: SecureSession, transact: F) -> Result<T>
where
    F: FnOnce(&mut SecureSession) -> Result<T>,
{
    let result = session.handshake().and_then(|()| transact(&mut session));
    cleanup(&mut None, &mut Some(session));
    result
}

/// Timed client benchmark
pub fn run_client(settings: &ClientSettings) -> Result<BenchmarkResult> {
    tracing::info!(version = openssl_version(), "OpenSSL");

    let context = client_context(settings)?;
    let result = BenchmarkLoop::new(RunBudget::from(&settings.bench)).run(|i| {
        let response =
            client_cycle(&context, &settings.endpoint, &settings.transport, &settings.groups)?;
        tracing::trace!(cycle = i, response = %String::from_utf8_lossy(&response), "SSL_read");
        Ok(())
    });
    cleanup(&mut Some(context), &mut None);
    result
}

/// Serve on an already bound listener until the budget runs out
pub fn serve(settings: &ServerSettings, listener: &ListenSocket) -> Result<BenchmarkResult> {
    let exchanges = settings.exchanges;
    if exchanges == 0 || exchanges > RESPONSES.len() {
        return Err(Error::Config(format!(
            "Invalid exchanges [{}], expected 1..={}",
            exchanges,
            RESPONSES.len()
        )));
    }
    let responses = &RESPONSES[..exchanges];

    let context = server_context(settings)?;
    let result = BenchmarkLoop::new(settings.budget).run(|i| {
        let served =
            server_cycle(&context, listener, &settings.transport, &settings.groups, responses)?;
        tracing::debug!(cycle = i, exchanges = served, "connection served");
        Ok(())
    });
    cleanup(&mut Some(context), &mut None);
    result
}

/// Bind `settings.endpoint` and serve
pub fn run_server(settings: &ServerSettings) -> Result<BenchmarkResult> {
    tracing::info!(version = openssl_version(), "OpenSSL");

    let listener = net::listen(&settings.endpoint)?;
    tracing::info!(endpoint = %settings.endpoint, "listening");
    serve(settings, &listener)
}

/// Library version string, as reported by OpenSSL
pub fn openssl_version() -> &'static str {
    openssl::version::version()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::pki::{DemoPki, DemoPkiPaths};
    use std::net::Ipv4Addr;

    fn server_settings(paths: &DemoPkiPaths, exchanges: usize) -> ServerSettings {
        ServerSettings {
            endpoint: Endpoint::new(Ipv4Addr::LOCALHOST, 0),
            transport: TransportOptions::default(),
            identity: Identity::new(&paths.server_cert, &paths.server_key),
            groups: "P-256:X25519".parse().unwrap(),
            exchanges,
            budget: RunBudget::Cycles(1),
            client_verify: None,
        }
    }

    #[test]
    fn test_serve_rejects_bad_exchange_count() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoPki::generate().unwrap().write_to(dir.path()).unwrap();
        let listener = net::listen(&Endpoint::new(Ipv4Addr::LOCALHOST, 0)).unwrap();

        for exchanges in [0, 3] {
            let err = serve(&server_settings(&paths, exchanges), &listener).unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }
    }

    #[test]
    fn test_client_context_skips_identity_without_client_auth() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoPki::generate().unwrap().write_to(dir.path()).unwrap();

        let mut settings = ClientSettings {
            endpoint: Endpoint::new(Ipv4Addr::LOCALHOST, 4433),
            transport: TransportOptions::default(),
            trust_roots: vec![paths.root_cert.clone()],
            identity: Identity::new(dir.path().join("missing.der"), dir.path().join("missing.der")),
            ciphersuites: None,
            cipher_list: None,
            groups: KeyExchangeGroups::client_default(),
            bench: BenchmarkConfig::new(1, false).unwrap(),
        };
        assert!(client_context(&settings).is_ok());

        // Same settings with client auth now try to load the missing files
        settings.bench = BenchmarkConfig::new(1, true).unwrap();
        assert!(matches!(client_context(&settings), Err(Error::Context(_))));
    }

    #[test]
    fn test_server_context_needs_readable_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = DemoPki::generate().unwrap().write_to(dir.path()).unwrap();
        paths.server_key = dir.path().join("absent.der");

        let err = server_context(&server_settings(&paths, 2)).unwrap_err();
        assert_eq!(err.stage(), "context");
    }

    #[test]
    fn test_failed_handshake_releases_the_socket() {
        use std::io::Read;
        use std::net::Shutdown;

        let listener = net::listen(&Endpoint::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let endpoint = listener.local_endpoint().unwrap();
        let conn = net::connect(&endpoint, &TransportOptions::default()).unwrap();
        let mut peer = net::accept(&listener, &TransportOptions::default()).unwrap().into_stream();

        // Peer hangs up its sending side before any ServerHello
        peer.shutdown(Shutdown::Write).unwrap();

        let context = SessionContext::client().build().unwrap();
        let session = SecureSession::wrap(&context, conn, &KeyExchangeGroups::client_default()).unwrap();
        let err = run_session(session, |_| -> Result<()> { panic!("transaction must not run") })
            .unwrap_err();
        assert_eq!(err.stage(), "handshake");

        // Drain the ClientHello; then EOF once the session is gone
        let mut buf = [0u8; 4096];
        while peer.read(&mut buf).unwrap() > 0 {}
    }

    #[test]
    fn test_openssl_version_is_reported() {
        assert!(openssl_version().contains("SSL"));
    }
}
