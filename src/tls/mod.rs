//! TLS layer over a [`Connection`](crate::net::Connection)
//!
//! All cryptography is delegated to OpenSSL. This module only configures it
//! and tracks the lifecycle of each session.
//!
//! # Architecture
//!
//! 1. [`SessionContext`] holds the shared, per-role configuration (trust roots,
//!    cipher policy, identity). It is built once and outlives every session.
//! 2. [`SecureSession`] wraps exactly one connection and moves through
//!    `Unestablished -> Established -> Closed` (or straight to `Closed` when the
//!    handshake fails).
//! 3. [`KeyExchangeGroups`] is plain data handed to each `wrap` call.
//!
//! # Examples
//!
//! ```no_run
//! use tlsperf::net::{self, Endpoint, TransportOptions};
//! use tlsperf::tls::{KeyExchangeGroups, SecureSession, SessionContext};
//!
//! let ctx = SessionContext::client()
//!     .trust_root("certs/rootcert.pem")
//!     .build()
//!     .unwrap();
//!
//! let endpoint: Endpoint = "127.0.0.1:4433".parse().unwrap();
//! let conn = net::connect(&endpoint, &TransportOptions::default()).unwrap();
//! let mut session = SecureSession::wrap(&ctx, conn, &KeyExchangeGroups::client_default()).unwrap();
//! session.handshake().unwrap();
//! session.close();
//! ```

pub mod cert;
pub mod config;
pub mod groups;
pub mod pki;
pub mod session;

pub use cert::CertInfo;
pub use config::{
    ClientContextBuilder, ClientVerify, ContextError, Identity, ServerContextBuilder,
    SessionContext,
};
pub use groups::KeyExchangeGroups;
pub use pki::{DemoPki, DemoPkiPaths, PkiError};
pub use session::{ErrorRecord, HandshakeError, HandshakeInfo, SecureSession, SessionState};

use std::fmt;

/// Which side of the handshake a context or session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}
