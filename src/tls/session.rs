//! Secure session lifecycle
//!
//! A [`SecureSession`] owns one TCP connection and the OpenSSL state layered
//! on it. States only move forward:
//!
//! ```text
//! Unestablished --handshake ok--> Established --close--> Closed
//!       |                                                  ^
//!       +----------------handshake failed / close----------+
//! ```
//!
//! Closing releases the SSL object and the socket it owns together, exactly
//! once. `Drop` closes as well, so no exit path leaks the descriptor.

use super::cert::CertInfo;
use super::config::SessionContext;
use super::groups::KeyExchangeGroups;
use super::Role;
use crate::net::Connection;
use crate::protocol::SecureChannel;
use crate::{Error, Result};
use foreign_types::ForeignTypeRef;
use openssl::error::ErrorStack;
use openssl::ssl::{ErrorCode, Ssl, SslRef, SslStream};
use std::ffi::CString;
use std::net::{SocketAddr, TcpStream};

/// `SSL_CTRL_SET_GROUPS_LIST` from `ssl.h`
const SSL_CTRL_SET_GROUPS_LIST: libc::c_int = 92;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not attempted
    Unestablished,
    /// Handshake succeeded; reads and writes are allowed
    Established,
    /// Shut down and released; no further I/O
    Closed,
}

/// Most recent OpenSSL error record for a protocol-level failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub reason: i32,
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl ErrorRecord {
    fn from_openssl(e: &openssl::error::Error) -> Self {
        ErrorRecord {
            reason: e.reason_code(),
            file: e.file().to_string(),
            line: e.line(),
            message: e.reason().unwrap_or("unknown").to_string(),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error reason={} ({}) on [{}:{}]", self.reason, self.message, self.file, self.line)
    }
}

/// Handshake failure
///
/// `code` is the `SSL_get_error` result. `record` is filled only when the
/// failure came from the TLS protocol (`SSL_ERROR_SSL`), not the transport.
#[derive(Debug, thiserror::Error)]
#[error("{role} handshake failed with code {code}: {detail}")]
pub struct HandshakeError {
    pub role: Role,
    pub code: i32,
    pub record: Option<ErrorRecord>,
    detail: String,
}

impl HandshakeError {
    fn from_ssl_error(role: Role, e: &openssl::ssl::Error) -> Self {
        let record = if e.code() == ErrorCode::SSL {
            e.ssl_error()
                .and_then(|stack| stack.errors().last())
                .map(ErrorRecord::from_openssl)
        } else {
            None
        };
        let detail = match &record {
            Some(record) => record.to_string(),
            None => e.to_string(),
        };
        HandshakeError { role, code: e.code().as_raw(), record, detail }
    }
}

/// What was negotiated, captured right after a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,
    /// Negotiated cipher suite
    pub cipher: String,
    /// Certificate the peer presented
    pub peer_cert: Option<CertInfo>,
}

impl HandshakeInfo {
    fn from_ssl(ssl: &SslRef) -> Self {
        HandshakeInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            peer_cert: CertInfo::peer_of(ssl),
        }
    }
}

/// One TLS session over one connection
pub struct SecureSession {
    stream: Option<SslStream<TcpStream>>,
    role: Role,
    state: SessionState,
    peer: SocketAddr,
    info: Option<HandshakeInfo>,
    failed: bool,
}

impl SecureSession {
    /// Attach a new session from `context` to `connection`
    ///
    /// The connection moves into the session. If the session cannot be set
    /// up (including a rejected group list) the connection is closed before
    /// returning.
    pub fn wrap(
        context: &SessionContext,
        connection: Connection,
        groups: &KeyExchangeGroups,
    ) -> Result<Self> {
        let role = context.role();
        let peer = connection.peer();

        let ssl = Ssl::new(context.ssl_context())
            .map_err(|e| Error::Session(format!("SSL object creation failed: {}", e)))?;

        if let Err(e) = set_groups(&ssl, groups) {
            tracing::warn!(%peer, groups = %groups, "set groups failed, closing connection");
            drop(connection);
            return Err(Error::Session(format!("Set groups {} failed: {}", groups, e)));
        }

        let stream = SslStream::new(ssl, connection.into_stream())
            .map_err(|e| Error::Session(format!("SSL stream creation failed: {}", e)))?;

        tracing::debug!(%role, %peer, "SSL object created");

        Ok(SecureSession {
            stream: Some(stream),
            role,
            state: SessionState::Unestablished,
            peer,
            info: None,
            failed: false,
        })
    }

    /// Run the client or server handshake, depending on role
    ///
    /// On failure the session goes straight to `Closed` and its resources are
    /// released.
    pub fn handshake(&mut self) -> Result<()> {
        if self.state != SessionState::Unestablished {
            return Err(Error::Session(format!(
                "handshake attempted on {:?} session",
                self.state
            )));
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Session("session has no connection".to_string()))?;

        let result = match self.role {
            Role::Client => stream.connect(),
            Role::Server => stream.accept(),
        };

        match result {
            Ok(()) => {
                let info = HandshakeInfo::from_ssl(stream.ssl());
                tracing::debug!(
                    role = %self.role,
                    peer = %self.peer,
                    version = %info.version,
                    cipher = %info.cipher,
                    "handshake succeeded"
                );
                self.info = Some(info);
                self.state = SessionState::Established;
                Ok(())
            }
            Err(e) => {
                let err = HandshakeError::from_ssl_error(self.role, &e);
                tracing::warn!(role = %self.role, peer = %self.peer, error = %err, "handshake failed");
                self.failed = true;
                self.close();
                Err(err.into())
            }
        }
    }

    /// Send close_notify (best effort) and release the session and socket
    ///
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if self.state == SessionState::Established && !self.failed {
                let _ = stream.shutdown();
            }
            // Frees the SSL object, which drops the socket it owns
            drop(stream);
            tracing::debug!(role = %self.role, peer = %self.peer, "session closed");
        }
        self.state = SessionState::Closed;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Handshake details, available once established
    pub fn info(&self) -> Option<&HandshakeInfo> {
        self.info.as_ref()
    }

    /// Check if an I/O or handshake step failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    fn established_stream(&mut self, op: &str) -> Result<&mut SslStream<TcpStream>> {
        match (self.state, self.stream.as_mut()) {
            (SessionState::Established, Some(stream)) => Ok(stream),
            (state, _) => Err(Error::Transfer(format!("{} on {:?} session", op, state))),
        }
    }
}

impl SecureChannel for SecureSession {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.established_stream("SSL_read")?;
        match stream.ssl_read(buf) {
            Ok(0) => {
                self.failed = true;
                Err(Error::Transfer("SSL_read returned 0".to_string()))
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.failed = true;
                Err(Error::Transfer(format!("SSL_read failed: {}", e)))
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let stream = self.established_stream("SSL_write")?;
        match stream.ssl_write(buf) {
            Ok(0) => {
                self.failed = true;
                Err(Error::Transfer("SSL_write returned 0".to_string()))
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.failed = true;
                Err(Error::Transfer(format!("SSL_write failed: {}", e)))
            }
        }
    }
}

impl Drop for SecureSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Apply `groups` to one SSL object (`SSL_set1_groups_list`)
fn set_groups(ssl: &SslRef, groups: &KeyExchangeGroups) -> std::result::Result<(), ErrorStack> {
    let list = CString::new(groups.to_list()).map_err(|_| ErrorStack::get())?;
    let ret = unsafe {
        openssl_sys::SSL_ctrl(
            ssl.as_ptr(),
            SSL_CTRL_SET_GROUPS_LIST,
            0,
            list.as_ptr() as *mut libc::c_void,
        )
    };
    if ret == 1 {
        Ok(())
    } else {
        Err(ErrorStack::get())
    }
}
