//! tlsperf - TLS connection-lifecycle harness
//!
//! This crate drives OpenSSL through complete TCP + TLS connection cycles:
//! connect (or accept), handshake, a fixed request/response exchange and
//! teardown. A timed loop repeats the cycle and reports connections per second.

pub mod bench;
pub mod cleanup;
pub mod cli;
pub mod error;
pub mod harness;
pub mod net;
pub mod protocol;
pub mod tls;

pub use bench::{BenchmarkConfig, BenchmarkLoop, BenchmarkResult, LoopState, RunBudget};
pub use error::{Error, Result};
pub use net::{Connection, Endpoint, ListenSocket, RetryPolicy, TransportOptions};
pub use tls::{KeyExchangeGroups, Role, SecureSession, SessionContext, SessionState};
