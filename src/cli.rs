//! Command line parsing for the binaries
//!
//! Options are spelled OpenSSL style with one dash (`-time 5`); the usual
//! `--time 5` works too. Every option can also come from a `TLSPERF_*`
//! environment variable. Options whose meaning depends on the side (identity
//! files, groups, run time) use `TLSPERF_CLIENT_*` and `TLSPERF_SERVER_*`.

use crate::bench::{BenchmarkConfig, RunBudget, DEFAULT_TIME_SECS};
use crate::harness::{ClientSettings, ServerSettings};
use crate::net::{self, Endpoint, RetryPolicy, TransportOptions};
use crate::tls::KeyExchangeGroups;
use crate::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Directory the sample certificates are read from by default
pub const DEFAULT_CERT_DIR: &str = "./certs/ECC_Prime256_Certs";

pub const DEFAULT_CAFILE: &str = "./certs/ECC_Prime256_Certs/rootcert.pem";
pub const DEFAULT_CLIENT_CERT: &str = "./certs/ECC_Prime256_Certs/client_cert.der";
pub const DEFAULT_CLIENT_KEY: &str = "./certs/ECC_Prime256_Certs/client_key.der";
pub const DEFAULT_SERVER_CERT: &str = "./certs/ECC_Prime256_Certs/serv_cert.pem";
pub const DEFAULT_SERVER_KEY: &str = "./certs/ECC_Prime256_Certs/serv_key.der";

pub const DEFAULT_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4433;

/// Rewrite `-name` to `--name`
///
/// Only words (a dash followed by a letter and at least one more character)
/// are rewritten, so `-h`, `-5` and everything after a bare `--` pass through
/// untouched. The program name is never touched.
pub fn normalize_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out = Vec::new();
    let mut literal = false;

    for (i, arg) in args.into_iter().enumerate() {
        let arg = arg.into();
        if i == 0 || literal {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            literal = true;
            out.push(arg);
            continue;
        }

        let mut chars = arg.chars();
        let is_word = chars.next() == Some('-')
            && chars.next().map_or(false, |c| c.is_ascii_alphabetic())
            && chars.next().is_some();
        if is_word {
            out.push(format!("-{}", arg));
        } else {
            out.push(arg);
        }
    }
    out
}

/// Parse normalized `args` into `P`
pub fn parse<P, I, S>(args: I) -> std::result::Result<P, clap::Error>
where
    P: Parser,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    P::try_parse_from(normalize_args(args))
}

/// Install the fmt subscriber on stderr; `RUST_LOG` overrides the `info` default
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn transport(retries: u32, retry_wait_ms: u64, sock_timeout_ms: Option<u64>) -> TransportOptions {
    TransportOptions {
        retry: RetryPolicy::new(retries, Duration::from_millis(retry_wait_ms)),
        io_timeout: sock_timeout_ms.map(Duration::from_millis),
    }
}

fn groups(list: Option<&str>, default: KeyExchangeGroups) -> Result<KeyExchangeGroups> {
    match list {
        Some(list) => list.parse(),
        None => Ok(default),
    }
}

/// TLS performance client: repeated full handshakes against a server
#[derive(Parser, Debug, Clone)]
#[command(name = "tlsperf-client", version)]
pub struct ClientArgs {
    /// Seconds to run the benchmark
    #[arg(long, env = "TLSPERF_CLIENT_TIME", default_value_t = DEFAULT_TIME_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub time: u64,

    /// Present the client certificate and key
    #[arg(long)]
    pub client_auth: bool,

    /// Server IPv4 address
    #[arg(long, env = "TLSPERF_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Server port
    #[arg(long, env = "TLSPERF_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Trusted CA file; may be repeated
    #[arg(long, env = "TLSPERF_CAFILE", default_value = DEFAULT_CAFILE)]
    pub cafile: Vec<PathBuf>,

    /// Client certificate, used with -client-auth
    #[arg(long, env = "TLSPERF_CLIENT_CERT", default_value = DEFAULT_CLIENT_CERT)]
    pub cert: PathBuf,

    /// Client private key, used with -client-auth
    #[arg(long, env = "TLSPERF_CLIENT_KEY", default_value = DEFAULT_CLIENT_KEY)]
    pub key: PathBuf,

    /// TLS 1.3 cipher suites
    #[arg(long, env = "TLSPERF_CIPHERSUITES")]
    pub ciphersuites: Option<String>,

    /// TLS 1.2 cipher list
    #[arg(long, env = "TLSPERF_CIPHER")]
    pub cipher: Option<String>,

    /// Colon separated key exchange groups
    #[arg(long, env = "TLSPERF_CLIENT_GROUPS")]
    pub groups: Option<String>,

    /// Connect attempts per cycle
    #[arg(long, env = "TLSPERF_RETRIES", default_value_t = net::DEFAULT_CONNECT_ATTEMPTS)]
    pub retries: u32,

    /// Wait between connect attempts, in milliseconds
    #[arg(long, env = "TLSPERF_RETRY_WAIT_MS", default_value_t = 200)]
    pub retry_wait_ms: u64,

    /// Socket read/write timeout, in milliseconds
    #[arg(long, env = "TLSPERF_SOCK_TIMEOUT_MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub sock_timeout_ms: Option<u64>,
}

impl ClientArgs {
    pub fn into_settings(self) -> Result<ClientSettings> {
        Ok(ClientSettings {
            endpoint: Endpoint::parse(&self.addr, self.port)?,
            transport: transport(self.retries, self.retry_wait_ms, self.sock_timeout_ms),
            trust_roots: self.cafile,
            identity: crate::tls::Identity::new(self.cert, self.key),
            ciphersuites: self.ciphersuites,
            cipher_list: self.cipher,
            groups: groups(self.groups.as_deref(), KeyExchangeGroups::client_default())?,
            bench: BenchmarkConfig::new(self.time, self.client_auth)?,
        })
    }
}

/// TLS sample server: accepts connections and answers the fixed exchanges
#[derive(Parser, Debug, Clone)]
#[command(name = "tlsperf-server", version)]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, env = "TLSPERF_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Port to bind
    #[arg(long, env = "TLSPERF_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Server certificate
    #[arg(long, env = "TLSPERF_SERVER_CERT", default_value = DEFAULT_SERVER_CERT)]
    pub cert: PathBuf,

    /// Server private key
    #[arg(long, env = "TLSPERF_SERVER_KEY", default_value = DEFAULT_SERVER_KEY)]
    pub key: PathBuf,

    /// Colon separated key exchange groups
    #[arg(long, env = "TLSPERF_SERVER_GROUPS")]
    pub groups: Option<String>,

    /// Request/response exchanges per connection
    #[arg(long, env = "TLSPERF_EXCHANGES", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(1..=2))]
    pub exchanges: u8,

    /// Connections to serve before exiting
    #[arg(long, env = "TLSPERF_COUNT", conflicts_with = "time",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,

    /// Serve for this many seconds instead of a fixed count
    #[arg(long, env = "TLSPERF_SERVER_TIME", value_parser = clap::value_parser!(u64).range(1..))]
    pub time: Option<u64>,

    /// Require client certificates issued by this CA
    #[arg(long, env = "TLSPERF_VERIFY_CLIENT")]
    pub verify_client: Option<PathBuf>,

    /// Socket read/write timeout, in milliseconds
    #[arg(long, env = "TLSPERF_SOCK_TIMEOUT_MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub sock_timeout_ms: Option<u64>,
}

impl ServerArgs {
    pub fn into_settings(self) -> Result<ServerSettings> {
        let budget = match self.time {
            Some(secs) => RunBudget::from(&BenchmarkConfig::new(secs, false)?),
            None => RunBudget::Cycles(self.count.unwrap_or(1)),
        };

        Ok(ServerSettings {
            endpoint: Endpoint::parse(&self.addr, self.port)?,
            transport: TransportOptions {
                io_timeout: self.sock_timeout_ms.map(Duration::from_millis),
                ..TransportOptions::default()
            },
            identity: crate::tls::Identity::new(self.cert, self.key),
            groups: groups(self.groups.as_deref(), KeyExchangeGroups::server_default())?,
            exchanges: usize::from(self.exchanges),
            budget,
            client_verify: self.verify_client,
        })
    }
}

/// Write a throwaway root CA with server and client certificates
#[derive(Parser, Debug, Clone)]
#[command(name = "tlsperf-pki", version)]
pub struct PkiArgs {
    /// Output directory, created if missing
    #[arg(default_value = DEFAULT_CERT_DIR)]
    pub dir: PathBuf,
}
