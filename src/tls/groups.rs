//! Key-exchange group lists
//!
//! Groups are immutable data passed into every `wrap` call rather than
//! process-wide state. Names use OpenSSL's group naming (`P-256`, `X25519`,
//! `ffdhe2048`, ...).

use super::Role;
use crate::Error;
use std::fmt;
use std::str::FromStr;

/// Default client groups: elliptic curves
pub const CLIENT_DEFAULT_GROUPS: &[&str] = &["P-256", "P-384", "P-521", "X25519", "X448"];

/// Default server groups: finite-field Diffie-Hellman (RFC 7919)
pub const SERVER_DEFAULT_GROUPS: &[&str] =
    &["ffdhe2048", "ffdhe3072", "ffdhe4096", "ffdhe6144", "ffdhe8192"];

/// Ordered list of key-exchange groups offered or accepted by one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExchangeGroups(Vec<String>);

impl KeyExchangeGroups {
    /// Build from group names, most preferred first
    pub fn new<I, S>(names: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::Config("key-exchange group list is empty".to_string()));
        }
        for name in &names {
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(Error::Config(format!("invalid key-exchange group name {:?}", name)));
            }
        }
        Ok(KeyExchangeGroups(names))
    }

    pub fn client_default() -> Self {
        KeyExchangeGroups(CLIENT_DEFAULT_GROUPS.iter().map(|s| s.to_string()).collect())
    }

    pub fn server_default() -> Self {
        KeyExchangeGroups(SERVER_DEFAULT_GROUPS.iter().map(|s| s.to_string()).collect())
    }

    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Client => Self::client_default(),
            Role::Server => Self::server_default(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Colon-separated list in the form OpenSSL expects
    pub fn to_list(&self) -> String {
        self.0.join(":")
    }
}

impl FromStr for KeyExchangeGroups {
    type Err = Error;

    /// Parse a colon-separated list such as `P-256:X25519`
    fn from_str(s: &str) -> Result<Self, Error> {
        KeyExchangeGroups::new(s.split(':').map(str::trim))
    }
}

impl fmt::Display for KeyExchangeGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_list())
    }
}
