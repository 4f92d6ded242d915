//! Peer certificate details
//!
//! Extracts the names worth logging from the certificate a peer presented.

use openssl::nid::Nid;
use openssl::ssl::SslRef;
use openssl::x509::{X509NameRef, X509Ref};

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
}

impl CertInfo {
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: Self::get_cn(cert.subject_name()),
            issuer: Self::get_cn(cert.issuer_name()),
        }
    }

    /// Certificate the peer presented during the handshake, if any
    pub fn peer_of(ssl: &SslRef) -> Option<Self> {
        ssl.peer_certificate().map(|cert| Self::from_x509(&cert))
    }

    fn get_cn(name: &X509NameRef) -> String {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "<undef>".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::pki::{DemoPki, ROOT_CN, SERVER_CN};

    #[test]
    fn test_cert_info_from_demo_chain() {
        let pki = DemoPki::generate().unwrap();

        let root = CertInfo::from_x509(&pki.root_cert);
        assert_eq!(root.subject, ROOT_CN);
        assert_eq!(root.issuer, ROOT_CN); // Self-signed

        let server = CertInfo::from_x509(&pki.server_cert);
        assert_eq!(server.subject, SERVER_CN);
        assert_eq!(server.issuer, ROOT_CN);
    }
}
