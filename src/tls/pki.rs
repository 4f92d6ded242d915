//! Throwaway demo PKI
//!
//! Generates a P-256 root CA plus a server and a client certificate signed by
//! it, and writes them under the file names the sample programs read. The
//! keys are generated fresh on every call and never leave the target
//! directory.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509Ref, X509};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ROOT_CN: &str = "tlsperf demo root";
pub const SERVER_CN: &str = "tlsperf demo server";
pub const CLIENT_CN: &str = "tlsperf demo client";

pub const ROOT_CERT_FILE: &str = "rootcert.pem";
pub const SERVER_CERT_FILE: &str = "serv_cert.pem";
pub const SERVER_KEY_FILE: &str = "serv_key.der";
pub const CLIENT_CERT_FILE: &str = "client_cert.der";
pub const CLIENT_KEY_FILE: &str = "client_key.der";

const VALIDITY_DAYS: u32 = 365;

/// PKI generation errors
#[derive(Debug, thiserror::Error)]
pub enum PkiError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Root CA with one server and one client leaf
pub struct DemoPki {
    pub root_cert: X509,
    pub root_key: PKey<Private>,
    pub server_cert: X509,
    pub server_key: PKey<Private>,
    pub client_cert: X509,
    pub client_key: PKey<Private>,
}

/// Where [`DemoPki::write_to`] put each file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoPkiPaths {
    pub root_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

impl DemoPkiPaths {
    /// Paths the samples expect inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        DemoPkiPaths {
            root_cert: dir.join(ROOT_CERT_FILE),
            server_cert: dir.join(SERVER_CERT_FILE),
            server_key: dir.join(SERVER_KEY_FILE),
            client_cert: dir.join(CLIENT_CERT_FILE),
            client_key: dir.join(CLIENT_KEY_FILE),
        }
    }
}

impl DemoPki {
    pub fn generate() -> Result<Self, PkiError> {
        let root_key = new_p256_key()?;
        let root_cert = build_root(&root_key)?;

        let server_key = new_p256_key()?;
        let server_cert = build_leaf(SERVER_CN, &server_key, &root_cert, &root_key, LeafKind::Server)?;

        let client_key = new_p256_key()?;
        let client_cert = build_leaf(CLIENT_CN, &client_key, &root_cert, &root_key, LeafKind::Client)?;

        Ok(DemoPki { root_cert, root_key, server_cert, server_key, client_cert, client_key })
    }

    /// Write every file into `dir`, creating it if needed
    ///
    /// The root and server certificates are PEM; the server key and the client
    /// certificate and key are DER (PKCS#8 for keys).
    pub fn write_to(&self, dir: &Path) -> Result<DemoPkiPaths, PkiError> {
        fs::create_dir_all(dir)?;
        let paths = DemoPkiPaths::in_dir(dir);

        fs::write(&paths.root_cert, self.root_cert.to_pem()?)?;
        fs::write(&paths.server_cert, self.server_cert.to_pem()?)?;
        fs::write(&paths.server_key, self.server_key.private_key_to_pkcs8()?)?;
        fs::write(&paths.client_cert, self.client_cert.to_der()?)?;
        fs::write(&paths.client_key, self.client_key.private_key_to_pkcs8()?)?;

        tracing::debug!(dir = %dir.display(), "demo PKI written");
        Ok(paths)
    }
}

#[derive(Debug, Clone, Copy)]
enum LeafKind {
    Server,
    Client,
}

fn new_p256_key() -> Result<PKey<Private>, ErrorStack> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    PKey::from_ec_key(EcKey::generate(&group)?)
}

fn random_serial(builder: &mut X509Builder) -> Result<(), ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
    let serial = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)
}

fn base_builder(cn: &str, key: &PKey<Private>) -> Result<X509Builder, ErrorStack> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, cn)?;
    let name = name.build();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    random_serial(&mut builder)?;
    builder.set_subject_name(&name)?;
    builder.set_pubkey(key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    Ok(builder)
}

fn build_root(key: &PKey<Private>) -> Result<X509, ErrorStack> {
    let mut builder = base_builder(ROOT_CN, key)?;
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, ROOT_CN)?;
    builder.set_issuer_name(&name.build())?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build()?)?;
    builder.sign(key, MessageDigest::sha256())?;
    Ok(builder.build())
}

fn build_leaf(
    cn: &str,
    key: &PKey<Private>,
    issuer: &X509Ref,
    issuer_key: &PKey<Private>,
    kind: LeafKind,
) -> Result<X509, ErrorStack> {
    let mut builder = base_builder(cn, key)?;
    builder.set_issuer_name(issuer.subject_name())?;
    builder.append_extension(BasicConstraints::new().build()?)?;
    builder.append_extension(KeyUsage::new().critical().digital_signature().build()?)?;

    match kind {
        LeafKind::Server => {
            builder.append_extension(ExtendedKeyUsage::new().server_auth().build()?)?;
            let san = SubjectAlternativeName::new()
                .dns("localhost")
                .ip("127.0.0.1")
                .build(&builder.x509v3_context(Some(issuer), None))?;
            builder.append_extension(san)?;
        }
        LeafKind::Client => {
            builder.append_extension(ExtendedKeyUsage::new().client_auth().build()?)?;
        }
    }

    builder.sign(issuer_key, MessageDigest::sha256())?;
    Ok(builder.build())
}
