//! Signing certificates
//!
//! A [`CertificateHandle`] holds an RSA private key and the certificate
//! chain that goes into the signature's `KeyInfo`. Handles are obtained from
//! a PEM bundle on disk, by serial number from a [`CertificateStore`], or
//! through a [`CertificatePicker`] choosing among the usable certificates of
//! a store.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::Pem;

/// Public details of a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number, uppercase hex without separators
    pub serial: String,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
    /// Whether the key usage allows digital signatures
    pub digital_signature: bool,
}

impl CertificateInfo {
    fn from_x509(cert: &X509Certificate<'_>) -> Result<Self> {
        let timestamp = |ts: i64| {
            Utc.timestamp_opt(ts, 0).single().ok_or_else(|| {
                Error::Configuration(format!("certificate validity out of range: {}", ts))
            })
        };

        // No key usage extension means no restriction
        let digital_signature = match cert.key_usage() {
            Ok(Some(ext)) => ext.value.digital_signature(),
            Ok(None) => true,
            Err(_) => false,
        };

        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: hex_upper(cert.raw_serial()),
            not_before: timestamp(cert.validity().not_before.timestamp())?,
            not_after: timestamp(cert.validity().not_after.timestamp())?,
            digital_signature,
        })
    }

    /// Whether `now` falls inside the validity window
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.not_after
    }

    /// Currently valid and allowed to sign
    pub fn is_usable(&self) -> bool {
        self.digital_signature && self.is_valid_at(Utc::now())
    }

    /// Compare serials ignoring case, separators and leading zeros
    pub fn matches_serial(&self, serial: &str) -> bool {
        normalize_serial(&self.serial) == normalize_serial(serial)
    }
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn normalize_serial(serial: &str) -> String {
    let hex: String = serial
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Private key plus certificate chain, ready to sign
#[derive(Clone)]
pub struct CertificateHandle {
    key: RsaPrivateKey,
    chain: Vec<Vec<u8>>,
    info: CertificateInfo,
}

impl CertificateHandle {
    /// Assemble a handle from a key and DER certificates
    ///
    /// The certificate matching the key becomes the leaf; the others follow
    /// in their original order.
    pub fn from_parts(key: RsaPrivateKey, certificates: Vec<Vec<u8>>) -> Result<Self> {
        let public = RsaPublicKey::from(&key);

        let mut leaf = None;
        for (index, der) in certificates.iter().enumerate() {
            let cert = parse_certificate(der)?;
            let matches = RsaPublicKey::from_public_key_der(cert.public_key().raw)
                .map(|k| k == public)
                .unwrap_or(false);
            if matches {
                leaf = Some((index, CertificateInfo::from_x509(&cert)?));
                break;
            }
        }

        let (index, info) = leaf.ok_or_else(|| {
            Error::Configuration("no certificate matches the private key".to_string())
        })?;

        let mut chain = certificates;
        let leaf_der = chain.remove(index);
        chain.insert(0, leaf_der);

        Ok(Self { key, chain, info })
    }

    /// Read a PEM bundle holding certificates and an RSA private key
    ///
    /// The key may be PKCS#8 (encrypted with `passphrase` or not) or PKCS#1.
    pub fn from_pem(pem: &[u8], passphrase: Option<&str>) -> Result<Self> {
        let mut key = None;
        let mut certificates = Vec::new();

        for block in Pem::iter_from_buffer(pem) {
            let block = block.map_err(|e| Error::Configuration(format!("invalid PEM data: {}", e)))?;
            match block.label.as_str() {
                "CERTIFICATE" => {
                    parse_certificate(&block.contents)?;
                    certificates.push(block.contents);
                }
                "PRIVATE KEY" => {
                    key = Some(RsaPrivateKey::from_pkcs8_der(&block.contents).map_err(|e| {
                        Error::cryptographic("invalid PKCS#8 private key", e.to_string())
                    })?);
                }
                "ENCRYPTED PRIVATE KEY" => {
                    let passphrase = passphrase.ok_or_else(|| {
                        Error::Configuration("private key is encrypted and no passphrase was given".to_string())
                    })?;
                    key = Some(
                        RsaPrivateKey::from_pkcs8_encrypted_der(&block.contents, passphrase)
                            .map_err(|e| {
                                Error::cryptographic("cannot decrypt private key", e.to_string())
                            })?,
                    );
                }
                "RSA PRIVATE KEY" => {
                    key = Some(RsaPrivateKey::from_pkcs1_der(&block.contents).map_err(|e| {
                        Error::cryptographic("invalid PKCS#1 private key", e.to_string())
                    })?);
                }
                other => log::debug!("ignoring PEM block '{}'", other),
            }
        }

        let key = key.ok_or_else(|| Error::Configuration("no private key in PEM data".to_string()))?;
        if certificates.is_empty() {
            return Err(Error::Configuration("no certificate in PEM data".to_string()));
        }
        Self::from_parts(key, certificates)
    }

    /// Load a PEM bundle from a file
    pub fn load_from_file(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "certificate file not found: {}",
                path.display()
            )));
        }
        let handle = Self::from_pem(&fs::read(path)?, passphrase)?;
        log::info!(
            "loaded certificate {} ({}) from {}",
            handle.info.serial,
            handle.info.subject,
            path.display()
        );
        Ok(handle)
    }

    /// Details of the leaf certificate
    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    /// DER certificates, leaf first
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// DER of the leaf certificate
    pub fn certificate_der(&self) -> &[u8] {
        &self.chain[0]
    }

    /// Public key of the leaf certificate
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.key)
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.key
    }
}

impl fmt::Debug for CertificateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateHandle")
            .field("info", &self.info)
            .field("private_key", &"[REDACTED]")
            .field("chain", &format!("{} certificates", self.chain.len()))
            .finish()
    }
}

pub(crate) fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>> {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(|e| Error::Configuration(format!("invalid certificate: {}", e)))
}

/// Read the details of every certificate in a PEM buffer
pub fn inspect_pem(pem: &[u8]) -> Result<Vec<CertificateInfo>> {
    let mut infos = Vec::new();
    for block in Pem::iter_from_buffer(pem) {
        let block = block.map_err(|e| Error::Configuration(format!("invalid PEM data: {}", e)))?;
        if block.label == "CERTIFICATE" {
            infos.push(CertificateInfo::from_x509(&parse_certificate(&block.contents)?)?);
        }
    }
    Ok(infos)
}

/// Source of signing certificates
pub trait CertificateStore {
    /// Certificates the store holds, leaf certificates only
    fn list(&self) -> Result<Vec<CertificateInfo>>;

    /// Open the certificate with the given serial, private key included
    fn open(&self, serial: &str) -> Result<CertificateHandle>;

    /// Certificates currently valid and allowed to sign
    fn usable(&self) -> Result<Vec<CertificateInfo>> {
        Ok(self.list()?.into_iter().filter(|c| c.is_usable()).collect())
    }
}

/// Store backed by a directory of PEM bundles (`*.pem`), one identity each
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    passphrase: Option<String>,
}

impl DirectoryStore {
    /// Open a directory; `passphrase` decrypts the keys of its bundles
    pub fn new(dir: impl Into<PathBuf>, passphrase: Option<String>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::Configuration(format!(
                "certificate directory not found: {}",
                dir.display()
            )));
        }
        Ok(Self { dir, passphrase })
    }

    fn bundles(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("pem") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn leaf_of(path: &Path) -> Option<CertificateInfo> {
        let bytes = fs::read(path).ok()?;
        match inspect_pem(&bytes) {
            Ok(infos) => infos.into_iter().next(),
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl CertificateStore for DirectoryStore {
    fn list(&self) -> Result<Vec<CertificateInfo>> {
        Ok(self
            .bundles()?
            .iter()
            .filter_map(|path| Self::leaf_of(path))
            .collect())
    }

    fn open(&self, serial: &str) -> Result<CertificateHandle> {
        for path in self.bundles()? {
            if Self::leaf_of(&path).map_or(false, |info| info.matches_serial(serial)) {
                return CertificateHandle::load_from_file(&path, self.passphrase.as_deref());
            }
        }
        Err(Error::Configuration(format!("certificate not found: {}", serial)))
    }
}

/// Chooses one certificate out of a listing
pub trait CertificatePicker {
    /// Index of the chosen certificate, `None` when the choice was cancelled
    fn pick(&self, candidates: &[CertificateInfo]) -> Option<usize>;
}

/// Open the usable certificate with the given serial
pub fn select_by_serial(store: &dyn CertificateStore, serial: &str) -> Result<CertificateHandle> {
    let info = store
        .usable()?
        .into_iter()
        .find(|info| info.matches_serial(serial))
        .ok_or_else(|| Error::Configuration(format!("certificate not found: {}", serial)))?;
    store.open(&info.serial)
}

/// Let `picker` choose among the usable certificates of `store`
pub fn select_interactive(
    store: &dyn CertificateStore,
    picker: &dyn CertificatePicker,
) -> Result<CertificateHandle> {
    let candidates = store.usable()?;
    if candidates.is_empty() {
        return Err(Error::Configuration("no valid certificate available".to_string()));
    }

    let index = picker
        .pick(&candidates)
        .ok_or_else(|| Error::Configuration("certificate selection cancelled".to_string()))?;
    let info = candidates
        .get(index)
        .ok_or_else(|| Error::Configuration(format!("invalid certificate choice: {}", index)))?;
    store.open(&info.serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_serial() {
        assert_eq!(normalize_serial("00:1a:2B"), "1A2B");
        assert_eq!(normalize_serial("1A2B"), "1A2B");
        assert_eq!(normalize_serial("00"), "0");
    }

    #[test]
    fn test_hex_upper() {
        assert_eq!(hex_upper(&[0x00, 0xAB, 0x01]), "00AB01");
    }

    #[test]
    fn test_missing_file() {
        let err = CertificateHandle::load_from_file("/nonexistent/cert.pem", None).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("certificate file not found"));
    }

    #[test]
    fn test_pem_without_key() {
        let err = CertificateHandle::from_pem(b"not pem at all\n", None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validity_window() {
        let info = CertificateInfo {
            subject: "CN=Teste".to_string(),
            issuer: "CN=AC Teste".to_string(),
            serial: "01".to_string(),
            not_before: Utc.timestamp_opt(0, 0).unwrap(),
            not_after: Utc.timestamp_opt(1_000, 0).unwrap(),
            digital_signature: true,
        };
        assert!(info.is_valid_at(Utc.timestamp_opt(500, 0).unwrap()));
        assert!(!info.is_valid_at(Utc.timestamp_opt(1_001, 0).unwrap()));
        assert!(!info.is_usable());
        assert!(info.matches_serial("0x01"));
    }
}
