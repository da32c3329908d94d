//! Enveloped XML digital signatures
//!
//! Certificates are acquired through [`certificates`] (file, directory store,
//! interactive pick) and handed to the [`Signer`] as a [`CertificateHandle`].
//!
//! ```rust,ignore
//! use dfe_core::signing::{sign, CertificateHandle};
//!
//! let certificate = CertificateHandle::load_from_file("certificado.pem", Some("1234"))?;
//! let signed = sign(&xml, "#NFe3524...", "NFe", &certificate, false)?;
//! ```

pub mod c14n;
pub mod certificates;
pub mod signer;
pub mod verify;

pub use c14n::{canonicalize, Canonicalizer};
pub use certificates::{
    inspect_pem, select_by_serial, select_interactive, CertificateHandle, CertificateInfo,
    CertificatePicker, CertificateStore, DirectoryStore,
};
pub use signer::{sign, DigestAlgorithm, Placement, SignatureOptions, Signer};
pub use verify::verify_enveloped;
