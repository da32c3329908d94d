//! Integration tests for certificate acquisition, signing and verification

use dfe_core::schema::SchemaSet;
use dfe_core::signing::{
    inspect_pem, select_by_serial, select_interactive, sign, verify_enveloped, CertificateHandle,
    CertificateInfo, CertificatePicker, CertificateStore, DigestAlgorithm, DirectoryStore,
    Placement, SignatureOptions, Signer,
};
use dfe_core::Error;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const NFE_ID: &str = "NFe35240112345678000195550010000000011000000019";

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn certificate(name: &str, passphrase: Option<&str>) -> CertificateHandle {
    CertificateHandle::load_from_file(fixtures_dir().join("certs").join(name), passphrase).unwrap()
}

fn nfe() -> String {
    fs::read_to_string(fixtures_dir().join("documents").join("nfe-valid.xml")).unwrap()
}

// ============================================================================
// Certificate acquisition
// ============================================================================

#[test]
fn test_key_formats_load_the_same_identity() {
    let plain = certificate("signer.pem", None);
    let pkcs1 = certificate("signer-pkcs1.pem", None);
    let encrypted = certificate("signer-encrypted.pem", Some("1234"));

    assert_eq!(plain.info().serial, "1A2B3C4D");
    assert_eq!(pkcs1.info(), plain.info());
    assert_eq!(encrypted.info(), plain.info());
    assert_eq!(encrypted.public_key(), plain.public_key());
}

#[test]
fn test_encrypted_key_needs_the_right_passphrase() {
    let path = fixtures_dir().join("certs").join("signer-encrypted.pem");

    let err = CertificateHandle::load_from_file(&path, None).unwrap_err();
    assert!(err.is_configuration());

    let err = CertificateHandle::load_from_file(&path, Some("errada")).unwrap_err();
    assert!(matches!(err, Error::Cryptographic { .. }));
}

#[test]
fn test_missing_certificate_file() {
    let err = CertificateHandle::load_from_file("/nonexistent/certificado.pem", Some("1234")).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("certificate file not found"));
}

#[test]
fn test_chain_is_leaf_first() {
    let handle = certificate("chained.pem", None);
    assert_eq!(handle.chain().len(), 2);
    assert!(handle.info().subject.contains("FILIAL TESTE"));

    let infos = inspect_pem(&fs::read(fixtures_dir().join("certs").join("chained.pem")).unwrap()).unwrap();
    assert_eq!(infos.len(), 2);
    assert!(infos[0].subject.contains("AC TESTE RAIZ"));
}

fn store() -> DirectoryStore {
    DirectoryStore::new(fixtures_dir().join("certs").join("store"), None).unwrap()
}

#[test]
fn test_store_listing_filters_unusable() {
    let store = store();
    assert_eq!(store.list().unwrap().len(), 3);

    let usable = store.usable().unwrap();
    assert_eq!(usable.len(), 1);
    assert_eq!(usable[0].serial, "1A2B3C4D");
}

#[test]
fn test_select_by_serial() {
    let store = store();
    let handle = select_by_serial(&store, "1a:2b:3c:4d").unwrap();
    assert_eq!(handle.info().serial, "1A2B3C4D");

    let err = select_by_serial(&store, "0BAD").unwrap_err();
    assert!(err.is_configuration(), "expired certificates are not selectable");

    let err = select_by_serial(&store, "FFFF").unwrap_err();
    assert!(err.to_string().contains("certificate not found"));
}

struct FirstMatching(&'static str);

impl CertificatePicker for FirstMatching {
    fn pick(&self, candidates: &[CertificateInfo]) -> Option<usize> {
        candidates.iter().position(|c| c.subject.contains(self.0))
    }
}

#[test]
fn test_select_interactive() {
    let store = store();
    let handle = select_interactive(&store, &FirstMatching("EMPRESA TESTE")).unwrap();
    assert_eq!(handle.info().serial, "1A2B3C4D");

    let err = select_interactive(&store, &FirstMatching("SOMENTE CIFRA")).unwrap_err();
    assert!(err.to_string().contains("cancelled"));
}

#[test]
fn test_missing_store_directory() {
    let err = DirectoryStore::new("/nonexistent/store", None).unwrap_err();
    assert!(err.is_configuration());
}

// ============================================================================
// Signing
// ============================================================================

#[test]
fn test_signed_nfe_verifies_and_validates() {
    let xml = nfe();
    let cert = certificate("signer.pem", None);
    let signed = sign(&xml, &format!("#{}", NFE_ID), "NFe", &cert, false).unwrap();

    let start = signed.find("<Signature ").unwrap();
    let end = signed.rfind("</NFe>").unwrap();
    assert_eq!(&signed[..start], &xml[..xml.rfind("</NFe>").unwrap()]);
    assert_eq!(&signed[end..], &xml[xml.rfind("</NFe>").unwrap()..]);
    assert!(verify_enveloped(&signed).unwrap());

    let schema = SchemaSet::from_file(fixtures_dir().join("schemas").join("nfe_v4.00.xsd")).unwrap();
    let report = schema.validate(&signed);
    assert!(report.ok(), "{:?}", report.errors);
}

#[test]
fn test_absent_insertion_tag_leaves_input_untouched() {
    let xml = nfe();
    let before = xml.clone();
    let cert = certificate("signer.pem", None);

    let err = sign(&xml, "", "evento", &cert, false).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(xml, before);
}

#[test]
fn test_unknown_reference_id() {
    let cert = certificate("signer.pem", None);
    let err = sign(&nfe(), "#NFe000", "NFe", &cert, false).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_sha256_sibling_signature() {
    let cert = certificate("signer.pem", None);
    let options = SignatureOptions::default()
        .with_digest(DigestAlgorithm::Sha256)
        .with_placement(Placement::Sibling);
    let xml = r#"<enviEvento versao="1.00"><evento><infEvento Id="ID1101113524"><tpEvento>110111</tpEvento></infEvento></evento></enviEvento>"#;

    let signed = Signer::with_options(&cert, options)
        .sign(xml, "#ID1101113524", "infEvento", false)
        .unwrap();

    assert!(signed.contains("</infEvento><Signature "));
    assert!(signed.contains(DigestAlgorithm::Sha256.signature_uri()));
    assert!(signed.contains(DigestAlgorithm::Sha256.digest_uri()));
    assert!(verify_enveloped(&signed).unwrap());
}

#[test]
fn test_same_document_reference_ignores_comments() {
    let cert = certificate("signer.pem", None);
    let xml = "<CFe><!-- gerado pelo SAT --><infCFe Id=\"CFe1\"><ide><cUF>35</cUF></ide></infCFe></CFe>";
    let signed = sign(xml, "", "CFe", &cert, true).unwrap();
    assert!(signed.contains("REC-xml-c14n-20010315#WithComments"));
    assert!(verify_enveloped(&signed).unwrap());

    let comment_changed = signed.replace("gerado pelo SAT", "gerado por outro");
    assert!(verify_enveloped(&comment_changed).unwrap());

    let content_changed = signed.replace("<cUF>35</cUF>", "<cUF>41</cUF>");
    assert!(!verify_enveloped(&content_changed).unwrap());
}

#[test]
fn test_tampered_value_fails_verification() {
    let cert = certificate("signer.pem", None);
    let signed = sign(&nfe(), &format!("#{}", NFE_ID), "NFe", &cert, false).unwrap();
    let tampered = signed.replace("<vNF>42.50</vNF>", "<vNF>4.25</vNF>");
    assert!(!verify_enveloped(&tampered).unwrap());
}

#[test]
fn test_certificate_chain_in_key_info() {
    let cert = certificate("chained.pem", None);
    let signed = sign("<doc><a>1</a></doc>", "", "doc", &cert, false).unwrap();
    assert_eq!(signed.matches("<X509Certificate>").count(), 2);
    assert!(verify_enveloped(&signed).unwrap());
}

#[test]
fn test_signing_from_worker_threads() {
    let cert = std::sync::Arc::new(certificate("signer.pem", None));
    let dir = TempDir::new().unwrap();

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let cert = std::sync::Arc::clone(&cert);
            let path = dir.path().join(format!("doc{}.xml", i));
            std::thread::spawn(move || {
                let xml = format!("<doc><n Id=\"n{0}\">{0}</n></doc>", i);
                let signed = sign(&xml, &format!("#n{}", i), "doc", &cert, false).unwrap();
                fs::write(&path, &signed).unwrap();
                path
            })
        })
        .collect();

    for handle in handles {
        let path = handle.join().unwrap();
        let signed = fs::read_to_string(path).unwrap();
        assert!(verify_enveloped(&signed).unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_signed_text_verifies(text in "[A-Za-z0-9 &<>çãé]{0,40}") {
        let cert = certificate("signer.pem", None);
        let escaped = text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
        let xml = format!("<NFe><infNFe Id=\"NFe1\"><xProd>{}</xProd></infNFe></NFe>", escaped);

        let signed = sign(&xml, "#NFe1", "NFe", &cert, false).unwrap();
        prop_assert!(signed.starts_with(&xml[..xml.len() - "</NFe>".len()]));
        prop_assert!(verify_enveloped(&signed).unwrap());
    }
}
