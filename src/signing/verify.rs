//! Verification of enveloped signatures

use super::c14n::Canonicalizer;
use super::certificates::parse_certificate;
use super::signer::{
    canonical_reference, resolve_reference, DigestAlgorithm, C14N_URI, C14N_WITH_COMMENTS_URI,
    ENVELOPED_SIGNATURE_URI,
};
use crate::error::{Error, Result};
use crate::namespaces::XMLDSIG_NAMESPACE;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use roxmltree::{Document, Node};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;

/// Check the first enveloped signature of `document`
///
/// Returns `Ok(false)` when the reference digest or the signature value does
/// not match, and an error when the signature is missing or malformed.
pub fn verify_enveloped(document: &str) -> Result<bool> {
    let doc = Document::parse(document)?;
    let signature = doc
        .descendants()
        .find(|n| n.has_tag_name((XMLDSIG_NAMESPACE, "Signature")))
        .ok_or_else(|| Error::Configuration("document has no signature".to_string()))?;

    let signed_info = child(signature, "SignedInfo")?;
    let c14n_method = algorithm(child(signed_info, "CanonicalizationMethod")?)?;
    let with_comments = match c14n_method {
        C14N_URI => false,
        C14N_WITH_COMMENTS_URI => true,
        other => return Err(unsupported("canonicalization", other)),
    };
    let signature_method = algorithm(child(signed_info, "SignatureMethod")?)?;
    let signature_alg = DigestAlgorithm::from_signature_uri(signature_method)
        .ok_or_else(|| unsupported("signature method", signature_method))?;

    let reference = child(signed_info, "Reference")?;
    let uri = reference.attribute("URI").unwrap_or_default();
    let enveloped = reference
        .children()
        .filter(|n| n.has_tag_name((XMLDSIG_NAMESPACE, "Transforms")))
        .flat_map(|t| t.children())
        .any(|t| t.attribute("Algorithm") == Some(ENVELOPED_SIGNATURE_URI));
    let digest_method = algorithm(child(reference, "DigestMethod")?)?;
    let digest_alg = DigestAlgorithm::from_digest_uri(digest_method)
        .ok_or_else(|| unsupported("digest method", digest_method))?;
    let expected_digest = decode(child(reference, "DigestValue")?)?;

    let target = resolve_reference(&doc, uri)?;
    let exclude = if enveloped { Some(signature) } else { None };
    let canonical = canonical_reference(&doc, target, exclude);
    if digest_alg.digest(canonical.as_bytes()) != expected_digest {
        log::warn!("digest mismatch for reference '{}'", uri);
        return Ok(false);
    }

    let certificate = signature
        .descendants()
        .find(|n| n.has_tag_name((XMLDSIG_NAMESPACE, "X509Certificate")))
        .ok_or_else(|| malformed("X509Certificate"))?;
    let der = decode(certificate)?;
    let cert = parse_certificate(&der)?;
    let public_key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
        .map_err(|e| Error::cryptographic("certificate key is not RSA", e))?;

    let signed_octets = Canonicalizer::new()
        .with_comments(with_comments)
        .subtree(signed_info);
    let hashed = signature_alg.digest(signed_octets.as_bytes());
    let value = decode(child(signature, "SignatureValue")?)?;

    match public_key.verify(signature_alg.padding(), &hashed, &value) {
        Ok(()) => Ok(true),
        Err(e) => {
            log::warn!("signature value does not verify: {}", e);
            Ok(false)
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>> {
    node.children()
        .find(|n| n.has_tag_name((XMLDSIG_NAMESPACE, name)))
        .ok_or_else(|| malformed(name))
}

fn algorithm<'a>(node: Node<'a, '_>) -> Result<&'a str> {
    node.attribute("Algorithm")
        .ok_or_else(|| malformed("Algorithm"))
}

fn decode(node: Node<'_, '_>) -> Result<Vec<u8>> {
    let text: String = node
        .text()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    STANDARD
        .decode(text)
        .map_err(|e| Error::cryptographic(format!("invalid base64 in {}", node.tag_name().name()), e))
}

fn malformed(missing: &str) -> Error {
    Error::Xml(format!("malformed signature: missing {}", missing))
}

fn unsupported(what: &str, uri: &str) -> Error {
    Error::Configuration(format!("unsupported {} '{}'", what, uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{sign, CertificateHandle};

    fn certificate() -> CertificateHandle {
        CertificateHandle::from_pem(include_bytes!("../../tests/fixtures/certs/signer.pem"), None).unwrap()
    }

    #[test]
    fn test_signed_document_verifies() {
        let xml = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><infNFe Id="NFe1"><vNF>1.00</vNF></infNFe></NFe>"#;
        let signed = sign(xml, "#NFe1", "NFe", &certificate(), false).unwrap();
        assert!(verify_enveloped(&signed).unwrap());
    }

    #[test]
    fn test_tampered_content_fails() {
        let xml = r#"<NFe><infNFe Id="NFe1"><vNF>1.00</vNF></infNFe></NFe>"#;
        let signed = sign(xml, "#NFe1", "NFe", &certificate(), false).unwrap();
        let tampered = signed.replace("1.00", "9.00");
        assert!(!verify_enveloped(&tampered).unwrap());
    }

    #[test]
    fn test_unsigned_document() {
        let err = verify_enveloped("<NFe/>").unwrap_err();
        assert!(err.is_configuration());
    }
}
