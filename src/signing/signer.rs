//! Enveloped XML-DSig signing
//!
//! The signature is computed over the reference target as it stands before
//! insertion (the enveloped-signature transform removes it again when a
//! verifier recomputes the digest). `SignedInfo` is canonicalized in the
//! namespace context it has in the signed document, so the `<Signature>`
//! element is spliced into the text first and the result parsed again.

use super::c14n::{qualified_name, Canonicalizer};
use super::certificates::CertificateHandle;
use crate::error::{Error, Result};
use crate::namespaces::XMLDSIG_NAMESPACE;
use crate::serializer::{SerializerOptions, XmlElement};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use roxmltree::{Document, Node};
use rsa::Pkcs1v15Sign;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Canonical XML 1.0
pub const C14N_URI: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
/// Canonical XML 1.0 with comments
pub const C14N_WITH_COMMENTS_URI: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
/// Enveloped signature transform
pub const ENVELOPED_SIGNATURE_URI: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Attribute names accepted as element identifiers in `#id` references
pub(crate) const ID_ATTRIBUTES: [&str; 3] = ["Id", "ID", "id"];

/// Digest algorithm used for the reference and the signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-1, required by most DF-e layouts
    #[default]
    Sha1,
    /// SHA-256
    Sha256,
}

impl DigestAlgorithm {
    /// `DigestMethod` algorithm URI
    pub fn digest_uri(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
        }
    }

    /// `SignatureMethod` algorithm URI (RSA PKCS#1 v1.5)
    pub fn signature_uri(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
        }
    }

    /// Algorithm named by a `DigestMethod` URI
    pub fn from_digest_uri(uri: &str) -> Option<Self> {
        [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256]
            .into_iter()
            .find(|alg| alg.digest_uri() == uri)
    }

    /// Algorithm named by a `SignatureMethod` URI
    pub fn from_signature_uri(uri: &str) -> Option<Self> {
        [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256]
            .into_iter()
            .find(|alg| alg.signature_uri() == uri)
    }

    /// Get the name of this algorithm
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    /// Hash `data`
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    pub(crate) fn padding(&self) -> Pkcs1v15Sign {
        match self {
            DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
            DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        }
    }
}

/// Where the `<Signature>` element goes relative to the insertion element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Last child of the insertion element
    #[default]
    Child,
    /// Right after the insertion element
    Sibling,
}

/// Signing options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureOptions {
    /// Digest and signature algorithm
    pub digest: DigestAlgorithm,
    /// Position of the signature
    pub placement: Placement,
}

impl SignatureOptions {
    /// Use `digest`
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Use `placement`
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// Signs documents with one certificate
#[derive(Debug)]
pub struct Signer<'a> {
    certificate: &'a CertificateHandle,
    options: SignatureOptions,
}

impl<'a> Signer<'a> {
    /// Signer with default options (SHA-1, signature as last child)
    pub fn new(certificate: &'a CertificateHandle) -> Self {
        Self::with_options(certificate, SignatureOptions::default())
    }

    /// Signer with explicit options
    pub fn with_options(certificate: &'a CertificateHandle, options: SignatureOptions) -> Self {
        Self {
            certificate,
            options,
        }
    }

    /// Get the signing options
    pub fn options(&self) -> &SignatureOptions {
        &self.options
    }

    /// Return `document` with an enveloped signature of `reference_uri`
    /// placed at the unique element named `insertion_tag`
    ///
    /// `reference_uri` is `""` for the whole document or `#id` for the
    /// element whose `Id`, `ID` or `id` attribute is `id`. `insertion_tag` is
    /// matched against local names, or against the prefixed name as written
    /// when it contains a colon.
    pub fn sign(
        &self,
        document: &str,
        reference_uri: &str,
        insertion_tag: &str,
        include_comments: bool,
    ) -> Result<String> {
        let doc = Document::parse(document)?;
        let insertion = find_insertion(&doc, insertion_tag)?;
        let target = resolve_reference(&doc, reference_uri)?;

        let canonical = canonical_reference(&doc, target, None);
        let digest_value = STANDARD.encode(self.options.digest.digest(canonical.as_bytes()));

        let signed_info = self.signed_info(reference_uri, &digest_value, include_comments);
        let draft = render(&self.signature(signed_info.clone(), None))?;
        let (spliced, offset) = splice(document, insertion, self.options.placement, &draft);

        let signed_doc = Document::parse(&spliced)
            .map_err(|e| Error::cryptographic("signature insertion produced malformed XML", e))?;
        let signed_info_node = signed_doc
            .descendants()
            .find(|n| n.is_element() && n.range().start == offset)
            .and_then(|sig| {
                sig.children()
                    .find(|n| n.has_tag_name((XMLDSIG_NAMESPACE, "SignedInfo")))
            })
            .ok_or_else(|| Error::cryptographic("cannot locate SignedInfo", "inserted signature not found"))?;

        let canonical_signed_info = Canonicalizer::new().subtree(signed_info_node);
        let hashed = self.options.digest.digest(canonical_signed_info.as_bytes());
        let signature = self
            .certificate
            .private_key()
            .sign(self.options.digest.padding(), &hashed)
            .map_err(|e| Error::cryptographic("RSA signing failed", e))?;

        let element = render(&self.signature(signed_info, Some(&STANDARD.encode(signature))))?;
        let (signed, _) = splice(document, insertion, self.options.placement, &element);

        log::info!(
            "signed reference '{}' at <{}> with certificate {} ({})",
            reference_uri,
            insertion_tag,
            self.certificate.info().serial,
            self.options.digest.name()
        );
        Ok(signed)
    }

    fn signed_info(&self, reference_uri: &str, digest_value: &str, include_comments: bool) -> XmlElement {
        let mut c14n_method = XmlElement::new("CanonicalizationMethod");
        c14n_method.set_attribute("Algorithm", C14N_URI);
        let mut signature_method = XmlElement::new("SignatureMethod");
        signature_method.set_attribute("Algorithm", self.options.digest.signature_uri());

        let mut enveloped = XmlElement::new("Transform");
        enveloped.set_attribute("Algorithm", ENVELOPED_SIGNATURE_URI);
        let mut c14n = XmlElement::new("Transform");
        c14n.set_attribute(
            "Algorithm",
            if include_comments { C14N_WITH_COMMENTS_URI } else { C14N_URI },
        );
        let mut transforms = XmlElement::new("Transforms");
        transforms.push_child(enveloped);
        transforms.push_child(c14n);

        let mut digest_method = XmlElement::new("DigestMethod");
        digest_method.set_attribute("Algorithm", self.options.digest.digest_uri());

        let mut reference = XmlElement::new("Reference");
        reference.set_attribute("URI", reference_uri);
        reference.push_child(transforms);
        reference.push_child(digest_method);
        reference.push_child(XmlElement::with_text("DigestValue", digest_value));

        let mut signed_info = XmlElement::new("SignedInfo");
        signed_info.push_child(c14n_method);
        signed_info.push_child(signature_method);
        signed_info.push_child(reference);
        signed_info
    }

    fn signature(&self, signed_info: XmlElement, value: Option<&str>) -> XmlElement {
        let mut x509_data = XmlElement::new("X509Data");
        for der in self.certificate.chain() {
            x509_data.push_child(XmlElement::with_text("X509Certificate", STANDARD.encode(der)));
        }
        let mut key_info = XmlElement::new("KeyInfo");
        key_info.push_child(x509_data);

        let mut signature = XmlElement::new("Signature");
        signature.set_attribute("xmlns", XMLDSIG_NAMESPACE);
        signature.push_child(signed_info);
        signature.push_child(XmlElement::with_text("SignatureValue", value.unwrap_or_default()));
        signature.push_child(key_info);
        signature
    }
}

/// Sign with default options
///
/// See [`Signer::sign`].
pub fn sign(
    document: &str,
    reference_uri: &str,
    insertion_tag: &str,
    certificate: &CertificateHandle,
    include_comments: bool,
) -> Result<String> {
    Signer::new(certificate).sign(document, reference_uri, insertion_tag, include_comments)
}

fn render(element: &XmlElement) -> Result<String> {
    let options = SerializerOptions {
        format_xml: false,
        omit_declaration: true,
        ..SerializerOptions::default()
    };
    element
        .to_xml(&options)
        .map_err(|e| Error::cryptographic("cannot build the signature element", e))
}

fn find_insertion<'a, 'input>(doc: &'a Document<'input>, tag: &str) -> Result<Node<'a, 'input>> {
    let matches: Vec<Node<'a, 'input>> = doc
        .descendants()
        .filter(|n| n.is_element())
        .filter(|n| {
            if tag.contains(':') {
                qualified_name(*n) == tag
            } else {
                n.tag_name().name() == tag
            }
        })
        .collect();

    match matches.as_slice() {
        [node] => Ok(*node),
        [] => Err(Error::Configuration(format!(
            "insertion tag <{}> not found in document",
            tag
        ))),
        many => Err(Error::Configuration(format!(
            "insertion tag <{}> is ambiguous: {} elements match",
            tag,
            many.len()
        ))),
    }
}

/// Element a same-document reference points to; `None` for the whole document
pub(crate) fn resolve_reference<'a, 'input>(
    doc: &'a Document<'input>,
    uri: &str,
) -> Result<Option<Node<'a, 'input>>> {
    if uri.is_empty() {
        return Ok(None);
    }
    let id = match uri.strip_prefix('#') {
        Some(id) if !id.is_empty() && !id.starts_with("xpointer(") => id,
        _ => {
            return Err(Error::Configuration(format!(
                "unsupported reference URI '{}'",
                uri
            )))
        }
    };

    let mut found = doc.descendants().filter(|n| {
        n.is_element()
            && ID_ATTRIBUTES
                .iter()
                .any(|name| n.attribute(*name) == Some(id))
    });
    match (found.next(), found.next()) {
        (Some(node), None) => Ok(Some(node)),
        (None, _) => Err(Error::Configuration(format!(
            "reference target '{}' not found",
            uri
        ))),
        (Some(_), Some(_)) => Err(Error::Configuration(format!(
            "reference target '{}' is not unique",
            uri
        ))),
    }
}

/// Canonical octets of a reference target
///
/// Same-document references drop comments before any transform runs, so
/// the output never carries them.
pub(crate) fn canonical_reference(
    doc: &Document<'_>,
    target: Option<Node<'_, '_>>,
    exclude: Option<Node<'_, '_>>,
) -> String {
    let mut canonicalizer = Canonicalizer::new();
    if let Some(node) = exclude {
        canonicalizer = canonicalizer.excluding(node);
    }
    match target {
        Some(node) => canonicalizer.subtree(node),
        None => canonicalizer.document(doc),
    }
}

/// Insert `fragment` at `element`; returns the new text and the offset of
/// the fragment in it
fn splice(document: &str, element: Node<'_, '_>, placement: Placement, fragment: &str) -> (String, usize) {
    let range = element.range();
    let mut out = String::with_capacity(document.len() + fragment.len() + element.tag_name().name().len() + 3);

    let offset = match placement {
        Placement::Sibling => {
            out.push_str(&document[..range.end]);
            let offset = out.len();
            out.push_str(fragment);
            out.push_str(&document[range.end..]);
            offset
        }
        Placement::Child => {
            let source = &document[range.clone()];
            if source.ends_with("/>") {
                out.push_str(&document[..range.end - 2]);
                out.push('>');
                let offset = out.len();
                out.push_str(fragment);
                out.push_str("</");
                out.push_str(qualified_name(element));
                out.push('>');
                out.push_str(&document[range.end..]);
                offset
            } else {
                let close = range.start + source.rfind("</").unwrap_or(source.len());
                out.push_str(&document[..close]);
                let offset = out.len();
                out.push_str(fragment);
                out.push_str(&document[close..]);
                offset
            }
        }
    };
    (out, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NFE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><infNFe Id="NFe35240112345678000195550010000000011000000012" versao="4.00"><ide><cUF>35</cUF></ide><total><vNF>10.00</vNF></total></infNFe></NFe>"#;

    fn certificate() -> CertificateHandle {
        CertificateHandle::from_pem(include_bytes!("../../tests/fixtures/certs/signer.pem"), None).unwrap()
    }

    #[test]
    fn test_algorithm_uris() {
        assert_eq!(
            DigestAlgorithm::from_signature_uri("http://www.w3.org/2000/09/xmldsig#rsa-sha1"),
            Some(DigestAlgorithm::Sha1)
        );
        assert_eq!(
            DigestAlgorithm::from_digest_uri("http://www.w3.org/2001/04/xmlenc#sha256"),
            Some(DigestAlgorithm::Sha256)
        );
        assert_eq!(DigestAlgorithm::from_digest_uri("urn:md5"), None);
        assert_eq!(DigestAlgorithm::Sha1.digest(b"abc").len(), 20);
        assert_eq!(DigestAlgorithm::Sha256.digest(b"abc").len(), 32);
    }

    #[test]
    fn test_options_from_json() {
        let options: SignatureOptions =
            serde_json::from_str(r#"{ "digest": "sha256", "placement": "sibling" }"#).unwrap();
        assert_eq!(
            options,
            SignatureOptions::default()
                .with_digest(DigestAlgorithm::Sha256)
                .with_placement(Placement::Sibling)
        );
    }

    #[test]
    fn test_splice_child_and_sibling() {
        let xml = "<a><b x='1'>t</b><c/></a>";
        let doc = Document::parse(xml).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        let c = doc.descendants().find(|n| n.has_tag_name("c")).unwrap();

        assert_eq!(
            splice(xml, b, Placement::Child, "<S/>"),
            ("<a><b x='1'>t<S/></b><c/></a>".to_string(), 13)
        );
        assert_eq!(
            splice(xml, b, Placement::Sibling, "<S/>").0,
            "<a><b x='1'>t</b><S/><c/></a>"
        );
        assert_eq!(splice(xml, c, Placement::Child, "<S/>").0, "<a><b x='1'>t</b><c><S/></c></a>");
    }

    #[test]
    fn test_resolve_reference() {
        let doc = Document::parse(r#"<a><b id="x"/><c ID="y"/><d Id="z"/></a>"#).unwrap();
        assert!(resolve_reference(&doc, "").unwrap().is_none());
        assert!(resolve_reference(&doc, "#x").unwrap().unwrap().has_tag_name("b"));
        assert!(resolve_reference(&doc, "#y").unwrap().unwrap().has_tag_name("c"));
        assert!(resolve_reference(&doc, "#z").unwrap().unwrap().has_tag_name("d"));
        assert!(resolve_reference(&doc, "#w").unwrap_err().is_configuration());
        assert!(resolve_reference(&doc, "http://example.com/").unwrap_err().is_configuration());
    }

    #[test]
    fn test_sign_appends_signature_as_last_child() {
        let cert = certificate();
        let signed = sign(NFE, "#NFe35240112345678000195550010000000011000000012", "NFe", &cert, false).unwrap();

        let start = signed.find("<Signature ").unwrap();
        assert_eq!(&signed[..start], &NFE[..NFE.len() - "</NFe>".len()]);
        assert!(signed.ends_with("</Signature></NFe>"));
        assert!(signed.contains(r##"<Reference URI="#NFe35240112345678000195550010000000011000000012">"##));
        assert!(signed.contains(&format!(r#"<Transform Algorithm="{}"/>"#, ENVELOPED_SIGNATURE_URI)));
        assert!(signed.contains(&format!(r#"<Transform Algorithm="{}"/>"#, C14N_URI)));
        assert!(signed.contains("<X509Certificate>"));
    }

    #[test]
    fn test_missing_insertion_tag() {
        let cert = certificate();
        let err = sign(NFE, "", "Assinatura", &cert, false).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_ambiguous_insertion_tag() {
        let cert = certificate();
        let xml = "<lote><NFe/><NFe/></lote>";
        let err = sign(xml, "", "NFe", &cert, false).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_comment_transform_uri() {
        let cert = certificate();
        let signed = sign("<doc><a>1</a></doc>", "", "doc", &cert, true).unwrap();
        assert!(signed.contains(C14N_WITH_COMMENTS_URI));
    }
}
