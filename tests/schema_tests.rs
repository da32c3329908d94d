//! Schema validation against the NF-e 4.00 fixture schemas

use dfe_core::schema::{
    validate_xml, validate_xml_with_limits, SchemaSet, DOCUMENT_NOT_FOUND, SCHEMA_NOT_FOUND,
};
use dfe_core::Limits;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn schema_path() -> PathBuf {
    fixtures_dir().join("schemas").join("nfe_v4.00.xsd")
}

fn document(name: &str) -> String {
    fs::read_to_string(fixtures_dir().join("documents").join(name)).unwrap()
}

#[test]
fn test_valid_nfe() {
    let report = validate_xml(&document("nfe-valid.xml"), schema_path());
    assert!(report.ok(), "{:?}", report.errors);
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].contains("unique"));
}

#[test]
fn test_invalid_nfe_reports_every_violation() {
    let report = validate_xml(&document("nfe-invalid.xml"), schema_path());
    assert!(!report.ok());
    assert_eq!(report.errors.len(), 3, "{:#?}", report.errors);

    assert!(report.errors[0].contains("/NFe/infNFe/ide/cUF"));
    assert!(report.errors[1].contains("/NFe/infNFe/emit"));
    assert!(report.errors[2].contains("/NFe/infNFe/det/vProd"));
    assert!(report.errors.iter().all(|e| e.contains("line ")));
}

#[test]
fn test_empty_document() {
    let (ok, errors, warnings) = validate_xml("", schema_path()).into_parts();
    assert!(!ok);
    assert_eq!(errors, vec![DOCUMENT_NOT_FOUND.to_string()]);
    assert!(warnings.is_empty());
}

#[test]
fn test_whitespace_only_document_reaches_the_parser() {
    let report = validate_xml("  \n", schema_path());
    assert!(!report.ok());
    assert!(report.errors.iter().any(|e| e.contains("no root element")), "{:?}", report.errors);
}

#[test]
fn test_schema_warnings_precede_document_warnings() {
    let report = validate_xml(&document("nfe-valid.xml"), schema_path());
    assert!(report.warnings[0].contains("xs:unique"), "{:?}", report.warnings);
}

#[test]
fn test_missing_schema() {
    let missing = fixtures_dir().join("schemas").join("cte_v4.00.xsd");
    let report = validate_xml(&document("nfe-valid.xml"), missing);
    assert_eq!(report.errors, vec![SCHEMA_NOT_FOUND.to_string()]);
}

#[test]
fn test_malformed_document() {
    let report = validate_xml("<NFe xmlns=\"http://www.portalfiscal.inf.br/nfe\"><infNFe>", schema_path());
    assert!(!report.ok());
    assert!(report.errors.iter().any(|e| e.contains("not closed")));
}

#[test]
fn test_strict_limits_reject_deep_documents() {
    let mut xml = String::from("<NFe xmlns=\"http://www.portalfiscal.inf.br/nfe\">");
    let depth = Limits::strict().max_document_depth + 5;
    for _ in 0..depth {
        xml.push_str("<x>");
    }
    for _ in 0..depth {
        xml.push_str("</x>");
    }
    xml.push_str("</NFe>");

    let report = validate_xml_with_limits(&xml, schema_path(), Limits::strict());
    assert!(!report.ok());
}

#[test]
fn test_schema_shared_between_threads() {
    let schema = Arc::new(SchemaSet::from_file(schema_path()).unwrap());
    let documents = [("nfe-valid.xml", true), ("nfe-invalid.xml", false)];

    let handles: Vec<_> = documents
        .iter()
        .map(|&(name, expected)| {
            let schema = Arc::clone(&schema);
            let xml = document(name);
            std::thread::spawn(move || (schema.validate(&xml).ok(), expected))
        })
        .collect();

    for handle in handles {
        let (ok, expected) = handle.join().unwrap();
        assert_eq!(ok, expected);
    }
}

#[test]
fn test_compiled_schema_lists_sources() {
    let schema = SchemaSet::from_file(schema_path()).unwrap();
    assert_eq!(schema.sources().len(), 4);
    assert!(schema.root_names().any(|name| name.local_name == "NFe"));
}
