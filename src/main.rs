//! Command-line interface for dfe-core

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use dfe_core::schema::{validate_xml_with_limits, ValidationReport};
#[cfg(feature = "cli")]
use dfe_core::signing::{
    inspect_pem, verify_enveloped, CertificateHandle, CertificateInfo, DigestAlgorithm, Placement,
    SignatureOptions, Signer,
};
#[cfg(feature = "cli")]
use dfe_core::Limits;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "dfe")]
#[command(author, version, about = "DF-e signing and schema validation tool", long_about = None)]
struct Cli {
    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LimitsPreset {
    Default,
    Strict,
    Permissive,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an XML document against an XSD schema
    Validate {
        /// Path to the XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Path to the XML file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Resource limits applied to the document and the schema
        #[arg(short, long, value_enum, default_value = "default")]
        limits: LimitsPreset,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Append an enveloped signature to an XML document
    Sign {
        /// Path to the XML file to sign
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// PEM bundle with the certificate chain and the private key
        #[arg(short, long, value_name = "PEM")]
        cert: PathBuf,

        /// Passphrase of an encrypted private key
        #[arg(short, long, env = "DFE_CERT_PASSPHRASE")]
        passphrase: Option<String>,

        /// Reference URI: "" for the whole document or "#id"
        #[arg(short, long, default_value = "")]
        reference: String,

        /// Element that receives the signature
        #[arg(short, long)]
        tag: String,

        /// Use SHA-256 instead of SHA-1
        #[arg(long)]
        sha256: bool,

        /// Place the signature after the element instead of inside it
        #[arg(long)]
        sibling: bool,

        /// Keep comments in the signed reference
        #[arg(long)]
        comments: bool,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the enveloped signature of an XML document
    Verify {
        /// Path to the signed XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Display the certificates of a PEM bundle
    Cert {
        /// Path to the PEM bundle
        #[arg(value_name = "PEM")]
        file: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Validate {
            schema,
            file,
            limits,
            json,
        } => cmd_validate(schema, file, limits, json),
        Commands::Sign {
            file,
            cert,
            passphrase,
            reference,
            tag,
            sha256,
            sibling,
            comments,
            output,
        } => {
            let options = SignatureOptions::default()
                .with_digest(if sha256 { DigestAlgorithm::Sha256 } else { DigestAlgorithm::Sha1 })
                .with_placement(if sibling { Placement::Sibling } else { Placement::Child });
            cmd_sign(file, cert, passphrase, &reference, &tag, options, comments, output)
        }
        Commands::Verify { file } => cmd_verify(file),
        Commands::Cert { file, json } => cmd_cert(file, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn cmd_validate(
    schema_path: PathBuf,
    file: PathBuf,
    preset: LimitsPreset,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let limits = match preset {
        LimitsPreset::Default => Limits::default(),
        LimitsPreset::Strict => Limits::strict(),
        LimitsPreset::Permissive => Limits::permissive(),
    };

    let xml_content = fs::read_to_string(&file)?;
    let report = validate_xml_with_limits(&xml_content, &schema_path, limits);

    if json_output {
        print_report_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.ok() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn print_report(report: &ValidationReport) {
    if report.ok() {
        println!("✓ Document is valid");
    } else {
        println!("✗ Document is invalid");
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  - {}", error);
        }
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }
}

#[cfg(feature = "cli")]
fn print_report_json(report: &ValidationReport) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::json!({
        "ok": report.ok(),
        "errors": report.errors,
        "warnings": report.warnings,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

#[cfg(feature = "cli")]
#[allow(clippy::too_many_arguments)]
fn cmd_sign(
    file: PathBuf,
    cert: PathBuf,
    passphrase: Option<String>,
    reference: &str,
    tag: &str,
    options: SignatureOptions,
    comments: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let xml_content = fs::read_to_string(&file)?;
    let certificate = CertificateHandle::load_from_file(&cert, passphrase.as_deref())?;

    let signed = Signer::with_options(&certificate, options).sign(&xml_content, reference, tag, comments)?;

    if let Some(output_path) = output {
        fs::write(output_path, &signed)?;
    } else {
        println!("{}", signed);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_verify(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let xml_content = fs::read_to_string(&file)?;
    if verify_enveloped(&xml_content)? {
        println!("✓ Signature is valid");
        Ok(())
    } else {
        println!("✗ Signature does not match the document");
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn cmd_cert(file: PathBuf, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let pem = fs::read(&file)?;
    let certificates = inspect_pem(&pem)?;
    if certificates.is_empty() {
        return Err(format!("no certificate found in {}", file.display()).into());
    }

    if json_output {
        let list: Vec<serde_json::Value> = certificates.iter().map(certificate_json).collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    for (i, info) in certificates.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("Certificate {}:", i + 1);
        println!("  Subject: {}", info.subject);
        println!("  Issuer: {}", info.issuer);
        println!("  Serial: {}", info.serial);
        println!("  Valid from: {}", info.not_before.to_rfc3339());
        println!("  Valid until: {}", info.not_after.to_rfc3339());
        println!("  Digital signature: {}", info.digital_signature);
        println!("  Usable now: {}", info.is_usable());
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn certificate_json(info: &CertificateInfo) -> serde_json::Value {
    serde_json::json!({
        "subject": info.subject,
        "issuer": info.issuer,
        "serial": info.serial,
        "notBefore": info.not_before.to_rfc3339(),
        "notAfter": info.not_after.to_rfc3339(),
        "digitalSignature": info.digital_signature,
        "usable": info.is_usable(),
    })
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
