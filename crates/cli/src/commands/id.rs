use std::path::Path;
use std::process;

use certify_core::{
    certificate_id_from_url, derive_id, scan_png, verification_url, verify_identity,
    CertificateId, CertificateIdentity, Config,
};

use crate::{print_json, report_error, OutputFormat};

pub(crate) fn cmd_id(config: &Config, name: &str, course: &str, email: &str, output: OutputFormat) {
    let identity = CertificateIdentity {
        full_name: name,
        course_name: course,
        email,
    };
    let id = derive_id(&identity, &config.certificate_prefix);
    let url = verification_url(&config.base_url, &id);

    match output {
        OutputFormat::Text => {
            println!("{}", id);
            println!("{}", url);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "certificate_id": id,
            "verification_url": url,
        })),
    }
}

pub(crate) fn cmd_verify(
    config: &Config,
    id: &str,
    name: &str,
    course: &str,
    email: &str,
    output: OutputFormat,
    quiet: bool,
) {
    if CertificateId::parse(id, &config.certificate_prefix).is_none() {
        let msg = format!(
            "malformed certificate ID '{}': expected {}-<12 hex digits>",
            id, config.certificate_prefix
        );
        report_error(&msg, output, quiet);
        process::exit(1);
    }

    let identity = CertificateIdentity {
        full_name: name,
        course_name: course,
        email,
    };
    let valid = verify_identity(id, &identity, &config.certificate_prefix);
    print_verdict(id, valid, output, quiet);
    if !valid {
        process::exit(1);
    }
}

/// Decode a QR image, print the URL and ID it carries and, given an
/// identity, check the ID against it.
pub(crate) fn cmd_verify_qr(
    config: &Config,
    image: &Path,
    identity: Option<(&str, &str, &str)>,
    output: OutputFormat,
    quiet: bool,
) {
    let bytes = match std::fs::read(image) {
        Ok(b) => b,
        Err(e) => {
            let msg = format!("error reading image '{}': {}", image.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let url = match scan_png(&bytes) {
        Ok(url) => url,
        Err(e) => {
            report_error(&format!("{}: {}", image.display(), e), output, quiet);
            process::exit(1);
        }
    };
    let Some(id) = certificate_id_from_url(&url, &config.base_url) else {
        let msg = format!("'{}' is not a verification URL for {}", url, config.base_url);
        report_error(&msg, output, quiet);
        process::exit(1);
    };

    let valid = identity.map(|(name, course, email)| {
        let identity = CertificateIdentity {
            full_name: name,
            course_name: course,
            email,
        };
        verify_identity(id, &identity, &config.certificate_prefix)
    });

    match output {
        OutputFormat::Text => {
            if !quiet {
                println!("{}", url);
                println!("{}", id);
                if let Some(valid) = valid {
                    println!("{}", if valid { "valid" } else { "mismatch" });
                }
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "verification_url": url,
            "certificate_id": id,
            "valid": valid,
        })),
    }
    if valid == Some(false) {
        process::exit(1);
    }
}

fn print_verdict(id: &str, valid: bool, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Text => {
            if !quiet {
                if valid {
                    println!("{}: valid", id);
                } else {
                    println!("{}: does not match the given identity", id);
                }
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "certificate_id": id,
            "valid": valid,
        })),
    }
}
