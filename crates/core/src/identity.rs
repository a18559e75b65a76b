//! Deterministic certificate identifiers.
//!
//! A certificate ID is `<PREFIX>-<HEX12>`, where `HEX12` is the first twelve
//! hex digits (upper-cased) of the SHA-256 of
//! `full_name + "_" + course_name + "_" + email`. The derivation is a pure
//! function of those three fields, so anyone holding them can recompute and
//! check an ID without a database.
//!
//! An empty email still takes part as an empty field: two participants with
//! the same name and course and no email share an ID.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SEPARATOR: char = '_';
const HASH_CHARS: usize = 12;

/// The exact tuple hashed into a certificate ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateIdentity<'a> {
    pub full_name: &'a str,
    pub course_name: &'a str,
    pub email: &'a str,
}

impl CertificateIdentity<'_> {
    fn canonical(&self) -> String {
        let mut s = String::with_capacity(
            self.full_name.len() + self.course_name.len() + self.email.len() + 2,
        );
        s.push_str(self.full_name);
        s.push(SEPARATOR);
        s.push_str(self.course_name);
        s.push(SEPARATOR);
        s.push_str(self.email);
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    /// Accept `s` only if it has the `<prefix>-<12 uppercase hex>` shape.
    pub fn parse(s: &str, prefix: &str) -> Option<CertificateId> {
        let hash = s.strip_prefix(prefix)?.strip_prefix('-')?;
        let well_formed = hash.len() == HASH_CHARS
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
        well_formed.then(|| CertificateId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CertificateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn derive_id(identity: &CertificateIdentity<'_>, prefix: &str) -> CertificateId {
    let digest = Sha256::digest(identity.canonical().as_bytes());
    let hex = format!("{:x}", digest);
    CertificateId(format!(
        "{}-{}",
        prefix,
        hex[..HASH_CHARS].to_ascii_uppercase()
    ))
}

/// Recompute the ID for `identity` and compare it with `id`.
pub fn verify_identity(id: &str, identity: &CertificateIdentity<'_>, prefix: &str) -> bool {
    derive_id(identity, prefix).as_str() == id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ivan() -> CertificateIdentity<'static> {
        CertificateIdentity {
            full_name: "Иван Иванов",
            course_name: "Основы Python",
            email: "ivan@example.com",
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_id(&ivan(), "CERT");
        let b = derive_id(&ivan(), "CERT");
        assert_eq!(a, b);
    }

    #[test]
    fn id_has_prefix_and_twelve_uppercase_hex() {
        let id = derive_id(&ivan(), "CERT");
        let hash = id.as_str().strip_prefix("CERT-").unwrap();
        assert_eq!(hash.len(), 12);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert!(CertificateId::parse(id.as_str(), "CERT").is_some());
    }

    #[test]
    fn id_matches_sha256_of_canonical_string() {
        let expected = format!(
            "{:x}",
            Sha256::digest("Иван Иванов_Основы Python_ivan@example.com".as_bytes())
        );
        let id = derive_id(&ivan(), "CERT");
        assert_eq!(
            id.as_str(),
            format!("CERT-{}", expected[..12].to_ascii_uppercase())
        );
    }

    #[test]
    fn every_field_changes_the_id() {
        let base = derive_id(&ivan(), "CERT");
        let other_name = CertificateIdentity {
            full_name: "Пётр Петров",
            ..ivan()
        };
        let other_course = CertificateIdentity {
            course_name: "DevOps",
            ..ivan()
        };
        let other_email = CertificateIdentity {
            email: "ivan@example.org",
            ..ivan()
        };
        let ids = [
            base,
            derive_id(&other_name, "CERT"),
            derive_id(&other_course, "CERT"),
            derive_id(&other_email, "CERT"),
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn empty_email_still_hashes_and_collides() {
        let a = CertificateIdentity {
            email: "",
            ..ivan()
        };
        let b = a;
        assert_eq!(derive_id(&a, "CERT"), derive_id(&b, "CERT"));
        assert_ne!(derive_id(&a, "CERT"), derive_id(&ivan(), "CERT"));
    }

    #[test]
    fn prefix_is_part_of_the_id_only() {
        let cert = derive_id(&ivan(), "CERT");
        let edu = derive_id(&ivan(), "EDU");
        assert_eq!(&cert.as_str()[5..], &edu.as_str()[4..]);
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(CertificateId::parse("CERT-ABCDEF012345", "CERT").is_some());
        assert!(CertificateId::parse("CERT-abcdef012345", "CERT").is_none());
        assert!(CertificateId::parse("CERT-ABCDEF01234", "CERT").is_none());
        assert!(CertificateId::parse("EDU-ABCDEF012345", "CERT").is_none());
        assert!(CertificateId::parse("CERTABCDEF012345", "CERT").is_none());
    }

    #[test]
    fn verify_identity_recomputes() {
        let id = derive_id(&ivan(), "CERT");
        assert!(verify_identity(id.as_str(), &ivan(), "CERT"));
        let forged = CertificateIdentity {
            course_name: "Машинное обучение",
            ..ivan()
        };
        assert!(!verify_identity(id.as_str(), &forged, "CERT"));
    }
}
