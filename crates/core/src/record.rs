use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::identity::{CertificateId, CertificateIdentity};

/// One participant as delivered by roster ingestion.
///
/// The pipeline never mutates a record; everything it produces lives in the
/// [`OutcomeRecord`] paired with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// 1-based position in the roster.
    pub id: u32,
    pub full_name: String,
    /// May be empty; it still takes part in ID derivation.
    pub email: String,
    pub course_name: String,
    pub hours: u32,
    /// ISO 8601 date (`YYYY-MM-DD`).
    pub date_completed: String,
}

impl ParticipantRecord {
    /// Build a record whose course, hours and completion date come from
    /// `config` and today's date.
    pub fn with_defaults(
        id: u32,
        full_name: impl Into<String>,
        email: impl Into<String>,
        config: &Config,
    ) -> Self {
        ParticipantRecord {
            id,
            full_name: full_name.into(),
            email: email.into(),
            course_name: config.default_course.clone(),
            hours: config.default_hours,
            date_completed: today_iso(),
        }
    }

    pub fn identity(&self) -> CertificateIdentity<'_> {
        CertificateIdentity {
            full_name: &self.full_name,
            course_name: &self.course_name,
            email: &self.email,
        }
    }
}

/// Current UTC date as `YYYY-MM-DD`.
pub fn today_iso() -> String {
    iso_date(time::OffsetDateTime::now_utc().date())
}

pub(crate) fn iso_date(date: time::Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Furthest point a record reached in the issuance state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    IdentityDerived,
    VerificationBuilt,
    Rendered,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// Artifacts produced for a record, filled in as stages complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    pub certificate_id: Option<CertificateId>,
    pub verification_url: Option<String>,
    pub document_path: Option<PathBuf>,
}

/// Result of processing one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub status: Status,
    pub stage: Stage,
    pub annotations: Annotations,
    pub error: Option<String>,
}

impl OutcomeRecord {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// A participant paired with what the pipeline produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedRecord {
    pub participant: ParticipantRecord,
    pub outcome: OutcomeRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_date_pads_fields() {
        let date = time::macros::date!(2024 - 03 - 07);
        assert_eq!(iso_date(date), "2024-03-07");
    }

    #[test]
    fn with_defaults_uses_config() {
        let config = Config {
            default_hours: 12,
            default_course: "Rust".to_string(),
            ..Config::default()
        };
        let record = ParticipantRecord::with_defaults(3, "Ada Lovelace", "", &config);
        assert_eq!(record.id, 3);
        assert_eq!(record.course_name, "Rust");
        assert_eq!(record.hours, 12);
        assert_eq!(record.date_completed.len(), 10);
    }
}
