//! Outcome report: one CSV row per roster record, in roster order.
//!
//! The file starts with a UTF-8 byte-order mark so spreadsheet software
//! picks the right encoding for Cyrillic headers and names.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::ReportError;
use crate::record::{IssuedRecord, Status};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Column headers, in column order.
pub const HEADERS: [&str; 10] = [
    "ID",
    "Полное имя",
    "Email",
    "Курс",
    "Часы",
    "Дата завершения",
    "ID сертификата",
    "Ссылка для верификации",
    "Файл сертификата",
    "Статус",
];

pub const STATUS_SUCCESS: &str = "Успешно";
pub const STATUS_ERROR: &str = "Ошибка";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Полное имя")]
    pub full_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Курс")]
    pub course: String,
    #[serde(rename = "Часы")]
    pub hours: u32,
    #[serde(rename = "Дата завершения")]
    pub date_completed: String,
    #[serde(rename = "ID сертификата")]
    pub certificate_id: String,
    #[serde(rename = "Ссылка для верификации")]
    pub verification_url: String,
    #[serde(rename = "Файл сертификата")]
    pub document_file: String,
    #[serde(rename = "Статус")]
    pub status: &'static str,
}

/// Project issued records onto report rows. A record without a certificate
/// ID is reported as failed whatever else it carries.
pub fn aggregate(records: &[IssuedRecord]) -> Vec<ReportRow> {
    records
        .iter()
        .map(|issued| {
            let p = &issued.participant;
            let a = &issued.outcome.annotations;
            let succeeded =
                a.certificate_id.is_some() && issued.outcome.status == Status::Success;
            ReportRow {
                id: p.id,
                full_name: p.full_name.clone(),
                email: p.email.clone(),
                course: p.course_name.clone(),
                hours: p.hours,
                date_completed: p.date_completed.clone(),
                certificate_id: a
                    .certificate_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                verification_url: a.verification_url.clone().unwrap_or_default(),
                document_file: a
                    .document_path
                    .as_deref()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                status: if succeeded {
                    STATUS_SUCCESS
                } else {
                    STATUS_ERROR
                },
            }
        })
        .collect()
}

/// Write `rows` as CSV (BOM, header, rows) to `writer`.
pub fn write_csv<W: Write>(rows: &[ReportRow], mut writer: W) -> Result<(), ReportError> {
    writer.write_all(UTF8_BOM)?;
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(HEADERS)?;
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn save_report(records: &[IssuedRecord], path: &Path) -> Result<(), ReportError> {
    let file = std::fs::File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(&aggregate(records), std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.display(), rows = records.len(), "report saved");
    Ok(())
}
