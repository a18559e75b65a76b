//! Roster ingestion: CSV files of participants, plus the sample and random
//! rosters used for trial runs.
//!
//! Recognised columns (Russian header or English alias):
//!
//! | column            | alias           | required |
//! |-------------------|-----------------|----------|
//! | `Имя`             | `first_name`    | yes      |
//! | `Фамилия`         | `last_name`     | yes      |
//! | `Email`           | `email`         | yes      |
//! | `Отчество`        | `middle_name`   | no       |
//! | `Курс`            | `course`        | no       |
//! | `Часы`            | `hours`         | no       |
//! | `Дата_завершения` | `date_completed`| no       |
//!
//! A missing required column rejects the whole file before any record is
//! produced.

use std::io::{Read, Write};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::config::Config;
use crate::error::RosterError;
use crate::record::{iso_date, today_iso, ParticipantRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    FirstName,
    LastName,
    Email,
    MiddleName,
    Course,
    Hours,
    DateCompleted,
}

impl Column {
    const ALL: [Column; 7] = [
        Column::FirstName,
        Column::LastName,
        Column::Email,
        Column::MiddleName,
        Column::Course,
        Column::Hours,
        Column::DateCompleted,
    ];

    fn header(self) -> &'static str {
        match self {
            Column::FirstName => "Имя",
            Column::LastName => "Фамилия",
            Column::Email => "Email",
            Column::MiddleName => "Отчество",
            Column::Course => "Курс",
            Column::Hours => "Часы",
            Column::DateCompleted => "Дата_завершения",
        }
    }

    fn alias(self) -> &'static str {
        match self {
            Column::FirstName => "first_name",
            Column::LastName => "last_name",
            Column::Email => "email",
            Column::MiddleName => "middle_name",
            Column::Course => "course",
            Column::Hours => "hours",
            Column::DateCompleted => "date_completed",
        }
    }

    fn required(self) -> bool {
        matches!(self, Column::FirstName | Column::LastName | Column::Email)
    }

    fn matches(self, header: &str) -> bool {
        let header = header.trim();
        header == self.header() || header.eq_ignore_ascii_case(self.alias())
    }
}

/// A roster row before defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub email: String,
    pub course: Option<String>,
    pub hours: Option<u32>,
    pub date_completed: Option<String>,
}

impl RosterEntry {
    /// "First Middle Last", or "First Last" without a middle name.
    pub fn full_name(&self) -> String {
        match &self.middle_name {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
        .trim()
        .to_string()
    }

    pub fn into_record(self, id: u32, config: &Config) -> ParticipantRecord {
        ParticipantRecord {
            id,
            full_name: self.full_name(),
            email: self.email,
            course_name: self.course.unwrap_or_else(|| config.default_course.clone()),
            hours: self.hours.unwrap_or(config.default_hours),
            date_completed: self.date_completed.unwrap_or_else(today_iso),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse roster CSV from `reader` into entries.
pub fn read_entries<R: Read>(reader: R) -> Result<Vec<RosterEntry>, RosterError> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = csv
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut index = [None; 7];
    for (slot, column) in index.iter_mut().zip(Column::ALL) {
        *slot = headers.iter().position(|h| column.matches(h));
        if slot.is_none() && column.required() {
            return Err(RosterError::MissingColumn(column.header().to_string()));
        }
    }
    fn field<'r>(
        index: &[Option<usize>; 7],
        row: &'r csv::StringRecord,
        column: Column,
    ) -> Option<&'r str> {
        index[column as usize].and_then(|i| row.get(i))
    }

    let mut entries = Vec::new();
    for row in csv.records() {
        let row = row?;
        if row.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        entries.push(RosterEntry {
            first_name: non_empty(field(&index, &row, Column::FirstName)).unwrap_or_default(),
            last_name: non_empty(field(&index, &row, Column::LastName)).unwrap_or_default(),
            middle_name: non_empty(field(&index, &row, Column::MiddleName)),
            email: non_empty(field(&index, &row, Column::Email)).unwrap_or_default(),
            course: non_empty(field(&index, &row, Column::Course)),
            hours: non_empty(field(&index, &row, Column::Hours)).and_then(|raw| {
                let hours = parse_hours(&raw);
                if hours.is_none() {
                    let line = row.position().map(|p| p.line());
                    warn!(line, value = %raw, "unreadable hours, using the configured default");
                }
                hours
            }),
            date_completed: non_empty(field(&index, &row, Column::DateCompleted)),
        });
    }
    Ok(entries)
}

/// Whole academic hours. Spreadsheets export integer columns as `40.0`,
/// so an integral decimal is accepted too.
fn parse_hours(raw: &str) -> Option<u32> {
    if let Ok(hours) = raw.parse() {
        return Some(hours);
    }
    let hours: f64 = raw.replace(',', ".").parse().ok()?;
    (hours.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&hours)).then_some(hours as u32)
}

/// Parse roster CSV and apply `config` defaults. IDs are 1-based row
/// positions.
pub fn read_roster<R: Read>(reader: R, config: &Config) -> Result<Vec<ParticipantRecord>, RosterError> {
    let records: Vec<ParticipantRecord> = read_entries(reader)?
        .into_iter()
        .zip(1..)
        .map(|(entry, id)| entry.into_record(id, config))
        .collect();
    if records.is_empty() {
        return Err(RosterError::Empty);
    }
    Ok(records)
}

pub fn load_roster(path: &Path, config: &Config) -> Result<Vec<ParticipantRecord>, RosterError> {
    let file = std::fs::File::open(path).map_err(|source| RosterError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let records = read_roster(file, config)?;
    tracing::info!(path = %path.display(), participants = records.len(), "roster loaded");
    Ok(records)
}

/// Write entries as a roster CSV (UTF-8 BOM, Russian headers).
pub fn write_entries<W: Write>(entries: &[RosterEntry], mut writer: W) -> Result<(), RosterError> {
    writer
        .write_all(b"\xEF\xBB\xBF")
        .map_err(|e| RosterError::Csv(e.into()))?;
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(Column::ALL.map(Column::header))?;
    for e in entries {
        let hours = e.hours.map(|h| h.to_string()).unwrap_or_default();
        csv.write_record([
            e.first_name.as_str(),
            e.last_name.as_str(),
            e.email.as_str(),
            e.middle_name.as_deref().unwrap_or(""),
            e.course.as_deref().unwrap_or(""),
            hours.as_str(),
            e.date_completed.as_deref().unwrap_or(""),
        ])?;
    }
    csv.flush().map_err(|e| RosterError::Csv(e.into()))?;
    Ok(())
}

fn days_ago(days: i64) -> String {
    iso_date(time::OffsetDateTime::now_utc().date() - time::Duration::days(days))
}

/// Two example participants, for a first trial run.
pub fn sample_entries() -> Vec<RosterEntry> {
    vec![
        RosterEntry {
            first_name: "Диана".to_string(),
            last_name: "Полотебнова".to_string(),
            middle_name: Some("Алексеевна".to_string()),
            email: "diana@example.com".to_string(),
            course: Some("Основы Python".to_string()),
            hours: Some(40),
            date_completed: Some(today_iso()),
        },
        RosterEntry {
            first_name: "Радик".to_string(),
            last_name: "Карасин".to_string(),
            middle_name: Some("Дмитриевич".to_string()),
            email: "radik@example.com".to_string(),
            course: Some("Веб-разработка".to_string()),
            hours: Some(60),
            date_completed: Some(days_ago(7)),
        },
    ]
}

const FIRST_NAMES: [&str; 7] = ["Иван", "Петр", "Сергей", "Анна", "Мария", "Елена", "Алексей"];
const LAST_NAMES: [&str; 7] = [
    "Иванов", "Петров", "Сидоров", "Кузнецова", "Смирнова", "Попова", "Амажаев",
];
const COURSES: [&str; 5] = [
    "Основы Python",
    "Машинное обучение",
    "Веб-разработка",
    "Анализ данных",
    "DevOps",
];

/// `count` made-up participants. Emails are distinct by position.
pub fn random_entries<R: Rng + ?Sized>(count: u32, rng: &mut R) -> Vec<RosterEntry> {
    (1..=count)
        .map(|i| {
            let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Иван");
            let last = LAST_NAMES.choose(rng).copied().unwrap_or("Иванов");
            RosterEntry {
                first_name: first.to_string(),
                last_name: last.to_string(),
                middle_name: None,
                email: format!("{}.{}{}@example.com", last.to_lowercase(), first.to_lowercase(), i),
                course: COURSES.choose(rng).map(|c| c.to_string()),
                hours: Some(rng.gen_range(20..=100)),
                date_completed: Some(days_ago(rng.gen_range(1..=30))),
            }
        })
        .collect()
}
