//! Error types for every stage of the issuance pipeline.
//!
//! Record-scoped failures ([`EncodeError`], [`RenderError`]) are caught by the
//! batch orchestrator and turned into an error outcome for that record.
//! Batch-scoped failures ([`IssueError`]) abort a run before the first record.

use std::path::PathBuf;

use crate::render::Field;

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Roster ingestion failure. Fails the whole ingestion.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("roster is missing required column: {0}")]
    MissingColumn(String),

    #[error("roster has no participants")]
    Empty,

    #[error("could not read roster '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed roster: {0}")]
    Csv(#[from] csv::Error),
}

/// QR encoding failure for one record.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("verification URL of {len} bytes does not fit in a QR code")]
    DataTooLong { len: usize },

    #[error("QR encoding failed: {0}")]
    Qr(String),

    #[error(
        "QR raster of {modules} modules at {box_size} px with a {border}-module border exceeds {max} px",
        max = crate::verification::MAX_RASTER_SIDE
    )]
    RasterTooLarge {
        modules: u32,
        box_size: u32,
        border: u32,
    },

    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),

    #[error("could not write QR image '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Template merge or document generation failure for one record.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("layout does not place field '{0}'")]
    MissingField(Field),

    #[error("layout references unknown field '{0}'")]
    UnknownField(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("invalid layout: {0}")]
    Layout(String),

    #[error("font error: {0}")]
    Font(String),

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("could not write document '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A failure in one stage of one record's processing.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("verification encoding: {0}")]
    Encode(#[from] EncodeError),

    #[error("rendering: {0}")]
    Render(#[from] RenderError),
}

/// Failure that aborts a batch before any record is processed.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("output directory '{path}' is not writable: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("renderer setup failed: {0}")]
    Renderer(#[from] RenderError),
}

/// Report serialization failure.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("could not write report '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write report: {0}")]
    Write(#[from] std::io::Error),

    #[error("report serialization failed: {0}")]
    Csv(#[from] csv::Error),
}

/// A failed delivery of one issued certificate.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("participant {0} has no certificate to deliver")]
    NoCertificate(u32),

    #[error("participant {0} has no email address")]
    NoRecipient(u32),

    #[error("delivery failed: {0}")]
    Transport(String),

    #[error("could not write outbox entry '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failure to read a verification payload back from a QR image.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("could not decode PNG: {0}")]
    Png(#[from] png::DecodingError),

    #[error("unsupported PNG layout: {0}")]
    Unsupported(String),

    #[error("no QR code found in image")]
    NotFound,

    #[error("QR code could not be decoded: {0}")]
    Decode(String),
}
