//! certify-core: certificate issuance pipeline.
//!
//! Turns a roster of participants into uniquely identified, QR-verifiable
//! PDF certificates and an outcome report.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`derive_id()`] / [`verify_identity()`] -- deterministic certificate IDs
//! - [`Encoder`] -- verification URL and QR image for one certificate
//! - [`PdfRenderer`] -- merges a [`Layout`] and writes the PDF document
//! - [`Issuer`] -- runs a batch with per-record failure isolation
//! - [`save_report()`] -- one CSV row per record, in roster order
//! - [`load_roster()`] -- roster CSV ingestion
//! - [`deliver_all()`] -- hand issued certificates to a [`Deliver`] sink
//!
//! Configuration is an explicit [`Config`] value; nothing is global.

pub mod batch;
pub mod config;
pub mod delivery;
pub mod error;
pub mod identity;
pub mod layout;
pub mod pdf;
pub mod record;
pub mod render;
pub mod report;
pub mod roster;
pub mod scan;
pub mod verification;

// ── Convenience re-exports: key types ────────────────────────────────

pub use batch::{BatchOutcome, Issuer};
pub use config::Config;
pub use delivery::{compose, deliver_all, Deliver, Delivery, DeliveryTally, Outbox};
pub use error::{
    ConfigError, DeliveryError, EncodeError, IssueError, RenderError, ReportError, RosterError,
    ScanError, StageError,
};
pub use identity::{derive_id, verify_identity, CertificateId, CertificateIdentity};
pub use layout::Layout;
pub use record::{Annotations, IssuedRecord, OutcomeRecord, ParticipantRecord, Stage, Status};
pub use render::{Field, PdfRenderer, Render, RenderedDocument};
pub use report::{aggregate, save_report, ReportRow};
pub use roster::{load_roster, RosterEntry};
pub use scan::scan_png;
pub use verification::{certificate_id_from_url, verification_url, Encoder, QrSettings};
