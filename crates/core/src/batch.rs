//! Batch issuance.
//!
//! [`Issuer::run`] walks the roster in order and drives each record through
//! `Pending → IdentityDerived → VerificationBuilt → Rendered → Success`.
//! A failing stage ends that record in `Error` with the message captured and
//! the artifacts produced so far kept; the next record is processed as
//! usual. Nothing is retried within a run.
//!
//! Only one run may use a given set of output directories at a time.

use std::path::Path;

use tracing::{info, info_span, warn};

use crate::config::Config;
use crate::error::{IssueError, StageError};
use crate::identity::derive_id;
use crate::layout::Layout;
use crate::record::{Annotations, IssuedRecord, OutcomeRecord, ParticipantRecord, Stage, Status};
use crate::render::{PdfRenderer, Render};
use crate::verification::Encoder;

/// Every record of a run, in input order, with the tallies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub records: Vec<IssuedRecord>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.records.len()
    }
}

pub struct Issuer<R = PdfRenderer> {
    config: Config,
    encoder: Encoder,
    renderer: R,
}

impl Issuer<PdfRenderer> {
    /// Validate `config`, prepare the output directories and load the
    /// renderer. Any failure here is batch-scoped.
    pub fn new(config: Config, layout: Layout) -> Result<Self, IssueError> {
        config.validate()?;
        let renderer = PdfRenderer::new(layout, &config)?;
        Issuer::with_renderer(config, renderer)
    }
}

impl<R: Render> Issuer<R> {
    /// Validate `config` and prepare the output directories around an
    /// already built renderer.
    pub fn with_renderer(config: Config, renderer: R) -> Result<Self, IssueError> {
        config.validate()?;
        prepare_dir(&config.pdf_dir)?;
        prepare_dir(&config.qr_dir)?;
        let encoder = Encoder::new(config.base_url.clone(), config.qr, &config.qr_dir);
        Ok(Issuer {
            config,
            encoder,
            renderer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self, records: &[ParticipantRecord]) -> BatchOutcome {
        info!(records = records.len(), "starting certificate batch");
        let mut outcome = BatchOutcome {
            records: Vec::with_capacity(records.len()),
            succeeded: 0,
            failed: 0,
        };

        for record in records {
            let issued = self.issue_one(record);
            if issued.outcome.is_success() {
                outcome.succeeded += 1;
            } else {
                outcome.failed += 1;
            }
            outcome.records.push(issued);
        }

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            total = outcome.total(),
            "certificate batch finished"
        );
        outcome
    }

    /// Run one record through every stage. Never fails: stage errors end up
    /// in the returned outcome.
    pub fn issue_one(&self, record: &ParticipantRecord) -> IssuedRecord {
        let span = info_span!("certificate", record = record.id);
        let _guard = span.enter();

        let mut annotations = Annotations::default();
        let mut stage = Stage::Pending;

        let result = self.advance(record, &mut annotations, &mut stage);
        let outcome = match result {
            Ok(()) => {
                info!(
                    certificate_id = ?annotations.certificate_id,
                    "certificate issued"
                );
                OutcomeRecord {
                    status: Status::Success,
                    stage: Stage::Success,
                    annotations,
                    error: None,
                }
            }
            Err(e) => {
                warn!(stage = ?stage, error = %e, "certificate failed");
                OutcomeRecord {
                    status: Status::Error,
                    stage,
                    annotations,
                    error: Some(e.to_string()),
                }
            }
        };

        IssuedRecord {
            participant: record.clone(),
            outcome,
        }
    }

    fn advance(
        &self,
        record: &ParticipantRecord,
        annotations: &mut Annotations,
        stage: &mut Stage,
    ) -> Result<(), StageError> {
        let id = derive_id(&record.identity(), &self.config.certificate_prefix);
        annotations.certificate_id = Some(id.clone());
        *stage = Stage::IdentityDerived;

        let payload = self.encoder.build(&id, &record.full_name)?;
        annotations.verification_url = Some(payload.url.clone());
        *stage = Stage::VerificationBuilt;

        let document = self.renderer.render(record, &id, &payload)?;
        annotations.document_path = Some(document.path);
        *stage = Stage::Rendered;

        Ok(())
    }
}

/// Create `dir` if needed and check a file can be written into it.
fn prepare_dir(dir: &Path) -> Result<(), IssueError> {
    let fail = |source| IssueError::OutputDir {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(fail)?;
    let probe = dir.join(".certify-write-probe");
    std::fs::write(&probe, b"").map_err(fail)?;
    std::fs::remove_file(&probe).map_err(fail)?;
    Ok(())
}
