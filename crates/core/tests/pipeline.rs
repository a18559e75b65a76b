//! End-to-end issuance tests: real QR encoder, real PDF renderer, temp
//! output directories.

use std::path::Path;

use certify_core::record::Stage;
use certify_core::report::{STATUS_ERROR, STATUS_SUCCESS};
use certify_core::verification::VerificationPayload;
use certify_core::{
    aggregate, certificate_id_from_url, derive_id, save_report, scan_png, CertificateId,
    CertificateIdentity, Config, Issuer, Layout, ParticipantRecord, PdfRenderer, Render,
    RenderError, RenderedDocument, Status,
};
use tempfile::TempDir;

fn config(dir: &Path) -> Config {
    Config {
        pdf_dir: dir.join("certificates"),
        qr_dir: dir.join("qr_codes"),
        ..Config::default()
    }
}

fn participant(id: u32, name: &str, email: &str) -> ParticipantRecord {
    ParticipantRecord {
        id,
        full_name: name.to_string(),
        email: email.to_string(),
        course_name: "Основы Python".to_string(),
        hours: 40,
        date_completed: "2024-01-15".to_string(),
    }
}

fn roster() -> Vec<ParticipantRecord> {
    vec![
        participant(1, "Иван Иванов", "ivan@example.com"),
        participant(2, "Анна Смирнова", ""),
        participant(3, "Ada Lovelace", "ada@example.com"),
    ]
}

fn issuer(dir: &Path) -> Issuer {
    Issuer::new(config(dir), Layout::default_layout().unwrap()).unwrap()
}

/// Delegates to the PDF renderer except for one record.
struct FailingFor {
    inner: PdfRenderer,
    record: u32,
}

impl Render for FailingFor {
    fn render(
        &self,
        record: &ParticipantRecord,
        id: &CertificateId,
        payload: &VerificationPayload,
    ) -> Result<RenderedDocument, RenderError> {
        if record.id == self.record {
            return Err(RenderError::Pdf("disk quota exceeded".to_string()));
        }
        self.inner.render(record, id, payload)
    }
}

#[test]
fn ivan_example_is_stable() {
    let identity = CertificateIdentity {
        full_name: "Иван Иванов",
        course_name: "Основы Python",
        email: "ivan@example.com",
    };
    let expected = derive_id(&identity, "CERT");

    for _ in 0..2 {
        let tmp = TempDir::new().unwrap();
        let outcome = issuer(tmp.path()).run(&roster()[..1]);
        let a = &outcome.records[0].outcome.annotations;
        assert_eq!(a.certificate_id.as_ref(), Some(&expected));
        assert_eq!(
            a.verification_url.as_deref(),
            Some(format!("https://example.com/verify/{}", expected).as_str())
        );
    }
}

#[test]
fn empty_email_batch_fully_succeeds() {
    let tmp = TempDir::new().unwrap();
    let outcome = issuer(tmp.path()).run(&roster());

    assert_eq!(outcome.total(), 3);
    assert_eq!(outcome.succeeded, 3);
    assert_eq!(outcome.failed, 0);
    for issued in &outcome.records {
        assert_eq!(issued.outcome.status, Status::Success);
        let doc = issued.outcome.annotations.document_path.as_ref().unwrap();
        assert!(doc.is_file());
        assert!(std::fs::read(doc).unwrap().starts_with(b"%PDF-"));
    }
}

#[test]
fn reruns_are_idempotent() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let a = issuer(first.path()).run(&roster());
    let b = issuer(second.path()).run(&roster());

    for (x, y) in a.records.iter().zip(&b.records) {
        let (x, y) = (&x.outcome.annotations, &y.outcome.annotations);
        assert_eq!(x.certificate_id, y.certificate_id);
        assert_eq!(x.verification_url, y.verification_url);
        let name = |p: &Option<std::path::PathBuf>| {
            p.as_deref().and_then(Path::file_name).map(|n| n.to_os_string())
        };
        assert_eq!(name(&x.document_path), name(&y.document_path));
    }

    // Same output directory: files are overwritten, not duplicated.
    let again = issuer(first.path()).run(&roster());
    assert_eq!(again.succeeded, 3);
    let pdfs = std::fs::read_dir(first.path().join("certificates")).unwrap().count();
    assert_eq!(pdfs, 3);
}

#[test]
fn input_records_are_untouched_and_order_kept() {
    let tmp = TempDir::new().unwrap();
    let input = roster();
    let snapshot = input.clone();
    let outcome = issuer(tmp.path()).run(&input);

    assert_eq!(input, snapshot);
    let participants: Vec<_> = outcome.records.iter().map(|r| r.participant.clone()).collect();
    assert_eq!(participants, input);
}

#[test]
fn one_render_failure_leaves_the_rest_intact() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let renderer = FailingFor {
        inner: PdfRenderer::new(Layout::default_layout().unwrap(), &cfg).unwrap(),
        record: 2,
    };
    let issuer = Issuer::with_renderer(cfg, renderer).unwrap();
    let outcome = issuer.run(&roster());

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    let failed = &outcome.records[1].outcome;
    assert_eq!(failed.stage, Stage::VerificationBuilt);
    assert!(failed.error.as_deref().unwrap().contains("disk quota exceeded"));

    let rows = aggregate(&outcome.records);
    assert_eq!(rows.len(), 3);
    let statuses: Vec<_> = rows.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![STATUS_SUCCESS, STATUS_ERROR, STATUS_SUCCESS]);
}

#[test]
fn qr_image_decodes_back_to_derived_id() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let base_url = cfg.base_url.clone();
    let outcome = issuer(tmp.path()).run(&roster());

    for issued in &outcome.records {
        let id = derive_id(&issued.participant.identity(), "CERT");
        let qr = std::fs::read_dir(&cfg.qr_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.to_string_lossy().ends_with(&format!("_{}.png", id)))
            .unwrap();

        let url = scan_png(&std::fs::read(&qr).unwrap()).unwrap();
        assert_eq!(certificate_id_from_url(&url, &base_url), Some(id.as_str()));
    }
}

#[test]
fn report_lists_every_record() {
    let tmp = TempDir::new().unwrap();
    let outcome = issuer(tmp.path()).run(&roster());
    let path = tmp.path().join("report.csv");
    save_report(&outcome.records, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let text = text.trim_start_matches('\u{feff}');
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("1,Иван Иванов,ivan@example.com,"));
    assert!(lines[2].starts_with("2,Анна Смирнова,,"));
    assert!(lines.iter().skip(1).all(|l| l.ends_with(STATUS_SUCCESS)));
}

#[test]
fn rendered_documents_show_every_field_value() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let outcome = issuer(tmp.path()).run(&roster());

    for issued in &outcome.records {
        let a = &issued.outcome.annotations;
        let bytes = std::fs::read(a.document_path.as_ref().unwrap()).unwrap();
        let text = certify_core::pdf::extract_text(&bytes).unwrap().join("\n");
        let id = a.certificate_id.as_ref().unwrap().as_str();
        let p = &issued.participant;
        let hours = p.hours.to_string();

        assert!(!text.contains('?'), "substituted glyphs in:\n{text}");
        for value in [
            p.full_name.as_str(),
            p.course_name.as_str(),
            hours.as_str(),
            p.date_completed.as_str(),
            id,
            cfg.organization.as_str(),
            "https://example.com/verify/CERT-",
        ] {
            assert!(text.contains(value), "'{value}' missing from:\n{text}");
        }
    }
}

#[test]
fn name_without_glyphs_fails_only_that_record() {
    let tmp = TempDir::new().unwrap();
    let mut input = roster();
    input[1].full_name = "李小龙".to_string();
    let outcome = issuer(tmp.path()).run(&input);

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    let failed = &outcome.records[1].outcome;
    assert_eq!(failed.status, Status::Error);
    assert_eq!(failed.stage, Stage::VerificationBuilt);
    assert!(failed.error.as_deref().unwrap().contains("no glyph"));
    assert!(failed.annotations.document_path.is_none());
}
