//! Certificate delivery.
//!
//! [`compose`] turns an issued record into a message; a [`Deliver`] sink
//! sends it. The only sink shipped here is [`Outbox`], which writes each
//! message to a directory for a separate mailer to pick up. Delivery
//! outcomes never change issuance outcomes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::DeliveryError;
use crate::record::{IssuedRecord, OutcomeRecord, ParticipantRecord, Status};

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub record_id: u32,
    pub certificate_id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryTally {
    pub sent: usize,
    pub failed: usize,
}

pub trait Deliver {
    fn deliver(&mut self, message: &Delivery) -> Result<(), DeliveryError>;
}

/// Compose the message for one issued record. `None` when the record has no
/// certificate document to send.
pub fn compose(
    record: &ParticipantRecord,
    outcome: &OutcomeRecord,
    organization: &str,
) -> Option<Delivery> {
    if outcome.status != Status::Success {
        return None;
    }
    let a = &outcome.annotations;
    let certificate_id = a.certificate_id.as_ref()?;
    let attachment = a.document_path.clone()?;
    let url = a.verification_url.as_deref().unwrap_or_default();

    let body = format!(
        "Уважаемый(ая) {name}!\n\n\
         Поздравляем с успешным завершением курса «{course}»!\n\n\
         Ваш сертификат прикреплен к этому письму.\n\
         Для проверки подлинности сертификата отсканируйте QR-код или перейдите по ссылке:\n\
         {url}\n\n\
         ID вашего сертификата: {certificate_id}\n\n\
         С наилучшими пожеланиями,\n\
         {organization}\n",
        name = record.full_name,
        course = record.course_name,
    );

    Some(Delivery {
        record_id: record.id,
        certificate_id: certificate_id.to_string(),
        recipient: record.email.clone(),
        subject: format!("Ваш сертификат: {}", record.course_name),
        body,
        attachment,
    })
}

/// Deliver every issued certificate through `sink`. Records without a
/// certificate or recipient count as failed.
pub fn deliver_all<D: Deliver + ?Sized>(
    records: &[IssuedRecord],
    sink: &mut D,
    organization: &str,
) -> DeliveryTally {
    let mut tally = DeliveryTally::default();
    for issued in records {
        let record = &issued.participant;
        let result = match compose(record, &issued.outcome, organization) {
            None => Err(DeliveryError::NoCertificate(record.id)),
            Some(message) if message.recipient.trim().is_empty() => {
                Err(DeliveryError::NoRecipient(record.id))
            }
            Some(message) => sink.deliver(&message),
        };
        match result {
            Ok(()) => tally.sent += 1,
            Err(e) => {
                warn!(record = record.id, error = %e, "delivery failed");
                tally.failed += 1;
            }
        }
    }
    info!(sent = tally.sent, failed = tally.failed, "deliveries finished");
    tally
}

/// Writes each message as `<certificate id>.txt` plus a copy of the
/// attachment into a directory.
#[derive(Debug, Clone)]
pub struct Outbox {
    dir: PathBuf,
}

impl Outbox {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DeliveryError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| DeliveryError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Outbox { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Deliver for Outbox {
    fn deliver(&mut self, message: &Delivery) -> Result<(), DeliveryError> {
        let attachment_name = message
            .attachment
            .file_name()
            .ok_or_else(|| {
                DeliveryError::Transport(format!(
                    "attachment '{}' has no file name",
                    message.attachment.display()
                ))
            })?;
        let copy = self.dir.join(attachment_name);
        std::fs::copy(&message.attachment, &copy).map_err(|source| DeliveryError::Io {
            path: message.attachment.clone(),
            source,
        })?;

        let text = format!(
            "To: {}\nSubject: {}\nAttachment: {}\n\n{}",
            message.recipient,
            message.subject,
            attachment_name.to_string_lossy(),
            message.body
        );
        let path = self.dir.join(format!("{}.txt", message.certificate_id));
        std::fs::write(&path, text).map_err(|source| DeliveryError::Io { path, source })?;
        tracing::debug!(to = %message.recipient, id = %message.certificate_id, "message queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_id;
    use crate::record::{Annotations, Stage};
    use tempfile::TempDir;

    fn issued(id: u32, email: &str, document: Option<PathBuf>) -> IssuedRecord {
        let participant = ParticipantRecord {
            id,
            full_name: "Иван Иванов".to_string(),
            email: email.to_string(),
            course_name: "Основы Python".to_string(),
            hours: 40,
            date_completed: "2024-01-15".to_string(),
        };
        let cid = derive_id(&participant.identity(), "CERT");
        let status = if document.is_some() {
            Status::Success
        } else {
            Status::Error
        };
        IssuedRecord {
            outcome: OutcomeRecord {
                status,
                stage: if document.is_some() {
                    Stage::Success
                } else {
                    Stage::VerificationBuilt
                },
                annotations: Annotations {
                    verification_url: Some(format!("https://example.com/verify/{}", cid)),
                    certificate_id: Some(cid),
                    document_path: document,
                },
                error: None,
            },
            participant,
        }
    }

    /// Records messages, fails for one recipient.
    #[derive(Default)]
    struct Recorder {
        sent: Vec<Delivery>,
        reject: Option<&'static str>,
    }

    impl Deliver for Recorder {
        fn deliver(&mut self, message: &Delivery) -> Result<(), DeliveryError> {
            if self.reject == Some(message.recipient.as_str()) {
                return Err(DeliveryError::Transport("mailbox full".to_string()));
            }
            self.sent.push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn compose_fills_subject_and_body() {
        let record = issued(1, "ivan@example.com", Some("certificates/a.pdf".into()));
        let message = compose(&record.participant, &record.outcome, "Школа").unwrap();
        assert_eq!(message.subject, "Ваш сертификат: Основы Python");
        assert_eq!(message.recipient, "ivan@example.com");
        assert!(message.body.starts_with("Уважаемый(ая) Иван Иванов!"));
        assert!(message.body.contains("https://example.com/verify/CERT-"));
        assert!(message.body.contains(&format!("ID вашего сертификата: {}", message.certificate_id)));
        assert!(message.body.trim_end().ends_with("Школа"));
        assert_eq!(message.attachment, PathBuf::from("certificates/a.pdf"));
    }

    #[test]
    fn compose_skips_failed_records() {
        let record = issued(1, "ivan@example.com", None);
        assert!(compose(&record.participant, &record.outcome, "Школа").is_none());
    }

    #[test]
    fn tally_counts_missing_certificates_and_recipients() {
        let records = vec![
            issued(1, "a@example.com", Some("a.pdf".into())),
            issued(2, "b@example.com", None),
            issued(3, "", Some("c.pdf".into())),
            issued(4, "d@example.com", Some("d.pdf".into())),
        ];
        let mut sink = Recorder {
            reject: Some("d@example.com"),
            ..Recorder::default()
        };
        let tally = deliver_all(&records, &mut sink, "Школа");
        assert_eq!(tally, DeliveryTally { sent: 1, failed: 3 });
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].record_id, 1);
    }

    #[test]
    fn outbox_writes_message_and_attachment() {
        let tmp = TempDir::new().unwrap();
        let pdf = tmp.path().join("Сертификат_Иван_Иванов.pdf");
        std::fs::write(&pdf, b"%PDF-1.5").unwrap();
        let record = issued(1, "ivan@example.com", Some(pdf));

        let mut outbox = Outbox::new(tmp.path().join("outbox")).unwrap();
        let tally = deliver_all(std::slice::from_ref(&record), &mut outbox, "Школа");
        assert_eq!(tally.sent, 1);

        let id = record.outcome.annotations.certificate_id.unwrap();
        let text = std::fs::read_to_string(outbox.dir().join(format!("{}.txt", id))).unwrap();
        assert!(text.starts_with("To: ivan@example.com\nSubject: Ваш сертификат: Основы Python\n"));
        assert!(text.contains("Attachment: Сертификат_Иван_Иванов.pdf"));
        assert!(outbox.dir().join("Сертификат_Иван_Иванов.pdf").is_file());
    }

    #[test]
    fn outbox_reports_missing_attachment() {
        let tmp = TempDir::new().unwrap();
        let record = issued(1, "ivan@example.com", Some(tmp.path().join("gone.pdf")));
        let mut outbox = Outbox::new(tmp.path().join("outbox")).unwrap();
        let tally = deliver_all(&[record], &mut outbox, "Школа");
        assert_eq!(tally, DeliveryTally { sent: 0, failed: 1 });
    }
}
