//! Document rendering: merge a participant's fields into the layout and
//! write a single-page PDF named after the participant and certificate ID.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::RenderError;
use crate::identity::CertificateId;
use crate::layout::{self, Layout};
use crate::pdf::{self, FontProgram};
use crate::record::ParticipantRecord;
use crate::verification::VerificationPayload;

/// Every field a rendered certificate must show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    FullName,
    CourseName,
    Hours,
    DateCompleted,
    CertificateId,
    VerificationUrl,
    /// The QR image. Drawn by the layout's barcode block; as a text
    /// placeholder it expands to the base64 PNG.
    QrCode,
    Organization,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::FullName,
        Field::CourseName,
        Field::Hours,
        Field::DateCompleted,
        Field::CertificateId,
        Field::VerificationUrl,
        Field::QrCode,
        Field::Organization,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::FullName => "full_name",
            Field::CourseName => "course_name",
            Field::Hours => "hours",
            Field::DateCompleted => "date_completed",
            Field::CertificateId => "certificate_id",
            Field::VerificationUrl => "verification_url",
            Field::QrCode => "qr_code",
            Field::Organization => "organization",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of each [`Field`] for one certificate.
#[derive(Debug, Clone, Default)]
pub struct FieldValues {
    values: [String; 8],
}

impl FieldValues {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Field, S)>,
        S: Into<String>,
    {
        let mut values = FieldValues::default();
        for (field, value) in pairs {
            values.values[field as usize] = value.into();
        }
        values
    }

    pub fn for_record(
        record: &ParticipantRecord,
        id: &CertificateId,
        payload: &VerificationPayload,
        organization: &str,
    ) -> Self {
        FieldValues::from_pairs([
            (Field::FullName, record.full_name.clone()),
            (Field::CourseName, record.course_name.clone()),
            (Field::Hours, record.hours.to_string()),
            (Field::DateCompleted, record.date_completed.clone()),
            (Field::CertificateId, id.to_string()),
            (Field::VerificationUrl, payload.url.clone()),
            (Field::QrCode, payload.base64.clone()),
            (Field::Organization, organization.to_string()),
        ])
    }

    pub fn get(&self, field: Field) -> &str {
        &self.values[field as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub path: PathBuf,
    pub file_name: String,
    pub size: usize,
}

/// Produces the document for one participant.
pub trait Render {
    fn render(
        &self,
        record: &ParticipantRecord,
        id: &CertificateId,
        payload: &VerificationPayload,
    ) -> Result<RenderedDocument, RenderError>;
}

/// Name component of document file names: alphanumerics, space, `-` and
/// `_` are kept, anything else becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<label>_<sanitized name>_<id>.pdf`
pub fn document_file_name(label: &str, full_name: &str, id: &CertificateId) -> String {
    format!("{}_{}_{}.pdf", label, sanitize_name(full_name), id)
}

/// Renders certificates as PDF files into one output directory.
#[derive(Debug)]
pub struct PdfRenderer {
    layout: Layout,
    font: FontProgram,
    output_dir: PathBuf,
    label: String,
    organization: String,
}

impl PdfRenderer {
    /// Loads the configured font (or the bundled one) and checks it can
    /// draw the layout's own text, so that a bad font fails here rather
    /// than once per record.
    pub fn new(layout: Layout, config: &Config) -> Result<PdfRenderer, RenderError> {
        let font = match config.font_path.as_deref() {
            Some(path) => FontProgram::load(path)?,
            None => FontProgram::builtin(),
        };
        for block in &layout.texts {
            font.check_text(&block.content)?;
        }
        if layout
            .texts
            .iter()
            .any(|block| block.content.contains(Field::Organization.name()))
        {
            font.check_text(&config.organization)?;
        }
        Ok(PdfRenderer {
            layout,
            font,
            output_dir: config.pdf_dir.clone(),
            label: config.document_label.clone(),
            organization: config.organization.clone(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Render for PdfRenderer {
    fn render(
        &self,
        record: &ParticipantRecord,
        id: &CertificateId,
        payload: &VerificationPayload,
    ) -> Result<RenderedDocument, RenderError> {
        let values = FieldValues::for_record(record, id, payload, &self.organization);
        let page = layout::merge(&self.layout, &values)?;
        let title = format!("{} {}", self.label, id);
        let bytes = pdf::write_document(&page, &payload.raster, &self.font, &title)?;

        let file_name = document_file_name(&self.label, &record.full_name, id);
        let path = self.output_dir.join(&file_name);
        std::fs::write(&path, &bytes).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(RenderedDocument {
            path,
            file_name,
            size: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_id;
    use crate::verification::Encoder;
    use tempfile::TempDir;

    fn record() -> ParticipantRecord {
        ParticipantRecord {
            id: 1,
            full_name: "Mary O'Brien".to_string(),
            email: "mary@example.com".to_string(),
            course_name: "Data Analysis".to_string(),
            hours: 36,
            date_completed: "2024-06-30".to_string(),
        }
    }

    #[test]
    fn field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("nickname"), None);
    }

    #[test]
    fn sanitize_keeps_spaces_and_dashes() {
        assert_eq!(sanitize_name("Анна-Мария О'Нил"), "Анна-Мария О_Нил");
        assert_eq!(sanitize_name("a/b\\c:d"), "a_b_c_d");
    }

    #[test]
    fn file_name_embeds_label_name_and_id() {
        let rec = record();
        let id = derive_id(&rec.identity(), "CERT");
        assert_eq!(
            document_file_name("Сертификат", &rec.full_name, &id),
            format!("Сертификат_Mary O_Brien_{}.pdf", id)
        );
    }

    #[test]
    fn same_name_different_ids_never_share_a_file() {
        let a = record();
        let b = ParticipantRecord {
            email: "other@example.com".to_string(),
            ..record()
        };
        let id_a = derive_id(&a.identity(), "CERT");
        let id_b = derive_id(&b.identity(), "CERT");
        assert_ne!(
            document_file_name("Certificate", &a.full_name, &id_a),
            document_file_name("Certificate", &b.full_name, &id_b)
        );
    }

    #[test]
    fn renders_pdf_into_output_dir() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            pdf_dir: tmp.path().to_path_buf(),
            qr_dir: tmp.path().to_path_buf(),
            document_label: "Certificate".to_string(),
            ..Config::default()
        };
        let renderer = PdfRenderer::new(Layout::default_layout().unwrap(), &config).unwrap();
        let rec = record();
        let id = derive_id(&rec.identity(), &config.certificate_prefix);
        let payload = Encoder::new(&config.base_url, config.qr, &config.qr_dir)
            .build(&id, &rec.full_name)
            .unwrap();

        let doc = renderer.render(&rec, &id, &payload).unwrap();
        assert_eq!(doc.path, tmp.path().join(&doc.file_name));
        let bytes = std::fs::read(&doc.path).unwrap();
        assert_eq!(bytes.len(), doc.size);
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn unknown_font_fails_at_construction() {
        let tmp = TempDir::new().unwrap();
        let font = tmp.path().join("broken.ttf");
        std::fs::write(&font, b"not a font").unwrap();
        let config = Config {
            font_path: Some(font),
            ..Config::default()
        };
        let err = PdfRenderer::new(Layout::default_layout().unwrap(), &config).unwrap_err();
        assert!(matches!(err, RenderError::Font(_)));
    }

    #[test]
    fn layout_text_the_font_cannot_draw_fails_at_construction() {
        let layout = Layout::from_toml_str(
            r#"
[page]
width_mm = 297.0
height_mm = 210.0

[[text]]
content = "证书 {{ full_name }}"
x_mm = 148.5
y_mm = 60.0
size = 24.0

[barcode]
x_mm = 20.0
y_mm = 140.0
size_mm = 40.0
"#,
        )
        .unwrap();
        let err = PdfRenderer::new(layout, &Config::default()).unwrap_err();
        assert!(matches!(err, RenderError::Font(msg) if msg.contains('证')));
    }

    #[test]
    fn name_the_font_cannot_draw_fails_that_record_only() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            pdf_dir: tmp.path().to_path_buf(),
            qr_dir: tmp.path().to_path_buf(),
            ..Config::default()
        };
        let renderer = PdfRenderer::new(Layout::default_layout().unwrap(), &config).unwrap();
        let encoder = Encoder::new(&config.base_url, config.qr, &config.qr_dir);

        let chinese = ParticipantRecord {
            full_name: "李小龙".to_string(),
            ..record()
        };
        let id = derive_id(&chinese.identity(), &config.certificate_prefix);
        let payload = encoder.build(&id, &chinese.full_name).unwrap();
        assert!(matches!(
            renderer.render(&chinese, &id, &payload),
            Err(RenderError::Font(_))
        ));

        let rec = record();
        let id = derive_id(&rec.identity(), &config.certificate_prefix);
        let payload = encoder.build(&id, &rec.full_name).unwrap();
        let doc = renderer.render(&rec, &id, &payload).unwrap();
        let text = pdf::extract_text(&std::fs::read(&doc.path).unwrap()).unwrap();
        assert!(text.iter().any(|t| t.contains("Mary O'Brien")));
    }
}
