//! Verification URLs and their QR rendering.
//!
//! The URL is `<base>/verify/<certificate id>`. It is encoded at the
//! smallest QR version that fits at the configured error-correction level
//! (low by default: denser codes, less tolerance for print damage).
//!
//! [`Encoder::build`] produces a [`VerificationPayload`] holding the raster,
//! its PNG encoding, the base64 of that PNG and the path of the PNG written
//! to the scratch directory. All of them carry identical pixel data.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;
use crate::identity::CertificateId;

const DARK: u8 = 0;
const LIGHT: u8 = 255;

/// Largest accepted `qr.box_size`, in pixels per module.
pub const MAX_BOX_SIZE: u32 = 100;
/// Largest accepted `qr.border`, in modules.
pub const MAX_BORDER: u32 = 16;
/// Largest raster edge [`encode_qr`] will allocate, in pixels.
pub const MAX_RASTER_SIDE: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCorrection {
    #[serde(rename = "L")]
    Low,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "Q")]
    Quartile,
    #[serde(rename = "H")]
    High,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        }
    }
}

/// `[qr]` section of the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrSettings {
    pub error_correction: ErrorCorrection,
    /// Pixels per module.
    pub box_size: u32,
    /// Quiet zone, in modules.
    pub border: u32,
}

impl Default for QrSettings {
    fn default() -> Self {
        QrSettings {
            error_correction: ErrorCorrection::Low,
            box_size: 10,
            border: 4,
        }
    }
}

/// Monochrome 8-bit greyscale raster, row-major, `0` = dark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRaster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl QrRaster {
    pub fn is_dark(&self, x: u32, y: u32) -> bool {
        self.pixels[(y * self.width + x) as usize] == DARK
    }

    pub fn to_png(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&self.pixels)?;
            writer.finish()?;
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct VerificationPayload {
    pub url: String,
    pub raster: QrRaster,
    pub png: Vec<u8>,
    /// Base64 of `png`, for inline embedding.
    pub base64: String,
    pub scratch_path: PathBuf,
}

/// Site root of a configured base URL. A base that already ends in
/// `/verify` is accepted so that `https://example.com/verify` and
/// `https://example.com` produce the same URLs.
fn site_root(base_url: &str) -> &str {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    base.strip_suffix("/verify").unwrap_or(base)
}

pub fn verification_url(base_url: &str, id: &CertificateId) -> String {
    format!("{}/verify/{}", site_root(base_url), id)
}

/// Inverse of [`verification_url`]: the certificate ID part of `url`, if
/// `url` was built from `base_url`.
pub fn certificate_id_from_url<'u>(url: &'u str, base_url: &str) -> Option<&'u str> {
    let id = url.strip_prefix(site_root(base_url))?.strip_prefix("/verify/")?;
    (!id.is_empty() && !id.contains('/')).then_some(id)
}

pub fn encode_qr(data: &str, settings: &QrSettings) -> Result<QrRaster, EncodeError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), settings.error_correction.into())
        .map_err(|e| match e {
            QrError::DataTooLong => EncodeError::DataTooLong { len: data.len() },
            other => EncodeError::Qr(other.to_string()),
        })?;

    let modules = code.width() as u32;
    let colors = code.to_colors();
    let box_size = settings.box_size.max(1);
    let side = settings
        .border
        .checked_mul(2)
        .and_then(|quiet| modules.checked_add(quiet))
        .and_then(|cells| cells.checked_mul(box_size))
        .filter(|side| *side <= MAX_RASTER_SIDE)
        .ok_or(EncodeError::RasterTooLarge {
            modules,
            box_size,
            border: settings.border,
        })?;
    let mut pixels = vec![LIGHT; side as usize * side as usize];

    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let mx = i as u32 % modules + settings.border;
        let my = i as u32 / modules + settings.border;
        for y in my * box_size..(my + 1) * box_size {
            let row = (y * side) as usize;
            pixels[row + (mx * box_size) as usize..row + ((mx + 1) * box_size) as usize]
                .fill(DARK);
        }
    }

    Ok(QrRaster {
        width: side,
        height: side,
        pixels,
    })
}

/// Name-derived component of scratch file names: anything that is not
/// alphanumeric becomes `_`.
pub(crate) fn scratch_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Builds verification payloads for one configuration.
#[derive(Debug, Clone)]
pub struct Encoder {
    base_url: String,
    settings: QrSettings,
    scratch_dir: PathBuf,
}

impl Encoder {
    pub fn new(base_url: impl Into<String>, settings: QrSettings, scratch_dir: &Path) -> Self {
        Encoder {
            base_url: base_url.into(),
            settings,
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }

    pub fn url_for(&self, id: &CertificateId) -> String {
        verification_url(&self.base_url, id)
    }

    /// Encode the verification URL for `id` and persist the PNG as
    /// `qr_<name>_<id>.png`. Nothing is written unless every encoding step
    /// succeeded.
    pub fn build(
        &self,
        id: &CertificateId,
        participant_name: &str,
    ) -> Result<VerificationPayload, EncodeError> {
        let url = self.url_for(id);
        let raster = encode_qr(&url, &self.settings)?;
        let png = raster.to_png()?;
        let base64 = BASE64.encode(&png);

        let scratch_path = self
            .scratch_dir
            .join(format!("qr_{}_{}.png", scratch_safe(participant_name), id));
        std::fs::write(&scratch_path, &png).map_err(|source| EncodeError::Io {
            path: scratch_path.clone(),
            source,
        })?;
        tracing::debug!(path = %scratch_path.display(), "QR image written");

        Ok(VerificationPayload {
            url,
            raster,
            png,
            base64,
            scratch_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{derive_id, CertificateIdentity};
    use tempfile::TempDir;

    fn sample_id() -> CertificateId {
        derive_id(
            &CertificateIdentity {
                full_name: "Ada Lovelace",
                course_name: "Analytical Engines",
                email: "ada@example.com",
            },
            "CERT",
        )
    }

    #[test]
    fn url_interpolates_base_and_id() {
        let id = sample_id();
        let url = verification_url("https://example.com/verify", &id);
        assert_eq!(url, format!("https://example.com/verify/{}", id));
        assert_eq!(verification_url("https://example.com", &id), url);
        assert_eq!(
            verification_url("https://certs.example.org/", &id),
            format!("https://certs.example.org/verify/{}", id)
        );
    }

    #[test]
    fn id_is_recovered_from_url() {
        let id = sample_id();
        let url = verification_url("https://certs.example.org", &id);
        assert_eq!(
            certificate_id_from_url(&url, "https://certs.example.org"),
            Some(id.as_str())
        );
        assert_eq!(certificate_id_from_url(&url, "https://other.example"), None);
        assert_eq!(
            certificate_id_from_url("https://certs.example.org/verify/", "https://certs.example.org"),
            None
        );
    }

    #[test]
    fn raster_is_square_with_quiet_zone() {
        let settings = QrSettings::default();
        let raster = encode_qr("https://example.com/verify/CERT-0123456789AB", &settings).unwrap();
        assert_eq!(raster.width, raster.height);
        assert_eq!(raster.width % settings.box_size, 0);
        assert_eq!(raster.pixels.len(), (raster.width * raster.height) as usize);
        // quiet zone is light, finder pattern corner is dark
        assert!(!raster.is_dark(0, 0));
        let corner = settings.border * settings.box_size;
        assert!(raster.is_dark(corner, corner));
        assert!(raster.pixels.iter().all(|&p| p == DARK || p == LIGHT));
    }

    #[test]
    fn higher_error_correction_needs_more_modules() {
        let data = "https://example.com/verify/CERT-0123456789AB";
        let low = encode_qr(data, &QrSettings::default()).unwrap();
        let high = encode_qr(
            data,
            &QrSettings {
                error_correction: ErrorCorrection::High,
                ..QrSettings::default()
            },
        )
        .unwrap();
        assert!(high.width > low.width);
    }

    #[test]
    fn oversized_payload_is_a_typed_error() {
        let data = "x".repeat(8000);
        let err = encode_qr(&data, &QrSettings::default()).unwrap_err();
        assert!(matches!(err, EncodeError::DataTooLong { len: 8000 }));
    }

    #[test]
    fn oversized_raster_is_a_typed_error() {
        let data = "https://example.com/verify/CERT-0123456789AB";
        for (box_size, border) in [(5000, 4), (10, u32::MAX), (u32::MAX, u32::MAX / 2)] {
            let settings = QrSettings {
                box_size,
                border,
                ..QrSettings::default()
            };
            let err = encode_qr(data, &settings).unwrap_err();
            assert!(
                matches!(err, EncodeError::RasterTooLarge { box_size: b, .. } if b == box_size),
                "{box_size}/{border}: {err}"
            );
        }
    }

    #[test]
    fn largest_accepted_settings_still_encode() {
        let settings = QrSettings {
            box_size: MAX_BOX_SIZE,
            border: MAX_BORDER,
            ..QrSettings::default()
        };
        let raster = encode_qr("https://example.com/verify/CERT-0123456789AB", &settings).unwrap();
        assert!(raster.width <= MAX_RASTER_SIDE);
        assert_eq!(raster.width % MAX_BOX_SIZE, 0);
    }

    #[test]
    fn build_persists_png_matching_base64() {
        let tmp = TempDir::new().unwrap();
        let encoder = Encoder::new("https://example.com", QrSettings::default(), tmp.path());
        let id = sample_id();
        let payload = encoder.build(&id, "Ada Lovelace").unwrap();

        assert_eq!(payload.url, format!("https://example.com/verify/{}", id));
        assert_eq!(
            payload.scratch_path.file_name().unwrap().to_str().unwrap(),
            format!("qr_Ada_Lovelace_{}.png", id)
        );
        let on_disk = std::fs::read(&payload.scratch_path).unwrap();
        assert_eq!(on_disk, payload.png);
        assert_eq!(BASE64.decode(&payload.base64).unwrap(), payload.png);
    }

    #[test]
    fn build_writes_nothing_on_encoding_failure() {
        let tmp = TempDir::new().unwrap();
        let encoder = Encoder::new("x".repeat(8000), QrSettings::default(), tmp.path());
        assert!(encoder.build(&sample_id(), "Ada").is_err());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn build_reports_unwritable_scratch_dir() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("does-not-exist");
        let encoder = Encoder::new("https://example.com", QrSettings::default(), &missing);
        let err = encoder.build(&sample_id(), "Ada").unwrap_err();
        assert!(matches!(err, EncodeError::Io { .. }));
    }

    #[test]
    fn scratch_names_replace_non_alphanumerics() {
        assert_eq!(scratch_safe("Анна-Мария О'Нил"), "Анна_Мария_О_Нил");
    }
}
