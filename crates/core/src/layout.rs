//! Certificate layouts and field merging.
//!
//! A layout is a TOML document describing one page: frame rectangles, text
//! blocks whose `content` may reference fields as `{{ field }}` (optionally
//! `{{ field | truncate(n) }}`), and one barcode block for the QR image.
//! Coordinates are millimetres from the top-left corner of the page; a text
//! block's `y_mm` is its baseline.
//!
//! ```toml
//! [page]
//! width_mm = 297.0
//! height_mm = 210.0
//!
//! [[text]]
//! content = "{{ full_name }}"
//! x_mm = 148.5
//! y_mm = 95.0
//! size = 30.0
//! align = "center"
//!
//! [barcode]
//! x_mm = 30.0
//! y_mm = 140.0
//! size_mm = 40.0
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::render::{Field, FieldValues};

/// Layout used when the caller does not supply one: A4 landscape, framed.
pub const DEFAULT_LAYOUT: &str = r##"[page]
width_mm = 297.0
height_mm = 210.0

[[rect]]
x_mm = 10.0
y_mm = 10.0
width_mm = 277.0
height_mm = 190.0
line_width = 6.0
color = "#2c3e50"

[[text]]
content = "СЕРТИФИКАТ"
x_mm = 148.5
y_mm = 40.0
size = 36.0
align = "center"
color = "#2c3e50"

[[text]]
content = "о прохождении обучения"
x_mm = 148.5
y_mm = 50.0
size = 16.0
align = "center"
color = "#7f8c8d"

[[text]]
content = "Настоящим удостоверяется, что"
x_mm = 148.5
y_mm = 70.0
size = 14.0
align = "center"
color = "#7f8c8d"

[[text]]
content = "{{ full_name }}"
x_mm = 148.5
y_mm = 85.0
size = 30.0
align = "center"
color = "#2980b9"

[[text]]
content = "успешно завершил(а) курс:"
x_mm = 148.5
y_mm = 98.0
size = 16.0
align = "center"
color = "#34495e"

[[text]]
content = "«{{ course_name }}»"
x_mm = 148.5
y_mm = 109.0
size = 20.0
align = "center"
color = "#e74c3c"

[[text]]
content = "Продолжительность: {{ hours }} академических часов"
x_mm = 148.5
y_mm = 120.0
size = 13.0
align = "center"
color = "#7f8c8d"

[[text]]
content = "Дата завершения: {{ date_completed }}"
x_mm = 148.5
y_mm = 128.0
size = 13.0
align = "center"
color = "#7f8c8d"

[[text]]
content = "Отсканируйте для верификации"
x_mm = 43.0
y_mm = 180.0
size = 8.0
align = "center"
color = "#7f8c8d"

[[text]]
content = "ID: {{ certificate_id }}"
x_mm = 43.0
y_mm = 185.0
size = 8.0
align = "center"
color = "#7f8c8d"

[[text]]
content = "{{ verification_url | truncate(40) }}"
x_mm = 43.0
y_mm = 190.0
size = 6.0
align = "center"
color = "#95a5a6"

[[text]]
content = "Директор образовательного центра"
x_mm = 262.0
y_mm = 175.0
size = 11.0
align = "right"
color = "#2c3e50"

[[text]]
content = "{{ organization }}"
x_mm = 262.0
y_mm = 183.0
size = 12.0
align = "right"
color = "#2c3e50"

[[text]]
content = "ID: {{ certificate_id }}"
x_mm = 280.0
y_mm = 196.0
size = 7.0
align = "right"
color = "#95a5a6"

[barcode]
x_mm = 25.0
y_mm = 140.0
size_mm = 36.0
"##;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpec {
    pub width_mm: f32,
    pub height_mm: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub content: String,
    pub x_mm: f32,
    pub y_mm: f32,
    pub size: f32,
    #[serde(default)]
    pub align: Align,
    /// `#rrggbb`; black when absent.
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectBlock {
    pub x_mm: f32,
    pub y_mm: f32,
    pub width_mm: f32,
    pub height_mm: f32,
    #[serde(default = "default_line_width")]
    pub line_width: f32,
    #[serde(default)]
    pub color: Option<String>,
}

fn default_line_width() -> f32 {
    1.0
}

/// Square area the QR image is drawn into; `y_mm` is its top edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeBlock {
    pub x_mm: f32,
    pub y_mm: f32,
    pub size_mm: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub page: PageSpec,
    #[serde(default, rename = "rect")]
    pub rects: Vec<RectBlock>,
    #[serde(default, rename = "text")]
    pub texts: Vec<TextBlock>,
    #[serde(default)]
    pub barcode: Option<BarcodeBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);

    pub fn parse(hex: &str) -> Option<Rgb> {
        let hex = hex.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .ok()
                .map(|v| f32::from(v) / 255.0)
        };
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

fn parse_color(color: &Option<String>) -> Result<Rgb, RenderError> {
    match color {
        None => Ok(Rgb::BLACK),
        Some(hex) => {
            Rgb::parse(hex).ok_or_else(|| RenderError::Layout(format!("invalid color '{}'", hex)))
        }
    }
}

impl Layout {
    pub fn default_layout() -> Result<Layout, RenderError> {
        Layout::from_toml_str(DEFAULT_LAYOUT)
    }

    pub fn from_toml_str(content: &str) -> Result<Layout, RenderError> {
        let layout: Layout =
            toml::from_str(content).map_err(|e| RenderError::Layout(e.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn load(path: &Path) -> Result<Layout, RenderError> {
        let content = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Layout::from_toml_str(&content)
    }

    /// Merge against placeholder values to catch unknown or unplaced
    /// fields without rendering anything.
    pub fn check_fields(&self) -> Result<(), RenderError> {
        let values = FieldValues::from_pairs(Field::ALL.iter().map(|f| (*f, f.name())));
        merge(self, &values).map(|_| ())
    }

    /// Structural checks; field coverage is checked per merge.
    pub fn validate(&self) -> Result<(), RenderError> {
        let page = &self.page;
        if page.width_mm <= 0.0 || page.height_mm <= 0.0 {
            return Err(RenderError::Layout("page dimensions must be positive".to_string()));
        }
        if page.width_mm <= page.height_mm {
            return Err(RenderError::Layout(format!(
                "page must be landscape, got {}x{} mm",
                page.width_mm, page.height_mm
            )));
        }
        for text in &self.texts {
            if text.size <= 0.0 {
                return Err(RenderError::Layout(format!(
                    "text '{}' has non-positive font size",
                    text.content
                )));
            }
            parse_color(&text.color)?;
        }
        for rect in &self.rects {
            parse_color(&rect.color)?;
        }
        if let Some(barcode) = &self.barcode {
            if barcode.size_mm <= 0.0 {
                return Err(RenderError::Layout("barcode size must be positive".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedText {
    pub text: String,
    pub x_mm: f32,
    pub y_mm: f32,
    pub size: f32,
    pub align: Align,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRect {
    pub x_mm: f32,
    pub y_mm: f32,
    pub width_mm: f32,
    pub height_mm: f32,
    pub line_width: f32,
    pub color: Rgb,
}

/// A layout with every placeholder replaced, ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedPage {
    pub page: PageSpec,
    pub rects: Vec<MergedRect>,
    pub texts: Vec<MergedText>,
    pub barcode: BarcodeBlock,
}

impl MergedPage {
    /// All merged text, one block per line.
    pub fn plain_text(&self) -> String {
        self.texts
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fill `layout` with `values`. Fails when a placeholder is unknown or
/// malformed, or when any [`Field`] ends up absent from the page.
pub fn merge(layout: &Layout, values: &FieldValues) -> Result<MergedPage, RenderError> {
    let mut placed = BTreeSet::new();

    let mut texts = Vec::with_capacity(layout.texts.len());
    for block in &layout.texts {
        let text = merge_text(&block.content, values, &mut placed)?;
        texts.push(MergedText {
            text,
            x_mm: block.x_mm,
            y_mm: block.y_mm,
            size: block.size,
            align: block.align,
            color: parse_color(&block.color)?,
        });
    }

    let barcode = layout
        .barcode
        .clone()
        .ok_or(RenderError::MissingField(Field::QrCode))?;
    placed.insert(Field::QrCode);

    if let Some(missing) = Field::ALL.iter().find(|f| !placed.contains(*f)) {
        return Err(RenderError::MissingField(*missing));
    }

    let rects = layout
        .rects
        .iter()
        .map(|r| {
            Ok(MergedRect {
                x_mm: r.x_mm,
                y_mm: r.y_mm,
                width_mm: r.width_mm,
                height_mm: r.height_mm,
                line_width: r.line_width,
                color: parse_color(&r.color)?,
            })
        })
        .collect::<Result<Vec<_>, RenderError>>()?;

    Ok(MergedPage {
        page: layout.page.clone(),
        rects,
        texts,
        barcode,
    })
}

fn merge_text(
    template: &str,
    values: &FieldValues,
    placed: &mut BTreeSet<Field>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            RenderError::Template(format!("unterminated placeholder in '{}'", template))
        })?;
        let expr = after[..end].trim();

        let (name, filter) = match expr.split_once('|') {
            Some((name, filter)) => (name.trim(), Some(filter.trim())),
            None => (expr, None),
        };
        let field =
            Field::from_name(name).ok_or_else(|| RenderError::UnknownField(name.to_string()))?;
        let value = values.get(field);
        match filter {
            None => out.push_str(value),
            Some(filter) => out.push_str(&apply_filter(filter, value)?),
        }
        placed.insert(field);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn apply_filter(filter: &str, value: &str) -> Result<String, RenderError> {
    let limit = filter
        .strip_prefix("truncate(")
        .and_then(|f| f.strip_suffix(')'))
        .and_then(|n| n.trim().parse::<usize>().ok())
        .ok_or_else(|| RenderError::Template(format!("unsupported filter '{}'", filter)))?;
    Ok(truncate(value, limit))
}

fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let kept: String = value.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", kept)
}
