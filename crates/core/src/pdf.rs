//! Single-page PDF output for a merged layout.
//!
//! Text is set in an embedded TrueType font, the bundled one unless the
//! config names another, as a Type0/Identity-H font with a ToUnicode map.
//! A character the font cannot draw is an error, never a substitute glyph.
//! The QR raster is embedded as a greyscale image XObject.
//!
//! The output carries no timestamps: the same inputs produce the same bytes.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::RenderError;
use crate::layout::{Align, MergedPage, Rgb};
use crate::verification::QrRaster;

const PT_PER_MM: f32 = 72.0 / 25.4;
const FONT_NAME: &str = "F1";
const IMAGE_NAME: &str = "Im1";
const EMBEDDED_FONT_NAME: &str = "CertifyEmbedded";

/// A TrueType font program, bundled or read from disk.
#[derive(Debug, Clone)]
pub struct FontProgram {
    data: Cow<'static, [u8]>,
}

impl FontProgram {
    /// Ubuntu Light, shipped with the crate. Covers Latin, Greek and
    /// Cyrillic.
    pub fn builtin() -> FontProgram {
        FontProgram {
            data: Cow::Borrowed(epaint_default_fonts::UBUNTU_LIGHT),
        }
    }

    pub fn load(path: &Path) -> Result<FontProgram, RenderError> {
        let data = std::fs::read(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        FontProgram::from_bytes(data)
            .map_err(|e| RenderError::Font(format!("'{}': {}", path.display(), e)))
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<FontProgram, RenderError> {
        ttf_parser::Face::parse(&data, 0).map_err(|e| RenderError::Font(e.to_string()))?;
        Ok(FontProgram {
            data: Cow::Owned(data),
        })
    }

    /// Fail on the first character of `text` the font has no glyph for.
    pub fn check_text(&self, text: &str) -> Result<(), RenderError> {
        let face = self.face()?;
        match text.chars().find(|c| face.glyph_index(*c).is_none()) {
            Some(c) => Err(missing_glyph(c)),
            None => Ok(()),
        }
    }

    fn face(&self) -> Result<ttf_parser::Face<'_>, RenderError> {
        ttf_parser::Face::parse(&self.data, 0).map_err(|e| RenderError::Font(e.to_string()))
    }
}

fn missing_glyph(c: char) -> RenderError {
    RenderError::Font(format!(
        "'{}' (U+{:04X}) has no glyph in the document font",
        c, c as u32
    ))
}

/// The font while the content stream is being written. Tracks which glyphs
/// were drawn so the width table and ToUnicode map cover only those.
struct PageFont<'a> {
    face: ttf_parser::Face<'a>,
    data: &'a [u8],
    /// glyph id -> (width in 1/1000 em, source char)
    used: BTreeMap<u16, (u32, char)>,
}

impl PageFont<'_> {
    /// Encode `text` as a PDF hex string body and return its advance width
    /// in 1/1000 em.
    fn encode(&mut self, text: &str) -> Result<(String, u32), RenderError> {
        let upem = u32::from(self.face.units_per_em().max(1));
        let mut hex = String::with_capacity(text.len() * 4);
        let mut width = 0u32;
        for c in text.chars() {
            let gid = self.face.glyph_index(c).ok_or_else(|| missing_glyph(c))?;
            let advance = u32::from(self.face.glyph_hor_advance(gid).unwrap_or(0));
            let w = advance * 1000 / upem;
            self.used.entry(gid.0).or_insert((w, c));
            let _ = write!(hex, "{:04X}", gid.0);
            width += w;
        }
        Ok((hex, width))
    }

    fn add_to(self, doc: &mut Document) -> Result<ObjectId, RenderError> {
        embed_truetype(doc, &self.face, self.data, &self.used)
    }
}

fn scale(value: i16, upem: u16) -> i64 {
    i64::from(value) * 1000 / i64::from(upem.max(1))
}

fn embed_truetype(
    doc: &mut Document,
    face: &ttf_parser::Face<'_>,
    data: &[u8],
    used: &BTreeMap<u16, (u32, char)>,
) -> Result<ObjectId, RenderError> {
    let upem = face.units_per_em();

    let mut file = Stream::new(
        dictionary! { "Length1" => data.len() as i64 },
        data.to_vec(),
    );
    file.compress()
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let file_id = doc.add_object(file);

    let bbox = face.global_bounding_box();
    let ascent = scale(face.ascender(), upem);
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => EMBEDDED_FONT_NAME,
        "Flags" => 32,
        "FontBBox" => vec![
            scale(bbox.x_min, upem).into(),
            scale(bbox.y_min, upem).into(),
            scale(bbox.x_max, upem).into(),
            scale(bbox.y_max, upem).into(),
        ],
        "ItalicAngle" => 0,
        "Ascent" => ascent,
        "Descent" => scale(face.descender(), upem),
        "CapHeight" => face.capital_height().map(|h| scale(h, upem)).unwrap_or(ascent),
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    let mut widths: Vec<Object> = Vec::with_capacity(used.len() * 2);
    for (gid, (w, _)) in used {
        widths.push(i64::from(*gid).into());
        widths.push(vec![Object::from(i64::from(*w))].into());
    }

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => EMBEDDED_FONT_NAME,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "CIDToGIDMap" => "Identity",
        "W" => widths,
    });

    let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(used).into_bytes()));

    Ok(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => EMBEDDED_FONT_NAME,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font_id.into()],
        "ToUnicode" => to_unicode_id,
    }))
}

/// CMap mapping glyph ids back to Unicode so text can be searched and copied.
fn to_unicode_cmap(used: &BTreeMap<u16, (u32, char)>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<_> = used.iter().collect();
    // bfchar blocks hold at most 100 entries
    for chunk in entries.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for (gid, (_, c)) in chunk {
            let mut units = [0u16; 2];
            let utf16: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            let _ = writeln!(cmap, "<{:04X}> <{}>", gid, utf16);
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

fn set_fill(ops: &mut String, color: Rgb) {
    let _ = writeln!(ops, "{:.3} {:.3} {:.3} rg", color.0, color.1, color.2);
}

fn set_stroke(ops: &mut String, color: Rgb) {
    let _ = writeln!(ops, "{:.3} {:.3} {:.3} RG", color.0, color.1, color.2);
}

/// PDF text string for document metadata: UTF-16BE with byte-order mark.
fn text_string(s: &str) -> Object {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Lay out `page` on a single PDF page and return the file bytes.
pub fn write_document(
    page: &MergedPage,
    qr: &QrRaster,
    font: &FontProgram,
    title: &str,
) -> Result<Vec<u8>, RenderError> {
    let mut page_font = PageFont {
        face: font.face()?,
        data: &font.data,
        used: BTreeMap::new(),
    };

    let width_pt = page.page.width_mm * PT_PER_MM;
    let height_pt = page.page.height_mm * PT_PER_MM;
    let mut ops = String::new();

    for rect in &page.rects {
        set_stroke(&mut ops, rect.color);
        let _ = writeln!(
            ops,
            "{:.2} w {:.2} {:.2} {:.2} {:.2} re S",
            rect.line_width,
            rect.x_mm * PT_PER_MM,
            height_pt - (rect.y_mm + rect.height_mm) * PT_PER_MM,
            rect.width_mm * PT_PER_MM,
            rect.height_mm * PT_PER_MM,
        );
    }

    let barcode = &page.barcode;
    let side = barcode.size_mm * PT_PER_MM;
    let _ = writeln!(
        ops,
        "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /{} Do Q",
        side,
        side,
        barcode.x_mm * PT_PER_MM,
        height_pt - (barcode.y_mm + barcode.size_mm) * PT_PER_MM,
        IMAGE_NAME,
    );

    for text in &page.texts {
        let (hex, width) = page_font.encode(&text.text)?;
        let width_pt = width as f32 * text.size / 1000.0;
        let x = text.x_mm * PT_PER_MM;
        let x = match text.align {
            Align::Left => x,
            Align::Center => x - width_pt / 2.0,
            Align::Right => x - width_pt,
        };
        let y = height_pt - text.y_mm * PT_PER_MM;
        ops.push_str("BT\n");
        set_fill(&mut ops, text.color);
        let _ = writeln!(ops, "/{} {:.2} Tf", FONT_NAME, text.size);
        let _ = writeln!(ops, "{:.2} {:.2} Td", x, y);
        let _ = writeln!(ops, "<{}> Tj", hex);
        ops.push_str("ET\n");
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = page_font.add_to(&mut doc)?;

    let mut image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(qr.width),
            "Height" => i64::from(qr.height),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        qr.pixels.clone(),
    );
    image
        .compress()
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let image_id = doc.add_object(image);

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { FONT_NAME => font_id },
        "XObject" => dictionary! { IMAGE_NAME => image_id },
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            (width_pt.round() as i64).into(),
            (height_pt.round() as i64).into(),
        ],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => text_string(title),
        "Producer" => Object::string_literal("certify"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(out)
}

/// Text runs drawn on the first page of a document written by
/// [`write_document`], in drawing order, decoded through the font's
/// ToUnicode map.
pub fn extract_text(bytes: &[u8]) -> Result<Vec<String>, RenderError> {
    let pdf_err = |e: lopdf::Error| RenderError::Pdf(e.to_string());
    let doc = Document::load_mem(bytes).map_err(pdf_err)?;
    let page_id = doc
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| RenderError::Pdf("document has no pages".into()))?;

    let cmap_id = doc
        .objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .filter(|d| matches!(d.get(b"Subtype"), Ok(Object::Name(n)) if n.as_slice() == b"Type0"))
        .find_map(|d| d.get(b"ToUnicode").and_then(Object::as_reference).ok())
        .ok_or_else(|| RenderError::Pdf("no ToUnicode map".into()))?;
    let cmap = doc
        .get_object(cmap_id)
        .and_then(Object::as_stream)
        .map_err(pdf_err)?;
    let cmap = if cmap.dict.has(b"Filter") {
        cmap.decompressed_content().map_err(pdf_err)?
    } else {
        cmap.content.clone()
    };
    let glyphs = parse_bfchar(&String::from_utf8_lossy(&cmap));

    let content = doc.get_page_content(page_id).map_err(pdf_err)?;
    Ok(String::from_utf8_lossy(&content)
        .lines()
        .filter_map(|line| line.strip_suffix("> Tj")?.strip_prefix('<'))
        .map(|hex| {
            hex.as_bytes()
                .chunks(4)
                .map(|gid| {
                    std::str::from_utf8(gid)
                        .ok()
                        .and_then(|g| u16::from_str_radix(g, 16).ok())
                        .and_then(|g| glyphs.get(&g))
                        .cloned()
                        .unwrap_or_else(|| char::REPLACEMENT_CHARACTER.to_string())
                })
                .collect::<String>()
        })
        .collect())
}

/// `<gid> <utf16>` pairs of a ToUnicode CMap.
fn parse_bfchar(cmap: &str) -> BTreeMap<u16, String> {
    let mut glyphs = BTreeMap::new();
    let mut in_block = false;
    for line in cmap.lines() {
        if line.ends_with("beginbfchar") {
            in_block = true;
            continue;
        }
        if line == "endbfchar" {
            in_block = false;
        }
        if !in_block {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(gid), Some(uni), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let unhex = |s: &str| s.strip_prefix('<')?.strip_suffix('>').map(str::to_owned);
        let (Some(gid), Some(uni)) = (unhex(gid), unhex(uni)) else {
            continue;
        };
        let Ok(gid) = u16::from_str_radix(&gid, 16) else {
            continue;
        };
        let units: Option<Vec<u16>> = uni
            .as_bytes()
            .chunks(4)
            .map(|u| u16::from_str_radix(std::str::from_utf8(u).ok()?, 16).ok())
            .collect();
        if let Some(text) = units.and_then(|u| String::from_utf16(&u).ok()) {
            glyphs.insert(gid, text);
        }
    }
    glyphs
}
