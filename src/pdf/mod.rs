//! # PDF Serializer
//!
//! Turns rendered label pages into a PDF 1.7 byte stream.
//!
//! The writer is hand-rolled: labels need rectangles, text and filled
//! squares (QR modules), and nothing else. Objects are collected in memory
//! and serialized once with an xref table at the end.
//!
//! ```text
//! %PDF-1.7
//! 1 0 obj Catalog          2 0 obj Pages
//! n 0 obj Font (reserved on first use, filled in by finish)
//! n 0 obj content stream   n 0 obj Page      ... per page
//! n 0 obj FontFile2 / FontDescriptor / CIDFont / ToUnicode  ... per font
//! xref / trailer / %%EOF
//! ```
//!
//! ## Fonts
//!
//! The built-in fallback fonts are plain Type1 references with
//! WinAnsiEncoding. TrueType fonts are embedded whole as CIDFontType2 with
//! Identity-H encoding, so text is written as 2-byte glyph IDs. The `/W`
//! array and the ToUnicode CMap only cover characters that were drawn.
//!
//! Output is deterministic: no timestamps, and every map that reaches the
//! byte stream is sorted first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;
use std::sync::Arc;

use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::config::DocumentMetadata;
use crate::error::LabelError;
use crate::font::metrics::winansi_code;
use crate::font::{CustomFont, FontContext, FontData, FontRole};
use crate::layout::{Barcode, Decoration, FieldPlacement, LayoutBox, PageItem, RenderedPage};
use crate::pipeline::{RenderHooks, Stage};

struct PdfObject {
    data: Vec<u8>,
}

/// A font registered with the document.
struct FontSlot {
    /// Object ID reserved for the font dictionary.
    obj_id: usize,
    /// Characters drawn with this font, for `/W` and ToUnicode.
    used: BTreeSet<char>,
}

/// An append-only PDF under construction.
///
/// Pages go in one at a time with [`add_page`](Self::add_page); [`finish`](Self::finish)
/// consumes the document, so the trailer is written exactly once.
pub struct PdfDocument<'a> {
    fonts: &'a FontContext,
    page_width: f64,
    page_height: f64,
    metadata: DocumentMetadata,
    objects: Vec<PdfObject>,
    page_ids: Vec<usize>,
    font_slots: BTreeMap<FontRole, FontSlot>,
}

impl<'a> PdfDocument<'a> {
    pub fn new(page_size: (f64, f64), metadata: DocumentMetadata, fonts: &'a FontContext) -> Self {
        // 0 = placeholder (PDF objects are 1-indexed)
        // 1 = Catalog
        // 2 = Pages (page tree root)
        let objects = (0..3).map(|_| PdfObject { data: Vec::new() }).collect();
        Self {
            fonts,
            page_width: page_size.0,
            page_height: page_size.1,
            metadata,
            objects,
            page_ids: Vec::new(),
            font_slots: BTreeMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn push_object(&mut self, data: Vec<u8>) -> usize {
        let id = self.objects.len();
        self.objects.push(PdfObject { data });
        id
    }

    fn push_stream(&mut self, dict_extra: &str, raw: &[u8]) -> usize {
        let compressed = compress_to_vec_zlib(raw, 6);
        let mut data: Vec<u8> = Vec::new();
        let _ = write!(
            data,
            "<< /Length {} /Filter /FlateDecode{} >>\nstream\n",
            compressed.len(),
            dict_extra
        );
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream");
        self.push_object(data)
    }

    /// The role whose font object actually backs `role`.
    ///
    /// When bold fell back to the regular file both roles share one font
    /// object instead of embedding the same file twice.
    fn backing_role(&self, role: FontRole) -> FontRole {
        match (
            self.fonts.resolve(role),
            self.fonts.resolve(FontRole::Regular),
        ) {
            (FontData::Custom(a), FontData::Custom(b)) if Arc::ptr_eq(a, b) => FontRole::Regular,
            _ => role,
        }
    }

    /// Reserve the font object for a role on first use. Idempotent.
    fn register_font(&mut self, role: FontRole) -> FontRole {
        let role = self.backing_role(role);
        if !self.font_slots.contains_key(&role) {
            let obj_id = self.push_object(Vec::new());
            self.font_slots.insert(
                role,
                FontSlot {
                    obj_id,
                    used: BTreeSet::new(),
                },
            );
        }
        role
    }

    /// Append one page.
    pub fn add_page(&mut self, page: &RenderedPage) -> Result<(), LabelError> {
        let mut content = String::new();
        let mut page_fonts = BTreeSet::new();
        // Black fill and stroke for everything.
        content.push_str("0 g 0 G\n");

        for item in &page.items {
            match item {
                PageItem::Box(label) => self.write_box(&mut content, &mut page_fonts, label),
                PageItem::Decoration(Decoration::Text(field)) => {
                    self.write_field(&mut content, &mut page_fonts, field)
                }
                PageItem::Decoration(Decoration::Rule { from, to, width }) => {
                    let _ = writeln!(
                        content,
                        "{:.2} w {:.2} {:.2} m {:.2} {:.2} l S",
                        width,
                        from.0,
                        self.page_height - from.1,
                        to.0,
                        self.page_height - to.1
                    );
                }
            }
        }

        let content_id = self.push_stream("", content.as_bytes());

        let font_resources = page_fonts
            .iter()
            .filter_map(|role| {
                self.font_slots
                    .get(role)
                    .map(|slot| format!("/{} {} 0 R", resource_name(*role), slot.obj_id))
            })
            .collect::<Vec<_>>()
            .join(" ");
        let resources = if font_resources.is_empty() {
            String::new()
        } else {
            format!("/Font << {} >>", font_resources)
        };
        let page_dict = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
             /Contents {} 0 R /Resources << {} >> >>",
            self.page_width, self.page_height, content_id, resources
        );
        let page_id = self.push_object(page_dict.into_bytes());
        self.page_ids.push(page_id);
        Ok(())
    }

    fn write_box(&mut self, content: &mut String, page_fonts: &mut BTreeSet<FontRole>, label: &LayoutBox) {
        let r = &label.rect;
        if let Some(width) = label.border {
            let _ = writeln!(
                content,
                "{:.2} w {:.2} {:.2} {:.2} {:.2} re S",
                width,
                r.x,
                self.page_height - r.y - r.height,
                r.width,
                r.height
            );
        }
        if let Some(barcode) = &label.barcode {
            self.write_barcode(content, barcode);
        }
        for field in &label.fields {
            self.write_field(content, page_fonts, field);
        }
        for child in &label.children {
            self.write_box(content, page_fonts, child);
        }
    }

    /// Dark modules as filled squares, one path, one fill.
    fn write_barcode(&self, content: &mut String, barcode: &Barcode) {
        if barcode.modules == 0 {
            return;
        }
        let module = barcode.rect.width / barcode.modules as f64;
        let top = self.page_height - barcode.rect.y;
        for (i, _) in barcode.dark.iter().enumerate().filter(|(_, dark)| **dark) {
            let (row, col) = (i / barcode.modules, i % barcode.modules);
            let _ = writeln!(
                content,
                "{:.3} {:.3} {:.3} {:.3} re",
                barcode.rect.x + col as f64 * module,
                top - (row + 1) as f64 * module,
                module,
                module
            );
        }
        content.push_str("f\n");
    }

    fn write_field(&mut self, content: &mut String, page_fonts: &mut BTreeSet<FontRole>, field: &FieldPlacement) {
        if field.lines.is_empty() {
            return;
        }
        let role = self.register_font(field.role);
        page_fonts.insert(role);

        let fonts = self.fonts;
        let font = fonts.resolve(role);
        let _ = writeln!(content, "BT /{} {:.2} Tf", resource_name(role), field.font_size);
        for line in &field.lines {
            let encoded = match font {
                FontData::Standard(_) => format!("({})", encode_winansi(&line.text)),
                FontData::Custom(custom) => {
                    if let Some(slot) = self.font_slots.get_mut(&role) {
                        slot.used.extend(line.text.chars());
                    }
                    format!("<{}>", encode_glyph_ids(custom, &line.text))
                }
            };
            let _ = writeln!(
                content,
                "1 0 0 1 {:.2} {:.2} Tm {} Tj",
                line.x,
                self.page_height - line.baseline,
                encoded
            );
        }
        content.push_str("ET\n");
    }

    /// Write the font objects, page tree and trailer.
    pub fn finish(mut self) -> Result<Vec<u8>, LabelError> {
        let fonts = self.fonts;
        let slots: Vec<(FontRole, usize, BTreeSet<char>)> = std::mem::take(&mut self.font_slots)
            .into_iter()
            .map(|(role, slot)| (role, slot.obj_id, slot.used))
            .collect();
        for (role, obj_id, used) in slots {
            let dict = match fonts.resolve(role) {
                FontData::Standard(std_font) => format!(
                    "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                    std_font.pdf_name()
                ),
                FontData::Custom(custom) => self.write_custom_font_objects(role, custom, &used)?,
            };
            self.objects[obj_id].data = dict.into_bytes();
        }

        self.objects[1].data = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");
        self.objects[2].data = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            self.page_ids.len()
        )
        .into_bytes();

        let mut info = String::from("<< ");
        if let Some(title) = &self.metadata.title {
            let _ = write!(info, "/Title {} ", pdf_text_string(title));
        }
        if let Some(author) = &self.metadata.author {
            let _ = write!(info, "/Author {} ", pdf_text_string(author));
        }
        info.push_str("/Producer (boxlabel) >>");
        let info_id = self.push_object(info.into_bytes());

        Ok(self.serialize(info_id))
    }

    /// Embed a TrueType font. Returns the Type0 dictionary for the reserved
    /// slot; the four supporting objects are appended.
    fn write_custom_font_objects(
        &mut self,
        role: FontRole,
        font: &CustomFont,
        used: &BTreeSet<char>,
    ) -> Result<String, LabelError> {
        let face = ttf_parser::Face::parse(&font.data, 0).map_err(|e| {
            LabelError::Render(format!("failed to parse font '{}': {}", font.name, e))
        })?;
        let metrics = &font.metrics;
        let scale = 1000.0 / metrics.units_per_em as f64;
        let pdf_font_name = sanitize_font_name(&font.name, role);

        let char_to_gid: BTreeMap<char, u16> = used
            .iter()
            .filter_map(|ch| metrics.glyph_ids.get(ch).map(|gid| (*ch, *gid)))
            .collect();

        // 1. FontFile2 stream
        let fontfile2_id =
            self.push_stream(&format!(" /Length1 {}", font.data.len()), &font.data);

        // 2. FontDescriptor
        let bbox = face.global_bounding_box();
        let bbox_str = format!(
            "[{} {} {} {}]",
            (bbox.x_min as f64 * scale) as i32,
            (bbox.y_min as f64 * scale) as i32,
            (bbox.x_max as f64 * scale) as i32,
            (bbox.y_max as f64 * scale) as i32,
        );
        let cap_height = face.capital_height().unwrap_or(metrics.ascender) as f64 * scale;
        let stem_v = match role {
            FontRole::Bold => 120,
            FontRole::Regular => 80,
        };
        let descriptor = format!(
            "<< /Type /FontDescriptor /FontName /{} /Flags 4 \
             /FontBBox {} /ItalicAngle 0 \
             /Ascent {} /Descent {} /CapHeight {} /StemV {} \
             /FontFile2 {} 0 R >>",
            pdf_font_name,
            bbox_str,
            (metrics.ascender as f64 * scale) as i32,
            (metrics.descender as f64 * scale) as i32,
            cap_height as i32,
            stem_v,
            fontfile2_id,
        );
        let descriptor_id = self.push_object(descriptor.into_bytes());

        // 3. CIDFont
        let default_width = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .map(|adv| (adv as f64 * scale) as u32)
            .unwrap_or(1000);
        let cidfont = format!(
            "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} \
             /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> \
             /FontDescriptor {} 0 R /DW {} /W {} \
             /CIDToGIDMap /Identity >>",
            pdf_font_name,
            descriptor_id,
            default_width,
            build_w_array(&char_to_gid, &face, scale),
        );
        let cidfont_id = self.push_object(cidfont.into_bytes());

        // 4. ToUnicode CMap
        let cmap = build_tounicode_cmap(&char_to_gid, &pdf_font_name);
        let tounicode_id = self.push_stream("", cmap.as_bytes());

        tracing::debug!(
            font = %pdf_font_name,
            glyphs = char_to_gid.len(),
            bytes = font.data.len(),
            "embedded font"
        );

        // 5. Type0 root, referenced from page resources
        Ok(format!(
            "<< /Type /Font /Subtype /Type0 /BaseFont /{} \
             /Encoding /Identity-H \
             /DescendantFonts [{} 0 R] \
             /ToUnicode {} 0 R >>",
            pdf_font_name, cidfont_id, tounicode_id,
        ))
    }

    /// Serialize all objects into the final PDF byte stream.
    fn serialize(&self, info_obj_id: usize) -> Vec<u8> {
        let mut output: Vec<u8> = Vec::new();
        let mut offsets: Vec<usize> = vec![0; self.objects.len()];

        output.extend_from_slice(b"%PDF-1.7\n");
        output.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

        for (i, obj) in self.objects.iter().enumerate().skip(1) {
            offsets[i] = output.len();
            let _ = write!(output, "{} 0 obj\n", i);
            output.extend_from_slice(&obj.data);
            output.extend_from_slice(b"\nendobj\n\n");
        }

        let xref_offset = output.len();
        let _ = write!(output, "xref\n0 {}\n", self.objects.len());
        let _ = write!(output, "0000000000 65535 f \n");
        for offset in offsets.iter().skip(1) {
            let _ = write!(output, "{:010} 00000 n \n", offset);
        }
        let _ = write!(
            output,
            "trailer\n<< /Size {} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.objects.len(),
            info_obj_id,
            xref_offset
        );
        output
    }
}

/// Options for [`assemble`].
#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// (width, height) in points.
    pub page_size: (f64, f64),
    pub metadata: DocumentMetadata,
}

/// Write every page into one PDF.
///
/// Cancellation is checked before each page; a cancelled pass returns
/// [`LabelError::Cancelled`] and no bytes.
pub fn assemble(
    pages: &[RenderedPage],
    options: &AssembleOptions,
    fonts: &FontContext,
    hooks: &mut RenderHooks<'_>,
) -> Result<Vec<u8>, LabelError> {
    let total = pages.len();
    let mut doc = PdfDocument::new(options.page_size, options.metadata.clone(), fonts);
    for (done, page) in pages.iter().enumerate() {
        if hooks.is_cancelled() {
            return Err(LabelError::Cancelled { done, total });
        }
        doc.add_page(page)?;
        hooks.report(Stage::Assemble, done + 1, total);
    }
    let bytes = doc.finish()?;
    tracing::debug!(pages = total, bytes = bytes.len(), "assembled PDF");
    Ok(bytes)
}

fn resource_name(role: FontRole) -> &'static str {
    match role {
        FontRole::Regular => "F0",
        FontRole::Bold => "F1",
    }
}

/// Sanitize a font name for use as a PDF name object.
fn sanitize_font_name(name: &str, role: FontRole) -> String {
    let mut sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if sanitized.is_empty() {
        sanitized = "CustomFont".to_string();
    }
    if role == FontRole::Bold && !sanitized.to_ascii_lowercase().contains("bold") {
        sanitized.push_str("-Bold");
    }
    sanitized
}

/// Build the /W array: `[gid [width] gid [width] ...]`, sorted by glyph ID.
fn build_w_array(char_to_gid: &BTreeMap<char, u16>, face: &ttf_parser::Face, scale: f64) -> String {
    let gids: BTreeSet<u16> = char_to_gid.values().copied().collect();
    let mut result = String::from("[");
    for gid in gids {
        let advance = face.glyph_hor_advance(ttf_parser::GlyphId(gid)).unwrap_or(0);
        let _ = write!(result, " {} [{}]", gid, (advance as f64 * scale) as u32);
    }
    result.push_str(" ]");
    result
}

/// Build a ToUnicode CMap so text can be copied and searched.
fn build_tounicode_cmap(char_to_gid: &BTreeMap<char, u16>, font_name: &str) -> String {
    let mut gid_to_unicode: Vec<(u16, char)> =
        char_to_gid.iter().map(|(&ch, &gid)| (gid, ch)).collect();
    gid_to_unicode.sort();
    gid_to_unicode.dedup_by_key(|(gid, _)| *gid);

    let mut cmap = String::new();
    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo\n");
    cmap.push_str("<< /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    let _ = writeln!(cmap, "/CMapName /{}-UTF16 def", font_name);
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    // At most 100 entries per bfchar block.
    for chunk in gid_to_unicode.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for &(gid, ch) in chunk {
            let mut units = [0u16; 2];
            let utf16: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            let _ = writeln!(cmap, "<{:04X}> <{}>", gid, utf16);
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\nend\n");
    cmap
}

/// Hex glyph IDs for Identity-H. Characters the font lacks map to .notdef.
fn encode_glyph_ids(font: &CustomFont, text: &str) -> String {
    text.chars()
        .map(|ch| format!("{:04X}", font.metrics.glyph_ids.get(&ch).copied().unwrap_or(0)))
        .collect()
}

/// Encode text for a WinAnsi literal string. Unmappable characters become `?`.
fn encode_winansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match winansi_code(ch) {
            Some(b'\\') => out.push_str("\\\\"),
            Some(b'(') => out.push_str("\\("),
            Some(b')') => out.push_str("\\)"),
            Some(b) if b.is_ascii() => out.push(b as char),
            Some(b) => {
                let _ = write!(out, "\\{:03o}", b);
            }
            None => out.push('?'),
        }
    }
    out
}

/// A PDF text string: literal for ASCII, UTF-16BE hex with BOM otherwise.
fn pdf_text_string(s: &str) -> String {
    if s.is_ascii() {
        format!(
            "({})",
            s.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
        )
    } else {
        let hex: String = s.encode_utf16().map(|u| format!("{:04X}", u)).collect();
        format!("<FEFF{}>", hex)
    }
}
