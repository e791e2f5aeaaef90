//! # Font Management
//!
//! Loading, caching and measuring the two fonts a label uses: a regular and
//! a bold weight, both expected to cover CJK text.
//!
//! Font files are read once per [`FontContext`], lazily, the first time any
//! font is resolved. When the regular font cannot be loaded, both roles fall
//! back to the built-in Helvetica pair and the context is marked degraded:
//! rendering still succeeds but CJK glyphs come out as `?`.

pub mod metrics;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

pub use metrics::StandardFontMetrics;

/// Default locations of the bundled font assets, relative to the working directory.
pub const DEFAULT_REGULAR_FONT: &str = "fonts/cjk-regular.ttf";
pub const DEFAULT_BOLD_FONT: &str = "fonts/cjk-bold.ttf";

/// The weight a piece of label text is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontRole {
    Regular,
    Bold,
}

impl FontRole {
    pub const ALL: [FontRole; 2] = [FontRole::Regular, FontRole::Bold];

    /// The configuration key for this role.
    pub fn key(&self) -> &'static str {
        match self {
            FontRole::Regular => "regular",
            FontRole::Bold => "bold",
        }
    }

    /// Look up a role by configuration key. Unknown keys return `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        FontRole::ALL.into_iter().find(|r| r.key() == key)
    }
}

/// The two standard PDF fonts used as fallback. No embedding needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    /// The PDF name for this font.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
        }
    }

    pub fn metrics(&self) -> &'static StandardFontMetrics {
        match self {
            Self::Helvetica => &StandardFontMetrics::HELVETICA,
            Self::HelveticaBold => &StandardFontMetrics::HELVETICA_BOLD,
        }
    }

    fn for_role(role: FontRole) -> Self {
        match role {
            FontRole::Regular => Self::Helvetica,
            FontRole::Bold => Self::HelveticaBold,
        }
    }
}

/// A resolved font, ready for measurement and PDF embedding.
#[derive(Debug, Clone)]
pub enum FontData {
    /// One of the standard PDF fonts.
    Standard(StandardFont),
    /// A TrueType font that is embedded in the output.
    Custom(Arc<CustomFont>),
}

/// A parsed TrueType font and its raw bytes.
#[derive(Debug)]
pub struct CustomFont {
    /// PostScript name used as the PDF `/BaseFont`.
    pub name: String,
    pub data: Vec<u8>,
    pub metrics: CustomFontMetrics,
}

/// Parsed metrics from a TrueType font via ttf-parser.
#[derive(Debug, Clone)]
pub struct CustomFontMetrics {
    pub units_per_em: u16,
    pub advance_widths: HashMap<char, u16>,
    pub default_advance: u16,
    pub ascender: i16,
    pub descender: i16,
    /// Maps characters to their glyph IDs in the font.
    pub glyph_ids: HashMap<char, u16>,
}

impl CustomFontMetrics {
    /// Get the advance width of a character in points.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        let w = self
            .advance_widths
            .get(&ch)
            .copied()
            .unwrap_or(self.default_advance);
        (w as f64 / self.units_per_em as f64) * font_size
    }

    /// Parse metrics from font data using ttf-parser.
    pub fn from_face(face: &ttf_parser::Face) -> Self {
        let units_per_em = face.units_per_em();
        let mut advance_widths = HashMap::new();
        let mut glyph_ids = HashMap::new();
        let mut default_advance = 0u16;

        // The whole BMP: covers CJK Unified Ideographs and the common
        // full-width punctuation blocks.
        for code in 32u32..=0xFFFF {
            if let Some(ch) = char::from_u32(code) {
                if let Some(glyph_id) = face.glyph_index(ch) {
                    let advance = face.glyph_hor_advance(glyph_id).unwrap_or(0);
                    advance_widths.insert(ch, advance);
                    glyph_ids.insert(ch, glyph_id.0);
                    if ch == ' ' {
                        default_advance = advance;
                    }
                }
            }
        }

        if default_advance == 0 {
            default_advance = units_per_em / 2;
        }

        CustomFontMetrics {
            units_per_em,
            advance_widths,
            default_advance,
            ascender: face.ascender(),
            descender: face.descender(),
            glyph_ids,
        }
    }
}

impl CustomFont {
    /// Parse a TrueType file. Collections (`.ttc`) are rejected because a
    /// PDF `FontFile2` stream must hold a single font.
    pub fn parse(data: Vec<u8>) -> Result<Self, String> {
        if ttf_parser::fonts_in_collection(&data).is_some() {
            return Err("font collections (.ttc) cannot be embedded".to_string());
        }
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| e.to_string())?;
        let name = postscript_name(&face).unwrap_or_else(|| "BoxlabelCJK".to_string());
        let metrics = CustomFontMetrics::from_face(&face);
        drop(face);
        Ok(CustomFont {
            name,
            data,
            metrics,
        })
    }
}

fn postscript_name(face: &ttf_parser::Face) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME && n.is_unicode())
        .find_map(|n| n.to_string())
        .map(|s| {
            s.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
}

/// Where the fonts come from.
#[derive(Debug, Clone)]
pub enum FontSource {
    /// TrueType files on disk.
    Files { regular: PathBuf, bold: PathBuf },
    /// Font bytes already in memory. Used by tests and embedders.
    Memory {
        regular: Vec<u8>,
        bold: Option<Vec<u8>>,
    },
    /// Only the built-in Helvetica pair. Latin text only, not degraded.
    Builtin,
}

impl FontSource {
    /// The bundled assets at their default relative paths.
    pub fn default_files() -> Self {
        FontSource::Files {
            regular: PathBuf::from(DEFAULT_REGULAR_FONT),
            bold: PathBuf::from(DEFAULT_BOLD_FONT),
        }
    }

    /// The default file names inside a custom directory.
    pub fn from_dir(dir: &Path) -> Self {
        let file_name = |p: &str| {
            Path::new(p)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(p))
        };
        FontSource::Files {
            regular: dir.join(file_name(DEFAULT_REGULAR_FONT)),
            bold: dir.join(file_name(DEFAULT_BOLD_FONT)),
        }
    }
}

/// Non-fatal font problems the caller should tell the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderWarning {
    /// The CJK font could not be loaded. Helvetica is used instead and
    /// non-Latin text may display incorrectly.
    DegradedFonts { reason: String },
    /// The bold font could not be loaded. Bold text uses the regular font.
    BoldFallback { reason: String },
}

impl std::fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderWarning::DegradedFonts { reason } => write!(
                f,
                "CJK font unavailable ({}); using Helvetica, non-Latin text may not display",
                reason
            ),
            RenderWarning::BoldFallback { reason } => {
                write!(f, "bold font unavailable ({}); using the regular font", reason)
            }
        }
    }
}

struct LoadedFonts {
    regular: FontData,
    bold: FontData,
    degraded: bool,
    warnings: Vec<RenderWarning>,
}

/// Shared font context used by layout and PDF serialization.
///
/// Create one per process and pass it into every render pass. Fonts are
/// loaded on first use and never reloaded. The cache sits behind a
/// `OnceLock`, so a context can be shared between threads.
pub struct FontContext {
    source: FontSource,
    loaded: OnceLock<LoadedFonts>,
}

impl Default for FontContext {
    fn default() -> Self {
        Self::new(FontSource::default_files())
    }
}

impl FontContext {
    pub fn new(source: FontSource) -> Self {
        Self {
            source,
            loaded: OnceLock::new(),
        }
    }

    /// A context that only knows the built-in fonts.
    pub fn builtin() -> Self {
        Self::new(FontSource::Builtin)
    }

    /// Force loading now instead of on first use.
    pub fn preload(&self) {
        let _ = self.fonts();
    }

    fn fonts(&self) -> &LoadedFonts {
        self.loaded.get_or_init(|| load_fonts(&self.source))
    }

    /// Resolve a role to its font. Loads the fonts on first call.
    pub fn resolve(&self, role: FontRole) -> &FontData {
        let fonts = self.fonts();
        match role {
            FontRole::Regular => &fonts.regular,
            FontRole::Bold => &fonts.bold,
        }
    }

    /// True when the CJK font is missing and Helvetica stands in for it.
    pub fn is_degraded(&self) -> bool {
        self.fonts().degraded
    }

    pub fn warnings(&self) -> &[RenderWarning] {
        &self.fonts().warnings
    }

    /// Get the advance width of a single character in points.
    pub fn char_width(&self, role: FontRole, ch: char, font_size: f64) -> f64 {
        match self.resolve(role) {
            FontData::Standard(std_font) => std_font.metrics().char_width(ch, font_size),
            FontData::Custom(font) => font.metrics.char_width(ch, font_size),
        }
    }

    /// Measure the width of a string in points.
    pub fn measure_string(&self, role: FontRole, text: &str, font_size: f64) -> f64 {
        match self.resolve(role) {
            FontData::Standard(std_font) => std_font.metrics().measure_string(text, font_size),
            FontData::Custom(font) => text
                .chars()
                .map(|ch| font.metrics.char_width(ch, font_size))
                .sum(),
        }
    }

    /// Distance from the baseline to the top of the tallest glyphs, in points.
    pub fn ascender(&self, role: FontRole, font_size: f64) -> f64 {
        match self.resolve(role) {
            FontData::Standard(std_font) => std_font.metrics().ascender as f64 / 1000.0 * font_size,
            FontData::Custom(font) => {
                font.metrics.ascender as f64 / font.metrics.units_per_em as f64 * font_size
            }
        }
    }

    /// Whether the font can draw this character (not as `?` or tofu).
    pub fn has_glyph(&self, role: FontRole, ch: char) -> bool {
        match self.resolve(role) {
            FontData::Standard(_) => {
                let cp = ch as u32;
                (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp)
            }
            FontData::Custom(font) => font.metrics.glyph_ids.contains_key(&ch),
        }
    }
}

fn load_fonts(source: &FontSource) -> LoadedFonts {
    let (regular, bold) = match source {
        FontSource::Builtin => {
            return LoadedFonts {
                regular: FontData::Standard(StandardFont::Helvetica),
                bold: FontData::Standard(StandardFont::HelveticaBold),
                degraded: false,
                warnings: Vec::new(),
            };
        }
        FontSource::Files { regular, bold } => (load_file(regular), load_file(bold)),
        FontSource::Memory { regular, bold } => (
            CustomFont::parse(regular.clone()),
            match bold {
                Some(data) => CustomFont::parse(data.clone()),
                None => Err("no bold font supplied".to_string()),
            },
        ),
    };

    match (regular, bold) {
        (Ok(regular), Ok(bold)) => {
            tracing::debug!(regular = %regular.name, bold = %bold.name, "loaded label fonts");
            LoadedFonts {
                regular: FontData::Custom(Arc::new(regular)),
                bold: FontData::Custom(Arc::new(bold)),
                degraded: false,
                warnings: Vec::new(),
            }
        }
        (Ok(regular), Err(reason)) => {
            tracing::warn!(%reason, "bold font unavailable, bold text uses the regular font");
            let regular = Arc::new(regular);
            LoadedFonts {
                regular: FontData::Custom(regular.clone()),
                bold: FontData::Custom(regular),
                degraded: false,
                warnings: vec![RenderWarning::BoldFallback { reason }],
            }
        }
        (Err(reason), _) => {
            tracing::warn!(%reason, "CJK font unavailable, falling back to Helvetica");
            LoadedFonts {
                regular: FontData::Standard(StandardFont::for_role(FontRole::Regular)),
                bold: FontData::Standard(StandardFont::for_role(FontRole::Bold)),
                degraded: true,
                warnings: vec![RenderWarning::DegradedFonts { reason }],
            }
        }
    }
}

fn load_file(path: &Path) -> Result<CustomFont, String> {
    let data = fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    CustomFont::parse(data).map_err(|e| format!("{}: {}", path.display(), e))
}
