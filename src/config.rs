//! # Label Configuration
//!
//! [`ConfigOptions`] is what users write: every field optional, camelCase
//! JSON keys. [`TemplateConfig::new`] checks it against the page and freezes
//! it; renderers only ever see the validated form.

use serde::{Deserialize, Serialize};

use crate::error::LabelError;
use crate::font::FontRole;
use crate::model::TemplateKind;
use crate::packaging::PackagingOptions;
use crate::text::{FitMode, FitRequest, HAlign, EPSILON};

/// Upper bound on `copies`. Each copy is a laid-out label held in memory.
pub const MAX_COPIES: u32 = 1_000;

/// Standard page sizes in points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom {
        width: f64,
        height: f64,
    },
}

impl PageSize {
    /// Returns (width, height) in points.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

/// Edge values (top, right, bottom, left) used for page margins.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }

    /// True when any edge is negative or NaN.
    fn any_negative(&self) -> bool {
        [self.top, self.right, self.bottom, self.left]
            .iter()
            .any(|v| !(*v >= 0.0))
    }
}

/// Typography for one kind of label text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStyle {
    /// Font role key: `regular` or `bold`.
    pub font: String,
    pub size: f64,
    #[serde(default)]
    pub align: HAlign,
    #[serde(default)]
    pub mode: FitMode,
}

impl FieldStyle {
    fn new(role: FontRole, size: f64, align: HAlign, mode: FitMode) -> Self {
        Self {
            font: role.key().to_string(),
            size,
            align,
            mode,
        }
    }
}

/// The text slots every template draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSlot {
    Title,
    Quantity,
    Detail,
    Serial,
    Caption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldStyles {
    pub title: FieldStyle,
    pub quantity: FieldStyle,
    pub detail: FieldStyle,
    pub serial: FieldStyle,
    /// Small captions: split part numbers, nested child labels, page header.
    pub caption: FieldStyle,
}

impl Default for FieldStyles {
    fn default() -> Self {
        Self {
            title: FieldStyle::new(FontRole::Bold, 14.0, HAlign::Center, FitMode::ShrinkToFit),
            quantity: FieldStyle::new(FontRole::Bold, 12.0, HAlign::Center, FitMode::ShrinkToFit),
            detail: FieldStyle::new(FontRole::Regular, 9.0, HAlign::Left, FitMode::Wrap),
            serial: FieldStyle::new(FontRole::Bold, 10.0, HAlign::Center, FitMode::ShrinkToFit),
            caption: FieldStyle::new(FontRole::Regular, 7.0, HAlign::Center, FitMode::Truncate),
        }
    }
}

impl FieldStyles {
    fn get(&self, slot: FieldSlot) -> &FieldStyle {
        match slot {
            FieldSlot::Title => &self.title,
            FieldSlot::Quantity => &self.quantity,
            FieldSlot::Detail => &self.detail,
            FieldSlot::Serial => &self.serial,
            FieldSlot::Caption => &self.caption,
        }
    }

    fn named(&self) -> [(&'static str, &FieldStyle); 5] {
        [
            ("title", &self.title),
            ("quantity", &self.quantity),
            ("detail", &self.detail),
            ("serial", &self.serial),
            ("caption", &self.caption),
        ]
    }
}

/// How split sub-boxes are laid out under the title band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SplitDirection {
    #[default]
    Horizontal,
    Vertical,
}

/// Document information written into the PDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// User-facing options. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOptions {
    pub template: TemplateKind,
    pub page_size: PageSize,
    pub margin: Edges,
    pub rows: u32,
    pub columns: u32,
    pub box_width: f64,
    pub box_height: f64,
    /// Space between adjacent boxes.
    pub gutter: f64,
    /// Inner padding of each box.
    pub padding: f64,
    pub fields: FieldStyles,
    pub min_font_size: f64,
    pub shrink_step: f64,
    /// Line height as a multiple of the font size.
    pub line_height: f64,
    pub decimal_places: u32,
    pub show_border: bool,
    pub border_width: f64,
    pub show_barcode: bool,
    pub show_empty_slots: bool,
    pub split_count: u32,
    pub split_fields: Vec<String>,
    pub split_direction: SplitDirection,
    pub inner_box_width: f64,
    pub inner_box_height: f64,
    pub inner_gap: f64,
    /// How many consecutive cells each record fills.
    pub copies: u32,
    /// Text repeated at the top of every page, inside the top margin.
    pub header: Option<String>,
    /// Unit appended to the quantity, e.g. "pcs".
    pub quantity_suffix: String,
    pub metadata: DocumentMetadata,
    /// Expand each row into box or carton labels. Regular template only.
    pub packaging: Option<PackagingOptions>,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            template: TemplateKind::Regular,
            page_size: PageSize::A4,
            margin: Edges::uniform(28.35), // 10 mm
            rows: 5,
            columns: 2,
            box_width: 255.12,  // 90 mm
            box_height: 141.73, // 50 mm
            gutter: 8.5,
            padding: 4.0,
            fields: FieldStyles::default(),
            min_font_size: 4.0,
            shrink_step: 0.5,
            line_height: 1.2,
            decimal_places: 0,
            show_border: true,
            border_width: 0.75,
            show_barcode: false,
            show_empty_slots: true,
            split_count: 2,
            split_fields: vec!["code".to_string()],
            split_direction: SplitDirection::Horizontal,
            inner_box_width: 56.7,  // 20 mm
            inner_box_height: 28.35, // 10 mm
            inner_gap: 2.83,
            copies: 1,
            header: None,
            quantity_suffix: String::new(),
            metadata: DocumentMetadata::default(),
            packaging: None,
        }
    }
}

impl ConfigOptions {
    /// Parse options from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, LabelError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A field style with its role resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub role: FontRole,
    pub size: f64,
    pub align: HAlign,
    pub mode: FitMode,
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    options: ConfigOptions,
    title: TextStyle,
    quantity: TextStyle,
    detail: TextStyle,
    serial: TextStyle,
    caption: TextStyle,
}

fn invalid(msg: impl Into<String>) -> LabelError {
    LabelError::InvalidConfig(msg.into())
}

impl TemplateConfig {
    pub fn new(options: ConfigOptions) -> Result<Self, LabelError> {
        validate(&options)?;
        let resolve = |slot: FieldSlot| -> Result<TextStyle, LabelError> {
            let style = options.fields.get(slot);
            let role = FontRole::from_key(&style.font)
                .ok_or_else(|| invalid(format!("unknown font role '{}'", style.font)))?;
            Ok(TextStyle {
                role,
                size: style.size,
                align: style.align,
                mode: style.mode,
            })
        };
        Ok(Self {
            title: resolve(FieldSlot::Title)?,
            quantity: resolve(FieldSlot::Quantity)?,
            detail: resolve(FieldSlot::Detail)?,
            serial: resolve(FieldSlot::Serial)?,
            caption: resolve(FieldSlot::Caption)?,
            options,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, LabelError> {
        Self::new(ConfigOptions::from_json(json)?)
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    pub fn kind(&self) -> TemplateKind {
        self.options.template
    }

    /// (width, height) in points.
    pub fn page_dimensions(&self) -> (f64, f64) {
        self.options.page_size.dimensions()
    }

    /// Cells per page.
    pub fn capacity(&self) -> usize {
        self.options.rows as usize * self.options.columns as usize
    }

    pub fn decimal_places(&self) -> u8 {
        self.options.decimal_places as u8
    }

    pub fn packaging(&self) -> Option<&PackagingOptions> {
        self.options.packaging.as_ref()
    }

    pub fn copies(&self) -> usize {
        self.options.copies as usize
    }

    pub fn split_count(&self) -> usize {
        self.options.split_count as usize
    }

    pub fn style(&self, slot: FieldSlot) -> &TextStyle {
        match slot {
            FieldSlot::Title => &self.title,
            FieldSlot::Quantity => &self.quantity,
            FieldSlot::Detail => &self.detail,
            FieldSlot::Serial => &self.serial,
            FieldSlot::Caption => &self.caption,
        }
    }

    /// A fit request for `slot` sized to a `width` × `height` area.
    pub fn fit_request(&self, slot: FieldSlot, width: f64, height: f64) -> FitRequest {
        let style = self.style(slot);
        FitRequest::new(width, height, style.size)
            .mode(style.mode)
            .min_font_size(self.options.min_font_size)
            .step(self.options.shrink_step)
            .line_height(self.options.line_height)
    }

    /// Inner boxes that fit an area, per axis: floor((W+gap)/(w+gap)).
    pub fn inner_grid(&self, width: f64, height: f64) -> (usize, usize) {
        let o = &self.options;
        let per_axis = |outer: f64, inner: f64| -> usize {
            if outer + EPSILON < inner {
                0
            } else {
                ((outer + o.inner_gap + EPSILON) / (inner + o.inner_gap)).floor() as usize
            }
        };
        (
            per_axis(width, o.inner_box_width),
            per_axis(height, o.inner_box_height),
        )
    }
}

fn validate(o: &ConfigOptions) -> Result<(), LabelError> {
    let (page_w, page_h) = o.page_size.dimensions();
    if !(page_w > 0.0 && page_h > 0.0) {
        return Err(invalid("page size must be positive"));
    }
    if o.rows < 1 || o.columns < 1 {
        return Err(invalid(format!(
            "grid must have at least one row and one column, got {}x{}",
            o.rows, o.columns
        )));
    }
    if !(o.box_width > 0.0 && o.box_height > 0.0) {
        return Err(invalid(format!(
            "box size must be positive, got {}x{}",
            o.box_width, o.box_height
        )));
    }
    if o.margin.any_negative() {
        return Err(invalid("margins must not be negative"));
    }
    if !(o.gutter >= 0.0) {
        return Err(invalid("gutter must not be negative"));
    }
    if !(o.padding >= 0.0) {
        return Err(invalid("padding must not be negative"));
    }
    if o.padding * 2.0 >= o.box_width.min(o.box_height) {
        return Err(invalid("padding leaves no room inside the box"));
    }

    let grid_w = o.columns as f64 * o.box_width + (o.columns - 1) as f64 * o.gutter;
    let grid_h = o.rows as f64 * o.box_height + (o.rows - 1) as f64 * o.gutter;
    let avail_w = page_w - o.margin.horizontal();
    let avail_h = page_h - o.margin.vertical();
    if grid_w > avail_w + EPSILON || grid_h > avail_h + EPSILON {
        return Err(invalid(format!(
            "{}x{} grid needs {:.2}x{:.2}pt but the page leaves {:.2}x{:.2}pt inside the margins",
            o.rows, o.columns, grid_w, grid_h, avail_w, avail_h
        )));
    }

    if !(o.min_font_size > 0.0) {
        return Err(invalid("minimum font size must be positive"));
    }
    if !(o.shrink_step > 0.0) {
        return Err(invalid("shrink step must be positive"));
    }
    if !(o.line_height > 0.0) {
        return Err(invalid("line height must be positive"));
    }
    for (name, style) in o.fields.named() {
        if FontRole::from_key(&style.font).is_none() {
            return Err(invalid(format!(
                "{} style uses unknown font role '{}', expected 'regular' or 'bold'",
                name, style.font
            )));
        }
        if !(style.size > 0.0) || style.size < o.min_font_size {
            return Err(invalid(format!(
                "{} font size {} must be at least the minimum {}",
                name, style.size, o.min_font_size
            )));
        }
    }

    if o.decimal_places > 6 {
        return Err(invalid(format!(
            "decimal places must be at most 6, got {}",
            o.decimal_places
        )));
    }
    if o.copies < 1 || o.copies > MAX_COPIES {
        return Err(invalid(format!(
            "copies must be between 1 and {}, got {}",
            MAX_COPIES, o.copies
        )));
    }
    if !(o.border_width >= 0.0) {
        return Err(invalid("border width must not be negative"));
    }

    if o.split_count < 1 {
        return Err(invalid("split count must be at least 1"));
    }
    let n = o.split_fields.len();
    if n != 1 && n != o.split_count as usize {
        return Err(invalid(format!(
            "split fields must name one field or exactly {} fields, got {}",
            o.split_count, n
        )));
    }
    if o.split_fields.iter().any(|f| f.trim().is_empty()) {
        return Err(invalid("split field names must not be blank"));
    }

    if !(o.inner_box_width > 0.0 && o.inner_box_height > 0.0) {
        return Err(invalid("inner box size must be positive"));
    }
    if !(o.inner_gap >= 0.0) {
        return Err(invalid("inner gap must not be negative"));
    }

    if let Some(packaging) = &o.packaging {
        if o.template != TemplateKind::Regular {
            return Err(invalid(format!(
                "packaging applies to the regular template, not {}",
                o.template
            )));
        }
        packaging.validate().map_err(invalid)?;
    }

    Ok(())
}
