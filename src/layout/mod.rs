//! # Label Layout
//!
//! Every template packs labels into the same page grid: `rows × columns`
//! cells, row-major from the top-left margin corner, `gutter` apart. What a
//! template decides is only what goes *inside* one cell. That part lives in
//! the [`regular`], [`split`] and [`nested`] modules, one
//! [`TemplateRenderer`] each.
//!
//! Coordinates here are top-down: `y` grows towards the bottom of the page.
//! The PDF writer flips them.
//!
//! A record fills `copies` consecutive cells. The last page may end with
//! empty cells; they are outlined (when `show_empty_slots`) but never hold a
//! record, so every record appears exactly `copies` times.

pub mod nested;
pub mod regular;
pub mod split;

use crate::config::{FieldSlot, TemplateConfig};
use crate::error::LabelError;
use crate::font::{FontContext, FontRole};
use crate::model::{NormalizedRecord, TemplateKind};
use crate::text::{self, FitRequest, VAlign, EPSILON};

pub use nested::NestedRenderer;
pub use regular::RegularRenderer;
pub use split::SplitRenderer;

/// An axis-aligned rectangle in top-down page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Shrink by `d` on every side. Never goes negative.
    pub fn inset(&self, d: f64) -> Rect {
        Rect::new(
            self.x + d,
            self.y + d,
            (self.width - 2.0 * d).max(0.0),
            (self.height - 2.0 * d).max(0.0),
        )
    }

    /// Cut a band of `height` off the top. Returns (band, rest).
    pub fn take_top(&self, height: f64) -> (Rect, Rect) {
        let h = height.clamp(0.0, self.height);
        (
            Rect::new(self.x, self.y, self.width, h),
            Rect::new(self.x, self.y + h, self.width, self.height - h),
        )
    }

    /// Cut a column of `width` off the left. Returns (column, rest).
    pub fn take_left(&self, width: f64) -> (Rect, Rect) {
        let w = width.clamp(0.0, self.width);
        (
            Rect::new(self.x, self.y, w, self.height),
            Rect::new(self.x + w, self.y, self.width - w, self.height),
        )
    }

    /// Cut a column of `width` off the right. Returns (rest, column).
    pub fn take_right(&self, width: f64) -> (Rect, Rect) {
        let w = width.clamp(0.0, self.width);
        (
            Rect::new(self.x, self.y, self.width - w, self.height),
            Rect::new(self.right() - w, self.y, w, self.height),
        )
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x - EPSILON
            && other.y >= self.y - EPSILON
            && other.right() <= self.right() + EPSILON
            && other.bottom() <= self.bottom() + EPSILON
    }

    /// True when the interiors overlap. Shared edges do not count.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right() - EPSILON
            && other.x < self.right() - EPSILON
            && self.y < other.bottom() - EPSILON
            && other.y < self.bottom() - EPSILON
    }
}

/// One line of text at its final position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f64,
    /// Baseline, top-down.
    pub baseline: f64,
    pub width: f64,
}

/// A piece of label text fitted into its area.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPlacement {
    /// Which record field (or caption) this shows.
    pub field: String,
    pub rect: Rect,
    pub role: FontRole,
    pub font_size: f64,
    pub lines: Vec<PlacedLine>,
    pub truncated: bool,
}

impl FieldPlacement {
    /// All visible text, lines joined by newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Which record a box shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef {
    /// Position in the record list handed to `layout`.
    pub index: usize,
    /// Zero-based source row.
    pub row: usize,
    /// Which of the `copies` repetitions this is, from 0.
    pub copy: usize,
}

/// A QR code as a square of modules.
#[derive(Debug, Clone, PartialEq)]
pub struct Barcode {
    pub rect: Rect,
    /// Modules per side.
    pub modules: usize,
    /// Row-major, `true` for dark.
    pub dark: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub rect: Rect,
    pub record: Option<RecordRef>,
    pub fields: Vec<FieldPlacement>,
    /// Stroke width of the outline, if drawn.
    pub border: Option<f64>,
    pub barcode: Option<Barcode>,
    /// Split sub-boxes or nested inner boxes.
    pub children: Vec<LayoutBox>,
}

impl LayoutBox {
    pub fn new(rect: Rect, border: Option<f64>) -> Self {
        Self {
            rect,
            record: None,
            fields: Vec::new(),
            border,
            barcode: None,
            children: Vec::new(),
        }
    }

    /// Find a placed field by name, searching children too.
    pub fn field(&self, name: &str) -> Option<&FieldPlacement> {
        self.fields
            .iter()
            .find(|f| f.field == name)
            .or_else(|| self.children.iter().find_map(|c| c.field(name)))
    }
}

/// Page furniture that belongs to no record.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoration {
    Text(FieldPlacement),
    Rule {
        from: (f64, f64),
        to: (f64, f64),
        width: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageItem {
    Box(LayoutBox),
    Decoration(Decoration),
}

/// One page's content, painted in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub items: Vec<PageItem>,
}

impl RenderedPage {
    pub fn boxes(&self) -> impl Iterator<Item = &LayoutBox> {
        self.items.iter().filter_map(|item| match item {
            PageItem::Box(b) => Some(b),
            PageItem::Decoration(_) => None,
        })
    }

    /// The records shown on this page, in slot order.
    pub fn records(&self) -> Vec<RecordRef> {
        self.boxes().filter_map(|b| b.record).collect()
    }
}

/// One label layout algorithm.
pub trait TemplateRenderer {
    fn kind(&self) -> TemplateKind;

    /// Reject a record this template cannot lay out, before any page is built.
    fn check_record(
        &self,
        record: &NormalizedRecord,
        config: &TemplateConfig,
    ) -> Result<(), LabelError>;

    /// Fill one grid cell with a record's content.
    fn layout_box(
        &self,
        record: &NormalizedRecord,
        cell: Rect,
        config: &TemplateConfig,
        fonts: &FontContext,
    ) -> Result<LayoutBox, LabelError>;

    /// Lay out all records onto pages.
    fn layout(
        &self,
        records: &[NormalizedRecord],
        config: &TemplateConfig,
        fonts: &FontContext,
    ) -> Result<Vec<RenderedPage>, LabelError> {
        paginate(self, records, config, fonts)
    }
}

static REGULAR: RegularRenderer = RegularRenderer;
static SPLIT: SplitRenderer = SplitRenderer;
static NESTED: NestedRenderer = NestedRenderer;

pub fn renderer_for(kind: TemplateKind) -> &'static dyn TemplateRenderer {
    match kind {
        TemplateKind::Regular => &REGULAR,
        TemplateKind::Split => &SPLIT,
        TemplateKind::Nested => &NESTED,
    }
}

/// The page grid for a configuration.
#[derive(Debug, Clone, Copy)]
pub struct Grid {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub gutter: f64,
    pub rows: usize,
    pub columns: usize,
}

impl Grid {
    pub fn from_config(config: &TemplateConfig) -> Self {
        let o = config.options();
        Self {
            origin_x: o.margin.left,
            origin_y: o.margin.top,
            cell_width: o.box_width,
            cell_height: o.box_height,
            gutter: o.gutter,
            rows: o.rows as usize,
            columns: o.columns as usize,
        }
    }

    pub fn capacity(&self) -> usize {
        self.rows * self.columns
    }

    /// Rectangle of a slot, counted row-major from the top-left.
    pub fn cell(&self, slot: usize) -> Rect {
        let row = slot / self.columns;
        let col = slot % self.columns;
        Rect::new(
            self.origin_x + col as f64 * (self.cell_width + self.gutter),
            self.origin_y + row as f64 * (self.cell_height + self.gutter),
            self.cell_width,
            self.cell_height,
        )
    }
}

/// Number of pages for `records` records.
pub fn page_count(records: usize, config: &TemplateConfig) -> usize {
    let cells = records * config.copies();
    cells.div_ceil(config.capacity())
}

/// Shared pagination: walk the cells, hand each to the renderer.
pub fn paginate<R: TemplateRenderer + ?Sized>(
    renderer: &R,
    records: &[NormalizedRecord],
    config: &TemplateConfig,
    fonts: &FontContext,
) -> Result<Vec<RenderedPage>, LabelError> {
    for record in records {
        renderer.check_record(record, config)?;
    }

    let grid = Grid::from_config(config);
    let capacity = grid.capacity();
    let copies = config.copies();
    let total_cells = records.len() * copies;
    let total_pages = page_count(records.len(), config);
    let options = config.options();

    let mut pages = Vec::with_capacity(total_pages);
    for page in 0..total_pages {
        let mut items = Vec::with_capacity(capacity + 1);
        if let Some(header) = &options.header {
            items.extend(page_header(header, page + 1, total_pages, config, fonts));
        }

        for slot in 0..capacity {
            let cell_index = page * capacity + slot;
            let rect = grid.cell(slot);
            if cell_index < total_cells {
                let index = cell_index / copies;
                let record = &records[index];
                let mut label = renderer.layout_box(record, rect, config, fonts)?;
                label.record = Some(RecordRef {
                    index,
                    row: record.row_index,
                    copy: cell_index % copies,
                });
                items.push(PageItem::Box(label));
            } else if options.show_empty_slots {
                let outline = (options.border_width * 0.5).max(0.25);
                items.push(PageItem::Box(LayoutBox::new(rect, Some(outline))));
            }
        }
        pages.push(RenderedPage { items });
    }

    tracing::debug!(
        template = %renderer.kind(),
        records = records.len(),
        pages = pages.len(),
        "laid out labels"
    );
    Ok(pages)
}

/// Header text in the top margin, with `{page}` and `{pages}` filled in.
fn page_header(
    template: &str,
    page: usize,
    pages: usize,
    config: &TemplateConfig,
    fonts: &FontContext,
) -> Option<PageItem> {
    let o = config.options();
    let (page_w, _) = config.page_dimensions();
    let rect = Rect::new(o.margin.left, 0.0, page_w - o.margin.horizontal(), o.margin.top);
    let text = template
        .replace("{page}", &page.to_string())
        .replace("{pages}", &pages.to_string());
    let field = text_field(fonts, config, FieldSlot::Caption, "header", &text, rect, VAlign::Middle)?;
    Some(PageItem::Decoration(Decoration::Text(field)))
}

/// Fit `value` into `rect` with the slot's style.
///
/// Returns `None` for blank values; they render as empty space.
pub(crate) fn text_field(
    fonts: &FontContext,
    config: &TemplateConfig,
    slot: FieldSlot,
    field: &str,
    value: &str,
    rect: Rect,
    v_align: VAlign,
) -> Option<FieldPlacement> {
    let request = config.fit_request(slot, rect.width, rect.height);
    fit_field(fonts, config, slot, field, value, rect, v_align, request)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn fit_field(
    fonts: &FontContext,
    config: &TemplateConfig,
    slot: FieldSlot,
    field: &str,
    value: &str,
    rect: Rect,
    v_align: VAlign,
    request: FitRequest,
) -> Option<FieldPlacement> {
    let style = config.style(slot);
    let fitted = text::fit(fonts, style.role, value, &request);
    if fitted.is_empty() && !fitted.truncated {
        return None;
    }
    let lines = text::place(fonts, &fitted, &rect, style.align, v_align);
    Some(FieldPlacement {
        field: field.to_string(),
        rect,
        role: style.role,
        font_size: fitted.font_size,
        lines,
        truncated: fitted.truncated,
    })
}

/// Outline width for a box, if borders are on.
pub(crate) fn border(config: &TemplateConfig) -> Option<f64> {
    let o = config.options();
    if o.show_border && o.border_width > 0.0 {
        Some(o.border_width)
    } else {
        None
    }
}

pub(crate) fn ensure_kind(
    expected: TemplateKind,
    record: &NormalizedRecord,
) -> Result<(), LabelError> {
    if record.kind == expected {
        Ok(())
    } else {
        Err(LabelError::Render(format!(
            "row {} was normalized for the {} template, not {}",
            record.row_index, record.kind, expected
        )))
    }
}
