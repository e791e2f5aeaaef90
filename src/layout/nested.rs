//! Nested box label: an outer box whose interior holds one small inner box
//! per child label.
//!
//! Inner boxes have a fixed configured size and are packed row-major with
//! `inner_gap` between them. A record with more children than fit is a
//! [`LabelError::LayoutOverflow`]; nothing is scaled down to make room.

use super::{border, ensure_kind, fit_field, text_field, LayoutBox, Rect, TemplateRenderer};
use crate::config::{FieldSlot, TemplateConfig};
use crate::error::LabelError;
use crate::font::FontContext;
use crate::model::{format_quantity, NormalizedRecord, TemplateKind};
use crate::text::{FitMode, VAlign};

const HEADER_BAND: f64 = 0.25;
const NAME_SHARE: f64 = 0.70;

pub struct NestedRenderer;

/// The area inner boxes go into, for a cell.
fn interior(cell: &Rect, config: &TemplateConfig) -> (Rect, Rect) {
    let inner = cell.inset(config.options().padding);
    inner.take_top(inner.height * HEADER_BAND)
}

/// How many inner boxes fit one outer box with this configuration.
pub fn inner_capacity(config: &TemplateConfig) -> usize {
    let o = config.options();
    let cell = Rect::new(0.0, 0.0, o.box_width, o.box_height);
    let (_, area) = interior(&cell, config);
    let (cols, rows) = config.inner_grid(area.width, area.height);
    cols * rows
}

impl TemplateRenderer for NestedRenderer {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Nested
    }

    fn check_record(
        &self,
        record: &NormalizedRecord,
        config: &TemplateConfig,
    ) -> Result<(), LabelError> {
        ensure_kind(self.kind(), record)?;
        let capacity = inner_capacity(config);
        if record.children.len() > capacity {
            return Err(LabelError::LayoutOverflow {
                record: record.name(),
                row: record.row_index,
                declared: record.children.len(),
                capacity,
            });
        }
        Ok(())
    }

    fn layout_box(
        &self,
        record: &NormalizedRecord,
        cell: Rect,
        config: &TemplateConfig,
        fonts: &FontContext,
    ) -> Result<LayoutBox, LabelError> {
        self.check_record(record, config)?;
        let o = config.options();
        let mut label = LayoutBox::new(cell, border(config));
        let (header, area) = interior(&cell, config);

        let (name_rect, count_rect) = header.take_left(header.width * NAME_SHARE);
        label.fields.extend(text_field(
            fonts,
            config,
            FieldSlot::Title,
            "name",
            &record.name(),
            name_rect,
            VAlign::Middle,
        ));
        let mut count = format_quantity(record.children.len() as f64, 0);
        if !o.quantity_suffix.is_empty() {
            count.push(' ');
            count.push_str(&o.quantity_suffix);
        }
        label.fields.extend(text_field(
            fonts,
            config,
            FieldSlot::Quantity,
            "qty",
            &count,
            count_rect,
            VAlign::Middle,
        ));

        let (cols, _) = config.inner_grid(area.width, area.height);
        if cols == 0 {
            return Ok(label);
        }
        let (w, h, gap) = (o.inner_box_width, o.inner_box_height, o.inner_gap);
        // Centre the used columns horizontally.
        let used_cols = cols.min(record.children.len().max(1));
        let block_w = used_cols as f64 * w + (used_cols - 1) as f64 * gap;
        let left = area.x + ((area.width - block_w) / 2.0).max(0.0);
        let inner_border = border(config).map(|bw| bw * 0.5);

        for (i, child) in record.children.iter().enumerate() {
            let (row, col) = (i / cols, i % cols);
            let rect = Rect::new(
                left + col as f64 * (w + gap),
                area.y + row as f64 * (h + gap),
                w,
                h,
            );
            let mut inner = LayoutBox::new(rect, inner_border);
            let text_rect = rect.inset(1.0);
            let request = config
                .fit_request(FieldSlot::Caption, text_rect.width, text_rect.height)
                .mode(FitMode::ShrinkToFit);
            inner.fields.extend(fit_field(
                fonts,
                config,
                FieldSlot::Caption,
                "child",
                child,
                text_rect,
                VAlign::Middle,
                request,
            ));
            label.children.push(inner);
        }

        Ok(label)
    }
}
