//! Split box label: a title band over `split_count` side-by-side sub-boxes.
//!
//! Each sub-box carries an `i/N` caption and its share of the split content.
//! Sub-box text is always truncated, never shrunk past the floor or wrapped,
//! so it cannot spill into the neighbouring part.

use super::{border, ensure_kind, fit_field, text_field, LayoutBox, Rect, TemplateRenderer};
use crate::config::{FieldSlot, SplitDirection, TemplateConfig};
use crate::error::LabelError;
use crate::font::FontContext;
use crate::model::{format_quantity, NormalizedRecord, TemplateKind};
use crate::text::{FitMode, VAlign};

const TITLE_BAND: f64 = 0.30;
/// Share of the title band given to the name; the quantity takes the rest.
const NAME_SHARE: f64 = 0.65;
const CAPTION_BAND: f64 = 0.25;

pub struct SplitRenderer;

impl TemplateRenderer for SplitRenderer {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Split
    }

    fn check_record(
        &self,
        record: &NormalizedRecord,
        config: &TemplateConfig,
    ) -> Result<(), LabelError> {
        ensure_kind(self.kind(), record)?;
        if record.sub_boxes.len() != config.split_count() {
            return Err(LabelError::validation(
                "split_fields",
                record.row_index,
                format!(
                    "maps to {} sub-boxes but the template has {}",
                    record.sub_boxes.len(),
                    config.split_count()
                ),
            ));
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
        let options = config.options();
        let decimals = config.decimal_places();
        let mut label = LayoutBox::new(cell, border(config));
        let inner = cell.inset(options.padding);

        let (title_band, body) = inner.take_top(inner.height * TITLE_BAND);
        let (name_rect, qty_rect) = title_band.take_left(title_band.width * NAME_SHARE);

        let mut quantity = format_quantity(record.quantity(), decimals);
        if !options.quantity_suffix.is_empty() {
            quantity.push(' ');
            quantity.push_str(&options.quantity_suffix);
        }
        label.fields.extend(text_field(
            fonts,
            config,
            FieldSlot::Title,
            "name",
            &record.name(),
            name_rect,
            VAlign::Middle,
        ));
        label.fields.extend(text_field(
            fonts,
            config,
            FieldSlot::Quantity,
            "qty",
            &quantity,
            qty_rect,
            VAlign::Middle,
        ));

        let count = config.split_count();
        let sub_border = border(config).map(|w| w * 0.5);
        for (i, rect) in sub_box_rects(body, count, options.split_direction)
            .into_iter()
            .enumerate()
        {
            let mut part = LayoutBox::new(rect, sub_border);
            let content_area = rect.inset(options.padding.min(rect.width / 4.0));
            let (caption_rect, content_rect) =
                content_area.take_top(content_area.height * CAPTION_BAND);

            part.fields.extend(text_field(
                fonts,
                config,
                FieldSlot::Caption,
                "part",
                &format!("{}/{}", i + 1, count),
                caption_rect,
                VAlign::Middle,
            ));

            if let Some(assignment) = record.sub_boxes.get(i) {
                let request = config
                    .fit_request(FieldSlot::Serial, content_rect.width, content_rect.height)
                    .mode(FitMode::Truncate);
                part.fields.extend(fit_field(
                    fonts,
                    config,
                    FieldSlot::Serial,
                    &assignment.field,
                    &assignment.text,
                    content_rect,
                    VAlign::Middle,
                    request,
                ));
            }
            label.children.push(part);
        }

        Ok(label)
    }
}

/// Divide `area` into `count` equal, adjacent rectangles.
pub fn sub_box_rects(area: Rect, count: usize, direction: SplitDirection) -> Vec<Rect> {
    let count = count.max(1);
    (0..count)
        .map(|i| match direction {
            SplitDirection::Horizontal => {
                let w = area.width / count as f64;
                Rect::new(area.x + i as f64 * w, area.y, w, area.height)
            }
            SplitDirection::Vertical => {
                let h = area.height / count as f64;
                Rect::new(area.x, area.y + i as f64 * h, area.width, h)
            }
        })
        .collect()
}
