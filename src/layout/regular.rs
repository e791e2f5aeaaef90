//! Regular box label: one record per cell.
//!
//! ```text
//! +--------------------------------+
//! |            NAME                |  title band, 40%
//! |            QTY                 |  quantity band, 25%
//! |  SERIAL                        |  detail band, 35%
//! |  description / remark          |
//! |  Carton No 2/3                 |
//! +--------------------------------+
//! ```
//!
//! Carton labels from a packing run show a serial range and a carton
//! number. The unnumbered first label of a run has no quantity, and its
//! quantity band stays empty.
//!
//! With `show_barcode`, a QR code of the serial (or the name when there is
//! no serial) takes a square on the right and the bands share what is left.

use qrcode::{Color, QrCode};

use super::{border, ensure_kind, text_field, Barcode, LayoutBox, Rect, TemplateRenderer};
use crate::config::{FieldSlot, TemplateConfig};
use crate::error::LabelError;
use crate::font::FontContext;
use crate::model::{format_quantity, NormalizedRecord, TemplateKind};
use crate::text::VAlign;

const TITLE_BAND: f64 = 0.40;
const QUANTITY_BAND: f64 = 0.25;
/// Share of the detail band given to the serial when there is one.
const SERIAL_SHARE: f64 = 0.40;
/// Widest the barcode may get, as a share of the box interior.
const BARCODE_MAX_WIDTH: f64 = 0.35;

pub struct RegularRenderer;

impl TemplateRenderer for RegularRenderer {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Regular
    }

    fn check_record(
        &self,
        record: &NormalizedRecord,
        _config: &TemplateConfig,
    ) -> Result<(), LabelError> {
        ensure_kind(self.kind(), record)
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
        let mut inner = cell.inset(options.padding);

        let serial = record.text("serial", decimals);
        if options.show_barcode {
            let payload = if serial.is_empty() {
                record.name()
            } else {
                serial.clone()
            };
            let side = inner.height.min(inner.width * BARCODE_MAX_WIDTH);
            if let Some(code) = qr_barcode(&payload, side) {
                let (rest, column) = inner.take_right(side + options.padding);
                let y = column.y + (column.height - side) / 2.0;
                label.barcode = Some(Barcode {
                    rect: Rect::new(column.right() - side, y, side, side),
                    ..code
                });
                inner = rest;
            }
        }

        let (title_band, rest) = inner.take_top(inner.height * TITLE_BAND);
        let (qty_band, detail_band) = rest.take_top(inner.height * QUANTITY_BAND);

        let mut quantity = if record.fields.contains_key("qty") {
            format_quantity(record.quantity(), decimals)
        } else {
            String::new()
        };
        if !quantity.is_empty() && !options.quantity_suffix.is_empty() {
            quantity.push(' ');
            quantity.push_str(&options.quantity_suffix);
        }

        let carton = record.text("carton", decimals);
        let detail = [
            record.text("description", decimals),
            record.text("remark", decimals),
            if carton.is_empty() {
                carton
            } else {
                format!("Carton No {}", carton)
            },
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

        let (serial_band, notes_band) = if serial.is_empty() {
            (None, detail_band)
        } else if detail.is_empty() {
            (Some(detail_band), detail_band)
        } else {
            let (top, bottom) = detail_band.take_top(detail_band.height * SERIAL_SHARE);
            (Some(top), bottom)
        };

        let name = record.name();
        label.fields.extend(text_field(
            fonts,
            config,
            FieldSlot::Title,
            "name",
            &name,
            title_band,
            VAlign::Middle,
        ));
        if !quantity.is_empty() {
            label.fields.extend(text_field(
                fonts,
                config,
                FieldSlot::Quantity,
                "qty",
                &quantity,
                qty_band,
                VAlign::Middle,
            ));
        }
        if let Some(band) = serial_band {
            label.fields.extend(text_field(
                fonts,
                config,
                FieldSlot::Serial,
                "serial",
                &serial,
                band,
                VAlign::Middle,
            ));
        }
        if !detail.is_empty() {
            label.fields.extend(text_field(
                fonts,
                config,
                FieldSlot::Detail,
                "detail",
                &detail,
                notes_band,
                VAlign::Top,
            ));
        }

        Ok(label)
    }
}

/// Encode `payload` as a QR code. Payloads too long for any QR version are
/// left without a barcode.
fn qr_barcode(payload: &str, side: f64) -> Option<Barcode> {
    if payload.is_empty() || side <= 0.0 {
        return None;
    }
    let code = match QrCode::new(payload.as_bytes()) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = %e, "payload does not fit a QR code, barcode omitted");
            return None;
        }
    };
    let dark = code
        .to_colors()
        .into_iter()
        .map(|c| c == Color::Dark)
        .collect();
    Some(Barcode {
        rect: Rect::new(0.0, 0.0, side, side),
        modules: code.width(),
        dark,
    })
}
