//! Integration tests for the boxlabel rendering pipeline.
//!
//! These tests exercise the full path from source rows to PDF output.
//! They verify:
//! - Every record lands in exactly one box, on the expected number of pages
//! - Repeated assembly is byte-identical
//! - Quantities survive formatting and re-parsing
//! - Text fitting boundaries, nested capacity and split segments
//! - Packing runs expand rows into box and carton labels
//! - Output files are written whole or not at all

use std::path::Path;
use std::sync::atomic::AtomicBool;

use boxlabel::config::SplitDirection;
use boxlabel::font::FontRole;
use boxlabel::layout::{renderer_for, LayoutBox, RenderedPage};
use boxlabel::normalize::Normalizer;
use boxlabel::pdf::{assemble, AssembleOptions};
use boxlabel::text::{fit, FitMode, FitRequest};
use boxlabel::*;

// ─── Helpers ────────────────────────────────────────────────────

fn item(name: &str, qty: f64) -> SourceRow {
    SourceRow::new().with("name", name).with("qty", qty)
}

fn items(n: usize) -> Vec<SourceRow> {
    (0..n).map(|i| item(&format!("Item {}", i), i as f64)).collect()
}

fn grid_config(template: TemplateKind, rows: u32, columns: u32) -> TemplateConfig {
    TemplateConfig::new(ConfigOptions {
        template,
        rows,
        columns,
        ..Default::default()
    })
    .unwrap()
}

fn layout_rows(
    rows: &[SourceRow],
    config: &TemplateConfig,
    fonts: &FontContext,
) -> Vec<RenderedPage> {
    let (records, skipped) = Normalizer::new(config)
        .normalize_all(rows, ErrorPolicy::Abort)
        .unwrap();
    assert!(skipped.is_empty());
    renderer_for(config.kind())
        .layout(&records, config, fonts)
        .unwrap()
}

fn filled_boxes(page: &RenderedPage) -> Vec<&LayoutBox> {
    page.boxes().filter(|b| b.record.is_some()).collect()
}

fn assemble_bytes(
    pages: &[RenderedPage],
    config: &TemplateConfig,
    fonts: &FontContext,
) -> Vec<u8> {
    let options = AssembleOptions {
        page_size: config.page_dimensions(),
        metadata: config.options().metadata.clone(),
    };
    assemble(pages, &options, fonts, &mut RenderHooks::default()).unwrap()
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

// ─── Pagination ─────────────────────────────────────────────────

#[test]
fn test_every_record_placed_exactly_once() {
    let fonts = FontContext::builtin();
    for kind in TemplateKind::ALL {
        let config = grid_config(kind, 3, 2);
        let capacity = config.capacity();
        assert_eq!(capacity, 6);

        for count in [0, 1, capacity, capacity + 1, 2 * capacity] {
            let rows: Vec<SourceRow> = items(count)
                .into_iter()
                .map(|r| r.with("code", "ABCD").with("serial", "BOX00001"))
                .collect();
            let pages = layout_rows(&rows, &config, &fonts);
            assert_eq!(
                pages.len(),
                count.div_ceil(capacity),
                "{} records with the {} template",
                count,
                kind
            );

            let mut seen: Vec<usize> = pages
                .iter()
                .flat_map(|p| p.records())
                .map(|r| r.index)
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..count).collect::<Vec<_>>());
        }
    }
}

#[test]
fn test_zero_records_still_produce_a_pdf() {
    let config = grid_config(TemplateKind::Regular, 2, 2);
    let pdf = render_builtin(&[], &config).unwrap();
    assert!(pdf.starts_with(b"%PDF-1.7"));
    assert!(pdf.ends_with(b"%%EOF\n") || pdf.ends_with(b"%%EOF"));
    assert_eq!(count_occurrences(&pdf, b"/Type /Page "), 0);
}

#[test]
fn test_copies_fill_consecutive_cells() {
    let config = TemplateConfig::new(ConfigOptions {
        rows: 2,
        columns: 2,
        copies: 3,
        ..Default::default()
    })
    .unwrap();
    let fonts = FontContext::builtin();
    let pages = layout_rows(&items(2), &config, &fonts);
    assert_eq!(pages.len(), 2);
    let refs: Vec<(usize, usize)> = pages
        .iter()
        .flat_map(|p| p.records())
        .map(|r| (r.index, r.copy))
        .collect();
    assert_eq!(refs, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
}

// ─── Determinism ────────────────────────────────────────────────

#[test]
fn test_assemble_is_byte_identical() {
    let config = TemplateConfig::new(ConfigOptions {
        show_barcode: true,
        header: Some("Shipment {page}/{pages}".to_string()),
        ..Default::default()
    })
    .unwrap();
    let fonts = FontContext::builtin();
    let rows: Vec<SourceRow> = items(13)
        .into_iter()
        .map(|r| r.with("serial", "DSK00001").with("description", "Handle with care"))
        .collect();
    let pages = layout_rows(&rows, &config, &fonts);
    let first = assemble_bytes(&pages, &config, &fonts);
    let second = assemble_bytes(&pages, &config, &fonts);
    assert_eq!(first, second);
    assert_eq!(count_occurrences(&first, b"/Type /Page "), pages.len());
}

#[test]
fn test_full_render_is_repeatable() {
    let config = grid_config(TemplateKind::Nested, 2, 2);
    let rows = vec![
        item("Set A", 3.0).with("serial", "JAW01001"),
        item("Set B", 1.0).with("serial", "JAW01002"),
    ];
    assert_eq!(
        render_builtin(&rows, &config).unwrap(),
        render_builtin(&rows, &config).unwrap()
    );
}

// ─── Formatting and fitting ─────────────────────────────────────

#[test]
fn test_quantity_round_trips_through_rendered_text() {
    let fonts = FontContext::builtin();
    for decimals in [0u32, 1, 2, 3] {
        let config = TemplateConfig::new(ConfigOptions {
            decimal_places: decimals,
            ..Default::default()
        })
        .unwrap();
        let values = [0.0, 1.0, 2.5, 3.14159, 1234.5678, 0.0049];
        let rows: Vec<SourceRow> = values.iter().map(|&v| item("Q", v)).collect();
        let pages = layout_rows(&rows, &config, &fonts);

        let rendered: Vec<f64> = pages
            .iter()
            .flat_map(|p| filled_boxes(p))
            .map(|b| b.field("qty").unwrap().text().parse::<f64>().unwrap())
            .collect();
        let tolerance = 0.5 * 10f64.powi(-(decimals as i32)) + 1e-9;
        for (original, parsed) in values.iter().zip(&rendered) {
            assert!(
                (original - parsed).abs() <= tolerance,
                "{} rendered as {} with {} decimals",
                original,
                parsed,
                decimals
            );
        }
    }
}

#[test]
fn test_width_boundary_triggers_each_mode() {
    let fonts = FontContext::builtin();
    let text = "BOXLABEL";
    let width = fonts.measure_string(FontRole::Bold, text, 12.0);
    let longer = format!("{}S", text);

    for mode in [FitMode::ShrinkToFit, FitMode::Wrap, FitMode::Truncate] {
        let req = FitRequest::new(width, 40.0, 12.0).mode(mode);

        let exact = fit(&fonts, FontRole::Bold, text, &req);
        assert_eq!(exact.font_size, 12.0);
        assert_eq!(exact.lines.len(), 1);
        assert!(!exact.truncated && !exact.shrunk);
        assert_eq!(exact.joined(), text);

        let over = fit(&fonts, FontRole::Bold, &longer, &req);
        match mode {
            FitMode::ShrinkToFit => {
                assert!(over.shrunk);
                assert_eq!(over.joined(), longer);
            }
            FitMode::Wrap => {
                assert_eq!(over.font_size, 12.0);
                assert_eq!(over.lines.len(), 2);
            }
            FitMode::Truncate => {
                assert!(over.truncated);
                assert!(over.joined().ends_with("..."));
            }
        }
        for line in &over.lines {
            assert!(line.width <= width + 1e-6);
        }
    }
}

// ─── Templates ──────────────────────────────────────────────────

#[test]
fn test_nested_capacity_boundary() {
    let config = TemplateConfig::new(ConfigOptions {
        template: TemplateKind::Nested,
        box_width: 108.0,
        box_height: 88.0,
        padding: 4.0,
        inner_box_width: 40.0,
        inner_box_height: 15.0,
        inner_gap: 0.0,
        ..Default::default()
    })
    .unwrap();
    let fonts = FontContext::builtin();

    let full = vec![item("Fits", 8.0).with("serial", "JAW01001")];
    let pages = layout_rows(&full, &config, &fonts);
    assert_eq!(filled_boxes(&pages[0])[0].children.len(), 8);

    let rows = vec![item("Fits", 8.0), item("Too many", 9.0)];
    let err = render(&rows, &config, &fonts, RenderOptions::default()).unwrap_err();
    match err {
        LabelError::LayoutOverflow {
            record,
            row,
            declared,
            capacity,
        } => {
            assert_eq!(record, "Too many");
            assert_eq!(row, 1);
            assert_eq!(declared, 9);
            assert_eq!(capacity, 8);
        }
        other => panic!("expected overflow, got {:?}", other),
    }
}

#[test]
fn test_split_segments_do_not_overlap() {
    let text = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-0123456789";
    let fonts = FontContext::builtin();
    for count in [2u32, 3, 4] {
        for direction in [SplitDirection::Horizontal, SplitDirection::Vertical] {
            let config = TemplateConfig::new(ConfigOptions {
                template: TemplateKind::Split,
                split_count: count,
                split_fields: vec!["code".into()],
                split_direction: direction,
                ..Default::default()
            })
            .unwrap();
            let pages = layout_rows(&[item("Rail", 1.0).with("code", text)], &config, &fonts);
            let label = filled_boxes(&pages[0])[0];
            assert_eq!(label.children.len(), count as usize);

            let segments: Vec<_> = label
                .children
                .iter()
                .map(|part| part.field("code").unwrap())
                .collect();
            for (i, a) in segments.iter().enumerate() {
                assert!(label.children[i].rect.contains(&a.rect));
                for line in &a.lines {
                    assert!(line.width <= a.rect.width + 1e-6);
                }
                for b in &segments[i + 1..] {
                    assert!(!a.rect.overlaps(&b.rect));
                }
            }

            if segments.iter().all(|s| !s.truncated) {
                let joined: String = segments.iter().map(|s| s.text()).collect();
                assert_eq!(joined, text);
            }
        }
    }
}

#[test]
fn test_three_rows_on_two_by_two_grid() {
    let config = grid_config(TemplateKind::Regular, 2, 2);
    let fonts = FontContext::builtin();
    let rows = vec![item("A", 10.0), item("B", 5.0), item("C", 0.0)];
    let pages = layout_rows(&rows, &config, &fonts);

    assert_eq!(pages.len(), 1);
    let boxes: Vec<&LayoutBox> = pages[0].boxes().collect();
    assert_eq!(boxes.len(), 4);

    let labels: Vec<(String, String)> = boxes[..3]
        .iter()
        .map(|b| {
            (
                b.field("name").unwrap().text(),
                b.field("qty").unwrap().text(),
            )
        })
        .collect();
    assert_eq!(
        labels,
        vec![
            ("A".to_string(), "10".to_string()),
            ("B".to_string(), "5".to_string()),
            ("C".to_string(), "0".to_string()),
        ]
    );
    assert!(boxes[3].record.is_none());
    assert!(boxes[3].fields.is_empty());
}

// ─── Packaging ──────────────────────────────────────────────────

fn packing_config(packaging: PackagingOptions) -> TemplateConfig {
    TemplateConfig::new(ConfigOptions {
        rows: 2,
        columns: 2,
        packaging: Some(packaging),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_small_carton_run_with_partial_last_carton() {
    let config = packing_config(PackagingOptions {
        level: LabelLevel::SmallCarton,
        pieces_per_box: 100,
        boxes_per_small_carton: 5,
        small_cartons_per_large: Some(2),
        blank_first_label: true,
        ..Default::default()
    });
    let fonts = FontContext::builtin();
    let rows = vec![SourceRow::new()
        .with("标签名称", "Tickets")
        .with("总张数", 1050.0)
        .with("开始号", "DSK00001")
        .with("中文名称", "Scratch cards")
        .with("客户名称编码", "C-042")];

    let (records, _) = Normalizer::new(&config)
        .normalize_all(&rows, ErrorPolicy::Abort)
        .unwrap();
    let (labels, skipped) =
        packaging::expand_all(records, config.packaging().unwrap(), ErrorPolicy::Abort).unwrap();
    assert!(skipped.is_empty());
    let pages = renderer_for(config.kind())
        .layout(&labels, &config, &fonts)
        .unwrap();
    assert_eq!(pages.len(), 1);

    let boxes = filled_boxes(&pages[0]);
    assert_eq!(boxes.len(), 4);
    assert_eq!(boxes[0].field("name").unwrap().text(), "Scratch cards");
    assert!(boxes[0].field("qty").is_none());

    let last = boxes[3];
    assert_eq!(last.field("qty").unwrap().text(), "100");
    assert_eq!(last.field("serial").unwrap().text(), "DSK00011-DSK00011");
    assert!(last.field("detail").unwrap().text().contains("Carton No 3/3"));

    let report = render(&rows, &config, &fonts, RenderOptions::default()).unwrap();
    assert_eq!(report.records, 4);
    assert_eq!(report.pages, 1);
}

#[test]
fn test_box_run_spans_pages() {
    let config = packing_config(PackagingOptions {
        pieces_per_box: 50,
        ..Default::default()
    });
    let fonts = FontContext::builtin();
    let rows = vec![SourceRow::new()
        .with("name", "Coupons")
        .with("qty", 260.0)
        .with("serial", "CP00100")];
    let report = render(&rows, &config, &fonts, RenderOptions::default()).unwrap();
    // 260 pieces at 50 per box is 6 boxes, two pages of four cells.
    assert_eq!(report.records, 6);
    assert_eq!(report.pages, 2);
}

#[test]
fn test_packing_run_past_label_limit_is_skipped() {
    let config = packing_config(PackagingOptions::default());
    let fonts = FontContext::builtin();
    let rows = vec![
        item("Huge", 1e9),
        SourceRow::new()
            .with("name", "Small")
            .with("qty", 2.0)
            .with("serial", "S001"),
    ];
    let err = render(&rows, &config, &fonts, RenderOptions::default()).unwrap_err();
    assert!(matches!(err, LabelError::Validation { row: 0, .. }));

    let report = render(
        &rows,
        &config,
        &fonts,
        RenderOptions {
            policy: ErrorPolicy::SkipRecord,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.skipped[0].row, 0);
}

// ─── Errors and policies ────────────────────────────────────────

#[test]
fn test_missing_name_aborts_or_skips() {
    let config = grid_config(TemplateKind::Regular, 2, 2);
    let fonts = FontContext::builtin();
    let rows = vec![item("Good", 1.0), SourceRow::new().with("qty", 2.0)];

    let err = render(&rows, &config, &fonts, RenderOptions::default()).unwrap_err();
    assert!(matches!(err, LabelError::Validation { row: 1, .. }));

    let report = render(
        &rows,
        &config,
        &fonts,
        RenderOptions {
            policy: ErrorPolicy::SkipRecord,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].row, 1);
}

#[test]
fn test_cancel_before_start_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.pdf");
    let config = grid_config(TemplateKind::Regular, 2, 2);
    let fonts = FontContext::builtin();
    let cancel = AtomicBool::new(true);

    let err = render_to_file(
        &items(5),
        &config,
        &fonts,
        RenderOptions {
            hooks: RenderHooks::default().with_cancel(&cancel),
            ..Default::default()
        },
        &path,
    )
    .unwrap_err();
    assert!(matches!(err, LabelError::Cancelled { .. }));
    assert!(!path.exists());
}

// ─── Files and fonts ────────────────────────────────────────────

#[test]
fn test_csv_to_pdf_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("items.csv");
    std::fs::write(&input, "标签名称,总张数,开始号\nBolts,12,BLT00001\nNuts,\"1,200\",\n").unwrap();
    let output = dir.path().join("items.pdf");

    let rows = source::read_rows(&input, None).unwrap();
    let config = grid_config(TemplateKind::Regular, 2, 2);
    let fonts = FontContext::new(FontSource::from_dir(dir.path()));
    let report = render_to_file(&rows, &config, &fonts, RenderOptions::default(), &output).unwrap();

    assert_eq!(report.records, 2);
    assert!(matches!(
        report.warnings.first(),
        Some(RenderWarning::DegradedFonts { .. })
    ));
    let written = std::fs::read(&output).unwrap();
    assert_eq!(written, report.pdf);
}

#[test]
fn test_embedded_truetype_font() {
    let path = Path::new("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf");
    if !path.exists() {
        eprintln!("skipping: {} not installed", path.display());
        return;
    }
    let fonts = FontContext::new(FontSource::Files {
        regular: path.to_path_buf(),
        bold: path.to_path_buf(),
    });
    let config = grid_config(TemplateKind::Regular, 2, 2);
    let rows = vec![item("Ünïcödé box", 4.0)];
    let report = render(&rows, &config, &fonts, RenderOptions::default()).unwrap();

    assert!(report.warnings.is_empty());
    assert!(!fonts.is_degraded());
    assert!(count_occurrences(&report.pdf, b"/FontFile2") >= 1);
    assert!(count_occurrences(&report.pdf, b"/Identity-H") >= 1);
}
