//! # Boxlabel
//!
//! Printable box labels from spreadsheet rows.
//!
//! Each row of a spreadsheet describes one box: a name, a quantity, and a few
//! optional details. Boxlabel places one label per row into a fixed grid of
//! equally sized cells on every page and writes the pages as a PDF. Three
//! label templates share the grid:
//!
//! - **regular**: name, quantity and details stacked in one box
//! - **split**: a title band over N sub-boxes that each carry a share of
//!   the content
//! - **nested**: an outer box holding one small inner box per child label
//!
//! Text is fitted, never clipped silently: it is shrunk down to a floor
//! size, wrapped, or truncated with an ellipsis, per field.
//!
//! ## Architecture
//!
//! ```text
//! CSV / XLSX / caller rows
//!       ↓
//!   [source]       Spreadsheet files into SourceRows
//!       ↓
//!   [normalize]    Column aliases, quantities, split parts, child labels
//!       ↓
//!   [packaging]    Optional: one row into box or carton labels
//!       ↓
//!   [layout]       Grid cells, template renderers, pagination
//!       ↓         (text fitting in [text], metrics in [font])
//!   [pdf]          Serialize pages to PDF bytes
//! ```
//!
//! [`pipeline::render`] runs one pass from rows to bytes. The CLI in
//! `main.rs` is a thin front end over it.

pub mod config;
pub mod error;
pub mod font;
pub mod layout;
pub mod model;
pub mod normalize;
pub mod packaging;
pub mod pdf;
pub mod pipeline;
pub mod source;
pub mod text;

pub use config::{ConfigOptions, TemplateConfig};
pub use error::LabelError;
pub use font::{FontContext, FontSource, RenderWarning};
pub use model::{CellValue, SourceRow, TemplateKind};
pub use normalize::ErrorPolicy;
pub use packaging::{LabelLevel, PackagingOptions, SerialScheme};
pub use pipeline::{
    render, render_to_file, write_pdf_atomically, RenderHooks, RenderOptions, RenderReport,
};

/// Render rows with the built-in Helvetica fonts and default options.
///
/// Useful for previews; production runs want [`FontSource::Files`] so that
/// CJK text has glyphs.
pub fn render_builtin(
    rows: &[SourceRow],
    config: &TemplateConfig,
) -> Result<Vec<u8>, LabelError> {
    let fonts = FontContext::builtin();
    Ok(render(rows, config, &fonts, RenderOptions::default())?.pdf)
}
