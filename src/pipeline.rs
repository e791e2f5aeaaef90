//! # Render Pipeline
//!
//! One render pass: rows are normalized, checked against the template, laid
//! out onto pages and assembled into PDF bytes. Passes are synchronous.
//! Callers that run them on a worker thread get progress through a callback
//! and can stop a pass between pages with an `AtomicBool`.
//!
//! Writing the result goes through [`OutputLock`]: a second render against
//! a path that is still being written is refused, and the final file only
//! appears through a rename, so a failed pass never leaves half a PDF.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::config::TemplateConfig;
use crate::error::LabelError;
use crate::font::{FontContext, RenderWarning};
use crate::layout::{page_count, renderer_for};
use crate::model::SourceRow;
use crate::normalize::{ErrorPolicy, Normalizer, SkippedRecord};
use crate::packaging;
use crate::pdf::{assemble, AssembleOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Layout,
    Assemble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub done: usize,
    pub total: usize,
}

/// Callbacks into the caller during a pass.
#[derive(Default)]
pub struct RenderHooks<'h> {
    /// Set to `true` to stop the pass at the next page boundary.
    pub cancel: Option<&'h AtomicBool>,
    pub progress: Option<Box<dyn FnMut(Progress) + 'h>>,
}

impl<'h> RenderHooks<'h> {
    pub fn with_cancel(mut self, flag: &'h AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_progress(mut self, f: impl FnMut(Progress) + 'h) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn report(&mut self, stage: Stage, done: usize, total: usize) {
        if let Some(progress) = self.progress.as_mut() {
            progress(Progress { stage, done, total });
        }
    }
}

#[derive(Default)]
pub struct RenderOptions<'h> {
    pub policy: ErrorPolicy,
    pub hooks: RenderHooks<'h>,
}

/// What a successful pass produced.
#[derive(Debug)]
pub struct RenderReport {
    pub pdf: Vec<u8>,
    pub pages: usize,
    /// Records that made it onto the pages.
    pub records: usize,
    pub warnings: Vec<RenderWarning>,
    /// Records left out under [`ErrorPolicy::SkipRecord`], in row order.
    pub skipped: Vec<SkippedRecord>,
}

/// Run one render pass over `rows`.
pub fn render(
    rows: &[SourceRow],
    config: &TemplateConfig,
    fonts: &FontContext,
    mut options: RenderOptions<'_>,
) -> Result<RenderReport, LabelError> {
    fonts.preload();
    let hooks = &mut options.hooks;

    let normalizer = Normalizer::new(config);
    let (records, mut skipped) = normalizer.normalize_all(rows, options.policy)?;
    let records = match config.packaging() {
        Some(packing) => {
            let (labels, dropped) = packaging::expand_all(records, packing, options.policy)?;
            skipped.extend(dropped);
            labels
        }
        None => records,
    };
    hooks.report(Stage::Normalize, rows.len(), rows.len());

    let renderer = renderer_for(config.kind());
    let mut accepted = Vec::with_capacity(records.len());
    for record in records {
        match renderer.check_record(&record, config) {
            Ok(()) => accepted.push(record),
            Err(error) if options.policy == ErrorPolicy::SkipRecord && error.is_record_level() => {
                tracing::warn!(row = record.row_index, %error, "skipping record that does not fit");
                skipped.push(SkippedRecord {
                    row: record.row_index,
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }
    skipped.sort_by_key(|s| s.row);

    if hooks.is_cancelled() {
        return Err(LabelError::Cancelled {
            done: 0,
            total: page_count(accepted.len(), config),
        });
    }
    let pages = renderer.layout(&accepted, config, fonts)?;
    hooks.report(Stage::Layout, pages.len(), pages.len());

    let assemble_options = AssembleOptions {
        page_size: config.page_dimensions(),
        metadata: config.options().metadata.clone(),
    };
    let pdf = assemble(&pages, &assemble_options, fonts, hooks)?;

    let warnings = fonts.warnings().to_vec();
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        template = %config.kind(),
        records = accepted.len(),
        skipped = skipped.len(),
        pages = pages.len(),
        "rendered labels"
    );

    Ok(RenderReport {
        pdf,
        pages: pages.len(),
        records: accepted.len(),
        warnings,
        skipped,
    })
}

/// Render and write to `path` in one step. The path is claimed before the
/// pass starts.
pub fn render_to_file(
    rows: &[SourceRow],
    config: &TemplateConfig,
    fonts: &FontContext,
    options: RenderOptions<'_>,
    path: &Path,
) -> Result<RenderReport, LabelError> {
    let lock = OutputLock::acquire(path)?;
    let report = render(rows, config, fonts, options)?;
    lock.write(&report.pdf)?;
    Ok(report)
}

/// Write `bytes` to `path` through a `.partial` file and a rename.
pub fn write_pdf_atomically(path: &Path, bytes: &[u8]) -> Result<(), LabelError> {
    OutputLock::acquire(path)?.write(bytes)
}

fn active_outputs() -> &'static Mutex<HashSet<PathBuf>> {
    static ACTIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

fn registry_key(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn io_error(path: &Path, e: std::io::Error) -> LabelError {
    LabelError::Render(format!("failed to write {}: {}", path.display(), e))
}

/// Exclusive claim on an output path for the lifetime of a render.
///
/// Released on drop.
pub struct OutputLock {
    path: PathBuf,
    key: PathBuf,
}

impl OutputLock {
    pub fn acquire(path: &Path) -> Result<Self, LabelError> {
        let key = registry_key(path);
        let mut active = active_outputs()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(key.clone()) {
            return Err(LabelError::OutputBusy(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            key,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the final file. A `.partial` left by another process makes
    /// this fail with [`LabelError::OutputBusy`].
    pub fn write(&self, bytes: &[u8]) -> Result<(), LabelError> {
        let partial = partial_path(&self.path);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&partial) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LabelError::OutputBusy(self.path.clone()));
            }
            Err(e) => return Err(io_error(&partial, e)),
        };

        let written = file.write_all(bytes).and_then(|_| file.sync_all());
        drop(file);
        let written = written.and_then(|_| fs::rename(&partial, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(io_error(&self.path, e));
        }
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "wrote PDF");
        Ok(())
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let mut active = active_outputs()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.key);
    }
}
