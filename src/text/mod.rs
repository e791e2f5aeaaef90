//! # Text Fitting
//!
//! Measures a string against a box and decides how it is set: shrunk onto
//! one line, wrapped onto several, or cut with an ellipsis. All three modes
//! share a hard floor: below `min_font_size` nothing shrinks further and the
//! text is truncated instead.
//!
//! Line breaking uses UAX#14 break opportunities, so CJK text breaks between
//! ideographs and Latin text breaks at spaces.

use serde::{Deserialize, Serialize};
use unicode_linebreak::{linebreaks, BreakOpportunity};

use crate::font::{FontContext, FontRole};
use crate::layout::{PlacedLine, Rect};

/// Tolerance for width and height comparisons, in points.
pub const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitMode {
    /// One line, font size reduced until it fits.
    #[default]
    ShrinkToFit,
    /// Several lines, font size reduced until the block fits.
    Wrap,
    /// One line at the requested size, overflow replaced by an ellipsis.
    Truncate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VAlign {
    Top,
    #[default]
    Middle,
    Bottom,
}

/// What to fit and into how much room.
#[derive(Debug, Clone, Copy)]
pub struct FitRequest {
    pub max_width: f64,
    pub max_height: f64,
    pub font_size: f64,
    pub min_font_size: f64,
    /// Shrink decrement per attempt, in points.
    pub step: f64,
    /// Line height as a multiple of the font size.
    pub line_height: f64,
    pub mode: FitMode,
}

impl FitRequest {
    pub fn new(max_width: f64, max_height: f64, font_size: f64) -> Self {
        Self {
            max_width,
            max_height,
            font_size,
            min_font_size: 4.0,
            step: 0.5,
            line_height: 1.2,
            mode: FitMode::ShrinkToFit,
        }
    }

    pub fn mode(mut self, mode: FitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn min_font_size(mut self, min: f64) -> Self {
        self.min_font_size = min;
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn line_height(mut self, factor: f64) -> Self {
        self.line_height = factor;
        self
    }

    /// Candidate sizes from the requested size down to the floor.
    fn sizes(&self) -> Vec<f64> {
        let floor = self.min_font_size.min(self.font_size);
        let step = if self.step > 0.0 { self.step } else { 0.5 };
        let mut sizes = Vec::new();
        let mut size = self.font_size;
        loop {
            sizes.push(size);
            if size <= floor + EPSILON {
                break;
            }
            size = (size - step).max(floor);
        }
        sizes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedLine {
    pub text: String,
    pub width: f64,
}

/// The result of fitting: final lines and the size they are set at.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub role: FontRole,
    pub lines: Vec<FittedLine>,
    pub font_size: f64,
    /// Absolute line advance in points.
    pub line_height: f64,
    /// Some characters were dropped to make the text fit.
    pub truncated: bool,
    /// The font size is smaller than requested.
    pub shrunk: bool,
}

impl FittedText {
    fn empty(role: FontRole, req: &FitRequest, truncated: bool) -> Self {
        FittedText {
            role,
            lines: Vec::new(),
            font_size: req.font_size,
            line_height: req.font_size * req.line_height,
            truncated,
            shrunk: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn block_height(&self) -> f64 {
        self.lines.len() as f64 * self.line_height
    }

    /// All lines joined, ellipsis included.
    pub fn joined(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Strip control characters and surrounding whitespace.
///
/// Newlines survive (they are mandatory breaks in wrap mode); tabs become
/// spaces.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter_map(|ch| match ch {
            '\n' => Some('\n'),
            '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Fit `text` into the request's box.
pub fn fit(fonts: &FontContext, role: FontRole, text: &str, req: &FitRequest) -> FittedText {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return FittedText::empty(role, req, false);
    }
    if req.max_width <= 0.0 || req.max_height <= 0.0 {
        return FittedText::empty(role, req, true);
    }

    match req.mode {
        FitMode::ShrinkToFit => fit_single_line(fonts, role, &single_line(&cleaned), req, true),
        FitMode::Truncate => fit_single_line(fonts, role, &single_line(&cleaned), req, false),
        FitMode::Wrap => fit_wrapped(fonts, role, &cleaned, req),
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fit_single_line(
    fonts: &FontContext,
    role: FontRole,
    text: &str,
    req: &FitRequest,
    shrink_for_width: bool,
) -> FittedText {
    let sizes = req.sizes();
    let mut chosen = None;

    for &size in &sizes {
        let height_ok = size * req.line_height <= req.max_height + EPSILON;
        if !height_ok {
            continue;
        }
        let width = fonts.measure_string(role, text, size);
        if width <= req.max_width + EPSILON {
            return FittedText {
                role,
                lines: vec![FittedLine {
                    text: text.to_string(),
                    width,
                }],
                font_size: size,
                line_height: size * req.line_height,
                truncated: false,
                shrunk: size < req.font_size,
            };
        }
        if !shrink_for_width {
            // Truncate mode keeps the largest size whose line height fits.
            chosen = Some(size);
            break;
        }
    }

    let size = match chosen {
        Some(size) => size,
        None => {
            let floor = sizes.last().copied().unwrap_or(req.font_size);
            if floor * req.line_height > req.max_height + EPSILON {
                return FittedText::empty(role, req, true);
            }
            floor
        }
    };

    let line = truncate_line(fonts, role, text, req.max_width, size);
    FittedText {
        role,
        lines: if line.text.is_empty() { Vec::new() } else { vec![line] },
        font_size: size,
        line_height: size * req.line_height,
        truncated: true,
        shrunk: size < req.font_size,
    }
}

fn fit_wrapped(fonts: &FontContext, role: FontRole, text: &str, req: &FitRequest) -> FittedText {
    let sizes = req.sizes();
    for &size in &sizes {
        let line_height = size * req.line_height;
        let lines = wrap_lines(fonts, role, text, req.max_width, size);
        let height = lines.len() as f64 * line_height;
        let widths_ok = lines.iter().all(|l| l.width <= req.max_width + EPSILON);
        if widths_ok && height <= req.max_height + EPSILON {
            return FittedText {
                role,
                lines,
                font_size: size,
                line_height,
                truncated: false,
                shrunk: size < req.font_size,
            };
        }
    }

    let size = sizes.last().copied().unwrap_or(req.font_size);
    let line_height = size * req.line_height;
    let max_lines = ((req.max_height + EPSILON) / line_height).floor() as usize;
    if max_lines == 0 {
        return FittedText::empty(role, req, true);
    }

    let mut lines = wrap_lines(fonts, role, text, req.max_width, size);
    let mut truncated = false;
    if lines.len() > max_lines {
        let rest: String = lines[max_lines - 1..]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        lines.truncate(max_lines - 1);
        // Always marked, even when the joined remainder happens to fit.
        lines.push(cut_with_ellipsis(fonts, role, &rest, req.max_width, size));
        truncated = true;
    }
    for line in lines.iter_mut() {
        if line.width > req.max_width + EPSILON {
            *line = truncate_line(fonts, role, &line.text, req.max_width, size);
            truncated = true;
        }
    }
    lines.retain(|l| !l.text.is_empty());

    FittedText {
        role,
        lines,
        font_size: size,
        line_height,
        truncated,
        shrunk: size < req.font_size,
    }
}

fn ellipsis(fonts: &FontContext, role: FontRole) -> &'static str {
    if fonts.has_glyph(role, '\u{2026}') {
        "\u{2026}"
    } else {
        "..."
    }
}

/// Cut `text` so that it plus an ellipsis fits `max_width`.
///
/// Returns an empty line when not even the ellipsis fits.
pub fn truncate_line(
    fonts: &FontContext,
    role: FontRole,
    text: &str,
    max_width: f64,
    font_size: f64,
) -> FittedLine {
    let full = fonts.measure_string(role, text, font_size);
    if full <= max_width + EPSILON {
        return FittedLine {
            text: text.to_string(),
            width: full,
        };
    }

    cut_with_ellipsis(fonts, role, text, max_width, font_size)
}

fn cut_with_ellipsis(
    fonts: &FontContext,
    role: FontRole,
    text: &str,
    max_width: f64,
    font_size: f64,
) -> FittedLine {
    let suffix = ellipsis(fonts, role);
    let suffix_width = fonts.measure_string(role, suffix, font_size);
    if suffix_width > max_width + EPSILON {
        return FittedLine {
            text: String::new(),
            width: 0.0,
        };
    }

    let mut kept = String::new();
    let mut width = 0.0;
    for ch in text.chars() {
        let w = fonts.char_width(role, ch, font_size);
        if width + w + suffix_width > max_width + EPSILON {
            break;
        }
        kept.push(ch);
        width += w;
    }
    let kept = kept.trim_end();
    let text = format!("{}{}", kept, suffix);
    let width = fonts.measure_string(role, &text, font_size);
    FittedLine { text, width }
}

/// Compute UAX#14 break opportunities indexed by char position.
///
/// Entry `i` is the opportunity to break *before* `chars[i]`. Index 0 is
/// always `None`.
fn break_opportunities(text: &str) -> Vec<Option<BreakOpportunity>> {
    let char_count = text.chars().count();
    let mut result = vec![None; char_count];

    let mut byte_to_char = vec![0usize; text.len() + 1];
    for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
        byte_to_char[byte_idx] = char_idx;
    }
    byte_to_char[text.len()] = char_count;

    for (byte_offset, opp) in linebreaks(text) {
        let char_idx = byte_to_char[byte_offset];
        if char_idx < char_count {
            result[char_idx] = Some(opp);
        }
    }
    result
}

fn is_newline(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Greedy line breaking at UAX#14 opportunities.
///
/// Runs with no break opportunity wider than `max_width` are split at the
/// character that overflows.
pub fn wrap_lines(
    fonts: &FontContext,
    role: FontRole,
    text: &str,
    max_width: f64,
    font_size: f64,
) -> Vec<FittedLine> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let widths: Vec<f64> = chars
        .iter()
        .map(|&ch| {
            if is_newline(ch) {
                0.0
            } else {
                fonts.char_width(role, ch, font_size)
            }
        })
        .collect();
    let opps = break_opportunities(text);

    let make_line = |start: usize, end: usize| -> FittedLine {
        let slice: String = chars[start..end]
            .iter()
            .filter(|c| !is_newline(**c))
            .collect();
        let text = slice.trim_end().to_string();
        let width = fonts.measure_string(role, &text, font_size);
        FittedLine { text, width }
    };

    let mut lines = Vec::new();
    let mut line_start = 0;
    let mut line_width = 0.0;
    let mut last_break: Option<usize> = None;

    for i in 0..chars.len() {
        if i > 0 {
            match opps[i] {
                Some(BreakOpportunity::Mandatory) => {
                    lines.push(make_line(line_start, i));
                    line_start = i;
                    line_width = 0.0;
                    last_break = None;
                }
                Some(BreakOpportunity::Allowed) => {
                    last_break = Some(i);
                }
                None => {}
            }
        }

        if is_newline(chars[i]) {
            continue;
        }

        let w = widths[i];
        // Trailing spaces never force a break.
        if line_width + w > max_width + EPSILON && line_start < i && chars[i] != ' ' {
            let break_at = match last_break {
                Some(bp) if bp > line_start => bp,
                _ => i,
            };
            lines.push(make_line(line_start, break_at));
            line_start = break_at;
            line_width = widths[break_at..=i].iter().sum();
            last_break = None;
            continue;
        }
        line_width += w;
    }

    if line_start < chars.len() {
        lines.push(make_line(line_start, chars.len()));
    }
    lines
}

/// Position fitted lines inside `rect`.
///
/// Baselines are in top-down page coordinates; the PDF writer flips them.
pub fn place(
    fonts: &FontContext,
    fitted: &FittedText,
    rect: &Rect,
    h_align: HAlign,
    v_align: VAlign,
) -> Vec<PlacedLine> {
    if fitted.is_empty() {
        return Vec::new();
    }

    let block = fitted.block_height();
    let top = match v_align {
        VAlign::Top => rect.y,
        VAlign::Middle => rect.y + (rect.height - block) / 2.0,
        VAlign::Bottom => rect.y + rect.height - block,
    };
    let ascent = fonts.ascender(fitted.role, fitted.font_size);
    let leading = (fitted.line_height - fitted.font_size) / 2.0;

    fitted
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let x = match h_align {
                HAlign::Left => rect.x,
                HAlign::Center => rect.x + (rect.width - line.width) / 2.0,
                HAlign::Right => rect.x + rect.width - line.width,
            };
            PlacedLine {
                text: line.text.clone(),
                x,
                baseline: top + i as f64 * fitted.line_height + leading + ascent,
                width: line.width,
            }
        })
        .collect()
}
