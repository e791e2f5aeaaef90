//! Glyph metrics for the built-in PDF fonts.
//!
//! Widths are the Adobe AFM advance widths for printable ASCII (32-126), in
//! 1/1000 em. Only Helvetica and Helvetica-Bold are needed: they are the
//! fallback when the CJK font files are unavailable.

/// Width tables and vertical metrics for one standard font.
#[derive(Debug, Clone, Copy)]
pub struct StandardFontMetrics {
    widths: &'static [u16; 128],
    /// Width used for Latin-1 and other WinAnsi characters outside the table.
    fallback_width: u16,
    pub ascender: i16,
    pub descender: i16,
}

impl StandardFontMetrics {
    pub const HELVETICA: StandardFontMetrics = StandardFontMetrics {
        widths: &HELVETICA_WIDTHS,
        fallback_width: 556,
        ascender: 718,
        descender: -207,
    };

    pub const HELVETICA_BOLD: StandardFontMetrics = StandardFontMetrics {
        widths: &HELVETICA_BOLD_WIDTHS,
        fallback_width: 611,
        ascender: 718,
        descender: -207,
    };

    /// Advance width of a character in 1/1000 em.
    pub fn char_units(&self, ch: char) -> u16 {
        let code = ch as u32;
        if (32..127).contains(&code) {
            return self.widths[code as usize];
        }
        // Characters with no WinAnsi code are drawn as '?'.
        if winansi_code(ch).is_some() {
            self.fallback_width
        } else {
            self.widths[b'?' as usize]
        }
    }

    /// Advance width of a character in points.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        self.char_units(ch) as f64 / 1000.0 * font_size
    }

    pub fn measure_string(&self, text: &str, font_size: f64) -> f64 {
        text.chars().map(|ch| self.char_width(ch, font_size)).sum()
    }
}

/// The WinAnsiEncoding byte for `ch`, if the standard fonts can draw it.
pub(crate) fn winansi_code(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
        return Some(cp as u8);
    }
    match cp {
        0x20AC => Some(0x80), // Euro sign
        0x2026 => Some(0x85), // Horizontal ellipsis
        0x2022 => Some(0x95), // Bullet
        0x2013 => Some(0x96), // En dash
        0x2014 => Some(0x97), // Em dash
        0x2018 => Some(0x91),
        0x2019 => Some(0x92),
        0x201C => Some(0x93),
        0x201D => Some(0x94),
        0x2122 => Some(0x99), // Trade mark sign
        _ => None,
    }
}

#[rustfmt::skip]
static HELVETICA_WIDTHS: [u16; 128] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    // space ! " # $ % & ' ( ) * + , - . /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9 : ; < = > ?
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    // @ A-O
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    // P-Z [ \ ] ^ _
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    // ` a-o
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    // p-z { | } ~
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 0,
];

#[rustfmt::skip]
static HELVETICA_BOLD_WIDTHS: [u16; 128] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, 0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helvetica_space_width() {
        let w = StandardFontMetrics::HELVETICA.char_width(' ', 12.0);
        assert!((w - 3.336).abs() < 0.001);
    }

    #[test]
    fn test_bold_wider_than_regular() {
        let regular = StandardFontMetrics::HELVETICA.measure_string("Rb", 10.0);
        let bold = StandardFontMetrics::HELVETICA_BOLD.measure_string("Rb", 10.0);
        assert!(bold > regular);
    }

    #[test]
    fn test_unencodable_measured_as_question_mark() {
        for metrics in [StandardFontMetrics::HELVETICA, StandardFontMetrics::HELVETICA_BOLD] {
            let drawn = metrics.measure_string("??", 10.0);
            assert!((metrics.measure_string("中箱", 10.0) - drawn).abs() < 1e-9);
            assert!((metrics.char_width('\u{0394}', 10.0) - metrics.char_width('?', 10.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_latin1_uses_fallback_width() {
        let w = StandardFontMetrics::HELVETICA.char_width('é', 10.0);
        assert!((w - 5.56).abs() < 1e-9);
        assert_eq!(winansi_code('é'), Some(0xE9));
        assert_eq!(winansi_code('箱'), None);
    }
}
