//! Standard-14 Helvetica metrics, word wrap and WinAnsi encoding.
//!
//! The letter, the section labels and the fallback assembler all draw with the
//! non-embedded base fonts, so measurement only needs the AFM advance widths.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    pub const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Italic];

    /// Resource name used in page `/Font` dictionaries
    pub fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }

    pub fn base_font(&self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Italic => "Helvetica-Oblique",
        }
    }

    fn widths(&self) -> &'static [i16; 95] {
        match self {
            // oblique shares the upright advances
            Font::Regular | Font::Italic => &HELV_W_32_126,
            Font::Bold => &HELV_BOLD_W_32_126,
        }
    }
}

// Helvetica / Helvetica-Bold (WinAnsi, 32..126) widths in 1/1000 em
const HELV_W_32_126: [i16; 95] = [
    278,278,355,556,556,889,667,191,333,333,389,584,278,333,278,278,
    556,556,556,556,556,556,556,556,556,556,278,278,584,584,584,556,
    1015,667,667,722,722,667,611,778,722,278,500,667,556,833,722,778,
    667,778,722,667,611,722,667,944,667,667,611,278,278,278,469,556,
    333,556,556,500,556,556,278,556,556,222,222,500,222,833,556,556,
    556,556,333,500,278,556,500,722,500,500,500,334,260,334,584,
];

const HELV_BOLD_W_32_126: [i16; 95] = [
    278,333,474,556,556,889,722,238,333,333,389,584,278,333,278,278,
    556,556,556,556,556,556,556,556,556,556,333,333,584,584,584,611,
    975,722,722,722,722,667,611,778,722,278,556,722,611,833,722,778,
    667,778,722,667,611,722,667,944,667,667,611,333,278,333,584,556,
    333,556,611,556,611,556,333,611,611,278,278,556,278,889,611,611,
    611,611,389,556,333,611,556,778,556,556,500,389,280,389,584,
];

/// Rendered width of `s` in points.
pub fn text_width(s: &str, font: Font, size: f64) -> f64 {
    let table = font.widths();
    let w1000: f64 = encode_win_ansi(s)
        .iter()
        .map(|&b| {
            if (32..=126).contains(&b) {
                table[(b - 32) as usize] as f64
            } else {
                // Latin-1 supplement: average lowercase advance
                556.0
            }
        })
        .sum();
    w1000 * size / 1000.0
}

/// Greedy word wrap against `max_width`. Explicit newlines start a new line,
/// blank input lines are kept, and a word wider than the line is broken by
/// characters so nothing ever runs past the margin.
pub fn wrap_text(text: &str, font: Font, size: f64, max_width: f64) -> Vec<String> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let mut current = String::new();
        for word in raw.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if text_width(&candidate, font, size) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width(word, font, size) <= max_width {
                current = word.to_string();
            } else {
                let mut pieces = break_word(word, font, size, max_width);
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        lines.push(current);
    }

    lines
}

fn break_word(word: &str, font: Font, size: f64, max_width: f64) -> Vec<String> {
    let mut out = Vec::new();
    let mut piece = String::new();
    for ch in word.chars() {
        piece.push(ch);
        if text_width(&piece, font, size) > max_width && piece.chars().count() > 1 {
            piece.pop();
            out.push(std::mem::take(&mut piece));
            piece.push(ch);
        }
    }
    out.push(piece);
    out
}

/// Encodes for the base fonts' WinAnsiEncoding. Characters outside Latin-1
/// (other than the usual typographic quotes and dashes) become `?`.
pub fn encode_win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\t' => b' ',
            c if (' '..='~').contains(&c) => c as u8,
            c if ('\u{A0}'..='\u{FF}').contains(&c) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}
