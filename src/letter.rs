//! Approval letter layout.
//!
//! The layout is computed once into backend-neutral draw operations so the
//! lopdf merge path and the pdf-writer fallback produce the same letter.

use crate::config::{DepositTiers, Letterhead, PageConfig};
use crate::geometry::{fit_into, Rect, Size};
use crate::text::{text_width, wrap_text, Font};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const BODY_SIZE: f64 = 11.0;
const LINE_FACTOR: f64 = 1.3;
const PARAGRAPH_GAP: f64 = 10.0;
const LOGO_BOX: f64 = 64.0;
const LOGO_GAP: f64 = 14.0;

const CLOSING: &str = "This approval is limited to the work described in your submission. Any change to the \
approved plans must be submitted to the committee for review before work begins. Please keep a copy of this \
letter on site for the duration of the project.";

pub const ATTACHMENTS_NOTE: &str = "Attachments included on following pages.";

/// Letter content, already validated by the caller. Every field may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormData {
    pub address: String,
    pub lot: String,
    pub owner_name: String,
    pub contractor_name: String,
    pub project_type: String,
    pub review_comments: String,
    pub approval_rationale: String,
    pub approved_by: String,
    pub approval_date: Option<NaiveDate>,
    /// free-form figure shown next to the required deposit, e.g. "$500 (check #1042)"
    pub deposit_received: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        font: Font,
        size: f64,
        x: f64,
        y: f64,
        text: String,
    },
    Logo(Rect),
}

#[derive(Debug, Clone)]
pub struct LetterLayout {
    pub page: Size,
    pub pages: Vec<Vec<DrawOp>>,
}

impl LetterLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All text on all pages, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flatten().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            DrawOp::Logo(_) => None,
        })
    }
}

pub struct LetterContext<'a> {
    pub letterhead: &'a Letterhead,
    pub page: &'a PageConfig,
    pub deposit: &'a DepositTiers,
    pub date: NaiveDate,
    /// pixel size of the cached logo, if one is available
    pub logo: Option<(u32, u32)>,
    pub has_attachments: bool,
}

/// Top-down text cursor that breaks to a new page at the bottom margin.
struct Cursor {
    page: Size,
    left: f64,
    width: f64,
    top: f64,
    bottom: f64,
    y: f64,
    pages: Vec<Vec<DrawOp>>,
}

impl Cursor {
    fn new(page: Size, margin: f64) -> Self {
        Self {
            page,
            left: margin,
            width: page.width - 2.0 * margin,
            top: page.height - margin,
            bottom: margin,
            y: page.height - margin,
            pages: vec![Vec::new()],
        }
    }

    fn current(&mut self) -> &mut Vec<DrawOp> {
        // pages is never empty
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Writes `text` as one or more lines, wrapped to the text width.
    fn line(&mut self, font: Font, size: f64, text: &str) {
        let lines = wrap_text(text, font, size, self.width);
        if lines.is_empty() {
            self.put(font, size, "");
        }
        for line in lines {
            self.put(font, size, &line);
        }
    }

    /// Writes one line that already fits.
    fn put(&mut self, font: Font, size: f64, text: &str) {
        let advance = size * LINE_FACTOR;
        if self.y - advance < self.bottom {
            self.pages.push(Vec::new());
            self.y = self.top;
        }
        self.y -= advance;
        let (x, y) = (self.left, self.y);
        if !text.is_empty() {
            self.current().push(DrawOp::Text { font, size, x, y, text: text.to_string() });
        }
    }

    fn paragraph(&mut self, font: Font, size: f64, text: &str) {
        self.line(font, size, text);
        self.gap(PARAGRAPH_GAP);
    }

    fn gap(&mut self, h: f64) {
        self.y -= h;
    }

    fn finish(self) -> LetterLayout {
        LetterLayout { page: self.page, pages: self.pages }
    }
}

pub fn layout_letter(form: &FormData, ctx: &LetterContext<'_>) -> LetterLayout {
    let mut c = Cursor::new(ctx.page.size, ctx.page.margin);

    // header
    let mut header_x = c.left;
    let mut header_h = 40.0;
    if let Some((w, h)) = ctx.logo.filter(|(w, h)| *w > 0 && *h > 0) {
        let area = Rect { x: c.left, y: c.top - LOGO_BOX, width: LOGO_BOX, height: LOGO_BOX };
        c.current().push(DrawOp::Logo(fit_into(w as f64, h as f64, area)));
        header_x += LOGO_BOX + LOGO_GAP;
        header_h = LOGO_BOX;
    }
    let top = c.top;
    let header_w = c.left + c.width - header_x;
    for (font, size, dy, text) in [
        (Font::Bold, 16.0, 20.0, &ctx.letterhead.organization),
        (Font::Regular, 10.0, 36.0, &ctx.letterhead.department),
    ] {
        c.current().push(DrawOp::Text {
            font,
            size: shrink_to_fit(text, font, size, header_w),
            x: header_x,
            y: top - dy,
            text: text.clone(),
        });
    }
    c.y = top - header_h - 20.0;

    c.line(Font::Regular, BODY_SIZE, &long_date(ctx.date));
    c.gap(PARAGRAPH_GAP);

    let subject = if form.project_type.trim().is_empty() {
        "RE: Architectural Approval".to_string()
    } else {
        format!("RE: Architectural Approval - {}", form.project_type.trim())
    };
    c.line(Font::Bold, 12.0, &subject);
    c.gap(4.0);

    for (label, value) in [
        ("Property", &form.address),
        ("Lot", &form.lot),
        ("Owner", &form.owner_name),
        ("Contractor", &form.contractor_name),
    ] {
        if !value.trim().is_empty() {
            c.line(Font::Regular, BODY_SIZE, &format!("{label}: {}", value.trim()));
        }
    }
    c.gap(PARAGRAPH_GAP);

    c.paragraph(Font::Regular, BODY_SIZE, &greeting(&form.owner_name));

    for body in [&form.review_comments, &form.approval_rationale] {
        if !body.trim().is_empty() {
            c.paragraph(Font::Regular, BODY_SIZE, body.trim());
        }
    }

    c.paragraph(Font::Regular, BODY_SIZE, CLOSING);
    c.paragraph(Font::Regular, BODY_SIZE, &deposit_instructions(form, ctx));

    c.line(Font::Regular, BODY_SIZE, "Sincerely,");
    c.gap(28.0);
    c.line(Font::Bold, BODY_SIZE, &ctx.letterhead.committee);
    c.line(Font::Regular, BODY_SIZE, &ctx.letterhead.organization);

    if !form.approved_by.trim().is_empty() {
        c.gap(PARAGRAPH_GAP);
        c.line(Font::Regular, BODY_SIZE, &format!("Approved by: {}", form.approved_by.trim()));
    }

    if ctx.has_attachments {
        c.gap(2.0 * PARAGRAPH_GAP);
        c.line(Font::Italic, 9.0, ATTACHMENTS_NOTE);
    }

    c.finish()
}

/// Largest size up to `size` at which `text` fits in `width`.
fn shrink_to_fit(text: &str, font: Font, size: f64, width: f64) -> f64 {
    let w = text_width(text, font, size);
    if w > width && w > 0.0 { size * width / w } else { size }
}

fn greeting(owner: &str) -> String {
    let owner = owner.trim();
    if owner.is_empty() {
        "Dear Homeowner,".to_string()
    } else {
        format!("Dear {owner},")
    }
}

fn deposit_instructions(form: &FormData, ctx: &LetterContext<'_>) -> String {
    let amount = ctx.deposit.amount_for(&form.project_type);
    let mut text = format!(
        "A construction deposit of {} is required before work begins. Checks should be made payable to {} \
         and delivered to the management office. The deposit is refunded after a final inspection confirms \
         the project was completed as approved.",
        dollars(amount),
        ctx.letterhead.organization
    );
    if !form.deposit_received.trim().is_empty() {
        text.push_str(&format!(" Deposit received: {}.", form.deposit_received.trim()));
    }
    text
}

fn dollars(amount: u32) -> String {
    let digits = amount.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("${out}")
}

fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Keeps ASCII letters, digits and whitespace, then collapses whitespace runs.
pub fn sanitize(s: &str) -> String {
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn output_filename(organization: &str, form: &FormData, date: NaiveDate) -> String {
    format!(
        "{} Approval Letter - {} - {} - {} - {}.pdf",
        organization,
        form.lot.trim(),
        sanitize(&form.address),
        sanitize(&form.project_type),
        date.format("%m_%d_%Y")
    )
}
