//! Fallback assembler.
//!
//! Writes the output directly with pdf-writer when the lopdf merge path cannot
//! run. Only raster attachments survive; PDFs (including the reference
//! document) are dropped with a warning. Image pages are laid out in
//! millimeters and converted to points when written.

use crate::attachment::{Attachment, AttachmentGroup};
use crate::config::BinderConfig;
use crate::error::{BinderError, Result};
use crate::geometry::{fit_image, Rect, Size, UnitSystem};
use crate::letter::{DrawOp, LetterLayout};
use crate::merge::{AssemblyReport, SectionSpan, LETTER_SECTION};
use crate::raster::{PixelData, RasterImage};
use crate::text::{encode_win_ansi, text_width, Font};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect as PdfRect, Ref, Str};

const LABEL_SIZE: f32 = 24.0;

struct Writer {
    pdf: Pdf,
    alloc: Ref,
    tree_id: Ref,
    fonts: Vec<(Font, Ref)>,
    page_ids: Vec<Ref>,
}

impl Writer {
    fn new() -> Self {
        let mut alloc = Ref::new(1);
        let tree_id = alloc.bump();
        let mut pdf = Pdf::new();

        let mut fonts = Vec::new();
        for font in Font::ALL {
            let id = alloc.bump();
            pdf.type1_font(id)
                .base_font(Name(font.base_font().as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            fonts.push((font, id));
        }

        Self { pdf, alloc, tree_id, fonts, page_ids: Vec::new() }
    }

    fn image(&mut self, img: &RasterImage) -> Ref {
        let id = self.alloc.bump();
        match &img.pixels {
            PixelData::Jpeg { data, gray } => {
                let mut xobj = self.pdf.image_xobject(id, data);
                xobj.filter(Filter::DctDecode);
                xobj.width(img.width as i32);
                xobj.height(img.height as i32);
                if *gray {
                    xobj.color_space().device_gray();
                } else {
                    xobj.color_space().device_rgb();
                }
                xobj.bits_per_component(8);
            }
            PixelData::Flate { rgb, alpha } => {
                let smask = alpha.as_ref().map(|alpha| {
                    let mask_id = self.alloc.bump();
                    let mut mask = self.pdf.image_xobject(mask_id, alpha);
                    mask.filter(Filter::FlateDecode);
                    mask.width(img.width as i32);
                    mask.height(img.height as i32);
                    mask.color_space().device_gray();
                    mask.bits_per_component(8);
                    mask_id
                });
                let mut xobj = self.pdf.image_xobject(id, rgb);
                xobj.filter(Filter::FlateDecode);
                xobj.width(img.width as i32);
                xobj.height(img.height as i32);
                xobj.color_space().device_rgb();
                xobj.bits_per_component(8);
                if let Some(mask_id) = smask {
                    xobj.s_mask(mask_id);
                }
            }
        }
        id
    }

    /// Adds a page of `size` points. `x_objects` are registered by name.
    fn page(&mut self, size: Size, content: Content, x_objects: &[(&[u8], Ref)]) {
        let page_id = self.alloc.bump();
        let content_id = self.alloc.bump();

        let mut page = self.pdf.page(page_id);
        page.media_box(PdfRect::new(0.0, 0.0, size.width as f32, size.height as f32));
        page.parent(self.tree_id);
        page.contents(content_id);
        let mut res = page.resources();
        let mut fonts = res.fonts();
        for (font, id) in &self.fonts {
            fonts.pair(Name(font.resource_name().as_bytes()), *id);
        }
        fonts.finish();
        if !x_objects.is_empty() {
            let mut xobjs = res.x_objects();
            for (name, id) in x_objects {
                xobjs.pair(Name(*name), *id);
            }
            xobjs.finish();
        }
        res.finish();
        page.finish();

        self.pdf.stream(content_id, &content.finish());
        self.page_ids.push(page_id);
    }

    fn finish(mut self) -> Vec<u8> {
        let catalog_id = self.alloc.bump();
        self.pdf.catalog(catalog_id).pages(self.tree_id);
        self.pdf
            .pages(self.tree_id)
            .kids(self.page_ids.iter().copied())
            .count(self.page_ids.len() as i32);
        self.pdf.finish()
    }
}

fn show(content: &mut Content, font: Font, size: f32, x: f32, y: f32, text: &str) {
    let bytes = encode_win_ansi(text);
    content.begin_text();
    content.set_font(Name(font.resource_name().as_bytes()), size);
    content.next_line(x, y);
    content.show(Str(&bytes));
    content.end_text();
}

fn draw(content: &mut Content, name: &[u8], rect: Rect) {
    content.save_state();
    content.transform([
        rect.width as f32,
        0.0,
        0.0,
        rect.height as f32,
        rect.x as f32,
        rect.y as f32,
    ]);
    content.x_object(Name(name));
    content.restore_state();
}

fn label_page(w: &mut Writer, title: &str, config: &BinderConfig) {
    let page = config.page.size;
    let avail = page.width - 2.0 * config.page.margin;
    let mut size = LABEL_SIZE as f64;
    let width = text_width(title, Font::Bold, size);
    if width > avail && width > 0.0 {
        size *= avail / width;
    }
    let width = text_width(title, Font::Bold, size);
    let mut content = Content::new();
    show(
        &mut content,
        Font::Bold,
        size as f32,
        ((page.width - width) / 2.0) as f32,
        ((page.height - size * 0.72) / 2.0) as f32,
        title,
    );
    w.page(page, content, &[]);
}

pub fn assemble(
    layout: &LetterLayout,
    logo: Option<&RasterImage>,
    groups: &[AttachmentGroup],
    config: &BinderConfig,
) -> Result<(Vec<u8>, AssemblyReport)> {
    if layout.pages.is_empty() {
        return Err(BinderError::Fallback("letter layout produced no pages".to_string()));
    }

    let mut w = Writer::new();
    let mut report = AssemblyReport { fallback_used: true, ..AssemblyReport::default() };

    // letter
    let logo_id = logo.map(|img| w.image(img));
    for ops in &layout.pages {
        let mut content = Content::new();
        for op in ops {
            match op {
                DrawOp::Text { font, size, x, y, text } => {
                    show(&mut content, *font, *size as f32, *x as f32, *y as f32, text)
                }
                DrawOp::Logo(rect) if logo_id.is_some() => draw(&mut content, b"Logo", *rect),
                DrawOp::Logo(_) => {}
            }
        }
        let xobjs: Vec<(&[u8], Ref)> = logo_id.iter().map(|id| (&b"Logo"[..], *id)).collect();
        w.page(layout.page, content, &xobjs);
    }
    report.sections.push(SectionSpan {
        title: LETTER_SECTION.to_string(),
        first_page: 1,
        page_count: layout.pages.len(),
    });

    // image geometry in millimeters
    let bounds_mm = config.page.image_bounds().convert(UnitSystem::Point, UnitSystem::Mm);

    for group in groups {
        let title = config.sections.title(group.kind);
        let mut images = Vec::new();
        for file in &group.files {
            match file.classify() {
                Attachment::RasterImage(bytes, encoding) => match RasterImage::decode(bytes, encoding) {
                    Ok(img) => images.push(img),
                    Err(e) => report.skip(title, &file.name, e.to_string()),
                },
                Attachment::PaginatedDocument(_) => {
                    report.skip(title, &file.name, "PDF attachments need the merge engine".to_string())
                }
                Attachment::Unsupported(reason) => report.skip(title, &file.name, reason),
            }
        }
        if images.is_empty() {
            continue;
        }

        let first_page = w.page_ids.len() + 1;
        label_page(&mut w, title, config);
        for img in &images {
            let w_mm = UnitSystem::Point.convert(img.width as f64, UnitSystem::Mm);
            let h_mm = UnitSystem::Point.convert(img.height as f64, UnitSystem::Mm);
            let fit = fit_image(w_mm, h_mm, &bounds_mm);
            log::debug!(
                "image {}x{} -> page {:.1}x{:.1}{}",
                img.width,
                img.height,
                fit.page.width,
                fit.page.height,
                UnitSystem::Mm.as_str()
            );
            let rect = Rect {
                x: UnitSystem::Mm.to_points(fit.rect.x),
                y: UnitSystem::Mm.to_points(fit.rect.y),
                width: UnitSystem::Mm.to_points(fit.rect.width),
                height: UnitSystem::Mm.to_points(fit.rect.height),
            };
            let id = w.image(img);
            let mut content = Content::new();
            draw(&mut content, b"Im1", rect);
            w.page(fit.page.convert(UnitSystem::Mm, UnitSystem::Point), content, &[(&b"Im1"[..], id)]);
        }
        report.sections.push(SectionSpan {
            title: title.to_string(),
            first_page,
            page_count: images.len() + 1,
        });
    }

    log::warn!("Reference document '{}' omitted by fallback assembler", config.reference.title);

    report.total_pages = w.page_ids.len();
    Ok((w.finish(), report))
}
