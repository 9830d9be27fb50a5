#![allow(dead_code)]

use approval_binder::{AttachmentFile, BinderConfig, FormData};
use base64::Engine;
use chrono::NaiveDate;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{dictionary, Document, Object};
use std::io::Cursor;

/// A PDF whose pages are `widths[i]` x 400 points, so each page can be
/// found again in the merged output by its MediaBox width.
pub fn pdf_with_widths(widths: &[i64]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = widths
        .iter()
        .map(|&w| {
            let page = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(w), Object::Integer(400)],
            });
            Object::Reference(page)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => widths.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// A one-page PDF locked with a user password (standard security handler, R2).
pub fn encrypted_pdf() -> Vec<u8> {
    let mut doc = Document::load_mem(&pdf_with_widths(&[330])).unwrap();
    let encrypt = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "O" => Object::string_literal(vec![0xAB; 32]),
        "U" => Object::string_literal(vec![0xCD; 32]),
        "P" => -44,
    });
    doc.trailer.set("Encrypt", encrypt);
    doc.trailer.set(
        "ID",
        vec![Object::string_literal(vec![1; 16]), Object::string_literal(vec![1; 16])],
    );
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn png(w: u32, h: u32) -> Vec<u8> {
    encode(w, h, ImageFormat::Png)
}

pub fn jpeg(w: u32, h: u32) -> Vec<u8> {
    encode(w, h, ImageFormat::Jpeg)
}

fn encode(w: u32, h: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn pdf_file(name: &str, widths: &[i64]) -> AttachmentFile {
    AttachmentFile::new(name, "application/pdf", pdf_with_widths(widths))
}

pub fn png_file(name: &str) -> AttachmentFile {
    AttachmentFile::new(name, "image/png", png(400, 300))
}

pub fn corrupt_pdf(name: &str) -> AttachmentFile {
    AttachmentFile::new(name, "application/pdf", b"%PDF-1.7\nnot really a pdf".to_vec())
}

/// Reference document with `pages` pages, 250 points wide.
pub fn reference_b64(pages: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(pdf_with_widths(&vec![250; pages]))
}

pub fn config() -> BinderConfig {
    BinderConfig::default()
}

pub fn form() -> FormData {
    FormData {
        address: "123 Oak St.".to_string(),
        lot: "12".to_string(),
        owner_name: "Jordan Lee".to_string(),
        contractor_name: "Birch Builders".to_string(),
        project_type: "New Home!".to_string(),
        review_comments: "Exterior colors match the approved palette.".to_string(),
        approval_rationale: "Plans meet setback requirements.".to_string(),
        approved_by: "A. Rivera".to_string(),
        approval_date: NaiveDate::from_ymd_opt(2024, 3, 14),
        deposit_received: "$2,000".to_string(),
    }
}

/// MediaBox widths of the output pages, rounded to whole points.
pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let page = doc.get_dictionary(id).unwrap();
            let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
            mb[2].as_float().unwrap().round() as i64
        })
        .collect()
}
