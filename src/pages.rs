//! lopdf page primitives used by the merge engine.

use crate::error::{BinderError, Result};
use crate::geometry::{fit_image, PageBounds, Rect, Size};
use crate::letter::{DrawOp, LetterLayout};
use crate::raster::{PixelData, RasterImage};
use crate::text::{encode_win_ansi, text_width, Font};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const LABEL_SIZE: f64 = 24.0;

pub fn pages_root_id(doc: &Document) -> Result<ObjectId> {
    let catalog = doc.catalog()?;
    let pages_ref = catalog.get(b"Pages")?.as_reference()?;
    Ok(pages_ref)
}

pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

fn media_box(size: Size) -> Object {
    Object::Array(vec![0.0.into(), 0.0.into(), size.width.into(), size.height.into()])
}

/// Document with a catalog and an empty page tree
pub fn empty_doc() -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let catalog_id = doc.new_object_id();

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => Object::Array(vec![]),
        "Count" => Object::Integer(0),
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    doc.objects.insert(catalog_id, Object::Dictionary(catalog));
    doc.trailer.set(b"Root", catalog_id);
    doc
}

/// Appends one page with the given content and resources to the root page tree.
pub fn push_page(doc: &mut Document, size: Size, operations: Vec<Operation>, resources: Dictionary) -> Result<ObjectId> {
    let pages_id = pages_root_id(doc)?;
    let content = Content { operations }.encode()?;
    let contents_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let page_dict = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box(size),
        "CropBox" => media_box(size),
        "Resources" => resources,
        "Contents" => contents_id,
    };
    let page_id = doc.add_object(page_dict);

    let pages_dict = doc.get_object_mut(pages_id)?.as_dict_mut()?;
    pages_dict.get_mut(b"Kids")?.as_array_mut()?.push(Object::Reference(page_id));
    let count = pages_dict.get(b"Count")?.as_i64()?;
    pages_dict.set("Count", Object::Integer(count + 1));
    Ok(page_id)
}

/// Registers the three base fonts and returns a `/Font` resource dictionary.
fn font_resources(doc: &mut Document) -> Dictionary {
    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource_name(), id);
    }
    fonts
}

fn text_ops(font: Font, size: f64, x: f64, y: f64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.resource_name().into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
        Operation::new("ET", vec![]),
    ]
}

fn draw_image_ops(name: &str, rect: Rect) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![rect.width.into(), 0.0.into(), 0.0.into(), rect.height.into(), rect.x.into(), rect.y.into()],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// Adds an image XObject (and its soft mask) to `doc`.
pub fn add_image_xobject(doc: &mut Document, img: &RasterImage) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width as i64,
        "Height" => img.height as i64,
        "BitsPerComponent" => 8,
    };
    let data = match &img.pixels {
        PixelData::Jpeg { data, gray } => {
            dict.set("ColorSpace", if *gray { "DeviceGray" } else { "DeviceRGB" });
            dict.set("Filter", "DCTDecode");
            data.clone()
        }
        PixelData::Flate { rgb, alpha } => {
            if let Some(alpha) = alpha {
                let smask = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => img.width as i64,
                        "Height" => img.height as i64,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                        "Filter" => "FlateDecode",
                    },
                    alpha.clone(),
                );
                let smask_id = doc.add_object(smask);
                dict.set("SMask", smask_id);
            }
            dict.set("ColorSpace", "DeviceRGB");
            dict.set("Filter", "FlateDecode");
            rgb.clone()
        }
    };
    doc.add_object(Stream::new(dict, data))
}

/// Single page bearing `title` centered in bold, shrunk to fit if needed.
pub fn section_label_doc(title: &str, page: Size, margin: f64) -> Result<Document> {
    let mut doc = empty_doc();
    let fonts = font_resources(&mut doc);

    let avail = page.width - 2.0 * margin;
    let mut size = LABEL_SIZE;
    let mut width = text_width(title, Font::Bold, size);
    if width > avail && width > 0.0 {
        size *= avail / width;
        width = text_width(title, Font::Bold, size);
    }
    // baseline offset by roughly half the cap height
    let x = (page.width - width) / 2.0;
    let y = (page.height - size * 0.72) / 2.0;

    push_page(&mut doc, page, text_ops(Font::Bold, size, x, y, title), dictionary! { "Font" => fonts })?;
    Ok(doc)
}

/// Single page sized around `img` per `bounds`, with the image drawn in full.
pub fn image_page_doc(img: &RasterImage, bounds: &PageBounds) -> Result<Document> {
    let placement = fit_image(img.width as f64, img.height as f64, bounds);
    log::debug!(
        "image {}x{} -> page {:.1}x{:.1}, scale {:.3}",
        img.width,
        img.height,
        placement.page.width,
        placement.page.height,
        placement.scale
    );

    let mut doc = empty_doc();
    let xobj = add_image_xobject(&mut doc, img);
    let resources = dictionary! { "XObject" => dictionary! { "Im1" => xobj } };
    push_page(&mut doc, placement.page, draw_image_ops("Im1", placement.rect), resources)?;
    Ok(doc)
}

/// Renders a letter layout. Logo ops are skipped when no logo is supplied.
pub fn letter_doc(layout: &LetterLayout, logo: Option<&RasterImage>) -> Result<Document> {
    let mut doc = empty_doc();
    let fonts = font_resources(&mut doc);
    let logo_id = logo.map(|img| add_image_xobject(&mut doc, img));

    for ops in &layout.pages {
        let mut operations = Vec::new();
        for op in ops {
            match op {
                DrawOp::Text { font, size, x, y, text } => {
                    operations.extend(text_ops(*font, *size, *x, *y, text));
                }
                DrawOp::Logo(rect) if logo_id.is_some() => {
                    operations.extend(draw_image_ops("Logo", *rect));
                }
                DrawOp::Logo(_) => {}
            }
        }
        let mut resources = dictionary! { "Font" => fonts.clone() };
        if let Some(id) = logo_id {
            resources.set("XObject", dictionary! { "Logo" => id });
        }
        push_page(&mut doc, layout.page, operations, resources)?;
    }
    Ok(doc)
}

/// Parses an attachment or reference PDF and checks it can be copied from.
pub fn load_pdf(bytes: &[u8]) -> Result<Document> {
    let doc = Document::load_mem(bytes)?;
    if doc.is_encrypted() {
        return Err(BinderError::Encrypted("password-protected PDF".to_string()));
    }
    pages_root_id(&doc)?;
    if page_count(&doc) == 0 {
        return Err(BinderError::NoPages);
    }
    Ok(doc)
}

/// Looks up `key` on the nearest ancestor of a page.
fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut cur = page;
    // bounded walk, page trees can be malformed
    for _ in 0..64 {
        let parent_id = cur.get(b"Parent").ok()?.as_reference().ok()?;
        let parent = doc.get_object(parent_id).ok()?.as_dict().ok()?;
        if let Ok(v) = parent.get(key) {
            return Some(v.clone());
        }
        cur = parent;
    }
    None
}

/// Copies inheritable attributes down onto every leaf page so pages keep
/// their content and size once re-parented.
pub fn flatten_inherited(doc: &mut Document) -> Result<()> {
    let page_ids: Vec<ObjectId> = doc.get_pages().values().cloned().collect();
    for pid in page_ids {
        let missing: Vec<(&[u8], Object)> = {
            let page = doc.get_object(pid)?.as_dict()?;
            INHERITABLE
                .iter()
                .filter(|key| !page.has(key))
                .filter_map(|key| inherited(doc, page, key).map(|v| (*key, v)))
                .collect()
        };
        if missing.is_empty() {
            continue;
        }
        let dict = doc.get_object_mut(pid)?.as_dict_mut()?;
        for (key, value) in missing {
            dict.set(key.to_vec(), value);
        }
    }
    Ok(())
}

/// Pages staged for appending: inherited attributes pushed down, page tree
/// known to be readable. Staging never touches the target document.
pub struct Prepared {
    doc: Document,
    pages: usize,
}

impl Prepared {
    pub fn page_count(&self) -> usize {
        self.pages
    }
}

pub fn prepare(mut add: Document) -> Result<Prepared> {
    pages_root_id(&add)?;
    flatten_inherited(&mut add)?;
    let pages = page_count(&add);
    if pages == 0 {
        return Err(BinderError::NoPages);
    }
    Ok(Prepared { doc: add, pages })
}

/// Moves prepared pages to the end of `base`'s root page tree. The source's
/// own catalog and tree nodes become unreachable and are pruned on finalize.
pub fn attach(base: &mut Document, prepared: Prepared) -> Result<usize> {
    let Prepared { mut doc, .. } = prepared;
    let base_pages_id = pages_root_id(base)?;

    doc.renumber_objects_with(base.max_id + 1);
    let page_ids: Vec<ObjectId> = doc.get_pages().values().cloned().collect();
    for pid in &page_ids {
        doc.get_object_mut(*pid)?.as_dict_mut()?.set("Parent", base_pages_id);
    }

    {
        let pages_dict = base.get_object_mut(base_pages_id)?.as_dict_mut()?;
        let count = pages_dict.get(b"Count")?.as_i64()?;
        let kids = pages_dict.get_mut(b"Kids")?.as_array_mut()?;
        kids.extend(page_ids.iter().map(|pid| Object::Reference(*pid)));
        pages_dict.set("Count", Object::Integer(count + page_ids.len() as i64));
    }

    base.max_id = base.max_id.max(doc.max_id);
    base.objects.extend(doc.objects);
    Ok(page_ids.len())
}

/// Drops orphaned objects, compresses content streams and serializes.
pub fn finalize(doc: &mut Document) -> Result<Vec<u8>> {
    doc.prune_objects();
    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}
