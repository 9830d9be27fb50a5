//! Attachment input types and classification.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One user-supplied file, fully read into memory. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct AttachmentFile {
    pub name: String,
    pub declared_mime_type: String,
    pub bytes: Arc<[u8]>,
}

impl AttachmentFile {
    pub fn new(name: impl Into<String>, declared_mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            declared_mime_type: declared_mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn classify(&self) -> Attachment<'_> {
        classify(&self.bytes, &self.declared_mime_type, &self.name)
    }
}

/// Attachment categories, in the order their sections appear in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    SiteConditions,
    SubmittedFiles,
}

impl GroupKind {
    pub const ORDER: [GroupKind; 2] = [GroupKind::SiteConditions, GroupKind::SubmittedFiles];
}

#[derive(Debug, Clone)]
pub struct AttachmentGroup {
    pub kind: GroupKind,
    pub files: Vec<AttachmentFile>,
}

impl AttachmentGroup {
    pub fn new(kind: GroupKind, files: Vec<AttachmentFile>) -> Self {
        Self { kind, files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Buckets groups by kind in section order. Groups of the same kind are
/// concatenated in the order they were supplied; empty kinds are dropped.
pub fn normalize_groups(groups: Vec<AttachmentGroup>) -> Vec<AttachmentGroup> {
    let mut buckets: Vec<AttachmentGroup> = GroupKind::ORDER
        .iter()
        .map(|&kind| AttachmentGroup::new(kind, Vec::new()))
        .collect();
    for group in groups {
        if let Some(bucket) = buckets.iter_mut().find(|b| b.kind == group.kind) {
            bucket.files.extend(group.files);
        }
    }
    buckets.retain(|b| !b.is_empty());
    buckets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

/// Classified attachment, borrowing the file's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment<'a> {
    PaginatedDocument(&'a [u8]),
    RasterImage(&'a [u8], ImageEncoding),
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Pdf,
    Image(ImageEncoding),
}

fn kind_from_mime(mime: &str) -> Option<Kind> {
    match mime {
        "application/pdf" | "application/x-pdf" | "application/acrobat" => Some(Kind::Pdf),
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Kind::Image(ImageEncoding::Jpeg)),
        "image/png" | "image/x-png" => Some(Kind::Image(ImageEncoding::Png)),
        _ => None,
    }
}

fn kind_from_extension(name: &str) -> Option<Kind> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(Kind::Pdf),
        "jpg" | "jpeg" | "jpe" | "jfif" => Some(Kind::Image(ImageEncoding::Jpeg)),
        "png" => Some(Kind::Image(ImageEncoding::Png)),
        _ => None,
    }
}

fn is_generic_mime(mime: &str) -> bool {
    matches!(
        mime,
        "" | "application/octet-stream" | "binary/octet-stream" | "application/unknown" | "application/binary"
    )
}

/// Resolves a raw file into a closed attachment variant.
///
/// A recognized declared MIME type decides. The filename extension is only
/// consulted when the declared type is absent or generic. Anything else,
/// including an empty buffer, is `Unsupported`.
pub fn classify<'a>(bytes: &'a [u8], declared_mime_type: &str, filename: &str) -> Attachment<'a> {
    if bytes.is_empty() {
        return Attachment::Unsupported(format!("{filename}: empty file"));
    }

    let mime = declared_mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let kind = match kind_from_mime(&mime) {
        Some(kind) => Some(kind),
        None if is_generic_mime(&mime) => kind_from_extension(filename),
        None => None,
    };

    match kind {
        Some(Kind::Pdf) => Attachment::PaginatedDocument(bytes),
        Some(Kind::Image(encoding)) => Attachment::RasterImage(bytes, encoding),
        None if mime.is_empty() => Attachment::Unsupported(format!("{filename}: unrecognized file type")),
        None => Attachment::Unsupported(format!("{filename}: unsupported type {mime}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"data";

    #[test]
    fn declared_type_decides() {
        assert_eq!(classify(DATA, "application/pdf", "plans.pdf"), Attachment::PaginatedDocument(DATA));
        assert_eq!(
            classify(DATA, "image/jpeg", "site.jpg"),
            Attachment::RasterImage(DATA, ImageEncoding::Jpeg)
        );
        assert_eq!(
            classify(DATA, "IMAGE/PNG; charset=binary", "x"),
            Attachment::RasterImage(DATA, ImageEncoding::Png)
        );
    }

    #[test]
    fn recognized_type_beats_extension() {
        assert_eq!(classify(DATA, "application/pdf", "scan.png"), Attachment::PaginatedDocument(DATA));
    }

    #[test]
    fn extension_used_when_type_missing_or_generic() {
        assert_eq!(classify(DATA, "", "Plans.PDF"), Attachment::PaginatedDocument(DATA));
        assert_eq!(
            classify(DATA, "application/octet-stream", "front.jpeg"),
            Attachment::RasterImage(DATA, ImageEncoding::Jpeg)
        );
    }

    #[test]
    fn specific_unknown_type_is_unsupported() {
        assert!(matches!(classify(DATA, "image/heic", "photo.jpg"), Attachment::Unsupported(_)));
        assert!(matches!(classify(DATA, "text/plain", "notes.txt"), Attachment::Unsupported(_)));
        assert!(matches!(classify(DATA, "", "archive.zip"), Attachment::Unsupported(_)));
        assert!(matches!(classify(DATA, "", "noext"), Attachment::Unsupported(_)));
    }

    #[test]
    fn empty_buffer_is_unsupported() {
        assert!(matches!(classify(b"", "application/pdf", "a.pdf"), Attachment::Unsupported(_)));
    }

    #[test]
    fn groups_are_put_in_section_order() {
        let f = |n: &str| AttachmentFile::new(n, "image/png", vec![1]);
        let groups = vec![
            AttachmentGroup::new(GroupKind::SubmittedFiles, vec![f("plan1")]),
            AttachmentGroup::new(GroupKind::SiteConditions, vec![]),
            AttachmentGroup::new(GroupKind::SiteConditions, vec![f("site1"), f("site2")]),
            AttachmentGroup::new(GroupKind::SubmittedFiles, vec![f("plan2")]),
        ];

        let normalized = normalize_groups(groups);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].kind, GroupKind::SiteConditions);
        let names: Vec<_> = normalized[1].files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["plan1", "plan2"]);
    }

    #[test]
    fn normalizing_moves_buffers() {
        let file = AttachmentFile::new("site.png", "image/png", vec![7; 1024]);
        let original = Arc::clone(&file.bytes);
        let groups = vec![AttachmentGroup::new(GroupKind::SiteConditions, vec![file])];

        let normalized = normalize_groups(groups);
        assert!(Arc::ptr_eq(&normalized[0].files[0].bytes, &original));
        // the test's handle plus the one moved into the normalized group
        assert_eq!(Arc::strong_count(&original), 2);
    }

    #[test]
    fn empty_groups_vanish() {
        let groups = vec![AttachmentGroup::new(GroupKind::SiteConditions, vec![])];
        assert!(normalize_groups(groups).is_empty());
    }
}
