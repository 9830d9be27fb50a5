//! Approval letter assembly: renders a letter, then binds site photos,
//! submitted plans and a reference document behind it as one PDF.

pub mod attachment;
pub mod config;
pub mod error;
pub mod fallback;
pub mod geometry;
pub mod letter;
pub mod merge;
pub mod pages;
pub mod raster;
pub mod resources;
pub mod text;

pub use attachment::{Attachment, AttachmentFile, AttachmentGroup, GroupKind};
pub use config::BinderConfig;
pub use error::{BinderError, Result};
pub use letter::FormData;
pub use merge::{AssemblyReport, Binder, EmbedOutcome, GenerationResult};
pub use resources::{LogoCache, LogoSource};
