//! Shared resources: the organization logo and the reference document.

use crate::attachment::ImageEncoding;
use crate::config::ReferenceConfig;
use crate::error::{BinderError, Result};
use crate::raster::RasterImage;
use base64::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone)]
pub enum LogoSource {
    None,
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// Lazily decoded logo, loaded at most once for the lifetime of the cache.
///
/// Concurrent first callers wait on the same load. A failed load is cached as
/// "no logo" so letters keep rendering without retrying on every request.
#[derive(Debug)]
pub struct LogoCache {
    source: LogoSource,
    cell: OnceCell<Option<Arc<RasterImage>>>,
}

impl LogoCache {
    pub fn new(source: LogoSource) -> Self {
        Self { source, cell: OnceCell::new() }
    }

    pub fn empty() -> Self {
        Self::new(LogoSource::None)
    }

    pub async fn get(&self) -> Option<Arc<RasterImage>> {
        self.cell
            .get_or_init(|| async {
                match self.load().await {
                    Ok(Some(img)) => {
                        log::info!("Logo loaded ({}x{})", img.width, img.height);
                        Some(Arc::new(img))
                    }
                    Ok(None) => None,
                    Err(e) => {
                        log::warn!("Logo unavailable, letters render without it: {e}");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    async fn load(&self) -> Result<Option<RasterImage>> {
        let bytes = match &self.source {
            LogoSource::None => return Ok(None),
            LogoSource::Bytes(b) => b.clone(),
            LogoSource::Path(p) => tokio::fs::read(p).await?,
        };
        let encoding = ImageEncoding::sniff(&bytes)
            .ok_or_else(|| BinderError::ResourceUnavailable("logo is neither JPEG nor PNG".to_string()))?;
        RasterImage::decode(&bytes, encoding).map(Some)
    }
}

/// Resolves the reference document: the embedded copy first, then
/// `<base_url>/assets/<asset_name>.pdf`.
pub async fn load_reference(config: &ReferenceConfig, http: &reqwest::Client) -> Result<Vec<u8>> {
    if let Some(encoded) = config.embedded_base64.as_deref().filter(|s| !s.trim().is_empty()) {
        let compact: String = encoded.split_whitespace().collect();
        match base64::engine::general_purpose::STANDARD.decode(compact) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => log::warn!("Embedded reference document is not valid base64: {e}"),
        }
    }

    let Some(base) = config.base_url.as_deref() else {
        return Err(BinderError::ResourceUnavailable(format!(
            "no source for reference document '{}'",
            config.title
        )));
    };

    let url = format!("{}/assets/{}.pdf", base.trim_end_matches('/'), config.asset_name);
    log::info!("Fetching reference document from {url}");
    let response = http.get(&url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}
