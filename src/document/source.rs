//! Resolving document references into loaded documents
//!
//! A reference may be a URL (local path, `file://`, or remote), a raw
//! buffer, or a data URI. All three are normalized into one byte buffer and
//! handed to the first backend that claims it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info, warn};

use super::backend::{PageDims, PageSize, RasterBackend, default_backends};

/// Default bound on fetching a remote reference
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Opaque document reference supplied by the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentReference {
    /// Local path, `file://` URL, or `http(s)://` URL
    Url(String),
    /// Raw document bytes
    Buffer(Arc<[u8]>),
    /// `data:` URI, or bare base64
    DataUri(String),
}

impl DocumentReference {
    /// Classify a user-supplied string
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("data:") {
            DocumentReference::DataUri(value.to_string())
        } else {
            DocumentReference::Url(value.to_string())
        }
    }

    /// Short description suitable for logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            DocumentReference::Url(url) => url.clone(),
            DocumentReference::Buffer(bytes) => format!("<buffer {} bytes>", bytes.len()),
            DocumentReference::DataUri(uri) => {
                let head: String = uri.chars().take(32).collect();
                format!("<data uri {head}...>")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadErrorKind {
    Corrupt,
    Unsupported,
    Timeout,
}

/// Document-level load failure
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("corrupt document: {detail}")]
    Corrupt { detail: String },

    #[error("unsupported document: {detail}")]
    Unsupported { detail: String },

    #[error("timed out loading document: {detail}")]
    Timeout { detail: String },
}

impl LoadError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt { detail: msg.into() }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported { detail: msg.into() }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout { detail: msg.into() }
    }

    #[must_use]
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::Corrupt { .. } => LoadErrorKind::Corrupt,
            LoadError::Unsupported { .. } => LoadErrorKind::Unsupported,
            LoadError::Timeout { .. } => LoadErrorKind::Timeout,
        }
    }
}

/// Host-supplied network access for remote references
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// A loaded document: normalized bytes, page geometry, and the backend
/// that will rasterize it. Dropping it releases the buffer.
#[derive(Clone)]
pub struct Document {
    generation: u64,
    fingerprint: String,
    bytes: Arc<[u8]>,
    pages: Vec<PageDims>,
    backend: Arc<dyn RasterBackend>,
}

impl Document {
    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Unscaled dimensions of a 1-based page
    #[must_use]
    pub fn page_dims(&self, page: u32) -> Option<PageDims> {
        page.checked_sub(1)
            .and_then(|idx| self.pages.get(idx as usize))
            .copied()
    }

    #[must_use]
    pub fn page_size(&self, page: u32, scale: f32) -> Option<PageSize> {
        self.page_dims(page)
            .map(|dims| PageSize::from_dims(page, dims, scale))
    }

    /// Sizes of every page at `scale`, in page order
    #[must_use]
    pub fn page_sizes(&self, scale: f32) -> Vec<PageSize> {
        self.pages
            .iter()
            .enumerate()
            .map(|(idx, dims)| PageSize::from_dims(idx as u32 + 1, *dims, scale))
            .collect()
    }

    /// Unique per load; tags render work for this document
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// md5 of the normalized bytes
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn RasterBackend> {
        &self.backend
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("generation", &self.generation)
            .field("fingerprint", &self.fingerprint)
            .field("bytes", &self.bytes.len())
            .field("page_count", &self.pages.len())
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Resolves references and picks a backend
pub struct DocumentSource {
    backends: Vec<Arc<dyn RasterBackend>>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    fetch_timeout: Duration,
}

impl Default for DocumentSource {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl DocumentSource {
    /// Source with the backends compiled into this build
    #[must_use]
    pub fn new(fetch_timeout: Duration) -> Self {
        Self::with_backends(default_backends(), fetch_timeout)
    }

    #[must_use]
    pub fn with_backends(backends: Vec<Arc<dyn RasterBackend>>, fetch_timeout: Duration) -> Self {
        Self {
            backends,
            fetcher: None,
            fetch_timeout,
        }
    }

    /// Enable `http(s)://` references
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn load(&self, reference: &DocumentReference) -> Result<Document, LoadError> {
        info!("Loading document {}", reference.describe());
        let bytes = self.resolve_bytes(reference)?;
        if bytes.is_empty() {
            return Err(LoadError::corrupt("document is empty"));
        }

        let backend = self
            .backends
            .iter()
            .find(|b| b.accepts(&bytes))
            .cloned()
            .ok_or_else(|| LoadError::unsupported("no backend recognizes this format"))?;

        let pages = backend.probe(&bytes)?;
        if pages.is_empty() {
            return Err(LoadError::corrupt("document has no pages"));
        }

        let fingerprint = format!("{:x}", md5::compute(&bytes));
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        info!(
            "Loaded document {fingerprint} via {} ({} pages, generation {generation})",
            backend.name(),
            pages.len()
        );

        Ok(Document {
            generation,
            fingerprint,
            bytes,
            pages,
            backend,
        })
    }

    fn resolve_bytes(&self, reference: &DocumentReference) -> Result<Arc<[u8]>, LoadError> {
        match reference {
            DocumentReference::Buffer(bytes) => Ok(Arc::clone(bytes)),
            DocumentReference::DataUri(uri) => decode_data_uri(uri).map(Arc::from),
            DocumentReference::Url(url) => {
                if url.starts_with("http://") || url.starts_with("https://") {
                    self.fetch_remote(url).map(Arc::from)
                } else {
                    read_local(url).map(Arc::from)
                }
            }
        }
    }

    fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let Some(fetcher) = self.fetcher.clone() else {
            return Err(LoadError::unsupported(format!(
                "no fetcher configured for remote reference {url}"
            )));
        };

        let (tx, rx) = flume::bounded(1);
        let owned_url = url.to_string();
        std::thread::spawn(move || {
            let _ = tx.send(fetcher.fetch(&owned_url));
        });

        match rx.recv_timeout(self.fetch_timeout) {
            Ok(Ok(bytes)) => {
                debug!("Fetched {} bytes from {url}", bytes.len());
                Ok(bytes)
            }
            Ok(Err(detail)) => Err(LoadError::unsupported(format!("fetch {url}: {detail}"))),
            Err(flume::RecvTimeoutError::Timeout) => {
                warn!("Fetching {url} exceeded {:?}", self.fetch_timeout);
                Err(LoadError::timeout(format!(
                    "{url} not fetched within {:?}",
                    self.fetch_timeout
                )))
            }
            Err(flume::RecvTimeoutError::Disconnected) => Err(LoadError::unsupported(format!(
                "fetcher for {url} exited without a result"
            ))),
        }
    }
}

fn read_local(url: &str) -> Result<Vec<u8>, LoadError> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    std::fs::read(Path::new(path))
        .map_err(|e| LoadError::unsupported(format!("cannot read {path}: {e}")))
}

/// Decode `data:[<mime>][;base64],<payload>`; anything without the `data:`
/// prefix is taken as bare base64.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, LoadError> {
    let Some(rest) = uri.strip_prefix("data:") else {
        return decode_base64(uri);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::corrupt("data URI has no payload separator"))?;

    if meta.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        decode_base64(payload)
    } else {
        percent_decode(payload)
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, LoadError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| LoadError::corrupt(format!("invalid base64: {e}")))
}

fn percent_decode(payload: &str) -> Result<Vec<u8>, LoadError> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| LoadError::corrupt(format!("bad percent escape at byte {i}")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}
