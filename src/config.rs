//! Configuration for the render → annotate → extract pipeline.
//!
//! Every stage entry point takes a [`PipelineConfig`] explicitly; nothing is
//! read from ambient process state inside the library. The CLI is the only
//! place that looks at environment variables or config files, and it does so
//! by filling in the builder.

use crate::error::Pdf2HtmlError;
use crate::naming::RESPONSE_EXTENSION;
use crate::pipeline::discover::is_image_extension;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_PROMPT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default Anthropic model used for page annotation.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default Anthropic API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// Configuration shared by all pipeline stages.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2html::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .api_key("sk-ant-...")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.responses_dir, "claude_responses");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    // ── Renderer ─────────────────────────────────────────────────────────
    /// Rendering resolution. Range: 72–600. Default: 300.
    ///
    /// Pages are scaled by `dpi / 72` from PDF points.
    pub dpi: u32,

    /// File format of the rendered page images. Default: PNG.
    pub image_format: RasterFormat,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to the pdfium shared library (file or directory).
    /// If None, the system library search path is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    // ── Annotator ────────────────────────────────────────────────────────
    /// Credential for the vision model API. Required by the annotator.
    pub api_key: Option<String>,

    /// Model identifier sent with every request.
    pub model: String,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: u32,

    /// API base URL, without the `/v1/messages` path.
    pub api_base_url: String,

    /// Per-request timeout in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Prompt sent with every page image. If None, uses [`DEFAULT_PROMPT`].
    pub prompt: Option<String>,

    /// Number of pages annotated at once. Default: 1 (strictly sequential).
    ///
    /// Each worker writes only its own `p{n}.json`, so raising this never
    /// makes two workers touch the same file.
    pub concurrency: usize,

    /// Retries per page on a retryable model error. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Name of the response-record subdirectory inside the image directory.
    pub responses_dir: String,

    // ── Extractor ────────────────────────────────────────────────────────
    /// Language tag after the opening fence, e.g. `html` for ```` ```html ````.
    pub fence_language: String,

    /// Extension of the per-page fragment files. Default: `html`.
    pub fragment_extension: String,

    /// File name of the combined document. Default: `combined.html`.
    pub combined_file_name: String,

    /// `<title>` of the combined document.
    pub document_title: String,

    /// Optional per-page progress events.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            image_format: RasterFormat::default(),
            password: None,
            pdfium_lib_path: None,
            download_timeout_secs: 120,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_secs: 300,
            prompt: None,
            concurrency: 1,
            max_retries: 0,
            retry_backoff_ms: 500,
            responses_dir: "claude_responses".to_string(),
            fence_language: "html".to_string(),
            fragment_extension: "html".to_string(),
            combined_file_name: "combined.html".to_string(),
            document_title: "Combined Pages".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("image_format", &self.image_format)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_base_url", &self.api_base_url)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("responses_dir", &self.responses_dir)
            .field("fence_language", &self.fence_language)
            .field("combined_file_name", &self.combined_file_name)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The prompt to send, falling back to the built-in default.
    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    /// The credential, or a fatal error when it is absent or blank.
    pub fn require_api_key(&self) -> Result<&str, Pdf2HtmlError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(Pdf2HtmlError::MissingCredential {
                provider: "anthropic".to_string(),
                hint: "Set ANTHROPIC_API_KEY, pass --api-key, or point --api-key-file at a file \
                       containing the key."
                    .to_string(),
            }),
        }
    }

    /// `{img_dir}/{responses_dir}`
    pub fn responses_dir_in(&self, img_dir: &Path) -> PathBuf {
        img_dir.join(&self.responses_dir)
    }

    /// `{img_dir}/{combined_file_name}`
    pub fn combined_path_in(&self, img_dir: &Path) -> PathBuf {
        img_dir.join(&self.combined_file_name)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn image_format(mut self, format: RasterFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn responses_dir(mut self, name: impl Into<String>) -> Self {
        self.config.responses_dir = name.into();
        self
    }

    pub fn fence_language(mut self, lang: impl Into<String>) -> Self {
        self.config.fence_language = lang.into();
        self
    }

    pub fn fragment_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.fragment_extension = ext.into();
        self
    }

    pub fn combined_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.combined_file_name = name.into();
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.config.document_title = title.into();
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn ProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2HtmlError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Pdf2HtmlError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.fence_language.trim().is_empty() {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Fence language tag must not be empty".into(),
            ));
        }
        for (what, name) in [
            ("responses directory", &c.responses_dir),
            ("fragment extension", &c.fragment_extension),
            ("combined file name", &c.combined_file_name),
        ] {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(Pdf2HtmlError::InvalidConfig(format!(
                    "Invalid {what}: {name:?}"
                )));
            }
        }
        let ext = c.fragment_extension.as_str();
        if !ext.chars().all(|ch| ch.is_ascii_alphanumeric())
            || is_image_extension(ext)
            || ext.eq_ignore_ascii_case(RESPONSE_EXTENSION)
        {
            return Err(Pdf2HtmlError::InvalidConfig(format!(
                "Fragment extension {ext:?} must be alphanumeric and must not \
                 name a page image or response record"
            )));
        }
        if c.prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(Pdf2HtmlError::EmptyPrompt);
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image format for rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RasterFormat {
    /// Lossless; the default.
    #[default]
    Png,
    /// Smaller files for very large documents.
    Jpeg,
}

impl RasterFormat {
    /// File extension written after `p{n}.`.
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            RasterFormat::Png => image::ImageFormat::Png,
            RasterFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}
