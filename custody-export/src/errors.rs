use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Login did not complete: {0}")]
    LoginTimeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Template image missing: {0}")]
    TemplateMissing(String),

    #[error("Template not found on screen: {0}")]
    TemplateNotFound(String),

    #[error("Dialog not found: {0}")]
    DialogNotFound(String),

    #[error("Dialog interaction failed: {0}")]
    Dialog(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Output file missing or empty: {0}")]
    EmptyOutput(String),

    #[error("Output file was not rewritten: {0}")]
    StaleOutput(String),

    #[error("Browser protocol error: {0}")]
    Browser(String),

    #[error("Screen error: {0}")]
    Screen(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How far an error is allowed to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the whole batch.
    Fatal,
    /// Caught at the account or operation boundary.
    Recoverable,
}

impl ExportError {
    pub fn severity(&self) -> Severity {
        match self {
            ExportError::Config(_)
            | ExportError::BrowserUnavailable(_)
            | ExportError::LoginTimeout(_)
            | ExportError::UnsupportedPlatform(_) => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<chromiumoxide::error::CdpError> for ExportError {
    fn from(error: chromiumoxide::error::CdpError) -> Self {
        ExportError::Browser(error.to_string())
    }
}

impl From<image::ImageError> for ExportError {
    fn from(error: image::ImageError) -> Self {
        ExportError::Screen(format!("image error: {error}"))
    }
}
