//! Reference images used as visual anchors in the print flow.

use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::debug;

use crate::errors::ExportError;

pub const MENU_PRINT: &str = "ningbo_duizhangdandayin.bmp";
pub const TARGET_PRINTER: &str = "target_printer.bmp";
pub const SAVE_AS_PDF_DEFAULT: &str = "save_as_pdf_default.bmp";
pub const SAVE_AS_PDF_HOVER: &str = "save_as_pdf_hover.bmp";
pub const SAVE_BUTTON: &str = "save_button.bmp";

/// Templates the print dialog cannot be driven without.
pub const PRINT_DIALOG_TEMPLATES: [&str; 4] = [
    TARGET_PRINTER,
    SAVE_AS_PDF_DEFAULT,
    SAVE_AS_PDF_HOVER,
    SAVE_BUTTON,
];

/// Every template the run may load.
pub const ALL_TEMPLATES: [&str; 5] = [
    MENU_PRINT,
    TARGET_PRINTER,
    SAVE_AS_PDF_DEFAULT,
    SAVE_AS_PDF_HOVER,
    SAVE_BUTTON,
];

#[derive(Debug, Clone)]
pub struct TemplateImage {
    pub name: String,
    pub path: PathBuf,
    pub pixels: GrayImage,
    pub threshold: f32,
}

impl TemplateImage {
    pub fn load(path: &Path, threshold: f32) -> Result<Self, ExportError> {
        let pixels = image::open(path)
            .map_err(|e| {
                ExportError::TemplateMissing(format!("cannot decode {}: {e}", path.display()))
            })?
            .to_luma8();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            path: path.to_path_buf(),
            pixels,
            threshold,
        })
    }

    pub fn from_pixels(name: &str, pixels: GrayImage, threshold: f32) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from(name),
            pixels,
            threshold,
        }
    }
}

/// Resolves template names against the resource directory with a fallback
/// to the configuration directory.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    resource_dir: PathBuf,
    fallback_dir: PathBuf,
    threshold: f32,
}

fn usable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

impl TemplateLibrary {
    pub fn new(resource_dir: PathBuf, fallback_dir: PathBuf, threshold: f32) -> Self {
        Self {
            resource_dir,
            fallback_dir,
            threshold,
        }
    }

    /// First existing, non-empty candidate for `name`.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        [self.resource_dir.join(name), self.fallback_dir.join(name)]
            .into_iter()
            .find(|candidate| usable(candidate))
    }

    pub fn load(&self, name: &str) -> Result<TemplateImage, ExportError> {
        let path = self.resolve(name).ok_or_else(|| {
            ExportError::TemplateMissing(format!(
                "{name} not found in {} or {}",
                self.resource_dir.display(),
                self.fallback_dir.display()
            ))
        })?;
        debug!(template = name, path = %path.display(), "loading template");
        TemplateImage::load(&path, self.threshold)
    }

    /// Fails listing every one of `names` that cannot be resolved.
    pub fn require(&self, names: &[&str]) -> Result<(), ExportError> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.resolve(name).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ExportError::TemplateMissing(missing.join(", ")))
        }
    }

    /// Loads every name and reports the outcome per template.
    pub fn check(&self, names: &[&str]) -> Vec<(String, Result<PathBuf, ExportError>)> {
        names
            .iter()
            .map(|name| {
                let outcome = self.load(name).map(|t| t.path);
                (name.to_string(), outcome)
            })
            .collect()
    }
}
