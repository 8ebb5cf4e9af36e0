use std::fmt;
use std::path::Path;

use image::RgbaImage;

use crate::errors::ExportError;

/// Point in primary-screen pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for ScreenPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Pixel-level access to the desktop: what the matcher sees and where it clicks.
pub trait ScreenDriver: Send + Sync {
    /// Full capture of the primary monitor.
    fn capture(&self) -> Result<RgbaImage, ExportError>;

    fn click_at(&self, point: ScreenPoint) -> Result<(), ExportError>;

    fn move_to(&self, point: ScreenPoint) -> Result<(), ExportError>;
}

/// Writes a PNG capture of the screen to `path`.
pub fn save_screenshot(screen: &dyn ScreenDriver, path: &Path) -> Result<(), ExportError> {
    let image = screen.capture()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save(path)?;
    Ok(())
}
