//! Screen capture works anywhere xcap does; mouse input and native dialogs
//! are only implemented on Windows.

use std::sync::Arc;

use image::RgbaImage;

use super::{capture_primary_monitor, Desktop};
use crate::dialog::{DialogBackend, DialogWindow, TitleMatch};
use crate::errors::ExportError;
use crate::vision::{ScreenDriver, ScreenPoint};

fn unsupported(what: &str) -> ExportError {
    ExportError::UnsupportedPlatform(format!(
        "{what} is only implemented on Windows (running on {})",
        std::env::consts::OS
    ))
}

pub struct CaptureOnlyScreen;

impl ScreenDriver for CaptureOnlyScreen {
    fn capture(&self) -> Result<RgbaImage, ExportError> {
        capture_primary_monitor()
    }

    fn click_at(&self, _point: ScreenPoint) -> Result<(), ExportError> {
        Err(unsupported("mouse input"))
    }

    fn move_to(&self, _point: ScreenPoint) -> Result<(), ExportError> {
        Err(unsupported("mouse input"))
    }
}

pub struct NoDialogs;

impl DialogBackend for NoDialogs {
    fn top_level_windows(
        &self,
        _title: &TitleMatch,
    ) -> Result<Vec<Box<dyn DialogWindow>>, ExportError> {
        Err(unsupported("native dialog automation"))
    }
}

pub fn create_desktop() -> Result<Desktop, ExportError> {
    Ok(Desktop {
        screen: Arc::new(CaptureOnlyScreen),
        dialogs: Arc::new(NoDialogs),
    })
}
