use std::sync::Arc;

use image::RgbaImage;

use crate::dialog::DialogBackend;
use crate::errors::ExportError;
use crate::vision::ScreenDriver;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(not(target_os = "windows"))]
mod unsupported;

/// The native half of a run: screen pixels, mouse and OS dialogs.
#[derive(Clone)]
pub struct Desktop {
    pub screen: Arc<dyn ScreenDriver>,
    pub dialogs: Arc<dyn DialogBackend>,
}

/// Captures the primary monitor.
pub(crate) fn capture_primary_monitor() -> Result<RgbaImage, ExportError> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| ExportError::Screen(format!("Failed to get monitors: {e}")))?;
    let mut primary_monitor: Option<xcap::Monitor> = None;
    for monitor in monitors {
        match monitor.is_primary() {
            Ok(true) => {
                primary_monitor = Some(monitor);
                break;
            }
            Ok(false) => continue,
            Err(e) => {
                return Err(ExportError::Screen(format!(
                    "Error checking monitor primary status: {e}"
                )));
            }
        }
    }
    let primary_monitor = primary_monitor
        .ok_or_else(|| ExportError::Screen("Could not find primary monitor".to_string()))?;

    primary_monitor
        .capture_image()
        .map_err(|e| ExportError::Screen(format!("Failed to capture screen: {e}")))
}

/// Creates the desktop backends for the current platform.
pub fn create_desktop() -> Result<Desktop, ExportError> {
    #[cfg(target_os = "windows")]
    {
        windows::create_desktop()
    }
    #[cfg(not(target_os = "windows"))]
    {
        unsupported::create_desktop()
    }
}
