use std::sync::Arc;

use image::RgbaImage;
use regex::Regex;
use tracing::debug;
use uiautomation::controls::ControlType;
use uiautomation::inputs::Mouse;
use uiautomation::patterns;
use uiautomation::types::Point;
use uiautomation::{UIAutomation, UIElement};

use super::{capture_primary_monitor, Desktop};
use crate::dialog::{DialogBackend, DialogWindow, TitleMatch};
use crate::errors::ExportError;
use crate::vision::{ScreenDriver, ScreenPoint};

// Dialog windows are owned by the browser window, so look one level below
// the desktop's children as well.
const WINDOW_SEARCH_DEPTH: u32 = 3;
const CONTROL_SEARCH_DEPTH: u32 = 12;
const MATCHER_TIMEOUT_MS: u64 = 200;
// The common file dialog's file-name box.
const FILE_NAME_EDIT_ID: &str = "1001";

fn platform_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::Dialog(e.to_string())
}

// thread-safety
#[derive(Clone)]
pub struct ThreadSafeWinUIAutomation(pub Arc<UIAutomation>);

// send and sync for wrapper
unsafe impl Send for ThreadSafeWinUIAutomation {}
unsafe impl Sync for ThreadSafeWinUIAutomation {}

/// Thread-safe wrapper for UIElement
#[derive(Clone)]
pub struct ThreadSafeWinUIElement(pub Arc<UIElement>);

unsafe impl Send for ThreadSafeWinUIElement {}
unsafe impl Sync for ThreadSafeWinUIElement {}

pub struct WindowsScreen;

impl ScreenDriver for WindowsScreen {
    fn capture(&self) -> Result<RgbaImage, ExportError> {
        capture_primary_monitor()
    }

    fn click_at(&self, point: ScreenPoint) -> Result<(), ExportError> {
        let mouse = Mouse::default();
        debug!("clicking at screen point {point}");
        mouse
            .click(Point::new(point.x, point.y))
            .map_err(|e| ExportError::Screen(e.to_string()))
    }

    fn move_to(&self, point: ScreenPoint) -> Result<(), ExportError> {
        let mouse = Mouse::default();
        mouse
            .move_to(Point::new(point.x, point.y))
            .map_err(|e| ExportError::Screen(e.to_string()))
    }
}

pub struct WindowsDialogs {
    automation: ThreadSafeWinUIAutomation,
}

impl WindowsDialogs {
    pub fn new() -> Result<Self, ExportError> {
        let automation = UIAutomation::new().map_err(|e| {
            ExportError::UnsupportedPlatform(format!("UI Automation unavailable: {e}"))
        })?;
        Ok(Self {
            automation: ThreadSafeWinUIAutomation(Arc::new(automation)),
        })
    }
}

impl DialogBackend for WindowsDialogs {
    fn top_level_windows(
        &self,
        title: &TitleMatch,
    ) -> Result<Vec<Box<dyn DialogWindow>>, ExportError> {
        let root = self.automation.0.get_root_element().map_err(platform_error)?;
        let wanted = title.clone();
        let found = self
            .automation
            .0
            .create_matcher()
            .from_ref(&root)
            .control_type(ControlType::Window)
            .depth(WINDOW_SEARCH_DEPTH)
            .timeout(MATCHER_TIMEOUT_MS)
            .filter_fn(Box::new(move |e: &UIElement| {
                Ok(e.get_name().map(|n| wanted.matches(&n)).unwrap_or(false))
            }))
            .find_all()
            // the matcher reports "nothing found" as an error
            .unwrap_or_default();
        debug!("found {} windows matching {:?}", found.len(), title);

        Ok(found
            .into_iter()
            .map(|element| {
                Box::new(WindowsDialogWindow {
                    automation: self.automation.clone(),
                    element: ThreadSafeWinUIElement(Arc::new(element)),
                }) as Box<dyn DialogWindow>
            })
            .collect())
    }
}

pub struct WindowsDialogWindow {
    automation: ThreadSafeWinUIAutomation,
    element: ThreadSafeWinUIElement,
}

impl WindowsDialogWindow {
    fn controls(&self, control_type: ControlType) -> Vec<UIElement> {
        self.automation
            .0
            .create_matcher()
            .from_ref(&self.element.0)
            .control_type(control_type)
            .depth(CONTROL_SEARCH_DEPTH)
            .timeout(MATCHER_TIMEOUT_MS)
            .find_all()
            .unwrap_or_default()
    }
}

impl DialogWindow for WindowsDialogWindow {
    fn title(&self) -> String {
        self.element.0.get_name().unwrap_or_default()
    }

    fn focus(&self) -> Result<(), ExportError> {
        self.element.0.set_focus().map_err(platform_error)
    }

    fn set_edit_text(&self, text: &str) -> Result<(), ExportError> {
        let edits = self.controls(ControlType::Edit);
        let edit = edits
            .iter()
            .find(|e| e.get_automation_id().is_ok_and(|id| id == FILE_NAME_EDIT_ID))
            .or_else(|| edits.first())
            .ok_or_else(|| ExportError::Dialog("save dialog has no edit control".to_string()))?;

        debug!("setting file name to {text}");
        let value = edit
            .get_pattern::<patterns::UIValuePattern>()
            .map_err(|e| ExportError::Dialog(format!("Failed to get ValuePattern: {e}")))?;
        value.set_value(text).map_err(platform_error)
    }

    fn click_button(&self, name: &Regex) -> Result<(), ExportError> {
        let button = self
            .controls(ControlType::Button)
            .into_iter()
            .find(|b| b.get_name().is_ok_and(|n| name.is_match(&n)))
            .ok_or_else(|| {
                ExportError::Dialog(format!("no button matching '{}' in '{}'", name, self.title()))
            })?;

        match button.get_pattern::<patterns::UIInvokePattern>() {
            Ok(invoke) => invoke.invoke().map_err(platform_error),
            Err(e) => {
                debug!("InvokePattern unavailable ({e}), clicking instead");
                button.click().map_err(platform_error)
            }
        }
    }
}

pub fn create_desktop() -> Result<Desktop, ExportError> {
    Ok(Desktop {
        screen: Arc::new(WindowsScreen),
        dialogs: Arc::new(WindowsDialogs::new()?),
    })
}
