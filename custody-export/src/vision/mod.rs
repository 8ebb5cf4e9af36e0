//! Visual template matching against the live screen.

mod locator;
pub(crate) mod ncc;
mod screen;
mod template;

pub use locator::VisualLocator;
pub use ncc::{match_template, TemplateMatch};
pub use screen::{save_screenshot, ScreenDriver, ScreenPoint};
pub use template::{
    TemplateImage, TemplateLibrary, ALL_TEMPLATES, MENU_PRINT, PRINT_DIALOG_TEMPLATES,
    SAVE_AS_PDF_DEFAULT, SAVE_AS_PDF_HOVER, SAVE_BUTTON, TARGET_PRINTER,
};
