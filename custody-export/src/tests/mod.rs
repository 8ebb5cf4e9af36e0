mod fake_page;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use tempfile::TempDir;

pub use fake_desktop::{FakeDialogs, FakeScreen, FakeWindow};
pub use fake_page::{FakeDom, FakeNode, FakePage, NodeId};
pub use portal::{FakePortal, PortalAccount};

use crate::config::{AppConfig, PortalCredentials};
use crate::dialog::SaveDialogController;
use crate::exports::ExportSet;
use crate::logging::{ExportLog, MemoryLogSink};
use crate::model::{AccountEntry, DateRange, ExportTarget};
use crate::session::PortalSession;
use crate::vision::ncc::fixtures::noise_patch;
use crate::vision::{
    TemplateLibrary, VisualLocator, MENU_PRINT, SAVE_AS_PDF_DEFAULT, SAVE_BUTTON, TARGET_PRINTER,
};

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

pub fn test_config(root: &Path) -> AppConfig {
    let mut config = AppConfig {
        portal: PortalCredentials {
            login_url: "https://portal.test/#/login".to_string(),
            username: "operator".to_string(),
            password: "secret".to_string(),
        },
        download_root: root.join("out"),
        base_dir: root.to_path_buf(),
        ..AppConfig::default()
    };
    config.browser.default_timeout_secs = 5;
    config
}

pub fn march_2025() -> DateRange {
    DateRange::parse("2025-03-01", "2025-03-31").unwrap()
}

/// Distinct, deterministic pixels for each template name.
pub fn template_patch(name: &str) -> GrayImage {
    let seed = name
        .bytes()
        .fold(2_166_136_261u32, |h, b| (h ^ b as u32).wrapping_mul(16_777_619));
    noise_patch(16, 12, seed)
}

/// Writes the named templates into the resource directory of `config`.
pub fn install_templates(config: &AppConfig, names: &[&str]) {
    let dir = config.resource_dir();
    std::fs::create_dir_all(&dir).unwrap();
    for name in names {
        template_patch(name).save(dir.join(name)).unwrap();
    }
}

/// Puts the print preview and its native save dialog on the fake desktop.
pub fn show_print_dialog(screen: &FakeScreen, dialogs: &FakeDialogs) {
    for (name, x, y) in [
        (TARGET_PRINTER, 10, 10),
        (SAVE_AS_PDF_DEFAULT, 60, 40),
        (SAVE_BUTTON, 120, 90),
    ] {
        screen.show(name, &template_patch(name), x, y);
    }
    dialogs.add_save_dialog(FakeWindow::save_dialog("另存为"));
}

pub fn memory_log() -> (ExportLog, MemoryLogSink) {
    let memory = MemoryLogSink::new();
    (ExportLog::new().with_sink(Arc::new(memory.clone())), memory)
}

pub fn build_exports(
    config: &AppConfig,
    screen: Arc<FakeScreen>,
    dialogs: Arc<FakeDialogs>,
    log: ExportLog,
) -> ExportSet {
    let visual = VisualLocator::new(screen, &config.matcher, log.clone());
    let templates = TemplateLibrary::new(
        config.resource_dir(),
        config.base_dir.clone(),
        config.matcher.threshold,
    );
    let dialogs = SaveDialogController::new(dialogs, &config.dialog, log.clone()).unwrap();
    ExportSet::new(config, visual, templates, dialogs, log)
}

/// A session and export set wired to in-memory fakes.
pub struct ExportFixture {
    pub page: Arc<FakePage>,
    pub session: PortalSession,
    pub exports: ExportSet,
    pub screen: Arc<FakeScreen>,
    pub dialogs: Arc<FakeDialogs>,
    pub config: AppConfig,
    pub log: MemoryLogSink,
    pub dir: TempDir,
}

pub fn export_fixture() -> ExportFixture {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let page = Arc::new(FakePage::new());
    let screen = Arc::new(FakeScreen::new(200, 120));
    let dialogs = Arc::new(FakeDialogs::new());
    let (log, memory) = memory_log();

    let session = PortalSession::new(
        page.clone(),
        config.layout.clone(),
        config.timeouts.clone(),
        Duration::from_secs(config.browser.default_timeout_secs),
        log.clone(),
    );
    let exports = build_exports(&config, screen.clone(), dialogs.clone(), log);

    ExportFixture {
        page,
        session,
        exports,
        screen,
        dialogs,
        config,
        log: memory,
        dir,
    }
}

impl ExportFixture {
    pub fn target(&self, project: &str, account: &str) -> ExportTarget {
        ExportTarget::new(
            &self.config.download_root,
            &AccountEntry::new(project, account),
            march_2025(),
        )
    }

    pub fn install_templates(&self, names: &[&str]) {
        install_templates(&self.config, names);
    }

    pub fn show_print_dialog(&self) {
        show_print_dialog(&self.screen, &self.dialogs);
    }

    /// Shows the print-menu template for the fallback path.
    pub fn show_menu_template(&self) {
        self.screen
            .show(MENU_PRINT, &template_patch(MENU_PRINT), 150, 10);
    }
}
