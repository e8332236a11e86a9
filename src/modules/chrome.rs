//! Page furniture shared by every page: the mobile nav drawer, notifications
//! and the generic JSON helper.

use derive_more::with_trait::Display;
use log::{error, info, warn};
use serde_json::Value;

use crate::modules::backend::SettingsBackend;

pub const DEFAULT_BREAKPOINT: u32 = 768;
const CREDITS_PLACEHOLDER: u32 = 68;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEvent {
    MenuButton,
    Backdrop,
    /// A nav link was followed at this viewport width.
    NavItem(u32),
    Resize(u32),
}

/// The drawer and its backdrop always open and close together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavState {
    open: bool,
    breakpoint: u32,
}

impl Default for NavState {
    fn default() -> Self {
        Self::new(DEFAULT_BREAKPOINT)
    }
}

impl NavState {
    pub fn new(breakpoint: u32) -> Self {
        Self {
            open: false,
            breakpoint,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn breakpoint(&self) -> u32 {
        self.breakpoint
    }

    pub fn nav_class(&self) -> &'static str {
        if self.open { "left-nav mobile-open" } else { "left-nav" }
    }

    pub fn overlay_class(&self) -> &'static str {
        if self.open { "mobile-overlay active" } else { "mobile-overlay" }
    }

    pub fn is_narrow(&self, width: u32) -> bool {
        width <= self.breakpoint
    }

    pub fn handle(&mut self, event: NavEvent) -> bool {
        match event {
            NavEvent::MenuButton => self.open = !self.open,
            NavEvent::Backdrop => self.open = false,
            NavEvent::NavItem(width) if self.is_narrow(width) => self.open = false,
            NavEvent::NavItem(_) => {}
            NavEvent::Resize(width) if !self.is_narrow(width) => self.open = false,
            NavEvent::Resize(_) => {}
        }
        self.open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum NoticeLevel {
    #[display("INFO")]
    Info,
    #[display("WARNING")]
    Warning,
    #[display("ERROR")]
    Error,
}

/// Notifications are log lines for now; the last one is kept so a page can
/// show it.
#[derive(Debug, Default)]
pub struct Notifier {
    last: Option<(NoticeLevel, String)>,
}

impl Notifier {
    pub fn show_notification(&mut self, message: &str, level: NoticeLevel) {
        match level {
            NoticeLevel::Info => info!("[{level}] {message}"),
            NoticeLevel::Warning => warn!("[{level}] {message}"),
            NoticeLevel::Error => error!("[{level}] {message}"),
        }
        self.last = Some((level, message.to_string()));
    }

    pub fn last(&self) -> Option<(NoticeLevel, &str)> {
        self.last.as_ref().map(|(level, msg)| (*level, msg.as_str()))
    }

    pub fn preset_selected(&mut self, preset: &str) {
        info!("Preset selected: {preset}");
        self.show_notification(&format!("Applying preset \"{preset}\"..."), NoticeLevel::Info);
    }

    pub fn project_opened(&self, project: &str) {
        info!("Opening project: {project}");
    }
}

/// Credit counter shown in the header until the backend serves one.
pub fn credits_placeholder() -> u32 {
    CREDITS_PLACEHOLDER
}

/// POSTs `data` as JSON; failures are logged, notified and turned into `None`.
pub fn call_api(
    backend: &impl SettingsBackend,
    notifier: &mut Notifier,
    endpoint: &str,
    data: &Value,
) -> Option<Value> {
    match backend.post_json(endpoint, data) {
        Ok(value) => Some(value),
        Err(err) => {
            error!("API Error: {err}");
            notifier.show_notification("Something went wrong", NoticeLevel::Error);
            None
        }
    }
}
