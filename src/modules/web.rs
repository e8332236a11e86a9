//! Server-rendered pages and the form posts behind them.
//!
//! A browser cannot answer `confirm()` or `alert()` mid-request, so posts
//! carry their confirmation in the form and alerts are collected for the
//! page that answers the post.

use std::collections::HashMap;

use askama::Template;
use log::{info, warn};
use url::Url;

use crate::modules::backend::SettingsBackend;
use crate::modules::chrome::{credits_placeholder, NavState};
use crate::modules::console::{CrudConsole, FormInput, Interaction, GENERAL_TAB};
use crate::modules::errors::ConsoleError;
use crate::modules::registry::{self, registry};
use crate::modules::render::{FormView, SdStatusView, StatCounter, TableView};
use crate::modules::theme::ThemeView;
use crate::modules::types::MutationOutcome;

pub const EDITING_ID_FIELD: &str = "__editing_id";
pub const FALLBACK_PAGE: &str = "/settings";

#[derive(Default)]
pub struct WebInteraction {
    confirmed: bool,
    alerts: Vec<String>,
}

impl WebInteraction {
    pub fn confirming(confirmed: bool) -> Self {
        Self {
            confirmed,
            alerts: Vec::new(),
        }
    }

    pub fn into_alerts(self) -> Vec<String> {
        self.alerts
    }
}

impl Interaction for WebInteraction {
    fn confirm(&mut self, _message: &str) -> bool {
        self.confirmed
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }
}

pub struct TabLink {
    pub name: &'static str,
    pub label: &'static str,
    pub active: bool,
}

impl TabLink {
    pub fn href(&self) -> String {
        if self.name == GENERAL_TAB {
            FALLBACK_PAGE.to_string()
        } else {
            format!("{FALLBACK_PAGE}/{}", self.name)
        }
    }
}

/// Everything the page shell shows around a panel.
pub struct PageChrome {
    pub theme: ThemeView,
    pub nav: NavState,
    pub credits: u32,
    pub tabs: Vec<TabLink>,
    pub alerts: Vec<String>,
}

impl PageChrome {
    pub fn new(active: &str, theme: ThemeView, nav: NavState) -> Self {
        let general = TabLink {
            name: GENERAL_TAB,
            label: "General",
            active: active == GENERAL_TAB,
        };
        let tabs = std::iter::once(general)
            .chain(registry().iter().map(|entry| TabLink {
                name: entry.name,
                label: entry.label,
                active: entry.name == active,
            }))
            .collect();

        Self {
            theme,
            nav,
            credits: credits_placeholder(),
            tabs,
            alerts: Vec::new(),
        }
    }

    pub fn with_alerts(mut self, alerts: Vec<String>) -> Self {
        self.alerts = alerts;
        self
    }
}

#[derive(Template)]
#[template(path = "general.html")]
pub struct GeneralPage {
    pub chrome: PageChrome,
    pub counters: Vec<StatCounter>,
    pub status: SdStatusView,
}

#[derive(Template)]
#[template(path = "table_page.html")]
pub struct TablePage {
    pub chrome: PageChrome,
    pub table: TableView,
}

#[derive(Template)]
#[template(path = "form_page.html")]
pub struct FormPage {
    pub chrome: PageChrome,
    pub table: TableView,
    pub form: FormView,
}

#[derive(Template)]
#[template(path = "confirm_delete.html")]
pub struct ConfirmDeletePage {
    pub chrome: PageChrome,
    pub entity: &'static str,
    pub label: &'static str,
    pub id: i64,
}

/// Reads the hidden field that marks a form as an edit.
pub fn editing_id(pairs: &HashMap<String, String>) -> Result<Option<i64>, ConsoleError> {
    match pairs.get(EDITING_ID_FIELD).map(|raw| raw.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ConsoleError::InvalidNumber {
                field: EDITING_ID_FIELD.to_string(),
                value: raw.to_string(),
            }),
    }
}

pub fn delete_confirmed(pairs: &HashMap<String, String>) -> bool {
    pairs.get("confirm").is_some_and(|v| v == "yes")
}

/// Where to send the browser after a post: the referring page when it is on
/// this host, the settings page otherwise.
pub fn back_target(referer: Option<&str>, host: Option<&str>) -> String {
    let Some(referer) = referer.map(str::trim).filter(|r| !r.is_empty()) else {
        return FALLBACK_PAGE.to_string();
    };

    if referer.starts_with('/') {
        let local = !referer.starts_with("//") && !referer.contains('\\');
        return if local { referer.to_string() } else { FALLBACK_PAGE.to_string() };
    }

    let Ok(url) = Url::parse(referer) else {
        return FALLBACK_PAGE.to_string();
    };
    let authority = match (url.host_str(), url.port()) {
        (Some(name), Some(port)) => format!("{name}:{port}"),
        (Some(name), None) => name.to_string(),
        (None, _) => return FALLBACK_PAGE.to_string(),
    };
    let same_host = host.is_some_and(|h| h.eq_ignore_ascii_case(&authority));
    if !matches!(url.scheme(), "http" | "https") || !same_host {
        warn!("Ignoring foreign referer {referer}");
        return FALLBACK_PAGE.to_string();
    }

    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

/// What a form post produced.
#[derive(Debug)]
pub enum SaveReply {
    Saved,
    /// The form goes back to the user with what they typed.
    Retry {
        table: TableView,
        form: FormView,
        alerts: Vec<String>,
    },
}

/// Handles a create/update post for `entity`. Anything short of an applied
/// save reopens the form with the submitted values and the alert text.
pub fn submit_form<B: SettingsBackend>(
    console: &mut CrudConsole<B>,
    entity: &str,
    pairs: &HashMap<String, String>,
) -> Result<SaveReply, ConsoleError> {
    let config = registry::lookup(entity)?;
    let id = editing_id(pairs)?;
    let input = FormInput::from_submission(config, pairs);
    let mut ui = WebInteraction::default();

    if console.current_table().map(|c| c.name) != Some(config.name) {
        if let Err(err) = console.load_table(config.name) {
            if err.is_configuration() {
                return Err(err);
            }
            ui.alert(&format!("Error: {err}"));
            let form = console.restore_form(id, &input)?.clone();
            return Ok(SaveReply::Retry {
                table: console.render_table()?,
                form,
                alerts: ui.into_alerts(),
            });
        }
    }

    let form = console.restore_form(id, &input)?.clone();
    match console.save_form(&input, &mut ui)? {
        MutationOutcome::Applied => {
            info!("Saved {} from the web form", config.name);
            Ok(SaveReply::Saved)
        }
        outcome => {
            warn!("Save of {} not applied: {outcome}", config.name);
            Ok(SaveReply::Retry {
                table: console.render_table()?,
                form,
                alerts: ui.into_alerts(),
            })
        }
    }
}

#[derive(Debug)]
pub enum DeleteReply {
    /// Deleted, or the post carried no confirmation.
    Done(MutationOutcome),
    Failed {
        table: TableView,
        alerts: Vec<String>,
    },
}

/// Handles a delete post. Only a post carrying `confirm=yes` reaches the
/// backend.
pub fn submit_delete<B: SettingsBackend>(
    console: &mut CrudConsole<B>,
    entity: &str,
    id: i64,
    pairs: &HashMap<String, String>,
) -> Result<DeleteReply, ConsoleError> {
    let config = registry::lookup(entity)?;
    if console.current_table().map(|c| c.name) != Some(config.name) {
        match console.load_table(config.name) {
            Ok(()) => {}
            // the delete itself does not need the rows
            Err(err) if !err.is_configuration() => {}
            Err(err) => return Err(err),
        }
    }

    let mut ui = WebInteraction::confirming(delete_confirmed(pairs));
    match console.delete_item(id, &mut ui)? {
        MutationOutcome::Rejected(message) => {
            warn!("Delete of {} #{id} rejected: {message}", config.name);
            Ok(DeleteReply::Failed {
                table: console.render_table()?,
                alerts: ui.into_alerts(),
            })
        }
        outcome => Ok(DeleteReply::Done(outcome)),
    }
}
