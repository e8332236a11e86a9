//! The generic CRUD engine behind every settings tab.
//!
//! One [`CrudConsole`] owns one session: which entity is active, the rows last
//! fetched for it, the record being edited and the foreign-key option cache.
//! Every entity goes through the same operations, parameterised by its
//! [`EntityConfig`].

use std::collections::HashMap;
use std::thread;

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::modules::backend::SettingsBackend;
use crate::modules::errors::ConsoleError;
use crate::modules::registry::{self, EntityConfig, FieldKind, FieldSpec, STAT_ENTITIES};
use crate::modules::render::{
    self, FormView, SdBadge, SdStatusView, StatCounter, StatValue, TableView,
};
use crate::modules::types::{MutationOutcome, MutationResponse, Record};

pub const GENERAL_TAB: &str = "general";
const FALLBACK_ERROR: &str = "Unknown error";

/// Blocking prompts the console needs from whoever is driving it.
pub trait Interaction {
    fn confirm(&mut self, message: &str) -> bool;
    fn alert(&mut self, message: &str);
}

/// Raw value of one form control.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Text(String),
    Checked(bool),
}

/// Control values keyed by field key, as submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormInput {
    values: HashMap<String, InputValue>,
}

impl FormInput {
    pub fn set(&mut self, key: impl Into<String>, value: InputValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.values.get(key)
    }

    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, InputValue::Text(value.into()));
        self
    }

    /// Builds input from an HTML form post. Browsers leave unchecked
    /// checkboxes out entirely, so a missing toggle reads as off.
    pub fn from_submission(config: &EntityConfig, pairs: &HashMap<String, String>) -> Self {
        let mut input = FormInput::default();
        for field in config.fields {
            match (field.kind, pairs.get(field.key)) {
                (FieldKind::Toggle, value) => {
                    let on = value.is_some_and(|v| v != "false" && v != "off");
                    input.set(field.key, InputValue::Checked(on));
                }
                (_, Some(value)) => input.set(field.key, InputValue::Text(value.clone())),
                (_, None) => {}
            }
        }
        input
    }
}

/// Which panel the settings page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    General,
    Table(&'static str),
}

/// Turns one submitted control into the JSON the backend expects.
pub fn coerce(field: &FieldSpec, input: &InputValue) -> Result<Value, ConsoleError> {
    let text = match input {
        InputValue::Checked(on) => {
            return Ok(match field.kind {
                FieldKind::Toggle => Value::Bool(*on),
                _ => Value::String(on.to_string()),
            });
        }
        InputValue::Text(text) => text,
    };

    match field.kind {
        FieldKind::Toggle => Ok(Value::Bool(matches!(text.trim(), "on" | "true" | "1"))),
        FieldKind::Number => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(number_value)
                .ok_or_else(|| ConsoleError::InvalidNumber {
                    field: field.key.to_string(),
                    value: text.clone(),
                })
        }
        FieldKind::ForeignKey(_) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| ConsoleError::InvalidNumber {
                    field: field.key.to_string(),
                    value: text.clone(),
                })
        }
        FieldKind::Text | FieldKind::TextArea | FieldKind::Select(_) => {
            Ok(Value::String(text.trim().to_string()))
        }
    }
}

// Whole numbers go out as integers, so "16" is sent as 16 and not 16.0.
fn number_value(parsed: f64) -> Option<Value> {
    if parsed.is_finite()
        && parsed.fract() == 0.0
        && parsed >= i64::MIN as f64
        && parsed < i64::MAX as f64
    {
        return Some(Value::from(parsed as i64));
    }
    serde_json::Number::from_f64(parsed).map(Value::Number)
}

pub struct CrudConsole<B: SettingsBackend> {
    backend: B,
    panel: Panel,
    current_table: Option<&'static EntityConfig>,
    current_data: Vec<Record>,
    load_error: Option<String>,
    editing_id: Option<i64>,
    form: Option<FormView>,
    select_cache: HashMap<&'static str, Vec<Record>>,
}

impl<B: SettingsBackend> CrudConsole<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            panel: Panel::General,
            current_table: None,
            current_data: Vec::new(),
            load_error: None,
            editing_id: None,
            form: None,
            select_cache: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }

    pub fn current_table(&self) -> Option<&'static EntityConfig> {
        self.current_table
    }

    pub fn current_data(&self) -> &[Record] {
        &self.current_data
    }

    pub fn editing_id(&self) -> Option<i64> {
        self.editing_id
    }

    pub fn form(&self) -> Option<&FormView> {
        self.form.as_ref()
    }

    pub fn cached_sources(&self) -> usize {
        self.select_cache.len()
    }

    fn active(&self) -> Result<&'static EntityConfig, ConsoleError> {
        self.current_table.ok_or(ConsoleError::NoActiveTable)
    }

    /// Activates a tab. Entity tabs load their table; unknown names fail
    /// before any state changes.
    pub fn switch_tab(&mut self, name: &str) -> Result<Panel, ConsoleError> {
        if name == GENERAL_TAB {
            self.close_form();
            self.panel = Panel::General;
            return Ok(self.panel);
        }

        let config = registry::lookup(name)?;
        self.close_form();
        self.panel = Panel::Table(config.name);
        match self.load_table(name) {
            Ok(()) => {}
            // shown as the table's error banner
            Err(err) if !err.is_configuration() => {}
            Err(err) => return Err(err),
        }
        Ok(self.panel)
    }

    /// Fetches the rows of `name` and makes it the current table.
    ///
    /// A read failure keeps the previously displayed rows and records the
    /// error so the table view can show it.
    pub fn load_table(&mut self, name: &str) -> Result<(), ConsoleError> {
        let config = registry::lookup(name)?;
        if self.current_table.is_some_and(|c| c.name != config.name) {
            self.close_form();
            self.current_data.clear();
            self.load_error = None;
        }
        self.current_table = Some(config);

        let result = self.backend.list(config.name).and_then(|list| {
            if list.is_rejected() {
                Err(ConsoleError::Rejected {
                    message: list.message.unwrap_or_else(|| FALLBACK_ERROR.to_string()),
                })
            } else {
                Ok(list)
            }
        });

        match result {
            Ok(list) => {
                debug!("loaded {}: {list}", config.name);
                self.current_data = list.items;
                self.load_error = None;
                Ok(())
            }
            Err(err) => {
                error!("Table load error for {}: {err}", config.name);
                self.load_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn render_table(&self) -> Result<TableView, ConsoleError> {
        let config = self.active()?;
        Ok(render::table_view(config, &self.current_data, self.load_error.as_deref()))
    }

    /// Returns the records of `source`, fetching them at most once per cache
    /// epoch. A failed fetch is cached as an empty list.
    pub fn load_select_options(&mut self, source: &'static str) -> &[Record] {
        let backend = &self.backend;
        self.select_cache.entry(source).or_insert_with(|| {
            match backend.list(source) {
                Ok(list) => list.items,
                Err(err) => {
                    warn!("Cannot load options from {source}: {err}");
                    Vec::new()
                }
            }
        })
    }

    /// Opens the create form (`None`) or the edit form for a row of the
    /// current table.
    pub fn open_form(&mut self, id: Option<i64>) -> Result<&FormView, ConsoleError> {
        let config = self.active()?;

        let record = match id {
            Some(id) => Some(
                self.current_data
                    .iter()
                    .find(|r| r.id() == Some(id))
                    .cloned()
                    .ok_or_else(|| ConsoleError::RecordGone {
                        entity: config.name.to_string(),
                        id,
                    })?,
            ),
            None => None,
        };

        let view = self.build_form(config, record.as_ref());
        self.editing_id = id;
        Ok(self.form.insert(view))
    }

    /// Reopens a submitted form holding what the user sent. The edited row
    /// need not be among the loaded rows; the backend has the last word on
    /// whether it still exists.
    pub fn restore_form(&mut self, id: Option<i64>, input: &FormInput) -> Result<&FormView, ConsoleError> {
        let config = self.active()?;
        let record = id.map(|id| {
            self.current_data
                .iter()
                .find(|r| r.id() == Some(id))
                .cloned()
                .unwrap_or_else(|| Record::new().with("id", id))
        });

        let mut view = self.build_form(config, record.as_ref());
        view.apply_input(input);
        self.editing_id = id;
        Ok(self.form.insert(view))
    }

    fn build_form(&mut self, config: &EntityConfig, record: Option<&Record>) -> FormView {
        for source in config.sources() {
            self.load_select_options(source);
        }

        let cache = &self.select_cache;
        render::form_view(config, record, |source| {
            cache.get(source).map(Vec::as_slice).unwrap_or(&[])
        })
    }

    pub fn close_form(&mut self) {
        self.form = None;
        self.editing_id = None;
    }

    /// Collects `input` into a request body for the current table.
    pub fn build_body(&self, input: &FormInput) -> Result<Record, ConsoleError> {
        let config = self.active()?;
        let mut body = Record::new();
        for field in config.fields {
            let raw = input.get(field.key).ok_or_else(|| ConsoleError::MissingControl {
                entity: config.name.to_string(),
                field: field.key.to_string(),
            })?;
            body.insert(field.key.to_string(), coerce(field, raw)?);
        }
        Ok(body)
    }

    /// Creates (no `editing_id`) or updates the edited record.
    ///
    /// Rejections and transport failures are reported through `ui.alert`
    /// and leave the form open for another attempt. Configuration drift is
    /// returned as an error.
    pub fn save_form(
        &mut self,
        input: &FormInput,
        ui: &mut impl Interaction,
    ) -> Result<MutationOutcome, ConsoleError> {
        let config = self.active()?;
        let body = match self.build_body(input) {
            Ok(body) => body,
            Err(err @ ConsoleError::InvalidNumber { .. }) => {
                let message = err.to_string();
                ui.alert(&format!("Error: {message}"));
                return Ok(MutationOutcome::Rejected(message));
            }
            Err(err) => return Err(err),
        };

        let response = match self.editing_id {
            Some(id) => {
                info!("Updating {} #{id}", config.name);
                self.backend.update(config.name, id, &body)
            }
            None => {
                info!("Creating {} record", config.name);
                self.backend.create(config.name, &body)
            }
        };

        let outcome = self.settle(config, response, ui);
        if outcome == MutationOutcome::Applied {
            self.close_form();
            self.refresh(config);
        }
        Ok(outcome)
    }

    /// Deletes a row of the current table after `ui.confirm` agrees.
    pub fn delete_item(
        &mut self,
        id: i64,
        ui: &mut impl Interaction,
    ) -> Result<MutationOutcome, ConsoleError> {
        let config = self.active()?;
        if !ui.confirm("Are you sure you want to delete this record?") {
            debug!("Delete of {} #{id} cancelled", config.name);
            return Ok(MutationOutcome::Cancelled);
        }

        info!("Deleting {} #{id}", config.name);
        let response = self.backend.delete(config.name, id);
        let outcome = self.settle(config, response, ui);
        if outcome == MutationOutcome::Applied {
            self.refresh(config);
        }
        Ok(outcome)
    }

    fn settle(
        &mut self,
        config: &EntityConfig,
        response: Result<MutationResponse, ConsoleError>,
        ui: &mut impl Interaction,
    ) -> MutationOutcome {
        match response {
            Ok(resp) if resp.is_success() => {
                self.select_cache.clear();
                MutationOutcome::Applied
            }
            Ok(resp) => {
                let message = resp.message.unwrap_or_else(|| FALLBACK_ERROR.to_string());
                warn!("{} mutation rejected: {message}", config.name);
                ui.alert(&format!("Error: {message}"));
                MutationOutcome::Rejected(message)
            }
            Err(err) => {
                error!("{} mutation failed: {err}", config.name);
                let message = err.to_string();
                ui.alert(&format!("Error: {message}"));
                MutationOutcome::Rejected(message)
            }
        }
    }

    fn refresh(&mut self, config: &EntityConfig) {
        // failure already logged and kept as the table's error banner
        let _ = self.load_table(config.name);
    }

    /// Counts every entity concurrently; one failure only marks its own counter.
    pub fn load_general_stats(&self) -> Vec<StatCounter> {
        let backend = &self.backend;
        thread::scope(|scope| {
            let handles: Vec<_> = STAT_ENTITIES
                .iter()
                .map(|&entity| {
                    scope.spawn(move || {
                        let value = match backend.list(entity) {
                            Ok(list) => list.count.map(StatValue::Count).unwrap_or(StatValue::Missing),
                            Err(err) => {
                                warn!("Cannot count {entity}: {err}");
                                StatValue::Error
                            }
                        };
                        (entity, value)
                    })
                })
                .collect();

            handles
                .into_iter()
                .zip(STAT_ENTITIES)
                .map(|(handle, entity)| {
                    let value = handle.join().map(|(_, v)| v).unwrap_or(StatValue::Error);
                    StatCounter {
                        entity,
                        label: registry::lookup(entity).map(|c| c.label).unwrap_or(entity),
                        value,
                    }
                })
                .collect()
        })
    }

    pub fn check_sd_status(&self) -> SdStatusView {
        match self.backend.sd_status() {
            Ok(status) if status.connected => {
                info!("Image backend reachable: {status}");
                let models = if status.models.is_empty() {
                    "No models found".to_string()
                } else {
                    status.models.join(", ")
                };
                SdStatusView {
                    badge: SdBadge::Connected,
                    models: Some(models),
                }
            }
            Ok(_) => SdStatusView {
                badge: SdBadge::Disconnected,
                models: None,
            },
            Err(err) => {
                warn!("Image backend status failed: {err}");
                SdStatusView {
                    badge: SdBadge::Error,
                    models: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: FieldKind) -> FieldSpec {
        FieldSpec {
            key: "f",
            label: "F",
            kind,
            required: false,
            default: None,
        }
    }

    fn text(value: &str) -> InputValue {
        InputValue::Text(value.to_string())
    }

    #[test]
    fn blank_number_is_null() {
        assert_eq!(coerce(&field(FieldKind::Number), &text("  ")).unwrap(), Value::Null);
        assert_eq!(coerce(&field(FieldKind::Number), &text("7.5")).unwrap(), serde_json::json!(7.5));
    }

    #[test]
    fn whole_numbers_stay_integers() {
        let number = field(FieldKind::Number);
        let width = coerce(&number, &text("16")).unwrap();
        assert_eq!(width, Value::from(16));
        assert_eq!(serde_json::to_string(&width).unwrap(), "16");
        assert_eq!(serde_json::to_string(&coerce(&number, &text("-3.0")).unwrap()).unwrap(), "-3");
        assert_eq!(serde_json::to_string(&coerce(&number, &text("1e3")).unwrap()).unwrap(), "1000");
        assert_eq!(serde_json::to_string(&coerce(&number, &text("0.8")).unwrap()).unwrap(), "0.8");
        assert!(coerce(&number, &text("inf")).is_err());
    }

    #[test]
    fn garbage_number_is_refused() {
        let err = coerce(&field(FieldKind::Number), &text("wide")).unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidNumber { .. }));
    }

    #[test]
    fn toggle_is_always_boolean() {
        let toggle = field(FieldKind::Toggle);
        assert_eq!(coerce(&toggle, &InputValue::Checked(false)).unwrap(), Value::Bool(false));
        assert_eq!(coerce(&toggle, &text("on")).unwrap(), Value::Bool(true));
        assert_eq!(coerce(&toggle, &text("")).unwrap(), Value::Bool(false));
    }

    #[test]
    fn foreign_key_parses_id() {
        let fk = field(FieldKind::ForeignKey("ai_providers"));
        assert_eq!(coerce(&fk, &text("4")).unwrap(), Value::from(4));
        assert_eq!(coerce(&fk, &text("")).unwrap(), Value::Null);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            coerce(&field(FieldKind::TextArea), &text("  warm light \n")).unwrap(),
            Value::from("warm light")
        );
    }

    #[test]
    fn submission_treats_missing_checkbox_as_off() {
        let config = registry::lookup("ai_providers").unwrap();
        let mut pairs = HashMap::new();
        pairs.insert("name".to_string(), "Local".to_string());
        let input = FormInput::from_submission(config, &pairs);
        assert_eq!(input.get("enabled"), Some(&InputValue::Checked(false)));
        assert_eq!(input.get("name"), Some(&text("Local")));
        assert_eq!(input.get("key"), None);

        pairs.insert("enabled".to_string(), "on".to_string());
        let input = FormInput::from_submission(config, &pairs);
        assert_eq!(input.get("enabled"), Some(&InputValue::Checked(true)));
    }
}
