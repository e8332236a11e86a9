//! Pure view models built from registry entries and records, plus their HTML.
//!
//! Nothing here performs I/O: the console builds a view, and whichever front
//! end is attached (the axum app, the CLI, a test) decides what to do with it.

use askama::Template;
use derive_more::with_trait::Display;
use log::error;
use serde_json::Value;

use crate::modules::console::{FormInput, InputValue};
use crate::modules::registry::{ColumnRender, EntityConfig, FieldKind};
use crate::modules::types::Record;

pub const PLACEHOLDER: &str = "-";
pub const EMPTY_CHOICE: &str = "-- Select --";

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCell {
    pub label: &'static str,
    pub class: Option<&'static str>,
}

impl HeaderCell {
    pub fn class_name(&self) -> &'static str {
        self.class.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellView {
    pub text: String,
    pub class: Option<&'static str>,
    /// `Some(on)` when the cell renders as a yes/no badge.
    pub badge: Option<bool>,
}

impl CellView {
    pub fn class_name(&self) -> &'static str {
        self.class.unwrap_or_default()
    }

    pub fn badge_state(&self) -> Option<&'static str> {
        self.badge.map(|on| if on { "on" } else { "off" })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub id: Option<i64>,
    pub cells: Vec<CellView>,
}

impl RowView {
    pub fn id_text(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub entity: &'static str,
    pub title: &'static str,
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<RowView>,
    pub error: Option<String>,
}

impl TableView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Input { value: String, numeric: bool },
    TextArea { value: String },
    Select { options: Vec<SelectOption> },
    ForeignKey { options: Vec<SelectOption> },
    Toggle { checked: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlView {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub kind: ControlKind,
}

impl ControlView {
    /// Which element the form draws: `input`, `textarea`, `select` or `toggle`.
    pub fn widget(&self) -> &'static str {
        match self.kind {
            ControlKind::Input { .. } => "input",
            ControlKind::TextArea { .. } => "textarea",
            ControlKind::Select { .. } | ControlKind::ForeignKey { .. } => "select",
            ControlKind::Toggle { .. } => "toggle",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, ControlKind::Input { numeric: true, .. })
    }

    pub fn input_type(&self) -> &'static str {
        if self.is_numeric() { "number" } else { "text" }
    }

    pub fn text(&self) -> &str {
        match &self.kind {
            ControlKind::Input { value, .. } | ControlKind::TextArea { value } => value,
            _ => "",
        }
    }

    pub fn options(&self) -> &[SelectOption] {
        match &self.kind {
            ControlKind::Select { options } | ControlKind::ForeignKey { options } => options,
            _ => &[],
        }
    }

    pub fn checked(&self) -> bool {
        matches!(self.kind, ControlKind::Toggle { checked: true })
    }

    pub fn toggle_text(&self) -> &'static str {
        toggle_label(self.checked())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormView {
    pub entity: &'static str,
    pub title: String,
    pub editing_id: Option<i64>,
    pub controls: Vec<ControlView>,
}

impl FormView {
    /// The values the controls hold right after rendering, as a user who
    /// touched nothing would submit them.
    pub fn to_input(&self) -> FormInput {
        let mut input = FormInput::default();
        for control in &self.controls {
            let value = match &control.kind {
                ControlKind::Input { value, .. } | ControlKind::TextArea { value } => {
                    InputValue::Text(value.clone())
                }
                // An unmatched fixed dropdown shows its first entry.
                ControlKind::Select { options } => InputValue::Text(
                    options
                        .iter()
                        .find(|o| o.selected)
                        .or_else(|| options.first())
                        .map(|o| o.value.clone())
                        .unwrap_or_default(),
                ),
                ControlKind::ForeignKey { options } => InputValue::Text(
                    options
                        .iter()
                        .find(|o| o.selected)
                        .map(|o| o.value.clone())
                        .unwrap_or_default(),
                ),
                ControlKind::Toggle { checked } => InputValue::Checked(*checked),
            };
            input.set(control.key, value);
        }
        input
    }

    /// Puts submitted values back into the controls, so a rejected form
    /// reopens with what the user typed.
    pub fn apply_input(&mut self, input: &FormInput) {
        for control in &mut self.controls {
            let Some(submitted) = input.get(control.key) else {
                continue;
            };
            match (&mut control.kind, submitted) {
                (ControlKind::Input { value, .. } | ControlKind::TextArea { value }, InputValue::Text(text)) => {
                    *value = text.clone();
                }
                (
                    ControlKind::Select { options } | ControlKind::ForeignKey { options },
                    InputValue::Text(text),
                ) => {
                    for option in options.iter_mut() {
                        option.selected = option.value == *text;
                    }
                }
                (ControlKind::Toggle { checked }, InputValue::Checked(on)) => *checked = *on,
                _ => {}
            }
        }
    }
}

pub fn toggle_label(checked: bool) -> &'static str {
    if checked { "Active" } else { "Inactive" }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StatValue {
    #[display("{_0}")]
    Count(u64),
    #[display("-")]
    Missing,
    #[display("Error")]
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatCounter {
    pub entity: &'static str,
    pub label: &'static str,
    pub value: StatValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SdBadge {
    #[display("Connected")]
    Connected,
    #[display("Not connected")]
    Disconnected,
    #[display("Error")]
    Error,
}

impl SdBadge {
    pub fn class(self) -> &'static str {
        match self {
            SdBadge::Connected => "status-badge online",
            SdBadge::Disconnected | SdBadge::Error => "status-badge offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SdStatusView {
    pub badge: SdBadge,
    /// Only refreshed while connected.
    pub models: Option<String>,
}

/// JavaScript-style truthiness, which is what the backend's flags rely on.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text of a scalar value as it appears in an input box.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn cell_view(render: ColumnRender, class: Option<&'static str>, value: Option<&Value>) -> CellView {
    let (text, badge) = match render {
        ColumnRender::Raw => match value {
            None | Some(Value::Null) => (PLACEHOLDER.to_string(), None),
            Some(v) => (value_text(v), None),
        },
        ColumnRender::YesNoBadge => {
            let on = value.is_some_and(truthy);
            ((if on { "Yes" } else { "No" }).to_string(), Some(on))
        }
        ColumnRender::RelatedName => (
            value
                .and_then(|v| v.get("name"))
                .map(value_text)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            None,
        ),
    };
    CellView { text, class, badge }
}

pub fn table_view(config: &EntityConfig, data: &[Record], error: Option<&str>) -> TableView {
    let headers = config
        .columns
        .iter()
        .map(|c| HeaderCell {
            label: c.label,
            class: c.class,
        })
        .collect();

    let rows = data
        .iter()
        .map(|record| RowView {
            id: record.id(),
            cells: config
                .columns
                .iter()
                .map(|c| cell_view(c.render, c.class, record.get(c.key)))
                .collect(),
        })
        .collect();

    TableView {
        entity: config.name,
        title: config.label,
        headers,
        rows,
        error: error.map(str::to_string),
    }
}

/// Builds the form for `record` (edit) or from field defaults (create).
/// `options` yields the records of a foreign-key source.
pub fn form_view<'a>(
    config: &EntityConfig,
    record: Option<&Record>,
    mut options: impl FnMut(&'static str) -> &'a [Record],
) -> FormView {
    let title = match record {
        Some(r) => match r.name() {
            Some(name) if !name.is_empty() => format!("Edit: {name}"),
            _ => format!("Edit: #{}", r.id().map(|id| id.to_string()).unwrap_or_default()),
        },
        None => "New record".to_string(),
    };

    let controls = config
        .fields
        .iter()
        .map(|field| {
            let value = match record {
                Some(r) => r.get(field.key).cloned().unwrap_or(Value::Null),
                None => field.default.map(|d| d.to_value()).unwrap_or(Value::Null),
            };
            let kind = match field.kind {
                FieldKind::Text => ControlKind::Input {
                    value: value_text(&value),
                    numeric: false,
                },
                FieldKind::Number => ControlKind::Input {
                    value: value_text(&value),
                    numeric: true,
                },
                FieldKind::TextArea => ControlKind::TextArea {
                    value: value_text(&value),
                },
                FieldKind::Select(choices) => ControlKind::Select {
                    options: choices
                        .iter()
                        .map(|choice| SelectOption {
                            value: choice.to_string(),
                            label: choice.to_string(),
                            selected: value.as_str() == Some(*choice),
                        })
                        .collect(),
                },
                FieldKind::ForeignKey(source) => {
                    let current = value_text(&value);
                    let mut opts = vec![SelectOption {
                        value: String::new(),
                        label: EMPTY_CHOICE.to_string(),
                        selected: current.is_empty(),
                    }];
                    opts.extend(options(source).iter().filter_map(|r| {
                        let id = r.id()?.to_string();
                        Some(SelectOption {
                            selected: id == current,
                            label: r.name().unwrap_or_default().to_string(),
                            value: id,
                        })
                    }));
                    ControlKind::ForeignKey { options: opts }
                }
                FieldKind::Toggle => ControlKind::Toggle {
                    checked: truthy(&value),
                },
            };
            ControlView {
                key: field.key,
                label: field.label,
                required: field.required,
                kind,
            }
        })
        .collect();

    FormView {
        entity: config.name,
        title,
        editing_id: record.and_then(Record::id),
        controls,
    }
}

/// Renders a template, falling back to an inline error so a page still loads.
pub fn render_html<T: Template>(template: T) -> String {
    template.render().unwrap_or_else(|err| {
        error!("Template error: {err}");
        format!("<pre>Template error: {err}</pre>")
    })
}

#[derive(Template)]
#[template(path = "_partials/table.html")]
pub struct TablePartial<'a> {
    pub table: &'a TableView,
}

#[derive(Template)]
#[template(path = "_partials/form.html")]
pub struct FormPartial<'a> {
    pub form: &'a FormView,
}

#[derive(Template)]
#[template(path = "_partials/stats.html")]
pub struct StatsPartial<'a> {
    pub counters: &'a [StatCounter],
}

#[derive(Template)]
#[template(path = "_partials/sd_status.html")]
pub struct SdStatusPartial<'a> {
    pub status: &'a SdStatusView,
}

pub fn table_html(view: &TableView) -> String {
    render_html(TablePartial { table: view })
}

pub fn form_html(view: &FormView) -> String {
    render_html(FormPartial { form: view })
}

pub fn stats_html(counters: &[StatCounter]) -> String {
    render_html(StatsPartial { counters })
}

pub fn sd_status_html(view: &SdStatusView) -> String {
    render_html(SdStatusPartial { status: view })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::registry::lookup;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn raw_cells_fall_back_to_placeholder() {
        assert_eq!(cell_view(ColumnRender::Raw, None, None).text, "-");
        assert_eq!(cell_view(ColumnRender::Raw, None, Some(&Value::Null)).text, "-");
        assert_eq!(cell_view(ColumnRender::Raw, None, Some(&json!(0))).text, "0");
        assert_eq!(cell_view(ColumnRender::Raw, None, Some(&json!(""))).text, "");
    }

    #[test]
    fn badge_and_related_renderers() {
        let on = cell_view(ColumnRender::YesNoBadge, None, Some(&json!(true)));
        assert_eq!((on.text.as_str(), on.badge), ("Yes", Some(true)));
        let off = cell_view(ColumnRender::YesNoBadge, None, None);
        assert_eq!((off.text.as_str(), off.badge), ("No", Some(false)));

        let provider = json!({"id": 1, "name": "ComfyUI"});
        assert_eq!(cell_view(ColumnRender::RelatedName, None, Some(&provider)).text, "ComfyUI");
        assert_eq!(cell_view(ColumnRender::RelatedName, None, Some(&Value::Null)).text, "-");
    }

    #[test]
    fn table_view_follows_column_order() {
        let config = lookup("ratios").unwrap();
        let data = vec![record(json!({"id": 3, "name": "Square", "width": 1, "height": 1}))];
        let view = table_view(config, &data, None);
        let labels: Vec<_> = view.headers.iter().map(|h| h.label).collect();
        assert_eq!(labels, vec!["ID", "Name", "Width", "Height", "Sort Order"]);
        let texts: Vec<_> = view.rows[0].cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["3", "Square", "1", "1", "-"]);
        assert_eq!(view.rows[0].id, Some(3));
    }

    #[test]
    fn create_form_uses_defaults() {
        let config = lookup("ai_providers").unwrap();
        let view = form_view(config, None, |_| &[]);
        assert_eq!(view.title, "New record");
        let input = view.to_input();
        assert_eq!(input.get("enabled"), Some(&InputValue::Checked(true)));
        assert_eq!(input.get("sort_order"), Some(&InputValue::Text("0".into())));
        // first fixed option is what a browser submits untouched
        assert_eq!(input.get("type"), Some(&InputValue::Text("local".into())));
    }

    #[test]
    fn edit_form_preselects_foreign_key() {
        let config = lookup("ai_models").unwrap();
        let providers = vec![
            record(json!({"id": 1, "name": "Local SD"})),
            record(json!({"id": 2, "name": "OpenAI"})),
        ];
        let model = record(json!({"id": 9, "name": "sdxl", "provider_id": 2, "type": "checkpoint"}));
        let view = form_view(config, Some(&model), |source| {
            assert_eq!(source, "ai_providers");
            &providers
        });
        assert_eq!(view.title, "Edit: sdxl");
        assert_eq!(view.editing_id, Some(9));
        let provider = view.controls.iter().find(|c| c.key == "provider_id").unwrap();
        let ControlKind::ForeignKey { options } = &provider.kind else {
            panic!("provider_id should be a foreign key");
        };
        assert_eq!(options[0].label, EMPTY_CHOICE);
        assert_eq!(options.len(), 3);
        assert!(options[2].selected && options[2].label == "OpenAI");
    }

    #[test]
    fn rejected_input_is_put_back() {
        let config = lookup("ai_providers").unwrap();
        let mut view = form_view(config, None, |_| &[]);
        let input = FormInput::default()
            .with_text("name", "Cloud GPU")
            .with_text("type", "cloud");
        view.apply_input(&input);
        let back = view.to_input();
        assert_eq!(back.get("name"), Some(&InputValue::Text("Cloud GPU".into())));
        assert_eq!(back.get("type"), Some(&InputValue::Text("cloud".into())));
        assert_eq!(back.get("enabled"), Some(&InputValue::Checked(true)));
    }

    #[test]
    fn html_escapes_record_text() {
        let config = lookup("styles").unwrap();
        let data = vec![record(json!({"id": 1, "name": "<b>Brutalist</b>"}))];
        let html = table_html(&table_view(config, &data, None));
        assert!(html.contains("&lt;b&gt;Brutalist&lt;/b&gt;"));
        assert!(!html.contains("<b>Brutalist"));
    }

    #[test]
    fn empty_table_shows_indicator() {
        let config = lookup("modes").unwrap();
        let html = table_html(&table_view(config, &[], Some("timeout")));
        assert!(html.contains(r#"id="tableEmpty""#));
        assert!(html.contains("Could not refresh: timeout"));
    }

    #[test]
    fn form_escapes_values_and_keeps_editing_id() {
        let config = lookup("styles").unwrap();
        let style = record(json!({"id": 4, "name": "Art \"Deco\" & co", "category": "interior"}));
        let html = form_html(&form_view(config, Some(&style), |_| &[]));
        assert!(html.contains(r#"name="__editing_id" value="4""#));
        assert!(html.contains("&amp; co"));
        assert!(!html.contains(r#""Deco""#));
        assert!(html.contains(r#"action="/settings/styles/save""#));
    }

    #[test]
    fn sd_status_shows_models_only_when_known() {
        let connected = SdStatusView {
            badge: SdBadge::Connected,
            models: Some("sdxl_base".into()),
        };
        let html = sd_status_html(&connected);
        assert!(html.contains("status-badge online"));
        assert!(html.contains("sdxl_base"));

        let offline = SdStatusView {
            badge: SdBadge::Disconnected,
            models: None,
        };
        let html = sd_status_html(&offline);
        assert!(html.contains("Not connected"));
        assert!(!html.contains("sdModels"));
    }

    #[test]
    fn stat_values_display() {
        assert_eq!(StatValue::Count(12).to_string(), "12");
        assert_eq!(StatValue::Missing.to_string(), "-");
        assert_eq!(StatValue::Error.to_string(), "Error");
    }
}
