//! Declarative description of every configuration entity the console manages.
//!
//! Each [`EntityConfig`] lists the columns shown in the table and the fields
//! shown in the create/edit form. Columns and fields are independent: a column
//! may show data no field edits (`id`), and most fields never appear as columns.

use std::collections::HashSet;

use derive_more::with_trait::Display;
use serde_json::Value;

use crate::modules::errors::ConsoleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextArea,
    Number,
    /// Fixed dropdown.
    Select(&'static [&'static str]),
    /// Dropdown filled from another entity's records; submits the record id.
    ForeignKey(&'static str),
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Int(i64),
    Bool(bool),
    Text(&'static str),
}

impl FieldDefault {
    pub fn to_value(self) -> Value {
        match self {
            FieldDefault::Int(v) => Value::from(v),
            FieldDefault::Bool(v) => Value::from(v),
            FieldDefault::Text(v) => Value::from(v),
        }
    }
}

#[derive(Debug, Clone, Copy, Display)]
#[display("{key} ({label})")]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<FieldDefault>,
}

impl FieldSpec {
    const fn new(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            required: false,
            default: None,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn default(mut self, value: FieldDefault) -> Self {
        self.default = Some(value);
        self
    }
}

/// How a column turns a record value into display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRender {
    Raw,
    /// Boolean shown as a Yes/No badge.
    YesNoBadge,
    /// Nested object shown by its `name`.
    RelatedName,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub class: Option<&'static str>,
    pub render: ColumnRender,
}

impl ColumnSpec {
    const fn new(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            class: None,
            render: ColumnRender::Raw,
        }
    }

    const fn id() -> Self {
        Self {
            key: "id",
            label: "ID",
            class: Some("col-id"),
            render: ColumnRender::Raw,
        }
    }

    const fn render(mut self, render: ColumnRender) -> Self {
        self.render = render;
        self
    }
}

#[derive(Debug, Clone, Copy, Display)]
#[display("{name} ({label})")]
pub struct EntityConfig {
    pub name: &'static str,
    pub label: &'static str,
    pub columns: &'static [ColumnSpec],
    pub fields: &'static [FieldSpec],
}

impl EntityConfig {
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Entities this one references through foreign-key fields.
    pub fn sources(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter_map(|f| match f.kind {
            FieldKind::ForeignKey(source) => Some(source),
            _ => None,
        })
    }
}

use FieldDefault::{Bool, Int};
use FieldKind::{ForeignKey, Number, Select, Text, TextArea, Toggle};

const SORT_ORDER: FieldSpec = FieldSpec::new("sort_order", "Sort Order", Number).default(Int(0));
const PROMPT_SNIPPET: FieldSpec = FieldSpec::new("prompt_snippet", "Prompt Snippet", TextArea);
const NEGATIVE_SNIPPET: FieldSpec = FieldSpec::new("negative_snippet", "Negative Snippet", TextArea);
const THUMBNAIL: FieldSpec = FieldSpec::new("thumbnail", "Thumbnail", Text);
const NAME: FieldSpec = FieldSpec::new("name", "Name", Text).required();
const KEY: FieldSpec = FieldSpec::new("key", "Key", Text).required();
const ICON: FieldSpec = FieldSpec::new("icon", "Icon", Text);
const DESCRIPTION: FieldSpec = FieldSpec::new("description", "Description", TextArea);
const ENABLED: FieldSpec = FieldSpec::new("enabled", "Active", Toggle).default(Bool(true));

const CATEGORISED_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::id(),
    ColumnSpec::new("name", "Name"),
    ColumnSpec::new("category", "Category"),
    ColumnSpec::new("subcategory", "Subcategory"),
    ColumnSpec::new("sort_order", "Sort Order"),
];

const CATEGORISED_FIELDS: &[FieldSpec] = &[
    NAME,
    FieldSpec::new("category", "Category", Text),
    FieldSpec::new("subcategory", "Subcategory", Text),
    PROMPT_SNIPPET,
    NEGATIVE_SNIPPET,
    THUMBNAIL,
    SORT_ORDER,
];

const SNIPPET_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::id(),
    ColumnSpec::new("name", "Name"),
    ColumnSpec::new("sort_order", "Sort Order"),
];

const SNIPPET_FIELDS: &[FieldSpec] = &[NAME, PROMPT_SNIPPET, NEGATIVE_SNIPPET, THUMBNAIL, SORT_ORDER];

static REGISTRY: &[EntityConfig] = &[
    EntityConfig {
        name: "styles",
        label: "Styles",
        columns: CATEGORISED_COLUMNS,
        fields: CATEGORISED_FIELDS,
    },
    EntityConfig {
        name: "scenes",
        label: "Scenes",
        columns: CATEGORISED_COLUMNS,
        fields: CATEGORISED_FIELDS,
    },
    EntityConfig {
        name: "perspectives",
        label: "Perspectives",
        columns: SNIPPET_COLUMNS,
        fields: SNIPPET_FIELDS,
    },
    EntityConfig {
        name: "lightings",
        label: "Lighting",
        columns: SNIPPET_COLUMNS,
        fields: SNIPPET_FIELDS,
    },
    EntityConfig {
        name: "ratios",
        label: "Aspect Ratios",
        columns: &[
            ColumnSpec::id(),
            ColumnSpec::new("name", "Name"),
            ColumnSpec::new("width", "Width"),
            ColumnSpec::new("height", "Height"),
            ColumnSpec::new("sort_order", "Sort Order"),
        ],
        fields: &[
            NAME,
            FieldSpec::new("width", "Width", Number).required(),
            FieldSpec::new("height", "Height", Number).required(),
            ICON,
            SORT_ORDER,
        ],
    },
    EntityConfig {
        name: "ai_providers",
        label: "AI Providers",
        columns: &[
            ColumnSpec::id(),
            ColumnSpec::new("name", "Name"),
            ColumnSpec::new("key", "Key"),
            ColumnSpec::new("type", "Type"),
            ColumnSpec::new("enabled", "Active").render(ColumnRender::YesNoBadge),
        ],
        fields: &[
            NAME,
            KEY,
            FieldSpec::new("type", "Type", Select(&["local", "cloud"])),
            FieldSpec::new("base_url", "API URL", Text),
            FieldSpec::new("api_key", "API Key", Text),
            DESCRIPTION,
            ICON,
            ENABLED,
            SORT_ORDER,
        ],
    },
    EntityConfig {
        name: "ai_models",
        label: "AI Models",
        columns: &[
            ColumnSpec::id(),
            ColumnSpec::new("name", "Name"),
            ColumnSpec::new("provider", "Provider").render(ColumnRender::RelatedName),
            ColumnSpec::new("type", "Type"),
            ColumnSpec::new("enabled", "Active").render(ColumnRender::YesNoBadge),
        ],
        fields: &[
            NAME,
            KEY,
            FieldSpec::new("provider_id", "Provider", ForeignKey("ai_providers")),
            FieldSpec::new(
                "type",
                "Type",
                Select(&["checkpoint", "controlnet", "adapter", "upscaler", "cloud_api"]),
            ),
            FieldSpec::new("api_model_id", "API Model ID", Text),
            DESCRIPTION,
            FieldSpec::new("default_steps", "Steps", Number),
            FieldSpec::new("default_cfg_scale", "CFG Scale", Number),
            FieldSpec::new("default_sampler", "Sampler", Text),
            FieldSpec::new("max_resolution", "Max Resolution", Number),
            FieldSpec::new("module", "CN Module", Text),
            FieldSpec::new("default_weight", "CN Weight", Number),
            FieldSpec::new("scale_factor", "Scale Factor", Number),
            ICON,
            ENABLED,
            SORT_ORDER,
        ],
    },
    EntityConfig {
        name: "modes",
        label: "Modes",
        columns: &[
            ColumnSpec::id(),
            ColumnSpec::new("name", "Name"),
            ColumnSpec::new("key", "Key"),
            ColumnSpec::new("controlnet_module", "CN Module"),
            ColumnSpec::new("controlnet_weight", "Weight"),
            ColumnSpec::new("denoising_strength", "Denoise"),
            ColumnSpec::new("sort_order", "Sort Order"),
        ],
        fields: &[
            NAME,
            KEY,
            DESCRIPTION,
            ICON,
            FieldSpec::new("controlnet_module", "ControlNet Module", Text),
            FieldSpec::new("controlnet_weight", "ControlNet Weight", Number),
            FieldSpec::new("denoising_strength", "Denoising Strength", Number),
            SORT_ORDER,
        ],
    },
];

/// Entity names in the order the general tab counts them.
pub const STAT_ENTITIES: [&str; 8] = [
    "styles",
    "scenes",
    "perspectives",
    "lightings",
    "ratios",
    "ai_providers",
    "ai_models",
    "modes",
];

pub fn registry() -> &'static [EntityConfig] {
    REGISTRY
}

pub fn lookup(name: &str) -> Result<&'static EntityConfig, ConsoleError> {
    REGISTRY
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| ConsoleError::unknown_entity(name))
}

/// Checks that every entry has fields, unique field keys, and foreign keys
/// pointing at entities that exist.
pub fn validate(entries: &[EntityConfig]) -> Result<(), ConsoleError> {
    let names: HashSet<&str> = entries.iter().map(|c| c.name).collect();
    if names.len() != entries.len() {
        return Err(ConsoleError::Registry {
            message: "duplicate entity name".to_string(),
        });
    }

    for config in entries {
        if config.fields.is_empty() {
            return Err(ConsoleError::Registry {
                message: format!("{} declares no fields", config.name),
            });
        }
        let mut keys = HashSet::new();
        for field in config.fields {
            if !keys.insert(field.key) {
                return Err(ConsoleError::Registry {
                    message: format!("{} declares {} twice", config.name, field.key),
                });
            }
        }
        for source in config.sources() {
            if !names.contains(source) {
                return Err(ConsoleError::Registry {
                    message: format!("{} references unknown entity {source}", config.name),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_registry_is_valid() {
        validate(registry()).unwrap();
        assert_eq!(registry().len(), 8);
    }

    #[test]
    fn stat_entities_are_registered() {
        for name in STAT_ENTITIES {
            assert!(lookup(name).is_ok(), "{name} missing");
        }
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let err = lookup("projects").unwrap_err();
        assert!(matches!(err, ConsoleError::UnknownEntity { .. }));
    }

    #[test]
    fn dangling_source_is_rejected() {
        static BROKEN: &[EntityConfig] = &[EntityConfig {
            name: "things",
            label: "Things",
            columns: &[],
            fields: &[FieldSpec::new("owner_id", "Owner", ForeignKey("owners"))],
        }];
        let err = validate(BROKEN).unwrap_err();
        assert!(err.to_string().contains("owners"));
    }

    #[test]
    fn empty_fields_are_rejected() {
        static EMPTY: &[EntityConfig] = &[EntityConfig {
            name: "things",
            label: "Things",
            columns: &[],
            fields: &[],
        }];
        assert!(validate(EMPTY).is_err());
    }

    #[test]
    fn ai_models_reference_providers() {
        let models = lookup("ai_models").unwrap();
        assert_eq!(models.sources().collect::<Vec<_>>(), vec!["ai_providers"]);
        assert_eq!(
            models.field("enabled").unwrap().default,
            Some(FieldDefault::Bool(true))
        );
    }
}
