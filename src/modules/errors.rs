use derive_more::with_trait::Display;
use derive_more::{Error, From};

/// Every failure the console can report.
///
/// Transport and payload errors come from the network; `Rejected` is the
/// backend saying no; the rest are drift between the registry and whatever
/// is driving the console, and must never be swallowed.
#[derive(Debug, Display, Error, From)]
pub enum ConsoleError {
    #[display("transport failure: {_0}")]
    #[from]
    Transport(reqwest::Error),

    #[display("malformed payload: {_0}")]
    #[from]
    Payload(serde_json::Error),

    #[display("invalid url: {_0}")]
    #[from]
    Url(url::ParseError),

    #[display("io error: {_0}")]
    #[from]
    Io(std::io::Error),

    #[display("cannot read toml: {_0}")]
    #[from]
    TomlRead(toml::de::Error),

    #[display("cannot write toml: {_0}")]
    #[from]
    TomlWrite(toml::ser::Error),

    #[display("rejected by backend: {message}")]
    Rejected { message: String },

    #[display("unknown entity: {entity}")]
    UnknownEntity { entity: String },

    #[display("no table is active")]
    NoActiveTable,

    #[display("{entity} record {id} no longer exists, reload the table")]
    RecordGone { entity: String, id: i64 },

    #[display("form for {entity} has no control for field {field}")]
    MissingControl { entity: String, field: String },

    #[display("{field}: {value:?} is not a number")]
    InvalidNumber { field: String, value: String },

    #[display("registry error: {message}")]
    Registry { message: String },
}

impl ConsoleError {
    pub fn unknown_entity(entity: &str) -> Self {
        Self::UnknownEntity {
            entity: entity.to_string(),
        }
    }

    /// Registry/UI drift. Callers should fail loudly on these.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntity { .. }
                | Self::NoActiveTable
                | Self::MissingControl { .. }
                | Self::Registry { .. }
        )
    }
}
