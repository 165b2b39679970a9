//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for algotron.
#[derive(Debug, thiserror::Error)]
pub enum AlgotronError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("instrument {instrument} is not registered")]
    UnknownInstrument { instrument: String },

    #[error("unknown strategy kind: {kind}")]
    UnknownStrategy { kind: String },

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("missing price for {code} on {date}")]
    DataGap { code: String, date: NaiveDate },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("snapshot for {date} is not after previous snapshot {previous}")]
    SnapshotOrder { previous: NaiveDate, date: NaiveDate },

    #[error("checkpoint error: {reason}")]
    Checkpoint { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AlgotronError {
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        AlgotronError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        AlgotronError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn unknown_instrument(instrument: &str) -> Self {
        AlgotronError::UnknownInstrument {
            instrument: instrument.to_string(),
        }
    }

    /// True for errors that mean the run was mis-specified before any
    /// simulation started.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AlgotronError::ConfigParse { .. }
                | AlgotronError::ConfigMissing { .. }
                | AlgotronError::ConfigInvalid { .. }
                | AlgotronError::UnknownInstrument { .. }
                | AlgotronError::UnknownStrategy { .. }
        )
    }
}

impl From<&AlgotronError> for std::process::ExitCode {
    fn from(err: &AlgotronError) -> Self {
        let code: u8 = match err {
            AlgotronError::Io(_) => 1,
            AlgotronError::ConfigParse { .. }
            | AlgotronError::ConfigMissing { .. }
            | AlgotronError::ConfigInvalid { .. }
            | AlgotronError::UnknownInstrument { .. }
            | AlgotronError::UnknownStrategy { .. } => 2,
            AlgotronError::Checkpoint { .. } => 3,
            AlgotronError::SnapshotOrder { .. } => 4,
            AlgotronError::NoData { .. }
            | AlgotronError::DataGap { .. }
            | AlgotronError::DataSource { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
