use thiserror::Error;

/// Failures the import can name. Everything else (SQLite, HTTP, JSON) travels
/// as a plain `anyhow::Error` with context attached.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no modules added for monitoring in academic year {ay}, week {week}")]
    NoModulesFound { ay: u16, week: u8 },

    #[error("module {module_id} ends in unknown semester suffix {suffix:?}")]
    UnknownSemester { module_id: String, suffix: String },

    #[error("missing setting {0}")]
    MissingSetting(String),
}

/// Returns the `ImportError` kind behind `err`, if there is one.
pub fn import_error(err: &anyhow::Error) -> Option<&ImportError> {
    err.downcast_ref::<ImportError>()
}

/// `yes`/`y` in any case. Anything else, including the empty string, is false.
pub fn is_yes(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "yes" | "y")
}
