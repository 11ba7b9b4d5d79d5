use std::env;

/// Settings of the CLI, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// `OPENAI_API_KEY`.
    pub api_key: String,
    /// `OPENAI_BASE_URL`.
    pub base_url: String,
    /// `OPENAI_MODEL`.
    pub model: String,
    /// `CODEACT_MAX_ITERS`, the agent's default if unset.
    pub max_iters: Option<usize>,
    /// `CODEACT_AUTHORIZED_IMPORTS`, comma separated.
    pub authorized_imports: Vec<String>,
    /// `CODEACT_VERBOSE`, defaults to `true`.
    pub verbose: bool,
}

/// Errors reading [`Settings`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable has a value that cannot be parsed.
    #[error("invalid value {value:?} for {name}")]
    Invalid {
        /// The name of the variable.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

impl Settings {
    /// Reads the settings from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings with `lookup` returning the value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required =
            |name: &'static str| lookup(name).ok_or(SettingsError::Missing(name));

        let max_iters = match lookup("CODEACT_MAX_ITERS") {
            Some(value) => Some(value.trim().parse().map_err(|_| {
                SettingsError::Invalid {
                    name: "CODEACT_MAX_ITERS",
                    value,
                }
            })?),
            None => None,
        };
        let authorized_imports = lookup("CODEACT_AUTHORIZED_IMPORTS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let verbose = match lookup("CODEACT_VERBOSE") {
            Some(value) => parse_flag(&value).ok_or(SettingsError::Invalid {
                name: "CODEACT_VERBOSE",
                value,
            })?,
            None => true,
        };

        Ok(Settings {
            api_key: required("OPENAI_API_KEY")?,
            base_url: required("OPENAI_BASE_URL")?,
            model: required("OPENAI_MODEL")?,
            max_iters,
            authorized_imports,
            verbose,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
