use serde::{Deserialize, Serialize};
use std::env::VarError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) const TOKEN_ENV_VAR: &str = "HF_TOKEN";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("failed to read config \"{}\"", .0.display())]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to parse {0}, it is not valid unicode")]
    TokenNotUnicode(&'static str),
}

#[derive(Deserialize, Serialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Keybindings {
    #[default]
    Emacs,
    Vi,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct Endpoint {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct Tutor {
    /// CEFR tag, e.g. "B1"
    pub level: Option<String>,
    /// Free-text system prompt, takes precedence over `level`
    pub persona: Option<String>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct Generation {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct Config {
    #[serde(default)]
    pub keybindings: Keybindings,
    #[serde(default)]
    pub endpoint: Endpoint,
    #[serde(default)]
    pub tutor: Tutor,
    #[serde(default)]
    pub generation: Generation,
}

impl Config {
    /// The API token from the config file, or from `HF_TOKEN`.
    pub(crate) fn api_key(&self) -> Result<Option<String>, Error> {
        if let Some(api_key) = &self.endpoint.api_key {
            return Ok(Some(api_key.clone()));
        }

        match std::env::var(TOKEN_ENV_VAR) {
            Ok(api_key) if !api_key.is_empty() => Ok(Some(api_key)),
            Ok(_) | Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(Error::TokenNotUnicode(TOKEN_ENV_VAR)),
        }
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.endpoint.timeout_secs.map(Duration::from_secs)
    }
}

fn get_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/professeur/config.toml", ".professeur.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/professeur.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn extra_fields_helper<'a>(
    path: &mut Vec<&'a str>,
    user_config: &'a toml::Table,
    config: &'a toml::Table,
    extra: &mut Vec<String>,
) {
    for (user_key, user_value) in user_config {
        path.push(user_key);

        match (user_value, config.get(user_key)) {
            (toml::Value::Table(user_value), Some(toml::Value::Table(config_value))) => {
                extra_fields_helper(path, user_value, config_value, extra)
            }
            (_, Some(_)) => {}
            (_, None) => extra.push(path.join(".")),
        }

        path.pop();
    }
}

/// Returns the dotted paths of keys present in `raw_config` which the parsed
/// config does not know about.
fn extra_fields(config: &Config, raw_config: &str) -> Result<Vec<String>, Error> {
    let user_config: toml::Table = toml::from_str(raw_config)?;

    // Unset options are skipped when serializing, so only known keys survive
    let known = match toml::Value::try_from(config) {
        Ok(toml::Value::Table(table)) => table,
        _ => toml::Table::new(),
    };

    let mut path = Vec::new();
    let mut extra = Vec::new();

    extra_fields_helper(&mut path, &user_config, &known, &mut extra);

    Ok(extra)
}

pub(crate) fn parse_config(raw_config: &str) -> Result<(Config, Vec<String>), Error> {
    let config: Config = toml::from_str(raw_config)?;

    let extra = extra_fields(&config, raw_config)?;

    Ok((config, extra))
}

fn read_config_file(path: &Path) -> Result<Config, Error> {
    let raw_config =
        std::fs::read_to_string(path).map_err(|e| Error::Read(path.to_path_buf(), e))?;

    let (config, extra) = parse_config(&raw_config)?;

    for key in extra {
        crate::warn!("config contains extraneous key \"{}\", ignoring", key);
    }

    tracing::debug!(path = %path.display(), "loaded config");

    Ok(config)
}

/// Reads the config at `config`, or the first one found in the default
/// locations. No config file at all is not an error.
pub(crate) fn read_config(config: Option<PathBuf>) -> Result<Config, Error> {
    match config.or_else(get_config_path) {
        Some(path) => read_config_file(&path),
        None => Ok(Config::default()),
    }
}
