use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{domain::UserId, errors::Error, Result};

/// Typed runtime configuration.
///
/// Sources, lowest precedence first: built-in defaults, the JSON owner file,
/// environment variables (a `.env` file in the working directory is loaded first
/// and never overrides variables that are already set).
#[derive(Clone, Debug)]
pub struct Config {
    // Identity / access
    pub bot_name: String,
    pub owner_jids: Vec<UserId>,
    pub owner_only_mode: bool,
    pub command_prefix: String,
    pub enable_debug_logs: bool,

    // Files
    pub settings_file: PathBuf,
    pub cleaned_messages_file: PathBuf,

    // Pacing
    pub broadcast_interval: Duration,
    pub relay_interval: Duration,

    // Gateway
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub poll_timeout: Duration,
}

/// On-disk owner configuration (`config.json`).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OwnerFile {
    owner_jids: Vec<String>,
    owner_only_mode: bool,
    bot_name: Option<String>,
    prefix: Option<String>,
    enable_debug_logs: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_str = |key: &str| var(key).and_then(non_empty);
        let env_bool = |key: &str| env_str(key).map(|s| parse_bool(&s));
        let env_u64 = |key: &str| env_str(key).and_then(|s| s.trim().parse::<u64>().ok());

        let config_file =
            PathBuf::from(env_str("WAB_CONFIG_FILE").unwrap_or_else(|| "config.json".to_string()));
        let file = read_owner_file(&config_file)?;

        // Owners: env list replaces the file list entirely.
        let owner_jids = env_str("WAB_OWNER_JIDS")
            .map(|v| parse_csv(&v))
            .unwrap_or(file.owner_jids)
            .iter()
            .map(|raw| UserId::normalize(raw))
            .collect::<Vec<_>>();
        if owner_jids.is_empty() {
            tracing::warn!("no owners configured; owner-only commands are unusable");
        }

        let owner_only_mode = env_bool("WAB_OWNER_ONLY_MODE").unwrap_or(file.owner_only_mode);
        let enable_debug_logs = env_bool("WAB_DEBUG_LOGS").unwrap_or(file.enable_debug_logs);
        let bot_name = env_str("WAB_BOT_NAME")
            .or(file.bot_name.and_then(non_empty))
            .unwrap_or_else(|| "WhatsApp Bot".to_string());
        let command_prefix = env_str("WAB_COMMAND_PREFIX")
            .or(file.prefix.and_then(non_empty))
            .unwrap_or_else(|| "!".to_string());

        let settings_file = PathBuf::from(
            env_str("WAB_SETTINGS_FILE").unwrap_or_else(|| "group_settings.json".to_string()),
        );
        let cleaned_messages_file = PathBuf::from(
            env_str("WAB_CLEANED_MESSAGES_FILE")
                .unwrap_or_else(|| "cleaned_messages.txt".to_string()),
        );

        let broadcast_interval =
            Duration::from_millis(env_u64("WAB_BROADCAST_INTERVAL_MS").unwrap_or(1000));
        let relay_interval =
            Duration::from_millis(env_u64("WAB_RELAY_INTERVAL_MS").unwrap_or(3000));

        let gateway_url = env_str("WAB_GATEWAY_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::Config("WAB_GATEWAY_URL environment variable is required".to_string())
            })?;
        let gateway_token = env_str("WAB_GATEWAY_TOKEN");
        let poll_timeout = Duration::from_secs(env_u64("WAB_POLL_TIMEOUT_SECS").unwrap_or(30));

        Ok(Self {
            bot_name,
            owner_jids,
            owner_only_mode,
            command_prefix,
            enable_debug_logs,
            settings_file,
            cleaned_messages_file,
            broadcast_interval,
            relay_interval,
            gateway_url,
            gateway_token,
            poll_timeout,
        })
    }
}

fn read_owner_file(path: &Path) -> Result<OwnerFile> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(OwnerFile::default());
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&contents)
        .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }
        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
