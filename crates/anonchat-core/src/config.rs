use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration for the chat client.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend function URL (single endpoint, `action`-dispatched).
    pub api_url: String,
    /// Address the app is reachable at; embedded in invite links.
    pub app_url: String,
    /// Text attached to invite links.
    pub invite_text: String,

    // Poll cadence
    pub poll_interval: Duration,
    pub invite_poll_interval: Duration,

    // HTTP
    pub request_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let api_url = env_str("CHAT_API_URL").and_then(non_empty).ok_or_else(|| {
            Error::Config("CHAT_API_URL environment variable is required".to_string())
        })?;

        let app_url = env_str("CHAT_APP_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://anonchat.app".to_string());
        let invite_text = env_str("CHAT_INVITE_TEXT")
            .and_then(non_empty)
            .unwrap_or_else(|| "Join the anonymous chat!".to_string());

        let poll_interval =
            Duration::from_millis(env_u64("CHAT_POLL_INTERVAL_MS").unwrap_or(3_000));
        let invite_poll_interval =
            Duration::from_millis(env_u64("CHAT_INVITE_POLL_INTERVAL_MS").unwrap_or(3_000));
        let request_timeout =
            Duration::from_millis(env_u64("CHAT_REQUEST_TIMEOUT_MS").unwrap_or(10_000));

        Ok(Self {
            api_url,
            app_url,
            invite_text,
            poll_interval,
            invite_poll_interval,
            request_timeout,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

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
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
