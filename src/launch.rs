use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const SERVER_ENV_VAR: &str = "SUNFIRE_SERVER";
pub const DEFAULT_MAX_IMAGES: usize = 6;
pub const LEGACY_MAX_IMAGES: usize = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_ATTEMPTS: u32 = 60;

/// How progress for an accepted job is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    /// Server-sent events on `/api/messages`.
    Push,
    /// `/api/get_video_url/<session_id>`.
    Poll,
    /// `/api/video-callback`, the earliest polling endpoint.
    Callback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub notifier: NotifierKind,
    pub max_images: usize,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            notifier: NotifierKind::Push,
            max_images: DEFAULT_MAX_IMAGES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

pub fn parse_client_config_from_args(
    args: &[String],
    env_server: Option<String>,
) -> Result<ClientConfig, String> {
    let mut config = ClientConfig::default();
    if let Some(server) = env_server.filter(|value| !value.trim().is_empty()) {
        config.server_url = normalize_server_url(&server)?;
    }

    let mut index = 0usize;
    while index < args.len() {
        let (flag, inline_value) = match args[index].split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (args[index].as_str(), None),
        };

        let mut take_value = |name: &str| -> Result<String, String> {
            if let Some(value) = inline_value.clone() {
                return Ok(value);
            }
            index += 1;
            args.get(index)
                .cloned()
                .ok_or_else(|| format!("Missing value after {name}."))
        };

        match flag {
            "--server" => {
                let value = take_value("--server")?;
                config.server_url = normalize_server_url(&value)?;
            }
            "--notifier" => {
                let value = take_value("--notifier")?;
                config.notifier = parse_notifier_kind(&value)?;
            }
            "--max-images" => {
                let value = take_value("--max-images")?;
                let parsed = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| "max-images must be 5 or 6.".to_string())?;
                if parsed != LEGACY_MAX_IMAGES && parsed != DEFAULT_MAX_IMAGES {
                    return Err("max-images must be 5 or 6.".to_string());
                }
                config.max_images = parsed;
            }
            "--poll-interval-secs" => {
                let value = take_value("--poll-interval-secs")?;
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| "poll-interval-secs must be a positive integer.".to_string())?;
                config.poll_interval = Duration::from_secs(secs);
            }
            "--poll-attempts" => {
                let value = take_value("--poll-attempts")?;
                config.poll_attempts = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|attempts| *attempts > 0)
                    .ok_or_else(|| "poll-attempts must be a positive integer.".to_string())?;
            }
            other => return Err(format!("Unrecognized argument '{other}'.")),
        }
        index += 1;
    }

    Ok(config)
}

fn parse_notifier_kind(value: &str) -> Result<NotifierKind, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "push" | "sse" | "messages" => Ok(NotifierKind::Push),
        "poll" | "status" => Ok(NotifierKind::Poll),
        "callback" | "video-callback" => Ok(NotifierKind::Callback),
        other => Err(format!(
            "Unknown notifier '{other}'; expected push, poll or callback."
        )),
    }
}

pub fn normalize_server_url(value: &str) -> Result<String, String> {
    let trimmed = strip_query_and_fragment(value.trim())
        .trim()
        .trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("Server URL is empty.".to_string());
    }

    if let Some((scheme, rest)) = trimmed.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(format!("Server URL scheme '{scheme}' is not supported."));
        }
        if rest.is_empty() {
            return Err("Server URL has no host.".to_string());
        }
        return Ok(format!("{scheme}://{rest}"));
    }

    Ok(format!("http://{trimmed}"))
}

fn strip_query_and_fragment(value: &str) -> &str {
    let query_index = value.find('?').unwrap_or(value.len());
    let fragment_index = value.find('#').unwrap_or(value.len());
    &value[..query_index.min(fragment_index)]
}
