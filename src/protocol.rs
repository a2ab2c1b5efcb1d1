use std::fmt;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Log,
    Error,
    Video,
}

impl Facility {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Some(Self::Log),
            "error" => Some(Self::Error),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// `error` and `video` end the session's notification stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Video)
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Log => "log",
            Self::Error => "error",
            Self::Video => "video",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub session_id: String,
    pub facility: Facility,
    pub payload: String,
}

impl NotificationEvent {
    pub fn new(session_id: impl Into<String>, facility: Facility, payload: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            facility,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("notification message is empty")]
    Empty,
    #[error("notification message has no session id")]
    MissingSession,
    #[error("unknown notification facility '{0}'")]
    UnknownFacility(String),
    #[error("notification message '{0}' is not '<session> : <facility> : <payload>'")]
    Malformed(String),
    #[error("invalid JSON response: {0}")]
    Json(String),
    #[error("server reported an error: {0}")]
    Server(String),
    #[error("response carries neither a session id nor a video URL")]
    UnrecognizedResponse,
}

#[derive(Deserialize)]
struct StructuredMessage {
    session_id: String,
    #[serde(alias = "facility")]
    kind: String,
    #[serde(default)]
    payload: String,
}

/// Decodes one push-channel message body.
///
/// Accepts the structured form `{"session_id", "kind", "payload"}` and the
/// older delimited text `"<session> : <facility> : <payload>"`. Only the first
/// two separators split, so payloads may contain `:` (URLs do).
pub fn decode_notification(message: &str) -> Result<NotificationEvent, DecodeError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(DecodeError::Empty);
    }

    let (session_id, facility, payload) = if message.starts_with('{') {
        let structured = serde_json::from_str::<StructuredMessage>(message)
            .map_err(|err| DecodeError::Json(err.to_string()))?;
        (structured.session_id, structured.kind, structured.payload)
    } else {
        let mut parts = message.splitn(3, ':');
        let (Some(session_id), Some(facility), Some(payload)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(DecodeError::Malformed(message.to_string()));
        };
        (
            session_id.to_string(),
            facility.to_string(),
            payload.to_string(),
        )
    };

    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(DecodeError::MissingSession);
    }
    let facility_name = facility.trim();
    let facility = Facility::parse(facility_name)
        .ok_or_else(|| DecodeError::UnknownFacility(facility_name.to_string()))?;

    Ok(NotificationEvent {
        session_id: session_id.to_string(),
        facility,
        payload: payload.trim().to_string(),
    })
}

/// Incremental server-sent-events framing: `data:` lines accumulate until a
/// blank line dispatches them as one message.
#[derive(Debug, Default)]
pub struct SseFramer {
    data: Vec<String>,
}

impl SseFramer {
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        if field == "data" {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }

    /// Emits whatever is buffered, used when the stream ends without a trailing blank line.
    pub fn flush(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let message = self.data.join("\n");
        self.data.clear();
        Some(message)
    }
}

/// Immediate answer of `POST /api/generate-video`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    Finished {
        video_url: String,
    },
    Accepted {
        session_id: String,
        message: Option<String>,
    },
}

#[derive(Deserialize)]
struct SubmitResponseBody {
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub fn decode_submit_response(body: &str) -> Result<SubmitResponse, DecodeError> {
    let parsed = serde_json::from_str::<SubmitResponseBody>(body)
        .map_err(|err| DecodeError::Json(err.to_string()))?;

    if let Some(session_id) = non_empty(parsed.session_id) {
        return Ok(SubmitResponse::Accepted {
            session_id,
            message: non_empty(parsed.message),
        });
    }
    if let Some(video_url) = non_empty(parsed.video_url) {
        return Ok(SubmitResponse::Finished { video_url });
    }
    if let Some(error) = non_empty(parsed.error) {
        return Err(DecodeError::Server(error));
    }
    Err(DecodeError::UnrecognizedResponse)
}

/// Pulls a human readable reason out of an error body, falling back to the raw text.
pub fn error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => non_empty(parsed.error)
            .or_else(|| non_empty(parsed.message))
            .unwrap_or_else(|| body.trim().to_string()),
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Ready { video_url: String },
    Pending { status: String },
}

#[derive(Deserialize)]
struct PollStatusBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
}

/// `GET /api/get_video_url/<id>`: `{status: "success", video_url}` once ready.
pub fn decode_poll_status(body: &str) -> Result<PollStatus, DecodeError> {
    let parsed = serde_json::from_str::<PollStatusBody>(body)
        .map_err(|err| DecodeError::Json(err.to_string()))?;
    let status = parsed.status.unwrap_or_default();
    match non_empty(parsed.video_url) {
        Some(video_url) if status.eq_ignore_ascii_case("success") => {
            Ok(PollStatus::Ready { video_url })
        }
        _ => Ok(PollStatus::Pending { status }),
    }
}

/// `GET /api/video-callback`: `{video_url}` once ready, null or absent before.
pub fn decode_callback_status(body: &str) -> Result<PollStatus, DecodeError> {
    let parsed = serde_json::from_str::<PollStatusBody>(body)
        .map_err(|err| DecodeError::Json(err.to_string()))?;
    match non_empty(parsed.video_url) {
        Some(video_url) => Ok(PollStatus::Ready { video_url }),
        None => Ok(PollStatus::Pending {
            status: parsed.status.unwrap_or_else(|| "pending".to_string()),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
