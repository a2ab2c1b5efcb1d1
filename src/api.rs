use std::future::Future;
use std::io::{self, BufRead, BufReader, Read};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::Url;
use tokio::runtime::Runtime;

use crate::form::{SubmissionPayload, IMAGES_FIELD};
use crate::protocol::{
    decode_callback_status, decode_poll_status, decode_submit_response, error_detail, PollStatus,
    SubmitResponse,
};
use crate::tones::ToneCatalog;

/// Longest a push-stream read waits on the server before handing control back to its reader.
pub const STREAM_READ_TICK: Duration = Duration::from_secs(1);

/// The backend as seen from the form: every HTTP exchange the client makes.
pub trait JobApi: Send + Sync {
    fn fetch_tones(&self) -> Result<ToneCatalog>;

    fn submit_job(&self, payload: &SubmissionPayload) -> Result<SubmitResponse>;

    /// Opens the server-push channel for a session; the reader yields raw event-stream lines.
    /// Reads on a quiet channel fail with `ErrorKind::TimedOut` so the caller can
    /// check for shutdown; the next read picks up where the last one stopped.
    fn open_messages(&self, session_id: &str) -> Result<Box<dyn BufRead + Send>>;

    fn video_status(&self, session_id: &str) -> Result<PollStatus>;

    fn video_callback(&self) -> Result<PollStatus>;
}

pub struct HttpJobApi {
    base: Url,
    client: Client,
}

impl HttpJobApi {
    pub fn new(server_url: &str) -> Result<Self> {
        let base = Url::parse(server_url)
            .with_context(|| format!("Invalid server URL {server_url}"))?;
        if base.cannot_be_a_base() {
            bail!("Server URL {server_url} cannot carry API paths");
        }
        Ok(Self {
            base,
            client: build_http_client()?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        endpoint_url(&self.base, segments)
    }
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(300))
        .build()
        .context("Could not initialize HTTP client")
}

type PendingResponse = Pin<Box<dyn Future<Output = reqwest::Result<reqwest::Response>> + Send>>;

enum StreamState {
    Connecting(PendingResponse),
    Open(reqwest::Response),
    Finished,
}

/// Push-stream body. The request runs on a private single-threaded runtime and
/// every read, whether it waits for the headers or the next chunk, gives up
/// after `STREAM_READ_TICK` with `ErrorKind::TimedOut` while the request stays
/// in flight. The server only sends its headers along with the first message,
/// so the open itself can take any number of ticks.
///
/// Dropping the stream drops the runtime, which closes the connection.
struct EventStream {
    url: Url,
    state: StreamState,
    chunk: Vec<u8>,
    offset: usize,
    runtime: Runtime,
}

impl EventStream {
    fn connect(url: Url) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Could not start the message stream runtime")?;
        let pending: PendingResponse = {
            let _entered = runtime.enter();
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .context("Could not initialize streaming HTTP client")?;
            Box::pin(
                client
                    .get(url.clone())
                    .header(ACCEPT, "text/event-stream")
                    .send(),
            )
        };
        Ok(Self {
            url,
            state: StreamState::Connecting(pending),
            chunk: Vec::new(),
            offset: 0,
            runtime,
        })
    }

    fn check_status(&self, response: reqwest::Response) -> io::Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = within_tick(&self.runtime, response.text())
            .and_then(Result::ok)
            .map(|body| error_detail(&body))
            .unwrap_or_else(|| String::from("unable to read error body"));
        Err(io::Error::other(format!("HTTP {status} for {}: {detail}", self.url)))
    }
}

/// Drives `future` for at most one tick. On timeout only this wait is dropped;
/// a borrowed future keeps its progress.
fn within_tick<F: Future>(runtime: &Runtime, future: F) -> Option<F::Output> {
    runtime
        .block_on(async { tokio::time::timeout(STREAM_READ_TICK, future).await })
        .ok()
}

fn read_tick() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "no message within the read tick")
}

impl Read for EventStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.chunk.len() {
            match std::mem::replace(&mut self.state, StreamState::Finished) {
                StreamState::Finished => return Ok(0),
                StreamState::Connecting(mut pending) => {
                    let Some(result) = within_tick(&self.runtime, pending.as_mut()) else {
                        self.state = StreamState::Connecting(pending);
                        return Err(read_tick());
                    };
                    let response = result.map_err(io::Error::other)?;
                    log::debug!("Message stream {} answered {}", self.url, response.status());
                    self.state = StreamState::Open(self.check_status(response)?);
                }
                StreamState::Open(mut response) => {
                    let Some(result) = within_tick(&self.runtime, response.chunk()) else {
                        self.state = StreamState::Open(response);
                        return Err(read_tick());
                    };
                    let Some(chunk) = result.map_err(io::Error::other)? else {
                        return Ok(0);
                    };
                    self.chunk = chunk.to_vec();
                    self.offset = 0;
                    self.state = StreamState::Open(response);
                }
            }
        }

        let available = &self.chunk[self.offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.offset += count;
        Ok(count)
    }
}

fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| anyhow!("Server URL {base} cannot carry API paths"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn ensure_success(response: Response, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| String::from("unable to read error body"));
    bail!("HTTP {status} for {url}: {}", error_detail(&body));
}

fn http_get_text(client: &Client, url: &Url) -> Result<String> {
    let response = client
        .get(url.clone())
        .header(ACCEPT, "application/json")
        .send()
        .with_context(|| format!("HTTP request failed for {url}"))?;
    ensure_success(response, url)?
        .text()
        .with_context(|| format!("Could not read response body from {url}"))
}

fn multipart_form(payload: &SubmissionPayload) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in &payload.fields {
        form = form.text(name.clone(), value.clone());
    }
    for image in &payload.images {
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(image.name.clone())
            .mime_str(&image.mime)
            .with_context(|| format!("Invalid MIME type {} for {}", image.mime, image.name))?;
        form = form.part(IMAGES_FIELD, part);
    }
    Ok(form)
}

impl JobApi for HttpJobApi {
    fn fetch_tones(&self) -> Result<ToneCatalog> {
        let url = self.endpoint(&["api", "get_tones_data"])?;
        let body = http_get_text(&self.client, &url)?;
        ToneCatalog::from_json(&body).with_context(|| format!("Invalid tone data from {url}"))
    }

    fn submit_job(&self, payload: &SubmissionPayload) -> Result<SubmitResponse> {
        let url = self.endpoint(&["api", "generate-video"])?;
        log::info!(
            "Submitting {} image(s) and {} field(s) to {url}",
            payload.images.len(),
            payload.fields.len()
        );
        let response = self
            .client
            .post(url.clone())
            .header(ACCEPT, "application/json")
            .multipart(multipart_form(payload)?)
            .send()
            .with_context(|| format!("HTTP request failed for {url}"))?;
        let body = ensure_success(response, &url)?
            .text()
            .with_context(|| format!("Could not read response body from {url}"))?;
        decode_submit_response(&body).with_context(|| format!("Unexpected response from {url}"))
    }

    fn open_messages(&self, session_id: &str) -> Result<Box<dyn BufRead + Send>> {
        let mut url = self.endpoint(&["api", "messages"])?;
        url.query_pairs_mut().append_pair("session_id", session_id);
        log::info!("Opening message stream {url}");
        let stream = EventStream::connect(url.clone())
            .with_context(|| format!("Could not open message stream {url}"))?;
        Ok(Box::new(BufReader::new(stream)))
    }

    fn video_status(&self, session_id: &str) -> Result<PollStatus> {
        let url = self.endpoint(&["api", "get_video_url", session_id])?;
        let body = http_get_text(&self.client, &url)?;
        decode_poll_status(&body).with_context(|| format!("Unexpected status from {url}"))
    }

    fn video_callback(&self) -> Result<PollStatus> {
        let url = self.endpoint(&["api", "video-callback"])?;
        let body = http_get_text(&self.client, &url)?;
        decode_callback_status(&body).with_context(|| format!("Unexpected status from {url}"))
    }
}
