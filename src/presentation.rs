use crate::form::PLATFORMS;
use crate::protocol::{Facility, NotificationEvent};

pub const PROGRESS_STEP: f32 = 10.0;
pub const PROGRESS_CAP: f32 = 90.0;
pub const LOG_MAX_LINES: usize = 500;
const LANDSCAPE_WIDTH_PERCENT: f32 = 80.0;
const PORTRAIT_WIDTH_PERCENT: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio {
    pub width: f32,
    pub height: f32,
}

impl AspectRatio {
    pub const WIDESCREEN: Self = Self {
        width: 16.0,
        height: 9.0,
    };

    pub fn is_portrait(self) -> bool {
        self.height > self.width
    }
}

/// Unrecognized platforms fall back to 16:9.
pub fn aspect_ratio_for_platform(platform: &str) -> AspectRatio {
    let platform = platform.trim();
    PLATFORMS
        .iter()
        .find(|(id, ..)| id.eq_ignore_ascii_case(platform))
        .map(|&(_, _, width, height)| AspectRatio {
            width: width as f32,
            height: height as f32,
        })
        .unwrap_or(AspectRatio::WIDESCREEN)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupSize {
    pub width_percent: f32,
    pub height: f32,
}

impl PopupSize {
    pub fn width(self, available_width: f32) -> f32 {
        available_width * self.width_percent / 100.0
    }
}

/// Popup player size for a ratio inside a viewport `available_width` points wide.
pub fn popup_size(ratio: AspectRatio, available_width: f32) -> PopupSize {
    let width_percent = if ratio.is_portrait() {
        PORTRAIT_WIDTH_PERCENT
    } else {
        LANDSCAPE_WIDTH_PERCENT
    };
    let width = available_width.max(0.0) * width_percent / 100.0;
    PopupSize {
        width_percent,
        height: width * ratio.height / ratio.width.max(1.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub kind: LogKind,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoPlayer {
    pub source: Option<String>,
    pub visible: bool,
    pub download_link: Option<String>,
    /// Set when a new source arrives; cleared once playback has been started.
    pub autoplay_pending: bool,
}

/// Progress bar, log panel and popup player, driven only by events.
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    progress: Option<f32>,
    log: Vec<LogLine>,
    player: VideoPlayer,
    ratio: AspectRatio,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            progress: None,
            log: Vec::new(),
            player: VideoPlayer::default(),
            ratio: AspectRatio::WIDESCREEN,
        }
    }
}

impl Presentation {
    /// Percent complete while the progress bar is shown.
    pub fn progress(&self) -> Option<f32> {
        self.progress
    }

    pub fn log_lines(&self) -> &[LogLine] {
        &self.log
    }

    pub fn player(&self) -> &VideoPlayer {
        &self.player
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.ratio
    }

    pub fn apply_platform(&mut self, platform: &str) {
        self.ratio = aspect_ratio_for_platform(platform);
    }

    pub fn begin_submission(&mut self) {
        self.log.clear();
        self.progress = Some(0.0);
        self.player = VideoPlayer::default();
    }

    pub fn apply(&mut self, event: &NotificationEvent) {
        match event.facility {
            Facility::Log => {
                self.append(LogKind::Info, event.payload.clone());
                let current = self.progress.unwrap_or(0.0);
                self.progress = Some((current + PROGRESS_STEP).min(PROGRESS_CAP));
            }
            Facility::Error => self.fail(&event.payload),
            Facility::Video => self.show_video(&event.payload),
        }
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.append(LogKind::Info, text.into());
    }

    pub fn fail(&mut self, reason: &str) {
        self.append(LogKind::Error, format!("Error: {reason}"));
        self.progress = None;
    }

    pub fn show_video(&mut self, url: &str) {
        self.progress = None;
        self.player = VideoPlayer {
            source: Some(url.to_string()),
            visible: true,
            download_link: Some(url.to_string()),
            autoplay_pending: true,
        };
        self.append(LogKind::Info, format!("Video ready: {url}"));
    }

    pub fn take_autoplay(&mut self) -> Option<String> {
        if !self.player.autoplay_pending {
            return None;
        }
        self.player.autoplay_pending = false;
        self.player.source.clone()
    }

    pub fn close_player(&mut self) {
        self.player.visible = false;
        self.player.autoplay_pending = false;
    }

    fn append(&mut self, kind: LogKind, text: String) {
        self.log.push(LogLine { kind, text });
        if self.log.len() > LOG_MAX_LINES {
            let excess = self.log.len() - LOG_MAX_LINES;
            self.log.drain(..excess);
        }
    }
}
