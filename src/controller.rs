use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use crate::api::JobApi;
use crate::form::{prepare_submission, FormFields};
use crate::launch::ClientConfig;
use crate::notifier::{NotifierHandle, NotifierUpdate, ProgressNotifier};
use crate::preview::{load_slot_image, LoadedImage};
use crate::presentation::Presentation;
use crate::protocol::{Facility, SubmitResponse};
use crate::shelf::{ImageShelf, ReadRequest, ShelfError, SlotId};
use crate::tones::ToneCatalog;

type ReadResult = (SlotId, Result<LoadedImage, String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    InProgress,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
}

/// Everything one form window owns: the image shelf, the form, the
/// in-flight submission and at most one progress notifier.
pub struct VideoFormController {
    config: ClientConfig,
    api: Arc<dyn JobApi>,
    notifier_strategy: Arc<dyn ProgressNotifier>,
    shelf: ImageShelf,
    pub form: FormFields,
    tones: ToneCatalog,
    presentation: Presentation,
    session: Option<Session>,
    notifier: Option<NotifierHandle>,
    submit_receiver: Option<Receiver<Result<SubmitResponse, String>>>,
    tones_receiver: Option<Receiver<Result<ToneCatalog, String>>>,
    read_sender: Sender<ReadResult>,
    read_receiver: Receiver<ReadResult>,
    alerts: VecDeque<String>,
    pub status_line: String,
}

impl VideoFormController {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn JobApi>,
        notifier_strategy: Arc<dyn ProgressNotifier>,
    ) -> Self {
        let (read_sender, read_receiver) = mpsc::channel::<ReadResult>();
        let mut presentation = Presentation::default();
        let form = FormFields::default();
        presentation.apply_platform(&form.platform);
        Self {
            shelf: ImageShelf::new(config.max_images),
            config,
            api,
            notifier_strategy,
            form,
            tones: ToneCatalog::default(),
            presentation,
            session: None,
            notifier: None,
            submit_receiver: None,
            tones_receiver: None,
            read_sender,
            read_receiver,
            alerts: VecDeque::new(),
            status_line: String::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn shelf(&self) -> &ImageShelf {
        &self.shelf
    }

    pub fn tones(&self) -> &ToneCatalog {
        &self.tones
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut Presentation {
        &mut self.presentation
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn active_notifier_session(&self) -> Option<&str> {
        self.notifier.as_ref().map(NotifierHandle::session_id)
    }

    pub fn is_submitting(&self) -> bool {
        self.submit_receiver.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.submit_receiver.is_some()
            || self.notifier.is_some()
            || self.tones_receiver.is_some()
            || self.shelf.has_pending_reads()
    }

    pub fn take_alert(&mut self) -> Option<String> {
        self.alerts.pop_front()
    }

    fn alert(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.alerts.push_back(message);
    }

    pub fn load_tones(&mut self) {
        if self.tones_receiver.is_some() {
            return;
        }
        let api = Arc::clone(&self.api);
        let (tx, rx) = mpsc::channel::<Result<ToneCatalog, String>>();
        thread::spawn(move || {
            let result = api.fetch_tones().map_err(|err| format!("{err:#}"));
            let _ = tx.send(result);
        });
        self.tones_receiver = Some(rx);
    }

    pub fn select_tone(&mut self, tone: &str) {
        self.form.voice.select_tone(&self.tones, tone);
    }

    pub fn select_age_gender(&mut self, age_gender: &str) {
        if !self.form.voice.select_age_gender(&self.tones, age_gender) {
            self.status_line = format!("'{age_gender}' is not offered for this tone.");
        }
    }

    pub fn select_platform(&mut self, platform: &str) {
        self.form.platform = platform.to_string();
        self.presentation.apply_platform(platform);
    }

    /// Picker selection: replaces the shelf, or rejects the whole batch.
    pub fn select_files(&mut self, paths: Vec<PathBuf>) {
        match self.shelf.select_files(paths) {
            Ok(requests) => self.dispatch_reads(requests),
            Err(err) => self.alert(err.to_string()),
        }
    }

    /// Files dropped onto the window from outside.
    pub fn drop_external_files(&mut self, paths: Vec<PathBuf>) {
        match self.shelf.append_files(paths) {
            Ok(requests) => self.dispatch_reads(requests),
            Err(ShelfError::DragInProgress) => {
                log::debug!("Ignoring external drop during an image drag");
            }
            Err(err) => self.alert(err.to_string()),
        }
    }

    fn dispatch_reads(&mut self, requests: Vec<ReadRequest>) {
        for request in requests {
            let tx = self.read_sender.clone();
            thread::spawn(move || {
                let result = load_slot_image(&request.path).map_err(|err| format!("{err:#}"));
                let _ = tx.send((request.slot, result));
            });
        }
    }

    pub fn reorder_images(&mut self, from: usize, to: usize) {
        if let Err(err) = self.shelf.reorder(from, to) {
            self.status_line = err.to_string();
        }
    }

    pub fn move_image_left(&mut self, index: usize) {
        if let Err(err) = self.shelf.move_left(index) {
            self.status_line = err.to_string();
        }
    }

    pub fn move_image_right(&mut self, index: usize) {
        if let Err(err) = self.shelf.move_right(index) {
            self.status_line = err.to_string();
        }
    }

    pub fn remove_image(&mut self, index: usize) {
        if let Err(err) = self.shelf.remove(index) {
            self.status_line = err.to_string();
        }
    }

    pub fn begin_image_drag(&mut self, index: usize) {
        if let Err(err) = self.shelf.begin_drag(index) {
            self.status_line = err.to_string();
        }
    }

    pub fn drop_image_onto(&mut self, index: usize) -> bool {
        self.shelf.drop_onto(index)
    }

    pub fn cancel_image_drag(&mut self) {
        self.shelf.cancel_drag();
    }

    pub fn submit(&mut self) {
        if self.submit_receiver.is_some() {
            self.status_line = "A submission is already in progress.".to_string();
            return;
        }

        let payload = match prepare_submission(
            &self.form,
            self.shelf.ordered_files(),
            self.shelf.capacity(),
            self.shelf.has_pending_reads(),
        ) {
            Ok(payload) => payload,
            Err(err) => {
                self.alert(err.to_string());
                return;
            }
        };

        self.stop_notifier();
        self.session = None;
        self.presentation.begin_submission();
        self.presentation.apply_platform(&self.form.platform);
        self.presentation.note(format!(
            "Submitting {} image(s) for {}...",
            payload.images.len(),
            self.form.platform
        ));
        self.status_line = "Submitting video request...".to_string();

        let api = Arc::clone(&self.api);
        let (tx, rx) = mpsc::channel::<Result<SubmitResponse, String>>();
        thread::spawn(move || {
            let result = api.submit_job(&payload).map_err(|err| format!("{err:#}"));
            let _ = tx.send(result);
        });
        self.submit_receiver = Some(rx);
    }

    fn stop_notifier(&mut self) {
        // Dropping the handle signals the worker and discards its pending updates.
        self.notifier = None;
    }

    fn start_notifier(&mut self, session_id: String) {
        self.stop_notifier();
        log::info!("Following progress of session {session_id}");
        self.session = Some(Session {
            id: session_id.clone(),
            status: SessionStatus::Pending,
        });
        self.notifier = Some(NotifierHandle::spawn(
            Arc::clone(&self.notifier_strategy),
            session_id,
        ));
    }

    /// Drains every worker channel; call once per frame.
    pub fn poll(&mut self) {
        self.poll_reads();
        self.poll_tones();
        self.poll_submission();
        self.poll_notifier();
    }

    fn poll_reads(&mut self) {
        while let Ok((slot, result)) = self.read_receiver.try_recv() {
            if let Err(err) = &result {
                log::warn!("Image read failed: {err}");
            }
            if !self.shelf.complete_read(slot, result) {
                log::debug!("Discarded read for a slot that no longer exists");
            }
        }
    }

    fn poll_tones(&mut self) {
        let Some(receiver) = self.tones_receiver.take() else {
            return;
        };
        match receiver.try_recv() {
            Ok(Ok(catalog)) => {
                self.tones = catalog;
                if self.form.voice.tone.is_empty() {
                    if let Some(first) = self.tones.tone_names().next().map(str::to_string) {
                        self.form.voice.select_tone(&self.tones, &first);
                    }
                }
            }
            Ok(Err(err)) => {
                self.status_line = format!("Could not load tones: {err}");
            }
            Err(TryRecvError::Empty) => self.tones_receiver = Some(receiver),
            Err(TryRecvError::Disconnected) => {
                self.status_line = "Tone loader disconnected.".to_string();
            }
        }
    }

    fn poll_submission(&mut self) {
        let Some(receiver) = self.submit_receiver.take() else {
            return;
        };
        match receiver.try_recv() {
            Ok(Ok(SubmitResponse::Finished { video_url })) => {
                self.status_line = "Video generated.".to_string();
                self.presentation.show_video(&video_url);
            }
            Ok(Ok(SubmitResponse::Accepted {
                session_id,
                message,
            })) => {
                if let Some(message) = message {
                    self.presentation.note(message);
                }
                self.status_line = format!("Job accepted (session {session_id}).");
                self.start_notifier(session_id);
            }
            Ok(Err(err)) => {
                self.status_line.clear();
                self.presentation.fail(&err);
                self.alert(format!("An error occurred while generating the video: {err}"));
            }
            Err(TryRecvError::Empty) => self.submit_receiver = Some(receiver),
            Err(TryRecvError::Disconnected) => {
                self.presentation.fail("submission worker disconnected");
                self.alert("Submission worker disconnected.");
            }
        }
    }

    fn poll_notifier(&mut self) {
        let mut updates = Vec::new();
        if let Some(handle) = self.notifier.as_mut() {
            while let Some(update) = handle.try_next() {
                updates.push(update);
            }
        }

        for update in updates {
            // A terminal update may already have torn the notifier down.
            if self.notifier.is_none() {
                break;
            }
            match update {
                NotifierUpdate::Event(event) => {
                    let Some(session) = self.session.as_mut() else {
                        continue;
                    };
                    if session.id != event.session_id {
                        log::debug!("Dropping event for stale session {}", event.session_id);
                        continue;
                    }
                    session.status = match event.facility {
                        Facility::Log => SessionStatus::InProgress,
                        Facility::Error => SessionStatus::Error,
                        Facility::Video => SessionStatus::Done,
                    };
                    self.presentation.apply(&event);
                    match event.facility {
                        Facility::Log => {}
                        Facility::Error => {
                            self.status_line = "Video generation failed.".to_string();
                            self.stop_notifier();
                        }
                        Facility::Video => {
                            self.status_line = "Video generated.".to_string();
                            self.stop_notifier();
                        }
                    }
                }
                NotifierUpdate::Failed(reason) => {
                    if let Some(session) = self.session.as_mut() {
                        session.status = SessionStatus::Error;
                    }
                    self.stop_notifier();
                    self.presentation.fail(&reason);
                    self.status_line = "Lost track of the video job.".to_string();
                    self.alert(reason);
                }
                NotifierUpdate::Closed => self.stop_notifier(),
            }
        }
    }
}
