use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use eframe::egui::{self, ResizeDirection, Sense, TextureHandle, TextureOptions, ViewportCommand};
use reqwest::Url;

use crate::controller::VideoFormController;
use crate::form::PLATFORMS;
use crate::presentation::{popup_size, LogKind};
use crate::shelf::{SlotContent, SlotId};

const APP_TITLE: &str = "Sunfire Studio";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const SLOT_THUMB_SIZE: f32 = 96.0;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShelfAction {
    MoveLeft(usize),
    MoveRight(usize),
    Remove(usize),
    BeginDrag(usize),
    DropOnto(usize),
    CancelDrag,
}

pub struct SunfireApp {
    controller: VideoFormController,
    thumbnails: HashMap<SlotId, TextureHandle>,
    alert: Option<String>,
}

impl SunfireApp {
    pub fn new(mut controller: VideoFormController, initial_status: Option<String>) -> Self {
        controller.load_tones();
        if let Some(status) = initial_status {
            controller.status_line = status;
        }
        Self {
            controller,
            thumbnails: HashMap::new(),
            alert: None,
        }
    }

    fn apply_theme(ctx: &egui::Context) {
        let mut visuals = egui::Visuals::dark();
        let line_base = egui::Color32::from_gray(36);
        visuals.panel_fill = egui::Color32::from_gray(12);
        visuals.window_fill = egui::Color32::from_gray(16);
        visuals.window_stroke = egui::Stroke::new(1.0, line_base);
        visuals.widgets.noninteractive.bg_stroke = egui::Stroke::new(1.0, line_base);
        ctx.set_visuals(visuals);
    }

    fn open_images(&mut self) {
        let picked = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_files();
        if let Some(paths) = picked {
            self.controller.select_files(paths);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let paths = dropped_paths(&dropped);
        if !paths.is_empty() {
            self.controller.drop_external_files(paths);
        }
    }

    fn play_video(&mut self, video_url: &str) {
        let url = resolve_media_url(&self.controller.config().server_url, video_url);
        if let Err(err) = webbrowser::open(&url) {
            log::error!("Could not start playback of {url}: {err}");
            self.controller
                .presentation_mut()
                .note(format!("Could not start playback: {err}"));
        }
    }

    /// Uploads textures for newly read slots and forgets those of removed slots.
    fn sync_thumbnails(&mut self, ctx: &egui::Context) {
        let slots = self.controller.shelf().slots();
        self.thumbnails
            .retain(|id, _| slots.iter().any(|slot| slot.id() == *id));
        for slot in slots {
            if self.thumbnails.contains_key(&slot.id()) {
                continue;
            }
            if let Some(preview) = slot.preview() {
                let texture = ctx.load_texture(
                    format!("shelf-slot-{:?}", slot.id()),
                    preview.clone(),
                    TextureOptions::LINEAR,
                );
                self.thumbnails.insert(slot.id(), texture);
            }
        }
    }

    fn show_form_fields(&mut self, ui: &mut egui::Ui) {
        let tone_names = self
            .controller
            .tones()
            .tone_names()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let age_gender_options = self
            .controller
            .tones()
            .age_gender_options(&self.controller.form.voice.tone);
        let mut chosen_tone = None;
        let mut chosen_age_gender = None;
        let mut chosen_platform = None;

        egui::Grid::new("form-fields")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                let form = &mut self.controller.form;
                ui.label("Company name");
                ui.text_edit_singleline(&mut form.company_name);
                ui.end_row();

                ui.label("Emphasis");
                ui.text_edit_singleline(&mut form.emphasis);
                ui.end_row();

                ui.label("Avoid");
                ui.text_edit_singleline(&mut form.avoid);
                ui.end_row();

                ui.label("Mood");
                ui.text_edit_singleline(&mut form.mood);
                ui.end_row();

                ui.label("Press release");
                ui.add(
                    egui::TextEdit::multiline(&mut form.press_release)
                        .desired_rows(4)
                        .desired_width(f32::INFINITY),
                );
                ui.end_row();

                ui.label("Tone");
                let tone_text = if tone_names.is_empty() {
                    "Loading...".to_string()
                } else {
                    form.voice.tone.clone()
                };
                egui::ComboBox::from_id_salt("tone-select")
                    .selected_text(tone_text)
                    .show_ui(ui, |ui| {
                        for name in &tone_names {
                            if ui
                                .selectable_label(form.voice.tone == *name, name.as_str())
                                .clicked()
                            {
                                chosen_tone = Some(name.clone());
                            }
                        }
                    });
                ui.end_row();

                ui.label("Voice");
                egui::ComboBox::from_id_salt("age-gender-select")
                    .selected_text(form.voice.age_gender.clone())
                    .show_ui(ui, |ui| {
                        for option in &age_gender_options {
                            if ui
                                .selectable_label(form.voice.age_gender == *option, option.as_str())
                                .clicked()
                            {
                                chosen_age_gender = Some(option.clone());
                            }
                        }
                    });
                ui.end_row();

                ui.label("Platform");
                let platform_label = PLATFORMS
                    .iter()
                    .find(|(id, ..)| *id == form.platform)
                    .map(|(_, label, ..)| *label)
                    .unwrap_or(form.platform.as_str())
                    .to_string();
                egui::ComboBox::from_id_salt("platform-select")
                    .selected_text(platform_label)
                    .show_ui(ui, |ui| {
                        for (id, label, ..) in PLATFORMS {
                            if ui.selectable_label(form.platform == *id, *label).clicked() {
                                chosen_platform = Some(*id);
                            }
                        }
                    });
                ui.end_row();
            });

        if let Some(tone) = chosen_tone {
            self.controller.select_tone(&tone);
        }
        if let Some(age_gender) = chosen_age_gender {
            self.controller.select_age_gender(&age_gender);
        }
        if let Some(platform) = chosen_platform {
            self.controller.select_platform(platform);
        }
    }

    fn show_shelf(&self, ui: &mut egui::Ui) -> Vec<ShelfAction> {
        let shelf = self.controller.shelf();
        let mut actions = Vec::new();
        if shelf.is_empty() {
            ui.label(format!(
                "No images selected. Choose or drop up to {} images.",
                shelf.capacity()
            ));
            return actions;
        }

        let dragging_from = shelf.drag_source_index();
        let hover_pos = ui.input(|i| i.pointer.hover_pos());
        let mut slot_rects = Vec::with_capacity(shelf.len());

        egui::ScrollArea::horizontal()
            .id_salt("image-shelf")
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    for (index, slot) in shelf.slots().iter().enumerate() {
                        let is_dragged = dragging_from == Some(index);
                        let frame = egui::Frame::none()
                            .stroke(egui::Stroke::new(
                                1.0,
                                if is_dragged {
                                    egui::Color32::from_rgb(90, 140, 220)
                                } else {
                                    egui::Color32::from_gray(40)
                                },
                            ))
                            .inner_margin(egui::Margin::same(6.0));
                        let framed = frame.show(ui, |ui| {
                            ui.vertical(|ui| {
                                let (rect, response) = ui.allocate_exact_size(
                                    egui::vec2(SLOT_THUMB_SIZE, SLOT_THUMB_SIZE),
                                    Sense::drag(),
                                );
                                match slot.content() {
                                    SlotContent::Ready { .. } => {
                                        if let Some(texture) = self.thumbnails.get(&slot.id()) {
                                            let size = texture.size_vec2();
                                            let scale = (SLOT_THUMB_SIZE / size.x.max(size.y).max(1.0))
                                                .min(1.0);
                                            let draw = egui::Rect::from_center_size(
                                                rect.center(),
                                                size * scale,
                                            );
                                            egui::Image::new((texture.id(), size * scale))
                                                .paint_at(ui, draw);
                                        }
                                    }
                                    SlotContent::Reading => {
                                        ui.painter().text(
                                            rect.center(),
                                            egui::Align2::CENTER_CENTER,
                                            "Reading...",
                                            egui::FontId::proportional(12.0),
                                            ui.visuals().weak_text_color(),
                                        );
                                    }
                                    SlotContent::Failed(_) => {
                                        ui.painter().text(
                                            rect.center(),
                                            egui::Align2::CENTER_CENTER,
                                            "Unreadable",
                                            egui::FontId::proportional(12.0),
                                            ui.visuals().error_fg_color,
                                        );
                                    }
                                }
                                let response = match slot.content() {
                                    SlotContent::Failed(reason) => {
                                        response.on_hover_text(reason.as_str())
                                    }
                                    _ => response,
                                };
                                if response.drag_started() {
                                    actions.push(ShelfAction::BeginDrag(index));
                                }

                                ui.add(
                                    egui::Label::new(egui::RichText::new(slot.label()).small())
                                        .truncate(),
                                );
                                ui.horizontal(|ui| {
                                    if ui
                                        .add_enabled(shelf.can_move_left(index), egui::Button::new("<"))
                                        .on_hover_text("Move left")
                                        .clicked()
                                    {
                                        actions.push(ShelfAction::MoveLeft(index));
                                    }
                                    if ui
                                        .add_enabled(shelf.can_move_right(index), egui::Button::new(">"))
                                        .on_hover_text("Move right")
                                        .clicked()
                                    {
                                        actions.push(ShelfAction::MoveRight(index));
                                    }
                                    if ui.button("Remove").clicked() {
                                        actions.push(ShelfAction::Remove(index));
                                    }
                                });
                            });
                        });
                        let rect = framed.response.rect;
                        if dragging_from.is_some()
                            && !is_dragged
                            && hover_pos.is_some_and(|pos| rect.contains(pos))
                        {
                            ui.painter().rect_stroke(
                                rect,
                                2.0,
                                egui::Stroke::new(2.0, egui::Color32::from_rgb(90, 140, 220)),
                            );
                        }
                        slot_rects.push(rect);
                    }
                });
            });

        if dragging_from.is_some() && ui.input(|i| i.pointer.any_released()) {
            let released_at = ui.input(|i| i.pointer.interact_pos());
            let target = released_at
                .and_then(|pos| slot_rects.iter().position(|rect| rect.contains(pos)));
            actions.push(match target {
                Some(index) => ShelfAction::DropOnto(index),
                None => ShelfAction::CancelDrag,
            });
        }

        actions
    }

    fn apply_shelf_actions(&mut self, actions: Vec<ShelfAction>) {
        for action in actions {
            match action {
                ShelfAction::MoveLeft(index) => self.controller.move_image_left(index),
                ShelfAction::MoveRight(index) => self.controller.move_image_right(index),
                ShelfAction::Remove(index) => self.controller.remove_image(index),
                ShelfAction::BeginDrag(index) => self.controller.begin_image_drag(index),
                ShelfAction::DropOnto(index) => {
                    self.controller.drop_image_onto(index);
                }
                ShelfAction::CancelDrag => self.controller.cancel_image_drag(),
            }
        }
    }

    fn show_progress(&self, ui: &mut egui::Ui) {
        let presentation = self.controller.presentation();
        if let Some(percent) = presentation.progress() {
            ui.add(egui::ProgressBar::new(percent / 100.0).show_percentage());
        }

        egui::ScrollArea::vertical()
            .id_salt("progress-log")
            .stick_to_bottom(true)
            .max_height(180.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for line in presentation.log_lines() {
                    match line.kind {
                        LogKind::Info => ui.monospace(&line.text),
                        LogKind::Error => ui.label(
                            egui::RichText::new(&line.text)
                                .monospace()
                                .color(ui.visuals().error_fg_color),
                        ),
                    };
                }
            });
    }

    fn show_player(&mut self, ctx: &egui::Context) {
        if let Some(url) = self.controller.presentation_mut().take_autoplay() {
            self.play_video(&url);
        }

        let presentation = self.controller.presentation();
        let player = presentation.player();
        if !player.visible {
            return;
        }
        let Some(source) = player.source.clone() else {
            return;
        };
        let download_link = player.download_link.clone();
        let ratio = presentation.aspect_ratio();
        let available_width = ctx.screen_rect().width();
        let size = popup_size(ratio, available_width);
        let width = size.width(available_width);

        let mut open = true;
        let mut play_clicked = false;
        egui::Window::new("Your video")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .min_width(width)
            .max_width(width)
            .show(ctx, |ui| {
                let (rect, response) =
                    ui.allocate_exact_size(egui::vec2(width, size.height), Sense::click());
                ui.painter().rect_filled(rect, 4.0, egui::Color32::BLACK);
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "▶",
                    egui::FontId::proportional(36.0),
                    egui::Color32::from_gray(200),
                );
                if response.on_hover_text("Play").clicked() {
                    play_clicked = true;
                }
                ui.horizontal(|ui| {
                    if ui.button("Play").clicked() {
                        play_clicked = true;
                    }
                    if let Some(link) = &download_link {
                        ui.hyperlink_to(
                            "Download video",
                            resolve_media_url(&self.controller.config().server_url, link),
                        );
                    }
                });
            });

        if play_clicked {
            self.play_video(&source);
        }
        if !open {
            self.controller.presentation_mut().close_player();
        }
    }

    fn show_alert(&mut self, ctx: &egui::Context) {
        if self.alert.is_none() {
            self.alert = self.controller.take_alert();
        }
        let Some(message) = self.alert.clone() else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                ui.set_max_width(360.0);
                ui.label(message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed || ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.alert = None;
        }
    }

    fn show_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status-line")
            .show_separator_line(false)
            .show(ctx, |ui| {
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    Self::resize_corner(ui);
                    ui.with_layout(egui::Layout::left_to_right(egui::Align::Center), |ui| {
                        if self.controller.is_busy() {
                            ui.spinner();
                        }
                        ui.label(&self.controller.status_line);
                    });
                });
            });
    }

    /// Bottom-right handle of the undecorated window: a triangle of dots that
    /// starts an OS resize when dragged.
    fn resize_corner(ui: &mut egui::Ui) {
        const CORNER: f32 = 16.0;
        const DOT_SPACING: f32 = 4.5;

        let (rect, response) =
            ui.allocate_exact_size(egui::vec2(CORNER, CORNER), Sense::drag());
        if response.drag_started() {
            ui.ctx()
                .send_viewport_cmd(ViewportCommand::BeginResize(ResizeDirection::SouthEast));
        }
        let hot = response.hovered() || response.dragged();
        if hot {
            ui.ctx().set_cursor_icon(egui::CursorIcon::ResizeSouthEast);
        }

        let color = if hot {
            ui.visuals().strong_text_color()
        } else {
            ui.visuals().weak_text_color()
        };
        let corner = rect.right_bottom() - egui::vec2(2.0, 2.0);
        for row in 0..3_u8 {
            for column in 0..(3 - row) {
                let center = corner
                    - egui::vec2(
                        f32::from(column) * DOT_SPACING,
                        f32::from(row) * DOT_SPACING,
                    );
                ui.painter().circle_filled(center, 1.0, color);
            }
        }
    }

    fn show_titlebar(&mut self, ctx: &egui::Context) -> bool {
        let mut open_images_clicked = false;
        let is_maximized = ctx.input(|input| input.viewport().maximized.unwrap_or(false));
        let title_text = format!("{APP_TITLE} v{APP_VERSION}");
        let bar_fill = ctx.style().visuals.panel_fill;

        egui::TopBottomPanel::top("titlebar")
            .show_separator_line(false)
            .frame(egui::Frame::none().fill(bar_fill))
            .exact_height(30.0)
            .show(ctx, |ui| {
                let button_size = egui::vec2(28.0, 22.0);
                let side_width = button_size.x * 3.0 + ui.spacing().item_spacing.x * 2.0;
                let titlebar_rect = ui.max_rect();
                let center_width = (ui.available_width()
                    - side_width * 2.0
                    - ui.spacing().item_spacing.x * 2.0)
                    .max(0.0);

                ui.add_space(2.0);
                ui.horizontal(|ui| {
                    ui.allocate_ui_with_layout(
                        egui::vec2(side_width, button_size.y),
                        egui::Layout::left_to_right(egui::Align::Center),
                        |ui| {
                            ui.add_space(4.0);
                            ui.menu_button("☰", |ui| {
                                if ui.button("Choose images...").clicked() {
                                    open_images_clicked = true;
                                    ui.close_menu();
                                }
                                if ui.button("Reload tones").clicked() {
                                    self.controller.load_tones();
                                    ui.close_menu();
                                }
                            });
                        },
                    );

                    let (title_rect, drag_response) = ui.allocate_exact_size(
                        egui::vec2(center_width, button_size.y),
                        Sense::click_and_drag(),
                    );
                    ui.painter().text(
                        egui::pos2(titlebar_rect.center().x, title_rect.center().y),
                        egui::Align2::CENTER_CENTER,
                        &title_text,
                        egui::FontId::proportional(14.0),
                        ui.visuals().text_color(),
                    );
                    if drag_response.is_pointer_button_down_on() {
                        ctx.send_viewport_cmd(ViewportCommand::StartDrag);
                    }
                    if drag_response.double_clicked() {
                        ctx.send_viewport_cmd(ViewportCommand::Maximized(!is_maximized));
                    }

                    ui.allocate_ui_with_layout(
                        egui::vec2(ui.available_width(), button_size.y),
                        egui::Layout::right_to_left(egui::Align::Center),
                        |ui| {
                            let window_button = |label: &str| {
                                egui::Button::new(label.to_string())
                                    .fill(bar_fill)
                                    .stroke(egui::Stroke::NONE)
                            };
                            if ui.add_sized(button_size, window_button("X")).clicked() {
                                ctx.send_viewport_cmd(ViewportCommand::Close);
                            }
                            if ui.add_sized(button_size, window_button("□")).clicked() {
                                ctx.send_viewport_cmd(ViewportCommand::Maximized(!is_maximized));
                            }
                            if ui.add_sized(button_size, window_button("_")).clicked() {
                                ctx.send_viewport_cmd(ViewportCommand::Minimized(true));
                            }
                        },
                    );
                });
            });

        open_images_clicked
    }
}

impl eframe::App for SunfireApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_theme(ctx);

        self.controller.poll();
        self.handle_dropped_files(ctx);
        self.sync_thumbnails(ctx);

        let close_requested =
            ctx.input_mut(|input| input.consume_key(egui::Modifiers::COMMAND, egui::Key::W));
        if close_requested {
            ctx.send_viewport_cmd(ViewportCommand::Close);
            return;
        }

        let mut open_images_clicked = self.show_titlebar(ctx);

        self.show_status_bar(ctx);

        let mut generate_clicked = false;
        let mut shelf_actions = Vec::new();
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .id_salt("form-scroll")
                .show(ui, |ui| {
                    ui.heading("Images");
                    ui.horizontal(|ui| {
                        if ui.button("Choose images...").clicked() {
                            open_images_clicked = true;
                        }
                        ui.label(format!(
                            "{}/{} selected",
                            self.controller.shelf().len(),
                            self.controller.shelf().capacity()
                        ));
                    });
                    ui.add_space(6.0);
                    shelf_actions = self.show_shelf(ui);

                    ui.separator();
                    ui.heading("Details");
                    self.show_form_fields(ui);

                    ui.add_space(10.0);
                    let can_submit = !self.controller.is_submitting();
                    if ui
                        .add_enabled(can_submit, egui::Button::new("Generate video"))
                        .clicked()
                    {
                        generate_clicked = true;
                    }

                    ui.separator();
                    self.show_progress(ui);
                });
        });

        self.apply_shelf_actions(shelf_actions);
        if open_images_clicked {
            self.open_images();
        }
        if generate_clicked {
            self.controller.submit();
        }

        self.show_player(ctx);
        self.show_alert(ctx);

        if self.controller.shelf().is_dragging() {
            ctx.set_cursor_icon(egui::CursorIcon::Grabbing);
        }
        if self.controller.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(16));
        }
    }
}

fn dropped_paths(files: &[egui::DroppedFile]) -> Vec<PathBuf> {
    files.iter().filter_map(|file| file.path.clone()).collect()
}

/// The backend may answer with a path relative to its own root.
fn resolve_media_url(server_url: &str, video_url: &str) -> String {
    if Url::parse(video_url).is_ok() {
        return video_url.to_string();
    }
    let base = if server_url.ends_with('/') {
        server_url.to_string()
    } else {
        format!("{server_url}/")
    };
    Url::parse(&base)
        .and_then(|base| base.join(video_url))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| video_url.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc::Receiver;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::{bail, Result};

    use super::*;
    use crate::api::JobApi;
    use crate::form::SubmissionPayload;
    use crate::launch::ClientConfig;
    use crate::notifier::{NotifierUpdate, ProgressNotifier};
    use crate::protocol::{PollStatus, SubmitResponse};
    use crate::tones::ToneCatalog;

    #[derive(Default)]
    struct OfflineApi {
        tone_requests: AtomicU32,
    }

    impl JobApi for OfflineApi {
        fn fetch_tones(&self) -> Result<ToneCatalog> {
            self.tone_requests.fetch_add(1, Ordering::SeqCst);
            Ok(ToneCatalog::default())
        }

        fn submit_job(&self, _payload: &SubmissionPayload) -> Result<SubmitResponse> {
            bail!("offline")
        }

        fn open_messages(&self, _session_id: &str) -> Result<Box<dyn BufRead + Send>> {
            bail!("offline")
        }

        fn video_status(&self, _session_id: &str) -> Result<PollStatus> {
            bail!("offline")
        }

        fn video_callback(&self) -> Result<PollStatus> {
            bail!("offline")
        }
    }

    struct Silent;

    impl ProgressNotifier for Silent {
        fn deliver(
            &self,
            _session_id: &str,
            _shutdown: &Receiver<()>,
            _emit: &mut dyn FnMut(NotifierUpdate),
        ) {
        }
    }

    #[test]
    fn absolute_media_urls_pass_through() {
        assert_eq!(
            resolve_media_url("http://127.0.0.1:5000", "https://cdn.example.com/v.mp4"),
            "https://cdn.example.com/v.mp4"
        );
    }

    #[test]
    fn relative_media_urls_resolve_against_server() {
        assert_eq!(
            resolve_media_url("http://127.0.0.1:5000", "videos/output_video.mp4"),
            "http://127.0.0.1:5000/videos/output_video.mp4"
        );
        assert_eq!(
            resolve_media_url("https://studio.example.com/sunfire", "/static/v.mp4"),
            "https://studio.example.com/static/v.mp4"
        );
    }

    #[test]
    fn dropped_files_without_paths_are_skipped() {
        let files = vec![
            egui::DroppedFile {
                path: Some(PathBuf::from("/tmp/a.png")),
                ..Default::default()
            },
            egui::DroppedFile::default(),
        ];
        assert_eq!(dropped_paths(&files), vec![PathBuf::from("/tmp/a.png")]);
    }

    #[test]
    fn initial_status_is_shown_while_tones_load() {
        let api = Arc::new(OfflineApi::default());
        let app = SunfireApp::new(
            VideoFormController::new(ClientConfig::default(), api.clone(), Arc::new(Silent)),
            Some("Config error: bad flag".to_string()),
        );
        assert_eq!(app.controller.status_line, "Config error: bad flag");
        assert!(app.alert.is_none());

        let started = Instant::now();
        while api.tone_requests.load(Ordering::SeqCst) == 0
            && started.elapsed() < Duration::from_secs(5)
        {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(api.tone_requests.load(Ordering::SeqCst), 1);
    }
}
