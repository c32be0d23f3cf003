use std::fmt::Display;
use std::path::PathBuf;

use eframe::egui;
use tracing::{error, info, warn};

use crate::capture::{FormSurface, ThreadSleeper};
use crate::config::Config;
use crate::model::{Cursor, Outcome};
use crate::session::AnnotationSession;
use crate::store::{image_file_name, HttpImageFetcher, JsonFileStore};
use crate::worker::{Event, Job, Worker};

// ── Actions ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
enum Action {
    PickStore,
    PickOutputDir,
    OpenViewer,
    PreviousSeed,
    NextSeed,
    PreviousCandidate,
    NextCandidate,
    Select(usize),
    SaveLink,
    BadLink,
}

// ── App ─────────────────────────────────────────────────────────────────────

pub struct CollectorApp {
    config: Config,
    store_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,

    session: AnnotationSession,
    surface: FormSurface,
    worker: Option<Worker>,

    // cursor the form fields were last reset for
    shown: Option<Cursor>,
    pending_image: Option<PathBuf>,
    last_saved: Option<PathBuf>,

    error: Option<String>,
    notice: Option<String>,
}

impl CollectorApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: Config) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);
        let mut app = Self {
            store_path: config.store.clone(),
            output_dir: config.output_dir.clone(),
            config,
            session: AnnotationSession::new(),
            surface: FormSurface::new(),
            worker: None,
            shown: None,
            pending_image: None,
            last_saved: None,
            error: None,
            notice: None,
        };
        app.restart(&cc.egui_ctx);
        app
    }

    fn is_ready_to_collect(&self) -> bool {
        self.store_path.is_some() && self.output_dir.is_some()
    }

    fn is_busy(&self) -> bool {
        self.worker.as_ref().is_some_and(Worker::is_busy)
    }

    fn fail(&mut self, context: &str, err: impl Display) {
        error!("{context}: {err}");
        self.error = Some(format!("{context}: {err}"));
    }

    /// Drop the current session and load the selected store from scratch.
    fn restart(&mut self, ctx: &egui::Context) {
        let (Some(store_path), Some(output_dir)) = (self.store_path.clone(), self.output_dir.clone())
        else {
            return;
        };
        self.worker = None;
        self.session = AnnotationSession::new();
        self.shown = None;
        self.pending_image = None;
        self.last_saved = None;

        let fetcher = match HttpImageFetcher::new(
            self.config.fetch_timeout(),
            self.config.accept_invalid_certs,
        ) {
            Ok(fetcher) => fetcher,
            Err(err) => return self.fail("cannot build http client", err),
        };
        let store = JsonFileStore::new(store_path, output_dir, fetcher);
        let repaint = ctx.clone();
        let spawned = Worker::spawn(
            store,
            self.surface.clone(),
            Box::new(ThreadSleeper),
            self.config.retry_policy(),
            move || repaint.request_repaint(),
        );
        match spawned {
            Ok(mut worker) => {
                worker.submit(Job::Load);
                self.worker = Some(worker);
            }
            Err(err) => self.fail("cannot start store worker", err),
        }
    }

    fn submit(&mut self, job: Job) {
        match self.worker.as_mut() {
            Some(worker) => {
                worker.submit(job);
            }
            None => warn!("no store selected"),
        }
    }

    fn poll_worker(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        let events: Vec<Event> = std::iter::from_fn(|| worker.try_recv()).collect();
        for event in events {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Loaded(Ok(collection)) => self.session.load(collection),
            Event::Loaded(Err(err)) => self.fail("cannot load store", err),
            Event::Captured(Ok(capture)) => match self.session.prepare_capture(capture) {
                Ok(request) => {
                    self.pending_image = request.fetch_image.and_then(|cursor| {
                        let store = self.store_path.as_ref()?;
                        let dir = self.output_dir.as_ref()?;
                        Some(dir.join(image_file_name(store, cursor)))
                    });
                    self.submit(Job::Persist(request));
                }
                Err(err) => self.fail("cannot save link", err),
            },
            Event::Captured(Err(err)) => self.fail("cannot save link", err),
            Event::Persisted(Ok(snapshot)) => {
                self.session.apply_persisted(snapshot);
                if let Some(path) = self.pending_image.take() {
                    if path.exists() {
                        self.last_saved = Some(path);
                        self.notice = None;
                    } else {
                        self.notice = Some(format!("Image {} was not saved", path.display()));
                    }
                }
            }
            Event::Persisted(Err(err)) => {
                self.pending_image = None;
                self.fail("cannot write store", err);
            }
        }
    }

    /// Point the form at the displayed candidate whenever the cursor moves.
    fn sync_form(&mut self) {
        let cursor = self.session.cursor();
        if cursor == self.shown {
            return;
        }
        self.shown = cursor;
        let url = self
            .session
            .viewer_url(&self.config.viewer_host)
            .unwrap_or_default();
        self.surface.reset(url);
    }

    fn apply(&mut self, ctx: &egui::Context, action: Action) {
        if self.is_busy() || self.error.is_some() {
            return;
        }
        match action {
            Action::PickStore => {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("JSON", &["json"])
                    .pick_file()
                {
                    info!(path = %path.display(), "store selected");
                    self.store_path = Some(path);
                    self.restart(ctx);
                }
            }
            Action::PickOutputDir => {
                if let Some(path) = rfd::FileDialog::new().pick_folder() {
                    info!(path = %path.display(), "output directory selected");
                    self.output_dir = Some(path);
                    self.restart(ctx);
                }
            }
            Action::OpenViewer => {
                let url = self.surface.fields().page_url.clone();
                if !url.is_empty() {
                    ctx.open_url(egui::OpenUrl::new_tab(url));
                }
            }
            Action::PreviousSeed => self.session.previous_seed(),
            Action::NextSeed => self.session.next_seed(),
            Action::PreviousCandidate => self.session.previous_candidate(),
            Action::NextCandidate => self.session.next_candidate(),
            Action::Select(index) => self.session.select_candidate(index),
            Action::SaveLink => {
                if let Some(path) = &self.last_saved {
                    ctx.forget_image(&format!("file://{}", path.display()));
                }
                self.submit(Job::Capture);
            }
            Action::BadLink => match self.session.prepare_bad() {
                Ok(request) => self.submit(Job::Persist(request)),
                Err(err) => self.fail("cannot mark bad link", err),
            },
        }
    }

    fn path_label(path: Option<&PathBuf>) -> String {
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "not selected".to_string())
    }

    fn progress_ui(&self, ui: &mut egui::Ui) {
        if !self.session.data_is_available() {
            ui.label("The store has no seeds.");
            return;
        }
        ui.label(format!(
            "Link {} out of {}",
            self.session.annotated_candidate_count(),
            self.session.total_eligible_candidate_count()
        ));
        match self.session.cursor() {
            Some(cursor) => ui.label(format!("Seed {}", cursor.seed)),
            None => ui.label("No seed left in this direction"),
        };
        if let Some(percent) = self.session.percent_complete() {
            ui.add(egui::ProgressBar::new(percent / 100.0).show_percentage());
        }
    }

    fn form_ui(&self, ui: &mut egui::Ui, busy: bool) {
        let mut fields = self.surface.fields();
        egui::Grid::new("capture_form").num_columns(2).show(ui, |ui| {
            ui.label("Viewer page");
            ui.add(egui::TextEdit::singleline(&mut fields.page_url).desired_width(520.0));
            ui.end_row();
            ui.label("Share link");
            ui.add(egui::TextEdit::singleline(&mut fields.share_link).desired_width(520.0));
            ui.end_row();
            ui.label("Image URL");
            ui.add(egui::TextEdit::singleline(&mut fields.image_url).desired_width(520.0));
            ui.end_row();
        });
        if busy && fields.share_requested {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Waiting for the image URL...");
            });
        }
    }

    fn candidate_strip_ui(&self, ui: &mut egui::Ui, action: &mut Option<Action>) {
        let current = self.session.cursor().map(|c| c.candidate);
        ui.horizontal_wrapped(|ui| {
            for (i, outcome) in self.session.candidate_outcomes().into_iter().enumerate() {
                let color = match outcome {
                    Outcome::Unannotated => egui::Color32::from_rgb(200, 40, 40),
                    Outcome::Captured | Outcome::MarkedBad => egui::Color32::from_rgb(40, 160, 60),
                };
                let mut text = egui::RichText::new(format!("Link {i}")).color(color);
                if current == Some(i) {
                    text = text.underline().strong();
                }
                if ui.add(egui::Label::new(text).sense(egui::Sense::click())).clicked() {
                    *action = Some(Action::Select(i));
                }
            }
        });
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for CollectorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_worker();
        self.sync_form();

        let busy = self.is_busy();
        let blocked = busy || self.error.is_some();
        let mut action = None;

        // Keyboard shortcuts
        if !blocked && !ctx.wants_keyboard_input() {
            action = ctx.input(|i| {
                if i.modifiers.ctrl && i.key_pressed(egui::Key::S) {
                    Some(Action::SaveLink)
                } else if i.modifiers.ctrl && i.key_pressed(egui::Key::B) {
                    Some(Action::BadLink)
                } else if i.key_pressed(egui::Key::ArrowRight) {
                    Some(Action::NextCandidate)
                } else if i.key_pressed(egui::Key::ArrowLeft) {
                    Some(Action::PreviousCandidate)
                } else if i.key_pressed(egui::Key::PageDown) {
                    Some(Action::NextSeed)
                } else if i.key_pressed(egui::Key::PageUp) {
                    Some(Action::PreviousSeed)
                } else {
                    None
                }
            });
        }

        if let Some(message) = self.error.clone() {
            let mut dismissed = false;
            egui::Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(message);
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            if dismissed {
                self.error = None;
            }
        }

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.heading("Street View Collector");
            ui.add_enabled_ui(!blocked, |ui| {
                ui.horizontal(|ui| {
                    if ui.button("Select file").clicked() {
                        action = Some(Action::PickStore);
                    }
                    ui.label(format!(
                        "Data stored in: {}",
                        Self::path_label(self.store_path.as_ref())
                    ));
                });
                ui.horizontal(|ui| {
                    if ui.button("Select directory").clicked() {
                        action = Some(Action::PickOutputDir);
                    }
                    ui.label(format!(
                        "Images stored in: {}",
                        Self::path_label(self.output_dir.as_ref())
                    ));
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if !self.is_ready_to_collect() {
                ui.label("Please select the JSON file where the links are to be stored.");
                ui.label("Please select the directory where the images are to be stored.");
                return;
            }

            self.progress_ui(ui);
            ui.separator();

            let has_candidate = self.session.current_candidate().is_some();
            if has_candidate {
                ui.horizontal(|ui| {
                    if ui.add_enabled(!blocked, egui::Button::new("Open viewer")).clicked() {
                        action = Some(Action::OpenViewer);
                    }
                    if let Some(url) = self.session.viewer_url(&self.config.viewer_host) {
                        ui.hyperlink_to(url.clone(), url);
                    }
                });
            }
            self.form_ui(ui, busy);
            ui.separator();

            ui.add_enabled_ui(!blocked, |ui| {
                self.candidate_strip_ui(ui, &mut action);
                ui.horizontal(|ui| {
                    if ui.button("Prev").clicked() {
                        action = Some(Action::PreviousSeed);
                    }
                    if ui.add_enabled(has_candidate, egui::Button::new("Save link")).clicked() {
                        action = Some(Action::SaveLink);
                    }
                    if ui.add_enabled(has_candidate, egui::Button::new("Bad link")).clicked() {
                        action = Some(Action::BadLink);
                    }
                    if ui.button("Next").clicked() {
                        action = Some(Action::NextSeed);
                    }
                });
            });

            if let Some(notice) = &self.notice {
                ui.colored_label(egui::Color32::from_rgb(220, 150, 20), notice.as_str());
            }
            if let Some(path) = &self.last_saved {
                ui.separator();
                ui.label(format!("Last image: {}", path.display()));
                ui.add(
                    egui::Image::new(format!("file://{}", path.display()))
                        .max_height(240.0)
                        .maintain_aspect_ratio(true),
                );
            }
        });

        if let Some(action) = action {
            self.apply(ctx, action);
        }
    }
}
