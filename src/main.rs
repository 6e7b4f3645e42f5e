//! TVDeck - desktop internet TV
//! Channel guide, admin editor and a voice assistant around one video surface

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use eframe::egui;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod admin;
mod app_state;
mod auth;
mod config;
mod console;
mod defaults;
mod guide;
mod m3u_import;
mod media;
mod models;
mod storage;
mod store;
mod voice;

use admin::AdminDraft;
use app_state::AppState;
use auth::AuthGate;
use config::{AppConfig, PlayerMode};
use console::{timestamp_now, ConsoleLog};
use guide::GuideEvent;
use media::{
    AdaptiveStream, ExternalPlayer, HlsClient, InternalPlayer, MediaController, MediaElement, PlayerView,
    StreamFactory,
};
use models::*;
use storage::LocalStorage;
use store::ChannelStore;
use voice::{VoiceAssistant, VoiceEvent};

/// Load application icon: a TV with a play button on a teal tile
fn load_icon() -> egui::IconData {
    let size: usize = 64;
    let mut rgba = vec![0u8; size * size * 4];

    for y in 0..size {
        for x in 0..size {
            let idx = (y * size + x) * 4;
            let nx = x as f32 / size as f32;
            let ny = y as f32 / size as f32;

            // Rounded rectangle check (background)
            let corner_radius = 0.125;
            let dx = if nx < corner_radius { corner_radius - nx }
                     else if nx > 1.0 - corner_radius { nx - (1.0 - corner_radius) }
                     else { 0.0 };
            let dy = if ny < corner_radius { corner_radius - ny }
                     else if ny > 1.0 - corner_radius { ny - (1.0 - corner_radius) }
                     else { 0.0 };
            if dx * dx + dy * dy > corner_radius * corner_radius {
                continue; // transparent
            }

            let in_screen = (0.14..=0.86).contains(&nx) && (0.24..=0.70).contains(&ny);
            let in_play = {
                let px = nx - 0.43;
                let py = ny - 0.47;
                (0.0..=0.16).contains(&px) && py.abs() <= px * 0.75
            };
            // Antenna: two diagonals meeting above the screen
            let in_antenna = ny < 0.24 && ny > 0.08 && {
                let left = (nx - (0.5 - (0.24 - ny))).abs() < 0.02;
                let right = (nx - (0.5 + (0.24 - ny))).abs() < 0.02;
                left || right
            };
            let in_stand = (0.38..=0.62).contains(&nx) && (0.74..=0.80).contains(&ny);

            let color: [u8; 3] = if in_play {
                [20, 184, 166]
            } else if in_screen {
                [17, 24, 39]
            } else if in_antenna || in_stand {
                [236, 253, 245]
            } else {
                // Teal gradient background (#0f766e to #14b8a6)
                let t = nx * 0.5 + ny * 0.5;
                [
                    (15.0 + (20.0 - 15.0) * t) as u8,
                    (118.0 + (184.0 - 118.0) * t) as u8,
                    (110.0 + (166.0 - 110.0) * t) as u8,
                ]
            };
            rgba[idx..idx + 3].copy_from_slice(&color);
            rgba[idx + 3] = 255;
        }
    }

    egui::IconData {
        rgba,
        width: size as u32,
        height: size as u32,
    }
}

/// Add a system emoji font as a fallback for the icon glyphs used in the UI
fn install_emoji_font(ctx: &egui::Context) {
    #[cfg(target_os = "windows")]
    let candidates: &[&str] = &["C:\\Windows\\Fonts\\seguiemj.ttf"];
    #[cfg(target_os = "linux")]
    let candidates: &[&str] = &[
        "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
        "/usr/share/fonts/noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/google-noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ];
    #[cfg(target_os = "macos")]
    let candidates: &[&str] = &["/System/Library/Fonts/Apple Color Emoji.ttc"];
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    let candidates: &[&str] = &[];

    let mut fonts = egui::FontDefinitions::default();
    if let Some(font_data) = candidates.iter().find_map(|path| std::fs::read(path).ok()) {
        fonts.font_data.insert("emoji".to_owned(), egui::FontData::from_owned(font_data).into());
        fonts
            .families
            .entry(egui::FontFamily::Proportional)
            .or_default()
            .push("emoji".to_owned());
    }
    ctx.set_fonts(fonts);
}

/// Log to stderr and to the in-app console
fn init_logging(console: &ConsoleLog) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tvdeck=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .without_time()
                .with_writer(console.clone()),
        )
        .init();
}

fn main() -> Result<(), eframe::Error> {
    let console = ConsoleLog::new();
    init_logging(&console);
    tracing::info!("TVDeck {} starting", env!("CARGO_PKG_VERSION"));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("TVDeck")
            .with_inner_size([1200.0, 720.0])
            .with_min_inner_size([900.0, 540.0])
            .with_icon(load_icon()),
        vsync: true,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred,
        ..Default::default()
    };

    eframe::run_native(
        "TVDeck",
        options,
        Box::new(move |cc| {
            install_emoji_font(&cc.egui_ctx);
            let app = TvApp::new(console)?;
            app.apply_appearance(&cc.egui_ctx);
            Ok(Box::new(app))
        }),
    )
}

/// Without the FFmpeg backend every channel goes to the external player
fn effective_player_mode(mode: PlayerMode) -> PlayerMode {
    if cfg!(feature = "internal-player") {
        mode
    } else {
        PlayerMode::External
    }
}

fn make_element(config: &AppConfig) -> Box<dyn MediaElement> {
    match effective_player_mode(config.player_mode) {
        PlayerMode::Internal => Box::new(InternalPlayer::new()),
        PlayerMode::External => Box::new(ExternalPlayer::new(&config.external_player)),
    }
}

fn hls_factory() -> StreamFactory {
    Box::new(|url: &str| Box::new(HlsClient::attach(url)) as Box<dyn AdaptiveStream>)
}

/// Five-star rating display, e.g. "★★★☆☆"
fn stars_text(rating: u8) -> String {
    let filled = rating.min(MAX_RATING) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(MAX_RATING as usize - filled))
}

/// Clickable stars; returns the clicked rating
fn rating_input(ui: &mut egui::Ui, rating: Option<u8>) -> Option<u8> {
    let current = rating.unwrap_or(0);
    let mut clicked = None;
    ui.spacing_mut().item_spacing.x = 0.0;
    for value in 1..=MAX_RATING {
        let star = if value <= current { "★" } else { "☆" };
        let button = egui::Button::new(egui::RichText::new(star).color(egui::Color32::GOLD)).frame(false);
        if ui.add(button).on_hover_text(format!("Rate {}", value)).clicked() {
            // clicking the current rating clears it
            clicked = Some(if value == current { 0 } else { value });
        }
    }
    clicked
}

fn guide_row(ui: &mut egui::Ui, channel: &Channel, active: Option<&str>, events: &mut Vec<GuideEvent>) {
    ui.horizontal(|ui| {
        let star = if channel.favorite() { "★" } else { "☆" };
        if ui
            .add(egui::Button::new(egui::RichText::new(star).color(egui::Color32::GOLD)).frame(false))
            .on_hover_text("Toggle favorite")
            .clicked()
        {
            events.push(GuideEvent::ToggleFavorite(channel.id.clone()));
        }

        let is_active = active == Some(channel.id.as_str());
        let name = if is_active {
            egui::RichText::new(format!("▶ {}", channel.name)).strong()
        } else {
            egui::RichText::new(&channel.name).strong()
        };
        if ui.selectable_label(is_active, name).on_hover_text(channel.video_url.as_str()).clicked() {
            events.push(GuideEvent::Select(channel.id.clone()));
        }

        if !channel.current_program.is_empty() {
            ui.label(egui::RichText::new(&channel.current_program).weak());
        }
        if let Some(rating) = channel.rating {
            ui.label(egui::RichText::new(stars_text(rating)).color(egui::Color32::GOLD).small());
        }
    });
    if !channel.description.is_empty() {
        ui.indent(&channel.id, |ui| {
            ui.label(egui::RichText::new(&channel.description).small().weak());
        });
    }
}

/// Background task messages
enum TaskResult {
    PlaylistDownloaded { url: String, result: Result<String, String> },
}

/// Admin toolbar and list actions, applied after the frame's widgets are drawn
enum AdminAction {
    New,
    Duplicate(String),
    Delete(String),
    Select(String),
    ImportM3uFile,
    ImportM3uUrl,
    ImportJson,
    ExportJson,
    Discard,
    Publish,
    Logout,
}

struct TvApp {
    config: AppConfig,
    state: AppState,
    auth: AuthGate,
    controller: MediaController,
    player_view: PlayerView,
    voice: VoiceAssistant,
    draft: Option<AdminDraft>,

    current_tab: Tab,
    status_message: String,
    console: ConsoleLog,

    // Background task channel
    task_receiver: Receiver<TaskResult>,
    task_sender: Sender<TaskResult>,
    loading: bool,

    // Guide
    guide_category: String,
    guide_query: String,

    // Admin
    password_input: String,
    login_error: bool,
    m3u_url_input: String,

    // Assistant
    voice_input: String,

    // Settings dialog working copy
    settings_edit: Option<AppConfig>,
}

impl TvApp {
    fn new(console: ConsoleLog) -> std::io::Result<Self> {
        let config = AppConfig::load();
        let storage = LocalStorage::default_location()?;
        tracing::info!("Storage: {}", storage.dir().display());

        let store = ChannelStore::new(storage.clone(), &config.seed_url);
        let state = AppState::new(store, config.last_channel_id.as_deref());
        let auth = AuthGate::new(storage, &config.admin_password);

        let mut controller = MediaController::new(make_element(&config), hls_factory());
        controller.set_volume(config.volume);

        let (task_sender, task_receiver) = channel();

        let app = Self {
            config,
            state,
            auth,
            controller,
            player_view: PlayerView::new(),
            voice: VoiceAssistant::new(),
            draft: None,
            current_tab: Tab::Watch,
            status_message: String::new(),
            console,
            task_receiver,
            task_sender,
            loading: false,
            guide_category: guide::ALL_CATEGORIES.to_string(),
            guide_query: String::new(),
            password_input: String::new(),
            login_error: false,
            m3u_url_input: String::new(),
            voice_input: String::new(),
            settings_edit: None,
        };
        app.log(&format!("[INFO] TVDeck started with {} channels", app.state.channels().len()));
        if effective_player_mode(app.config.player_mode) != app.config.player_mode {
            app.log("[WARN] Internal player not built in; using external player");
        }
        Ok(app)
    }

    fn log(&self, message: &str) {
        self.console.log(message);
    }

    fn apply_appearance(&self, ctx: &egui::Context) {
        if self.config.dark_mode {
            ctx.set_visuals(egui::Visuals::dark());
        } else {
            ctx.set_visuals(egui::Visuals::light());
        }
        ctx.set_zoom_factor(self.config.font_size.clamp(10, 24) as f32 / 14.0);
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    /// Load whatever the active channel is into the media controller
    fn sync_playback(&mut self) {
        let wanted = self
            .state
            .active_channel()
            .map(|c| (c.id.clone(), c.video_url.clone()));
        let loaded = self
            .controller
            .channel_id()
            .map(str::to_string)
            .zip(self.controller.source_url().map(str::to_string));
        if wanted == loaded {
            return;
        }

        match wanted {
            Some((id, url)) => {
                self.log(&format!("[PLAY] {} | {}", id, url));
                self.controller.load_channel(&id, &url);
                if self.config.last_channel_id.as_deref() != Some(id.as_str()) {
                    self.config.last_channel_id = Some(id);
                    self.config.save();
                }
            }
            None => self.controller.unload(),
        }
    }

    fn select_channel(&mut self, id: &str) {
        if self.state.select(id) {
            if let Some(channel) = self.state.active_channel() {
                let name = channel.name.clone();
                self.set_status(format!("Watching {}", name));
            }
        }
    }

    /// Unedited admin drafts follow the live collection
    fn refresh_draft(&mut self) {
        if self.draft.as_ref().is_some_and(|d| !d.is_dirty()) {
            self.draft = None;
        }
    }

    fn toggle_favorite(&mut self, id: &str) {
        match self.state.toggle_favorite(id) {
            Ok(Some(favorite)) => {
                let verb = if favorite { "Added to" } else { "Removed from" };
                self.log(&format!("[INFO] {} favorites: {}", verb, id));
            }
            Ok(None) => {}
            Err(e) => self.log(&format!("[ERROR] Saving favorites failed: {}", e)),
        }
        self.refresh_draft();
    }

    fn set_rating(&mut self, id: &str, rating: u8) {
        if let Err(e) = self.state.set_rating(id, rating) {
            self.log(&format!("[ERROR] Saving rating failed: {}", e));
        }
        self.refresh_draft();
    }

    fn set_tab(&mut self, ctx: &egui::Context, tab: Tab) {
        if self.current_tab == Tab::Watch && tab != Tab::Watch && self.controller.state().fullscreen {
            self.controller.toggle_fullscreen();
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(false));
        }
        self.current_tab = tab;
    }

    fn process_tasks(&mut self) {
        while let Ok(result) = self.task_receiver.try_recv() {
            match result {
                TaskResult::PlaylistDownloaded { url, result } => {
                    self.loading = false;
                    match result {
                        Ok(content) => {
                            let added = self
                                .draft
                                .get_or_insert_with(|| AdminDraft::new(self.state.channels()))
                                .import_m3u(&content);
                            self.log(&format!("[INFO] Imported {} channels from {}", added, url));
                            self.set_status(format!("Imported {} channels (unpublished)", added));
                        }
                        Err(e) => {
                            self.log(&format!("[ERROR] Playlist download failed: {}", e));
                            self.set_status(format!("Download failed: {}", e));
                        }
                    }
                }
            }
        }
    }

    fn process_voice_events(&mut self) {
        for event in self.voice.poll() {
            match event {
                VoiceEvent::ChangeChannel(id) => match self.state.get(&id).map(|c| c.name.clone()) {
                    Some(name) => {
                        self.log(&format!("[VOICE] Switching to {}", name));
                        self.select_channel(&id);
                    }
                    None => {
                        tracing::warn!("Voice requested unknown channel {}", id);
                        self.log(&format!("[WARN] Voice requested unknown channel {}", id));
                    }
                },
                VoiceEvent::StateChanged(state) => {
                    self.log(&format!("[VOICE] {}", state.label()));
                }
                VoiceEvent::Notice(message) => self.log(&format!("[WARN] {}", message)),
                VoiceEvent::Error(e) => {
                    self.log(&format!("[ERROR] Voice: {}", e));
                    self.set_status(format!("Voice assistant error: {}", e));
                }
                _ => {}
            }
        }
    }

    fn start_voice(&mut self) {
        match self.voice.connect(self.state.channels(), &self.config) {
            Ok(()) => self.log("[VOICE] Connecting..."),
            Err(e) => {
                self.log(&format!("[ERROR] {}", e));
                self.set_status(e.to_string());
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if self.current_tab != Tab::Watch || ctx.wants_keyboard_input() {
            return;
        }
        let (previous, next) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::PageUp) || i.key_pressed(egui::Key::ArrowUp),
                i.key_pressed(egui::Key::PageDown) || i.key_pressed(egui::Key::ArrowDown),
            )
        });
        if previous {
            self.state.previous_channel();
        }
        if next {
            self.state.next_channel();
        }
    }

    fn try_login(&mut self) {
        match self.auth.login(&self.password_input) {
            Ok(()) => {
                self.password_input.clear();
                self.login_error = false;
                self.log("[INFO] Admin unlocked");
            }
            Err(e) => {
                self.login_error = true;
                self.log(&format!("[WARN] Admin login failed: {}", e));
            }
        }
    }

    fn apply_settings(&mut self, ctx: &egui::Context, updated: AppConfig) {
        let player_changed = updated.player_mode != self.config.player_mode
            || updated.external_player != self.config.external_player;
        let password_changed = updated.admin_password != self.config.admin_password;

        // keep runtime state the dialog doesn't edit
        let volume = self.controller.state().volume;
        let last_channel_id = self.config.last_channel_id.clone();
        self.config = AppConfig { volume, last_channel_id, ..updated };
        self.config.save();

        if player_changed {
            self.log(&format!(
                "[INFO] Player: {:?} ({})",
                effective_player_mode(self.config.player_mode),
                self.config.external_player
            ));
            self.controller.replace_element(make_element(&self.config));
        }
        if password_changed {
            self.auth.set_password(&self.config.admin_password);
        }
        self.apply_appearance(ctx);
        self.set_status("Settings saved");
    }
}

impl eframe::App for TvApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Process background task results (non-blocking)
        self.process_tasks();
        self.process_voice_events();
        self.handle_shortcuts(ctx);
        self.sync_playback();

        let fullscreen = self.current_tab == Tab::Watch && self.controller.state().fullscreen;

        if !fullscreen {
            egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
                ui.add_space(5.0);
                ui.horizontal(|ui| {
                    ui.heading("📺 TVDeck");
                    ui.separator();
                    let tabs = [
                        (Tab::Watch, "▶ Watch"),
                        (Tab::Guide, "📋 Guide"),
                        (Tab::Admin, "🛠 Admin"),
                        (Tab::Assistant, "🎙 Assistant"),
                        (Tab::Console, "🖥 Console"),
                    ];
                    for (tab, label) in tabs {
                        if ui.selectable_label(self.current_tab == tab, label).clicked() {
                            self.set_tab(ctx, tab);
                        }
                    }

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("⚙ Settings").clicked() && self.settings_edit.is_none() {
                            self.settings_edit = Some(self.config.clone());
                        }
                        if self.voice.is_active() {
                            ui.colored_label(egui::Color32::LIGHT_GREEN, format!("🎙 {}", self.voice.state().label()));
                        }
                        if let Some(channel) = self.state.active_channel() {
                            ui.label(egui::RichText::new(&channel.name).weak());
                        }
                    });
                });
                ui.add_space(5.0);
            });

            // Bottom panel - Status
            egui::TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if self.loading || self.controller.state().buffering {
                        ui.spinner();
                    }
                    ui.label(&self.status_message);
                });
            });
        }

        let frame = if fullscreen {
            egui::Frame::NONE.fill(egui::Color32::BLACK)
        } else {
            egui::Frame::central_panel(&ctx.style())
        };
        egui::CentralPanel::default().frame(frame).show(ctx, |ui| match self.current_tab {
            Tab::Watch => self.show_watch_tab(ctx, ui, fullscreen),
            Tab::Guide => self.show_guide_tab(ui),
            Tab::Admin => self.show_admin_tab(ui),
            Tab::Assistant => self.show_assistant_tab(ui),
            Tab::Console => self.show_console_tab(ui),
        });

        if self.current_tab != Tab::Watch {
            // keep the session moving while the surface is hidden
            self.controller.poll(Instant::now());
            ctx.request_repaint_after(Duration::from_millis(250));
        }
        if self.voice.is_active() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
        if self.loading {
            ctx.request_repaint_after(Duration::from_millis(200));
        }

        self.show_settings_window(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.voice.disconnect();
        self.controller.unload();
        self.config.volume = self.controller.state().volume;
        self.config.save();
        tracing::info!("TVDeck exiting");
    }
}

impl TvApp {
    fn show_watch_tab(&mut self, ctx: &egui::Context, ui: &mut egui::Ui, fullscreen: bool) {
        let Some(channel) = self.state.active_channel().cloned() else {
            ui.vertical_centered(|ui| {
                ui.add_space(100.0);
                ui.heading("No channels");
                ui.label("Add channels in the Admin tab");
            });
            return;
        };

        let mut step: Option<bool> = None;
        let mut toggle_favorite = false;
        let mut new_rating = None;

        if !fullscreen {
            ui.horizontal(|ui| {
                if ui.button("⏮").on_hover_text("Previous channel (PageUp)").clicked() {
                    step = Some(false);
                }
                if ui.button("⏭").on_hover_text("Next channel (PageDown)").clicked() {
                    step = Some(true);
                }
                ui.heading(&channel.name);
                if !channel.current_program.is_empty() {
                    ui.label(egui::RichText::new(format!("Now: {}", channel.current_program)).weak());
                }
                ui.separator();
                let star = if channel.favorite() { "★ Favorite" } else { "☆ Favorite" };
                if ui.button(star).clicked() {
                    toggle_favorite = true;
                }
                new_rating = rating_input(ui, channel.rating);
            });
            ui.add_space(4.0);
        }

        self.player_view.show(ctx, ui, &mut self.controller, &channel.name);

        match step {
            Some(true) => {
                self.state.next_channel();
            }
            Some(false) => {
                self.state.previous_channel();
            }
            None => {}
        }
        if toggle_favorite {
            self.toggle_favorite(&channel.id);
        }
        if let Some(rating) = new_rating {
            self.set_rating(&channel.id, rating);
        }
    }

    fn show_guide_tab(&mut self, ui: &mut egui::Ui) {
        let categories = guide::categories(self.state.channels());
        if !categories.contains(&self.guide_category) {
            self.guide_category = guide::ALL_CATEGORIES.to_string();
        }

        ui.horizontal_wrapped(|ui| {
            for category in &categories {
                if ui.selectable_label(self.guide_category == *category, category.as_str()).clicked() {
                    self.guide_category = category.clone();
                }
            }
        });
        ui.horizontal(|ui| {
            ui.label("🔍");
            ui.add(
                egui::TextEdit::singleline(&mut self.guide_query)
                    .hint_text("Search channels, programs...")
                    .desired_width(320.0),
            );
            if !self.guide_query.is_empty() && ui.button("✖").clicked() {
                self.guide_query.clear();
            }
        });
        ui.separator();

        let mut events = Vec::new();
        {
            let filtered = guide::filter(self.state.channels(), &self.guide_category, &self.guide_query);
            let active = self.state.active_id();
            let grouped = guide::group(&filtered);

            egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
                if filtered.is_empty() {
                    ui.label(egui::RichText::new("No channels match").weak());
                }
                if !grouped.favorites.is_empty() {
                    ui.heading("★ Favorites");
                    for channel in &grouped.favorites {
                        guide_row(ui, channel, active, &mut events);
                    }
                    ui.add_space(8.0);
                }
                for (category, list) in &grouped.by_category {
                    ui.heading(if category.is_empty() { "Uncategorized" } else { category.as_str() });
                    for channel in list {
                        guide_row(ui, channel, active, &mut events);
                    }
                    ui.add_space(8.0);
                }
            });
        }

        for event in events {
            match event {
                GuideEvent::Select(id) => {
                    self.select_channel(&id);
                    self.current_tab = Tab::Watch;
                }
                GuideEvent::ToggleFavorite(id) => self.toggle_favorite(&id),
            }
        }
    }

    fn show_login(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(80.0);
            ui.heading("🔒 Admin");
            ui.label("Enter the admin password to edit channels");
            ui.add_space(10.0);

            let mut edit = egui::TextEdit::singleline(&mut self.password_input)
                .password(true)
                .hint_text("Password")
                .desired_width(240.0);
            if self.login_error {
                edit = edit.text_color(egui::Color32::LIGHT_RED);
            }
            let response = ui.add(edit);
            if self.login_error && response.changed() {
                self.login_error = false;
            }
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            ui.add_space(6.0);
            if ui.button("Unlock").clicked() || submitted {
                self.try_login();
            }
            if self.login_error {
                ui.colored_label(egui::Color32::LIGHT_RED, "Incorrect password");
            }
        });
    }

    fn show_admin_tab(&mut self, ui: &mut egui::Ui) {
        if !self.auth.is_authenticated() {
            self.show_login(ui);
            return;
        }

        let mut actions = Vec::new();
        let draft = self
            .draft
            .get_or_insert_with(|| AdminDraft::new(self.state.channels()));
        let selected_id = draft.selected_id().map(str::to_string);

        ui.horizontal_wrapped(|ui| {
            if ui.button("➕ New").clicked() {
                actions.push(AdminAction::New);
            }
            if let Some(ref id) = selected_id {
                if ui.button("⧉ Duplicate").clicked() {
                    actions.push(AdminAction::Duplicate(id.clone()));
                }
                if ui.button("🗑 Delete").clicked() {
                    actions.push(AdminAction::Delete(id.clone()));
                }
            }
            ui.separator();
            if ui.button("📂 Import M3U").clicked() {
                actions.push(AdminAction::ImportM3uFile);
            }
            ui.add(
                egui::TextEdit::singleline(&mut self.m3u_url_input)
                    .hint_text("Playlist URL")
                    .desired_width(220.0),
            );
            if ui
                .add_enabled(!self.loading && !self.m3u_url_input.trim().is_empty(), egui::Button::new("⬇ Fetch"))
                .clicked()
            {
                actions.push(AdminAction::ImportM3uUrl);
            }
            if ui.button("📥 Import JSON").clicked() {
                actions.push(AdminAction::ImportJson);
            }
            if ui.button("📤 Export JSON").clicked() {
                actions.push(AdminAction::ExportJson);
            }
            ui.separator();
            let dirty = draft.is_dirty();
            if ui.add_enabled(dirty, egui::Button::new("↩ Discard")).clicked() {
                actions.push(AdminAction::Discard);
            }
            if ui.add_enabled(dirty, egui::Button::new("✔ Publish")).clicked() {
                actions.push(AdminAction::Publish);
            }
            if dirty {
                ui.colored_label(egui::Color32::YELLOW, "Unpublished changes");
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🚪 Logout").clicked() {
                    actions.push(AdminAction::Logout);
                }
            });
        });
        ui.separator();

        egui::SidePanel::left("admin_list")
            .resizable(true)
            .default_width(260.0)
            .show_inside(ui, |ui| {
                ui.label(format!("{} channels", draft.channels().len()));
                egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
                    for channel in draft.channels() {
                        let is_selected = selected_id.as_deref() == Some(channel.id.as_str());
                        let label = if channel.name.is_empty() { "(unnamed)" } else { channel.name.as_str() };
                        if ui.selectable_label(is_selected, label).clicked() {
                            actions.push(AdminAction::Select(channel.id.clone()));
                        }
                    }
                });
            });

        egui::CentralPanel::default().show_inside(ui, |ui| {
            let Some(selected) = draft.selected().cloned() else {
                ui.label("Select a channel to edit");
                return;
            };
            let mut edited = selected.clone();

            egui::Grid::new("channel_form")
                .num_columns(2)
                .spacing([12.0, 8.0])
                .show(ui, |ui| {
                    ui.label("ID");
                    ui.label(egui::RichText::new(&edited.id).monospace());
                    ui.end_row();

                    ui.label("Name");
                    ui.add(egui::TextEdit::singleline(&mut edited.name).desired_width(360.0));
                    ui.end_row();

                    ui.label("Category");
                    ui.add(egui::TextEdit::singleline(&mut edited.category).desired_width(360.0));
                    ui.end_row();

                    ui.label("Video URL");
                    ui.add(egui::TextEdit::singleline(&mut edited.video_url).desired_width(360.0));
                    ui.end_row();

                    ui.label("Thumbnail");
                    ui.add(egui::TextEdit::singleline(&mut edited.thumbnail).desired_width(360.0));
                    ui.end_row();

                    ui.label("Current program");
                    ui.add(egui::TextEdit::singleline(&mut edited.current_program).desired_width(360.0));
                    ui.end_row();

                    ui.label("Description");
                    ui.add(egui::TextEdit::multiline(&mut edited.description).desired_width(360.0).desired_rows(3));
                    ui.end_row();

                    ui.label("Rating");
                    let mut rating = edited.rating.unwrap_or(0);
                    if ui.add(egui::Slider::new(&mut rating, 0..=MAX_RATING)).changed() {
                        edited.set_rating(rating);
                    }
                    ui.end_row();

                    ui.label("Favorite");
                    let mut favorite = edited.favorite();
                    if ui.checkbox(&mut favorite, "").changed() {
                        edited.is_favorite = Some(favorite);
                    }
                    ui.end_row();
                });

            if edited.name.trim().is_empty() || edited.video_url.trim().is_empty() {
                ui.add_space(6.0);
                ui.colored_label(egui::Color32::YELLOW, "⚠ A channel needs a name and a video URL");
            }

            if edited != selected {
                draft.update(&selected.id, |channel| *channel = edited);
            }
        });

        for action in actions {
            self.apply_admin_action(action);
        }
    }

    fn apply_admin_action(&mut self, action: AdminAction) {
        if matches!(action, AdminAction::Logout) {
            self.auth.logout();
            self.log("[INFO] Admin locked");
            return;
        }
        let Some(draft) = self.draft.as_mut() else { return };

        match action {
            AdminAction::New => {
                let id = draft.create();
                self.console.log(&format!("[INFO] Created channel {}", id));
            }
            AdminAction::Duplicate(id) => {
                if let Some(copy) = draft.duplicate(&id) {
                    self.console.log(&format!("[INFO] Duplicated {} as {}", id, copy));
                }
            }
            AdminAction::Delete(id) => {
                if draft.delete(&id) {
                    self.console.log(&format!("[INFO] Deleted channel {}", id));
                }
            }
            AdminAction::Select(id) => draft.select(&id),
            AdminAction::ImportM3uFile => {
                let Some(path) = rfd::FileDialog::new()
                    .set_title("Import M3U Playlist")
                    .add_filter("Playlists", &["m3u", "m3u8"])
                    .add_filter("All Files", &["*"])
                    .pick_file()
                else {
                    return;
                };
                match std::fs::read_to_string(&path) {
                    Ok(content) => {
                        let added = draft.import_m3u(&content);
                        self.console.log(&format!("[INFO] Imported {} channels from {}", added, path.display()));
                        self.status_message = format!("Imported {} channels (unpublished)", added);
                    }
                    Err(e) => self.console.log(&format!("[ERROR] Reading {} failed: {}", path.display(), e)),
                }
            }
            AdminAction::ImportM3uUrl => {
                let url = self.m3u_url_input.trim().to_string();
                self.loading = true;
                self.status_message = format!("Downloading {}...", url);
                let sender = self.task_sender.clone();
                thread::spawn(move || {
                    let result = m3u_import::download(&url);
                    let _ = sender.send(TaskResult::PlaylistDownloaded { url, result });
                });
            }
            AdminAction::ImportJson => {
                let Some(path) = rfd::FileDialog::new()
                    .set_title("Import Channels")
                    .add_filter("JSON", &["json"])
                    .pick_file()
                else {
                    return;
                };
                let result = std::fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|content| draft.import_json(&content));
                match result {
                    Ok(count) => {
                        self.console.log(&format!("[INFO] Loaded {} channels from {}", count, path.display()));
                        self.status_message = format!("Loaded {} channels (unpublished)", count);
                    }
                    Err(e) => {
                        self.console.log(&format!("[ERROR] Import failed: {}", e));
                        self.status_message = format!("Import failed: {}", e);
                    }
                }
            }
            AdminAction::ExportJson => {
                let Some(path) = rfd::FileDialog::new()
                    .set_title("Export Channels")
                    .set_file_name("channels.json")
                    .add_filter("JSON", &["json"])
                    .save_file()
                else {
                    return;
                };
                let result = draft
                    .export_json()
                    .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
                match result {
                    Ok(()) => self.console.log(&format!("[INFO] Exported channels to {}", path.display())),
                    Err(e) => self.console.log(&format!("[ERROR] Export failed: {}", e)),
                }
            }
            AdminAction::Discard => {
                draft.discard();
                self.console.log("[INFO] Discarded admin changes");
            }
            AdminAction::Publish => {
                let channels = draft.publish(self.state.channels());
                let count = channels.len();
                match self.state.commit(channels) {
                    Ok(()) => {
                        self.voice.update_channels(self.state.channels());
                        self.log(&format!("[INFO] Published {} channels", count));
                        self.set_status(format!("Published {} channels", count));
                    }
                    Err(e) => {
                        self.log(&format!("[ERROR] Publishing failed: {}", e));
                        self.set_status(format!("Publishing failed: {}", e));
                    }
                }
            }
            AdminAction::Logout => {}
        }
    }

    fn show_assistant_tab(&mut self, ui: &mut egui::Ui) {
        let state = self.voice.state();

        ui.horizontal(|ui| {
            ui.heading("🎙 Assistant");
            ui.separator();
            let color = match state {
                ConnectionState::Connected => egui::Color32::LIGHT_GREEN,
                ConnectionState::Connecting => egui::Color32::YELLOW,
                ConnectionState::Error => egui::Color32::LIGHT_RED,
                ConnectionState::Disconnected => egui::Color32::GRAY,
            };
            ui.colored_label(color, state.label());

            match state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    if ui.button("⏹ Stop").clicked() {
                        self.voice.disconnect();
                    }
                }
                ConnectionState::Disconnected | ConnectionState::Error => {
                    if ui.button("🎙 Start").clicked() {
                        self.start_voice();
                    }
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑 Clear").clicked() {
                    self.voice.clear_transcript();
                }
            });
        });

        ui.horizontal(|ui| {
            ui.label("Mic");
            ui.add(egui::ProgressBar::new((self.voice.input_level() * 4.0).clamp(0.0, 1.0)).desired_width(160.0));
            ui.label("Voice");
            ui.add(egui::ProgressBar::new((self.voice.output_level() * 4.0).clamp(0.0, 1.0)).desired_width(160.0));
        });

        if let Some(error) = self.voice.last_error() {
            ui.colored_label(egui::Color32::LIGHT_RED, format!("⚠ {}", error));
        }
        if self.config.api_key().is_none() {
            ui.label(
                egui::RichText::new(format!(
                    "Set a Gemini API key in Settings or the {} environment variable",
                    config::API_KEY_ENV
                ))
                .weak(),
            );
        }
        ui.label(egui::RichText::new("Ask for a channel (\"put on the news\") or a recommendation").weak());
        ui.separator();

        let input_height = 36.0;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .max_height((ui.available_height() - input_height).max(60.0))
            .show(ui, |ui| {
                for entry in self.voice.transcript() {
                    let (who, color) = match entry.speaker {
                        Speaker::User => ("You", egui::Color32::LIGHT_BLUE),
                        Speaker::Assistant => ("Assistant", egui::Color32::LIGHT_GREEN),
                    };
                    ui.horizontal_wrapped(|ui| {
                        ui.label(egui::RichText::new(format!("{}:", who)).strong().color(color));
                        ui.label(&entry.text);
                    });
                }
            });

        ui.horizontal(|ui| {
            let connected = state == ConnectionState::Connected;
            let response = ui.add_enabled(
                connected,
                egui::TextEdit::singleline(&mut self.voice_input)
                    .hint_text("Type a request...")
                    .desired_width(ui.available_width() - 80.0),
            );
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if (ui.add_enabled(connected, egui::Button::new("Send")).clicked() || submitted)
                && self.voice.send_text(&self.voice_input)
            {
                self.voice_input.clear();
            }
        });
    }

    fn show_console_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Console Log");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑 Clear").clicked() {
                    self.console.clear();
                    self.console.push(format!("[{}] Console cleared", timestamp_now()));
                }
            });
        });
        ui.separator();

        // Display log entries with monospace font
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in self.console.snapshot() {
                    let color = if line.contains("[ERROR]") || line.contains("ERROR ") {
                        egui::Color32::RED
                    } else if line.contains("[WARN]") || line.contains("WARN ") {
                        egui::Color32::YELLOW
                    } else if line.contains("[PLAY]") || line.contains("[VOICE]") {
                        egui::Color32::GREEN
                    } else if line.contains("[INFO]") || line.contains("INFO ") {
                        egui::Color32::LIGHT_BLUE
                    } else {
                        egui::Color32::GRAY
                    };
                    ui.label(egui::RichText::new(line).monospace().color(color));
                }
            });
    }

    fn show_settings_window(&mut self, ctx: &egui::Context) {
        let Some(mut edit) = self.settings_edit.take() else { return };
        let mut open = true;
        let mut save = false;
        let mut cancel = false;

        egui::Window::new("⚙ Settings")
            .open(&mut open)
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid")
                    .num_columns(2)
                    .spacing([12.0, 8.0])
                    .show(ui, |ui| {
                        ui.label("Player");
                        ui.horizontal(|ui| {
                            ui.add_enabled_ui(cfg!(feature = "internal-player"), |ui| {
                                ui.radio_value(&mut edit.player_mode, PlayerMode::Internal, "Internal")
                                    .on_disabled_hover_text("Build with --features internal-player");
                            });
                            ui.radio_value(&mut edit.player_mode, PlayerMode::External, "External");
                        });
                        ui.end_row();

                        ui.label("External player");
                        ui.horizontal(|ui| {
                            ui.add(egui::TextEdit::singleline(&mut edit.external_player).desired_width(200.0));
                            if ui.button("📁").on_hover_text("Browse for player executable").clicked() {
                                if let Some(path) = rfd::FileDialog::new().set_title("Select Media Player").pick_file() {
                                    edit.external_player = path.display().to_string();
                                }
                            }
                        });
                        ui.end_row();

                        ui.label("Seed URL");
                        ui.add(egui::TextEdit::singleline(&mut edit.seed_url).desired_width(260.0))
                            .on_hover_text("Channel JSON fetched when nothing is stored yet");
                        ui.end_row();

                        ui.label("Admin password");
                        ui.add(egui::TextEdit::singleline(&mut edit.admin_password).password(true).desired_width(200.0));
                        ui.end_row();

                        ui.label("Gemini API key");
                        ui.add(egui::TextEdit::singleline(&mut edit.voice_api_key).password(true).desired_width(260.0));
                        ui.end_row();

                        ui.label("Voice model");
                        ui.add(egui::TextEdit::singleline(&mut edit.voice_model).desired_width(260.0));
                        ui.end_row();

                        ui.label("Voice");
                        ui.add(egui::TextEdit::singleline(&mut edit.voice_name).desired_width(120.0));
                        ui.end_row();

                        ui.label("Dark mode");
                        ui.checkbox(&mut edit.dark_mode, "");
                        ui.end_row();

                        ui.label("Font size");
                        ui.add(egui::Slider::new(&mut edit.font_size, 10..=24));
                        ui.end_row();
                    });

                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("💾 Save").clicked() {
                        save = true;
                    }
                    if ui.button("Cancel").clicked() {
                        cancel = true;
                    }
                });
            });

        if save {
            self.apply_settings(ctx, edit);
        } else if open && !cancel {
            self.settings_edit = Some(edit);
        }
    }
}
