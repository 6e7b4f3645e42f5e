//! Player surface embedded in the Watch tab

use std::time::{Duration, Instant};

use super::MediaController;

/// Format seconds as m:ss or h:mm:ss
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

pub struct PlayerView {
    texture: Option<egui::TextureHandle>,
    channel_id: Option<String>,
}

impl PlayerView {
    pub fn new() -> Self {
        Self { texture: None, channel_id: None }
    }

    /// Render video, status and overlay controls for the controller's session
    pub fn show(&mut self, ctx: &egui::Context, ui: &mut egui::Ui, controller: &mut MediaController, title: &str) {
        let now = Instant::now();
        controller.poll(now);

        // Drop the last frame of the previous channel
        let current = controller.channel_id().map(str::to_string);
        if current != self.channel_id {
            self.texture = None;
            self.channel_id = current;
        }

        if let Some(frame) = controller.take_frame() {
            let image = egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &frame.data);
            match self.texture {
                Some(ref mut texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => self.texture = Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR)),
            }
        }

        let available = ui.available_size();
        let surface_height = (available.y - 8.0).max(120.0);
        let (rect, response) =
            ui.allocate_exact_size(egui::vec2(available.x, surface_height), egui::Sense::click());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, egui::Color32::BLACK);

        if let Some(ref texture) = self.texture {
            let tex_size = texture.size_vec2();
            let scale = f32::min(rect.width() / tex_size.x, rect.height() / tex_size.y);
            let video_rect = egui::Rect::from_center_size(rect.center(), tex_size * scale);
            painter.image(
                texture.id(),
                video_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        } else if controller.channel_id().is_some() && controller.state().playing {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                format!("{}\nplaying in external player", title),
                egui::FontId::proportional(18.0),
                egui::Color32::GRAY,
            );
        }

        if response.hovered() && ui.input(|i| i.pointer.delta() != egui::Vec2::ZERO) {
            controller.activity(now);
        }
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let x_fraction = (pos.x - rect.left()) / rect.width().max(1.0);
                controller.tap(x_fraction, now);
            }
        }

        self.handle_keys(ctx, controller, now);

        let state = controller.state().clone();
        let center = egui::Rect::from_center_size(rect.center(), egui::vec2(220.0, 80.0));

        if let Some(ref error) = state.error {
            let error_rect = egui::Rect::from_center_size(
                rect.center() - egui::vec2(0.0, 60.0),
                egui::vec2(rect.width() * 0.8, 30.0),
            );
            ui.put(error_rect, egui::Label::new(egui::RichText::new(format!("⚠ {}", error)).color(egui::Color32::LIGHT_RED)));
        }

        if state.needs_user_play {
            let button = egui::Button::new(egui::RichText::new("▶ Tap to play").size(22.0));
            if ui.put(center, button).clicked() {
                controller.play();
            }
        } else if state.buffering {
            ui.put(center, egui::Spinner::new().size(48.0));
        }

        if controller.controls_visible() && controller.channel_id().is_some() {
            let bar = egui::Rect::from_min_max(egui::pos2(rect.left(), rect.bottom() - 40.0), rect.max);
            ui.painter().rect_filled(bar, 0.0, egui::Color32::from_black_alpha(160));
            ui.scope_builder(egui::UiBuilder::new().max_rect(bar.shrink2(egui::vec2(8.0, 4.0))), |ui| {
                ui.horizontal_centered(|ui| self.controls_bar(ctx, ui, controller, title));
            });
        }

        if state.playing || state.buffering {
            ctx.request_repaint();
        } else {
            // keep the auto-hide timer ticking
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }

    fn controls_bar(&self, ctx: &egui::Context, ui: &mut egui::Ui, controller: &mut MediaController, title: &str) {
        let state = controller.state().clone();

        let play_text = if state.playing { "⏸" } else { "▶" };
        if ui.button(play_text).on_hover_text("Play/Pause (Space)").clicked() {
            controller.toggle_play();
        }

        let mute_text = if state.muted || state.volume == 0.0 { "🔇" } else { "🔊" };
        if ui.button(mute_text).on_hover_text("Mute (M)").clicked() {
            controller.toggle_mute();
        }

        let mut volume = state.volume;
        if ui
            .add(egui::Slider::new(&mut volume, 0.0..=1.0).show_value(false))
            .changed()
        {
            controller.set_volume(volume);
        }

        match state.duration {
            Some(duration) => {
                ui.label(format!("{} / {}", format_time(state.current_time), format_time(duration)));
                let mut position = state.current_time;
                let seek = ui.add(egui::Slider::new(&mut position, 0.0..=duration).show_value(false));
                if seek.drag_stopped() || (seek.changed() && !seek.dragged()) {
                    controller.seek_by(position - state.current_time);
                }
            }
            None => {
                ui.colored_label(egui::Color32::LIGHT_RED, "● LIVE");
            }
        }

        ui.label(egui::RichText::new(title).strong());

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            let fs_text = if state.fullscreen { "🗗" } else { "⛶" };
            if ui.button(fs_text).on_hover_text("Fullscreen (F)").clicked() {
                let fullscreen = controller.toggle_fullscreen();
                ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
            }
        });
    }

    fn handle_keys(&self, ctx: &egui::Context, controller: &mut MediaController, now: Instant) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let (space, mute, fullscreen, escape, left, right) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Space),
                i.key_pressed(egui::Key::M),
                i.key_pressed(egui::Key::F),
                i.key_pressed(egui::Key::Escape),
                i.key_pressed(egui::Key::ArrowLeft),
                i.key_pressed(egui::Key::ArrowRight),
            )
        });

        if space || mute || fullscreen || left || right {
            controller.activity(now);
        }
        if space {
            controller.toggle_play();
        }
        if mute {
            controller.toggle_mute();
        }
        if left {
            controller.seek_by(-super::gestures::SEEK_STEP_SECS);
        }
        if right {
            controller.seek_by(super::gestures::SEEK_STEP_SECS);
        }
        if fullscreen || (escape && controller.state().fullscreen) {
            let fs = controller.toggle_fullscreen();
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(fs));
        }
    }
}

impl Default for PlayerView {
    fn default() -> Self {
        Self::new()
    }
}
