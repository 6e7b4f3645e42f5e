// In-window video element using ffmpeg-next
// Requires FFmpeg libraries: libavcodec, libavformat, libavutil, libswscale
//
// To install FFmpeg development libraries:
// - Ubuntu/Debian: sudo apt install libavcodec-dev libavformat-dev libavutil-dev libswscale-dev libavdevice-dev
// - Fedora: sudo dnf install ffmpeg-devel
// - macOS: brew install ffmpeg
// - Windows: Download from https://ffmpeg.org and set FFMPEG_DIR environment variable

/// Decoded video frame for rendering
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB24 data
    pub pts: i64,
}

#[cfg(feature = "internal-player")]
mod player_impl {
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    extern crate ffmpeg_next as ffmpeg;
    use ffmpeg::format::Pixel;
    use ffmpeg::media::Type;
    use ffmpeg::software::scaling::{context::Context as ScalingContext, flag::Flags};
    use ffmpeg::util::frame::video::Video as VideoFrame;

    use super::DecodedFrame;
    use crate::media::{ElementEvent, MediaElement, PlayRejected};

    const USER_AGENT: &str = concat!("TVDeck/", env!("CARGO_PKG_VERSION"));
    /// FFmpeg's AV_TIME_BASE
    const TIME_BASE: f64 = 1_000_000.0;
    const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

    /// Commands to send to the decode thread
    enum PlayerCommand {
        Stop,
        Pause,
        Resume,
        Seek(f64),
    }

    pub struct InternalPlayer {
        url: Option<String>,
        command_sender: Option<Sender<PlayerCommand>>,
        event_receiver: Option<Receiver<ElementEvent>>,
        current_frame: Arc<Mutex<Option<DecodedFrame>>>,
        volume: f32,
        muted: bool,
    }

    impl InternalPlayer {
        pub fn new() -> Self {
            if let Err(e) = ffmpeg::init() {
                tracing::error!("FFmpeg init failed: {}", e);
            }

            Self {
                url: None,
                command_sender: None,
                event_receiver: None,
                current_frame: Arc::new(Mutex::new(None)),
                volume: 1.0,
                muted: false,
            }
        }

        fn start(&mut self, url: &str) {
            let (cmd_tx, cmd_rx) = channel();
            let (event_tx, event_rx) = channel();
            self.command_sender = Some(cmd_tx);
            self.event_receiver = Some(event_rx);

            let url = url.to_string();
            let current_frame = Arc::clone(&self.current_frame);
            thread::spawn(move || {
                if let Err(e) = Self::decode_thread(&url, &current_frame, &cmd_rx, &event_tx) {
                    let _ = event_tx.send(ElementEvent::Error(e));
                }
            });
        }

        fn stop(&mut self) {
            if let Some(sender) = self.command_sender.take() {
                let _ = sender.send(PlayerCommand::Stop);
            }
            self.event_receiver = None;
            *self.current_frame.lock() = None;
        }

        fn send(&self, command: PlayerCommand) {
            if let Some(ref sender) = self.command_sender {
                let _ = sender.send(command);
            }
        }

        fn decode_thread(
            url: &str,
            current_frame: &Mutex<Option<DecodedFrame>>,
            cmd_rx: &Receiver<PlayerCommand>,
            events: &Sender<ElementEvent>,
        ) -> Result<(), String> {
            let _ = events.send(ElementEvent::Waiting);

            // Set options for network streams
            let mut options = ffmpeg::Dictionary::new();
            options.set("user_agent", USER_AGENT);
            options.set("reconnect", "1");
            options.set("reconnect_streamed", "1");
            options.set("reconnect_delay_max", "5");
            options.set("timeout", "5000000"); // 5 second timeout

            let mut ictx = ffmpeg::format::input_with_dictionary(url, options)
                .map_err(|e| format!("Failed to open stream: {}", e))?;

            if ictx.duration() > 0 {
                let _ = events.send(ElementEvent::DurationChange(ictx.duration() as f64 / TIME_BASE));
            }

            let (video_stream_index, time_base, parameters) = {
                let stream = ictx
                    .streams()
                    .best(Type::Video)
                    .ok_or_else(|| "No video stream found".to_string())?;
                (stream.index(), f64::from(stream.time_base()), stream.parameters())
            };

            let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
                .and_then(|c| c.decoder().video())
                .map_err(|e| format!("Failed to create decoder: {}", e))?;

            let width = decoder.width();
            let height = decoder.height();

            // Scale to reasonable size if too large
            let (target_width, target_height) = if width > 1280 || height > 720 {
                let scale = f64::min(1280.0 / width as f64, 720.0 / height as f64);
                ((width as f64 * scale) as u32, (height as f64 * scale) as u32)
            } else {
                (width, height)
            };

            let mut scaler = ScalingContext::get(
                decoder.format(),
                width,
                height,
                Pixel::RGB24,
                target_width,
                target_height,
                Flags::BILINEAR,
            )
            .map_err(|e| format!("Failed to create scaler: {}", e))?;

            let _ = events.send(ElementEvent::Playing);

            let mut paused = false;
            let frame_duration = Duration::from_secs_f64(1.0 / 30.0); // Target 30fps display
            let mut last_frame_time = Instant::now();
            let mut last_time_update = Instant::now();

            loop {
                match cmd_rx.try_recv() {
                    Ok(PlayerCommand::Stop) | Err(TryRecvError::Disconnected) => return Ok(()),
                    Ok(PlayerCommand::Pause) => {
                        paused = true;
                        let _ = events.send(ElementEvent::Paused);
                    }
                    Ok(PlayerCommand::Resume) => {
                        paused = false;
                        let _ = events.send(ElementEvent::Playing);
                    }
                    Ok(PlayerCommand::Seek(position)) => {
                        let ts = (position * TIME_BASE) as i64;
                        match ictx.seek(ts, ..ts) {
                            Ok(()) => {
                                decoder.flush();
                                let _ = events.send(ElementEvent::TimeUpdate(position));
                            }
                            Err(e) => tracing::warn!("Seek to {:.1}s failed: {}", position, e),
                        }
                    }
                    Err(TryRecvError::Empty) => {}
                }

                if paused {
                    thread::sleep(Duration::from_millis(50));
                    continue;
                }

                let mut packet = ffmpeg::Packet::empty();
                match packet.read(&mut ictx) {
                    Ok(()) => {}
                    Err(ffmpeg::Error::Eof) => break,
                    Err(e) => return Err(format!("Read failed: {}", e)),
                }

                if packet.stream() != video_stream_index {
                    continue;
                }
                if decoder.send_packet(&packet).is_err() {
                    continue;
                }

                let mut decoded = VideoFrame::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    let mut rgb_frame = VideoFrame::empty();
                    if scaler.run(&decoded, &mut rgb_frame).is_err() {
                        continue;
                    }
                    let data = rgb_frame.data(0);
                    let stride = rgb_frame.stride(0);

                    // Copy frame data (handling stride)
                    let mut frame_data = Vec::with_capacity((target_width * target_height * 3) as usize);
                    for y in 0..target_height as usize {
                        let row_start = y * stride;
                        let row_end = row_start + (target_width as usize * 3);
                        frame_data.extend_from_slice(&data[row_start..row_end]);
                    }

                    let pts = decoded.pts().unwrap_or(0);
                    *current_frame.lock() = Some(DecodedFrame {
                        width: target_width,
                        height: target_height,
                        data: frame_data,
                        pts,
                    });

                    if last_time_update.elapsed() >= TIME_UPDATE_INTERVAL {
                        let _ = events.send(ElementEvent::TimeUpdate(pts as f64 * time_base));
                        last_time_update = Instant::now();
                    }

                    // Rate limiting to avoid overwhelming the UI
                    let elapsed = last_frame_time.elapsed();
                    if elapsed < frame_duration {
                        thread::sleep(frame_duration - elapsed);
                    }
                    last_frame_time = Instant::now();
                }
            }

            let _ = events.send(ElementEvent::Ended);
            Ok(())
        }
    }

    impl MediaElement for InternalPlayer {
        fn supports_native_hls(&self) -> bool {
            // FFmpeg would open every variant of a master playlist
            false
        }

        fn set_source(&mut self, url: &str) {
            self.stop();
            self.url = Some(url.to_string());
        }

        fn reload(&mut self) {
            self.stop();
        }

        fn clear_source(&mut self) {
            self.stop();
            self.url = None;
        }

        fn play(&mut self) -> Result<(), PlayRejected> {
            let url = self
                .url
                .clone()
                .ok_or_else(|| PlayRejected("No source".to_string()))?;
            if self.command_sender.is_some() {
                self.send(PlayerCommand::Resume);
            } else {
                self.start(&url);
            }
            Ok(())
        }

        fn pause(&mut self) {
            self.send(PlayerCommand::Pause);
        }

        fn seek(&mut self, position: f64) {
            self.send(PlayerCommand::Seek(position));
        }

        // Video only; audio levels are kept for when the element is swapped
        fn set_volume(&mut self, volume: f32) {
            self.volume = volume.clamp(0.0, 1.0);
        }

        fn set_muted(&mut self, muted: bool) {
            self.muted = muted;
        }

        fn poll_events(&mut self) -> Vec<ElementEvent> {
            let mut events = Vec::new();
            if let Some(ref receiver) = self.event_receiver {
                loop {
                    match receiver.try_recv() {
                        Ok(event) => events.push(event),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            self.event_receiver = None;
                            self.command_sender = None;
                            break;
                        }
                    }
                }
            }
            events
        }

        fn take_frame(&mut self) -> Option<DecodedFrame> {
            self.current_frame.lock().take()
        }
    }

    impl Drop for InternalPlayer {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

// Stub implementation when internal-player feature is disabled
#[cfg(not(feature = "internal-player"))]
mod player_impl {
    use crate::media::{ElementEvent, MediaElement, PlayRejected};

    pub struct InternalPlayer {
        url: Option<String>,
    }

    impl InternalPlayer {
        pub fn new() -> Self {
            Self { url: None }
        }
    }

    impl MediaElement for InternalPlayer {
        fn supports_native_hls(&self) -> bool {
            false
        }
        fn set_source(&mut self, url: &str) {
            self.url = Some(url.to_string());
        }
        fn reload(&mut self) {}
        fn clear_source(&mut self) {
            self.url = None;
        }
        fn play(&mut self) -> Result<(), PlayRejected> {
            Err(PlayRejected(
                "Internal player not enabled. Build with --features internal-player".to_string(),
            ))
        }
        fn pause(&mut self) {}
        fn seek(&mut self, _position: f64) {}
        fn set_volume(&mut self, _volume: f32) {}
        fn set_muted(&mut self, _muted: bool) {}
        fn poll_events(&mut self) -> Vec<ElementEvent> {
            Vec::new()
        }
    }
}

pub use player_impl::InternalPlayer;
