//! External player process (mpv, vlc, ffplay, ...) driven as a media element
//!
//! Only one player window exists at a time; loading a new source kills the
//! previous process. The player has no control channel, so pause stops the
//! process and seeking relaunches it at the new offset. Mute and volume are
//! launch arguments, so changing them relaunches at the current position.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{ElementEvent, MediaElement, PlayRejected};

/// Player executable, with common install locations probed on Windows
fn resolve_player(player: &str) -> String {
    let player = if player.trim().is_empty() { "mpv" } else { player.trim() };

    #[cfg(target_os = "windows")]
    {
        let lower = player.to_lowercase();
        let candidates: &[&str] = if lower == "vlc" || lower == "vlc.exe" {
            &[
                r"C:\Program Files\VideoLAN\VLC\vlc.exe",
                r"C:\Program Files (x86)\VideoLAN\VLC\vlc.exe",
            ]
        } else if lower == "mpv" || lower == "mpv.exe" {
            &[
                r"C:\Program Files\mpv\mpv.exe",
                r"C:\Program Files (x86)\mpv\mpv.exe",
                r"C:\mpv\mpv.exe",
            ]
        } else if lower == "ffplay" || lower == "ffplay.exe" {
            &[r"C:\ffmpeg\bin\ffplay.exe", r"C:\Program Files\ffmpeg\bin\ffplay.exe"]
        } else {
            &[]
        };
        if let Some(found) = candidates.iter().find(|p| std::path::Path::new(p).exists()) {
            return found.to_string();
        }
    }

    player.to_string()
}

/// Command-line arguments for `player`, by player family
pub fn build_args(player: &str, url: &str, muted: bool, volume: f32, start: f64) -> Vec<String> {
    let player_lower = player.to_lowercase();
    let stream_name = url.split(['?', '#']).next().unwrap_or(url).rsplit('/').next().unwrap_or("stream");
    let title = format!("TVDeck - {}", stream_name);
    let volume_pct = (volume.clamp(0.0, 1.0) * 100.0).round() as u32;

    let mut args = vec![url.to_string()];
    if player_lower.contains("mpv") {
        args.extend([
            format!("--title={}", title),
            "--cache=yes".to_string(),
            "--keep-open=no".to_string(),
            "--force-seekable=yes".to_string(),
            "--hr-seek=yes".to_string(),
            "--stream-lavf-o=reconnect=1".to_string(),
            "--stream-lavf-o=reconnect_streamed=1".to_string(),
            "--ytdl=no".to_string(),
            format!("--volume={}", volume_pct),
        ]);
        if muted {
            args.push("--mute=yes".to_string());
        }
        if start > 0.0 {
            args.push(format!("--start={:.1}", start));
        }
    } else if player_lower.contains("vlc") {
        args.extend([
            format!("--meta-title={}", title),
            "--http-reconnect".to_string(),
            "--play-and-exit".to_string(),
            format!("--gain={:.2}", volume.clamp(0.0, 1.0)),
        ]);
        if muted {
            args.push("--no-audio".to_string());
        }
        if start > 0.0 {
            args.push(format!("--start-time={:.1}", start));
        }
    } else if player_lower.contains("ffplay") {
        args.extend([
            "-autoexit".to_string(),
            "-window_title".to_string(),
            title,
            "-volume".to_string(),
            if muted { "0".to_string() } else { volume_pct.to_string() },
        ]);
        if url.starts_with("http") {
            args.extend([
                "-reconnect".to_string(),
                "1".to_string(),
                "-reconnect_streamed".to_string(),
                "1".to_string(),
            ]);
        }
        if start > 0.0 {
            args.extend(["-ss".to_string(), format!("{:.1}", start)]);
        }
    }
    // Generic player - just the URL
    args
}

/// Volume slider drags are coalesced into one relaunch
const VOLUME_RELAUNCH_DELAY: Duration = Duration::from_millis(400);

pub struct ExternalPlayer {
    command: String,
    url: Option<String>,
    child: Option<Child>,
    muted: bool,
    volume: f32,
    /// Offset the running process started at, and when
    start_position: f64,
    started_at: Option<Instant>,
    /// Arguments of the current or last launch
    launch_args: Vec<String>,
    relaunch_at: Option<Instant>,
    events: Vec<ElementEvent>,
}

impl ExternalPlayer {
    pub fn new(command: &str) -> Self {
        Self {
            command: resolve_player(command),
            url: None,
            child: None,
            muted: false,
            volume: 1.0,
            start_position: 0.0,
            started_at: None,
            launch_args: Vec::new(),
            relaunch_at: None,
            events: Vec::new(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn launch_args(&self) -> &[String] {
        &self.launch_args
    }

    /// Playback position of the running process
    fn position(&self) -> f64 {
        self.start_position + self.started_at.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait(); // Reap the process
        }
        self.started_at = None;
        self.relaunch_at = None;
    }

    /// Restart the running player with current settings where it left off
    fn relaunch(&mut self) {
        self.start_position = self.position();
        if let Err(e) = self.spawn() {
            self.events.push(ElementEvent::Error(e.0));
        }
    }

    fn spawn(&mut self) -> Result<(), PlayRejected> {
        let Some(url) = self.url.clone() else {
            return Err(PlayRejected("No source".to_string()));
        };
        self.kill();

        let args = build_args(&self.command, &url, self.muted, self.volume, self.start_position);
        tracing::info!("Launching {} for {}", self.command, url);

        let mut cmd = Command::new(&self.command);
        cmd.args(&args);
        self.launch_args = args;

        // On Windows, hide the console window for ffplay
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            if self.command.to_lowercase().contains("ffplay") {
                cmd.creation_flags(CREATE_NO_WINDOW);
            }
        }

        cmd.stderr(Stdio::piped());
        cmd.stdout(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| PlayRejected(format!("Failed to launch '{}': {}", self.command, e)))?;
        tracing::info!("Player launched (PID: {})", child.id());

        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    if !line.trim().is_empty() {
                        tracing::debug!("[PLAYER] {}", line);
                    }
                }
            });
        }

        self.child = Some(child);
        self.started_at = Some(Instant::now());
        self.events.push(ElementEvent::Playing);
        Ok(())
    }
}

impl MediaElement for ExternalPlayer {
    fn supports_native_hls(&self) -> bool {
        true
    }

    fn set_source(&mut self, url: &str) {
        self.kill();
        self.url = Some(url.to_string());
        self.start_position = 0.0;
    }

    fn reload(&mut self) {
        self.kill();
    }

    fn clear_source(&mut self) {
        self.kill();
        self.url = None;
        self.start_position = 0.0;
    }

    fn play(&mut self) -> Result<(), PlayRejected> {
        if self.child.is_some() {
            return Ok(());
        }
        self.spawn()
    }

    fn pause(&mut self) {
        self.start_position = self.position();
        if self.child.is_some() {
            self.kill();
            self.events.push(ElementEvent::Paused);
        }
    }

    fn seek(&mut self, position: f64) {
        self.start_position = position.max(0.0);
        if self.child.is_some() {
            if let Err(e) = self.spawn() {
                self.events.push(ElementEvent::Error(e.0));
            }
        }
    }

    fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        if volume == self.volume {
            return;
        }
        self.volume = volume;
        if self.child.is_some() {
            self.relaunch_at = Some(Instant::now() + VOLUME_RELAUNCH_DELAY);
        }
    }

    fn set_muted(&mut self, muted: bool) {
        if muted == self.muted {
            return;
        }
        self.muted = muted;
        if self.child.is_some() {
            tracing::debug!("Relaunching player {}", if muted { "muted" } else { "unmuted" });
            self.relaunch();
        }
    }

    fn poll_events(&mut self) -> Vec<ElementEvent> {
        if self.relaunch_at.is_some_and(|at| Instant::now() >= at) && self.child.is_some() {
            tracing::debug!("Relaunching player at volume {:.2}", self.volume);
            self.relaunch();
        }

        let exited = match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(Some(status))) => Some(status),
            Some(Err(e)) => {
                self.events.push(ElementEvent::Error(format!("Player status unavailable: {}", e)));
                None
            }
            _ => None,
        };

        if let Some(status) = exited {
            self.child = None;
            self.started_at = None;
            self.relaunch_at = None;
            if status.success() {
                self.events.push(ElementEvent::Ended);
            } else {
                self.events.push(ElementEvent::Error(match status.code() {
                    Some(code) => format!("Player exited with code {}", code),
                    None => "Player terminated".to_string(),
                }));
            }
        } else if self.started_at.is_some() {
            self.events.push(ElementEvent::TimeUpdate(self.position()));
        }

        std::mem::take(&mut self.events)
    }
}

impl Drop for ExternalPlayer {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpv_args() {
        let args = build_args("mpv", "https://cdn.example.com/live/master.m3u8?t=1", true, 0.5, 0.0);
        assert_eq!(args[0], "https://cdn.example.com/live/master.m3u8?t=1");
        assert!(args.contains(&"--title=TVDeck - master.m3u8".to_string()));
        assert!(args.contains(&"--mute=yes".to_string()));
        assert!(args.contains(&"--volume=50".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--start")));
    }

    #[test]
    fn test_start_offset_per_player() {
        assert!(build_args("/usr/bin/mpv", "http://a/b.mp4", false, 1.0, 42.0).contains(&"--start=42.0".to_string()));
        assert!(build_args("vlc", "http://a/b.mp4", false, 1.0, 42.0).contains(&"--start-time=42.0".to_string()));
        let ffplay = build_args("ffplay", "http://a/b.mp4", false, 1.0, 42.0);
        let ss = ffplay.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(ffplay[ss + 1], "42.0");
    }

    #[test]
    fn test_ffplay_muted_volume() {
        let args = build_args("ffplay", "udp://@239.0.0.1:1234", true, 0.8, 0.0);
        let vol = args.iter().position(|a| a == "-volume").unwrap();
        assert_eq!(args[vol + 1], "0");
        assert!(!args.contains(&"-reconnect".to_string()));
    }

    #[test]
    fn test_generic_player_gets_url_only() {
        assert_eq!(build_args("celluloid-x", "http://a/b.mp4", false, 1.0, 0.0), vec!["http://a/b.mp4"]);
    }

    #[test]
    fn test_play_without_source_is_rejected() {
        let mut player = ExternalPlayer::new("mpv");
        assert!(player.supports_native_hls());
        assert!(player.play().is_err());
        assert!(!player.is_running());
    }

    #[test]
    fn test_missing_binary_is_rejected() {
        let mut player = ExternalPlayer::new("tvdeck-no-such-player");
        player.set_source("http://a/b.mp4");
        let err = player.play().unwrap_err();
        assert!(err.0.contains("tvdeck-no-such-player"));
        assert!(player.poll_events().is_empty());
    }

    /// A stand-in player: a `mpv` link to `sh` that runs the "source" script
    #[cfg(unix)]
    fn fake_mpv(dir: &std::path::Path) -> (String, String) {
        let player = dir.join("mpv");
        std::os::unix::fs::symlink("/bin/sh", &player).unwrap();
        let script = dir.join("stream.sh");
        std::fs::write(&script, "exec sleep 30\n").unwrap();
        (player.display().to_string(), script.display().to_string())
    }

    #[cfg(unix)]
    #[test]
    fn test_mute_and_volume_relaunch_running_player() {
        let dir = tempfile::tempdir().unwrap();
        let (command, source) = fake_mpv(dir.path());
        let mut player = ExternalPlayer::new(&command);
        player.set_source(&source);
        player.play().unwrap();
        assert!(!player.launch_args().contains(&"--mute=yes".to_string()));

        player.set_muted(true);
        assert!(player.is_running());
        assert!(player.launch_args().contains(&"--mute=yes".to_string()));

        player.set_volume(0.3);
        assert!(player.launch_args().contains(&"--volume=100".to_string()));
        thread::sleep(VOLUME_RELAUNCH_DELAY + Duration::from_millis(100));
        let events = player.poll_events();
        assert!(player.is_running());
        assert!(player.launch_args().contains(&"--volume=30".to_string()));
        assert!(player.launch_args().contains(&"--mute=yes".to_string()));
        assert!(!events.iter().any(|e| matches!(e, ElementEvent::Error(_))));
    }

    #[test]
    fn test_settings_while_stopped_apply_on_next_launch() {
        let mut player = ExternalPlayer::new("mpv");
        player.set_volume(0.4);
        player.set_muted(true);
        assert!(!player.is_running());
        assert!(player.launch_args().is_empty());
        assert!(player.relaunch_at.is_none());
    }
}
