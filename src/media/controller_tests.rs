//! Tests for the media session state machine

#[cfg(test)]
mod tests {
    use crate::media::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct ElementLog {
        calls: Vec<String>,
        /// Results handed out by successive play() calls; Ok when exhausted
        play_results: VecDeque<Result<(), PlayRejected>>,
        events: Vec<ElementEvent>,
        muted: bool,
    }

    struct MockElement {
        native_hls: bool,
        log: Rc<RefCell<ElementLog>>,
    }

    impl MediaElement for MockElement {
        fn supports_native_hls(&self) -> bool {
            self.native_hls
        }
        fn set_source(&mut self, url: &str) {
            self.log.borrow_mut().calls.push(format!("set_source {}", url));
        }
        fn reload(&mut self) {
            self.log.borrow_mut().calls.push("reload".to_string());
        }
        fn clear_source(&mut self) {
            self.log.borrow_mut().calls.push("clear".to_string());
        }
        fn play(&mut self) -> Result<(), PlayRejected> {
            let mut log = self.log.borrow_mut();
            let muted = log.muted;
            log.calls.push(format!("play muted={}", muted));
            log.play_results.pop_front().unwrap_or(Ok(()))
        }
        fn pause(&mut self) {
            self.log.borrow_mut().calls.push("pause".to_string());
        }
        fn seek(&mut self, position: f64) {
            self.log.borrow_mut().calls.push(format!("seek {}", position));
        }
        fn set_volume(&mut self, _volume: f32) {}
        fn set_muted(&mut self, muted: bool) {
            self.log.borrow_mut().muted = muted;
        }
        fn poll_events(&mut self) -> Vec<ElementEvent> {
            std::mem::take(&mut self.log.borrow_mut().events)
        }
    }

    #[derive(Default)]
    struct StreamLog {
        created: Vec<String>,
        live: i32,
        calls: Vec<String>,
        events: Vec<StreamEvent>,
    }

    struct MockStream {
        log: Rc<RefCell<StreamLog>>,
        destroyed: bool,
    }

    impl AdaptiveStream for MockStream {
        fn start_load(&mut self) {
            self.log.borrow_mut().calls.push("start_load".to_string());
        }
        fn recover_media_error(&mut self) {
            self.log.borrow_mut().calls.push("recover".to_string());
        }
        fn poll_events(&mut self) -> Vec<StreamEvent> {
            std::mem::take(&mut self.log.borrow_mut().events)
        }
        fn destroy(&mut self) {
            if !self.destroyed {
                self.destroyed = true;
                let mut log = self.log.borrow_mut();
                log.live -= 1;
                log.calls.push("destroy".to_string());
            }
        }
    }

    struct Harness {
        controller: MediaController,
        element: Rc<RefCell<ElementLog>>,
        streams: Rc<RefCell<StreamLog>>,
    }

    fn harness(native_hls: bool) -> Harness {
        let element = Rc::new(RefCell::new(ElementLog::default()));
        let streams = Rc::new(RefCell::new(StreamLog::default()));
        let factory_log = Rc::clone(&streams);
        let factory: StreamFactory = Box::new(move |url: &str| {
            let mut log = factory_log.borrow_mut();
            log.created.push(url.to_string());
            log.live += 1;
            Box::new(MockStream { log: Rc::clone(&factory_log), destroyed: false }) as Box<dyn AdaptiveStream>
        });
        let controller = MediaController::new(
            Box::new(MockElement { native_hls, log: Rc::clone(&element) }),
            factory,
        );
        Harness { controller, element, streams }
    }

    fn calls(log: &Rc<RefCell<ElementLog>>) -> Vec<String> {
        std::mem::take(&mut log.borrow_mut().calls)
    }

    #[test]
    fn test_progressive_sets_source_and_reloads_before_play() {
        let mut h = harness(false);
        h.controller.load_channel("movies", "http://cdn/film.mp4");
        assert_eq!(
            calls(&h.element),
            vec!["clear", "set_source http://cdn/film.mp4", "reload", "play muted=false"]
        );
        assert!(!h.controller.has_stream_client());
        assert_eq!(h.controller.source_kind(), Some(SourceKind::Progressive));
    }

    #[test]
    fn test_native_hls_skips_stream_client() {
        let mut h = harness(true);
        h.controller.load_channel("news", "http://cdn/live.m3u8");
        assert_eq!(
            calls(&h.element),
            vec!["clear", "set_source http://cdn/live.m3u8", "play muted=false"]
        );
        assert!(h.streams.borrow().created.is_empty());
    }

    #[test]
    fn test_adaptive_attaches_when_manifest_ready() {
        let mut h = harness(false);
        h.controller.load_channel("news", "http://cdn/master.m3u8");
        assert_eq!(calls(&h.element), vec!["clear"]);
        assert_eq!(h.streams.borrow().created, vec!["http://cdn/master.m3u8"]);

        h.streams.borrow_mut().events.push(StreamEvent::Ready {
            playback_url: "http://cdn/720p.m3u8".to_string(),
            variants: 3,
        });
        h.controller.poll(Instant::now());
        assert_eq!(
            calls(&h.element),
            vec!["set_source http://cdn/720p.m3u8", "play muted=false"]
        );
    }

    #[test]
    fn test_switching_leaves_exactly_one_session() {
        let mut h = harness(false);
        h.controller.load_channel("a", "http://cdn/a.m3u8");
        h.controller.load_channel("b", "http://cdn/b.m3u8");
        h.controller.load_channel("c", "http://cdn/c.m3u8");
        assert_eq!(h.streams.borrow().live, 1);
        assert_eq!(h.controller.channel_id(), Some("c"));

        h.controller.load_channel("d", "http://cdn/d.mp4");
        assert_eq!(h.streams.borrow().live, 0);
        assert_eq!(h.controller.channel_id(), Some("d"));
    }

    #[test]
    fn test_dropping_controller_releases_session() {
        let mut h = harness(false);
        h.controller.load_channel("a", "http://cdn/a.m3u8");
        let streams = Rc::clone(&h.streams);
        drop(h);
        assert_eq!(streams.borrow().live, 0);
    }

    #[test]
    fn test_autoplay_falls_back_to_muted() {
        let mut h = harness(false);
        h.element.borrow_mut().play_results.push_back(Err(PlayRejected("policy".into())));
        h.controller.load_channel("a", "http://cdn/a.mp4");

        let log = calls(&h.element);
        assert_eq!(&log[log.len() - 2..], &["play muted=false", "play muted=true"]);
        assert!(h.controller.state().muted);
        assert!(!h.controller.state().needs_user_play);
    }

    #[test]
    fn test_autoplay_gives_up_after_muted_rejection() {
        let mut h = harness(false);
        {
            let mut log = h.element.borrow_mut();
            log.play_results.push_back(Err(PlayRejected("policy".into())));
            log.play_results.push_back(Err(PlayRejected("policy".into())));
        }
        h.controller.load_channel("a", "http://cdn/a.mp4");
        let state = h.controller.state();
        assert!(state.needs_user_play);
        assert!(!state.playing);

        // the play affordance works once the user asks
        h.controller.play();
        assert!(!h.controller.state().needs_user_play);
    }

    #[test]
    fn test_each_channel_retries_unmuted() {
        let mut h = harness(false);
        h.element.borrow_mut().play_results.push_back(Err(PlayRejected("policy".into())));
        h.controller.load_channel("a", "http://cdn/a.mp4");
        assert!(h.controller.state().muted);

        h.controller.load_channel("b", "http://cdn/b.mp4");
        assert_eq!(calls(&h.element).last().map(String::as_str), Some("play muted=false"));
        assert!(!h.controller.state().muted);
    }

    #[test]
    fn test_nonfatal_errors_trigger_recovery() {
        let mut h = harness(false);
        h.controller.load_channel("a", "http://cdn/a.m3u8");
        h.streams.borrow_mut().events.extend([
            StreamEvent::Error { kind: StreamErrorKind::Network, fatal: false, details: "timeout".into() },
            StreamEvent::Error { kind: StreamErrorKind::Media, fatal: false, details: "decode".into() },
        ]);
        h.controller.poll(Instant::now());
        assert_eq!(h.streams.borrow().calls, vec!["start_load", "recover"]);
        assert!(h.controller.has_stream_client());
    }

    #[test]
    fn test_element_error_under_client_is_media_recovery() {
        let mut h = harness(false);
        h.controller.load_channel("a", "http://cdn/a.m3u8");
        h.element.borrow_mut().events.push(ElementEvent::Error("bad frame".into()));
        h.controller.poll(Instant::now());
        assert_eq!(h.streams.borrow().calls, vec!["recover"]);
    }

    #[test]
    fn test_fatal_error_tears_down_and_pauses() {
        let mut h = harness(false);
        h.controller.load_channel("a", "http://cdn/a.m3u8");
        h.streams.borrow_mut().events.extend([
            StreamEvent::Error { kind: StreamErrorKind::Network, fatal: true, details: "manifest 404".into() },
            StreamEvent::Ready { playback_url: "http://cdn/late.m3u8".into(), variants: 1 },
        ]);
        h.controller.poll(Instant::now());

        assert_eq!(h.streams.borrow().live, 0);
        assert!(!h.controller.has_stream_client());
        let state = h.controller.state();
        assert!(!state.playing);
        assert_eq!(state.error.as_deref(), Some("manifest 404"));
        assert!(!calls(&h.element).iter().any(|c| c.contains("late")));
    }

    #[test]
    fn test_element_events_update_state() {
        let mut h = harness(true);
        h.controller.load_channel("a", "http://cdn/a.mp4");
        h.element.borrow_mut().events.extend([
            ElementEvent::Playing,
            ElementEvent::DurationChange(120.0),
            ElementEvent::TimeUpdate(42.0),
        ]);
        h.controller.poll(Instant::now());
        let state = h.controller.state();
        assert!(state.playing);
        assert!(!state.buffering);
        assert_eq!(state.duration, Some(120.0));
        assert_eq!(state.current_time, 42.0);
    }

    #[test]
    fn test_double_tap_seeks_and_clamps() {
        let mut h = harness(true);
        h.controller.load_channel("a", "http://cdn/a.mp4");
        h.element.borrow_mut().events.extend([
            ElementEvent::Playing,
            ElementEvent::DurationChange(100.0),
            ElementEvent::TimeUpdate(95.0),
        ]);
        let t0 = Instant::now();
        h.controller.poll(t0);
        calls(&h.element);

        assert_eq!(h.controller.tap(0.9, t0), TapAction::Single);
        assert_eq!(h.controller.tap(0.9, t0 + Duration::from_millis(200)), TapAction::SeekForward);
        assert_eq!(calls(&h.element), vec!["seek 100"]);

        h.controller.tap(0.1, t0 + Duration::from_secs(1));
        assert_eq!(h.controller.tap(0.1, t0 + Duration::from_millis(1250)), TapAction::SeekBackward);
        assert_eq!(calls(&h.element), vec!["seek 90"]);
    }

    #[test]
    fn test_single_tap_resumes_when_paused() {
        let mut h = harness(true);
        h.controller.load_channel("a", "http://cdn/a.mp4");
        h.controller.pause();
        calls(&h.element);
        h.controller.tap(0.5, Instant::now());
        assert_eq!(calls(&h.element), vec!["play muted=false"]);
    }

    #[test]
    fn test_single_tap_toggles_controls_while_playing() {
        let mut h = harness(true);
        h.controller.load_channel("a", "http://cdn/a.mp4");
        h.element.borrow_mut().events.push(ElementEvent::Playing);
        let t0 = Instant::now();
        h.controller.poll(t0);
        assert!(h.controller.controls_visible());
        h.controller.tap(0.5, t0);
        assert!(!h.controller.controls_visible());
    }
}
