//! Control-side session handle.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use matte_core::{
    BackendKind, ColorSpace, OverlayRenderer, SoftwareRenderer, SurfaceError, create_renderer,
    wgpu,
};

use crate::engine::LayoutEngine;
use crate::error::ColorProbeError;
use crate::orchestrator::DrawOrchestrator;
use crate::scheduler::{DemandAction, DemandScheduler};
use crate::worker::{self, SessionEvent, WorkerMsg};

/// Where composited frames end up.
pub enum SurfaceSource {
    /// Composite onto a window surface. The surface is handed to the
    /// rendering thread exactly once, here.
    Gpu {
        instance: wgpu::Instance,
        surface: wgpu::Surface<'static>,
    },
    /// Composite in memory; frames come back as [`SessionEvent::Frame`].
    Cpu,
}

/// Options for bringing up a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Initial surface extent in pixels. Zero is accepted: GPU backends
    /// come up on a 1x1 placeholder surface (surfaces reject zero extents)
    /// until the host announces a real size via resize.
    pub width: u32,
    pub height: u32,
    /// Forced backend, or `None` to fall back through the capability order.
    pub prefer: Option<BackendKind>,
    /// Log per-frame layout and composite timings at debug level.
    pub debug_timing: bool,
    /// Seconds added to every demanded media time.
    pub time_offset: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            prefer: None,
            debug_timing: false,
            time_offset: 0.0,
        }
    }
}

/// A live compositing session.
///
/// The session owns a rendering thread which in turn owns the layout
/// engine and the backend renderer. All methods are cheap sends; nothing
/// here blocks on rendering. Call [`Session::poll`] regularly to drain
/// worker events and keep the demand mailbox moving.
pub struct Session {
    commands: Sender<WorkerMsg>,
    events: Receiver<SessionEvent>,
    join: Option<JoinHandle<()>>,
    demand: DemandScheduler,
    backend: BackendKind,
    width: u32,
    height: u32,
    time_offset: f64,
    dead: bool,
}

impl Session {
    /// Bring up the backend for `source` and start the rendering thread.
    ///
    /// Backend initialization happens synchronously so that setup failures
    /// abort here instead of surfacing as a dead session later.
    pub fn spawn(
        engine: Box<dyn LayoutEngine>,
        source: SurfaceSource,
        options: SessionOptions,
    ) -> Result<Session, SurfaceError> {
        let (renderer, instance): (Box<dyn OverlayRenderer>, Option<wgpu::Instance>) =
            match source {
                SurfaceSource::Gpu { instance, surface } => {
                    let renderer = create_renderer(
                        &instance,
                        surface,
                        options.width,
                        options.height,
                        options.prefer,
                    )?;
                    (renderer, Some(instance))
                }
                SurfaceSource::Cpu => (
                    Box::new(SoftwareRenderer::new(options.width, options.height)),
                    None,
                ),
            };
        let backend = renderer.kind();
        let orchestrator = DrawOrchestrator::new(engine, renderer, options.debug_timing);

        let (commands, command_rx) = mpsc::channel();
        let (event_tx, events) = mpsc::channel();
        let join = thread::spawn(move || {
            // the instance must outlive every GPU object the worker holds
            let _instance = instance;
            worker::run(orchestrator, command_rx, event_tx);
        });

        Ok(Session {
            commands,
            events,
            join: Some(join),
            demand: DemandScheduler::new(),
            backend,
            width: options.width,
            height: options.height,
            time_offset: options.time_offset,
            dead: false,
        })
    }

    /// Which backend the session came up with.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend
    }

    /// Signal that the host presented a video frame at `media_time`.
    ///
    /// This is the render demand: at most one render is in flight at a
    /// time, and bursts collapse so only the newest demanded time renders.
    /// A change in video dimensions is forwarded before the render it
    /// precedes.
    pub fn frame_presented(&mut self, media_time: f64, video_width: u32, video_height: u32) {
        let time = media_time + self.time_offset;
        let actions = self.demand.frame_presented(time, video_width, video_height);
        for action in actions {
            self.dispatch(action);
        }
    }

    /// Announce a new surface size, with the video dimensions it was
    /// derived from. A repaint at the last demanded time follows so the
    /// resized surface is not left blank.
    pub fn resize(&mut self, width: u32, height: u32, video_width: u32, video_height: u32) {
        self.width = width;
        self.height = height;
        self.demand.set_video_size(video_width, video_height);
        self.send(WorkerMsg::Resize {
            width,
            height,
            video_width,
            video_height,
        });
        if let Some(action) = self.demand.repaint() {
            self.dispatch(action);
        }
    }

    /// Load a subtitle track from its textual content.
    pub fn set_track(&mut self, content: String) {
        self.send(WorkerMsg::SetTrack(content));
    }

    /// Drop the active track.
    pub fn free_track(&mut self) {
        self.send(WorkerMsg::FreeTrack);
    }

    /// Report the outcome of probing the video's color space. A failed
    /// probe is logged and leaves fill colors uncorrected.
    pub fn report_video_color(&mut self, probe: Result<ColorSpace, ColorProbeError>) {
        match probe {
            Ok(space) => self.send(WorkerMsg::VideoColor(Some(space))),
            Err(err) => {
                log::debug!("video color probe failed, keeping identity: {err}");
                self.send(WorkerMsg::VideoColor(None));
            }
        }
    }

    /// Shift every future demanded media time by `seconds`.
    pub fn set_time_offset(&mut self, seconds: f64) {
        self.time_offset = seconds;
    }

    /// Drain worker events without blocking.
    ///
    /// Render completions feed the demand mailbox: if a newer demand was
    /// parked while the worker was busy, it is issued from here.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    match &event {
                        SessionEvent::RenderDone { .. } => {
                            if let Some(request) = self.demand.render_complete() {
                                self.send(WorkerMsg::Render {
                                    time: request.media_time,
                                    force: request.force,
                                });
                            }
                        }
                        SessionEvent::EngineFailed(_) => self.dead = true,
                        SessionEvent::Frame(_) => {}
                    }
                    out.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.dead = true;
                    break;
                }
            }
        }
        out
    }

    /// Stop the rendering thread and wait for it. An in-flight render
    /// finishes; nothing renders after the shutdown message is seen.
    pub fn shutdown(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.commands.send(WorkerMsg::Shutdown);
            if join.join().is_err() {
                log::error!("rendering thread panicked during shutdown");
            }
        }
        self.dead = true;
    }

    fn dispatch(&mut self, action: DemandAction) {
        match action {
            DemandAction::Render(request) => self.send(WorkerMsg::Render {
                time: request.media_time,
                force: request.force,
            }),
            DemandAction::Resize {
                video_width,
                video_height,
            } => {
                let (width, height) = (self.width, self.height);
                self.send(WorkerMsg::Resize {
                    width,
                    height,
                    video_width,
                    video_height,
                });
            }
        }
    }

    fn send(&mut self, msg: WorkerMsg) {
        if self.dead {
            return;
        }
        if self.commands.send(msg).is_err() {
            self.dead = true;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use matte_core::{CueBitmap, PackedColor};

    use crate::engine::FrameUpdate;
    use crate::error::EngineError;

    struct ScriptedEngine {
        heap: Vec<u8>,
        calls: Arc<Mutex<Vec<(f64, bool)>>>,
        track_loaded: Arc<AtomicBool>,
        fail_on_render: bool,
    }

    impl ScriptedEngine {
        fn new() -> (Self, Arc<Mutex<Vec<(f64, bool)>>>, Arc<AtomicBool>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let track_loaded = Arc::new(AtomicBool::new(false));
            (
                Self {
                    heap: vec![255; 4],
                    calls: calls.clone(),
                    track_loaded: track_loaded.clone(),
                    fail_on_render: false,
                },
                calls,
                track_loaded,
            )
        }
    }

    impl LayoutEngine for ScriptedEngine {
        fn render_frame(
            &mut self,
            time: f64,
            force: bool,
        ) -> Result<FrameUpdate<'_>, EngineError> {
            self.calls.lock().unwrap().push((time, force));
            if self.fail_on_render {
                return Err(EngineError::RenderCall("scripted failure".into()));
            }
            Ok(FrameUpdate {
                changed: true,
                bitmaps: vec![CueBitmap {
                    dest_x: 0,
                    dest_y: 0,
                    width: 2,
                    height: 2,
                    stride: 2,
                    heap_offset: 0,
                    color: PackedColor(0xFF000000),
                }],
                heap: &self.heap,
            })
        }

        fn set_track(&mut self, _content: &str) -> Result<(), EngineError> {
            self.track_loaded.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn free_track(&mut self) {
            self.track_loaded.store(false, Ordering::SeqCst);
        }

        fn set_layout_size(&mut self, _w: u32, _h: u32, _vw: u32, _vh: u32) {}

        fn color_space(&self) -> Option<ColorSpace> {
            None
        }
    }

    fn cpu_session(engine: ScriptedEngine) -> Session {
        Session::spawn(
            Box::new(engine),
            SurfaceSource::Cpu,
            SessionOptions {
                width: 16,
                height: 16,
                ..Default::default()
            },
        )
        .unwrap()
    }

    /// Poll until `pred` matches an event, with a hard deadline.
    fn drain_until(
        session: &mut Session,
        mut pred: impl FnMut(&SessionEvent) -> bool,
    ) -> Vec<SessionEvent> {
        let start = Instant::now();
        let mut seen = Vec::new();
        while start.elapsed() < Duration::from_secs(5) {
            for event in session.poll() {
                let hit = pred(&event);
                seen.push(event);
                if hit {
                    return seen;
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("timed out waiting for event; saw {seen:?}");
    }

    fn count_render_done(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::RenderDone { .. }))
            .count()
    }

    #[test]
    fn test_demand_renders_and_emits_software_frame() {
        let (engine, calls, _) = ScriptedEngine::new();
        let mut session = cpu_session(engine);
        assert_eq!(session.backend_kind(), BackendKind::Software);

        session.frame_presented(0.25, 640, 360);
        let events = drain_until(&mut session, |e| {
            matches!(e, SessionEvent::RenderDone { rendered: true })
        });

        let frame = events.iter().find_map(|e| match e {
            SessionEvent::Frame(frame) => Some(frame),
            _ => None,
        });
        let frame = frame.expect("software tier forwards its frame");
        assert_eq!(frame.width(), 16);
        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(5, 5), [0, 0, 0, 0]);

        assert_eq!(calls.lock().unwrap().as_slice(), &[(0.25, false)]);
        session.shutdown();
    }

    #[test]
    fn test_rapid_demands_collapse_to_two_renders() {
        let (engine, calls, _) = ScriptedEngine::new();
        let mut session = cpu_session(engine);

        for i in 0..5 {
            session.frame_presented(i as f64 * 0.016, 640, 360);
        }

        let mut events = drain_until(&mut session, |e| {
            matches!(e, SessionEvent::RenderDone { .. })
        });
        events.extend(drain_until(&mut session, |e| {
            matches!(e, SessionEvent::RenderDone { .. })
        }));
        assert_eq!(count_render_done(&events), 2);

        // nothing further is in flight
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count_render_done(&session.poll()), 0);

        let times: Vec<f64> = calls.lock().unwrap().iter().map(|c| c.0).collect();
        assert_eq!(times, vec![0.0, 4.0 * 0.016]);
        session.shutdown();
    }

    #[test]
    fn test_resize_repaints_last_demanded_time() {
        let (engine, calls, _) = ScriptedEngine::new();
        let mut session = cpu_session(engine);

        session.frame_presented(1.5, 640, 360);
        drain_until(&mut session, |e| matches!(e, SessionEvent::RenderDone { .. }));

        session.resize(320, 240, 640, 360);
        drain_until(&mut session, |e| matches!(e, SessionEvent::RenderDone { .. }));

        let recorded = calls.lock().unwrap().clone();
        assert_eq!(recorded, vec![(1.5, false), (1.5, true)]);
        session.shutdown();
    }

    #[test]
    fn test_time_offset_shifts_demands() {
        let (engine, calls, _) = ScriptedEngine::new();
        let mut session = cpu_session(engine);
        session.set_time_offset(0.5);

        session.frame_presented(1.0, 640, 360);
        drain_until(&mut session, |e| matches!(e, SessionEvent::RenderDone { .. }));

        assert_eq!(calls.lock().unwrap().as_slice(), &[(1.5, false)]);
        session.shutdown();
    }

    #[test]
    fn test_track_lifecycle_reaches_engine() {
        let (engine, _, loaded) = ScriptedEngine::new();
        let mut session = cpu_session(engine);

        session.set_track("Dialogue: test".into());
        session.frame_presented(0.0, 640, 360);
        drain_until(&mut session, |e| matches!(e, SessionEvent::RenderDone { .. }));
        assert!(loaded.load(Ordering::SeqCst));

        session.free_track();
        session.shutdown();
        assert!(!loaded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_engine_failure_kills_session_quietly() {
        let (mut engine, _, _) = ScriptedEngine::new();
        engine.fail_on_render = true;
        let mut session = cpu_session(engine);

        session.frame_presented(0.0, 640, 360);
        let events = drain_until(&mut session, |e| matches!(e, SessionEvent::EngineFailed(_)));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SessionEvent::EngineFailed(msg) if msg.contains("scripted")))
        );

        // dead session swallows everything without panicking
        session.frame_presented(1.0, 640, 360);
        session.set_track("x".into());
        assert!(session.poll().is_empty());
        session.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (engine, _, _) = ScriptedEngine::new();
        let mut session = cpu_session(engine);
        session.shutdown();
        session.shutdown();
        session.frame_presented(0.0, 640, 360);
        assert!(session.poll().is_empty());
    }
}
