//! The rendering-thread loop.

use std::sync::mpsc::{Receiver, Sender};

use matte_core::{BackendKind, ColorSpace, PixelFrame};

use crate::orchestrator::{DrawOrchestrator, DrawOutcome};

/// Control-to-worker messages. Ordering on the channel is delivery order,
/// which is what guarantees a resize lands before the render demanded after
/// it.
#[derive(Debug)]
pub(crate) enum WorkerMsg {
    Render {
        time: f64,
        force: bool,
    },
    Resize {
        width: u32,
        height: u32,
        video_width: u32,
        video_height: u32,
    },
    SetTrack(String),
    FreeTrack,
    VideoColor(Option<ColorSpace>),
    Shutdown,
}

/// Worker-to-control events, drained by [`crate::Session::poll`].
#[derive(Debug)]
pub enum SessionEvent {
    /// A render demand finished. `rendered` is false when the engine
    /// reported no change and the surface was left alone.
    RenderDone { rendered: bool },
    /// A software-composited frame, ready for the host to present.
    Frame(PixelFrame),
    /// The layout engine failed; the session is dead and every later call
    /// on it is a no-op.
    EngineFailed(String),
}

pub(crate) fn run(
    mut orchestrator: DrawOrchestrator,
    commands: Receiver<WorkerMsg>,
    events: Sender<SessionEvent>,
) {
    while let Ok(msg) = commands.recv() {
        match msg {
            WorkerMsg::Render { time, force } => {
                let outcome = match orchestrator.draw(time, force) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        log::error!("layout engine failed: {err}");
                        let _ = events.send(SessionEvent::EngineFailed(err.to_string()));
                        return;
                    }
                };

                let rendered = matches!(outcome, DrawOutcome::Rendered { .. });
                if rendered && orchestrator.renderer().kind() == BackendKind::Software {
                    if let Some(frame) = orchestrator.renderer().frame() {
                        let _ = events.send(SessionEvent::Frame(frame.clone()));
                    }
                }
                if events.send(SessionEvent::RenderDone { rendered }).is_err() {
                    // control side is gone; nothing left to render for
                    return;
                }
            }
            WorkerMsg::Resize {
                width,
                height,
                video_width,
                video_height,
            } => {
                orchestrator.schedule_resize(width, height);
                orchestrator
                    .engine_mut()
                    .set_layout_size(width, height, video_width, video_height);
            }
            WorkerMsg::SetTrack(content) => {
                if let Err(err) = orchestrator.engine_mut().set_track(&content) {
                    log::error!("track load failed: {err}");
                    let _ = events.send(SessionEvent::EngineFailed(err.to_string()));
                    return;
                }
                let space = orchestrator.engine().color_space();
                orchestrator.reconciler_mut().set_subtitle_space(space);
            }
            WorkerMsg::FreeTrack => {
                orchestrator.engine_mut().free_track();
                orchestrator.reconciler_mut().set_subtitle_space(None);
            }
            WorkerMsg::VideoColor(space) => {
                orchestrator.reconciler_mut().set_video_space(space);
            }
            WorkerMsg::Shutdown => return,
        }
    }
}
