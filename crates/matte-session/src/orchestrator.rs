//! The per-frame draw path on the rendering thread.

use std::time::Instant;

use matte_core::{ColorReconciler, OverlayRenderer};

use crate::engine::LayoutEngine;
use crate::error::EngineError;

/// What one draw call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The engine reported no change; the surface was left alone.
    Unchanged,
    /// Bitmaps were composited onto the surface.
    Rendered { bitmaps: usize },
    /// The backend dropped the frame; the next draw retries.
    Skipped,
}

/// Owns the layout engine, the backend renderer, and the color reconciler,
/// and runs one render demand end to end: layout, matrix refresh, composite.
pub struct DrawOrchestrator {
    engine: Box<dyn LayoutEngine>,
    renderer: Box<dyn OverlayRenderer>,
    reconciler: ColorReconciler,
    debug_timing: bool,
}

impl DrawOrchestrator {
    pub fn new(
        engine: Box<dyn LayoutEngine>,
        renderer: Box<dyn OverlayRenderer>,
        debug_timing: bool,
    ) -> Self {
        Self {
            engine,
            renderer,
            reconciler: ColorReconciler::new(),
            debug_timing,
        }
    }

    pub fn engine(&self) -> &dyn LayoutEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn LayoutEngine {
        self.engine.as_mut()
    }

    pub fn renderer(&self) -> &dyn OverlayRenderer {
        self.renderer.as_ref()
    }

    pub fn reconciler_mut(&mut self) -> &mut ColorReconciler {
        &mut self.reconciler
    }

    pub fn schedule_resize(&mut self, width: u32, height: u32) {
        self.renderer.schedule_resize(width, height);
    }

    /// Draw the overlay for `time`. Engine failures propagate and kill the
    /// session; backend failures only cost the frame.
    pub fn draw(&mut self, time: f64, force: bool) -> Result<DrawOutcome, EngineError> {
        let layout_start = Instant::now();
        let update = self.engine.render_frame(time, force)?;
        let layout_ms = layout_start.elapsed().as_secs_f64() * 1e3;

        if !update.changed && !force {
            return Ok(DrawOutcome::Unchanged);
        }

        if self.reconciler.take_dirty() {
            self.renderer.set_color_matrix(self.reconciler.matrix());
        }

        let composite_start = Instant::now();
        let count = update.bitmaps.len();
        let outcome = match self.renderer.render(&update.bitmaps, update.heap) {
            Ok(()) => DrawOutcome::Rendered { bitmaps: count },
            Err(err) => {
                log::warn!("composite failed, dropping frame: {err}");
                DrawOutcome::Skipped
            }
        };

        if self.debug_timing {
            log::debug!(
                "frame t={time:.3}s: layout {layout_ms:.2}ms, composite {:.2}ms, {count} bitmaps",
                composite_start.elapsed().as_secs_f64() * 1e3,
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use matte_core::{
        BackendKind, ColorMatrix, ColorSpace, CueBitmap, PackedColor, RenderError, conversion,
        wgpu,
    };

    use crate::engine::FrameUpdate;

    struct StubEngine {
        heap: Vec<u8>,
        bitmaps: Vec<CueBitmap>,
        changed: bool,
        fail: bool,
    }

    impl StubEngine {
        fn with_one_bitmap(changed: bool) -> Self {
            let bitmaps = vec![CueBitmap {
                dest_x: 0,
                dest_y: 0,
                width: 4,
                height: 4,
                stride: 4,
                heap_offset: 0,
                color: PackedColor(0xFF000000),
            }];
            Self {
                heap: vec![255; 16],
                bitmaps,
                changed,
                fail: false,
            }
        }
    }

    impl LayoutEngine for StubEngine {
        fn render_frame(
            &mut self,
            _time: f64,
            force: bool,
        ) -> Result<FrameUpdate<'_>, EngineError> {
            if self.fail {
                return Err(EngineError::RenderCall("stub blew up".into()));
            }
            let deliver = self.changed || force;
            Ok(FrameUpdate {
                changed: self.changed,
                bitmaps: if deliver { self.bitmaps.clone() } else { Vec::new() },
                heap: &self.heap,
            })
        }

        fn set_track(&mut self, _content: &str) -> Result<(), EngineError> {
            Ok(())
        }

        fn free_track(&mut self) {
            self.bitmaps.clear();
        }

        fn set_layout_size(&mut self, _w: u32, _h: u32, _vw: u32, _vh: u32) {}

        fn color_space(&self) -> Option<ColorSpace> {
            Some(ColorSpace::Bt601)
        }
    }

    #[derive(Default)]
    struct RenderLog {
        render_counts: Vec<usize>,
        matrices: Vec<ColorMatrix>,
        resizes: Vec<(u32, u32)>,
    }

    struct RecordingRenderer {
        log: Arc<Mutex<RenderLog>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingRenderer {
        fn new() -> (Self, Arc<Mutex<RenderLog>>, Arc<AtomicBool>) {
            let log = Arc::new(Mutex::new(RenderLog::default()));
            let fail = Arc::new(AtomicBool::new(false));
            (
                Self {
                    log: log.clone(),
                    fail: fail.clone(),
                },
                log,
                fail,
            )
        }
    }

    impl OverlayRenderer for RecordingRenderer {
        fn kind(&self) -> BackendKind {
            BackendKind::Software
        }

        fn set_color_matrix(&mut self, matrix: ColorMatrix) {
            self.log.lock().unwrap().matrices.push(matrix);
        }

        fn schedule_resize(&mut self, width: u32, height: u32) {
            self.log.lock().unwrap().resizes.push((width, height));
        }

        fn render(&mut self, bitmaps: &[CueBitmap], _heap: &[u8]) -> Result<(), RenderError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RenderError::Acquire(wgpu::SurfaceError::Lost));
            }
            self.log.lock().unwrap().render_counts.push(bitmaps.len());
            Ok(())
        }
    }

    fn orchestrator(changed: bool) -> (DrawOrchestrator, Arc<Mutex<RenderLog>>, Arc<AtomicBool>) {
        let (renderer, log, fail) = RecordingRenderer::new();
        let orch = DrawOrchestrator::new(
            Box::new(StubEngine::with_one_bitmap(changed)),
            Box::new(renderer),
            false,
        );
        (orch, log, fail)
    }

    #[test]
    fn test_unchanged_frame_skips_the_backend() {
        let (mut orch, log, _) = orchestrator(false);
        let outcome = orch.draw(1.0, false).unwrap();
        assert_eq!(outcome, DrawOutcome::Unchanged);
        assert!(log.lock().unwrap().render_counts.is_empty());
    }

    #[test]
    fn test_changed_frame_renders() {
        let (mut orch, log, _) = orchestrator(true);
        let outcome = orch.draw(1.0, false).unwrap();
        assert_eq!(outcome, DrawOutcome::Rendered { bitmaps: 1 });
        assert_eq!(log.lock().unwrap().render_counts, vec![1]);
    }

    #[test]
    fn test_force_renders_unchanged_frame() {
        let (mut orch, log, _) = orchestrator(false);
        let outcome = orch.draw(1.0, true).unwrap();
        assert_eq!(outcome, DrawOutcome::Rendered { bitmaps: 1 });
        assert_eq!(log.lock().unwrap().render_counts, vec![1]);
    }

    #[test]
    fn test_engine_failure_propagates() {
        let (renderer, log, _) = RecordingRenderer::new();
        let mut engine = StubEngine::with_one_bitmap(true);
        engine.fail = true;
        let mut orch = DrawOrchestrator::new(Box::new(engine), Box::new(renderer), false);

        assert!(matches!(orch.draw(0.0, false), Err(EngineError::RenderCall(_))));
        assert!(log.lock().unwrap().render_counts.is_empty());
    }

    #[test]
    fn test_backend_failure_is_a_skipped_frame() {
        let (mut orch, log, fail) = orchestrator(true);
        fail.store(true, Ordering::SeqCst);
        assert_eq!(orch.draw(0.0, false).unwrap(), DrawOutcome::Skipped);

        // the next draw works again
        fail.store(false, Ordering::SeqCst);
        assert_eq!(orch.draw(0.1, false).unwrap(), DrawOutcome::Rendered { bitmaps: 1 });
        assert_eq!(log.lock().unwrap().render_counts, vec![1]);
    }

    #[test]
    fn test_matrix_pushed_once_per_change() {
        let (mut orch, log, _) = orchestrator(true);
        orch.reconciler_mut().set_subtitle_space(Some(ColorSpace::Bt601));
        orch.reconciler_mut().set_video_space(Some(ColorSpace::Bt709));

        orch.draw(0.0, false).unwrap();
        orch.draw(0.1, false).unwrap();

        let log = log.lock().unwrap();
        let expected = conversion(ColorSpace::Bt601, ColorSpace::Bt709).unwrap();
        assert_eq!(log.matrices.len(), 1);
        assert_eq!(log.matrices[0], expected);
    }

    #[test]
    fn test_resize_reaches_the_backend() {
        let (mut orch, log, _) = orchestrator(true);
        orch.schedule_resize(800, 600);
        assert_eq!(log.lock().unwrap().resizes, vec![(800, 600)]);
    }
}
