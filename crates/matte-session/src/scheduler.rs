//! Demand coalescing between video frame callbacks and the rendering
//! thread.
//!
//! Frame-presented signals can arrive much faster than renders finish. The
//! scheduler keeps at most one render in flight and parks at most one
//! request behind it, newest wins, so the rendering thread never builds a
//! queue of stale times and the last frame drawn always matches the last
//! frame demanded.

/// One render demand, handed to the rendering thread exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// Media time in seconds the overlay should match.
    pub media_time: f64,
    /// Render even if the engine reports an unchanged picture.
    pub force: bool,
}

/// Something the session must forward to the rendering thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DemandAction {
    Render(RenderRequest),
    /// Video dimensions changed; the resize must reach the thread before
    /// the render that follows it.
    Resize { video_width: u32, video_height: u32 },
}

/// Latest-wins single-slot demand mailbox.
#[derive(Debug, Default)]
pub struct DemandScheduler {
    busy: bool,
    pending: Option<RenderRequest>,
    video_size: Option<(u32, u32)>,
    last_time: Option<f64>,
}

impl DemandScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a presented video frame. Returns the actions to forward, in
    /// order.
    pub fn frame_presented(
        &mut self,
        media_time: f64,
        video_width: u32,
        video_height: u32,
    ) -> Vec<DemandAction> {
        let mut actions = Vec::new();
        if video_width > 0
            && video_height > 0
            && self.video_size != Some((video_width, video_height))
        {
            self.video_size = Some((video_width, video_height));
            actions.push(DemandAction::Resize {
                video_width,
                video_height,
            });
        }

        self.last_time = Some(media_time);
        let request = RenderRequest {
            media_time,
            force: false,
        };
        if self.busy {
            // newest wins; an older parked request is dropped unrendered
            self.pending = Some(request);
        } else {
            self.busy = true;
            actions.push(DemandAction::Render(request));
        }
        actions
    }

    /// The rendering thread acknowledged a render. Returns the parked
    /// request to issue next, if any; the scheduler stays busy until none
    /// remains.
    pub fn render_complete(&mut self) -> Option<RenderRequest> {
        match self.pending.take() {
            Some(request) => Some(request),
            None => {
                self.busy = false;
                None
            }
        }
    }

    /// Ask for a repaint at the last demanded time, routed through the same
    /// mailbox as normal demands. Used after administrative resizes, where
    /// the picture content is unchanged but the surface is new.
    pub fn repaint(&mut self) -> Option<DemandAction> {
        let media_time = self.last_time?;
        let request = RenderRequest {
            media_time,
            force: true,
        };
        if self.busy {
            self.pending = Some(request);
            None
        } else {
            self.busy = true;
            Some(DemandAction::Render(request))
        }
    }

    /// Record video dimensions learned outside a frame callback.
    pub fn set_video_size(&mut self, video_width: u32, video_height: u32) {
        if video_width > 0 && video_height > 0 {
            self.video_size = Some((video_width, video_height));
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renders(actions: &[DemandAction]) -> Vec<RenderRequest> {
        actions
            .iter()
            .filter_map(|a| match a {
                DemandAction::Render(r) => Some(*r),
                DemandAction::Resize { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_five_rapid_demands_issue_exactly_two_renders() {
        let mut sched = DemandScheduler::new();
        let mut issued = 0;
        for i in 0..5 {
            issued += renders(&sched.frame_presented(i as f64 * 0.016, 1920, 1080)).len();
        }
        // only the first demand went out; the rest collapsed into the slot
        assert_eq!(issued, 1);
        assert!(sched.is_busy());
        assert!(sched.has_pending());

        // completion releases the parked request
        let parked = sched.render_complete().unwrap();
        assert_eq!(parked.media_time, 4.0 * 0.016);
        issued += 1;

        // second completion finds nothing and the scheduler goes idle
        assert!(sched.render_complete().is_none());
        assert!(!sched.is_busy());
        assert_eq!(issued, 2);
    }

    #[test]
    fn test_parked_request_is_newest() {
        let mut sched = DemandScheduler::new();
        sched.frame_presented(1.0, 1280, 720);
        sched.frame_presented(2.0, 1280, 720);
        sched.frame_presented(3.0, 1280, 720);

        let parked = sched.render_complete().unwrap();
        assert_eq!(parked.media_time, 3.0);
        assert!(!parked.force);
    }

    #[test]
    fn test_idle_demand_issues_immediately() {
        let mut sched = DemandScheduler::new();
        let actions = sched.frame_presented(0.5, 640, 360);
        let rs = renders(&actions);
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].media_time, 0.5);

        assert!(sched.render_complete().is_none());
        let again = renders(&sched.frame_presented(0.6, 640, 360));
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_dimension_change_orders_resize_before_render() {
        let mut sched = DemandScheduler::new();
        let first = sched.frame_presented(0.0, 1280, 720);
        assert_eq!(
            first,
            vec![
                DemandAction::Resize {
                    video_width: 1280,
                    video_height: 720
                },
                DemandAction::Render(RenderRequest {
                    media_time: 0.0,
                    force: false
                }),
            ]
        );
        sched.render_complete();

        // same dimensions again: no resize
        let second = sched.frame_presented(0.1, 1280, 720);
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], DemandAction::Render(_)));
        sched.render_complete();

        // mid-playback dimension switch
        let third = sched.frame_presented(0.2, 1920, 1080);
        assert!(matches!(
            third[0],
            DemandAction::Resize {
                video_width: 1920,
                video_height: 1080
            }
        ));
        assert!(matches!(third[1], DemandAction::Render(_)));
    }

    #[test]
    fn test_resize_emitted_even_while_busy() {
        let mut sched = DemandScheduler::new();
        sched.frame_presented(0.0, 1280, 720);
        assert!(sched.is_busy());

        let actions = sched.frame_presented(0.1, 1920, 1080);
        // the resize goes out now; the render parks
        assert_eq!(
            actions,
            vec![DemandAction::Resize {
                video_width: 1920,
                video_height: 1080
            }]
        );
        assert!(sched.has_pending());
    }

    #[test]
    fn test_zero_video_dimensions_never_emit_resize() {
        let mut sched = DemandScheduler::new();
        let actions = sched.frame_presented(0.0, 0, 0);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], DemandAction::Render(_)));
    }

    #[test]
    fn test_repaint_when_idle_forces_last_time() {
        let mut sched = DemandScheduler::new();
        assert!(sched.repaint().is_none());

        sched.frame_presented(1.5, 1280, 720);
        sched.render_complete();

        match sched.repaint() {
            Some(DemandAction::Render(req)) => {
                assert_eq!(req.media_time, 1.5);
                assert!(req.force);
            }
            other => panic!("expected immediate render, got {other:?}"),
        }
    }

    #[test]
    fn test_repaint_while_busy_parks_forced_request() {
        let mut sched = DemandScheduler::new();
        sched.frame_presented(2.0, 1280, 720);
        assert!(sched.repaint().is_none());

        let parked = sched.render_complete().unwrap();
        assert_eq!(parked.media_time, 2.0);
        assert!(parked.force);
    }
}
