//! Deferred resize bookkeeping.

/// A single-slot mailbox for surface resizes.
///
/// Hosts may announce new dimensions at any time, but surfaces are only
/// reconfigured at the top of a render where nothing is mid-frame. Repeated
/// announcements collapse to the newest pair.
#[derive(Debug, Default)]
pub struct PendingResize {
    next: Option<(u32, u32)>,
}

impl PendingResize {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park new dimensions. Zero-area extents are dropped; a minimized
    /// window must not tear down the surface.
    pub fn schedule(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.next = Some((width, height));
    }

    /// Consume the parked dimensions, if any.
    pub fn take(&mut self) -> Option<(u32, u32)> {
        self.next.take()
    }

    pub fn is_pending(&self) -> bool {
        self.next.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_dimensions_win() {
        let mut pending = PendingResize::new();
        pending.schedule(100, 50);
        pending.schedule(200, 80);
        assert_eq!(pending.take(), Some((200, 80)));
        assert_eq!(pending.take(), None);
    }

    #[test]
    fn test_zero_extent_is_ignored() {
        let mut pending = PendingResize::new();
        pending.schedule(0, 100);
        pending.schedule(100, 0);
        assert!(!pending.is_pending());

        pending.schedule(64, 64);
        pending.schedule(0, 0);
        assert_eq!(pending.take(), Some((64, 64)));
    }
}
