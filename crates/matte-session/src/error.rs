//! Session-level error types.

use thiserror::Error;

/// A failure inside the layout engine.
///
/// These are fatal: the engine's internal state can no longer be trusted,
/// so the session that owns it shuts down and must be recreated.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Track content could not be parsed.
    #[error("track load failed: {0}")]
    TrackLoad(String),

    /// A layout call failed or trapped.
    #[error("layout engine call failed: {0}")]
    RenderCall(String),
}

/// A failure while probing the video's color space.
///
/// Recoverable: the probe is best-effort, and on failure fill colors keep
/// the identity correction.
#[derive(Error, Debug)]
pub enum ColorProbeError {
    /// Frame data was unreadable, typically a protected stream.
    #[error("video frame is not readable: {0}")]
    Unreadable(String),

    /// The source never produced a decodable frame to probe.
    #[error("no decodable video frame")]
    NoFrame,
}
