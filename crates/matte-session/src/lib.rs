//! matte-session: demand scheduling and the rendering thread.
//!
//! A [`Session`] pairs a host-facing control handle with a dedicated
//! rendering thread that owns the [`LayoutEngine`] and the backend
//! renderer. Hosts feed it frame-presented signals and track changes;
//! renders are coalesced so only the newest demanded time is ever drawn.

mod engine;
mod error;
mod orchestrator;
mod scheduler;
mod session;
mod worker;

pub use engine::{FrameUpdate, LayoutEngine};
pub use error::{ColorProbeError, EngineError};
pub use orchestrator::{DrawOrchestrator, DrawOutcome};
pub use scheduler::{DemandAction, DemandScheduler, RenderRequest};
pub use session::{Session, SessionOptions, SurfaceSource};
pub use worker::SessionEvent;
