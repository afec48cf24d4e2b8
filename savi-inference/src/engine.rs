// Seam to the external inference engine

use savi_core::{FrameResult, PropagationCommand, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Lazy per-frame output of a propagation. Each `next()` may block on model
/// computation.
pub type FrameIter = Box<dyn Iterator<Item = Result<FrameResult>> + Send>;

/// What the engine reports about a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub total_frames: Option<u64>,
    pub object_count: usize,
}

/// The segmentation engine behind the server.
///
/// All methods may block; callers on the async runtime run them on the
/// blocking pool. `enter_context` and `exit_context` bracket an engine-side
/// execution mode (e.g. reduced-precision autocast) and are always called in
/// pairs through [`ContextGuard`].
pub trait InferenceEngine: Send + Sync {
    fn name(&self) -> &str;

    fn enter_context(&self) -> Result<()>;

    fn exit_context(&self);

    /// Start propagating masks through the session's video.
    ///
    /// Fails with `SessionNotFound` for an unknown session. The command's
    /// `start_frame_index` and `quick_test_mode` are engine parameters.
    fn propagate_in_video(&self, command: &PropagationCommand) -> Result<FrameIter>;

    fn session(&self, session_id: &str) -> Option<SessionInfo>;

    /// Returns false when the session did not exist.
    fn close_session(&self, session_id: &str) -> bool;
}

/// Owning guard for the engine execution context.
///
/// Entering happens in [`ContextGuard::enter`]; the context is exited exactly
/// once, when the guard is dropped.
pub struct ContextGuard {
    engine: Arc<dyn InferenceEngine>,
}

impl ContextGuard {
    pub fn enter(engine: Arc<dyn InferenceEngine>) -> Result<Self> {
        engine.enter_context()?;
        debug!("Entered execution context of {}", engine.name());
        Ok(Self { engine })
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.engine.exit_context();
        debug!("Exited execution context of {}", self.engine.name());
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard")
            .field("engine", &self.engine.name())
            .finish()
    }
}
