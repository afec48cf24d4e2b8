// In-memory replay engine
//
// Holds precomputed per-frame results for each session and replays them on
// propagation. Serves the demo mode of the server binary and the tests.

use crate::engine::{FrameIter, InferenceEngine, SessionInfo};
use parking_lot::RwLock;
use savi_core::{Error, FrameResult, PropagationCommand, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Frames replayed when `quick_test_mode` is set
pub const QUICK_TEST_FRAME_LIMIT: usize = 5;

#[derive(Debug, Clone)]
struct SessionTrack {
    total_frames: Option<u64>,
    frames: Vec<FrameResult>,
}

#[derive(Debug)]
pub struct InMemoryEngine {
    sessions: RwLock<HashMap<String, SessionTrack>>,
    frame_delay: Option<Duration>,
    contexts_entered: AtomicUsize,
    contexts_exited: AtomicUsize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFixture {
    session_id: String,
    total_frames: Option<u64>,
    frames: Vec<FrameResult>,
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    sessions: Vec<SessionFixture>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            frame_delay: None,
            contexts_entered: AtomicUsize::new(0),
            contexts_exited: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before yielding each frame, standing in for model time.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }

    /// Load sessions from a JSON fixture:
    /// `{"sessions": [{"sessionId": "s1", "totalFrames": 3, "frames": [...]}]}`
    /// where each frame uses the streamed body format.
    pub fn from_fixture(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture: FixtureFile = serde_json::from_str(&content)?;
        let engine = Self::new();
        for session in fixture.sessions {
            engine.insert_session(session.session_id, session.total_frames, session.frames);
        }
        info!(
            "Loaded {} replay sessions from {}",
            engine.session_count(),
            path.display()
        );
        Ok(engine)
    }

    /// Register (or replace) a session. Frames are replayed in index order.
    pub fn insert_session(
        &self,
        session_id: impl Into<String>,
        total_frames: Option<u64>,
        mut frames: Vec<FrameResult>,
    ) {
        frames.sort_by_key(|f| f.frame_index);
        for frame in &mut frames {
            frame.total_frames = total_frames;
        }
        self.sessions.write().insert(
            session_id.into(),
            SessionTrack {
                total_frames,
                frames,
            },
        );
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// `(entered, exited)` execution context counts
    pub fn context_counts(&self) -> (usize, usize) {
        (
            self.contexts_entered.load(Ordering::SeqCst),
            self.contexts_exited.load(Ordering::SeqCst),
        )
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for InMemoryEngine {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn enter_context(&self) -> Result<()> {
        self.contexts_entered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exit_context(&self) {
        self.contexts_exited.fetch_add(1, Ordering::SeqCst);
    }

    fn propagate_in_video(&self, command: &PropagationCommand) -> Result<FrameIter> {
        let track = self
            .sessions
            .read()
            .get(&command.session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(command.session_id.clone()))?;

        let limit = if command.quick_test_mode {
            QUICK_TEST_FRAME_LIMIT
        } else {
            usize::MAX
        };
        let start = command.start_frame_index;
        let delay = self.frame_delay;

        let frames = track
            .frames
            .into_iter()
            .filter(move |f| f.frame_index >= start)
            .take(limit)
            .map(move |frame| {
                if let Some(delay) = delay {
                    std::thread::sleep(delay);
                }
                Ok(frame)
            });
        Ok(Box::new(frames))
    }

    fn session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.read().get(session_id).map(|track| SessionInfo {
            session_id: session_id.to_string(),
            total_frames: track.total_frames,
            object_count: track
                .frames
                .iter()
                .flat_map(|f| f.results.iter().map(|r| r.object_id))
                .collect::<std::collections::BTreeSet<_>>()
                .len(),
        })
    }

    fn close_session(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }
}
