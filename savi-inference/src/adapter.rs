// Scoped, pull-driven stream over the engine's frame results
//
// The engine context is entered on the first pull and exited exactly once:
// after the last frame, after the first error, after a panic inside the
// engine, or when the stream is dropped half-way. Every pull runs on the
// blocking pool, so an engine computing a frame never stalls the runtime.

use crate::engine::{ContextGuard, FrameIter, InferenceEngine};
use futures::stream::{self, BoxStream, StreamExt};
use savi_core::{Error, FrameResult, PropagationCommand, Result};
use std::sync::Arc;
use tracing::{debug, error};

pub type FrameResultStream = BoxStream<'static, Result<FrameResult>>;

/// Frame iterator together with the context it runs under. Fields drop in
/// declaration order, so the iterator is gone before the context is exited.
struct ScopedFrames {
    frames: FrameIter,
    _guard: ContextGuard,
}

enum Cursor {
    Pending(PropagationCommand),
    Open(ScopedFrames),
    Finished,
}

/// Propagate `command` through `engine` as a lazy stream of frame results.
///
/// Nothing touches the engine until the stream is first polled. The stream
/// ends after the first error.
pub fn propagate(engine: Arc<dyn InferenceEngine>, command: PropagationCommand) -> FrameResultStream {
    stream::unfold(Cursor::Pending(command), move |cursor| {
        let engine = Arc::clone(&engine);
        async move {
            if matches!(cursor, Cursor::Finished) {
                return None;
            }
            match tokio::task::spawn_blocking(move || step(engine, cursor)).await {
                Ok(next) => next,
                Err(join_error) => {
                    // The cursor, and with it the guard, was dropped while the
                    // blocking task unwound.
                    error!("Inference task failed: {}", join_error);
                    Some((
                        Err(Error::InferenceFailure(format!(
                            "inference task failed: {}",
                            join_error
                        ))),
                        Cursor::Finished,
                    ))
                }
            }
        }
    })
    .boxed()
}

fn step(engine: Arc<dyn InferenceEngine>, cursor: Cursor) -> Option<(Result<FrameResult>, Cursor)> {
    let mut scoped = match cursor {
        Cursor::Finished => return None,
        Cursor::Open(scoped) => scoped,
        Cursor::Pending(command) => {
            let guard = match ContextGuard::enter(Arc::clone(&engine)) {
                Ok(guard) => guard,
                Err(e) => return Some((Err(e), Cursor::Finished)),
            };
            debug!(
                "Propagating session {} from frame {} (quick test: {})",
                command.session_id, command.start_frame_index, command.quick_test_mode
            );
            match engine.propagate_in_video(&command) {
                Ok(frames) => ScopedFrames {
                    frames,
                    _guard: guard,
                },
                Err(e) => return Some((Err(e), Cursor::Finished)),
            }
        }
    };

    match scoped.frames.next() {
        Some(Ok(frame)) => Some((Ok(frame), Cursor::Open(scoped))),
        Some(Err(e)) => Some((Err(e), Cursor::Finished)),
        None => None,
    }
}
