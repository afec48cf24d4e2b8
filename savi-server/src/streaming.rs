// Response body for a committed propagation stream

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use savi_core::{Error, Result};
use savi_inference::EncodedFrameStream;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info};

/// Per-request bookkeeping. Dropped with the body, so a drop before
/// `finished` is set means hyper gave up on the connection.
struct Progress {
    session_id: String,
    frames_sent: u64,
    started: Instant,
    finished: bool,
}

impl Progress {
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                "Client disconnected from session {} after {} frames ({:?})",
                self.session_id,
                self.frames_sent,
                self.started.elapsed()
            );
        }
    }
}

struct BodyState {
    first: Option<Bytes>,
    frames: EncodedFrameStream,
    shutdown: watch::Receiver<bool>,
    progress: Progress,
}

/// Resolves once the server starts shutting down. A dropped sender means
/// no shutdown will ever be signalled.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Body stream that starts with the already pulled `first` message and
/// continues with `frames`.
///
/// An engine error or a shutdown yields `Err`, which makes hyper abort the
/// connection instead of ending the body cleanly.
pub fn frame_body(
    session_id: String,
    first: Bytes,
    frames: EncodedFrameStream,
    shutdown: watch::Receiver<bool>,
) -> BoxStream<'static, Result<Bytes>> {
    let state = BodyState {
        first: Some(first),
        frames,
        shutdown,
        progress: Progress {
            session_id,
            frames_sent: 0,
            started: Instant::now(),
            finished: false,
        },
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;

        if let Some(first) = state.first.take() {
            state.progress.frames_sent += 1;
            return Some((Ok(first), Some(state)));
        }

        let next = tokio::select! {
            biased;
            _ = shutdown_requested(&mut state.shutdown) => {
                Some(Err(Error::Cancelled("server shutting down".to_string())))
            }
            next = state.frames.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                state.progress.frames_sent += 1;
                Some((Ok(chunk), Some(state)))
            }
            Some(Err(e)) => {
                state.progress.finish();
                match &e {
                    Error::Cancelled(reason) => info!(
                        "Stream for session {} cancelled after {} frames: {}",
                        state.progress.session_id, state.progress.frames_sent, reason
                    ),
                    _ => error!(
                        "Stream for session {} failed after {} frames: {}",
                        state.progress.session_id, state.progress.frames_sent, e
                    ),
                }
                Some((Err(e), None))
            }
            None => {
                state.progress.finish();
                info!(
                    "Stream for session {} completed: {} frames in {:?}",
                    state.progress.session_id,
                    state.progress.frames_sent,
                    state.progress.started.elapsed()
                );
                None
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(items: Vec<Result<Bytes>>) -> EncodedFrameStream {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_first_chunk_leads() {
        let (_tx, rx) = watch::channel(false);
        let body = frame_body(
            "s1".to_string(),
            Bytes::from_static(b"a"),
            chunks(vec![Ok(Bytes::from_static(b"b"))]),
            rx,
        );
        let items: Vec<_> = body.map(|c| c.unwrap()).collect().await;
        assert_eq!(items, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }

    #[tokio::test]
    async fn test_error_ends_body() {
        let (_tx, rx) = watch::channel(false);
        let body = frame_body(
            "s1".to_string(),
            Bytes::from_static(b"a"),
            chunks(vec![
                Err(Error::InferenceFailure("boom".to_string())),
                Ok(Bytes::from_static(b"never")),
            ]),
            rx,
        );
        let items: Vec<_> = body.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(Error::InferenceFailure(_))));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_body() {
        let (tx, rx) = watch::channel(false);
        let mut body = frame_body(
            "s1".to_string(),
            Bytes::from_static(b"a"),
            stream::pending().boxed(),
            rx,
        );
        assert!(body.next().await.unwrap().is_ok());
        tx.send(true).unwrap();
        assert!(matches!(body.next().await, Some(Err(Error::Cancelled(_)))));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let body = frame_body(
            "s1".to_string(),
            Bytes::from_static(b"a"),
            chunks(vec![Ok(Bytes::from_static(b"b"))]),
            rx,
        );
        let items: Vec<_> = body.collect().await;
        assert!(items.iter().all(|c| c.is_ok()));
        assert_eq!(items.len(), 2);
    }
}
