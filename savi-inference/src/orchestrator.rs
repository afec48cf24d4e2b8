// Turns the engine's frame results into encoded frame messages

use crate::adapter::{self, FrameResultStream};
use crate::engine::InferenceEngine;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use savi_core::multipart::{FrameHeaders, FrameMessage};
use savi_core::protocol::{
    BODY_CONTENT_TYPE, HEADER_CONTENT_TYPE, HEADER_FRAME_CURRENT, HEADER_FRAME_TOTAL,
    HEADER_MASK_TYPE, MASK_TYPE_RLE_ARRAY, UNKNOWN_FRAME,
};
use savi_core::{Error, FrameResult, PropagationCommand, Result};
use std::sync::Arc;
use tracing::debug;

pub type FrameMessageStream = BoxStream<'static, Result<FrameMessage>>;
pub type EncodedFrameStream = BoxStream<'static, Result<Bytes>>;

/// Protocol headers for one frame. `Frame-Total` counts the frames after the
/// reference frame; an unknown total is sent as `-1`.
pub fn frame_headers(frame_index: u64, total_frames: Option<u64>) -> FrameHeaders {
    let total = total_frames
        .and_then(|t| t.checked_sub(1))
        .map(|t| t.to_string())
        .unwrap_or_else(|| UNKNOWN_FRAME.to_string());

    let mut headers = FrameHeaders::new();
    headers.insert(HEADER_CONTENT_TYPE.to_string(), BODY_CONTENT_TYPE.to_string());
    headers.insert(HEADER_FRAME_CURRENT.to_string(), frame_index.to_string());
    headers.insert(HEADER_FRAME_TOTAL.to_string(), total);
    headers.insert(HEADER_MASK_TYPE.to_string(), MASK_TYPE_RLE_ARRAY.to_string());
    headers
}

pub fn frame_message(frame: &FrameResult) -> Result<FrameMessage> {
    let body = serde_json::to_vec(frame)?;
    Ok(FrameMessage::new(
        frame_headers(frame.frame_index, frame.total_frames),
        body,
    ))
}

/// Tracks the ordering guarantees of one propagation call.
#[derive(Debug, Default)]
struct FrameOrder {
    last_index: Option<u64>,
    total_frames: Option<Option<u64>>,
}

impl FrameOrder {
    fn check(&mut self, frame: &FrameResult) -> Result<()> {
        if let Some(last) = self.last_index {
            if frame.frame_index < last {
                return Err(Error::InferenceFailure(format!(
                    "frame index went backwards: {} after {}",
                    frame.frame_index, last
                )));
            }
        }
        match self.total_frames {
            Some(total) if total != frame.total_frames => {
                return Err(Error::InferenceFailure(format!(
                    "frame total changed mid-stream: {:?} after {:?}",
                    frame.total_frames, total
                )));
            }
            Some(_) => {}
            None => self.total_frames = Some(frame.total_frames),
        }
        self.last_index = Some(frame.frame_index);
        Ok(())
    }
}

/// One message per frame result, in engine order. The first error is yielded
/// and ends the stream; nothing further is pulled from the engine.
pub fn frame_messages(frames: FrameResultStream) -> FrameMessageStream {
    stream::unfold(Some((frames, FrameOrder::default())), |state| async move {
        let (mut frames, mut order) = state?;
        let next = match frames.next().await? {
            Ok(frame) => order.check(&frame).and_then(|_| frame_message(&frame)),
            Err(e) => Err(e),
        };
        match next {
            Ok(message) => {
                debug!("Frame message ready ({} body bytes)", message.body.len());
                Some((Ok(message), Some((frames, order))))
            }
            // dropping `frames` here releases the engine context
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Propagate `command` and encode every frame with `boundary`.
pub fn propagate(
    engine: Arc<dyn InferenceEngine>,
    command: PropagationCommand,
    boundary: &str,
) -> EncodedFrameStream {
    let boundary = boundary.to_string();
    frame_messages(adapter::propagate(engine, command))
        .map(move |message| message.map(|m| m.encode(&boundary)))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEngine;
    use savi_core::{ObjectId, RleMask};

    fn engine_with(indices: &[u64], total: Option<u64>) -> Arc<InMemoryEngine> {
        let engine = InMemoryEngine::new();
        let frames = indices
            .iter()
            .map(|&i| FrameResult::new(i).with_mask(ObjectId(1), RleMask::empty(2, 2)))
            .collect();
        engine.insert_session("s1", total, frames);
        Arc::new(engine)
    }

    #[test]
    fn test_headers_with_unknown_total() {
        let headers = frame_headers(4, None);
        let pairs: Vec<_> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("Content-Type", "application/json; charset=utf-8"),
                ("Frame-Current", "4"),
                ("Frame-Total", "-1"),
                ("Mask-Type", "RLE[]"),
            ]
        );
    }

    #[test]
    fn test_total_excludes_reference_frame() {
        assert_eq!(frame_headers(0, Some(10))["Frame-Total"], "9");
        assert_eq!(frame_headers(0, Some(0))["Frame-Total"], "-1");
    }

    #[test]
    fn test_body_is_frame_json() {
        let frame = FrameResult::new(2).with_mask(ObjectId(3), RleMask::empty(1, 1));
        let message = frame_message(&frame).unwrap();
        let decoded: FrameResult = serde_json::from_slice(&message.body).unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn test_messages_follow_engine_order() {
        let engine = engine_with(&[0, 1, 2, 3], Some(4));
        let messages: Vec<_> = frame_messages(adapter::propagate(engine.clone(), PropagationCommand::new("s1")))
            .collect()
            .await;
        let currents: Vec<_> = messages
            .iter()
            .map(|m| m.as_ref().unwrap().header("Frame-Current").unwrap().to_string())
            .collect();
        assert_eq!(currents, vec!["0", "1", "2", "3"]);
        assert!(messages
            .iter()
            .all(|m| m.as_ref().unwrap().header("Frame-Total") == Some("3")));
        assert_eq!(engine.context_counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_encoded_stream_decodes() {
        let engine = engine_with(&[5, 6, 7], None);
        let chunks: Vec<_> = propagate(engine, PropagationCommand::new("s1").with_start_frame_index(5), "frame")
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        for (chunk, expected) in chunks.iter().zip(["5", "6", "7"]) {
            let message = FrameMessage::decode(chunk.as_ref().unwrap()).unwrap();
            assert_eq!(message.header("Frame-Current"), Some(expected));
            assert_eq!(message.header("Mask-Type"), Some("RLE[]"));
        }
    }

    #[tokio::test]
    async fn test_backwards_index_terminates() {
        let frames = vec![
            Ok(FrameResult::new(3)),
            Ok(FrameResult::new(1)),
            Ok(FrameResult::new(4)),
        ];
        let items: Vec<_> = frame_messages(stream::iter(frames).boxed()).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::InferenceFailure(_))));
    }

    #[tokio::test]
    async fn test_mixed_total_terminates() {
        let frames = vec![
            Ok(FrameResult::new(0)),
            Ok(FrameResult::new(1).with_total_frames(5)),
        ];
        let items: Vec<_> = frame_messages(stream::iter(frames).boxed()).collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(Error::InferenceFailure(_))));
    }

    #[tokio::test]
    async fn test_repeated_index_allowed() {
        let frames = vec![Ok(FrameResult::new(2)), Ok(FrameResult::new(2))];
        let items: Vec<_> = frame_messages(stream::iter(frames).boxed()).collect().await;
        assert!(items.iter().all(|m| m.is_ok()));
    }
}
