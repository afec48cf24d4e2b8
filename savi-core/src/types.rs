use crate::rle::RleMask;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tracked object within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated request to propagate masks through a session's video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationCommand {
    pub session_id: String,
    pub start_frame_index: u64,
    pub quick_test_mode: bool,
}

impl PropagationCommand {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            start_frame_index: 0,
            quick_test_mode: false,
        }
    }

    pub fn with_start_frame_index(mut self, start_frame_index: u64) -> Self {
        self.start_frame_index = start_frame_index;
        self
    }

    pub fn with_quick_test_mode(mut self, quick_test_mode: bool) -> Self {
        self.quick_test_mode = quick_test_mode;
        self
    }
}

/// Mask of one object on one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMask {
    pub object_id: ObjectId,
    pub mask: RleMask,
}

/// Engine output for a single video frame.
///
/// Serializes to the message body clients consume:
/// `{"frameIndex": 3, "results": [{"objectId": 1, "mask": {...}}]}`.
/// `total_frames` travels in the `Frame-Total` header instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub frame_index: u64,
    #[serde(skip)]
    pub total_frames: Option<u64>,
    pub results: Vec<ObjectMask>,
}

impl FrameResult {
    pub fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            total_frames: None,
            results: Vec::new(),
        }
    }

    pub fn with_total_frames(mut self, total_frames: u64) -> Self {
        self.total_frames = Some(total_frames);
        self
    }

    pub fn with_mask(mut self, object_id: ObjectId, mask: RleMask) -> Self {
        self.results.push(ObjectMask { object_id, mask });
        self
    }

    pub fn mask(&self, object_id: ObjectId) -> Option<&RleMask> {
        self.results
            .iter()
            .find(|r| r.object_id == object_id)
            .map(|r| &r.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_result_body_shape() {
        let frame = FrameResult::new(7)
            .with_total_frames(100)
            .with_mask(ObjectId(1), RleMask::empty(2, 2));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "frameIndex": 7,
                "results": [{"objectId": 1, "mask": {"size": [2, 2], "counts": "4"}}]
            })
        );
    }

    #[test]
    fn test_frame_result_parses_body() {
        let body = r#"{"frameIndex":2,"results":[{"objectId":4,"mask":{"size":[1,1],"counts":"1"}}]}"#;
        let frame: FrameResult = serde_json::from_str(body).unwrap();
        assert_eq!(frame.frame_index, 2);
        assert_eq!(frame.total_frames, None);
        assert!(frame.mask(ObjectId(4)).is_some());
        assert!(frame.mask(ObjectId(5)).is_none());
    }

    #[test]
    fn test_command_builder() {
        let command = PropagationCommand::new("abc")
            .with_start_frame_index(3)
            .with_quick_test_mode(true);
        assert_eq!(command.session_id, "abc");
        assert_eq!(command.start_frame_index, 3);
        assert!(command.quick_test_mode);
    }
}
