// One printable line per received frame

use savi_core::protocol::{HEADER_FRAME_CURRENT, HEADER_FRAME_TOTAL};
use savi_core::{FrameMessage, FrameResult};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub current: String,
    pub total: String,
    /// `(object id, mask area in pixels)`
    pub objects: Vec<(u32, u64)>,
}

impl FrameSummary {
    pub fn from_message(message: &FrameMessage) -> anyhow::Result<Self> {
        let frame: FrameResult = serde_json::from_slice(&message.body)?;
        let objects = frame
            .results
            .iter()
            .map(|r| Ok((r.object_id.0, r.mask.area()?)))
            .collect::<savi_core::Result<Vec<_>>>()?;

        Ok(Self {
            current: message.header(HEADER_FRAME_CURRENT).unwrap_or("?").to_string(),
            total: message.header(HEADER_FRAME_TOTAL).unwrap_or("?").to_string(),
            objects,
        })
    }
}

impl fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}/{}:", self.current, self.total)?;
        if self.objects.is_empty() {
            return write!(f, " no objects");
        }
        for (id, area) in &self.objects {
            write!(f, " obj{}={}px", id, area)?;
        }
        Ok(())
    }
}
