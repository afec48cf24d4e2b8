pub mod adapter;
pub mod engine;
pub mod memory;
pub mod orchestrator;

pub use adapter::FrameResultStream;
pub use engine::{ContextGuard, FrameIter, InferenceEngine, SessionInfo};
pub use memory::InMemoryEngine;
pub use orchestrator::{EncodedFrameStream, FrameMessageStream};
