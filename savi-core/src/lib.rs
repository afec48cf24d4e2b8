pub mod catalog;
pub mod config;
pub mod error;
pub mod multipart;
pub mod protocol;
pub mod request;
pub mod rle;
pub mod types;

pub use catalog::{Video, VideoCatalog};
pub use config::{ConfigError, SaviConfig};
pub use error::{Error, Result};
pub use multipart::{FrameHeaders, FrameMessage, MultipartStreamDecoder};
pub use request::{parse_propagation_request, validate_propagation_request};
pub use rle::RleMask;
pub use types::{FrameResult, ObjectId, ObjectMask, PropagationCommand};
