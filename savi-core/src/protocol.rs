//! Constants of the mask streaming protocol.

/// Boundary used by `POST /propagate_in_video`
pub const BOUNDARY: &str = "frame";

/// Media type of the streamed response, without the boundary parameter
pub const STREAM_MEDIA_TYPE: &str = "multipart/x-savi-stream";

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_FRAME_CURRENT: &str = "Frame-Current";
pub const HEADER_FRAME_TOTAL: &str = "Frame-Total";
pub const HEADER_MASK_TYPE: &str = "Mask-Type";

pub const BODY_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Mask encoding tag: a JSON array of RLE masks
pub const MASK_TYPE_RLE_ARRAY: &str = "RLE[]";

/// Header value for a frame index or count the engine cannot report
pub const UNKNOWN_FRAME: &str = "-1";

pub fn stream_content_type(boundary: &str) -> String {
    format!("{}; boundary={}", STREAM_MEDIA_TYPE, boundary)
}

/// Extract the boundary parameter from a `Content-Type` value.
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    let mut parts = content_type.split(';');
    let media_type = parts.next()?.trim();
    if !media_type.eq_ignore_ascii_case(STREAM_MEDIA_TYPE) {
        return None;
    }
    parts
        .filter_map(|p| p.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|b| !b.is_empty())
}
