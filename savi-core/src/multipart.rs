// Frame message framing for multipart streams
//
// One message on the wire:
//
//   --<boundary>\r\n
//   Key: Value\r\n          (zero or more, in insertion order)
//   \r\n
//   <body>\r\n
//
// Messages are concatenated back to back, so consecutive bodies are separated
// by the delimiter `\r\n--<boundary>\r\n`.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

/// Ordered header mapping of a frame message
pub type FrameHeaders = IndexMap<String, String>;

const CRLF: &[u8] = b"\r\n";
const HEADER_SEPARATOR: &str = ": ";

/// One self-delimited unit of a multipart stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameMessage {
    pub headers: FrameHeaders,
    pub body: Bytes,
}

impl FrameMessage {
    pub fn new(headers: FrameHeaders, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn encode(&self, boundary: &str) -> Bytes {
        encode(boundary, &self.headers, &self.body)
    }

    pub fn decode(message: &[u8]) -> Result<Self> {
        let (headers, body) = decode(message)?;
        Ok(Self { headers, body })
    }
}

/// Header names must be non-empty and free of `:`, CR and LF.
pub fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && !name.contains([':', '\r', '\n'])
}

/// Header values must be free of CR and LF.
pub fn is_valid_header_value(value: &str) -> bool {
    !value.contains(['\r', '\n'])
}

/// Encode one message. Total over valid header names and values.
pub fn encode(boundary: &str, headers: &FrameHeaders, body: &[u8]) -> Bytes {
    debug_assert!(headers
        .iter()
        .all(|(k, v)| is_valid_header_name(k) && is_valid_header_value(v)));

    let header_len: usize = headers.iter().map(|(k, v)| k.len() + v.len() + 4).sum();
    let mut buf = BytesMut::with_capacity(boundary.len() + header_len + body.len() + 8);

    buf.put_slice(b"--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(CRLF);
    for (key, value) in headers {
        buf.put_slice(key.as_bytes());
        buf.put_slice(HEADER_SEPARATOR.as_bytes());
        buf.put_slice(value.as_bytes());
        buf.put_slice(CRLF);
    }
    buf.put_slice(CRLF);
    buf.put_slice(body);
    buf.put_slice(CRLF);
    buf.freeze()
}

/// Decode exactly one encoded message.
pub fn decode(message: &[u8]) -> Result<(FrameHeaders, Bytes)> {
    if !message.starts_with(b"--") {
        return Err(malformed("message does not start with a boundary marker"));
    }
    let boundary_end =
        find(message, CRLF, 0).ok_or_else(|| malformed("unterminated boundary line"))?;
    if boundary_end == 2 {
        return Err(malformed("empty boundary"));
    }

    let mut headers = FrameHeaders::new();
    let mut pos = boundary_end + CRLF.len();
    let body_start = loop {
        let line_end =
            find(message, CRLF, pos).ok_or_else(|| malformed("unterminated header section"))?;
        if line_end == pos {
            break line_end + CRLF.len();
        }
        let line = std::str::from_utf8(&message[pos..line_end])
            .map_err(|_| malformed("header line is not valid UTF-8"))?;
        let (key, value) = line
            .split_once(HEADER_SEPARATOR)
            .ok_or_else(|| malformed(&format!("header line without separator: {:?}", line)))?;
        if !is_valid_header_name(key) {
            return Err(malformed(&format!("invalid header name: {:?}", key)));
        }
        if headers.insert(key.to_string(), value.to_string()).is_some() {
            return Err(malformed(&format!("duplicate header: {}", key)));
        }
        pos = line_end + CRLF.len();
    };

    let rest = &message[body_start..];
    if !rest.ends_with(CRLF) {
        return Err(malformed("body is not terminated by CRLF"));
    }
    let body = Bytes::copy_from_slice(&rest[..rest.len() - CRLF.len()]);
    Ok((headers, body))
}

/// Boundary read from the first line of an encoded message.
pub fn boundary_of(message: &[u8]) -> Option<&str> {
    let end = find(message, CRLF, 0)?;
    let line = message.get(2..end).filter(|_| message.starts_with(b"--"))?;
    std::str::from_utf8(line).ok().filter(|b| !b.is_empty())
}

/// Incremental splitter for a multipart byte stream.
///
/// A message is released once the delimiter of the following message has
/// arrived; the last message is released by [`finish`](Self::finish).
/// Bodies must not contain the delimiter sequence.
#[derive(Debug)]
pub struct MultipartStreamDecoder {
    opening: Vec<u8>,
    delimiter: Vec<u8>,
    buffer: BytesMut,
    decoded: u64,
}

impl MultipartStreamDecoder {
    pub fn new(boundary: &str) -> Self {
        let opening = [b"--".as_slice(), boundary.as_bytes(), CRLF].concat();
        let delimiter = [CRLF, opening.as_slice()].concat();
        Self {
            opening,
            delimiter,
            buffer: BytesMut::new(),
            decoded: 0,
        }
    }

    /// Messages decoded so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Bytes waiting for the rest of their message
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<FrameMessage>> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        loop {
            if self.buffer.len() < self.opening.len() {
                if !self.opening.starts_with(&self.buffer) {
                    return Err(malformed("stream does not continue with a boundary marker"));
                }
                break;
            }
            if !self.buffer.starts_with(&self.opening) {
                return Err(malformed("stream does not continue with a boundary marker"));
            }

            let header_from = self.opening.len() - CRLF.len();
            let Some(header_end) = find(&self.buffer, b"\r\n\r\n", header_from) else {
                break;
            };
            let body_start = header_end + 2 * CRLF.len();
            let Some(next) = find(&self.buffer, &self.delimiter, body_start) else {
                break;
            };

            let message_len = next + CRLF.len();
            let message = FrameMessage::decode(&self.buffer[..message_len])?;
            self.buffer.advance(message_len);
            self.decoded += 1;
            messages.push(message);
        }

        Ok(messages)
    }

    /// Flush the final message at end of stream.
    pub fn finish(mut self) -> Result<Option<FrameMessage>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        if !self.buffer.starts_with(&self.opening) {
            return Err(malformed("trailing bytes are not a frame message"));
        }
        let message = FrameMessage::decode(&self.buffer)?;
        self.buffer.clear();
        self.decoded += 1;
        Ok(Some(message))
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

fn malformed(reason: &str) -> Error {
    Error::MalformedMessage(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol_headers(current: &str) -> FrameHeaders {
        let mut headers = FrameHeaders::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        headers.insert("Frame-Current".to_string(), current.to_string());
        headers.insert("Frame-Total".to_string(), "-1".to_string());
        headers.insert("Mask-Type".to_string(), "RLE[]".to_string());
        headers
    }

    #[test]
    fn test_encode_layout() {
        let encoded = encode("frame", &protocol_headers("-1"), b"{\"a\":1}");
        let expected = b"--frame\r\n\
Content-Type: application/json; charset=utf-8\r\n\
Frame-Current: -1\r\n\
Frame-Total: -1\r\n\
Mask-Type: RLE[]\r\n\
\r\n\
{\"a\":1}\r\n";
        assert_eq!(&encoded[..], &expected[..]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let headers = protocol_headers("3");
        let encoded = encode("frame", &headers, b"body");
        let (decoded_headers, body) = decode(&encoded).unwrap();
        assert_eq!(decoded_headers, headers);
        assert_eq!(&body[..], b"body");
        // insertion order survives
        let keys: Vec<_> = decoded_headers.keys().cloned().collect();
        assert_eq!(keys, vec!["Content-Type", "Frame-Current", "Frame-Total", "Mask-Type"]);
    }

    #[test]
    fn test_no_headers_and_empty_body() {
        let encoded = encode("b", &FrameHeaders::new(), b"");
        assert_eq!(&encoded[..], b"--b\r\n\r\n\r\n");
        let (headers, body) = decode(&encoded).unwrap();
        assert!(headers.is_empty());
        assert!(body.is_empty());
    }

    #[test]
    fn test_body_with_crlf() {
        let encoded = encode("frame", &FrameHeaders::new(), b"line1\r\n\r\nline2\r\n");
        let (_, body) = decode(&encoded).unwrap();
        assert_eq!(&body[..], b"line1\r\n\r\nline2\r\n");
    }

    #[test]
    fn test_boundary_of() {
        let encoded = encode("frame", &FrameHeaders::new(), b"x");
        assert_eq!(boundary_of(&encoded), Some("frame"));
        assert_eq!(boundary_of(b"nope\r\n"), None);
    }

    #[test]
    fn test_decode_malformed() {
        let cases: Vec<&[u8]> = vec![
            &b""[..],
            &b"frame\r\n\r\nbody\r\n"[..],
            &b"--\r\n\r\nbody\r\n"[..],
            &b"--frame"[..],
            &b"--frame\r\nKey value\r\n\r\nbody\r\n"[..],
            &b"--frame\r\nKey: a\r\nKey: b\r\n\r\nbody\r\n"[..],
            &b"--frame\r\nKey: a\r\n"[..],
            &b"--frame\r\n\r\nbody"[..],
            &b"--frame\r\n: empty\r\n\r\nbody\r\n"[..],
        ];
        for case in cases {
            match decode(case) {
                Err(Error::MalformedMessage(_)) => {}
                other => panic!("expected MalformedMessage for {:?}, got {:?}", case, other),
            }
        }
    }

    #[test]
    fn test_stream_decoder_splits_concatenated_messages() {
        let mut stream = Vec::new();
        for i in 0..3 {
            let body = format!("{{\"frameIndex\":{}}}", i);
            stream.extend_from_slice(&encode("frame", &protocol_headers(&i.to_string()), body.as_bytes()));
        }

        let mut decoder = MultipartStreamDecoder::new("frame");
        let mut messages = decoder.push(&stream).unwrap();
        // the last message waits for end of stream
        assert_eq!(messages.len(), 2);
        messages.extend(decoder.finish().unwrap());
        let currents: Vec<_> = messages
            .iter()
            .map(|m| m.header("Frame-Current").unwrap().to_string())
            .collect();
        assert_eq!(currents, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_stream_decoder_byte_by_byte() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode("frame", &protocol_headers("0"), b"a"));
        stream.extend_from_slice(&encode("frame", &FrameHeaders::new(), b""));
        stream.extend_from_slice(&encode("frame", &protocol_headers("2"), b"ccc"));

        let mut decoder = MultipartStreamDecoder::new("frame");
        let mut messages = Vec::new();
        for byte in &stream {
            messages.extend(decoder.push(std::slice::from_ref(byte)).unwrap());
        }
        messages.extend(decoder.finish().unwrap());

        assert_eq!(messages.len(), 3);
        assert_eq!(&messages[0].body[..], b"a");
        assert!(messages[1].headers.is_empty());
        assert!(messages[1].body.is_empty());
        assert_eq!(&messages[2].body[..], b"ccc");
    }

    #[test]
    fn test_stream_decoder_detects_truncation() {
        let encoded = encode("frame", &protocol_headers("0"), b"{\"frameIndex\":0}");
        let mut decoder = MultipartStreamDecoder::new("frame");
        assert!(decoder.push(&encoded[..encoded.len() - 5]).unwrap().is_empty());
        assert!(decoder.pending() > 0);
        assert!(matches!(decoder.finish(), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_stream_decoder_rejects_foreign_bytes() {
        let mut decoder = MultipartStreamDecoder::new("frame");
        assert!(decoder.push(b"HTTP/1.1 500").is_err());
    }

    #[test]
    fn test_stream_decoder_empty_stream() {
        let decoder = MultipartStreamDecoder::new("frame");
        assert_eq!(decoder.finish().unwrap(), None);
    }
}
