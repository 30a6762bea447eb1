use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use qr_gate_common::frame::Frame;
use tracing::{debug, info, warn};

use crate::source::FrameSource;
use crate::CaptureError;

const HEADER_END: &[u8] = b"\r\n\r\n";
const DEFAULT_BOUNDARY: &str = "frame";

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--<boundary>\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace` body.
///
/// Bytes are pushed as they arrive; complete JPEG parts are pulled out one at a time.
pub struct MjpegParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MjpegParser {
    pub fn new(boundary: &str) -> Self {
        let boundary = boundary.trim_start_matches("--");
        Self {
            boundary: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete JPEG part, or `None` if more bytes are needed.
    pub fn next_jpeg(&mut self) -> Option<Vec<u8>> {
        let boundary_len = self.boundary.len();
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        // Discard everything up to and including the boundary
                        let _ = self.buffer.split_to(pos + boundary_len);
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > boundary_len {
                            let _ = self.buffer.split_to(self.buffer.len() - boundary_len);
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        return None;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], &self.boundary)
                    else {
                        // Skip already-scanned bytes on the next call
                        self.jpeg_start = self.buffer.len().saturating_sub(boundary_len);
                        return None;
                    };
                    let jpeg_end = self.jpeg_start + pos;
                    // Strip trailing \r\n before boundary
                    let end = if jpeg_end >= 2
                        && self.buffer[jpeg_end - 2] == b'\r'
                        && self.buffer[jpeg_end - 1] == b'\n'
                    {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let jpeg = self.buffer[..end].to_vec();
                    let _ = self.buffer.split_to(jpeg_end + boundary_len);
                    self.state = ParseState::SeekingHeaderEnd;

                    if !jpeg.is_empty() {
                        return Some(jpeg);
                    }
                }
            }
        }
    }
}

/// Camera reachable as an MJPEG-over-HTTP stream.
pub struct MjpegCamera {
    url: String,
    stream: Option<ByteStream>,
    parser: MjpegParser,
    seq: u64,
}

impl MjpegCamera {
    /// Connect to the stream and check the response status.
    pub async fn open(url: &str, connect_timeout: Duration) -> Result<Self, CaptureError> {
        info!(url, "connecting to MJPEG stream");
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(CaptureError::Connect)?;
        let response = client.get(url).send().await.map_err(CaptureError::Connect)?;

        if !response.status().is_success() {
            return Err(CaptureError::HttpStatus(response.status().as_u16()));
        }

        let boundary = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());

        info!(status = %response.status(), boundary, "connected to MJPEG stream");

        Ok(Self {
            url: url.to_string(),
            stream: Some(Box::pin(response.bytes_stream())),
            parser: MjpegParser::new(&boundary),
            seq: 0,
        })
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

impl FrameSource for MjpegCamera {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn read(&mut self) -> Result<Frame, CaptureError> {
        loop {
            if let Some(jpeg) = self.parser.next_jpeg() {
                let seq = self.seq;
                self.seq += 1;
                return match image::load_from_memory(&jpeg) {
                    Ok(img) => {
                        debug!(seq, bytes = jpeg.len(), "decoded MJPEG frame");
                        Ok(Frame::now(img.to_rgb8(), seq))
                    }
                    Err(e) => Err(CaptureError::CorruptFrame(e.to_string())),
                };
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(CaptureError::Closed);
            };
            match stream.next().await {
                Some(Ok(chunk)) => self.parser.push(&chunk),
                Some(Err(e)) => {
                    warn!(error = %e, url = self.url, "MJPEG stream error");
                    self.close();
                    return Err(CaptureError::Stream(e));
                }
                None => {
                    info!(url = self.url, "MJPEG stream ended");
                    self.close();
                    return Err(CaptureError::Closed);
                }
            }
        }
    }

    fn release(&mut self) {
        if self.stream.is_some() {
            info!(url = self.url, "releasing MJPEG stream");
        }
        self.close();
    }
}

/// Extract the part boundary from a `multipart/x-mixed-replace; boundary=...` header.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(boundary: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!("--{boundary}\r\nContent-Type: image/jpeg\r\n\r\n").into_bytes();
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
        out
    }

    #[test]
    fn boundary_from_header() {
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace; boundary=frame").as_deref(),
            Some("frame")
        );
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace;boundary=\"boundarydonotcross\"")
                .as_deref(),
            Some("boundarydonotcross")
        );
        assert_eq!(boundary_from_content_type("image/jpeg"), None);
    }

    #[test]
    fn splits_parts_in_one_chunk() {
        let mut parser = MjpegParser::new("frame");
        let mut body = part("frame", b"AAAA");
        body.extend(part("frame", b"BBBBBB"));
        body.extend_from_slice(b"--frame\r\n");
        parser.push(&body);

        assert_eq!(parser.next_jpeg().as_deref(), Some(&b"AAAA"[..]));
        assert_eq!(parser.next_jpeg().as_deref(), Some(&b"BBBBBB"[..]));
        assert_eq!(parser.next_jpeg(), None);
    }

    #[test]
    fn handles_parts_split_across_chunks() {
        let mut parser = MjpegParser::new("--frame");
        let mut body = part("frame", b"0123456789");
        body.extend_from_slice(b"--frame\r\n");

        let mut found = Vec::new();
        for chunk in body.chunks(3) {
            parser.push(chunk);
            while let Some(jpeg) = parser.next_jpeg() {
                found.push(jpeg);
            }
        }
        assert_eq!(found, vec![b"0123456789".to_vec()]);
    }

    #[test]
    fn part_is_not_emitted_before_next_boundary() {
        let mut parser = MjpegParser::new("frame");
        parser.push(&part("frame", b"XYZ"));
        assert_eq!(parser.next_jpeg(), None);
        parser.push(b"--frame\r\n");
        assert_eq!(parser.next_jpeg().as_deref(), Some(&b"XYZ"[..]));
    }

    #[test]
    fn garbage_before_first_boundary_is_skipped() {
        let mut parser = MjpegParser::new("frame");
        let mut body = b"HTTP noise without a boundary".to_vec();
        body.extend(part("frame", b"JPG"));
        body.extend_from_slice(b"--frame\r\n");
        parser.push(&body);
        assert_eq!(parser.next_jpeg().as_deref(), Some(&b"JPG"[..]));
    }
}
