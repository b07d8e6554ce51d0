//! Tag frame decoder for the reader's serial stream.
//!
//! A frame is 14 bytes: start marker, twelve payload bytes, end marker. The
//! decoder counts bytes rather than searching for the end marker, so a frame
//! with a wrong last byte still completes; it is only flagged unconfirmed.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::io::ByteSource;

pub const FRAME_LEN: usize = 14;
pub const START_MARKER: u8 = 0x02;
pub const END_MARKER: u8 = 0x03;
/// Two hex digits per byte plus a single space between bytes.
pub const TAG_TEXT_BYTES: usize = FRAME_LEN * 3 - 1;

pub type TagText = String<TAG_TEXT_BYTES>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TagFrame {
    pub bytes: [u8; FRAME_LEN],
    /// Last byte matched the end marker.
    pub confirmed: bool,
}

impl TagFrame {
    pub fn text(&self) -> TagText {
        render_bytes(&self.bytes)
    }
}

#[derive(Debug, Default)]
pub struct TagFrameDecoder {
    buf: Vec<u8, FRAME_LEN>,
    collecting: bool,
}

impl TagFrameDecoder {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            collecting: false,
        }
    }

    /// Feeds one byte; returns a frame once the fourteenth byte arrives.
    pub fn feed(&mut self, byte: u8) -> Option<TagFrame> {
        if byte == START_MARKER {
            // Restart on every start marker, even mid-frame.
            self.buf.clear();
            self.collecting = true;
        } else if !self.collecting {
            return None;
        }

        // Cannot overflow: collection stops as soon as the buffer is full.
        let _ = self.buf.push(byte);
        if !self.buf.is_full() {
            return None;
        }

        self.collecting = false;
        let mut bytes = [0u8; FRAME_LEN];
        bytes.copy_from_slice(&self.buf);
        Some(TagFrame {
            bytes,
            confirmed: bytes[FRAME_LEN - 1] == END_MARKER,
        })
    }

    /// Drops any buffered bytes, completed or not.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.collecting = false;
    }

    pub fn in_progress(&self) -> bool {
        self.collecting
    }

    /// Rendering of whatever the buffer currently holds: the last completed
    /// frame, a partial frame, or nothing since the last reset.
    pub fn residue(&self) -> TagText {
        render_bytes(&self.buf)
    }

    /// Frames completed by the bytes the source has ready right now.
    ///
    /// Iteration stops when the source runs dry; a partial frame is kept and
    /// picked up by the next call.
    pub fn frames<'a, S>(&'a mut self, source: &'a mut S) -> Frames<'a, S>
    where
        S: ByteSource,
    {
        Frames {
            decoder: self,
            source,
        }
    }
}

pub struct Frames<'a, S> {
    decoder: &'a mut TagFrameDecoder,
    source: &'a mut S,
}

impl<S> Iterator for Frames<'_, S>
where
    S: ByteSource,
{
    type Item = Result<TagFrame, S::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.source.read_byte() {
                Ok(Some(byte)) => {
                    if let Some(frame) = self.decoder.feed(byte) {
                        return Some(Ok(frame));
                    }
                }
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

pub fn render_bytes(bytes: &[u8]) -> TagText {
    let mut out = TagText::new();
    for (index, byte) in bytes.iter().take(FRAME_LEN).enumerate() {
        if index > 0 {
            let _ = out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Inverse of [`render_bytes`].
pub fn parse_tag_text(text: &str) -> Option<Vec<u8, FRAME_LEN>> {
    let mut out = Vec::new();
    if text.is_empty() {
        return Some(out);
    }
    for token in text.split(' ') {
        if token.len() != 2 {
            return None;
        }
        let byte = u8::from_str_radix(token, 16).ok()?;
        out.push(byte).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: [u8; 12] = *b"0415AB2F9C3E";

    fn frame_bytes(last: u8) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = START_MARKER;
        bytes[1..13].copy_from_slice(&PAYLOAD);
        bytes[13] = last;
        bytes
    }

    fn feed_all(decoder: &mut TagFrameDecoder, bytes: &[u8]) -> std::vec::Vec<TagFrame> {
        bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
    }

    #[test]
    fn confirmed_frame_reproduces_all_bytes() {
        let mut decoder = TagFrameDecoder::new();
        let input = frame_bytes(END_MARKER);
        let frames = feed_all(&mut decoder, &input);

        assert_eq!(frames.len(), 1);
        assert!(frames[0].confirmed);
        assert_eq!(frames[0].bytes, input);
        assert_eq!(
            parse_tag_text(&frames[0].text()).unwrap().as_slice(),
            &input[..]
        );
    }

    #[test]
    fn wrong_end_marker_still_completes_unconfirmed() {
        let mut decoder = TagFrameDecoder::new();
        let frames = feed_all(&mut decoder, &frame_bytes(b'X'));

        assert_eq!(frames.len(), 1);
        assert!(!frames[0].confirmed);
        assert_eq!(frames[0].bytes[13], b'X');
    }

    #[test]
    fn noise_before_start_marker_is_ignored() {
        let mut decoder = TagFrameDecoder::new();
        let mut input = std::vec![0xFF, b'9', 0x03];
        input.extend_from_slice(&frame_bytes(END_MARKER));

        let frames = feed_all(&mut decoder, &input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, frame_bytes(END_MARKER));
    }

    #[test]
    fn new_start_marker_discards_partial_frame() {
        let mut decoder = TagFrameDecoder::new();
        let mut input = frame_bytes(END_MARKER)[..6].to_vec();
        input.extend_from_slice(&frame_bytes(END_MARKER));

        let frames = feed_all(&mut decoder, &input);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].confirmed);
    }

    #[test]
    fn residue_tracks_buffer_until_reset() {
        let mut decoder = TagFrameDecoder::new();
        assert_eq!(decoder.residue().as_str(), "");

        feed_all(&mut decoder, &frame_bytes(END_MARKER));
        assert!(!decoder.in_progress());
        assert_eq!(decoder.residue(), render_bytes(&frame_bytes(END_MARKER)));

        feed_all(&mut decoder, &[START_MARKER, b'0']);
        assert!(decoder.in_progress());
        assert_eq!(decoder.residue().as_str(), "02 30");

        decoder.reset();
        assert_eq!(decoder.residue().as_str(), "");
    }

    struct Chunked<'a> {
        bytes: &'a [u8],
        cursor: usize,
        ready_until: usize,
    }

    impl ByteSource for Chunked<'_> {
        type Error = core::convert::Infallible;

        fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
            if self.cursor >= self.ready_until.min(self.bytes.len()) {
                return Ok(None);
            }
            let byte = self.bytes[self.cursor];
            self.cursor += 1;
            Ok(Some(byte))
        }
    }

    #[test]
    fn frames_iterator_resumes_mid_frame() {
        let mut stream = frame_bytes(END_MARKER).to_vec();
        stream.extend_from_slice(&frame_bytes(b'?'));
        let mut source = Chunked {
            bytes: &stream,
            cursor: 0,
            ready_until: 20,
        };
        let mut decoder = TagFrameDecoder::new();

        let first: std::vec::Vec<_> = decoder.frames(&mut source).collect();
        assert_eq!(first.len(), 1);
        assert!(decoder.in_progress());

        source.ready_until = stream.len();
        let second: std::vec::Vec<_> = decoder.frames(&mut source).collect();
        assert_eq!(second.len(), 1);
        assert_eq!(
            second[0],
            Ok(TagFrame {
                bytes: frame_bytes(b'?'),
                confirmed: false,
            })
        );
    }
}
