//! Line framing for tool output streams.
//!
//! ffmpeg ends its periodic stats line with a bare carriage return so it can
//! redraw it in place, while regular log lines end with a newline. The
//! [`ToolLineCodec`] treats either byte as a terminator so both kinds of line
//! reach the line handler as soon as they are written.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Longest line buffered before it is emitted unterminated.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// A [`Decoder`] that splits on `\n` or `\r` and yields lossy UTF-8 lines.
///
/// Empty lines (including the gap in a `\r\n` pair) are skipped.
#[derive(Debug, Default, Clone)]
pub struct ToolLineCodec {
    /// Bytes of the buffer already scanned without finding a terminator.
    next_index: usize,
}

impl ToolLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_terminator(b: &u8) -> bool {
    *b == b'\n' || *b == b'\r'
}

fn to_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for ToolLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let Some(offset) = buf[self.next_index..].iter().position(is_terminator) else {
                if buf.len() >= MAX_LINE_LENGTH {
                    self.next_index = 0;
                    let line = buf.split_to(buf.len());
                    return Ok(Some(to_line(&line)));
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let line = buf.split_to(end + 1);
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            return Ok(Some(to_line(line)));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        Ok(Some(to_line(&line)))
    }
}
