//! Line I/O with the grid host.

use std::io::{self, BufRead, BufReader, Write};

use grid_bridge_protocol::Frame;

use crate::error::Result;

/// The pair of text streams shared with the host.
///
/// Frames are written with a single `write_all` followed by a flush, so a
/// frame is never interleaved with other output.
pub struct Channel {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Channel {
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: BufRead + 'static,
        W: Write + 'static,
    {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Talk to the host over this process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }

    /// Read one line without its terminator; `None` at end of input.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Write one frame and flush it
    pub fn send(&mut self, frame: &Frame) -> Result<()> {
        let mut record = frame.encode()?;
        tracing::debug!("-> {}", preview(&record));
        record.push('\n');

        self.output.write_all(record.as_bytes())?;
        self.output.flush()?;
        Ok(())
    }
}

/// Shorten long frames (images, big writes) for log output
fn preview(record: &str) -> &str {
    const LIMIT: usize = 120;
    match record.char_indices().nth(LIMIT) {
        Some((idx, _)) => &record[..idx],
        None => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_lines() {
        let input = Cursor::new(b"first\r\nsecond\n\nlast".to_vec());
        let mut channel = Channel::new(input, io::sink());

        assert_eq!(channel.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(channel.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(channel.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(channel.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(channel.read_line().unwrap(), None);
    }

    #[test]
    fn test_send_writes_one_line_per_frame() {
        let out = Captured::default();
        let mut channel = Channel::new(Cursor::new(Vec::new()), out.clone());

        channel.send(&Frame::Diagnostic("hi".into())).unwrap();
        channel.send(&Frame::CommandComplete).unwrap();

        let text = String::from_utf8(out.0.borrow().clone()).unwrap();
        assert_eq!(text, "#INTERPRETER#hi#ENDPARSE#\n#COMMANDCOMPLETE#\n");
    }
}
