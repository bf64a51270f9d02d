//! Fixed-capacity echo buffer with read/write offset bookkeeping.
//!
//! Bytes are appended at `read_offset` as they arrive from a peer and
//! sent back from `write_offset`. The invariant
//! `write_offset <= read_offset <= capacity` holds across every call.
//! Once everything read has been written back, `recycle` rewinds both
//! offsets so the next request starts at the front again.

use std::io::{self, Read, Write};

/// Result of pulling bytes from a peer into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Filled {
    /// Bytes appended during this call.
    pub bytes: usize,
    /// The peer reported end-of-stream.
    pub eof: bool,
}

/// Result of pushing pending bytes back to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drained {
    /// Bytes sent during this call.
    pub bytes: usize,
    /// A write accepted zero bytes; the peer is gone.
    pub closed: bool,
}

pub struct EchoBuffer {
    data: Box<[u8]>,
    read_offset: usize,
    write_offset: usize,
}

impl EchoBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read_offset: 0,
            write_offset: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Space left for incoming bytes.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.read_offset
    }

    /// Bytes read but not yet echoed.
    pub fn pending(&self) -> usize {
        self.read_offset - self.write_offset
    }

    /// Current `(read_offset, write_offset)`.
    pub fn offsets(&self) -> (usize, usize) {
        (self.read_offset, self.write_offset)
    }

    #[cfg(test)]
    /// Bytes read so far in the current cycle.
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.read_offset]
    }

    /// Read from `reader` until it would block, hits end-of-stream, or the
    /// buffer is full.
    ///
    /// Would-block is not an error. Any other failure is returned as-is,
    /// with bytes already appended kept in the buffer.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Filled> {
        let mut filled = Filled::default();
        while self.remaining() > 0 {
            match reader.read(&mut self.data[self.read_offset..]) {
                Ok(0) => {
                    filled.eof = true;
                    break;
                }
                Ok(n) => {
                    self.read_offset += n;
                    filled.bytes += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Write pending bytes to `writer` until it would block or nothing is
    /// left.
    pub fn drain_into<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<Drained> {
        let mut drained = Drained::default();
        while self.pending() > 0 {
            match writer.write(&self.data[self.write_offset..self.read_offset]) {
                Ok(0) => {
                    drained.closed = true;
                    break;
                }
                Ok(n) => {
                    self.write_offset += n;
                    drained.bytes += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(drained)
    }

    /// Rewind both offsets when everything read has been echoed.
    ///
    /// Returns whether a rewind happened.
    pub fn recycle(&mut self) -> bool {
        if self.read_offset == self.write_offset {
            self.read_offset = 0;
            self.write_offset = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    /// Reader that hands out scripted chunks, then would-block (or EOF).
    pub struct ScriptedReader {
        chunks: VecDeque<Vec<u8>>,
        eof: bool,
    }

    impl ScriptedReader {
        pub fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                eof: false,
            }
        }

        pub fn then_eof(mut self) -> Self {
            self.eof = true;
            self
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.front_mut() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.chunks.pop_front();
                    }
                    Ok(n)
                }
                None if self.eof => Ok(0),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    /// Writer that accepts at most `budget` bytes in total, then would-block.
    pub struct LimitedWriter {
        pub written: Vec<u8>,
        budget: usize,
        zero_when_exhausted: bool,
    }

    impl LimitedWriter {
        pub fn new(budget: usize) -> Self {
            Self {
                written: Vec::new(),
                budget,
                zero_when_exhausted: false,
            }
        }

        /// Report `Ok(0)` instead of would-block once the budget runs out.
        pub fn closing(budget: usize) -> Self {
            Self {
                zero_when_exhausted: true,
                ..Self::new(budget)
            }
        }
    }

    impl Write for LimitedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return if self.zero_when_exhausted {
                    Ok(0)
                } else {
                    Err(io::ErrorKind::WouldBlock.into())
                };
            }
            let n = buf.len().min(self.budget);
            self.written.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{LimitedWriter, ScriptedReader};
    use super::*;

    #[test]
    fn test_fill_then_drain_roundtrip() {
        let mut buf = EchoBuffer::new(16);
        let mut reader = ScriptedReader::new(&[b"hello ", b"world"]);

        let filled = buf.fill_from(&mut reader).unwrap();
        assert_eq!(filled, Filled { bytes: 11, eof: false });
        assert_eq!(buf.pending(), 11);

        let mut writer = LimitedWriter::new(usize::MAX);
        let drained = buf.drain_into(&mut writer).unwrap();
        assert_eq!(drained.bytes, 11);
        assert_eq!(writer.written, b"hello world");
        assert_eq!(buf.offsets(), (11, 11));

        assert!(buf.recycle());
        assert_eq!(buf.offsets(), (0, 0));
    }

    #[test]
    fn test_fill_stops_at_capacity() {
        let mut buf = EchoBuffer::new(4);
        let mut reader = ScriptedReader::new(&[b"abcdefgh"]);

        let filled = buf.fill_from(&mut reader).unwrap();
        assert_eq!(filled.bytes, 4);
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.contents(), b"abcd");

        // Full buffer: nothing more is read.
        assert_eq!(buf.fill_from(&mut reader).unwrap().bytes, 0);
    }

    #[test]
    fn test_fill_reports_eof_after_data() {
        let mut buf = EchoBuffer::new(16);
        let mut reader = ScriptedReader::new(&[b"bye"]).then_eof();

        let filled = buf.fill_from(&mut reader).unwrap();
        assert_eq!(filled, Filled { bytes: 3, eof: true });
    }

    #[test]
    fn test_short_drain_keeps_offsets_ordered() {
        let mut buf = EchoBuffer::new(16);
        buf.fill_from(&mut ScriptedReader::new(&[b"0123456789"]))
            .unwrap();

        let mut writer = LimitedWriter::new(4);
        let drained = buf.drain_into(&mut writer).unwrap();
        assert_eq!(drained, Drained { bytes: 4, closed: false });

        let (read, write) = buf.offsets();
        assert!(write <= read);
        assert_eq!((read, write), (10, 4));
        assert!(!buf.recycle());
        assert_eq!(buf.pending(), 6);
    }

    #[test]
    fn test_zero_write_marks_closed() {
        let mut buf = EchoBuffer::new(8);
        buf.fill_from(&mut ScriptedReader::new(&[b"abc"])).unwrap();

        let drained = buf.drain_into(&mut LimitedWriter::closing(0)).unwrap();
        assert_eq!(drained, Drained { bytes: 0, closed: true });
        assert_eq!(buf.pending(), 3);
    }

    #[test]
    fn test_read_error_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::ErrorKind::ConnectionReset.into())
            }
        }

        let mut buf = EchoBuffer::new(8);
        let err = buf.fill_from(&mut Broken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
