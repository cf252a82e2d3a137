//! Connection handling dengan cirbuf staging
//!
//! Setiap koneksi punya dua cirbuf: inbound (socket -> aplikasi) dan
//! outbound (aplikasi -> socket). `read(2)` menulis langsung ke free space
//! inbound dan `write(2)` membaca langsung dari data outbound, tanpa
//! compaction dan tanpa copy di wraparound.

use std::io::{self, Read, Write};

use crate::core::Cirbuf;
use crate::error::Result;

/// Non-blocking connection wrapper dengan staging buffer di kedua arah.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    inbound: Cirbuf,
    outbound: Cirbuf,
}

impl<S: Read + Write> Connection<S> {
    /// Wrap `stream` dengan dua cirbuf masing-masing `capacity` byte.
    ///
    /// Stream diasumsikan sudah non-blocking (atau caller siap di-block).
    pub fn new(stream: S, capacity: usize) -> Result<Self> {
        Ok(Self {
            stream,
            inbound: Cirbuf::new(capacity)?,
            outbound: Cirbuf::new(capacity)?,
        })
    }

    /// Read dari socket ke inbound buffer sampai `WouldBlock` atau penuh.
    ///
    /// Returns jumlah bytes yang tersedia untuk dibaca. Peer yang menutup
    /// koneksi dilaporkan sebagai `ConnectionReset`.
    pub fn fill_read_buffer(&mut self) -> io::Result<usize> {
        while !self.inbound.is_full() {
            match self.inbound.fill_from(&mut self.stream) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "Connection closed",
                    ));
                }
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(self.inbound.usedspace())
    }

    /// Get readable data slice (zero-copy)
    #[inline(always)]
    pub fn readable(&self) -> &[u8] {
        self.inbound.peek()
    }

    /// Inbound tidak bisa menerima byte lagi sampai di-consume
    #[inline(always)]
    pub fn read_buffer_full(&self) -> bool {
        self.inbound.is_full()
    }

    /// Consume n bytes dari read buffer
    #[inline(always)]
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.inbound.usedspace());
        // n sudah di-clamp ke usedspace, poll tidak mungkin underrun
        let released = self.inbound.poll(n);
        debug_assert!(released.is_some());
    }

    /// Queue data untuk write (copy ke outbound buffer)
    ///
    /// Jika tidak muat, flush dulu. Jika tetap tidak muat, returns
    /// `WouldBlock` dan tidak ada yang di-queue.
    pub fn queue_write(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() > self.outbound.unusedspace() {
            self.flush_write_buffer()?;
        }
        self.outbound.try_offer(data)?;
        Ok(())
    }

    /// Flush outbound buffer ke socket sampai kosong atau `WouldBlock`.
    pub fn flush_write_buffer(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.outbound.drain_to(&mut self.stream) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "Failed to write to socket",
                    ));
                }
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Pindahkan sebanyak mungkin data inbound ke outbound (echo).
    ///
    /// Returns jumlah byte yang dipindah.
    pub fn echo_readable(&mut self) -> usize {
        let n = self.inbound.usedspace().min(self.outbound.unusedspace());
        match self.inbound.poll(n) {
            Some(data) => self.outbound.offer(data),
            None => 0,
        }
    }

    /// Bytes pending in write buffer
    #[inline(always)]
    pub fn write_pending(&self) -> usize {
        self.outbound.usedspace()
    }

    /// Get underlying stream untuk polling
    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::page_size;
    use std::collections::VecDeque;

    /// Stream palsu: `input` dibaca per chunk, `output` dibatasi `write_limit`.
    struct MockStream {
        input: VecDeque<io::Result<Vec<u8>>>,
        output: Vec<u8>,
        write_limit: usize,
    }

    impl MockStream {
        fn new(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                input: chunks.into(),
                output: Vec::new(),
                write_limit: usize::MAX,
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.input.pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.input.push_front(Ok(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.write_limit == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.write_limit);
            self.write_limit -= n;
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fill_until_would_block() {
        let stream = MockStream::new(vec![Ok(b"hello ".to_vec()), Ok(b"world".to_vec())]);
        let mut conn = Connection::new(stream, page_size()).unwrap();

        assert_eq!(conn.fill_read_buffer().unwrap(), 11);
        assert_eq!(conn.readable(), b"hello world");

        conn.consume(6);
        assert_eq!(conn.readable(), b"world");
        conn.consume(100);
        assert!(conn.readable().is_empty());
    }

    #[test]
    fn test_consume_clamps_to_buffered() {
        let stream = MockStream::new(vec![Ok(b"abc".to_vec())]);
        let mut conn = Connection::new(stream, page_size()).unwrap();

        // Kosong: consume berapa pun tidak mengubah apa-apa
        conn.consume(10);
        assert!(conn.readable().is_empty());

        conn.fill_read_buffer().unwrap();
        conn.consume(2);
        assert_eq!(conn.readable(), b"c");
        conn.consume(usize::MAX);
        assert!(conn.readable().is_empty());
        conn.consume(1);
        assert!(conn.readable().is_empty());
    }

    #[test]
    fn test_peer_close_is_reset() {
        let stream = MockStream::new(vec![Ok(b"bye".to_vec()), Ok(Vec::new())]);
        let mut conn = Connection::new(stream, page_size()).unwrap();

        let err = conn.fill_read_buffer().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(conn.readable(), b"bye");
    }

    #[test]
    fn test_partial_flush_keeps_pending() {
        let mut stream = MockStream::new(Vec::new());
        stream.write_limit = 4;
        let mut conn = Connection::new(stream, page_size()).unwrap();

        conn.queue_write(b"abcdefgh").unwrap();
        conn.flush_write_buffer().unwrap();
        assert_eq!(conn.stream().output, b"abcd");
        assert_eq!(conn.write_pending(), 4);

        conn.stream_mut().write_limit = usize::MAX;
        conn.flush_write_buffer().unwrap();
        assert_eq!(conn.stream().output, b"abcdefgh");
        assert_eq!(conn.write_pending(), 0);
    }

    #[test]
    fn test_queue_write_too_large_would_block() {
        let mut stream = MockStream::new(Vec::new());
        stream.write_limit = 0;
        let mut conn = Connection::new(stream, page_size()).unwrap();

        let big = vec![1u8; page_size()];
        let err = conn.queue_write(&big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(conn.write_pending(), 0);
    }

    #[test]
    fn test_echo_readable() {
        let stream = MockStream::new(vec![Ok(b"ping".to_vec())]);
        let mut conn = Connection::new(stream, page_size()).unwrap();

        conn.fill_read_buffer().unwrap();
        assert_eq!(conn.echo_readable(), 4);
        assert!(conn.readable().is_empty());
        conn.flush_write_buffer().unwrap();
        assert_eq!(conn.stream().output, b"ping");
    }
}
