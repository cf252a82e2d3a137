//! Byte ring buffer di atas mirrored mapping
//!
//! `head` = byte tertua yang belum di-poll, `tail` = posisi tulis berikutnya.
//! Keduanya selalu di `[0, capacity)`. `head == tail` berarti kosong, jadi
//! satu slot selalu dikorbankan: isi maksimal `capacity - 1` byte.
//!
//! Karena mapping di-mirror, region `[head, head + usedspace)` dan
//! `[tail, tail + unusedspace)` selalu kontigu walaupun melewati `capacity`.
//! Tidak ada logika dua-segmen di sini.
//!
//! Tidak ada sinkronisasi internal. Satu writer (offer/commit) dan satu
//! reader (poll/peek) harus dikoordinasi oleh caller.

use std::fmt;
use std::io::{self, Read, Write};

use tracing::trace;

use super::mirror::MirroredMap;
use crate::error::{Error, Result};

/// Fixed-capacity byte ring buffer dengan zero-copy wraparound.
pub struct Cirbuf {
    storage: MirroredMap,
    head: usize,
    tail: usize,
}

impl Cirbuf {
    /// Membuat buffer baru. `capacity` HARUS kelipatan page size.
    ///
    /// Alokasi (dua mmap) hanya terjadi di sini; tidak ada alokasi di hot path.
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            storage: MirroredMap::new(capacity)?,
            head: 0,
            tail: 0,
        })
    }

    /// Kapasitas saat konstruksi (bukan `2 * capacity`).
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Jumlah byte yang belum di-poll.
    #[inline(always)]
    pub fn usedspace(&self) -> usize {
        let capacity = self.capacity();
        (self.tail + capacity - self.head) % capacity
    }

    /// Offer terbesar yang saat ini akan berhasil.
    #[inline(always)]
    pub fn unusedspace(&self) -> usize {
        self.capacity() - 1 - self.usedspace()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.unusedspace() == 0
    }

    /// Offset byte tertua.
    #[inline(always)]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Offset tulis berikutnya.
    #[inline(always)]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Append `data` (producer side).
    ///
    /// Returns `data.len()` jika berhasil, `0` jika tidak cukup ruang.
    /// Tidak pernah menulis sebagian.
    #[inline]
    pub fn offer(&mut self, data: &[u8]) -> usize {
        self.try_offer(data).unwrap_or(0)
    }

    /// Seperti [`offer`](Self::offer), tapi penolakan dilaporkan sebagai
    /// [`Error::InsufficientSpace`].
    pub fn try_offer(&mut self, data: &[u8]) -> Result<usize> {
        let available = self.unusedspace();
        if data.len() > available {
            trace!(requested = data.len(), available, "offer rejected");
            return Err(Error::InsufficientSpace {
                requested: data.len(),
                available,
            });
        }

        // SAFETY: tail < capacity dan len <= capacity - 1, jadi
        // [tail, tail + len) ada di dalam region 2 * capacity. Region ini
        // free space, tidak overlap dengan data yang sedang dibaca.
        unsafe {
            let dst = self.storage.as_mut_ptr().add(self.tail);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        self.advance_tail(data.len());

        Ok(data.len())
    }

    /// Consume `len` byte (consumer side).
    ///
    /// Returns view ke data yang dilepas, mulai dari `head` sebelum advance,
    /// atau `None` jika `len > usedspace()`. View ini bukan copy: isinya
    /// valid sampai byte yang sama ditimpa offer berikutnya.
    #[inline]
    pub fn poll(&mut self, len: usize) -> Option<&[u8]> {
        self.try_poll(len).ok()
    }

    /// Seperti [`poll`](Self::poll), tapi penolakan dilaporkan sebagai
    /// [`Error::Underrun`].
    pub fn try_poll(&mut self, len: usize) -> Result<&[u8]> {
        let available = self.usedspace();
        if len > available {
            trace!(requested = len, available, "poll rejected");
            return Err(Error::Underrun {
                requested: len,
                available,
            });
        }

        let start = self.head;
        self.head = (self.head + len) % self.capacity();

        // SAFETY: start < capacity, len < capacity
        Ok(unsafe { std::slice::from_raw_parts(self.storage.as_ptr().add(start), len) })
    }

    /// Pointer ke `head`. Selalu berhasil, bahkan saat kosong.
    ///
    /// Valid untuk dibaca kontigu minimal `capacity` byte, tapi hanya
    /// `usedspace()` byte pertama yang berisi data.
    #[inline(always)]
    pub fn peek_ptr(&self) -> *const u8 {
        // SAFETY: head < capacity
        unsafe { self.storage.as_ptr().add(self.head) }
    }

    /// Seluruh data yang belum di-poll sebagai satu slice (zero-copy).
    #[inline(always)]
    pub fn peek(&self) -> &[u8] {
        // SAFETY: head + usedspace < 2 * capacity
        unsafe { std::slice::from_raw_parts(self.peek_ptr(), self.usedspace()) }
    }

    /// Free space di `tail` sebagai satu slice, untuk tulis in-place
    /// (misalnya `read(2)` langsung ke buffer). Publish dengan [`commit`](Self::commit).
    #[inline]
    pub fn writable(&mut self) -> &mut [u8] {
        let len = self.unusedspace();
        // SAFETY: region free, tidak overlap dengan [head, head + usedspace)
        unsafe { std::slice::from_raw_parts_mut(self.storage.as_mut_ptr().add(self.tail), len) }
    }

    /// Publish `len` byte yang sudah ditulis lewat [`writable`](Self::writable).
    pub fn commit(&mut self, len: usize) -> Result<()> {
        let available = self.unusedspace();
        if len > available {
            trace!(requested = len, available, "commit rejected");
            return Err(Error::InsufficientSpace {
                requested: len,
                available,
            });
        }
        self.advance_tail(len);
        Ok(())
    }

    /// Satu `read` dari `reader` langsung ke free space.
    ///
    /// Returns jumlah byte yang masuk. Reader tidak dipanggil jika buffer penuh.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.is_full() {
            return Ok(0);
        }
        let n = reader.read(self.writable())?;
        self.commit(n)?;
        Ok(n)
    }

    /// Satu `write` dari data yang ada langsung ke `writer`, lalu consume
    /// byte yang berhasil ditulis. Writer tidak dipanggil jika buffer kosong.
    pub fn drain_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let n = writer.write(self.peek())?;
        self.try_poll(n)?;
        Ok(n)
    }

    /// Buang semua data.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    #[inline(always)]
    fn advance_tail(&mut self, len: usize) {
        self.tail = (self.tail + len) % self.capacity();
    }
}

impl fmt::Debug for Cirbuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cirbuf")
            .field("capacity", &self.capacity())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("usedspace", &self.usedspace())
            .finish()
    }
}
