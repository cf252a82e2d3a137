//! Mirrored (double-mapped) memory region
//!
//! Satu backing store di-mmap dua kali secara berurutan:
//!
//! ```text
//!   base                     base + capacity            base + 2*capacity
//!   ┌────────────────────────┬────────────────────────┐
//!   │   mapping #1 (fd, 0)   │   mapping #2 (fd, 0)   │
//!   └────────────────────────┴────────────────────────┘
//!              └──── physical pages yang sama ────┘
//! ```
//!
//! Byte `i + capacity` selalu alias ke byte `i`, jadi region apa pun yang
//! panjangnya <= capacity bisa diakses sebagai satu slice kontigu.
//!
//! Reservasi `2 * capacity` dipegang oleh `MmapMut` (memmap2). Kedua fixed
//! mapping ditimpa di atas reservasi itu, sehingga satu `munmap` saat drop
//! melepas semuanya sekaligus, termasuk mapping parsial kalau konstruksi gagal.

use std::fmt;
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::OnceLock;

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Page size platform, di-query sekali via `sysconf(_SC_PAGESIZE)`.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf tidak punya precondition
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        checked_page_size(size)
    })
}

/// Hasil sysconf <= 0 berarti gagal; pakai fallback tapi jangan diam-diam.
fn checked_page_size(raw: libc::c_long) -> usize {
    if raw > 0 {
        raw as usize
    } else {
        let err = io::Error::last_os_error();
        warn!(raw, error = %err, fallback = FALLBACK_PAGE_SIZE, "sysconf(_SC_PAGESIZE) failed");
        FALLBACK_PAGE_SIZE
    }
}

/// Region `2 * capacity` byte dengan paruh kedua sebagai mirror paruh pertama.
pub struct MirroredMap {
    // Reservasi penuh; drop = munmap(base, 2 * capacity)
    map: MmapMut,
    capacity: usize,
}

impl MirroredMap {
    /// Reserve address space dan pasang kedua mapping.
    ///
    /// # Errors
    /// - [`Error::UnalignedCapacity`] jika capacity nol atau bukan kelipatan page size
    /// - [`Error::CapacityOverflow`] jika `2 * capacity` overflow
    /// - [`Error::Map`] jika backing store atau mmap gagal
    pub fn new(capacity: usize) -> Result<Self> {
        let page_size = page_size();
        if capacity == 0 || capacity % page_size != 0 {
            return Err(Error::UnalignedCapacity {
                capacity,
                page_size,
            });
        }
        let total = capacity
            .checked_mul(2)
            .ok_or(Error::CapacityOverflow { capacity })?;

        let backing = backing_file(capacity)?;

        let mut map = MmapOptions::new().len(total).map_anon()?;
        let base = map.as_mut_ptr();

        // SAFETY: kedua target address berada di dalam reservasi milik `map`,
        // page-aligned, dan panjangnya sama dengan ukuran backing file.
        // Kalau gagal, `map` di-drop dan munmap membersihkan seluruh range.
        unsafe {
            map_fixed(base, capacity, &backing)?;
            map_fixed(base.add(capacity), capacity, &backing)?;
        }

        debug!(
            capacity,
            page_size,
            backing = BACKING_KIND,
            base = ?base,
            "mirrored mapping created"
        );

        // fd boleh ditutup; mapping tetap memegang pages
        drop(backing);

        Ok(Self { map, capacity })
    }

    /// Kapasitas satu paruh (bukan `2 * capacity`).
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Awal region; valid untuk `2 * capacity` byte.
    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    /// Awal region (mutable); valid untuk `2 * capacity` byte.
    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.map.as_mut_ptr()
    }
}

impl Drop for MirroredMap {
    fn drop(&mut self) {
        debug!(capacity = self.capacity, "releasing mirrored mapping");
    }
}

impl fmt::Debug for MirroredMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirroredMap")
            .field("base", &self.map.as_ptr())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// `mmap(MAP_SHARED | MAP_FIXED)` backing file ke `addr`.
///
/// # Safety
/// `addr..addr + len` harus berada di dalam reservasi yang dimiliki caller.
unsafe fn map_fixed(addr: *mut u8, len: usize, backing: &File) -> io::Result<()> {
    let ptr = libc::mmap(
        addr.cast(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED | libc::MAP_FIXED,
        backing.as_raw_fd(),
        0,
    );
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    if ptr.cast::<u8>() != addr {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "mmap ignored MAP_FIXED address",
        ));
    }
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const BACKING_KIND: &str = "memfd";

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const BACKING_KIND: &str = "unlinked-tempfile";

/// Anonymous memfd seukuran `len`.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn backing_file(len: usize) -> io::Result<File> {
    use std::os::unix::io::FromRawFd;

    // SAFETY: nama null-terminated, flags valid
    let fd = unsafe { libc::memfd_create(b"cirbuf\0".as_ptr().cast(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd baru dan belum dimiliki siapa pun
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len as u64)?;
    Ok(file)
}

/// Temp file yang langsung di-unlink; hanya fd yang tersisa.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn backing_file(len: usize) -> io::Result<File> {
    use std::fs::{self, OpenOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    let path = std::env::temp_dir().join(format!(
        "cirbuf-{}-{}",
        std::process::id(),
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    ));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)?;
    fs::remove_file(&path)?;
    file.set_len(len as u64)?;
    Ok(file)
}
