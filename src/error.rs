//! Error types untuk cirbuf.

use std::io;

use thiserror::Error;

/// Result alias dengan [`Error`] milik crate ini.
pub type Result<T> = std::result::Result<T, Error>;

/// Semua kegagalan yang bisa dilaporkan oleh cirbuf.
///
/// Tidak ada satu pun variant yang merusak state buffer: offer/poll yang
/// ditolak selalu aman untuk di-retry.
#[derive(Error, Debug)]
pub enum Error {
    /// Capacity nol atau bukan kelipatan page size.
    #[error("capacity {capacity} is not a nonzero multiple of the page size ({page_size})")]
    UnalignedCapacity { capacity: usize, page_size: usize },

    /// `2 * capacity` tidak muat di address space.
    #[error("capacity {capacity} is too large to be mapped twice")]
    CapacityOverflow { capacity: usize },

    /// Reservasi, backing store, atau fixed mapping gagal.
    #[error("mirrored mapping failed: {0}")]
    Map(#[from] io::Error),

    /// Offer lebih besar dari free space (termasuk slot cadangan).
    #[error("cannot offer {requested} bytes, only {available} free")]
    InsufficientSpace { requested: usize, available: usize },

    /// Poll lebih banyak dari data yang ada.
    #[error("cannot poll {requested} bytes, only {available} buffered")]
    Underrun { requested: usize, available: usize },
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Map(e) => e,
            Error::InsufficientSpace { .. } => io::Error::new(io::ErrorKind::WouldBlock, err),
            Error::Underrun { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            Error::UnalignedCapacity { .. } | Error::CapacityOverflow { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
        }
    }
}
