//! cirbuf - Mirrored Byte Ring Buffer
//!
//! Ring buffer byte dengan kapasitas tetap yang backing memory-nya di-mmap
//! dua kali secara berurutan. Akibatnya region data mana pun, termasuk yang
//! melewati ujung buffer, selalu bisa diakses sebagai satu slice kontigu.
//! Cocok untuk staging I/O socket tanpa memcpy di setiap wraparound.
//!
//! Arsitektur:
//! - `core`: dual-mapping allocator + ring buffer state machine
//! - `network`: staging buffer untuk koneksi non-blocking (mio)
//! - `error`: error types
//!
//! ```rust,no_run
//! use cirbuf::{page_size, Cirbuf};
//!
//! let mut cb = Cirbuf::new(page_size()).unwrap();
//! assert_eq!(cb.offer(b"abcd"), 4);
//! assert_eq!(cb.poll(4), Some(&b"abcd"[..]));
//! assert!(cb.is_empty());
//! ```

#[cfg(not(unix))]
compile_error!("cirbuf requires a Unix platform (mmap with MAP_FIXED)");

pub mod core;
pub mod error;
pub mod network;

pub use crate::core::{page_size, Cirbuf, MirroredMap};
pub use crate::error::{Error, Result};
