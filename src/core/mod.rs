//! Core module: Mirrored Ring Buffer
//!
//! Prinsip desain:
//! - Zero-Copy: backing memory di-mmap dua kali, wraparound tidak terlihat oleh caller
//! - No-Lock: tidak ada Mutex/atomic, caller yang mengatur single-producer/single-consumer
//! - No-Allocation: semua memory di-reserve saat init

mod mirror;
mod ring_buffer;

pub use mirror::{page_size, MirroredMap};
pub use ring_buffer::Cirbuf;
