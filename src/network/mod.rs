//! Network Layer: socket staging di atas cirbuf
//!
//! Menggunakan mio untuk non-blocking I/O (epoll/kqueue).
//!
//! Fitur:
//! - `Connection`: inbound/outbound cirbuf per koneksi, read/write langsung ke buffer
//! - `Server`: event loop echo untuk demo dan integration test

mod connection;
mod server;

pub use connection::Connection;
pub use server::{Server, ServerConfig, ServerStats};
