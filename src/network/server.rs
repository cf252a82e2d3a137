//! Echo server dengan event-driven I/O
//!
//! Menggunakan mio untuk non-blocking I/O multiplexing. Setiap koneksi
//! di-stage lewat dua cirbuf; byte yang masuk dikirim balik apa adanya.

use std::collections::HashMap;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use super::Connection;
use crate::core::page_size;
use crate::error::Error;

const SERVER_TOKEN: Token = Token(0);
const EVENTS_CAPACITY: usize = 1024;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Kapasitas cirbuf per arah per koneksi (kelipatan page size)
    pub capacity: usize,
    pub max_connections: usize,
    /// Timeout untuk satu kali `poll` di [`Server::run`]
    pub poll_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            capacity: 16 * page_size(),
            max_connections: 1024,
            poll_timeout: Duration::from_millis(100),
        }
    }
}

/// Server statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub connections_accepted: u64,
    pub connections_closed: u64,
    pub connections_rejected: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Echo server
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection<TcpStream>>,
    next_token: usize,
    config: ServerConfig,
    stats: ServerStats,
    // Dipakai ulang setiap tick; tidak ada alokasi di hot path
    events: Events,
}

impl Server {
    /// Bind listener dan register untuk readable events.
    ///
    /// Returns `InvalidInput` jika `config.capacity` bukan kelipatan page
    /// size yang nonzero, sebelum socket apa pun dibuat.
    pub fn bind(addr: SocketAddr, config: ServerConfig) -> io::Result<Self> {
        let page_size = page_size();
        if config.capacity == 0 || config.capacity % page_size != 0 {
            return Err(Error::UnalignedCapacity {
                capacity: config.capacity,
                page_size,
            }
            .into());
        }

        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;

        poll.registry()
            .register(&mut listener, SERVER_TOKEN, Interest::READABLE)?;

        info!(addr = %listener.local_addr()?, capacity = config.capacity, "echo server listening");

        Ok(Self {
            poll,
            listener,
            connections: HashMap::with_capacity(config.max_connections),
            next_token: 1,
            config,
            stats: ServerStats::default(),
            events: Events::with_capacity(EVENTS_CAPACITY),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Run server event loop (tidak pernah return kecuali error).
    pub fn run(&mut self) -> io::Result<()> {
        let timeout = self.config.poll_timeout;
        loop {
            self.run_once(Some(timeout))?;
        }
    }

    /// Satu iterasi event loop. Returns jumlah event yang diproses.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        // Pinjam buffer events supaya handler bisa memakai `&mut self`;
        // Events::with_capacity(0) tidak mengalokasi.
        let mut events = mem::replace(&mut self.events, Events::with_capacity(0));
        let result = self.dispatch(&mut events, timeout);
        self.events = events;
        result
    }

    fn dispatch(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        match self.poll.poll(events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(e),
        }

        let mut processed = 0;
        for event in events.iter() {
            processed += 1;
            match event.token() {
                SERVER_TOKEN => self.accept_connections()?,
                token => {
                    if event.is_readable() || event.is_writable() {
                        self.service(token);
                    }
                }
            }
        }

        Ok(processed)
    }

    /// Accept new connections
    fn accept_connections(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.connections.len() >= self.config.max_connections {
                        warn!(%addr, "max connections reached, rejecting");
                        self.stats.connections_rejected += 1;
                        continue;
                    }

                    // Disable Nagle's algorithm untuk lower latency
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%addr, error = %e, "set_nodelay failed");
                    }

                    // Kegagalan satu koneksi (mmap ENOMEM, max_map_count, register)
                    // hanya menolak koneksi itu; event loop tetap jalan.
                    let mut conn = match Connection::new(stream, self.config.capacity) {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(%addr, error = %e, "staging buffer allocation failed, rejecting");
                            self.stats.connections_rejected += 1;
                            continue;
                        }
                    };

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    let registered = self
                        .poll
                        .registry()
                        .register(conn.stream_mut(), token, Interest::READABLE);
                    if let Err(e) = registered {
                        warn!(%addr, error = %e, "register failed, rejecting");
                        self.stats.connections_rejected += 1;
                        continue;
                    }

                    self.connections.insert(token, conn);
                    self.stats.connections_accepted += 1;
                    debug!(%addr, token = token.0, "new connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Handle readable/writable event: fill inbound, echo, flush.
    ///
    /// mio edge-triggered: kalau inbound penuh sebelum socket `WouldBlock`,
    /// tidak akan ada event readable baru. Jadi ulangi selama inbound penuh
    /// dan outbound berhasil di-flush habis.
    fn service(&mut self, token: Token) {
        loop {
            let conn = match self.connections.get_mut(&token) {
                Some(c) => c,
                None => return,
            };

            let before = conn.readable().len();
            let closed = match conn.fill_read_buffer() {
                Ok(_) => false,
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => true,
                Err(e) => {
                    warn!(token = token.0, error = %e, "read error");
                    self.close(token);
                    return;
                }
            };
            self.stats.bytes_received += (conn.readable().len() - before) as u64;
            let inbound_full = conn.read_buffer_full();

            if let Err(e) = Self::pump(conn, &mut self.stats) {
                warn!(token = token.0, error = %e, "write error");
                self.close(token);
                return;
            }

            if closed {
                self.close(token);
                return;
            }
            if !inbound_full || conn.write_pending() > 0 {
                break;
            }
        }
        self.update_interest(token);
    }

    /// Echo inbound ke outbound dan flush sampai socket penuh atau data habis.
    fn pump(conn: &mut Connection<TcpStream>, stats: &mut ServerStats) -> io::Result<()> {
        loop {
            let moved = conn.echo_readable();
            let pending = conn.write_pending();
            conn.flush_write_buffer()?;
            stats.bytes_sent += (pending - conn.write_pending()) as u64;

            if moved == 0 || conn.write_pending() > 0 {
                return Ok(());
            }
        }
    }

    /// Minta WRITABLE hanya jika masih ada data pending.
    fn update_interest(&mut self, token: Token) {
        let conn = match self.connections.get_mut(&token) {
            Some(c) => c,
            None => return,
        };

        let interest = if conn.write_pending() > 0 {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        let result = self
            .poll
            .registry()
            .reregister(conn.stream_mut(), token, interest);
        if let Err(e) = result {
            warn!(token = token.0, error = %e, "reregister failed");
            self.close(token);
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(conn.stream_mut());
            self.stats.connections_closed += 1;
            debug!(token = token.0, "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pump_until(server: &mut Server, mut done: impl FnMut(&Server) -> bool) {
        let started = Instant::now();
        while !done(server) {
            assert!(started.elapsed() < Duration::from_secs(10), "condition not reached");
            server
                .run_once(Some(Duration::from_millis(5)))
                .expect("event loop must survive a failed connection");
        }
    }

    #[test]
    fn test_failed_staging_allocation_rejects_only_that_connection() {
        let config = ServerConfig {
            capacity: page_size(),
            max_connections: 8,
            ..ServerConfig::default()
        };
        let mut server = Server::bind("127.0.0.1:0".parse().unwrap(), config).unwrap();
        let addr = server.local_addr().unwrap();

        // Paksa Connection::new gagal untuk koneksi berikutnya
        server.config.capacity = 100;
        let _rejected = std::net::TcpStream::connect(addr).unwrap();
        pump_until(&mut server, |s| s.stats().connections_rejected == 1);
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.stats().connections_accepted, 0);

        // Event loop masih hidup dan menerima koneksi baru
        server.config.capacity = page_size();
        let _accepted = std::net::TcpStream::connect(addr).unwrap();
        pump_until(&mut server, |s| s.stats().connections_accepted == 1);
        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.stats().connections_rejected, 1);
    }

    #[test]
    fn test_events_buffer_is_reused() {
        let mut server = Server::bind("127.0.0.1:0".parse().unwrap(), ServerConfig::default()).unwrap();
        for _ in 0..3 {
            server.run_once(Some(Duration::from_millis(1))).unwrap();
            assert_eq!(server.events.capacity(), EVENTS_CAPACITY);
        }
    }
}
