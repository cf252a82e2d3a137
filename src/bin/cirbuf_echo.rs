//! cirbuf Echo Server
//!
//! Demo staging I/O: setiap koneksi punya inbound/outbound cirbuf, byte yang
//! masuk dikirim balik tanpa copy di wraparound.
//!
//! Usage:
//!   cargo run --release --bin cirbuf_echo [OPTIONS]

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use cirbuf::network::{Server, ServerConfig, ServerStats};
use cirbuf::page_size;
use tracing_subscriber::EnvFilter;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// CLI configuration
struct EchoConfig {
    bind_addr: String,
    capacity_pages: usize,
    max_connections: usize,
    verbose: bool,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7070".to_string(),
            capacity_pages: 16,
            max_connections: 1024,
            verbose: false,
        }
    }
}

fn print_stats(stats: &ServerStats, active: usize, uptime: Duration) {
    let secs = uptime.as_secs_f64().max(f64::EPSILON);

    println!("\n📊 Echo Stats (uptime: {:.1}s)", uptime.as_secs_f64());
    println!("   Connections:   {} active, {} total", active, stats.connections_accepted);
    println!("   Closed:        {}", stats.connections_closed);
    if stats.connections_rejected > 0 {
        println!("   Rejected:      {} ⚠️", stats.connections_rejected);
    }
    println!(
        "   Bytes in:      {} KB ({:.1} KB/sec)",
        stats.bytes_received / 1024,
        stats.bytes_received as f64 / 1024.0 / secs
    );
    println!(
        "   Bytes out:     {} KB ({:.1} KB/sec)",
        stats.bytes_sent / 1024,
        stats.bytes_sent as f64 / 1024.0 / secs
    );
}

fn run_echo(config: EchoConfig) -> io::Result<()> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let server_config = ServerConfig {
        capacity: config.capacity_pages * page_size(),
        max_connections: config.max_connections,
        ..ServerConfig::default()
    };

    println!("🚀 CIRBUF ECHO SERVER");
    println!("=====================\n");
    println!(
        "🧠 Staging buffer: {} pages x {} bytes per direction",
        config.capacity_pages,
        page_size()
    );

    let timeout = server_config.poll_timeout;
    let mut server = Server::bind(addr, server_config)?;

    println!("🔌 Listening on {}", server.local_addr()?);
    println!("\n📡 Waiting for connections...\n");

    let started = Instant::now();
    let mut last_stats = Instant::now();

    loop {
        server.run_once(Some(timeout))?;

        if config.verbose && last_stats.elapsed() >= STATS_INTERVAL {
            print_stats(&server.stats(), server.connection_count(), started.elapsed());
            last_stats = Instant::now();
        }
    }
}

fn parse_args() -> EchoConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = EchoConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].clone();
                    i += 1;
                }
            }
            "--capacity" => {
                if i + 1 < args.len() {
                    config.capacity_pages = args[i + 1].parse().unwrap_or(16).max(1);
                    i += 1;
                }
            }
            "--max-connections" => {
                if i + 1 < args.len() {
                    config.max_connections = args[i + 1].parse().unwrap_or(1024);
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!("cirbuf echo - zero-copy staging demo\n");
                println!("Usage: cirbuf_echo [OPTIONS]\n");
                println!("Options:");
                println!("  -b, --bind <ADDR>           Bind address (default: 127.0.0.1:7070)");
                println!("      --capacity <PAGES>      Buffer size in pages per direction (default: 16)");
                println!("      --max-connections <N>   Connection limit (default: 1024)");
                println!("  -v, --verbose               Debug logging + periodic stats");
                println!("  -h, --help                  Show this help");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let config = parse_args();
    init_logging(config.verbose);

    if let Err(e) = run_echo(config) {
        eprintln!("❌ Echo server error: {}", e);
        std::process::exit(1);
    }
}
