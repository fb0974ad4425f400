// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ping - Send ICMP echo requests

use anyhow::{Context, Result};
use clap::Parser;
use pinglib::{FailureReason, IcmpPinger, PingHandler, PingTarget};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::process::exit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Ping utility
#[derive(Parser, Debug)]
#[command(name = "ping")]
#[command(about = "Send ICMP ECHO_REQUEST to network hosts", long_about = None)]
struct Args {
    /// Hosts to ping
    #[arg(required = true)]
    hosts: Vec<String>,

    /// Number of pings to send per host
    #[arg(short, long, default_value_t = 4)]
    count: u32,

    /// Interval between pings (seconds)
    #[arg(short = 'i', long, default_value_t = 1.0)]
    interval: f64,

    /// Timeout for each ping (seconds)
    #[arg(short = 'W', long, default_value_t = 1.0)]
    timeout: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

struct PrintHandler {
    received: Arc<AtomicU64>,
    verbose: bool,
}

impl PingHandler for PrintHandler {
    fn on_response(&self, target: &PingTarget, rtt_secs: f64, byte_count: i32, sequence: i32) {
        self.received.fetch_add(1, Ordering::Relaxed);
        println!(
            "{} bytes from {}: icmp_seq={} time={:.2} ms",
            byte_count,
            target.address(),
            sequence,
            rtt_secs * 1000.0
        );
    }

    fn on_failure(&self, target: &PingTarget, reason: FailureReason) {
        match reason {
            FailureReason::TimedOut => {
                println!("From {} icmp_seq={} Request timeout", target.address(), target.sequence());
            }
            FailureReason::SendError => {
                eprintln!("ping: sendto {} failed", target.address());
            }
        }
        if self.verbose {
            eprintln!("ping: {} terminated: {:?}", target.address(), reason);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut addrs = Vec::with_capacity(args.hosts.len());
    for host in &args.hosts {
        let addr = resolve_host(host)?;
        println!("PING {} ({}) 56 bytes of data", host, addr);
        addrs.push(addr);
    }

    let received = Arc::new(AtomicU64::new(0));
    let handler = PrintHandler {
        received: Arc::clone(&received),
        verbose: args.verbose,
    };

    let pinger = IcmpPinger::new(handler).context("failed to create pinger")?;
    let runner = pinger.clone();
    let reactor = thread::spawn(move || {
        if let Err(e) = runner.run() {
            eprintln!("ping: {}", e);
            eprintln!("Note: ICMP sockets require CAP_NET_RAW, root, or a matching ping_group_range");
        }
    });

    let timeout = Duration::from_secs_f64(args.timeout);
    let interval = Duration::from_secs_f64(args.interval);

    for round in 0..args.count {
        if !pinger.is_running() {
            break;
        }
        for &addr in &addrs {
            let target = PingTarget::new(addr).with_timeout(timeout);
            if let Err(e) = pinger.submit(target) {
                eprintln!("ping: {}: {}", addr, e);
            }
        }
        if round + 1 < args.count {
            thread::sleep(interval);
        }
    }

    while pinger.has_pending_work() && pinger.is_running() {
        thread::sleep(Duration::from_millis(50));
    }

    pinger.stop();
    let _ = reactor.join();

    if received.load(Ordering::Relaxed) == 0 {
        exit(1);
    }

    Ok(())
}

fn resolve_host(host: &str) -> Result<IpAddr> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(addr);
    }

    // DNS resolution using the standard library
    let resolved: Vec<SocketAddr> = format!("{}:0", host)
        .to_socket_addrs()
        .with_context(|| format!("hostname lookup failed: {}", host))?
        .collect();

    // Prefer IPv4, matching the classic tool
    resolved
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| resolved.first())
        .map(|a| a.ip())
        .ok_or_else(|| anyhow::anyhow!("hostname lookup failed: {}", host))
}
