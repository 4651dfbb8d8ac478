//! Loopback traffic simulator for the ethmux dispatch engine.
//!
//! Wires a software NIC to a set of echo tenants, pushes a mix of unicast,
//! broadcast and unmatched frames through it from an interrupt thread, and
//! prints the driver counters at the end.
//!
//! # Usage
//!
//! ```bash
//! # 4 tenants, 100k frames, 10% broadcast
//! ethmux-sim --tenants 4 --frames 100000 --broadcast 0.1
//!
//! # Run until Ctrl+C, echoing every reply back onto the wire
//! RUST_LOG=ethmux=debug ethmux-sim --frames 0 --reflect
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use ethmux::config::{BUF_SIZE, CLIENT_RX_BUFS, CLIENT_TX_BUFS, MAX_TENANTS, RX_BUFS};
use ethmux::{
    Doorbell, DriverConfig, EthDriver, HostCoherent, LoopbackDevice, Notify, TenantId, TxStatus,
};
use smoltcp::wire::{EthernetAddress, EthernetFrame, EthernetProtocol};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Source address of the simulated remote peer.
const PEER: EthernetAddress = EthernetAddress([0x02, 0x00, 0x5e, 0x00, 0x00, 0xfe]);

#[derive(Parser, Debug)]
#[command(name = "ethmux-sim")]
#[command(about = "Drive the ethmux dispatch engine with synthetic traffic")]
struct Args {
    /// Number of tenants
    #[arg(short, long, default_value_t = 3)]
    tenants: usize,

    /// Frames to inject (0 = until Ctrl+C)
    #[arg(short, long, default_value_t = 10_000)]
    frames: u64,

    /// Fraction of frames sent to the broadcast address
    #[arg(short, long, default_value_t = 0.05)]
    broadcast: f64,

    /// Fraction of frames sent to an address no tenant owns
    #[arg(long, default_value_t = 0.02)]
    unmatched: f64,

    /// Smallest frame length
    #[arg(long, default_value_t = 60)]
    min_len: usize,

    /// Largest frame length
    #[arg(long, default_value_t = 1514)]
    max_len: usize,

    /// Frames injected per interrupt
    #[arg(long, default_value_t = 16)]
    burst: usize,

    /// Shared inbound buffers
    #[arg(long, default_value_t = RX_BUFS)]
    rx_bufs: usize,

    /// Inbound ring capacity per tenant
    #[arg(long, default_value_t = CLIENT_RX_BUFS)]
    client_rx_bufs: usize,

    /// Outbound buffers per tenant
    #[arg(long, default_value_t = CLIENT_TX_BUFS)]
    client_tx_bufs: usize,

    /// Feed transmitted frames back into the inbound side
    #[arg(long)]
    reflect: bool,

    /// Seed for the traffic generator
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
}

/// xorshift64*, enough to vary destinations and lengths reproducibly.
struct Traffic(u64);

impl Traffic {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn unit(&mut self) -> f64 {
        (self.next() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: usize, hi: usize) -> usize {
        lo + (self.next() as usize) % (hi - lo).saturating_add(1)
    }
}

/// Reject argument combinations the run loop cannot honour.
fn check_args(args: &Args) -> Result<(), String> {
    if args.tenants == 0 || args.tenants > MAX_TENANTS {
        return Err(format!("--tenants must be in 1..={MAX_TENANTS}"));
    }
    if args.burst == 0 {
        return Err("--burst must be at least 1".into());
    }
    if args.max_len > BUF_SIZE {
        return Err(format!("--max-len must not exceed the buffer size ({BUF_SIZE})"));
    }
    if args.min_len < EthernetFrame::<&[u8]>::header_len() || args.min_len > args.max_len {
        return Err("--min-len must be at least a header and not exceed --max-len".into());
    }
    Ok(())
}

fn tenant_mac(id: TenantId) -> EthernetAddress {
    EthernetAddress([0x02, 0x00, 0x5e, 0x00, 0x00, id as u8])
}

fn build_frame(dst: EthernetAddress, len: usize, seq: u64) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    let mut frame = EthernetFrame::new_unchecked(&mut bytes[..]);
    frame.set_dst_addr(dst);
    frame.set_src_addr(PEER);
    frame.set_ethertype(EthernetProtocol::Unknown(0x88b5));
    let payload = frame.payload_mut();
    let n = payload.len().min(8);
    payload[..n].copy_from_slice(&seq.to_be_bytes()[..n]);
    bytes
}

/// Receive everything signalled for `id` and echo unicast frames to their sender.
fn run_tenant(
    driver: Arc<EthDriver<LoopbackDevice>>,
    bell: Arc<Doorbell>,
    stop: Arc<AtomicBool>,
    id: TenantId,
) -> (u64, u64) {
    let Some(mut port) = driver.port(id) else {
        warn!(tenant = id, "No such tenant");
        return (0, 0);
    };
    let (mut received, mut echoed) = (0, 0);
    while !stop.load(Ordering::Relaxed) {
        bell.wait(id, Duration::from_millis(50));
        loop {
            let status = port.rx();
            let Some(len) = status.len() else { break };
            received += 1;

            if let Ok(frame) = EthernetFrame::new_checked(&port.dataport()[..len])
                && !frame.dst_addr().is_broadcast()
            {
                let src = frame.src_addr();
                port.dataport_mut()[..6].copy_from_slice(src.as_bytes());
                if port.tx(len) == TxStatus::Complete {
                    echoed += 1;
                }
            }
            if !status.has_more() {
                break;
            }
        }
    }
    (received, echoed)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    let args = Args::parse();
    if let Err(msg) = check_args(&args) {
        eprintln!("{msg}");
        std::process::exit(2);
    }

    let ids: Vec<TenantId> = (1..=args.tenants as TenantId).collect();
    let mut config = DriverConfig::new()
        .rx_bufs(args.rx_bufs)
        .client_rx_bufs(args.client_rx_bufs)
        .client_tx_bufs(args.client_tx_bufs)
        .buf_size(BUF_SIZE);
    for &id in &ids {
        config = config.tenant(id, tenant_mac(id));
    }

    let bell = Arc::new(Doorbell::new(ids.iter().copied()));
    let notify = bell.clone();
    let dev = LoopbackDevice::new();
    dev.set_reflect(args.reflect);
    let driver = EthDriver::new(config, dev.clone(), HostCoherent, move |id: TenantId| {
        notify.emit(id)
    })
    .map(Arc::new)
    .and_then(|driver| driver.start().map(|()| driver));
    let driver = match driver {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("Failed to bring up driver: {e}");
            std::process::exit(1);
        }
    };
    info!(
        tenants = args.tenants,
        promiscuous = driver.plat_config().promiscuous,
        "Simulator started"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, shutting down");
        flag.store(true, Ordering::Relaxed);
    })
    .expect("Failed to set Ctrl+C handler");

    let workers: Vec<_> = ids
        .iter()
        .map(|&id| {
            let (driver, bell, stop) = (driver.clone(), bell.clone(), stop.clone());
            thread::spawn(move || run_tenant(driver, bell, stop, id))
        })
        .collect();

    let mut injected: u64 = 0;
    let mut traffic = Traffic(args.seed.max(1));
    let started = Instant::now();
    while !interrupted.load(Ordering::Relaxed)
        && (args.frames == 0 || injected < args.frames)
    {
        for _ in 0..args.burst {
            let seq = injected;
            injected += 1;
            let roll = traffic.unit();
            let dst = if roll < args.broadcast {
                EthernetAddress::BROADCAST
            } else if roll < args.broadcast + args.unmatched {
                EthernetAddress([0x02, 0x00, 0x5e, 0xff, 0xff, 0xff])
            } else {
                tenant_mac(ids[traffic.range(0, ids.len() - 1)])
            };
            let len = traffic.range(args.min_len, args.max_len);
            dev.inject(&build_frame(dst, len, seq));
        }
        driver.irq_handle();
        if args.frames == 0 {
            thread::sleep(Duration::from_micros(100));
        }
    }

    // Flush what is still queued or in flight
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        driver.irq_handle();
        if driver.census().queued() == 0 && dev.tx_pending() == 0 && dev.inbound_pending() == 0
        {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    stop.store(true, Ordering::Relaxed);
    let mut received = 0;
    let mut echoed = 0;
    for w in workers {
        let (r, e) = w.join().unwrap_or_default();
        received += r;
        echoed += e;
    }
    driver.irq_handle();

    let elapsed = started.elapsed();
    let stats = driver.stats();
    let census = driver.census();
    info!(
        injected,
        received,
        echoed,
        missed = dev.rx_missed(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Run finished"
    );
    info!(
        granted = stats.rx_granted,
        refused = stats.rx_refused,
        broadcast = stats.rx_broadcast,
        copies = stats.rx_copies,
        tx_completed = stats.tx_completed,
        "Driver counters"
    );
    info!(
        pool_exhausted = stats.drops.pool_exhausted,
        queue_full = stats.drops.queue_full,
        no_match = stats.drops.no_match,
        runt = stats.drops.runt,
        malformed = stats.drops.malformed,
        "Drops"
    );
    for t in &stats.tenants {
        info!(
            tenant = t.id,
            queued = t.rx_queued,
            received = t.rx_received,
            dropped = t.rx_dropped,
            tx_submitted = t.tx_submitted,
            tx_failed = t.tx_failed,
            notifications = t.notifications,
            "Tenant counters"
        );
    }
    if census.is_conserved() {
        info!(pool_free = census.pool_free, total = census.total, "All buffers accounted for");
    } else {
        warn!(?census, "Buffer census does not add up");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("ethmux-sim").chain(extra.iter().copied()))
    }

    #[test]
    fn test_default_args() {
        assert!(check_args(&parse(&[])).is_ok());
    }

    #[test]
    fn test_rejected_args() {
        assert!(check_args(&parse(&["--burst", "0"])).is_err());
        assert!(check_args(&parse(&["--tenants", "0"])).is_err());
        assert!(check_args(&parse(&["--max-len", "18446744073709551615"])).is_err());
        assert!(check_args(&parse(&["--min-len", "10"])).is_err());
        assert!(check_args(&parse(&["--min-len", "200", "--max-len", "100"])).is_err());
    }

    #[test]
    fn test_traffic_range() {
        let mut traffic = Traffic(1);
        for _ in 0..100 {
            let n = traffic.range(60, 64);
            assert!((60..=64).contains(&n));
        }
        assert_eq!(traffic.range(7, 7), 7);
        // Full-width range must not overflow
        traffic.range(0, usize::MAX);
    }
}
