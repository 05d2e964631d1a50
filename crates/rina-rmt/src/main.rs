//! rmt-sim entry point.
//!
//! Builds an RMT from a configuration file, binds one in-memory transport per
//! port named in the forwarding section, pushes synthetic traffic through it
//! and prints the resulting statistics as JSON.

use clap::Parser;
use rina_rmt::config::DEFAULT_CONFIG_PATH;
use rina_rmt::{
    MemoryTransport, N1Transport, Pci, Pdu, PolicyRegistry, RecordingDelivery, Rmt, RmtConfig,
};
use rina_types::{Address, CepId, PduType, PortId, QosId};
use serde_json::json;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// RMT traffic simulator
#[derive(Parser, Debug)]
#[command(name = "rmt-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// PDUs sent to each configured destination
    #[arg(short = 'n', long, default_value = "5")]
    pdus: usize,

    /// Payload size in bytes
    #[arg(long, default_value = "64")]
    payload_size: usize,

    /// Per-port transport buffer (unbounded if not set)
    #[arg(long)]
    capacity: Option<usize>,

    /// Drain attempts before giving up
    #[arg(long, default_value = "200")]
    max_rounds: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

/// Initialize tracing/logging.
fn init_logging(level: &str) {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(level))
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("rmt-sim: failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = RmtConfig::load_or_default(&args.config)?;
    let delivery = Arc::new(RecordingDelivery::new());
    let rmt = Rmt::from_config(&config, &PolicyRegistry::new(), delivery)?;

    let mut transports: BTreeMap<PortId, Arc<MemoryTransport>> = BTreeMap::new();
    for entry in rmt.pff().dump() {
        for port in entry.ports {
            if transports.contains_key(&port) {
                continue;
            }
            let transport = Arc::new(match args.capacity {
                Some(cap) => MemoryTransport::with_capacity(cap),
                None => MemoryTransport::new(),
            });
            rmt.bind_port(port, Arc::clone(&transport) as Arc<dyn N1Transport>)?;
            transports.insert(port, transport);
        }
    }
    info!(ports = transports.len(), entries = rmt.pff().len(), "rmt-sim: ports bound");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = rmt.spawn_scheduler(shutdown_rx);

    let payload = vec![0u8; args.payload_size];
    let src = rmt.addresses().first().copied().unwrap_or(Address::WRONG);
    for entry in rmt.pff().dump() {
        let qos = if entry.qos_id.is_any() { QosId::new(1) } else { entry.qos_id };
        for _ in 0..args.pdus {
            let pci = Pci::new(PduType::Data, entry.address, qos)
                .with_src_address(src)
                .with_cep_ids(CepId::new(1), CepId::new(1));
            rmt.send(Pdu::new(pci, payload.clone()))?;
        }
    }

    let mut delivered: BTreeMap<PortId, usize> = BTreeMap::new();
    for _ in 0..args.max_rounds {
        for (port, transport) in &transports {
            *delivered.entry(*port).or_default() += transport.take_written().len();
        }
        for snap in rmt.all_port_stats() {
            if snap.state.is_disabled() {
                rmt.enable_port(snap.port_id)?;
            }
        }
        if rmt.all_port_stats().iter().all(|s| s.stats.queued == 0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for (port, transport) in &transports {
        *delivered.entry(*port).or_default() += transport.take_written().len();
    }

    if rmt.all_port_stats().iter().any(|s| s.stats.queued > 0) {
        warn!("rmt-sim: ports still have queued PDUs");
    }

    let report = json!({
        "ports": rmt.all_port_stats(),
        "delivered": delivered,
        "counters": rmt.counters(),
        "pff": rmt.pff().dump(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    shutdown_tx.send(true)?;
    worker.await?;
    rmt.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting rmt-sim ---");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("rmt-sim error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
