//! nvmf-tgt - NVMe-oF target registry demo
//!
//! Loads a TOML configuration, stands up a target with a loopback transport
//! per configured transport type, runs a bounded poll loop, and tears the
//! target down. Real fabric backends replace the loopback transport by
//! implementing the same trait.

use anyhow::{Context, Result};
use clap::Parser;
use nvmf_tgt::{
    Config, LogRecorder, Target, TargetOpts, Transport, TransportId, TransportResult,
    TransportType,
};

#[derive(Parser, Debug)]
#[command(name = "nvmf-tgt")]
#[command(about = "NVMe-oF target registry demo", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    config: String,

    /// Number of poll passes to run before teardown
    #[arg(short, long, default_value = "10")]
    passes: u32,
}

/// In-process transport that only counts accept passes. Stands in for a
/// real fabric backend so the registry can be exercised end to end.
struct LoopbackTransport {
    trtype: TransportType,
    listeners: Vec<TransportId>,
    accepts: u64,
}

impl LoopbackTransport {
    fn new(trtype: TransportType) -> Self {
        Self {
            trtype,
            listeners: Vec::new(),
            accepts: 0,
        }
    }
}

impl Transport for LoopbackTransport {
    fn transport_type(&self) -> TransportType {
        self.trtype
    }

    fn start_listen(&mut self, trid: &TransportId) -> TransportResult<()> {
        log::info!("loopback: listening on {}", trid);
        self.listeners.push(trid.clone());
        Ok(())
    }

    fn stop_listen(&mut self, trid: &TransportId) -> TransportResult<()> {
        log::info!("loopback: stopped listening on {}", trid);
        self.listeners.retain(|t| t != trid);
        Ok(())
    }

    fn accept(&mut self) {
        self.accepts += 1;
    }

    fn destroy(&mut self) {
        log::info!(
            "loopback: {} destroyed after {} accept passes",
            self.trtype,
            self.accepts
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config))?;

    env_logger::Builder::new()
        .filter_level(parse_log_level(&config.target.log_level))
        .init();

    log::info!("nvmf-tgt v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Loaded configuration from {}", args.config);

    let mut target = Target::new(TargetOpts {
        max_queue_depth: config.target.max_queue_depth,
        max_qpairs_per_ctrlr: config.target.max_qpairs_per_ctrlr,
        in_capsule_data_size: config.target.in_capsule_data_size,
        max_io_size: config.target.max_io_size,
    });
    target.set_trace_recorder(Box::new(LogRecorder));

    // One loopback transport per transport type named in the config
    for listener in &config.listener {
        let trid = listener.to_trid().context("invalid listener")?;
        if target.get_transport(trid.trtype).is_none() {
            target
                .add_transport(Box::new(LoopbackTransport::new(trid.trtype)))
                .context("failed to register transport")?;
        }

        // Start-listen is the backend's job; the registry only records the key
        if let Some(transport) = target.get_transport_mut(trid.trtype) {
            transport
                .start_listen(&trid)
                .with_context(|| format!("failed to listen on {}", trid))?;
        }
        target
            .listen_addr_create(trid)
            .context("failed to create listen address")?;
    }

    log::info!(
        "Configured {} listener(s) across {} transport(s)",
        target.listen_addrs().len(),
        target.transport_count()
    );

    for _ in 0..args.passes {
        target.poll();
    }

    log::info!("Shutting down (genctr={})", target.discovery_genctr());
    target.fini();

    Ok(())
}

/// Parse log level string
fn parse_log_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => {
            eprintln!("Unknown log level '{}', defaulting to 'info'", level);
            log::LevelFilter::Info
        }
    }
}
