use anyhow::Context;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ebusd::baseloop::BaseLoop;
use ebusd::bus::{BusHandler, BusSettings};
use ebusd::csv;
use ebusd::data::DataFieldTemplates;
use ebusd::device::{Device, Port};
use ebusd::logger::{LogHandle, AREA_ALL};
use ebusd::message::MessageMap;
use ebusd::network;
use ebusd::symbol::is_master;

#[derive(Parser, Debug)]
#[command(name = "ebusd", version, about = "eBUS bridge daemon")]
struct Args {
    /// Serial device, or host:port for a TCP tunnel
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Configuration directory holding _types.csv and the message files
    #[arg(short, long, default_value = "/etc/ebusd", value_name = "DIR")]
    configpath: PathBuf,

    /// Own bus address (hex, must be a master address)
    #[arg(short, long, default_value = "ff", value_parser = parse_master_address)]
    address: u8,

    /// Network port for client connections
    #[arg(short, long, default_value_t = 8888)]
    port: u16,

    /// Listen on 127.0.0.1 only
    #[arg(long)]
    localhost: bool,

    /// SYN symbols to skip after losing arbitration to another priority class
    #[arg(long, default_value_t = 5)]
    lockcounter: u32,

    /// Retries after a lost arbitration
    #[arg(long, default_value_t = 2)]
    lockretries: u32,

    /// Retries after a failed send
    #[arg(long, default_value_t = 2)]
    sendretries: u32,

    /// Bus acquisition timeout in microseconds
    #[arg(long, default_value_t = 10_000)]
    acquiretimeout: u64,

    /// Slave receive timeout in microseconds
    #[arg(long, default_value_t = 15_000)]
    recvtimeout: u64,

    /// Poll interval in seconds, 0 disables polling
    #[arg(long, default_value_t = 300)]
    pollinterval: u64,

    /// Log every raw byte
    #[arg(long)]
    lograwdata: bool,

    /// Dump received bytes to the dump file
    #[arg(long)]
    dump: bool,

    /// Dump file, rotated to .old at the size limit
    #[arg(long, default_value = "/tmp/ebusd_dump.bin")]
    dumpfile: PathBuf,

    /// Dump file size limit in kB
    #[arg(long, default_value_t = 100)]
    dumpsize: u64,

    /// Initial log level (error|event|trace|debug)
    #[arg(long, default_value = "event")]
    loglevel: String,
}

fn parse_master_address(value: &str) -> Result<u8, String> {
    let address =
        u8::from_str_radix(value, 16).map_err(|_| format!("invalid hex address '{value}'"))?;
    if is_master(address) {
        Ok(address)
    } else {
        Err(format!("'{value}' is not a master address"))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = LogHandle::parse_level(&args.loglevel)
        .with_context(|| format!("invalid log level '{}'", args.loglevel))?;
    let log_handle = LogHandle::init(level, AREA_ALL);

    let mut templates = DataFieldTemplates::new();
    let mut messages = MessageMap::new();
    info!(target: "bas", "ebus configuration dir: {}", args.configpath.display());
    csv::load_config_dir(&args.configpath, &mut templates, &mut messages)
        .map_err(|e| anyhow::anyhow!("reading configuration failed: {e}"))?;
    info!(target: "bas", "message DB: {}", messages.size(false));
    info!(target: "bas", "updates DB: {}", messages.size(true));
    info!(target: "bas", "polling DB: {}", messages.size_poll());
    let messages = Arc::new(messages);

    let mut port = Port::new(&args.device, &args.dumpfile, args.dumpsize);
    let port_control = port.control();
    if args.lograwdata {
        port_control.toggle_log_raw();
    }
    if args.dump {
        port_control.toggle_dump_raw();
    }
    if port.open().is_err() {
        error!(target: "bus", "can't open {}", args.device);
    }

    let poll_interval = if args.pollinterval > 0 {
        Some(Duration::from_secs(args.pollinterval))
    } else {
        None
    };
    let settings = BusSettings {
        own_address: args.address,
        lock_count: args.lockcounter,
        bus_lost_retries: args.lockretries,
        failed_send_retries: args.sendretries,
        bus_acquire_timeout: Duration::from_micros(args.acquiretimeout),
        slave_recv_timeout: Duration::from_micros(args.recvtimeout),
        poll_interval,
    };
    let bus = BusHandler::new(Arc::clone(&messages), settings);
    {
        let bus = Arc::clone(&bus);
        std::thread::Builder::new()
            .name("bushandler".to_string())
            .spawn(move || bus.run(port))
            .context("starting the bus handler failed")?;
    }

    let base = BaseLoop::new(
        messages,
        Arc::clone(&bus),
        port_control,
        log_handle,
        poll_interval.is_some(),
    );
    network::listen(args.port, args.localhost, base.queue())
        .map_err(|e| anyhow::anyhow!("starting the network listener failed: {e}"))?;

    base.run();
    bus.stop();
    Ok(())
}
