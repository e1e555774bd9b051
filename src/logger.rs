//! Log sink behind the `log` facade with the runtime-adjustable level and
//! area filter exposed through the client `log` command. The handle is an
//! explicit value threaded to whoever needs to reconfigure it, not a
//! process-wide singleton of our own.

use log::{LevelFilter, Log, Metadata, Record};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The log areas of the daemon, used as `log` targets.
pub const AREA_BAS: u8 = 0x01;
pub const AREA_NET: u8 = 0x02;
pub const AREA_BUS: u8 = 0x04;
pub const AREA_CYC: u8 = 0x08;
pub const AREA_ALL: u8 = AREA_BAS | AREA_NET | AREA_BUS | AREA_CYC;

#[derive(Debug)]
struct Inner {
    level: AtomicU8,
    areas: AtomicU8,
}

/// A cloneable handle on the installed sink.
#[derive(Debug, Clone)]
pub struct LogHandle(Arc<Inner>);

impl LogHandle {
    /// Installs the sink. Call once, before any thread logs.
    pub fn init(level: LevelFilter, areas: u8) -> LogHandle {
        let handle = LogHandle(Arc::new(Inner {
            level: AtomicU8::new(level as u8),
            areas: AtomicU8::new(areas),
        }));
        log::set_max_level(LevelFilter::Trace);
        let _ = log::set_boxed_logger(Box::new(handle.clone()));
        handle
    }

    pub fn set_level(&self, level: LevelFilter) {
        self.0.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn set_areas(&self, areas: u8) {
        self.0.areas.store(areas, Ordering::Relaxed);
    }

    /// Parses the daemon's level names (`error`, `event`, `trace`, `debug`).
    pub fn parse_level(name: &str) -> Option<LevelFilter> {
        match name.to_ascii_lowercase().as_str() {
            "error" => Some(LevelFilter::Error),
            "event" => Some(LevelFilter::Info),
            "trace" => Some(LevelFilter::Debug),
            "debug" => Some(LevelFilter::Trace),
            _ => None,
        }
    }

    /// Parses a comma-separated area list (`bas,net,bus,cyc` or `all`).
    pub fn parse_areas(list: &str) -> Option<u8> {
        let mut mask = 0;
        for area in list.split(',') {
            mask |= match area.trim().to_ascii_lowercase().as_str() {
                "bas" => AREA_BAS,
                "net" => AREA_NET,
                "bus" => AREA_BUS,
                "cyc" => AREA_CYC,
                "all" => AREA_ALL,
                _ => return None,
            };
        }
        Some(mask)
    }

    fn area_enabled(&self, target: &str) -> bool {
        let mask = self.0.areas.load(Ordering::Relaxed);
        let bit = match target {
            "bas" => AREA_BAS,
            "net" => AREA_NET,
            "bus" => AREA_BUS,
            "cyc" => AREA_CYC,
            // messages from dependencies pass the area filter
            _ => return true,
        };
        mask & bit != 0
    }
}

impl Log for LogHandle {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() as u8 <= self.0.level.load(Ordering::Relaxed)
            && self.area_enabled(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        eprintln!(
            "{} [{} {}] {}: {}",
            timestamp(),
            record.target(),
            record.level().as_str().to_ascii_lowercase(),
            thread.name().unwrap_or("main"),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let (year, month, day) = civil_from_days((secs / 86400) as i64);
    let rem = secs % 86400;
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
        year,
        month,
        day,
        rem / 3600,
        rem % 3600 / 60,
        rem % 60,
        now.subsec_millis()
    )
}

// Gregorian date from days since the Unix epoch.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month as u32, day as u32)
}
