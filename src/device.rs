//! Byte-level access to the bus device: a serial tty at eBUS line settings
//! or a `host:port` TCP tunnel carrying the same symbol stream.

use crate::result::{Error, Result};
use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The symbol I/O contract the bus handler drives.
///
/// `recv` returns exactly one symbol; a zero timeout blocks until one
/// arrives. A timed-out read reports [`Error::Timeout`], never a partial
/// result.
pub trait Device: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn send(&mut self, byte: u8) -> Result<()>;
    fn recv(&mut self, timeout: Duration) -> Result<u8>;
}

/// A device URI without `/` but with `:` names a TCP tunnel,
/// anything else a tty path.
pub fn is_network_uri(uri: &str) -> bool {
    !uri.contains('/') && uri.contains(':')
}

enum Backend {
    Serial(Box<dyn SerialPort>),
    Network(TcpStream),
}

/// Runtime toggles shared with the client command surface.
#[derive(Debug, Default)]
pub struct PortControl {
    log_raw: AtomicBool,
    dump_raw: AtomicBool,
}

impl PortControl {
    pub fn log_raw(&self) -> bool {
        self.log_raw.load(Ordering::Relaxed)
    }

    pub fn toggle_log_raw(&self) -> bool {
        !self.log_raw.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn dump_raw(&self) -> bool {
        self.dump_raw.load(Ordering::Relaxed)
    }

    pub fn toggle_dump_raw(&self) -> bool {
        !self.dump_raw.fetch_xor(true, Ordering::Relaxed)
    }
}

struct Dump {
    path: PathBuf,
    max_bytes: u64,
    file: Option<File>,
    written: u64,
}

impl Dump {
    fn write(&mut self, byte: u8) {
        if self.file.is_none() {
            if let Ok(file) = OpenOptions::new().create(true).append(true).open(&self.path) {
                self.written = file.metadata().map(|m| m.len()).unwrap_or(0);
                self.file = Some(file);
            } else {
                return;
            }
        }
        if let Some(file) = &mut self.file {
            if file.write_all(&[byte]).is_ok() {
                self.written += 1;
            }
        }
        if self.written >= self.max_bytes {
            self.rotate();
        }
    }

    fn rotate(&mut self) {
        self.file = None;
        self.written = 0;
        let mut old = self.path.clone().into_os_string();
        old.push(".old");
        let _ = std::fs::rename(&self.path, &old);
    }
}

/// The daemon's port: a [`Device`] backend plus raw-byte logging and the
/// rotating raw dump file.
pub struct Port {
    uri: String,
    backend: Option<Backend>,
    control: Arc<PortControl>,
    dump: Dump,
}

impl Port {
    pub fn new(uri: &str, dump_file: &Path, dump_size_kb: u64) -> Port {
        Port {
            uri: uri.to_string(),
            backend: None,
            control: Arc::new(PortControl::default()),
            dump: Dump {
                path: dump_file.to_path_buf(),
                max_bytes: dump_size_kb * 1024,
                file: None,
                written: 0,
            },
        }
    }

    /// The toggle handle shared with the command surface.
    pub fn control(&self) -> Arc<PortControl> {
        Arc::clone(&self.control)
    }

    fn log_byte(&self, byte: u8, received: bool) {
        if self.control.log_raw() {
            if received {
                info!(target: "bus", "<{byte:02x}");
            } else {
                info!(target: "bus", ">{byte:02x}");
            }
        }
    }

    fn read_one(reader: &mut impl Read) -> Result<u8> {
        let mut buf = [0u8; 1];
        match reader.read(&mut buf) {
            Ok(0) => Err(Error::Eof),
            Ok(_) => Ok(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(Error::Timeout),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::Timeout),
            Err(_) => Err(Error::Device),
        }
    }
}

// Timeout slice used to emulate an endless blocking read.
const ENDLESS_SLICE: Duration = Duration::from_secs(1);

impl Device for Port {
    fn open(&mut self) -> Result<()> {
        self.close();
        let backend = if is_network_uri(&self.uri) {
            let stream = TcpStream::connect(&self.uri).map_err(|_| Error::GenericIo)?;
            Backend::Network(stream)
        } else {
            let serial = serialport::new(self.uri.as_str(), 2400)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(ENDLESS_SLICE)
                .open()
                .map_err(|_| Error::NotFound)?;
            Backend::Serial(serial)
        };
        self.backend = Some(backend);
        Ok(())
    }

    fn close(&mut self) {
        self.backend = None;
    }

    fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        let backend = self.backend.as_mut().ok_or(Error::Device)?;
        let result = match backend {
            Backend::Serial(port) => port.write_all(&[byte]),
            Backend::Network(stream) => stream.write_all(&[byte]),
        };
        match result {
            Ok(()) => {
                self.log_byte(byte, false);
                Ok(())
            }
            Err(_) => Err(Error::Device),
        }
    }

    fn recv(&mut self, timeout: Duration) -> Result<u8> {
        let endless = timeout.is_zero();
        let backend = self.backend.as_mut().ok_or(Error::Device)?;
        let byte = match backend {
            Backend::Serial(port) => {
                port.set_timeout(if endless { ENDLESS_SLICE } else { timeout })
                    .map_err(|_| Error::Device)?;
                loop {
                    match Port::read_one(port) {
                        Err(Error::Timeout) if endless => continue,
                        other => break other?,
                    }
                }
            }
            Backend::Network(stream) => {
                let limit = if endless { None } else { Some(timeout) };
                stream.set_read_timeout(limit).map_err(|_| Error::Device)?;
                Port::read_one(stream)?
            }
        };
        self.log_byte(byte, true);
        if self.control.dump_raw() {
            self.dump.write(byte);
        }
        Ok(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::is_network_uri;

    #[test]
    fn uri_backend_selection() {
        assert!(is_network_uri("heater:8876"));
        assert!(is_network_uri("127.0.0.1:8876"));
        assert!(!is_network_uri("/dev/ttyUSB0"));
        assert!(!is_network_uri("/tmp/weird:name"));
        assert!(!is_network_uri("ttyUSB0"));
    }
}
