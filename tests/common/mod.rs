#![allow(dead_code)]

//! A scripted bus device for driving the state machine in tests.
//!
//! The simulator plays both the auto-SYN generator and the other
//! participants: sent symbols are echoed back (the UART sees its own
//! transmission on the half-duplex bus) unless the script says otherwise,
//! scripted `Rx` symbols are delivered once the exchange has started, and
//! an idle bus yields SYN symbols.

use ebusd::device::Device;
use ebusd::result::{Error, Result};
use ebusd::symbol::{crc8, SymbolString, SYN};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One step of a scripted exchange, consumed in order.
#[derive(Debug, Clone)]
pub enum Step {
    /// Echo the next sent symbol (also the default without a step).
    Echo,
    /// Answer the next sent symbol with a different one (bus collision).
    EchoAs(u8),
    /// Swallow the next sent symbol and let the read time out.
    Silent,
    /// Deliver a symbol sent by another participant.
    Rx(u8),
}

struct SimState {
    script: VecDeque<Step>,
    pending: VecDeque<u8>,
    tx: Vec<u8>,
    started: bool,
    timeout_next: bool,
}

/// Shared handle on the simulated device; clones observe the same bus.
#[derive(Clone)]
pub struct SimDevice(Arc<Mutex<SimState>>);

impl SimDevice {
    /// A device whose scripted `Rx` symbols are held back until the
    /// machine sends its first symbol.
    pub fn new(script: Vec<Step>) -> SimDevice {
        SimDevice(Arc::new(Mutex::new(SimState {
            script: script.into(),
            pending: VecDeque::new(),
            tx: Vec::new(),
            started: false,
            timeout_next: false,
        })))
    }

    /// A device that delivers its script right away, for traffic we only
    /// observe passively.
    pub fn new_passive(script: Vec<Step>) -> SimDevice {
        let device = SimDevice::new(script);
        device.0.lock().unwrap().started = true;
        device
    }

    /// Every symbol the machine sent so far.
    pub fn sent(&self) -> Vec<u8> {
        self.0.lock().unwrap().tx.clone()
    }

    pub fn script_exhausted(&self) -> bool {
        let state = self.0.lock().unwrap();
        state.script.is_empty() && state.pending.is_empty()
    }
}

impl Device for SimDevice {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        true
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        state.started = true;
        state.tx.push(byte);
        match state.script.front() {
            Some(Step::Echo) => {
                state.script.pop_front();
                state.pending.push_back(byte);
            }
            Some(Step::EchoAs(other)) => {
                let other = *other;
                state.script.pop_front();
                state.pending.push_back(other);
            }
            Some(Step::Silent) => {
                state.script.pop_front();
                state.timeout_next = true;
            }
            _ => state.pending.push_back(byte),
        }
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> Result<u8> {
        for _ in 0..50 {
            {
                let mut state = self.0.lock().unwrap();
                if state.timeout_next {
                    state.timeout_next = false;
                    return Err(Error::Timeout);
                }
                if let Some(byte) = state.pending.pop_front() {
                    return Ok(byte);
                }
                if state.started {
                    if let Some(Step::Rx(byte)) = state.script.front() {
                        let byte = *byte;
                        state.script.pop_front();
                        return Ok(byte);
                    }
                }
            }
            std::thread::sleep(Duration::from_micros(200));
        }
        // idle bus, the auto-SYN generator fills the gap
        Ok(SYN)
    }
}

/// CRC over already escaped wire symbols.
pub fn wire_crc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |crc, &b| crc8(crc, b))
}

/// `Rx` steps for a full frame given as unescaped bytes, with the CRC
/// appended; `crc_offset` corrupts the CRC on the wire.
pub fn rx_frame(unescaped: &[u8], crc_offset: u8) -> Vec<Step> {
    let mut frame = SymbolString::unescaped();
    for &byte in unescaped {
        frame.push(byte, false).unwrap();
    }
    let escaped = SymbolString::escaped_from(&frame).unwrap();
    let mut steps: Vec<Step> = escaped.as_slice().iter().map(|&b| Step::Rx(b)).collect();
    if crc_offset != 0 {
        if let Some(Step::Rx(crc)) = steps.last_mut() {
            *crc = crc.wrapping_add(crc_offset);
        }
    }
    steps
}
