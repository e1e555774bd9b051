//! The bus-access engine: a per-symbol state machine driving arbitration,
//! framing, acknowledge handshakes and retries over the half-duplex link,
//! fed by a queue of client requests and filling idle gaps with scheduled
//! polls and scan probes.

use crate::data::{PartType, UI_FIELD_SEPARATOR};
use crate::device::Device;
use crate::message::{Message, MessageMap};
use crate::queue::WaitQueue;
use crate::result::{Error, Result};
use crate::symbol::{
    is_master, is_valid_address, slave_of, SymbolString, ACK, BROADCAST, NAK, SYN,
};
use log::{debug, error, info};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Receive timeout while waiting for the next SYN.
pub const SYN_TIMEOUT: Duration = Duration::from_micros(4500);
/// Receive timeout for the echo of a sent symbol.
pub const SEND_TIMEOUT: Duration = Duration::from_micros(15_000);
/// How long a client waits for one request attempt.
const REQUEST_WAIT: Duration = Duration::from_secs(1);
/// Backoff between device reopen attempts.
const REOPEN_BACKOFF: Duration = Duration::from_secs(10);
/// Identification command probed during a scan.
const IDENT_ID: [u8; 2] = [0x07, 0x04];

/// Tuning knobs of the bus handler.
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Our master address on the bus.
    pub own_address: u8,
    /// SYN symbols to skip after losing arbitration against another
    /// priority class.
    pub lock_count: u32,
    /// Extra attempts after losing arbitration, not consuming a send retry.
    pub bus_lost_retries: u32,
    /// Extra attempts after a failed send.
    pub failed_send_retries: u32,
    /// Receive timeout for the arbitration echo.
    pub bus_acquire_timeout: Duration,
    /// Receive timeout while a slave prepares its response.
    pub slave_recv_timeout: Duration,
    /// Gap between scheduled polls, `None` to disable polling.
    pub poll_interval: Option<Duration>,
}

impl Default for BusSettings {
    fn default() -> Self {
        BusSettings {
            own_address: 0xFF,
            lock_count: 5,
            bus_lost_retries: 2,
            failed_send_retries: 2,
            bus_acquire_timeout: Duration::from_millis(10),
            slave_recv_timeout: Duration::from_millis(15),
            poll_interval: None,
        }
    }
}

/// One queued bus operation: the escaped master frame to send plus a
/// single-shot completion slot. The first notification wins; a late
/// completion of a request its owner gave up on is discarded.
#[derive(Debug)]
pub struct BusRequest {
    master: SymbolString,
    state: Mutex<Option<Result<SymbolString>>>,
    done: Condvar,
}

impl BusRequest {
    pub fn new(master: SymbolString) -> Arc<BusRequest> {
        Arc::new(BusRequest {
            master,
            state: Mutex::new(None),
            done: Condvar::new(),
        })
    }

    pub fn master(&self) -> &SymbolString {
        &self.master
    }

    /// Completes the request; only the first call takes effect.
    pub fn notify(&self, result: Result<SymbolString>) {
        let mut state = self.state.lock().unwrap();
        if state.is_none() {
            *state = Some(result);
            self.done.notify_all();
        }
    }

    /// Waits for completion until `deadline`; `None` on timeout.
    pub fn wait(&self, deadline: Instant) -> Option<Result<SymbolString>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(result) = state.clone() {
                return Some(result);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, timed_out) = self.done.wait_timeout(state, remaining).unwrap();
            state = guard;
            if timed_out.timed_out() && state.is_none() {
                return None;
            }
        }
    }
}

/// Who initiated a request, deciding what happens to its result.
#[derive(Clone)]
enum Origin {
    Client,
    Poll(Arc<Message>),
    Scan(u8),
}

#[derive(Clone)]
struct Pending {
    request: Arc<BusRequest>,
    origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Skip,
    Ready,
    RecvCmd,
    RecvCmdAck,
    RecvRes,
    RecvResAck,
    SendCmd,
    SendResAck,
    SendSyn,
}

fn state_name(state: BusState) -> &'static str {
    match state {
        BusState::Skip => "skip",
        BusState::Ready => "ready",
        BusState::RecvCmd => "receive command",
        BusState::RecvCmdAck => "receive command ACK",
        BusState::RecvRes => "receive response",
        BusState::RecvResAck => "receive response ACK",
        BusState::SendCmd => "send command",
        BusState::SendResAck => "send response ACK",
        BusState::SendSyn => "send SYN",
    }
}

/// The shared handle on the bus engine. Client threads submit requests
/// through [`send_and_wait`](BusHandler::send_and_wait); a dedicated thread
/// owns the device and drives [`run`](BusHandler::run).
pub struct BusHandler {
    settings: BusSettings,
    messages: Arc<MessageMap>,
    requests: WaitQueue<Pending>,
    scan_queue: Mutex<VecDeque<u8>>,
    scan_results: Mutex<BTreeMap<u8, String>>,
    running: AtomicBool,
}

impl BusHandler {
    pub fn new(messages: Arc<MessageMap>, settings: BusSettings) -> Arc<BusHandler> {
        Arc::new(BusHandler {
            settings,
            messages,
            requests: WaitQueue::new(),
            scan_queue: Mutex::new(VecDeque::new()),
            scan_results: Mutex::new(BTreeMap::new()),
            running: AtomicBool::new(true),
        })
    }

    pub fn own_address(&self) -> u8 {
        self.settings.own_address
    }

    /// The shared message dictionary.
    pub fn messages(&self) -> &Arc<MessageMap> {
        &self.messages
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Sends the escaped master frame and waits for the response.
    ///
    /// One attempt waits at most a second; `failed_send_retries` grants
    /// further attempts, and losing the arbitration grants
    /// `bus_lost_retries` extra rounds that do not consume a send retry.
    pub fn send_and_wait(&self, master: &SymbolString) -> Result<SymbolString> {
        let mut result = Err(Error::Syn);
        let mut lost_retries = self.settings.bus_lost_retries + 1;
        let mut send_retries = self.settings.failed_send_retries + 1;
        while send_retries > 0 {
            let request = BusRequest::new(master.clone());
            self.requests.add(Pending {
                request: Arc::clone(&request),
                origin: Origin::Client,
            });
            result = match request.wait(Instant::now() + REQUEST_WAIT) {
                Some(result) => result,
                None => {
                    self.requests
                        .remove_matching(|p| Arc::ptr_eq(&p.request, &request));
                    Err(Error::Timeout)
                }
            };
            match &result {
                Ok(_) => break,
                Err(Error::BusLost) => {
                    lost_retries -= 1;
                    if lost_retries > 0 {
                        error!(target: "bus", "{}, retry bus loss", Error::BusLost);
                        continue;
                    }
                    lost_retries = self.settings.bus_lost_retries + 1;
                }
                Err(_) => {}
            }
            send_retries -= 1;
            if let Err(e) = &result {
                error!(
                    target: "bus",
                    "{}, {}",
                    e,
                    if send_retries > 0 { "retry send" } else { "give up" }
                );
            }
        }
        result
    }

    /// Queues identification probes for the idle gaps: the master-paired
    /// slave addresses by default, every valid slave address with `full`.
    pub fn start_scan(&self, full: bool) -> Result<()> {
        let own_slave = slave_of(self.settings.own_address);
        let mut queue = self.scan_queue.lock().unwrap();
        queue.clear();
        for address in 0..=255u8 {
            let candidate = if full {
                is_valid_address(address) && !is_master(address) && address != BROADCAST
            } else {
                is_master(address.wrapping_sub(5))
            };
            if candidate && address != own_slave {
                queue.push_back(address);
            }
        }
        Ok(())
    }

    /// Renders the accumulated scan responses, one address per line.
    pub fn format_scan_result(&self) -> String {
        let results = self.scan_results.lock().unwrap();
        if results.is_empty() {
            return "no data stored".to_string();
        }
        results
            .iter()
            .map(|(address, data)| format!("{address:02x}: {data}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn build_probe(&self, address: u8) -> Result<Arc<BusRequest>> {
        let mut frame = SymbolString::unescaped();
        frame.push(self.settings.own_address, false)?;
        frame.push(address, false)?;
        frame.push(IDENT_ID[0], false)?;
        frame.push(IDENT_ID[1], false)?;
        frame.push(0, false)?;
        Ok(BusRequest::new(SymbolString::escaped_from(&frame)?))
    }

    /// Runs the state machine on the device until [`stop`](Self::stop).
    /// Device-level failures close the port; reopening retries with a
    /// fixed backoff.
    pub fn run<D: Device>(&self, device: D) {
        let mut machine = Machine {
            bus: self,
            device,
            state: BusState::Skip,
            request: None,
            command: SymbolString::unescaped(),
            response: SymbolString::unescaped(),
            command_crc_valid: false,
            response_crc_valid: false,
            repeat: false,
            next_send_pos: 0,
            remain_lock_count: 0,
            last_poll: Instant::now(),
        };
        while self.running.load(Ordering::Relaxed) {
            if machine.device.is_open() {
                let _ = machine.handle_symbol();
            } else {
                std::thread::sleep(REOPEN_BACKOFF);
                if machine.device.open().is_err() {
                    error!(target: "bus", "cannot open device");
                }
            }
        }
    }
}

/// The per-thread state of the bus engine; owns the device exclusively.
struct Machine<'a, D: Device> {
    bus: &'a BusHandler,
    device: D,
    state: BusState,
    request: Option<Pending>,
    command: SymbolString,
    response: SymbolString,
    command_crc_valid: bool,
    response_crc_valid: bool,
    repeat: bool,
    next_send_pos: usize,
    remain_lock_count: u32,
    last_poll: Instant,
}

impl<D: Device> Machine<'_, D> {
    /// Handles one received symbol, optionally sending one first.
    fn handle_symbol(&mut self) -> Result<()> {
        let mut timeout = SYN_TIMEOUT;
        let mut send_symbol: Option<u8> = None;

        // decide whether a symbol has to be sent and pick the receive timeout
        match self.state {
            BusState::Skip => timeout = Duration::ZERO,
            BusState::Ready => {
                if self.request.is_some() {
                    // a stale request survived the previous frame
                    self.set_state(BusState::Ready, Err(Error::Timeout), false);
                }
                if self.remain_lock_count == 0 {
                    self.request = self.next_request();
                    if let Some(pending) = &self.request {
                        // initiate arbitration
                        send_symbol = Some(pending.request.master()[0]);
                    }
                }
            }
            BusState::RecvCmd
            | BusState::RecvCmdAck
            | BusState::RecvRes
            | BusState::RecvResAck => {
                timeout = self.bus.settings.slave_recv_timeout;
            }
            BusState::SendCmd => {
                if let Some(pending) = &self.request {
                    send_symbol = Some(pending.request.master()[self.next_send_pos]);
                }
            }
            BusState::SendResAck => {
                if self.request.is_some() {
                    send_symbol = Some(if self.response_crc_valid { ACK } else { NAK });
                }
            }
            BusState::SendSyn => send_symbol = Some(SYN),
        }

        let mut sending = false;
        if let Some(symbol) = send_symbol {
            if self.device.send(symbol).is_ok() {
                sending = true;
                timeout = if self.state == BusState::Ready {
                    self.bus.settings.bus_acquire_timeout
                } else {
                    SEND_TIMEOUT
                };
            } else {
                timeout = Duration::ZERO;
                self.set_state(BusState::Skip, Err(Error::Send), false);
            }
        }

        // the next received symbol is our own echo while sending
        let recv_symbol = match self.device.recv(timeout) {
            Ok(byte) => byte,
            Err(e) => {
                if matches!(e, Error::Device | Error::Eof) {
                    self.device.close();
                }
                return self.set_state(BusState::Skip, Err(e), false);
            }
        };

        if recv_symbol == SYN {
            if !sending && self.remain_lock_count > 0 {
                self.remain_lock_count -= 1;
            }
            return self.set_state(BusState::Ready, Err(Error::Syn), false);
        }

        let pending = self.request.clone();
        match self.state {
            BusState::Skip => Ok(()),

            BusState::Ready => {
                if let (Some(pending), true) = (&pending, sending) {
                    let sent = pending.request.master()[0];
                    if matches!(pending.origin, Origin::Client)
                        && !self
                            .bus
                            .requests
                            .remove_matching(|p| Arc::ptr_eq(&p.request, &pending.request))
                    {
                        // the client gave up while we were arbitrating
                        return self.set_state(BusState::Skip, Err(Error::Timeout), false);
                    }
                    if recv_symbol == sent {
                        // arbitration won
                        self.next_send_pos = 1;
                        self.repeat = false;
                        return self.set_state(BusState::SendCmd, Ok(()), false);
                    }
                    // arbitration lost; let the winner finish first
                    self.remain_lock_count = if is_master(recv_symbol) { 2 } else { 1 };
                    if recv_symbol & 0x0F != sent & 0x0F
                        && self.bus.settings.lock_count > self.remain_lock_count
                    {
                        self.remain_lock_count = self.bus.settings.lock_count;
                    }
                    self.set_state(self.state, Err(Error::BusLost), false);
                }
                // the winner's first byte starts a passive frame
                if let Err(e) = self.command.push(recv_symbol, true) {
                    return self.set_state(BusState::Skip, Err(e), false);
                }
                self.repeat = false;
                self.set_state(BusState::RecvCmd, Ok(()), false)
            }

            BusState::RecvCmd => {
                let header_len = 4usize;
                let crc_pos = if self.command.len() > header_len {
                    header_len + 1 + self.command[header_len] as usize
                } else {
                    usize::MAX
                };
                let update_crc = self.command.len() < crc_pos;
                if let Err(e) = self.command.push(recv_symbol, update_crc) {
                    return self.set_state(BusState::Skip, Err(e), false);
                }
                if crc_pos != usize::MAX && self.command.len() == crc_pos + 1 {
                    // CRC received
                    let dst = self.command[1];
                    self.command_crc_valid = self.command[crc_pos] == self.command.crc();
                    if self.command_crc_valid {
                        if dst == BROADCAST {
                            self.receive_completed();
                            return self.set_state(BusState::Skip, Ok(()), false);
                        }
                        return self.set_state(BusState::RecvCmdAck, Ok(()), false);
                    }
                    if dst == BROADCAST {
                        return self.set_state(BusState::Skip, Ok(()), false);
                    }
                    if self.repeat {
                        return self.set_state(BusState::Skip, Err(Error::Crc), false);
                    }
                    // the addressed participant is expected to NAK
                    return self.set_state(BusState::RecvCmdAck, Err(Error::Crc), true);
                }
                Ok(())
            }

            BusState::RecvCmdAck => {
                if recv_symbol == ACK {
                    if !self.command_crc_valid {
                        return self.set_state(BusState::Skip, Err(Error::Ack), false);
                    }
                    if let Some(pending) = &pending {
                        if is_master(pending.request.master()[1]) {
                            // master-master send is complete
                            return self.set_state(BusState::SendSyn, Ok(()), false);
                        }
                    } else if is_master(self.command[1]) {
                        self.receive_completed();
                        return self.set_state(BusState::Skip, Ok(()), false);
                    }
                    self.repeat = false;
                    return self.set_state(BusState::RecvRes, Ok(()), false);
                }
                if recv_symbol == NAK {
                    if !self.repeat {
                        self.repeat = true;
                        self.next_send_pos = 0;
                        self.command.clear();
                        if pending.is_some() {
                            return self.set_state(BusState::SendCmd, Err(Error::Nak), true);
                        }
                        return self.set_state(BusState::RecvCmd, Err(Error::Nak), true);
                    }
                    return self.set_state(BusState::Skip, Err(Error::Nak), false);
                }
                self.set_state(BusState::Skip, Err(Error::Ack), false)
            }

            BusState::RecvRes => {
                let crc_pos = if self.response.is_empty() {
                    usize::MAX
                } else {
                    1 + self.response[0] as usize
                };
                let update_crc = self.response.len() < crc_pos;
                if let Err(e) = self.response.push(recv_symbol, update_crc) {
                    return self.set_state(BusState::Skip, Err(e), false);
                }
                if crc_pos != usize::MAX && self.response.len() == crc_pos + 1 {
                    self.response_crc_valid = self.response[crc_pos] == self.response.crc();
                    if self.response_crc_valid {
                        if pending.is_some() {
                            return self.set_state(BusState::SendResAck, Ok(()), false);
                        }
                        return self.set_state(BusState::RecvResAck, Ok(()), false);
                    }
                    if self.repeat {
                        return self.set_state(BusState::Skip, Err(Error::Crc), false);
                    }
                    if pending.is_some() {
                        // answer with NAK and wait for the retransmission
                        return self.set_state(BusState::SendResAck, Err(Error::Crc), true);
                    }
                    return self.set_state(BusState::RecvResAck, Err(Error::Crc), true);
                }
                Ok(())
            }

            BusState::RecvResAck => {
                if recv_symbol == ACK {
                    if !self.response_crc_valid {
                        return self.set_state(BusState::Skip, Err(Error::Ack), false);
                    }
                    self.receive_completed();
                    return self.set_state(BusState::Skip, Ok(()), false);
                }
                if recv_symbol == NAK {
                    if !self.repeat {
                        self.repeat = true;
                        self.response.clear();
                        return self.set_state(BusState::RecvRes, Err(Error::Nak), true);
                    }
                    return self.set_state(BusState::Skip, Err(Error::Nak), false);
                }
                self.set_state(BusState::Skip, Err(Error::Ack), false)
            }

            BusState::SendCmd => {
                if let (Some(pending), true) = (&pending, sending) {
                    if recv_symbol == pending.request.master()[self.next_send_pos] {
                        // echo confirmed
                        self.next_send_pos += 1;
                        if self.next_send_pos >= pending.request.master().len() {
                            if pending.request.master()[1] == BROADCAST {
                                return self.set_state(BusState::SendSyn, Ok(()), false);
                            }
                            self.command_crc_valid = true;
                            return self.set_state(BusState::RecvCmdAck, Ok(()), false);
                        }
                        return Ok(());
                    }
                }
                self.set_state(BusState::Skip, Err(Error::InvalidArg), false)
            }

            BusState::SendResAck => {
                if pending.is_some() && sending {
                    let sent = if self.response_crc_valid { ACK } else { NAK };
                    if recv_symbol == sent {
                        if self.response_crc_valid {
                            return self.set_state(BusState::SendSyn, Ok(()), false);
                        }
                        // NAK sent, expect the retransmission
                        self.repeat = true;
                        self.response.clear();
                        return self.set_state(BusState::RecvRes, Err(Error::Nak), true);
                    }
                }
                self.set_state(BusState::Skip, Err(Error::InvalidArg), false)
            }

            BusState::SendSyn => {
                // our own SYN echo is consumed by the SYN check above;
                // anything else is a collision
                self.set_state(BusState::Skip, Err(Error::InvalidArg), false)
            }
        }
    }

    /// Picks the next work item for an idle, unlocked bus: a queued client
    /// request first, then a pending scan probe, then a due poll.
    fn next_request(&mut self) -> Option<Pending> {
        if let Some(pending) = self.bus.requests.next() {
            return Some(pending);
        }
        if let Some(address) = self.bus.scan_queue.lock().unwrap().pop_front() {
            match self.bus.build_probe(address) {
                Ok(request) => {
                    debug!(target: "bus", "scan probe {address:02x}");
                    return Some(Pending {
                        request,
                        origin: Origin::Scan(address),
                    });
                }
                Err(e) => error!(target: "bus", "prepare scan {address:02x}: {e}"),
            }
        }
        let interval = self.bus.settings.poll_interval?;
        if self.last_poll.elapsed() < interval || self.bus.messages.size_poll() == 0 {
            return None;
        }
        self.last_poll = Instant::now();
        let message = self.bus.messages.next_poll()?;
        match message.prepare_master(self.bus.settings.own_address, "", None) {
            Ok(master) => {
                debug!(target: "cyc", "poll {} {}", message.class(), message.name());
                Some(Pending {
                    request: BusRequest::new(master),
                    origin: Origin::Poll(message),
                })
            }
            Err(e) => {
                error!(
                    target: "cyc",
                    "prepare poll {} {}: {}",
                    message.class(),
                    message.name(),
                    e
                );
                None
            }
        }
    }

    /// Switches the state, notifying the active request when it reached a
    /// terminal condition. `first_repetition` suppresses the notification
    /// for a recoverable first NAK or CRC round.
    fn set_state(
        &mut self,
        state: BusState,
        result: Result<()>,
        first_repetition: bool,
    ) -> Result<()> {
        if let Some(pending) = self.request.take() {
            let notify = state == BusState::SendSyn || (result.is_err() && !first_repetition);
            if notify {
                let outcome = match result {
                    Ok(()) => Ok(self.response.clone()),
                    Err(e) => Err(e),
                };
                debug!(
                    target: "bus",
                    "notify request: {}",
                    match &outcome {
                        Ok(_) => "success".to_string(),
                        Err(e) => e.to_string(),
                    }
                );
                self.finish_request(&pending, outcome);
            } else {
                self.request = Some(pending);
            }
        }

        if state == self.state {
            return result;
        }
        match &result {
            Err(e) if *e != Error::Syn => {
                debug!(
                    target: "bus",
                    "{} during {}, switching to {}",
                    e,
                    state_name(self.state),
                    state_name(state)
                );
            }
            _ => {
                if self.request.is_some()
                    || matches!(
                        state,
                        BusState::SendCmd | BusState::SendResAck | BusState::SendSyn
                    )
                {
                    debug!(
                        target: "bus",
                        "switching from {} to {}",
                        state_name(self.state),
                        state_name(state)
                    );
                }
            }
        }
        self.state = state;

        if matches!(state, BusState::Ready | BusState::Skip) {
            self.command.clear();
            self.command_crc_valid = false;
            self.response.clear();
            self.response_crc_valid = false;
            self.next_send_pos = 0;
        }
        result
    }

    /// Routes a finished request to its originator.
    fn finish_request(&mut self, pending: &Pending, outcome: Result<SymbolString>) {
        match &pending.origin {
            Origin::Client => {
                // drop a stale queue entry so it is not driven again
                self.bus
                    .requests
                    .remove_matching(|p| Arc::ptr_eq(&p.request, &pending.request));
            }
            Origin::Poll(message) => {
                if let Ok(response) = &outcome {
                    let mut output = String::new();
                    match message.decode(
                        PartType::SlaveData,
                        response,
                        &mut output,
                        false,
                        UI_FIELD_SEPARATOR,
                    ) {
                        Ok(()) => {
                            info!(target: "cyc", "{} {}: {}", message.class(), message.name(), output);
                        }
                        Err(e) => error!(
                            target: "cyc",
                            "unable to parse poll {} {} from {}: {}",
                            message.class(),
                            message.name(),
                            response,
                            e
                        ),
                    }
                }
            }
            Origin::Scan(address) => {
                if let Ok(response) = &outcome {
                    let count = response.get(0).unwrap_or(0) as usize;
                    let data: String = (1..=count.min(response.len().saturating_sub(1)))
                        .map(|i| format!("{:02x}", response[i]))
                        .collect();
                    info!(target: "bus", "scan {address:02x}: {data}");
                    self.bus.scan_results.lock().unwrap().insert(*address, data);
                }
            }
        }
        pending.request.notify(outcome);
    }

    /// Decodes a completed frame from another master against the passive
    /// dictionary, stamping the matched message.
    fn receive_completed(&mut self) {
        let message = match self.bus.messages.find_frame(&self.command) {
            Some(message) => message,
            None => {
                let dst = self.command[1];
                if dst == BROADCAST {
                    info!(target: "bus", "received broadcast {}", self.command);
                } else if is_master(dst) {
                    info!(target: "bus", "received master-master {}", self.command);
                } else {
                    info!(
                        target: "bus",
                        "received master-slave {} / {}",
                        self.command,
                        self.response
                    );
                }
                return;
            }
        };
        let mut output = String::new();
        let mut result = message.decode(
            PartType::MasterData,
            &self.command,
            &mut output,
            false,
            UI_FIELD_SEPARATOR,
        );
        // a response with no data bytes carries nothing to decode
        if result.is_ok() && self.response.len() > 2 {
            let leading = !output.is_empty();
            result = message.decode(
                PartType::SlaveData,
                &self.response,
                &mut output,
                leading,
                UI_FIELD_SEPARATOR,
            );
        }
        match result {
            Ok(()) => info!(
                target: "cyc",
                "{} {}: {}",
                message.class(),
                message.name(),
                output
            ),
            Err(e) => error!(
                target: "cyc",
                "unable to parse {} {} from {} / {}: {}",
                message.class(),
                message.name(),
                self.command,
                self.response,
                e
            ),
        }
    }
}
