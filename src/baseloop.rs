//! The base loop: serializes client commands, translates them into
//! dictionary lookups and bus operations, and hands the textual result
//! back to the network layer.

use crate::bus::BusHandler;
use crate::data::{PartType, UI_FIELD_SEPARATOR};
use crate::device::PortControl;
use crate::logger::LogHandle;
use crate::message::MessageMap;
use crate::network::NetMessage;
use crate::queue::WaitQueue;
use crate::result::Error;
use crate::symbol::{is_master, SymbolString, BROADCAST, MAX_DATA_LEN};
use log::{error, info};
use std::sync::Arc;

/// The client-visible commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Get,
    Set,
    Cyc,
    Hex,
    Scan,
    Log,
    Raw,
    Dump,
    Help,
    Invalid,
}

/// Maps the first token of a client line to a [`Command`].
pub fn command_type(word: &str) -> Command {
    match word.to_ascii_lowercase().as_str() {
        "get" => Command::Get,
        "set" => Command::Set,
        "cyc" => Command::Cyc,
        "hex" => Command::Hex,
        "scan" => Command::Scan,
        "log" => Command::Log,
        "raw" => Command::Raw,
        "dump" => Command::Dump,
        "help" => Command::Help,
        _ => Command::Invalid,
    }
}

const HELP: &str = "commands:\n \
    get       - fetch ebus data             'get [class] cmd'\n \
    set       - set ebus values             'set class cmd value'\n \
    cyc       - fetch cycle data            'cyc [class] cmd'\n \
    hex       - send given hex value        'hex value' (value: ZZPBSBNNDx)\n\n \
    scan      - scan ebus known addresses   'scan'\n \
              - scan ebus all addresses     'scan full'\n \
              - show results                'scan result'\n\n \
    log       - change log areas            'log areas area,area,..' (areas: bas|net|bus|cyc|all)\n \
              - change log level            'log level level'        (level: error|event|trace|debug)\n\n \
    raw       - toggle log raw data         'raw'\n \
    dump      - toggle dump state           'dump'\n\n \
    stop      - stop daemon                 'stop'\n \
    quit      - close connection            'quit'\n\n \
    help      - print this page             'help'";

pub struct BaseLoop {
    messages: Arc<MessageMap>,
    bus: Arc<BusHandler>,
    port_control: Arc<PortControl>,
    log_handle: LogHandle,
    queue: Arc<WaitQueue<Arc<NetMessage>>>,
    poll_active: bool,
}

impl BaseLoop {
    pub fn new(
        messages: Arc<MessageMap>,
        bus: Arc<BusHandler>,
        port_control: Arc<PortControl>,
        log_handle: LogHandle,
        poll_active: bool,
    ) -> BaseLoop {
        BaseLoop {
            messages,
            bus,
            port_control,
            log_handle,
            queue: Arc::new(WaitQueue::new()),
            poll_active,
        }
    }

    /// The queue the network layer feeds.
    pub fn queue(&self) -> Arc<WaitQueue<Arc<NetMessage>>> {
        Arc::clone(&self.queue)
    }

    /// Serves client messages until `stop` arrives.
    pub fn run(&self) {
        loop {
            let message = match self.queue.remove_first(true) {
                Some(message) => message,
                None => continue,
            };
            let data: String = message
                .data()
                .chars()
                .filter(|c| *c != '\r' && *c != '\n')
                .collect();
            info!(target: "bas", ">>> {data}");

            let stop = data.eq_ignore_ascii_case("stop");
            let result = if stop {
                "done".to_string()
            } else {
                self.decode_message(&data)
            };
            info!(target: "bas", "<<< {result}");
            message.set_result(result);

            if stop {
                self.bus.stop();
                return;
            }
        }
    }

    /// Decodes and executes one client line, returning the result text.
    pub fn decode_message(&self, data: &str) -> String {
        let cmd: Vec<&str> = data.split_whitespace().collect();
        if cmd.is_empty() {
            return "command missing".to_string();
        }

        match command_type(cmd[0]) {
            Command::Get => self.run_get(&cmd),
            Command::Set => self.run_set(&cmd),
            Command::Cyc => self.run_cyc(&cmd),
            Command::Hex => self.run_hex(&cmd),
            Command::Scan => self.run_scan(&cmd),
            Command::Log => self.run_log(&cmd),
            Command::Raw => {
                if cmd.len() != 1 {
                    return "usage: 'raw'".to_string();
                }
                let enabled = self.port_control.toggle_log_raw();
                info!(target: "bas", "raw data logging {}", if enabled { "enabled" } else { "disabled" });
                "done".to_string()
            }
            Command::Dump => {
                if cmd.len() != 1 {
                    return "usage: 'dump'".to_string();
                }
                let enabled = self.port_control.toggle_dump_raw();
                info!(target: "bas", "raw dump {}", if enabled { "enabled" } else { "disabled" });
                "done".to_string()
            }
            Command::Help => HELP.to_string(),
            Command::Invalid => "command not found".to_string(),
        }
    }

    fn run_get(&self, cmd: &[&str]) -> String {
        if cmd.len() < 2 || cmd.len() > 4 {
            return "usage: 'get [class] cmd' or 'get class cmd sub'".to_string();
        }
        let (class, name) = if cmd.len() == 2 {
            ("", cmd[1])
        } else {
            (cmd[1], cmd[2])
        };
        let message = match self.messages.find(class, name, false, false) {
            Some(message) => message,
            None => return "get command not found".to_string(),
        };

        if self.poll_active && message.poll_priority() > 0 {
            let value = message.last_value();
            return if value.is_empty() {
                "no data stored".to_string()
            } else {
                value
            };
        }

        let master = match message.prepare_master(self.bus.own_address(), "", None) {
            Ok(master) => master,
            Err(e) => {
                error!(target: "bas", "prepare read: {e}");
                return e.to_string();
            }
        };
        info!(target: "bas", "read msg: {master}");

        match self.bus.send_and_wait(&master) {
            Ok(slave) => {
                let mut output = String::new();
                match message.decode(PartType::SlaveData, &slave, &mut output, false, UI_FIELD_SEPARATOR) {
                    Ok(()) => output,
                    Err(e) => {
                        error!(target: "bas", "read: {e}");
                        e.to_string()
                    }
                }
            }
            Err(e) => {
                error!(target: "bas", "read: {e}");
                e.to_string()
            }
        }
    }

    fn run_set(&self, cmd: &[&str]) -> String {
        if cmd.len() != 4 {
            return "usage: 'set class cmd value'".to_string();
        }
        let message = match self.messages.find(cmd[1], cmd[2], true, false) {
            Some(message) => message,
            None => return "set command not found".to_string(),
        };

        let master = match message.prepare_master(self.bus.own_address(), cmd[3], None) {
            Ok(master) => master,
            Err(e) => {
                error!(target: "bas", "prepare write: {e}");
                return e.to_string();
            }
        };
        info!(target: "bas", "write msg: {master}");

        match self.bus.send_and_wait(&master) {
            Ok(slave) => {
                if master[1] == BROADCAST || is_master(master[1]) {
                    return "done".to_string();
                }
                let mut output = String::new();
                match message.decode(PartType::SlaveData, &slave, &mut output, false, UI_FIELD_SEPARATOR) {
                    Ok(()) if output.is_empty() => "done".to_string(),
                    Ok(()) => output,
                    Err(e) => {
                        error!(target: "bas", "write: {e}");
                        e.to_string()
                    }
                }
            }
            Err(e) => {
                error!(target: "bas", "write: {e}");
                e.to_string()
            }
        }
    }

    fn run_cyc(&self, cmd: &[&str]) -> String {
        if cmd.len() < 2 || cmd.len() > 3 {
            return "usage: 'cyc [class] cmd'".to_string();
        }
        let (class, name) = if cmd.len() == 2 {
            ("", cmd[1])
        } else {
            (cmd[1], cmd[2])
        };
        match self.messages.find(class, name, false, true) {
            Some(message) => {
                let value = message.last_value();
                if value.is_empty() {
                    "no data stored".to_string()
                } else {
                    value
                }
            }
            None => "cyc command not found".to_string(),
        }
    }

    fn run_hex(&self, cmd: &[&str]) -> String {
        if cmd.len() < 2 {
            return "usage: 'hex value' (value: ZZPBSBNNDx)".to_string();
        }
        let value: String = cmd[1..].concat();
        let frame = format!("{:02x}{value}", self.bus.own_address());
        let master = match SymbolString::parse_hex(&frame) {
            Ok(master) => master,
            Err(e) => return e.to_string(),
        };
        if master.len() < 5
            || master[4] as usize != master.len() - 5
            || master[4] as usize > MAX_DATA_LEN
        {
            return Error::InvalidArg.to_string();
        }
        let master = match SymbolString::escaped_from(&master) {
            Ok(master) => master,
            Err(e) => return e.to_string(),
        };
        info!(target: "bas", "hex msg: {master}");

        match self.bus.send_and_wait(&master) {
            Ok(slave) => {
                if master[1] == BROADCAST || is_master(master[1]) {
                    "done".to_string()
                } else {
                    slave.to_hex()
                }
            }
            Err(e) => {
                error!(target: "bas", "hex: {e}");
                e.to_string()
            }
        }
    }

    fn run_scan(&self, cmd: &[&str]) -> String {
        if cmd.len() == 1 {
            return match self.bus.start_scan(false) {
                Ok(()) => "scan initiated".to_string(),
                Err(e) => {
                    error!(target: "bas", "scan: {e}");
                    e.to_string()
                }
            };
        }
        if cmd.len() == 2 && cmd[1].eq_ignore_ascii_case("full") {
            return match self.bus.start_scan(true) {
                Ok(()) => "done".to_string(),
                Err(e) => {
                    error!(target: "bas", "full scan: {e}");
                    e.to_string()
                }
            };
        }
        if cmd.len() == 2 && cmd[1].eq_ignore_ascii_case("result") {
            return self.bus.format_scan_result();
        }
        "usage: 'scan'\n       'scan full'\n       'scan result'".to_string()
    }

    fn run_log(&self, cmd: &[&str]) -> String {
        const USAGE: &str = "usage: 'log areas area,area,..' (areas: bas|net|bus|cyc|all)\n       'log level level'        (level: error|event|trace|debug)";
        if cmd.len() != 3 {
            return USAGE.to_string();
        }
        if cmd[1].eq_ignore_ascii_case("areas") {
            match LogHandle::parse_areas(cmd[2]) {
                Some(areas) => {
                    self.log_handle.set_areas(areas);
                    return "done".to_string();
                }
                None => return USAGE.to_string(),
            }
        }
        if cmd[1].eq_ignore_ascii_case("level") {
            match LogHandle::parse_level(cmd[2]) {
                Some(level) => {
                    self.log_handle.set_level(level);
                    return "done".to_string();
                }
                None => return USAGE.to_string(),
            }
        }
        USAGE.to_string()
    }
}
