//! The TCP client transport: an acceptor thread plus one thread per
//! connection, exchanging text lines with the base loop through a queue of
//! single-shot [`NetMessage`] slots.

use crate::queue::WaitQueue;
use crate::result::{Error, Result};
use log::{debug, error, info};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// One client line awaiting its result.
#[derive(Debug)]
pub struct NetMessage {
    data: String,
    result: Mutex<Option<String>>,
    done: Condvar,
}

impl NetMessage {
    pub fn new(data: String) -> Arc<NetMessage> {
        Arc::new(NetMessage {
            data,
            result: Mutex::new(None),
            done: Condvar::new(),
        })
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Stores the result and wakes the waiting client thread.
    /// Only the first call takes effect.
    pub fn set_result(&self, result: String) {
        let mut slot = self.result.lock().unwrap();
        if slot.is_none() {
            *slot = Some(result);
            self.done.notify_all();
        }
    }

    /// Blocks until the base loop delivered the result.
    pub fn wait_result(&self) -> String {
        let mut slot = self.result.lock().unwrap();
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            slot = self.done.wait(slot).unwrap();
        }
    }
}

/// Accepts client connections and feeds their lines into `queue`.
/// Each connection gets its own thread; `quit` closes a connection
/// without involving the base loop.
pub fn listen(port: u16, localhost_only: bool, queue: Arc<WaitQueue<Arc<NetMessage>>>) -> Result<()> {
    let host = if localhost_only { "127.0.0.1" } else { "0.0.0.0" };
    let listener = TcpListener::bind((host, port)).map_err(|_| Error::GenericIo)?;
    info!(target: "net", "listening on {host}:{port}");
    thread::Builder::new()
        .name("network".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let queue = Arc::clone(&queue);
                        let _ = thread::Builder::new()
                            .name("netclient".to_string())
                            .spawn(move || client_loop(stream, &queue));
                    }
                    Err(e) => error!(target: "net", "accept failed: {e}"),
                }
            }
        })
        .map_err(|_| Error::GenericIo)?;
    Ok(())
}

fn client_loop(stream: TcpStream, queue: &WaitQueue<Arc<NetMessage>>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    debug!(target: "net", "connection opened from {peer}");
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(_) => return,
    };
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let line = line.trim_matches(['\r', '\n'].as_slice()).to_string();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") {
            let _ = writer.write_all(b"connection closed\n");
            break;
        }
        let message = NetMessage::new(line);
        queue.add(Arc::clone(&message));
        let mut result = message.wait_result();
        if !result.ends_with('\n') {
            result.push('\n');
        }
        if writer.write_all(result.as_bytes()).is_err() {
            break;
        }
    }
    debug!(target: "net", "connection closed from {peer}");
}
