//! Message definitions and the dictionary indexing them for active lookup
//! by class and name, passive matching by frame header, and the
//! priority-weighted poll schedule.

use crate::data::{
    hex_bytes, DataField, DataFieldTemplates, PartType, UI_FIELD_SEPARATOR,
};
use crate::result::{Error, Result};
use crate::symbol::{is_master, is_valid_address, master_number, SymbolString, MAX_DATA_LEN, SYN};
use snafu::ensure;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source field sentinel marking an active message in the passive key.
const ACTIVE_SOURCE: u64 = 0x1F;
/// Mask of the source field within the passive key.
const SOURCE_MASK: u64 = 0x1F << 56;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// How a message is addressed in the by-name indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
    Passive,
}

impl Direction {
    fn of(is_set: bool, is_passive: bool) -> Direction {
        if is_passive {
            Direction::Passive
        } else if is_set {
            Direction::Write
        } else {
            Direction::Read
        }
    }
}

/// One bus message definition plus its runtime state.
///
/// The definition is immutable after loading; `last_value`, the update and
/// poll stamps, and the poll counter are written only from the bus-handler
/// thread and read as best-effort snapshots elsewhere.
#[derive(Debug)]
pub struct Message {
    class: String,
    name: String,
    is_set: bool,
    is_passive: bool,
    comment: String,
    src: u8,
    dst: u8,
    id: Vec<u8>,
    key: u64,
    data: DataField,
    poll_priority: u8,
    last_value: Mutex<String>,
    last_update_time: AtomicU64,
    poll_count: AtomicU32,
    last_poll_time: AtomicU64,
}

impl Message {
    pub fn new(
        class: &str,
        name: &str,
        is_set: bool,
        is_passive: bool,
        comment: &str,
        src: u8,
        dst: u8,
        id: Vec<u8>,
        data: DataField,
        poll_priority: u8,
    ) -> Result<Message> {
        ensure!(
            (2..=6).contains(&id.len()),
            crate::result::InvalidArgSnafu
        );
        ensure!(
            usize::from(data.get_length(PartType::MasterData)) + id.len() - 2 <= MAX_DATA_LEN
                && usize::from(data.get_length(PartType::SlaveData)) <= MAX_DATA_LEN,
            crate::result::InvalidArgSnafu
        );
        let key = passive_key(&id, is_passive, src, dst);
        Ok(Message {
            class: class.to_string(),
            name: name.to_string(),
            is_set,
            is_passive,
            comment: comment.to_string(),
            src,
            dst,
            id,
            key,
            data,
            poll_priority,
            last_value: Mutex::new(String::new()),
            last_update_time: AtomicU64::new(0),
            poll_count: AtomicU32::new(0),
            last_poll_time: AtomicU64::new(0),
        })
    }

    /// Parses one message row. The cells are
    /// `type, class, name, comment, QQ, ZZ, PBSB, extra-id, fields...`;
    /// empty cells take their value from the matching default row.
    pub fn create(
        row: &[String],
        defaults: Option<&[Vec<String>]>,
        templates: &DataFieldTemplates,
    ) -> Result<Message> {
        ensure!(row.len() > 6, crate::result::EofSnafu);
        let type_cell = &row[0];
        let mut is_set = false;
        let mut is_passive = false;
        let mut poll_priority = 0u8;
        let mut default_name = type_cell.clone();
        if type_cell.is_empty() {
            default_name = "r".to_string();
        } else if type_cell.starts_with(&['r', 'R'][..]) {
            // active get, optionally with a poll priority digit
            if let Some(digit) = type_cell.chars().last().and_then(|c| c.to_digit(10)) {
                poll_priority = digit as u8;
                default_name = type_cell[..type_cell.len() - 1].to_string();
            }
        } else if type_cell.starts_with(&['w', 'W'][..]) {
            is_set = true;
        } else {
            is_passive = true;
            is_set = type_cell.to_ascii_lowercase().ends_with('w');
        }

        let default_row = defaults.and_then(|rows| {
            rows.iter()
                .rev()
                .find(|row| row.first().map(String::as_str) == Some(default_name.as_str()))
        });
        let default_cell = |pos: usize| -> &str {
            default_row
                .and_then(|row| row.get(pos))
                .map(String::as_str)
                .unwrap_or("")
        };
        let cell = |pos: usize| -> &str {
            let value = row.get(pos).map(String::as_str).unwrap_or("");
            if value.is_empty() {
                default_cell(pos)
            } else {
                value
            }
        };

        let class = cell(1).to_string();
        let name = row.get(2).map(String::as_str).unwrap_or("");
        ensure!(!name.is_empty(), crate::result::InvalidArgSnafu);
        let comment = cell(3).to_string();

        let src_cell = cell(4);
        let src = if src_cell.is_empty() {
            SYN // no specific source
        } else {
            let src = u8::from_str_radix(src_cell, 16).map_err(|_| Error::InvalidArg)?;
            ensure!(is_master(src), crate::result::InvalidArgSnafu);
            src
        };
        let dst = u8::from_str_radix(cell(5), 16).map_err(|_| Error::InvalidArg)?;
        ensure!(is_valid_address(dst), crate::result::InvalidArgSnafu);

        // PBSB cell, then the optional extra id cell; a default row supplies
        // a prefix that the row's own digits extend
        let mut id = Vec::new();
        let explicit_pbsb = row.get(6).map(|c| !c.is_empty()).unwrap_or(false);
        for pos in 6..8 {
            let own = row.get(pos).map(String::as_str).unwrap_or("");
            let combined = if explicit_pbsb {
                own.to_string()
            } else {
                format!("{}{}", default_cell(pos), own)
            };
            if !combined.is_empty() {
                id.extend(hex_bytes(&combined)?);
            }
            if pos == 6 {
                ensure!(id.len() == 2, crate::result::InvalidArgSnafu);
            }
        }
        ensure!((2..=6).contains(&id.len()), crate::result::InvalidArgSnafu);

        // field cells; a default row may prepend whole field groups
        let mut field_cells: Vec<String> = Vec::new();
        if let Some(default_row) = default_row {
            let mut pos = 8;
            while default_row.get(pos + 2).map(|c| !c.is_empty()).unwrap_or(false) {
                for i in 0..6 {
                    field_cells.push(
                        default_row.get(pos + i).cloned().unwrap_or_default(),
                    );
                }
                pos += 6;
            }
        }
        field_cells.extend(row.iter().skip(8).cloned());

        let data = DataField::create(&field_cells, templates, is_set, dst)?;
        Message::new(
            &class,
            name,
            is_set,
            is_passive,
            &comment,
            src,
            dst,
            id,
            data,
            poll_priority,
        )
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_set(&self) -> bool {
        self.is_set
    }

    pub fn is_passive(&self) -> bool {
        self.is_passive
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn src(&self) -> u8 {
        self.src
    }

    pub fn dst(&self) -> u8 {
        self.dst
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn poll_priority(&self) -> u8 {
        self.poll_priority
    }

    pub fn last_value(&self) -> String {
        self.last_value.lock().unwrap().clone()
    }

    /// Unix time of the last successful decode, 0 for never.
    pub fn last_update_time(&self) -> u64 {
        self.last_update_time.load(Ordering::Relaxed)
    }

    pub fn last_poll_time(&self) -> u64 {
        self.last_poll_time.load(Ordering::Relaxed)
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count.load(Ordering::Relaxed)
    }

    /// Builds the escaped master frame for sending, with the CRC appended.
    /// `src` replaces the stored `SYN` source of an active message;
    /// `dst` optionally overrides the stored destination.
    pub fn prepare_master(
        &self,
        src: u8,
        input: &str,
        dst: Option<u8>,
    ) -> Result<SymbolString> {
        ensure!(!self.is_passive, crate::result::InvalidArgSnafu);
        let mut frame = SymbolString::unescaped();
        frame.push(src, false)?;
        frame.push(dst.unwrap_or(self.dst), false)?;
        frame.push(self.id[0], false)?;
        frame.push(self.id[1], false)?;
        let data_len = self.id.len() - 2 + usize::from(self.data.get_length(PartType::MasterData));
        ensure!(data_len <= MAX_DATA_LEN, crate::result::OutOfRangeSnafu);
        frame.push(data_len as u8, false)?;
        for &byte in &self.id[2..] {
            frame.push(byte, false)?;
        }
        self.data.write(
            input,
            PartType::MasterData,
            &mut frame,
            self.id.len() - 2,
            UI_FIELD_SEPARATOR,
        )?;
        SymbolString::escaped_from(&frame)
    }

    /// Builds the escaped slave response frame for a passive get message.
    pub fn prepare_slave(&self) -> Result<SymbolString> {
        ensure!(self.is_passive && !self.is_set, crate::result::InvalidArgSnafu);
        let mut frame = SymbolString::unescaped();
        frame.push(self.data.get_length(PartType::SlaveData), false)?;
        self.data
            .write("", PartType::SlaveData, &mut frame, 0, UI_FIELD_SEPARATOR)?;
        SymbolString::escaped_from(&frame)
    }

    /// Decodes the given part of a received frame into `output` and stamps
    /// the runtime state.
    pub fn decode(
        &self,
        part: PartType,
        data: &SymbolString,
        output: &mut String,
        leading_sep: bool,
        sep: char,
    ) -> Result<()> {
        let offset = if part == PartType::MasterData {
            self.id.len() - 2
        } else {
            0
        };
        let start = output.len();
        let result = self
            .data
            .read(part, data, offset, output, leading_sep, false, sep);
        self.last_update_time.store(unix_now(), Ordering::Relaxed);
        match result {
            Ok(_) => {
                *self.last_value.lock().unwrap() = output[start..].to_string();
                Ok(())
            }
            Err(e) => {
                self.last_value.lock().unwrap().clear();
                Err(e)
            }
        }
    }

    fn stamp_poll(&self) {
        self.poll_count.fetch_add(1, Ordering::Relaxed);
        self.last_poll_time.store(unix_now(), Ordering::Relaxed);
    }

    /// The poll weight tuple; lower weights poll first.
    fn poll_weight(&self) -> PollWeight {
        (
            u64::from(self.poll_priority) * (u64::from(self.poll_count()) + 1),
            self.poll_priority,
            self.last_poll_time(),
        )
    }
}

/// `(priority × (poll_count+1), priority, last_poll_time)`
type PollWeight = (u64, u8, u64);

fn passive_key(id: &[u8], is_passive: bool, src: u8, dst: u8) -> u64 {
    let mut key = ((id.len() as u64) - 2) << 61;
    let source = if !is_passive {
        ACTIVE_SOURCE
    } else {
        // bound sources are numbered 1..=25, 0 is the wildcard
        master_number(src).map(|n| u64::from(n) + 1).unwrap_or(0)
    };
    key |= source << 56;
    key |= u64::from(dst) << 48;
    let mut shift = 40;
    for &byte in id {
        key |= u64::from(byte) << shift;
        shift -= 8;
    }
    key
}

struct PollEntry {
    weight: PollWeight,
    order: u64,
    message: std::sync::Arc<Message>,
}

impl PartialEq for PollEntry {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.order == other.order
    }
}

impl Eq for PollEntry {}

impl PartialOrd for PollEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PollEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.weight, self.order).cmp(&(other.weight, other.order))
    }
}

/// The dictionary of all known messages.
#[derive(Default)]
pub struct MessageMap {
    by_class_name: HashMap<(Direction, String, String), Arc<Message>>,
    by_name: HashMap<(Direction, String), Arc<Message>>,
    passive_by_key: HashMap<u64, Arc<Message>>,
    poll: Mutex<PollHeap>,
    message_count: usize,
    min_id_length: u8,
    max_id_length: u8,
}

#[derive(Default)]
struct PollHeap {
    heap: BinaryHeap<Reverse<PollEntry>>,
    next_order: u64,
}

impl MessageMap {
    pub fn new() -> MessageMap {
        MessageMap {
            min_id_length: 4,
            max_id_length: 0,
            ..MessageMap::default()
        }
    }

    /// Adds a message, rejecting duplicate name or passive keys. The
    /// class-less index keeps the last message added under a name, which
    /// is the intended override.
    pub fn add(&mut self, message: Message) -> Result<Arc<Message>> {
        let direction = Direction::of(message.is_set(), message.is_passive());
        let class_key = (
            direction,
            message.class().to_string(),
            message.name().to_string(),
        );
        if message.is_passive() && self.passive_by_key.contains_key(&message.key()) {
            return Err(Error::Duplicate);
        }
        if self.by_class_name.contains_key(&class_key) {
            return Err(Error::Duplicate);
        }

        let message = Arc::new(message);
        self.by_class_name.insert(class_key, Arc::clone(&message));
        self.by_name.insert(
            (direction, message.name().to_string()),
            Arc::clone(&message),
        );
        self.message_count += 1;

        if message.is_passive() {
            let id_length = (message.id().len() - 2) as u8;
            self.min_id_length = self.min_id_length.min(id_length);
            self.max_id_length = self.max_id_length.max(id_length);
            self.passive_by_key
                .insert(message.key(), Arc::clone(&message));
        }
        if message.poll_priority() > 0 {
            let mut poll = self.poll.lock().unwrap();
            let entry = PollEntry {
                weight: message.poll_weight(),
                order: poll.next_order,
                message: Arc::clone(&message),
            };
            poll.next_order += 1;
            poll.heap.push(Reverse(entry));
        }
        Ok(message)
    }

    /// Parses one CSV row into messages (the type cell may hold several
    /// `;`-separated types) and adds each of them.
    pub fn add_from_row(
        &mut self,
        row: &[String],
        templates: &DataFieldTemplates,
        defaults: Option<&[Vec<String>]>,
    ) -> Result<()> {
        let types = if row.first().map(|c| c.is_empty()).unwrap_or(true) {
            "r".to_string()
        } else {
            row[0].clone()
        };
        let mut row = row.to_vec();
        for message_type in types.split(crate::data::VALUE_SEPARATOR) {
            row[0] = message_type.to_string();
            let message = Message::create(&row, defaults, templates)?;
            self.add(message)?;
        }
        Ok(())
    }

    /// Finds a message by class and name; a miss retries without the class.
    pub fn find(
        &self,
        class: &str,
        name: &str,
        is_set: bool,
        is_passive: bool,
    ) -> Option<Arc<Message>> {
        let direction = Direction::of(is_set, is_passive);
        self.by_class_name
            .get(&(direction, class.to_string(), name.to_string()))
            .or_else(|| self.by_name.get(&(direction, name.to_string())))
            .cloned()
    }

    /// Finds the passive message matching an unescaped master frame,
    /// probing from the longest plausible id down, each time first with
    /// the bound source and then with the source wildcarded.
    pub fn find_frame(&self, master: &SymbolString) -> Option<Arc<Message>> {
        if master.len() < 5 {
            return None;
        }
        let mut max_id_length = master[4];
        if max_id_length < self.min_id_length {
            return None;
        }
        max_id_length = max_id_length.min(self.max_id_length);
        if master.len() < 5 + max_id_length as usize {
            return None;
        }

        let source = u64::from(master_number(master[0])? + 1);
        for id_length in (self.min_id_length..=max_id_length).rev() {
            let mut key = u64::from(id_length) << 61;
            key |= source << 56;
            key |= u64::from(master[1]) << 48;
            key |= u64::from(master[2]) << 40;
            key |= u64::from(master[3]) << 32;
            let mut shift = 24;
            for i in 0..id_length as usize {
                key |= u64::from(master[5 + i]) << shift;
                shift -= 8;
            }
            if let Some(message) = self.passive_by_key.get(&key) {
                return Some(Arc::clone(message));
            }
            // retry with the source wildcarded
            if let Some(message) = self.passive_by_key.get(&(key & !SOURCE_MASK)) {
                return Some(Arc::clone(message));
            }
        }
        None
    }

    /// Total number of stored messages, or passive entries only.
    pub fn size(&self, passive_only: bool) -> usize {
        if passive_only {
            self.passive_by_key.len()
        } else {
            self.message_count
        }
    }

    pub fn size_poll(&self) -> usize {
        self.poll.lock().unwrap().heap.len()
    }

    /// Pops the lowest-weighted poll entry, stamps it, and re-inserts it
    /// at its new weight.
    pub fn next_poll(&self) -> Option<Arc<Message>> {
        let mut poll = self.poll.lock().unwrap();
        let Reverse(entry) = poll.heap.pop()?;
        let message = entry.message;
        message.stamp_poll();
        let entry = PollEntry {
            weight: message.poll_weight(),
            order: poll.next_order,
            message: Arc::clone(&message),
        };
        poll.next_order += 1;
        poll.heap.push(Reverse(entry));
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{crc8, BROADCAST};

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    fn templates() -> DataFieldTemplates {
        DataFieldTemplates::new()
    }

    fn message_row(row: &[&str]) -> Message {
        Message::create(&cells(row), None, &templates()).unwrap()
    }

    fn wire_crc(escaped: &[u8]) -> u8 {
        escaped.iter().fold(0, |crc, &b| crc8(crc, b))
    }

    #[test]
    fn broadcast_frame_layout() {
        // r,,outside,,,fe,b516,08,data,m,HEX:3,,,
        let msg = message_row(&[
            "w", "", "datetime", "", "", "fe", "b516", "08", "data", "m", "HEX:3", "", "", "",
        ]);
        let master = msg.prepare_master(0x03, "040000", None).unwrap();
        let expected_data = [0x03, 0xFE, 0xB5, 0x16, 0x04, 0x08, 0x04, 0x00, 0x00];
        assert_eq!(&master.as_slice()[..9], &expected_data);
        assert_eq!(master[9], wire_crc(&expected_data));
        assert_eq!(master.len(), 10);
    }

    #[test]
    fn prepared_master_crc_validates() {
        let msg = message_row(&[
            "r", "", "temp", "", "", "08", "5022", "", "val", "s", "HEX:3", "", "", "",
        ]);
        let master = msg.prepare_master(0x03, "", None).unwrap();
        assert_eq!(&master.as_slice()[..5], &[0x03, 0x08, 0x50, 0x22, 0x00]);
        let len = master.len();
        assert_eq!(master[len - 1], wire_crc(&master.as_slice()[..len - 1]));
    }

    #[test]
    fn data_length_limit_enforced() {
        // 2 extra id bytes + 14 data bytes fill the 16 byte limit exactly
        let full = Message::create(
            &cells(&[
                "w", "", "blob", "", "", "08", "b516", "0102", "data", "m", "HEX:14", "", "", "",
            ]),
            None,
            &templates(),
        );
        assert!(full.is_ok());
        // one more data byte exceeds it
        let too_long = Message::create(
            &cells(&[
                "w", "", "blob", "", "", "08", "b516", "0102", "data", "m", "HEX:15", "", "", "",
            ]),
            None,
            &templates(),
        );
        assert_eq!(too_long.err(), Some(Error::InvalidArg));
    }

    #[test]
    fn passive_key_layout() {
        let msg = message_row(&[
            "u", "", "status", "", "ff", "08", "b509", "0d", "val", "s", "UCH", "", "", "",
        ]);
        // idLen-2 = 1, source ff = master 24 -> 25, dst 08, id b5 09 0d
        let expected = 1u64 << 61
            | 25u64 << 56
            | 0x08u64 << 48
            | 0xB5u64 << 40
            | 0x09u64 << 32
            | 0x0Du64 << 24;
        assert_eq!(msg.key(), expected);
    }

    #[test]
    fn find_falls_back_to_class_less_lookup() {
        let mut map = MessageMap::new();
        map.add(message_row(&[
            "r", "heating", "temp", "", "", "08", "5022", "", "v", "s", "UCH", "", "", "",
        ]))
        .unwrap();
        assert!(map.find("heating", "temp", false, false).is_some());
        assert!(map.find("", "temp", false, false).is_some());
        assert!(map.find("other", "temp", false, false).is_some());
        assert!(map.find("heating", "temp", true, false).is_none());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut map = MessageMap::new();
        map.add(message_row(&[
            "r", "heating", "temp", "", "", "08", "5022", "", "v", "s", "UCH", "", "", "",
        ]))
        .unwrap();
        let result = map.add(message_row(&[
            "r", "heating", "temp", "", "", "08", "5023", "", "v", "s", "UCH", "", "", "",
        ]));
        assert!(matches!(result, Err(Error::Duplicate)));
    }

    #[test]
    fn duplicate_passive_keys_rejected() {
        let mut map = MessageMap::new();
        map.add(message_row(&[
            "u", "a", "one", "", "ff", "08", "b509", "0d", "v", "s", "UCH", "", "", "",
        ]))
        .unwrap();
        let result = map.add(message_row(&[
            "u", "b", "two", "", "ff", "08", "b509", "0d", "v", "s", "UCH", "", "", "",
        ]));
        assert!(matches!(result, Err(Error::Duplicate)));
    }

    #[test]
    fn frame_lookup_prefers_long_ids_and_bound_sources() {
        let mut map = MessageMap::new();
        let short = map
            .add(message_row(&[
                "u", "a", "short", "", "", "08", "b509", "", "v", "m", "UCH", "", "", "",
            ]))
            .unwrap();
        let long = map
            .add(message_row(&[
                "u", "a", "long", "", "ff", "08", "b509", "0d", "v", "m", "UCH", "", "", "",
            ]))
            .unwrap();

        // ff 08 b5 09 02 0d 2a: extra id 0d matches the bound-source entry
        let frame = SymbolString::parse_hex("ff08b509020d2a").unwrap();
        let found = map.find_frame(&frame).unwrap();
        assert_eq!(found.name(), long.name());

        // 10 08 b5 09 02 0d 2a: source 10 is not bound, wildcard matches the
        // short id after the long probe misses
        let frame = SymbolString::parse_hex("1008b509020d2a").unwrap();
        let found = map.find_frame(&frame).unwrap();
        assert_eq!(found.name(), short.name());

        // removing the trailing id byte still finds the short entry
        let frame = SymbolString::parse_hex("1008b509002a").unwrap();
        let found = map.find_frame(&frame).unwrap();
        assert_eq!(found.name(), short.name());
    }

    #[test]
    fn poll_priority_one_wins_three_rounds() {
        let mut map = MessageMap::new();
        map.add(message_row(&[
            "r1", "a", "fast", "", "", "08", "5022", "", "v", "s", "UCH", "", "", "",
        ]))
        .unwrap();
        map.add(message_row(&[
            "r3", "a", "slow", "", "", "08", "5023", "", "v", "s", "UCH", "", "", "",
        ]))
        .unwrap();

        let order: Vec<String> = (0..4)
            .map(|_| map.next_poll().unwrap().name().to_string())
            .collect();
        assert_eq!(order, ["fast", "fast", "fast", "slow"]);
    }

    #[test]
    fn type_variants() {
        let read = message_row(&[
            "r2", "c", "m1", "", "", "08", "5022", "", "v", "s", "UCH", "", "", "",
        ]);
        assert!(!read.is_passive());
        assert!(!read.is_set());
        assert_eq!(read.poll_priority(), 2);

        let write = message_row(&[
            "w", "c", "m2", "", "", "08", "5022", "", "v", "m", "UCH", "", "", "",
        ]);
        assert!(write.is_set());

        let passive_set = message_row(&[
            "uw", "c", "m3", "", "", "08", "5022", "", "v", "m", "UCH", "", "", "",
        ]);
        assert!(passive_set.is_passive());
        assert!(passive_set.is_set());

        let broadcast = message_row(&[
            "u", "c", "m4", "", "", "fe", "0704", "", "v", "m", "UCH", "", "", "",
        ]);
        assert_eq!(broadcast.dst(), BROADCAST);
        assert_eq!(broadcast.src(), SYN);
    }

    #[test]
    fn defaults_fill_empty_cells() {
        let defaults = vec![cells(&[
            "r", "heating", "", "", "", "08", "b509", "0d", "", "", "", "", "", "",
        ])];
        let msg = Message::create(
            &cells(&["r", "", "temp", "", "", "", "", "01", "v", "s", "UCH", "", "", ""]),
            Some(&defaults),
            &templates(),
        )
        .unwrap();
        assert_eq!(msg.class(), "heating");
        assert_eq!(msg.dst(), 0x08);
        // the default id prefix is extended by the row's own digits
        assert_eq!(msg.id(), &[0xB5, 0x09, 0x0D, 0x01]);

        // an explicit PBSB cell switches the defaults off for the id
        let msg = Message::create(
            &cells(&["r", "", "own", "", "", "", "5022", "", "v", "s", "UCH", "", "", ""]),
            Some(&defaults),
            &templates(),
        )
        .unwrap();
        assert_eq!(msg.id(), &[0x50, 0x22]);
    }

    #[test]
    fn prepare_slave_fills_replacements() {
        let msg = message_row(&[
            "u", "", "roomtemp", "", "", "08", "b511", "", "v", "s", "UCH", "", "", "",
        ]);
        let slave = msg.prepare_slave().unwrap();
        assert_eq!(&slave.as_slice()[..2], &[0x01, 0xFF]);
        assert_eq!(slave[2], wire_crc(&[0x01, 0xFF]));

        let active = message_row(&[
            "r", "", "other", "", "", "08", "b511", "", "v", "s", "UCH", "", "", "",
        ]);
        assert_eq!(active.prepare_slave().err(), Some(Error::InvalidArg));
    }

    #[test]
    fn decode_stamps_runtime_state() {
        let msg = message_row(&[
            "u", "", "status", "", "ff", "08", "b509", "0d", "v", "m", "UCH", "", "", "",
        ]);
        // master data: extra id 0d then value 2a at offset 1
        let frame = SymbolString::parse_hex("ff08b509020d2a").unwrap();
        let mut out = String::new();
        msg.decode(PartType::MasterData, &frame, &mut out, false, ';').unwrap();
        assert_eq!(out, "42");
        assert_eq!(msg.last_value(), "42");
        assert!(msg.last_update_time() > 0);
    }
}
