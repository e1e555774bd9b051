//! The typed data-field model: base type table, field definitions parsed
//! from CSV cells, and encoding/decoding of field values over unescaped
//! [`SymbolString`] frames.

use crate::result::{Error, Result};
use crate::symbol::{is_master, SymbolString, BROADCAST, SYN};
use snafu::ensure;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Separator between cells in a CSV row.
pub const FIELD_SEPARATOR: char = ',';
/// Separator between multiple values inside one cell.
pub const VALUE_SEPARATOR: char = ';';
/// Separator between a type name and its length.
pub const LENGTH_SEPARATOR: char = ':';
/// Replacement string for undefined values.
pub const NULL_VALUE: &str = "-";
/// Separator between fields in client-visible output.
pub const UI_FIELD_SEPARATOR: char = ';';

/// adjustable length, `max_bits` is the maximum
pub const ADJ: u16 = 0x01;
/// binary representation is BCD
pub const BCD: u16 = 0x02;
/// reverted representation (most significant byte first)
pub const REV: u16 = 0x04;
/// signed value
pub const SIG: u16 = 0x08;
/// a value list may replace the divisor
pub const LST: u16 = 0x10;
/// forced value list defaulting to week days
pub const DAY: u16 = 0x20;
/// ignored during read and write
pub const IGN: u16 = 0x40;

/// The message part a field is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartType {
    /// Unresolved, only valid on templates.
    Any,
    MasterData,
    SlaveData,
}

impl PartType {
    /// Index of the first data byte of this part within a full frame.
    pub fn base_offset(self) -> usize {
        match self {
            PartType::MasterData => 5,
            PartType::SlaveData => 1,
            PartType::Any => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    Str,
    HexStr,
    Date,
    Time,
    Num,
}

/// An immutable base type descriptor.
#[derive(Debug, Clone, Copy)]
pub struct DataType {
    pub name: &'static str,
    pub max_bits: u8,
    pub kind: BaseKind,
    pub flags: u16,
    /// Fill value for strings, replacement raw value for numerics;
    /// no replacement if equal to `min_value_or_length`.
    pub replacement: u32,
    pub min_value_or_length: u32,
    pub max_value_or_length: u32,
    pub divisor: i32,
    /// Formatting precision, or the first-bit offset for sub-byte types.
    pub precision_or_first_bit: u8,
}

impl DataType {
    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    fn has_replacement(&self) -> bool {
        self.kind != BaseKind::Num || self.replacement != self.min_value_or_length
    }
}

const MAX_LEN_BITS: u8 = 128;

static DATA_TYPES: &[DataType] = &[
    DataType { name: "IGN", max_bits: MAX_LEN_BITS, kind: BaseKind::Str, flags: ADJ | IGN, replacement: 0x00, min_value_or_length: 1, max_value_or_length: 16, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "STR", max_bits: MAX_LEN_BITS, kind: BaseKind::Str, flags: ADJ, replacement: 0x20, min_value_or_length: 1, max_value_or_length: 16, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "HEX", max_bits: MAX_LEN_BITS, kind: BaseKind::HexStr, flags: ADJ, replacement: 0x00, min_value_or_length: 1, max_value_or_length: 16, divisor: 1, precision_or_first_bit: 0 },
    // date dd mm wd yy, BCD
    DataType { name: "BDA", max_bits: 32, kind: BaseKind::Date, flags: BCD, replacement: 0xFF, min_value_or_length: 4, max_value_or_length: 4, divisor: 1, precision_or_first_bit: 0 },
    // date dd mm yy, binary
    DataType { name: "HDA", max_bits: 24, kind: BaseKind::Date, flags: 0, replacement: 0xFF, min_value_or_length: 3, max_value_or_length: 3, divisor: 1, precision_or_first_bit: 0 },
    // time ss mm hh, BCD
    DataType { name: "BTI", max_bits: 24, kind: BaseKind::Time, flags: BCD | REV, replacement: 0xFF, min_value_or_length: 3, max_value_or_length: 3, divisor: 1, precision_or_first_bit: 0 },
    // time hh mm ss, binary
    DataType { name: "HTI", max_bits: 24, kind: BaseKind::Time, flags: 0, replacement: 0xFF, min_value_or_length: 3, max_value_or_length: 3, divisor: 1, precision_or_first_bit: 0 },
    // time ss mm hh, binary
    DataType { name: "VTI", max_bits: 24, kind: BaseKind::Time, flags: REV, replacement: 0xFF, min_value_or_length: 3, max_value_or_length: 3, divisor: 1, precision_or_first_bit: 0 },
    // truncated time, 10 minute units
    DataType { name: "TTM", max_bits: 8, kind: BaseKind::Time, flags: 0, replacement: 0xFF, min_value_or_length: 1, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 0 },
    // minutes since midnight
    DataType { name: "MIN", max_bits: 16, kind: BaseKind::Time, flags: 0, replacement: 0xFFFF, min_value_or_length: 2, max_value_or_length: 2, divisor: 1, precision_or_first_bit: 0 },
    // weekday
    DataType { name: "BDY", max_bits: 8, kind: BaseKind::Num, flags: DAY | LST, replacement: 0xFF, min_value_or_length: 0, max_value_or_length: 6, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "BCD", max_bits: 8, kind: BaseKind::Num, flags: BCD, replacement: 0xFF, min_value_or_length: 0, max_value_or_length: 0x99, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "PIN", max_bits: 16, kind: BaseKind::Num, flags: BCD | REV, replacement: 0xFFFF, min_value_or_length: 0, max_value_or_length: 0x9999, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "UCH", max_bits: 8, kind: BaseKind::Num, flags: LST, replacement: 0xFF, min_value_or_length: 0, max_value_or_length: 0xFE, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "SCH", max_bits: 8, kind: BaseKind::Num, flags: SIG, replacement: 0x80, min_value_or_length: 0x81, max_value_or_length: 0x7F, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "D1B", max_bits: 8, kind: BaseKind::Num, flags: SIG, replacement: 0x80, min_value_or_length: 0x81, max_value_or_length: 0x7F, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "D1C", max_bits: 8, kind: BaseKind::Num, flags: 0, replacement: 0xFF, min_value_or_length: 0x00, max_value_or_length: 0xC8, divisor: 2, precision_or_first_bit: 1 },
    DataType { name: "D2B", max_bits: 16, kind: BaseKind::Num, flags: SIG, replacement: 0x8000, min_value_or_length: 0x8001, max_value_or_length: 0x7FFF, divisor: 256, precision_or_first_bit: 3 },
    DataType { name: "D2C", max_bits: 16, kind: BaseKind::Num, flags: SIG, replacement: 0x8000, min_value_or_length: 0x8001, max_value_or_length: 0x7FFF, divisor: 16, precision_or_first_bit: 2 },
    DataType { name: "UIN", max_bits: 16, kind: BaseKind::Num, flags: LST, replacement: 0xFFFF, min_value_or_length: 0, max_value_or_length: 0xFFFE, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "SIN", max_bits: 16, kind: BaseKind::Num, flags: SIG, replacement: 0x8000, min_value_or_length: 0x8001, max_value_or_length: 0x7FFF, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "ULG", max_bits: 32, kind: BaseKind::Num, flags: 0, replacement: 0xFFFF_FFFF, min_value_or_length: 0, max_value_or_length: 0xFFFF_FFFE, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "SLG", max_bits: 32, kind: BaseKind::Num, flags: SIG, replacement: 0x8000_0000, min_value_or_length: 0x8000_0001, max_value_or_length: 0x7FFF_FFFF, divisor: 1, precision_or_first_bit: 0 },
    // sub-byte bit fields, length in bits via the length suffix
    DataType { name: "BI0", max_bits: 7, kind: BaseKind::Num, flags: ADJ | LST, replacement: 0, min_value_or_length: 0, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 0 },
    DataType { name: "BI1", max_bits: 7, kind: BaseKind::Num, flags: ADJ | LST, replacement: 0, min_value_or_length: 0, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 1 },
    DataType { name: "BI2", max_bits: 7, kind: BaseKind::Num, flags: ADJ | LST, replacement: 0, min_value_or_length: 0, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 2 },
    DataType { name: "BI3", max_bits: 7, kind: BaseKind::Num, flags: ADJ | LST, replacement: 0, min_value_or_length: 0, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 3 },
    DataType { name: "BI4", max_bits: 7, kind: BaseKind::Num, flags: ADJ | LST, replacement: 0, min_value_or_length: 0, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 4 },
    DataType { name: "BI5", max_bits: 7, kind: BaseKind::Num, flags: ADJ | LST, replacement: 0, min_value_or_length: 0, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 5 },
    DataType { name: "BI6", max_bits: 7, kind: BaseKind::Num, flags: ADJ | LST, replacement: 0, min_value_or_length: 0, max_value_or_length: 1, divisor: 1, precision_or_first_bit: 6 },
];

pub fn base_type(name: &str) -> Option<&'static DataType> {
    DATA_TYPES.iter().find(|t| t.name == name)
}

fn weekday_values() -> BTreeMap<u32, String> {
    ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
        .iter()
        .enumerate()
        .map(|(i, name)| (i as u32, (*name).to_string()))
        .collect()
}

/// Attributes shared by every field variant.
#[derive(Debug, Clone)]
pub struct FieldHeader {
    pub name: String,
    pub part: PartType,
    pub comment: String,
    pub unit: String,
}

#[derive(Debug, Clone)]
pub struct StringField {
    pub header: FieldHeader,
    pub ty: &'static DataType,
    pub length: u8,
}

#[derive(Debug, Clone)]
pub struct NumberField {
    pub header: FieldHeader,
    pub ty: &'static DataType,
    pub length: u8,
    pub bit_count: u8,
    pub bit_offset: u8,
    /// Combined divisor; negative values divide by the reciprocal,
    /// i.e. multiply by the absolute value.
    pub divisor: i32,
}

#[derive(Debug, Clone)]
pub struct ValueListField {
    pub header: FieldHeader,
    pub ty: &'static DataType,
    pub length: u8,
    pub bit_count: u8,
    pub bit_offset: u8,
    pub values: BTreeMap<u32, String>,
}

/// A single typed field.
#[derive(Debug, Clone)]
pub enum SingleField {
    Str(StringField),
    Num(NumberField),
    List(ValueListField),
}

/// An ordered composition of single fields.
#[derive(Debug, Clone)]
pub struct FieldSet {
    pub fields: Vec<SingleField>,
}

/// A field definition: either one field or an ordered set.
#[derive(Debug, Clone)]
pub enum DataField {
    Single(SingleField),
    Set(FieldSet),
}

impl SingleField {
    pub fn header(&self) -> &FieldHeader {
        match self {
            SingleField::Str(f) => &f.header,
            SingleField::Num(f) => &f.header,
            SingleField::List(f) => &f.header,
        }
    }

    fn header_mut(&mut self) -> &mut FieldHeader {
        match self {
            SingleField::Str(f) => &mut f.header,
            SingleField::Num(f) => &mut f.header,
            SingleField::List(f) => &mut f.header,
        }
    }

    pub fn ty(&self) -> &'static DataType {
        match self {
            SingleField::Str(f) => f.ty,
            SingleField::Num(f) => f.ty,
            SingleField::List(f) => f.ty,
        }
    }

    /// The number of bytes this field occupies in its part.
    pub fn length(&self) -> u8 {
        match self {
            SingleField::Str(f) => f.length,
            SingleField::Num(f) => f.length,
            SingleField::List(f) => f.length,
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.ty().has_flag(IGN)
    }

    pub fn get_length(&self, part: PartType) -> u8 {
        if self.header().part == part {
            self.length()
        } else {
            0
        }
    }

    /// Whether this field occupies its byte completely. Sub-byte fields
    /// keep the offset in place so the next field can share the byte,
    /// until the combined bits reach the byte boundary.
    pub fn has_full_byte_offset(&self, after: bool) -> bool {
        let (bit_count, bit_offset) = match self {
            SingleField::Str(_) => return true,
            SingleField::Num(f) => (f.bit_count, f.bit_offset),
            SingleField::List(f) => (f.bit_count, f.bit_offset),
        };
        self.length() > 1
            || bit_count % 8 == 0
            || (after && bit_offset + bit_count >= 8)
    }

    fn advance(&self, part: PartType) -> usize {
        if self.header().part == part && self.has_full_byte_offset(true) {
            self.length() as usize
        } else {
            0
        }
    }

    /// Formats the field value read from `data` at `offset` (relative to
    /// the part's data section). Returns whether output was produced.
    pub fn read(
        &self,
        part: PartType,
        data: &SymbolString,
        offset: usize,
        output: &mut String,
        leading_sep: bool,
        verbose: bool,
        sep: char,
    ) -> Result<bool> {
        let header = self.header();
        if header.part != part || self.is_ignored() {
            return Ok(false);
        }
        if leading_sep {
            output.push(sep);
        }
        if verbose {
            let _ = write!(output, "{}=", header.name);
        }
        let pos = part.base_offset() + offset;
        match self {
            SingleField::Str(f) => f.read_symbols(data, pos, output)?,
            SingleField::Num(f) => f.read_symbols(data, pos, output)?,
            SingleField::List(f) => f.read_symbols(data, pos, output)?,
        }
        if verbose {
            if !header.unit.is_empty() {
                let _ = write!(output, " {}", header.unit);
            }
            if !header.comment.is_empty() {
                let _ = write!(output, " [{}]", header.comment);
            }
        }
        Ok(true)
    }

    /// Writes the formatted `input` into `data` at `offset` (relative to
    /// the part's data section). An empty input or the null sentinel
    /// writes the replacement value.
    pub fn write(
        &self,
        input: &str,
        part: PartType,
        data: &mut SymbolString,
        offset: usize,
    ) -> Result<()> {
        if self.header().part != part {
            return Ok(());
        }
        let pos = part.base_offset() + offset;
        let input = if self.is_ignored() { "" } else { input.trim() };
        match self {
            SingleField::Str(f) => f.write_symbols(input, pos, data),
            SingleField::Num(f) => f.write_symbols(input, pos, data),
            SingleField::List(f) => f.write_symbols(input, pos, data),
        }
    }

    /// Clones this field with the given overrides applied. Empty override
    /// attributes keep the field's own; a divisor combines multiplicatively;
    /// a value list requires the `LST` flag.
    pub fn derive(
        &self,
        name: &str,
        comment: &str,
        unit: &str,
        part: PartType,
        divisor: i32,
        values: &BTreeMap<u32, String>,
    ) -> Result<SingleField> {
        let mut derived = match self {
            SingleField::Str(_) | SingleField::List(_) if divisor != 1 => {
                return Err(Error::InvalidArg);
            }
            SingleField::Str(_) if !values.is_empty() => return Err(Error::InvalidArg),
            SingleField::Str(_) => self.clone(),
            SingleField::Num(f) => {
                if values.is_empty() {
                    SingleField::Num(NumberField {
                        divisor: combine_divisors(f.divisor, divisor)?,
                        ..f.clone()
                    })
                } else {
                    ensure!(f.ty.has_flag(LST), crate::result::InvalidArgSnafu);
                    SingleField::List(ValueListField {
                        header: f.header.clone(),
                        ty: f.ty,
                        length: f.length,
                        bit_count: f.bit_count,
                        bit_offset: f.bit_offset,
                        values: values.clone(),
                    })
                }
            }
            SingleField::List(f) => {
                if values.is_empty() {
                    self.clone()
                } else {
                    SingleField::List(ValueListField {
                        values: values.clone(),
                        ..f.clone()
                    })
                }
            }
        };
        {
            let header = derived.header_mut();
            if !name.is_empty() {
                header.name = name.to_string();
            }
            if !comment.is_empty() {
                header.comment = comment.to_string();
            }
            if !unit.is_empty() {
                header.unit = unit.to_string();
            }
            if part != PartType::Any {
                header.part = part;
            }
        }
        Ok(derived)
    }
}

impl StringField {
    fn check_replacement(&self, data: &SymbolString, pos: usize) -> Result<bool> {
        let mut all = true;
        for i in 0..self.length as usize {
            let byte = data.get(pos + i).ok_or(Error::InvalidArg)?;
            all &= u32::from(byte) == self.ty.replacement;
        }
        Ok(all)
    }

    fn read_symbols(&self, data: &SymbolString, pos: usize, output: &mut String) -> Result<()> {
        // dates and times use the replacement as their unset marker
        if matches!(self.ty.kind, BaseKind::Date | BaseKind::Time)
            && self.check_replacement(data, pos)?
        {
            output.push_str(NULL_VALUE);
            return Ok(());
        }
        let byte_at = |i: usize| data.get(pos + i).ok_or(Error::InvalidArg);
        match self.ty.kind {
            BaseKind::Str => {
                let mut text = String::new();
                for i in 0..self.length as usize {
                    let byte = byte_at(i)?;
                    ensure!((0x20..=0x7E).contains(&byte), crate::result::OutOfRangeSnafu);
                    text.push(byte as char);
                }
                output.push_str(text.trim_end_matches(self.ty.replacement as u8 as char));
            }
            BaseKind::HexStr => {
                for i in 0..self.length as usize {
                    let _ = write!(output, "{:02x}", byte_at(i)?);
                }
            }
            BaseKind::Date => {
                let decode = |byte| {
                    if self.ty.has_flag(BCD) {
                        from_bcd_byte(byte)
                    } else {
                        Ok(u32::from(byte))
                    }
                };
                let day = decode(byte_at(0)?)?;
                let month = decode(byte_at(1)?)?;
                // a BCD date carries the weekday before the year
                let year = decode(byte_at(self.length as usize - 1)?)?;
                ensure!(
                    (1..=31).contains(&day) && (1..=12).contains(&month) && year <= 99,
                    crate::result::OutOfRangeSnafu
                );
                let _ = write!(output, "{day:02}.{month:02}.{}", 2000 + year);
            }
            BaseKind::Time => {
                let (hour, minute, second) = match self.length {
                    1 => {
                        let minutes = u32::from(byte_at(0)?) * 10;
                        (minutes / 60, minutes % 60, None)
                    }
                    2 => {
                        let minutes =
                            u32::from(byte_at(0)?) | u32::from(byte_at(1)?) << 8;
                        (minutes / 60, minutes % 60, None)
                    }
                    _ => {
                        let decode = |byte| {
                            if self.ty.has_flag(BCD) {
                                from_bcd_byte(byte)
                            } else {
                                Ok(u32::from(byte))
                            }
                        };
                        // REV variants store seconds first
                        let (h, m, s) = if self.ty.has_flag(REV) {
                            (byte_at(2)?, byte_at(1)?, byte_at(0)?)
                        } else {
                            (byte_at(0)?, byte_at(1)?, byte_at(2)?)
                        };
                        (decode(h)?, decode(m)?, Some(decode(s)?))
                    }
                };
                ensure!(
                    hour < 24 && minute < 60 && second.unwrap_or(0) < 60,
                    crate::result::OutOfRangeSnafu
                );
                match second {
                    Some(second) => {
                        let _ = write!(output, "{hour:02}:{minute:02}:{second:02}");
                    }
                    None => {
                        let _ = write!(output, "{hour:02}:{minute:02}");
                    }
                }
            }
            BaseKind::Num => return Err(Error::InvalidArg),
        }
        Ok(())
    }

    fn write_symbols(&self, input: &str, pos: usize, data: &mut SymbolString) -> Result<()> {
        if input.is_empty() || input == NULL_VALUE {
            for i in 0..self.length as usize {
                data.write_at(pos + i, self.ty.replacement as u8)?;
            }
            return Ok(());
        }
        let encode = |value: u32| -> Result<u8> {
            if self.ty.has_flag(BCD) {
                to_bcd_byte(value)
            } else {
                Ok(value as u8)
            }
        };
        match self.ty.kind {
            BaseKind::Str => {
                ensure!(input.len() <= self.length as usize, crate::result::OutOfRangeSnafu);
                ensure!(input.is_ascii(), crate::result::InvalidArgSnafu);
                let bytes = input.as_bytes();
                for i in 0..self.length as usize {
                    let byte = bytes.get(i).copied().unwrap_or(self.ty.replacement as u8);
                    data.write_at(pos + i, byte)?;
                }
            }
            BaseKind::HexStr => {
                let parsed = SymbolString::parse_hex(input)?;
                ensure!(
                    parsed.len() == self.length as usize,
                    crate::result::OutOfRangeSnafu
                );
                for i in 0..parsed.len() {
                    data.write_at(pos + i, parsed[i])?;
                }
            }
            BaseKind::Date => {
                let mut parts = input.split('.');
                let day: u32 = parse_dec(parts.next())?;
                let month: u32 = parse_dec(parts.next())?;
                let year: u32 = parse_dec(parts.next())?;
                ensure!(parts.next().is_none(), crate::result::InvalidArgSnafu);
                ensure!(
                    (1..=31).contains(&day) && (1..=12).contains(&month) && (2000..=2099).contains(&year),
                    crate::result::OutOfRangeSnafu
                );
                data.write_at(pos, encode(day)?)?;
                data.write_at(pos + 1, encode(month)?)?;
                if self.length == 4 {
                    data.write_at(pos + 2, encode(weekday(year, month, day))?)?;
                }
                data.write_at(pos + self.length as usize - 1, encode(year - 2000)?)?;
            }
            BaseKind::Time => {
                let mut parts = input.split(':');
                let hour: u32 = parse_dec(parts.next())?;
                let minute: u32 = parse_dec(parts.next())?;
                let second: u32 = match parts.next() {
                    Some(s) => parse_dec(Some(s))?,
                    None => 0,
                };
                ensure!(parts.next().is_none(), crate::result::InvalidArgSnafu);
                ensure!(
                    hour < 24 && minute < 60 && second < 60,
                    crate::result::OutOfRangeSnafu
                );
                match self.length {
                    1 => {
                        let minutes = hour * 60 + minute;
                        ensure!(minutes % 10 == 0, crate::result::OutOfRangeSnafu);
                        data.write_at(pos, (minutes / 10) as u8)?;
                    }
                    2 => {
                        let minutes = hour * 60 + minute;
                        data.write_at(pos, minutes as u8)?;
                        data.write_at(pos + 1, (minutes >> 8) as u8)?;
                    }
                    _ => {
                        let bytes = if self.ty.has_flag(REV) {
                            [second, minute, hour]
                        } else {
                            [hour, minute, second]
                        };
                        for (i, value) in bytes.iter().enumerate() {
                            data.write_at(pos + i, encode(*value)?)?;
                        }
                    }
                }
            }
            BaseKind::Num => return Err(Error::InvalidArg),
        }
        Ok(())
    }
}

impl NumberField {
    fn read_raw(&self, data: &SymbolString, pos: usize) -> Result<u32> {
        read_raw_value(data, pos, self.length, self.bit_count, self.bit_offset, self.ty)
    }

    fn read_symbols(&self, data: &SymbolString, pos: usize, output: &mut String) -> Result<()> {
        let raw = self.read_raw(data, pos)?;
        if self.ty.has_replacement() && raw == self.ty.replacement {
            output.push_str(NULL_VALUE);
            return Ok(());
        }
        let value = if self.ty.has_flag(BCD) {
            i64::from(from_bcd_value(raw, self.length)?)
        } else if self.ty.has_flag(SIG) {
            sign_extend(raw, self.bit_count)
        } else {
            i64::from(raw)
        };
        format_scaled(output, value, self.divisor);
        Ok(())
    }

    fn write_symbols(&self, input: &str, pos: usize, data: &mut SymbolString) -> Result<()> {
        let raw = if input.is_empty() || input == NULL_VALUE {
            ensure!(self.ty.has_replacement(), crate::result::InvalidArgSnafu);
            self.ty.replacement
        } else {
            let parsed: f64 = input.parse().map_err(|_| Error::InvalidArg)?;
            let value = if self.divisor > 1 {
                parsed * f64::from(self.divisor)
            } else if self.divisor < 0 {
                parsed / f64::from(-self.divisor)
            } else {
                parsed
            };
            let value = value.round() as i64;
            self.raw_from_value(value)?
        };
        write_raw_value(data, pos, self.length, self.bit_count, self.bit_offset, self.ty, raw)
    }

    fn raw_from_value(&self, value: i64) -> Result<u32> {
        if self.ty.has_flag(BCD) {
            let max = 10i64.pow(2 * u32::from(self.length)) - 1;
            ensure!((0..=max).contains(&value), crate::result::OutOfRangeSnafu);
            to_bcd_value(value as u32, self.length)
        } else if self.ty.has_flag(SIG) {
            let min = sign_extend(self.ty.min_value_or_length, self.bit_count);
            let max = sign_extend(self.ty.max_value_or_length, self.bit_count);
            ensure!((min..=max).contains(&value), crate::result::OutOfRangeSnafu);
            Ok((value as u32) & mask(self.bit_count))
        } else {
            ensure!(
                value >= i64::from(self.ty.min_value_or_length)
                    && value <= i64::from(self.ty.max_value_or_length),
                crate::result::OutOfRangeSnafu
            );
            Ok(value as u32)
        }
    }
}

impl ValueListField {
    fn read_symbols(&self, data: &SymbolString, pos: usize, output: &mut String) -> Result<()> {
        let raw =
            read_raw_value(data, pos, self.length, self.bit_count, self.bit_offset, self.ty)?;
        if self.ty.has_replacement() && raw == self.ty.replacement {
            output.push_str(NULL_VALUE);
            return Ok(());
        }
        match self.values.get(&raw) {
            Some(label) => {
                output.push_str(label);
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    fn write_symbols(&self, input: &str, pos: usize, data: &mut SymbolString) -> Result<()> {
        let raw = if input.is_empty() || input == NULL_VALUE {
            ensure!(self.ty.has_replacement(), crate::result::InvalidArgSnafu);
            self.ty.replacement
        } else {
            // exact match only
            *self
                .values
                .iter()
                .find(|(_, label)| label.as_str() == input)
                .map(|(raw, _)| raw)
                .ok_or(Error::NotFound)?
        };
        write_raw_value(data, pos, self.length, self.bit_count, self.bit_offset, self.ty, raw)
    }
}

impl FieldSet {
    pub fn get_length(&self, part: PartType) -> u8 {
        let mut offset = 0usize;
        let mut end = 0usize;
        for field in &self.fields {
            if field.header().part == part {
                end = end.max(offset + field.length() as usize);
            }
            offset += field.advance(part);
        }
        end as u8
    }

    pub fn read(
        &self,
        part: PartType,
        data: &SymbolString,
        offset: usize,
        output: &mut String,
        leading_sep: bool,
        verbose: bool,
        sep: char,
    ) -> Result<bool> {
        let mut offset = offset;
        let mut leading = leading_sep;
        let mut any = false;
        for field in &self.fields {
            if field.read(part, data, offset, output, leading, verbose, sep)? {
                leading = true;
                any = true;
            }
            offset += field.advance(part);
        }
        Ok(any)
    }

    pub fn write(
        &self,
        input: &str,
        part: PartType,
        data: &mut SymbolString,
        offset: usize,
        sep: char,
    ) -> Result<()> {
        let mut tokens = input.split(sep);
        let mut offset = offset;
        for field in &self.fields {
            let token = if field.header().part != part || field.is_ignored() {
                ""
            } else {
                tokens.next().unwrap_or("")
            };
            field.write(token, part, data, offset)?;
            offset += field.advance(part);
        }
        Ok(())
    }
}

impl DataField {
    pub fn name(&self) -> &str {
        match self {
            DataField::Single(f) => &f.header().name,
            DataField::Set(s) => s
                .fields
                .first()
                .map(|f| f.header().name.as_str())
                .unwrap_or(""),
        }
    }

    pub fn get_length(&self, part: PartType) -> u8 {
        match self {
            DataField::Single(f) => f.get_length(part),
            DataField::Set(s) => s.get_length(part),
        }
    }

    pub fn read(
        &self,
        part: PartType,
        data: &SymbolString,
        offset: usize,
        output: &mut String,
        leading_sep: bool,
        verbose: bool,
        sep: char,
    ) -> Result<bool> {
        match self {
            DataField::Single(f) => f.read(part, data, offset, output, leading_sep, verbose, sep),
            DataField::Set(s) => s.read(part, data, offset, output, leading_sep, verbose, sep),
        }
    }

    pub fn write(
        &self,
        input: &str,
        part: PartType,
        data: &mut SymbolString,
        offset: usize,
        sep: char,
    ) -> Result<()> {
        match self {
            DataField::Single(f) => f.write(input, part, data, offset),
            DataField::Set(s) => s.write(input, part, data, offset, sep),
        }
    }

    pub fn derive(
        &self,
        name: &str,
        comment: &str,
        unit: &str,
        part: PartType,
        divisor: i32,
        values: &BTreeMap<u32, String>,
    ) -> Result<Vec<SingleField>> {
        match self {
            DataField::Single(f) => Ok(vec![f.derive(name, comment, unit, part, divisor, values)?]),
            DataField::Set(s) => {
                ensure!(
                    values.is_empty() || s.fields.len() == 1,
                    crate::result::InvalidArgSnafu
                );
                let single = s.fields.len() == 1;
                s.fields
                    .iter()
                    .map(|f| {
                        if single {
                            f.derive(name, comment, unit, part, divisor, values)
                        } else {
                            f.derive("", "", "", part, divisor, values)
                        }
                    })
                    .collect()
            }
        }
    }

    /// Builds a field definition from CSV cells, six per field:
    /// `name, part, type[:length], divisor|values, unit, comment`.
    /// `type` names a base type or a template. `dst` is `SYN` when a
    /// template is being defined, leaving unspecified parts unresolved.
    pub fn create(
        cells: &[String],
        templates: &DataFieldTemplates,
        is_set: bool,
        dst: u8,
    ) -> Result<DataField> {
        let mut singles: Vec<SingleField> = Vec::new();
        for chunk in cells.chunks(6) {
            if chunk.iter().all(|c| c.is_empty()) {
                continue;
            }
            let cell = |i: usize| chunk.get(i).map(String::as_str).unwrap_or("");
            let name = cell(0);
            let part = parse_part(cell(1), is_set, dst)?;
            let type_spec = cell(2);
            ensure!(!type_spec.is_empty(), crate::result::InvalidArgSnafu);
            let (type_name, explicit_len) = grammar::type_spec(type_spec)?;
            let (divisor, values) = parse_divisor_or_values(cell(3))?;
            let unit = cell(4);
            let comment = cell(5);

            if let Some(ty) = base_type(type_name) {
                singles.push(build_single(
                    ty,
                    FieldHeader {
                        name: name.to_string(),
                        part,
                        comment: comment.to_string(),
                        unit: unit.to_string(),
                    },
                    explicit_len,
                    divisor,
                    values,
                )?);
            } else if let Some(template) = templates.get(type_name) {
                ensure!(explicit_len.is_none(), crate::result::InvalidArgSnafu);
                singles.extend(template.derive(name, comment, unit, part, divisor, &values)?);
            } else {
                return Err(Error::NotFound);
            }
        }
        match singles.len() {
            0 => Err(Error::Eof),
            1 => Ok(DataField::Single(singles.remove(0))),
            _ => Ok(DataField::Set(FieldSet { fields: singles })),
        }
    }
}

fn parse_part(cell: &str, is_set: bool, dst: u8) -> Result<PartType> {
    match cell.to_ascii_lowercase().as_str() {
        "m" => Ok(PartType::MasterData),
        "s" => Ok(PartType::SlaveData),
        "" => {
            if dst == SYN {
                Ok(PartType::Any)
            } else if is_set || dst == BROADCAST || is_master(dst) {
                Ok(PartType::MasterData)
            } else {
                Ok(PartType::SlaveData)
            }
        }
        _ => Err(Error::InvalidArg),
    }
}

fn parse_divisor_or_values(cell: &str) -> Result<(i32, BTreeMap<u32, String>)> {
    if cell.is_empty() {
        Ok((1, BTreeMap::new()))
    } else if cell.contains('=') {
        Ok((1, grammar::value_list(cell)?))
    } else {
        let divisor: i32 = cell.parse().map_err(|_| Error::InvalidArg)?;
        ensure!(divisor != 0, crate::result::InvalidArgSnafu);
        Ok((divisor, BTreeMap::new()))
    }
}

fn build_single(
    ty: &'static DataType,
    header: FieldHeader,
    explicit_len: Option<u8>,
    divisor: i32,
    values: BTreeMap<u32, String>,
) -> Result<SingleField> {
    if ty.max_bits < 8 {
        // sub-byte field; the length suffix selects the bit count
        let bit_count = explicit_len.unwrap_or(1);
        ensure!(
            bit_count >= 1 && ty.precision_or_first_bit + bit_count <= 8,
            crate::result::OutOfRangeSnafu
        );
        ensure!(divisor == 1, crate::result::InvalidArgSnafu);
        if values.is_empty() {
            return Ok(SingleField::Num(NumberField {
                header,
                ty,
                length: 1,
                bit_count,
                bit_offset: ty.precision_or_first_bit,
                divisor: 1,
            }));
        }
        return Ok(SingleField::List(ValueListField {
            header,
            ty,
            length: 1,
            bit_count,
            bit_offset: ty.precision_or_first_bit,
            values,
        }));
    }

    let length = if ty.has_flag(ADJ) {
        let length = explicit_len.unwrap_or(ty.max_value_or_length as u8);
        ensure!(
            u32::from(length) >= ty.min_value_or_length
                && u32::from(length) <= ty.max_value_or_length,
            crate::result::OutOfRangeSnafu
        );
        length
    } else {
        let length = ty.max_bits / 8;
        ensure!(
            explicit_len.is_none() || explicit_len == Some(length),
            crate::result::InvalidArgSnafu
        );
        length
    };

    match ty.kind {
        BaseKind::Num => {
            let bit_count = length * 8;
            let values = if values.is_empty() && ty.has_flag(DAY) {
                weekday_values()
            } else {
                values
            };
            if values.is_empty() {
                Ok(SingleField::Num(NumberField {
                    header,
                    ty,
                    length,
                    bit_count,
                    bit_offset: 0,
                    divisor: combine_divisors(ty.divisor, divisor)?,
                }))
            } else {
                ensure!(
                    ty.has_flag(LST) && divisor == 1,
                    crate::result::InvalidArgSnafu
                );
                Ok(SingleField::List(ValueListField {
                    header,
                    ty,
                    length,
                    bit_count,
                    bit_offset: 0,
                    values,
                }))
            }
        }
        _ => {
            ensure!(
                divisor == 1 && values.is_empty(),
                crate::result::InvalidArgSnafu
            );
            Ok(SingleField::Str(StringField { header, ty, length }))
        }
    }
}

/// Combines two divisors multiplicatively; negative means "multiply by the
/// absolute value", so mixed signs cancel where they divide evenly.
fn combine_divisors(a: i32, b: i32) -> Result<i32> {
    ensure!(a != 0 && b != 0, crate::result::InvalidArgSnafu);
    if a == 1 {
        return Ok(b);
    }
    if b == 1 {
        return Ok(a);
    }
    let combined = match (a > 0, b > 0) {
        (true, true) => a.checked_mul(b),
        (false, false) => a.checked_mul(-b),
        (true, false) | (false, true) => {
            let (div, mul) = if a > 0 { (a, -b) } else { (b, -a) };
            if div % mul == 0 {
                Some(div / mul)
            } else if mul % div == 0 {
                Some(-(mul / div))
            } else {
                None
            }
        }
    };
    combined.filter(|&d| d != 0).ok_or(Error::InvalidArg)
}

fn mask(bit_count: u8) -> u32 {
    if bit_count >= 32 {
        u32::MAX
    } else {
        (1u32 << bit_count) - 1
    }
}

fn sign_extend(raw: u32, bit_count: u8) -> i64 {
    let raw = i64::from(raw & mask(bit_count));
    if bit_count < 64 && raw & (1 << (bit_count - 1)) != 0 {
        raw - (1i64 << bit_count)
    } else {
        raw
    }
}

fn from_bcd_byte(byte: u8) -> Result<u32> {
    let high = u32::from(byte >> 4);
    let low = u32::from(byte & 0x0F);
    ensure!(high <= 9 && low <= 9, crate::result::OutOfRangeSnafu);
    Ok(high * 10 + low)
}

fn to_bcd_byte(value: u32) -> Result<u8> {
    ensure!(value <= 99, crate::result::OutOfRangeSnafu);
    Ok(((value / 10) << 4 | value % 10) as u8)
}

fn from_bcd_value(raw: u32, length: u8) -> Result<u32> {
    let mut value = 0;
    for i in (0..length).rev() {
        let byte = (raw >> (8 * i)) as u8;
        value = value * 100 + from_bcd_byte(byte)?;
    }
    Ok(value)
}

fn to_bcd_value(value: u32, length: u8) -> Result<u32> {
    let mut raw = 0u32;
    let mut rest = value;
    for i in 0..length {
        raw |= u32::from(to_bcd_byte(rest % 100)?) << (8 * i);
        rest /= 100;
    }
    ensure!(rest == 0, crate::result::OutOfRangeSnafu);
    Ok(raw)
}

fn read_raw_value(
    data: &SymbolString,
    pos: usize,
    length: u8,
    bit_count: u8,
    bit_offset: u8,
    ty: &DataType,
) -> Result<u32> {
    let mut raw: u32 = 0;
    if ty.has_flag(REV) {
        for i in 0..length as usize {
            raw = raw << 8 | u32::from(data.get(pos + i).ok_or(Error::InvalidArg)?);
        }
    } else {
        for i in (0..length as usize).rev() {
            raw = raw << 8 | u32::from(data.get(pos + i).ok_or(Error::InvalidArg)?);
        }
    }
    if bit_count < 8 {
        raw = raw >> bit_offset & mask(bit_count);
    }
    Ok(raw)
}

fn write_raw_value(
    data: &mut SymbolString,
    pos: usize,
    length: u8,
    bit_count: u8,
    bit_offset: u8,
    ty: &DataType,
    raw: u32,
) -> Result<()> {
    if bit_count < 8 {
        // merge into the shared byte
        let existing = data.get(pos).unwrap_or(0);
        let merged = existing | ((raw & mask(bit_count)) as u8) << bit_offset;
        data.write_at(pos, merged)?;
        return Ok(());
    }
    for i in 0..length as usize {
        let shift = if ty.has_flag(REV) {
            8 * (length as usize - 1 - i)
        } else {
            8 * i
        };
        data.write_at(pos + i, (raw >> shift) as u8)?;
    }
    Ok(())
}

fn format_scaled(output: &mut String, value: i64, divisor: i32) {
    if divisor > 1 {
        let mut precision = 0usize;
        let mut scale = 1i64;
        while scale < i64::from(divisor) {
            scale *= 10;
            precision += 1;
        }
        let _ = write!(output, "{:.*}", precision, value as f64 / f64::from(divisor));
    } else if divisor < 0 {
        let _ = write!(output, "{}", value * i64::from(-divisor));
    } else {
        let _ = write!(output, "{value}");
    }
}

fn parse_dec(part: Option<&str>) -> Result<u32> {
    part.ok_or(Error::InvalidArg)?
        .trim()
        .parse()
        .map_err(|_| Error::InvalidArg)
}

/// ISO weekday, 1 = Monday .. 7 = Sunday.
fn weekday(year: u32, month: u32, day: u32) -> u32 {
    // Zeller, with January and February as months 13 and 14
    let (year, month) = if month < 3 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };
    let k = year % 100;
    let j = year / 100;
    let h = (day + 13 * (month + 1) / 5 + k + k / 4 + j / 4 + 5 * j) % 7;
    (h + 5) % 7 + 1
}

/// The named field templates loaded from `_types.csv`.
#[derive(Debug, Default)]
pub struct DataFieldTemplates {
    fields_by_name: HashMap<String, DataField>,
}

impl DataFieldTemplates {
    pub fn new() -> Self {
        DataFieldTemplates::default()
    }

    pub fn add(&mut self, field: DataField, replace: bool) -> Result<()> {
        let name = field.name().to_string();
        ensure!(!name.is_empty(), crate::result::InvalidArgSnafu);
        if !replace && self.fields_by_name.contains_key(&name) {
            return Err(Error::Duplicate);
        }
        self.fields_by_name.insert(name, field);
        Ok(())
    }

    pub fn add_from_row(&mut self, row: &[String]) -> Result<()> {
        let field = DataField::create(row, self, false, SYN)?;
        self.add(field, false)
    }

    pub fn get(&self, name: &str) -> Option<&DataField> {
        self.fields_by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields_by_name.is_empty()
    }
}

mod grammar {
    //! nom grammars for the small languages inside CSV cells.

    use super::{Error, Result};
    use nom::bytes::complete::{take_while1, take_while_m_n};
    use nom::character::complete::{char, digit1, space0};
    use nom::combinator::{all_consuming, map_res, opt};
    use nom::multi::{many1, separated_list1};
    use nom::sequence::{preceded, separated_pair, terminated};
    use nom::IResult;
    use std::collections::BTreeMap;

    fn hex_byte(input: &str) -> IResult<&str, u8> {
        map_res(
            take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
            |s: &str| u8::from_str_radix(s, 16),
        )(input)
    }

    /// A run of hex byte pairs, whitespace tolerated between pairs.
    pub fn hex_bytes(input: &str) -> Result<Vec<u8>> {
        let parsed: IResult<&str, Vec<u8>> =
            all_consuming(terminated(many1(preceded(space0, hex_byte)), space0))(input);
        parsed.map(|(_, bytes)| bytes).map_err(|_| Error::InvalidArg)
    }

    /// `TYPE` or `TYPE:length`.
    pub fn type_spec(input: &str) -> Result<(&str, Option<u8>)> {
        let parsed: IResult<&str, (&str, Option<u8>)> = all_consuming(separated_pair_opt)(input);
        parsed.map(|(_, spec)| spec).map_err(|_| Error::InvalidArg)
    }

    fn separated_pair_opt(input: &str) -> IResult<&str, (&str, Option<u8>)> {
        let (input, name) = take_while1(|c| c != ':')(input)?;
        let (input, length) = opt(preceded(char(':'), map_res(digit1, str::parse::<u8>)))(input)?;
        Ok((input, (name, length)))
    }

    /// `value=label` assignments separated by `;`.
    pub fn value_list(input: &str) -> Result<BTreeMap<u32, String>> {
        let parsed: IResult<&str, Vec<(u32, &str)>> = all_consuming(separated_list1(
            char(';'),
            separated_pair(
                map_res(digit1, str::parse::<u32>),
                char('='),
                take_while1(|c| c != ';'),
            ),
        ))(input);
        let (_, pairs) = parsed.map_err(|_| Error::InvalidArg)?;
        Ok(pairs
            .into_iter()
            .map(|(value, label)| (value, label.to_string()))
            .collect())
    }
}

pub use grammar::hex_bytes;

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    fn make_field(row: &[&str]) -> DataField {
        DataField::create(&cells(row), &DataFieldTemplates::new(), false, 0x08).unwrap()
    }

    fn slave_data(hex: &str) -> SymbolString {
        // NN + data; tests do not need a valid CRC here
        SymbolString::parse_hex(hex).unwrap()
    }

    fn read_one(field: &DataField, data: &SymbolString) -> Result<String> {
        let mut out = String::new();
        field.read(PartType::SlaveData, data, 0, &mut out, false, false, UI_FIELD_SEPARATOR)?;
        Ok(out)
    }

    fn write_one(field: &DataField, input: &str) -> Result<SymbolString> {
        let mut data = SymbolString::unescaped();
        data.push(0, false).unwrap(); // NN placeholder
        field.write(input, PartType::SlaveData, &mut data, 0, UI_FIELD_SEPARATOR)?;
        Ok(data)
    }

    #[test]
    fn uch_round_trip() {
        let field = make_field(&["temp", "s", "UCH", "", "", ""]);
        let data = slave_data("012a");
        assert_eq!(read_one(&field, &data).unwrap(), "42");
        assert_eq!(write_one(&field, "42").unwrap().as_slice(), &[0, 0x2A]);
    }

    #[test]
    fn replacement_reads_as_null_and_back() {
        let field = make_field(&["temp", "s", "UCH", "", "", ""]);
        let data = slave_data("01ff");
        assert_eq!(read_one(&field, &data).unwrap(), "-");
        assert_eq!(write_one(&field, "-").unwrap().as_slice(), &[0, 0xFF]);
    }

    #[test]
    fn d2b_scaling_and_sign() {
        let field = make_field(&["temp", "s", "D2B", "", "", ""]);
        // -1.5 * 256 = -384 = 0xFE80, little endian 80 fe
        let data = slave_data("0280fe");
        assert_eq!(read_one(&field, &data).unwrap(), "-1.500");
        assert_eq!(write_one(&field, "-1.5").unwrap().as_slice(), &[0, 0x80, 0xFE]);
    }

    #[test]
    fn d1c_divisor_precision() {
        let field = make_field(&["temp", "s", "D1C", "", "", ""]);
        let data = slave_data("0151");
        assert_eq!(read_one(&field, &data).unwrap(), "40.5");
    }

    #[test]
    fn extra_divisor_combines() {
        let field = make_field(&["temp", "s", "UCH", "10", "", ""]);
        let data = slave_data("012a");
        assert_eq!(read_one(&field, &data).unwrap(), "4.2");
    }

    #[test]
    fn negative_divisor_multiplies() {
        let field = make_field(&["count", "s", "UCH", "-10", "", ""]);
        let data = slave_data("0105");
        assert_eq!(read_one(&field, &data).unwrap(), "50");
        assert_eq!(write_one(&field, "50").unwrap().as_slice(), &[0, 0x05]);
    }

    #[test]
    fn bcd_nibble_validation() {
        let field = make_field(&["n", "s", "BCD", "", "", ""]);
        assert_eq!(read_one(&field, &slave_data("0142")).unwrap(), "42");
        assert_eq!(read_one(&field, &slave_data("014a")), Err(Error::OutOfRange));
    }

    #[test]
    fn pin_reversed_bcd() {
        let field = make_field(&["pin", "s", "PIN", "", "", ""]);
        let data = slave_data("011234");
        assert_eq!(read_one(&field, &data).unwrap(), "1234");
        assert_eq!(write_one(&field, "1234").unwrap().as_slice(), &[0, 0x12, 0x34]);
    }

    #[test]
    fn hex_field_contiguous() {
        let field = make_field(&["raw", "s", "HEX:3", "", "", ""]);
        let data = slave_data("03000102");
        assert_eq!(read_one(&field, &data).unwrap(), "000102");
        assert_eq!(
            write_one(&field, "00 01 02").unwrap().as_slice(),
            &[0, 0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn string_field_trims_padding() {
        let field = make_field(&["name", "s", "STR:5", "", "", ""]);
        let data = slave_data("054142432020");
        assert_eq!(read_one(&field, &data).unwrap(), "ABC");
        assert_eq!(
            write_one(&field, "ABC").unwrap().as_slice(),
            &[0, 0x41, 0x42, 0x43, 0x20, 0x20]
        );
    }

    #[test]
    fn bcd_date_round_trip() {
        let field = make_field(&["date", "s", "BDA", "", "", ""]);
        // 24.12.2021 was a Friday (weekday 5)
        let written = write_one(&field, "24.12.2021").unwrap();
        assert_eq!(written.as_slice(), &[0, 0x24, 0x12, 0x05, 0x21]);
        assert_eq!(read_one(&field, &written).unwrap(), "24.12.2021");
    }

    #[test]
    fn bcd_time_reversed() {
        let field = make_field(&["time", "s", "BTI", "", "", ""]);
        let written = write_one(&field, "21:04:58").unwrap();
        assert_eq!(written.as_slice(), &[0, 0x58, 0x04, 0x21]);
        assert_eq!(read_one(&field, &written).unwrap(), "21:04:58");
    }

    #[test]
    fn truncated_time() {
        let field = make_field(&["time", "s", "TTM", "", "", ""]);
        let written = write_one(&field, "08:30").unwrap();
        assert_eq!(written.as_slice(), &[0, 51]);
        assert_eq!(read_one(&field, &written).unwrap(), "08:30");
        assert_eq!(write_one(&field, "08:35"), Err(Error::OutOfRange));
    }

    #[test]
    fn minutes_since_midnight() {
        let field = make_field(&["time", "s", "MIN", "", "", ""]);
        let written = write_one(&field, "23:59").unwrap();
        assert_eq!(written.as_slice(), &[0, 0x9F, 0x05]);
        assert_eq!(read_one(&field, &written).unwrap(), "23:59");
    }

    #[test]
    fn weekday_defaults() {
        let field = make_field(&["day", "s", "BDY", "", "", ""]);
        assert_eq!(read_one(&field, &slave_data("0102")).unwrap(), "Wed");
        assert_eq!(write_one(&field, "Sun").unwrap().as_slice(), &[0, 6]);
    }

    #[test]
    fn value_list_exact_match_only() {
        let field = make_field(&["mode", "s", "UCH", "0=off;1=on;2=auto", "", ""]);
        assert_eq!(read_one(&field, &slave_data("0101")).unwrap(), "on");
        assert_eq!(write_one(&field, "auto").unwrap().as_slice(), &[0, 2]);
        assert_eq!(write_one(&field, "aut"), Err(Error::NotFound));
        assert_eq!(read_one(&field, &slave_data("0105")), Err(Error::NotFound));
    }

    #[test]
    fn bit_fields_share_a_byte() {
        let field = make_field(&[
            "b0", "s", "BI0", "", "", "",
            "b1", "s", "BI1", "", "", "",
        ]);
        assert_eq!(field.get_length(PartType::SlaveData), 1);
        assert_eq!(read_one(&field, &slave_data("0103")).unwrap(), "1;1");
        let mut data = SymbolString::unescaped();
        data.push(0, false).unwrap();
        field.write("1;1", PartType::SlaveData, &mut data, 0, UI_FIELD_SEPARATOR).unwrap();
        assert_eq!(data.as_slice(), &[0, 0x03]);
    }

    #[test]
    fn bits_across_byte_boundary_fail_to_derive() {
        let result = DataField::create(
            &cells(&["b", "s", "BI6:3", "", "", ""]),
            &DataFieldTemplates::new(),
            false,
            0x08,
        );
        assert!(matches!(result, Err(Error::OutOfRange)));
    }

    #[test]
    fn part_mismatch_produces_no_output() {
        let field = make_field(&["temp", "m", "UCH", "", "", ""]);
        let data = slave_data("012a");
        let mut out = String::new();
        let wrote = field
            .read(PartType::SlaveData, &data, 0, &mut out, false, false, UI_FIELD_SEPARATOR)
            .unwrap();
        assert!(!wrote);
        assert!(out.is_empty());
    }

    #[test]
    fn ignored_field_consumes_bytes() {
        let field = make_field(&[
            "", "s", "IGN:2", "", "", "",
            "temp", "s", "UCH", "", "", "",
        ]);
        assert_eq!(field.get_length(PartType::SlaveData), 3);
        assert_eq!(read_one(&field, &slave_data("03a0b12a")).unwrap(), "42");
    }

    #[test]
    fn templates_derive_with_overrides() {
        let mut templates = DataFieldTemplates::new();
        templates
            .add_from_row(&cells(&["temp", "", "D2B", "", "°C", "temperature"]))
            .unwrap();
        let field = DataField::create(
            &cells(&["outside", "s", "temp", "", "", ""]),
            &templates,
            false,
            0x08,
        )
        .unwrap();
        match &field {
            DataField::Single(f) => {
                assert_eq!(f.header().name, "outside");
                assert_eq!(f.header().unit, "°C");
                assert_eq!(f.header().part, PartType::SlaveData);
            }
            DataField::Set(_) => panic!("expected single field"),
        }
    }

    #[test]
    fn duplicate_template_rejected() {
        let mut templates = DataFieldTemplates::new();
        templates
            .add_from_row(&cells(&["temp", "", "D2B", "", "", ""]))
            .unwrap();
        assert_eq!(
            templates.add_from_row(&cells(&["temp", "", "UCH", "", "", ""])),
            Err(Error::Duplicate)
        );
    }

    #[test]
    fn verbose_output() {
        let field = make_field(&["temp", "s", "UCH", "", "°C", "outside"]);
        let mut out = String::new();
        field
            .read(PartType::SlaveData, &slave_data("012a"), 0, &mut out, false, true, UI_FIELD_SEPARATOR)
            .unwrap();
        assert_eq!(out, "temp=42 °C [outside]");
    }

    #[test]
    fn hex_bytes_grammar() {
        assert_eq!(hex_bytes("b509").unwrap(), vec![0xB5, 0x09]);
        assert_eq!(hex_bytes("b5 09 0d").unwrap(), vec![0xB5, 0x09, 0x0D]);
        assert!(hex_bytes("b5 0").is_err());
        assert!(hex_bytes("xy").is_err());
    }
}
