//! Loading of field template and message definitions from `,`-separated
//! files: comment handling, `*`-prefixed default rows, and the recursive
//! walk over the configuration directory.

use crate::data::{DataFieldTemplates, FIELD_SEPARATOR};
use crate::message::MessageMap;
use crate::result::{Error, Result};
use log::error;
use std::fs;
use std::path::Path;

/// The reserved file declaring field templates.
pub const TEMPLATES_FILE: &str = "_types.csv";

fn split_row(line: &str) -> Vec<String> {
    line.split(FIELD_SEPARATOR).map(str::to_string).collect()
}

/// Reads one definition file, feeding each non-comment row to `handle`.
/// With `supports_defaults`, rows starting with `*` are collected (star
/// stripped) and passed alongside every following row.
pub fn read_definition_file(
    path: &Path,
    supports_defaults: bool,
    mut handle: impl FnMut(&[String], Option<&[Vec<String>]>) -> Result<()>,
) -> Result<()> {
    let content = fs::read_to_string(path).map_err(|_| Error::NotFound)?;
    let mut defaults: Vec<Vec<String>> = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let mut row = split_row(line);
        if supports_defaults && line.starts_with('*') {
            row[0] = row[0][1..].to_string();
            defaults.push(row);
            continue;
        }
        let passed = if supports_defaults {
            Some(defaults.as_slice())
        } else {
            None
        };
        if let Err(e) = handle(&row, passed) {
            error!(
                target: "bas",
                "error reading \"{}\" line {}: {}",
                path.display(),
                line_no + 1,
                e
            );
            return Err(e);
        }
    }
    Ok(())
}

/// Loads every message definition file below `path` (recursively),
/// skipping the reserved templates file.
pub fn read_message_files(
    path: &Path,
    templates: &DataFieldTemplates,
    messages: &mut MessageMap,
) -> Result<()> {
    let dir = fs::read_dir(path).map_err(|_| Error::NotFound)?;
    let mut entries: Vec<_> = dir.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let entry_path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if entry_path.is_dir() {
            if name != "." && name != ".." {
                read_message_files(&entry_path, templates, messages)?;
            }
        } else if name.ends_with(".csv") && name != TEMPLATES_FILE {
            read_definition_file(&entry_path, true, |row, defaults| {
                messages.add_from_row(row, templates, defaults)
            })?;
        }
    }
    Ok(())
}

/// Loads the whole configuration tree: the templates file first, then
/// every message file.
pub fn load_config_dir(
    path: &Path,
    templates: &mut DataFieldTemplates,
    messages: &mut MessageMap,
) -> Result<()> {
    let templates_path = path.join(TEMPLATES_FILE);
    if templates_path.is_file() {
        read_definition_file(&templates_path, false, |row, _| templates.add_from_row(row))?;
    }
    read_message_files(path, templates, messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> TempDir {
            let path = std::env::temp_dir().join(format!("ebusd-csv-{}-{}", std::process::id(), tag));
            fs::create_dir_all(&path).unwrap();
            TempDir(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn comments_and_defaults() {
        let dir = TempDir::new("defaults");
        fs::write(
            dir.0.join("_types.csv"),
            "# field templates\ntemp,,D2B,,°C,temperature\n",
        )
        .unwrap();
        fs::write(
            dir.0.join("heating.csv"),
            concat!(
                "// messages\n",
                "*r,heating,,,,08,b509,\n",
                "r,,flowtemp,,,,,00,value,s,temp,,,\n",
                "w,heating,daytemp,,,08,b516,,value,m,D2C,,,\n",
            ),
        )
        .unwrap();

        let mut templates = DataFieldTemplates::new();
        let mut messages = MessageMap::new();
        load_config_dir(&dir.0, &mut templates, &mut messages).unwrap();

        assert_eq!(templates.len(), 1);
        assert_eq!(messages.size(false), 2);
        let read = messages.find("heating", "flowtemp", false, false).unwrap();
        assert_eq!(read.dst(), 0x08);
        assert_eq!(read.id(), &[0xB5, 0x09, 0x00]);
        assert!(messages.find("heating", "daytemp", true, false).is_some());
    }

    #[test]
    fn recursive_walk() {
        let dir = TempDir::new("walk");
        let sub = dir.0.join("vaillant");
        fs::create_dir_all(&sub).unwrap();
        fs::write(
            sub.join("hwc.csv"),
            "u,hwc,status,,,08,b512,,value,m,UCH,,,\n",
        )
        .unwrap();

        let mut templates = DataFieldTemplates::new();
        let mut messages = MessageMap::new();
        load_config_dir(&dir.0, &mut templates, &mut messages).unwrap();
        assert_eq!(messages.size(true), 1);
    }

    #[test]
    fn bad_rows_abort_with_position() {
        let dir = TempDir::new("bad");
        fs::write(dir.0.join("broken.csv"), "r,,temp,,,zz,5022,,v,s,UCH,,,\n").unwrap();

        let mut templates = DataFieldTemplates::new();
        let mut messages = MessageMap::new();
        let result = load_config_dir(&dir.0, &mut templates, &mut messages);
        assert_eq!(result.err(), Some(Error::InvalidArg));
    }
}
