//! Loading a configuration tree end to end: templates, default rows,
//! message files in subdirectories, and frames prepared from the result.

use ebusd::csv::load_config_dir;
use ebusd::data::{DataFieldTemplates, PartType};
use ebusd::message::MessageMap;
use ebusd::symbol::{crc8, SymbolString};
use std::fs;
use std::path::PathBuf;

struct TempConfig(PathBuf);

impl TempConfig {
    fn new(tag: &str) -> TempConfig {
        let path = std::env::temp_dir().join(format!(
            "ebusd-config-{}-{tag}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(path.join("vaillant")).unwrap();
        TempConfig(path)
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn load(dir: &TempConfig) -> (DataFieldTemplates, MessageMap) {
    let mut templates = DataFieldTemplates::new();
    let mut messages = MessageMap::new();
    load_config_dir(&dir.0, &mut templates, &mut messages).unwrap();
    (templates, messages)
}

#[test]
fn full_tree_loads_and_prepares_valid_frames() {
    let dir = TempConfig::new("tree");
    fs::write(
        dir.0.join("_types.csv"),
        concat!(
            "# shared field templates\n",
            "temp,,D2C,,°C,temperature\n",
            "onoff,,UCH,0=off;1=on,,switch state\n",
        ),
    )
    .unwrap();
    fs::write(
        dir.0.join("vaillant").join("heating.csv"),
        concat!(
            "*r,heating,,,,08,b509,\n",
            "*w,heating,,,,08,b510,\n",
            "r3,,flowtemp,,,,,0d,value,s,temp,,,\n",
            "r,,mode,,,,,2e,state,s,onoff,,,\n",
            "w,,daytemp,,,,,16,value,m,temp,,,\n",
            "u,,outside,broadcast temp,,fe,b505,27,value,m,temp,,,\n",
        ),
    )
    .unwrap();

    let (templates, messages) = load(&dir);
    assert_eq!(templates.len(), 2);
    assert_eq!(messages.size(false), 4);
    assert_eq!(messages.size(true), 1);
    assert_eq!(messages.size_poll(), 1);

    // defaults supplied class, destination and id prefix
    let read = messages.find("heating", "flowtemp", false, false).unwrap();
    assert_eq!(read.dst(), 0x08);
    assert_eq!(read.id(), &[0xB5, 0x09, 0x0D]);
    assert_eq!(read.poll_priority(), 3);

    // every prepared frame carries a CRC that validates over the wire form
    for (class, name, is_set, input) in [
        ("heating", "flowtemp", false, ""),
        ("heating", "mode", false, ""),
        ("heating", "daytemp", true, "21.5"),
    ] {
        let msg = messages.find(class, name, is_set, false).unwrap();
        let master = msg.prepare_master(0xFF, input, None).unwrap();
        let len = master.len();
        let crc = master.as_slice()[..len - 1]
            .iter()
            .fold(0, |crc, &b| crc8(crc, b));
        assert_eq!(master[len - 1], crc, "frame {master}");
    }

    // the write request encodes the template-scaled value
    let write = messages.find("heating", "daytemp", true, false).unwrap();
    let master = write.prepare_master(0xFF, "21.5", None).unwrap();
    // 21.5 * 16 = 344 = 0x0158, little endian after the extra id byte
    assert_eq!(
        master.as_slice()[..8],
        [0xFF, 0x08, 0xB5, 0x10, 0x03, 0x16, 0x58, 0x01]
    );
}

#[test]
fn passive_broadcast_definition_matches_traffic() {
    let dir = TempConfig::new("passive");
    fs::write(
        dir.0.join("vaillant").join("broadcast.csv"),
        "u,broadcast,outside,,,fe,b505,27,value,m,D2C,,,\n",
    )
    .unwrap();

    let (_, messages) = load(&dir);
    // 10 fe b5 05 03 27 58 01: outside temperature 21.5 from master 10
    let frame = SymbolString::parse_hex("10feb50503275801").unwrap();
    let msg = messages.find_frame(&frame).unwrap();
    assert_eq!(msg.name(), "outside");

    let mut output = String::new();
    msg.decode(PartType::MasterData, &frame, &mut output, false, ';')
        .unwrap();
    assert_eq!(output, "21.50");
    assert_eq!(msg.last_value(), "21.50");
}

#[test]
fn templates_file_is_not_read_as_messages() {
    let dir = TempConfig::new("skip");
    fs::write(dir.0.join("_types.csv"), "temp,,D2C,,,\n").unwrap();

    let (templates, messages) = load(&dir);
    assert_eq!(templates.len(), 1);
    assert_eq!(messages.size(false), 0);
}
