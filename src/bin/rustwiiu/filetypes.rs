// filetypes.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Common code for identifying Wii U file types.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use regex::RegexBuilder;

#[derive(Debug)]
#[derive(PartialEq)]
pub enum WiiUFileType {
    Tmd,
    Ticket,
    Cert,
    Directory,
}

// TMDs and Tickets both start their issuer's last certificate name at 0x150.
const ISSUER_NAME_OFFSET: u64 = 0x150;
const TMD_MAGIC: &[u8; 8] = b"CP000000";
const TICKET_MAGIC: &[u8; 8] = b"XS000000";

fn read_issuer_magic(input: &Path) -> Option<[u8; 8]> {
    let mut f = File::open(input).ok()?;
    f.seek(SeekFrom::Start(ISSUER_NAME_OFFSET)).ok()?;
    let mut magic = [0u8; 8];
    f.read_exact(&mut magic).ok()?;
    Some(magic)
}

pub fn identify_file_type(input: &str) -> Option<WiiUFileType> {
    let input = Path::new(input);
    if input.is_dir() {
        return Some(WiiUFileType::Directory);
    }
    let file_name = input.file_name()?.to_str()?;
    let re = RegexBuilder::new(r"^(title\.)?tmd(\.[0-9]+)?$").case_insensitive(true).build().ok()?;
    // == TMD ==
    if re.is_match(file_name) || input.extension().is_some_and(|f| f.eq_ignore_ascii_case("tmd")) {
        return Some(WiiUFileType::Tmd);
    }
    // == Ticket ==
    if input.extension().is_some_and(|f| f.eq_ignore_ascii_case("tik")) ||
        file_name.eq_ignore_ascii_case("cetk") {
        return Some(WiiUFileType::Ticket);
    }
    // == Certificate ==
    if input.extension().is_some_and(|f| f.eq_ignore_ascii_case("cert")) {
        return Some(WiiUFileType::Cert);
    }

    // == Advanced ==
    // Files named anything else are identified by the certificate named in their issuer, so this
    // is only tried after everything else.
    match read_issuer_magic(input) {
        Some(magic) if &magic == TMD_MAGIC => Some(WiiUFileType::Tmd),
        Some(magic) if &magic == TICKET_MAGIC => Some(WiiUFileType::Ticket),
        _ => None,
    }
}
