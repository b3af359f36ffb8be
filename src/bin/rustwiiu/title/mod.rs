// title/mod.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Root for all title-related commands in the rustwiiu CLI.

pub mod decrypt;
pub mod keygen;

use anyhow::{bail, Context, Result};
use hex::FromHex;

/// Parses a Title ID given on the command line.
pub fn parse_tid(tid: &str) -> Result<[u8; 8]> {
    if tid.len() != 16 {
        bail!("The specified Title ID is invalid! Title IDs must be 16 hex characters long.");
    }
    <[u8; 8]>::from_hex(tid).with_context(|| format!("The specified Title ID \"{}\" is not valid hex.", tid))
}
