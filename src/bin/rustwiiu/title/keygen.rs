// title/keygen.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Code for the keygen, ticket, and cert commands in the rustwiiu CLI.

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use hex::FromHex;
use rustwiiu::title::{cert, keygen, ticket, tmd};
use rustwiiu::title::commonkeys::KeyFamily;
use crate::title::parse_tid;

pub fn keygen(tid: &str, password: &Option<String>, dev: bool) -> Result<()> {
    let title_id = parse_tid(tid)?;
    let password = match password {
        Some(password) => password.parse::<keygen::KeygenPassword>()
            .with_context(|| format!("Unknown keygen password \"{}\". Known passwords are: {}", password,
                keygen::KeygenPassword::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")))?,
        None => keygen::KeygenPassword::default(),
    };
    let family = if dev { KeyFamily::Development } else { KeyFamily::Retail };
    let title_key = keygen::generate_title_key(title_id, password);
    let title_key_enc = keygen::generate_enc_title_key(title_id, password, family);
    println!("Title Key for {} (password \"{}\")", hex::encode(title_id).to_uppercase(), password);
    println!("  Decrypted: {}", hex::encode(title_key));
    println!("  Encrypted ({}): {}", family, hex::encode(title_key_enc));
    Ok(())
}

pub fn ticket(tid: &str, version: u16, key: &Option<String>, output: &Option<String>) -> Result<()> {
    let title_id = parse_tid(tid)?;
    let title_key_enc = match key {
        Some(key) => <[u8; 16]>::from_hex(key)
            .with_context(|| format!("The specified Title Key \"{}\" is not 32 hex characters.", key))?,
        None => keygen::generate_enc_title_key(title_id, keygen::KeygenPassword::default(), KeyFamily::Retail),
    };
    let out_path = match output {
        Some(output) => PathBuf::from(output),
        None => PathBuf::from("title.tik"),
    };
    ticket::synthesize_ticket(&out_path, title_id, title_key_enc, version)
        .with_context(|| format!("Failed to write Ticket \"{}\".", out_path.display()))?;
    println!("Ticket for {} v{} written to \"{}\".", hex::encode(title_id).to_uppercase(), version, out_path.display());
    Ok(())
}

pub fn cert(output: &Option<String>, tmd: &Option<String>, cetk: &Option<String>) -> Result<()> {
    let out_path = match output {
        Some(output) => PathBuf::from(output),
        None => PathBuf::from("title.cert"),
    };
    match (tmd, cetk) {
        (Some(tmd_path), Some(cetk_path)) => {
            let tmd_path = Path::new(tmd_path);
            let cetk_path = Path::new(cetk_path);
            if !tmd_path.is_file() {
                bail!("TMD \"{}\" could not be found.", tmd_path.display());
            }
            if !cetk_path.is_file() {
                bail!("Ticket \"{}\" could not be found.", cetk_path.display());
            }
            let tmd = tmd::TMD::from_bytes(&fs::read(tmd_path)?).with_context(|| "The provided TMD is invalid.")?;
            let cetk = fs::read(cetk_path)?;
            let chain = cert::assemble_cert_chain(&tmd, &cetk)
                .with_context(|| "The provided TMD and Ticket don't carry a full certificate chain.")?;
            fs::write(&out_path, chain).with_context(|| format!("Failed to write \"{}\".", out_path.display()))?;
            println!("Certificate chain assembled and written to \"{}\".", out_path.display());
        },
        _ => {
            cert::synthesize_certificate(&out_path)
                .with_context(|| format!("Failed to write \"{}\".", out_path.display()))?;
            println!("Placeholder certificate written to \"{}\".", out_path.display());
        }
    }
    Ok(())
}
