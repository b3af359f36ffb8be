// title/decrypt.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Code for the decrypt and verify commands in the rustwiiu CLI.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use glob::glob;
use rustwiiu::title::{self, fst::ExtractOptions};
use crate::filetypes::{identify_file_type, WiiUFileType};

// Finds a file in a download directory by its usual names, falling back to the only file with the
// given extension.
fn find_in_dir(dir: &Path, names: &[&str], extension: &str) -> Result<Option<PathBuf>> {
    if let Some(path) = names.iter().map(|name| dir.join(name)).find(|path| path.is_file()) {
        return Ok(Some(path));
    }
    let mut matches: Vec<PathBuf> = glob(&format!("{}/*.{}", dir.display(), extension))?
        .filter_map(|f| f.ok())
        .collect();
    if matches.len() > 1 {
        bail!("More than one .{} file was found in \"{}\".", extension, dir.display());
    }
    Ok(matches.pop())
}

// Works out the download directory and the TMD and Ticket to use from what was passed on the
// command line.
fn resolve_input(input: &str, tik: &Option<String>) -> Result<(PathBuf, PathBuf, Option<PathBuf>)> {
    let in_path = Path::new(input);
    if !in_path.exists() {
        bail!("Source \"{}\" could not be found.", in_path.display());
    }
    let file_type = identify_file_type(input);
    let source_dir = match file_type {
        Some(WiiUFileType::Directory) => in_path.to_path_buf(),
        Some(WiiUFileType::Tmd) | Some(WiiUFileType::Ticket) => match in_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
        _ => bail!("\"{}\" is not a download directory, TMD, or Ticket.", in_path.display()),
    };
    let tmd_path = if file_type == Some(WiiUFileType::Tmd) {
        in_path.to_path_buf()
    } else {
        find_in_dir(&source_dir, &["title.tmd", "tmd"], "tmd")?
            .with_context(|| format!("No TMD could be found in \"{}\".", source_dir.display()))?
    };
    let ticket_path = match tik {
        Some(tik) => Some(PathBuf::from(tik)),
        None if file_type == Some(WiiUFileType::Ticket) => Some(in_path.to_path_buf()),
        None => find_in_dir(&source_dir, &["title.tik", "cetk"], "tik")?,
    };
    Ok((source_dir, tmd_path, ticket_path))
}

pub fn decrypt(input: &str, output: &Option<String>, tik: &Option<String>, delete_encrypted: bool) -> Result<()> {
    let (source_dir, tmd_path, ticket_path) = resolve_input(input, tik)?;
    let tmd_data = fs::read(&tmd_path).with_context(|| format!("Failed to read TMD \"{}\".", tmd_path.display()))?;
    let ticket_data = match &ticket_path {
        Some(path) => Some(fs::read(path).with_context(|| format!("Failed to read Ticket \"{}\".", path.display()))?),
        None => None,
    };
    let title = title::Title::from_parts(&tmd_data, ticket_data.as_deref())
        .with_context(|| "The provided TMD and Ticket could not be loaded.")?;
    if title.ticket_generated() {
        println!("No Ticket was found, so the Title Key was generated.");
    }
    let out_path = match output {
        Some(output) => PathBuf::from(output),
        None => source_dir.clone(),
    };
    println!("Decrypting title {} ({} key)...", hex::encode(title.tmd.title_id()).to_uppercase(), title.key_family());
    let mut last_percent = u32::MAX;
    let mut report = |done: u32, total: u32| {
        let percent = done * 100 / total.max(1);
        if percent != last_percent {
            last_percent = percent;
            print!("\rExtracting files... {}%", percent);
            let _ = std::io::stdout().flush();
        }
    };
    let options = ExtractOptions { cancel_flag: None, progress: Some(&mut report) };
    let summary = title.extract(&source_dir, &out_path, options);
    println!();
    let summary = summary.with_context(|| format!("Failed to extract title to \"{}\".", out_path.display()))?;
    println!(
        "Extracted {} files ({} bytes, {} skipped) to \"{}\".",
        summary.files, summary.bytes, summary.skipped, out_path.display()
    );
    if delete_encrypted {
        let removed = title.remove_encrypted_contents(&source_dir)
            .with_context(|| "Failed to delete the encrypted contents.")?;
        println!("Deleted {} encrypted files.", removed);
    }
    Ok(())
}

pub fn verify(dir: &str) -> Result<()> {
    let dir = Path::new(dir);
    if !dir.is_dir() {
        bail!("\"{}\" is not a download directory.", dir.display());
    }
    let title = title::Title::from_dir(dir).with_context(|| "The title in the provided directory could not be loaded.")?;
    println!("Verifying {} contents...", title.tmd.content_records().len());
    title.verify_contents(dir).with_context(|| "Content verification failed.")?;
    println!("All contents of title {} are valid!", hex::encode(title.tmd.title_id()).to_uppercase());
    Ok(())
}
