// info.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Code for the info command in the rustwiiu CLI.

use std::fs;
use std::path::Path;
use anyhow::{bail, Context, Result};
use rustwiiu::title::{self, cert, fst, ticket, tmd};
use rustwiiu::title::commonkeys::KeyFamily;
use crate::filetypes::{identify_file_type, WiiUFileType};

// Avoids duplicated code, since both TMD and Ticket info print the TID in the same way.
fn print_tid(title_id: [u8; 8]) {
    println!("  Title ID: {}", hex::encode(title_id).to_uppercase());
}

// Wii U title versions are shown as a plain number prefixed with "v".
fn print_title_version(title_version: u16) {
    println!("  Title Version: v{}", title_version);
}

fn print_tmd_info(tmd: &tmd::TMD) {
    // Print all important keys from the TMD.
    println!("Title Info");
    print_tid(tmd.title_id());
    print_title_version(tmd.title_version());
    println!("  TMD Version: {}", tmd.tmd_version());
    println!("  Title Type: {}", tmd.title_kind());
    println!("  Required System Version: {:016X}", tmd.system_version());
    println!("  Group ID: {:04X}", tmd.group_id());
    println!("  Access Rights: {:08X}", tmd.access_rights());
    match tmd.key_family() {
        Some(family) => println!("  Certificate: {} ({})", tmd.signature_issuer(), family),
        None => println!("  Certificate Info: {} (Unknown)", tmd.signature_issuer()),
    }
    println!("  Has Certificates: {}", !tmd.certificates().is_empty());
    println!("\nContent Info");
    println!("  Total Contents: {}", tmd.content_records().len());
    println!("  Boot Content Index: {}", tmd.boot_index());
    println!("  Content Records:");
    for content in tmd.content_records().iter() {
        println!("    Content Index: {}", content.index);
        println!("      Content ID: {:08X}", content.content_id);
        println!("      Content Type: {}", content.content_type);
        println!("      Content Size: {} bytes", content.content_size);
        println!("      Content Hash: {}", hex::encode(&content.content_hash[..20]));
    }
}

fn print_ticket_info(ticket: &ticket::Ticket, family: Option<KeyFamily>) {
    // Print all important keys from the Ticket.
    println!("Ticket Info");
    print_tid(ticket.title_id());
    print_title_version(ticket.title_version());
    println!("  Ticket Version: {}", ticket.ticket_version());
    println!("  Ticket ID: {:016X}", ticket.ticket_id());
    if ticket.is_placeholder() {
        println!("  Signature: Placeholder (generated Ticket)");
    } else {
        println!("  Certificate: {}", ticket.signature_issuer());
    }
    println!("  Common Key Index: {}", ticket.common_key_index());
    println!("  Title Key (Encrypted): {}", hex::encode(ticket.title_key()));
    match family {
        Some(family) => println!("  Title Key (Decrypted): {} ({} common key)", hex::encode(ticket.title_key_dec(family)), family),
        None => {
            println!("  Title Key (Decrypted, Retail): {}", hex::encode(ticket.title_key_dec(KeyFamily::Retail)));
            println!("  Title Key (Decrypted, Development): {}", hex::encode(ticket.title_key_dec(KeyFamily::Development)));
        }
    }
    println!("  Sections: {} ({} header bytes)", ticket.section_count(), ticket.total_header_size());
}

fn print_cert_info(data: &[u8]) -> Result<()> {
    println!("Certificate Info");
    match cert::CertificateChain::from_bytes(data) {
        Ok(chain) => {
            println!("  Created By: {} {}", chain.header().app(), chain.header().app_version());
            println!("  File Type: {}", chain.header().file_type());
            println!("  Certificates:");
            for certificate in chain.certificates() {
                println!("    {} (key ID {:08X})", certificate.full_name(), certificate.key_id());
            }
        },
        Err(cert::CertificateError::NotPlaceholder(_)) => {
            println!("  Signed certificate chain ({} bytes)", data.len());
        },
        Err(e) => return Err(e).with_context(|| "The provided certificate file could not be parsed, and is likely invalid."),
    }
    Ok(())
}

fn print_title_info(dir: &Path) -> Result<()> {
    let title = title::Title::from_dir(dir).with_context(|| "The title in the provided directory could not be loaded.")?;
    print_tmd_info(&title.tmd);
    println!();
    print_ticket_info(&title.ticket, Some(title.key_family()));
    if title.ticket_generated() {
        println!("  (no Ticket found, Title Key was generated)");
    }
    println!();
    let fst_data = title.load_fst(dir).with_context(|| "The FST of the title could not be decrypted.")?;
    let fst = fst::FST::from_bytes(&fst_data).with_context(|| "The FST of the title is invalid.")?;
    let items = fst.walk().with_context(|| "The FST of the title is invalid.")?;
    let dirs = items.iter().filter(|item| item.kind == fst::FSTItemKind::Directory).count();
    println!("FST Info");
    println!("  Partitions: {}", fst.header().partition_count);
    println!("  Entries: {}", fst.entry_count());
    println!("  Directories: {}", dirs);
    println!("  Files: {}", items.len() - dirs);
    Ok(())
}

pub fn info(input: &str) -> Result<()> {
    let in_path = Path::new(input);
    if !in_path.exists() {
        bail!("Input file \"{}\" does not exist.", in_path.display());
    }
    match identify_file_type(input) {
        Some(WiiUFileType::Tmd) => {
            let tmd = tmd::TMD::from_bytes(&fs::read(in_path)?).with_context(|| "The provided TMD file could not be parsed, and is likely invalid.")?;
            print_tmd_info(&tmd);
        },
        Some(WiiUFileType::Ticket) => {
            let ticket = ticket::Ticket::from_bytes(&fs::read(in_path)?).with_context(|| "The provided Ticket file could not be parsed, and is likely invalid.")?;
            print_ticket_info(&ticket, None);
        },
        Some(WiiUFileType::Cert) => {
            print_cert_info(&fs::read(in_path)?)?;
        },
        Some(WiiUFileType::Directory) => {
            print_title_info(in_path)?;
        },
        None => {
            bail!("Information cannot be displayed for this file type.");
        }
    }
    Ok(())
}
