// title/mod.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Root for all title-related modules and implementation of the high-level Title object.

pub mod cert;
pub mod commonkeys;
pub mod content;
pub mod crypto;
pub mod fst;
pub mod keygen;
pub mod ticket;
pub mod tmd;
#[cfg(test)]
mod testdata;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::title::commonkeys::KeyFamily;
use crate::title::content::{ContentDecryptor, ContentError};
use crate::title::fst::{ExtractOptions, ExtractSummary, FSTError, FSTExtractor, FST_MAGIC};
use crate::title::keygen::KeygenPassword;

const TMD_FILE_NAMES: [&str; 2] = ["title.tmd", "tmd"];
const TICKET_FILE_NAMES: [&str; 2] = ["title.tik", "cetk"];
const CERT_FILE_NAMES: [&str; 1] = ["title.cert"];

#[derive(Debug, Error)]
pub enum TitleError {
    #[error("TMD is signed by unknown issuer `{0}`")]
    UnknownKeyFamily(String),
    #[error("required file `{0}` could not be found")]
    MissingFile(PathBuf),
    #[error("TMD does not list any contents")]
    NoContents,
    #[error("certificate processing error")]
    Certificate(#[from] cert::CertificateError),
    #[error("TMD processing error")]
    TMD(#[from] tmd::TMDError),
    #[error("Ticket processing error")]
    Ticket(#[from] ticket::TicketError),
    #[error("content processing error")]
    Content(#[from] ContentError),
    #[error("FST processing error")]
    FST(#[from] FSTError),
    #[error("title data could not be read")]
    IO(#[from] std::io::Error),
}

// Works out the decrypted Title Key for a TMD. Without a Ticket, one is generated with the default
// keygen password and its key is decrypted like any other.
fn resolve_title_key(tmd: &tmd::TMD, ticket: Option<ticket::Ticket>) -> Result<([u8; 16], KeyFamily, ticket::Ticket, bool), TitleError> {
    let family = tmd.key_family().ok_or_else(|| TitleError::UnknownKeyFamily(tmd.signature_issuer()))?;
    debug!(issuer = %tmd.signature_issuer(), %family, "selected common key");
    let (ticket, generated) = match ticket {
        Some(ticket) => (ticket, false),
        None => {
            info!(title_id = %hex::encode(tmd.title_id()), "no Ticket available, generating Title Key");
            let title_key_enc = keygen::generate_enc_title_key(tmd.title_id(), KeygenPassword::default(), family);
            (ticket::Ticket::new(tmd.title_id(), title_key_enc, tmd.title_version()), true)
        }
    };
    Ok((ticket.title_key_dec(family), family, ticket, generated))
}

fn find_file(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|name| dir.join(name)).find(|path| path.is_file())
}

#[derive(Debug)]
/// A structure that represents a Wii U title ready to have its contents decrypted.
pub struct Title {
    pub tmd: tmd::TMD,
    pub ticket: ticket::Ticket,
    ticket_generated: bool,
    key_family: KeyFamily,
    decryptor: ContentDecryptor,
}

impl Title {
    /// Creates a new Title instance from the binary data of its TMD and, if there is one, its
    /// Ticket.
    pub fn from_parts(tmd_data: &[u8], ticket_data: Option<&[u8]>) -> Result<Title, TitleError> {
        let tmd = tmd::TMD::from_bytes(tmd_data)?;
        let ticket = ticket_data.map(ticket::Ticket::from_bytes).transpose()?;
        let (title_key, key_family, ticket, ticket_generated) = resolve_title_key(&tmd, ticket)?;
        Ok(Title {
            tmd,
            ticket,
            ticket_generated,
            key_family,
            decryptor: ContentDecryptor::new(title_key),
        })
    }

    /// Creates a new Title instance from the TMD and Ticket in a download directory. The TMD may
    /// be named "title.tmd" or "tmd", and the Ticket "title.tik" or "cetk". If there's no Ticket,
    /// the Title Key is generated instead.
    pub fn from_dir(dir: &Path) -> Result<Title, TitleError> {
        let tmd_path = find_file(dir, &TMD_FILE_NAMES)
            .ok_or_else(|| TitleError::MissingFile(dir.join(TMD_FILE_NAMES[0])))?;
        let tmd_data = fs::read(&tmd_path)?;
        let ticket_data = match find_file(dir, &TICKET_FILE_NAMES) {
            Some(path) => Some(fs::read(path)?),
            None => None,
        };
        Title::from_parts(&tmd_data, ticket_data.as_deref())
    }

    /// Gets the common key family used by the title.
    pub fn key_family(&self) -> KeyFamily {
        self.key_family
    }

    /// Gets whether the title's Ticket was generated because none was provided.
    pub fn ticket_generated(&self) -> bool {
        self.ticket_generated
    }

    /// Gets the decryptor holding the title's Title Key.
    pub fn decryptor(&self) -> &ContentDecryptor {
        &self.decryptor
    }

    /// Decrypts content 0 of the title, which holds the FST. If the decrypted data doesn't start
    /// with the FST magic, it's written next to the content as "<Content ID>.dec" for inspection.
    pub fn decrypt_fst(&self, source_dir: &Path) -> Result<Vec<u8>, TitleError> {
        self.read_fst(source_dir, true)
    }

    /// Decrypts content 0 of the title like `decrypt_fst`, but never writes anything to
    /// `source_dir`.
    pub fn load_fst(&self, source_dir: &Path) -> Result<Vec<u8>, TitleError> {
        self.read_fst(source_dir, false)
    }

    fn read_fst(&self, source_dir: &Path, dump: bool) -> Result<Vec<u8>, TitleError> {
        let record = self.tmd.content_record(0).ok_or(TitleError::NoContents)?;
        let path = content::find_content_file(source_dir, record.content_id)?;
        let data = fs::read(&path).map_err(|e| ContentError::Source { path: path.clone(), source: e })?;
        if data.len() as u64 != record.content_size {
            return Err(ContentError::SizeMismatch { actual: data.len() as u64, expected: record.content_size }.into());
        }
        let fst_data = self.decryptor.decrypt_whole(&data, 0);
        let magic = fst_data.get(..4).map_or(0, |magic| u32::from_be_bytes([magic[0], magic[1], magic[2], magic[3]]));
        if magic != FST_MAGIC {
            if dump {
                let dump_path = source_dir.join(format!("{:08X}.dec", record.content_id));
                warn!(path = %dump_path.display(), "unexpected content magic, dumping decrypted content");
                if let Err(e) = fs::write(&dump_path, &fst_data) {
                    warn!(path = %dump_path.display(), error = %e, "failed to dump decrypted content");
                }
            }
            return Err(FSTError::NotFSTData(magic).into());
        }
        Ok(fst_data)
    }

    /// Decrypts the title's contents in `source_dir` and extracts the files described by its FST
    /// into `dest_dir`.
    pub fn extract(&self, source_dir: &Path, dest_dir: &Path, options: ExtractOptions) -> Result<ExtractSummary, TitleError> {
        let fst_data = self.decrypt_fst(source_dir)?;
        info!(title_id = %hex::encode(self.tmd.title_id()), dest = %dest_dir.display(), "extracting title");
        let mut extractor = FSTExtractor::new(&self.tmd, &self.decryptor, source_dir);
        Ok(extractor.extract(&fst_data, dest_dir, options)?)
    }

    /// Verifies every content of the title in `source_dir` against the hashes in its TMD. Hashed
    /// contents are checked through their .h3 file and the H1 to H3 levels of their hash tree.
    pub fn verify_contents(&self, source_dir: &Path) -> Result<(), TitleError> {
        for record in self.tmd.content_records() {
            let path = content::find_content_file(source_dir, record.content_id)?;
            let mut file = fs::File::open(&path).map_err(|e| ContentError::Source { path: path.clone(), source: e })?;
            let size = file.metadata()?.len();
            if size < record.content_size {
                return Err(ContentError::SizeMismatch { actual: size, expected: record.content_size }.into());
            }
            if record.is_hashed() {
                let h3_path = content::find_h3_file(source_dir, record.content_id)
                    .ok_or_else(|| TitleError::MissingFile(source_dir.join(format!("{:08X}.h3", record.content_id))))?;
                let h3 = fs::read(&h3_path)?;
                content::verify_h3(&h3, record)?;
                self.decryptor.verify_hash_tree(&mut file, &h3, record.content_size, record.index)?;
            } else {
                self.decryptor.verify_plain(&mut file, record, record.index)?;
            }
            debug!(content_id = %format!("{:08X}", record.content_id), "content verified");
        }
        Ok(())
    }

    /// Deletes the title's encrypted contents, hash files, TMD, Ticket and certificate from
    /// `source_dir`, returning how many files were removed. Anything else in the directory, like
    /// extracted files, is left alone.
    pub fn remove_encrypted_contents(&self, source_dir: &Path) -> Result<u32, TitleError> {
        let mut names: Vec<String> = Vec::new();
        for record in self.tmd.content_records() {
            let cid = record.content_id;
            names.extend([
                format!("{:08x}.app", cid),
                format!("{:08X}.app", cid),
                format!("{:08x}", cid),
                format!("{:08X}", cid),
                format!("{:08x}.h3", cid),
                format!("{:08X}.h3", cid),
            ]);
        }
        names.extend(TMD_FILE_NAMES.iter().chain(&TICKET_FILE_NAMES).chain(&CERT_FILE_NAMES).map(|name| name.to_string()));
        let mut removed = 0;
        for name in names {
            let path = source_dir.join(name);
            // Case-insensitive filesystems can list the same file under two names.
            if path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Derives the decrypted Title Key of a title from its TMD and Ticket. Without a Ticket, the key is
/// generated from the Title ID.
pub fn derive_title_key(tmd_data: &[u8], ticket_data: Option<&[u8]>) -> Result<[u8; 16], TitleError> {
    let tmd = tmd::TMD::from_bytes(tmd_data)?;
    let ticket = ticket_data.map(ticket::Ticket::from_bytes).transpose()?;
    let (title_key, _, _, _) = resolve_title_key(&tmd, ticket)?;
    Ok(title_key)
}

/// Decrypts the title downloaded to `source_dir` and extracts its files into `dest_dir`.
pub fn decrypt_and_extract(source_dir: &Path, dest_dir: &Path) -> Result<(), TitleError> {
    let title = Title::from_dir(source_dir)?;
    title.extract(source_dir, dest_dir, ExtractOptions::default())?;
    Ok(())
}
