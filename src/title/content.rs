// title/content.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Implements decryption and verification of the encrypted content files of a Wii U title.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{compiler_fence, Ordering};
use aes::cipher::KeyIvInit;
use sha1::{Sha1, Digest};
use thiserror::Error;
use tracing::debug;
use crate::title::crypto::{self, Aes128CbcDec};
use crate::title::tmd::ContentRecord;

/// Size of the chunks that unhashed contents are read in.
pub const PLAIN_CHUNK_SIZE: u64 = 0x8000;
/// Size of one physical block of a hashed content.
pub const HASHED_BLOCK_SIZE: u64 = 0x10000;
/// Size of the data stored in one block of a hashed content.
pub const HASHED_PAYLOAD_SIZE: u64 = 0xFC00;
/// Size of the hash area at the start of each block of a hashed content.
pub const HASHES_SIZE: usize = 0x400;

const SHA1_SIZE: usize = 20;
const H0_TABLE: std::ops::Range<usize> = 0x000..0x140;
const H1_TABLE: std::ops::Range<usize> = 0x140..0x280;
const H2_TABLE: std::ops::Range<usize> = 0x280..0x3C0;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("H0 hash of block {block} did not match the expected value (was {hash}, expected {expected})")]
    HashMismatch { block: u64, hash: String, expected: String },
    #[error("{level} hash of block {block} did not match the expected value")]
    HashTreeMismatch { level: &'static str, block: u64 },
    #[error("H3 file's hash did not match the hash in the TMD (was {hash}, expected {expected})")]
    BadH3Hash { hash: String, expected: String },
    #[error("content's hash did not match the expected value (was {hash}, expected {expected})")]
    BadHash { hash: String, expected: String },
    #[error("H3 file is too short for {blocks} blocks ({len} bytes)")]
    H3TooShort { blocks: u64, len: usize },
    #[error("content with Content ID {0:08X} could not be found in `{1}`")]
    ContentNotFound(u32, PathBuf),
    #[error("content is {actual} bytes but the TMD expects {expected} bytes")]
    SizeMismatch { actual: u64, expected: u64 },
    #[error("content file `{path}` could not be opened")]
    Source { path: PathBuf, source: std::io::Error },
    #[error("output file `{path}` could not be written")]
    Output { path: PathBuf, source: std::io::Error },
    #[error("decrypted data could not be written")]
    Write(#[source] std::io::Error),
    #[error("content data is not in a valid format")]
    IO(#[from] std::io::Error),
}

// Reads until the buffer is full or the source runs out, returning how much was read.
fn read_up_to<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<usize, std::io::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn sha1(data: &[u8]) -> [u8; SHA1_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    <[u8; SHA1_SIZE]>::from(hasher.finalize())
}

fn hash_slot(table: &[u8], slot: usize) -> &[u8] {
    &table[slot * SHA1_SIZE..(slot + 1) * SHA1_SIZE]
}

/// Holds the Title Key of a title for as long as its contents are being decrypted. The key is
/// wiped when the decryptor is dropped.
pub struct ContentDecryptor {
    title_key: [u8; 16],
}

impl ContentDecryptor {
    /// Creates a new decryptor for contents encrypted with the given Title Key.
    pub fn new(title_key: [u8; 16]) -> Self {
        ContentDecryptor { title_key }
    }

    /// Decrypts an entire unhashed content held in memory.
    pub fn decrypt_whole(&self, data: &[u8], index: u16) -> Vec<u8> {
        crypto::decrypt_content(data, self.title_key, index)
    }

    /// Decrypts `length` bytes starting at `offset` from an unhashed content. The content is one
    /// CBC stream starting with the content IV, so a window that doesn't start in the first chunk
    /// picks the chain up from the ciphertext block right before it.
    pub fn decrypt_plain<R: Read + Seek, W: Write>(&self, src: &mut R, dst: &mut W, offset: u64, length: u64, index: u16) -> Result<(), ContentError> {
        let roffset = offset / PLAIN_CHUNK_SIZE * PLAIN_CHUNK_SIZE;
        let mut soffset = (offset - roffset) as usize;
        let mut iv = crypto::content_iv(index);
        if roffset != 0 {
            src.seek(SeekFrom::Start(roffset - 16))?;
            src.read_exact(&mut iv)?;
        } else {
            src.seek(SeekFrom::Start(0))?;
        }
        let mut decryptor = Aes128CbcDec::new(&self.title_key.into(), &iv.into());
        let mut buf = vec![0u8; PLAIN_CHUNK_SIZE as usize];
        let mut remaining = length;
        while remaining > 0 {
            let read = read_up_to(src, &mut buf)?;
            let usable = read & !15;
            if usable <= soffset {
                return Err(ContentError::IO(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
            }
            crypto::decrypt_blocks(&mut decryptor, &mut buf[..usable]);
            let take = ((usable - soffset) as u64).min(remaining) as usize;
            dst.write_all(&buf[soffset..soffset + take]).map_err(ContentError::Write)?;
            remaining -= take as u64;
            soffset = 0;
        }
        Ok(())
    }

    /// Decrypts `length` bytes starting at `offset` from a hashed content, verifying the H0 hash of
    /// every block that gets read. `offset` counts only payload bytes, not the hash areas.
    pub fn decrypt_hashed<R: Read + Seek, W: Write>(&self, src: &mut R, dst: &mut W, offset: u64, length: u64, index: u16) -> Result<(), ContentError> {
        let mut block = offset / HASHED_PAYLOAD_SIZE;
        let mut soffset = (offset % HASHED_PAYLOAD_SIZE) as usize;
        src.seek(SeekFrom::Start(block * HASHED_BLOCK_SIZE))?;
        let mut enc = vec![0u8; HASHED_BLOCK_SIZE as usize];
        let mut remaining = length;
        while remaining > 0 {
            src.read_exact(&mut enc)?;
            let (hashes, payload) = enc.split_at_mut(HASHES_SIZE);
            crypto::decrypt_cbc(self.title_key, crypto::content_iv(index), hashes);
            let slot = (block % 16) as usize;
            let mut h0 = [0u8; SHA1_SIZE];
            h0.copy_from_slice(hash_slot(&hashes[H0_TABLE], slot));
            let mut iv = [0u8; 16];
            iv.copy_from_slice(&h0[..16]);
            if slot == 0 {
                iv[1] ^= index as u8;
            }
            crypto::decrypt_cbc(self.title_key, iv, payload);
            let mut hash = sha1(payload);
            if slot == 0 {
                hash[1] ^= index as u8;
            }
            if hash != h0 {
                return Err(ContentError::HashMismatch {
                    block,
                    hash: hex::encode(hash),
                    expected: hex::encode(h0),
                });
            }
            let take = ((HASHED_PAYLOAD_SIZE as usize - soffset) as u64).min(remaining) as usize;
            dst.write_all(&payload[soffset..soffset + take]).map_err(ContentError::Write)?;
            remaining -= take as u64;
            soffset = 0;
            block += 1;
        }
        Ok(())
    }

    /// Decrypts part of a content file into a new output file, in hashed or plain mode.
    pub fn decrypt_content_file(&self, src_path: &Path, dst_path: &Path, offset: u64, length: u64, index: u16, hashed: bool) -> Result<(), ContentError> {
        let mut src = File::open(src_path)
            .map_err(|e| ContentError::Source { path: src_path.to_path_buf(), source: e })?;
        let dst = File::create(dst_path)
            .map_err(|e| ContentError::Output { path: dst_path.to_path_buf(), source: e })?;
        let mut dst = BufWriter::new(dst);
        debug!(src = %src_path.display(), offset, length, index, hashed, "decrypting content range");
        let result = if hashed {
            self.decrypt_hashed(&mut src, &mut dst, offset, length, index)
        } else {
            self.decrypt_plain(&mut src, &mut dst, offset, length, index)
        };
        let to_output = |e| ContentError::Output { path: dst_path.to_path_buf(), source: e };
        match result {
            Err(ContentError::Write(e)) => Err(to_output(e)),
            Err(e) => Err(e),
            Ok(()) => dst.flush().map_err(to_output),
        }
    }

    /// Verifies an unhashed content by decrypting it and comparing its SHA-1 hash to the one in
    /// its content record.
    pub fn verify_plain<R: Read + Seek>(&self, src: &mut R, record: &ContentRecord, index: u16) -> Result<(), ContentError> {
        let mut hasher = Sha1::new();
        let mut sink = HashWriter(&mut hasher);
        self.decrypt_plain(src, &mut sink, 0, record.content_size, index)?;
        let hash = <[u8; SHA1_SIZE]>::from(hasher.finalize());
        if hash[..] != record.content_hash[..SHA1_SIZE] {
            return Err(ContentError::BadHash {
                hash: hex::encode(hash),
                expected: hex::encode(&record.content_hash[..SHA1_SIZE]),
            });
        }
        Ok(())
    }

    /// Verifies the H1, H2 and H3 levels of a hashed content's hash tree. Every block's H0 table
    /// must hash to its H1 entry, every H1 table to its H2 entry, and every H2 table to its entry
    /// in the .h3 file.
    pub fn verify_hash_tree<R: Read + Seek>(&self, src: &mut R, h3: &[u8], content_size: u64, index: u16) -> Result<(), ContentError> {
        let blocks = content_size / HASHED_BLOCK_SIZE;
        let h3_needed = blocks.div_ceil(4096) as usize * SHA1_SIZE;
        if h3.len() < h3_needed {
            return Err(ContentError::H3TooShort { blocks, len: h3.len() });
        }
        let mut hashes = [0u8; HASHES_SIZE];
        for block in 0..blocks {
            src.seek(SeekFrom::Start(block * HASHED_BLOCK_SIZE))?;
            src.read_exact(&mut hashes)?;
            crypto::decrypt_cbc(self.title_key, crypto::content_iv(index), &mut hashes);
            let h1_slot = ((block / 16) % 16) as usize;
            let h2_slot = ((block / 256) % 16) as usize;
            let h3_slot = (block / 4096) as usize;
            if sha1(&hashes[H0_TABLE]) != hash_slot(&hashes[H1_TABLE], h1_slot) {
                return Err(ContentError::HashTreeMismatch { level: "H1", block });
            }
            if sha1(&hashes[H1_TABLE]) != hash_slot(&hashes[H2_TABLE], h2_slot) {
                return Err(ContentError::HashTreeMismatch { level: "H2", block });
            }
            if sha1(&hashes[H2_TABLE]) != hash_slot(h3, h3_slot) {
                return Err(ContentError::HashTreeMismatch { level: "H3", block });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ContentDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDecryptor").finish_non_exhaustive()
    }
}

impl Drop for ContentDecryptor {
    fn drop(&mut self) {
        self.title_key.fill(0);
        compiler_fence(Ordering::SeqCst);
    }
}

// Feeds everything written to it into a SHA-1 hasher.
struct HashWriter<'a>(&'a mut Sha1);

impl Write for HashWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Checks that the SHA-1 hash of a .h3 file matches the hash stored in its content's record.
pub fn verify_h3(h3: &[u8], record: &ContentRecord) -> Result<(), ContentError> {
    let hash = sha1(h3);
    if hash[..] != record.content_hash[..SHA1_SIZE] {
        return Err(ContentError::BadH3Hash {
            hash: hex::encode(hash),
            expected: hex::encode(&record.content_hash[..SHA1_SIZE]),
        });
    }
    Ok(())
}

fn first_existing(dir: &Path, names: &[String]) -> Option<PathBuf> {
    names.iter().map(|name| dir.join(name)).find(|path| path.is_file())
}

/// Finds the file holding a content in a download directory. The name may be upper or lower case
/// hex, with or without the .app extension.
pub fn find_content_file(dir: &Path, content_id: u32) -> Result<PathBuf, ContentError> {
    let names = [
        format!("{:08x}.app", content_id),
        format!("{:08X}.app", content_id),
        format!("{:08x}", content_id),
        format!("{:08X}", content_id),
    ];
    first_existing(dir, &names).ok_or_else(|| ContentError::ContentNotFound(content_id, dir.to_path_buf()))
}

/// Finds the .h3 file of a hashed content in a download directory, if there is one.
pub fn find_h3_file(dir: &Path, content_id: u32) -> Option<PathBuf> {
    let names = [format!("{:08x}.h3", content_id), format!("{:08X}.h3", content_id)];
    first_existing(dir, &names)
}
