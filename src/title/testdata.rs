// title/testdata.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Builds TMDs, hashed contents, FSTs and complete download directories for the tests.

use std::collections::BTreeMap;
use std::fs;
use byteorder::{BigEndian, WriteBytesExt};
use sha1::{Digest, Sha1};
use tempfile::TempDir;
use crate::title::commonkeys::{KeyFamily, RETAIL_TMD_ISSUER};
use crate::title::content::HASHED_PAYLOAD_SIZE;
use crate::title::crypto;
use crate::title::fst::FST_MAGIC;
use crate::title::ticket::Ticket;
use crate::title::tmd::{ContentRecord, ContentType, CONTENT_INFO_COUNT, TMD};

pub const TITLE_ID: [u8; 8] = [0x00, 0x05, 0x00, 0x00, 0x10, 0x10, 0x1A, 0x00];
pub const TITLE_KEY: [u8; 16] = [
    0x3A, 0x91, 0x0C, 0x5E, 0xD2, 0x47, 0x88, 0x1B, 0x6F, 0xE0, 0x24, 0x73, 0xB9, 0x05, 0xCC, 0x1D,
];

// Content IDs of the contents in a fixture. Their file names use different spellings on purpose.
const FST_CONTENT_ID: u32 = 0x0A;
const PLAIN_CONTENT_ID: u32 = 0x0B;
const HASHED_CONTENT_ID: u32 = 0x0C;

fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    <[u8; 20]>::from(hasher.finalize())
}

fn padded_hash(data: &[u8]) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash[..20].copy_from_slice(&sha1(data));
    hash
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed) ^ (i >> 8) as u8).collect()
}

pub fn record(content_id: u32, index: u16, content_type: ContentType, content_size: u64) -> ContentRecord {
    ContentRecord { content_id, index, content_type, content_size, content_hash: [0; 32] }
}

/// Builds an unsigned v1 TMD listing the given content records.
pub fn tmd_bytes(title_id: [u8; 8], issuer: &str, records: &[ContentRecord]) -> Vec<u8> {
    let mut infos: Vec<u8> = Vec::with_capacity(CONTENT_INFO_COUNT * 0x24);
    infos.write_u16::<BigEndian>(0).unwrap();
    infos.write_u16::<BigEndian>(records.len() as u16).unwrap();
    let mut record_data: Vec<u8> = Vec::new();
    for record in records {
        record_data.write_u32::<BigEndian>(record.content_id).unwrap();
        record_data.write_u16::<BigEndian>(record.index).unwrap();
        record_data.write_u16::<BigEndian>(record.content_type.bits()).unwrap();
        record_data.write_u64::<BigEndian>(record.content_size).unwrap();
        record_data.extend_from_slice(&record.content_hash);
    }
    infos.extend_from_slice(&padded_hash(&record_data));
    infos.resize(CONTENT_INFO_COUNT * 0x24, 0);

    let mut buf: Vec<u8> = Vec::new();
    buf.write_u32::<BigEndian>(0x00010004).unwrap();
    buf.extend_from_slice(&[0; 256]);
    buf.extend_from_slice(&[0; 60]);
    let mut issuer_field = [0u8; 64];
    issuer_field[..issuer.len()].copy_from_slice(issuer.as_bytes());
    buf.extend_from_slice(&issuer_field);
    buf.extend_from_slice(&[1, 0, 0, 0]);
    buf.write_u64::<BigEndian>(0x000500101000400A).unwrap();
    buf.extend_from_slice(&title_id);
    buf.write_u32::<BigEndian>(0x0100).unwrap();
    buf.write_u16::<BigEndian>(0x1010).unwrap();
    buf.extend_from_slice(&[0; 62]);
    buf.write_u32::<BigEndian>(0).unwrap();
    buf.write_u16::<BigEndian>(0).unwrap();
    buf.write_u16::<BigEndian>(records.len() as u16).unwrap();
    buf.write_u16::<BigEndian>(0).unwrap();
    buf.extend_from_slice(&[0; 2]);
    buf.extend_from_slice(&padded_hash(&infos));
    buf.extend_from_slice(&infos);
    buf.extend_from_slice(&record_data);
    buf
}

pub struct HashedContent {
    pub data: Vec<u8>,
    pub h3: Vec<u8>,
}

fn hash_table(hashes: &[[u8; 20]], group: usize) -> [u8; 0x140] {
    let mut table = [0u8; 0x140];
    for (slot, hash) in hashes.iter().skip(group * 16).take(16).enumerate() {
        table[slot * 20..(slot + 1) * 20].copy_from_slice(hash);
    }
    table
}

fn hash_tables(hashes: &[[u8; 20]]) -> Vec<[u8; 0x140]> {
    (0..hashes.len().div_ceil(16)).map(|group| hash_table(hashes, group)).collect()
}

/// Encrypts data as a hashed content, building the H0 to H2 tables of every block and the
/// matching .h3 file.
pub fn hashed_content(data: &[u8], key: [u8; 16], index: u16) -> HashedContent {
    let payload_size = HASHED_PAYLOAD_SIZE as usize;
    let blocks = data.len().div_ceil(payload_size).max(1);
    let mut payloads: Vec<Vec<u8>> = (0..blocks)
        .map(|block| {
            let start = (block * payload_size).min(data.len());
            let end = ((block + 1) * payload_size).min(data.len());
            let mut payload = data[start..end].to_vec();
            payload.resize(payload_size, 0);
            payload
        })
        .collect();
    let h0: Vec<[u8; 20]> = payloads
        .iter()
        .enumerate()
        .map(|(block, payload)| {
            let mut hash = sha1(payload);
            if block % 16 == 0 {
                hash[1] ^= index as u8;
            }
            hash
        })
        .collect();
    let h0_tables = hash_tables(&h0);
    let h1: Vec<[u8; 20]> = h0_tables.iter().map(|table| sha1(table)).collect();
    let h1_tables = hash_tables(&h1);
    let h2: Vec<[u8; 20]> = h1_tables.iter().map(|table| sha1(table)).collect();
    let h2_tables = hash_tables(&h2);
    let h3: Vec<u8> = h2_tables.iter().flat_map(|table| sha1(table)).collect();

    let mut out = Vec::with_capacity(blocks * 0x10000);
    for (block, payload) in payloads.iter_mut().enumerate() {
        let mut hashes = [0u8; 0x400];
        hashes[..0x140].copy_from_slice(&h0_tables[block / 16]);
        hashes[0x140..0x280].copy_from_slice(&h1_tables[block / 256]);
        hashes[0x280..0x3C0].copy_from_slice(&h2_tables[block / 4096]);
        crypto::encrypt_cbc(key, crypto::content_iv(index), &mut hashes);
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&h0[block][..16]);
        if block % 16 == 0 {
            iv[1] ^= index as u8;
        }
        crypto::encrypt_cbc(key, iv, payload);
        out.extend_from_slice(&hashes);
        out.extend_from_slice(payload);
    }
    HashedContent { data: out, h3 }
}

/// An FST entry as it gets written, with its name instead of a name offset.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub entry_type: u8,
    pub name: String,
    pub offset: u32,
    pub length: u32,
    pub flags: u16,
    pub content_id: u16,
}

impl RawEntry {
    pub fn dir(name: &str, parent: u32, next: u32) -> Self {
        RawEntry { entry_type: 0x01, name: name.to_string(), offset: parent, length: next, flags: 0, content_id: 0 }
    }

    pub fn file(name: &str, offset: u32, length: u32, flags: u16, content_id: u16) -> Self {
        RawEntry { entry_type: 0x00, name: name.to_string(), offset, length, flags, content_id }
    }
}

/// Builds FST data with one partition, a root entry and the given entries after it.
pub fn fst_bytes(entries: &[RawEntry]) -> Vec<u8> {
    let mut names: Vec<u8> = vec![0];
    let mut table: Vec<u8> = Vec::new();
    table.write_u32::<BigEndian>(0x01000000).unwrap();
    table.write_u32::<BigEndian>(0).unwrap();
    table.write_u32::<BigEndian>(entries.len() as u32 + 1).unwrap();
    table.write_u16::<BigEndian>(0).unwrap();
    table.write_u16::<BigEndian>(0).unwrap();
    for entry in entries {
        let name_offset = names.len() as u32;
        names.extend_from_slice(entry.name.as_bytes());
        names.push(0);
        table.write_u32::<BigEndian>(((entry.entry_type as u32) << 24) | name_offset).unwrap();
        table.write_u32::<BigEndian>(entry.offset).unwrap();
        table.write_u32::<BigEndian>(entry.length).unwrap();
        table.write_u16::<BigEndian>(entry.flags).unwrap();
        table.write_u16::<BigEndian>(entry.content_id).unwrap();
    }

    let mut buf: Vec<u8> = Vec::new();
    buf.write_u32::<BigEndian>(FST_MAGIC).unwrap();
    buf.write_u32::<BigEndian>(0x20).unwrap();
    buf.write_u32::<BigEndian>(1).unwrap();
    buf.extend_from_slice(&[0; 0x14]);
    buf.write_u32::<BigEndian>(0).unwrap();
    buf.write_u32::<BigEndian>(0).unwrap();
    buf.extend_from_slice(&TITLE_ID);
    buf.write_u32::<BigEndian>(0).unwrap();
    buf.extend_from_slice(&[0; 12]);
    buf.extend_from_slice(&table);
    buf.extend_from_slice(&names);
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixtureKind {
    Plain,
    PlainBytes,
    Hashed,
    Skipped,
}

/// A file to place in a fixture title, addressed by its "/" separated path.
#[derive(Debug, Clone)]
pub struct FixtureFile {
    path: String,
    len: usize,
    kind: FixtureKind,
}

impl FixtureFile {
    /// A file in the unhashed content, at an offset stored in 32-byte units.
    pub fn plain(path: &str, len: usize) -> Self {
        FixtureFile { path: path.to_string(), len, kind: FixtureKind::Plain }
    }

    /// A file in the unhashed content, at an unaligned offset stored in bytes.
    pub fn plain_bytes(path: &str, len: usize) -> Self {
        FixtureFile { path: path.to_string(), len, kind: FixtureKind::PlainBytes }
    }

    /// A file in the hashed content.
    pub fn hashed(path: &str, len: usize) -> Self {
        FixtureFile { path: path.to_string(), len, kind: FixtureKind::Hashed }
    }

    /// An entry that is marked as skipped and has no data.
    pub fn skipped(path: &str) -> Self {
        FixtureFile { path: path.to_string(), len: 0, kind: FixtureKind::Skipped }
    }
}

/// A complete encrypted title in a temporary download directory.
pub struct TitleFixture {
    pub source: TempDir,
    pub tmd: TMD,
    /// The decrypted FST of the title.
    pub fst: Vec<u8>,
    expected: BTreeMap<String, Vec<u8>>,
}

impl TitleFixture {
    /// Gets the contents every extracted file should have, keyed by "/" separated path.
    pub fn expected(&self) -> BTreeMap<String, Vec<u8>> {
        self.expected.clone()
    }
}

enum Node {
    Dir(BTreeMap<String, Node>),
    File(usize),
}

struct FixtureBuilder<'a> {
    files: &'a [FixtureFile],
    entries: Vec<RawEntry>,
    plain: Vec<u8>,
    hashed: Vec<u8>,
    expected: BTreeMap<String, Vec<u8>>,
}

fn align(buf: &mut Vec<u8>, alignment: usize) {
    buf.resize(buf.len().div_ceil(alignment) * alignment, 0);
}

impl FixtureBuilder<'_> {
    fn emit(&mut self, children: &BTreeMap<String, Node>, parent: u32, prefix: &str) {
        for (name, node) in children {
            let path = if prefix.is_empty() { name.clone() } else { format!("{}/{}", prefix, name) };
            match node {
                Node::Dir(grandchildren) => {
                    let position = self.entries.len();
                    self.entries.push(RawEntry::dir(name, parent, 0));
                    self.emit(grandchildren, position as u32 + 1, &path);
                    self.entries[position].length = self.entries.len() as u32 + 1;
                }
                Node::File(file_index) => {
                    let files = self.files;
                    let entry = self.add_file(name, &files[*file_index], &path, *file_index as u8);
                    self.entries.push(entry);
                }
            }
        }
    }

    fn add_file(&mut self, name: &str, file: &FixtureFile, path: &str, seed: u8) -> RawEntry {
        let data = pattern(file.len, seed.wrapping_mul(13).wrapping_add(1));
        let entry = match file.kind {
            FixtureKind::Plain => {
                align(&mut self.plain, 32);
                let offset = self.plain.len();
                self.plain.extend_from_slice(&data);
                RawEntry::file(name, (offset >> 5) as u32, file.len as u32, 0, 1)
            }
            FixtureKind::PlainBytes => {
                align(&mut self.plain, 32);
                self.plain.extend_from_slice(&[0xEE; 3]);
                let offset = self.plain.len();
                self.plain.extend_from_slice(&data);
                RawEntry::file(name, offset as u32, file.len as u32, 0x0004, 1)
            }
            FixtureKind::Hashed => {
                align(&mut self.hashed, 32);
                let offset = self.hashed.len();
                self.hashed.extend_from_slice(&data);
                RawEntry::file(name, (offset >> 5) as u32, file.len as u32, 0x0400, 2)
            }
            FixtureKind::Skipped => {
                return RawEntry { entry_type: 0x80, ..RawEntry::file(name, 0, 0, 0, 1) };
            }
        };
        self.expected.insert(path.to_string(), data);
        entry
    }
}

/// Builds a download directory holding a title with the given files. The title always has three
/// contents: the FST, an unhashed content and a hashed content with its .h3 file.
pub fn title_fixture(files: &[FixtureFile]) -> TitleFixture {
    let mut root: BTreeMap<String, Node> = BTreeMap::new();
    for (file_index, file) in files.iter().enumerate() {
        let parts: Vec<&str> = file.path.split('/').collect();
        let (file_name, dirs) = parts.split_last().unwrap();
        let mut dir = &mut root;
        for part in dirs {
            dir = match dir.entry(part.to_string()).or_insert_with(|| Node::Dir(BTreeMap::new())) {
                Node::Dir(children) => children,
                Node::File(_) => panic!("{} is used as both a file and a directory", part),
            };
        }
        dir.insert(file_name.to_string(), Node::File(file_index));
    }
    let mut builder = FixtureBuilder {
        files,
        entries: Vec::new(),
        plain: Vec::new(),
        hashed: Vec::new(),
        expected: BTreeMap::new(),
    };
    builder.emit(&root, 0, "");
    write_title(fst_bytes(&builder.entries), &builder.plain, &builder.hashed, builder.expected)
}

/// Builds a download directory from hand-written FST entries, with `plain_blob` as the unhashed
/// content and an empty hashed content.
pub fn title_fixture_from_entries(entries: Vec<RawEntry>, plain_blob: &[u8]) -> TitleFixture {
    write_title(fst_bytes(&entries), plain_blob, &[], BTreeMap::new())
}

fn write_title(fst: Vec<u8>, plain: &[u8], hashed: &[u8], expected: BTreeMap<String, Vec<u8>>) -> TitleFixture {
    let source = tempfile::tempdir().unwrap();
    let dir = source.path();

    let fst_enc = crypto::encrypt_content(&fst, TITLE_KEY, 0);
    let mut fst_padded = fst.clone();
    fst_padded.resize(fst_enc.len(), 0);
    let mut fst_record = record(FST_CONTENT_ID, 0, ContentType::ENCRYPTED | ContentType::CONTENT, fst_enc.len() as u64);
    fst_record.content_hash = padded_hash(&fst_padded);
    fs::write(dir.join("0000000a.app"), &fst_enc).unwrap();

    let plain_enc = crypto::encrypt_content(plain, TITLE_KEY, 1);
    let mut plain_padded = plain.to_vec();
    plain_padded.resize(plain_enc.len(), 0);
    let mut plain_record = record(PLAIN_CONTENT_ID, 1, ContentType::ENCRYPTED | ContentType::CONTENT, plain_enc.len() as u64);
    plain_record.content_hash = padded_hash(&plain_padded);
    fs::write(dir.join("0000000B.app"), &plain_enc).unwrap();

    let hashed_content = hashed_content(hashed, TITLE_KEY, 2);
    let mut hashed_record = record(
        HASHED_CONTENT_ID,
        2,
        ContentType::ENCRYPTED | ContentType::HASHED | ContentType::CONTENT,
        hashed_content.data.len() as u64,
    );
    hashed_record.content_hash = padded_hash(&hashed_content.h3);
    fs::write(dir.join("0000000c"), &hashed_content.data).unwrap();
    fs::write(dir.join("0000000C.h3"), &hashed_content.h3).unwrap();

    let tmd_data = tmd_bytes(TITLE_ID, RETAIL_TMD_ISSUER, &[fst_record, plain_record, hashed_record]);
    fs::write(dir.join("title.tmd"), &tmd_data).unwrap();
    let title_key_enc = crypto::encrypt_title_key(TITLE_KEY, KeyFamily::Retail, TITLE_ID);
    let ticket = Ticket::new(TITLE_ID, title_key_enc, 0);
    fs::write(dir.join("title.tik"), ticket.to_bytes().unwrap()).unwrap();

    TitleFixture {
        source,
        tmd: TMD::from_bytes(&tmd_data).unwrap(),
        fst,
        expected,
    }
}
