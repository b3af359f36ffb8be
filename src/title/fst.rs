// title/fst.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Implements parsing of the FST (File System Table) stored in content 0 of a Wii U title, and
// extraction of the files it describes.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;
use tracing::{debug, info};
use crate::title::content::{self, ContentDecryptor, ContentError};
use crate::title::tmd::TMD;

pub const FST_MAGIC: u32 = 0x46535400;
/// Largest partition or entry count accepted from an FST.
pub const MAX_ENTRIES: u32 = 90000;
/// Deepest directory nesting accepted from an FST.
pub const MAX_LEVELS: usize = 16;

const FST_HEADER_SIZE: usize = 0x20;
const FST_INFO_SIZE: usize = 0x20;
const FENTRY_SIZE: usize = 0x10;

const ENTRY_TYPE_DIRECTORY: u8 = 0x01;
const ENTRY_TYPE_SKIP: u8 = 0x80;
const ENTRY_FLAG_BYTE_OFFSET: u16 = 0x0004;
const ENTRY_FLAG_HASHED: u16 = 0x0440;

#[derive(Debug, Error)]
pub enum FSTError {
    #[error("data is not a valid FST (magic was `{0:08X}`)")]
    NotFSTData(u32),
    #[error("FST has too many entries ({0}, at most 90000 are allowed)")]
    TooManyEntries(u32),
    #[error("FST entry {0} is nested more than 16 directories deep")]
    TooManyLevels(u32),
    #[error("FST entry {0} has a name offset outside of the name table")]
    InvalidNameOffset(u32),
    #[error("FST entry {index} has an invalid name `{name}`")]
    InvalidFileName { index: u32, name: String },
    #[error("FST entry {index} is a directory that ends at invalid entry {next}")]
    InvalidDirectory { index: u32, next: u32 },
    #[error("FST entry {index} references content {content_id}, which is not in the TMD")]
    InvalidContentReference { index: u32, content_id: u16 },
    #[error("extraction was cancelled")]
    Cancelled,
    #[error("output path `{path}` could not be created")]
    Output { path: PathBuf, source: std::io::Error },
    #[error("content could not be decrypted")]
    Content(#[from] ContentError),
    #[error("FST data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// The header at the start of an FST.
#[derive(Debug, Clone)]
pub struct FSTHeader {
    pub magic: u32,
    pub offset_factor: u32,
    pub partition_count: u32,
    pub reserved: [u32; 5],
}

/// A partition descriptor from an FST.
#[derive(Debug, Clone)]
pub struct FSTInfo {
    pub offset: u32,
    pub size: u32,
    pub owner_title_id: u64,
    pub group_id: u32,
    pub hash_mode: u8,
    pub reserved: [u8; 11],
}

/// One entry in an FST's entry table, which is either a directory or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FEntry {
    pub entry_type: u8,
    pub name_offset: u32,
    /// The file offset for files, or the parent's index for directories.
    pub offset: u32,
    /// The file length for files, or the index past the last child for directories.
    pub length: u32,
    pub flags: u16,
    pub content_id: u16,
}

impl FEntry {
    fn read(buf: &mut Cursor<&[u8]>) -> Result<Self, std::io::Error> {
        let type_name = buf.read_u32::<BigEndian>()?;
        Ok(FEntry {
            entry_type: (type_name >> 24) as u8,
            name_offset: type_name & 0x00FFFFFF,
            offset: buf.read_u32::<BigEndian>()?,
            length: buf.read_u32::<BigEndian>()?,
            flags: buf.read_u16::<BigEndian>()?,
            content_id: buf.read_u16::<BigEndian>()?,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type & ENTRY_TYPE_DIRECTORY != 0
    }

    /// Gets whether the entry only marks content and has no file data to extract.
    pub fn is_skipped(&self) -> bool {
        self.entry_type & ENTRY_TYPE_SKIP != 0
    }

    /// Gets whether the content backing the entry uses the hash tree.
    pub fn is_hashed(&self) -> bool {
        self.flags & ENTRY_FLAG_HASHED != 0
    }

    /// Gets the offset of the file in its content in bytes. Offsets are stored in 32-byte units
    /// unless the entry says otherwise.
    pub fn byte_offset(&self) -> u64 {
        if self.flags & ENTRY_FLAG_BYTE_OFFSET != 0 {
            self.offset as u64
        } else {
            (self.offset as u64) << 5
        }
    }

    /// For a directory, gets the index one past its last descendant.
    pub fn next_offset(&self) -> u32 {
        self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FSTItemKind {
    Directory,
    File,
}

/// An entry of an FST along with the path it extracts to, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FSTItem {
    pub index: u32,
    pub path: PathBuf,
    pub kind: FSTItemKind,
}

/// A structure that represents the FST of a Wii U title.
#[derive(Debug, Clone)]
pub struct FST {
    header: FSTHeader,
    infos: Vec<FSTInfo>,
    entries: Vec<FEntry>,
    names: Vec<u8>,
}

impl FST {
    /// Creates a new FST instance from decrypted FST data. The magic number and the partition and
    /// entry counts are checked before anything else is read.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FSTError> {
        let mut buf = Cursor::new(data);
        let magic = buf.read_u32::<BigEndian>()?;
        if magic != FST_MAGIC {
            return Err(FSTError::NotFSTData(magic));
        }
        let offset_factor = buf.read_u32::<BigEndian>()?;
        let partition_count = buf.read_u32::<BigEndian>()?;
        if partition_count > MAX_ENTRIES {
            return Err(FSTError::TooManyEntries(partition_count));
        }
        let mut reserved = [0u32; 5];
        buf.read_u32_into::<BigEndian>(&mut reserved)?;
        let header = FSTHeader { magic, offset_factor, partition_count, reserved };
        let table_offset = FST_HEADER_SIZE + partition_count as usize * FST_INFO_SIZE;
        if data.len() < table_offset + FENTRY_SIZE {
            return Err(FSTError::IO(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
        }
        let mut infos = Vec::with_capacity(partition_count as usize);
        for _ in 0..partition_count {
            let offset = buf.read_u32::<BigEndian>()?;
            let size = buf.read_u32::<BigEndian>()?;
            let owner_title_id = buf.read_u64::<BigEndian>()?;
            let group_id = buf.read_u32::<BigEndian>()?;
            let hash_mode = buf.read_u8()?;
            let mut info_reserved = [0u8; 11];
            buf.read_exact(&mut info_reserved)?;
            infos.push(FSTInfo { offset, size, owner_title_id, group_id, hash_mode, reserved: info_reserved });
        }
        // The root entry's length is the number of entries in the whole table.
        let root = FEntry::read(&mut buf)?;
        let entry_count = root.length;
        if entry_count > MAX_ENTRIES {
            return Err(FSTError::TooManyEntries(entry_count));
        }
        let names_offset = table_offset + entry_count.max(1) as usize * FENTRY_SIZE;
        if data.len() < names_offset {
            return Err(FSTError::IO(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
        }
        let mut entries = Vec::with_capacity(entry_count as usize);
        entries.push(root);
        for _ in 1..entry_count {
            entries.push(FEntry::read(&mut buf)?);
        }
        Ok(FST {
            header,
            infos,
            entries,
            names: data[names_offset..].to_vec(),
        })
    }

    pub fn header(&self) -> &FSTHeader {
        &self.header
    }

    /// Gets the partition descriptors of the FST.
    pub fn infos(&self) -> &[FSTInfo] {
        &self.infos
    }

    /// Gets all entries of the FST, starting with the root.
    pub fn entries(&self) -> &[FEntry] {
        &self.entries
    }

    /// Gets the number of entries in the FST, including the root.
    pub fn entry_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Gets the name of an entry from the name table. Names are checked so that they can only
    /// ever name a single path component.
    pub fn name(&self, index: u32) -> Result<&str, FSTError> {
        let entry = self.entries.get(index as usize).ok_or(FSTError::InvalidNameOffset(index))?;
        let start = entry.name_offset as usize;
        let tail = self.names.get(start..).ok_or(FSTError::InvalidNameOffset(index))?;
        let len = tail.iter().position(|b| *b == 0).ok_or(FSTError::InvalidNameOffset(index))?;
        let name = std::str::from_utf8(&tail[..len]).map_err(|_| FSTError::InvalidFileName {
            index,
            name: String::from_utf8_lossy(&tail[..len]).into_owned(),
        })?;
        let mut components = Path::new(name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal || name.contains(['/', '\\']) {
            return Err(FSTError::InvalidFileName { index, name: name.to_string() });
        }
        Ok(name)
    }

    /// Walks the entry table in order and works out the relative path of every directory and
    /// file. Open directories are tracked on a stack that is limited to 16 levels.
    pub fn walk(&self) -> Result<Vec<FSTItem>, FSTError> {
        let count = self.entry_count();
        let mut stack: Vec<u32> = Vec::with_capacity(MAX_LEVELS);
        let mut dir_path = PathBuf::new();
        let mut items = Vec::with_capacity(count as usize);
        for index in 1..count {
            // Close every directory whose children end here.
            while stack.last().is_some_and(|end| *end <= index) {
                stack.pop();
                dir_path.pop();
            }
            let entry = &self.entries[index as usize];
            let name = self.name(index)?;
            let path = dir_path.join(name);
            if entry.is_dir() {
                let next = entry.next_offset();
                if next <= index || next > count {
                    return Err(FSTError::InvalidDirectory { index, next });
                }
                if stack.len() == MAX_LEVELS {
                    return Err(FSTError::TooManyLevels(index));
                }
                stack.push(next);
                dir_path.push(name);
                items.push(FSTItem { index, path, kind: FSTItemKind::Directory });
            } else {
                items.push(FSTItem { index, path, kind: FSTItemKind::File });
            }
        }
        Ok(items)
    }
}

/// Options that control an extraction.
#[derive(Default)]
pub struct ExtractOptions<'a> {
    /// Checked before every file. Once it is set, extraction stops with `FSTError::Cancelled`.
    pub cancel_flag: Option<&'a AtomicBool>,
    /// Called after every file entry with the number of entries processed and the total. The last
    /// call always reports the total, even when the FST ends with directory entries.
    pub progress: Option<&'a mut dyn FnMut(u32, u32)>,
}

/// Counts of what an extraction did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: u32,
    pub skipped: u32,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractState {
    Idle,
    HeaderValidated,
    Walking,
    Done,
    Aborted,
}

// A file entry with everything needed to extract it resolved ahead of time.
struct PlannedFile {
    item: FSTItem,
    entry: FEntry,
    content_id: u32,
}

/// Extracts the files described by an FST from a title's encrypted contents.
pub struct FSTExtractor<'a> {
    tmd: &'a TMD,
    decryptor: &'a ContentDecryptor,
    source_dir: &'a Path,
    state: ExtractState,
}

impl<'a> FSTExtractor<'a> {
    /// Creates a new extractor for the contents of a title stored in `source_dir`.
    pub fn new(tmd: &'a TMD, decryptor: &'a ContentDecryptor, source_dir: &'a Path) -> Self {
        FSTExtractor { tmd, decryptor, source_dir, state: ExtractState::Idle }
    }

    /// Gets the state the extractor is in.
    pub fn state(&self) -> ExtractState {
        self.state
    }

    /// Extracts every file in the FST to `dest_dir`. The whole table is walked and checked before
    /// anything is written, so a malformed FST leaves `dest_dir` untouched. Any failure after that
    /// stops the extraction and leaves already extracted files in place.
    pub fn extract(&mut self, fst_data: &[u8], dest_dir: &Path, options: ExtractOptions) -> Result<ExtractSummary, FSTError> {
        let result = self.run(fst_data, dest_dir, options);
        self.state = if result.is_ok() { ExtractState::Done } else { ExtractState::Aborted };
        result
    }

    fn plan(&self, fst: &FST) -> Result<Vec<PlannedFile>, FSTError> {
        let mut planned = Vec::new();
        for item in fst.walk()? {
            if item.kind != FSTItemKind::File {
                continue;
            }
            let entry = fst.entries()[item.index as usize];
            let record = self.tmd.content_record(entry.content_id as usize).ok_or(
                FSTError::InvalidContentReference { index: item.index, content_id: entry.content_id }
            )?;
            planned.push(PlannedFile { item, entry, content_id: record.content_id });
        }
        Ok(planned)
    }

    fn run(&mut self, fst_data: &[u8], dest_dir: &Path, mut options: ExtractOptions) -> Result<ExtractSummary, FSTError> {
        let fst = FST::from_bytes(fst_data)?;
        self.state = ExtractState::HeaderValidated;
        let total = fst.entry_count();
        info!(partitions = fst.header().partition_count, entries = total, "FST header validated");
        let planned = self.plan(&fst)?;
        self.state = ExtractState::Walking;
        fs::create_dir_all(dest_dir).map_err(|e| FSTError::Output { path: dest_dir.to_path_buf(), source: e })?;
        let mut summary = ExtractSummary::default();
        let mut reported = 0;
        for file in planned {
            if options.cancel_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                info!(index = file.item.index, "extraction cancelled");
                return Err(FSTError::Cancelled);
            }
            let entry = file.entry;
            let dst = dest_dir.join(&file.item.path);
            debug!(
                size = entry.length,
                offset = entry.byte_offset(),
                content = entry.content_id,
                flags = entry.flags,
                path = %file.item.path.display(),
                "FST file entry"
            );
            if entry.is_skipped() {
                summary.skipped += 1;
            } else {
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent).map_err(|e| FSTError::Output { path: parent.to_path_buf(), source: e })?;
                }
                let src = content::find_content_file(self.source_dir, file.content_id)?;
                self.decryptor.decrypt_content_file(
                    &src,
                    &dst,
                    entry.byte_offset(),
                    entry.length as u64,
                    entry.content_id,
                    entry.is_hashed(),
                )?;
                summary.files += 1;
                summary.bytes += entry.length as u64;
            }
            if let Some(progress) = options.progress.as_mut() {
                reported = file.item.index + 1;
                progress(reported, total);
            }
        }
        // Trailing directory entries never report on their own.
        if let Some(progress) = options.progress.as_mut() {
            if reported != total {
                progress(total, total);
            }
        }
        info!(files = summary.files, skipped = summary.skipped, bytes = summary.bytes, "extraction finished");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use walkdir::WalkDir;
    use crate::title::testdata::{self, FixtureFile, RawEntry};

    fn extracted_files(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let rel = entry.path().strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/");
                (rel, fs::read(entry.path()).unwrap())
            })
            .collect()
    }

    fn nested_entries(depth: u32) -> Vec<RawEntry> {
        // Entry i (1-based) is a directory holding everything after it; the last entry is a file.
        let count = depth + 2;
        let mut entries: Vec<RawEntry> = (1..=depth)
            .map(|i| RawEntry::dir(&format!("d{}", i), i - 1, count))
            .collect();
        entries.push(RawEntry::file("deep.bin", 0, 0x10, 0, 1));
        entries
    }

    #[test]
    fn test_parse_fst() {
        let data = testdata::fst_bytes(&[
            RawEntry::file("a.bin", 0, 10, 0, 1),
            RawEntry::dir("sub", 0, 4),
            RawEntry::file("b.bin", 1, 20, 0x0004, 2),
        ]);
        let fst = FST::from_bytes(&data).unwrap();
        assert_eq!(fst.header().magic, FST_MAGIC);
        assert_eq!(fst.header().partition_count, 1);
        assert_eq!(fst.infos().len(), 1);
        assert_eq!(fst.entry_count(), 4);
        assert!(fst.entries()[0].is_dir());
        assert_eq!(fst.name(1).unwrap(), "a.bin");
        assert_eq!(fst.name(2).unwrap(), "sub");
        assert_eq!(fst.entries()[1].byte_offset(), 0);
        assert_eq!(fst.entries()[3].byte_offset(), 1);
        let items = fst.walk().unwrap();
        assert_eq!(items, vec![
            FSTItem { index: 1, path: PathBuf::from("a.bin"), kind: FSTItemKind::File },
            FSTItem { index: 2, path: PathBuf::from("sub"), kind: FSTItemKind::Directory },
            FSTItem { index: 3, path: PathBuf::from("sub").join("b.bin"), kind: FSTItemKind::File },
        ]);
    }

    #[test]
    fn test_entry_flags() {
        let entry = FEntry { entry_type: 0x80, name_offset: 0, offset: 3, length: 0, flags: 0x0400, content_id: 0 };
        assert!(entry.is_skipped());
        assert!(!entry.is_dir());
        assert!(entry.is_hashed());
        assert_eq!(entry.byte_offset(), 0x60);
        let entry = FEntry { flags: 0x0044, ..entry };
        assert!(entry.is_hashed());
        assert_eq!(entry.byte_offset(), 3);
    }

    #[test]
    fn test_directories_close() {
        let data = testdata::fst_bytes(&[
            RawEntry::dir("x", 0, 4),
            RawEntry::dir("y", 1, 4),
            RawEntry::file("in_y.bin", 0, 1, 0, 1),
            RawEntry::file("top.bin", 0, 1, 0, 1),
        ]);
        let fst = FST::from_bytes(&data).unwrap();
        let paths: Vec<PathBuf> = fst.walk().unwrap().into_iter().map(|item| item.path).collect();
        assert_eq!(paths, vec![
            PathBuf::from("x"),
            PathBuf::from("x").join("y"),
            PathBuf::from("x").join("y").join("in_y.bin"),
            PathBuf::from("top.bin"),
        ]);
    }

    #[test]
    fn test_not_fst() {
        let mut data = testdata::fst_bytes(&[]);
        data[0] = 0;
        assert!(matches!(FST::from_bytes(&data), Err(FSTError::NotFSTData(0x00535400))));
    }

    #[test]
    fn test_too_many_entries() {
        let mut data = testdata::fst_bytes(&[]);
        data[8..12].copy_from_slice(&90001u32.to_be_bytes());
        assert!(matches!(FST::from_bytes(&data), Err(FSTError::TooManyEntries(90001))));
        let mut data = testdata::fst_bytes(&[]);
        // Root entry length, right after the header and the single partition.
        data[0x48..0x4C].copy_from_slice(&90001u32.to_be_bytes());
        assert!(matches!(FST::from_bytes(&data), Err(FSTError::TooManyEntries(90001))));
    }

    #[test]
    fn test_truncated_table() {
        let mut data = testdata::fst_bytes(&[RawEntry::file("a.bin", 0, 10, 0, 1)]);
        data[0x48..0x4C].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(FST::from_bytes(&data), Err(FSTError::IO(_))));
        assert!(matches!(FST::from_bytes(&data[..0x30]), Err(FSTError::IO(_))));
    }

    #[test]
    fn test_too_many_levels() {
        let fst = FST::from_bytes(&testdata::fst_bytes(&nested_entries(16))).unwrap();
        let items = fst.walk().unwrap();
        assert_eq!(items.last().unwrap().path.components().count(), 17);
        let fst = FST::from_bytes(&testdata::fst_bytes(&nested_entries(17))).unwrap();
        assert!(matches!(fst.walk(), Err(FSTError::TooManyLevels(17))));
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["..", ".", "a/b", "a\\b", ""] {
            let fst = FST::from_bytes(&testdata::fst_bytes(&[RawEntry::file(bad, 0, 1, 0, 1)])).unwrap();
            assert!(matches!(fst.walk(), Err(FSTError::InvalidFileName { index: 1, .. })), "name {:?}", bad);
        }
        let mut fst = FST::from_bytes(&testdata::fst_bytes(&[RawEntry::file("a", 0, 1, 0, 1)])).unwrap();
        fst.entries[1].name_offset = 0x00FFFFFF;
        assert!(matches!(fst.walk(), Err(FSTError::InvalidNameOffset(1))));
    }

    #[test]
    fn test_invalid_directory() {
        let fst = FST::from_bytes(&testdata::fst_bytes(&[RawEntry::dir("d", 0, 9)])).unwrap();
        assert!(matches!(fst.walk(), Err(FSTError::InvalidDirectory { index: 1, next: 9 })));
    }

    #[test]
    fn test_extract_two_files() {
        let fixture = testdata::title_fixture(&[
            FixtureFile::plain("a.bin", 10),
            FixtureFile::plain("sub/b.bin", 20),
        ]);
        let dest = tempfile::tempdir().unwrap();
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        assert_eq!(extractor.state(), ExtractState::Idle);
        let summary = extractor.extract(&fixture.fst, dest.path(), ExtractOptions::default()).unwrap();
        assert_eq!(extractor.state(), ExtractState::Done);
        assert_eq!(summary, ExtractSummary { files: 2, skipped: 0, bytes: 30 });
        let files = extracted_files(dest.path());
        assert_eq!(files.len(), 2);
        assert_eq!(files["a.bin"].len(), 10);
        assert_eq!(files["sub/b.bin"].len(), 20);
        assert_eq!(files, fixture.expected());
    }

    #[test]
    fn test_extract_many_files() {
        let fixture = testdata::title_fixture(&[
            FixtureFile::plain("root.txt", 0x21),
            FixtureFile::plain("code/app.rpx", 0x9001),
            FixtureFile::plain_bytes("code/app.xml", 0x155),
            FixtureFile::hashed("content/data/level1.bin", 0x10000),
            FixtureFile::hashed("content/data/level2.bin", 0x123),
            FixtureFile::hashed("content/empty.bin", 0),
            FixtureFile::plain("meta/meta.xml", 0x400),
        ]);
        let dest = tempfile::tempdir().unwrap();
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        let summary = extractor.extract(&fixture.fst, dest.path(), ExtractOptions::default()).unwrap();
        assert_eq!(summary.files, 7);
        assert_eq!(extracted_files(dest.path()), fixture.expected());
    }

    #[test]
    fn test_extract_skipped_entry() {
        let fixture = testdata::title_fixture(&[
            FixtureFile::plain("kept.bin", 0x40),
            FixtureFile::skipped("marker/skip.bin"),
        ]);
        let dest = tempfile::tempdir().unwrap();
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        let summary = extractor.extract(&fixture.fst, dest.path(), ExtractOptions::default()).unwrap();
        assert_eq!(summary, ExtractSummary { files: 1, skipped: 1, bytes: 0x40 });
        assert!(!dest.path().join("marker").exists());
        assert_eq!(extracted_files(dest.path()).len(), 1);
    }

    #[test]
    fn test_extract_too_deep_writes_nothing() {
        let fixture = testdata::title_fixture_from_entries(nested_entries(17), &[0u8; 0x20]);
        let dest = tempfile::tempdir().unwrap();
        let out = dest.path().join("out");
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        let result = extractor.extract(&fixture.fst, &out, ExtractOptions::default());
        assert!(matches!(result, Err(FSTError::TooManyLevels(_))));
        assert_eq!(extractor.state(), ExtractState::Aborted);
        assert!(!out.exists());
    }

    #[test]
    fn test_extract_bad_content_reference() {
        let entries = vec![RawEntry::file("a.bin", 0, 0x10, 0, 7)];
        let fixture = testdata::title_fixture_from_entries(entries, &[0u8; 0x20]);
        let dest = tempfile::tempdir().unwrap();
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        let result = extractor.extract(&fixture.fst, dest.path(), ExtractOptions::default());
        assert!(matches!(result, Err(FSTError::InvalidContentReference { index: 1, content_id: 7 })));
    }

    #[test]
    fn test_extract_missing_content() {
        let fixture = testdata::title_fixture(&[FixtureFile::plain("a.bin", 10)]);
        for entry in fs::read_dir(fixture.source.path()).unwrap() {
            let path = entry.unwrap().path();
            if path.file_name().unwrap().to_string_lossy().starts_with("0000000B") {
                fs::remove_file(path).unwrap();
            }
        }
        let dest = tempfile::tempdir().unwrap();
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        let result = extractor.extract(&fixture.fst, dest.path(), ExtractOptions::default());
        assert!(matches!(result, Err(FSTError::Content(ContentError::ContentNotFound(0x0B, _)))));
    }

    #[test]
    fn test_extract_cancel_and_progress() {
        let fixture = testdata::title_fixture(&[
            FixtureFile::plain("one.bin", 1),
            FixtureFile::plain("two.bin", 2),
            FixtureFile::plain("three.bin", 3),
        ]);
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);

        let dest = tempfile::tempdir().unwrap();
        let mut reports = Vec::new();
        let mut record = |done: u32, total: u32| reports.push((done, total));
        let options = ExtractOptions { cancel_flag: None, progress: Some(&mut record) };
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        extractor.extract(&fixture.fst, dest.path(), options).unwrap();
        assert_eq!(reports, vec![(2, 4), (3, 4), (4, 4)]);

        let dest = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let mut seen = 0;
        let mut cancel_after_first = |_: u32, _: u32| {
            seen += 1;
            cancel.store(true, Ordering::Relaxed);
        };
        let options = ExtractOptions { cancel_flag: Some(&cancel), progress: Some(&mut cancel_after_first) };
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        let result = extractor.extract(&fixture.fst, dest.path(), options);
        assert!(matches!(result, Err(FSTError::Cancelled)));
        assert_eq!(extractor.state(), ExtractState::Aborted);
        assert_eq!(seen, 1);
        assert_eq!(extracted_files(dest.path()).len(), 1);
    }

    #[test]
    fn test_extract_progress_ends_at_total() {
        let fixture = testdata::title_fixture_from_entries(
            vec![RawEntry::file("a.bin", 0, 0x10, 0, 1), RawEntry::dir("empty", 0, 3)],
            &[0u8; 0x20],
        );
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let dest = tempfile::tempdir().unwrap();
        let mut reports = Vec::new();
        let mut record = |done: u32, total: u32| reports.push((done, total));
        let options = ExtractOptions { cancel_flag: None, progress: Some(&mut record) };
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        extractor.extract(&fixture.fst, dest.path(), options).unwrap();
        assert_eq!(reports, vec![(2, 3), (3, 3)]);
        assert!(!dest.path().join("empty").exists());
    }

    #[test]
    fn test_extract_corrupt_hashed_content() {
        let fixture = testdata::title_fixture(&[FixtureFile::hashed("data.bin", 0x200)]);
        let path = content::find_content_file(fixture.source.path(), 0x0C).unwrap();
        let mut data = fs::read(&path).unwrap();
        data[0x400 + 0x80] ^= 0x01;
        fs::write(&path, data).unwrap();
        let dest = tempfile::tempdir().unwrap();
        let decryptor = ContentDecryptor::new(testdata::TITLE_KEY);
        let mut extractor = FSTExtractor::new(&fixture.tmd, &decryptor, fixture.source.path());
        let result = extractor.extract(&fixture.fst, dest.path(), ExtractOptions::default());
        assert!(matches!(result, Err(FSTError::Content(ContentError::HashMismatch { block: 0, .. }))));
    }
}
