// title/tmd.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Implements the structures and methods required for Wii U TMD parsing.

use std::fmt;
use std::io::{Cursor, Read, Write};
use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;
use crate::title::commonkeys::KeyFamily;

/// Number of content info records that every Wii U TMD carries.
pub const CONTENT_INFO_COUNT: usize = 64;
/// Size of the TMD header before the content info records.
pub const TMD_HEADER_SIZE: usize = 0x204;
/// Size of the TMD before the content records start.
pub const CONTENT_RECORDS_OFFSET: usize = TMD_HEADER_SIZE + CONTENT_INFO_COUNT * 0x24;

#[derive(Debug, Error)]
pub enum TMDError {
    #[error("unsupported TMD version `{0}`, only version 1 (Wii U) TMDs are supported")]
    UnsupportedVersion(u8),
    #[error("TMD data is not in a valid format")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleType {
    Game,
    Demo,
    SystemApplication,
    SystemData,
    Applet,
    Update,
    DLC,
    VWiiIOS,
    Unknown(u32),
}

impl From<u32> for TitleType {
    fn from(tid_high: u32) -> Self {
        match tid_high {
            0x00050000 => TitleType::Game,
            0x00050002 => TitleType::Demo,
            0x00050010 => TitleType::SystemApplication,
            0x0005001B => TitleType::SystemData,
            0x00050030 => TitleType::Applet,
            0x0005000E => TitleType::Update,
            0x0005000C => TitleType::DLC,
            0x00000007 => TitleType::VWiiIOS,
            other => TitleType::Unknown(other),
        }
    }
}

impl fmt::Display for TitleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TitleType::Game => write!(f, "Game"),
            TitleType::Demo => write!(f, "Demo"),
            TitleType::SystemApplication => write!(f, "System Application"),
            TitleType::SystemData => write!(f, "System Data"),
            TitleType::Applet => write!(f, "Applet"),
            TitleType::Update => write!(f, "Update"),
            TitleType::DLC => write!(f, "DLC"),
            TitleType::VWiiIOS => write!(f, "vWii IOS"),
            TitleType::Unknown(tid_high) => write!(f, "Unknown ({:08X})", tid_high),
        }
    }
}

bitflags! {
    /// The type bits of a content record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ContentType: u16 {
        const ENCRYPTED = 0x0001;
        const HASHED = 0x0002;
        const CONTENT = 0x2000;
        // Recognized, but they don't change how a content is decrypted.
        const OPTIONAL = 0x4000;
        const SHARED = 0x8000;
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(ContentType::ENCRYPTED) { names.push("Encrypted"); }
        if self.contains(ContentType::HASHED) { names.push("Hashed"); }
        if self.contains(ContentType::CONTENT) { names.push("Content"); }
        if self.contains(ContentType::OPTIONAL) { names.push("Optional"); }
        if self.contains(ContentType::SHARED) { names.push("Shared"); }
        if names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

/// A content info record, which describes a range of content records and their combined hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentInfo {
    pub index_offset: u16,
    pub command_count: u16,
    pub hash: [u8; 32],
}

/// A structure that represents the metadata of a content file in a digital Wii U title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub content_id: u32,
    pub index: u16,
    pub content_type: ContentType,
    pub content_size: u64,
    /// SHA-1 of the content (or of its .h3 file for hashed contents), zero-padded to 32 bytes.
    pub content_hash: [u8; 32],
}

impl ContentRecord {
    /// Gets whether the content is stored with the H0-H3 hash tree.
    pub fn is_hashed(&self) -> bool {
        self.content_type.contains(ContentType::HASHED)
    }
}

/// A structure that represents a Wii U TMD (Title Metadata) file.
#[derive(Debug, Clone)]
pub struct TMD {
    signature_type: u32,
    signature: [u8; 256],
    padding1: [u8; 60],
    signature_issuer: [u8; 64],
    tmd_version: u8,
    ca_crl_version: u8,
    signer_crl_version: u8,
    padding2: u8,
    system_version: u64,
    title_id: [u8; 8],
    title_type: u32,
    group_id: u16,
    reserved: [u8; 62],
    access_rights: u32,
    title_version: u16,
    num_contents: u16,
    boot_index: u16,
    padding3: [u8; 2],
    content_info_hash: [u8; 32],
    content_info: Vec<ContentInfo>,
    content_records: Vec<ContentRecord>,
    certificates: Vec<u8>,
}

impl TMD {
    /// Creates a new TMD instance from the binary data of a TMD file. Anything after the content
    /// records is kept as the TMD's certificates.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TMDError> {
        let mut buf = Cursor::new(data);
        let signature_type = buf.read_u32::<BigEndian>()?;
        let mut signature = [0u8; 256];
        buf.read_exact(&mut signature)?;
        let mut padding1 = [0u8; 60];
        buf.read_exact(&mut padding1)?;
        let mut signature_issuer = [0u8; 64];
        buf.read_exact(&mut signature_issuer)?;
        let tmd_version = buf.read_u8()?;
        if tmd_version != 1 {
            return Err(TMDError::UnsupportedVersion(tmd_version));
        }
        let ca_crl_version = buf.read_u8()?;
        let signer_crl_version = buf.read_u8()?;
        let padding2 = buf.read_u8()?;
        let system_version = buf.read_u64::<BigEndian>()?;
        let mut title_id = [0u8; 8];
        buf.read_exact(&mut title_id)?;
        let title_type = buf.read_u32::<BigEndian>()?;
        let group_id = buf.read_u16::<BigEndian>()?;
        let mut reserved = [0u8; 62];
        buf.read_exact(&mut reserved)?;
        let access_rights = buf.read_u32::<BigEndian>()?;
        let title_version = buf.read_u16::<BigEndian>()?;
        let num_contents = buf.read_u16::<BigEndian>()?;
        let boot_index = buf.read_u16::<BigEndian>()?;
        let mut padding3 = [0u8; 2];
        buf.read_exact(&mut padding3)?;
        let mut content_info_hash = [0u8; 32];
        buf.read_exact(&mut content_info_hash)?;
        let mut content_info = Vec::with_capacity(CONTENT_INFO_COUNT);
        for _ in 0..CONTENT_INFO_COUNT {
            let index_offset = buf.read_u16::<BigEndian>()?;
            let command_count = buf.read_u16::<BigEndian>()?;
            let mut hash = [0u8; 32];
            buf.read_exact(&mut hash)?;
            content_info.push(ContentInfo { index_offset, command_count, hash });
        }
        // Build content records by iterating over the rest of the data num_contents times.
        let mut content_records = Vec::with_capacity(num_contents as usize);
        for _ in 0..num_contents {
            let content_id = buf.read_u32::<BigEndian>()?;
            let index = buf.read_u16::<BigEndian>()?;
            let content_type = ContentType::from_bits_retain(buf.read_u16::<BigEndian>()?);
            let content_size = buf.read_u64::<BigEndian>()?;
            let mut content_hash = [0u8; 32];
            buf.read_exact(&mut content_hash)?;
            content_records.push(ContentRecord {
                content_id,
                index,
                content_type,
                content_size,
                content_hash,
            });
        }
        let mut certificates = Vec::new();
        buf.read_to_end(&mut certificates)?;
        Ok(TMD {
            signature_type,
            signature,
            padding1,
            signature_issuer,
            tmd_version,
            ca_crl_version,
            signer_crl_version,
            padding2,
            system_version,
            title_id,
            title_type,
            group_id,
            reserved,
            access_rights,
            title_version,
            num_contents,
            boot_index,
            padding3,
            content_info_hash,
            content_info,
            content_records,
            certificates,
        })
    }

    /// Dumps the data in a TMD back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u32::<BigEndian>(self.signature_type)?;
        buf.write_all(&self.signature)?;
        buf.write_all(&self.padding1)?;
        buf.write_all(&self.signature_issuer)?;
        buf.write_u8(self.tmd_version)?;
        buf.write_u8(self.ca_crl_version)?;
        buf.write_u8(self.signer_crl_version)?;
        buf.write_u8(self.padding2)?;
        buf.write_u64::<BigEndian>(self.system_version)?;
        buf.write_all(&self.title_id)?;
        buf.write_u32::<BigEndian>(self.title_type)?;
        buf.write_u16::<BigEndian>(self.group_id)?;
        buf.write_all(&self.reserved)?;
        buf.write_u32::<BigEndian>(self.access_rights)?;
        buf.write_u16::<BigEndian>(self.title_version)?;
        buf.write_u16::<BigEndian>(self.content_records.len() as u16)?;
        buf.write_u16::<BigEndian>(self.boot_index)?;
        buf.write_all(&self.padding3)?;
        buf.write_all(&self.content_info_hash)?;
        for info in self.content_info.iter() {
            buf.write_u16::<BigEndian>(info.index_offset)?;
            buf.write_u16::<BigEndian>(info.command_count)?;
            buf.write_all(&info.hash)?;
        }
        for content in self.content_records.iter() {
            buf.write_u32::<BigEndian>(content.content_id)?;
            buf.write_u16::<BigEndian>(content.index)?;
            buf.write_u16::<BigEndian>(content.content_type.bits())?;
            buf.write_u64::<BigEndian>(content.content_size)?;
            buf.write_all(&content.content_hash)?;
        }
        buf.write_all(&self.certificates)?;
        Ok(buf)
    }

    /// Gets the type of the signature on the TMD.
    pub fn signature_type(&self) -> u32 {
        self.signature_type
    }

    /// Gets the signature of the TMD.
    pub fn signature(&self) -> [u8; 256] {
        self.signature
    }

    /// Gets the name of the certificate used to sign a TMD as a string.
    pub fn signature_issuer(&self) -> String {
        String::from_utf8_lossy(&self.signature_issuer).trim_end_matches('\0').to_owned()
    }

    /// Gets the common key family that the TMD's issuer belongs to, if it is a known issuer.
    pub fn key_family(&self) -> Option<KeyFamily> {
        KeyFamily::from_issuer(&self.signature_issuer())
    }

    /// Gets the version of the TMD file.
    pub fn tmd_version(&self) -> u8 {
        self.tmd_version
    }

    /// Gets the version of CA CRL listed in the TMD.
    pub fn ca_crl_version(&self) -> u8 {
        self.ca_crl_version
    }

    /// Gets the version of the signer CRL listed in the TMD.
    pub fn signer_crl_version(&self) -> u8 {
        self.signer_crl_version
    }

    /// Gets the version of the system software required by the title.
    pub fn system_version(&self) -> u64 {
        self.system_version
    }

    /// Gets the Title ID of a TMD.
    pub fn title_id(&self) -> [u8; 8] {
        self.title_id
    }

    /// Gets the high word of the Title ID, which identifies the kind of title.
    pub fn title_id_high(&self) -> u32 {
        u32::from_be_bytes([self.title_id[0], self.title_id[1], self.title_id[2], self.title_id[3]])
    }

    /// Gets the kind of title described by the TMD, based on its Title ID.
    pub fn title_kind(&self) -> TitleType {
        TitleType::from(self.title_id_high())
    }

    /// Gets whether the TMD describes DLC.
    pub fn is_dlc(&self) -> bool {
        self.title_kind() == TitleType::DLC
    }

    /// Gets the raw title type field of the TMD.
    pub fn title_type(&self) -> u32 {
        self.title_type
    }

    /// Gets the group ID listed in the TMD.
    pub fn group_id(&self) -> u16 {
        self.group_id
    }

    /// Gets the access rights listed in the TMD.
    pub fn access_rights(&self) -> u32 {
        self.access_rights
    }

    /// Gets the version of title listed in the TMD.
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Gets the number of contents listed in the TMD.
    pub fn num_contents(&self) -> u16 {
        self.num_contents
    }

    /// Gets the index of the title's boot content.
    pub fn boot_index(&self) -> u16 {
        self.boot_index
    }

    /// Gets the hash of the content info records.
    pub fn content_info_hash(&self) -> [u8; 32] {
        self.content_info_hash
    }

    /// Gets a reference to the content info records from the TMD.
    pub fn content_info(&self) -> &[ContentInfo] {
        &self.content_info
    }

    /// Gets a reference to the content records from the TMD.
    pub fn content_records(&self) -> &[ContentRecord] {
        &self.content_records
    }

    /// Gets the content record at a position in the content record list.
    pub fn content_record(&self, index: usize) -> Option<&ContentRecord> {
        self.content_records.get(index)
    }

    /// Finds the content record with the given Content ID.
    pub fn content_by_id(&self, content_id: u32) -> Option<&ContentRecord> {
        self.content_records.iter().find(|record| record.content_id == content_id)
    }

    /// Gets the raw certificates appended to the TMD, which are empty unless the TMD came from the
    /// CDN.
    pub fn certificates(&self) -> &[u8] {
        &self.certificates
    }
}
