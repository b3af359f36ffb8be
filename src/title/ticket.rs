// title/ticket.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Implements the structures and methods required for Wii U Ticket parsing and synthesis.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use rand::Rng;
use thiserror::Error;
use crate::title::cert::{PlaceholderFileType, PlaceholderHeader};
use crate::title::commonkeys::KeyFamily;
use crate::title::crypto;

/// Size of a v1 Ticket without any section data.
pub const TICKET_SIZE: usize = 0x2B8;
/// Issuer used for synthesized Tickets.
pub const TICKET_ISSUER: &str = "Root-CA00000003-XS0000000c";

const TICKET_HEADER_SIZE: u16 = 0x14;
const DLC_TITLE_ID_HIGH: u32 = 0x0005000C;
const DLC_SECTION_RECORD_SIZE: usize = 0x84;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket is version `{0}` but only v1 is supported")]
    UnsupportedVersion(u8),
    #[error("Ticket data is not in a valid format")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
/// A structure that represents a Wii U Ticket file.
pub struct Ticket {
    signature_type: u32,
    signature: [u8; 256],
    padding1: [u8; 60],
    signature_issuer: [u8; 64],
    ecdh_data: [u8; 60],
    ticket_version: u8,
    ca_crl_version: u8,
    signer_crl_version: u8,
    title_key: [u8; 16],
    reserved1: u8,
    ticket_id: u64,
    device_id: u32,
    title_id: [u8; 8],
    system_access_mask: u16,
    title_version: u16,
    reserved2: [u8; 8],
    license_type: u8,
    common_key_index: u8,
    property_mask: u16,
    reserved3: [u8; 40],
    account_id: u32,
    reserved4: u8,
    audit: u8,
    reserved5: [u8; 66],
    limit_entries: [u8; 64],
    header_version: u16,
    header_size: u16,
    total_header_size: u32,
    section_header_offset: u32,
    section_count: u16,
    section_entry_size: u16,
    header_flags: u32,
    section_data: Vec<u8>,
}

fn is_dlc_title_id(title_id: [u8; 8]) -> bool {
    BigEndian::read_u32(&title_id[..4]) == DLC_TITLE_ID_HIGH
}

// The section written after the header of a DLC Ticket, which unlocks every piece of content.
fn dlc_section_data() -> Vec<u8> {
    let mut data = Vec::with_capacity(0x14 + DLC_SECTION_RECORD_SIZE);
    for value in [0x28u32, 1, DLC_SECTION_RECORD_SIZE as u32, DLC_SECTION_RECORD_SIZE as u32] {
        data.extend_from_slice(&value.to_be_bytes());
    }
    data.extend_from_slice(&3u16.to_be_bytes());
    data.extend_from_slice(&0u16.to_be_bytes());
    let mut record = [0u8; DLC_SECTION_RECORD_SIZE];
    record[4..36].fill(0xFF);
    data.extend_from_slice(&record);
    data
}

impl Ticket {
    /// Creates a new Ticket instance from the binary data of a Ticket file. Any data past the
    /// Ticket's sections, like the certificates appended to a CDN Ticket, is ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TicketError> {
        let mut buf = Cursor::new(data);
        let signature_type = buf.read_u32::<BigEndian>()?;
        let mut signature = [0u8; 256];
        buf.read_exact(&mut signature)?;
        let mut padding1 = [0u8; 60];
        buf.read_exact(&mut padding1)?;
        let mut signature_issuer = [0u8; 64];
        buf.read_exact(&mut signature_issuer)?;
        let mut ecdh_data = [0u8; 60];
        buf.read_exact(&mut ecdh_data)?;
        let ticket_version = buf.read_u8()?;
        // v0 Tickets are from the Wii, and can't be for a Wii U title.
        if ticket_version != 1 {
            return Err(TicketError::UnsupportedVersion(ticket_version));
        }
        let ca_crl_version = buf.read_u8()?;
        let signer_crl_version = buf.read_u8()?;
        let mut title_key = [0u8; 16];
        buf.read_exact(&mut title_key)?;
        let reserved1 = buf.read_u8()?;
        let ticket_id = buf.read_u64::<BigEndian>()?;
        let device_id = buf.read_u32::<BigEndian>()?;
        let mut title_id = [0u8; 8];
        buf.read_exact(&mut title_id)?;
        let system_access_mask = buf.read_u16::<BigEndian>()?;
        let title_version = buf.read_u16::<BigEndian>()?;
        let mut reserved2 = [0u8; 8];
        buf.read_exact(&mut reserved2)?;
        let license_type = buf.read_u8()?;
        let common_key_index = buf.read_u8()?;
        let property_mask = buf.read_u16::<BigEndian>()?;
        let mut reserved3 = [0u8; 40];
        buf.read_exact(&mut reserved3)?;
        let account_id = buf.read_u32::<BigEndian>()?;
        let reserved4 = buf.read_u8()?;
        let audit = buf.read_u8()?;
        let mut reserved5 = [0u8; 66];
        buf.read_exact(&mut reserved5)?;
        let mut limit_entries = [0u8; 64];
        buf.read_exact(&mut limit_entries)?;
        let header_version = buf.read_u16::<BigEndian>()?;
        let header_size = buf.read_u16::<BigEndian>()?;
        let total_header_size = buf.read_u32::<BigEndian>()?;
        let section_header_offset = buf.read_u32::<BigEndian>()?;
        let section_count = buf.read_u16::<BigEndian>()?;
        let section_entry_size = buf.read_u16::<BigEndian>()?;
        let header_flags = buf.read_u32::<BigEndian>()?;
        // Everything in the total header size past the fixed header is section data.
        let section_len = (total_header_size as usize).saturating_sub(TICKET_HEADER_SIZE as usize);
        if section_len > data.len() - TICKET_SIZE {
            return Err(TicketError::IO(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
        }
        let mut section_data = vec![0u8; section_len];
        buf.read_exact(&mut section_data)?;
        Ok(Ticket {
            signature_type,
            signature,
            padding1,
            signature_issuer,
            ecdh_data,
            ticket_version,
            ca_crl_version,
            signer_crl_version,
            title_key,
            reserved1,
            ticket_id,
            device_id,
            title_id,
            system_access_mask,
            title_version,
            reserved2,
            license_type,
            common_key_index,
            property_mask,
            reserved3,
            account_id,
            reserved4,
            audit,
            reserved5,
            limit_entries,
            header_version,
            header_size,
            total_header_size,
            section_header_offset,
            section_count,
            section_entry_size,
            header_flags,
            section_data,
        })
    }

    /// Creates a new Ticket for a title that doesn't have one. The Ticket carries a placeholder
    /// header instead of a signature, a random ECDH area and a random Ticket ID. DLC Tickets also
    /// get the section that unlocks all of the title's content.
    pub fn new(title_id: [u8; 8], title_key_enc: [u8; 16], title_version: u16) -> Self {
        let header = PlaceholderHeader::new(PlaceholderFileType::Ticket).to_bytes();
        let mut signature = [0u8; 256];
        signature.copy_from_slice(&header[0x04..0x104]);
        let mut padding1 = [0u8; 60];
        padding1.copy_from_slice(&header[0x104..0x140]);
        let mut signature_issuer = [0u8; 64];
        signature_issuer[..TICKET_ISSUER.len()].copy_from_slice(TICKET_ISSUER.as_bytes());
        let mut rng = rand::rng();
        let mut ecdh_data = [0u8; 60];
        rng.fill(&mut ecdh_data);
        let ticket_id = (rng.random::<u64>() & 0x0000FFFFFFFFFFFF) | 0x0005000000000000;
        let is_dlc = is_dlc_title_id(title_id);
        let section_data = if is_dlc { dlc_section_data() } else { Vec::new() };
        Ticket {
            signature_type: BigEndian::read_u32(&header[..4]),
            signature,
            padding1,
            signature_issuer,
            ecdh_data,
            ticket_version: 1,
            ca_crl_version: 0,
            signer_crl_version: 0,
            title_key: title_key_enc,
            reserved1: 0,
            ticket_id,
            device_id: 0,
            title_id,
            system_access_mask: 0,
            title_version,
            reserved2: [0; 8],
            license_type: 0,
            common_key_index: 0,
            property_mask: 0xFFFF,
            reserved3: [0; 40],
            account_id: 0,
            reserved4: 0,
            audit: 0,
            reserved5: [0; 66],
            limit_entries: [0; 64],
            header_version: 1,
            header_size: TICKET_HEADER_SIZE,
            total_header_size: TICKET_HEADER_SIZE as u32 + section_data.len() as u32,
            section_header_offset: if is_dlc { TICKET_HEADER_SIZE as u32 } else { 0 },
            section_count: if is_dlc { 1 } else { 0 },
            section_entry_size: if is_dlc { 0x14 } else { 0 },
            header_flags: 0,
            section_data,
        }
    }

    /// Dumps the data in a Ticket instance back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::with_capacity(TICKET_SIZE + self.section_data.len());
        buf.write_u32::<BigEndian>(self.signature_type)?;
        buf.write_all(&self.signature)?;
        buf.write_all(&self.padding1)?;
        buf.write_all(&self.signature_issuer)?;
        buf.write_all(&self.ecdh_data)?;
        buf.write_u8(self.ticket_version)?;
        buf.write_u8(self.ca_crl_version)?;
        buf.write_u8(self.signer_crl_version)?;
        buf.write_all(&self.title_key)?;
        buf.write_u8(self.reserved1)?;
        buf.write_u64::<BigEndian>(self.ticket_id)?;
        buf.write_u32::<BigEndian>(self.device_id)?;
        buf.write_all(&self.title_id)?;
        buf.write_u16::<BigEndian>(self.system_access_mask)?;
        buf.write_u16::<BigEndian>(self.title_version)?;
        buf.write_all(&self.reserved2)?;
        buf.write_u8(self.license_type)?;
        buf.write_u8(self.common_key_index)?;
        buf.write_u16::<BigEndian>(self.property_mask)?;
        buf.write_all(&self.reserved3)?;
        buf.write_u32::<BigEndian>(self.account_id)?;
        buf.write_u8(self.reserved4)?;
        buf.write_u8(self.audit)?;
        buf.write_all(&self.reserved5)?;
        buf.write_all(&self.limit_entries)?;
        buf.write_u16::<BigEndian>(self.header_version)?;
        buf.write_u16::<BigEndian>(self.header_size)?;
        buf.write_u32::<BigEndian>(self.total_header_size)?;
        buf.write_u32::<BigEndian>(self.section_header_offset)?;
        buf.write_u16::<BigEndian>(self.section_count)?;
        buf.write_u16::<BigEndian>(self.section_entry_size)?;
        buf.write_u32::<BigEndian>(self.header_flags)?;
        buf.write_all(&self.section_data)?;
        Ok(buf)
    }

    /// Gets the type of the signature on the Ticket.
    pub fn signature_type(&self) -> u32 {
        self.signature_type
    }

    /// Gets whether the Ticket carries a placeholder header instead of a real signature.
    pub fn is_placeholder(&self) -> bool {
        let mut header = [0u8; 0x140];
        BigEndian::write_u32(&mut header[..4], self.signature_type);
        header[0x04..0x104].copy_from_slice(&self.signature);
        header[0x104..].copy_from_slice(&self.padding1);
        PlaceholderHeader::from_bytes(&header).is_ok()
    }

    /// Gets the name of the certificate used to sign a Ticket as a string.
    pub fn signature_issuer(&self) -> String {
        String::from_utf8_lossy(&self.signature_issuer).trim_end_matches('\0').to_owned()
    }

    /// Gets the version of the Ticket file.
    pub fn ticket_version(&self) -> u8 {
        self.ticket_version
    }

    /// Gets the encrypted Title Key.
    pub fn title_key(&self) -> [u8; 16] {
        self.title_key
    }

    /// Gets the decrypted version of the Title Key stored in a Ticket, using the common key of the
    /// specified family.
    pub fn title_key_dec(&self, family: KeyFamily) -> [u8; 16] {
        crypto::decrypt_title_key(self.title_key, family, self.title_id)
    }

    /// Gets the ID of the Ticket.
    pub fn ticket_id(&self) -> u64 {
        self.ticket_id
    }

    /// Gets the ID of the console the Ticket is bound to, or 0 for a common Ticket.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Gets the Title ID of the Ticket.
    pub fn title_id(&self) -> [u8; 8] {
        self.title_id
    }

    /// Gets the version of the title listed in the Ticket.
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Gets the index of the common key listed in the Ticket.
    pub fn common_key_index(&self) -> u8 {
        self.common_key_index
    }

    pub fn property_mask(&self) -> u16 {
        self.property_mask
    }

    pub fn account_id(&self) -> u32 {
        self.account_id
    }

    /// Gets the version of the Ticket's section header.
    pub fn header_version(&self) -> u16 {
        self.header_version
    }

    /// Gets the size of the Ticket's section header, including any section data.
    pub fn total_header_size(&self) -> u32 {
        self.total_header_size
    }

    /// Gets the number of sections in the Ticket.
    pub fn section_count(&self) -> u16 {
        self.section_count
    }

    /// Gets the raw section data that follows the Ticket's header.
    pub fn section_data(&self) -> &[u8] {
        &self.section_data
    }
}

/// Writes a new Ticket for the given title to the specified path.
pub fn synthesize_ticket(path: &Path, title_id: [u8; 8], title_key_enc: [u8; 16], title_version: u16) -> Result<(), std::io::Error> {
    fs::write(path, Ticket::new(title_id, title_key_enc, title_version).to_bytes()?)
}
