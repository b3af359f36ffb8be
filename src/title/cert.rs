// title/cert.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Implements the structures and methods required for building placeholder and real certificate
// chains for Wii U titles.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use rand::Rng;
use thiserror::Error;
use crate::title::tmd::TMD;

pub const PLACEHOLDER_HEADER_SIZE: usize = 0x140;
/// Size of a synthesized certificate file.
pub const CERTIFICATE_CHAIN_SIZE: usize = 0xA00;

const PLACEHOLDER_SIGNATURE_TYPE: u32 = 0x00010004;
const PLACEHOLDER_MAGIC: [u8; 10] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
const CERT_KEY_TYPE: u32 = 0x00010001;

// Where the certificates live in the files served by the CDN.
const TMD_CA_CERT_SIZE: usize = 0x400;
const TMD_CP_CERT_SIZE: usize = 0x300;
const CETK_XS_CERT_OFFSET: usize = 0x350;
const CETK_XS_CERT_SIZE: usize = 0x300;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate chain is missing required certificate `{0}`")]
    MissingCertificate(String),
    #[error("file is not a placeholder file (signature type `{0:08X}`)")]
    NotPlaceholder(u32),
    #[error("certificate has unknown identity `{0}`")]
    UnknownCertificate(String),
    #[error("certificate data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// The kind of file that a placeholder header is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderFileType {
    Ticket,
    Certificate,
}

impl PlaceholderFileType {
    fn as_str(&self) -> &'static str {
        match self {
            PlaceholderFileType::Ticket => "Ticket",
            PlaceholderFileType::Certificate => "Certificate",
        }
    }
}

fn padded<const N: usize>(value: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = value.len().min(N);
    out[..len].copy_from_slice(&value.as_bytes()[..len]);
    out
}

fn unpadded(value: &[u8]) -> String {
    String::from_utf8_lossy(value).trim_end_matches('\0').to_owned()
}

/// The header written in place of a real signature on synthesized Tickets and certificate files.
/// It names the application that created the file, and is never accepted by a console.
#[derive(Debug, Clone)]
pub struct PlaceholderHeader {
    signature_type: u32,
    magic: [u8; 10],
    app: [u8; 16],
    app_version: [u8; 16],
    file_type: [u8; 16],
    meta_version: u8,
    random: [u8; 0x14],
}

impl PlaceholderHeader {
    /// Creates a new placeholder header for the specified kind of file. The tail holds 0x14 random
    /// bytes and is zero after them.
    pub fn new(file_type: PlaceholderFileType) -> Self {
        let mut random = [0u8; 0x14];
        rand::rng().fill(&mut random);
        PlaceholderHeader {
            signature_type: PLACEHOLDER_SIGNATURE_TYPE,
            magic: PLACEHOLDER_MAGIC,
            app: padded(env!("CARGO_PKG_NAME")),
            app_version: padded(concat!("v", env!("CARGO_PKG_VERSION"))),
            file_type: padded(file_type.as_str()),
            meta_version: 1,
            random,
        }
    }

    /// Reads a placeholder header from the start of a Ticket or certificate file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CertificateError> {
        let mut buf = Cursor::new(data);
        let signature_type = buf.read_u32::<BigEndian>()?;
        let mut magic = [0u8; 10];
        buf.read_exact(&mut magic)?;
        if signature_type != PLACEHOLDER_SIGNATURE_TYPE || magic != PLACEHOLDER_MAGIC {
            return Err(CertificateError::NotPlaceholder(signature_type));
        }
        buf.set_position(buf.position() + 2);
        let mut app = [0u8; 16];
        buf.read_exact(&mut app)?;
        let mut app_version = [0u8; 16];
        buf.read_exact(&mut app_version)?;
        let mut file_type = [0u8; 16];
        buf.read_exact(&mut file_type)?;
        buf.set_position(buf.position() + 0xAF);
        let meta_version = buf.read_u8()?;
        let mut random = [0u8; 0x14];
        buf.read_exact(&mut random)?;
        Ok(PlaceholderHeader {
            signature_type,
            magic,
            app,
            app_version,
            file_type,
            meta_version,
            random,
        })
    }

    /// Dumps the header into its 0x140-byte binary form.
    pub fn to_bytes(&self) -> [u8; PLACEHOLDER_HEADER_SIZE] {
        let mut buf = [0u8; PLACEHOLDER_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[..4], self.signature_type);
        buf[0x04..0x0E].copy_from_slice(&self.magic);
        buf[0x10..0x20].copy_from_slice(&self.app);
        buf[0x20..0x30].copy_from_slice(&self.app_version);
        buf[0x30..0x40].copy_from_slice(&self.file_type);
        buf[0xEF] = self.meta_version;
        buf[0xF0..0x104].copy_from_slice(&self.random);
        buf
    }

    /// Gets the name of the application that created the file.
    pub fn app(&self) -> String {
        unpadded(&self.app)
    }

    /// Gets the version of the application that created the file.
    pub fn app_version(&self) -> String {
        unpadded(&self.app_version)
    }

    /// Gets the kind of file that the header was written for.
    pub fn file_type(&self) -> String {
        unpadded(&self.file_type)
    }
}

/// A structure that represents one certificate in a synthesized certificate chain.
#[derive(Debug, Clone)]
pub struct Certificate {
    issuer: [u8; 64],
    version: u8,
    identity: [u8; 64],
    signature: [u8; 256],
    key_type: u32,
    key_id: u32,
    key_data: Vec<u8>,
}

impl Certificate {
    fn placeholder(issuer: &str, identity: &str, key_id: u32) -> Self {
        let mut rng = rand::rng();
        let mut signature = [0u8; 256];
        rng.fill(&mut signature);
        let mut key_data = vec![0u8; key_data_len(identity)];
        rng.fill(key_data.as_mut_slice());
        Certificate {
            issuer: padded(issuer),
            version: 1,
            identity: padded(identity),
            signature,
            key_type: CERT_KEY_TYPE,
            key_id,
            key_data,
        }
    }

    /// Reads a certificate from a certificate chain. The identity of the certificate decides how
    /// much key data follows it.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CertificateError> {
        let mut buf = Cursor::new(data);
        let mut issuer = [0u8; 64];
        buf.read_exact(&mut issuer)?;
        buf.set_position(buf.position() + 3);
        let version = buf.read_u8()?;
        let mut identity = [0u8; 64];
        buf.read_exact(&mut identity)?;
        let mut signature = [0u8; 256];
        buf.read_exact(&mut signature)?;
        buf.set_position(buf.position() + 4);
        let key_type = buf.read_u32::<BigEndian>()?;
        buf.set_position(buf.position() + 0x34);
        let identity_str = unpadded(&identity);
        if !["CP", "CA", "XS"].iter().any(|prefix| identity_str.starts_with(prefix)) {
            return Err(CertificateError::UnknownCertificate(identity_str));
        }
        let mut key_data = vec![0u8; key_data_len(&identity_str)];
        let key_id = if key_data.is_empty() {
            0
        } else {
            let key_id = buf.read_u32::<BigEndian>()?;
            buf.read_exact(&mut key_data)?;
            key_id
        };
        Ok(Certificate {
            issuer,
            version,
            identity,
            signature,
            key_type,
            key_id,
            key_data,
        })
    }

    /// Dumps the certificate into its binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_all(&self.issuer)?;
        buf.write_all(&[0u8; 3])?;
        buf.write_u8(self.version)?;
        buf.write_all(&self.identity)?;
        buf.write_all(&self.signature)?;
        buf.write_all(&[0u8; 4])?;
        buf.write_u32::<BigEndian>(self.key_type)?;
        buf.write_all(&[0u8; 0x34])?;
        if !self.key_data.is_empty() {
            buf.write_u32::<BigEndian>(self.key_id)?;
            buf.write_all(&self.key_data)?;
            buf.write_all(&[0u8; 0x3C])?;
        }
        Ok(buf)
    }

    /// Gets the size of the certificate in its binary form.
    pub fn size(&self) -> usize {
        if self.key_data.is_empty() {
            0x1C0
        } else {
            0x1C0 + 4 + self.key_data.len() + 0x3C
        }
    }

    /// Gets the issuer of the certificate.
    pub fn issuer(&self) -> String {
        unpadded(&self.issuer)
    }

    /// Gets the identity that the certificate was issued to.
    pub fn identity(&self) -> String {
        unpadded(&self.identity)
    }

    /// Gets the full name of the certificate, in the form used by signature issuers.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.issuer(), self.identity())
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    pub fn key_data(&self) -> &[u8] {
        &self.key_data
    }
}

fn key_data_len(identity: &str) -> usize {
    if identity.starts_with("CP") {
        0x200
    } else if identity.starts_with("CA") {
        0x100
    } else {
        0
    }
}

/// A structure that represents a synthesized certificate file: a placeholder header followed by
/// the CP, CA and XS certificates.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    header: PlaceholderHeader,
    certificates: Vec<Certificate>,
}

impl CertificateChain {
    /// Creates a new certificate chain with random signatures and keys.
    pub fn placeholder() -> Self {
        CertificateChain {
            header: PlaceholderHeader::new(PlaceholderFileType::Certificate),
            certificates: vec![
                Certificate::placeholder("Root-CA00000003", "CP0000000b", 0x00010003),
                Certificate::placeholder("Root", "CA00000003", 0x00010004),
                Certificate::placeholder("Root-CA00000003", "XS0000000c", 0),
            ],
        }
    }

    /// Reads a synthesized certificate file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CertificateError> {
        let header = PlaceholderHeader::from_bytes(data)?;
        let mut offset = PLACEHOLDER_HEADER_SIZE;
        let mut certificates = Vec::new();
        while offset < data.len() {
            let cert = Certificate::from_bytes(&data[offset..])?;
            offset += cert.size();
            certificates.push(cert);
        }
        Ok(CertificateChain { header, certificates })
    }

    /// Dumps the certificate chain into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = self.header.to_bytes().to_vec();
        for cert in self.certificates.iter() {
            buf.write_all(&cert.to_bytes()?)?;
        }
        Ok(buf)
    }

    pub fn header(&self) -> &PlaceholderHeader {
        &self.header
    }

    /// Gets the certificates in the chain, in order.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Finds a certificate in the chain by its identity, such as "XS0000000c".
    pub fn certificate(&self, identity: &str) -> Option<&Certificate> {
        self.certificates.iter().find(|cert| cert.identity() == identity)
    }
}

/// Writes a new placeholder certificate file to the specified path.
pub fn synthesize_certificate(path: &Path) -> Result<(), std::io::Error> {
    fs::write(path, CertificateChain::placeholder().to_bytes()?)
}

/// Builds the real certificate chain for a title from the CA and CP certificates appended to a CDN
/// TMD and the XS certificate appended to a CDN Ticket.
pub fn assemble_cert_chain(tmd: &TMD, cetk: &[u8]) -> Result<Vec<u8>, CertificateError> {
    let tmd_certs = tmd.certificates();
    let ca_cert = tmd_certs
        .get(..TMD_CA_CERT_SIZE)
        .ok_or_else(|| CertificateError::MissingCertificate("CA00000003".to_string()))?;
    let cp_cert = tmd_certs
        .get(TMD_CA_CERT_SIZE..TMD_CA_CERT_SIZE + TMD_CP_CERT_SIZE)
        .ok_or_else(|| CertificateError::MissingCertificate("CP0000000b".to_string()))?;
    let xs_cert = cetk
        .get(CETK_XS_CERT_OFFSET..CETK_XS_CERT_OFFSET + CETK_XS_CERT_SIZE)
        .ok_or_else(|| CertificateError::MissingCertificate("XS0000000c".to_string()))?;
    let mut chain = Vec::with_capacity(ca_cert.len() + cp_cert.len() + xs_cert.len());
    chain.extend_from_slice(ca_cert);
    chain.extend_from_slice(cp_cert);
    chain.extend_from_slice(xs_cert);
    Ok(chain)
}
