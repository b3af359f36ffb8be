// title/keygen.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Implements the Title Key generator used by titles that don't come with a Ticket.

use std::fmt;
use std::str::FromStr;
use sha1::Sha1;
use thiserror::Error;
use crate::title::commonkeys::KeyFamily;
use crate::title::crypto;

const KEYGEN_SECRET: [u8; 10] = [0xFD, 0x04, 0x01, 0x05, 0x06, 0x0B, 0x11, 0x1C, 0x2D, 0x49];
const KEYGEN_ITERATIONS: u32 = 20;
const VWII_IOS_TITLE_TYPE: [u8; 4] = [0x00, 0x00, 0x00, 0x07];

#[derive(Debug, Error)]
pub enum KeygenError {
    #[error("unknown key generation password: {0}")]
    UnknownPassword(String),
}

/// The passwords known to have been used to generate Title Keys. Nearly every title uses the
/// default, "mypass".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum KeygenPassword {
    #[default]
    MyPass,
    Nintendo,
    Test,
    OneToZero,
    Lucy131211,
    Fbf10,
    FiveToEight,
    OneToFour,
    Empty,
    Magic,
}

impl KeygenPassword {
    pub const ALL: [KeygenPassword; 10] = [
        KeygenPassword::MyPass,
        KeygenPassword::Nintendo,
        KeygenPassword::Test,
        KeygenPassword::OneToZero,
        KeygenPassword::Lucy131211,
        KeygenPassword::Fbf10,
        KeygenPassword::FiveToEight,
        KeygenPassword::OneToFour,
        KeygenPassword::Empty,
        KeygenPassword::Magic,
    ];

    /// Gets the raw bytes of the password.
    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeygenPassword::MyPass => "mypass",
            KeygenPassword::Nintendo => "nintendo",
            KeygenPassword::Test => "test",
            KeygenPassword::OneToZero => "1234567890",
            KeygenPassword::Lucy131211 => "Lucy131211",
            KeygenPassword::Fbf10 => "fbf10",
            KeygenPassword::FiveToEight => "5678",
            KeygenPassword::OneToFour => "1234",
            KeygenPassword::Empty => "",
            KeygenPassword::Magic => "MAGIC",
        }
    }
}

impl FromStr for KeygenPassword {
    type Err = KeygenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeygenPassword::ALL
            .into_iter()
            .find(|password| password.as_str() == s)
            .ok_or_else(|| KeygenError::UnknownPassword(s.to_string()))
    }
}

impl fmt::Display for KeygenPassword {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builds the salt for a Title ID: the keygen secret followed by the Title ID with its leading zero
/// bytes removed. vWii IOS titles only contribute their low word.
pub fn keygen_salt(title_id: [u8; 8]) -> Vec<u8> {
    let tid: &[u8] = if title_id[..4] == VWII_IOS_TITLE_TYPE {
        &title_id[4..]
    } else {
        &title_id
    };
    let first_nonzero = tid.iter().position(|b| *b != 0).unwrap_or(tid.len());
    let mut salt = KEYGEN_SECRET.to_vec();
    salt.extend_from_slice(&tid[first_nonzero..]);
    salt
}

/// Generates the decrypted Title Key for a Title ID using the provided password.
pub fn generate_title_key(title_id: [u8; 8], password: KeygenPassword) -> [u8; 16] {
    let salt_hash = md5::compute(keygen_salt(title_id));
    let mut title_key = [0u8; 16];
    pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), &salt_hash.0, KEYGEN_ITERATIONS, &mut title_key);
    title_key
}

/// Generates the encrypted Title Key for a Title ID, as it would appear in a Ticket issued under the
/// specified key family.
pub fn generate_enc_title_key(title_id: [u8; 8], password: KeygenPassword, family: KeyFamily) -> [u8; 16] {
    crypto::encrypt_title_key(generate_title_key(title_id, password), family, title_id)
}
