// title/commonkeys.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii

use std::fmt;

const WII_U_COMMON_KEY: [u8; 16] = [0xd7, 0xb0, 0x04, 0x02, 0x65, 0x9b, 0xa2, 0xab, 0xd2, 0xcb, 0x0d, 0xb2, 0x7f, 0xa2, 0xb6, 0x56];
const WII_U_DEV_COMMON_KEY: [u8; 16] = [0x2f, 0x5c, 0x1b, 0x29, 0x44, 0xe7, 0xfd, 0x6f, 0xc3, 0x97, 0x96, 0x4b, 0x05, 0x76, 0x91, 0xfa];

/// The TMD signature issuer used by retail titles.
pub const RETAIL_TMD_ISSUER: &str = "Root-CA00000003-CP0000000b";
/// The TMD signature issuer used by development titles.
pub const DEV_TMD_ISSUER: &str = "Root-CA00000004-CP00000010";

/// The family of consoles a title was signed for, which determines the common key used to decrypt
/// its Title Key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Retail,
    Development,
}

impl KeyFamily {
    /// Selects the key family from the signature issuer of a TMD. Only an exact match with one of
    /// the two known issuers is accepted.
    pub fn from_issuer(issuer: &str) -> Option<KeyFamily> {
        match issuer {
            RETAIL_TMD_ISSUER => Some(KeyFamily::Retail),
            DEV_TMD_ISSUER => Some(KeyFamily::Development),
            _ => None,
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyFamily::Retail => write!(f, "Retail"),
            KeyFamily::Development => write!(f, "Development"),
        }
    }
}

/// Returns the common key for the specified key family.
pub fn get_common_key(family: KeyFamily) -> [u8; 16] {
    match family {
        KeyFamily::Retail => WII_U_COMMON_KEY,
        KeyFamily::Development => WII_U_DEV_COMMON_KEY,
    }
}
