// title/crypto.rs from rustwiiu (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustwii
//
// Implements the common crypto functions required to handle Wii U content encryption.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::cipher::generic_array::GenericArray;
use crate::title::commonkeys::{get_common_key, KeyFamily};

pub type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
pub type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

// Convert a Title ID into the format required for use as the Title Key decryption IV.
fn title_id_to_iv(title_id: [u8; 8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id);
    iv
}

/// Builds the IV used to start decrypting a content: an empty block with the low byte of the
/// content's index in byte 1. The high byte of the index is not used.
pub fn content_iv(index: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[1] = index as u8;
    iv
}

/// Decrypts every whole 16-byte block of the buffer in place, continuing the CBC chain held by the
/// decryptor. Any trailing partial block is left untouched.
pub fn decrypt_blocks(decryptor: &mut Aes128CbcDec, buf: &mut [u8]) {
    for block in buf.chunks_exact_mut(16) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Encrypts every whole 16-byte block of the buffer in place, continuing the CBC chain held by the
/// encryptor. Any trailing partial block is left untouched.
pub fn encrypt_blocks(encryptor: &mut Aes128CbcEnc, buf: &mut [u8]) {
    for block in buf.chunks_exact_mut(16) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Decrypts a buffer in place with AES-128-CBC using the provided key and IV.
pub fn decrypt_cbc(key: [u8; 16], iv: [u8; 16], buf: &mut [u8]) {
    let mut decryptor = Aes128CbcDec::new(&key.into(), &iv.into());
    decrypt_blocks(&mut decryptor, buf);
}

/// Encrypts a buffer in place with AES-128-CBC using the provided key and IV.
pub fn encrypt_cbc(key: [u8; 16], iv: [u8; 16], buf: &mut [u8]) {
    let mut encryptor = Aes128CbcEnc::new(&key.into(), &iv.into());
    encrypt_blocks(&mut encryptor, buf);
}

/// Decrypts a Title Key using the common key of the specified family and the corresponding Title ID.
pub fn decrypt_title_key(title_key_enc: [u8; 16], family: KeyFamily, title_id: [u8; 8]) -> [u8; 16] {
    let mut title_key = title_key_enc;
    decrypt_cbc(get_common_key(family), title_id_to_iv(title_id), &mut title_key);
    title_key
}

/// Encrypts a Title Key using the common key of the specified family and the corresponding Title ID.
pub fn encrypt_title_key(title_key_dec: [u8; 16], family: KeyFamily, title_id: [u8; 8]) -> [u8; 16] {
    let mut title_key = title_key_dec;
    encrypt_cbc(get_common_key(family), title_id_to_iv(title_id), &mut title_key);
    title_key
}

/// Decrypt an entire content using the corresponding Title Key and content index.
pub fn decrypt_content(data: &[u8], title_key: [u8; 16], index: u16) -> Vec<u8> {
    let mut buf = data.to_owned();
    decrypt_cbc(title_key, content_iv(index), &mut buf);
    buf
}

/// Encrypt an entire content using the corresponding Title Key and content index. The content is
/// zero-padded to a multiple of 16 bytes first.
pub fn encrypt_content(data: &[u8], title_key: [u8; 16], index: u16) -> Vec<u8> {
    let mut buf = data.to_owned();
    buf.resize((data.len() + 15) & !15, 0);
    encrypt_cbc(title_key, content_iv(index), &mut buf);
    buf
}
