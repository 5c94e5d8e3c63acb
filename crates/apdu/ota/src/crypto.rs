//! Cryptographic operations for OTA command packets
//!
//! ETSI TS 102 225 security as used here is limited to two algorithms:
//! CRC-32 for the redundancy check, and triple DES in outer-CBC mode (zero
//! initial chaining value) for both ciphering and the cryptographic checksum.

use cbc_mac::{CbcMac, Mac};
use cipher::{BlockDecryptMut, BlockEncryptMut, Key, KeyIvInit, generic_array::GenericArray};
use des::TdesEde3;

use crate::{Error, Result};

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 8;

/// CRC-32 redundancy check value
pub type RedundancyCheck = [u8; 4];
/// Triple-DES CBC cryptographic checksum
pub type CryptographicChecksum = [u8; 8];

/// Expand a 16-byte two-key triple-DES key to 24 bytes, or accept a 24-byte key as is
///
/// For the two-key variant the first 8 bytes are copied to the end of the key.
pub fn resize_key(key: &[u8]) -> Result<Key<TdesEde3>> {
    match key.len() {
        16 => {
            let mut result = Key::<TdesEde3>::default();
            result[..16].copy_from_slice(key);
            result[16..24].copy_from_slice(&key[..8]);
            Ok(result)
        }
        24 => Ok(Key::<TdesEde3>::clone_from_slice(key)),
        len => Err(Error::Configuration(format!(
            "triple-DES key must be 16 or 24 bytes, got {len}"
        ))),
    }
}

/// Number of zero bytes needed to bring `len` to a whole number of blocks
pub const fn padding_for(len: usize) -> usize {
    (BLOCK_SIZE - len % BLOCK_SIZE) % BLOCK_SIZE
}

/// Encrypt `data` in place with triple DES in CBC mode and a zero IV
pub fn encrypt_cbc(key: &[u8], data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Padding("ciphered data is not a whole number of blocks"));
    }

    let mut cipher = cbc::Encryptor::<TdesEde3>::new(&resize_key(key)?, &Default::default());
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    Ok(())
}

/// Decrypt `data` in place with triple DES in CBC mode and a zero IV
pub fn decrypt_cbc(key: &[u8], data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Padding("ciphered data is not a whole number of blocks"));
    }

    let mut cipher = cbc::Decryptor::<TdesEde3>::new(&resize_key(key)?, &Default::default());
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    Ok(())
}

/// Calculate the cryptographic checksum of `data`
///
/// The data is zero padded to the block size and encrypted with triple DES in
/// CBC mode under a zero IV; the checksum is the last ciphertext block.
pub fn cryptographic_checksum(key: &[u8], data: &[u8]) -> Result<CryptographicChecksum> {
    let key = resize_key(key)?;
    let mut mac = <CbcMac<TdesEde3> as Mac>::new(&key);
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Calculate the redundancy check of `data`: CRC-32, big-endian
pub fn redundancy_check(data: &[u8]) -> RedundancyCheck {
    crc32fast::hash(data).to_be_bytes()
}
