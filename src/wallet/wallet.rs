//!
//! Key ownership and the address codec.
//!
//! A wallet is one ECDSA P-256 key pair. Its address is the Base58Check
//! encoding of the versioned public-key hash:
//! `base58(version || ripemd160(sha256(pubkey)) || checksum)`.

use crate::error::{CoinError, Result};
use crate::util::utils::{
    base58_decode, base58_encode, new_key_pair, public_key_from_pkcs8, ripemd160_digest,
    sha256_digest,
};
use serde::{Deserialize, Serialize};
use std::fmt;

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
// version byte + 20-byte public key hash + 4-byte checksum
const MIN_ADDRESS_PAYLOAD_LEN: usize = 25;

#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    // PKCS#8 document holding the P-256 private key
    pkcs8: Vec<u8>,
    // public key in wire form: X || Y, 64 bytes
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    /// Base58Check address of this wallet's public key.
    pub fn get_address(&self) -> WalletAddress {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        WalletAddress(convert_address(pub_key_hash.as_slice()))
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

///
/// A Base58Check address that passed structural validation: base58-decodable,
/// at least 25 bytes of payload, checksum intact. Constructed through
/// `validate`, so every `WalletAddress` in the program is well-formed.
///
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn validate(address: String) -> Result<WalletAddress> {
        if validate_address(address.as_str())? {
            Ok(WalletAddress(address))
        } else {
            Err(CoinError::InvalidAddress(address))
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

///
/// The `hash_pub_key` function hashes a public key for address derivation:
/// `ripemd160(sha256(pub_key))`, a 20-byte digest.
///
/// # Arguments
///
/// * `pub_key` - A reference to the public key in wire form.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    ripemd160_digest(sha256_digest(pub_key).as_slice())
}

///
/// The `checksum` function is the first four bytes of the double SHA-256 of
/// the payload.
///
/// # Arguments
///
/// * `payload` - A reference to the versioned payload.
fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

///
/// The `validate_address` function decodes an address, splits it into version,
/// public key hash and checksum, and recomputes the checksum. Addresses whose
/// decoded payload is shorter than 25 bytes are rejected outright.
///
/// # Arguments
///
/// * `address` - A reference to the address string.
pub fn validate_address(address: &str) -> Result<bool> {
    let payload = base58_decode(address)?;
    if payload.len() < MIN_ADDRESS_PAYLOAD_LEN {
        return Ok(false);
    }
    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    let versioned_payload = &payload[..payload.len() - ADDRESS_CHECK_SUM_LEN];
    let target_checksum = checksum(versioned_payload);
    Ok(actual_checksum.eq(target_checksum.as_slice()))
}

///
/// The `convert_address` function builds the Base58Check address for a public
/// key hash: version byte, hash, checksum, base58-encoded.
///
/// # Arguments
///
/// * `pub_key_hash` - A reference to the 20-byte public key hash.
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    base58_encode(payload.as_slice())
}

///
/// The `get_pub_key_hash` function extracts the 20-byte public key hash out of
/// a validated address.
///
/// # Arguments
///
/// * `address` - A reference to the wallet address.
pub fn get_pub_key_hash(address: &WalletAddress) -> Result<Vec<u8>> {
    let payload = base58_decode(address.as_str())?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_is_valid() {
        let wallet = Wallet::new().expect("Failed to create wallet");
        let address = wallet.get_address();
        assert!(validate_address(address.as_str()).expect("Validation failed"));
    }

    #[test]
    fn test_pub_key_hash_roundtrip() {
        let wallet = Wallet::new().expect("Failed to create wallet");
        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        assert_eq!(pub_key_hash.len(), 20);

        let address = WalletAddress::validate(convert_address(pub_key_hash.as_slice()))
            .expect("Derived address should validate");
        let recovered = get_pub_key_hash(&address).expect("Failed to extract hash");
        assert_eq!(recovered, pub_key_hash);
    }

    #[test]
    fn test_tampered_address_fails_checksum() {
        let wallet = Wallet::new().expect("Failed to create wallet");
        let address = wallet.get_address().as_str().to_string();

        // Flip one character to another alphabet member.
        let mut chars: Vec<char> = address.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '2' { '3' } else { '2' };
        let tampered: String = chars.into_iter().collect();

        assert!(!validate_address(&tampered).unwrap_or(false));
        assert!(WalletAddress::validate(tampered).is_err());
    }

    #[test]
    fn test_short_payload_rejected() {
        // "2g" decodes to a single byte, far below the 25-byte minimum.
        assert!(!validate_address("2g").expect("Decoding should succeed"));
    }

    #[test]
    fn test_malformed_base58_rejected() {
        assert!(validate_address("not-base58-0OIl").is_err());
    }

    #[test]
    fn test_distinct_wallets_distinct_addresses() {
        let first = Wallet::new().expect("Failed to create wallet");
        let second = Wallet::new().expect("Failed to create wallet");
        assert_ne!(first.get_address(), second.get_address());
    }
}
