use crate::error::{CoinError, Result};
use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair,
};
use ripemd::{Digest, Ripemd160};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as i64
}

///
/// The `sha256_digest` function performs a SHA-256 hash operation on the provided
/// data, returning the resulting 32-byte digest as a vector of bytes.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

///
/// The `ripemd160_digest` function computes the 20-byte RIPEMD-160 digest of the
/// input. Together with `sha256_digest` it forms the public-key-hash step of
/// address derivation.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

///
/// The `base58_encode` function encodes the given byte slice using the Base58
/// encoding scheme with the Bitcoin alphabet. Leading zero bytes become leading
/// `1` characters.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

///
/// The `base58_decode` function decodes a Base58-encoded string back to its
/// original byte representation. Unknown characters fail with an invalid
/// address error.
///
/// # Arguments
///
/// * `data` - A reference to the encoded string.
pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| CoinError::InvalidAddress(e.to_string()))
}

///
/// The `new_key_pair` function generates a new ECDSA P-256 key pair and returns
/// the private key serialized as a PKCS#8 document.
///
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| CoinError::KeyPair(e.to_string()))?;
    Ok(pkcs8.as_ref().to_vec())
}

///
/// The `public_key_from_pkcs8` function derives the public key for a PKCS#8
/// private key and returns it in wire form: the X and Y affine coordinates
/// concatenated as big-endian byte strings, with no point-format prefix.
///
/// # Arguments
///
/// * `pkcs8` - A reference to the PKCS#8 document.
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| CoinError::KeyPair(e.to_string()))?;
    // ring exposes the uncompressed SEC1 point 0x04 || X || Y; drop the tag.
    let point = key_pair.public_key().as_ref();
    Ok(point[1..].to_vec())
}

///
/// The `ecdsa_p256_sha256_sign_digest` function signs the provided message with
/// ECDSA P-256 / SHA-256. The signature comes back as raw `r || s`, two equal
/// big-endian halves.
///
/// # Arguments
///
/// * `pkcs8` - A reference to the PKCS#8 document.
/// * `message` - A reference to the message.
pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| CoinError::Signature(e.to_string()))?;
    key_pair
        .sign(&rng, message)
        .map(|signature| signature.as_ref().to_vec())
        .map_err(|e| CoinError::Signature(e.to_string()))
}

///
/// The `ecdsa_p256_sha256_sign_verify` function verifies a raw `r || s`
/// signature against a message using a public key in wire form (`X || Y`,
/// 64 bytes). Returns whether the signature is valid.
///
/// # Arguments
///
/// * `public_key` - A reference to the public key in wire form.
/// * `signature` - A reference to the signature.
/// * `message` - A reference to the message.
pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    // Re-attach the uncompressed-point tag expected by the verifier.
    let mut point = Vec::with_capacity(public_key.len() + 1);
    point.push(0x04);
    point.extend_from_slice(public_key);
    let peer_public_key = ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, point);
    peer_public_key.verify(message, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_roundtrip() {
        let data = b"minicoin base58 roundtrip";
        let encoded = base58_encode(data);
        let decoded = base58_decode(&encoded).expect("Failed to decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base58_leading_zeros() {
        let data = [0u8, 0, 0, 1, 2, 3];
        let encoded = base58_encode(&data);
        assert!(encoded.starts_with("111"));
        let decoded = base58_decode(&encoded).expect("Failed to decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base58_rejects_unknown_characters() {
        // '0' and 'l' are not part of the Bitcoin alphabet
        assert!(base58_decode("0OIl").is_err());
    }

    #[test]
    fn test_sha256_digest_length_and_value() {
        let digest = sha256_digest(b"abc");
        assert_eq!(digest.len(), 32);
        assert_eq!(
            hex::encode(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ripemd160_digest_length_and_value() {
        let digest = ripemd160_digest(b"abc");
        assert_eq!(digest.len(), 20);
        assert_eq!(hex::encode(&digest), "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc");
    }

    #[test]
    fn test_ecdsa_sign_verify_roundtrip() {
        let pkcs8 = new_key_pair().expect("Failed to generate key pair");
        let public_key = public_key_from_pkcs8(&pkcs8).expect("Failed to derive public key");
        assert_eq!(public_key.len(), 64);

        let message = b"signed ledger entry";
        let signature = ecdsa_p256_sha256_sign_digest(&pkcs8, message).expect("Failed to sign");
        // Fixed-width encoding: r and s as equal halves.
        assert_eq!(signature.len(), 64);

        assert!(ecdsa_p256_sha256_sign_verify(&public_key, &signature, message));
        assert!(!ecdsa_p256_sha256_sign_verify(&public_key, &signature, b"another message"));
    }

    #[test]
    fn test_key_pairs_are_unique() {
        let first = new_key_pair().expect("Failed to generate first key pair");
        let second = new_key_pair().expect("Failed to generate second key pair");
        assert_ne!(first, second);
    }
}
