//! BLS12-381 key pairs, signatures and aggregation.
//!
//! Every validator holds a single BLS key. The same key signs message
//! envelopes and the partial signatures that are aggregated into the
//! finalized header's multisignature.

use bincode::{Decode, Encode};
use std::fmt;

/// Ciphersuite tag for minimal-pubkey-size BLS signatures.
const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// A BLS12-381 key pair for signing.
#[derive(Clone)]
pub struct KeyPair(blst::min_pk::SecretKey);

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut ikm = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut ikm);
        Self::from_seed(&ikm)
    }

    /// Derive a keypair from a seed (for testing/simulation and devnets).
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        blst::min_pk::SecretKey::key_gen(seed, &[])
            .map(KeyPair)
            .map_err(|_| CryptoError::InvalidKeyMaterial)
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message, BLS_DST, &[]).to_bytes().to_vec())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk().to_bytes().to_vec())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// A BLS public key (48 bytes compressed).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap compressed public key bytes, validating the encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        blst::min_pk::PublicKey::key_validate(bytes)
            .map(|_| PublicKey(bytes.to_vec()))
            .map_err(|_| CryptoError::InvalidKeyMaterial)
    }

    /// Get the compressed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Verify a signature.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let pk = match blst::min_pk::PublicKey::from_bytes(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig = match blst::min_pk::Signature::from_bytes(&signature.0) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        sig.verify(true, message, BLS_DST, &[], &pk, true) == blst::BLST_ERROR::BLST_SUCCESS
    }

    /// Aggregate multiple public keys.
    pub fn aggregate(pubkeys: &[PublicKey]) -> Result<Self, CryptoError> {
        if pubkeys.is_empty() {
            return Err(CryptoError::Empty);
        }

        let keys = pubkeys
            .iter()
            .map(|pk| blst::min_pk::PublicKey::from_bytes(&pk.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CryptoError::InvalidKeyMaterial)?;

        let refs: Vec<&blst::min_pk::PublicKey> = keys.iter().collect();
        let agg = blst::min_pk::AggregatePublicKey::aggregate(&refs, false)
            .map_err(|_| CryptoError::AggregationFailed)?;

        Ok(PublicKey(agg.to_public_key().to_bytes().to_vec()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        if hex.len() < 16 {
            return write!(f, "PublicKey({hex})");
        }
        write!(f, "PublicKey({}..{})", &hex[..8], &hex[hex.len() - 8..])
    }
}

/// A BLS signature (96 bytes compressed).
#[derive(Clone, PartialEq, Eq, Encode, Decode)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes. Validity is checked at verification time.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Signature(bytes.to_vec())
    }

    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Aggregate multiple signatures.
    pub fn aggregate(signatures: &[Signature]) -> Result<Self, CryptoError> {
        if signatures.is_empty() {
            return Err(CryptoError::Empty);
        }

        let sigs = signatures
            .iter()
            .map(|s| blst::min_pk::Signature::from_bytes(&s.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CryptoError::InvalidKeyMaterial)?;

        let refs: Vec<&blst::min_pk::Signature> = sigs.iter().collect();
        let agg = blst::min_pk::AggregateSignature::aggregate(&refs, true)
            .map_err(|_| CryptoError::AggregationFailed)?;

        Ok(Signature(agg.to_signature().to_bytes().to_vec()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        write!(f, "Signature({}..)", &hex[..hex.len().min(16)])
    }
}

/// Errors raised by key handling and aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Empty list provided.
    #[error("Cannot aggregate empty list")]
    Empty,

    /// Key or signature bytes do not decode to a valid curve point.
    #[error("Invalid key material")]
    InvalidKeyMaterial,

    /// Aggregation operation failed.
    #[error("Aggregation failed")]
    AggregationFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"header hash";

        let signature = keypair.sign(message);
        let pubkey = keypair.public_key();

        assert!(pubkey.verify(message, &signature));
        assert!(!pubkey.verify(b"other header", &signature));
    }

    #[test]
    fn test_verify_rejects_garbage_signature() {
        let keypair = KeyPair::generate().unwrap();
        let garbage = Signature::from_bytes(&[7u8; 96]);
        assert!(!keypair.public_key().verify(b"msg", &garbage));
    }

    #[test]
    fn test_aggregate_signatures() {
        let message = b"block hash";
        let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate().unwrap()).collect();

        let sigs: Vec<Signature> = keys.iter().map(|k| k.sign(message)).collect();
        let agg_sig = Signature::aggregate(&sigs).unwrap();

        let pubkeys: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
        let agg_pubkey = PublicKey::aggregate(&pubkeys).unwrap();

        assert!(agg_pubkey.verify(message, &agg_sig));

        // Missing one signer must not verify against the full key set.
        let partial = Signature::aggregate(&sigs[..2]).unwrap();
        assert!(!agg_pubkey.verify(message, &partial));
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(Signature::aggregate(&[]), Err(CryptoError::Empty));
        assert_eq!(PublicKey::aggregate(&[]), Err(CryptoError::Empty));
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let kp1 = KeyPair::from_seed(&seed).unwrap();
        let kp2 = KeyPair::from_seed(&seed).unwrap();

        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.sign(b"test"), kp2.sign(b"test"));
    }

    #[test]
    fn test_public_key_from_bytes() {
        let kp = KeyPair::from_seed(&[1u8; 32]).unwrap();
        let pk = kp.public_key();
        assert_eq!(PublicKey::from_bytes(pk.as_bytes()).unwrap(), pk);
        assert_eq!(
            PublicKey::from_bytes(&[0u8; 5]),
            Err(CryptoError::InvalidKeyMaterial)
        );
    }
}
