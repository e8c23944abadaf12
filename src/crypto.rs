use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// SHA-256 over an unordered set of values, hex encoded.
///
/// Every input is canonicalised through `serde_json::Value` (object keys
/// sorted) and stringified; the strings are sorted and joined with a single
/// space before hashing. Argument order therefore does not change the
/// digest, but the content of each argument does.
pub fn crypto_hash(inputs: &[Value]) -> String {
    let rendered: Vec<String> = inputs.iter().map(Value::to_string).collect();
    let mut parts: Vec<&str> = rendered.iter().map(String::as_str).collect();
    hex::encode(digest_parts(&mut parts))
}

/// Hash already-stringified JSON values. Used by the miner so the block
/// data is rendered once per search instead of once per nonce.
pub(crate) fn digest_parts(parts: &mut [&str]) -> [u8; 32] {
    parts.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(parts.join(" ").as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Number of leading zero bits in the binary expansion of a hex digest.
/// Counting stops at the first non-hex character.
pub fn leading_zero_bits(hash_hex: &str) -> u32 {
    let mut bits = 0;
    for c in hash_hex.chars() {
        match c.to_digit(16) {
            Some(0) => bits += 4,
            Some(nibble) => return bits + (nibble as u8).leading_zeros() - 4,
            None => return bits,
        }
    }
    bits
}

/// True if the digest has at least `difficulty` leading zero bits.
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    leading_zero_bits(hash_hex) >= difficulty
}

/// secp256k1 key pair owned by a single wallet.
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut OsRng);
        Self { secret, public }
    }

    /// Hex of the compressed public key (33 bytes). Doubles as the address.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Deterministic (RFC 6979) ECDSA signature over `crypto_hash(data)`,
    /// returned as hex DER.
    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> String {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(data_digest(data));
        let sig = secp.sign_ecdsa(&msg, &self.secret);
        hex::encode(sig.serialize_der().to_vec())
    }
}

fn data_digest<T: Serialize + ?Sized>(data: &T) -> [u8; 32] {
    let rendered = json!(data).to_string();
    digest_parts(&mut [rendered.as_str()])
}

/// Verify a hex DER signature by `public_key_hex` over `crypto_hash(data)`.
/// Malformed keys or signatures verify as false.
pub fn verify_signature<T: Serialize + ?Sized>(
    public_key_hex: &str,
    data: &T,
    signature_hex: &str,
) -> bool {
    let Ok(pk_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(pk) = PublicKey::from_slice(&pk_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig) = Signature::from_der(&sig_bytes) else {
        return false;
    };

    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest(data_digest(data));
    secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
}
