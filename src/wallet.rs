//! Wallet management module
//!
//! Key loading, disposable account generation and vanity grinding. Secret
//! material only ever leaves this module inside `Zeroizing` buffers.

use rand::{CryptoRng, RngCore};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    signer::keypair::keypair_from_seed,
};
use zeroize::Zeroizing;

use crate::errors::{LaunchError, LaunchResult};

/// Signer loaded from the environment
///
/// `Debug` prints only the public key.
pub struct WalletManager {
    keypair: Keypair,
}

impl WalletManager {
    /// Create from a base58 string holding a 64-byte secret or a 32-byte seed
    pub fn from_base58(secret: &str) -> LaunchResult<Self> {
        Ok(Self::from_keypair(decode_base58_keypair(secret)?))
    }

    /// Create a new wallet manager from a keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Get a reference to the keypair
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

/// Base58 encoding of the full 64-byte secret
pub fn secret_base58(keypair: &Keypair) -> Zeroizing<String> {
    let bytes = Zeroizing::new(keypair.to_bytes());
    Zeroizing::new(bs58::encode(bytes.as_slice()).into_string())
}

/// Decode a base58 secret (64-byte keypair or 32-byte seed)
pub fn decode_base58_keypair(secret: &str) -> LaunchResult<Keypair> {
    let bytes = Zeroizing::new(
        bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| LaunchError::Signing(format!("invalid base58 secret: {}", e)))?,
    );
    keypair_from_bytes(&bytes)
}

fn keypair_from_bytes(bytes: &[u8]) -> LaunchResult<Keypair> {
    if bytes.iter().all(|&b| b == 0) {
        return Err(LaunchError::Signing(
            "Invalid keypair: all-zero key rejected".to_string(),
        ));
    }
    match bytes.len() {
        64 => Keypair::try_from(bytes).map_err(|e| LaunchError::Signing(e.to_string())),
        32 => keypair_from_seed(bytes).map_err(|e| LaunchError::Signing(e.to_string())),
        n => Err(LaunchError::Signing(format!(
            "Invalid keypair length: expected 32 or 64 bytes, got {}",
            n
        ))),
    }
}

/// Disposable signer identities for one launch
///
/// Index `i` of `intermediaries` funds index `i` of `buyers`.
pub struct AccountSet {
    pub intermediaries: Vec<Keypair>,
    pub buyers: Vec<Keypair>,
}

impl AccountSet {
    /// Generate `n` intermediary/buyer pairs from `rng`
    pub fn generate<R: RngCore + CryptoRng>(n: usize, rng: &mut R) -> LaunchResult<Self> {
        let mut intermediaries = Vec::with_capacity(n);
        let mut buyers = Vec::with_capacity(n);
        for _ in 0..n {
            intermediaries.push(keypair_from_rng(rng)?);
            buyers.push(keypair_from_rng(rng)?);
        }
        Ok(Self {
            intermediaries,
            buyers,
        })
    }

    pub fn len(&self) -> usize {
        self.buyers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buyers.is_empty()
    }

    pub fn buyer_pubkeys(&self) -> Vec<Pubkey> {
        self.buyers.iter().map(|k| k.pubkey()).collect()
    }

    /// Intermediaries first, then buyers
    pub fn secrets(&self) -> Vec<Zeroizing<String>> {
        self.intermediaries
            .iter()
            .chain(self.buyers.iter())
            .map(secret_base58)
            .collect()
    }
}

impl std::fmt::Debug for AccountSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSet")
            .field("buyers", &self.buyer_pubkeys())
            .finish()
    }
}

/// Keypair from 32 bytes of `rng` output
pub fn keypair_from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> LaunchResult<Keypair> {
    let mut seed = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(seed.as_mut());
    keypair_from_seed(seed.as_ref()).map_err(|e| LaunchError::Signing(e.to_string()))
}

/// Grind keypairs until the address ends with `suffix`
///
/// CPU bound; run it on a blocking thread.
pub fn grind_vanity<R: RngCore + CryptoRng>(
    suffix: &str,
    max_attempts: u64,
    rng: &mut R,
) -> LaunchResult<Option<Keypair>> {
    if bs58::decode(suffix).into_vec().is_err() {
        return Err(LaunchError::Configuration(format!(
            "vanity suffix '{}' contains non-base58 characters",
            suffix
        )));
    }
    for _ in 0..max_attempts {
        let kp = keypair_from_rng(rng)?;
        if kp.pubkey().to_string().ends_with(suffix) {
            return Ok(Some(kp));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_is_deterministic_under_seed() {
        let a = AccountSet::generate(3, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = AccountSet::generate(3, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.buyer_pubkeys(), b.buyer_pubkeys());
        assert_eq!(a.len(), 3);
        assert_eq!(a.secrets().len(), 6);
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let set = AccountSet::generate(5, &mut StdRng::seed_from_u64(1)).unwrap();
        let mut all: Vec<Pubkey> = set.intermediaries.iter().map(|k| k.pubkey()).collect();
        all.extend(set.buyer_pubkeys());
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before);
    }

    #[test]
    fn test_base58_roundtrip_and_seed_form() {
        let kp = Keypair::new();
        let secret = secret_base58(&kp);
        let wallet = WalletManager::from_base58(&secret).unwrap();
        assert_eq!(wallet.pubkey(), kp.pubkey());

        let seed = [9u8; 32];
        let from_seed = WalletManager::from_base58(&bs58::encode(seed).into_string()).unwrap();
        assert_eq!(from_seed.pubkey(), keypair_from_seed(&seed).unwrap().pubkey());
    }

    #[test]
    fn test_rejects_bad_secrets() {
        assert!(WalletManager::from_base58("0OIl").is_err());
        assert!(WalletManager::from_base58(&bs58::encode([1u8; 16]).into_string()).is_err());
        assert!(WalletManager::from_base58(&bs58::encode([0u8; 64]).into_string()).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = Keypair::new();
        let secret = secret_base58(&kp).to_string();
        let wallet = WalletManager::from_keypair(kp);
        let printed = format!("{:?}", wallet);
        assert!(printed.contains(&wallet.pubkey().to_string()));
        assert!(!printed.contains(&secret));
    }

    #[test]
    fn test_vanity_single_char_suffix() {
        let mut rng = StdRng::seed_from_u64(3);
        let kp = grind_vanity("A", 100_000, &mut rng).unwrap().unwrap();
        assert!(kp.pubkey().to_string().ends_with('A'));
        assert!(grind_vanity("0", 10, &mut rng).is_err());
    }
}
