// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BIP-39/BIP-32 derivation of the node's on-chain identity.
//!
//! Keys derive at the standard Ethereum path m/44'/60'/0'/0/{index} and
//! match MetaMask, Ledger, and other standard wallets. Index 0 is the
//! master wallet (funds provider record creation); index N is the
//! designated wallet of requester N, so requester indices start at 1.
//!
//! The provider id is the keccak hash of the account-level extended public
//! key, which is also the xpub recorded on-chain so requesters can verify
//! designated wallet addresses themselves.

use alloy::signers::local::{
    coins_bip39::{English, Mnemonic},
    MnemonicBuilder, PrivateKeySigner,
};
use alloy_primitives::{keccak256, Address, B256, U256};
use coins_bip32::{
    enc::{MainnetEncoder, XKeyEncoder},
    xkeys::{Parent, XPriv},
};
use thiserror::Error;

/// Account-level derivation path; designated wallets extend it with
/// `/0/{index}`.
const ACCOUNT_DERIVATION_PATH: &str = "m/44'/60'/0'";

#[derive(Error, Debug)]
pub enum DerivationError {
    #[error("invalid mnemonic: {0}")]
    Mnemonic(String),

    #[error("key derivation failed: {0}")]
    Bip32(#[from] coins_bip32::Bip32Error),

    #[error("failed to build signer: {0}")]
    Signer(String),

    #[error("requester index {0} is not a valid derivation index")]
    InvalidRequesterIndex(U256),
}

/// The node's master key material and the identifiers derived from it.
#[derive(Clone)]
pub struct MasterKeyring {
    phrase: String,
    xpub: String,
    provider_id: B256,
    master: PrivateKeySigner,
}

impl std::fmt::Debug for MasterKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The phrase stays out of Debug output.
        f.debug_struct("MasterKeyring")
            .field("provider_id", &self.provider_id)
            .field("master_address", &self.master.address())
            .finish()
    }
}

impl MasterKeyring {
    pub fn from_mnemonic(phrase: &str) -> Result<Self, DerivationError> {
        let phrase = phrase.trim();
        let mnemonic = Mnemonic::<English>::new_from_phrase(phrase)
            .map_err(|e| DerivationError::Mnemonic(e.to_string()))?;
        let seed = mnemonic.to_seed(None).map_err(|e| DerivationError::Mnemonic(e.to_string()))?;

        let root = XPriv::root_from_seed(seed.as_ref(), None)?;
        let account = root.derive_path(ACCOUNT_DERIVATION_PATH)?;
        let xpub = MainnetEncoder::xpub_to_base58(&account.verify_key())?;
        let provider_id = keccak256(xpub.as_bytes());

        let master = derive_signer(phrase, 0)?;

        Ok(Self { phrase: phrase.to_string(), xpub, provider_id, master })
    }

    /// The account-level extended public key, as recorded on-chain.
    pub fn xpub(&self) -> &str {
        &self.xpub
    }

    /// The provider id this node answers for, on every chain.
    pub fn provider_id(&self) -> B256 {
        self.provider_id
    }

    /// The master wallet signer (derivation index 0).
    pub fn master_signer(&self) -> &PrivateKeySigner {
        &self.master
    }

    pub fn master_address(&self) -> Address {
        self.master.address()
    }

    /// The signer of the designated wallet serving `requester_index`.
    pub fn designated_signer(
        &self,
        requester_index: U256,
    ) -> Result<PrivateKeySigner, DerivationError> {
        let index = u32::try_from(requester_index)
            .map_err(|_| DerivationError::InvalidRequesterIndex(requester_index))?;
        if index == 0 {
            // Index 0 is the master wallet; no requester may claim it.
            return Err(DerivationError::InvalidRequesterIndex(requester_index));
        }
        derive_signer(&self.phrase, index)
    }

    pub fn designated_wallet(&self, requester_index: U256) -> Result<Address, DerivationError> {
        self.designated_signer(requester_index).map(|signer| signer.address())
    }
}

fn derive_signer(phrase: &str, index: u32) -> Result<PrivateKeySigner, DerivationError> {
    MnemonicBuilder::<English>::default()
        .phrase(phrase)
        .index(index)
        .map_err(|e| DerivationError::Signer(e.to_string()))?
        .build()
        .map_err(|e| DerivationError::Signer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_derivation_is_deterministic() {
        let a = MasterKeyring::from_mnemonic(PHRASE).unwrap();
        let b = MasterKeyring::from_mnemonic(PHRASE).unwrap();
        assert_eq!(a.xpub(), b.xpub());
        assert_eq!(a.provider_id(), b.provider_id());
        assert_eq!(a.master_address(), b.master_address());
    }

    #[test]
    fn test_xpub_is_account_level() {
        let keyring = MasterKeyring::from_mnemonic(PHRASE).unwrap();
        assert!(keyring.xpub().starts_with("xpub"));
        assert_eq!(keyring.provider_id(), keccak256(keyring.xpub().as_bytes()));
    }

    #[test]
    fn test_designated_wallets_differ_per_requester() {
        let keyring = MasterKeyring::from_mnemonic(PHRASE).unwrap();
        let one = keyring.designated_wallet(U256::from(1u64)).unwrap();
        let two = keyring.designated_wallet(U256::from(2u64)).unwrap();
        assert_ne!(one, two);
        assert_ne!(one, keyring.master_address());
    }

    #[test]
    fn test_requester_index_zero_is_rejected() {
        let keyring = MasterKeyring::from_mnemonic(PHRASE).unwrap();
        assert!(matches!(
            keyring.designated_wallet(U256::ZERO),
            Err(DerivationError::InvalidRequesterIndex(_))
        ));
    }

    #[test]
    fn test_oversized_requester_index_is_rejected() {
        let keyring = MasterKeyring::from_mnemonic(PHRASE).unwrap();
        assert!(matches!(
            keyring.designated_wallet(U256::from(u64::MAX)),
            Err(DerivationError::InvalidRequesterIndex(_))
        ));
    }

    #[test]
    fn test_whitespace_in_phrase_is_trimmed() {
        let padded = format!("  {PHRASE}\n");
        let a = MasterKeyring::from_mnemonic(&padded).unwrap();
        let b = MasterKeyring::from_mnemonic(PHRASE).unwrap();
        assert_eq!(a.master_address(), b.master_address());
    }
}
