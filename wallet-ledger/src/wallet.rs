//! Wallet store
//!
//! Owns wallet records and the invariant that a balance only changes through
//! [`WalletStore::adjust_balance`] (or its atomic variant). Every balance
//! write runs under a per-wallet mutex and compares the caller's version
//! stamp against the stored one; a stale stamp fails with
//! `ConcurrentModification` and the caller retries with a fresh wallet.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Currency, EscrowHold, LedgerTransaction, ProfileId, Wallet, WalletId},
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Wallet store
pub struct WalletStore {
    storage: Arc<Storage>,

    /// Per-wallet write locks; writers serialize on the wallet id
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WalletStore {
    /// Create new wallet store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, wallet_id: &WalletId) -> Arc<Mutex<()>> {
        self.locks
            .entry(wallet_id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Get wallet by ID
    pub fn get(&self, wallet_id: &WalletId) -> Result<Wallet> {
        self.storage.get_wallet(wallet_id)
    }

    /// Get the owner's default wallet in a currency, if any
    pub fn get_default(&self, owner_id: &ProfileId, currency: Currency) -> Result<Option<Wallet>> {
        let wallets = self.storage.wallets_for_owner(owner_id)?;
        Ok(wallets
            .into_iter()
            .find(|w| w.currency == currency && w.is_default && w.is_active))
    }

    /// List all wallets owned by a profile
    pub fn list_for_owner(&self, owner_id: &ProfileId) -> Result<Vec<Wallet>> {
        self.storage.wallets_for_owner(owner_id)
    }

    /// Create a zero-balance wallet.
    ///
    /// The owner's first active wallet in a currency always becomes the
    /// default; an explicit `make_default` demotes the previous default in
    /// the same commit.
    pub fn create(
        &self,
        owner_id: ProfileId,
        currency: Currency,
        make_default: bool,
    ) -> Result<Wallet> {
        let existing_default = self.get_default(&owner_id, currency)?;

        let is_default = make_default || existing_default.is_none();
        let wallet = Wallet::new(owner_id, currency, is_default);

        if is_default {
            if let Some(previous) = existing_default {
                // Re-read the previous default under its lock so the demote
                // cannot clobber a concurrent balance write.
                let lock = self.lock_for(&previous.id);
                let _guard = lock.lock();

                let mut demoted = self.storage.get_wallet(&previous.id)?;
                demoted.is_default = false;
                demoted.updated_at = Utc::now();
                self.storage.commit_atomic(&[&demoted, &wallet], &[], &[])?;

                tracing::info!(
                    wallet_id = %wallet.id,
                    owner_id = %wallet.owner_id,
                    currency = %currency,
                    "Wallet created as new default"
                );
                return Ok(wallet);
            }
        }

        self.storage.put_wallet(&wallet)?;

        tracing::info!(
            wallet_id = %wallet.id,
            owner_id = %wallet.owner_id,
            currency = %currency,
            is_default = wallet.is_default,
            "Wallet created"
        );

        Ok(wallet)
    }

    /// Make a wallet the owner's default for its currency
    pub fn set_default(&self, owner_id: &ProfileId, wallet_id: &WalletId) -> Result<Wallet> {
        let target = self.storage.get_wallet(wallet_id)?;
        self.check_owner(&target, owner_id)?;

        if !target.is_active {
            return Err(Error::InvalidState(format!(
                "wallet {} is disabled",
                target.id
            )));
        }
        if target.is_default {
            return Ok(target);
        }

        let previous = self.get_default(owner_id, target.currency)?;

        // Lock both wallets in id order, then re-read, so the demote/promote
        // pair cannot clobber a concurrent balance write or deadlock.
        let mut ids: Vec<&WalletId> = vec![wallet_id];
        if let Some(ref prev) = previous {
            ids.push(&prev.id);
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let locks: Vec<_> = ids.iter().map(|id| self.lock_for(id)).collect();
        let _guards: Vec<_> = locks.iter().map(|lock| lock.lock()).collect();

        let mut wallet = self.storage.get_wallet(wallet_id)?;
        wallet.is_default = true;
        wallet.updated_at = Utc::now();

        match previous {
            Some(prev) if prev.id != wallet.id => {
                let mut demoted = self.storage.get_wallet(&prev.id)?;
                demoted.is_default = false;
                demoted.updated_at = Utc::now();
                self.storage.commit_atomic(&[&demoted, &wallet], &[], &[])?;
            }
            _ => self.storage.put_wallet(&wallet)?,
        }

        Ok(wallet)
    }

    /// Soft-disable a wallet.
    ///
    /// Wallets are never hard-deleted while transactions reference them;
    /// a disabled wallet rejects balance mutations but stays readable.
    pub fn disable(&self, wallet_id: &WalletId) -> Result<Wallet> {
        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock();

        let mut wallet = self.storage.get_wallet(wallet_id)?;
        if !wallet.is_active {
            return Ok(wallet);
        }

        wallet.is_active = false;
        wallet.is_default = false;
        wallet.updated_at = Utc::now();
        self.storage.put_wallet(&wallet)?;

        tracing::info!(wallet_id = %wallet.id, "Wallet disabled");

        Ok(wallet)
    }

    /// Verify a wallet belongs to the given profile
    pub fn verify_owner(&self, wallet_id: &WalletId, profile_id: &ProfileId) -> Result<()> {
        let wallet = self.storage.get_wallet(wallet_id)?;
        self.check_owner(&wallet, profile_id)
    }

    fn check_owner(&self, wallet: &Wallet, profile_id: &ProfileId) -> Result<()> {
        if &wallet.owner_id != profile_id {
            return Err(Error::Unauthorized(format!(
                "wallet {} does not belong to profile {}",
                wallet.id, profile_id
            )));
        }
        Ok(())
    }

    /// Apply a signed balance delta with optimistic concurrency.
    ///
    /// `expected_version` is the version of the wallet the caller last read.
    /// Fails with `ConcurrentModification` if the stored version differs,
    /// `InsufficientFunds` if the result would be negative.
    pub fn adjust_balance(
        &self,
        wallet_id: &WalletId,
        delta: Decimal,
        expected_version: u64,
    ) -> Result<Wallet> {
        self.adjust_balance_atomic(wallet_id, delta, expected_version, &[], &[])
    }

    /// Like [`adjust_balance`](Self::adjust_balance), but commits the wallet
    /// update together with the given transaction and hold records in one
    /// storage batch. This is the write path for every money-moving
    /// operation: the balance change and the records explaining it persist
    /// together or not at all.
    pub fn adjust_balance_atomic(
        &self,
        wallet_id: &WalletId,
        delta: Decimal,
        expected_version: u64,
        transactions: &[&LedgerTransaction],
        holds: &[&EscrowHold],
    ) -> Result<Wallet> {
        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock();

        let stored = self.storage.get_wallet(wallet_id)?;
        if stored.version != expected_version {
            tracing::warn!(
                wallet_id = %wallet_id,
                expected = expected_version,
                stored = stored.version,
                "Version conflict on balance adjustment"
            );
            return Err(Error::ConcurrentModification(wallet_id.to_string()));
        }

        let updated = stored.apply_delta(delta)?;
        self.storage
            .commit_atomic(&[&updated], transactions, holds)?;

        tracing::info!(
            wallet_id = %wallet_id,
            delta = %delta,
            balance = %updated.balance,
            version = updated.version,
            "Balance adjusted"
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_store() -> (WalletStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (WalletStore::new(storage), temp_dir)
    }

    #[test]
    fn test_first_wallet_becomes_default() {
        let (store, _temp) = test_store();
        let owner = ProfileId::new("profile-1");

        let wallet = store.create(owner.clone(), Currency::USD, false).unwrap();
        assert!(wallet.is_default);

        let second = store.create(owner.clone(), Currency::USD, false).unwrap();
        assert!(!second.is_default);

        let default = store.get_default(&owner, Currency::USD).unwrap().unwrap();
        assert_eq!(default.id, wallet.id);
    }

    #[test]
    fn test_new_default_demotes_previous() {
        let (store, _temp) = test_store();
        let owner = ProfileId::new("profile-1");

        let first = store.create(owner.clone(), Currency::USD, false).unwrap();
        let second = store.create(owner.clone(), Currency::USD, true).unwrap();

        assert!(second.is_default);
        assert!(!store.get(&first.id).unwrap().is_default);
    }

    #[test]
    fn test_defaults_are_per_currency() {
        let (store, _temp) = test_store();
        let owner = ProfileId::new("profile-1");

        let usd = store.create(owner.clone(), Currency::USD, false).unwrap();
        let eur = store.create(owner.clone(), Currency::EUR, false).unwrap();

        assert!(usd.is_default);
        assert!(eur.is_default);
    }

    #[test]
    fn test_set_default_switches_atomically() {
        let (store, _temp) = test_store();
        let owner = ProfileId::new("profile-1");

        let first = store.create(owner.clone(), Currency::USD, false).unwrap();
        let second = store.create(owner.clone(), Currency::USD, false).unwrap();

        store.set_default(&owner, &second.id).unwrap();

        assert!(!store.get(&first.id).unwrap().is_default);
        assert!(store.get(&second.id).unwrap().is_default);
    }

    #[test]
    fn test_set_default_rejects_foreign_wallet() {
        let (store, _temp) = test_store();

        let wallet = store
            .create(ProfileId::new("profile-1"), Currency::USD, false)
            .unwrap();
        let result = store.set_default(&ProfileId::new("profile-2"), &wallet.id);
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_verify_owner() {
        let (store, _temp) = test_store();
        let owner = ProfileId::new("profile-1");

        let wallet = store.create(owner.clone(), Currency::USD, false).unwrap();

        store.verify_owner(&wallet.id, &owner).unwrap();
        assert!(matches!(
            store.verify_owner(&wallet.id, &ProfileId::new("someone-else")),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_adjust_balance_happy_path() {
        let (store, _temp) = test_store();

        let wallet = store
            .create(ProfileId::new("profile-1"), Currency::USD, false)
            .unwrap();

        let updated = store.adjust_balance(&wallet.id, dec!(100.00), 0).unwrap();
        assert_eq!(updated.balance, dec!(100.00));
        assert_eq!(updated.version, 1);

        let updated = store.adjust_balance(&wallet.id, dec!(-40.00), 1).unwrap();
        assert_eq!(updated.balance, dec!(60.00));
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn test_stale_version_is_conflict() {
        let (store, _temp) = test_store();

        let wallet = store
            .create(ProfileId::new("profile-1"), Currency::USD, false)
            .unwrap();
        store.adjust_balance(&wallet.id, dec!(50.00), 0).unwrap();

        // Retry with the original version stamp
        let result = store.adjust_balance(&wallet.id, dec!(10.00), 0);
        assert!(matches!(result, Err(Error::ConcurrentModification(_))));

        // Balance untouched by the failed attempt
        assert_eq!(store.get(&wallet.id).unwrap().balance, dec!(50.00));
    }

    #[test]
    fn test_overdraft_is_rejected() {
        let (store, _temp) = test_store();

        let wallet = store
            .create(ProfileId::new("profile-1"), Currency::USD, false)
            .unwrap();
        store.adjust_balance(&wallet.id, dec!(30.00), 0).unwrap();

        let result = store.adjust_balance(&wallet.id, dec!(-50.00), 1);
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(store.get(&wallet.id).unwrap().balance, dec!(30.00));
    }

    #[test]
    fn test_disabled_wallet_rejects_mutation() {
        let (store, _temp) = test_store();

        let wallet = store
            .create(ProfileId::new("profile-1"), Currency::USD, false)
            .unwrap();
        store.disable(&wallet.id).unwrap();

        let result = store.adjust_balance(&wallet.id, dec!(10.00), 0);
        assert!(matches!(result, Err(Error::InvalidState(_))));

        // Reads still work
        let read = store.get(&wallet.id).unwrap();
        assert!(!read.is_active);
        assert!(!read.is_default);
    }
}
