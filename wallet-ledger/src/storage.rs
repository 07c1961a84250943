//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `wallets` - Wallet records (key: wallet_id)
//! - `transactions` - Ledger transactions (key: transaction_id)
//! - `escrows` - Escrow holds (key: hold_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! Multi-record commits go through [`Storage::commit_atomic`] so a wallet
//! update and the transaction/hold records that explain it land in a single
//! `WriteBatch`: either everything persists or nothing does.

use crate::{
    config::Config,
    error::{Error, Result},
    types::{ContractId, EscrowHold, LedgerTransaction, ProfileId, Wallet, WalletId},
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_WALLETS: &str = "wallets";
const CF_TRANSACTIONS: &str = "transactions";
const CF_ESCROWS: &str = "escrows";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_archive()),
            ColumnFamilyDescriptor::new(CF_ESCROWS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_archive() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Wallet operations

    /// Put wallet (with owner index)
    pub fn put_wallet(&self, wallet: &Wallet) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, wallet)?;
        self.db.write(batch)?;

        tracing::debug!(
            wallet_id = %wallet.id,
            version = wallet.version,
            "Wallet written"
        );

        Ok(())
    }

    /// Get wallet by ID
    pub fn get_wallet(&self, wallet_id: &WalletId) -> Result<Wallet> {
        let cf = self.cf_handle(CF_WALLETS)?;

        let value = self
            .db
            .get_cf(cf, wallet_id.as_str().as_bytes())?
            .ok_or_else(|| Error::WalletNotFound(wallet_id.to_string()))?;

        let wallet: Wallet = bincode::deserialize(&value)?;
        Ok(wallet)
    }

    /// Get all wallets owned by a profile (via index)
    pub fn wallets_for_owner(&self, owner_id: &ProfileId) -> Result<Vec<Wallet>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix_owner(owner_id);
        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut wallets = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let wallet_id = WalletId::new(String::from_utf8_lossy(&key[prefix.len()..]));
            wallets.push(self.get_wallet(&wallet_id)?);
        }

        Ok(wallets)
    }

    // Transaction operations

    /// Put transaction (with wallet index)
    pub fn put_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_transaction(&mut batch, tx)?;
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %tx.id,
            wallet_id = %tx.wallet_id,
            status = %tx.status,
            "Transaction written"
        );

        Ok(())
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, tx_id: Uuid) -> Result<LedgerTransaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let value = self
            .db
            .get_cf(cf, tx_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(tx_id.to_string()))?;

        let tx: LedgerTransaction = bincode::deserialize(&value)?;
        Ok(tx)
    }

    /// Get all transactions referencing a wallet (via index)
    pub fn transactions_for_wallet(&self, wallet_id: &WalletId) -> Result<Vec<LedgerTransaction>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix_wallet_tx(wallet_id);
        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut txs = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            if key.len() >= prefix.len() + 16 {
                let tx_id_bytes: [u8; 16] = key[prefix.len()..prefix.len() + 16]
                    .try_into()
                    .map_err(|_| Error::Storage("Malformed transaction index key".to_string()))?;
                txs.push(self.get_transaction(Uuid::from_bytes(tx_id_bytes))?);
            }
        }

        Ok(txs)
    }

    // Escrow operations

    /// Put escrow hold (with contract index)
    pub fn put_hold(&self, hold: &EscrowHold) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_hold(&mut batch, hold)?;
        self.db.write(batch)?;

        Ok(())
    }

    /// Get escrow hold by ID
    pub fn get_hold(&self, hold_id: Uuid) -> Result<EscrowHold> {
        let cf = self.cf_handle(CF_ESCROWS)?;

        let value = self
            .db
            .get_cf(cf, hold_id.as_bytes())?
            .ok_or_else(|| Error::EscrowNotFound(hold_id.to_string()))?;

        let hold: EscrowHold = bincode::deserialize(&value)?;
        Ok(hold)
    }

    /// Get all escrow holds for a contract (via index)
    pub fn holds_for_contract(&self, contract_id: &ContractId) -> Result<Vec<EscrowHold>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix_contract(contract_id);
        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut holds = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            if key.len() >= prefix.len() + 16 {
                let hold_id_bytes: [u8; 16] = key[prefix.len()..prefix.len() + 16]
                    .try_into()
                    .map_err(|_| Error::Storage("Malformed escrow index key".to_string()))?;
                holds.push(self.get_hold(Uuid::from_bytes(hold_id_bytes))?);
            }
        }

        Ok(holds)
    }

    // Atomic commits

    /// Write wallets, transactions, and holds in a single batch.
    ///
    /// This is the only write path for money movement: the wallet balance
    /// change and the records that explain it cannot be torn apart.
    pub fn commit_atomic(
        &self,
        wallets: &[&Wallet],
        transactions: &[&LedgerTransaction],
        holds: &[&EscrowHold],
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        for wallet in wallets {
            self.stage_wallet(&mut batch, wallet)?;
        }
        for tx in transactions {
            self.stage_transaction(&mut batch, tx)?;
        }
        for hold in holds {
            self.stage_hold(&mut batch, hold)?;
        }

        self.db.write(batch)?;
        Ok(())
    }

    // Batch staging helpers

    fn stage_wallet(&self, batch: &mut WriteBatch, wallet: &Wallet) -> Result<()> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let value = bincode::serialize(wallet)?;
        batch.put_cf(cf, wallet.id.as_str().as_bytes(), &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx = Self::index_key_owner_wallet(&wallet.owner_id, &wallet.id);
        batch.put_cf(cf_indices, &idx, []);

        Ok(())
    }

    fn stage_transaction(&self, batch: &mut WriteBatch, tx: &LedgerTransaction) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = bincode::serialize(tx)?;
        batch.put_cf(cf, tx.id.as_bytes(), &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx = Self::index_key_wallet_tx(&tx.wallet_id, tx.id);
        batch.put_cf(cf_indices, &idx, []);

        Ok(())
    }

    fn stage_hold(&self, batch: &mut WriteBatch, hold: &EscrowHold) -> Result<()> {
        let cf = self.cf_handle(CF_ESCROWS)?;
        let value = bincode::serialize(hold)?;
        batch.put_cf(cf, hold.id.as_bytes(), &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx = Self::index_key_contract_hold(&hold.contract_id, hold.id);
        batch.put_cf(cf_indices, &idx, []);

        Ok(())
    }

    // Index key helpers

    fn index_prefix_owner(owner_id: &ProfileId) -> Vec<u8> {
        let mut key = b"w|".to_vec();
        key.extend_from_slice(owner_id.as_str().as_bytes());
        key.push(b'|');
        key
    }

    fn index_key_owner_wallet(owner_id: &ProfileId, wallet_id: &WalletId) -> Vec<u8> {
        let mut key = Self::index_prefix_owner(owner_id);
        key.extend_from_slice(wallet_id.as_str().as_bytes());
        key
    }

    fn index_prefix_wallet_tx(wallet_id: &WalletId) -> Vec<u8> {
        let mut key = b"t|".to_vec();
        key.extend_from_slice(wallet_id.as_str().as_bytes());
        key.push(b'|');
        key
    }

    fn index_key_wallet_tx(wallet_id: &WalletId, tx_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix_wallet_tx(wallet_id);
        key.extend_from_slice(tx_id.as_bytes());
        key
    }

    fn index_prefix_contract(contract_id: &ContractId) -> Vec<u8> {
        let mut key = b"c|".to_vec();
        key.extend_from_slice(contract_id.as_str().as_bytes());
        key.push(b'|');
        key
    }

    fn index_key_contract_hold(contract_id: &ContractId, hold_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix_contract(contract_id);
        key.extend_from_slice(hold_id.as_bytes());
        key
    }

    /// Count wallets (approximate, for diagnostics)
    pub fn approximate_wallet_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }
}
