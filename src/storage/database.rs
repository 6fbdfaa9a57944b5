// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded relational store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! Entity tables map `id → JSON row`; the table and key of each entity are
//! declared by its [`Record`] impl next to the type. Secondary tables:
//!
//! - unique indexes (`user_email`, `user_name`, `account_address`, `auth_subject`): key → id
//! - ordering indexes (`*_by_org`, ...): `scope|created_at_us_be|id` → id
//! - link tables (`quorum_members`): `organization_id|user_id` → JSON row
//!
//! Every multi-entity write runs in one redb write transaction, so a failed
//! constraint check leaves nothing behind.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{
    ReadTransaction, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

use super::pagination::{decode_cursor, encode_cursor, Page, PageRequest};
use crate::models::{Activity, AuthMethod, Organization, Proof, User, Wallet, WalletAccount};

// =============================================================================
// Table Definitions
// =============================================================================

pub type RowTable = TableDefinition<'static, &'static str, &'static [u8]>;
pub type UniqueIndex = TableDefinition<'static, &'static str, &'static str>;
pub type OrderIndex = TableDefinition<'static, &'static [u8], &'static str>;

/// Lowercased email → user id (global).
pub(crate) const USER_EMAIL: UniqueIndex = TableDefinition::new("user_email");
/// `organization_id|username` → user id.
pub(crate) const USER_NAME: UniqueIndex = TableDefinition::new("user_name");
/// Derived address → account id (global).
pub(crate) const ACCOUNT_ADDRESS: UniqueIndex = TableDefinition::new("account_address");
/// `provider|subject` → auth method id.
pub(crate) const AUTH_SUBJECT: UniqueIndex = TableDefinition::new("auth_subject");

/// `organization_id|user_id` → JSON QuorumMember.
pub(crate) const QUORUM_MEMBERS: RowTable = TableDefinition::new("quorum_members");

pub(crate) const ORG_ORDER: OrderIndex = TableDefinition::new("org_order");
pub(crate) const USER_BY_ORG: OrderIndex = TableDefinition::new("user_by_org");
pub(crate) const AUTH_METHOD_BY_USER: OrderIndex = TableDefinition::new("auth_method_by_user");
pub(crate) const WALLET_BY_ORG: OrderIndex = TableDefinition::new("wallet_by_org");
pub(crate) const ACCOUNT_BY_WALLET: OrderIndex = TableDefinition::new("account_by_wallet");
pub(crate) const ACTIVITY_BY_ORG: OrderIndex = TableDefinition::new("activity_by_org");
pub(crate) const PROOF_BY_ACTIVITY: OrderIndex = TableDefinition::new("proof_by_activity");

/// Scope of the global organization ordering index.
pub(crate) const GLOBAL_SCOPE: &str = "all";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A unique constraint or state transition was violated.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid page token")]
    InvalidCursor,
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Record mapping
// =============================================================================

/// Row mapping of an entity: its table, its key and its JSON row encoding.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: RowTable;

    fn id(&self) -> &str;

    fn to_row(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_row(bytes: &[u8]) -> StoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn read_row<R, T>(table: &T, id: &str) -> StoreResult<Option<R>>
where
    R: Record,
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(R::from_row(value.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn write_row<R: Record>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    record: &R,
) -> StoreResult<()> {
    let row = record.to_row()?;
    table.insert(record.id(), row.as_slice())?;
    Ok(())
}

/// Load one record inside a read transaction.
pub(crate) fn fetch<R: Record>(txn: &ReadTransaction, id: &str) -> StoreResult<Option<R>> {
    let table = txn.open_table(R::TABLE)?;
    read_row(&table, id)
}

/// Load one record inside a write transaction.
pub(crate) fn fetch_for_update<R: Record>(txn: &WriteTransaction, id: &str) -> StoreResult<Option<R>> {
    let table = txn.open_table(R::TABLE)?;
    read_row(&table, id)
}

/// Insert or overwrite one record inside a write transaction.
pub(crate) fn store<R: Record>(txn: &WriteTransaction, record: &R) -> StoreResult<()> {
    let mut table = txn.open_table(R::TABLE)?;
    write_row(&mut table, record)
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// `scope|` prefix shared by every key of one scope.
pub(crate) fn scope_prefix(scope: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(scope.len() + 1);
    prefix.extend_from_slice(scope.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Exclusive upper bound of a scope: the byte after `|`.
fn scope_end(scope: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(scope.len() + 1);
    end.extend_from_slice(scope.as_bytes());
    end.push(b'|' + 1);
    end
}

/// Ordering key `scope|created_at_micros_be|id`: creation time then id tiebreak.
pub(crate) fn order_key(scope: &str, created_at: DateTime<Utc>, id: &str) -> Vec<u8> {
    let micros = created_at.timestamp_micros().max(0) as u64;
    let mut key = scope_prefix(scope);
    key.reserve(8 + 1 + id.len());
    key.extend_from_slice(&micros.to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(id.as_bytes());
    key
}

/// Ordering key with an explicit sequence number instead of a timestamp.
pub(crate) fn sequence_key(scope: &str, sequence: u64, id: &str) -> Vec<u8> {
    let mut key = scope_prefix(scope);
    key.extend_from_slice(&sequence.to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(id.as_bytes());
    key
}

pub(crate) fn composite_key(left: &str, right: &str) -> String {
    format!("{left}|{right}")
}

/// Walk one scope of an ordering index from the page token on.
///
/// `load` maps an id to its item, or `None` to skip it (filtered out or
/// soft-deleted). One extra item is probed to decide whether a next page exists.
pub(crate) fn scan_page<T, R, F>(
    index: &T,
    scope: &str,
    page: &PageRequest,
    mut load: F,
) -> StoreResult<Page<R>>
where
    T: ReadableTable<&'static [u8], &'static str>,
    F: FnMut(&str) -> StoreResult<Option<R>>,
{
    let prefix = scope_prefix(scope);
    let end = scope_end(scope);

    let cursor = match page.page_token.as_deref() {
        Some(token) => {
            let key = decode_cursor(token)?;
            if !key.starts_with(&prefix) {
                return Err(StoreError::InvalidCursor);
            }
            Some(key)
        }
        None => None,
    };
    let start = cursor.clone().unwrap_or_else(|| prefix.clone());
    let limit = page.limit();

    let mut items = Vec::with_capacity(limit);
    let mut last_key: Option<Vec<u8>> = None;
    let mut has_more = false;

    for entry in index.range(start.as_slice()..end.as_slice())? {
        let (key, id) = entry?;
        let key_bytes = key.value().to_vec();

        // Skip the cursor entry itself
        if cursor.as_deref() == Some(key_bytes.as_slice()) {
            continue;
        }

        let Some(item) = load(id.value())? else {
            continue;
        };

        if items.len() == limit {
            has_more = true;
            break;
        }
        items.push(item);
        last_key = Some(key_bytes);
    }

    let next_page_token = if has_more {
        last_key.map(|k| encode_cursor(&k))
    } else {
        None
    };

    Ok(Page {
        items,
        next_page_token,
    })
}

/// Ids of a whole scope in index order.
pub(crate) fn scan_all<T>(index: &T, scope: &str) -> StoreResult<Vec<String>>
where
    T: ReadableTable<&'static [u8], &'static str>,
{
    let prefix = scope_prefix(scope);
    let end = scope_end(scope);
    let mut ids = Vec::new();
    for entry in index.range(prefix.as_slice()..end.as_slice())? {
        let (_, id) = entry?;
        ids.push(id.value().to_string());
    }
    Ok(ids)
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the embedded store. Cheap to share behind an `Arc`.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in [
                Organization::TABLE,
                User::TABLE,
                AuthMethod::TABLE,
                Wallet::TABLE,
                WalletAccount::TABLE,
                Activity::TABLE,
                Proof::TABLE,
                QUORUM_MEMBERS,
            ] {
                write_txn.open_table(table)?;
            }
            for index in [USER_EMAIL, USER_NAME, ACCOUNT_ADDRESS, AUTH_SUBJECT] {
                write_txn.open_table(index)?;
            }
            for index in [
                ORG_ORDER,
                USER_BY_ORG,
                AUTH_METHOD_BY_USER,
                WALLET_BY_ORG,
                ACCOUNT_BY_WALLET,
                ACTIVITY_BY_ORG,
                PROOF_BY_ACTIVITY,
            ] {
                write_txn.open_table(index)?;
            }
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "relational store opened");
        Ok(Self { db })
    }

    pub(crate) fn begin_read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn begin_write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Cheap liveness probe used by health checks.
    pub fn ping(&self) -> StoreResult<()> {
        let txn = self.begin_read()?;
        txn.open_table(Organization::TABLE)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const TEST_INDEX: OrderIndex = TableDefinition::new("test_index");

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn fill(db: &Database, scope: &str, count: i64) {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(TEST_INDEX).unwrap();
            for i in 0..count {
                let id = format!("id-{i:03}");
                let key = order_key(scope, base + Duration::seconds(i), &id);
                table.insert(key.as_slice(), id.as_str()).unwrap();
            }
        }
        txn.commit().unwrap();
    }

    fn page(db: &Database, scope: &str, size: u32, token: Option<String>) -> Page<String> {
        let txn = db.begin_read().unwrap();
        let table = txn.open_table(TEST_INDEX).unwrap();
        scan_page(
            &table,
            scope,
            &PageRequest::new(Some(size), token),
            |id| Ok(Some(id.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn order_keys_sort_by_time_then_id() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(order_key("s", t, "b") < order_key("s", t + Duration::microseconds(1), "a"));
        assert!(order_key("s", t, "a") < order_key("s", t, "b"));
        assert!(order_key("s", t, "z") < order_key("t", t, "a"));
    }

    #[test]
    fn pages_walk_a_scope_without_overlap() {
        let (db, _dir) = temp_db();
        fill(&db, "org-a", 5);
        fill(&db, "org-b", 3);

        let first = page(&db, "org-a", 2, None);
        assert_eq!(first.items, vec!["id-000", "id-001"]);
        let second = page(&db, "org-a", 2, first.next_page_token);
        assert_eq!(second.items, vec!["id-002", "id-003"]);
        let third = page(&db, "org-a", 2, second.next_page_token);
        assert_eq!(third.items, vec!["id-004"]);
        assert!(third.next_page_token.is_none());

        let other = page(&db, "org-b", 10, None);
        assert_eq!(other.items.len(), 3);
        assert!(other.next_page_token.is_none());
    }

    #[test]
    fn exact_page_has_no_dangling_token() {
        let (db, _dir) = temp_db();
        fill(&db, "org-a", 2);
        let only = page(&db, "org-a", 2, None);
        assert_eq!(only.items.len(), 2);
        assert!(only.next_page_token.is_none());
    }

    #[test]
    fn foreign_or_garbage_tokens_are_rejected() {
        let (db, _dir) = temp_db();
        fill(&db, "org-a", 3);
        fill(&db, "org-b", 3);

        let token = page(&db, "org-a", 1, None).next_page_token.unwrap();

        let txn = db.begin_read().unwrap();
        let table = txn.open_table(TEST_INDEX).unwrap();
        let cross = scan_page(&table, "org-b", &PageRequest::new(Some(1), Some(token)), |id| {
            Ok(Some(id.to_string()))
        });
        assert!(matches!(cross, Err(StoreError::InvalidCursor)));

        let garbage = scan_page(
            &table,
            "org-a",
            &PageRequest::new(Some(1), Some("not-hex".into())),
            |id| Ok(Some(id.to_string())),
        );
        assert!(matches!(garbage, Err(StoreError::InvalidCursor)));
    }

    #[test]
    fn concurrent_inserts_do_not_shift_pages() {
        let (db, _dir) = temp_db();
        fill(&db, "org-a", 4);
        let first = page(&db, "org-a", 2, None);

        // A row created earlier than the cursor must not reappear or push rows out.
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(TEST_INDEX).unwrap();
            let early = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            let key = order_key("org-a", early, "late-arrival");
            table.insert(key.as_slice(), "late-arrival").unwrap();
        }
        txn.commit().unwrap();

        let second = page(&db, "org-a", 2, first.next_page_token);
        assert_eq!(second.items, vec!["id-002", "id-003"]);
    }
}
