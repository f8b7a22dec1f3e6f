//! # Redb Store
//!
//! Disk-backed tables using redb.
//!
//! ## Layout
//!
//! - `goals`, `events`, `categories`: id -> postcard-encoded row
//! - `*_by_owner`: (owner, id) -> () secondary index for scoped listing
//! - `profiles`: owner -> postcard-encoded profile
//! - `metadata`: `next_id`
//!
//! A `Changeset` is applied inside a single write transaction. Any scope
//! failure returns before `commit()`, and dropping the transaction aborts it.

use super::{Changeset, Owned, Store, Write, check_write, scoped};
use crate::{
    Category, CategoryId, Event, EventId, Goal, GoalId, OwnerId, Profile, WaypointError,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type RowTable = TableDefinition<'static, u64, &'static [u8]>;
type IndexTable = TableDefinition<'static, (u64, u64), ()>;

const GOALS: RowTable = TableDefinition::new("goals");
const GOALS_BY_OWNER: IndexTable = TableDefinition::new("goals_by_owner");
const EVENTS: RowTable = TableDefinition::new("events");
const EVENTS_BY_OWNER: IndexTable = TableDefinition::new("events_by_owner");
const CATEGORIES: RowTable = TableDefinition::new("categories");
const CATEGORIES_BY_OWNER: IndexTable = TableDefinition::new("categories_by_owner");
const PROFILES: RowTable = TableDefinition::new("profiles");
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_ID_KEY: &str = "next_id";

/// Persistent store using redb.
pub struct RedbStore {
    db: Database,
    next_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, WaypointError> {
    postcard::to_allocvec(row).map_err(WaypointError::serialization)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WaypointError> {
    postcard::from_bytes(bytes).map_err(WaypointError::serialization)
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WaypointError> {
        let db = Database::create(path.as_ref()).map_err(WaypointError::storage)?;

        // Create tables so readers never hit a missing table.
        {
            let write_txn = db.begin_write().map_err(WaypointError::storage)?;
            for def in [GOALS, EVENTS, CATEGORIES, PROFILES] {
                let _ = write_txn.open_table(def).map_err(WaypointError::storage)?;
            }
            for def in [GOALS_BY_OWNER, EVENTS_BY_OWNER, CATEGORIES_BY_OWNER] {
                let _ = write_txn.open_table(def).map_err(WaypointError::storage)?;
            }
            let _ = write_txn
                .open_table(METADATA)
                .map_err(WaypointError::storage)?;
            write_txn.commit().map_err(WaypointError::storage)?;
        }

        let next_id = {
            let read_txn = db.begin_read().map_err(WaypointError::storage)?;
            let table = read_txn
                .open_table(METADATA)
                .map_err(WaypointError::storage)?;
            table
                .get(NEXT_ID_KEY)
                .map_err(WaypointError::storage)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        tracing::debug!(
            path = %path.as_ref().display(),
            next_id,
            "opened redb store"
        );
        Ok(Self { db, next_id })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, WaypointError> {
        self.db.compact().map_err(WaypointError::storage)
    }

    fn read_row<T: DeserializeOwned>(
        &self,
        def: RowTable,
        id: u64,
    ) -> Result<Option<T>, WaypointError> {
        let read_txn = self.db.begin_read().map_err(WaypointError::storage)?;
        let table = read_txn.open_table(def).map_err(WaypointError::storage)?;
        match table.get(id).map_err(WaypointError::storage)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn read_owned<T: DeserializeOwned>(
        &self,
        rows: RowTable,
        index: IndexTable,
        owner: OwnerId,
    ) -> Result<Vec<T>, WaypointError> {
        let read_txn = self.db.begin_read().map_err(WaypointError::storage)?;
        let index = read_txn.open_table(index).map_err(WaypointError::storage)?;
        let rows = read_txn.open_table(rows).map_err(WaypointError::storage)?;

        let mut out = Vec::new();
        for entry in index
            .range((owner.0, 0u64)..=(owner.0, u64::MAX))
            .map_err(WaypointError::storage)?
        {
            let (key, _) = entry.map_err(WaypointError::storage)?;
            let (_, id) = key.value();
            if let Some(bytes) = rows.get(id).map_err(WaypointError::storage)? {
                out.push(decode(bytes.value())?);
            }
        }
        Ok(out)
    }
}

// =============================================================================
// WRITE TRANSACTION
// =============================================================================

/// Open tables for one `Changeset`.
struct Batch<'txn> {
    goals: Table<'txn, u64, &'static [u8]>,
    goals_by_owner: Table<'txn, (u64, u64), ()>,
    events: Table<'txn, u64, &'static [u8]>,
    events_by_owner: Table<'txn, (u64, u64), ()>,
    categories: Table<'txn, u64, &'static [u8]>,
    categories_by_owner: Table<'txn, (u64, u64), ()>,
    profiles: Table<'txn, u64, &'static [u8]>,
}

impl<'txn> Batch<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self, WaypointError> {
        Ok(Self {
            goals: txn.open_table(GOALS).map_err(WaypointError::storage)?,
            goals_by_owner: txn
                .open_table(GOALS_BY_OWNER)
                .map_err(WaypointError::storage)?,
            events: txn.open_table(EVENTS).map_err(WaypointError::storage)?,
            events_by_owner: txn
                .open_table(EVENTS_BY_OWNER)
                .map_err(WaypointError::storage)?,
            categories: txn.open_table(CATEGORIES).map_err(WaypointError::storage)?,
            categories_by_owner: txn
                .open_table(CATEGORIES_BY_OWNER)
                .map_err(WaypointError::storage)?,
            profiles: txn.open_table(PROFILES).map_err(WaypointError::storage)?,
        })
    }

    /// Put `row`, refusing to overwrite a row owned by someone else.
    fn put<T: Owned + Serialize + DeserializeOwned>(
        owner: OwnerId,
        rows: &mut Table<'txn, u64, &'static [u8]>,
        index: &mut Table<'txn, (u64, u64), ()>,
        row: &T,
    ) -> Result<(), WaypointError> {
        check_write(owner, row)?;
        Self::check_existing::<T>(owner, rows, row.row_id())?;
        let bytes = encode(row)?;
        rows.insert(row.row_id(), bytes.as_slice())
            .map_err(WaypointError::storage)?;
        index
            .insert((owner.0, row.row_id()), ())
            .map_err(WaypointError::storage)?;
        Ok(())
    }

    fn delete<T: Owned + DeserializeOwned>(
        owner: OwnerId,
        rows: &mut Table<'txn, u64, &'static [u8]>,
        index: &mut Table<'txn, (u64, u64), ()>,
        id: u64,
    ) -> Result<(), WaypointError> {
        Self::check_existing::<T>(owner, rows, id)?;
        rows.remove(id).map_err(WaypointError::storage)?;
        index
            .remove((owner.0, id))
            .map_err(WaypointError::storage)?;
        Ok(())
    }

    fn check_existing<T: Owned + DeserializeOwned>(
        owner: OwnerId,
        rows: &Table<'txn, u64, &'static [u8]>,
        id: u64,
    ) -> Result<(), WaypointError> {
        let existing: Option<T> = match rows.get(id).map_err(WaypointError::storage)? {
            Some(bytes) => Some(decode(bytes.value())?),
            None => None,
        };
        match existing {
            Some(row) => check_write(owner, &row),
            None => Ok(()),
        }
    }

    fn apply(&mut self, owner: OwnerId, write: &Write) -> Result<(), WaypointError> {
        match write {
            Write::PutGoal(goal) => {
                Self::put(owner, &mut self.goals, &mut self.goals_by_owner, goal)
            }
            Write::DeleteGoal(id) => {
                Self::delete::<Goal>(owner, &mut self.goals, &mut self.goals_by_owner, id.0)
            }
            Write::PutEvent(event) => {
                Self::put(owner, &mut self.events, &mut self.events_by_owner, event)
            }
            Write::DeleteEvent(id) => {
                Self::delete::<Event>(owner, &mut self.events, &mut self.events_by_owner, id.0)
            }
            Write::PutCategory(category) => Self::put(
                owner,
                &mut self.categories,
                &mut self.categories_by_owner,
                category,
            ),
            Write::DeleteCategory(id) => Self::delete::<Category>(
                owner,
                &mut self.categories,
                &mut self.categories_by_owner,
                id.0,
            ),
            Write::PutProfile(profile) => {
                check_write(owner, profile)?;
                let bytes = encode(profile)?;
                self.profiles
                    .insert(owner.0, bytes.as_slice())
                    .map_err(WaypointError::storage)?;
                Ok(())
            }
        }
    }
}

impl Store for RedbStore {
    fn allocate_id(&mut self) -> Result<u64, WaypointError> {
        let next = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| WaypointError::Storage("id space exhausted".to_string()))?;

        let write_txn = self.db.begin_write().map_err(WaypointError::storage)?;
        {
            let mut table = write_txn
                .open_table(METADATA)
                .map_err(WaypointError::storage)?;
            table
                .insert(NEXT_ID_KEY, next)
                .map_err(WaypointError::storage)?;
        }
        write_txn.commit().map_err(WaypointError::storage)?;

        self.next_id = next;
        Ok(next)
    }

    fn goal(&self, owner: OwnerId, id: GoalId) -> Result<Option<Goal>, WaypointError> {
        scoped(owner, self.read_row(GOALS, id.0)?)
    }

    fn goals(&self, owner: OwnerId) -> Result<Vec<Goal>, WaypointError> {
        self.read_owned(GOALS, GOALS_BY_OWNER, owner)
    }

    fn event(&self, owner: OwnerId, id: EventId) -> Result<Option<Event>, WaypointError> {
        scoped(owner, self.read_row(EVENTS, id.0)?)
    }

    fn events(&self, owner: OwnerId) -> Result<Vec<Event>, WaypointError> {
        self.read_owned(EVENTS, EVENTS_BY_OWNER, owner)
    }

    fn category(
        &self,
        owner: OwnerId,
        id: CategoryId,
    ) -> Result<Option<Category>, WaypointError> {
        scoped(owner, self.read_row(CATEGORIES, id.0)?)
    }

    fn categories(&self, owner: OwnerId) -> Result<Vec<Category>, WaypointError> {
        self.read_owned(CATEGORIES, CATEGORIES_BY_OWNER, owner)
    }

    fn profile(&self, owner: OwnerId) -> Result<Option<Profile>, WaypointError> {
        self.read_row(PROFILES, owner.0)
    }

    fn commit(&mut self, owner: OwnerId, changes: &Changeset) -> Result<(), WaypointError> {
        if changes.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(WaypointError::storage)?;
        {
            let mut batch = Batch::open(&write_txn)?;
            for write in changes.writes() {
                batch.apply(owner, write)?;
            }
        }
        write_txn.commit().map_err(WaypointError::storage)?;
        tracing::trace!(owner = owner.0, writes = changes.len(), "redb commit");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
