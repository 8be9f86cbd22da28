//! sled-backed persistent storage.
//!
//! Each table maps to a separate sled `Tree`; each secondary index gets its
//! own tree keyed `hash \0 range \0 primary-key`. A row and its index
//! entries change together in one multi-tree transaction. Provisioned tables
//! are recorded in a catalog tree so `create_table` survives restarts.
//!
//! sled is synchronous, so every call runs on the blocking pool.

use super::{
    KvBackend, KvRequest, ObjectStore, QueryOutput, WriteMode, compare, finish_rows, missing_table,
};
use crate::error::{MkvError, MkvResult};
use crate::resource::Resource;
use crate::schema::{IndexDefinition, Key, TableDefinition, value_key_string};
use async_trait::async_trait;
use serde_json::Value;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, abort};
use std::path::Path;
use tracing::debug;

const CATALOG_TREE: &str = "__modelkv_tables";
const OBJECTS_TREE: &str = "__modelkv_objects";

async fn blocking<T, F>(db: &sled::Db, f: F) -> MkvResult<T>
where
    F: FnOnce(&sled::Db) -> MkvResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

fn decode(bytes: &[u8]) -> MkvResult<Resource> {
    Ok(serde_json::from_slice(bytes)?)
}

fn index_tree_name(def: &TableDefinition, index: &IndexDefinition) -> String {
    format!("{}#{}", def.table_name, index.name)
}

fn hash_prefix(hash: &Value) -> String {
    format!("{}\u{0}", value_key_string(hash))
}

/// Index entry key for `row`, or `None` if the row lacks the index hash key.
fn index_key(index: &IndexDefinition, row: &Resource, primary: &str) -> Option<String> {
    let hash = row.get(&index.hash_key).filter(|v| !v.is_null())?;
    let range = index
        .range_key
        .as_deref()
        .and_then(|name| row.get(name))
        .map(value_key_string)
        .unwrap_or_default();
    Some(format!("{}{range}\u{0}{primary}", hash_prefix(hash)))
}

/// Persistent [`KvBackend`] on sled.
#[derive(Clone)]
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open at the given directory path.
    pub fn open(path: &Path) -> MkvResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a temporary store (for testing). Data is deleted on drop.
    pub fn open_temporary() -> MkvResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    /// Overflow store sharing this database.
    pub fn object_store(&self) -> MkvResult<SledObjectStore> {
        SledObjectStore::from_db(&self.db)
    }

    pub fn flush(&self) -> MkvResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn table(db: &sled::Db, def: &TableDefinition) -> MkvResult<sled::Tree> {
        let catalog = db.open_tree(CATALOG_TREE)?;
        if !catalog.contains_key(def.table_name.as_bytes())? {
            return Err(missing_table(&def.table_name));
        }
        Ok(db.open_tree(def.table_name.as_bytes())?)
    }

    /// The table tree followed by one tree per secondary index, in definition order.
    fn trees(db: &sled::Db, def: &TableDefinition) -> MkvResult<Vec<sled::Tree>> {
        let mut trees = vec![Self::table(db, def)?];
        for index in &def.indexes {
            trees.push(db.open_tree(index_tree_name(def, index))?);
        }
        Ok(trees)
    }

    /// Replace (or remove, when `new` is `None`) the row at `primary` and
    /// rewrite its index entries in one transaction. Returns the previous row.
    fn swap_row(
        db: &sled::Db,
        def: &TableDefinition,
        primary: &str,
        new: Option<&Resource>,
        mode: WriteMode,
    ) -> MkvResult<Option<Resource>> {
        let trees = Self::trees(db, def)?;
        let bytes = new.map(serde_json::to_vec).transpose()?;

        let previous = trees.as_slice().transaction(
            |views| -> ConflictableTransactionResult<Option<Resource>, MkvError> {
                let Some((table, indexes)) = views.split_first() else {
                    return abort(missing_table(&def.table_name));
                };
                let previous = table
                    .get(primary.as_bytes())?
                    .map(|v| decode(&v))
                    .transpose()
                    .map_err(ConflictableTransactionError::Abort)?;
                if mode == WriteMode::Create && previous.is_some() {
                    return abort(MkvError::ResourceExists(primary.to_string()));
                }

                match &bytes {
                    Some(bytes) => table.insert(primary.as_bytes(), bytes.as_slice())?,
                    None => table.remove(primary.as_bytes())?,
                };
                for (index, tree) in def.indexes.iter().zip(indexes) {
                    let stale = previous.as_ref().and_then(|row| index_key(index, row, primary));
                    if let Some(key) = stale {
                        tree.remove(key.as_bytes())?;
                    }
                    if let Some(key) = new.and_then(|row| index_key(index, row, primary)) {
                        tree.insert(key.as_bytes(), primary.as_bytes())?;
                    }
                }
                Ok(previous)
            },
        )?;
        Ok(previous)
    }
}

#[async_trait]
impl KvBackend for SledBackend {
    async fn create_table(&self, def: &TableDefinition) -> MkvResult<()> {
        let def = def.clone();
        blocking(&self.db, move |db| {
            let catalog = db.open_tree(CATALOG_TREE)?;
            let schema = serde_json::to_vec(&def)?;
            let created = catalog.compare_and_swap(
                def.table_name.as_bytes(),
                None::<&[u8]>,
                Some(schema),
            )?;
            if created.is_err() {
                return Err(MkvError::TableAlreadyExists(def.table_name.clone()));
            }
            db.open_tree(def.table_name.as_bytes())?;
            for index in &def.indexes {
                db.open_tree(index_tree_name(&def, index))?;
            }
            debug!(table = %def.table_name, indexes = def.indexes.len(), "sled table created");
            Ok(())
        })
        .await
    }

    async fn get(&self, def: &TableDefinition, key: &Key) -> MkvResult<Option<Resource>> {
        let def = def.clone();
        let key = key.encode();
        blocking(&self.db, move |db| {
            let table = Self::table(db, &def)?;
            table.get(key.as_bytes())?.map(|v| decode(&v)).transpose()
        })
        .await
    }

    async fn put(&self, def: &TableDefinition, row: &Resource, mode: WriteMode) -> MkvResult<()> {
        let def = def.clone();
        let row = row.clone();
        blocking(&self.db, move |db| {
            let primary = def.key_of(&row)?.encode();
            Self::swap_row(db, &def, &primary, Some(&row), mode)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, def: &TableDefinition, key: &Key) -> MkvResult<Option<Resource>> {
        let def = def.clone();
        let primary = key.encode();
        blocking(&self.db, move |db| {
            Self::swap_row(db, &def, &primary, None, WriteMode::Update)
        })
        .await
    }

    async fn execute(&self, def: &TableDefinition, request: &KvRequest) -> MkvResult<QueryOutput> {
        let def = def.clone();
        let request = request.clone();
        blocking(&self.db, move |db| {
            let table = Self::table(db, &def)?;

            match &request {
                KvRequest::Query {
                    hash_value,
                    index,
                    conditions,
                    order,
                    limit,
                } => {
                    let (hash_attribute, range_attribute) =
                        KvRequest::key_attributes(&def, index.as_deref())?;
                    let mut rows = Vec::new();

                    match index.as_deref().and_then(|name| def.index(name)) {
                        Some(index) => {
                            let tree = db.open_tree(index_tree_name(&def, index))?;
                            for entry in tree.scan_prefix(hash_prefix(hash_value).as_bytes()) {
                                let (_, primary) = entry?;
                                if let Some(bytes) = table.get(&primary)? {
                                    rows.push(decode(&bytes)?);
                                }
                            }
                        }
                        None if def.range_key.is_none() => {
                            if let Some(bytes) = table.get(value_key_string(hash_value).as_bytes())? {
                                rows.push(decode(&bytes)?);
                            }
                        }
                        None => {
                            for entry in table.scan_prefix(hash_prefix(hash_value).as_bytes()) {
                                let (_, bytes) = entry?;
                                rows.push(decode(&bytes)?);
                            }
                        }
                    }
                    // index entries are keyed by the hash's string form
                    rows.retain(|row| {
                        row.get(hash_attribute)
                            .is_some_and(|v| compare::loose_eq(v, hash_value))
                    });

                    Ok(finish_rows(rows, conditions, range_attribute, *order, *limit))
                }
                KvRequest::Scan { conditions, limit } => {
                    let mut rows = Vec::new();
                    for entry in table.iter() {
                        let (_, bytes) = entry?;
                        let row = decode(&bytes)?;
                        if conditions.iter().all(|c| c.matches(&row)) {
                            rows.push(row);
                            if limit.is_some_and(|l| rows.len() >= l) {
                                break;
                            }
                        }
                    }
                    Ok(QueryOutput::new(rows))
                }
            }
        })
        .await
    }
}

/// Persistent [`ObjectStore`] on a sled tree keyed by link.
#[derive(Clone)]
pub struct SledObjectStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledObjectStore {
    pub fn open(path: &Path) -> MkvResult<Self> {
        Self::from_db(&sled::open(path)?)
    }

    pub fn open_temporary() -> MkvResult<Self> {
        Self::from_db(&sled::Config::new().temporary(true).open()?)
    }

    pub fn from_db(db: &sled::Db) -> MkvResult<Self> {
        Ok(Self {
            db: db.clone(),
            tree: db.open_tree(OBJECTS_TREE)?,
        })
    }
}

#[async_trait]
impl ObjectStore for SledObjectStore {
    async fn put_object(&self, resource: &Resource) -> MkvResult<Resource> {
        let link = resource.require_link()?.to_string();
        let bytes = serde_json::to_vec(resource)?;
        let tree = self.tree.clone();
        blocking(&self.db, move |_| {
            tree.insert(link.as_bytes(), bytes)?;
            Ok(())
        })
        .await?;
        Ok(resource.clone())
    }

    async fn get_object_by_link(&self, link: &str) -> MkvResult<Resource> {
        let link = link.to_string();
        let tree = self.tree.clone();
        blocking(&self.db, move |_| match tree.get(link.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Err(MkvError::not_found("object", link)),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{UPDATED_AT_FIELD, default_indexes};
    use crate::storage::Condition;
    use serde_json::json;

    fn def() -> TableDefinition {
        TableDefinition {
            model_id: "t.Widget".to_string(),
            table_name: "t_Widget".to_string(),
            hash_key: "link".to_string(),
            range_key: None,
            indexes: default_indexes(),
            attributes: Default::default(),
            updated_at_field: UPDATED_AT_FIELD.to_string(),
        }
    }

    fn row(link: &str, author: &str, time: i64) -> Resource {
        Resource::new()
            .with("link", link)
            .with("permalink", link)
            .with("author", author)
            .with("time", time)
    }

    #[tokio::test]
    async fn test_create_table_idempotence_signal() {
        let backend = SledBackend::open_temporary().unwrap();
        backend.create_table(&def()).await.unwrap();
        let err = backend.create_table(&def()).await.unwrap_err();
        assert!(matches!(err, MkvError::TableAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_missing_table() {
        let backend = SledBackend::open_temporary().unwrap();
        let err = backend.get(&def(), &Key::hash("L1")).await.unwrap_err();
        assert!(matches!(err, MkvError::Backend(_)));
    }

    #[tokio::test]
    async fn test_crud() {
        let backend = SledBackend::open_temporary().unwrap();
        let def = def();
        backend.create_table(&def).await.unwrap();

        backend.put(&def, &row("L1", "A", 1), WriteMode::Create).await.unwrap();
        assert!(matches!(
            backend.put(&def, &row("L1", "A", 1), WriteMode::Create).await,
            Err(MkvError::ResourceExists(_))
        ));
        backend.put(&def, &row("L1", "B", 2), WriteMode::Update).await.unwrap();

        let got = backend.get(&def, &Key::hash("L1")).await.unwrap().unwrap();
        assert_eq!(got.author(), Some("B"));

        let removed = backend.delete(&def, &Key::hash("L1")).await.unwrap();
        assert_eq!(removed.and_then(|r| r.author().map(str::to_string)), Some("B".to_string()));
        assert!(backend.get(&def, &Key::hash("L1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_maintained_on_update_and_delete() {
        let backend = SledBackend::open_temporary().unwrap();
        let def = def();
        backend.create_table(&def).await.unwrap();

        backend.put(&def, &row("L1", "amy", 1), WriteMode::Create).await.unwrap();
        backend.put(&def, &row("L2", "amy", 2), WriteMode::Create).await.unwrap();
        backend.put(&def, &row("L1", "bob", 1), WriteMode::Update).await.unwrap();

        let amy = backend.execute(&def, &by_author("amy")).await.unwrap();
        assert_eq!(amy.count, 1);
        assert_eq!(amy.items[0].link(), Some("L2"));

        let bob = backend.execute(&def, &by_author("bob")).await.unwrap();
        assert_eq!(bob.items[0].link(), Some("L1"));

        backend.delete(&def, &Key::hash("L1")).await.unwrap();
        let bob = backend.execute(&def, &by_author("bob")).await.unwrap();
        assert_eq!(bob.count, 0);
    }

    fn by_author(author: &str) -> KvRequest {
        KvRequest::Query {
            hash_value: json!(author),
            index: Some("AuthorAndDateIndex".to_string()),
            conditions: vec![],
            order: None,
            limit: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_leave_one_index_entry() {
        let backend = SledBackend::open_temporary().unwrap();
        let def = def();
        backend.create_table(&def).await.unwrap();
        let authors = ["amy", "bob", "cat", "dan", "eve", "fay", "gus", "hal"];

        let mut tasks = Vec::new();
        for round in 0..8 {
            for (i, author) in authors.iter().enumerate() {
                let backend = backend.clone();
                let def = def.clone();
                let update = row("L1", author, (round * 10 + i) as i64);
                tasks.push(tokio::spawn(async move {
                    backend.put(&def, &update, WriteMode::Update).await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = backend.get(&def, &Key::hash("L1")).await.unwrap().unwrap();
        let mut holders = Vec::new();
        for author in authors {
            let found = backend.execute(&def, &by_author(author)).await.unwrap();
            assert!(found.items.iter().all(|r| r.author() == Some(author)));
            if found.count > 0 {
                holders.push(author);
            }
        }
        assert_eq!(holders, vec![stored.author().unwrap()]);

        let tree = backend
            .db
            .open_tree(index_tree_name(&def, def.index("AuthorAndDateIndex").unwrap()))
            .unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_index_entry_is_not_returned() {
        let backend = SledBackend::open_temporary().unwrap();
        let def = def();
        backend.create_table(&def).await.unwrap();
        backend.put(&def, &row("L1", "bob", 1), WriteMode::Create).await.unwrap();

        // an entry left behind by a row that no longer says "amy"
        let index = def.index("AuthorAndDateIndex").unwrap();
        let primary = Key::hash("L1").encode();
        let stale = index_key(index, &row("L1", "amy", 1), &primary).unwrap();
        backend
            .db
            .open_tree(index_tree_name(&def, index))
            .unwrap()
            .insert(stale.as_bytes(), primary.as_bytes())
            .unwrap();

        let amy = backend.execute(&def, &by_author("amy")).await.unwrap();
        assert_eq!(amy.count, 0);
        let bob = backend.execute(&def, &by_author("bob")).await.unwrap();
        assert_eq!(bob.count, 1);
    }

    #[tokio::test]
    async fn test_rejected_create_leaves_indexes_alone() {
        let backend = SledBackend::open_temporary().unwrap();
        let def = def();
        backend.create_table(&def).await.unwrap();
        backend.put(&def, &row("L1", "amy", 1), WriteMode::Create).await.unwrap();

        assert!(matches!(
            backend.put(&def, &row("L1", "bob", 2), WriteMode::Create).await,
            Err(MkvError::ResourceExists(_))
        ));
        assert_eq!(backend.execute(&def, &by_author("amy")).await.unwrap().count, 1);
        assert_eq!(backend.execute(&def, &by_author("bob")).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_primary_query_and_scan() {
        let backend = SledBackend::open_temporary().unwrap();
        let def = def();
        backend.create_table(&def).await.unwrap();
        for (link, author, time) in [("L1", "amy", 1), ("L2", "bob", 2), ("L3", "bob", 3)] {
            backend.put(&def, &row(link, author, time), WriteMode::Create).await.unwrap();
        }

        let one = backend
            .execute(
                &def,
                &KvRequest::Query {
                    hash_value: json!("L2"),
                    index: None,
                    conditions: vec![],
                    order: None,
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(one.items.len(), 1);

        let scanned = backend
            .execute(
                &def,
                &KvRequest::Scan {
                    conditions: vec![Condition::eq("author", "bob")],
                    limit: Some(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(scanned.count, 1);
        assert_eq!(scanned.items[0].author(), Some("bob"));
    }

    #[tokio::test]
    async fn test_state_lives_in_the_db() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let def = def();

        let first = SledBackend::from_db(db.clone());
        first.create_table(&def).await.unwrap();
        first.put(&def, &row("L1", "A", 1), WriteMode::Create).await.unwrap();
        first.flush().unwrap();
        drop(first);

        let second = SledBackend::from_db(db);
        assert!(matches!(
            second.create_table(&def).await,
            Err(MkvError::TableAlreadyExists(_))
        ));
        assert!(second.get(&def, &Key::hash("L1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_object_store() {
        let backend = SledBackend::open_temporary().unwrap();
        let store = backend.object_store().unwrap();
        store.put_object(&row("L1", "A", 1)).await.unwrap();
        assert_eq!(store.get_object_by_link("L1").await.unwrap().author(), Some("A"));
        assert!(store.get_object_by_link("nope").await.unwrap_err().is_not_found());
    }
}
