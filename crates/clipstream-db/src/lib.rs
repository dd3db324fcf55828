pub mod error;
pub mod migrations;
pub mod paginate;
pub mod pipeline;
pub mod toggle;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

pub use error::{Result, StoreError};
pub use paginate::{PageRequest, SortSpec};
pub use pipeline::{Cardinality, Filter, Lookup, Projection, Stage};

use error::is_unique_violation;

/// The document collections this store knows about. Table names are fixed
/// here rather than passed as strings so no query ever interpolates
/// caller-supplied identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Videos,
    Comments,
    Tweets,
    Likes,
    Subscriptions,
    Playlists,
}

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Videos => "videos",
            Collection::Comments => "comments",
            Collection::Tweets => "tweets",
            Collection::Likes => "likes",
            Collection::Subscriptions => "subscriptions",
            Collection::Playlists => "playlists",
        }
    }
}

/// Embedded document store: JSON documents in sqlite, one table per
/// collection, single-document writes atomic, no cross-document
/// transactions.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Document store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {e}"))?;
        f(&conn)
    }

    // -- Document CRUD --

    /// Insert a record; its `id` field becomes the primary key. A unique
    /// index rejection surfaces as [`StoreError::Duplicate`].
    pub fn insert<T: Serialize>(&self, coll: Collection, record: &T) -> Result<()> {
        let doc = to_doc(coll, record)?;
        let id = doc_id(coll, &doc)?;
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO {} (id, doc) VALUES (?1, ?2)", coll.table()),
                rusqlite::params![id, doc.to_string()],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(coll.table())
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    pub fn get<T: DeserializeOwned>(&self, coll: Collection, id: &str) -> Result<Option<T>> {
        match self.get_raw(coll, id)? {
            Some(doc) => Ok(Some(
                serde_json::from_value(doc).map_err(|e| StoreError::Corrupt(coll.table(), e))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_raw(&self, coll: Collection, id: &str) -> Result<Option<Value>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT doc FROM {} WHERE id = ?1", coll.table()))?;
            let mut rows = stmt.query_map([id], |row| row.get::<_, String>(0))?;
            match rows.next() {
                Some(row) => {
                    let raw = row?;
                    Ok(Some(
                        serde_json::from_str(&raw)
                            .map_err(|e| StoreError::Corrupt(coll.table(), e))?,
                    ))
                }
                None => Ok(None),
            }
        })
    }

    /// Replace the whole document - the store's unit of atomicity. Returns
    /// false when no document has that id.
    pub fn replace<T: Serialize>(&self, coll: Collection, record: &T) -> Result<bool> {
        let doc = to_doc(coll, record)?;
        let id = doc_id(coll, &doc)?;
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    &format!("UPDATE {} SET doc = ?2 WHERE id = ?1", coll.table()),
                    rusqlite::params![id, doc.to_string()],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::Duplicate(coll.table())
                    } else {
                        StoreError::from(e)
                    }
                })?;
            Ok(changed > 0)
        })
    }

    pub fn remove(&self, coll: Collection, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!("DELETE FROM {} WHERE id = ?1", coll.table()),
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Queries --

    pub fn find_one<T: DeserializeOwned>(
        &self,
        coll: Collection,
        filter: &Filter,
    ) -> Result<Option<T>> {
        match self.find_one_raw(coll, filter)? {
            Some(doc) => Ok(Some(
                serde_json::from_value(doc).map_err(|e| StoreError::Corrupt(coll.table(), e))?,
            )),
            None => Ok(None),
        }
    }

    pub fn find_one_raw(&self, coll: Collection, filter: &Filter) -> Result<Option<Value>> {
        let compiled = filter.compile()?;
        self.with_conn(|conn| {
            let docs = pipeline::scan(conn, coll, Some(filter))?;
            Ok(docs.into_iter().find(|doc| compiled.matches(doc)))
        })
    }

    pub fn count(&self, coll: Collection, filter: &Filter) -> Result<u64> {
        let compiled = filter.compile()?;
        self.with_conn(|conn| {
            let docs = pipeline::scan(conn, coll, Some(filter))?;
            Ok(docs.iter().filter(|doc| compiled.matches(doc)).count() as u64)
        })
    }

    /// Run a typed aggregation pipeline from a collection scan.
    pub fn aggregate(&self, coll: Collection, stages: &[Stage]) -> Result<Vec<Value>> {
        self.with_conn(|conn| pipeline::run_pipeline(conn, coll, stages))
    }
}

fn to_doc<T: Serialize>(coll: Collection, record: &T) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| StoreError::Corrupt(coll.table(), e))
}

fn doc_id(coll: Collection, doc: &Value) -> Result<String> {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::BadFilter(format!("{} document without id", coll.table())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_doc(id: &str, username: &str, email: &str) -> Value {
        json!({
            "id": id,
            "username": username,
            "email": email,
            "created_at": "2024-01-01T00:00:00Z",
        })
    }

    #[test]
    fn crud_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let doc = user_doc("u1", "chai", "chai@example.com");

        db.insert(Collection::Users, &doc).unwrap();
        let loaded: Value = db.get(Collection::Users, "u1").unwrap().unwrap();
        assert_eq!(loaded["username"], json!("chai"));

        let mut updated = doc.clone();
        updated["username"] = json!("chai2");
        assert!(db.replace(Collection::Users, &updated).unwrap());
        let loaded = db.get_raw(Collection::Users, "u1").unwrap().unwrap();
        assert_eq!(loaded["username"], json!("chai2"));

        assert!(db.remove(Collection::Users, "u1").unwrap());
        assert!(db.get_raw(Collection::Users, "u1").unwrap().is_none());
        assert!(!db.remove(Collection::Users, "u1").unwrap());
    }

    #[test]
    fn unique_username_and_email_enforced() {
        let db = Database::open_in_memory().unwrap();
        db.insert(Collection::Users, &user_doc("u1", "chai", "chai@example.com"))
            .unwrap();

        let err = db
            .insert(Collection::Users, &user_doc("u2", "chai", "other@example.com"))
            .unwrap_err();
        assert!(err.is_duplicate());

        let err = db
            .insert(Collection::Users, &user_doc("u3", "other", "chai@example.com"))
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn find_one_and_count_use_the_same_filter() {
        let db = Database::open_in_memory().unwrap();
        db.insert(Collection::Users, &user_doc("u1", "chai", "chai@example.com"))
            .unwrap();
        db.insert(Collection::Users, &user_doc("u2", "mocha", "mocha@example.com"))
            .unwrap();

        let filter = Filter::new().eq("username", json!("mocha"));
        let found = db.find_one_raw(Collection::Users, &filter).unwrap().unwrap();
        assert_eq!(found["id"], json!("u2"));
        assert_eq!(db.count(Collection::Users, &filter).unwrap(), 1);
        assert_eq!(db.count(Collection::Users, &Filter::new()).unwrap(), 2);
    }

    #[test]
    fn lookup_first_collapses_to_object_or_null() {
        let db = Database::open_in_memory().unwrap();
        db.insert(Collection::Users, &user_doc("u1", "chai", "chai@example.com"))
            .unwrap();
        db.insert(
            Collection::Videos,
            &json!({
                "id": "v1", "owner": "u1", "title": "with owner",
                "created_at": "2024-01-02T00:00:00Z",
            }),
        )
        .unwrap();
        db.insert(
            Collection::Videos,
            &json!({
                "id": "v2", "owner": "ghost", "title": "orphan",
                "created_at": "2024-01-03T00:00:00Z",
            }),
        )
        .unwrap();

        let stages = [
            Stage::Sort {
                field: "created_at".into(),
                descending: false,
            },
            Stage::Lookup(
                Lookup::new(Collection::Users, "owner", "id", "owner")
                    .first()
                    .with_pipeline(vec![Stage::Project(Projection::include(&[
                        "id", "username",
                    ]))]),
            ),
        ];
        let docs = db.aggregate(Collection::Videos, &stages).unwrap();

        assert_eq!(docs[0]["owner"]["username"], json!("chai"));
        // absent relation becomes null, not an empty array
        assert!(docs[1]["owner"].is_null());
    }

    #[test]
    fn lookup_preserves_local_array_order() {
        let db = Database::open_in_memory().unwrap();
        for (id, title) in [("a", "first"), ("b", "second"), ("c", "third")] {
            db.insert(
                Collection::Videos,
                &json!({
                    "id": id, "owner": "u1", "title": title,
                    "created_at": "2024-01-01T00:00:00Z",
                }),
            )
            .unwrap();
        }
        db.insert(
            Collection::Playlists,
            &json!({
                "id": "p1", "owner": "u1", "name": "mix",
                "videos": ["c", "a"],
                "created_at": "2024-01-01T00:00:00Z",
            }),
        )
        .unwrap();

        let stages = [Stage::Lookup(Lookup::new(
            Collection::Videos,
            "videos",
            "id",
            "videos",
        ))];
        let docs = db.aggregate(Collection::Playlists, &stages).unwrap();

        let titles: Vec<&str> = docs[0]["videos"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["third", "first"]);
    }
}
