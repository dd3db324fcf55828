//! Presence-based flip of a relationship record (like, subscribe).

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::pipeline::Filter;
use crate::{Collection, Database};

impl Database {
    /// Flip the relationship identified by `pair`: absent → insert the
    /// record `make` produces and report true; present → delete it and
    /// report false.
    ///
    /// The check-then-act has a race window. The collection's unique
    /// (actor, target) index is the backstop: the losing writer's insert
    /// comes back as a duplicate, which means the relationship exists -
    /// reported as true, not as an error.
    pub fn toggle(
        &self,
        coll: Collection,
        pair: &Filter,
        make: impl FnOnce() -> Value,
    ) -> Result<bool> {
        if let Some(existing) = self.find_one_raw(coll, pair)? {
            let id = existing
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::BadFilter(format!("{} document without id", coll.table())))?;
            self.remove(coll, id)?;
            return Ok(false);
        }

        match self.insert(coll, &make()) {
            Ok(()) => Ok(true),
            Err(e) if e.is_duplicate() => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn subscription(id: &str) -> Value {
        json!({
            "id": id,
            "subscriber": "alice",
            "channel": "bob",
            "created_at": "2024-01-01T00:00:00Z",
        })
    }

    fn pair() -> Filter {
        Filter::new()
            .eq("subscriber", json!("alice"))
            .eq("channel", json!("bob"))
    }

    #[test]
    fn toggling_flips_presence_each_call() {
        let db = Database::open_in_memory().unwrap();

        assert!(db.toggle(Collection::Subscriptions, &pair(), || subscription("s1")).unwrap());
        assert_eq!(db.count(Collection::Subscriptions, &pair()).unwrap(), 1);

        assert!(!db.toggle(Collection::Subscriptions, &pair(), || subscription("s2")).unwrap());
        assert_eq!(db.count(Collection::Subscriptions, &pair()).unwrap(), 0);

        // third call flips back on
        assert!(db.toggle(Collection::Subscriptions, &pair(), || subscription("s3")).unwrap());
        assert_eq!(db.count(Collection::Subscriptions, &pair()).unwrap(), 1);
    }

    #[test]
    fn losing_writer_sees_already_toggled_not_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.insert(Collection::Subscriptions, &subscription("s1")).unwrap();

        // A pair filter that misses the existing record simulates the
        // race loser: its existence check saw nothing, its insert hits
        // the unique index.
        let stale_check = pair().eq("id", json!("not-s1"));
        let toggled = db
            .toggle(Collection::Subscriptions, &stale_check, || subscription("s2"))
            .unwrap();

        assert!(toggled);
        assert_eq!(db.count(Collection::Subscriptions, &pair()).unwrap(), 1);
    }

    #[test]
    fn concurrent_writers_leave_exactly_one_record() {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    db.insert(Collection::Subscriptions, &subscription(&format!("s{i}")))
                })
            })
            .collect();

        let mut ok = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(()) => ok += 1,
                Err(e) if e.is_duplicate() => duplicates += 1,
                Err(e) => panic!("unexpected store error: {e}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(db.count(Collection::Subscriptions, &pair()).unwrap(), 1);
    }
}
