//! Typed aggregation pipeline over JSON document collections.
//!
//! Every stage is an explicit variant rather than an open-ended key-value
//! map, and lookups are a first-class correlated sub-query abstraction:
//! join key, optional sub-pipeline, single-or-array cardinality. List
//! endpoints compose these stages instead of hand-rolling join logic.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use rusqlite::Connection;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::Collection;

// -- Filters --

/// Conjunction of clauses applied to a document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
pub enum Clause {
    /// Field equals value (dotted paths allowed).
    Eq(String, Value),
    /// Field equals any of the values.
    In(String, Vec<Value>),
    /// Field present and non-null.
    Exists(String),
    /// Case-insensitive regex, matching if any of the fields matches.
    Text { fields: Vec<String>, pattern: String },
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: Value) -> Self {
        self.clauses.push(Clause::Eq(field.to_string(), value));
        self
    }

    pub fn is_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.clauses.push(Clause::In(field.to_string(), values));
        self
    }

    pub fn exists(mut self, field: &str) -> Self {
        self.clauses.push(Clause::Exists(field.to_string()));
        self
    }

    pub fn text(mut self, fields: &[&str], pattern: &str) -> Self {
        self.clauses.push(Clause::Text {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            pattern: pattern.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Equality clauses with string values, for SQL pushdown.
    pub(crate) fn eq_string_clauses(&self) -> Vec<(&str, &str)> {
        self.clauses
            .iter()
            .filter_map(|c| match c {
                Clause::Eq(field, Value::String(s)) => Some((field.as_str(), s.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Compile regexes once so per-document matching is cheap.
    pub(crate) fn compile(&self) -> Result<CompiledFilter> {
        let mut clauses = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            clauses.push(match clause {
                Clause::Eq(f, v) => CompiledClause::Eq(f.clone(), v.clone()),
                Clause::In(f, vs) => CompiledClause::In(f.clone(), vs.clone()),
                Clause::Exists(f) => CompiledClause::Exists(f.clone()),
                Clause::Text { fields, pattern } => {
                    let regex = RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| StoreError::BadFilter(e.to_string()))?;
                    CompiledClause::Text {
                        fields: fields.clone(),
                        regex,
                    }
                }
            });
        }
        Ok(CompiledFilter { clauses })
    }
}

pub(crate) struct CompiledFilter {
    clauses: Vec<CompiledClause>,
}

enum CompiledClause {
    Eq(String, Value),
    In(String, Vec<Value>),
    Exists(String),
    Text { fields: Vec<String>, regex: Regex },
}

impl CompiledFilter {
    pub(crate) fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            CompiledClause::Eq(field, value) => get_path(doc, field) == Some(value),
            CompiledClause::In(field, values) => {
                get_path(doc, field).is_some_and(|v| values.contains(v))
            }
            CompiledClause::Exists(field) => {
                get_path(doc, field).is_some_and(|v| !v.is_null())
            }
            CompiledClause::Text { fields, regex } => fields.iter().any(|field| {
                get_path(doc, field)
                    .and_then(Value::as_str)
                    .is_some_and(|s| regex.is_match(s))
            }),
        })
    }
}

// -- Stages --

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Sort { field: String, descending: bool },
    Skip(u64),
    Limit(u64),
    Lookup(Lookup),
    Project(Projection),
}

/// Correlated sub-query against a sibling collection, substituting for a
/// relational join. `local_field` may hold a scalar key or an array of
/// keys (watch history, playlist membership); array order is preserved in
/// the joined output.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub from: Collection,
    pub local_field: String,
    pub foreign_field: String,
    pub into: String,
    pub pipeline: Vec<Stage>,
    pub cardinality: Cardinality,
}

/// `First` collapses the joined array to its single element - or `null`
/// when nothing matched, so downstream code never branches on
/// cardinality. `Many` keeps the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Many,
    First,
}

impl Lookup {
    pub fn new(from: Collection, local_field: &str, foreign_field: &str, into: &str) -> Self {
        Self {
            from,
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
            into: into.to_string(),
            pipeline: Vec::new(),
            cardinality: Cardinality::Many,
        }
    }

    pub fn first(mut self) -> Self {
        self.cardinality = Cardinality::First;
        self
    }

    pub fn with_pipeline(mut self, stages: Vec<Stage>) -> Self {
        self.pipeline = stages;
        self
    }
}

/// Field projection as dotted include paths. A path into an array of
/// objects applies to every element ("videos.title" keeps the title of
/// each joined video).
#[derive(Debug, Clone)]
pub struct Projection {
    paths: Vec<String>,
}

impl Projection {
    pub fn include(paths: &[&str]) -> Self {
        Self {
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }
}

// -- Executor --

/// Run a pipeline from a base collection scan. A leading Match stage has
/// its string-equality clauses pushed into the SQL scan; the compiled
/// filter still re-checks every row in memory, so pushdown is purely an
/// optimization.
pub(crate) fn run_pipeline(
    conn: &Connection,
    coll: Collection,
    stages: &[Stage],
) -> Result<Vec<Value>> {
    let pushdown = match stages.first() {
        Some(Stage::Match(filter)) => Some(filter),
        _ => None,
    };
    let docs = scan(conn, coll, pushdown)?;
    apply_stages(conn, docs, stages)
}

pub(crate) fn apply_stages(
    conn: &Connection,
    mut docs: Vec<Value>,
    stages: &[Stage],
) -> Result<Vec<Value>> {
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => {
                let compiled = filter.compile()?;
                docs.retain(|doc| compiled.matches(doc));
                docs
            }
            Stage::Sort { field, descending } => {
                docs.sort_by(|a, b| {
                    let ord = cmp_values(get_path(a, field), get_path(b, field));
                    if *descending { ord.reverse() } else { ord }
                });
                docs
            }
            Stage::Skip(n) => {
                let n = (*n).min(docs.len() as u64) as usize;
                docs.split_off(n)
            }
            Stage::Limit(n) => {
                docs.truncate(*n as usize);
                docs
            }
            Stage::Lookup(lookup) => apply_lookup(conn, docs, lookup)?,
            Stage::Project(projection) => {
                docs.iter().map(|doc| project_value(doc, &projection.paths)).collect()
            }
        };
    }
    Ok(docs)
}

/// Scan a collection, optionally pushing string-equality predicates of the
/// filter down into the SQL `WHERE`.
pub(crate) fn scan(
    conn: &Connection,
    coll: Collection,
    filter: Option<&Filter>,
) -> Result<Vec<Value>> {
    let mut sql = format!("SELECT doc FROM {}", coll.table());
    let mut params: Vec<String> = Vec::new();

    if let Some(filter) = filter {
        let mut predicates = Vec::new();
        for (field, value) in filter.eq_string_clauses() {
            if !is_safe_field(field) {
                continue;
            }
            params.push(value.to_string());
            predicates.push(format!("json_extract(doc, '$.{}') = ?{}", field, params.len()));
        }
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        row.get::<_, String>(0)
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let raw = row?;
        let doc =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(coll.table(), e))?;
        docs.push(doc);
    }
    Ok(docs)
}

fn apply_lookup(conn: &Connection, mut docs: Vec<Value>, lookup: &Lookup) -> Result<Vec<Value>> {
    // Collect every correlation key across the page in one pass, so the
    // sibling collection is hit with a single batched query.
    let mut keys: Vec<String> = Vec::new();
    for doc in &docs {
        for key in local_keys(doc, &lookup.local_field) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    let joined = if keys.is_empty() {
        Vec::new()
    } else {
        load_by_foreign_key(conn, lookup.from, &lookup.foreign_field, &keys)?
    };
    let joined = apply_stages(conn, joined, &lookup.pipeline)?;

    // Index joined docs by their foreign-key value.
    let mut by_key: HashMap<String, Vec<Value>> = HashMap::new();
    for doc in joined {
        if let Some(key) = get_path(&doc, &lookup.foreign_field).and_then(key_of) {
            by_key.entry(key).or_default().push(doc);
        }
    }

    for doc in &mut docs {
        let matched: Vec<Value> = local_keys(doc, &lookup.local_field)
            .into_iter()
            .flat_map(|key| by_key.get(&key).cloned().unwrap_or_default())
            .collect();

        let value = match lookup.cardinality {
            Cardinality::Many => Value::Array(matched),
            Cardinality::First => matched.into_iter().next().unwrap_or(Value::Null),
        };
        if let Some(obj) = doc.as_object_mut() {
            obj.insert(lookup.into.clone(), value);
        }
    }
    Ok(docs)
}

fn load_by_foreign_key(
    conn: &Connection,
    coll: Collection,
    foreign_field: &str,
    keys: &[String],
) -> Result<Vec<Value>> {
    if !is_safe_field(foreign_field) {
        return Err(StoreError::BadFilter(format!(
            "unsupported join field: {foreign_field}"
        )));
    }

    let placeholders: Vec<String> = (1..=keys.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT doc FROM {} WHERE json_extract(doc, '$.{}') IN ({})",
        coll.table(),
        foreign_field,
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(keys.iter()), |row| {
        row.get::<_, String>(0)
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let raw = row?;
        let doc =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(coll.table(), e))?;
        docs.push(doc);
    }
    Ok(docs)
}

// -- Value helpers --

/// Resolve a dotted path through nested objects.
pub(crate) fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Correlation keys held by a document's local field: one for a scalar,
/// all elements for an array, none when absent or null.
fn local_keys(doc: &Value, field: &str) -> Vec<String> {
    match get_path(doc, field) {
        Some(Value::Array(items)) => items.iter().filter_map(key_of).collect(),
        Some(value) => key_of(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Total order over JSON values for sort stages: null < bool < number <
/// string; RFC3339 timestamps order correctly as strings.
fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

/// Keep only the included dotted paths. Paths into arrays of objects are
/// applied per element; absent paths are silently skipped.
fn project_value(doc: &Value, paths: &[String]) -> Value {
    let split: Vec<Vec<&str>> = paths.iter().map(|p| p.split('.').collect()).collect();
    project_segments(doc, &split)
}

fn project_segments(value: &Value, paths: &[Vec<&str>]) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items.iter().map(|item| project_segments(item, paths)).collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            // Group paths by leading segment; a bare segment includes the
            // whole field, deeper paths recurse.
            let mut heads: Vec<&str> = Vec::new();
            for path in paths {
                if let Some(&head) = path.first() {
                    if !heads.contains(&head) {
                        heads.push(head);
                    }
                }
            }
            for head in heads {
                let Some(field) = map.get(head) else { continue };
                let sub: Vec<Vec<&str>> = paths
                    .iter()
                    .filter(|p| p.first() == Some(&head) && p.len() > 1)
                    .map(|p| p[1..].to_vec())
                    .collect();
                let projected = if sub.is_empty()
                    || paths.iter().any(|p| p.len() == 1 && p[0] == head)
                {
                    field.clone()
                } else {
                    project_segments(field, &sub)
                };
                out.insert(head.to_string(), projected);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

pub(crate) fn is_safe_field(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_clauses_match() {
        let doc = json!({
            "id": "a",
            "owner": "u1",
            "title": "Rust Tour",
            "views": 3,
            "video": null,
        });

        let eq = Filter::new().eq("owner", json!("u1")).compile().unwrap();
        assert!(eq.matches(&doc));

        let eq_miss = Filter::new().eq("owner", json!("u2")).compile().unwrap();
        assert!(!eq_miss.matches(&doc));

        let within = Filter::new()
            .is_in("id", vec![json!("a"), json!("b")])
            .compile()
            .unwrap();
        assert!(within.matches(&doc));

        // null counts as absent
        let exists = Filter::new().exists("video").compile().unwrap();
        assert!(!exists.matches(&doc));
        let exists = Filter::new().exists("views").compile().unwrap();
        assert!(exists.matches(&doc));
    }

    #[test]
    fn text_clause_is_case_insensitive_across_fields() {
        let doc = json!({ "title": "Cooking 101", "description": "A rust primer" });

        let hit = Filter::new()
            .text(&["title", "description"], "RUST")
            .compile()
            .unwrap();
        assert!(hit.matches(&doc));

        let miss = Filter::new()
            .text(&["title", "description"], "golang")
            .compile()
            .unwrap();
        assert!(!miss.matches(&doc));
    }

    #[test]
    fn invalid_text_pattern_is_reported() {
        let err = Filter::new().text(&["title"], "[unclosed").compile();
        assert!(matches!(err, Err(StoreError::BadFilter(_))));
    }

    #[test]
    fn projection_keeps_nested_paths_and_maps_arrays() {
        let doc = json!({
            "id": "v1",
            "secret": "drop-me",
            "owner": { "id": "u1", "username": "chai", "password": "digest" },
            "videos": [
                { "id": "a", "title": "one", "views": 1 },
                { "id": "b", "title": "two", "views": 2 },
            ],
        });

        let projected = project_value(
            &doc,
            &[
                "id".to_string(),
                "owner.username".to_string(),
                "videos.title".to_string(),
            ],
        );

        assert_eq!(
            projected,
            json!({
                "id": "v1",
                "owner": { "username": "chai" },
                "videos": [{ "title": "one" }, { "title": "two" }],
            })
        );
    }

    #[test]
    fn sort_orders_rfc3339_timestamps() {
        let a = json!({ "created_at": "2024-03-01T10:00:00Z" });
        let b = json!({ "created_at": "2024-03-02T09:00:00Z" });
        assert_eq!(
            cmp_values(get_path(&a, "created_at"), get_path(&b, "created_at")),
            Ordering::Less
        );
    }
}
