//! In-process document store used by tests and by `database.backend = "memory"`.
//!
//! Filters match on top-level keys, either by equality or with `$eq`, `$ne`,
//! `$in` and `$exists`. Updates accept `$set` and `$unset`. Pipelines accept
//! `$match`, `$skip`, `$limit` and `$count`.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use thiserror::Error;

use super::client::UpdateOutcome;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct MemoryError(String);

pub struct MemoryDatabase {
    name: String,
    collections: DashMap<String, Vec<Document>>,
    available: AtomicBool,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulates the store going offline: connects and closes fail while unset.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn insert_one(&self, collection: &str, mut item: Document) -> Result<Bson, MemoryError> {
        self.ensure_available()?;

        let id = match item.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                item.insert("_id", id.clone());
                id
            }
        };

        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(MemoryError(format!("duplicate key error: _id {}", id)));
        }
        docs.push(item);
        Ok(id)
    }

    pub fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, MemoryError> {
        self.ensure_available()?;
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for doc in docs.iter() {
            if matches(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }

    pub fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>, MemoryError> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    /// Applies `update` to the first document matching `filter`.
    pub fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateOutcome, MemoryError> {
        self.ensure_available()?;
        validate_update(update)?;

        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        for doc in docs.iter_mut() {
            if !matches(doc, filter)? {
                continue;
            }
            let before = doc.clone();
            apply_update(doc, update)?;
            let modified = if *doc == before { 0 } else { 1 };
            return Ok(UpdateOutcome { matched: 1, modified, upserted_id: None });
        }
        Ok(UpdateOutcome::default())
    }

    pub fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, MemoryError> {
        let mut docs = self.find(collection, &Document::new())?;

        for stage in pipeline {
            let (op, arg) = single_entry(stage, "pipeline stage")?;
            docs = match op.as_str() {
                "$match" => {
                    let filter = arg
                        .as_document()
                        .ok_or_else(|| MemoryError("$match needs a document".to_string()))?;
                    let mut kept = Vec::new();
                    for doc in docs {
                        if matches(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                "$skip" => docs.into_iter().skip(as_count(op, arg)?).collect(),
                "$limit" => docs.into_iter().take(as_count(op, arg)?).collect(),
                "$count" => {
                    let field = arg
                        .as_str()
                        .ok_or_else(|| MemoryError("$count needs a field name".to_string()))?;
                    if docs.is_empty() {
                        Vec::new()
                    } else {
                        let mut counted = Document::new();
                        counted.insert(field, docs.len() as i32);
                        vec![counted]
                    }
                }
                other => return Err(MemoryError(format!("unsupported pipeline stage {}", other))),
            };
        }
        Ok(docs)
    }

    fn ensure_available(&self) -> Result<(), MemoryError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(MemoryError("memory database is offline".to_string()))
        }
    }
}

fn single_entry<'a>(doc: &'a Document, what: &str) -> Result<(&'a String, &'a Bson), MemoryError> {
    let mut iter = doc.iter();
    match (iter.next(), iter.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(MemoryError(format!("{} must have exactly one key", what))),
    }
}

fn as_count(op: &str, arg: &Bson) -> Result<usize, MemoryError> {
    let n = match arg {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        _ => -1,
    };
    usize::try_from(n).map_err(|_| MemoryError(format!("{} needs a non-negative integer", op)))
}

fn matches(doc: &Document, filter: &Document) -> Result<bool, MemoryError> {
    for (key, expected) in filter {
        let actual = doc.get(key);
        let ok = match expected {
            Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                matches_operators(actual, ops)?
            }
            _ => actual == Some(expected),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_operators(actual: Option<&Bson>, ops: &Document) -> Result<bool, MemoryError> {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => actual == Some(arg),
            "$ne" => actual != Some(arg),
            "$in" => {
                let options = arg
                    .as_array()
                    .ok_or_else(|| MemoryError("$in needs an array".to_string()))?;
                actual.is_some_and(|v| options.contains(v))
            }
            "$exists" => actual.is_some() == arg.as_bool().unwrap_or(true),
            other => return Err(MemoryError(format!("unsupported query operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn validate_update(update: &Document) -> Result<(), MemoryError> {
    if update.is_empty() {
        return Err(MemoryError("update document must not be empty".to_string()));
    }
    for (op, arg) in update {
        match op.as_str() {
            "$set" | "$unset" if arg.as_document().is_some() => {}
            "$set" | "$unset" => {
                return Err(MemoryError(format!("{} needs a document", op)))
            }
            other if other.starts_with('$') => {
                return Err(MemoryError(format!("unsupported update operator {}", other)))
            }
            _ => {
                return Err(MemoryError(
                    "update document requires atomic operators".to_string(),
                ))
            }
        }
    }
    Ok(())
}

fn apply_update(doc: &mut Document, update: &Document) -> Result<(), MemoryError> {
    for (op, arg) in update {
        let Some(fields) = arg.as_document() else { continue };
        for (key, value) in fields {
            if key == "_id" {
                return Err(MemoryError("the _id field is immutable".to_string()));
            }
            match op.as_str() {
                "$set" => {
                    doc.insert(key.clone(), value.clone());
                }
                "$unset" => {
                    doc.remove(key);
                }
                _ => {}
            }
        }
    }
    Ok(())
}
