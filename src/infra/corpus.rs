//! In-memory corpus.
//!
//! Evaluates structured args and scan fragments with separate interpreters, so it can be used to
//! check that the two renderings of a descriptor select the same items. Item ids double as
//! surrogate keys.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::application::query::{JoinKind, JoinTarget, Predicate, ScanFragment, StructuredArgs};
use crate::application::repos::{CorpusRepo, RepoError, ScanRow};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::ItemId;

const SOURCE: &str = "infra::corpus::InMemoryCorpus";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: ItemId,
    pub content_type: String,
    pub status: String,
    pub author_id: u64,
    pub categories: BTreeSet<u64>,
    pub meta: HashMap<String, String>,
}

impl ContentItem {
    pub fn new(id: ItemId, content_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id,
            content_type: content_type.into(),
            status: status.into(),
            author_id: 0,
            categories: BTreeSet::new(),
            meta: HashMap::new(),
        }
    }

    pub fn by_author(mut self, author_id: u64) -> Self {
        self.author_id = author_id;
        self
    }

    pub fn in_category(mut self, category_id: u64) -> Self {
        self.categories.insert(category_id);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    items: RwLock<BTreeMap<ItemId, ContentItem>>,
    count_calls: AtomicU64,
    scan_calls: AtomicU64,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = ContentItem>) -> Self {
        let corpus = Self::new();
        for item in items {
            corpus.insert(item);
        }
        corpus
    }

    /// Insert or replace an item.
    pub fn insert(&self, item: ContentItem) {
        rw_write(&self.items, SOURCE, "insert").insert(item.id, item);
    }

    /// Set a meta value on an existing item. Returns false when the item is unknown.
    pub fn set_meta(&self, id: ItemId, key: impl Into<String>, value: impl Into<String>) -> bool {
        match rw_write(&self.items, SOURCE, "set_meta").get_mut(&id) {
            Some(item) => {
                item.meta.insert(key.into(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.items, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_calls(&self) -> u64 {
        self.count_calls.load(Ordering::Relaxed)
    }

    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::Relaxed)
    }

    /// Ids selected by structured args, ascending. Evaluates the same predicate as `count`.
    pub fn list_structured(&self, args: &StructuredArgs) -> Vec<ItemId> {
        rw_read(&self.items, SOURCE, "list_structured")
            .values()
            .filter(|item| matches_structured(item, args))
            .map(|item| item.id)
            .collect()
    }
}

#[async_trait]
impl CorpusRepo for InMemoryCorpus {
    async fn count(&self, args: &StructuredArgs) -> Result<u64, RepoError> {
        self.count_calls.fetch_add(1, Ordering::Relaxed);
        let items = rw_read(&self.items, SOURCE, "count");
        Ok(items
            .values()
            .filter(|item| matches_structured(item, args))
            .count() as u64)
    }

    async fn scan(
        &self,
        fragment: &ScanFragment,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<ScanRow>, RepoError> {
        self.scan_calls.fetch_add(1, Ordering::Relaxed);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let items = rw_read(&self.items, SOURCE, "scan");
        let mut rows = Vec::new();
        for item in items
            .range((std::ops::Bound::Excluded(cursor), std::ops::Bound::Unbounded))
            .map(|(_, item)| item)
        {
            if matches_fragment(item, fragment)? {
                rows.push(ScanRow {
                    id: item.id,
                    surrogate_key: item.id,
                });
                if rows.len() == limit {
                    break;
                }
            }
        }
        Ok(rows)
    }

    async fn key_exists(&self, id: ItemId, meta_key: &str) -> Result<bool, RepoError> {
        let items = rw_read(&self.items, SOURCE, "key_exists");
        Ok(items
            .get(&id)
            .is_some_and(|item| item.meta.contains_key(meta_key)))
    }
}

fn matches_structured(item: &ContentItem, args: &StructuredArgs) -> bool {
    if item.content_type != args.content_type {
        return false;
    }
    if !args.statuses.iter().any(|status| *status == item.status) {
        return false;
    }
    if args
        .category_id
        .is_some_and(|category_id| !item.categories.contains(&category_id))
    {
        return false;
    }
    if args
        .author_id
        .is_some_and(|author_id| item.author_id != author_id)
    {
        return false;
    }
    match &args.meta_query {
        Some(query) => query.matches(&|key: &str| item.meta_value(key)),
        None => true,
    }
}

/// Row produced by a join for one item.
#[derive(Debug, Clone, Copy)]
enum Joined<'a> {
    /// Left join found nothing; every column is NULL.
    Null,
    /// Joined row present; `value` is the meta value for meta joins.
    Row { value: Option<&'a str> },
}

fn matches_fragment(item: &ContentItem, fragment: &ScanFragment) -> Result<bool, RepoError> {
    let mut joined: HashMap<&'static str, Joined<'_>> = HashMap::new();

    for join in &fragment.joins {
        let row = match &join.target {
            JoinTarget::CategoryMembership { category_id } => item
                .categories
                .contains(category_id)
                .then_some(Joined::Row { value: None }),
            JoinTarget::Meta { meta_key } => item
                .meta_value(meta_key)
                .map(|value| Joined::Row { value: Some(value) }),
        };

        match (join.kind, row) {
            (_, Some(row)) => {
                joined.insert(join.alias, row);
            }
            (JoinKind::Inner, None) => return Ok(false),
            (JoinKind::Left, None) => {
                joined.insert(join.alias, Joined::Null);
            }
        }
    }

    for predicate in &fragment.predicates {
        if !evaluate(item, predicate, &joined)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn evaluate(
    item: &ContentItem,
    predicate: &Predicate,
    joined: &HashMap<&'static str, Joined<'_>>,
) -> Result<bool, RepoError> {
    let lookup = |alias: &str| {
        joined
            .get(alias)
            .copied()
            .ok_or_else(|| RepoError::invalid_input(format!("unknown join alias `{alias}`")))
    };

    Ok(match predicate {
        Predicate::ContentTypeEq(content_type) => item.content_type == *content_type,
        Predicate::StatusIn(statuses) => statuses.iter().any(|status| *status == item.status),
        Predicate::AuthorEq(author_id) => item.author_id == *author_id,
        Predicate::JoinedRowMissing { alias } => matches!(lookup(*alias)?, Joined::Null),
        Predicate::JoinedValueNe { alias, value } => match lookup(*alias)? {
            Joined::Row { value: Some(found) } => found != value.as_str(),
            _ => false,
        },
        Predicate::AnyOf(children) => {
            for child in children {
                if evaluate(item, child, joined)? {
                    return Ok(true);
                }
            }
            false
        }
    })
}
