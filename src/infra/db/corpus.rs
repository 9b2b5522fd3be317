use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::application::query::{
    Join, JoinKind, JoinTarget, MetaCompare, MetaQuery, Predicate, ScanFragment, StructuredArgs,
};
use crate::application::repos::{CorpusRepo, RepoError, ScanRow};
use crate::domain::ItemId;

use super::PostgresRepositories;
use super::util::{map_sqlx_error, to_db_id};

#[derive(sqlx::FromRow)]
struct ScanRecord {
    id: i64,
    surrogate_key: i64,
}

impl From<ScanRecord> for ScanRow {
    fn from(row: ScanRecord) -> Self {
        Self {
            id: row.id,
            surrogate_key: row.surrogate_key,
        }
    }
}

#[async_trait]
impl CorpusRepo for PostgresRepositories {
    async fn count(&self, args: &StructuredArgs) -> Result<u64, RepoError> {
        let mut qb = count_query(args)?;
        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn scan(
        &self,
        fragment: &ScanFragment,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<ScanRow>, RepoError> {
        let mut qb = scan_query(fragment, cursor, limit)?;
        let rows = qb
            .build_query_as::<ScanRecord>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ScanRow::from).collect())
    }

    async fn key_exists(&self, id: ItemId, meta_key: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM content_item_meta
                WHERE item_id = $1 AND meta_key = $2
            )
            "#,
        )
        .bind(id)
        .bind(meta_key)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

/// `SELECT COUNT(*)` over structured args; meta conditions become correlated subqueries.
pub(crate) fn count_query(args: &StructuredArgs) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM content_items i WHERE i.content_type = ");
    qb.push_bind(args.content_type.clone());
    qb.push(" AND i.status = ANY(");
    qb.push_bind(args.statuses.clone());
    qb.push(")");

    if let Some(category_id) = args.category_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM content_item_categories c WHERE c.item_id = i.id AND c.category_id = ",
        );
        qb.push_bind(to_db_id(category_id, "category_id")?);
        qb.push(")");
    }

    if let Some(author_id) = args.author_id {
        qb.push(" AND i.author_id = ");
        qb.push_bind(to_db_id(author_id, "author_id")?);
    }

    if let Some(meta_query) = args.meta_query.as_ref() {
        qb.push(" AND ");
        push_meta_query(&mut qb, meta_query);
    }

    Ok(qb)
}

fn push_meta_query(qb: &mut QueryBuilder<'static, Postgres>, query: &MetaQuery) {
    match query {
        MetaQuery::Condition(condition) => match &condition.compare {
            MetaCompare::NotExists => {
                qb.push(
                    "NOT EXISTS (SELECT 1 FROM content_item_meta m WHERE m.item_id = i.id AND m.meta_key = ",
                );
                qb.push_bind(condition.key.clone());
                qb.push(")");
            }
            MetaCompare::NotEquals(value) => {
                qb.push(
                    "EXISTS (SELECT 1 FROM content_item_meta m WHERE m.item_id = i.id AND m.meta_key = ",
                );
                qb.push_bind(condition.key.clone());
                qb.push(" AND m.meta_value <> ");
                qb.push_bind(value.clone());
                qb.push(")");
            }
        },
        MetaQuery::And(children) => push_meta_group(qb, children, " AND ", "TRUE"),
        MetaQuery::Or(children) => push_meta_group(qb, children, " OR ", "FALSE"),
    }
}

fn push_meta_group(
    qb: &mut QueryBuilder<'static, Postgres>,
    children: &[MetaQuery],
    separator: &str,
    empty: &str,
) {
    if children.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            qb.push(separator);
        }
        push_meta_query(qb, child);
    }
    qb.push(")");
}

/// Keyset-paginated scan: rows with `id > cursor`, ascending, at most `limit`.
pub(crate) fn scan_query(
    fragment: &ScanFragment,
    cursor: i64,
    limit: usize,
) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
    let limit = i64::try_from(limit)
        .map_err(|_| RepoError::invalid_input(format!("scan limit {limit} exceeds BIGINT range")))?;

    let mut qb = QueryBuilder::new("SELECT i.id, i.id AS surrogate_key FROM content_items i");
    for join in &fragment.joins {
        push_join(&mut qb, join)?;
    }

    qb.push(" WHERE i.id > ");
    qb.push_bind(cursor);
    for predicate in &fragment.predicates {
        qb.push(" AND ");
        push_predicate(&mut qb, predicate)?;
    }

    qb.push(" ORDER BY i.id ASC LIMIT ");
    qb.push_bind(limit);

    Ok(qb)
}

fn push_join(qb: &mut QueryBuilder<'static, Postgres>, join: &Join) -> Result<(), RepoError> {
    let keyword = match join.kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
    };
    let alias = join.alias;

    match &join.target {
        JoinTarget::CategoryMembership { category_id } => {
            qb.push(format!(
                " {keyword} content_item_categories {alias} ON {alias}.item_id = i.id AND {alias}.category_id = "
            ));
            qb.push_bind(to_db_id(*category_id, "category_id")?);
        }
        JoinTarget::Meta { meta_key } => {
            qb.push(format!(
                " {keyword} content_item_meta {alias} ON {alias}.item_id = i.id AND {alias}.meta_key = "
            ));
            qb.push_bind(meta_key.to_string());
        }
    }
    Ok(())
}

fn push_predicate(
    qb: &mut QueryBuilder<'static, Postgres>,
    predicate: &Predicate,
) -> Result<(), RepoError> {
    match predicate {
        Predicate::ContentTypeEq(content_type) => {
            qb.push("i.content_type = ");
            qb.push_bind(content_type.clone());
        }
        Predicate::StatusIn(statuses) => {
            qb.push("i.status = ANY(");
            qb.push_bind(statuses.clone());
            qb.push(")");
        }
        Predicate::AuthorEq(author_id) => {
            qb.push("i.author_id = ");
            qb.push_bind(to_db_id(*author_id, "author_id")?);
        }
        Predicate::JoinedRowMissing { alias } => {
            qb.push(format!("{alias}.item_id IS NULL"));
        }
        Predicate::JoinedValueNe { alias, value } => {
            qb.push(format!("{alias}.meta_value <> "));
            qb.push_bind(value.clone());
        }
        Predicate::AnyOf(children) => {
            if children.is_empty() {
                qb.push("FALSE");
                return Ok(());
            }
            qb.push("(");
            for (index, child) in children.iter().enumerate() {
                if index > 0 {
                    qb.push(" OR ");
                }
                push_predicate(qb, child)?;
            }
            qb.push(")");
        }
    }
    Ok(())
}
