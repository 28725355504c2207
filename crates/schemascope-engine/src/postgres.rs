//! PostgreSQL engine backed by `information_schema`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use schemascope_core::config::PostgresSection;
use schemascope_core::{GraphError, Source, SourceMetadata};

use crate::engine::{Entity, ForeignKey, QueryEngine, Row, qualify, row_from_json, split_qualified};

pub struct PostgresEngine {
    pool: PgPool,
    default_schema: String,
    location: String,
}

impl PostgresEngine {
    /// Create the pool without connecting. The first query opens a connection,
    /// so an unreachable server surfaces as `Connection` on first use.
    pub fn connect_lazy(section: &PostgresSection) -> Result<Self, GraphError> {
        let pool = PgPoolOptions::new()
            .max_connections(section.max_connections)
            .acquire_timeout(Duration::from_secs(section.connect_timeout_secs))
            .connect_lazy(&section.url)
            .map_err(|e| GraphError::connection(Source::Postgres, e.to_string()))?;

        Ok(Self {
            pool,
            default_schema: section.default_schema.clone(),
            location: redact_url(&section.url),
        })
    }

    async fn ensure_schema(&self, scope: &str) -> Result<(), GraphError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.schemata WHERE schema_name = $1
            )
            "#,
        )
        .bind(scope)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if exists {
            Ok(())
        } else {
            Err(GraphError::SchemaNotFound {
                store: Source::Postgres,
                scope: scope.to_string(),
            })
        }
    }

    async fn primary_keys(&self, scope: &str) -> Result<HashMap<String, Vec<String>>, GraphError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT kcu.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_schema = kcu.constraint_schema
             AND tc.constraint_name = kcu.constraint_name
             AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1
            ORDER BY kcu.table_name, kcu.ordinal_position
            "#,
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut keys: HashMap<String, Vec<String>> = HashMap::new();
        for (table, column) in rows {
            keys.entry(table).or_default().push(column);
        }
        Ok(keys)
    }

    async fn view_dependencies(&self, scope: &str) -> Result<HashMap<String, Vec<String>>, GraphError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT view_name::text, table_schema::text, table_name::text
            FROM information_schema.view_table_usage
            WHERE view_schema = $1
            ORDER BY view_name, table_schema, table_name
            "#,
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for (view, schema, table) in rows {
            deps.entry(view).or_default().push(qualify(&schema, &table));
        }
        Ok(deps)
    }
}

#[async_trait]
impl QueryEngine for PostgresEngine {
    fn source(&self) -> Source {
        Source::Postgres
    }

    fn default_scope(&self) -> &str {
        &self.default_schema
    }

    async fn ensure_scope(&self, scope: &str) -> Result<(), GraphError> {
        self.ensure_schema(scope).await
    }

    async fn list_entities(&self, scope: &str) -> Result<Vec<Entity>, GraphError> {
        self.ensure_schema(scope).await?;

        let tables = sqlx::query_as::<_, (String, String, String, i64)>(
            r#"
            SELECT t.table_schema::text, t.table_name::text, t.table_type::text,
                   (SELECT COUNT(*) FROM information_schema.columns c
                     WHERE c.table_schema = t.table_schema AND c.table_name = t.table_name)
            FROM information_schema.tables t
            WHERE t.table_schema = $1
            ORDER BY t.table_name
            "#,
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut primary_keys = self.primary_keys(scope).await?;
        let mut dependencies = self.view_dependencies(scope).await?;

        let entities: Vec<Entity> = tables
            .into_iter()
            .map(|(schema, name, table_type, columns)| Entity {
                primary_key: primary_keys.remove(&name).unwrap_or_default(),
                depends_on: dependencies.remove(&name).unwrap_or_default(),
                column_count: usize::try_from(columns).ok(),
                schema,
                name,
                entity_type: table_type,
            })
            .collect();

        tracing::debug!("Listed {} entities in postgres schema {}", entities.len(), scope);
        Ok(entities)
    }

    async fn list_foreign_keys(&self, scope: &str) -> Result<Vec<ForeignKey>, GraphError> {
        self.ensure_schema(scope).await?;

        // position_in_unique_constraint pairs each referencing column with its
        // referenced column, which keeps composite keys aligned.
        let rows = sqlx::query_as::<_, (String, String, String, String, String, String, String)>(
            r#"
            SELECT tc.constraint_name::text,
                   kcu.table_schema::text, kcu.table_name::text, kcu.column_name::text,
                   ref.table_schema::text, ref.table_name::text, ref.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_schema = kcu.constraint_schema
             AND tc.constraint_name = kcu.constraint_name
            JOIN information_schema.referential_constraints rc
              ON rc.constraint_schema = tc.constraint_schema
             AND rc.constraint_name = tc.constraint_name
            JOIN information_schema.key_column_usage ref
              ON ref.constraint_schema = rc.unique_constraint_schema
             AND ref.constraint_name = rc.unique_constraint_name
             AND ref.ordinal_position = kcu.position_in_unique_constraint
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1
            ORDER BY kcu.table_name, tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(constraint, from_schema, from_table, from_column, to_schema, to_table, to_column)| {
                ForeignKey::new(
                    constraint,
                    qualify(&from_schema, &from_table),
                    from_column,
                    qualify(&to_schema, &to_table),
                    to_column,
                )
            })
            .collect())
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, GraphError> {
        let (schema, name) = split_qualified(table, &self.default_schema);

        let known: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(schema)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if !known {
            return Err(GraphError::InvalidRequest(format!("unknown table '{table}'")));
        }

        let sql = format!(
            "SELECT row_to_json(t)::text FROM {}.{} AS t LIMIT $1",
            quote_ident(schema),
            quote_ident(name)
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let documents: Vec<String> = sqlx::query_scalar(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        documents
            .iter()
            .map(|document| {
                let value: serde_json::Value = serde_json::from_str(document)
                    .map_err(|e| GraphError::Internal(format!("row of {table} is not JSON: {e}")))?;
                match value.as_object() {
                    Some(object) => Ok(row_from_json(object)),
                    None => Err(GraphError::Internal(format!("row of {table} is not an object"))),
                }
            })
            .collect()
    }

    async fn source_metadata(&self) -> Result<SourceMetadata, GraphError> {
        let tables: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM information_schema.tables
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(SourceMetadata {
            source_file_count: usize::try_from(tables).unwrap_or_default(),
            source_location: self.location.clone(),
        })
    }

    async fn ping(&self) -> Result<(), GraphError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx)
    }
}

/// Driver and pool failures mean the server is unreachable; anything the
/// server itself rejected is an internal error.
fn map_sqlx(error: sqlx::Error) -> GraphError {
    match error {
        sqlx::Error::Database(db) => GraphError::Internal(db.message().to_string()),
        sqlx::Error::RowNotFound | sqlx::Error::ColumnNotFound(_) | sqlx::Error::ColumnDecode { .. } => {
            GraphError::Internal(error.to_string())
        }
        other => GraphError::connection(Source::Postgres, other.to_string()),
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Hide the password of a connection URL before it is reported anywhere.
pub fn redact_url(url: &str) -> String {
    match regex::Regex::new(r"://([^:/@]+):[^@]*@") {
        Ok(pattern) => pattern.replace(url, "://$1:****@").into_owned(),
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://app:s3cret@db:5432/app"),
            "postgres://app:****@db:5432/app"
        );
        assert_eq!(redact_url("postgres://db/app"), "postgres://db/app");
    }

    #[test]
    fn test_map_sqlx_classifies_pool_errors_as_connection() {
        let err = map_sqlx(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "connection_failed");
        let err = map_sqlx(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "internal");
    }
}
