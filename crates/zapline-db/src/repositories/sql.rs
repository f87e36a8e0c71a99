//! SQL runner for the flow interpreter's `sql` node
//!
//! The flow author writes a parameterized query; the runner always binds
//! the tenant id as `$1`, so a query cannot omit tenant scope, and user
//! parameters follow from `$2`.

use super::PgStore;
use crate::error::DatabaseError;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, JsonValue, Statement};
use serde_json::Value;
use uuid::Uuid;
use zapline_core::store::SqlRunner;
use zapline_core::CoreResult;

fn bind_value(value: &Value) -> sea_orm::Value {
    match value {
        Value::Null => sea_orm::Value::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        Value::String(s) => s.clone().into(),
        other => other.to_string().into(),
    }
}

#[async_trait]
impl SqlRunner for PgStore {
    async fn query(
        &self,
        tenant_id: Uuid,
        sql: &str,
        params: &[Value],
    ) -> CoreResult<Vec<Value>> {
        let mut values: Vec<sea_orm::Value> = vec![tenant_id.into()];
        values.extend(params.iter().map(bind_value));

        let statement = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        let rows = self
            .db()
            .query_all(statement)
            .await
            .map_err(DatabaseError::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let json = JsonValue::from_query_result(&row, "").map_err(DatabaseError::from)?;
            out.push(json);
        }
        Ok(out)
    }
}
