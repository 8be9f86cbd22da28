//! Resolvers: the three per-model operations consumed by a query server.

use crate::engine::TableCatalog;
use crate::error::{MkvError, MkvResult};
use crate::query::{Filter, OrderBy, execute, plan};
use crate::resource::Resource;
use crate::schema::Key;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Arguments of [`Resolvers::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListArgs {
    pub filter: Filter,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl ListArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `{ "filter": {...}, "orderBy": {...}, "limit": n }`, every key optional.
    pub fn from_json(args: &Value) -> MkvResult<Self> {
        let filter = Filter::from_json(args.get("filter").unwrap_or(&Value::Null))?;
        let order_by = match args.get("orderBy") {
            None | Some(Value::Null) => None,
            Some(value) => Some(OrderBy::deserialize(value)?),
        };
        let limit = match args.get("limit") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                MkvError::InvalidFilter(format!("limit must be a non-negative integer, got {value}"))
            })? as usize),
        };
        Ok(Self {
            filter,
            order_by,
            limit,
        })
    }
}

#[derive(Clone)]
pub struct Resolvers {
    catalog: Arc<TableCatalog>,
}

impl Resolvers {
    pub fn new(catalog: Arc<TableCatalog>) -> Self {
        Self { catalog }
    }

    /// `None` when no row has this key.
    #[instrument(skip(self, key), fields(model = %model_id))]
    pub async fn get(&self, model_id: &str, key: impl Into<Key>) -> MkvResult<Option<Resource>> {
        let table = self.catalog.get_or_create(model_id)?;
        match table.get(key).await {
            Ok(resource) => Ok(Some(resource)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, args), fields(model = %model_id))]
    pub async fn list(&self, model_id: &str, args: &ListArgs) -> MkvResult<Vec<Resource>> {
        let table = self.catalog.get_or_create(model_id)?;
        let plan = plan(
            table.definition(),
            &args.filter,
            args.order_by.as_ref(),
            args.limit,
        );
        let results = execute(&table, &plan).await?;

        if let Some(first) = results.first() {
            let missing: Vec<&str> = table
                .model()
                .required
                .iter()
                .map(String::as_str)
                .filter(|name| !first.contains(name))
                .collect();
            if !missing.is_empty() {
                debug!(missing = ?missing, "first result is missing required properties");
            }
        }
        Ok(results)
    }

    /// Full-overwrite upsert. A resource without `link` is sealed first.
    #[instrument(skip_all, fields(model = %model_id))]
    pub async fn update(&self, model_id: &str, mut resource: Resource) -> MkvResult<Resource> {
        let table = self.catalog.get_or_create(model_id)?;
        if resource.link().is_none() {
            resource.seal()?;
        }
        debug!(link = resource.link().unwrap_or_default(), "resolving update");
        table.update(resource).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_args_from_json() {
        let args = ListArgs::from_json(&json!({
            "filter": { "EQ": { "author": "bob" } },
            "orderBy": { "property": "time", "desc": true },
            "limit": 5
        }))
        .unwrap();
        assert_eq!(args.filter, Filter::new().eq("author", "bob"));
        assert_eq!(args.order_by, Some(OrderBy::desc("time")));
        assert_eq!(args.limit, Some(5));

        assert_eq!(ListArgs::from_json(&json!({})).unwrap(), ListArgs::new());
        assert!(ListArgs::from_json(&json!({ "limit": -1 })).is_err());
        assert!(ListArgs::from_json(&json!({ "orderBy": 3 })).is_err());
    }
}
