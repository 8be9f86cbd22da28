//! Fluent query/scan builder bound to a gateway.

use super::gateway::TableGateway;
use crate::error::MkvResult;
use crate::storage::{Condition, KvRequest, QueryOutput, SortOrder};
use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
enum Target {
    Query(Value),
    Scan,
}

/// Lazily executed read. Nothing touches the backend until [`Cursor::exec`].
pub struct Cursor<'g> {
    gateway: &'g TableGateway,
    target: Target,
    index: Option<String>,
    conditions: Vec<Condition>,
    order: Option<SortOrder>,
    limit: Option<usize>,
}

impl<'g> Cursor<'g> {
    pub(crate) fn query(gateway: &'g TableGateway, hash_value: Value) -> Self {
        Self::new(gateway, Target::Query(hash_value))
    }

    pub(crate) fn scan(gateway: &'g TableGateway) -> Self {
        Self::new(gateway, Target::Scan)
    }

    fn new(gateway: &'g TableGateway, target: Target) -> Self {
        Self {
            gateway,
            target,
            index: None,
            conditions: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Query a secondary index instead of the primary key. Ignored by scans.
    pub fn using_index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn ascending(self) -> Self {
        self.order(SortOrder::Ascending)
    }

    pub fn descending(self) -> Self {
        self.order(SortOrder::Descending)
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The request this cursor will send.
    pub fn to_request(&self) -> KvRequest {
        match &self.target {
            Target::Query(hash_value) => KvRequest::Query {
                hash_value: hash_value.clone(),
                index: self.index.clone(),
                conditions: self.conditions.clone(),
                order: self.order,
                limit: self.limit,
            },
            Target::Scan => KvRequest::Scan {
                conditions: self.conditions.clone(),
                limit: self.limit,
            },
        }
    }

    /// Run the request and inflate every minified item, concurrently.
    pub async fn exec(self) -> MkvResult<QueryOutput> {
        let gateway = self.gateway;
        gateway.ensure_table().await?;

        let request = self.to_request();
        let output = gateway
            .backend()
            .execute(gateway.definition(), &request)
            .await?;

        let minified = output.items.iter().filter(|r| r.is_minified()).count();
        debug!(
            table = %gateway.definition().table_name,
            count = output.count,
            minified,
            "cursor executed"
        );

        let items = try_join_all(
            output
                .items
                .into_iter()
                .map(|row| gateway.to_resource(row)),
        )
        .await?;

        Ok(QueryOutput {
            count: output.count,
            items,
        })
    }
}
