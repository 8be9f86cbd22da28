//! Query Planner: chooses between key query and scan.
//!
//! 1. EQ-filtered properties ∩ indexed properties non-empty → query
//!    (primary key preferred, then index declaration order), else scan.
//! 2. The EQ condition on the query property is consumed by the key
//!    condition; everything else is a residual backend filter.
//! 3. Ordering by the query property or the chosen key's range attribute
//!    is native, any other ordering is an in-memory sort followed by limit.

use super::filter::{Filter, OrderBy};
use crate::schema::TableDefinition;
use crate::storage::{Condition, SortOrder};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    PrimaryKey {
        property: String,
        value: Value,
    },
    Index {
        name: String,
        property: String,
        value: Value,
    },
    Scan,
}

impl AccessPath {
    pub fn is_scan(&self) -> bool {
        matches!(self, AccessPath::Scan)
    }

    pub fn query_property(&self) -> Option<&str> {
        match self {
            AccessPath::PrimaryKey { property, .. } | AccessPath::Index { property, .. } => {
                Some(property)
            }
            AccessPath::Scan => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOrder {
    Unordered,
    Native(SortOrder),
    InMemory(OrderBy),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub access: AccessPath,
    pub residual: Vec<Condition>,
    pub order: PlanOrder,
    pub limit: Option<usize>,
}

impl ExecutionPlan {
    /// `limit` goes to the backend unless results must be sorted first.
    pub fn native_limit(&self) -> Option<usize> {
        match self.order {
            PlanOrder::InMemory(_) => None,
            _ => self.limit,
        }
    }

    pub fn sorts_in_memory(&self) -> bool {
        matches!(self.order, PlanOrder::InMemory(_))
    }
}

pub fn plan(
    def: &TableDefinition,
    filter: &Filter,
    order_by: Option<&OrderBy>,
    limit: Option<usize>,
) -> ExecutionPlan {
    let indexed = def.indexed_properties();
    let eq_props: Vec<&str> = filter.eq_properties().collect();

    // indexed_properties lists the primary key first, then indexes in order
    let chosen = indexed.iter().copied().find(|prop| eq_props.contains(prop));

    let mut residual: Vec<Condition> = filter.conditions().to_vec();
    let (access, range_attribute) = match chosen {
        None => (AccessPath::Scan, None),
        Some(property) => {
            let position = residual
                .iter()
                .position(|c| c.is_eq() && c.attribute == property);
            let value = position
                .map(|i| residual.remove(i))
                .and_then(|c| c.eq_value().cloned())
                .unwrap_or(Value::Null);

            if def.is_primary_key(property) {
                (
                    AccessPath::PrimaryKey {
                        property: property.to_string(),
                        value,
                    },
                    def.range_key.clone(),
                )
            } else {
                match def.index_for_hash_key(property) {
                    Some(index) => (
                        AccessPath::Index {
                            name: index.name.clone(),
                            property: property.to_string(),
                            value,
                        },
                        index.range_key.clone(),
                    ),
                    None => (AccessPath::Scan, None),
                }
            }
        }
    };

    let order = match order_by {
        None => PlanOrder::Unordered,
        Some(order_by) => {
            let native = access.query_property() == Some(order_by.property.as_str())
                || range_attribute.as_deref() == Some(order_by.property.as_str());
            if native && !access.is_scan() {
                PlanOrder::Native(if order_by.descending {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                })
            } else {
                PlanOrder::InMemory(order_by.clone())
            }
        }
    };

    let plan = ExecutionPlan {
        access,
        residual,
        order,
        limit,
    };
    debug!(
        table = %def.table_name,
        access = ?plan.access,
        residual = plan.residual.len(),
        order = ?plan.order,
        "query planned"
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AUTHOR_INDEX, PERMALINK_INDEX, UPDATED_AT_FIELD, default_indexes};
    use serde_json::json;

    fn def() -> TableDefinition {
        TableDefinition {
            model_id: "t.Widget".to_string(),
            table_name: "t_Widget".to_string(),
            hash_key: "link".to_string(),
            range_key: None,
            indexes: default_indexes(),
            attributes: Default::default(),
            updated_at_field: UPDATED_AT_FIELD.to_string(),
        }
    }

    #[test]
    fn test_non_indexed_eq_scans() {
        let filter = Filter::new().eq("color", "red").eq("name", "x");
        let plan = plan(&def(), &filter, None, Some(3));
        assert_eq!(plan.access, AccessPath::Scan);
        assert_eq!(plan.residual.len(), 2);
        assert_eq!(plan.native_limit(), Some(3));
    }

    #[test]
    fn test_primary_key_wins() {
        let filter = Filter::new()
            .eq("author", "bob")
            .eq("permalink", "P")
            .eq("link", "L1");
        let plan = plan(&def(), &filter, None, None);
        assert_eq!(
            plan.access,
            AccessPath::PrimaryKey {
                property: "link".to_string(),
                value: json!("L1")
            }
        );
        assert_eq!(
            plan.residual,
            vec![Condition::eq("author", "bob"), Condition::eq("permalink", "P")]
        );
    }

    #[test]
    fn test_index_declaration_order_breaks_ties() {
        let filter = Filter::new().eq("permalink", "P").eq("author", "bob");
        let plan = plan(&def(), &filter, None, None);
        assert!(matches!(
            &plan.access,
            AccessPath::Index { name, .. } if name == AUTHOR_INDEX
        ));
        assert_eq!(plan.residual, vec![Condition::eq("permalink", "P")]);
    }

    #[test]
    fn test_non_eq_on_indexed_property_does_not_query() {
        let filter = Filter::new().starts_with("author", "b");
        let plan = plan(&def(), &filter, None, None);
        assert!(plan.access.is_scan());
        assert_eq!(plan.residual.len(), 1);
    }

    #[test]
    fn test_native_order_on_index_range() {
        let filter = Filter::new().eq("author", "bob");
        let order = OrderBy::desc("time");
        let plan = plan(&def(), &filter, Some(&order), Some(10));
        assert_eq!(plan.order, PlanOrder::Native(SortOrder::Descending));
        assert!(!plan.sorts_in_memory());
        assert_eq!(plan.native_limit(), Some(10));
        assert!(plan.residual.is_empty());
    }

    #[test]
    fn test_native_order_on_query_property() {
        let filter = Filter::new().eq("permalink", "P");
        let order = OrderBy::asc("permalink");
        let plan = plan(&def(), &filter, Some(&order), None);
        assert!(matches!(
            &plan.access,
            AccessPath::Index { name, .. } if name == PERMALINK_INDEX
        ));
        assert_eq!(plan.order, PlanOrder::Native(SortOrder::Ascending));
    }

    #[test]
    fn test_other_order_sorts_in_memory() {
        let filter = Filter::new().eq("author", "bob");
        let order = OrderBy::asc("name");
        let plan = plan(&def(), &filter, Some(&order), Some(2));
        assert_eq!(plan.order, PlanOrder::InMemory(order));
        assert_eq!(plan.native_limit(), None);

        let scan = super::plan(&def(), &Filter::new(), Some(&OrderBy::asc("time")), Some(2));
        assert!(scan.sorts_in_memory());
    }
}
