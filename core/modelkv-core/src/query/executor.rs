//! Runs an [`ExecutionPlan`] against a gateway.

use super::filter::OrderBy;
use super::planner::{AccessPath, ExecutionPlan, PlanOrder};
use crate::engine::TableGateway;
use crate::error::MkvResult;
use crate::resource::Resource;
use crate::storage::compare::compare_optional;

pub async fn execute(gateway: &TableGateway, plan: &ExecutionPlan) -> MkvResult<Vec<Resource>> {
    let mut cursor = match &plan.access {
        AccessPath::PrimaryKey { value, .. } => gateway.query(value.clone()),
        AccessPath::Index { name, value, .. } => gateway.query(value.clone()).using_index(name),
        AccessPath::Scan => gateway.scan(),
    };

    for condition in &plan.residual {
        cursor = cursor.filter(condition.clone());
    }
    if let PlanOrder::Native(order) = plan.order {
        cursor = cursor.order(order);
    }
    if let Some(limit) = plan.native_limit() {
        cursor = cursor.limit(limit);
    }

    let mut items = cursor.exec().await?.items;

    if let PlanOrder::InMemory(order_by) = &plan.order {
        sort_by_property(&mut items, order_by);
        if let Some(limit) = plan.limit {
            items.truncate(limit);
        }
    }
    Ok(items)
}

/// Stable sort on one property.
pub fn sort_by_property(items: &mut [Resource], order_by: &OrderBy) {
    let property = order_by.property.as_str();
    items.sort_by(|a, b| {
        let ordering = compare_optional(a.get(property), b.get(property));
        if order_by.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn times(items: &[Resource]) -> Vec<i64> {
        items
            .iter()
            .filter_map(|r| r.get("time").and_then(|t| t.as_i64()))
            .collect()
    }

    #[test]
    fn test_sort_by_property() {
        let mut items: Vec<Resource> = [3, 1, 2]
            .into_iter()
            .map(|t| Resource::new().with("time", t))
            .collect();

        sort_by_property(&mut items, &OrderBy::asc("time"));
        assert_eq!(times(&items), vec![1, 2, 3]);

        sort_by_property(&mut items, &OrderBy::desc("time"));
        assert_eq!(times(&items), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut items = vec![
            Resource::new().with("k", 1).with("tag", "a"),
            Resource::new().with("k", 0).with("tag", "b"),
            Resource::new().with("k", 1).with("tag", "c"),
        ];
        sort_by_property(&mut items, &OrderBy::asc("k"));
        let tags: Vec<_> = items.iter().map(|r| r.get("tag").cloned()).collect();
        assert_eq!(tags, vec![Some(json!("b")), Some(json!("a")), Some(json!("c"))]);
    }

    fn mixed() -> Vec<Resource> {
        [
            json!("2x"),
            json!("5"),
            json!("10"),
            json!(7),
            json!("abc"),
            json!(null),
            json!(true),
            json!("-3"),
        ]
        .into_iter()
        .map(|k| Resource::new().with("k", k))
        .collect()
    }

    proptest! {
        #[test]
        fn test_mixed_sort_ignores_input_order(shuffled in Just(mixed()).prop_shuffle()) {
            let mut items = shuffled;
            sort_by_property(&mut items, &OrderBy::asc("k"));
            let keys: Vec<_> = items.iter().map(|r| r.get("k").cloned()).collect();
            prop_assert_eq!(
                keys,
                vec![
                    Some(json!(null)),
                    Some(json!(true)),
                    Some(json!("-3")),
                    Some(json!("5")),
                    Some(json!(7)),
                    Some(json!("10")),
                    Some(json!("2x")),
                    Some(json!("abc")),
                ]
            );
        }
    }
}
