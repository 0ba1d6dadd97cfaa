//! Module: planner::post
//! Responsibility: plan rewrites after candidate selection — residual-filter
//! pushdown, deferred fetches over covering scans, and the covering rewrite.
//! Does not own: scoring or selection; rewrites never change result sets.

use crate::{
    expr::KeyExpression,
    model::{IndexKind, IndexModel, MetadataModel},
    plan::RecordQueryPlan,
    query::{Comparison, QueryComponent},
};

/// Fields evaluable on one of this index's entries without a record fetch:
/// the key columns (including a `KeyWithValue` stored suffix) plus the
/// primary-key columns appended to every entry.
pub(crate) fn available_index_fields(
    index: &IndexModel,
    common_primary_key: Option<&KeyExpression>,
) -> Vec<KeyExpression> {
    let mut fields = match index.root() {
        KeyExpression::KeyWithValue { key, .. } => key.normalized_columns(),
        root => root.normalized_columns(),
    };
    if let Some(primary_key) = common_primary_key {
        for column in primary_key.normalized_columns() {
            if !fields.contains(&column) {
                fields.push(column);
            }
        }
    }
    fields
}

/// Whether a predicate can be evaluated on an index entry exposing `fields`.
/// Quantified components need the whole repeated value, which one entry does
/// not carry, so they always require the record.
pub(crate) fn component_evaluable_on(
    fields: &[KeyExpression],
    component: &QueryComponent,
) -> bool {
    fn field_column(fields: &[KeyExpression], name: &str) -> bool {
        fields.iter().any(|column| {
            matches!(
                column,
                KeyExpression::Field { name: field, fan: crate::expr::FanType::None }
                    if field == name
            )
        })
    }
    match component {
        QueryComponent::And(children) | QueryComponent::Or(children) => children
            .iter()
            .all(|child| component_evaluable_on(fields, child)),
        QueryComponent::Not(child) => component_evaluable_on(fields, child),
        QueryComponent::Field { field, comparison } => {
            !matches!(comparison, Comparison::Text(_)) && field_column(fields, field)
        }
        QueryComponent::Nested { field, child } => {
            let nested: Vec<KeyExpression> = fields
                .iter()
                .filter_map(|column| match column {
                    KeyExpression::Nesting {
                        parent,
                        child: nested_column,
                        ..
                    } if parent == field => Some((**nested_column).clone()),
                    _ => None,
                })
                .collect();
            !nested.is_empty() && component_evaluable_on(&nested, child)
        }
        QueryComponent::RecordTypeKey { .. } => fields
            .iter()
            .any(|column| matches!(column, KeyExpression::RecordTypeKey)),
        QueryComponent::KeyExpressionComparison { key, .. } => key
            .normalized_columns()
            .iter()
            .all(|column| fields.contains(column)),
        QueryComponent::OneOfThem { .. }
        | QueryComponent::OneOfThemComponent { .. }
        | QueryComponent::RecordFunction { .. } => false,
    }
}

/// Push residual filters below unions, intersections, IN-joins, type
/// filters, and distinct operators, so they run as close to the scans as
/// possible.
pub(crate) fn push_residual_filters(plan: RecordQueryPlan) -> RecordQueryPlan {
    let plan = map_children(plan, push_residual_filters);
    let RecordQueryPlan::Filter { inner, filter } = plan else {
        return plan;
    };
    match *inner {
        RecordQueryPlan::TypeFilter {
            inner: grand_inner,
            record_types,
        } => RecordQueryPlan::TypeFilter {
            inner: Box::new(push_residual_filters(RecordQueryPlan::Filter {
                inner: grand_inner,
                filter,
            })),
            record_types,
        },
        RecordQueryPlan::PrimaryKeyDistinct { inner: grand_inner } => {
            RecordQueryPlan::PrimaryKeyDistinct {
                inner: Box::new(push_residual_filters(RecordQueryPlan::Filter {
                    inner: grand_inner,
                    filter,
                })),
            }
        }
        RecordQueryPlan::InJoin {
            inner: grand_inner,
            source,
        } => RecordQueryPlan::InJoin {
            inner: Box::new(push_residual_filters(RecordQueryPlan::Filter {
                inner: grand_inner,
                filter,
            })),
            source,
        },
        RecordQueryPlan::Intersection {
            children,
            comparison_key,
            reverse,
        } => RecordQueryPlan::Intersection {
            children: children
                .into_iter()
                .map(|child| {
                    push_residual_filters(RecordQueryPlan::Filter {
                        inner: Box::new(child),
                        filter: filter.clone(),
                    })
                })
                .collect(),
            comparison_key,
            reverse,
        },
        RecordQueryPlan::Union {
            children,
            comparison_key,
            reverse,
            show_comparison_key,
        } => RecordQueryPlan::Union {
            children: children
                .into_iter()
                .map(|child| {
                    push_residual_filters(RecordQueryPlan::Filter {
                        inner: Box::new(child),
                        filter: filter.clone(),
                    })
                })
                .collect(),
            comparison_key,
            reverse,
            show_comparison_key,
        },
        RecordQueryPlan::UnorderedUnion { children } => RecordQueryPlan::UnorderedUnion {
            children: children
                .into_iter()
                .map(|child| {
                    push_residual_filters(RecordQueryPlan::Filter {
                        inner: Box::new(child),
                        filter: filter.clone(),
                    })
                })
                .collect(),
        },
        other => RecordQueryPlan::Filter {
            inner: Box::new(other),
            filter,
        },
    }
}

/// Defer record fetches above merges of covering scans: a union,
/// intersection, distinct, or evaluable filter over plain value index scans
/// becomes the same operator over covering scans, with one fetch on top.
pub(crate) fn defer_fetch(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    plan: RecordQueryPlan,
) -> RecordQueryPlan {
    let required: Vec<KeyExpression> = common_primary_key
        .map(KeyExpression::normalized_columns)
        .unwrap_or_default();
    if required.is_empty() {
        return plan;
    }
    let plan = map_children(plan, |child| defer_fetch(metadata, common_primary_key, child));
    match plan {
        RecordQueryPlan::Union {
            children,
            comparison_key,
            reverse,
            show_comparison_key,
        } => match to_covering_children(metadata, common_primary_key, &required, children) {
            Ok(children) => RecordQueryPlan::Fetch {
                inner: Box::new(RecordQueryPlan::Union {
                    children,
                    comparison_key,
                    reverse,
                    show_comparison_key,
                }),
            },
            Err(children) => RecordQueryPlan::Union {
                children,
                comparison_key,
                reverse,
                show_comparison_key,
            },
        },
        RecordQueryPlan::Intersection {
            children,
            comparison_key,
            reverse,
        } => match to_covering_children(metadata, common_primary_key, &required, children) {
            Ok(children) => RecordQueryPlan::Fetch {
                inner: Box::new(RecordQueryPlan::Intersection {
                    children,
                    comparison_key,
                    reverse,
                }),
            },
            Err(children) => RecordQueryPlan::Intersection {
                children,
                comparison_key,
                reverse,
            },
        },
        RecordQueryPlan::UnorderedUnion { children } => {
            match to_covering_children(metadata, common_primary_key, &required, children) {
                Ok(children) => RecordQueryPlan::Fetch {
                    inner: Box::new(RecordQueryPlan::UnorderedUnion { children }),
                },
                Err(children) => RecordQueryPlan::UnorderedUnion { children },
            }
        }
        RecordQueryPlan::PrimaryKeyDistinct { inner } => {
            match to_covering(metadata, common_primary_key, &required, *inner) {
                Ok(covering) => RecordQueryPlan::Fetch {
                    inner: Box::new(RecordQueryPlan::PrimaryKeyDistinct {
                        inner: Box::new(covering),
                    }),
                },
                Err(inner) => RecordQueryPlan::PrimaryKeyDistinct {
                    inner: Box::new(inner),
                },
            }
        }
        RecordQueryPlan::Filter { inner, filter } => {
            let evaluable = filter_evaluable_on_scan(metadata, common_primary_key, &inner, &filter);
            if evaluable {
                match to_covering(metadata, common_primary_key, &required, *inner) {
                    Ok(covering) => RecordQueryPlan::Fetch {
                        inner: Box::new(RecordQueryPlan::Filter {
                            inner: Box::new(covering),
                            filter,
                        }),
                    },
                    Err(inner) => RecordQueryPlan::Filter {
                        inner: Box::new(inner),
                        filter,
                    },
                }
            } else {
                RecordQueryPlan::Filter { inner, filter }
            }
        }
        other => other,
    }
}

fn filter_evaluable_on_scan(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    plan: &RecordQueryPlan,
    filter: &QueryComponent,
) -> bool {
    let RecordQueryPlan::IndexScan(scan) = plan else {
        return false;
    };
    let Ok(index) = metadata.index(&scan.index_name) else {
        return false;
    };
    let fields = available_index_fields(index, common_primary_key);
    component_evaluable_on(&fields, filter)
}

// Convert every child to a covering scan, or give all of them back.
fn to_covering_children(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    required: &[KeyExpression],
    children: Vec<RecordQueryPlan>,
) -> Result<Vec<RecordQueryPlan>, Vec<RecordQueryPlan>> {
    let mut covering = Vec::with_capacity(children.len());
    for child in &children {
        match to_covering(metadata, common_primary_key, required, child.clone()) {
            Ok(plan) => covering.push(plan),
            Err(_) => return Err(children),
        }
    }
    Ok(covering)
}

fn to_covering(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    required: &[KeyExpression],
    plan: RecordQueryPlan,
) -> Result<RecordQueryPlan, RecordQueryPlan> {
    match plan {
        RecordQueryPlan::IndexScan(scan)
            if scan.scan_type == crate::plan::IndexScanType::ByValue =>
        {
            let Ok(index) = metadata.index(&scan.index_name) else {
                return Err(RecordQueryPlan::IndexScan(scan));
            };
            if index.kind() != IndexKind::Value {
                return Err(RecordQueryPlan::IndexScan(scan));
            }
            let fields = available_index_fields(index, common_primary_key);
            if required.iter().all(|column| fields.contains(column)) {
                Ok(RecordQueryPlan::Covering {
                    index: scan,
                    required_fields: required.to_vec(),
                })
            } else {
                Err(RecordQueryPlan::IndexScan(scan))
            }
        }
        other => Err(other),
    }
}

/// Covering rewrite driven by the query's required results: remove the
/// record fetch when every required field and every remaining predicate is
/// evaluable on the index entry.
pub(crate) fn remove_index_fetch(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    plan: RecordQueryPlan,
    required: &[KeyExpression],
) -> Option<RecordQueryPlan> {
    match plan {
        RecordQueryPlan::IndexScan(scan) => {
            let index = metadata.index(&scan.index_name).ok()?;
            if index.kind() != IndexKind::Value {
                return None;
            }
            let fields = available_index_fields(index, common_primary_key);
            required
                .iter()
                .all(|column| fields.contains(column))
                .then(|| RecordQueryPlan::Covering {
                    index: scan,
                    required_fields: required.to_vec(),
                })
        }
        RecordQueryPlan::Fetch { inner } => {
            // The fetch was already deferred; drop it when the covering
            // stream underneath serves every required field.
            covering_serves(metadata, common_primary_key, &inner, required)
                .then_some(*inner)
        }
        RecordQueryPlan::Filter { inner, filter } => {
            let rewritten =
                remove_index_fetch(metadata, common_primary_key, *inner, required)?;
            let fields = covering_fields(metadata, common_primary_key, &rewritten)?;
            component_evaluable_on(&fields, &filter).then(|| RecordQueryPlan::Filter {
                inner: Box::new(rewritten),
                filter,
            })
        }
        RecordQueryPlan::TypeFilter {
            inner,
            record_types,
        } => {
            let rewritten =
                remove_index_fetch(metadata, common_primary_key, *inner, required)?;
            Some(RecordQueryPlan::TypeFilter {
                inner: Box::new(rewritten),
                record_types,
            })
        }
        RecordQueryPlan::PrimaryKeyDistinct { inner } => {
            let rewritten =
                remove_index_fetch(metadata, common_primary_key, *inner, required)?;
            Some(RecordQueryPlan::PrimaryKeyDistinct {
                inner: Box::new(rewritten),
            })
        }
        _ => None,
    }
}

// Every covering leaf below must expose the required fields.
fn covering_serves(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    plan: &RecordQueryPlan,
    required: &[KeyExpression],
) -> bool {
    covering_fields(metadata, common_primary_key, plan)
        .is_some_and(|fields| required.iter().all(|column| fields.contains(column)))
}

// Intersection of fields available from the covering leaves of a plan.
fn covering_fields(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    plan: &RecordQueryPlan,
) -> Option<Vec<KeyExpression>> {
    match plan {
        RecordQueryPlan::Covering { index, .. } => {
            let index = metadata.index(&index.index_name).ok()?;
            Some(available_index_fields(index, common_primary_key))
        }
        RecordQueryPlan::Filter { inner, .. }
        | RecordQueryPlan::TypeFilter { inner, .. }
        | RecordQueryPlan::PrimaryKeyDistinct { inner }
        | RecordQueryPlan::InJoin { inner, .. }
        | RecordQueryPlan::InUnion { inner, .. } => {
            covering_fields(metadata, common_primary_key, inner)
        }
        RecordQueryPlan::Union { children, .. }
        | RecordQueryPlan::Intersection { children, .. }
        | RecordQueryPlan::UnorderedUnion { children } => {
            let mut shared: Option<Vec<KeyExpression>> = None;
            for child in children {
                let fields = covering_fields(metadata, common_primary_key, child)?;
                shared = Some(match shared {
                    None => fields,
                    Some(existing) => existing
                        .into_iter()
                        .filter(|column| fields.contains(column))
                        .collect(),
                });
            }
            shared
        }
        _ => None,
    }
}

// Rebuild a node with every direct child mapped.
fn map_children(
    plan: RecordQueryPlan,
    mut f: impl FnMut(RecordQueryPlan) -> RecordQueryPlan,
) -> RecordQueryPlan {
    match plan {
        RecordQueryPlan::TypeFilter {
            inner,
            record_types,
        } => RecordQueryPlan::TypeFilter {
            inner: Box::new(f(*inner)),
            record_types,
        },
        RecordQueryPlan::Filter { inner, filter } => RecordQueryPlan::Filter {
            inner: Box::new(f(*inner)),
            filter,
        },
        RecordQueryPlan::InJoin { inner, source } => RecordQueryPlan::InJoin {
            inner: Box::new(f(*inner)),
            source,
        },
        RecordQueryPlan::InUnion {
            inner,
            sources,
            comparison_key,
            reverse,
            max_size,
        } => RecordQueryPlan::InUnion {
            inner: Box::new(f(*inner)),
            sources,
            comparison_key,
            reverse,
            max_size,
        },
        RecordQueryPlan::Intersection {
            children,
            comparison_key,
            reverse,
        } => RecordQueryPlan::Intersection {
            children: children.into_iter().map(&mut f).collect(),
            comparison_key,
            reverse,
        },
        RecordQueryPlan::Union {
            children,
            comparison_key,
            reverse,
            show_comparison_key,
        } => RecordQueryPlan::Union {
            children: children.into_iter().map(&mut f).collect(),
            comparison_key,
            reverse,
            show_comparison_key,
        },
        RecordQueryPlan::UnorderedUnion { children } => RecordQueryPlan::UnorderedUnion {
            children: children.into_iter().map(&mut f).collect(),
        },
        RecordQueryPlan::PrimaryKeyDistinct { inner } => RecordQueryPlan::PrimaryKeyDistinct {
            inner: Box::new(f(*inner)),
        },
        RecordQueryPlan::Fetch { inner } => RecordQueryPlan::Fetch {
            inner: Box::new(f(*inner)),
        },
        RecordQueryPlan::Sort {
            inner,
            key,
            reverse,
        } => RecordQueryPlan::Sort {
            inner: Box::new(f(*inner)),
            key,
            reverse,
        },
        leaf => leaf,
    }
}
