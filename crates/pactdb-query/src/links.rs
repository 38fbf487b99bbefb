//! Linked-contract query emission.
//!
//! Each `$$links.<name>` sub-schema becomes a [`LinkVariant`] describing the
//! join into the directed link-edge table. Emission is a two-stage plan:
//!
//! 1. an ID-only inner plan joins the link edges, applies the root filter
//!    and every correlated link filter, and aggregates matching
//!    `(source, idx, sink)` edge tuples per root contract;
//! 2. a `MATERIALIZED` CTE barrier reshapes the edges per `(source, sink)`
//!    pair, keeping the outer plan's predicates from being pushed down into
//!    the inner plan;
//! 3. the data-bearing outer plan re-joins the contracts and walks each
//!    link's slice of edges in a `LEFT JOIN LATERAL`, applying the link's
//!    own sort/skip/limit through a `row_number()` window before
//!    aggregating the per-link JSONB projections.
//!
//! Fetching only IDs in stage 1 keeps the planner on index-driven plans.

use pactdb_storage::types::WindowOptions;

use crate::columns::{LINKS_TABLE, STRINGS_TABLE, TABLE};
use crate::error::Result;
use crate::filter::Filter;
use crate::literal;
use crate::ordering;
use crate::select_map::SelectMap;

/// One `$$links` join, possibly carrying nested variants of its own.
#[derive(Debug, Clone)]
pub struct LinkVariant {
    /// Edge index; distinguishes this variant's edges in the aggregated
    /// edge array. Only top-level variants contribute edges.
    pub index: usize,
    /// The link name, resolved through the string-intern table.
    pub name: String,
    /// Alias of the link-edge table join (`links0`, `links1`, ...).
    pub links_alias: String,
    /// Alias of the joined contract (`linked0`, `linked1`, ...).
    pub join_alias: String,
    /// The compiled filter of the link sub-schema, rooted at `join_alias`.
    pub filter: Filter,
    /// Projection plan for the linked contracts.
    pub select: SelectMap,
    /// This link's own sort/skip/limit window.
    pub window: WindowOptions,
    pub nested: Vec<LinkVariant>,
}

/// The SQL that resolves a link name to its interned id.
fn name_lookup(name: &str) -> String {
    format!(
        "(SELECT id FROM {STRINGS_TABLE} WHERE string = {})",
        literal::string(name)
    )
}

/// Stage-1 joins for every variant, recursively. Nested variants join off
/// their parent's contract alias so their correlated filters can apply in
/// the inner plan.
fn render_stage1_joins(variants: &[LinkVariant], parent_alias: &str, out: &mut String) {
    for variant in variants {
        out.push_str(&format!(
            "\nLEFT JOIN {LINKS_TABLE} AS {la} ON {la}.from_id = {parent_alias}.id AND {la}.name = {lookup}\
             \nLEFT JOIN {TABLE} AS {ja} ON {ja}.id = {la}.to_id",
            la = variant.links_alias,
            ja = variant.join_alias,
            lookup = name_lookup(&variant.name),
        ));
        render_stage1_joins(&variant.nested, &variant.join_alias, out);
    }
}

/// The aggregated edge-array expression of the inner plan.
fn render_edges(variants: &[LinkVariant]) -> String {
    let parts: Vec<String> = variants
        .iter()
        .map(|variant| {
            format!(
                "coalesce(array_agg(DISTINCT ROW({TABLE}.id, {idx}, {ja}.id)::linkedge) \
                 FILTER (WHERE {ja}.id IS NOT NULL), ARRAY[]::linkedge[])",
                idx = variant.index,
                ja = variant.join_alias,
            )
        })
        .collect();
    format!("{} AS edges", parts.join(" || "))
}

/// The `rn` window predicate for a link's skip/limit.
fn render_window_cut(window: &WindowOptions) -> String {
    let mut cuts = Vec::new();
    if window.skip > 0 {
        cuts.push(format!("linked.rn > {}", window.skip));
    }
    if let Some(limit) = window.limit {
        cuts.push(format!("linked.rn <= {}", window.skip + limit));
    }
    if cuts.is_empty() {
        String::new()
    } else {
        format!("\n    WHERE {}", cuts.join(" AND "))
    }
}

/// The payload expression for one linked contract, including its own
/// nested link materializations.
fn render_link_payload(variant: &LinkVariant) -> String {
    let base = variant.select.render_payload(&variant.join_alias);
    if variant.nested.is_empty() {
        base
    } else {
        let pairs: Vec<String> = variant
            .nested
            .iter()
            .map(|nested| {
                format!(
                    "{}, coalesce(agg{}.payload, '[]'::jsonb)",
                    literal::string(&nested.name),
                    nested.index
                )
            })
            .collect();
        format!(
            "{base} || jsonb_build_object('links', jsonb_build_object({}))",
            pairs.join(", ")
        )
    }
}

/// A nested lateral: resolves its edges by joining the link table directly,
/// re-applying the variant's filter (the inner plan only pre-filtered the
/// root ids).
fn render_nested_lateral(variant: &LinkVariant, parent_alias: &str) -> Result<String> {
    let order = ordering::order_keys(&variant.window, &variant.join_alias)?
        .unwrap_or_else(|| format!("{}.id ASC", variant.join_alias));
    let mut inner_joins = String::new();
    for nested in &variant.nested {
        inner_joins.push_str(&render_nested_lateral(nested, &variant.join_alias)?);
    }
    let filter_sql = variant.filter.to_sql(&variant.join_alias);
    Ok(format!(
        "\nLEFT JOIN LATERAL (\
         \n    SELECT coalesce(jsonb_agg(linked.payload ORDER BY linked.rn), '[]'::jsonb) AS payload\
         \n    FROM (\
         \n        SELECT {payload} AS payload,\
         \n               row_number() OVER (ORDER BY {order}) AS rn\
         \n        FROM {LINKS_TABLE} AS {la}\
         \n        JOIN {TABLE} AS {ja} ON {ja}.id = {la}.to_id{inner_joins}\
         \n        WHERE {la}.from_id = {parent_alias}.id\
         \n          AND {la}.name = {lookup}\
         \n          AND {filter_sql}\
         \n    ) AS linked{cut}\
         \n) AS agg{idx} ON true",
        payload = render_link_payload(variant),
        la = variant.links_alias,
        ja = variant.join_alias,
        lookup = name_lookup(&variant.name),
        cut = render_window_cut(&variant.window),
        idx = variant.index,
    ))
}

/// A top-level lateral: walks this variant's slice of the pre-computed
/// edge set.
fn render_top_lateral(variant: &LinkVariant) -> Result<String> {
    let order = ordering::order_keys(&variant.window, &variant.join_alias)?
        .unwrap_or_else(|| format!("{}.id ASC", variant.join_alias));
    let mut nested_laterals = String::new();
    for nested in &variant.nested {
        nested_laterals.push_str(&render_nested_lateral(nested, &variant.join_alias)?);
    }
    Ok(format!(
        "\nLEFT JOIN LATERAL (\
         \n    SELECT coalesce(jsonb_agg(linked.payload ORDER BY linked.rn), '[]'::jsonb) AS payload\
         \n    FROM (\
         \n        SELECT {payload} AS payload,\
         \n               row_number() OVER (PARTITION BY link_edges.card_id ORDER BY {order}) AS rn\
         \n        FROM link_edges\
         \n        JOIN {TABLE} AS {ja} ON {ja}.id = link_edges.sink{nested_laterals}\
         \n        WHERE link_edges.card_id = main.id AND {idx} = ANY(link_edges.idxs)\
         \n    ) AS linked{cut}\
         \n) AS agg{idx} ON true",
        payload = render_link_payload(variant),
        ja = variant.join_alias,
        idx = variant.index,
        cut = render_window_cut(&variant.window),
    ))
}

/// Emit the full two-stage plan.
pub fn render_plan(
    root_filter: &Filter,
    root_select: &SelectMap,
    variants: &[LinkVariant],
    window: &WindowOptions,
) -> Result<String> {
    let mut joins = String::new();
    render_stage1_joins(variants, TABLE, &mut joins);

    let order = ordering::order_keys(window, TABLE)?;
    let inner_order = order
        .as_deref()
        .map(|keys| format!("\nORDER BY {keys}"))
        .unwrap_or_default();
    let inner_limit = ordering::inner_limit(window)
        .map(|limit| format!("\nLIMIT {limit}"))
        .unwrap_or_default();

    let mut laterals = String::new();
    for variant in variants {
        laterals.push_str(&render_top_lateral(variant)?);
    }

    let link_pairs: Vec<String> = variants
        .iter()
        .map(|variant| {
            format!(
                "{}, coalesce(agg{}.payload, '[]'::jsonb)",
                literal::string(&variant.name),
                variant.index
            )
        })
        .collect();
    let payload = format!(
        "{} || jsonb_build_object('links', jsonb_build_object({}))",
        root_select.render_payload(TABLE),
        link_pairs.join(", ")
    );

    let outer_order = order
        .as_deref()
        .map(|keys| format!("\nORDER BY {keys}"))
        .unwrap_or_default();
    let outer_cut = ordering::limit_offset(window);

    Ok(format!(
        "WITH main AS MATERIALIZED (\
         \nSELECT {TABLE}.id, {edges}\
         \nFROM {TABLE}{joins}\
         \nWHERE {filter}\
         \nGROUP BY {TABLE}.id{inner_order}{inner_limit}\
         \n), link_edges AS MATERIALIZED (\
         \nSELECT main.id AS card_id, (edge).sink AS sink, array_agg((edge).idx) AS idxs\
         \nFROM main CROSS JOIN LATERAL unnest(main.edges) AS edge\
         \nGROUP BY main.id, (edge).sink\
         \n)\
         \nSELECT {payload} AS payload\
         \nFROM {TABLE}\
         \nJOIN main ON {TABLE}.id = main.id{laterals}{outer_order}{outer_cut}",
        edges = render_edges(variants),
        filter = root_filter.to_sql(TABLE),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{Path, PathSegment};
    use serde_json::json;

    fn variant(index: usize) -> LinkVariant {
        let mut path = Path::new();
        path.push(PathSegment::Column("type".to_string()));
        LinkVariant {
            index,
            name: "is attached to".to_string(),
            links_alias: format!("links{index}"),
            join_alias: format!("linked{index}"),
            filter: Filter::Equals {
                path,
                values: vec![json!("card@1.0.0")],
            },
            select: SelectMap::new(),
            window: WindowOptions::default(),
            nested: Vec::new(),
        }
    }

    #[test]
    fn plan_has_two_materialized_stages() {
        let variants = vec![variant(0)];
        let root = Filter::Link {
            name: "is attached to".to_string(),
            join_alias: "linked0".to_string(),
            sub: Box::new(variants[0].filter.clone()),
        };
        let sql =
            render_plan(&root, &SelectMap::new(), &variants, &WindowOptions::default()).unwrap();
        assert_eq!(sql.matches("MATERIALIZED").count(), 2);
        assert!(sql.contains("WITH main AS MATERIALIZED"));
        assert!(sql.contains("link_edges AS MATERIALIZED"));
        assert!(sql.contains("LEFT JOIN LATERAL"));
        assert!(sql.contains("row_number() OVER (PARTITION BY link_edges.card_id"));
        assert!(sql.contains("ROW(cards.id, 0, linked0.id)::linkedge"));
        assert!(sql.contains("SELECT id FROM strings WHERE string = 'is attached to'"));
    }

    #[test]
    fn inner_plan_limit_covers_outer_window() {
        let variants = vec![variant(0)];
        let window = WindowOptions {
            skip: 3,
            limit: Some(7),
            ..Default::default()
        };
        let sql = render_plan(&Filter::Constant(true), &SelectMap::new(), &variants, &window)
            .unwrap();
        // Inner limit is skip + limit with no offset; outer is authoritative.
        assert!(sql.contains("GROUP BY cards.id\nLIMIT 10"));
        assert!(sql.ends_with("LIMIT 7 OFFSET 3"));
    }

    #[test]
    fn link_window_is_cut_by_row_number() {
        let mut v = variant(0);
        v.window.skip = 2;
        v.window.limit = Some(3);
        let sql = render_plan(
            &Filter::Constant(true),
            &SelectMap::new(),
            &[v],
            &WindowOptions::default(),
        )
        .unwrap();
        assert!(sql.contains("WHERE linked.rn > 2 AND linked.rn <= 5"));
    }

    #[test]
    fn nested_variants_join_in_both_stages() {
        let mut outer = variant(0);
        let mut inner = variant(1);
        inner.name = "has attached element".to_string();
        outer.nested.push(inner);
        let sql = render_plan(
            &Filter::Constant(true),
            &SelectMap::new(),
            &[outer],
            &WindowOptions::default(),
        )
        .unwrap();
        // Stage 1 joins the nested variant off its parent's alias.
        assert!(sql.contains("links1.from_id = linked0.id"));
        // The nested lateral re-resolves its edges directly.
        assert!(sql.contains("WHERE links1.from_id = linked0.id\n          AND links1.name ="));
    }
}
