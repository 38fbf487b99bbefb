//! The select map.
//!
//! A tree mirroring the query's JSON-Schema shape that records which
//! properties must be projected back out per node: observed properties, the
//! additional-properties policy (default true), branches for `anyOf`, and
//! nested maps for `$$links`. At emit time the per-row projection is a
//! `jsonb_build_object` of the union, with each `anyOf` branch guarded by a
//! `CASE` on its branch filter so fields from a failed branch do not leak.

use indexmap::IndexMap;

use crate::filter::Filter;
use crate::path::{Path, PathSegment};

/// Projection plan for one schema node.
#[derive(Debug, Clone, Default)]
pub struct SelectMap {
    properties: IndexMap<String, SelectMap>,
    additional_properties: Option<bool>,
    branches: Vec<SelectMap>,
    links: IndexMap<String, SelectMap>,
    filter: Option<Filter>,
}

impl SelectMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a property is observed, returning its node.
    pub fn see(&mut self, name: &str) -> &mut SelectMap {
        self.properties.entry(name.to_string()).or_default()
    }

    pub fn get_property(&self, name: &str) -> Option<&SelectMap> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&String, &SelectMap)> {
        self.properties.iter()
    }

    /// Open a new `anyOf` branch.
    pub fn new_branch(&mut self) -> &mut SelectMap {
        self.branches.push(SelectMap::new());
        self.branches.last_mut().expect("just pushed")
    }

    pub fn branches(&self) -> &[SelectMap] {
        &self.branches
    }

    pub fn set_additional_properties(&mut self, value: bool) {
        self.additional_properties = Some(value);
    }

    /// Additional properties default to true.
    pub fn get_additional_properties(&self) -> bool {
        self.additional_properties.unwrap_or(true)
    }

    /// The nested map for a link type, created on first use.
    pub fn get_link(&mut self, link_type: &str) -> &mut SelectMap {
        self.links.entry(link_type.to_string()).or_default()
    }

    pub fn links(&self) -> impl Iterator<Item = (&String, &SelectMap)> {
        self.links.iter()
    }

    /// Attach the branch guard used in the `CASE` emission.
    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = Some(filter);
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Render the per-row payload projection for rows of `table`.
    pub fn render_payload(&self, table: &str) -> String {
        let mut parts = Vec::new();
        if self.get_additional_properties() {
            parts.push(format!("to_jsonb({table})"));
        }
        if let Some(own) = self.render_object(table, &Path::new()) {
            parts.push(own);
        }
        self.render_branches(table, &Path::new(), &mut parts);
        if parts.is_empty() {
            format!("to_jsonb({table})")
        } else {
            parts.join(" || ")
        }
    }

    fn render_branches(&self, table: &str, base: &Path, parts: &mut Vec<String>) {
        for branch in &self.branches {
            let Some(object) = branch.render_object(table, base) else {
                branch.render_branches(table, base, parts);
                continue;
            };
            match &branch.filter {
                Some(filter) => parts.push(format!(
                    "CASE WHEN {} THEN {object} ELSE '{{}}'::jsonb END",
                    filter.to_sql(table)
                )),
                None => parts.push(object),
            }
            branch.render_branches(table, base, parts);
        }
    }

    /// The `jsonb_build_object` of this node's own observed properties, or
    /// `None` when nothing is observed.
    fn render_object(&self, table: &str, base: &Path) -> Option<String> {
        if self.properties.is_empty() {
            return None;
        }
        let fields: Vec<String> = self
            .properties
            .iter()
            .map(|(name, node)| {
                let mut path = base.clone();
                if path.is_processing_table() {
                    path.push(PathSegment::Column(name.clone()));
                } else {
                    path.push(PathSegment::JsonProperty(name.clone()));
                }
                let value = node.render_value(table, &path);
                format!("{}, {value}", crate::literal::string(name))
            })
            .collect();
        Some(format!("jsonb_build_object({})", fields.join(", ")))
    }

    /// The value expression for one observed property.
    fn render_value(&self, table: &str, path: &Path) -> String {
        if !self.properties.is_empty() && !self.get_additional_properties() {
            return self
                .render_object(table, path)
                .unwrap_or_else(|| "'{}'::jsonb".to_string());
        }
        if path.is_json_context() {
            path.render(table)
        } else {
            format!("to_jsonb({})", path.render(table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_projection_is_whole_row() {
        let map = SelectMap::new();
        assert_eq!(map.render_payload("cards"), "to_jsonb(cards)");
    }

    #[test]
    fn observed_properties_are_built_into_object() {
        let mut map = SelectMap::new();
        map.set_additional_properties(false);
        map.see("slug");
        map.see("data");
        let sql = map.render_payload("cards");
        assert_eq!(
            sql,
            "jsonb_build_object('slug', to_jsonb(cards.slug), 'data', cards.data)"
        );
    }

    #[test]
    fn additional_properties_merges_raw_row() {
        let mut map = SelectMap::new();
        map.see("slug");
        let sql = map.render_payload("cards");
        assert!(sql.starts_with("to_jsonb(cards) || "));
    }

    #[test]
    fn nested_selection_descends_into_jsonb() {
        let mut map = SelectMap::new();
        map.set_additional_properties(false);
        let data = map.see("data");
        data.set_additional_properties(false);
        data.see("status");
        let sql = map.render_payload("cards");
        assert!(sql.contains("'data', jsonb_build_object('status', cards.data#>'{\"status\"}')"));
    }

    #[test]
    fn branches_are_guarded_by_case() {
        let mut map = SelectMap::new();
        map.set_additional_properties(false);
        map.see("id");
        let branch = map.new_branch();
        branch.see("name");
        branch.set_filter(Filter::Equals {
            path: {
                let mut p = Path::new();
                p.push(PathSegment::Column("active".to_string()));
                p
            },
            values: vec![json!(true)],
        });
        let sql = map.render_payload("cards");
        assert!(sql.contains("CASE WHEN cards.active = true THEN"));
        assert!(sql.contains("ELSE '{}'::jsonb END"));
    }

    #[test]
    fn see_is_idempotent() {
        let mut map = SelectMap::new();
        map.see("slug");
        map.see("slug");
        assert_eq!(map.properties().count(), 1);
    }
}
