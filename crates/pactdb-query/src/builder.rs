//! The query builder.
//!
//! Walks one JSON-Schema node at a time, dispatching on a closed set of
//! keywords, and produces a filter tree plus a select map. Unknown keywords
//! are rejected up front with the JSON-pointer path of the offending node;
//! `description`, `title` and `examples` are ignored.
//!
//! On JSONB paths every scalar keyword is wrapped in a type guard
//! (`guard → filter`), collapsed away when the node's `type` already pins
//! the path to exactly the guarded type.

use serde_json::{Map, Value};

use pactdb_storage::types::{QueryOptions, MAX_QUERY_LIMIT};

use crate::columns::{self, JsonType, SqlType, TABLE, VERSION_PROPERTY};
use crate::error::{QueryBuilderError, Result};
use crate::filter::{CompareOp, Filter, ValueCast};
use crate::format::Format;
use crate::links::{self, LinkVariant};
use crate::ordering;
use crate::path::{Path, PathSegment};
use crate::select_map::SelectMap;

use pactdb_core::Version;

/// A compiled query, ready for the driver.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// A single `SELECT` returning one `payload` JSONB column per row.
    pub sql: String,
}

/// The filter compiled for one schema node, together with whether the
/// filter already implies the addressed value exists (so redundant
/// existence checks can be skipped).
#[derive(Debug)]
struct NodeFilter {
    filter: Filter,
    implies_exists: bool,
}

impl NodeFilter {
    fn new(filter: Filter) -> Self {
        Self {
            filter,
            implies_exists: false,
        }
    }

    fn exists(filter: Filter) -> Self {
        Self {
            filter,
            implies_exists: true,
        }
    }
}

/// Keywords the builder understands, in the order-insensitive set.
const KNOWN_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "type",
    "required",
    "format",
    "formatMaximum",
    "formatMinimum",
    "if",
    "then",
    "else",
    "properties",
    "const",
    "enum",
    "contains",
    "items",
    "not",
    "pattern",
    "regexp",
    "multipleOf",
    "maximum",
    "minimum",
    "exclusiveMaximum",
    "exclusiveMinimum",
    "minItems",
    "maxItems",
    "minLength",
    "maxLength",
    "minProperties",
    "maxProperties",
    "fullTextSearch",
    "allOf",
    "anyOf",
    "oneOf",
    "$$links",
];

/// Annotations that carry no constraint.
const IGNORED_KEYWORDS: &[&str] = &["description", "title", "examples"];

/// Compile a schema (plus the caller's field selection and window options)
/// into a single SQL query.
pub fn compile(select: &Value, schema: &Value, options: &QueryOptions) -> Result<CompiledQuery> {
    validate_limits(options)?;

    let mut root_select = SelectMap::new();
    seed_select(&mut root_select, select);

    let mut builder = Builder::new(options);
    let mut path = Path::new();
    let mut variants = Vec::new();
    let node = builder.compile_node(schema, &mut path, &mut root_select, &mut variants, "")?;

    let sql = if variants.is_empty() {
        let payload = root_select.render_payload(TABLE);
        let order = ordering::order_keys(&options.window, TABLE)?
            .map(|keys| format!("\nORDER BY {keys}"))
            .unwrap_or_default();
        let cut = ordering::limit_offset(&options.window);
        format!(
            "SELECT {payload} AS payload\nFROM {TABLE}\nWHERE {}{order}{cut}",
            node.filter.to_sql(TABLE)
        )
    } else {
        links::render_plan(&node.filter, &root_select, &variants, &options.window)?
    };

    tracing::debug!(bytes = sql.len(), links = variants.len(), "compiled schema to SQL");
    Ok(CompiledQuery { sql })
}

/// Compile only the boolean filter of a schema, rendered against rows of
/// the primary table. Used to prepare per-row predicates for attached
/// change streams.
pub fn compile_row_filter(schema: &Value) -> Result<String> {
    let mut builder = Builder::new_detached();
    let mut path = Path::new();
    let mut select = SelectMap::new();
    let mut variants = Vec::new();
    let node = builder.compile_node(schema, &mut path, &mut select, &mut variants, "")?;
    if !variants.is_empty() {
        return Err(QueryBuilderError::invalid_schema(
            "/$$links",
            "linked queries cannot be used as row filters",
        ));
    }
    Ok(node.filter.to_sql(TABLE))
}

/// Compile a prepared single-row query: projection plus filter, keyed by a
/// `$1` id parameter. Attached change streams run this once per change.
pub fn compile_row_query(select: &Value, schema: &Value) -> Result<String> {
    let mut root_select = SelectMap::new();
    seed_select(&mut root_select, select);
    let mut builder = Builder::new_detached();
    let mut path = Path::new();
    let mut variants = Vec::new();
    let node = builder.compile_node(schema, &mut path, &mut root_select, &mut variants, "")?;
    if !variants.is_empty() {
        return Err(QueryBuilderError::invalid_schema(
            "/$$links",
            "linked queries cannot be used as row filters",
        ));
    }
    Ok(format!(
        "SELECT {payload} AS payload\nFROM {TABLE}\nWHERE {TABLE}.id = $1::uuid AND ({filter})",
        payload = root_select.render_payload(TABLE),
        filter = node.filter.to_sql(TABLE),
    ))
}

fn validate_limits(options: &QueryOptions) -> Result<()> {
    let limit = options.window.limit.unwrap_or(MAX_QUERY_LIMIT);
    if limit == 0 {
        return Err(QueryBuilderError::invalid_limit("limit must be >= 1"));
    }
    if limit > MAX_QUERY_LIMIT {
        return Err(QueryBuilderError::invalid_limit(format!(
            "limit {limit} exceeds maximum of {MAX_QUERY_LIMIT}"
        )));
    }
    for (name, window) in &options.links {
        if window.limit.unwrap_or(1) > MAX_QUERY_LIMIT {
            return Err(QueryBuilderError::invalid_limit(format!(
                "limit for link '{name}' exceeds maximum of {MAX_QUERY_LIMIT}"
            )));
        }
    }
    Ok(())
}

/// Mark every property mentioned in the caller's `select` tree as observed.
/// `$$links` entries seed the per-link maps.
fn seed_select(map: &mut SelectMap, select: &Value) {
    let Some(obj) = select.as_object() else {
        return;
    };
    for (name, sub) in obj {
        if name == "$$links" {
            if let Some(link_map) = sub.as_object() {
                for (link_type, link_select) in link_map {
                    seed_select(map.get_link(link_type), link_select);
                }
            }
            continue;
        }
        seed_select(map.see(name), sub);
    }
}

struct Builder<'a> {
    options: Option<&'a QueryOptions>,
    alias_count: usize,
    variant_count: usize,
}

impl<'a> Builder<'a> {
    fn new(options: &'a QueryOptions) -> Self {
        Self {
            options: Some(options),
            alias_count: 0,
            variant_count: 0,
        }
    }

    fn new_detached() -> Self {
        Self {
            options: None,
            alias_count: 0,
            variant_count: 0,
        }
    }

    fn next_alias(&mut self) -> String {
        let alias = format!("contains{}", self.alias_count);
        self.alias_count += 1;
        alias
    }

    /// Compile one schema node at the current path.
    fn compile_node(
        &mut self,
        schema: &Value,
        path: &mut Path,
        select: &mut SelectMap,
        variants: &mut Vec<LinkVariant>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let obj = match schema {
            Value::Bool(true) => return Ok(NodeFilter::new(Filter::Constant(true))),
            Value::Bool(false) => return Ok(NodeFilter::new(Filter::Constant(false))),
            Value::Object(obj) => obj,
            _ => {
                return Err(QueryBuilderError::invalid_schema(
                    ptr,
                    "schema must be an object or a boolean",
                ));
            }
        };

        for keyword in obj.keys() {
            if !KNOWN_KEYWORDS.contains(&keyword.as_str())
                && !IGNORED_KEYWORDS.contains(&keyword.as_str())
            {
                return Err(QueryBuilderError::invalid_schema(
                    ptr,
                    format!("unknown keyword '{keyword}'"),
                ));
            }
        }

        let mut filters = Vec::new();
        let mut implies_exists = false;

        // Keywords that later ones depend on are applied first.
        if let Some(value) = obj.get("additionalProperties") {
            if let Some(flag) = value.as_bool() {
                select.set_additional_properties(flag);
            }
        }

        let permitted = self.permitted_types(obj, ptr)?;
        if let Some(types) = &permitted {
            let node = self.compile_type(types, path)?;
            implies_exists |= node.implies_exists;
            filters.push(node.filter);
        }

        let format = self.compile_format(obj, path, &permitted, &mut filters, ptr)?;

        if let Some(condition) = obj.get("if") {
            let node = self.compile_conditional(obj, condition, path, select, variants, ptr)?;
            implies_exists |= node.implies_exists;
            filters.push(node.filter);
        }

        for (keyword, value) in obj {
            let child_ptr = format!("{ptr}/{keyword}");
            let node = match keyword.as_str() {
                // handled above / at finalize / ignored
                "additionalProperties" | "type" | "required" | "format" | "if" | "then"
                | "else" | "properties" => continue,
                k if IGNORED_KEYWORDS.contains(&k) => continue,

                "const" => NodeFilter::exists(self.compile_const(value, path)),
                "enum" => {
                    let values = value.as_array().ok_or_else(|| {
                        QueryBuilderError::invalid_schema(&child_ptr, "enum must be an array")
                    })?;
                    NodeFilter::exists(Filter::Equals {
                        path: path.clone(),
                        values: values.clone(),
                    })
                }
                "pattern" | "regexp" => {
                    let (pattern, ignore_case) = parse_regex_keyword(value, &child_ptr)?;
                    validate_regex(&pattern, &child_ptr)?;
                    NodeFilter::new(self.guard(
                        path,
                        &permitted,
                        JsonType::String,
                        Filter::MatchesRegex {
                            path: path.clone(),
                            pattern,
                            ignore_case,
                        },
                    ))
                }
                "formatMaximum" => self.compile_format_bound(
                    value,
                    format,
                    CompareOp::Le,
                    path,
                    &permitted,
                    &child_ptr,
                )?,
                "formatMinimum" => self.compile_format_bound(
                    value,
                    format,
                    CompareOp::Ge,
                    path,
                    &permitted,
                    &child_ptr,
                )?,
                "multipleOf" => {
                    let multiple = number_value(value, &child_ptr)?;
                    NodeFilter::new(self.guard(
                        path,
                        &permitted,
                        JsonType::Number,
                        Filter::MultipleOf {
                            path: path.clone(),
                            multiple,
                        },
                    ))
                }
                "maximum" => self.compile_bound(value, CompareOp::Le, path, &permitted, &child_ptr)?,
                "minimum" => self.compile_bound(value, CompareOp::Ge, path, &permitted, &child_ptr)?,
                "exclusiveMaximum" => {
                    self.compile_bound(value, CompareOp::Lt, path, &permitted, &child_ptr)?
                }
                "exclusiveMinimum" => {
                    self.compile_bound(value, CompareOp::Gt, path, &permitted, &child_ptr)?
                }
                "minItems" => self.compile_array_length(value, CompareOp::Ge, path, &permitted, &child_ptr)?,
                "maxItems" => self.compile_array_length(value, CompareOp::Le, path, &permitted, &child_ptr)?,
                "minLength" => self.compile_string_length(value, CompareOp::Ge, path, &permitted, &child_ptr)?,
                "maxLength" => self.compile_string_length(value, CompareOp::Le, path, &permitted, &child_ptr)?,
                "minProperties" => {
                    self.compile_map_size(value, CompareOp::Ge, path, &permitted, &child_ptr)?
                }
                "maxProperties" => {
                    self.compile_map_size(value, CompareOp::Le, path, &permitted, &child_ptr)?
                }
                "fullTextSearch" => self.compile_full_text(value, path, &child_ptr)?,
                "contains" => self.compile_contains(value, path, &permitted, &child_ptr)?,
                "items" => self.compile_items(obj, value, path, &permitted, &child_ptr)?,
                "not" => {
                    let mut scratch = SelectMap::new();
                    let node =
                        self.compile_node(value, path, &mut scratch, variants, &child_ptr)?;
                    NodeFilter::new(node.filter.negate())
                }
                "allOf" => self.compile_all_of(value, path, select, variants, &child_ptr)?,
                "anyOf" | "oneOf" => {
                    // oneOf compiles as anyOf: enforcing uniqueness in SQL is
                    // prohibitively expensive.
                    self.compile_any_of(value, path, select, variants, &child_ptr)?
                }
                "$$links" => self.compile_links(value, select, variants, &child_ptr)?,
                other => {
                    return Err(QueryBuilderError::invalid_schema(
                        ptr,
                        format!("unknown keyword '{other}'"),
                    ));
                }
            };
            implies_exists |= node.implies_exists;
            filters.push(node.filter);
        }

        // properties + required merge, guarded by type = object.
        let properties_node = self.compile_properties(obj, path, select, variants, &permitted, ptr)?;
        if let Some(node) = properties_node {
            implies_exists |= node.implies_exists;
            filters.push(node.filter);
        }

        Ok(NodeFilter {
            filter: Filter::conjoin(filters),
            implies_exists,
        })
    }

    /// Parse the `type` keyword into the permitted JSON types.
    fn permitted_types(
        &self,
        obj: &Map<String, Value>,
        ptr: &str,
    ) -> Result<Option<Vec<String>>> {
        let Some(value) = obj.get("type") else {
            return Ok(None);
        };
        let names: Vec<String> = match value {
            Value::String(name) => vec![name.clone()],
            Value::Array(names) => names
                .iter()
                .map(|n| {
                    n.as_str().map(str::to_string).ok_or_else(|| {
                        QueryBuilderError::invalid_schema(
                            format!("{ptr}/type"),
                            "type entries must be strings",
                        )
                    })
                })
                .collect::<Result<_>>()?,
            _ => {
                return Err(QueryBuilderError::invalid_schema(
                    format!("{ptr}/type"),
                    "type must be a string or an array of strings",
                ));
            }
        };
        for name in &names {
            if JsonType::parse(name).is_none() {
                return Err(QueryBuilderError::invalid_schema(
                    format!("{ptr}/type"),
                    format!("unknown type '{name}'"),
                ));
            }
        }
        Ok(Some(names))
    }

    /// Compile the `type` keyword into a filter.
    fn compile_type(&self, names: &[String], path: &Path) -> Result<NodeFilter> {
        let types: Vec<JsonType> = {
            let mut types: Vec<JsonType> =
                names.iter().filter_map(|n| JsonType::parse(n)).collect();
            types.sort();
            types.dedup();
            types
        };
        let excludes_null = !types.contains(&JsonType::Null);

        if path.is_processing_table() {
            // A contract row is always an object.
            let filter = if types.contains(&JsonType::Object) {
                Filter::Constant(true)
            } else {
                Filter::Constant(false)
            };
            return Ok(NodeFilter::new(filter));
        }

        if path.is_json_context() {
            let mut filter = Filter::IsOfJsonTypes {
                path: path.clone(),
                types: types.clone(),
            };
            // `integer` needs integrality on top of the number type guard.
            let integer_only = names.iter().any(|n| n == "integer")
                && !names.iter().any(|n| n == "number");
            if integer_only {
                filter = filter.and_with(Filter::MultipleOf {
                    path: path.clone(),
                    multiple: serde_json::Number::from(1),
                });
            }
            return Ok(NodeFilter {
                filter,
                implies_exists: excludes_null,
            });
        }

        // Native column: its JSON type is static.
        let filter = match path.static_json_type() {
            Some(actual) if types.contains(&actual) => Filter::Constant(true),
            Some(_) => Filter::Constant(false),
            None => Filter::Constant(true),
        };
        Ok(NodeFilter {
            filter,
            implies_exists: excludes_null,
        })
    }

    /// Compile `format` (a string-typed regex guard) and remember it for
    /// `formatMaximum`/`formatMinimum`.
    fn compile_format(
        &mut self,
        obj: &Map<String, Value>,
        path: &Path,
        permitted: &Option<Vec<String>>,
        filters: &mut Vec<Filter>,
        ptr: &str,
    ) -> Result<Option<Format>> {
        let Some(value) = obj.get("format") else {
            return Ok(None);
        };
        let name = value.as_str().ok_or_else(|| {
            QueryBuilderError::invalid_schema(format!("{ptr}/format"), "format must be a string")
        })?;
        let format = Format::parse(name).ok_or_else(|| {
            QueryBuilderError::invalid_schema(
                format!("{ptr}/format"),
                format!("unsupported format '{name}'"),
            )
        })?;
        filters.push(self.guard(
            path,
            permitted,
            JsonType::String,
            Filter::MatchesRegex {
                path: path.clone(),
                pattern: format.pattern().to_string(),
                ignore_case: false,
            },
        ));
        Ok(Some(format))
    }

    /// `if`/`then`/`else`: `(if ∧ then) ∨ (¬if ∧ else)`.
    fn compile_conditional(
        &mut self,
        obj: &Map<String, Value>,
        condition: &Value,
        path: &mut Path,
        select: &mut SelectMap,
        variants: &mut Vec<LinkVariant>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let mut scratch = SelectMap::new();
        let if_node =
            self.compile_node(condition, path, &mut scratch, variants, &format!("{ptr}/if"))?;
        let then_filter = match obj.get("then") {
            Some(then) => {
                self.compile_node(then, path, select, variants, &format!("{ptr}/then"))?
                    .filter
            }
            None => Filter::Constant(true),
        };
        let else_filter = match obj.get("else") {
            Some(other) => {
                self.compile_node(other, path, select, variants, &format!("{ptr}/else"))?
                    .filter
            }
            None => Filter::Constant(true),
        };
        let positive = if_node.filter.clone().and_with(then_filter);
        let negative = if_node.filter.negate().and_with(else_filter);
        Ok(NodeFilter::new(positive.or_with(negative)))
    }

    fn compile_const(&self, value: &Value, path: &Path) -> Filter {
        Filter::Equals {
            path: path.clone(),
            values: vec![value.clone()],
        }
    }

    fn compile_bound(
        &self,
        value: &Value,
        op: CompareOp,
        path: &Path,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let number = number_value(value, ptr)?;
        let cast = if path.is_json_context() {
            Some(ValueCast::Numeric)
        } else {
            match path.head_column().map(|s| s.sql_type) {
                Some(SqlType::Integer) => None,
                _ => Some(ValueCast::Numeric),
            }
        };
        Ok(NodeFilter::new(self.guard(
            path,
            permitted,
            JsonType::Number,
            Filter::ValueIs {
                path: path.clone(),
                op,
                value: Value::Number(number),
                cast,
            },
        )))
    }

    fn compile_format_bound(
        &self,
        value: &Value,
        format: Option<Format>,
        op: CompareOp,
        path: &Path,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let bound = value.as_str().ok_or_else(|| {
            QueryBuilderError::invalid_schema(ptr, "format bound must be a string")
        })?;
        let cast = format.and_then(Format::bound_cast).ok_or_else(|| {
            QueryBuilderError::invalid_schema(
                ptr,
                "formatMaximum/formatMinimum require a date, time or date-time format",
            )
        })?;
        Ok(NodeFilter::new(self.guard(
            path,
            permitted,
            JsonType::String,
            Filter::ValueIs {
                path: path.clone(),
                op,
                value: Value::String(bound.to_string()),
                cast: Some(cast),
            },
        )))
    }

    fn compile_array_length(
        &self,
        value: &Value,
        op: CompareOp,
        path: &Path,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let length = usize_value(value, ptr)?;
        Ok(NodeFilter::new(self.guard(
            path,
            permitted,
            JsonType::Array,
            Filter::ArrayLength {
                path: path.clone(),
                op,
                length,
            },
        )))
    }

    fn compile_string_length(
        &self,
        value: &Value,
        op: CompareOp,
        path: &Path,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let length = usize_value(value, ptr)?;
        Ok(NodeFilter::new(self.guard(
            path,
            permitted,
            JsonType::String,
            Filter::StringLength {
                path: path.clone(),
                op,
                length,
            },
        )))
    }

    fn compile_map_size(
        &self,
        value: &Value,
        op: CompareOp,
        path: &Path,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let count = usize_value(value, ptr)?;
        Ok(NodeFilter::new(self.guard(
            path,
            permitted,
            JsonType::Object,
            Filter::JsonMapPropertyCount {
                path: path.clone(),
                op,
                count,
            },
        )))
    }

    fn compile_full_text(&self, value: &Value, path: &Path, ptr: &str) -> Result<NodeFilter> {
        let term = value
            .as_object()
            .and_then(|obj| obj.get("term"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                QueryBuilderError::invalid_schema(ptr, "fullTextSearch requires a term string")
            })?;
        if path.is_processing_table() {
            return Err(QueryBuilderError::invalid_schema(
                ptr,
                "fullTextSearch must be applied to a property",
            ));
        }
        if let Some(spec) = path.head_column() {
            if matches!(
                spec.sql_type,
                SqlType::Integer | SqlType::Boolean | SqlType::Timestamp | SqlType::Uuid
            ) {
                return Err(QueryBuilderError::invalid_schema(
                    ptr,
                    format!("column '{}' is not searchable text", spec.name),
                ));
            }
        }
        Ok(NodeFilter::exists(Filter::FullTextSearch {
            path: path.clone(),
            term: term.to_string(),
        }))
    }

    fn compile_contains(
        &mut self,
        child: &Value,
        path: &Path,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        // `{const: X}` (optionally with a matching `type`) compiles to a
        // JSONB containment probe instead of a correlated sub-query.
        if path.is_json_context() {
            if let Some(constant) = containment_constant(child) {
                return Ok(NodeFilter::new(self.guard(
                    path,
                    permitted,
                    JsonType::Array,
                    Filter::ValueIs {
                        path: path.clone(),
                        op: CompareOp::Contains,
                        value: Value::Array(vec![constant.clone()]),
                        cast: None,
                    },
                )));
            }
        }

        let json_elements = element_kind(path);
        let alias = self.next_alias();
        let mut element_path = Path::element(alias.clone(), json_elements);
        let mut scratch = SelectMap::new();
        let mut no_variants = Vec::new();
        let node = self.compile_node(
            child,
            &mut element_path,
            &mut scratch,
            &mut no_variants,
            ptr,
        )?;
        if !no_variants.is_empty() {
            return Err(QueryBuilderError::invalid_schema(
                ptr,
                "$$links is not allowed inside contains",
            ));
        }
        Ok(NodeFilter::new(self.guard(
            path,
            permitted,
            JsonType::Array,
            Filter::ArrayContains {
                path: path.clone(),
                alias,
                element: Box::new(node.filter),
            },
        )))
    }

    fn compile_items(
        &mut self,
        obj: &Map<String, Value>,
        value: &Value,
        path: &Path,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        match value {
            // Tuple form: per-index constraints; each applies only when the
            // element is present.
            Value::Array(entries) => {
                let mut parts = Vec::new();
                for (index, entry) in entries.iter().enumerate() {
                    let mut element_path = path.clone();
                    element_path.push(PathSegment::JsonIndex(index));
                    let mut scratch = SelectMap::new();
                    let mut no_variants = Vec::new();
                    let node = self.compile_node(
                        entry,
                        &mut element_path,
                        &mut scratch,
                        &mut no_variants,
                        &format!("{ptr}/{index}"),
                    )?;
                    let present = Filter::ArrayLength {
                        path: path.clone(),
                        op: CompareOp::Gt,
                        length: index,
                    };
                    parts.push(present.implies(node.filter));
                }
                if obj.get("additionalProperties") == Some(&Value::Bool(false)) {
                    parts.push(Filter::ArrayLength {
                        path: path.clone(),
                        op: CompareOp::Eq,
                        length: entries.len(),
                    });
                }
                Ok(NodeFilter::new(self.guard(
                    path,
                    permitted,
                    JsonType::Array,
                    Filter::conjoin(parts),
                )))
            }
            // Single-schema form: every element matches, emitted as
            // "no element matches the negated child".
            _ => {
                let json_elements = element_kind(path);
                let alias = self.next_alias();
                let mut element_path = Path::element(alias.clone(), json_elements);
                let mut scratch = SelectMap::new();
                let mut no_variants = Vec::new();
                let node = self.compile_node(
                    value,
                    &mut element_path,
                    &mut scratch,
                    &mut no_variants,
                    ptr,
                )?;
                let any_mismatch = Filter::ArrayContains {
                    path: path.clone(),
                    alias,
                    element: Box::new(node.filter.negate()),
                };
                Ok(NodeFilter::new(self.guard(
                    path,
                    permitted,
                    JsonType::Array,
                    any_mismatch.negate(),
                )))
            }
        }
    }

    fn compile_all_of(
        &mut self,
        value: &Value,
        path: &mut Path,
        select: &mut SelectMap,
        variants: &mut Vec<LinkVariant>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let entries = value.as_array().ok_or_else(|| {
            QueryBuilderError::invalid_schema(ptr, "allOf must be an array of schemas")
        })?;
        let mut filters = Vec::new();
        let mut implies_exists = false;
        for (index, entry) in entries.iter().enumerate() {
            let node =
                self.compile_node(entry, path, select, variants, &format!("{ptr}/{index}"))?;
            implies_exists |= node.implies_exists;
            filters.push(node.filter);
        }
        Ok(NodeFilter {
            filter: Filter::conjoin(filters),
            implies_exists,
        })
    }

    fn compile_any_of(
        &mut self,
        value: &Value,
        path: &mut Path,
        select: &mut SelectMap,
        variants: &mut Vec<LinkVariant>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let entries = value.as_array().ok_or_else(|| {
            QueryBuilderError::invalid_schema(ptr, "anyOf must be an array of schemas")
        })?;
        if entries.is_empty() {
            return Err(QueryBuilderError::invalid_schema(
                ptr,
                "anyOf must not be empty",
            ));
        }
        let mut filters = Vec::new();
        let mut implies_exists = true;
        for (index, entry) in entries.iter().enumerate() {
            let branch = select.new_branch();
            let node =
                self.compile_node(entry, path, branch, variants, &format!("{ptr}/{index}"))?;
            branch.set_filter(node.filter.without_links());
            implies_exists &= node.implies_exists;
            filters.push(node.filter);
        }
        Ok(NodeFilter {
            filter: Filter::disjoin(filters),
            implies_exists,
        })
    }

    fn compile_links(
        &mut self,
        value: &Value,
        select: &mut SelectMap,
        variants: &mut Vec<LinkVariant>,
        ptr: &str,
    ) -> Result<NodeFilter> {
        let entries = value.as_object().ok_or_else(|| {
            QueryBuilderError::invalid_schema(ptr, "$$links must map link names to schemas")
        })?;
        let mut filters = Vec::new();
        for (name, link_schema) in entries {
            let index = self.variant_count;
            self.variant_count += 1;
            let mut link_path = Path::new();
            let link_select = select.get_link(name);
            let mut nested = Vec::new();
            let node = self.compile_node(
                link_schema,
                &mut link_path,
                link_select,
                &mut nested,
                &format!("{ptr}/{name}"),
            )?;
            let window = self
                .options
                .and_then(|options| options.links.get(name))
                .cloned()
                .unwrap_or_default();
            let join_alias = format!("linked{index}");
            variants.push(LinkVariant {
                index,
                name: name.clone(),
                links_alias: format!("links{index}"),
                join_alias: join_alias.clone(),
                filter: node.filter.clone(),
                select: link_select.clone(),
                window,
                nested,
            });
            filters.push(Filter::Link {
                name: name.clone(),
                join_alias,
                sub: Box::new(node.filter),
            });
        }
        Ok(NodeFilter::new(Filter::conjoin(filters)))
    }

    /// Compile `properties` and `required` together, emitting minimal
    /// existence checks, and guard the merged filter by `type = object` on
    /// JSONB paths.
    fn compile_properties(
        &mut self,
        obj: &Map<String, Value>,
        path: &mut Path,
        select: &mut SelectMap,
        variants: &mut Vec<LinkVariant>,
        permitted: &Option<Vec<String>>,
        ptr: &str,
    ) -> Result<Option<NodeFilter>> {
        let required = match obj.get("required") {
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| {
                    n.as_str().map(str::to_string).ok_or_else(|| {
                        QueryBuilderError::invalid_schema(
                            format!("{ptr}/required"),
                            "required entries must be strings",
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(QueryBuilderError::invalid_schema(
                    format!("{ptr}/required"),
                    "required must be an array",
                ));
            }
            None => Vec::new(),
        };
        let properties = match obj.get("properties") {
            Some(Value::Object(props)) => Some(props),
            Some(_) => {
                return Err(QueryBuilderError::invalid_schema(
                    format!("{ptr}/properties"),
                    "properties must be an object",
                ));
            }
            None => None,
        };
        if properties.is_none() && required.is_empty() {
            return Ok(None);
        }

        // Object keywords on a statically non-object value are vacuous.
        if !path.is_processing_table() && !path.is_json_context() {
            return Ok(Some(NodeFilter::new(Filter::Constant(true))));
        }

        // Required fields always stay in the projection so downstream
        // validators see a complete object.
        for name in &required {
            select.see(name);
        }

        let mut parts = Vec::new();
        let mut covered = Vec::new();

        if let Some(props) = properties {
            for (name, child_schema) in props {
                covered.push(name.clone());
                let child_ptr = format!("{ptr}/properties/{name}");
                let is_required = required.iter().any(|r| r == name);

                if path.is_processing_table() && name == VERSION_PROPERTY {
                    let node = self.compile_version_property(child_schema, &child_ptr)?;
                    select.see(name);
                    parts.push(node.filter);
                    continue;
                }

                if path.is_processing_table() && columns::column(name).is_none() {
                    return Err(QueryBuilderError::invalid_schema(
                        &child_ptr,
                        format!("unknown property '{name}'"),
                    ));
                }

                let segment = if path.is_processing_table() {
                    PathSegment::Column(name.clone())
                } else {
                    PathSegment::JsonProperty(name.clone())
                };
                path.push(segment);
                let child_select = select.see(name);
                let node =
                    self.compile_node(child_schema, path, child_select, variants, &child_ptr)?;
                let exists = existence_check(path);
                path.pop();

                let part = if is_required {
                    if node.implies_exists {
                        node.filter
                    } else {
                        exists.and_with(node.filter)
                    }
                } else if matches!(node.filter, Filter::Constant(true)) {
                    continue;
                } else {
                    // Absent properties pass vacuously.
                    exists.implies(node.filter)
                };
                parts.push(part);
            }
        }

        for name in &required {
            if covered.iter().any(|c| c == name) {
                continue;
            }
            if path.is_processing_table() {
                if name == VERSION_PROPERTY {
                    continue;
                }
                if columns::column(name).is_none() {
                    return Err(QueryBuilderError::invalid_schema(
                        format!("{ptr}/required"),
                        format!("unknown property '{name}'"),
                    ));
                }
                path.push(PathSegment::Column(name.clone()));
            } else {
                path.push(PathSegment::JsonProperty(name.clone()));
            }
            parts.push(existence_check(path));
            path.pop();
        }

        let merged = Filter::conjoin(parts);
        // Required names force the parent to exist only when the object
        // guard cannot make the merged filter vacuous.
        let implies_exists = !required.is_empty()
            && (path.is_processing_table()
                || matches!(permitted.as_deref(), Some([name]) if name.as_str() == "object"));

        let filter = if path.is_processing_table() || !path.is_json_context() {
            merged
        } else if matches!(permitted.as_deref(), Some([name]) if name.as_str() == "object") {
            // x AND (NOT x OR y) is x AND y: the object guard is already
            // conjoined by the type keyword.
            merged
        } else {
            Filter::IsOfJsonTypes {
                path: path.clone(),
                types: vec![JsonType::Object],
            }
            .implies(merged)
        };
        Ok(Some(NodeFilter {
            filter,
            implies_exists,
        }))
    }

    /// The virtual `version` property: equality against the decomposed
    /// version columns.
    fn compile_version_property(&self, schema: &Value, ptr: &str) -> Result<NodeFilter> {
        let obj = schema.as_object().ok_or_else(|| {
            QueryBuilderError::invalid_schema(ptr, "version schema must be an object")
        })?;
        let mut filters = Vec::new();
        for (keyword, value) in obj {
            match keyword.as_str() {
                "type" => {
                    let is_string = match value {
                        Value::String(s) => s == "string",
                        Value::Array(items) => items.iter().any(|i| i == "string"),
                        _ => false,
                    };
                    if !is_string {
                        filters.push(Filter::Constant(false));
                    }
                }
                "const" => filters.push(version_equals(value, ptr)?),
                "enum" => {
                    let entries = value.as_array().ok_or_else(|| {
                        QueryBuilderError::invalid_schema(ptr, "enum must be an array")
                    })?;
                    let alternatives = entries
                        .iter()
                        .map(|entry| version_equals(entry, ptr))
                        .collect::<Result<Vec<_>>>()?;
                    filters.push(Filter::disjoin(alternatives));
                }
                k if IGNORED_KEYWORDS.contains(&k) => {}
                other => {
                    return Err(QueryBuilderError::invalid_schema(
                        ptr,
                        format!("keyword '{other}' is not supported on version"),
                    ));
                }
            }
        }
        Ok(NodeFilter::exists(Filter::conjoin(filters)))
    }

    /// Wrap a scalar filter in its JSONB type guard, collapsing the guard
    /// when `type` already pins the path to exactly the guarded type.
    fn guard(
        &self,
        path: &Path,
        permitted: &Option<Vec<String>>,
        need: JsonType,
        filter: Filter,
    ) -> Filter {
        if path.is_processing_table() {
            // Scalar keywords on the row itself are vacuous.
            return Filter::Constant(true);
        }
        if !path.is_json_context() {
            // The column's static type decides applicability outright.
            return match path.static_json_type() {
                Some(actual) if actual == need => filter,
                Some(_) => Filter::Constant(true),
                None => filter,
            };
        }
        if let Some(names) = permitted {
            // `integer` pins the path to number as well.
            if names.len() == 1 && JsonType::parse(&names[0]) == Some(need) {
                return filter;
            }
        }
        Filter::IsOfJsonTypes {
            path: path.clone(),
            types: vec![need],
        }
        .implies(filter)
    }
}

/// Whether array elements at this path come out as JSONB values.
fn element_kind(path: &Path) -> bool {
    match path.head_column().map(|s| s.sql_type) {
        Some(SqlType::TextArray) if !path.is_processing_json_property() => false,
        _ => true,
    }
}

/// The minimal existence check for the value at `path`.
fn existence_check(path: &Path) -> Filter {
    if let Some(spec) = path.head_column() {
        if !path.is_processing_json_property() && !spec.nullable {
            return Filter::Constant(true);
        }
    }
    Filter::IsNull {
        path: path.clone(),
        negate: true,
    }
}

/// `{const: X}`, optionally with a `type` naming X's own JSON type,
/// qualifies for the containment optimization.
fn containment_constant(schema: &Value) -> Option<&Value> {
    let obj = schema.as_object()?;
    let constant = obj.get("const")?;
    for (key, value) in obj {
        match key.as_str() {
            "const" => {}
            "type" => {
                let name = value.as_str()?;
                let declared = JsonType::parse(name)?;
                if json_type_of(constant) != declared {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(constant)
}

fn json_type_of(value: &Value) -> JsonType {
    match value {
        Value::Null => JsonType::Null,
        Value::Bool(_) => JsonType::Boolean,
        Value::Number(_) => JsonType::Number,
        Value::String(_) => JsonType::String,
        Value::Array(_) => JsonType::Array,
        Value::Object(_) => JsonType::Object,
    }
}

fn version_equals(value: &Value, ptr: &str) -> Result<Filter> {
    let raw = value.as_str().ok_or_else(|| {
        QueryBuilderError::invalid_schema(ptr, "version values must be strings")
    })?;
    let version: Version = raw
        .parse()
        .map_err(|_| QueryBuilderError::invalid_schema(ptr, format!("invalid version '{raw}'")))?;
    let columns = [
        ("version_major", Value::from(version.major)),
        ("version_minor", Value::from(version.minor)),
        ("version_patch", Value::from(version.patch)),
        ("version_prerelease", Value::from(version.prerelease.clone())),
        ("version_build", Value::from(version.build.clone())),
    ];
    let parts = columns
        .into_iter()
        .map(|(column, value)| {
            let mut path = Path::new();
            path.push(PathSegment::Column(column.to_string()));
            Filter::Equals {
                path,
                values: vec![value],
            }
        })
        .collect();
    Ok(Filter::conjoin(parts))
}

fn parse_regex_keyword(value: &Value, ptr: &str) -> Result<(String, bool)> {
    match value {
        Value::String(pattern) => Ok((pattern.clone(), false)),
        Value::Object(obj) => {
            let pattern = obj
                .get("pattern")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    QueryBuilderError::invalid_schema(ptr, "regexp requires a pattern string")
                })?;
            let flags = obj.get("flags").and_then(Value::as_str).unwrap_or("");
            match flags {
                "" => Ok((pattern.to_string(), false)),
                "i" => Ok((pattern.to_string(), true)),
                other => Err(QueryBuilderError::invalid_schema(
                    ptr,
                    format!("unsupported regexp flags '{other}'"),
                )),
            }
        }
        _ => Err(QueryBuilderError::invalid_schema(
            ptr,
            "pattern must be a string",
        )),
    }
}

fn validate_regex(pattern: &str, ptr: &str) -> Result<()> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|_| QueryBuilderError::invalid_regular_expression(ptr, pattern))
}

fn number_value(value: &Value, ptr: &str) -> Result<serde_json::Number> {
    match value {
        Value::Number(n) => Ok(n.clone()),
        _ => Err(QueryBuilderError::invalid_schema(
            ptr,
            "expected a number",
        )),
    }
}

fn usize_value(value: &Value, ptr: &str) -> Result<usize> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| QueryBuilderError::invalid_schema(ptr, "expected a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactdb_storage::types::{SortDirection, WindowOptions};
    use serde_json::json;

    fn compile_sql(schema: Value) -> String {
        compile(&json!({}), &schema, &QueryOptions::default())
            .unwrap()
            .sql
    }

    #[test]
    fn full_text_search_emits_tsvector_and_tsquery() {
        let sql = compile_sql(json!({
            "anyOf": [{
                "properties": {
                    "name": {"type": "string", "fullTextSearch": {"term": "test"}}
                },
                "required": ["name"]
            }]
        }));
        assert!(sql.contains("to_tsvector('english'"));
        assert!(sql.contains("plainto_tsquery('english', 'test')"));
    }

    #[test]
    fn const_does_not_match_across_types() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {"checked": {"const": 1}}}}
        }));
        assert!(sql.contains("cards.data#>'{\"checked\"}' = '1'::jsonb"));
        assert!(!sql.contains("'\"1\"'::jsonb"));
    }

    #[test]
    fn pattern_over_jsonb_array_matches_every_element() {
        let sql = compile_sql(json!({
            "properties": {
                "data": {
                    "properties": {
                        "mirrors": {"type": "array", "items": {"pattern": "^https"}}
                    }
                }
            }
        }));
        // "all items match" compiles to "no element fails".
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM jsonb_array_elements("));
        assert!(sql.contains("~ '^https'"));
        // An absent mirrors array passes vacuously.
        assert!(sql.contains("cards.data#>'{\"mirrors\"}' IS NULL OR"));
    }

    #[test]
    fn format_maximum_requires_temporal_format() {
        let schema = json!({
            "properties": {
                "data": {
                    "properties": {
                        "timestamp": {
                            "type": "string",
                            "format": "date-time",
                            "formatMaximum": "2019-08-08T00:00:00.000Z"
                        }
                    }
                }
            }
        });
        let sql = compile_sql(schema);
        assert!(sql.contains("::timestamptz <= '2019-08-08T00:00:00.000Z'::timestamptz"));

        let err = compile(
            &json!({}),
            &json!({
                "properties": {"data": {"properties": {"x": {
                    "type": "string", "format": "email", "formatMaximum": "z"
                }}}}
            }),
            &QueryOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QueryBuilderError::InvalidSchema { .. }));
    }

    #[test]
    fn unknown_keyword_is_rejected_with_pointer() {
        let err = compile(
            &json!({}),
            &json!({"properties": {"data": {"frobnicate": true}}}),
            &QueryOptions::default(),
        )
        .unwrap_err();
        match err {
            QueryBuilderError::InvalidSchema { path, message } => {
                assert_eq!(path, "/properties/data");
                assert!(message.contains("frobnicate"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_top_level_property_is_rejected() {
        let err = compile(
            &json!({}),
            &json!({"properties": {"no_such_column": {"const": 1}}}),
            &QueryOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QueryBuilderError::InvalidSchema { .. }));
    }

    #[test]
    fn title_and_description_are_ignored() {
        let sql = compile_sql(json!({
            "title": "A view",
            "description": "All active cards",
            "properties": {"active": {"const": true}}
        }));
        assert!(sql.contains("cards.active = true"));
    }

    #[test]
    fn regexp_keyword_supports_case_insensitive_flag() {
        let sql = compile_sql(json!({
            "properties": {"slug": {"regexp": {"pattern": "^foo", "flags": "i"}}}
        }));
        assert!(sql.contains("cards.slug ~* '^foo'"));

        let err = compile(
            &json!({}),
            &json!({"properties": {"slug": {"regexp": {"pattern": "^foo", "flags": "gm"}}}}),
            &QueryOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QueryBuilderError::InvalidSchema { .. }));
    }

    #[test]
    fn malformed_regex_is_rejected() {
        let err = compile(
            &json!({}),
            &json!({"properties": {"slug": {"pattern": "(unclosed"}}}),
            &QueryOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QueryBuilderError::InvalidRegularExpression { .. }
        ));
    }

    #[test]
    fn limit_above_maximum_is_rejected_before_compilation() {
        let options = QueryOptions {
            window: WindowOptions {
                limit: Some(MAX_QUERY_LIMIT + 1),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = compile(&json!({}), &json!({"type": "object"}), &options).unwrap_err();
        assert!(matches!(err, QueryBuilderError::InvalidLimit { .. }));
    }

    #[test]
    fn type_integer_adds_integrality_check() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {"count": {"type": "integer"}}}}
        }));
        assert!(sql.contains("jsonb_typeof(cards.data#>'{\"count\"}') = 'number'"));
        assert!(sql.contains("% 1) = 0"));
    }

    #[test]
    fn pinned_type_collapses_scalar_guard() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {"n": {"type": "number", "maximum": 5}}}}
        }));
        // One typeof from the type keyword; no second guard for maximum.
        assert_eq!(sql.matches("jsonb_typeof").count(), 1);
        assert!(sql.contains("(cards.data#>>'{\"n\"}')::numeric <= 5"));
    }

    #[test]
    fn version_const_compares_decomposed_columns() {
        let sql = compile_sql(json!({
            "properties": {"version": {"const": "1.2.3-beta+001"}}
        }));
        assert!(sql.contains("cards.version_major = 1"));
        assert!(sql.contains("cards.version_minor = 2"));
        assert!(sql.contains("cards.version_patch = 3"));
        assert!(sql.contains("cards.version_prerelease = 'beta'"));
        assert!(sql.contains("cards.version_build = '001'"));
    }

    #[test]
    fn sort_by_version_emits_composite_keys() {
        let options = QueryOptions {
            window: WindowOptions {
                sort_by: Some(vec!["version".to_string()]),
                sort_dir: SortDirection::Asc,
                ..Default::default()
            },
            ..Default::default()
        };
        let sql = compile(&json!({}), &json!({"type": "object"}), &options)
            .unwrap()
            .sql;
        assert!(sql.contains("cards.version_prerelease ASC NULLS LAST"));
        assert!(sql.contains("cards.version_build ASC NULLS LAST"));
        assert!(!sql.contains("ORDER BY cards.version "));
    }

    #[test]
    fn nested_any_of_composes_with_outer_constraints() {
        let sql = compile_sql(json!({
            "type": "object",
            "anyOf": [{
                "anyOf": [
                    {"properties": {"active": {"const": true}}},
                    {"properties": {"name": {"const": "active"}}}
                ]
            }],
            "properties": {"slug": {"pattern": "^foo"}},
            "required": ["slug"]
        }));
        assert!(sql.contains("cards.active = true"));
        assert!(sql.contains("cards.name = 'active'"));
        assert!(sql.contains("cards.slug ~ '^foo'"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn contains_const_uses_containment_probe() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {"statuses": {
                "type": "array",
                "contains": {"const": "open", "type": "string"}
            }}}}
        }));
        assert!(sql.contains("cards.data#>'{\"statuses\"}' @> '[\"open\"]'::jsonb"));
        assert!(!sql.contains("jsonb_array_elements(cards.data#>'{\"statuses\"}')"));
    }

    #[test]
    fn contains_with_mismatched_type_falls_back_to_subquery() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {"statuses": {
                "contains": {"const": "open", "type": "number"}
            }}}}
        }));
        assert!(sql.contains("jsonb_array_elements"));
    }

    #[test]
    fn contains_on_text_array_column_unnests() {
        let sql = compile_sql(json!({
            "properties": {"tags": {"contains": {"const": "urgent"}}}
        }));
        assert!(sql.contains("EXISTS (SELECT 1 FROM unnest(cards.tags) AS contains0"));
        assert!(sql.contains("contains0 = 'urgent'"));
    }

    #[test]
    fn tuple_items_guard_per_index_and_length() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {"pair": {
                "additionalProperties": false,
                "items": [{"const": "a"}, {"type": "number"}]
            }}}}
        }));
        assert!(sql.contains("jsonb_array_length(cards.data#>'{\"pair\"}') > 0"));
        assert!(sql.contains("cards.data#>'{\"pair\",\"0\"}' = '\"a\"'::jsonb"));
        assert!(sql.contains("jsonb_array_length(cards.data#>'{\"pair\"}') = 2"));
    }

    #[test]
    fn required_without_properties_emits_existence_check() {
        let sql = compile_sql(json!({
            "properties": {"data": {"type": "object", "required": ["payload"]}}
        }));
        assert!(sql.contains("cards.data#>'{\"payload\"}' IS NOT NULL"));
    }

    #[test]
    fn optional_property_passes_vacuously() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {"x": {"minimum": 3}}}}
        }));
        assert!(sql.contains("cards.data#>'{\"x\"}' IS NULL OR"));
    }

    #[test]
    fn links_compile_to_two_stage_plan() {
        let sql = compile_sql(json!({
            "type": "object",
            "properties": {"type": {"const": "issue@1.0.0"}},
            "$$links": {
                "is attached to": {
                    "type": "object",
                    "properties": {"active": {"const": true}}
                }
            }
        }));
        assert_eq!(sql.matches("MATERIALIZED").count(), 2);
        assert!(sql.contains("(SELECT id FROM strings WHERE string = 'is attached to')"));
        assert!(sql.contains("linked0.active = true"));
        assert!(sql.contains("jsonb_build_object('links'"));
    }

    #[test]
    fn link_window_options_apply_per_link_type() {
        let mut options = QueryOptions::default();
        options.links.insert(
            "is attached to".to_string(),
            WindowOptions {
                skip: 1,
                limit: Some(2),
                ..Default::default()
            },
        );
        let sql = compile(
            &json!({}),
            &json!({"$$links": {"is attached to": {"type": "object"}}}),
            &options,
        )
        .unwrap()
        .sql;
        assert!(sql.contains("linked.rn > 1 AND linked.rn <= 3"));
    }

    #[test]
    fn injected_key_names_stay_quoted() {
        let sql = compile_sql(json!({
            "properties": {"data": {"properties": {
                "'); DROP TABLE cards; --": {"const": 1}
            }}}
        }));
        assert!(!sql.contains("'); DROP TABLE cards; --'::"));
        // The quote is doubled inside the rendered path literal.
        assert!(sql.contains("''"));
    }

    #[test]
    fn row_filter_compiles_bare_predicate() {
        let predicate = compile_row_filter(&json!({
            "properties": {"type": {"const": "message@1.0.0"}}
        }))
        .unwrap();
        assert_eq!(predicate, "cards.type = 'message@1.0.0'");
    }

    #[test]
    fn boolean_schemas_compile_to_constants() {
        assert_eq!(compile_row_filter(&json!(true)).unwrap(), "true");
        assert_eq!(compile_row_filter(&json!(false)).unwrap(), "false");
    }

    #[test]
    fn one_of_compiles_like_any_of() {
        let any = compile_sql(json!({
            "anyOf": [
                {"properties": {"active": {"const": true}}},
                {"properties": {"active": {"const": false}}}
            ]
        }));
        let one = compile_sql(json!({
            "oneOf": [
                {"properties": {"active": {"const": true}}},
                {"properties": {"active": {"const": false}}}
            ]
        }));
        assert_eq!(any, one);
    }
}
