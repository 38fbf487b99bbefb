//! The column capability table.
//!
//! The compiler hard-codes the shape of the `cards` table: for every column
//! it knows the JSON type the column presents to schemas, whether the column
//! is a SQL array of some JSON type, its native SQL type (which drives cast
//! choice), and whether it is nullable.

/// The six JSONB value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JsonType {
    String,
    Number,
    Boolean,
    Null,
    Array,
    Object,
}

impl JsonType {
    /// The name used by the `type` schema keyword and by `jsonb_typeof`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Parse a `type` keyword value. `integer` maps to `Number`; the
    /// caller adds the integrality constraint separately.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" | "integer" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

/// Native SQL type of a column; drives the cast applied to literals
/// compared against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Uuid,
    Text,
    Integer,
    Boolean,
    Timestamp,
    Jsonb,
    TextArray,
    JsonbArray,
}

/// Capability record for one column of the `cards` table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// The JSON type the column presents at schema level.
    pub json_type: JsonType,
    /// When the column is a SQL array, the JSON type of its items.
    pub array_item: Option<JsonType>,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl ColumnSpec {
    /// Whether schemas can descend into this column's contents with
    /// JSONB path operators.
    pub fn is_jsonb(&self) -> bool {
        self.sql_type == SqlType::Jsonb
    }

    /// Whether the column is a SQL array (text[] or jsonb[]).
    pub fn is_array(&self) -> bool {
        self.array_item.is_some()
    }
}

/// The primary table.
pub const TABLE: &str = "cards";
/// The directed link-edge table.
pub const LINKS_TABLE: &str = "links";
/// The string-intern table for link names.
pub const STRINGS_TABLE: &str = "strings";

/// The virtual `version` property, recomposed from the five version columns.
pub const VERSION_PROPERTY: &str = "version";

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "id",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Uuid,
        nullable: false,
    },
    ColumnSpec {
        name: "slug",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Text,
        nullable: false,
    },
    ColumnSpec {
        name: "version_major",
        json_type: JsonType::Number,
        array_item: None,
        sql_type: SqlType::Integer,
        nullable: false,
    },
    ColumnSpec {
        name: "version_minor",
        json_type: JsonType::Number,
        array_item: None,
        sql_type: SqlType::Integer,
        nullable: false,
    },
    ColumnSpec {
        name: "version_patch",
        json_type: JsonType::Number,
        array_item: None,
        sql_type: SqlType::Integer,
        nullable: false,
    },
    ColumnSpec {
        name: "version_prerelease",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Text,
        nullable: false,
    },
    ColumnSpec {
        name: "version_build",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Text,
        nullable: false,
    },
    ColumnSpec {
        name: "type",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Text,
        nullable: false,
    },
    ColumnSpec {
        name: "name",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Text,
        nullable: true,
    },
    ColumnSpec {
        name: "tags",
        json_type: JsonType::Array,
        array_item: Some(JsonType::String),
        sql_type: SqlType::TextArray,
        nullable: false,
    },
    ColumnSpec {
        name: "markers",
        json_type: JsonType::Array,
        array_item: Some(JsonType::String),
        sql_type: SqlType::TextArray,
        nullable: false,
    },
    ColumnSpec {
        name: "created_at",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Timestamp,
        nullable: false,
    },
    ColumnSpec {
        name: "updated_at",
        json_type: JsonType::String,
        array_item: None,
        sql_type: SqlType::Timestamp,
        nullable: true,
    },
    ColumnSpec {
        name: "active",
        json_type: JsonType::Boolean,
        array_item: None,
        sql_type: SqlType::Boolean,
        nullable: false,
    },
    ColumnSpec {
        name: "requires",
        json_type: JsonType::Array,
        array_item: Some(JsonType::Object),
        sql_type: SqlType::JsonbArray,
        nullable: false,
    },
    ColumnSpec {
        name: "capabilities",
        json_type: JsonType::Array,
        array_item: Some(JsonType::Object),
        sql_type: SqlType::JsonbArray,
        nullable: false,
    },
    ColumnSpec {
        name: "linked_at",
        json_type: JsonType::Object,
        array_item: None,
        sql_type: SqlType::Jsonb,
        nullable: false,
    },
    ColumnSpec {
        name: "links",
        json_type: JsonType::Object,
        array_item: None,
        sql_type: SqlType::Jsonb,
        nullable: false,
    },
    ColumnSpec {
        name: "data",
        json_type: JsonType::Object,
        array_item: None,
        sql_type: SqlType::Jsonb,
        nullable: false,
    },
];

/// Look up the capability record for a column.
pub fn column(name: &str) -> Option<&'static ColumnSpec> {
    COLUMNS.iter().find(|c| c.name == name)
}

/// All columns, in table order.
pub fn all_columns() -> &'static [ColumnSpec] {
    COLUMNS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_columns_resolve() {
        assert!(column("data").unwrap().is_jsonb());
        assert!(column("tags").unwrap().is_array());
        assert_eq!(column("active").unwrap().json_type, JsonType::Boolean);
        assert!(column("name").unwrap().nullable);
        assert!(column("nonexistent").is_none());
    }

    #[test]
    fn jsonb_array_columns_carry_item_type() {
        let requires = column("requires").unwrap();
        assert_eq!(requires.array_item, Some(JsonType::Object));
        assert_eq!(requires.sql_type, SqlType::JsonbArray);
        assert!(!requires.is_jsonb());
    }

    #[test]
    fn integer_keyword_parses_to_number() {
        assert_eq!(JsonType::parse("integer"), Some(JsonType::Number));
        assert_eq!(JsonType::parse("bogus"), None);
    }
}
