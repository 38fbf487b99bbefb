//! The contract model.
//!
//! Contracts are the single entity kind in the store: a fixed set of header
//! columns plus a free-form `data` JSONB payload. Links between contracts are
//! themselves contracts of type `link@1.0.0` whose `data` names the two
//! endpoints; the storage layer additionally materializes them as directed
//! edges for index locality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CoreError;
use crate::version::Version;

/// The versioned type slug of link contracts.
pub const LINK_TYPE: &str = "link@1.0.0";

/// A contract: one row of the `cards` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    pub slug: String,
    #[serde(default)]
    pub version: Version,
    #[serde(rename = "type")]
    pub contract_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub markers: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub requires: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub capabilities: Vec<Value>,
    #[serde(default)]
    pub linked_at: Map<String, Value>,
    #[serde(default)]
    pub links: Map<String, Value>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

fn default_active() -> bool {
    true
}

impl Contract {
    pub fn new(slug: impl Into<String>, contract_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            version: Version::new(1, 0, 0),
            contract_type: contract_type.into(),
            name: None,
            tags: Vec::new(),
            markers: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
            active: true,
            requires: Vec::new(),
            capabilities: Vec::new(),
            linked_at: Map::new(),
            links: Map::new(),
            data: Map::new(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_markers(mut self, markers: Vec<String>) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// The base type without version suffix, e.g. `link` for `link@1.0.0`.
    pub fn base_type(&self) -> &str {
        self.contract_type
            .split_once('@')
            .map_or(self.contract_type.as_str(), |(base, _)| base)
    }

    pub fn is_link(&self) -> bool {
        self.base_type() == "link"
    }

    /// Interpret this contract as a link, if it is one.
    pub fn as_link(&self) -> Result<LinkReference, CoreError> {
        if !self.is_link() {
            return Err(CoreError::no_element("link", self.slug.clone()));
        }
        let name = self
            .name
            .clone()
            .ok_or_else(|| CoreError::no_element("link name", self.slug.clone()))?;
        let inverse_name = self
            .data
            .get("inverseName")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::no_element("link inverseName", self.slug.clone()))?
            .to_string();
        let from = LinkEndpoint::from_value(self.data.get("from"))
            .ok_or_else(|| CoreError::no_element("link from", self.slug.clone()))?;
        let to = LinkEndpoint::from_value(self.data.get("to"))
            .ok_or_else(|| CoreError::no_element("link to", self.slug.clone()))?;
        Ok(LinkReference {
            name,
            inverse_name,
            from,
            to,
        })
    }
}

/// One endpoint of a link: the linked contract's id and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub contract_type: String,
}

impl LinkEndpoint {
    fn from_value(value: Option<&Value>) -> Option<Self> {
        let obj = value?.as_object()?;
        let id = obj.get("id")?.as_str()?.parse().ok()?;
        let contract_type = obj.get("type")?.as_str()?.to_string();
        Some(Self { id, contract_type })
    }
}

/// A link contract decomposed into its relation names and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    pub name: String,
    pub inverse_name: String,
    pub from: LinkEndpoint,
    pub to: LinkEndpoint,
}
