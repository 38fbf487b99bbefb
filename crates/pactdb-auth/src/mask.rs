//! Permission mask composition.
//!
//! Given a session, materializes the effective JSON-Schema mask from the
//! actor's roles, organization markers and session scope. The mask is merged
//! into the caller's query — recursively into every `$$links` subtree — so a
//! contract is only ever visible through a join if the mask alone would have
//! admitted it.
//!
//! Composition is conservative: when no role produces a readable view, the
//! result is the match-nothing schema, guaranteeing deny-by-default.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use pactdb_core::{Contract, Version};
use pactdb_storage::StorageError;

use crate::error::{AuthError, Result};
use crate::merge;
use crate::template;

/// The actor that bypasses marker restrictions.
const ADMIN_SLUG: &str = "user-admin";

/// Version under which role contracts are published.
fn role_version() -> Version {
    Version::new(1, 0, 0)
}

/// Read access the composer needs; implemented by the storage backend.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> std::result::Result<Option<Contract>, StorageError>;

    async fn get_by_slug(
        &self,
        slug: &str,
        version: &Version,
    ) -> std::result::Result<Option<Contract>, StorageError>;

    /// Organizations linked to the actor through `has member`.
    async fn organizations_of(
        &self,
        actor: &Contract,
    ) -> std::result::Result<Vec<Contract>, StorageError>;
}

/// The composed mask for one session.
#[derive(Debug, Clone)]
pub struct SessionMask {
    /// The effective mask schema.
    pub schema: Value,
    /// The session's actor, used as template context for caller schemas.
    pub actor: Contract,
}

impl SessionMask {
    /// Merge the mask into a caller query, pushing it into every `$$links`
    /// subtree first.
    pub fn apply(&self, caller_schema: &Value) -> Value {
        let context = self.template_context();
        let evaluated = template::evaluate(caller_schema, &context);
        let masked_links = merge::merge_mask_in_links(&evaluated, &self.schema);
        merge::deep_merge(self.schema.clone(), masked_links)
    }

    fn template_context(&self) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert(
            "user".to_string(),
            serde_json::to_value(&self.actor).unwrap_or(Value::Null),
        );
        context
    }
}

/// The schema that matches nothing.
fn match_nothing() -> Value {
    json!({"type": "object", "additionalProperties": false})
}

/// Compose the mask for `session_id`.
pub async fn compose(reader: &dyn ContractReader, session_id: Uuid) -> Result<SessionMask> {
    let session = reader
        .get_by_id(session_id)
        .await?
        .ok_or_else(|| AuthError::invalid_session(session_id.to_string()))?;
    validate_session(&session)?;

    let actor_id: Uuid = session
        .data
        .get("actor")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AuthError::invalid_session(session_id.to_string()))?;
    let actor = reader
        .get_by_id(actor_id)
        .await?
        .ok_or_else(|| AuthError::no_element("contract", actor_id.to_string()))?;

    let views = load_role_views(reader, &actor).await?;
    let mut schema = if views.is_empty() {
        match_nothing()
    } else {
        json!({"type": "object", "anyOf": views})
    };

    if let Some(markers) = marker_constraint(reader, &actor).await? {
        schema = merge::deep_merge(
            schema,
            json!({
                "type": "object",
                "properties": {"markers": markers},
                "required": ["markers"],
            }),
        );
    }

    if let Some(scope) = session.data.get("scope") {
        if scope.as_object().is_some_and(|s| !s.is_empty()) {
            schema = merge::deep_merge(schema, scope.clone());
        }
    }

    tracing::debug!(actor = %actor.slug, "composed session mask");
    Ok(SessionMask { schema, actor })
}

fn validate_session(session: &Contract) -> Result<()> {
    if !session.active {
        return Err(AuthError::invalid_session(session.id.to_string()));
    }
    if let Some(expiration) = session.data.get("expiration").and_then(Value::as_str) {
        let expires_at: DateTime<Utc> = expiration
            .parse()
            .map_err(|_| AuthError::invalid_session(session.id.to_string()))?;
        if expires_at <= Utc::now() {
            return Err(AuthError::session_expired(session.id.to_string()));
        }
    }
    Ok(())
}

/// Load and evaluate the read views of the actor's roles. Missing role
/// contracts are skipped.
async fn load_role_views(reader: &dyn ContractReader, actor: &Contract) -> Result<Vec<Value>> {
    let mut role_slugs = vec![actor.slug.clone()];
    if let Some(roles) = actor.data.get("roles").and_then(Value::as_array) {
        role_slugs.extend(roles.iter().filter_map(Value::as_str).map(str::to_string));
    }

    let mut context = Map::new();
    context.insert(
        "user".to_string(),
        serde_json::to_value(actor).map_err(|e| StorageError::internal(e.to_string()))?,
    );

    let mut views = Vec::new();
    for role_slug in role_slugs {
        let slug = format!("role-{role_slug}");
        let Some(role) = reader.get_by_slug(&slug, &role_version()).await? else {
            tracing::debug!(role = %slug, "role contract not found, skipping");
            continue;
        };
        let Some(read) = role.data.get("read") else {
            continue;
        };
        let mut view = template::evaluate(read, &context);
        if let Some(obj) = view.as_object_mut() {
            obj.remove("$id");
        }
        views.push(view);
    }
    Ok(views)
}

/// The constraint on the `markers` column: every marker must be owned by
/// the actor directly or through one of its organizations. The admin actor
/// is unrestricted.
async fn marker_constraint(
    reader: &dyn ContractReader,
    actor: &Contract,
) -> Result<Option<Value>> {
    if actor.slug == ADMIN_SLUG {
        return Ok(None);
    }
    let organizations = reader.organizations_of(actor).await?;
    let mut markers = vec![actor.slug.clone()];
    markers.extend(organizations.into_iter().map(|org| org.slug));
    markers.sort();
    markers.dedup();

    if markers.is_empty() {
        // Only contracts without markers are visible.
        return Ok(Some(json!({"type": "array", "maxItems": 0})));
    }

    let escaped: Vec<String> = markers.iter().map(|m| escape_regex(m)).collect();
    let compound = format!("(^|\\+)({})($|\\+)", escaped.join("|"));
    Ok(Some(json!({
        "type": "array",
        "items": {
            "anyOf": [
                {"enum": markers},
                {"pattern": compound},
            ]
        }
    })))
}

fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if "\\^$.|?*+()[]{}".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
