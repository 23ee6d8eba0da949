//! Resource lifecycle orchestration.
//!
//! A [`ResourceSpec`] declares one resource kind: its schema, its
//! endpoints, where its ID and status live in response documents, which
//! business error codes mean absence, and how to wait for its asynchronous
//! transitions. The [`Orchestrator`] composes the client, waiter, paginator
//! and reconciler into the four verbs, so adapters configure behavior
//! instead of re-implementing control flow per resource.
//!
//! Consistency is arbitrated by the control plane; the only client-side
//! serialization is a per-resource-ID lock keeping one resource's update
//! and delete strictly ordered. Independent resources are driven
//! concurrently with no shared state beyond the connection pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value};

use crate::classify::{apply_rules, NotFoundRule};
use crate::client::{ApiRequest, RestClient};
use crate::error::ProviderError;
use crate::paginate::Paginator;
use crate::path::path_str;
use crate::reconcile::{diff_tags, sync, SetOps, Tag};
use crate::schema::Schema;
use crate::validation::{has_errors, immutable_violations, validate};
use crate::waiter::{StateRefresh, StateWaiter, WaitConfig};

/// One REST endpoint of a resource.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    /// HTTP method.
    pub method: Method,
    /// Path template; `{id}` is substituted with the resource ID and other
    /// placeholders from the spec's params.
    pub path: String,
    /// Status codes treated as success.
    pub ok_codes: Vec<u16>,
    /// Wrap the request body under this key (`{"network": {...}}`).
    pub body_root: Option<String>,
}

impl EndpointSpec {
    /// An endpoint with the default success codes.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ok_codes: vec![200, 201, 202, 204],
            body_root: None,
        }
    }

    /// Override the success codes.
    pub fn with_ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    /// Wrap request bodies under `root`.
    pub fn with_body_root(mut self, root: impl Into<String>) -> Self {
        self.body_root = Some(root.into());
        self
    }

    fn request(&self, id: Option<&str>, params: &HashMap<String, String>) -> ApiRequest {
        let mut request =
            ApiRequest::new(self.method.clone(), self.path.clone()).ok_codes(&self.ok_codes);
        if let Some(id) = id {
            request = request.path_param("id", id);
        }
        for (name, value) in params {
            request = request.path_param(name.clone(), value.clone());
        }
        request
    }

    fn wrap(&self, body: Value) -> Value {
        match &self.body_root {
            Some(root) => {
                let mut map = Map::new();
                map.insert(root.clone(), body);
                Value::Object(map)
            }
            None => body,
        }
    }
}

/// How the current state of a resource is fetched.
#[derive(Debug, Clone)]
pub enum ReadStrategy {
    /// A GET of the resource itself.
    Get(EndpointSpec),
    /// List-only APIs: collect every record and filter client-side by ID.
    List {
        /// The list endpoint.
        endpoint: EndpointSpec,
        /// Pagination over the list endpoint.
        paginator: Paginator,
        /// Path of the ID within each record.
        match_path: String,
    },
}

/// An independently-mutable attribute group with its own endpoint.
///
/// Some attribute groups map to entirely different endpoints (core fields
/// vs. bindings vs. tags); update issues one call per changed group.
#[derive(Debug, Clone)]
pub struct UpdateGroup {
    /// Attribute names belonging to this group.
    pub fields: Vec<String>,
    /// The endpoint mutating this group.
    pub endpoint: EndpointSpec,
}

impl UpdateGroup {
    /// A group over `fields` converging through `endpoint`.
    pub fn new(fields: &[&str], endpoint: EndpointSpec) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            endpoint,
        }
    }

    fn changed(&self, prior: &Value, desired: &Value) -> bool {
        self.fields.iter().any(|field| {
            let before = prior.get(field).unwrap_or(&Value::Null);
            let after = desired.get(field).unwrap_or(&Value::Null);
            before != after
        })
    }

    fn body(&self, desired: &Value) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            if let Some(value) = desired.get(field) {
                if !value.is_null() {
                    map.insert(field.clone(), value.clone());
                }
            }
        }
        Value::Object(map)
    }
}

/// Tag convergence endpoints for a resource kind.
#[derive(Debug, Clone)]
pub struct TagSpec {
    /// Attribute holding the tag map in desired state.
    pub field: String,
    /// Endpoint adding tags.
    pub add: EndpointSpec,
    /// Endpoint removing tags.
    pub remove: EndpointSpec,
}

/// Status classification and timing for a resource's asynchronous
/// transitions.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    /// Path of the status field in the read document.
    pub status_path: String,
    /// Statuses meaning the resource is usable.
    pub available: Vec<String>,
    /// Terminal failure statuses.
    pub failed: Vec<String>,
    /// Soft-delete terminal statuses, treated as absence.
    pub deleted: Vec<String>,
    /// Waiter timing for availability waits.
    pub create: WaitConfig,
    /// Waiter timing for deletion waits.
    pub delete: WaitConfig,
}

impl WaitSpec {
    /// A wait spec over `status_path` with the given status sets and
    /// default timing.
    pub fn new(
        status_path: impl Into<String>,
        available: &[&str],
        failed: &[&str],
        deleted: &[&str],
    ) -> Self {
        let status_path = status_path.into();
        let create = WaitConfig::for_available(&status_path, available, failed);
        let delete = WaitConfig::for_deleted(&status_path, deleted);
        Self {
            status_path,
            available: available.iter().map(|s| s.to_string()).collect(),
            failed: failed.iter().map(|s| s.to_string()).collect(),
            deleted: deleted.iter().map(|s| s.to_string()).collect(),
            create,
            delete,
        }
    }

    /// Replace the availability-wait timing.
    pub fn with_create_timing(mut self, config: WaitConfig) -> Self {
        self.create = config;
        self
    }

    /// Replace the deletion-wait timing.
    pub fn with_delete_timing(mut self, config: WaitConfig) -> Self {
        self.delete = config;
        self
    }
}

/// Declarative description of one resource kind.
#[derive(Clone)]
pub struct ResourceSpec {
    /// Resource kind name, used in error messages and logs.
    pub name: String,
    /// Schema of the desired-state document.
    pub schema: Schema,
    /// Create endpoint.
    pub create: EndpointSpec,
    /// Read strategy.
    pub read: ReadStrategy,
    /// Delete endpoint.
    pub delete: EndpointSpec,
    /// Attribute groups updated in place, in order.
    pub update_groups: Vec<UpdateGroup>,
    /// Tag convergence endpoints, if the resource is taggable.
    pub tags: Option<TagSpec>,
    /// Path of the new ID in the create response.
    pub id_path: String,
    /// Business error codes meaning absence for this resource family.
    pub not_found: Vec<NotFoundRule>,
    /// Asynchronous transition handling; `None` for synchronous resources.
    pub wait: Option<WaitSpec>,
    /// Extra path parameters substituted into every endpoint
    /// (`{project_id}` scope and the like).
    pub params: HashMap<String, String>,
}

impl ResourceSpec {
    /// A synchronous resource with conventional CRUD endpoints.
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        create: EndpointSpec,
        read: ReadStrategy,
        delete: EndpointSpec,
        id_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            create,
            read,
            delete,
            update_groups: Vec::new(),
            tags: None,
            id_path: id_path.into(),
            not_found: Vec::new(),
            wait: None,
            params: HashMap::new(),
        }
    }

    /// Add an update group.
    pub fn with_update_group(mut self, group: UpdateGroup) -> Self {
        self.update_groups.push(group);
        self
    }

    /// Make the resource taggable.
    pub fn with_tags(mut self, tags: TagSpec) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Declare business error codes meaning absence.
    pub fn with_not_found_rules(mut self, rules: Vec<NotFoundRule>) -> Self {
        self.not_found = rules;
        self
    }

    /// Make the resource asynchronous.
    pub fn with_wait(mut self, wait: WaitSpec) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Add a path parameter substituted into every endpoint.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Parse a composite import identifier, delimited by `/`, into the named
/// fields required to read the resource without a prior create.
///
/// A single-field import takes the identifier verbatim, slashes included.
pub fn parse_import_id(raw: &str, fields: &[&str]) -> Result<HashMap<String, String>, ProviderError> {
    if fields.len() == 1 {
        if raw.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "import identifier must not be empty".to_string(),
            ));
        }
        return Ok(HashMap::from([(fields[0].to_string(), raw.to_string())]));
    }

    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != fields.len() || parts.iter().any(|p| p.is_empty()) {
        return Err(ProviderError::InvalidRequest(format!(
            "invalid import identifier {raw:?}, expected format {}",
            fields.join("/")
        )));
    }
    Ok(fields
        .iter()
        .zip(parts)
        .map(|(field, part)| (field.to_string(), part.to_string()))
        .collect())
}

/// Drives the lifecycle verbs for any [`ResourceSpec`].
pub struct Orchestrator {
    client: RestClient,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Polls the current resource state through [`Orchestrator::read`],
/// reporting absence as NotFound for the waiter's absence policy.
struct ReadRefresh<'a> {
    orchestrator: &'a Orchestrator,
    spec: &'a ResourceSpec,
    id: &'a str,
}

#[async_trait]
impl StateRefresh for ReadRefresh<'_> {
    async fn refresh(&self) -> Result<Value, ProviderError> {
        match self.orchestrator.read(self.spec, self.id).await? {
            Some(document) => Ok(document),
            None => Err(ProviderError::NotFound(format!(
                "{} {} is gone",
                self.spec.name, self.id
            ))),
        }
    }
}

impl Orchestrator {
    /// Create an orchestrator over `client`.
    pub fn new(client: RestClient) -> Self {
        Self {
            client,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying client, for ad-hoc calls outside the verbs.
    pub fn client(&self) -> &RestClient {
        &self.client
    }

    /// Lazily created lock serializing one resource's mutations.
    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Create the resource described by `config`.
    ///
    /// Validates against the schema, fills defaults, strips computed
    /// fields, issues the create call, extracts the new ID, waits for an
    /// available state when the resource is asynchronous, and returns the
    /// result of a fresh read.
    pub async fn create(
        &self,
        spec: &ResourceSpec,
        config: &Value,
    ) -> Result<(String, Value), ProviderError> {
        let diagnostics = validate(&spec.schema, config);
        if has_errors(&diagnostics) {
            let summaries: Vec<String> = diagnostics.iter().map(|d| d.summary.clone()).collect();
            return Err(ProviderError::Validation(format!(
                "invalid {} configuration: {}",
                spec.name,
                summaries.join("; ")
            )));
        }

        let body = spec
            .schema
            .strip_computed(&spec.schema.apply_defaults(config));
        let request = spec
            .create
            .request(None, &spec.params)
            .json_body(spec.create.wrap(body));

        tracing::info!(resource = %spec.name, "creating resource");
        let response = self
            .client
            .execute(&request)
            .await
            .map_err(|e| e.in_step(&format!("error creating {}", spec.name)))?;

        let id = path_str(&spec.id_path, &response, "");
        if id.is_empty() {
            return Err(ProviderError::OperationFailed(format!(
                "error creating {}: no ID at {} in create response",
                spec.name, spec.id_path
            )));
        }
        tracing::info!(resource = %spec.name, %id, "resource created");

        if let Some(wait) = &spec.wait {
            let refresh = ReadRefresh {
                orchestrator: self,
                spec,
                id: &id,
            };
            StateWaiter::new(&refresh, &wait.create)
                .wait()
                .await
                .map_err(|e| {
                    e.in_step(&format!("error waiting for {} ({id}) to be ready", spec.name))
                })?;
        }

        match self.read(spec, &id).await? {
            Some(document) => Ok((id, document)),
            None => Err(ProviderError::NotFound(format!(
                "{} {} not found immediately after create",
                spec.name, id
            ))),
        }
    }

    /// Fetch the current state of the resource.
    ///
    /// Absence (a true 404, a listed business error code, a soft-delete
    /// status, or a list that does not contain the ID) is `Ok(None)`,
    /// never an error; every read re-fetches from the control plane.
    pub async fn read(
        &self,
        spec: &ResourceSpec,
        id: &str,
    ) -> Result<Option<Value>, ProviderError> {
        let document = match &spec.read {
            ReadStrategy::Get(endpoint) => {
                let request = endpoint.request(Some(id), &spec.params);
                match self.client.execute(&request).await {
                    Ok(document) => document,
                    Err(err) => {
                        let err = apply_rules(err, &spec.not_found);
                        if err.is_not_found() {
                            return Ok(None);
                        }
                        return Err(err.in_step(&format!("error retrieving {}", spec.name)));
                    }
                }
            }
            ReadStrategy::List {
                endpoint,
                paginator,
                match_path,
            } => {
                let template = endpoint.request(None, &spec.params);
                let records = paginator
                    .collect_all(&self.client, &template)
                    .await
                    .map_err(|e| e.in_step(&format!("error listing {}", spec.name)))?;
                match records
                    .into_iter()
                    .find(|record| path_str(match_path, record, "") == id)
                {
                    Some(record) => record,
                    None => return Ok(None),
                }
            }
        };

        // A terminal soft-delete status reads as absence.
        if let Some(wait) = &spec.wait {
            let status = path_str(&wait.status_path, &document, "");
            if wait.deleted.iter().any(|s| s == &status) {
                tracing::debug!(resource = %spec.name, %id, %status, "soft-deleted, treating as absent");
                return Ok(None);
            }
        }

        Ok(Some(document))
    }

    /// Converge the resource from `prior` to `desired`.
    ///
    /// Immutable-attribute changes are refused. Each changed attribute
    /// group gets its own call; tag sets are converged through diff-based
    /// remove-then-add. Returns the result of a fresh read. Serialized
    /// against this resource's delete.
    pub async fn update(
        &self,
        spec: &ResourceSpec,
        id: &str,
        prior: &Value,
        desired: &Value,
    ) -> Result<Value, ProviderError> {
        let violations = immutable_violations(&spec.schema, prior, desired);
        if !violations.is_empty() {
            return Err(ProviderError::Validation(format!(
                "cannot update {} ({id}): attributes [{}] are immutable after create",
                spec.name,
                violations.join(", ")
            )));
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        for group in &spec.update_groups {
            if !group.changed(prior, desired) {
                continue;
            }
            tracing::info!(resource = %spec.name, %id, fields = ?group.fields, "updating attribute group");
            let request = group
                .endpoint
                .request(Some(id), &spec.params)
                .json_body(group.endpoint.wrap(group.body(desired)));
            self.client.execute(&request).await.map_err(|e| {
                apply_rules(e, &spec.not_found)
                    .in_step(&format!("error updating {} ({id})", spec.name))
            })?;
        }

        if let Some(tags) = &spec.tags {
            let previous = tag_pairs(prior.get(&tags.field));
            let wanted = tag_pairs(desired.get(&tags.field));
            let diff = diff_tags(&previous, &wanted);
            if !diff.is_empty() {
                tracing::info!(resource = %spec.name, %id,
                    add = diff.to_add.len(), remove = diff.to_remove.len(),
                    "reconciling tags");
                let ops = TagEndpointOps {
                    client: &self.client,
                    spec: tags,
                    params: &spec.params,
                    id,
                };
                sync(&ops, &diff)
                    .await
                    .map_err(|e| e.in_step(&format!("error reconciling tags of {} ({id})", spec.name)))?;
            }
        }

        drop(_guard);

        match self.read(spec, id).await? {
            Some(document) => Ok(document),
            None => Err(ProviderError::NotFound(format!(
                "{} {} disappeared during update",
                spec.name, id
            ))),
        }
    }

    /// Delete the resource.
    ///
    /// Absence at any point is success: a NotFound on the delete call means
    /// already gone, and for asynchronous resources the deletion wait
    /// treats absence as its success condition. Serialized against this
    /// resource's update.
    pub async fn delete(&self, spec: &ResourceSpec, id: &str) -> Result<(), ProviderError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        tracing::info!(resource = %spec.name, %id, "deleting resource");
        let request = spec.delete.request(Some(id), &spec.params);
        if let Err(err) = self.client.execute(&request).await {
            let err = apply_rules(err, &spec.not_found);
            if err.is_not_found() {
                tracing::debug!(resource = %spec.name, %id, "already deleted");
                return Ok(());
            }
            return Err(err.in_step(&format!("error deleting {} ({id})", spec.name)));
        }

        if let Some(wait) = &spec.wait {
            let refresh = ReadRefresh {
                orchestrator: self,
                spec,
                id,
            };
            StateWaiter::new(&refresh, &wait.delete)
                .wait()
                .await
                .map_err(|e| {
                    e.in_step(&format!("error waiting for {} ({id}) to be deleted", spec.name))
                })?;
        }
        Ok(())
    }
}

/// [`SetOps`] over a resource's tag endpoints. Bodies follow the
/// `{"tags": [{"key": ..., "value": ...}]}` action convention.
struct TagEndpointOps<'a> {
    client: &'a RestClient,
    spec: &'a TagSpec,
    params: &'a HashMap<String, String>,
    id: &'a str,
}

impl TagEndpointOps<'_> {
    async fn call(&self, endpoint: &EndpointSpec, members: &[Tag]) -> Result<(), ProviderError> {
        let tags: Vec<Value> = members
            .iter()
            .map(|(key, value)| {
                let mut tag = Map::new();
                tag.insert("key".to_string(), Value::String(key.clone()));
                tag.insert("value".to_string(), Value::String(value.clone()));
                Value::Object(tag)
            })
            .collect();
        let mut body = Map::new();
        body.insert("tags".to_string(), Value::Array(tags));

        let request = endpoint
            .request(Some(self.id), self.params)
            .json_body(endpoint.wrap(Value::Object(body)));
        self.client.execute(&request).await?;
        Ok(())
    }
}

#[async_trait]
impl SetOps<Tag> for TagEndpointOps<'_> {
    async fn add(&self, members: &[Tag]) -> Result<(), ProviderError> {
        self.call(&self.spec.add, members).await
    }

    async fn remove(&self, members: &[Tag]) -> Result<(), ProviderError> {
        self.call(&self.spec.remove, members).await
    }
}

/// Flatten a `{"key": "value"}` tag object into sorted pairs.
fn tag_pairs(value: Option<&Value>) -> Vec<Tag> {
    let mut pairs: Vec<Tag> = value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    pairs.sort();
    pairs
}
