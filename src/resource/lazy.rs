//! Lazy resource proxies
//!
//! A [`LazyResource`] stands in for one remote resource. It starts from a
//! possibly empty snapshot and only talks to the server when a field is asked
//! for that the snapshot does not have, or when told to refresh, update or
//! delete.

use super::collection::ResourceCollection;
use super::registry::{scalar_to_string, ResourceDef, ResourceKind};
use super::relation::RelationshipAccessor;
use super::session::Session;
use crate::atlas::{Method, QueryParams};
use crate::error::{ClientError, Result};
use crate::events::Operation;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const RELATIONSHIP_ATTRIBUTES: &str = "relationshipAttributes";
const REFERRED_ENTITIES: &str = "referredEntities";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    /// Never fetched, or invalidated by an update without a response body
    Unloaded,
    /// Snapshot reflects the last server response
    Loaded,
    /// Deleted through this proxy
    Deleted,
}

/// Result of a field lookup
#[derive(Debug, Clone)]
pub enum FieldValue {
    Value(Value),
    Relation(RelationshipAccessor),
}

impl FieldValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            FieldValue::Relation(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            FieldValue::Relation(_) => None,
        }
    }

    pub fn into_relation(self) -> Option<RelationshipAccessor> {
        match self {
            FieldValue::Relation(r) => Some(r),
            FieldValue::Value(_) => None,
        }
    }
}

/// What a poll check decided about the current snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Done,
    Pending,
    Failed,
}

/// Proxy for a single remote resource
#[derive(Debug, Clone)]
pub struct LazyResource {
    session: Session,
    def: Arc<ResourceDef>,
    url: Option<String>,
    params: QueryParams,
    snapshot: Map<String, Value>,
    envelope: Map<String, Value>,
    state: LoadState,
}

impl LazyResource {
    pub(crate) fn new(
        session: Session,
        def: Arc<ResourceDef>,
        url: Option<String>,
        snapshot: Map<String, Value>,
        loaded: bool,
    ) -> Self {
        Self {
            session,
            def,
            url,
            params: QueryParams::new(),
            snapshot,
            envelope: Map::new(),
            state: if loaded {
                LoadState::Loaded
            } else {
                LoadState::Unloaded
            },
        }
    }

    /// Add a query parameter sent with every request for this resource
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Logical resource name
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.def.kind
    }

    pub fn def(&self) -> &ResourceDef {
        &self.def
    }

    /// Address of the resource, if one is known or derivable from the snapshot
    pub fn url(&self) -> Option<String> {
        self.url.clone().or_else(|| {
            self.def
                .url_from_fields(&self.session.base_url, &self.snapshot, &[])
        })
    }

    /// Identity value (e.g. the guid), if present in the snapshot
    pub fn identity_key(&self) -> Option<&Value> {
        self.def
            .primary_key
            .as_deref()
            .and_then(|pk| self.snapshot.get(pk))
    }

    pub fn snapshot(&self) -> &Map<String, Value> {
        &self.snapshot
    }

    /// Sibling fields of the data envelope (e.g. `referredEntities`)
    pub fn envelope_field(&self, name: &str) -> Option<&Value> {
        self.envelope.get(name)
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn is_deleted(&self) -> bool {
        self.state == LoadState::Deleted
    }

    /// Look up a field.
    ///
    /// Relation names yield an accessor without a request. Other names come
    /// from the snapshot; a miss on an unloaded snapshot triggers exactly one
    /// refresh, a miss on a loaded one fails straight away.
    pub fn get(&mut self, field: &str) -> Result<FieldValue> {
        self.ensure_live()?;
        if self.def.relation(field).is_some() {
            return self.relation(field).map(FieldValue::Relation);
        }
        self.get_value(field).map(FieldValue::Value)
    }

    /// Look up a plain field, ignoring relation names
    pub fn get_value(&mut self, field: &str) -> Result<Value> {
        self.ensure_live()?;
        if let Some(value) = self.snapshot.get(field) {
            return Ok(value.clone());
        }
        if self.state == LoadState::Loaded {
            return Err(self.field_not_found(field));
        }

        tracing::debug!(
            resource = %self.def.name,
            field = field,
            "Field missing from unloaded snapshot, refreshing"
        );
        self.refresh()?;
        self.snapshot
            .get(field)
            .cloned()
            .ok_or_else(|| self.field_not_found(field))
    }

    /// Accessor for a declared relation
    pub fn relation(&self, name: &str) -> Result<RelationshipAccessor> {
        self.ensure_live()?;
        let relation = self
            .def
            .relation(name)
            .ok_or_else(|| ClientError::UnknownRelation {
                resource: self.def.name.clone(),
                relation: name.to_string(),
            })?;
        let parent_url = self.require_url()?;
        let url = match &relation.segment {
            Some(segment) => format!("{}/{}", parent_url, segment),
            None => {
                let target = self.session.def(&relation.target)?;
                target
                    .url_from_fields(&self.session.base_url, &self.snapshot, &[])
                    .ok_or_else(|| ClientError::Unaddressable {
                        resource: target.name.clone(),
                        key: target
                            .placeholders()
                            .first()
                            .map(|p| p.to_string())
                            .unwrap_or_default(),
                    })?
            }
        };
        Ok(RelationshipAccessor::new(
            self.session.clone(),
            self.def.name.clone(),
            relation.clone(),
            parent_url,
            url,
            self.snapshot.get(name).cloned(),
        ))
    }

    /// Replace the snapshot with the server's current state
    pub fn refresh(&mut self) -> Result<()> {
        self.ensure_live()?;
        let url = self.require_url()?;
        let def = self.def.clone();
        let events = self.session.events.clone();

        events.track(&def.name, Operation::Refresh, Some(&url), || {
            let params = (!self.params.is_empty()).then_some(&self.params);
            let response = self.session.request(Method::Get, &url, params, None)?;
            let body = response.body.ok_or_else(|| ClientError::MalformedResponse {
                url: url.clone(),
                reason: "empty response body".to_string(),
            })?;
            let (snapshot, envelope) = split_envelope(&def, &url, body)?;
            self.snapshot = snapshot;
            self.envelope = envelope;
            self.state = LoadState::Loaded;
            Ok(())
        })
    }

    /// Send `data` with the definition's update method
    pub fn update(&mut self, data: Value) -> Result<()> {
        self.send_update(Operation::Update, None, data)
    }

    /// Send `data` to the partial-update endpoint
    pub fn partial_update(&mut self, data: Value) -> Result<()> {
        let suffix = self
            .def
            .partial_suffix
            .clone()
            .ok_or_else(|| ClientError::Unsupported {
                resource: self.def.name.clone(),
                operation: "partial_update",
            })?;
        self.send_update(Operation::PartialUpdate, Some(&suffix), data)
    }

    fn send_update(&mut self, operation: Operation, suffix: Option<&str>, data: Value) -> Result<()> {
        self.ensure_live()?;
        let base = self.require_url()?;
        let url = match suffix {
            Some(suffix) => format!("{}/{}", base, suffix),
            None => base,
        };
        let def = self.def.clone();
        let events = self.session.events.clone();
        let params = self.params.clone();

        events.track(&def.name, operation, Some(&url), || {
            let params = (!params.is_empty()).then_some(&params);
            let response = self
                .session
                .request(def.update_method, &url, params, Some(&data))?;
            match response.body {
                Some(body @ Value::Object(_)) => {
                    let (snapshot, envelope) = split_envelope(&def, &url, body)?;
                    self.snapshot = snapshot;
                    self.envelope = envelope;
                    self.state = LoadState::Loaded;
                }
                None => {
                    // Acknowledged without a body: the sent fields are stale
                    // until the next fetch.
                    if let Value::Object(sent) = &data {
                        for key in sent.keys() {
                            self.snapshot.remove(key);
                        }
                    }
                    self.state = LoadState::Unloaded;
                }
                Some(_) => {
                    return Err(ClientError::AmbiguousUpdate {
                        status: response.status,
                        url: url.clone(),
                    })
                }
            }
            Ok(())
        })
    }

    /// Delete the resource; the proxy refuses further use afterwards.
    ///
    /// Repeating a delete still reaches the server.
    pub fn delete(&mut self) -> Result<()> {
        let url = self.require_url()?;
        let def = self.def.clone();
        let events = self.session.events.clone();

        let params = self.params.clone();

        events.track(&def.name, Operation::Delete, Some(&url), || {
            let params = (!params.is_empty()).then_some(&params);
            self.session.request(Method::Delete, &url, params, None)?;
            self.state = LoadState::Deleted;
            Ok(())
        })
    }

    /// Deserialize the snapshot, fetching it first if never loaded
    pub fn to_typed<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.ensure_live()?;
        if self.state == LoadState::Unloaded {
            self.refresh()?;
        }
        Ok(serde_json::from_value(Value::Object(self.snapshot.clone()))?)
    }

    /// Refresh every `interval` until `check` reports done or failed, or
    /// `timeout` runs out. A Progress event is published before each wait.
    pub fn poll_until<F>(&mut self, interval: Duration, timeout: Duration, check: F) -> Result<()>
    where
        F: Fn(&Map<String, Value>) -> PollStatus,
    {
        let url = self.require_url()?;
        let name = self.def.name.clone();
        let events = self.session.events.clone();

        events.track_progress(&name, Operation::Poll, Some(&url), |progress| {
            let start = Instant::now();
            loop {
                self.refresh()?;
                match check(&self.snapshot) {
                    PollStatus::Done => return Ok(()),
                    PollStatus::Failed => return Err(ClientError::PollFailed { url: url.clone() }),
                    PollStatus::Pending => {}
                }
                if start.elapsed() + interval > timeout {
                    return Err(ClientError::PollTimeout {
                        url: url.clone(),
                        timeout,
                    });
                }
                progress();
                std::thread::sleep(interval);
            }
        })
    }

    /// `relationshipAttributes` with each referenced entity header swapped
    /// for the entity's full body.
    ///
    /// Bodies come from the `referredEntities` envelope first; guids it lacks
    /// are fetched together in one `entity_bulk` request. An empty `names`
    /// covers every attribute. The result is written back to the snapshot.
    pub fn resolve_relationship_attributes(&mut self, names: &[&str]) -> Result<Map<String, Value>> {
        let Value::Object(mut attributes) = self.get_value(RELATIONSHIP_ATTRIBUTES)? else {
            return Err(ClientError::MalformedResponse {
                url: self.url().unwrap_or_default(),
                reason: format!("{} is not an object", RELATIONSHIP_ATTRIBUTES),
            });
        };
        let selected: Vec<String> = if names.is_empty() {
            attributes.keys().cloned().collect()
        } else {
            names.iter().map(|n| n.to_string()).collect()
        };

        let mut referred = match self.envelope.get(REFERRED_ENTITIES) {
            Some(Value::Object(referred)) => referred.clone(),
            _ => Map::new(),
        };
        let missing: BTreeSet<String> = selected
            .iter()
            .filter_map(|name| attributes.get(name))
            .flat_map(referenced_guids)
            .filter(|guid| !referred.contains_key(guid))
            .collect();

        if !missing.is_empty() {
            tracing::debug!(
                resource = %self.def.name,
                missing = missing.len(),
                "Fetching relationship targets absent from referredEntities"
            );
            let guids: Vec<&str> = missing.iter().map(String::as_str).collect();
            let mut bulk = ResourceCollection::with_repeated_param(
                self.session.clone(),
                "entity_bulk",
                "guid",
                &guids,
            )?;
            for entity in bulk.fetch_all()? {
                if let Some(guid) = entity.snapshot().get("guid").and_then(Value::as_str) {
                    referred.insert(guid.to_string(), Value::Object(entity.snapshot().clone()));
                }
            }
            if let Some(Value::Object(more)) =
                bulk.raw_payload().and_then(|p| p.get(REFERRED_ENTITIES))
            {
                for (guid, body) in more {
                    referred.entry(guid.clone()).or_insert_with(|| body.clone());
                }
            }
        }

        for name in &selected {
            if let Some(value) = attributes.get_mut(name) {
                swap_referenced(value, &referred);
            }
        }
        self.snapshot.insert(
            RELATIONSHIP_ATTRIBUTES.to_string(),
            Value::Object(attributes.clone()),
        );
        Ok(attributes)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state == LoadState::Deleted {
            return Err(ClientError::DeletedResource {
                url: self.url().unwrap_or_else(|| self.def.name.clone()),
            });
        }
        Ok(())
    }

    fn require_url(&self) -> Result<String> {
        self.url().ok_or_else(|| ClientError::Unaddressable {
            resource: self.def.name.clone(),
            key: self
                .def
                .primary_key
                .clone()
                .or_else(|| self.def.placeholders().first().map(|p| p.to_string()))
                .unwrap_or_else(|| "url".to_string()),
        })
    }

    fn field_not_found(&self, field: &str) -> ClientError {
        let who = match self.identity_key().and_then(scalar_to_string) {
            Some(id) => format!("{} {}", self.def.name, id),
            None => self.def.name.clone(),
        };
        ClientError::FieldNotFound {
            resource: who,
            field: field.to_string(),
        }
    }
}

/// Guids of the entity headers held by a relationship attribute
fn referenced_guids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(referenced_guids).collect(),
        Value::Object(header) => header
            .get("guid")
            .and_then(Value::as_str)
            .map(|guid| vec![guid.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn swap_referenced(value: &mut Value, referred: &Map<String, Value>) {
    let replacement = match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                swap_referenced(item, referred);
            }
            None
        }
        Value::Object(header) => header
            .get("guid")
            .and_then(Value::as_str)
            .and_then(|guid| referred.get(guid))
            .cloned(),
        _ => None,
    };
    if let Some(body) = replacement {
        *value = body;
    }
}

/// Split a response body into resource fields and envelope siblings
pub(crate) fn split_envelope(
    def: &ResourceDef,
    url: &str,
    body: Value,
) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let Value::Object(mut body) = body else {
        return Err(ClientError::MalformedResponse {
            url: url.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    };

    if let Some(key) = &def.data_key {
        if let Some(Value::Object(inner)) = body.remove(key) {
            return Ok((inner, body));
        }
    }
    Ok((body, Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{MemoryTransport, RawResponse};
    use crate::events::EventHub;
    use crate::resource::ResourceRegistry;
    use serde_json::json;

    const ENTITY_URL: &str = "http://atlas/api/atlas/v2/entity/guid/abc";

    fn session(transport: Arc<MemoryTransport>) -> Session {
        Session::new(
            transport,
            Arc::new(ResourceRegistry::builtin().unwrap()),
            "http://atlas",
            EventHub::default(),
            None,
        )
    }

    fn entity(transport: Arc<MemoryTransport>, snapshot: Value) -> LazyResource {
        let session = session(transport);
        let def = session.def("entity_guid").unwrap();
        let Value::Object(snapshot) = snapshot else {
            panic!("snapshot must be an object")
        };
        LazyResource::new(session, def, Some(ENTITY_URL.to_string()), snapshot, false)
    }

    #[test]
    fn test_present_field_needs_no_request() {
        let transport = Arc::new(MemoryTransport::new());
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        assert_eq!(resource.get_value("guid").unwrap(), json!("abc"));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_missing_field_refreshes_once() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond_json(
            Method::Get,
            ENTITY_URL,
            json!({
                "entity": {"guid": "abc", "typeName": "hive_table", "status": "ACTIVE"},
                "referredEntities": {}
            }),
        );
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        assert_eq!(resource.get_value("typeName").unwrap(), json!("hive_table"));
        assert!(resource.is_loaded());
        assert_eq!(resource.envelope_field("referredEntities"), Some(&json!({})));

        let err = resource.get_value("owner").unwrap_err();
        assert!(matches!(err, ClientError::FieldNotFound { .. }));
        assert_eq!(transport.count(Method::Get, ENTITY_URL), 1);
    }

    #[test]
    fn test_transport_failure_leaves_state_unchanged() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_timeout(Method::Get, ENTITY_URL);
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        let err = resource.refresh().unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(!resource.is_loaded());
        assert_eq!(resource.snapshot().get("guid"), Some(&json!("abc")));
    }

    #[test]
    fn test_server_error_surfaces_message() {
        let transport = Arc::new(MemoryTransport::new());
        let mut resource = entity(transport, json!({"guid": "abc"}));

        let err = resource.refresh().unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_refresh_replaces_snapshot() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond_json(Method::Get, ENTITY_URL, json!({"entity": {"guid": "abc"}}));
        let mut resource = entity(transport, json!({"guid": "abc", "stale": true}));

        resource.refresh().unwrap();
        assert!(resource.snapshot().get("stale").is_none());
    }

    #[test]
    fn test_update_with_body_replaces_snapshot() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond_json(
            Method::Put,
            ENTITY_URL,
            json!({"entity": {"guid": "abc", "owner": "alice"}}),
        );
        let mut resource = entity(transport.clone(), json!({"guid": "abc", "owner": "bob"}));

        resource.update(json!({"owner": "alice"})).unwrap();
        assert_eq!(resource.get_value("owner").unwrap(), json!("alice"));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_update_without_body_refetches_updated_fields() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(Method::Put, ENTITY_URL, RawResponse::no_content());
        transport.respond_json(
            Method::Get,
            ENTITY_URL,
            json!({"entity": {"guid": "abc", "owner": "ALICE"}}),
        );
        let mut resource = entity(transport.clone(), json!({"guid": "abc", "owner": "bob"}));

        resource.update(json!({"owner": "alice"})).unwrap();
        assert!(!resource.is_loaded());
        assert_eq!(resource.get_value("owner").unwrap(), json!("ALICE"));
        assert_eq!(transport.count(Method::Get, ENTITY_URL), 1);
    }

    #[test]
    fn test_update_with_non_object_body_is_ambiguous() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(Method::Put, ENTITY_URL, RawResponse::new(200, Some(json!("ok"))));
        let mut resource = entity(transport, json!({"guid": "abc", "owner": "bob"}));

        let err = resource.update(json!({"owner": "alice"})).unwrap_err();
        assert!(matches!(err, ClientError::AmbiguousUpdate { status: 200, .. }));
        assert_eq!(resource.snapshot().get("owner"), Some(&json!("bob")));
    }

    #[test]
    fn test_partial_update_requires_suffix() {
        let transport = Arc::new(MemoryTransport::new());
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        let err = resource.partial_update(json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ClientError::Unsupported { operation: "partial_update", .. }));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_delete_then_get_fails_locally() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(Method::Delete, ENTITY_URL, RawResponse::no_content());
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        resource.delete().unwrap();
        assert!(resource.is_deleted());

        let err = resource.get("guid").unwrap_err();
        assert!(matches!(err, ClientError::DeletedResource { .. }));
        assert!(matches!(resource.refresh(), Err(ClientError::DeletedResource { .. })));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_relation_names_yield_accessors() {
        let transport = Arc::new(MemoryTransport::new());
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        let accessor = resource.get("classifications").unwrap().into_relation().unwrap();
        assert_eq!(accessor.url(), format!("{}/classifications", ENTITY_URL));
        assert_eq!(transport.call_count(), 0);

        let err = resource.relation("owners").unwrap_err();
        assert!(matches!(err, ClientError::UnknownRelation { .. }));
    }

    #[test]
    fn test_url_derived_from_identity() {
        let transport = Arc::new(MemoryTransport::new());
        let session = session(transport);
        let def = session.def("glossary_term").unwrap();

        let mut fields = Map::new();
        fields.insert("guid".to_string(), json!("t-1"));
        let term = LazyResource::new(session.clone(), def.clone(), None, fields, false);
        assert_eq!(
            term.url().as_deref(),
            Some("http://atlas/api/atlas/v2/glossary/term/t-1")
        );

        let mut anonymous = LazyResource::new(session, def, None, Map::new(), false);
        let err = anonymous.get_value("name").unwrap_err();
        assert!(matches!(err, ClientError::Unaddressable { key, .. } if key == "guid"));
    }

    #[test]
    fn test_to_typed_fetches_when_unloaded() {
        #[derive(serde::Deserialize)]
        struct Header {
            guid: String,
            #[serde(rename = "typeName")]
            type_name: String,
        }

        let transport = Arc::new(MemoryTransport::new());
        transport.respond_json(
            Method::Get,
            ENTITY_URL,
            json!({"entity": {"guid": "abc", "typeName": "hive_db"}}),
        );
        let mut resource = entity(transport, json!({"guid": "abc"}));

        let header: Header = resource.to_typed().unwrap();
        assert_eq!(header.guid, "abc");
        assert_eq!(header.type_name, "hive_db");
    }

    #[test]
    fn test_poll_until_done() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond_json(Method::Get, ENTITY_URL, json!({"entity": {"status": "PENDING"}}))
            .respond_json(Method::Get, ENTITY_URL, json!({"entity": {"status": "ACTIVE"}}));
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        resource
            .poll_until(Duration::from_millis(1), Duration::from_secs(5), |s| {
                match s.get("status").and_then(Value::as_str) {
                    Some("ACTIVE") => PollStatus::Done,
                    Some("FAILED") => PollStatus::Failed,
                    _ => PollStatus::Pending,
                }
            })
            .unwrap();
        assert_eq!(transport.count(Method::Get, ENTITY_URL), 2);
    }

    #[test]
    fn test_poll_until_times_out() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond_json(Method::Get, ENTITY_URL, json!({"entity": {"status": "PENDING"}}));
        let mut resource = entity(transport, json!({"guid": "abc"}));

        let err = resource
            .poll_until(Duration::from_millis(20), Duration::from_millis(30), |_| {
                PollStatus::Pending
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::PollTimeout { .. }));
    }

    #[test]
    fn test_poll_publishes_progress_between_refreshes() {
        use crate::events::EventState;
        use std::sync::Mutex;

        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond_json(Method::Get, ENTITY_URL, json!({"entity": {"status": "PENDING"}}))
            .respond_json(Method::Get, ENTITY_URL, json!({"entity": {"status": "PENDING"}}))
            .respond_json(Method::Get, ENTITY_URL, json!({"entity": {"status": "ACTIVE"}}));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let events = EventHub::builder()
            .subscribe(None, Some(Operation::Poll), None, move |e| {
                sink.lock().unwrap().push(e.state);
            })
            .build();
        let session = Session::new(
            transport,
            Arc::new(ResourceRegistry::builtin().unwrap()),
            "http://atlas",
            events,
            None,
        );
        let def = session.def("entity_guid").unwrap();
        let mut resource =
            LazyResource::new(session, def, Some(ENTITY_URL.to_string()), Map::new(), false);

        resource
            .poll_until(Duration::from_millis(1), Duration::from_secs(5), |s| {
                match s.get("status").and_then(Value::as_str) {
                    Some("ACTIVE") => PollStatus::Done,
                    _ => PollStatus::Pending,
                }
            })
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventState::Started,
                EventState::Progress,
                EventState::Progress,
                EventState::Finished
            ]
        );
    }

    #[test]
    fn test_relationship_attributes_from_referred_entities() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond_json(
            Method::Get,
            ENTITY_URL,
            json!({
                "entity": {
                    "guid": "abc",
                    "relationshipAttributes": {
                        "db": {"guid": "db1", "typeName": "hive_db"},
                        "columns": [{"guid": "c1"}, {"guid": "c2"}]
                    }
                },
                "referredEntities": {
                    "db1": {"guid": "db1", "attributes": {"name": "sales"}},
                    "c1": {"guid": "c1", "attributes": {"name": "id"}}
                }
            }),
        );
        let bulk_url = "http://atlas/api/atlas/v2/entity/bulk?guid=c2";
        transport.respond_json(
            Method::Get,
            bulk_url,
            json!({"entities": [{"guid": "c2", "attributes": {"name": "amount"}}]}),
        );
        let mut resource = entity(transport.clone(), json!({"guid": "abc"}));

        let attributes = resource.resolve_relationship_attributes(&[]).unwrap();

        assert_eq!(attributes["db"]["attributes"]["name"], json!("sales"));
        assert_eq!(attributes["columns"][0]["attributes"]["name"], json!("id"));
        assert_eq!(attributes["columns"][1]["attributes"]["name"], json!("amount"));
        assert_eq!(transport.count(Method::Get, bulk_url), 1);
        assert_eq!(transport.call_count(), 2);
        assert_eq!(
            resource.snapshot()["relationshipAttributes"]["columns"][1]["guid"],
            json!("c2")
        );
    }

    #[test]
    fn test_relationship_attributes_selected_names_only() {
        let transport = Arc::new(MemoryTransport::new());
        let mut resource = entity(
            transport.clone(),
            json!({
                "guid": "abc",
                "relationshipAttributes": {
                    "db": {"guid": "db1"},
                    "columns": [{"guid": "c1"}]
                }
            }),
        );
        transport.respond_json(
            Method::Get,
            "http://atlas/api/atlas/v2/entity/bulk?guid=db1",
            json!({"entities": [{"guid": "db1", "typeName": "hive_db"}]}),
        );

        let attributes = resource.resolve_relationship_attributes(&["db"]).unwrap();
        assert_eq!(attributes["db"]["typeName"], json!("hive_db"));
        assert_eq!(attributes["columns"], json!([{"guid": "c1"}]));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_split_envelope_without_key_present() {
        let registry = ResourceRegistry::builtin().unwrap();
        let def = registry.resolve("entity_guid").unwrap();
        let (snapshot, envelope) = split_envelope(&def, "u", json!({"guid": "x"})).unwrap();
        assert_eq!(snapshot.get("guid"), Some(&json!("x")));
        assert!(envelope.is_empty());

        assert!(split_envelope(&def, "u", json!([1, 2])).is_err());
    }
}
