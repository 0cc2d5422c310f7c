//! In-process REST peer for integration tests.
//!
//! [`FakeServer`] implements [`HttpClient`], so an [`HttpTransport`] built on
//! it exercises the real request encoding and envelope handling without a
//! socket. It keeps one map of entities per type, a logical clock used as
//! `serverTime`, and a request log.
//!
//! [`HttpTransport`]: waybill_sync_engine::HttpTransport

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use waybill_sync_engine::{HttpClient, HttpRequest, HttpResponse, SyncError, SyncResult};
use waybill_sync_protocol::time::format_iso_millis;
use waybill_sync_protocol::{EntityType, HttpMethod, PULL_PATH};

/// Server clock at construction, epoch millis.
pub const FAKE_SERVER_EPOCH: i64 = 1_714_000_000_000;

/// A failure the server produces instead of handling a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Respond with this status and an error envelope.
    Status(u16),
    /// Respond 200 with `success = false`.
    Rejected,
    /// No response before the client timeout.
    Timeout,
    /// Connection failure.
    Unreachable,
}

/// One request the server received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Path and query, without the base URL.
    pub path: String,
    /// Decoded JSON body.
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct StoredEntity {
    body: Value,
    changed_at: i64,
    deleted_at: Option<i64>,
}

#[derive(Debug, Clone)]
struct Injection {
    method: Option<HttpMethod>,
    path_prefix: String,
    fault: Fault,
    remaining: usize,
}

#[derive(Debug)]
struct ServerState {
    entities: BTreeMap<(EntityType, String), StoredEntity>,
    clock: i64,
    online: bool,
    latency: Duration,
    report_server_time: bool,
    required_token: Option<String>,
    injections: Vec<Injection>,
    requests: Vec<RecordedRequest>,
}

impl ServerState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn take_fault(&mut self, method: HttpMethod, path: &str) -> Option<Fault> {
        let injection = self.injections.iter_mut().find(|i| {
            i.remaining > 0
                && i.method.map_or(true, |m| m == method)
                && path.starts_with(&i.path_prefix)
        })?;
        injection.remaining -= 1;
        Some(injection.fault.clone())
    }
}

/// In-process stand-in for the Waybill REST API.
///
/// Cloning yields another handle to the same server, so a test can keep one
/// while the transport owns another.
#[derive(Debug, Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    /// Creates an empty, reachable server that accepts any token.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                entities: BTreeMap::new(),
                clock: FAKE_SERVER_EPOCH,
                online: true,
                latency: Duration::ZERO,
                report_server_time: true,
                required_token: None,
                injections: Vec::new(),
                requests: Vec::new(),
            })),
        }
    }

    /// Rejects requests not carrying `token` with 401.
    pub fn require_token(&self, token: impl Into<String>) {
        self.state.lock().required_token = Some(token.into());
    }

    /// Makes the next `times` requests whose path starts with
    /// `path_prefix` fail with `fault`.
    pub fn fail(&self, path_prefix: &str, fault: Fault, times: usize) {
        self.fail_method(None, path_prefix, fault, times);
    }

    /// [`fail`](Self::fail) restricted to one verb.
    pub fn fail_method(&self, method: Option<HttpMethod>, path_prefix: &str, fault: Fault, times: usize) {
        self.state.lock().injections.push(Injection {
            method,
            path_prefix: path_prefix.to_string(),
            fault,
            remaining: times,
        });
    }

    /// Drops every pending injected fault.
    pub fn clear_faults(&self) {
        self.state.lock().injections.clear();
    }

    /// Simulates losing or regaining the network.
    pub fn set_online(&self, online: bool) {
        self.state.lock().online = online;
    }

    /// Delays every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Whether pull responses include `serverTime`.
    pub fn set_report_server_time(&self, report: bool) {
        self.state.lock().report_server_time = report;
    }

    /// Current server clock.
    pub fn clock(&self) -> i64 {
        self.state.lock().clock
    }

    /// Stores a wire entity as if another client had written it.
    ///
    /// # Panics
    ///
    /// Panics if `body` has no string `id`.
    pub fn seed(&self, entity_type: EntityType, body: Value) {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .expect("Seeded entity needs a string id")
            .to_string();
        let mut state = self.state.lock();
        let changed_at = state.tick();
        state.entities.insert(
            (entity_type, id),
            StoredEntity {
                body,
                changed_at,
                deleted_at: None,
            },
        );
    }

    /// Deletes an entity as if another client had removed it.
    pub fn tombstone(&self, entity_type: EntityType, id: &str) {
        let mut state = self.state.lock();
        let now = state.tick();
        let entry = state
            .entities
            .entry((entity_type, id.to_string()))
            .or_insert_with(|| StoredEntity {
                body: json!({ "id": id }),
                changed_at: now,
                deleted_at: None,
            });
        entry.changed_at = now;
        entry.deleted_at = Some(now);
    }

    /// The live wire body of an entity.
    pub fn entity(&self, entity_type: EntityType, id: &str) -> Option<Value> {
        let state = self.state.lock();
        state
            .entities
            .get(&(entity_type, id.to_string()))
            .filter(|e| e.deleted_at.is_none())
            .map(|e| e.body.clone())
    }

    /// Number of live entities of a type.
    pub fn entity_count(&self, entity_type: EntityType) -> usize {
        let state = self.state.lock();
        state
            .entities
            .iter()
            .filter(|((et, _), e)| *et == entity_type && e.deleted_at.is_none())
            .count()
    }

    /// Every request received so far, faulted ones included.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests other than pulls.
    pub fn writes(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method != HttpMethod::Get)
            .collect()
    }

    /// Forgets the request log.
    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    fn handle(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        let path = path_of(&request.url).to_string();
        let body = match &request.body {
            Some(bytes) => match serde_json::from_slice::<Value>(bytes) {
                Ok(value) => Some(value),
                Err(err) => return Ok(error_response(400, "BAD_JSON", &err.to_string())),
            },
            None => None,
        };

        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut state = self.state.lock();
        if !state.online {
            return Err(SyncError::Network("fake server unreachable".into()));
        }
        state.requests.push(RecordedRequest {
            method: request.method,
            path: path.clone(),
            body: body.clone(),
        });

        if let Some(fault) = state.take_fault(request.method, &path) {
            return match fault {
                Fault::Status(status) => Ok(error_response(status, "INJECTED", "injected failure")),
                Fault::Rejected => Ok(HttpResponse::json(
                    200,
                    &json!({ "success": false, "error": { "code": "REJECTED", "message": "injected rejection" } }),
                )),
                Fault::Timeout => Err(SyncError::Timeout),
                Fault::Unreachable => Err(SyncError::Network("injected connection failure".into())),
            };
        }

        if let Some(required) = &state.required_token {
            if *required != request.bearer_token {
                return Ok(error_response(401, "UNAUTHORIZED", "invalid token"));
            }
        }

        if let Some(query) = path.strip_prefix(PULL_PATH) {
            return Ok(match (request.method, parse_last_sync_at(query)) {
                (HttpMethod::Get, Some(since)) => pull(&state, since),
                _ => error_response(400, "BAD_REQUEST", "lastSyncAt required"),
            });
        }

        let Some((entity_type, id)) = resolve(&path) else {
            return Ok(error_response(404, "NOT_FOUND", "no such route"));
        };
        Ok(match (request.method, id, body) {
            (HttpMethod::Post, None, Some(body)) => create(&mut state, entity_type, body),
            (HttpMethod::Put, Some(id), Some(body)) => update(&mut state, entity_type, &id, body),
            (HttpMethod::Delete, Some(id), _) => delete(&mut state, entity_type, &id),
            _ => error_response(405, "METHOD_NOT_ALLOWED", "unsupported call"),
        })
    }
}

impl HttpClient for FakeServer {
    fn send(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        self.handle(request)
    }

    fn is_online(&self) -> bool {
        self.state.lock().online
    }
}

fn create(state: &mut ServerState, entity_type: EntityType, body: Value) -> HttpResponse {
    let Some(id) = body.get("id").and_then(Value::as_str).map(str::to_string) else {
        return error_response(422, "VALIDATION", "id is required");
    };
    if state
        .entities
        .get(&(entity_type, id.clone()))
        .is_some_and(|e| e.deleted_at.is_none())
    {
        return error_response(409, "CONFLICT", "entity already exists");
    }
    let changed_at = state.tick();
    state.entities.insert(
        (entity_type, id),
        StoredEntity {
            body: body.clone(),
            changed_at,
            deleted_at: None,
        },
    );
    HttpResponse::json(201, &json!({ "success": true, "data": body }))
}

fn update(state: &mut ServerState, entity_type: EntityType, id: &str, body: Value) -> HttpResponse {
    let changed_at = state.tick();
    match state.entities.get_mut(&(entity_type, id.to_string())) {
        Some(entity) if entity.deleted_at.is_none() => {
            entity.body = body.clone();
            entity.changed_at = changed_at;
            HttpResponse::json(200, &json!({ "success": true, "data": body }))
        }
        _ => error_response(404, "NOT_FOUND", "entity not found"),
    }
}

fn delete(state: &mut ServerState, entity_type: EntityType, id: &str) -> HttpResponse {
    let now = state.tick();
    if let Some(entity) = state.entities.get_mut(&(entity_type, id.to_string())) {
        if entity.deleted_at.is_none() {
            entity.deleted_at = Some(now);
            entity.changed_at = now;
        }
    }
    HttpResponse::json(200, &json!({ "success": true }))
}

fn pull(state: &ServerState, since: i64) -> HttpResponse {
    let mut data = Map::new();
    for entity_type in EntityType::ALL {
        let changed: Vec<Value> = state
            .entities
            .iter()
            .filter(|((et, _), e)| *et == entity_type && e.changed_at > since)
            .map(|((_, id), e)| match e.deleted_at {
                Some(at) => json!({ "id": id, "deletedAt": format_iso_millis(at) }),
                None => e.body.clone(),
            })
            .collect();
        if !changed.is_empty() {
            data.insert(entity_type.tag().to_string(), Value::Array(changed));
        }
    }
    if state.report_server_time {
        data.insert("serverTime".to_string(), json!(state.clock));
    }
    HttpResponse::json(200, &json!({ "success": true, "data": data }))
}

fn error_response(status: u16, code: &str, message: &str) -> HttpResponse {
    HttpResponse::json(
        status,
        &json!({ "success": false, "error": { "code": code, "message": message } }),
    )
}

/// Strips scheme, host and the `/api` prefix of fixture URLs.
fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.find('/').map_or("/", |i| &rest[i..]);
    path.strip_prefix("/api").unwrap_or(path)
}

fn parse_last_sync_at(query: &str) -> Option<i64> {
    query
        .strip_prefix('?')?
        .split('&')
        .find_map(|pair| pair.strip_prefix("lastSyncAt="))?
        .parse()
        .ok()
}

fn resolve(path: &str) -> Option<(EntityType, Option<String>)> {
    EntityType::ALL.into_iter().find_map(|entity_type| {
        let rest = path.strip_prefix(entity_type.base_path())?;
        match rest {
            "" => Some((entity_type, None)),
            _ => rest
                .strip_prefix('/')
                .filter(|id| !id.is_empty() && !id.contains('/'))
                .map(|id| (entity_type, Some(percent_decode(id)))),
        }
    })
}

fn percent_decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: HttpMethod, path: &str, body: Option<Value>) -> HttpRequest {
        HttpRequest {
            method,
            url: format!("http://waybill.test/api{path}"),
            bearer_token: "t".into(),
            body: body.map(|b| b.to_string().into_bytes()),
        }
    }

    fn envelope(response: &HttpResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn create_then_pull_returns_entity_and_clock() {
        let server = FakeServer::new();
        let created = server
            .send(&request(HttpMethod::Post, "/items", Some(json!({ "id": "it-1" }))))
            .unwrap();
        assert_eq!(created.status, 201);

        let pulled = server
            .send(&request(HttpMethod::Get, "/sync/pull?lastSyncAt=0", None))
            .unwrap();
        let body = envelope(&pulled);
        assert_eq!(body["data"]["item"][0]["id"], "it-1");
        assert_eq!(body["data"]["serverTime"], json!(server.clock()));
    }

    #[test]
    fn pull_only_returns_later_changes() {
        let server = FakeServer::new();
        server.seed(EntityType::Item, json!({ "id": "old" }));
        let mark = server.clock();
        server.seed(EntityType::Item, json!({ "id": "new" }));

        let pulled = server
            .send(&request(HttpMethod::Get, &format!("/sync/pull?lastSyncAt={mark}"), None))
            .unwrap();
        let items = envelope(&pulled)["data"]["item"].clone();
        assert_eq!(items, json!([{ "id": "new" }]));
    }

    #[test]
    fn tombstones_are_pulled_with_deleted_at() {
        let server = FakeServer::new();
        server.seed(EntityType::Photo, json!({ "id": "ph-1" }));
        server
            .send(&request(HttpMethod::Delete, "/photos/ph-1", None))
            .unwrap();
        assert_eq!(server.entity(EntityType::Photo, "ph-1"), None);

        let pulled = server
            .send(&request(HttpMethod::Get, "/sync/pull?lastSyncAt=0", None))
            .unwrap();
        let photo = envelope(&pulled)["data"]["photo"][0].clone();
        assert_eq!(photo["id"], "ph-1");
        assert!(photo["deletedAt"].is_string());
    }

    #[test]
    fn injected_faults_are_consumed() {
        let server = FakeServer::new();
        server.fail("/items", Fault::Status(503), 1);
        let body = Some(json!({ "id": "it-1" }));

        let first = server.send(&request(HttpMethod::Post, "/items", body.clone())).unwrap();
        assert_eq!(first.status, 503);
        let second = server.send(&request(HttpMethod::Post, "/items", body)).unwrap();
        assert_eq!(second.status, 201);
        assert_eq!(server.requests().len(), 2);
    }

    #[test]
    fn offline_server_is_unreachable() {
        let server = FakeServer::new();
        server.set_online(false);
        assert!(!server.is_online());
        let err = server
            .send(&request(HttpMethod::Get, "/sync/pull?lastSyncAt=0", None))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(server.requests().is_empty());
    }

    #[test]
    fn wrong_token_is_unauthorized() {
        let server = FakeServer::new();
        server.require_token("secret");
        let response = server
            .send(&request(HttpMethod::Get, "/sync/pull?lastSyncAt=0", None))
            .unwrap();
        assert_eq!(response.status, 401);
    }

    #[test]
    fn update_of_unknown_entity_is_not_found() {
        let server = FakeServer::new();
        let response = server
            .send(&request(HttpMethod::Put, "/items/nope", Some(json!({ "id": "nope" }))))
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[test]
    fn paths_are_resolved() {
        assert_eq!(path_of("http://h:8080/api/items/a"), "/items/a");
        assert_eq!(resolve("/items"), Some((EntityType::Item, None)));
        assert_eq!(
            resolve("/location-pings/a%2Fb"),
            Some((EntityType::LocationPing, Some("a/b".into())))
        );
        assert_eq!(resolve("/items/a/b"), None);
        assert_eq!(parse_last_sync_at("?lastSyncAt=42"), Some(42));
    }
}
