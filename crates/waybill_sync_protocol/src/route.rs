//! REST route resolution.

use crate::entity::{EntityType, Operation};
use std::fmt;

/// Path of the incremental pull endpoint.
pub const PULL_PATH: &str = "/sync/pull";

/// HTTP verb of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Upper-case verb.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method and path relative to the server base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Path, including any query string.
    pub path: String,
}

impl Route {
    /// Resolves the call that delivers `operation` on an entity.
    ///
    /// Creates go to the collection; updates and deletes address the
    /// entity by id.
    pub fn for_entry(entity_type: EntityType, operation: Operation, entity_id: &str) -> Self {
        let base = entity_type.base_path();
        match operation {
            Operation::Create => Route {
                method: HttpMethod::Post,
                path: base.to_string(),
            },
            Operation::Update => Route {
                method: HttpMethod::Put,
                path: format!("{base}/{}", urlencoding::encode(entity_id)),
            },
            Operation::Delete => Route {
                method: HttpMethod::Delete,
                path: format!("{base}/{}", urlencoding::encode(entity_id)),
            },
        }
    }

    /// The pull request for changes after `last_sync_at` (epoch millis).
    pub fn pull(last_sync_at: i64) -> Self {
        Route {
            method: HttpMethod::Get,
            path: format!("{PULL_PATH}?lastSyncAt={last_sync_at}"),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
