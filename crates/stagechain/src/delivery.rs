//! Stage delivery: the request validation state machine.
//!
//! ```text
//! Received -> ClientChecked -> AuthChecked -> Found -> Served
//!    |             |               |
//!   403           404             403
//! ```
//!
//! Every step is terminal on failure. Nothing is looked up before the client
//! identity passes, and missing and expired stages produce the same response.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, warn};

use stagechain_core::StageId;
use stagechain_store::{StageStore, StageStoreExt};

use crate::error::{DeliveryPhase, Rejection, RejectionKind};

/// Default substring the client identity must contain.
pub const DEFAULT_CLIENT_MARKER: &str = "Roblox";

/// Configuration for delivery checks.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Substring required in the client's declared identity.
    pub client_marker: String,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            client_marker: DEFAULT_CLIENT_MARKER.to_string(),
        }
    }
}

impl DeliveryPolicy {
    fn accepts_client(&self, identity: Option<&str>) -> bool {
        identity.is_some_and(|id| id.contains(&self.client_marker))
    }
}

/// An inbound stage fetch, independent of the HTTP layer.
#[derive(Debug, Clone)]
pub struct StageRequest {
    stage_id: StageId,
    client_identity: Option<String>,
    /// Keyed by lowercased header name.
    headers: HashMap<String, String>,
}

impl StageRequest {
    /// A request for `stage_id` with no identity and no headers.
    pub fn new(stage_id: impl Into<StageId>) -> Self {
        Self {
            stage_id: stage_id.into(),
            client_identity: None,
            headers: HashMap::new(),
        }
    }

    /// Set the declared client identity (the `User-Agent`).
    pub fn client(mut self, identity: impl Into<String>) -> Self {
        self.client_identity = Some(identity.into());
        self
    }

    /// Add a request header. Names are case-insensitive.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// The requested stage id.
    pub fn stage_id(&self) -> &StageId {
        &self.stage_id
    }

    /// Look up a header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Serves stage content under access control and expiry rules.
pub struct StageServer<S: StageStore> {
    store: Arc<S>,
    policy: DeliveryPolicy,
}

impl<S: StageStore> StageServer<S> {
    /// Create a server over `store`.
    pub fn new(store: Arc<S>, policy: DeliveryPolicy) -> Self {
        Self { store, policy }
    }

    /// The delivery policy in force.
    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Run one request through the state machine at time `now` (Unix ms).
    ///
    /// Returns the stage's raw content, or the rejection that ended the
    /// request.
    pub async fn serve(&self, request: &StageRequest, now: i64) -> Result<Bytes, Rejection> {
        let id = request.stage_id();

        // Received -> ClientChecked
        if !self
            .policy
            .accepts_client(request.client_identity.as_deref())
        {
            return Err(self.reject(id, RejectionKind::Forbidden, DeliveryPhase::Received));
        }
        debug!(stage = %id, phase = %DeliveryPhase::ClientChecked, "client accepted");

        // ClientChecked -> AuthChecked
        let stage = match self.store.get_live_stage(id, now).await {
            Ok(Some(stage)) => stage,
            Ok(None) => {
                return Err(self.reject(id, RejectionKind::NotFound, DeliveryPhase::ClientChecked))
            }
            Err(e) => {
                error!(stage = %id, error = %e, "stage lookup failed");
                return Err(Rejection::new(
                    RejectionKind::Internal,
                    DeliveryPhase::ClientChecked,
                ));
            }
        };
        debug!(stage = %id, phase = %DeliveryPhase::AuthChecked, "stage is live");

        // AuthChecked -> Found
        match &stage.access {
            Some(access) => {
                if !access.accepts(request.header_value(&access.name)) {
                    return Err(self.reject(
                        id,
                        RejectionKind::Forbidden,
                        DeliveryPhase::AuthChecked,
                    ));
                }
            }
            None => {
                warn!(stage = %id, "serving stage without an access header");
            }
        }
        debug!(stage = %id, phase = %DeliveryPhase::Found, "access header accepted");

        // Found -> Served
        debug!(
            stage = %id,
            phase = %DeliveryPhase::Served,
            bytes = stage.content.len(),
            "serving stage"
        );
        Ok(stage.content)
    }

    fn reject(&self, id: &StageId, kind: RejectionKind, phase: DeliveryPhase) -> Rejection {
        warn!(stage = %id, ?kind, %phase, "stage request rejected");
        Rejection::new(kind, phase)
    }
}
