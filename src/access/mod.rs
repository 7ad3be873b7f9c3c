//! Access decisions from the internal API
//!
//! [`AccessResolver::check`] makes exactly one call to
//! `POST /api/v4/internal/allowed` and folds every possible outcome into an
//! [`AccessDecision`]. Permissions are never inferred locally.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, INTERNAL_API_PREFIX};
use crate::command::ActorIdentity;
use crate::command::messages::ACCESS_DENIED;

/// `changes` value sent with every check
///
/// Ref updates of a push are not known before the pack is received, so
/// pushes are authorized for any change here and per-ref checks happen
/// in the receive hooks.
pub const ANY_CHANGES: &str = "_any";

/// Body of the access check call
#[derive(Debug, Clone, Serialize)]
pub struct AccessCheckRequest {
    /// Service being authorized, e.g. "git-receive-pack"
    pub action: String,
    /// Repository path as typed by the operator
    pub project: String,
    /// Always [`ANY_CHANGES`]
    pub changes: String,
    pub protocol: String,
    #[serde(flatten)]
    pub identity: ActorIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_ip: Option<String>,
}

impl AccessCheckRequest {
    pub fn new(
        identity: ActorIdentity,
        action: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            project: project.into(),
            changes: ANY_CHANGES.to_string(),
            protocol: "ssh".to_string(),
            identity,
            check_ip: None,
        }
    }

    pub fn with_check_ip(mut self, ip: Option<String>) -> Self {
        self.check_ip = ip;
        self
    }
}

/// Repository location on the storage service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryCoordinates {
    pub storage_name: String,
    pub relative_path: String,
    #[serde(default)]
    pub git_object_directory: String,
    #[serde(default)]
    pub git_alternate_object_directories: Vec<String>,
    #[serde(default)]
    pub gl_repository: String,
    #[serde(default)]
    pub gl_project_path: String,
}

/// Where and how to reach the storage service for one repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub repository: RepositoryCoordinates,
    pub address: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub features: HashMap<String, String>,
}

/// Body of the access check reply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessCheckResponse {
    pub status: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub gl_id: Option<String>,
    #[serde(default)]
    pub gl_username: Option<String>,
    #[serde(default)]
    pub gl_repository: Option<String>,
    #[serde(default)]
    pub gl_project_path: Option<String>,
    #[serde(default)]
    pub git_config_options: Vec<String>,
    #[serde(default)]
    pub gitaly: Option<BackendDescriptor>,
}

/// Outcome of an access check
#[derive(Debug)]
pub enum AccessDecision {
    /// Allowed, run with local resources
    AllowedLocal(AccessCheckResponse),
    /// Allowed, hand the session to the storage service
    AllowedWithBackend {
        response: AccessCheckResponse,
        backend: BackendDescriptor,
    },
    /// Refused; the message is shown to the operator as-is
    Denied(String),
    /// The API could not be asked
    Error(ApiError),
}

impl AccessDecision {
    /// Label for logs and the audit trail
    pub fn label(&self) -> &'static str {
        match self {
            AccessDecision::AllowedLocal(_) => "allowed_local",
            AccessDecision::AllowedWithBackend { .. } => "allowed_with_backend",
            AccessDecision::Denied(_) => "denied",
            AccessDecision::Error(_) => "error",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            AccessDecision::AllowedLocal(_) | AccessDecision::AllowedWithBackend { .. }
        )
    }
}

/// Turns access check replies into decisions
#[derive(Debug, Clone)]
pub struct AccessResolver {
    client: ApiClient,
}

impl AccessResolver {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Ask the API whether `request` may proceed
    pub async fn check(&self, request: &AccessCheckRequest) -> AccessDecision {
        debug!(
            action = %request.action,
            project = %request.project,
            identity = %request.identity,
            "Checking access"
        );

        let path = format!("{}/allowed", INTERNAL_API_PREFIX);
        let reply = self.client.post::<_, AccessCheckResponse>(&path, request).await;
        let decision = decide(reply);

        info!(
            action = %request.action,
            project = %request.project,
            identity = %request.identity,
            decision = decision.label(),
            "Access decision"
        );
        decision
    }
}

/// Fold a decoded reply or API failure into a decision
pub fn decide(reply: Result<AccessCheckResponse, ApiError>) -> AccessDecision {
    let mut response = match reply {
        Ok(response) => response,
        // Error statuses carrying a message are domain denials
        Err(ApiError::DecodedMessage(message)) => return AccessDecision::Denied(message),
        Err(e) => return AccessDecision::Error(e),
    };

    if !response.status {
        if response.gitaly.take().is_some() {
            warn!("Denied access check reply carried a backend descriptor; ignoring it");
        }
        let message = response
            .message
            .take()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| ACCESS_DENIED.to_string());
        return AccessDecision::Denied(message);
    }

    match response.gitaly.take() {
        None => AccessDecision::AllowedLocal(response),
        Some(backend) if backend.address.trim().is_empty() => {
            AccessDecision::Error(ApiError::ProtocolViolation {
                status: 200,
                detail: "backend descriptor has an empty address".to_string(),
            })
        }
        Some(backend) => AccessDecision::AllowedWithBackend { response, backend },
    }
}
