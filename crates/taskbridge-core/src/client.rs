//! Typed client for the target task API.
//!
//! Every call is signed with the event's [`Credential`]. A non-success HTTP
//! response becomes [`RemoteError`] carrying the provider's error body; the
//! orchestrator only looks at `code` where a flow needs to.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::credential::Credential;
use crate::model::{RemoteTask, TargetTaskMutation};

/// Default base URL of the target REST API.
pub const DEFAULT_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1";

/// Provider-reported failure for one request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("target API error {code}: {message}")]
pub struct RemoteError {
    pub code: u16,
    pub message: String,
}

impl RemoteError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.code == 404
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("target API unreachable: {0}")]
    Transport(String),

    #[error("target API returned an undecodable body: {0}")]
    Decode(String),
}

impl ClientError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(remote) if remote.is_not_found())
    }
}

/// Create/read/update/delete on one target task list.
pub trait TaskApi {
    /// # Errors
    ///
    /// Returns [`ClientError`] when the call does not succeed.
    fn create(&self, payload: &TargetTaskMutation) -> Result<RemoteTask, ClientError>;

    /// # Errors
    ///
    /// Returns [`ClientError`] when the call does not succeed.
    fn retrieve(&self, id: &str) -> Result<RemoteTask, ClientError>;

    /// # Errors
    ///
    /// Returns [`ClientError`] when the call does not succeed.
    fn update(&self, id: &str, payload: &TargetTaskMutation) -> Result<RemoteTask, ClientError>;

    /// # Errors
    ///
    /// Returns [`ClientError`] when the call does not succeed.
    fn delete(&self, id: &str) -> Result<(), ClientError>;
}

/// Builds a [`TaskApi`] bound to one list and one user's credential.
pub trait TaskApiConnector: Send + Sync {
    type Api: TaskApi;

    fn connect(&self, list_id: &str, credential: &Credential) -> Self::Api;
}

/// Shared transport settings; hands out per-event [`GoogleTasksClient`]s.
#[derive(Clone)]
pub struct GoogleTasksConnector {
    agent: ureq::Agent,
    api_base: String,
}

impl GoogleTasksConnector {
    #[must_use]
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl TaskApiConnector for GoogleTasksConnector {
    type Api = GoogleTasksClient;

    fn connect(&self, list_id: &str, credential: &Credential) -> GoogleTasksClient {
        GoogleTasksClient {
            agent: self.agent.clone(),
            list_url: format!("{}/lists/{list_id}/tasks", self.api_base),
            authorization: credential.bearer(),
        }
    }
}

/// Client for a single task list, signed with one bearer token.
pub struct GoogleTasksClient {
    agent: ureq::Agent,
    list_url: String,
    authorization: String,
}

#[derive(Deserialize)]
struct FailResponse {
    error: FailDetail,
}

#[derive(Deserialize)]
struct FailDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

impl GoogleTasksClient {
    fn url_of(&self, task_id: &str) -> String {
        format!("{}/{task_id}", self.list_url)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &self.authorization)
            .set("Accept", "application/json")
    }

    fn handle_response<T: DeserializeOwned>(
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<T, ClientError> {
        let response = Self::check(result)?;
        response
            .into_json::<T>()
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    fn check(result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, ClientError> {
        match result {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                let remote = remote_error(status, &body);
                error!(code = remote.code, message = %remote.message, "target API request failed");
                Err(remote.into())
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(ClientError::Transport(transport.to_string()))
            }
        }
    }
}

/// Decode the provider's `{"error":{"code","message"}}` body, falling back to
/// the HTTP status and raw body.
fn remote_error(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<FailResponse>(body) {
        Ok(fail) => RemoteError {
            code: fail.error.code.unwrap_or(status),
            message: fail.error.message,
        },
        Err(_) => RemoteError {
            code: status,
            message: body.trim().to_string(),
        },
    }
}

impl TaskApi for GoogleTasksClient {
    fn create(&self, payload: &TargetTaskMutation) -> Result<RemoteTask, ClientError> {
        let task: RemoteTask =
            Self::handle_response(self.request("POST", &self.list_url).send_json(payload))?;
        debug!(target_id = %task.id, "target task created");
        Ok(task)
    }

    fn retrieve(&self, id: &str) -> Result<RemoteTask, ClientError> {
        Self::handle_response(self.request("GET", &self.url_of(id)).call())
    }

    fn update(&self, id: &str, payload: &TargetTaskMutation) -> Result<RemoteTask, ClientError> {
        let body = TargetTaskMutation {
            id: Some(id.to_string()),
            ..payload.clone()
        };
        let task: RemoteTask =
            Self::handle_response(self.request("PUT", &self.url_of(id)).send_json(&body))?;
        debug!(target_id = %task.id, "target task updated");
        Ok(task)
    }

    fn delete(&self, id: &str) -> Result<(), ClientError> {
        Self::check(self.request("DELETE", &self.url_of(id)).call())?;
        debug!(target_id = id, "target task deleted");
        Ok(())
    }
}
