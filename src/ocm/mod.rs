//! Client for the OCM upgrade-policy endpoint.
//!
//! Only `PatchUpgradePolicy` is consumed by this operator; the endpoint is
//! cluster-specific and authenticated with a bearer token read from the
//! secret referenced by the AddonOperator singleton.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crd::AddonUpgradePolicyValue;

#[derive(Error, Debug)]
pub enum OcmError {
    #[error("OCM transport error: {0}")]
    Transport(String),

    #[error("OCM request could not be built: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("OCM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("OCM response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UpgradePolicyPatchRequest {
    pub id: String,
    pub value: AddonUpgradePolicyValue,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UpgradePolicyPatchResponse {}

/// Upgrade-policy endpoint surface, object-safe for injection into the
/// reconciler and for test doubles.
pub trait OcmClient: Send + Sync {
    fn patch_upgrade_policy(
        &self,
        request: UpgradePolicyPatchRequest,
    ) -> BoxFuture<'_, Result<UpgradePolicyPatchResponse, OcmError>>;
}

/// HTTP implementation against the cluster-specific OCM base URL.
pub struct HttpOcmClient {
    client: HttpClient<HttpConnector, Full<Bytes>>,
    base_url: String,
    access_token: String,
}

impl HttpOcmClient {
    pub fn new(endpoint: &str, access_token: &str) -> Self {
        Self {
            client: HttpClient::builder(TokioExecutor::new()).build_http(),
            base_url: endpoint.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn policy_state_url(&self, policy_id: &str) -> String {
        format!("{}/upgrade_policies/{}/state", self.base_url, policy_id)
    }
}

impl OcmClient for HttpOcmClient {
    fn patch_upgrade_policy(
        &self,
        request: UpgradePolicyPatchRequest,
    ) -> BoxFuture<'_, Result<UpgradePolicyPatchResponse, OcmError>> {
        async move {
            let body = serde_json::to_vec(&serde_json::json!({
                "value": request.value,
                "description": request.description,
            }))?;

            let req = Request::builder()
                .method(Method::PATCH)
                .uri(self.policy_state_url(&request.id))
                .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body)))?;

            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| OcmError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| OcmError::Transport(e.to_string()))?
                .to_bytes();

            if !status.is_success() {
                return Err(OcmError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).to_string(),
                });
            }

            if body.is_empty() {
                Ok(UpgradePolicyPatchResponse::default())
            } else {
                Ok(serde_json::from_slice(&body)?)
            }
        }
        .boxed()
    }
}
