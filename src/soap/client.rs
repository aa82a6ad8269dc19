//! Session manager administration client.
//!
//! [`AdminApi`] lists the operations the modules need. [`SoapAdminClient`]
//! implements them over HTTP: one POST per call, HTTP Basic credentials,
//! rpc/encoded envelopes and normalized results.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, trace};
use url::Url;

use super::envelope::{decode_fault, decode_response, encode_request};
use super::value::{denormalize, normalize, NormalizedValue, Scalar, SoapValue};
use super::{SoapError, SoapResult};
use crate::config::AdminConfig;

/// A user session known to the session manager
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Identifier passed to `session_kill`
    pub id: String,
    /// Everything the service reported about the session
    pub data: NormalizedValue,
}

impl Session {
    /// Extract sessions from a normalized `sessions_list` result.
    ///
    /// The service answers with a mapping keyed by session id, a sequence of
    /// session records, or a false/empty value when nothing is running.
    pub fn from_listing(listing: NormalizedValue) -> SoapResult<Vec<Session>> {
        match listing {
            NormalizedValue::Mapping(map) => Ok(map
                .into_iter()
                .map(|(key, data)| Session {
                    id: session_id(&data).unwrap_or(key),
                    data,
                })
                .collect()),
            NormalizedValue::Sequence(items) => items
                .into_iter()
                .map(|data| match session_id(&data) {
                    Some(id) => Ok(Session { id, data }),
                    None => Err(SoapError::unexpected(
                        "sessions_list",
                        "session entry without an id",
                    )),
                })
                .collect(),
            NormalizedValue::Scalar(s) if !s.truthy() => Ok(Vec::new()),
            NormalizedValue::Scalar(s) => Err(SoapError::unexpected(
                "sessions_list",
                format!("expected a list of sessions, got '{}'", s),
            )),
        }
    }
}

fn session_id(data: &NormalizedValue) -> Option<String> {
    match data.get("id")? {
        NormalizedValue::Scalar(Scalar::Null) => None,
        NormalizedValue::Scalar(s) => Some(s.to_key()),
        _ => None,
    }
}

/// Operations of the administration service used by the modules
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Server-wide flags, including `system_in_maintenance`
    async fn get_initial_configuration(&self) -> SoapResult<NormalizedValue>;

    /// Full settings tree; each leaf setting carries its current `value`
    async fn settings_get(&self) -> SoapResult<NormalizedValue>;

    /// Apply a nested settings mapping; returns the service acknowledgement
    async fn settings_set(&self, settings: &NormalizedValue) -> SoapResult<bool>;

    /// Sessions currently known to the session manager
    async fn sessions_list(&self) -> SoapResult<Vec<Session>>;

    /// Terminate one session
    async fn session_kill(&self, id: &str) -> SoapResult<bool>;

    /// Install a base64 encoded subscription certificate
    async fn certificate_add(&self, certificate: &str) -> SoapResult<bool>;
}

/// Opens [`AdminApi`] sessions for a host and credentials
pub trait AdminConnector: Send + Sync {
    fn connect(&self, host: &str, user: &str, password: &str) -> SoapResult<Arc<dyn AdminApi>>;
}

/// Connector building [`SoapAdminClient`]s from the admin configuration
#[derive(Debug, Clone, Default)]
pub struct SoapConnector {
    config: AdminConfig,
}

impl SoapConnector {
    pub fn new(config: AdminConfig) -> Self {
        Self { config }
    }
}

impl AdminConnector for SoapConnector {
    fn connect(&self, host: &str, user: &str, password: &str) -> SoapResult<Arc<dyn AdminApi>> {
        Ok(Arc::new(SoapAdminClient::new(&self.config, host, user, password)?))
    }
}

/// [`AdminApi`] over SOAP 1.1
#[derive(Debug, Clone)]
pub struct SoapAdminClient {
    client: Client,
    endpoint: Url,
    namespace: String,
    user: String,
    password: String,
}

impl SoapAdminClient {
    /// Client for the service on `host`.
    ///
    /// The endpoint is `<scheme>://<host><endpoint_path>` from the admin
    /// configuration; `host` may carry a port.
    pub fn new(config: &AdminConfig, host: &str, user: &str, password: &str) -> SoapResult<Self> {
        let raw = format!("{}://{}{}", config.scheme, host, config.endpoint_path);
        let endpoint = Url::parse(&raw).map_err(|e| SoapError::Transport {
            method: String::new(),
            message: format!("Invalid service URL '{}': {}", raw, e),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .danger_accept_invalid_certs(!config.validate_certs)
            .build()
            .map_err(|e| SoapError::Transport {
                method: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            namespace: config.namespace.clone(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Service endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Invoke `method` and normalize its return value.
    pub async fn call(&self, method: &str, args: &[SoapValue]) -> SoapResult<NormalizedValue> {
        let body = encode_request(&self.namespace, method, args)?;
        debug!(endpoint = %self.endpoint, method = %method, "SOAP call");
        trace!(request = %body, "SOAP request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}#{}\"", self.namespace, method))
            .body(body)
            .send()
            .await
            .map_err(|e| SoapError::Transport {
                method: method.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| SoapError::Transport {
            method: method.to_string(),
            message: format!("Failed to read response: {}", e),
        })?;
        trace!(status = status.as_u16(), response = %text, "SOAP response");

        if !status.is_success() {
            // SOAP 1.1 reports faults with a 500 status
            return Err(decode_fault(&text).unwrap_or(SoapError::Http {
                method: method.to_string(),
                status: status.as_u16(),
                body: text,
            }));
        }

        let value = decode_response(method, &text)?;
        Ok(normalize(&value)?)
    }

    async fn call_flag(&self, method: &str, args: &[SoapValue]) -> SoapResult<bool> {
        Ok(self.call(method, args).await?.truthy())
    }
}

#[async_trait]
impl AdminApi for SoapAdminClient {
    async fn get_initial_configuration(&self) -> SoapResult<NormalizedValue> {
        self.call("getInitialConfiguration", &[]).await
    }

    async fn settings_get(&self) -> SoapResult<NormalizedValue> {
        self.call("settings_get", &[]).await
    }

    async fn settings_set(&self, settings: &NormalizedValue) -> SoapResult<bool> {
        self.call_flag("settings_set", &[denormalize(settings)]).await
    }

    async fn sessions_list(&self) -> SoapResult<Vec<Session>> {
        let listing = self.call("sessions_list", &[]).await?;
        Session::from_listing(listing)
    }

    async fn session_kill(&self, id: &str) -> SoapResult<bool> {
        self.call_flag("session_kill", &[SoapValue::string(id)]).await
    }

    async fn certificate_add(&self, certificate: &str) -> SoapResult<bool> {
        self.call_flag("certificate_add", &[SoapValue::string(certificate)])
            .await
    }
}
