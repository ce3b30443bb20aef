//! HTTP client for the core's REST controller.

use crate::DEFAULT_API_HOST;
use crate::error::controller::ControllerError;

use common::{ErrorLocation, HttpStatusCode, RedactedSecret};
use models::RoutingMode;

use std::panic::Location;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, trace};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use url::Url;

const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT_DURATION: Duration = Duration::from_secs(2);
const VERSION_ENDPOINT: &str = "version";
const CONFIGS_ENDPOINT: &str = "configs";
const FORCE_QUERY: &str = "force=true";
const UNSPECIFIED_HOSTS: [&str; 4] = ["", "0.0.0.0", "::", "[::]"];

#[derive(Deserialize)]
struct VersionBody {
    version: String,
}

#[derive(Deserialize)]
struct ConfigsBody {
    mode: String,
}

/// Parse an `external-controller` value (`host:port`).
///
/// Wildcard bind addresses map to loopback since that is where the
/// supervisor connects from.
pub fn parse_external_controller(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.trim().rsplit_once(':')?;
    let port = port.parse::<u16>().ok().filter(|p| *p > 0)?;

    let host = if UNSPECIFIED_HOSTS.contains(&host) {
        DEFAULT_API_HOST.to_string()
    } else {
        host.trim_start_matches('[').trim_end_matches(']').to_string()
    };

    Some((host, port))
}

#[derive(Clone)]
pub struct ControllerClient {
    base_url: Url,
    client: Client,
    secret: Option<RedactedSecret>,
}

impl ControllerClient {
    pub fn new(
        host: &str,
        port: u16,
        secret: Option<RedactedSecret>,
    ) -> Result<Self, ControllerError> {
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let base_url = Url::parse(&format!("http://{host}:{port}/"))?;
        let client = Client::builder().timeout(DEFAULT_TIMEOUT_DURATION).build()?;

        Ok(Self {
            base_url,
            client,
            secret,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn prepare_request(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.secret {
            Some(secret) => request.header(AUTHORIZATION, secret.bearer()),
            None => request,
        }
    }

    async fn check_status(response: Response) -> Result<Response, ControllerError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = HttpStatusCode::from(response.status().as_u16());
        Err(ControllerError::Status {
            message: response.text().await.unwrap_or_default(),
            status,
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// `GET /version`. Doubles as the liveness probe.
    pub async fn version(&self) -> Result<String, ControllerError> {
        let url = self.base_url.join(VERSION_ENDPOINT)?;

        let response = self
            .prepare_request(self.client.get(url))
            .timeout(PROBE_TIMEOUT_DURATION)
            .send()
            .await?;
        let body: VersionBody = Self::check_status(response).await?.json().await?;

        trace!("Core controller at {} reports {}", self.base_url, body.version);
        Ok(body.version)
    }

    /// True when `/version` answers successfully.
    pub async fn is_alive(&self) -> bool {
        match self.version().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Controller probe failed for {}: {e}", self.base_url);
                false
            }
        }
    }

    pub async fn get_routing_mode(&self) -> Result<RoutingMode, ControllerError> {
        let url = self.base_url.join(CONFIGS_ENDPOINT)?;

        let response = self.prepare_request(self.client.get(url)).send().await?;
        let body: ConfigsBody = Self::check_status(response).await?.json().await?;

        RoutingMode::from_str(&body.mode).map_err(|e| ControllerError::Json {
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    pub async fn set_routing_mode(&self, mode: RoutingMode) -> Result<(), ControllerError> {
        self.patch_configs(json!({ "mode": mode.as_str() })).await
    }

    pub async fn set_tun(&self, enabled: bool) -> Result<(), ControllerError> {
        self.patch_configs(json!({ "tun": { "enable": enabled } }))
            .await
    }

    /// `PUT /configs?force=true` with the profile path.
    pub async fn reload_config(&self, path: &Path) -> Result<(), ControllerError> {
        let mut url = self.base_url.join(CONFIGS_ENDPOINT)?;
        url.set_query(Some(FORCE_QUERY));

        let response = self
            .prepare_request(self.client.put(url))
            .json(&json!({ "path": path.to_string_lossy() }))
            .send()
            .await?;
        Self::check_status(response).await?;

        debug!("Core reloaded profile {}", path.display());
        Ok(())
    }

    async fn patch_configs(&self, body: serde_json::Value) -> Result<(), ControllerError> {
        let url = self.base_url.join(CONFIGS_ENDPOINT)?;

        let response = self
            .prepare_request(self.client.patch(url))
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await?;

        debug!("Patched core configs: {body}");
        Ok(())
    }
}
