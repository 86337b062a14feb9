//! Discovery/auth client (C4): the HTTP side of reaching a remote-lab
//! service, separate from the binary session channel.

use std::collections::HashMap;
use std::time::Duration;

use md5::{Digest as _, Md5};
use serde::Deserialize;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::RemoteError;
use crate::registry::{AuthMethod, EndpointOption};

const STATUS_TIMEOUT: Duration = Duration::from_millis(1500);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(20);

/// `GET <url>/` response. Only `status`/`version` gate behavior in this
/// crate; the rest is exposed for the host's own selectors.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceStatus {
    pub version: String,
    pub status: String,
    pub uptime: u64,
    #[serde(default)]
    pub devices: HashMap<String, u32>,
    #[serde(default, rename = "devicesAmount")]
    pub devices_amount: HashMap<String, u32>,
    #[serde(default, rename = "devicesAvailable")]
    pub devices_available: HashMap<String, u32>,
    #[serde(default)]
    pub methods: HashMap<String, u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoginReply {
    Ok {
        #[allow(dead_code)]
        reply: String,
        host: String,
        port: u16,
        token: String,
    },
    Err {
        #[allow(dead_code)]
        reply: String,
        msg: String,
    },
}

/// Resolved parameters to hand to C6 after a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBootstrapTarget {
    pub host: String,
    pub port: u16,
    pub token: String,
}

pub struct DiscoveryClient {
    http: reqwest::Client,
}

impl DiscoveryClient {
    /// Major version this build speaks. A server whose status reports a
    /// different major version fails `version_major_compatible` before
    /// any credentials are sent.
    pub const CLIENT_MAJOR_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    pub async fn status(&self, base_url: &str) -> Result<ServiceStatus, RemoteError> {
        let resp = self
            .http
            .get(base_url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;
        Ok(resp.json::<ServiceStatus>().await?)
    }

    pub async fn logo(&self, base_url: &str) -> Result<Vec<u8>, RemoteError> {
        let resp = self
            .http
            .get(format!("{base_url}logo"))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn method_image(
        &self,
        base_url: &str,
        token: &str,
        device_id: u32,
    ) -> Result<Vec<u8>, RemoteError> {
        let resp = self
            .http
            .post(format!("{base_url}method"))
            .timeout(STATUS_TIMEOUT)
            .form(&[("token", token), ("deviceId", &device_id.to_string())])
            .send()
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// `POST <url>/login`. Hashes `password` per `option.auth` before
    /// sending. Call [`version_major_compatible`] first — this function
    /// does not check it.
    pub async fn login(
        &self,
        option: &EndpointOption,
        username: &str,
        password: &str,
    ) -> Result<SessionBootstrapTarget, RemoteError> {
        let hashed = hash_password(option.auth, password);

        let resp = self
            .http
            .post(format!("{}login", option.url))
            .timeout(LOGIN_TIMEOUT)
            .form(&[("login", username), ("passwd", &hashed)])
            .send()
            .await?;

        let parsed: LoginReply = resp.json().await?;
        match parsed {
            LoginReply::Ok { host, port, token, .. } => {
                let resolved_host = resolve_host(&host, &option.url)?;
                Ok(SessionBootstrapTarget {
                    host: resolved_host,
                    port,
                    token,
                })
            }
            LoginReply::Err { msg, .. } => Err(RemoteError::auth_failure(msg)),
        }
    }
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare a server-reported version string's leading major-version digit
/// run to `DiscoveryClient::CLIENT_MAJOR_VERSION`. An optional single
/// non-digit prefix character (e.g. `"v1.2.3"`) is tolerated.
pub fn version_major_compatible(server_version: &str) -> bool {
    let digits_start = server_version
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i);

    let Some(start) = digits_start else {
        return false;
    };
    // Only a single optional non-digit prefix char is tolerated.
    if start > 1 {
        return false;
    }

    let rest = &server_version[start..];
    let major: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    major.parse::<u32>().map(|m| m == DiscoveryClient::CLIENT_MAJOR_VERSION).unwrap_or(false)
}

fn hash_password(method: AuthMethod, password: &str) -> String {
    match method {
        AuthMethod::Plain | AuthMethod::None => password.to_string(),
        AuthMethod::Md5 => {
            let digest = Md5::digest(password.as_bytes());
            hex::encode(digest)
        }
        AuthMethod::Sha1 => {
            let digest = Sha1::digest(password.as_bytes());
            hex::encode(digest)
        }
        AuthMethod::Sha256 => {
            let digest = Sha256::digest(password.as_bytes());
            hex::encode(digest)
        }
    }
}

fn resolve_host(host: &str, fallback_url: &str) -> Result<String, RemoteError> {
    if host == "0.0.0.0" {
        let parsed = url::Url::parse(fallback_url)
            .map_err(|e| RemoteError::network(format!("bad service url: {e}")))?;
        return Ok(parsed.host_str().unwrap_or(host).to_string());
    }

    let lookup = dns_lookup::lookup_host(host)
        .map_err(|e| RemoteError::network(format!("dns lookup for {host} failed: {e}")))?;
    let first_v4 = lookup
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| lookup.first())
        .ok_or_else(|| RemoteError::network(format!("no address records for {host}")))?;
    Ok(first_v4.to_string())
}
