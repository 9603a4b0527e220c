// API client module: a blocking HTTP client for the storefront's REST API.
//
// Two bearer credentials are in play. Account endpoints (`/api/...`) take
// the access token returned by login; store-publishing endpoints take the
// signed API key. Every call goes through `send`, which logs timing and
// turns anything other than 200/204 into an `ApiError::Status`.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::upload::{SliceTransport, StagedSlice, UploadTarget};

/// Identifier as the server sends it; some endpoints use numbers, some
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

/// Login request payload.
#[derive(Serialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response from the login endpoint.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: RemoteId,
    pub access_token: String,
    pub publisher_id: RemoteId,
}

/// Key material handed out once per user by `/api/publishing-key`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublishingKey {
    pub id: RemoteId,
    pub key_chain_id: RemoteId,
    /// Base64 PKCS#8 body without PEM armour.
    pub private_key: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Summary of a package and its versions.
#[derive(Deserialize, Debug, Clone)]
pub struct Package {
    pub id: RemoteId,
    #[serde(default)]
    pub versions: Vec<VersionSummary>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VersionSummary {
    pub id: RemoteId,
    #[serde(default)]
    pub status: String,
}

/// The parts of a package version the publishing workflows look at.
#[derive(Deserialize, Debug, Clone)]
pub struct PackageVersion {
    pub id: RemoteId,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub artworks: Vec<Value>,
    #[serde(default)]
    pub unitypackages: serde_json::Map<String, Value>,
}

impl PackageVersion {
    /// Size the server recorded for the unitypackage of `unity_version`.
    pub fn unitypackage_size(&self, unity_version: &str) -> Option<String> {
        match self.unitypackages.get(unity_version)?.get("size")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Credential {
    AccessToken,
    ApiKey,
}

/// Blocking client for the storefront API, holding the base URL and
/// whichever bearer credentials have been obtained so far.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    api_key: Option<String>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.is_some())
            .field("api_key", &self.api_key.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Build a client for `base_url`. `timeout` bounds each request; `None`
    /// leaves requests unbounded, which large slices usually need.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
            api_key: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_access_token(&mut self, token: &str) {
        self.access_token = Some(token.to_string());
    }

    pub fn set_api_key(&mut self, key: &str) {
        self.api_key = Some(key.to_string());
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn version_url(&self, version_id: &str, suffix: &str) -> String {
        self.url(&format!("/store-publishing/package-version/{version_id}{suffix}"))
    }

    fn auth_headers(&self, credential: Credential) -> Result<HeaderMap, ApiError> {
        let token = match credential {
            Credential::AccessToken => self
                .access_token
                .as_deref()
                .ok_or(ApiError::MissingCredential("access token"))?,
            Credential::ApiKey => self
                .api_key
                .as_deref()
                .ok_or(ApiError::MissingCredential("API key"))?,
        };
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        Ok(headers)
    }

    /// Send a request and reject any status other than 200/204.
    fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let req = req.build()?;
        let method = req.method().to_string();
        let url = req.url().to_string();
        let started = Instant::now();
        let res = self.client.execute(req)?;
        let status = res.status();
        tracing::debug!(
            %method,
            %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            let body = res.text().unwrap_or_default();
            tracing::warn!(%method, %url, status = status.as_u16(), %body, "request rejected");
            return Err(ApiError::Status {
                method,
                url,
                status,
                body,
            });
        }
        Ok(res)
    }

    fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let res = self.send(req)?;
        let url = res.url().to_string();
        let bytes = res.bytes()?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { url, source })
    }

    fn get_json<T: DeserializeOwned>(&self, url: String, credential: Credential) -> Result<T, ApiError> {
        let headers = self.auth_headers(credential)?;
        self.send_json(self.client.get(url).headers(headers))
    }

    fn publishing_post(&self, url: String) -> Result<RequestBuilder, ApiError> {
        Ok(self.client.post(url).headers(self.auth_headers(Credential::ApiKey)?))
    }

    // ---- account ----

    /// Log in with username and password.
    pub fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.send_json(self.client.post(self.url("/api/login")).json(req))
    }

    /// Ask the server to mint a publishing key for the logged-in user.
    pub fn create_publishing_key(&self) -> Result<PublishingKey, ApiError> {
        let headers = self.auth_headers(Credential::AccessToken)?;
        self.send_json(self.client.post(self.url("/api/publishing-key")).headers(headers))
    }

    pub fn publishing_limit(&self) -> Result<Value, ApiError> {
        self.get_json(self.url("/api/publishing-limit"), Credential::AccessToken)
    }

    // ---- packages ----

    pub fn create_package(&self, name: &str, category: &Value) -> Result<Value, ApiError> {
        let req = self
            .publishing_post(self.url("/store-publishing/package"))?
            .json(&json!({ "name": name, "category": category }));
        self.send_json(req)
    }

    pub fn get_package<T: DeserializeOwned>(&self, package_id: &str) -> Result<T, ApiError> {
        self.get_json(
            self.url(&format!("/store-publishing/package/{package_id}")),
            Credential::ApiKey,
        )
    }

    pub fn deprecate_package(&self, package_id: &str) -> Result<(), ApiError> {
        let headers = self.auth_headers(Credential::ApiKey)?;
        let url = self.url(&format!("/store-publishing/package/{package_id}/deprecate"));
        self.send(self.client.delete(url).headers(headers)).map(drop)
    }

    pub fn setup_launch_discount(
        &self,
        package_ids: &[u64],
        discount: u32,
        duration: u32,
    ) -> Result<(), ApiError> {
        let req = self
            .publishing_post(self.url("/store-publishing/promotion/launch"))?
            .json(&json!({
                "packageIds": package_ids,
                "discount": discount,
                "duration": duration,
            }));
        self.send(req).map(drop)
    }

    pub fn categories(&self) -> Result<Value, ApiError> {
        self.get_json(self.url("/store-publishing/fetch/categories"), Credential::ApiKey)
    }

    pub fn unity_versions(&self) -> Result<Value, ApiError> {
        self.get_json(self.url("/store-publishing/fetch/unity-versions"), Credential::ApiKey)
    }

    // ---- package versions ----

    pub fn create_package_version<T: DeserializeOwned>(&self, package_id: &Value) -> Result<T, ApiError> {
        let req = self
            .publishing_post(self.url("/store-publishing/package-version"))?
            .json(&json!({ "packageId": package_id }));
        self.send_json(req)
    }

    pub fn get_package_version<T: DeserializeOwned>(&self, version_id: &str) -> Result<T, ApiError> {
        self.get_json(self.version_url(version_id, ""), Credential::ApiKey)
    }

    pub fn update_package_version(&self, version_id: &str, body: &Value) -> Result<PackageVersion, ApiError> {
        let headers = self.auth_headers(Credential::ApiKey)?;
        let req = self
            .client
            .put(self.version_url(version_id, ""))
            .headers(headers)
            .json(body);
        self.send_json(req)
    }

    pub fn delete_package_version(&self, version_id: &str) -> Result<(), ApiError> {
        let headers = self.auth_headers(Credential::ApiKey)?;
        self.send(self.client.delete(self.version_url(version_id, "")).headers(headers))
            .map(drop)
    }

    pub fn submit_package_version(&self, version_id: &str, body: &Value) -> Result<(), ApiError> {
        let req = self
            .publishing_post(self.version_url(version_id, "/submit"))?
            .json(body);
        self.send(req).map(drop)
    }

    /// Upload a screenshot, audio or video file as an artwork.
    pub fn upload_artwork_file(
        &self,
        version_id: &str,
        kind: &str,
        file: &Path,
    ) -> Result<PackageVersion, ApiError> {
        let form = file_form(file)?;
        let req = self
            .publishing_post(self.version_url(version_id, &format!("/{kind}")))?
            .multipart(form);
        self.send_json(req)
    }

    /// Register an externally hosted artwork (e.g. a video link).
    pub fn add_artwork_url(&self, version_id: &str, kind: &str, url: &str) -> Result<PackageVersion, ApiError> {
        let req = self
            .publishing_post(self.version_url(version_id, &format!("/media/{kind}")))?
            .form(&[("url", url)]);
        self.send_json(req)
    }

    /// Upload one of the key images (icon, card, cover, social-media).
    pub fn upload_key_image(
        &self,
        version_id: &str,
        kind: &str,
        file: &Path,
    ) -> Result<PackageVersion, ApiError> {
        let form = file_form(file)?;
        let req = self
            .publishing_post(self.version_url(version_id, &format!("/keyimage/{kind}")))?
            .multipart(form);
        self.send_json(req)
    }
}

fn file_form(file: &Path) -> Result<multipart::Form, ApiError> {
    multipart::Form::new()
        .file("file", file)
        .map_err(|source| ApiError::File {
            path: file.to_path_buf(),
            source,
        })
}

impl SliceTransport for ApiClient {
    fn prepare_upload(&self, target: &UploadTarget, slice_lengths: &[u64]) -> Result<(), ApiError> {
        let req = self
            .publishing_post(self.version_url(&target.version_id, "/unitypackage/prepare"))?
            .json(&json!({
                "unityVersion": target.asset_kind,
                "sizes": slice_lengths,
            }));
        self.send(req).map(drop)
    }

    fn upload_slice(&self, target: &UploadTarget, staged: &StagedSlice) -> Result<(), ApiError> {
        let file = staged.reader().map_err(|source| ApiError::File {
            path: staged.path().to_path_buf(),
            source,
        })?;
        let part = multipart::Part::reader_with_length(file, staged.len())
            .file_name(format!("slice-{}.partial", staged.index()))
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new()
            .text("unityVersion", target.asset_kind.clone())
            .text("index", staged.index().to_string())
            .part("file", part);
        let req = self
            .publishing_post(self.version_url(&target.version_id, "/unitypackage"))?
            .multipart(form);
        self.send(req).map(drop)
    }
}
