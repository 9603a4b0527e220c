// Authentication: log in, make sure a publishing key exists on disk, and
// sign the short-lived API key the store-publishing endpoints expect.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jwt_simple::prelude::*;

use crate::api::{ApiClient, LoginRequest, LoginResponse, PublishingKey, RemoteId};

const API_KEY_AUDIENCE: &str = "genesis";
const API_KEY_SCOPE: &str = "genesis.generateAccessToken";
const API_KEY_VALIDITY_DAYS: u64 = 1;
// Tolerates a server clock running slightly behind ours.
const CLOCK_SKEW_SECS: u64 = 60;

/// Custom claims carried by the API key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyClaims {
    pub scope: String,
    pub uid: String,
}

/// Log in, load or provision the publishing key, and leave `api` holding
/// both the access token and a fresh API key.
pub fn authenticate(
    api: &mut ApiClient,
    username: &str,
    password: &str,
    keys_dir: &Path,
) -> Result<LoginResponse> {
    let login = api
        .login(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
        .context("Login failed")?;
    api.set_access_token(&login.access_token);
    tracing::info!(user = %login.user_id, publisher = %login.publisher_id, "logged in");

    let key = load_or_create_key(api, keys_dir, &login.user_id)?;
    let api_key = sign_api_key(&key, &login.user_id)?;
    api.set_api_key(&api_key);
    Ok(login)
}

pub fn key_path(keys_dir: &Path, user_id: &RemoteId) -> PathBuf {
    keys_dir.join(format!("{user_id}.json"))
}

/// Read `keys/<user>.json`, asking the server for a new key the first time.
pub fn load_or_create_key(api: &ApiClient, keys_dir: &Path, user_id: &RemoteId) -> Result<PublishingKey> {
    let path = key_path(keys_dir, user_id);
    if !path.exists() {
        let key = api
            .create_publishing_key()
            .context("Failed to generate publishing key")?;
        std::fs::create_dir_all(keys_dir)
            .with_context(|| format!("Failed to create {}", keys_dir.display()))?;
        std::fs::write(&path, serde_json::to_string_pretty(&key)?)
            .with_context(|| format!("Failed to store key in {}", path.display()))?;
        println!("Generated publishing key and stored it in {}.", path.display());
        return Ok(key);
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read key {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Parsing key {}", path.display()))
}

/// Wrap the bare base64 body the server hands out into PKCS#8 PEM.
pub fn private_key_pem(body: &str) -> String {
    pem_armour(body, "PRIVATE KEY")
}

fn pem_armour(body: &str, label: &str) -> String {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in compact.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

// Keys are PKCS#8; older accounts may still hold a PKCS#1 body.
fn rsa_key_pair(body: &str) -> Result<RS256KeyPair> {
    RS256KeyPair::from_pem(&private_key_pem(body))
        .or_else(|_| RS256KeyPair::from_pem(&pem_armour(body, "RSA PRIVATE KEY")))
        .context("Publishing key is not a valid RSA private key")
}

/// Sign an RS256 API key valid for one day.
pub fn sign_api_key(key: &PublishingKey, user_id: &RemoteId) -> Result<String> {
    let key_pair = rsa_key_pair(&key.private_key)?.with_key_id(&key.id.to_string());

    let key_chain = key.key_chain_id.to_string();
    let mut claims = Claims::with_custom_claims(
        ApiKeyClaims {
            scope: API_KEY_SCOPE.to_string(),
            uid: user_id.to_string(),
        },
        Duration::from_days(API_KEY_VALIDITY_DAYS),
    )
    .with_issuer(&key_chain)
    .with_subject(&key_chain)
    .with_audience(API_KEY_AUDIENCE);
    let issued = Clock::now_since_epoch() - Duration::from_secs(CLOCK_SKEW_SECS);
    claims.issued_at = Some(issued);
    claims.invalid_before = Some(issued);

    key_pair.sign(claims).context("Failed to sign API key")
}
