// Package descriptors: the `packages/<name>.json` files a publisher edits by
// hand, and the version update payload derived from them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::PackageVersion;

/// Locales the storefront keeps metadata for.
pub const LOCALES: [&str; 4] = ["en_US", "zh_CN", "ko_KR", "ja_JP"];

/// Key image slots of a package version.
pub const KEY_IMAGE_TYPES: [&str; 4] = ["icon", "card", "cover", "social_media"];

/// Artwork kinds sent as file uploads; anything else is a hosted URL.
pub const FILE_ARTWORK_TYPES: [&str; 3] = ["screenshot", "audio", "video"];

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    #[serde(default)]
    pub package_id: Option<Value>,
    #[serde(default)]
    pub category: Value,
    #[serde(default)]
    pub metadatas: Map<String, Value>,
    #[serde(default)]
    pub artworks: Vec<Artwork>,
    #[serde(default)]
    pub key_images: BTreeMap<String, Option<PathBuf>>,
    #[serde(default)]
    pub unitypackages: BTreeMap<String, Option<UnityPackageEntry>>,
    #[serde(default)]
    pub version_name: Value,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub submission: Option<Submission>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Artwork {
    #[serde(rename = "type")]
    pub kind: String,
    /// Local file for screenshots/audio/video, a URL otherwise.
    pub source: String,
}

impl Artwork {
    pub fn is_file(&self) -> bool {
        FILE_ARTWORK_TYPES.contains(&self.kind.as_str())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnityPackageEntry {
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub slices: Option<usize>,
    /// Upload worker count for this package.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub always_upload: bool,
    #[serde(default)]
    pub srps: Vec<Value>,
    #[serde(default)]
    pub dependencies: Vec<Value>,
}

/// Tags as a JSON list or a single comma separated string.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Tags {
    List(Vec<String>),
    Joined(String),
}

impl Tags {
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Tags::List(tags) => tags.clone(),
            Tags::Joined(s) => s.split(',').map(|t| t.trim().to_string()).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub submit_message: Option<String>,
    pub auto_publish: Option<bool>,
    pub accept_latest_terms: Option<bool>,
}

impl PackageDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read package descriptor {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Parsing package descriptor {}", path.display()))
    }

    /// English display name, required to create a package.
    pub fn name(&self) -> Option<&str> {
        self.metadatas.get("en_US")?.get("name")?.as_str()
    }
}

/// Record a new package id in the descriptor file, leaving every other field
/// exactly as the user wrote it.
pub fn write_package_id(path: &Path, package_id: &Value) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read package descriptor {}", path.display()))?;
    let mut doc: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing package descriptor {}", path.display()))?;
    let obj = doc
        .as_object_mut()
        .with_context(|| format!("{} is not a JSON object", path.display()))?;
    obj.insert("packageId".into(), package_id.clone());
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("Failed to write package descriptor {}", path.display()))
}

/// Whether the local archive needs to be sent again.
pub fn needs_upload(entry: &UnityPackageEntry, local_size: u64, remote_size: Option<&str>) -> bool {
    entry.always_upload || remote_size != Some(local_size.to_string().as_str())
}

/// Body of the `PUT package-version` call that follows a save.
pub fn version_update_body(desc: &PackageDescriptor, remote: &PackageVersion) -> Value {
    let metadatas: Map<String, Value> = LOCALES
        .iter()
        .map(|&l| (l.to_string(), desc.metadatas.get(l).cloned().unwrap_or(Value::Null)))
        .collect();

    // The server appends uploaded artworks, so the ones from this save are
    // the trailing entries.
    let keep_from = remote.artworks.len().saturating_sub(desc.artworks.len());
    let artworks = &remote.artworks[keep_from..];

    let key_images: Map<String, Value> = KEY_IMAGE_TYPES
        .iter()
        .filter(|&&t| desc.key_images.get(t).map_or(true, Option::is_none))
        .map(|&t| (t.to_string(), Value::Null))
        .collect();

    let mut unitypackages: Map<String, Value> = remote
        .unitypackages
        .keys()
        .map(|k| (k.clone(), Value::Null))
        .collect();
    for (unity_version, entry) in &desc.unitypackages {
        if let Some(entry) = entry {
            unitypackages.insert(
                unity_version.clone(),
                json!({ "srps": entry.srps, "dependencies": entry.dependencies }),
            );
        }
    }

    json!({
        "versionName": desc.version_name,
        "price": desc.price,
        "category": desc.category,
        "metadatas": metadatas,
        "tags": desc.tags.as_ref().map(Tags::to_list),
        "artworks": artworks,
        "keyImages": key_images,
        "unitypackages": unitypackages,
    })
}
