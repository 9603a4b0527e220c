// Publishing workflows: create, save and submit packages described by the
// JSON files in the workspace. These are plain sequential REST calls; the
// only heavy lifting (unitypackage upload) is delegated to `upload`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde_json::Value;

use crate::api::{ApiClient, Package, PackageVersion};
use crate::descriptor::{self, PackageDescriptor, Submission};
use crate::ui;
use crate::upload::{UploadOptions, UploadOrchestrator, UploadReport, UploadTarget};
use crate::workspace::Workspace;

/// Everything a publishing command needs for one invocation.
#[derive(Debug)]
pub struct Publisher<'a> {
    api: &'a ApiClient,
    workspace: &'a Workspace,
    upload: UploadOptions,
}

/// Outcome of `save-all`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub saved: usize,
    pub failed: Vec<String>,
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl<'a> Publisher<'a> {
    pub fn new(api: &'a ApiClient, workspace: &'a Workspace, upload: UploadOptions) -> Self {
        Publisher {
            api,
            workspace,
            upload,
        }
    }

    /// Create the package on the store and record its id in the descriptor.
    pub fn create(&self, desc_path: &Path, desc: &mut PackageDescriptor) -> Result<Value> {
        let name = desc
            .name()
            .context("metadatas.en_US.name is required to create a package")?;
        let package = self
            .api
            .create_package(name, &desc.category)
            .context("Failed to create package")?;
        let id = package
            .get("id")
            .cloned()
            .context("Create package response has no id")?;
        println!(
            "Created package {} with draft version {}.",
            id_text(&id),
            package["versions"][0]["id"]
        );
        descriptor::write_package_id(desc_path, &id)?;
        desc.package_id = Some(id.clone());
        Ok(id)
    }

    /// The package's draft version, creating one when none exists.
    pub fn draft_version(&self, package_id: &Value) -> Result<PackageVersion> {
        let package: Package = self
            .api
            .get_package(&id_text(package_id))
            .context("Failed to fetch package")?;
        match package.versions.iter().find(|v| v.status == "draft") {
            Some(draft) => {
                let version: PackageVersion = self
                    .api
                    .get_package_version(&draft.id.to_string())
                    .context("Failed to fetch draft version")?;
                println!("Using draft version {} of package {}.", version.id, package.id);
                Ok(version)
            }
            None => {
                let version: PackageVersion = self
                    .api
                    .create_package_version(package_id)
                    .context("Failed to create draft version")?;
                println!("Created draft version {} of package {}.", version.id, package.id);
                Ok(version)
            }
        }
    }

    /// Push artworks, key images, unitypackages and metadata into the draft
    /// version of an existing package.
    pub fn save(&self, desc: &PackageDescriptor) -> Result<PackageVersion> {
        let package_id = desc
            .package_id
            .as_ref()
            .context("Descriptor has no packageId")?;
        let mut version = self.draft_version(package_id)?;
        let version_id = version.id.to_string();

        for artwork in &desc.artworks {
            let uploaded = if artwork.is_file() {
                self.api
                    .upload_artwork_file(&version_id, &artwork.kind, Path::new(&artwork.source))
            } else {
                self.api.add_artwork_url(&version_id, &artwork.kind, &artwork.source)
            };
            version = uploaded.with_context(|| {
                format!("Failed to upload artwork {} from {}", artwork.kind, artwork.source)
            })?;
            println!("Uploaded artwork {} from {}.", artwork.kind, artwork.source);
        }

        for (kind, source) in &desc.key_images {
            let Some(source) = source else { continue };
            version = self
                .api
                .upload_key_image(&version_id, &kind.replace('_', "-"), source)
                .with_context(|| format!("Failed to upload key image {kind}"))?;
            println!("Uploaded key image {kind} from {}.", source.display());
        }

        for (unity_version, entry) in &desc.unitypackages {
            let Some(entry) = entry else { continue };
            let Some(source) = &entry.source else { continue };
            let local_size = std::fs::metadata(source)
                .with_context(|| format!("Cannot read unitypackage {}", source.display()))?
                .len();
            let remote_size = version.unitypackage_size(unity_version);
            if !descriptor::needs_upload(entry, local_size, remote_size.as_deref()) {
                tracing::info!(%unity_version, "unitypackage unchanged, skipping upload");
                continue;
            }
            self.upload_unitypackage(&version_id, unity_version, source, entry.slices, entry.threads)?;
        }

        let body = descriptor::version_update_body(desc, &version);
        let version = self
            .api
            .update_package_version(&version_id, &body)
            .context("Failed to update package version")?;
        println!("Updated package version {}.", version.id);
        Ok(version)
    }

    /// Submit a version for review and check the store accepted it.
    pub fn submit(&self, version_id: &str, submission: &Submission) -> Result<()> {
        let body = serde_json::to_value(submission)?;
        self.api
            .submit_package_version(version_id, &body)
            .context("Failed to submit package version")?;
        let version: PackageVersion = self.api.get_package_version(version_id)?;
        ensure!(
            version.status == "submitted",
            "Version {version_id} is {:?} after submission",
            version.status
        );
        println!("Submitted package version {version_id}.");
        Ok(())
    }

    /// Sliced upload of one unitypackage into `version_id`.
    pub fn upload_unitypackage(
        &self,
        version_id: &str,
        unity_version: &str,
        source: &Path,
        slices: Option<usize>,
        workers: Option<usize>,
    ) -> Result<UploadReport> {
        let mut options = self.upload.clone();
        options.slices = slices.or(options.slices);
        if let Some(workers) = workers {
            options.workers = workers;
        }
        let target = UploadTarget {
            version_id: version_id.to_string(),
            asset_kind: unity_version.to_string(),
        };
        let report = UploadOrchestrator::new(self.api, options)
            .with_progress(ui::upload_bar(unity_version))
            .upload(source, &target)
            .with_context(|| format!("Failed to upload {}", source.display()))?;
        println!(
            "Uploaded unitypackage for {unity_version}: {} in {} slices, {:.2}s.",
            ui::format_bytes(report.bytes),
            report.slices,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// The `save` command: create if needed, save, then submit when the
    /// descriptor asks for it.
    pub fn save_named(&self, name: &str) -> Result<PackageDescriptor> {
        let path = self.workspace.descriptor_path(name);
        let mut desc = PackageDescriptor::load(&path)?;
        if desc.package_id.is_none() {
            self.create(&path, &mut desc)?;
        }
        let version = self.save(&desc)?;
        if let Some(submission) = &desc.submission {
            self.submit(&version.id.to_string(), submission)?;
        }
        Ok(desc)
    }

    /// The `submit` command: submit the current draft of a saved package.
    pub fn submit_named(&self, name: &str) -> Result<()> {
        let path = self.workspace.descriptor_path(name);
        let desc = PackageDescriptor::load(&path)?;
        let Some(package_id) = &desc.package_id else {
            bail!("{} has no packageId; run save first", path.display());
        };
        let submission = desc.submission.clone().unwrap_or_default();
        let version = self.draft_version(package_id)?;
        self.submit(&version.id.to_string(), &submission)
    }

    /// Save every descriptor in `packages/`, logging each outcome to a
    /// timestamped file under `logs/`. One package failing does not stop
    /// the rest.
    pub fn save_all(&self) -> Result<BatchSummary> {
        let log_path = self
            .workspace
            .logs_dir()
            .join(format!("{}.log", chrono::Local::now().format("%Y-%m-%dT%H%M%S")));
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log {}", log_path.display()))?;

        let mut summary = BatchSummary::default();
        for name in self.workspace.descriptor_names()? {
            let _span = tracing::info_span!("package", %name).entered();
            match self.save_named(&name) {
                Ok(desc) => {
                    let id = desc.package_id.as_ref().map(id_text).unwrap_or_default();
                    let outcome = if desc.submission.is_some() { "saved and submitted" } else { "saved" };
                    writeln!(log, "{name} ({id}):\n\t[{}] Successfully {outcome}.", timestamp())?;
                    summary.saved += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "package failed");
                    writeln!(log, "{name}:\n\t[{}] Failed: {e:#}", timestamp())?;
                    summary.failed.push(name);
                }
            }
        }
        println!("Wrote log to {}.", log_path.display());
        Ok(summary)
    }
}

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}
