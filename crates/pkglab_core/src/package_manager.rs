use std::process::Stdio;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use tokio::process::Command;
use tracing::{debug, instrument};
use url::Url;

use pkglab_fs::PackageManagerKind;

use crate::error::PkglabError;

/// Capability object governing a single directory's package manager, per
/// §4.C. One implementation per [`PackageManagerKind`]; all three target the
/// same `package.json`-shaped manifest and npm-compatible tarball format, so
/// they share a tracked-file filter and differ only in which binary they
/// shell out to.
#[async_trait]
pub trait PackageManager: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> PackageManagerKind;

    /// Files that would ship in this package's published tarball, relative
    /// to `dir`. This is the single canonical publish filter referenced by
    /// §4.B and §9: it is used both to decide the fingerprint's input set
    /// and to build the tarball, so the two can never silently diverge.
    fn tracked_files(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PkglabError>;

    async fn install(&self, dir: &Utf8Path) -> Result<(), PkglabError>;

    /// Packs `dir` into a tarball and returns its path.
    async fn pack(&self, dir: &Utf8Path) -> Result<Utf8PathBuf, PkglabError>;

    async fn publish(&self, tarball: &Utf8Path, registry_url: &Url, token: &str) -> Result<(), PkglabError>;
}

/// Detects the package manager governing `dir` and returns its adapter, or
/// `None` if no supported lockfile is present.
pub fn detect(dir: &Utf8Path) -> Option<Box<dyn PackageManager>> {
    PackageManagerKind::detect(dir).map(adapter_for)
}

pub fn adapter_for(kind: PackageManagerKind) -> Box<dyn PackageManager> {
    match kind {
        PackageManagerKind::Npm => Box::new(Npm),
        PackageManagerKind::Yarn => Box::new(Yarn),
        PackageManagerKind::Pnpm => Box::new(Pnpm),
    }
}

/// The publish filter shared by every adapter: every tracked file except
/// `node_modules` and VCS metadata, honouring `.gitignore`/`.npmignore` the
/// same way `npm pack` would. Picking one filter for all three kinds avoids
/// the invariant-3 trap spec.md §9 calls out (mixing filters across
/// invocations silently invalidates fingerprints).
fn tracked_files_via_ignore_filter(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PkglabError> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(true)
        .add_custom_ignore_filename(".npmignore")
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build();
    for entry in walker {
        let entry = entry.map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        if entry.file_type().is_some_and(|t| t.is_file()) {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
            let relative = Utf8PathBuf::try_from(relative.to_path_buf())
                .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
            files.push(relative);
        }
    }
    Ok(files)
}

async fn run(program: &str, args: &[&str], dir: &Utf8Path) -> Result<(), PkglabError> {
    debug!("running `{program} {}` in {dir}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PkglabError::Other(anyhow::anyhow!("failed to run {program}: {e}")))?;
    if !output.status.success() {
        return Err(PkglabError::Other(anyhow::anyhow!(
            "`{program} {}` in {dir} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Writes a throwaway `.npmrc` pinning `registry_url` and `token` for the
/// local host only, then runs `publish_args` with it in scope via
/// `--userconfig`. Every supported adapter publishes this way since all
/// three speak the npm registry HTTP protocol (§6).
async fn publish_with_npmrc(
    program: &str,
    tarball: &Utf8Path,
    registry_url: &Url,
    token: &str,
) -> Result<(), PkglabError> {
    let npmrc = tempfile::NamedTempFile::new()
        .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
    let host = registry_url.host_str().unwrap_or("127.0.0.1");
    let port = registry_url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let contents = format!(
        "registry={registry_url}\n//{host}{port}/:_authToken=\"{token}\"\n",
    );
    fs_err::write(npmrc.path(), contents).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;

    let dir = tarball.parent().unwrap_or(Utf8Path::new("."));
    let npmrc_path = Utf8PathBuf::try_from(npmrc.path().to_path_buf())
        .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
    let result = run(
        program,
        &[
            "publish",
            tarball.as_str(),
            "--registry",
            registry_url.as_str(),
            "--userconfig",
            npmrc_path.as_str(),
        ],
        dir,
    )
    .await;
    result.map_err(|e| PkglabError::PublishFailed(e.to_string()))
}

#[derive(Debug, Clone, Copy)]
struct Npm;

#[async_trait]
impl PackageManager for Npm {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Npm
    }

    fn tracked_files(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PkglabError> {
        tracked_files_via_ignore_filter(dir)
    }

    #[instrument(skip(self))]
    async fn install(&self, dir: &Utf8Path) -> Result<(), PkglabError> {
        run("npm", &["install"], dir).await
    }

    #[instrument(skip(self))]
    async fn pack(&self, dir: &Utf8Path) -> Result<Utf8PathBuf, PkglabError> {
        run("npm", &["pack"], dir).await?;
        latest_tarball(dir)
    }

    async fn publish(&self, tarball: &Utf8Path, registry_url: &Url, token: &str) -> Result<(), PkglabError> {
        publish_with_npmrc("npm", tarball, registry_url, token).await
    }
}

#[derive(Debug, Clone, Copy)]
struct Yarn;

#[async_trait]
impl PackageManager for Yarn {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Yarn
    }

    fn tracked_files(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PkglabError> {
        tracked_files_via_ignore_filter(dir)
    }

    #[instrument(skip(self))]
    async fn install(&self, dir: &Utf8Path) -> Result<(), PkglabError> {
        run("yarn", &["install"], dir).await
    }

    #[instrument(skip(self))]
    async fn pack(&self, dir: &Utf8Path) -> Result<Utf8PathBuf, PkglabError> {
        run("yarn", &["pack"], dir).await?;
        latest_tarball(dir)
    }

    async fn publish(&self, tarball: &Utf8Path, registry_url: &Url, token: &str) -> Result<(), PkglabError> {
        publish_with_npmrc("npm", tarball, registry_url, token).await
    }
}

#[derive(Debug, Clone, Copy)]
struct Pnpm;

#[async_trait]
impl PackageManager for Pnpm {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Pnpm
    }

    fn tracked_files(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PkglabError> {
        tracked_files_via_ignore_filter(dir)
    }

    #[instrument(skip(self))]
    async fn install(&self, dir: &Utf8Path) -> Result<(), PkglabError> {
        run("pnpm", &["install"], dir).await
    }

    #[instrument(skip(self))]
    async fn pack(&self, dir: &Utf8Path) -> Result<Utf8PathBuf, PkglabError> {
        run("pnpm", &["pack"], dir).await?;
        latest_tarball(dir)
    }

    async fn publish(&self, tarball: &Utf8Path, registry_url: &Url, token: &str) -> Result<(), PkglabError> {
        publish_with_npmrc("pnpm", tarball, registry_url, token).await
    }
}

/// `npm pack`/`yarn pack`/`pnpm pack` all drop a `*.tgz` into `dir`; the
/// most recently modified one is the tarball just produced.
fn latest_tarball(dir: &Utf8Path) -> Result<Utf8PathBuf, PkglabError> {
    let mut newest: Option<(std::time::SystemTime, Utf8PathBuf)> = None;
    let entries =
        fs_err::read_dir(dir).map_err(|e| PkglabError::PackFailed(format!("{dir}: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| PkglabError::PackFailed(format!("{dir}: {e}")))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("tgz") {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| PkglabError::PackFailed(format!("{dir}: {e}")))?
            .modified()
            .map_err(|e| PkglabError::PackFailed(format!("{dir}: {e}")))?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            let utf8 = Utf8PathBuf::try_from(path)
                .map_err(|e| PkglabError::PackFailed(e.to_string()))?;
            newest = Some((modified, utf8));
        }
    }
    newest
        .map(|(_, path)| path)
        .ok_or_else(|| PkglabError::PackFailed(format!("{dir}: pack produced no .tgz file")))
}
