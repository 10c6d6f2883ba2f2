use anyhow::Context as _;
use camino::Utf8Path;
use serde::Deserialize;

/// Name of the optional per-producer config file, read from the workspace
/// root the same way `release_plz.toml` sits next to a Cargo workspace.
pub const CONFIG_FILENAME: &str = "pkglab.toml";

/// Tunables that would otherwise have to be repeated on every CLI
/// invocation: a default tag and concurrency bound. Per-package filter
/// overrides can grow under `[packages.<name>]` the way `release_plz.toml`
/// layers `packages_defaults` under per-package sections, but pkglab has no
/// such override yet.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceDefaults,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct WorkspaceDefaults {
    pub default_tag: Option<String>,
    pub concurrency: Option<usize>,
}

impl Config {
    /// Loads `pkglab.toml` from `producer_dir`, or the default config if the
    /// file is absent. A malformed file is an error, not a silent fallback.
    pub fn load(producer_dir: &Utf8Path) -> anyhow::Result<Self> {
        let path = producer_dir.join(CONFIG_FILENAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let contents = fs_err::read_to_string(&path)?;
        toml::from_str(&contents).with_context(|| format!("invalid {path}"))
    }
}
