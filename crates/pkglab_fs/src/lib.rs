mod atomic;
mod detect;
mod manifest;

pub use atomic::write_atomic;
pub use detect::PackageManagerKind;
pub use manifest::{DependencySection, Manifest};

/// Name of the manifest file every supported package manager reads, regardless
/// of which lockfile disambiguates the adapter.
pub const MANIFEST_FILENAME: &str = "package.json";

/// Canonicalize `path`, falling back to the unmodified path on platforms or
/// filesystem states where canonicalization fails (e.g. a path that doesn't
/// exist yet).
pub fn canonicalize_best_effort(path: &camino::Utf8Path) -> camino::Utf8PathBuf {
    match dunce::canonicalize(path) {
        Ok(canonical) => camino::Utf8PathBuf::try_from(canonical).unwrap_or_else(|_| path.to_owned()),
        Err(_) => path.to_owned(),
    }
}
