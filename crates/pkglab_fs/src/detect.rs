use camino::Utf8Path;

/// The package manager governing a directory, detected from its lockfile.
///
/// Detection probes for lockfile names unique to each manager, in a fixed
/// order, per §4.C: npm before yarn before pnpm. A directory with no
/// recognized lockfile has no adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManagerKind {
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManagerKind {
    const PROBE_ORDER: [(Self, &'static str); 3] = [
        (Self::Npm, "package-lock.json"),
        (Self::Yarn, "yarn.lock"),
        (Self::Pnpm, "pnpm-lock.yaml"),
    ];

    /// Name of the lockfile that disambiguates this package manager.
    pub fn lockfile_name(self) -> &'static str {
        Self::PROBE_ORDER
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
            .expect("every variant has a lockfile entry")
    }

    /// Detect the package manager governing `dir` by probing for the lockfile
    /// names above, in order. Returns `None` if no recognized lockfile exists.
    pub fn detect(dir: &Utf8Path) -> Option<Self> {
        Self::PROBE_ORDER
            .iter()
            .find(|(_, lockfile)| dir.join(lockfile).is_file())
            .map(|(kind, _)| *kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }
}

impl std::fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn touch(dir: &Utf8Path, name: &str) {
        fs_err::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn detects_npm_from_package_lock() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        touch(&dir, "package-lock.json");

        assert_eq!(PackageManagerKind::detect(&dir), Some(PackageManagerKind::Npm));
    }

    #[test]
    fn detects_pnpm_from_pnpm_lock() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        touch(&dir, "pnpm-lock.yaml");

        assert_eq!(PackageManagerKind::detect(&dir), Some(PackageManagerKind::Pnpm));
    }

    #[test]
    fn npm_takes_priority_when_multiple_lockfiles_exist() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        touch(&dir, "package-lock.json");
        touch(&dir, "yarn.lock");

        assert_eq!(PackageManagerKind::detect(&dir), Some(PackageManagerKind::Npm));
    }

    #[test]
    fn no_lockfile_means_no_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        assert_eq!(PackageManagerKind::detect(&dir), None);
    }
}
