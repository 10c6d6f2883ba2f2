use std::process::Command;

use anyhow::{Context, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

/// A handle onto a producer repository's git checkout. Only used for
/// `-w`/`--worktree` tag derivation (§4.F step 1); pkglab never commits,
/// pushes, or otherwise mutates the repository it wraps.
#[derive(Debug)]
pub struct Repo {
    directory: Utf8PathBuf,
}

impl Repo {
    pub fn new(directory: impl Into<Utf8PathBuf>) -> anyhow::Result<Self> {
        let directory = directory.into();
        let repo = Self { directory };
        repo.git(&["rev-parse", "--is-inside-work-tree"])
            .with_context(|| format!("{} is not inside a git work tree", repo.directory))?;
        Ok(repo)
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// The name of the currently checked out branch.
    ///
    /// Returns an error if HEAD is detached, since a worktree-derived tag
    /// needs a branch name to sanitize.
    pub fn current_branch(&self) -> anyhow::Result<String> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = output.trim().to_string();
        ensure!(branch != "HEAD", "{} has no current branch (detached HEAD)", self.directory);
        Ok(branch)
    }

    pub fn git(&self, args: &[&str]) -> anyhow::Result<String> {
        debug!("running `git {}` in {}", args.join(" "), self.directory);
        let output = Command::new("git")
            .arg("-C")
            .arg(self.directory.as_str())
            .args(args)
            .output()
            .context("failed to run git. Is git installed?")?;
        ensure!(
            output.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).context("git produced non-utf8 output")
    }
}

#[cfg(feature = "test_fixture")]
pub mod test_fixture {
    use super::*;

    /// Initialize a throwaway repository at `directory` with a single commit
    /// on `main`, for tests that exercise `-w`/`--worktree` tag derivation.
    pub fn init(directory: &Utf8Path) -> anyhow::Result<Repo> {
        let run = |args: &[&str]| -> anyhow::Result<()> {
            let output = Command::new("git")
                .arg("-C")
                .arg(directory.as_str())
                .args(args)
                .output()
                .context("failed to run git. Is git installed?")?;
            ensure!(
                output.status.success(),
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            );
            Ok(())
        };

        run(&["init", "--initial-branch=main"])?;
        run(&["config", "user.email", "test@pkglab.local"])?;
        run(&["config", "user.name", "pkglab test"])?;
        fs_err::write(directory.join(".gitkeep"), "")?;
        run(&["add", "."])?;
        run(&["commit", "-m", "initial commit"])?;

        Repo::new(directory.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_branch_returns_checked_out_branch() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let repo = test_fixture::init(&dir).unwrap();

        assert_eq!(repo.current_branch().unwrap(), "main");
    }

    #[test]
    fn current_branch_reflects_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let repo = test_fixture::init(&dir).unwrap();
        repo.git(&["checkout", "-b", "feat/x-y"]).unwrap();

        assert_eq!(repo.current_branch().unwrap(), "feat/x-y");
    }
}
