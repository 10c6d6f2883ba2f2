use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use pkglab_core::{ConsumerRegistration, StateStore};
use predicates::str::contains;

use crate::helpers::cmd::pkglab_cmd;

fn isolated_home() -> Utf8PathBuf {
    let home = tempfile::tempdir().unwrap();
    Utf8PathBuf::try_from(home.keep()).unwrap()
}

fn register_empty_consumer(home: &Utf8PathBuf, dir: &Utf8PathBuf) -> Utf8PathBuf {
    let dir = pkglab_fs::canonicalize_best_effort(dir);
    let store = StateStore::open(home.join(".pkglab"));
    store
        .with_exclusive(|catalog| {
            catalog.consumers.insert(
                dir.clone(),
                ConsumerRegistration { package_manager: "npm".to_string(), pins: BTreeMap::new() },
            );
            Ok(())
        })
        .unwrap();
    dir
}

#[test]
fn repos_ls_reports_no_repos_on_a_fresh_catalog() {
    let home = isolated_home();
    pkglab_cmd(&home)
        .args(["repos", "ls"])
        .assert()
        .success()
        .stdout(contains("No linked repos"));
}

#[test]
fn pkg_ls_reports_no_packages_on_a_fresh_catalog() {
    let home = isolated_home();
    pkglab_cmd(&home)
        .args(["pkg", "ls"])
        .assert()
        .success()
        .stdout(contains("no published packages"));
}

#[test]
fn repos_reset_skips_an_unregistered_directory() {
    let home = isolated_home();
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

    pkglab_cmd(&home)
        .args(["repos", "reset", dir.as_str()])
        .assert()
        .success()
        .stdout(contains("not registered"));
}

#[test]
fn repos_reset_all_skips_a_deleted_consumer_and_resets_a_live_one() {
    let home = isolated_home();

    let gone_tmp = tempfile::tempdir().unwrap();
    let gone = Utf8PathBuf::try_from(gone_tmp.path().to_path_buf()).unwrap();
    let gone = register_empty_consumer(&home, &gone);
    gone_tmp.close().unwrap();

    let live_tmp = tempfile::tempdir().unwrap();
    let live = Utf8PathBuf::try_from(live_tmp.path().to_path_buf()).unwrap();
    let live = register_empty_consumer(&home, &live);

    pkglab_cmd(&home)
        .args(["repos", "reset", "--all"])
        .assert()
        .success()
        .stdout(contains(format!("Skipping {gone}")))
        .stdout(contains(format!("Reset {live}")));

    // `--all` skips the missing directory without deregistering it (only
    // `--stale` does that); the live consumer it actually reset is gone.
    let store = StateStore::open(home.join(".pkglab"));
    let remaining = store.with_shared(|catalog| catalog.consumers.keys().cloned().collect::<Vec<_>>()).unwrap();
    assert_eq!(remaining, vec![gone.clone()]);
}

#[test]
fn repos_reset_stale_removes_only_missing_consumers() {
    let home = isolated_home();

    let gone_tmp = tempfile::tempdir().unwrap();
    let gone = Utf8PathBuf::try_from(gone_tmp.path().to_path_buf()).unwrap();
    let gone = register_empty_consumer(&home, &gone);
    gone_tmp.close().unwrap();

    let live_tmp = tempfile::tempdir().unwrap();
    let live = Utf8PathBuf::try_from(live_tmp.path().to_path_buf()).unwrap();
    register_empty_consumer(&home, &live);

    pkglab_cmd(&home)
        .args(["repos", "reset", "--stale"])
        .assert()
        .success()
        .stdout(contains(format!("Removed stale {gone}")));

    let store = StateStore::open(home.join(".pkglab"));
    let remaining = store.with_shared(|catalog| catalog.consumers.len()).unwrap();
    assert_eq!(remaining, 1);
}
