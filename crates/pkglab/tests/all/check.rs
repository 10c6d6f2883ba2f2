use camino::Utf8PathBuf;
use predicates::str::contains;

use crate::helpers::cmd::pkglab_cmd;

fn write_installed(node_modules: &camino::Utf8Path, name: &str, version: &str) {
    let pkg_dir = node_modules.join(name);
    fs_err::create_dir_all(&pkg_dir).unwrap();
    fs_err::write(
        pkg_dir.join("package.json"),
        format!(r#"{{"name":"{name}","version":"{version}"}}"#),
    )
    .unwrap();
}

#[test]
fn check_passes_when_no_pkglab_artifacts_are_installed() {
    let home = tempfile::tempdir().unwrap();
    let home = Utf8PathBuf::try_from(home.path().to_path_buf()).unwrap();
    let project = tempfile::tempdir().unwrap();
    let project = Utf8PathBuf::try_from(project.path().to_path_buf()).unwrap();
    write_installed(&project.join("node_modules"), "left-pad", "1.3.0");

    pkglab_cmd(&home).current_dir(&project).arg("check").assert().success();
}

#[test]
fn check_fails_when_a_pkglab_artifact_is_installed() {
    let home = tempfile::tempdir().unwrap();
    let home = Utf8PathBuf::try_from(home.path().to_path_buf()).unwrap();
    let project = tempfile::tempdir().unwrap();
    let project = Utf8PathBuf::try_from(project.path().to_path_buf()).unwrap();
    write_installed(&project.join("node_modules"), "left-pad", "0.0.0-pkglab.3");

    pkglab_cmd(&home)
        .current_dir(&project)
        .arg("check")
        .assert()
        .failure()
        .stdout(contains("left-pad@0.0.0-pkglab.3"));
}
