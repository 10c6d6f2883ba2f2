use camino::Utf8PathBuf;

use crate::helpers::cmd::pkglab_cmd;

#[test]
fn completions_are_generated_for_every_supported_shell() {
    let home = tempfile::tempdir().unwrap();
    let home = Utf8PathBuf::try_from(home.path().to_path_buf()).unwrap();

    for shell in ["bash", "zsh", "fish", "elvish", "power-shell"] {
        pkglab_cmd(&home).args(["completions", shell]).assert().success();
    }
}
