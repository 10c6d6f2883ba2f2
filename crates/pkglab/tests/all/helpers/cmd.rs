use assert_cmd::Command;
use camino::Utf8Path;

/// A `pkglab` invocation rooted at an isolated `$HOME`, so the state store's
/// `catalog.json` never collides with a real one or with another test.
pub fn pkglab_cmd(home: &Utf8Path) -> Command {
    test_logs::init();
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.env("HOME", home.as_str());
    cmd.env("CARGO_TARGET_DIR", "target");
    cmd
}
