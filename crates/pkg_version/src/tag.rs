use regex::Regex;
use std::sync::LazyLock;

/// The reserved tag denoting the default, untagged channel.
pub const UNTAGGED: &str = "(untagged)";

static INVALID_TAG_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));
static REPEATED_DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("valid regex"));

/// Sanitize a branch name (or any free-form string) into a valid tag:
/// any character outside `[A-Za-z0-9._-]` becomes `-`, and adjacent dashes
/// collapse into one, per §3.
pub fn sanitize_tag(raw: &str) -> String {
    let replaced = INVALID_TAG_CHAR.replace_all(raw, "-");
    REPEATED_DASHES.replace_all(&replaced, "-").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_slashes_to_single_dash() {
        assert_eq!(sanitize_tag("feat/x-y"), "feat-x-y");
    }

    #[test]
    fn collapses_adjacent_invalid_chars() {
        assert_eq!(sanitize_tag("feat//x"), "feat-x");
    }

    #[test]
    fn leaves_already_valid_tags_untouched() {
        assert_eq!(sanitize_tag("feat1"), "feat1");
        assert_eq!(sanitize_tag("release.2024_06-rc"), "release.2024_06-rc");
    }

    #[test]
    fn handles_unicode_and_whitespace() {
        assert_eq!(sanitize_tag("feat café!"), "feat-caf-");
    }
}
