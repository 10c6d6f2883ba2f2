use regex::Regex;
use std::{fmt, str::FromStr, sync::LazyLock};

static GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0\.0\.0-pkglab(?:-([A-Za-z0-9._-]+))?\.([0-9]+)$").expect("valid regex"));

/// A published pre-release version: `0.0.0-pkglab.<N>` for the untagged
/// channel, `0.0.0-pkglab-<tag>.<N>` otherwise. `N` is the monotonically
/// increasing counter for the `(package, tag)` pair, per §3 and §6.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublishedVersion {
    tag: Option<String>,
    n: u64,
}

impl PublishedVersion {
    /// `n` must be `>= 1`; the spec requires `N` to start at 1 and never be
    /// reused once allocated.
    pub fn new(tag: Option<&str>, n: u64) -> Self {
        debug_assert!(n >= 1, "N must be a decimal integer >= 1");
        Self {
            tag: tag.map(str::to_string),
            n,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    /// The next version in sequence for the same `(package, tag)` pair.
    pub fn next(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            n: self.n + 1,
        }
    }
}

impl fmt::Display for PublishedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "0.0.0-pkglab-{tag}.{}", self.n),
            None => write!(f, "0.0.0-pkglab.{}", self.n),
        }
    }
}

impl FromStr for PublishedVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = GRAMMAR
            .captures(s)
            .ok_or_else(|| anyhow::anyhow!("'{s}' is not a valid pkglab published version"))?;
        let tag = captures.get(1).map(|m| m.as_str().to_string());
        let n: u64 = captures[2]
            .parse()
            .map_err(|_| anyhow::anyhow!("'{s}' has an unparsable N component"))?;
        anyhow::ensure!(n >= 1, "'{s}' has N == 0, but N must be >= 1");
        Ok(Self { tag, n })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_untagged() {
        assert_eq!(PublishedVersion::new(None, 1).to_string(), "0.0.0-pkglab.1");
    }

    #[test]
    fn formats_tagged() {
        assert_eq!(
            PublishedVersion::new(Some("feat1"), 2).to_string(),
            "0.0.0-pkglab-feat1.2"
        );
    }

    #[test]
    fn parses_untagged_round_trip() {
        let version: PublishedVersion = "0.0.0-pkglab.1".parse().unwrap();
        assert_eq!(version, PublishedVersion::new(None, 1));
    }

    #[test]
    fn parses_tagged_round_trip() {
        let version: PublishedVersion = "0.0.0-pkglab-feat1.2".parse().unwrap();
        assert_eq!(version, PublishedVersion::new(Some("feat1"), 2));
    }

    #[test]
    fn rejects_slash_in_tag() {
        let err = "0.0.0-pkglab-feat/1.2".parse::<PublishedVersion>();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_zero_n() {
        assert!("0.0.0-pkglab.0".parse::<PublishedVersion>().is_err());
    }

    #[test]
    fn next_preserves_tag_and_increments_n() {
        let version = PublishedVersion::new(Some("feat1"), 1);
        assert_eq!(version.next(), PublishedVersion::new(Some("feat1"), 2));
    }
}
