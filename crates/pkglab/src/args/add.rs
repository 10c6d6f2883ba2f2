/// `add SPEC` where `SPEC` is `name` or `name@tag` (§6).
#[derive(clap::Parser, Debug)]
pub struct Add {
    /// `name` or `name@tag` of the package to pin.
    pub spec: String,
    /// Consumer repository to register. Defaults to the current directory.
    #[arg(long)]
    pub consumer: Option<camino::Utf8PathBuf>,
}

impl Add {
    /// Splits `SPEC` into its package name and optional tag.
    pub fn package_and_tag(&self) -> (&str, Option<&str>) {
        match self.spec.rsplit_once('@') {
            // A leading `@` (scoped package name) isn't a tag separator.
            Some((name, tag)) if !name.is_empty() => (name, Some(tag)),
            _ => (self.spec.as_str(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_an_untagged_spec() {
        let add = Add { spec: "@acme/a".to_string(), consumer: None };
        assert_eq!(add.package_and_tag(), ("@acme/a", None));
    }

    #[test]
    fn splits_a_tagged_spec_with_a_scoped_package_name() {
        let add = Add { spec: "@acme/a@feat1".to_string(), consumer: None };
        assert_eq!(add.package_and_tag(), ("@acme/a", Some("feat1")));
    }

    #[test]
    fn splits_a_tagged_spec_with_an_unscoped_package_name() {
        let add = Add { spec: "left-pad@feat1".to_string(), consumer: None };
        assert_eq!(add.package_and_tag(), ("left-pad", Some("feat1")));
    }
}
