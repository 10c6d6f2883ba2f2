use std::collections::BTreeSet;

use anyhow::{Context, bail};
use camino::Utf8Path;
use serde_json::{Map, Value};

use crate::atomic::write_atomic;

/// The two manifest sections pkglab ever touches. Everything else in the
/// manifest (scripts, author, arbitrary third-party fields) round-trips
/// untouched because [`Manifest`] never deserializes into a typed struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DependencySection {
    Runtime,
    Dev,
}

impl DependencySection {
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Runtime => "dependencies",
            Self::Dev => "devDependencies",
        }
    }
}

/// An order-preserving, minimally-invasive view over a `package.json`-shaped
/// manifest. Only the known dependency fields are mutated; every other field,
/// its key order, and the file's trailing newline round-trip unchanged.
#[derive(Debug, Clone)]
pub struct Manifest {
    value: Value,
    trailing_newline: bool,
}

impl Manifest {
    pub fn read(path: &Utf8Path) -> anyhow::Result<Self> {
        let raw = fs_err::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse manifest at {path}"))?;
        if !value.is_object() {
            bail!("manifest at {path} is not a JSON object");
        }
        Ok(Self {
            value,
            trailing_newline: raw.ends_with('\n'),
        })
    }

    pub fn write(&self, path: &Utf8Path) -> anyhow::Result<()> {
        let mut serialized = serde_json::to_vec_pretty(&self.value)
            .with_context(|| format!("failed to serialize manifest for {path}"))?;
        if self.trailing_newline {
            serialized.push(b'\n');
        }
        write_atomic(path, &serialized)
    }

    fn object(&self) -> &Map<String, Value> {
        self.value.as_object().expect("constructed from an object")
    }

    fn object_mut(&mut self) -> &mut Map<String, Value> {
        self.value.as_object_mut().expect("constructed from an object")
    }

    pub fn name(&self) -> Option<&str> {
        self.object().get("name")?.as_str()
    }

    pub fn version(&self) -> Option<&str> {
        self.object().get("version")?.as_str()
    }

    pub fn set_version(&mut self, version: &str) {
        self.object_mut()
            .insert("version".to_string(), Value::String(version.to_string()));
    }

    /// The root manifest's `workspaces` array, if present and non-empty.
    pub fn workspaces_globs(&self) -> Option<Vec<String>> {
        let globs: Vec<String> = self
            .object()
            .get("workspaces")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        if globs.is_empty() { None } else { Some(globs) }
    }

    /// All dependency names declared in either section, for workspace graph
    /// edge discovery. Version strings aren't needed for graph building: an
    /// edge exists whenever a declared name matches an in-workspace package.
    pub fn dependency_names(&self) -> BTreeSet<String> {
        [DependencySection::Runtime, DependencySection::Dev]
            .into_iter()
            .filter_map(|section| self.object().get(section.field_name()))
            .filter_map(Value::as_object)
            .flat_map(|deps| deps.keys().cloned())
            .collect()
    }

    /// Find which section declares `name`, and its current version string.
    pub fn get_dependency(&self, name: &str) -> Option<(DependencySection, String)> {
        for section in [DependencySection::Runtime, DependencySection::Dev] {
            if let Some(version) = self
                .object()
                .get(section.field_name())
                .and_then(Value::as_object)
                .and_then(|deps| deps.get(name))
                .and_then(Value::as_str)
            {
                return Some((section, version.to_string()));
            }
        }
        None
    }

    /// Insert or update `name`'s version in `section`, creating the section
    /// object if it doesn't exist yet. Does not move an existing entry out of
    /// a different section: callers that need to relocate a dependency must
    /// call [`Self::remove_dependency`] first.
    pub fn set_dependency(&mut self, section: DependencySection, name: &str, version: &str) {
        let field = section.field_name();
        let deps = self
            .object_mut()
            .entry(field)
            .or_insert_with(|| Value::Object(Map::new()));
        if !deps.is_object() {
            *deps = Value::Object(Map::new());
        }
        deps.as_object_mut()
            .expect("just ensured object")
            .insert(name.to_string(), Value::String(version.to_string()));
    }

    /// Remove `name` from whichever section declares it. Returns the removed
    /// version string, if any.
    pub fn remove_dependency(&mut self, name: &str) -> Option<String> {
        for section in [DependencySection::Runtime, DependencySection::Dev] {
            if let Some(deps) = self
                .object_mut()
                .get_mut(section.field_name())
                .and_then(Value::as_object_mut)
                && let Some(removed) = deps.remove(name)
            {
                return removed.as_str().map(str::to_string);
            }
        }
        None
    }
}
