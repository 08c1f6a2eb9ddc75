//! Workload specs and the container identities they expand into.
//!
//! A workload of version 1 to 3 runs as a single container named after the
//! workload. From version 4 on a workload is composed of components, each of
//! which runs as its own container named `<component>_<workload>`.
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod error;
mod registry;

pub use error::{Error, Result};
pub use registry::{FileSpecRegistry, WorkloadSpecRegistry};

/// The maximum allowed length for a [`ContainerIdentity`].
const IDENTITY_MAX_LEN: usize = 255;

/// First spec version that describes a multi-component workload.
const COMPOSE_VERSION: u32 = 4;

/// Separator between component and workload name in a component identity.
const COMPONENT_SEPARATOR: char = '_';

/// A validated container identity.
///
/// # Examples
///
/// ```
/// # use fleet_steward::workload::ContainerIdentity;
/// let identity = ContainerIdentity::new("web_app1").unwrap();
/// assert_eq!(identity.split(), Some(("web", "app1")));
/// assert_eq!(identity.runtime_name("flux"), "fluxweb_app1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerIdentity(Arc<str>);

impl ContainerIdentity {
    /// Creates a new `ContainerIdentity` from the given raw name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the name is empty, longer than
    /// [`IDENTITY_MAX_LEN`] or contains a `/`.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > IDENTITY_MAX_LEN || src.contains('/') {
            return Err(Error::InvalidIdentity(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Builds the identity of `component` inside `workload`.
    fn component(component: &str, workload: &str) -> Self {
        Self(format!("{component}{COMPONENT_SEPARATOR}{workload}").into())
    }

    /// Splits a component identity into `(component, workload)`.
    ///
    /// Returns `None` for single-container workload identities.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0
            .split_once(COMPONENT_SEPARATOR)
            .filter(|(component, workload)| !component.is_empty() && !workload.is_empty())
    }

    /// Name of the workload this identity belongs to.
    pub fn workload(&self) -> &str {
        self.split().map_or(self.as_str(), |(_, workload)| workload)
    }

    /// The container name the runtime knows this identity by.
    pub fn runtime_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }

    /// Recovers an identity from a runtime container name.
    ///
    /// Runtime listings report names with a leading `/`, which is ignored.
    /// Returns `None` if the name does not carry `prefix`.
    pub fn from_runtime_name(name: &str, prefix: &str) -> Option<Self> {
        let name = name.strip_prefix('/').unwrap_or(name);
        name.strip_prefix(prefix)
            .and_then(|identity| Self::new(identity).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContainerIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for ContainerIdentity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// One container-producing unit of a multi-component workload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ComponentSpec {
    pub name: String,
}

/// An already validated workload specification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub version: u32,
    #[serde(default, alias = "compose")]
    pub components: Vec<ComponentSpec>,
    /// Principal owning the workload, if known.
    #[serde(default)]
    pub owner: Option<String>,
}

impl WorkloadSpec {
    pub fn is_composed(&self) -> bool {
        self.version >= COMPOSE_VERSION
    }
}

/// Expands a workload spec into the container identities it owns.
///
/// Component order is preserved. A composed spec without components violates
/// the caller's contract and yields no identities.
///
/// # Examples
///
/// ```
/// # use fleet_steward::workload::{resolve, ComponentSpec, WorkloadSpec};
/// let spec = WorkloadSpec {
///     name: "app1".into(),
///     version: 4,
///     components: vec![
///         ComponentSpec { name: "web".into() },
///         ComponentSpec { name: "db".into() },
///     ],
///     owner: None,
/// };
/// let names: Vec<String> = resolve(&spec).iter().map(ToString::to_string).collect();
/// assert_eq!(names, ["web_app1", "db_app1"]);
/// ```
pub fn resolve(spec: &WorkloadSpec) -> Vec<ContainerIdentity> {
    if !spec.is_composed() {
        return vec![ContainerIdentity(spec.name.as_str().into())];
    }

    spec.components
        .iter()
        .map(|component| ContainerIdentity::component(&component.name, &spec.name))
        .collect()
}
