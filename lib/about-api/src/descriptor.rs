//! Discovered service descriptors

use serde::{Deserialize, Serialize};

/// Path of the metadata endpoint, relative to a service's base URL
pub const ABOUT_PATH: &str = "__/about";

/// A service found through the control plane
///
/// Field names on the wire follow the aggregator's published JSON format.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Namespace")]
    pub namespace: String,
    #[serde(rename = "BaseURL")]
    pub base_url: String,
}

impl ServiceDescriptor {
    /// Build a descriptor addressed through cluster DNS (`http://{name}.{namespace}/`)
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let namespace = namespace.into();
        let base_url = format!("http://{}.{}/", name, namespace);
        Self {
            name,
            namespace,
            base_url,
        }
    }

    /// URL of the service's about endpoint
    pub fn about_url(&self) -> String {
        format!("{}{}", self.base_url, ABOUT_PATH)
    }

    /// `namespace/name`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
