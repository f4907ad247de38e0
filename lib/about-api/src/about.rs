//! About documents returned by service metadata endpoints

use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};

use crate::ServiceDescriptor;

/// Structured body of a `__/about` response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AboutDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(rename = "build-info", default)]
    pub build_info: BuildInfo,
}

/// Team owning a service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub name: String,
    /// Contact channel
    #[serde(default)]
    pub slack: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    #[serde(default)]
    pub revision: String,
}

/// Payload of an about document
///
/// Which variant is produced depends on how the fetcher is configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Decoded JSON body
    Structured(AboutDoc),
    /// Body kept verbatim
    Raw(#[serde(serialize_with = "serialize_lossy_utf8")] Bytes),
}

impl Payload {
    /// Text of a raw payload, lossily decoded
    pub fn raw_text(&self) -> Option<String> {
        match self {
            Payload::Raw(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Payload::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&AboutDoc> {
        match self {
            Payload::Structured(doc) => Some(doc),
            Payload::Raw(_) => None,
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Structured(AboutDoc::default())
    }
}

fn serialize_lossy_utf8<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// One fetched about document and the service it came from
///
/// Created once per successful fetch and shared read-only by every exporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AboutDocument {
    #[serde(rename = "Service")]
    pub service: ServiceDescriptor,
    #[serde(rename = "Doc")]
    pub payload: Payload,
}

impl AboutDocument {
    pub fn new(service: ServiceDescriptor, payload: Payload) -> Self {
        Self { service, payload }
    }
}
