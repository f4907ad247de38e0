//! Confluence content resource
//!
//! Only the fields the aggregator reads or rewrites are modelled; anything else the
//! server returns is dropped on read.

use serde::{Deserialize, Serialize};

/// Representation used for page bodies
pub const STORAGE_REPRESENTATION: &str = "storage";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub version: PageVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<PageBody>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVersion {
    pub number: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBody {
    pub storage: Storage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub value: String,
    pub representation: String,
}

impl Page {
    /// Replace the body with storage-format content and move to the next version
    pub fn revise(&mut self, content: String) {
        self.body = Some(PageBody {
            storage: Storage {
                value: content,
                representation: STORAGE_REPRESENTATION.to_string(),
            },
        });
        self.version.number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal_page() {
        let page: Page =
            serde_json::from_str(r#"{"type":"page","title":"some page","version":{"number":1}}"#)
                .unwrap();
        assert_eq!(page.kind, "page");
        assert_eq!(page.title, "some page");
        assert_eq!(page.version.number, 1);
        assert!(page.body.is_none());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let page: Page = serde_json::from_str(
            r#"{"id":"1234","type":"page","status":"current","title":"t","version":{"number":7,"minorEdit":false}}"#,
        )
        .unwrap();
        assert_eq!(page.id.as_deref(), Some("1234"));
        assert_eq!(page.version.number, 7);
    }

    #[test]
    fn test_revise_bumps_version_once() {
        let mut page = Page {
            id: None,
            kind: "page".to_string(),
            title: "t".to_string(),
            version: PageVersion { number: 1 },
            body: None,
        };
        page.revise("<p>hi</p>".to_string());

        assert_eq!(page.version.number, 2);
        let json = serde_json::to_string(&page).unwrap();
        assert!(json.contains("\"version\":{\"number\":2"));
        assert!(json.contains("\"representation\":\"storage\""));
    }
}
