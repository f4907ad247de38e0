//! Data model shared by the about aggregator crates
//!
//! This library defines:
//! - ServiceDescriptor: a discovered service and the address its about endpoint lives under
//! - AboutDocument: the result of one successful `__/about` fetch
//! - Page: the Confluence content resource the documentation page is mirrored from

pub mod about;
pub mod descriptor;
pub mod page;

pub use about::{AboutDoc, AboutDocument, BuildInfo, Link, Owner, Payload};
pub use descriptor::ServiceDescriptor;
pub use page::{Page, PageBody, PageVersion, Storage};
