use std::fmt;
use thiserror::Error;

/// Failure reported on the shared error channel
///
/// Nothing below the top level propagates these further; each one is logged once or
/// dropped when the channel is saturated.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not get namespaces via kubernetes api: ({0})")]
    ListNamespaces(String),

    #[error("Could not get services via kubernetes api: ({0})")]
    ListServices(String),

    #[error("Could not get response from {base_url}: ({cause})")]
    FetchTransport { base_url: String, cause: String },

    #[error("__/about returned {status} for {base_url}")]
    FetchStatus { status: u16, base_url: String },

    #[error("Could not json decode __/about response for {base_url}")]
    FetchDecode { base_url: String },

    #[error("{exporter} exporter failed for {service}: {cause}")]
    Export {
        exporter: &'static str,
        service: String,
        cause: anyhow::Error,
    },
}

/// Pipeline stage an error originated from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Fetch,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Fetch => "fetch",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ListNamespaces(_) | PipelineError::ListServices(_) => Stage::Discovery,
            PipelineError::FetchTransport { .. }
            | PipelineError::FetchStatus { .. }
            | PipelineError::FetchDecode { .. } => Stage::Fetch,
            PipelineError::Export { .. } => Stage::Export,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_messages() {
        let err = PipelineError::FetchTransport {
            base_url: "http://someService.billing/".to_string(),
            cause: "error calling __about".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not get response from http://someService.billing/: (error calling __about)"
        );

        let err = PipelineError::FetchStatus {
            status: 404,
            base_url: "http://someService.billing/".to_string(),
        };
        assert_eq!(err.to_string(), "__/about returned 404 for http://someService.billing/");
    }

    #[test]
    fn test_stages() {
        assert_eq!(PipelineError::ListNamespaces("x".into()).stage(), Stage::Discovery);
        assert_eq!(
            PipelineError::FetchDecode { base_url: "u".into() }.stage(),
            Stage::Fetch
        );
        let export = PipelineError::Export {
            exporter: "confluence",
            service: "svc".into(),
            cause: anyhow::anyhow!("boom"),
        };
        assert_eq!(export.stage(), Stage::Export);
        assert_eq!(export.to_string(), "confluence exporter failed for svc: boom");
    }
}
