//! Error taxonomy for resolution strategies.

use std::io;

/// Why a single resolution strategy failed.
///
/// Strategy errors are never surfaced to proxy clients directly; the
/// resolver falls through to the next strategy and only total exhaustion
/// becomes visible, as an empty address list.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The active provider does not offer this transport.
    #[error("provider does not support this transport")]
    Unsupported,

    /// The hostname cannot be encoded as a DNS query.
    #[error("hostname is not encodable as a DNS query")]
    BadHostname,

    /// Upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    /// The HTTP request itself failed (transport error or timeout).
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream body did not contain usable answers.
    #[error("no addresses in upstream response")]
    NoAnswers,

    /// System resolver failure.
    #[error("system resolver: {0}")]
    System(#[from] io::Error),
}
