//! The single error taxonomy for this crate.
//!
//! Every fallible operation in the crate returns a variant of [`Error`]:
//! configuration, validation, parsing, binding, transport, liveness,
//! server-reported, codec, and cancellation errors each get their own
//! variant so callers can match on stable shapes rather than parsing
//! messages.

use std::sync::Arc;

use snafu::Snafu;

/// Errors produced by this crate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The client was constructed with an invalid configuration.
    #[snafu(display("invalid client configuration: {message}"))]
    Config {
        /// Human-readable explanation of what was wrong.
        message: String,
    },

    /// A [`crate::point::Point`] or [`crate::statement::Statement`] failed
    /// structural validation before any I/O was attempted.
    #[snafu(display("validation failed: {message}"))]
    Validation {
        /// Human-readable explanation of what was wrong.
        message: String,
    },

    /// Line protocol (or an INSERT statement body) could not be parsed.
    #[snafu(display("line {line}: {message}"))]
    Parse {
        /// 1-based line number within the parsed text.
        line: usize,
        /// Human-readable explanation of what was wrong.
        message: String,
    },

    /// Parameter binding could not resolve every placeholder.
    #[snafu(display("unresolved parameters: {}", names.join(", ")))]
    UnresolvedParameters {
        /// The `$name` placeholders that had no matching parameter.
        names: Vec<String>,
    },

    /// A field held exactly one placeholder (`$name`) and no parameter with
    /// that name was supplied.
    #[snafu(display("missing parameter `{name}` for field `{field}`"))]
    MissingParameter {
        /// The parameter name that was referenced but not supplied.
        name: String,
        /// The field key whose value referenced the parameter.
        field: String,
    },

    /// The underlying `Transport` returned an error that was not itself an
    /// HTTP-level failure (connect refused, TLS failure, timeout, ...).
    #[snafu(display("transport error: {source}"))]
    Transport {
        /// The underlying transport error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The HTTP exchange completed but the server returned a non-2xx status.
    #[snafu(display("HTTP request returned an error: {status}, `{text}`"))]
    Http {
        /// The HTTP status code returned by the server.
        status: u16,
        /// Any text data returned in the response body.
        text: String,
    },

    /// Every endpoint in the pool is currently marked down.
    #[snafu(display("all servers are down"))]
    AllServersDown,

    /// The server accepted the HTTP request but reported a logical error in
    /// the `QueryResult` body (top-level or per-series `error` field).
    #[snafu(display("server reported an error: {message}"))]
    Server {
        /// The `error` string reported by the server.
        message: String,
    },

    /// A response body could not be decompressed or deserialized, or a
    /// field value of an unsupported type was encountered while encoding.
    #[snafu(display("codec error: {message}"))]
    Codec {
        /// Human-readable explanation of what was wrong.
        message: String,
    },

    /// The call (or the parent client) was cancelled before it completed.
    #[snafu(display("operation was cancelled"))]
    Cancelled,

    /// An `Interceptor` hook returned an error, aborting the call.
    #[snafu(display("interceptor rejected the call: {message}"))]
    Interceptor {
        /// The message returned by the failing interceptor.
        message: String,
    },
}

impl Error {
    /// True for errors that the batch writer fans out to callbacks verbatim
    /// (as opposed to ones that can only occur synchronously, e.g. `Config`).
    pub fn is_write_path(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. }
                | Error::Http { .. }
                | Error::AllServersDown
                | Error::Server { .. }
                | Error::Codec { .. }
                | Error::Cancelled
                | Error::Interceptor { .. }
        )
    }
}

/// A shared handle to an [`Error`], used when the same error value must be
/// fanned out to many callbacks without requiring `Error: Clone` (several
/// variants wrap non-`Clone` sources).
pub type SharedError = Arc<Error>;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
