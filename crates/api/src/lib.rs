//! Rate-limited access to the messaging platforms' private web APIs.
//!
//! The client tracks quota per normalized route, honors the process-wide
//! global deadline, retries transient failures within bounds, and keeps the
//! error taxonomy callers need: "rate limited", "server kept failing",
//! "credential rejected", and "response didn't parse" are all distinct.

pub mod client;
pub mod error;
pub mod identity;
pub mod pool;
pub mod rate_limit;
pub mod transport;

pub use client::{ApiClient, RetryConfig};
pub use error::ApiError;
pub use identity::{Identity, auth_scheme, base_url, fetch_identity};
pub use pool::{DEFAULT_CONCURRENCY, fan_out};
pub use rate_limit::{RateLimiter, RouteBucket, normalize_route};
pub use transport::{ApiRequest, ApiResponse, AuthScheme, HttpTransport, Transport, UploadPart};

use sessrec_recovery::Platform;

impl ApiClient<HttpTransport> {
    /// A client wired for one platform with a recovered token.
    pub fn for_platform(platform: Platform, token: &str) -> Self {
        ApiClient::new(base_url(platform), auth_scheme(platform, token))
    }
}
