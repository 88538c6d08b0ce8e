//! CGI 1.1 bridge: run a taxonomy-local tool as a CGI script and translate its output.
//!
//! The request side builds the environment contract (`GATEWAY_INTERFACE`, `REQUEST_METHOD`,
//! `PATH_INFO`, ...); the response side is a two-phase scanner: header block, then opaque body.

mod bridge;
mod request;
mod response;

pub use bridge::{CgiBridge, CgiError};
pub use request::{CgiMethod, CgiRequest, DEFAULT_CONTENT_TYPE};
pub use response::{parse_cgi_response, scan_headers, CgiHeaders, CgiResponse, HeaderScan};
