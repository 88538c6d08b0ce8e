//! Gateway: the HTTP surface.
//!
//! Browse calls are proxied to the taxonomy's tool through the CGI bridge after the access gate
//! has set the read-only flag; lifecycle and admin routes drive the taxonomy lifecycle.

mod admin;
mod browse;
mod routes;
mod server;

pub use server::{router, run_gateway, serve, GatewayState};
