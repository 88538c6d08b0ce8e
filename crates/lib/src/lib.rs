//! TDT cloud service core: taxonomy lifecycle, access gate, and the CGI bridge to the
//! taxonomy browser tool, served over HTTP by the gateway.

pub mod auth;
pub mod cgi;
pub mod config;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod init;
pub mod taxonomy;
