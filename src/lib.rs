//! A connection-reusing, protocol-negotiating HTTP client engine.
//!
//! `corehttp` drives HTTP/1.0, HTTP/1.1 and HTTP/2 requests against a remote
//! origin, optionally through a forward proxy, over plaintext or TLS. It owns
//! the connection lifecycle and pool, the HTTP/1.x framing pipeline, the
//! HTTP/2 negotiation and per-stream driver, body transfer/content coding,
//! and the cookie jar contract. It does not do URL parsing beyond what
//! [`http::Uri`] gives us, it does not follow redirects, and it does not
//! retry failed requests: those are policy decisions left to the caller.
//!
//! The entry point is [`client::request`]. Most callers will construct a
//! [`client::Settings`] once and reuse it across requests so that connections
//! and HTTP/2 sessions are pooled per origin.

#![warn(unreachable_pub)]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

pub mod body;
mod common;
pub mod conn;
pub mod cookie;
mod error;
mod h1;
mod h2;
pub mod header;
pub mod model;
pub mod pool;
pub mod tls;

pub mod client;

pub use error::{Error, ErrorKind, Result};
pub use header::HeaderMap;
pub use model::{HttpMethod, HttpVersion, Request, Response};
