//! The HTTP/1.x request/response pipeline: request-line/header
//! serialization, response status-line/header parsing, body framing
//! selection, and keep-alive accounting.

mod conn;
mod role;

pub(crate) use conn::{Http1Conn, RequestBodyWriter, ResponseBody};
pub(crate) use role::{inject_default_headers, ResponseHead};
