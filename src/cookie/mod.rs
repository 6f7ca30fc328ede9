//! The cookie jar contract this core consumes, plus one provided
//! file-backed implementation.
//!
//! The client never parses `Set-Cookie` or builds `Cookie` headers itself;
//! it calls [`CookieStore::get`] to ask for the header value to send and
//! [`CookieStore::set`] to hand over what the server sent back. Anyone can
//! implement [`CookieStore`] against their own storage (an in-memory map, a
//! database row, ...); [`FileCookieStore`] is the one this core ships.

mod file_store;
mod jar;

pub use file_store::FileCookieStore;
pub use jar::{domain_matches, Cookie, CookieStore};
