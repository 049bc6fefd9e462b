//! Tether HTTP
//!
//! Loopback HTTP server that serves a document root, plus overlay
//! directories, to embedded web content.
//!
//! All I/O is synchronous: one listener thread accepts connections and each
//! connection is served on its own thread.

#![warn(missing_docs)]

pub mod error;
pub mod handles;
pub mod mime;
pub mod request;
pub mod response;
pub mod server;

pub use error::ServerError;
pub use request::{Method, Request, Version, MAX_HEAD_SIZE};
pub use response::{http_date, http_status_text, ResponseHead};
pub use server::{DocumentRoots, FileServer, ResolvedFile, Response, DEFAULT_HOST};
