//! # RESP Gateway Core
//!
//! Purpose: Build the bytes an HTTP location sends to a RESP backend and
//! sanity-check the backend's reply header.
//!
//! ## Design Principles
//! 1. **Compile Once**: Directives become immutable templates shared by all requests.
//! 2. **Exact Sizing**: RESP frames are sized before the single allocation.
//! 3. **No I/O**: Everything here is synchronous and pure; sockets live in the driver.
//! 4. **Protocol Clarity**: Encode RESP2 explicitly; classify replies by type tag only.

mod builder;
mod classify;
mod expr;
mod location;
mod resp;
mod template;

pub use builder::{build, build_with, parse_reply_count, EncodedRequest};
pub use classify::{classify, diagnostic_window, Classification, RejectReason, DIAGNOSTIC_WINDOW};
pub use expr::{Expr, RequestContext, Variables};
pub use location::{compile_locations, Location};
pub use resp::{digit_count, encode_commands, encode_flat, encode_query, encoded_len};
pub use template::QueryTemplate;
