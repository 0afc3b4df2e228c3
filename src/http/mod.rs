//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, graceful shutdown)
//!     → request.rs (request ID, caller data decoding)
//!     → direct_post.rs (decrypt → dispatch → encrypt)
//!     → response.rs (303 redirect, JSONP, 405, 502)
//!     → Send to client
//! ```

pub mod direct_post;
pub mod request;
pub mod response;
pub mod server;

pub use direct_post::{DirectPostError, DirectPostHandler, SetupError};
pub use response::DirectPostReply;
pub use server::{direct_post_router, HttpServer};
