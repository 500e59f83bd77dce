//! Local HTTP control plane.
//!
//! ```text
//! TcpStream ──read once──► HttpRequest ──► Router ──► Session
//!                                            │
//! TcpStream ◄──write + close── HttpResponse ◄┘
//! ```

pub mod request;
pub mod response;
pub mod routes;
pub mod server;

pub use request::{HttpRequest, MAX_REQUEST_SIZE, Method, parse_json_int};
pub use response::HttpResponse;
pub use routes::{RetryPolicy, Route, Router};
pub use server::{ControlServer, ServerConfig};
