pub mod app;
pub mod routes;
pub mod stream;
pub mod websocket;

pub use app::*;
