//! Deskwire Server
//!
//! Ticket and notice API for the helpdesk plus the realtime transports that
//! tell open browser tabs when something changed.

pub mod board;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod state;

pub use board::TicketBoard;
pub use cli::Cli;
pub use config::{RealtimeConfig, ServerConfig};
pub use error::AppError;
pub use server::{build_app, run_server};
pub use state::AppState;
