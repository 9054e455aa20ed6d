//! Tasker worker: holds one connection to a coordinator, runs each shell
//! command it receives under a hard timeout, and replies with the tail of the
//! command's output.

pub use cli::Cli;
pub use config::WorkerConfig;
pub use connection::{
    Connection, Endpoint, FramedConnection, TransportError, WireMessage, WsConnection,
};
pub use worker::{Iteration, TIMEOUT_MARKER, TRUNCATION_NOTICE, Worker, WorkerError};

pub mod cli;
pub mod config;
pub mod connection;
pub mod staging;
pub mod utils;
pub mod worker;
