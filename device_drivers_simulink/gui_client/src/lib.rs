/*
TCP client called by the Simulink device driver blocks to stream instrumentation data
(voltages, currents and their fundamental frequencies) to the GUI / storage process on
localhost, and to read back the single value the GUI sends each tick.

The Rust API (GuiClient) returns errors to the caller. The C entry points in `ffi` keep
the behaviour the Simulink blocks were built around: one process wide connection, and
any socket error ends the process.
*/

pub mod client;
pub mod ffi;

pub use client::{ClientConfig, Connector, GuiClient, ReadPolicy, TcpConnector};
pub use telemetry_record::TelemetryRecord;

use std::io::Error as IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Could not create socket: {0}")]
    Socket(#[source] IoError),
    #[error("Could not connect to server {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: IoError,
    },
    #[error("Send failed: {0}")]
    Send(#[source] IoError),
    #[error("Receive failed: {0}")]
    Receive(#[source] IoError),
    #[error("Not connected to server")]
    NotConnected,
}
