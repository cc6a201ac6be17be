/*
C entry points called from the Simulink device driver blocks.

The blocks share one connection for the whole process and have no way to handle an
error, so every failure here is reported on stderr and ends the process.

Building with the `legacy-single-read` feature restores the old receive path: one read per
reply with missing bytes left zero, and receive errors logged and answered with 0.0 instead
of ending the process.
*/

use crate::{ClientConfig, ClientError, GuiClient, ReadPolicy};
#[cfg(feature = "legacy-single-read")]
use log::warn;
use log::error;
use std::process;
use std::sync::{Mutex, PoisonError};

static CLIENT: Mutex<Option<GuiClient>> = Mutex::new(None);

#[cfg(not(feature = "legacy-single-read"))]
const READ_POLICY: ReadPolicy = ReadPolicy::Exact;
#[cfg(feature = "legacy-single-read")]
const READ_POLICY: ReadPolicy = ReadPolicy::SingleRead;

fn shared_client(config: ClientConfig) -> GuiClient {
    GuiClient::new(config).with_read_policy(READ_POLICY)
}

#[cfg(not(feature = "legacy-single-read"))]
fn receive_value(client: &mut GuiClient) -> Result<f64, ClientError> {
    client.receive()
}

#[cfg(feature = "legacy-single-read")]
fn receive_value(client: &mut GuiClient) -> Result<f64, ClientError> {
    Ok(client.receive().unwrap_or_else(|err| {
        warn!("{}", err);
        0.0
    }))
}

fn exit_on_error<T>(result: Result<T, ClientError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!("{}", err);
            eprintln!("{}", err);
            process::exit(1)
        }
    }
}

fn with_client<T>(op: impl FnOnce(&mut GuiClient) -> Result<T, ClientError>) -> T {
    let mut guard = CLIENT.lock().unwrap_or_else(PoisonError::into_inner);
    let client = guard.get_or_insert_with(|| shared_client(ClientConfig::default()));
    exit_on_error(op(client))
}

/// Connect to the GUI server if not already connected.
#[no_mangle]
pub extern "C" fn connect_to_server() {
    with_client(|client| client.connect())
}

/// Send one telemetry record to the GUI server.
#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub extern "C" fn send_socket_data(
    debug: f64,
    v1: f64,
    v2: f64,
    v3: f64,
    i1: f64,
    i2: f64,
    i3: f64,
    f0_v1: f64,
    f0_v2: f64,
    f0_v3: f64,
    f0_i1: f64,
    f0_i2: f64,
    f0_i3: f64,
) {
    with_client(|client| {
        client.send_values([
            debug, v1, v2, v3, i1, i2, i3, f0_v1, f0_v2, f0_v3, f0_i1, f0_i2, f0_i3,
        ])
    })
}

/// Blocking read of the next value sent by the GUI server.
#[no_mangle]
pub extern "C" fn read_socket_data() -> f64 {
    with_client(receive_value)
}

/// Close the connection. A later connect_to_server opens a new one.
#[no_mangle]
pub extern "C" fn close_socket() {
    let mut guard = CLIENT.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(client) = guard.as_mut() {
        client.close();
    }
}
