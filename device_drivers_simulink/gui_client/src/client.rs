use crate::ClientError;
use common::constants::{RECORD_LEN, REPLY_SIZE};
use common::ports::{SERVER_TCP_IP, TCP_PORT};
use log::{debug, error, info, warn};
use std::io::{Error as IoError, ErrorKind};
use tcp_interface::{create_socket, Interface, TcpInterface};
use telemetry_record::{decode_reply, TelemetryRecord};

/// Where the GUI listens. Defaults to the compiled-in endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            ip: SERVER_TCP_IP.to_string(),
            port: TCP_PORT,
        }
    }
}

impl ClientConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// How `receive` treats a reply that arrives split over several transport reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Keep reading until all 8 bytes of the reply are in
    #[default]
    Exact,
    /// Take whatever a single read returns. Missing trailing bytes stay zero.
    SingleRead,
}

/// Opens the transport for a GuiClient
pub trait Connector {
    type Transport: Interface;

    fn connect(&mut self) -> Result<Self::Transport, ClientError>;
}

#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    pub config: ClientConfig,
}

impl Connector for TcpConnector {
    type Transport = TcpInterface;

    fn connect(&mut self) -> Result<TcpInterface, ClientError> {
        let socket_fd = create_socket().map_err(ClientError::Socket)?;
        TcpInterface::connect_socket(socket_fd, self.config.ip.clone(), self.config.port).map_err(
            |source| ClientError::Connect {
                addr: self.config.endpoint(),
                source,
            },
        )
    }
}

/// The one connection between the driver blocks and the GUI.
///
/// Holding a transport is what "connected" means, so closing (or a failed send / receive)
/// always leaves the client ready for a fresh `connect`.
pub struct GuiClient<C: Connector = TcpConnector> {
    connector: C,
    transport: Option<C::Transport>,
    read_policy: ReadPolicy,
}

impl GuiClient<TcpConnector> {
    pub fn new(config: ClientConfig) -> Self {
        GuiClient::with_connector(TcpConnector { config })
    }
}

impl Default for GuiClient<TcpConnector> {
    fn default() -> Self {
        GuiClient::new(ClientConfig::default())
    }
}

impl<C: Connector> GuiClient<C> {
    pub fn with_connector(connector: C) -> Self {
        GuiClient {
            connector,
            transport: None,
            read_policy: ReadPolicy::default(),
        }
    }

    pub fn with_read_policy(mut self, read_policy: ReadPolicy) -> Self {
        self.read_policy = read_policy;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn transport(&self) -> Option<&C::Transport> {
        self.transport.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Connect to the GUI if not already connected. A second call while connected does nothing.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if self.transport.is_some() {
            debug!("Already connected to server");
            return Ok(());
        }
        let transport = self.connector.connect()?;
        info!("Connected to server");
        self.transport = Some(transport);
        Ok(())
    }

    /// Send one record, looping until all 104 bytes have been accepted by the transport.
    pub fn send(&mut self, record: &TelemetryRecord) -> Result<(), ClientError> {
        let bytes = record.to_bytes();
        let transport = self.transport.as_mut().ok_or(ClientError::NotConnected)?;
        if let Err(e) = transport.send_all(&bytes) {
            self.drop_transport();
            return Err(ClientError::Send(e));
        }
        Ok(())
    }

    /// Same as `send` with the values in wire order:
    /// debug, V1..V3, I1..I3, f0_V1..f0_V3, f0_I1..f0_I3
    pub fn send_values(&mut self, values: [f64; RECORD_LEN]) -> Result<(), ClientError> {
        self.send(&TelemetryRecord::from_values(values))
    }

    /// Block until the GUI sends a value.
    ///
    /// There is no timeout: only call this when the GUI produces data independently of the
    /// caller's own ticks, otherwise both sides wait on each other forever.
    pub fn receive(&mut self) -> Result<f64, ClientError> {
        let transport = self.transport.as_mut().ok_or(ClientError::NotConnected)?;
        let mut buffer = [0u8; REPLY_SIZE];
        let result = match self.read_policy {
            ReadPolicy::Exact => transport.read_full(&mut buffer),
            ReadPolicy::SingleRead => read_once(transport, &mut buffer),
        };
        if let Err(e) = result {
            self.drop_transport();
            return Err(ClientError::Receive(e));
        }
        Ok(decode_reply(buffer))
    }

    /// Close the connection. Closing an already closed client is a no-op.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!("Socket closed successfully.");
        }
    }

    fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            error!("Connection to server dropped after transport error");
        }
    }
}

impl<C: Connector> Drop for GuiClient<C> {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_once<T: Interface>(transport: &mut T, buffer: &mut [u8]) -> Result<(), IoError> {
    loop {
        match transport.read(buffer) {
            Ok(0) => {
                return Err(IoError::new(
                    ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ))
            }
            Ok(n) => {
                if n < buffer.len() {
                    warn!("Short read: got {} of {} bytes", n, buffer.len());
                }
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::constants::RECORD_SIZE;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};
    use tcp_interface::{bind_listener, ChunkedInterface};
    use telemetry_record::encode_reply;

    // Rust tests are done in parallel. Port must unique for the testcases
    const BASE_TEST_PORT: u16 = 44000;

    const SCENARIO: [f64; RECORD_LEN] = [
        1.0, 220.1, 219.8, 220.3, 10.2, 10.1, 10.3, 50.0, 50.0, 50.0, 50.1, 50.1, 50.0,
    ];

    /// Hands out scripted in-memory transports and counts how many were opened
    #[derive(Default)]
    struct ScriptedConnector {
        connects: usize,
        send_chunks: Vec<usize>,
        reply: Vec<u8>,
        read_chunks: Vec<usize>,
    }

    impl Connector for ScriptedConnector {
        type Transport = ChunkedInterface;

        fn connect(&mut self) -> Result<ChunkedInterface, ClientError> {
            self.connects += 1;
            let mut transport = ChunkedInterface::with_read_chunks(&self.reply, &self.read_chunks);
            transport.send_chunks = self.send_chunks.clone();
            Ok(transport)
        }
    }

    fn test_client(port: u16) -> GuiClient {
        GuiClient::new(ClientConfig {
            ip: "127.0.0.1".to_string(),
            port,
        })
    }

    fn read_record(stream: &mut impl std::io::Read) -> TelemetryRecord {
        let mut buf = [0u8; RECORD_SIZE];
        stream.read_exact(&mut buf).unwrap();
        TelemetryRecord::from_bytes(&buf).unwrap()
    }

    #[test]
    fn default_config_is_compiled_in_endpoint() {
        assert_eq!(ClientConfig::default().endpoint(), "127.0.0.1:25000");
    }

    #[test]
    fn second_connect_opens_nothing() {
        let mut client = GuiClient::with_connector(ScriptedConnector::default());
        client.connect().unwrap();
        client.connect().unwrap();
        assert!(client.is_connected());
        assert_eq!(client.connector().connects, 1);
    }

    #[test]
    fn second_connect_is_one_socket_on_the_wire() {
        let port = BASE_TEST_PORT + 1;
        let listener = bind_listener("127.0.0.1", port).unwrap();
        let mut client = test_client(port);
        client.connect().unwrap();
        client.connect().unwrap();
        client.send_values(SCENARIO).unwrap();

        let (mut stream, _) = listener.accept().unwrap();
        assert_eq!(read_record(&mut stream).values(), SCENARIO);
        listener.set_nonblocking(true).unwrap();
        let second = listener.accept().map(|_| ()).unwrap_err();
        assert_eq!(second.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn send_completes_over_partial_writes() {
        let mut client = GuiClient::with_connector(ScriptedConnector {
            send_chunks: vec![40, 64],
            ..Default::default()
        });
        client.connect().unwrap();
        client.send_values(SCENARIO).unwrap();

        let transport = client.transport().unwrap();
        assert_eq!(transport.send_calls, 2);
        assert_eq!(transport.sent.len(), 104);
        assert_eq!(
            TelemetryRecord::from_bytes(&transport.sent).unwrap().values(),
            SCENARIO
        );
    }

    #[test]
    fn send_failure_drops_the_connection() {
        let mut client = GuiClient::with_connector(ScriptedConnector {
            send_chunks: vec![40, 0],
            ..Default::default()
        });
        client.connect().unwrap();
        let err = client.send_values(SCENARIO).unwrap_err();
        assert!(matches!(err, ClientError::Send(ref e) if e.kind() == ErrorKind::WriteZero));
        assert!(!client.is_connected());
    }

    #[test]
    fn operations_before_connect_are_rejected() {
        let mut client = GuiClient::with_connector(ScriptedConnector::default());
        assert!(matches!(
            client.send_values(SCENARIO),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(client.receive(), Err(ClientError::NotConnected)));
        assert_eq!(client.connector().connects, 0);
    }

    #[test]
    fn exact_read_waits_for_all_eight_bytes() {
        let mut client = GuiClient::with_connector(ScriptedConnector {
            reply: encode_reply(0.003321).to_vec(),
            read_chunks: vec![3, 5],
            ..Default::default()
        });
        client.connect().unwrap();
        assert_eq!(client.receive().unwrap(), 0.003321);
    }

    #[test]
    fn single_read_keeps_legacy_short_read() {
        let reply = encode_reply(-12.5);
        let mut client = GuiClient::with_connector(ScriptedConnector {
            reply: reply.to_vec(),
            read_chunks: vec![4],
            ..Default::default()
        })
        .with_read_policy(ReadPolicy::SingleRead);
        client.connect().unwrap();

        let mut expected = [0u8; REPLY_SIZE];
        expected[..4].copy_from_slice(&reply[..4]);
        assert_eq!(
            client.receive().unwrap().to_bits(),
            f64::from_ne_bytes(expected).to_bits()
        );
        assert!(client.is_connected());
    }

    #[test]
    fn short_reply_then_eof_is_a_receive_error() {
        let mut client = GuiClient::with_connector(ScriptedConnector {
            reply: vec![1, 2, 3],
            ..Default::default()
        });
        client.connect().unwrap();
        let err = client.receive().unwrap_err();
        assert!(matches!(err, ClientError::Receive(ref e) if e.kind() == ErrorKind::UnexpectedEof));
        assert!(!client.is_connected());
    }

    #[test]
    fn echoed_record_keeps_field_order() {
        let port = BASE_TEST_PORT + 2;
        let listener = bind_listener("127.0.0.1", port).unwrap();
        let echo = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; RECORD_SIZE];
            std::io::Read::read_exact(&mut stream, &mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let values = [
            -0.0,
            f64::MAX,
            f64::MIN_POSITIVE,
            1.0e-300,
            -325.27,
            std::f64::consts::PI,
            std::f64::consts::E,
            49.999999999,
            50.000000001,
            60.0,
            -1.0,
            f64::EPSILON,
            12345.678,
        ];
        let mut client = test_client(port);
        client.connect().unwrap();
        client.send_values(values).unwrap();

        // read the echo back field by field through the reply path
        let mut echoed = [0.0; RECORD_LEN];
        for slot in echoed.iter_mut() {
            *slot = client.receive().unwrap();
        }
        for (sent, got) in values.iter().zip(echoed.iter()) {
            assert_eq!(sent.to_bits(), got.to_bits());
        }
        echo.join().unwrap();
    }

    #[test]
    fn receive_blocks_until_server_writes() {
        let port = BASE_TEST_PORT + 3;
        let listener = bind_listener("127.0.0.1", port).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_record(&mut stream);
            thread::sleep(Duration::from_millis(200));
            stream.write_all(&encode_reply(7.5)).unwrap();
        });

        let mut client = test_client(port);
        client.connect().unwrap();
        client.send_values(SCENARIO).unwrap();
        let started = Instant::now();
        let value = client.receive().unwrap();
        let waited = started.elapsed();

        assert_eq!(value, 7.5);
        assert!(waited >= Duration::from_millis(150), "returned after {:?}", waited);
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_a_connect_error() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut client = test_client(port);
        match client.connect() {
            Err(ClientError::Connect { addr, source }) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port));
                assert_eq!(source.kind(), ErrorKind::ConnectionRefused);
            }
            other => panic!("expected connect error, got {:?}", other),
        }
        assert!(!client.is_connected());
    }

    #[test]
    fn tick_scenario_then_close() {
        let port = BASE_TEST_PORT + 4;
        let listener = bind_listener("127.0.0.1", port).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; RECORD_SIZE];
            std::io::Read::read_exact(&mut stream, &mut buf).unwrap();
            stream.write_all(&encode_reply(0.003321)).unwrap();
            // after close the peer sees end of stream
            let mut rest = Vec::new();
            std::io::Read::read_to_end(&mut stream, &mut rest).unwrap();
            (buf, rest.len())
        });

        let mut client = test_client(port);
        client.connect().unwrap();
        client.send_values(SCENARIO).unwrap();
        assert_eq!(client.receive().unwrap(), 0.003321);
        client.close();

        assert!(!client.is_connected());
        assert!(matches!(
            client.send_values(SCENARIO),
            Err(ClientError::NotConnected)
        ));
        client.close();

        let (received, trailing) = server.join().unwrap();
        assert_eq!(received.len(), 104);
        assert_eq!(TelemetryRecord::from_bytes(&received).unwrap().values(), SCENARIO);
        assert_eq!(trailing, 0);
    }

    #[test]
    fn connect_after_close_opens_a_fresh_socket() {
        let port = BASE_TEST_PORT + 5;
        let listener = bind_listener("127.0.0.1", port).unwrap();
        let server = thread::spawn(move || {
            let mut firsts = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().unwrap();
                firsts.push(read_record(&mut stream).debug);
            }
            firsts
        });

        let mut client = test_client(port);
        client.connect().unwrap();
        client.send_values(SCENARIO).unwrap();
        client.close();

        let mut second = SCENARIO;
        second[0] = 2.0;
        client.connect().unwrap();
        client.send_values(second).unwrap();

        assert_eq!(server.join().unwrap(), vec![1.0, 2.0]);
    }
}
