/*
Byte-level TCP transport shared by the Simulink GUI driver and the dev tools.

The Interface trait is the seam the driver is written against, so a test can
swap the socket out for a transport that accepts partial writes.
*/
use common::constants::TCP_BACKLOG;
use log::{debug, info};
use nix::sys::socket::{
    bind, connect, listen, setsockopt, socket, sockopt, AddressFamily, Backlog, SockFlag,
    SockType, SockaddrIn,
};
use std::io::{Error, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, OwnedFd};

/// Interface trait to be implemented by all external interfaces
pub trait Interface {
    /// Send byte data to the interface as a shared slice type byte. Return number of bytes sent
    fn send(&mut self, data: &[u8]) -> Result<usize, Error>;
    /// Read byte data from the interface into a byte slice buffer. Return number of bytes read
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Error>;
    /// Release the underlying transport. Interfaces with nothing to release keep the default.
    fn close(&mut self) {}

    /// Keep sending until every byte of `data` has been accepted by the transport.
    fn send_all(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut remaining = data;
        while !remaining.is_empty() {
            match self.send(remaining) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::WriteZero,
                        "transport accepted zero bytes",
                    ))
                }
                Ok(n) => {
                    trace_chunk("sent", n, remaining.len());
                    remaining = &remaining[n..];
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Keep reading until `buffer` is full. Hitting end of stream first is `UnexpectedEof`.
    fn read_full(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.read(&mut buffer[filled..]) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("peer closed after {} of {} bytes", filled, buffer.len()),
                    ))
                }
                Ok(n) => {
                    trace_chunk("read", n, buffer.len() - filled);
                    filled += n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn trace_chunk(direction: &str, n: usize, outstanding: usize) {
    if n < outstanding {
        debug!("Partial transfer: {} {} of {} bytes", direction, n, outstanding);
    }
}

fn parse_ipv4(ip: &str) -> Result<Ipv4Addr, Error> {
    ip.parse::<Ipv4Addr>()
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("{}: {}", ip, e)))
}

/// Create an IPv4 stream socket.
/// Kept apart from connecting so callers can tell a socket creation failure from a refused connection.
pub fn create_socket() -> Result<OwnedFd, Error> {
    let fd = socket(
        AddressFamily::Inet,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )?;
    Ok(fd)
}

/// Bind a listening TCP socket with the GUI's connection backlog.
/// std's TcpListener::bind does not let the backlog be chosen, so the socket is built with nix.
pub fn bind_listener(ip: &str, port: u16) -> Result<TcpListener, Error> {
    let addr = SocketAddrV4::new(parse_ipv4(ip)?, port);
    let fd = create_socket()?;
    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    bind(fd.as_raw_fd(), &SockaddrIn::from(addr))?;
    listen(&fd, Backlog::new(TCP_BACKLOG as i32)?)?;
    info!("Listening on {} (backlog {})", addr, TCP_BACKLOG);
    Ok(TcpListener::from(fd))
}

/// TCP Interface for communication between the Simulink driver blocks and the GUI
#[derive(Debug)]
pub struct TcpInterface {
    ip: String,
    port: u16,
    pub stream: TcpStream,
}

impl TcpInterface {
    pub fn new_client(ip: String, port: u16) -> Result<TcpInterface, Error> {
        let socket_fd = create_socket()?;
        TcpInterface::connect_socket(socket_fd, ip, port)
    }

    /// Blocking connect of a socket made by create_socket
    pub fn connect_socket(socket_fd: OwnedFd, ip: String, port: u16) -> Result<TcpInterface, Error> {
        let addr = SocketAddrV4::new(parse_ipv4(&ip)?, port);
        connect(socket_fd.as_raw_fd(), &SockaddrIn::from(addr))?;
        debug!("Connected to {}", addr);
        Ok(TcpInterface {
            ip,
            port,
            stream: TcpStream::from(socket_fd),
        })
    }

    /// Bind, then block until exactly one peer connects.
    pub fn new_server(ip: String, port: u16) -> Result<TcpInterface, Error> {
        let listener = bind_listener(&ip, port)?;
        TcpInterface::accept(&listener)
    }

    /// Block until the next peer connects on an already bound listener.
    pub fn accept(listener: &TcpListener) -> Result<TcpInterface, Error> {
        let (stream, peer) = listener.accept()?;
        info!("New connection: {}", peer);
        let local = listener.local_addr()?;
        Ok(TcpInterface {
            ip: local.ip().to_string(),
            port: local.port(),
            stream,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Interface for TcpInterface {
    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        let n = self.stream.write(data)?;
        self.stream.flush()?;
        Ok(n)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        let n = self.stream.read(buffer)?;
        Ok(n)
    }

    fn close(&mut self) {
        // not much you can do about errors on shutdown
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Interface over an in-memory script of transfer sizes, used to exercise partial sends and reads.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct ChunkedInterface {
    /// Maximum bytes accepted by each successive send; empty means "accept everything"
    pub send_chunks: Vec<usize>,
    pub sent: Vec<u8>,
    pub send_calls: usize,
    /// Bytes handed out by read, in the given chunk sizes
    pub read_data: Vec<u8>,
    pub read_chunks: Vec<usize>,
    read_pos: usize,
}

#[cfg(any(test, feature = "test-util"))]
impl ChunkedInterface {
    pub fn with_send_chunks(chunks: &[usize]) -> Self {
        ChunkedInterface {
            send_chunks: chunks.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_read_chunks(data: &[u8], chunks: &[usize]) -> Self {
        ChunkedInterface {
            read_data: data.to_vec(),
            read_chunks: chunks.to_vec(),
            ..Default::default()
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Interface for ChunkedInterface {
    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        let limit = self
            .send_chunks
            .get(self.send_calls)
            .copied()
            .unwrap_or(data.len());
        self.send_calls += 1;
        let n = limit.min(data.len());
        self.sent.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        let remaining = &self.read_data[self.read_pos..];
        let chunk = if self.read_chunks.is_empty() {
            remaining.len()
        } else {
            self.read_chunks.remove(0)
        };
        let n = chunk.min(remaining.len()).min(buffer.len());
        buffer[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }
}
