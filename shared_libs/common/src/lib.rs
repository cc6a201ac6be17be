pub mod record_fields;
pub use record_fields::RecordField;

/// Endpoint of the GUI (storage management) process the Simulink driver blocks talk to
pub mod ports {
    /// Server (storage management device) IP address
    pub const SERVER_TCP_IP: &str = "127.0.0.1";
    /// Client (RedPitaya) IP address
    pub const CLIENT_TCP_IP: &str = "127.0.0.1";
    pub const TCP_PORT: u16 = 25000;
}

/// For constants that are used across the entire project
pub mod constants {
    /// Maximum length for the queue of pending connections (server side only)
    pub const TCP_BACKLOG: u32 = 10;
    /// Maximum buffer size (in bytes) for a single socket send
    pub const TCP_BUFFER_SIZE: usize = 1024;

    /// Size of one double on the wire
    pub const F64_SIZE: usize = std::mem::size_of::<f64>();
    /// Number of doubles in a telemetry record
    pub const RECORD_LEN: usize = 13;
    pub const RECORD_SIZE: usize = RECORD_LEN * F64_SIZE; // 104
    /// The GUI answers with a single double
    pub const REPLY_SIZE: usize = F64_SIZE;
}
