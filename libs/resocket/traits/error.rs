use thiserror::Error;

/// Main error type for resocket
#[derive(Error, Debug)]
pub enum SocketError {
    /// Handshake request could not be built or the transport failed
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Payload offered to a transport that is not open
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Address provider could not produce a URL; counts as a failed attempt
    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    /// The engine task (or a transport's I/O task) is gone
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Invalid retry policy, options or builder state
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Message handler rejected a delivered message
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Result type for resocket operations
pub type Result<T> = std::result::Result<T, SocketError>;
