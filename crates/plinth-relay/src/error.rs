use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced when bringing a relay up.
///
/// Everything past startup (lost sockets, malformed frames, unresponsive
/// peers) is handled per connection and logged rather than returned.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(
        "Failed to bind relay on {addr}: {source}\n\n\
         Hint: another process may be using this port. Stop it or configure a different relay port."
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
