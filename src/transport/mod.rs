//! Control-protocol transport
//!
//! The engine talks to the server only through the [`Transport`] trait: a
//! request/response `call`, and one ordered stream of pushed events per
//! connection. The wire encoding stays behind the implementation.

#[cfg(feature = "obs-websocket")]
mod obs;
mod protocol;
#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "obs-websocket")]
pub use obs::ObsWebSocket;
pub use protocol::*;

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Ordered stream of server events for one connection
pub type EventStream = mpsc::UnboundedReceiver<Event>;

/// Capability set the engine needs from a control-protocol client
pub trait Transport: Send + Sync + 'static {
    /// Open a connection, replacing any existing one
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the connection. Event streams handed out before this end.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    /// Issue one request and wait for its response
    fn call(&self, request: Request)
        -> impl Future<Output = Result<Response, TransportError>> + Send;

    /// Start delivering the given event kinds, in arrival order, on a fresh stream
    fn subscribe(&self, kinds: &[EventKind]) -> Result<EventStream, TransportError>;
}

/// Issue a call bounded by `timeout`
pub async fn call_with_timeout<T: Transport>(
    transport: &T,
    request: Request,
    timeout: Duration,
) -> Result<Response, TransportError> {
    let name = request.name();
    match tokio::time::timeout(timeout, transport.call(request)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            request: name,
            elapsed: timeout,
        }),
    }
}
