//! Raw I/O backend (ยง4.1/ยง5): owns the framed socket. `TcpBackend` dispatches
//! outbound packages and routes inbound ones back to the driver; the driver
//! talks to it only through `BackendDriver`'s channels. Grounded on the
//! websocket backend this crate's connection driver generalizes, with the
//! keepalive ping replaced by the protocol's own heartbeat operation (owned
//! by the driver, not the backend).

use crate::{codec::PackageCodec, config::ClientSettings, discovery::DiscoveredEndpoint, error::ClientError, package::Package};
use futures_channel::{mpsc, oneshot};
use futures_util::{select, SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::{io::AsyncRead, io::AsyncWrite, net::TcpStream};
use tokio_util::codec::Framed;
use tracing::{error, trace};

/// Blanket trait object for "either a plain or TLS-wrapped stream", since
/// there is no single std/tokio trait combining async read + write + unpin.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Handle used by the connection driver to talk to a running `TcpBackend`.
pub struct BackendDriver {
    pub to_handle: mpsc::UnboundedReceiver<Package>,
    pub error: oneshot::Receiver<ClientError>,
    pub dispatcher: mpsc::UnboundedSender<Package>,
    shutdown: oneshot::Sender<()>,
}

impl BackendDriver {
    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
    }
}

pub struct TcpBackend {
    stream: Framed<Box<dyn AsyncStream>, PackageCodec>,
    handler: mpsc::UnboundedSender<Package>,
    error: oneshot::Sender<ClientError>,
    to_dispatch: mpsc::UnboundedReceiver<Package>,
    shutdown: oneshot::Receiver<()>,
}

impl TcpBackend {
    /// Opens a TCP connection to `endpoint`, optionally upgrading to TLS per
    /// `endpoints`' configuration, and attaches the package codec.
    pub async fn connect(
        endpoint: &DiscoveredEndpoint,
        settings: &ClientSettings,
    ) -> Result<(Self, BackendDriver), ClientError> {
        let addr: SocketAddr = endpoint.addr;
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true).ok();

        let boxed: Box<dyn AsyncStream> = if settings.tls {
            #[cfg(feature = "tls")]
            {
                let server_name = settings.tls_server_name.as_deref().unwrap_or(&endpoint.host);
                let tls_stream = crate::tls::connect(tcp, server_name, settings.insecure_trust_all).await?;
                Box::new(tls_stream)
            }
            #[cfg(not(feature = "tls"))]
            {
                return Err(ClientError::Tls("tls requested but the `tls` feature is disabled".into()));
            }
        } else {
            Box::new(tcp)
        };

        let framed = Framed::new(boxed, PackageCodec::default());
        Ok(Self::new(framed))
    }

    pub fn new(stream: Framed<Box<dyn AsyncStream>, PackageCodec>) -> (Self, BackendDriver) {
        let (handler, to_handle) = mpsc::unbounded();
        let (dispatcher, to_dispatch) = mpsc::unbounded();
        let (error_tx, error_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        (
            TcpBackend { stream, handler, error: error_tx, to_dispatch, shutdown: shutdown_rx },
            BackendDriver { to_handle, error: error_rx, dispatcher, shutdown: shutdown_tx },
        )
    }

    /// Runs the backend until shutdown, a fatal I/O error, or the driver
    /// dropping its side of the channels.
    pub fn spawn(mut self) {
        let fut = async move {
            let mut fatal: Option<ClientError> = None;
            loop {
                select! {
                    incoming = self.stream.next() => {
                        match incoming {
                            Some(Ok(pkg)) => {
                                if self.handler.unbounded_send(pkg).is_err() {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                error!(err = %e, "frame decode error");
                                fatal = Some(ClientError::Frame(e));
                                break;
                            }
                            None => {
                                trace!("peer closed connection");
                                fatal = Some(ClientError::Io(std::io::Error::new(
                                    std::io::ErrorKind::ConnectionReset,
                                    "connection closed by peer",
                                )));
                                break;
                            }
                        }
                    }
                    outgoing = self.to_dispatch.next() => {
                        match outgoing {
                            Some(pkg) => {
                                if let Err(e) = self.stream.send(pkg).await {
                                    error!(err = %e, "frame write error");
                                    fatal = Some(ClientError::Frame(e));
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = &mut self.shutdown => break,
                }
            }
            if let Some(err) = fatal {
                let _ = self.error.send(err);
            }
        };
        tokio::spawn(fut);
    }
}
