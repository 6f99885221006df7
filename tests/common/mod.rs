//! Fake single-connection server shared by the integration tests: accepts
//! one TCP connection, frames it with the crate's own [`PackageCodec`], and
//! runs a caller-supplied handler over each incoming [`Package`].

use eventstore_client::{codec::PackageCodec, package::Package};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Accepts one connection from `listener` and, for each incoming package,
/// sends back whatever `handler` returns. Runs until the connection closes.
pub async fn serve_once<F>(listener: TcpListener, mut handler: F)
where
    F: FnMut(Package) -> Vec<Package> + Send + 'static,
{
    let (stream, _) = listener.accept().await.unwrap();
    let mut framed = Framed::new(stream, PackageCodec::default());
    while let Some(Ok(pkg)) = framed.next().await {
        for reply in handler(pkg) {
            if framed.send(reply).await.is_err() {
                return;
            }
        }
    }
}

/// Accepts one connection and immediately drops it without reading anything,
/// simulating a server that vanishes mid-handshake.
pub async fn accept_and_drop(listener: &TcpListener) {
    let (stream, _) = listener.accept().await.unwrap();
    drop(stream);
}
