//! db-router-core/src/connect.rs
//! Outbound connect procedure: dial a destination with a timeout,
//! distinguishing an immediate refusal from exhausting the timeout budget.

use crate::address::Address;
use crate::stream::BoxedStream;
use std::time::Duration;
use tokio::net::TcpStream;

/// Outcome of dialing a destination. This is a decision the caller acts on,
/// not a failure to propagate: `Refused` and `Timeout` both mean "advance
/// to the next destination", but only `Timeout` counts toward the
/// client's connect-error budget (§4.6).
pub enum ConnectOutcome {
    Connected(BoxedStream),
    Refused(std::io::Error),
    Timeout,
}

/// Resolves `addr` (iterating every address-family candidate the resolver
/// returns, trying each in turn — `TcpStream::connect` already does this
/// for a `host:port` string) and attempts a connection within `timeout`.
/// On success the stream is left in blocking-equivalent (fully negotiated)
/// state with `TCP_NODELAY` set.
pub async fn connect(addr: &Address, timeout: Duration) -> ConnectOutcome {
    let target = format!("{}:{}", addr.host, addr.port);
    match tokio::time::timeout(timeout, TcpStream::connect(&target)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            ConnectOutcome::Connected(Box::new(stream))
        }
        Ok(Err(e)) => ConnectOutcome::Refused(e),
        Err(_elapsed) => ConnectOutcome::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn refused_when_nothing_listens() {
        // Bind a listener just to learn a free loopback port, then drop it
        // so the subsequent connect is refused rather than racing with an
        // unrelated process on a fixed port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let addr = Address {
            host: "127.0.0.1".to_string(),
            port,
        };
        let start = Instant::now();
        let outcome = connect(&addr, Duration::from_secs(4)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(outcome, ConnectOutcome::Refused(_)));
    }

    #[tokio::test]
    async fn connects_to_a_real_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = Address {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        };

        let accept = tokio::spawn(async move { listener.accept().await });
        let outcome = connect(&addr, Duration::from_secs(1)).await;
        assert!(matches!(outcome, ConnectOutcome::Connected(_)));
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn timeout_when_peer_never_accepts() {
        // A non-routable TEST-NET-1 address (RFC 5737) black-holes SYNs
        // instead of refusing them, so the connect attempt runs out the
        // timeout budget rather than failing immediately.
        let addr = Address {
            host: "192.0.2.1".to_string(),
            port: 81,
        };
        let outcome = connect(&addr, Duration::from_millis(200)).await;
        assert!(matches!(outcome, ConnectOutcome::Timeout));
    }
}
