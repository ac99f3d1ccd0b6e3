use tokio::net::{TcpListener, TcpStream};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use std::net::SocketAddr;
use tracing::{info, error};
use std::time::Duration;

use crate::constants::HEARTBEAT_INTERVAL_SECS;

/// Accept TCP clients on `addr` and stream every state line from `tx` to each of them.
pub async fn run_tcp_listen_output(
    addr: String,
    tx: broadcast::Sender<Vec<u8>>, // We use Sender to subscribe new clients
) {
    // Parse address
    let socket_addr: SocketAddr = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!("Invalid address {}: {}", addr, e);
            return;
        }
    };

    match TcpListener::bind(socket_addr).await {
        Ok(listener) => {
            info!("Listening for state clients on {}", addr);
            serve_listener(listener, tx, Duration::from_secs(HEARTBEAT_INTERVAL_SECS)).await;
        }
        Err(e) => {
            error!("Failed to bind state listener on {}: {}", addr, e);
        }
    }
}

/// Accept loop on an already bound listener. Idle clients get a bare newline every `heartbeat`.
pub async fn serve_listener(
    listener: TcpListener,
    tx: broadcast::Sender<Vec<u8>>,
    heartbeat: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("Accepted state client connection from {}", peer_addr);
                let client_rx = tx.subscribe();
                tokio::spawn(stream_to_client(stream, peer_addr, client_rx, heartbeat));
            }
            Err(e) => {
                error!("Accept failed: {}", e);
            }
        }
    }
}

/// Forward lines to one client, with a newline heartbeat so idle peers notice dead links.
async fn stream_to_client(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    mut client_rx: broadcast::Receiver<Vec<u8>>,
    heartbeat: Duration,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            result = client_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Err(e) = stream.write_all(&msg).await {
                            info!("Client {} disconnected: {}", peer_addr, e);
                            break;
                        }
                        if let Err(e) = stream.flush().await {
                            info!("Client {} flush error: {}", peer_addr, e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = interval.tick() => {
                if let Err(e) = stream.write_all(b"\n").await {
                    info!("Client {} heartbeat write error: {}", peer_addr, e);
                    break;
                }
                if let Err(e) = stream.flush().await {
                    info!("Client {} heartbeat flush error: {}", peer_addr, e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_listener_streams_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = broadcast::channel(16);
        tokio::spawn(serve_listener(listener, tx.clone(), Duration::from_secs(HEARTBEAT_INTERVAL_SECS)));

        let client = TcpStream::connect(addr).await.unwrap();
        let mut reader = BufReader::new(client);

        // Wait until the server has subscribed the client
        tokio::time::timeout(Duration::from_secs(5), async {
            while tx.receiver_count() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tx.send(b"{\"latitude\":1.0}\n".to_vec()).unwrap();
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "{\"latitude\":1.0}\n");
    }

    #[tokio::test]
    async fn test_idle_client_gets_heartbeat() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = broadcast::channel(16);
        tokio::spawn(serve_listener(listener, tx, Duration::from_millis(50)));

        let client = TcpStream::connect(addr).await.unwrap();
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "\n");
    }

    #[tokio::test]
    async fn test_invalid_address_returns() {
        let (tx, _rx) = broadcast::channel(1);
        run_tcp_listen_output("not-an-address".to_string(), tx).await;
    }
}
