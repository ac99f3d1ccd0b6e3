// TCP connection handler
// Line-oriented JSON framing over a single TCP stream

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use std::net::SocketAddr;
use std::io;

/// A single TCP connection carrying newline-delimited JSON
pub struct Connection {
    reader: BufReader<tokio::io::ReadHalf<TcpStream>>,
    writer: BufWriter<tokio::io::WriteHalf<TcpStream>>,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Create a new connection from a TCP stream
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        Connection {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            peer_addr,
        }
    }

    /// Connect to `addr` (host:port)
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        Ok(Connection::new(stream, peer_addr))
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one line without its terminator. Ok(None) means the peer closed the stream.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        // Remove trailing newline
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Write a value as one JSON line
    pub async fn write_json<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let json_str = serde_json::to_string(value)?;
        self.writer.write_all(json_str.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_line_roundtrip_and_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream, peer);
            let line = conn.read_line().await.unwrap();
            conn.write_json(&serde_json::json!({"echo": line})).await.unwrap();
        });

        let mut client = Connection::connect(&addr.to_string()).await.unwrap();
        assert_eq!(client.peer_addr(), addr);
        client.write_json(&serde_json::json!({"hello": 1})).await.unwrap();

        let reply = client.read_line().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["echo"], r#"{"hello":1}"#);

        server.await.unwrap();
        assert_eq!(client.read_line().await.unwrap(), None);
    }
}
