//! Connection client for the chatroom server.
//!
//! This module provides the `ChatClient` which handles:
//! - Connecting to the server over TCP
//! - Copying server output to the terminal as it arrives
//! - Sending each line typed by the user
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Port the server listens on by default.
pub const DEFAULT_PORT: u16 = 8080;

/// Size of each socket read in the receive loop.
const RECEIVE_BUFFER_SIZE: usize = 4096;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
        }
    }
}

// ============================================================================
// Chat Client
// ============================================================================

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the connection.
    ServerClosed,
    /// Input reached EOF; the server then closed the connection.
    InputClosed,
    /// The cancellation token was triggered from outside.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiveEnd {
    ServerClosed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendEnd {
    InputClosed,
    Stopped,
}

/// Client for one chat session.
///
/// # Session Lifecycle
///
/// 1. [`connect`](Self::connect) opens the TCP connection
/// 2. [`run`](Self::run) copies server output to stdout and stdin lines to
///    the server until one side finishes
/// 3. EOF on input half-closes the connection; the session ends when the
///    server closes its side
///
/// # Example
///
/// ```rust,ignore
/// use chat_client::{ChatClient, ClientConfig};
///
/// let client = ChatClient::connect(&ClientConfig::default()).await?;
/// let end = client.run().await?;
/// ```
pub struct ChatClient {
    stream: TcpStream,
    addr: SocketAddr,
    cancel_token: CancellationToken,
}

impl ChatClient {
    /// Connects to the server at `config.addr`.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let addr = config.addr;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;
        info!(server = %addr, "Connected");

        Ok(Self {
            stream,
            addr,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Address of the server.
    pub fn server_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Token that ends the session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Runs the session on the process's stdin and stdout.
    pub async fn run(self) -> Result<SessionEnd> {
        let input = BufReader::new(tokio::io::stdin());
        self.run_with(input, tokio::io::stdout()).await
    }

    /// Runs the session over arbitrary input and output.
    pub async fn run_with<I, O>(self, input: I, mut output: O) -> Result<SessionEnd>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (reader, writer) = self.stream.into_split();
        let cancel = self.cancel_token;

        let (received, sent) = tokio::join!(
            receive_loop(reader, &mut output, &cancel),
            send_loop(input, writer, &cancel),
        );

        let end = match (received?, sent?) {
            (ReceiveEnd::ServerClosed, SendEnd::InputClosed) => SessionEnd::InputClosed,
            (ReceiveEnd::ServerClosed, SendEnd::Stopped) => SessionEnd::ServerClosed,
            (ReceiveEnd::Stopped, _) => SessionEnd::Cancelled,
        };
        debug!(?end, "Session finished");
        Ok(end)
    }
}

/// Copies server output until EOF or cancellation. Cancels the token on EOF
/// so the send loop stops too.
async fn receive_loop<O>(
    mut reader: OwnedReadHalf,
    output: &mut O,
    cancel: &CancellationToken,
) -> Result<ReceiveEnd>
where
    O: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return Ok(ReceiveEnd::Stopped),
            read = reader.read(&mut buf) => match read {
                Ok(n) => n,
                Err(e) => {
                    cancel.cancel();
                    return Err(e.into());
                }
            },
        };

        if n == 0 {
            debug!("Server closed the connection");
            cancel.cancel();
            return Ok(ReceiveEnd::ServerClosed);
        }

        let chunk = buf.get(..n).unwrap_or_default();
        output.write_all(chunk).await?;
        output.flush().await?;
    }
}

/// Forwards input lines until EOF or cancellation. On EOF the write half is
/// shut down so the server sees the client leave.
async fn send_loop<I>(
    mut input: I,
    mut writer: OwnedWriteHalf,
    cancel: &CancellationToken,
) -> Result<SendEnd>
where
    I: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let n = tokio::select! {
            _ = cancel.cancelled() => return Ok(SendEnd::Stopped),
            read = input.read_line(&mut line) => read?,
        };

        if n == 0 {
            debug!("Input closed");
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Half-close failed");
            }
            return Ok(SendEnd::InputClosed);
        }

        if !line.ends_with('\n') {
            line.push('\n');
        }
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            // The receive loop observes the closed connection.
            debug!(error = %e, "Send failed");
            return Ok(SendEnd::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, ClientConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, ClientConfig { addr })
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.addr.to_string(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, config) = listener().await;
        drop(listener);

        match ChatClient::connect(&config).await {
            Err(ClientError::Connect { addr, .. }) => assert_eq!(addr, config.addr),
            Err(other) => panic!("expected connect error, got {other}"),
            Ok(_) => panic!("expected connect error"),
        }
    }

    #[tokio::test]
    async fn test_lines_sent_and_output_copied() {
        let (listener, config) = listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);

            writer.write_all(b"prompt\n").await.unwrap();
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            writer
                .write_all(format!("got {line}").as_bytes())
                .await
                .unwrap();

            // Client half-closes after its input ends.
            let mut rest = String::new();
            reader.read_line(&mut rest).await.unwrap();
            line
        });

        let client = ChatClient::connect(&config).await.unwrap();
        let mut output = Vec::new();
        let end = timeout(TEST_TIMEOUT, client.run_with(&b"Alice"[..], &mut output))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(end, SessionEnd::InputClosed);
        assert_eq!(server.await.unwrap(), "Alice\n");
        assert_eq!(String::from_utf8(output).unwrap(), "prompt\ngot Alice\n");
    }

    #[tokio::test]
    async fn test_server_close_ends_session() {
        let (listener, config) = listener().await;

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"bye\n").await.unwrap();
        });

        let client = ChatClient::connect(&config).await.unwrap();
        // Input that never ends.
        let (_keep_open, input) = tokio::io::duplex(64);
        let mut output = Vec::new();
        let end = timeout(
            TEST_TIMEOUT,
            client.run_with(BufReader::new(input), &mut output),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(end, SessionEnd::ServerClosed);
        assert_eq!(output, b"bye\n");
    }

    #[tokio::test]
    async fn test_cancel_stops_both_loops() {
        let (listener, config) = listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Hold the connection open without sending anything.
            tokio::time::sleep(TEST_TIMEOUT).await;
            drop(stream);
        });

        let client = ChatClient::connect(&config).await.unwrap();
        let cancel = client.cancel_token();
        let (_keep_open, input) = tokio::io::duplex(64);

        let session = tokio::spawn(async move {
            let mut output = Vec::new();
            client.run_with(BufReader::new(input), &mut output).await
        });
        cancel.cancel();

        let end = timeout(TEST_TIMEOUT, session).await.unwrap().unwrap().unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
        server.abort();
    }
}
