use brutal_core::{ConfigStore, EnforcementMode};
use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::enforcer::{Enforcement, KernelSocket};
use crate::hook;
use crate::request::{self, RequestError};

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const LISTEN_BACKLOG: i32 = 1024;
/// Bounds on discarding an unread request body after responding.
const DRAIN_LIMIT: usize = 64 * 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Accepts connections and runs the brutal hook on each one before answering.
pub struct BrutalServer {
    listener: TcpListener,
    store: Arc<ConfigStore>,
}

impl BrutalServer {
    /// Binds `addr`. Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr, store: Arc<ConfigStore>) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        let listener = TcpListener::from_std(std::net::TcpListener::from(socket))?;
        Ok(Self { listener, store })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Each connection gets its own task; accept errors are
    /// logged and the loop continues.
    pub async fn run(self) {
        tracing::info!("tcp-brutal listening on {:?}", self.listener.local_addr());
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            };

            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, store).await {
                    tracing::debug!("connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, store: Arc<ConfigStore>) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(1024);
    let head = match tokio::time::timeout(HEAD_TIMEOUT, request::read_head(&mut stream, &mut buf)).await {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(RequestError::Io(e))) => return Err(e),
        Ok(Err(e)) => {
            tracing::debug!("bad request from {}: {}", peer, e);
            stream.write_all(&Response::new(400, "Bad Request").body("bad request\n").render(false)).await?;
            return finish(stream).await;
        }
        Err(_) => {
            tracing::debug!("request head from {} timed out", peer);
            return Ok(());
        }
    };

    let snapshot = store.load();
    let outcome = {
        let socket = KernelSocket::from_socket(&stream);
        hook::before_serving(&snapshot, head.host.as_deref(), &head.path, &socket, peer)
    };

    let response = match outcome {
        Ok(Enforcement::Applied { rate }) => Response::new(200, "OK")
            .header("X-Brutal-Rate", rate.to_string())
            .body(format!("tcp_brutal: applied at {} bytes/s\n", rate)),
        Ok(Enforcement::NotApplicable) => Response::new(200, "OK").body("tcp_brutal: not applicable\n"),
        Err(e) => match snapshot.mode() {
            EnforcementMode::Reject => Response::new(500, "Internal Server Error")
                .header("X-Brutal-Error", e.category())
                .body(format!("tcp_brutal: {}\n", e)),
            EnforcementMode::Ignore => {
                tracing::warn!("serving {} without brutal: {}", peer, e);
                Response::new(200, "OK")
                    .header("X-Brutal-Error", e.category())
                    .body("tcp_brutal: not applied\n")
            }
        },
    };

    stream.write_all(&response.render(head.method == "HEAD")).await?;
    finish(stream).await
}

/// Sends FIN, then discards whatever the peer still sends (a request body,
/// typically) so that dropping the socket does not turn into an RST that
/// cuts off the response.
async fn finish(mut stream: TcpStream) -> io::Result<()> {
    stream.shutdown().await?;

    let drain = async {
        let mut scratch = [0u8; 4096];
        let mut drained = 0;
        while drained < DRAIN_LIMIT {
            match stream.read(&mut scratch).await? {
                0 => break,
                n => drained += n,
            }
        }
        Ok::<_, io::Error>(())
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
        Ok(result) => result,
        Err(_) => Ok(()),
    }
}

struct Response {
    status: u16,
    reason: &'static str,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl Response {
    fn new(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    fn render(&self, head_only: bool) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        out.push_str("Content-Type: text/plain\r\n");
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        out.push_str("Connection: close\r\n");
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        if !head_only {
            out.push_str(&self.body);
        }
        out.into_bytes()
    }
}
