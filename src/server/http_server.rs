//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::signal;
use tokio_rustls::TlsAcceptor;
use log::{debug, info, warn, error};

use crate::parser::{Error as ParserError, find_head_end, parse_request};
use crate::server::config::ServerConfig;
use crate::server::dispatcher::Dispatcher;
use crate::server::error::Error;
use crate::server::mime::ContentTypeRegistry;
use crate::server::response::{HttpResponse, StatusCode};
use crate::server::tls::load_acceptor;

/// How accepted sockets are turned into byte streams.
#[derive(Clone)]
pub enum Transport {
    /// Plain TCP.
    Plain,
    /// TLS terminated in-process.
    Tls(TlsAcceptor),
}

impl Transport {
    /// The transport a configuration asks for, loading TLS credentials if needed.
    pub fn for_config(config: &ServerConfig) -> Result<Self, Error> {
        match &config.tls {
            Some(settings) => Ok(Transport::Tls(load_acceptor(settings)?)),
            None => Ok(Transport::Plain),
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            Transport::Plain => "http",
            Transport::Tls(_) => "https",
        }
    }
}

/// A static file server.
pub struct HttpServer {
    /// The server configuration.
    pub config: Arc<ServerConfig>,
    registry: ContentTypeRegistry,
    transport: Transport,
}

impl HttpServer {
    /// Create a server for `config`, with the transport it asks for.
    pub fn new(config: ServerConfig) -> Result<Self, Error> {
        let transport = Transport::for_config(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a server with an explicitly chosen transport.
    pub fn with_transport(config: ServerConfig, transport: Transport) -> Self {
        Self {
            config: Arc::new(config),
            registry: ContentTypeRegistry::new(),
            transport,
        }
    }

    /// Register an extra content type before the server starts.
    pub fn define_content_type(&mut self, extension: &str, content_type: impl Into<String>) {
        self.registry.define(extension, content_type);
    }

    /// Log what is being served.
    fn display_server_info(&self, addr: SocketAddr) {
        let config = &self.config;
        info!("Serving {root} on {scheme}://localhost:{port}",
            root = config.root.display(),
            scheme = self.transport.scheme(),
            port = addr.port());
        info!("Directory listings {}", if config.autoindex { "on" } else { "off" });
        for rule in &config.proxy {
            info!("  proxy {prefix} -> {target}",
                prefix = rule.prefix,
                target = rule.target.url_for(""));
        }
    }

    /// Set up the TCP listener.
    pub async fn bind(&self) -> Result<TcpListener, Error> {
        let addr = SocketAddr::new(self.config.host, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        Ok(listener)
    }

    /// Start the server and serve until Ctrl+C.
    pub async fn start(&self) -> Result<(), Error> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` completes.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        self.display_server_info(listener.local_addr()?);

        let dispatcher = Dispatcher::new(self.config.clone(), Arc::new(self.registry.clone()));

        // Create a semaphore to limit concurrent connections
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        // Use JoinSet to keep track of all spawned tasks
        let mut tasks = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server...");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            self.handle_new_connection(socket, addr, semaphore.clone(), dispatcher.clone(), &mut tasks).await;
                        }
                        Err(e) => Self::handle_accept_error(e).await,
                    }
                }

                // Reap finished connections so the set does not grow unbounded
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        error!("Connection task failed: {e}");
                    }
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;
        Ok(())
    }

    /// Handle a new connection.
    async fn handle_new_connection(
        &self,
        mut socket: TcpStream,
        addr: SocketAddr,
        semaphore: Arc<Semaphore>,
        dispatcher: Dispatcher,
        tasks: &mut JoinSet<()>,
    ) {
        // Try to acquire a permit from the semaphore
        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {addr}");
                let response = HttpResponse::new(StatusCode::ServiceUnavailable)
                    .with_content_type("text/plain")
                    .with_body_string("Server is at capacity, please try again later");
                let _ = response.write_to(&mut socket).await;
                return;
            }
        };

        let transport = self.transport.clone();
        let read_buffer_size = self.config.read_buffer_size;

        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            let result = match transport {
                Transport::Plain => {
                    Self::handle_connection(&mut socket, &dispatcher, read_buffer_size).await
                }
                Transport::Tls(acceptor) => match acceptor.accept(socket).await {
                    Ok(mut stream) => {
                        Self::handle_connection(&mut stream, &dispatcher, read_buffer_size).await
                    }
                    Err(e) => {
                        debug!("TLS handshake with {addr} failed: {e}");
                        return;
                    }
                },
            };

            if let Err(e) = result {
                error!("Error handling connection from {addr}: {e}");
            }
        });
    }

    /// Handle accept errors.
    async fn handle_accept_error(e: std::io::Error) {
        error!("Error accepting connection: {e}");
        // Usually descriptor exhaustion; give in-flight connections a moment to finish
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        // Wait for all tasks to complete (with timeout)
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let _ = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        }).await;

        info!("Server shutdown complete");
    }

    /// Read one request head from the connection and answer it.
    ///
    /// The connection carries a single request; it is shut down once the
    /// response has been written.
    pub async fn handle_connection<S>(
        socket: &mut S,
        dispatcher: &Dispatcher,
        read_buffer_size: usize,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0; read_buffer_size];
        let mut filled = 0;

        // Read until the blank line ending the head
        loop {
            if filled == buf.len() {
                return Self::reject(socket, ParserError::HeadTooLarge(read_buffer_size)).await;
            }

            let n = socket.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(()); // Connection closed
                }
                return Self::reject(socket, ParserError::IncompleteHead).await;
            }
            filled += n;

            if find_head_end(&buf[..filled]).is_some() {
                break;
            }
        }

        let request = match parse_request(&buf[..filled]) {
            Ok(req) => req,
            Err(e) => return Self::reject(socket, e).await,
        };

        let method = request.method.clone();
        let target = request.target.clone();
        let outcome = dispatcher.dispatch(socket, request, &buf[..filled]).await?;
        debug!("{method} {target} -> {outcome}");

        let _ = socket.shutdown().await;
        Ok(())
    }

    /// Answer an unparseable request with 400.
    async fn reject<S>(socket: &mut S, e: ParserError) -> Result<(), Error>
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        let response = HttpResponse::new(StatusCode::BadRequest)
            .with_content_type("text/plain")
            .with_body_string(format!("Error parsing request: {e}"));
        response.write_to(socket).await?;
        Err(Error::ParseError(e))
    }
}
