//! Echo server on a random port.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use wsline::{Config, Server, ServerEvent};

/// A running `wsline` server that echoes every message back to its sender.
pub struct TestServer {
    server: Server,
    serve: JoinHandle<()>,
    echo: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> (Self, SocketAddr) {
        Self::spawn_with_config(Config::default()).await
    }

    pub async fn spawn_with_config(config: Config) -> (Self, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(config);

        let mut events = server.subscribe();
        let echo = tokio::spawn({
            let server = server.clone();
            async move {
                while let Some(event) = events.recv().await {
                    if let ServerEvent::Message {
                        connection_id,
                        message,
                        ..
                    } = event
                    {
                        // The sender may already be closing.
                        let _ = server.send(&connection_id, message);
                    }
                }
            }
        });

        let serve = tokio::spawn({
            let server = server.clone();
            async move {
                let _ = server.serve(listener).await;
            }
        });

        (Self { server, serve, echo }, addr)
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub async fn shutdown(self) {
        self.serve.abort();
        self.echo.abort();
        let _ = self.serve.await;
        let _ = self.echo.await;
    }
}
