//! Scripted SAM router for tests

use crate::control::SamConfig;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

type Handler = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Answers each command line with whatever the handler returns.
///
/// `None` closes the connection. A reply starting with
/// `STREAM STATUS RESULT=OK` turns the connection into an echo pipe, the
/// way a router hands over a stream.
pub struct MockRouter {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockRouter {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Handler> = Arc::new(handler);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let (cmds, conns) = (commands.clone(), connections.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                conns.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, handler.clone(), cmds.clone()));
            }
        });

        Self {
            addr,
            commands,
            connections,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> SamConfig {
        SamConfig {
            control_addr: self.addr.to_string(),
            timeout: Some(Duration::from_secs(5)),
            ..SamConfig::default()
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn commands_matching(&self, prefix: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

async fn serve(stream: TcpStream, handler: Arc<Handler>, commands: Arc<Mutex<Vec<String>>>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();
        commands.lock().push(command.clone());

        let Some(reply) = handler(&command) else {
            return;
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
        if reply.starts_with("STREAM STATUS RESULT=OK") {
            let _ = tokio::io::copy(&mut reader, &mut write).await;
            return;
        }
    }
}
