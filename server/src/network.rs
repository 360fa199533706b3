//! Server network layer handling TCP connections and frame transport

use crate::client_manager::{ClientId, ClientManager};
use crate::session::GameSessions;
use crate::store::GameStore;
use log::{debug, error, info, warn};
use shared::{decode_payload, encode_frame, Notification, Packet, MAX_FRAME_LEN};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

/// Accepts connections and runs one reader and one writer task per client
pub struct Server {
    listener: TcpListener,
    clients: Arc<RwLock<ClientManager>>,
    sessions: Arc<GameSessions>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        store: Arc<dyn GameStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let clients = Arc::new(RwLock::new(ClientManager::new(max_clients)));
        let sessions = Arc::new(GameSessions::new(Arc::clone(&clients), store));

        Ok(Server {
            listener,
            clients,
            sessions,
        })
    }

    /// Address actually bound, useful when listening on port 0
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(self) -> io::Result<()> {
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let clients = Arc::clone(&self.clients);
                    let sessions = Arc::clone(&self.sessions);
                    tokio::spawn(async move {
                        Self::handle_connection(stream, addr, clients, sessions).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        clients: Arc<RwLock<ClientManager>>,
        sessions: Arc<GameSessions>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }
        let (reader, mut writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        let client_id = {
            let mut clients = clients.write().await;
            let client_id = clients.add_client(addr, tx);
            if let Some(client_id) = client_id {
                clients.send_to(client_id, Notification::Connect { client_id });
            }
            client_id
        };

        let Some(client_id) = client_id else {
            info!("Rejecting connection from {}: server full", addr);
            let full = Notification::Error {
                message: "Server full".to_string(),
            };
            if let Err(e) = write_frame(&mut writer, &full).await {
                debug!("Could not notify {} of capacity: {}", addr, e);
            }
            return;
        };

        let writer_task = tokio::spawn(Self::write_loop(writer, rx, client_id));

        Self::read_loop(reader, client_id, &sessions).await;
        sessions.disconnect(client_id).await;

        if let Err(e) = writer_task.await {
            error!("Writer task for client {} panicked: {}", client_id, e);
        }
    }

    /// Reads frames until the peer goes away, sends `Disconnect`, or breaks the framing
    async fn read_loop(mut reader: OwnedReadHalf, client_id: ClientId, sessions: &GameSessions) {
        loop {
            let len = match reader.read_u32().await {
                Ok(len) => len as usize,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Client {} closed its connection", client_id);
                    break;
                }
                Err(e) => {
                    error!("Error reading from client {}: {}", client_id, e);
                    break;
                }
            };

            if len > MAX_FRAME_LEN {
                warn!(
                    "Client {} sent a {} byte frame, closing connection",
                    client_id, len
                );
                break;
            }

            let mut payload = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut payload).await {
                error!("Error reading from client {}: {}", client_id, e);
                break;
            }

            match decode_payload::<Packet>(&payload) {
                Ok(Packet::Disconnect) => {
                    debug!("Client {} requested disconnect", client_id);
                    break;
                }
                Ok(packet) => sessions.handle_packet(client_id, packet).await,
                Err(e) => {
                    warn!("Failed to deserialize packet from client {}: {}", client_id, e);
                    sessions
                        .report_error(client_id, "malformed packet".to_string())
                        .await;
                }
            }
        }
    }

    /// Drains a client's queue onto its socket. Ends when the client is
    /// removed from the registry or the socket fails.
    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut rx: mpsc::UnboundedReceiver<Notification>,
        client_id: ClientId,
    ) {
        while let Some(notification) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &notification).await {
                error!("Failed to send to client {}: {}", client_id, e);
                break;
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!("Error closing connection to client {}: {}", client_id, e);
        }
    }
}

async fn write_frame<W>(writer: &mut W, notification: &Notification) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame =
        encode_frame(notification).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&frame).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGameStore;
    use shared::FRAME_HEADER_LEN;

    async fn start_server(max_clients: usize) -> SocketAddr {
        let server = Server::new("127.0.0.1:0", max_clients, Arc::new(MemoryGameStore::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn read_notification(stream: &mut TcpStream) -> Notification {
        let len = stream.read_u32().await.unwrap() as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        decode_payload(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_connect_greeting() {
        let addr = start_server(4).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert_eq!(
            read_notification(&mut first).await,
            Notification::Connect { client_id: 1 }
        );

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert_eq!(
            read_notification(&mut second).await,
            Notification::Connect { client_id: 2 }
        );
    }

    #[tokio::test]
    async fn test_server_full() {
        let addr = start_server(1).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        read_notification(&mut first).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert_eq!(
            read_notification(&mut second).await,
            Notification::Error {
                message: "Server full".to_string()
            }
        );
        let mut rest = Vec::new();
        second.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let addr = start_server(4).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        read_notification(&mut stream).await;

        stream
            .write_all(&((MAX_FRAME_LEN + 1) as u32).to_be_bytes())
            .await
            .unwrap();

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_packet_reported() {
        let addr = start_server(4).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        read_notification(&mut stream).await;

        let garbage = [0xFFu8; 3];
        let mut frame = (garbage.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&garbage);
        assert_eq!(frame.len(), FRAME_HEADER_LEN + garbage.len());
        stream.write_all(&frame).await.unwrap();

        assert_eq!(
            read_notification(&mut stream).await,
            Notification::Error {
                message: "malformed packet".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_packet_closes_connection() {
        let addr = start_server(4).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        read_notification(&mut stream).await;

        stream
            .write_all(&encode_frame(&Packet::Disconnect).unwrap())
            .await
            .unwrap();

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
