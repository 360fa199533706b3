use crate::input::{parse_command, Command, HELP};
use log::{debug, error, info, warn};
use shared::{decode_payload, encode_frame, Game, Notification, Packet, MAX_FRAME_LEN};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

/// Console client: typed commands go out, notifications are printed as they arrive
pub struct Client {
    stream: TcpStream,
    username: String,
}

impl Client {
    pub async fn connect(
        server_addr: &str,
        username: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;

        Ok(Client {
            stream,
            username: username.to_string(),
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = self.stream.into_split();
        let mut printer = tokio::spawn(print_notifications(reader));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Signed in as {}. Type `help` for commands.", self.username);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    match parse_command(&line, &self.username) {
                        Ok(Command::Send(packet)) => write_packet(&mut writer, &packet).await?,
                        Ok(Command::Help) => println!("{}", HELP),
                        Ok(Command::Quit) => break,
                        Err(message) => println!("{}", message),
                    }
                },

                _ = &mut printer => {
                    warn!("Server closed the connection");
                    return Ok(());
                },
            }
        }

        if let Err(e) = write_packet(&mut writer, &Packet::Disconnect).await {
            debug!("Could not send disconnect: {}", e);
        }
        printer.abort();

        Ok(())
    }
}

async fn print_notifications(mut reader: OwnedReadHalf) {
    loop {
        match read_notification(&mut reader).await {
            Ok(Some(notification)) => println!("{}", render_notification(&notification)),
            Ok(None) => break,
            Err(e) => {
                error!("Error receiving notification: {}", e);
                break;
            }
        }
    }
}

/// Text shown on the console for a notification
pub fn render_notification(notification: &Notification) -> String {
    match notification {
        Notification::Connect { client_id } => format!("Connected as client {}", client_id),
        Notification::Join { message }
        | Notification::Leave { message }
        | Notification::Notification { message } => message.clone(),
        Notification::Error { message } => format!("Error: {}", message),
        Notification::LoadGame { game_id, game } => match Game::from_snapshot(game) {
            Ok(game) => format!(
                "Game {}, {} to move\n{}",
                game_id,
                game.turn(),
                game.board()
            ),
            Err(e) => format!("Game {}: received an unreadable board ({})", game_id, e),
        },
    }
}

/// Writes one length-prefixed packet
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&frame).await
}

/// Reads one notification. Returns None once the server has closed the stream.
pub async fn read_notification<R>(reader: &mut R) -> io::Result<Option<Notification>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_payload(&payload)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_load_game() {
        let notification = Notification::LoadGame {
            game_id: 3,
            game: Game::new().snapshot(),
        };
        let text = render_notification(&notification);

        assert!(text.starts_with("Game 3, white to move\n"));
        assert!(text.contains("r n b q k b n r"));
        assert!(text.trim_end().ends_with("a b c d e f g h"));
    }

    #[test]
    fn test_render_messages() {
        assert_eq!(
            render_notification(&Notification::Error {
                message: "unauthorized: not your turn".to_string()
            }),
            "Error: unauthorized: not your turn"
        );
        assert_eq!(
            render_notification(&Notification::Notification {
                message: "black is in check".to_string()
            }),
            "black is in check"
        );
    }

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut near, mut far) = tokio::io::duplex(1024);

        let notification = Notification::Join {
            message: "bob joined game 1 (black)".to_string(),
        };
        far.write_all(&encode_frame(&notification).unwrap())
            .await
            .unwrap();
        drop(far);

        assert_eq!(
            read_notification(&mut near).await.unwrap(),
            Some(notification)
        );
        assert_eq!(read_notification(&mut near).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut near, mut far) = tokio::io::duplex(64);
        far.write_all(&((MAX_FRAME_LEN + 1) as u32).to_be_bytes())
            .await
            .unwrap();

        let err = read_notification(&mut near).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
