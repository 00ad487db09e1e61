use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::types;

pub mod config;
mod consts;
mod utils;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

/// Handles for the send and receive pump tasks of one live connection.
pub struct Connection {
    pub(crate) send_handle: tokio::task::JoinHandle<()>,
    pub(crate) recv_handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Aborts both pumps. Dropping the client alone would leave the
    /// receive task parked on the socket.
    pub fn shutdown(&self) {
        self.send_handle.abort();
        self.recv_handle.abort();
    }
}

/// Client for the realtime bidirectional session. At most one live
/// connection per client; a second `connect` fails.
pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
        }
    }

    async fn connect(&mut self) -> Result<Connection> {
        if self.c_tx.is_some() {
            anyhow::bail!("already connected");
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("realtime handshake failed")?;

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx.clone());
        self.s_tx = Some(s_tx.clone());

        let send_handle = tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
        });

        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = s_tx.send(types::ServerEvent::Close {
                            reason: Some(format!("transport failure: {}", e)),
                        });
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<types::ServerEvent>(&text) {
                        Ok(event) => {
                            if let Err(e) = s_tx.send(event) {
                                tracing::error!("failed to fan out event: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let _ = s_tx.send(types::ServerEvent::Close {
                            reason: reason.map(|f| f.reason.to_string()),
                        });
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Connection {
            send_handle,
            recv_handle,
        })
    }

    /// Subscribes to the inbound server event stream.
    pub fn server_events(&self) -> Result<ServerRx> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => anyhow::bail!("not connected yet"),
        }
    }

    async fn send_client_event(&self, event: types::ClientEvent) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(event).await.context("client event channel closed")?;
                Ok(())
            }
            None => anyhow::bail!("not connected yet"),
        }
    }

    /// Sends an already-built client event, preserving submission order.
    pub async fn send(&self, event: types::ClientEvent) -> Result<()> {
        self.send_client_event(event).await
    }

    pub async fn update_session(&self, session: types::SessionConfig) -> Result<()> {
        self.send_client_event(types::ClientEvent::SessionUpdate(
            types::SessionUpdateEvent::new(session),
        ))
        .await
    }

    pub async fn append_input_audio(
        &self,
        audio: types::Base64EncodedAudioBytes,
        mime_type: String,
    ) -> Result<()> {
        self.send_client_event(types::ClientEvent::InputAudioAppend(
            types::InputAudioAppendEvent::new(audio, mime_type),
        ))
        .await
    }

    pub async fn send_tool_response(&self, response: types::ToolResponseEvent) -> Result<()> {
        self.send_client_event(types::ClientEvent::ToolResponse(response))
            .await
    }
}

pub async fn connect_with_config(
    capacity: usize,
    config: config::Config,
) -> Result<(Client, Connection)> {
    let mut client = Client::new(capacity, config);
    let connection = client.connect().await?;
    Ok((client, connection))
}

pub async fn connect() -> Result<(Client, Connection)> {
    let config = config::Config::new();
    connect_with_config(1024, config).await
}
