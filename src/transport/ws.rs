use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::{Connector, FrameStream};
use crate::error::Result;

/// Push endpoint for a backend base URL: `https` maps to `wss`, anything else
/// to `ws`, always at `/ws`.
pub fn push_url(backend_url: &str) -> String {
    let trimmed = backend_url.trim_end_matches('/');
    let (scheme, host) = if let Some(rest) = trimmed.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        ("ws", rest)
    } else {
        ("ws", trimmed)
    };
    format!("{}://{}/ws", scheme, host)
}

/// Connects over WebSockets and yields text frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "push channel close frame");
                    None
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol.
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            }
        });
        Ok(frames.boxed())
    }
}
