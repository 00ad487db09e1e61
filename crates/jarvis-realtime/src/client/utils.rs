use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;

/// The hosted API authenticates the websocket upgrade via a key query
/// parameter rather than a header.
pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    format!(
        "{}/live?model={}&key={}",
        config.base_url(),
        config.model(),
        config.api_key().expose_secret()
    )
    .into_client_request()
}
