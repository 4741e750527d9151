//! Live reload over WebSocket

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ServerState;

/// Route the client script connects to
pub const RELOAD_ROUTE: &str = "/__livereload";

/// Messages pushed to connected pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// A rebuild finished; the page should reload
    FullReload { reason: String },

    /// A rebuild failed; the page keeps its current state
    Error { message: String },
}

/// Handle WebSocket upgrade for live reload
pub(super) async fn reload_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_reload_socket(socket, state))
}

async fn handle_reload_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut reload_rx = state.reload_tx.subscribe();

    if let Ok(json) = serde_json::to_string(&ReloadMessage::Connected) {
        let _ = sender.send(Message::Text(json)).await;
    }

    debug!("Live reload client connected");

    let send_task = tokio::spawn(async move {
        while let Ok(message) = reload_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&message) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Clients never send anything meaningful; wait for the close
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    debug!("Live reload connection closed");
}

/// Script injected into served HTML pages
pub fn client_script() -> String {
    format!(
        r#"
<script>
(function() {{
	var ws = new WebSocket("ws://" + location.host + "{route}");
	ws.onmessage = function(event) {{
		var message = JSON.parse(event.data);
		if (message.type === "full-reload") {{
			console.log("[createjs-build] reloading:", message.reason);
			location.reload();
		}} else if (message.type === "error") {{
			console.error("[createjs-build] build failed:", message.message);
		}}
	}};
	ws.onclose = function() {{
		setTimeout(function() {{ location.reload(); }}, 1000);
	}};
}})();
</script>
"#,
        route = RELOAD_ROUTE
    )
}

/// Insert the client script before `</body>`, or append it
pub fn inject_client(html: &str) -> String {
    let script = client_script();
    if let Some(pos) = html.rfind("</body>") {
        let mut result = html.to_string();
        result.insert_str(pos, &script);
        result
    } else {
        format!("{}{}", html, script)
    }
}
