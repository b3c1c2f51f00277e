use axum::{
    Router,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A minimal websocket gateway serving the `echo` and `math` services.
///
/// Requests and replies are JSON envelopes (`q`, `sid`, `sig`, `h`, `d`).
/// Runs until the listener fails.
pub async fn serve_gateway(listener: TcpListener) -> io::Result<()> {
    let app = Router::new().route("/ws", get(upgrade));

    tracing::info!("Demo gateway listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn upgrade(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(socket: WebSocket) {
    let (mut sink, mut incoming) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    // Send loop
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if sink
                .send(WsMessage::Text(envelope.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(message)) = incoming.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            tracing::warn!("Ignoring malformed envelope");
            continue;
        };
        // Cancels need no handling; every reply here is short-lived.
        if request.get("sig").is_some() {
            continue;
        }

        tokio::spawn(respond(request, tx.clone()));
    }
}

async fn respond(request: Value, tx: mpsc::UnboundedSender<Value>) {
    let sid = request["sid"].clone();
    let qualifier = request["q"].as_str().unwrap_or_default().to_owned();
    let data = &request["d"];

    let next = |d: Value| json!({ "q": qualifier, "sid": sid, "d": d });
    let error = |code: i32, message: String| {
        json!({
            "q": format!("error/{code}"),
            "sid": sid,
            "sig": 2,
            "d": { "errorCode": code, "errorMessage": message },
        })
    };

    tracing::debug!("Handling `{}`", qualifier);

    match qualifier.as_str() {
        "echo/echo" => {
            let _ = tx.send(next(data.clone()));
        }
        "echo/notify" => {
            tracing::info!("Notification: {}", data);
            let _ = tx.send(next(Value::Null));
        }
        "echo/tail" => {
            let count = data.as_u64().unwrap_or(0);
            for n in 1..=count {
                if tx.send(next(json!(n))).is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let _ = tx.send(json!({ "sid": sid, "sig": 1 }));
        }
        "math/sum" => match (data[0].as_f64(), data[1].as_f64()) {
            (Some(a), Some(b)) => {
                let _ = tx.send(next(json!(a + b)));
            }
            _ => {
                let _ = tx.send(error(400, format!("expected two numbers, got {data}")));
            }
        },
        "math/ping" => {
            let _ = tx.send(error(503, "gateway is in maintenance mode".into()));
        }
        other => {
            let _ = tx.send(error(404, format!("no handler for `{other}`")));
        }
    }
}
