#![allow(dead_code)]

use axum::{
    Router,
    body::Bytes as AxumBytes,
    extract::{
        Path, State,
        ws::{Message as AxumWsMessage, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use svcgate::constants::{CONTENT_TYPE_HEADER, DEFAULT_MAX_FRAME_SIZE};
use svcgate::frame::{Frame, FrameCodec, FrameDecoder, FrameKind};
use svcgate::{DataCodec, ErrorData, HeadersCodec, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// What the peer saw, for assertions.
#[derive(Default)]
pub struct PeerLog {
    pub connections: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub requests: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    pub notifications: Mutex<Vec<String>>,
}

impl PeerLog {
    fn record(&self, qualifier: &str, headers: &BTreeMap<String, String>) {
        self.requests
            .lock()
            .unwrap()
            .push((qualifier.to_owned(), headers.clone()));
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn headers_of(&self, qualifier: &str) -> Option<BTreeMap<String, String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(q, _)| q == qualifier)
            .map(|(_, headers)| headers.clone())
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}

/// A request that will never be answered.
pub fn hanging_request() -> Message {
    Message::builder()
        .qualifier("test/hang")
        .header(CONTENT_TYPE_HEADER, "application/json")
        .build()
}

pub enum Outcome {
    Reply(Bytes),
    Fail(ErrorData),
    Stream(Box<dyn Iterator<Item = Result<Bytes, ErrorData>> + Send>),
    Silent,
}

pub enum PeerFrame {
    Next(Bytes),
    Error(i32, Bytes),
    Complete,
}

fn codec_for(headers: &BTreeMap<String, String>) -> DataCodec {
    headers
        .get(CONTENT_TYPE_HEADER)
        .and_then(|ct| DataCodec::for_content_type(ct).ok())
        .unwrap_or(DataCodec::Json)
}

/// The services every test peer implements.
///
/// - `echo/echo` returns its argument.
/// - `echo/tail(n)` streams `1..=n`; `n == 0` streams forever and `n == 13`
///   fails after the first element.
/// - `echo/notify` records the event.
/// - `math/sum` adds a pair of numbers; `math/ping` fails with 503.
/// - `test/hang` never replies.
pub fn handle(log: &PeerLog, qualifier: &str, codec: DataCodec, data: &[u8]) -> Outcome {
    match qualifier {
        "echo/echo" => Outcome::Reply(Bytes::copy_from_slice(data)),
        "echo/tail" => {
            let count: u32 = codec.decode(data).unwrap_or(0);
            let items = (1i64..).map(move |n| codec.encode(&n).map_err(|e| ErrorData {
                error_code: 500,
                error_message: e.to_string(),
            }));

            match count {
                0 => Outcome::Stream(Box::new(items)),
                13 => Outcome::Stream(Box::new(items.take(1).chain(std::iter::once(Err(
                    ErrorData {
                        error_code: 400,
                        error_message: "unlucky".into(),
                    },
                ))))),
                n => Outcome::Stream(Box::new(items.take(n as usize))),
            }
        }
        "echo/notify" => {
            let event: String = codec.decode(data).unwrap_or_default();
            log.notifications.lock().unwrap().push(event);
            Outcome::Reply(Bytes::new())
        }
        "math/sum" => match codec.decode::<(f64, f64)>(data) {
            Ok((a, b)) => Outcome::Reply(codec.encode(&(a + b)).unwrap()),
            Err(e) => Outcome::Fail(ErrorData {
                error_code: 400,
                error_message: e.to_string(),
            }),
        },
        "math/ping" => Outcome::Fail(ErrorData {
            error_code: 503,
            error_message: "maintenance".into(),
        }),
        "test/hang" => Outcome::Silent,
        other => Outcome::Fail(ErrorData {
            error_code: 404,
            error_message: format!("no handler for `{other}`"),
        }),
    }
}

/// Plays `outcome` back through `emit`, which returns `false` once the
/// receiving side is gone.
pub async fn drive(outcome: Outcome, codec: DataCodec, mut emit: impl FnMut(PeerFrame) -> bool) {
    let fail = |error: &ErrorData| PeerFrame::Error(error.error_code, codec.encode(error).unwrap());

    match outcome {
        Outcome::Reply(data) => {
            emit(PeerFrame::Next(data));
        }
        Outcome::Fail(error) => {
            emit(fail(&error));
        }
        Outcome::Stream(items) => {
            for item in items {
                let keep_going = match item {
                    Ok(data) => emit(PeerFrame::Next(data)),
                    Err(error) => {
                        emit(fail(&error));
                        return;
                    }
                };
                if !keep_going {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            emit(PeerFrame::Complete);
        }
        Outcome::Silent => std::future::pending::<()>().await,
    }
}

// Stream transport peer

pub async fn spawn_frame_peer() -> (SocketAddr, Arc<PeerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(PeerLog::default());

    tokio::spawn({
        let log = log.clone();
        async move {
            while let Ok((socket, _)) = listener.accept().await {
                log.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_frames(socket, log.clone()));
            }
        }
    });

    (addr, log)
}

async fn serve_frames(socket: TcpStream, log: Arc<PeerLog>) {
    let (mut reader, mut writer) = socket.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
    let mut calls = HashMap::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        for frame in decoder.read_bytes(&buf[..n]) {
            let Ok(frame) = frame else { return };
            let stream_id = frame.stream_id;

            match frame.kind {
                FrameKind::Cancel => {
                    log.cancelled.fetch_add(1, Ordering::SeqCst);
                    if let Some(call) = calls.remove(&stream_id) {
                        call.abort();
                    }
                }
                FrameKind::RequestResponse | FrameKind::RequestStream => {
                    let (qualifier, headers) = HeadersCodec::decode(&frame.metadata).unwrap();
                    log.record(&qualifier, &headers);

                    let codec = codec_for(&headers);
                    let outcome = handle(&log, &qualifier, codec, &frame.data);
                    let tx = tx.clone();

                    let call = tokio::spawn(async move {
                        drive(outcome, codec, |reply| {
                            let (kind, qualifier, data) = match reply {
                                PeerFrame::Next(data) => (FrameKind::Next, qualifier.clone(), data),
                                PeerFrame::Error(code, data) => {
                                    (FrameKind::Error, Message::error_qualifier(code), data)
                                }
                                PeerFrame::Complete => {
                                    return tx
                                        .send(FrameCodec::encode_control(stream_id, FrameKind::Complete))
                                        .is_ok();
                                }
                            };
                            let metadata = HeadersCodec::encode(
                                &qualifier,
                                &BTreeMap::from([(
                                    CONTENT_TYPE_HEADER.to_owned(),
                                    codec.content_type().to_owned(),
                                )]),
                            )
                            .unwrap();
                            let frame = Frame::new(stream_id, kind, metadata, data.to_vec());
                            tx.send(FrameCodec::encode(&frame, DEFAULT_MAX_FRAME_SIZE).unwrap())
                                .is_ok()
                        })
                        .await;
                    });
                    calls.insert(stream_id, call.abort_handle());
                }
                _ => {}
            }
        }
    }
}

// Websocket and HTTP peers

pub async fn spawn_axum_peer() -> (SocketAddr, Arc<PeerLog>) {
    let log = Arc::new(PeerLog::default());

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/{*qualifier}", post(http_handler))
        .with_state(log.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, log)
}

async fn websocket_handler(State(log): State<Arc<PeerLog>>, ws: WebSocketUpgrade) -> Response {
    log.connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| serve_envelopes(socket, log))
}

async fn serve_envelopes(socket: WebSocket, log: Arc<PeerLog>) {
    let (mut sink, mut incoming) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if sink
                .send(AxumWsMessage::Text(envelope.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut calls = HashMap::new();

    while let Some(Ok(message)) = incoming.next().await {
        let AxumWsMessage::Text(text) = message else {
            continue;
        };
        let envelope: Value = serde_json::from_str(text.as_str()).unwrap();
        let stream_id = envelope["sid"].as_u64().unwrap();

        if envelope["sig"].as_u64() == Some(3) {
            log.cancelled.fetch_add(1, Ordering::SeqCst);
            if let Some(call) = calls.remove(&stream_id) {
                call.abort();
            }
            continue;
        }

        let qualifier = envelope["q"].as_str().unwrap_or_default().to_owned();
        let headers: BTreeMap<String, String> =
            serde_json::from_value(envelope["h"].clone()).unwrap_or_default();
        log.record(&qualifier, &headers);

        // Envelopes the client has to reject for this stream alone.
        let rejected = match qualifier.as_str() {
            "test/bad-signal" => Some(json!({ "sid": stream_id, "sig": 42 })),
            "test/peer-cancel" => Some(json!({ "sid": stream_id, "sig": 3 })),
            _ => None,
        };
        if let Some(envelope) = rejected {
            let _ = tx.send(envelope);
            continue;
        }

        let data = match envelope.get("d") {
            Some(d) => serde_json::to_vec(d).unwrap(),
            None => Vec::new(),
        };
        let outcome = handle(&log, &qualifier, DataCodec::Json, &data);
        let tx = tx.clone();

        let call = tokio::spawn(async move {
            drive(outcome, DataCodec::Json, |reply| {
                let payload = |data: &Bytes| -> Value {
                    if data.is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_slice(data).unwrap()
                    }
                };
                let envelope = match reply {
                    PeerFrame::Next(data) => json!({
                        "q": qualifier,
                        "sid": stream_id,
                        "h": { "content-type": "application/json" },
                        "d": payload(&data),
                    }),
                    PeerFrame::Error(code, data) => json!({
                        "q": Message::error_qualifier(code),
                        "sid": stream_id,
                        "sig": 2,
                        "d": payload(&data),
                    }),
                    PeerFrame::Complete => json!({ "sid": stream_id, "sig": 1 }),
                };
                tx.send(envelope).is_ok()
            })
            .await;
        });
        calls.insert(stream_id, call.abort_handle());
    }
}

async fn http_handler(
    State(log): State<Arc<PeerLog>>,
    Path(qualifier): Path<String>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
        .collect();
    log.record(&qualifier, &headers);

    if qualifier == "test/plain" {
        return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
    }

    let codec = codec_for(&headers);
    let content_type = [(CONTENT_TYPE, codec.content_type())];

    match handle(&log, &qualifier, codec, &body) {
        Outcome::Reply(data) => (StatusCode::OK, content_type, data).into_response(),
        Outcome::Fail(error) => {
            let status = StatusCode::from_u16(error.error_code as u16)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, content_type, codec.encode(&error).unwrap()).into_response()
        }
        Outcome::Stream(_) => StatusCode::NOT_IMPLEMENTED.into_response(),
        Outcome::Silent => std::future::pending().await,
    }
}
