mod common;

use common::{hanging_request, spawn_frame_peer, wait_until};
use example_svcgate_service_definition::{Echo, Math};
use futures::StreamExt;
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use svcgate_tokio_client::{Client, ClientSettings, ClientSettingsBuilder, ErrorKind};
use tokio::net::TcpListener;

fn settings(addr: SocketAddr) -> ClientSettingsBuilder {
    ClientSettings::builder()
        .host(addr.ip().to_string())
        .port(addr.port())
}

async fn connected_client() -> (Client, Arc<common::PeerLog>) {
    let (addr, log) = spawn_frame_peer().await;
    let client = Client::on_stream(settings(addr).build().unwrap()).unwrap();
    (client, log)
}

#[tokio::test]
async fn echo_round_trip() {
    let (client, _log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    let reply = echo.echo("hello over tcp".to_owned()).await.unwrap();
    assert_eq!(reply, "hello over tcp");
}

#[tokio::test]
async fn routed_method_with_multiple_arguments() {
    let (client, log) = connected_client().await;
    let math = client.for_service::<Math>().unwrap();

    assert_eq!(math.add(1.5, 2.25).await.unwrap(), 3.75);
    assert!(log.headers_of("math/sum").is_some());
}

#[tokio::test]
async fn error_reply_is_mapped() {
    let (client, _log) = connected_client().await;
    let math = client.for_service::<Math>().unwrap();

    let err = math.ping().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(err.code(), Some(503));
    assert_eq!(err.message(), "maintenance");
    assert_eq!(err.qualifier(), Some("math/ping"));
}

#[tokio::test]
async fn stream_yields_every_element_then_completes() {
    let (client, _log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    let items: Vec<i64> = echo
        .tail(4)
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(items, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn stream_error_terminates_the_stream() {
    let (client, _log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    let items: Vec<_> = echo.tail(13).collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(1));
    let err = items[1].clone().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.message(), "unlucky");
}

#[tokio::test]
async fn dropping_a_stream_cancels_it_at_the_peer() {
    let (client, log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    let first: Vec<i64> = echo
        .tail(0)
        .take(3)
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(first, vec![1, 2, 3]);

    wait_until(|| log.cancelled.load(Ordering::SeqCst) == 1).await;

    // The connection stays usable.
    assert_eq!(echo.echo("still here".to_owned()).await.unwrap(), "still here");
}

#[tokio::test]
async fn fire_and_forget_reaches_the_peer() {
    let (client, log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    echo.notify("deployed".to_owned());

    wait_until(|| log.notifications() == vec!["deployed".to_owned()]).await;
}

#[tokio::test]
async fn concurrent_calls_share_one_connection() {
    let (client, log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    let replies = join_all((0..32).map(|i| echo.echo(format!("call {i}")))).await;

    for (i, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.unwrap(), format!("call {i}"));
    }
    assert_eq!(log.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn static_headers_and_content_type_are_sent() {
    let (addr, log) = spawn_frame_peer().await;
    let client =
        Client::on_stream(settings(addr).header("x-tenant", "acme").build().unwrap()).unwrap();

    client
        .for_service::<Echo>()
        .unwrap()
        .echo("hi".to_owned())
        .await
        .unwrap();

    let headers = log.headers_of("echo/echo").unwrap();
    assert_eq!(headers.get("x-tenant").map(String::as_str), Some("acme"));
    assert_eq!(
        headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test]
async fn bitcode_content_type_round_trips() {
    let (addr, log) = spawn_frame_peer().await;
    let client = Client::on_stream(
        settings(addr)
            .content_type("application/x-bitcode")
            .build()
            .unwrap(),
    )
    .unwrap();

    let math = client.for_service::<Math>().unwrap();
    assert_eq!(math.add(2.0, 40.0).await.unwrap(), 42.0);

    let err = math.ping().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);

    let headers = log.headers_of("math/sum").unwrap();
    assert_eq!(
        headers.get("content-type").map(String::as_str),
        Some("application/x-bitcode")
    );
}

#[tokio::test]
async fn close_fails_in_flight_calls() {
    let (client, log) = connected_client().await;
    let client = Arc::new(client);

    let in_flight = tokio::spawn({
        let client = client.clone();
        async move { client.request_response(hanging_request()).await }
    });
    wait_until(|| log.headers_of("test/hang").is_some()).await;

    client.close().await.unwrap();

    let err = in_flight.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportClosed);
}

#[tokio::test]
async fn calls_after_close_fail_without_io() {
    let (client, log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();

    let err = echo.echo("late".to_owned()).await.unwrap_err();
    assert!(err.is_transport_closed());

    let items: Vec<_> = echo.tail(3).collect().await;
    assert_eq!(items.len(), 1);
    assert!(items[0].as_ref().unwrap_err().is_transport_closed());

    assert_eq!(log.connections.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_peer_is_a_transport_fault() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::on_stream(settings(addr).build().unwrap()).unwrap();
    let echo = client.for_service::<Echo>().unwrap();

    let err = echo.echo("anyone?".to_owned()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFault);
    assert_eq!(err.qualifier(), Some("echo/echo"));
}

#[tokio::test]
async fn lost_connection_is_not_reestablished() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    tokio::spawn({
        let accepted = accepted.clone();
        async move {
            // Accept and hang up immediately.
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        }
    });

    let client = Client::on_stream(settings(addr).build().unwrap()).unwrap();
    let echo = client.for_service::<Echo>().unwrap();

    let first = echo.echo("one".to_owned()).await.unwrap_err();
    assert_eq!(first.kind(), ErrorKind::TransportFault);

    let second = echo.echo("two".to_owned()).await.unwrap_err();
    assert_eq!(second.kind(), ErrorKind::TransportFault);

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn close_interrupts_a_pending_connect() {
    // Non-routable: the connect either stalls until the OS gives up or is
    // refused by the network stack straight away.
    let settings = ClientSettings::builder()
        .host("10.255.255.1")
        .port(9)
        .build()
        .unwrap();
    let client = Arc::new(Client::on_stream(settings).unwrap());

    let call = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .for_service::<Echo>()
                .unwrap()
                .echo("never sent".to_owned())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.close().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("close did not interrupt the connect")
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::TransportClosed | ErrorKind::TransportFault
    ));
}

#[tokio::test]
async fn slow_stream_consumer_loses_nothing() {
    let (client, _log) = connected_client().await;
    let echo = client.for_service::<Echo>().unwrap();

    let mut tail = echo.tail(50);
    assert_eq!(tail.next().await, Some(Ok(1)));

    tokio::time::sleep(Duration::from_millis(300)).await;

    let rest: Vec<i64> = tail.map(|item| item.unwrap()).collect().await;
    assert_eq!(rest, (2..=50).collect::<Vec<_>>());
}
