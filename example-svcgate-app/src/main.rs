use example_svcgate_app::serve_gateway;
use example_svcgate_service_definition::{Echo, Math};
use futures::StreamExt;
use svcgate_tokio_client::{Client, ClientSettings};
use tokio::join;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Bind to a random available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let _gateway_task = tokio::spawn(serve_gateway(listener));

    let settings = ClientSettings::builder()
        .host(addr.ip().to_string())
        .port(addr.port())
        .websocket_path("/ws")
        .header("x-client", "example-svcgate-app")
        .build()?;
    let client = Client::on_websocket(settings)?;

    let echo = client.for_service::<Echo>()?;
    let math = client.for_service::<Math>()?;

    // `join!` drives every call concurrently over the one connection
    let (greeting, sum, ping) = join!(
        echo.echo("hello, gateway".to_owned()),
        math.add(1.5, 2.25),
        math.ping(),
    );

    println!("Result from echo(): {:?}", greeting);
    println!("Result from add(): {:?}", sum);
    match ping {
        Ok(reply) => println!("Result from ping(): {reply}"),
        Err(e) => println!("ping() failed with {:?}: {}", e.kind(), e.message()),
    }

    let mut tail = echo.tail(3);
    while let Some(item) = tail.next().await {
        println!("Streamed from tail(): {:?}", item);
    }

    echo.notify("demo finished".to_owned());

    client.close().await?;
    println!("Client closed: {}", client.is_closed());

    Ok(())
}
