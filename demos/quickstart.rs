use futures::StreamExt;
use relay_stomp::{AckMode, Connection, ConnectOptions};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Expects a STOMP broker on localhost:61613 (e.g. RabbitMQ with the stomp plugin).
    let options = ConnectOptions::default().login("guest", "guest");
    let conn = Connection::connect("127.0.0.1", 61613, options).await?;
    println!(
        "connected: version {} session {:?}",
        conn.version(),
        conn.session()
    );

    let mut sub = conn.subscribe_stream("/queue/test", AckMode::ClientIndividual).await?;

    let receipt = conn
        .send_with_receipt("/queue/test", vec![], b"hello from relay-stomp".to_vec())
        .await?;
    receipt.wait(Duration::from_secs(5)).await?;
    println!("broker confirmed the send");

    match tokio::time::timeout(Duration::from_secs(5), sub.next()).await {
        Ok(Some(frame)) => {
            println!("received frame:\n{}", frame);
            let ack_header = if conn.version() == "1.2" { "ack" } else { "message-id" };
            if let Some(id) = frame.get_header(ack_header) {
                sub.ack(id).await?;
            }
        }
        Ok(None) => println!("connection closed, no frames received"),
        Err(_) => println!("timed out waiting for a frame"),
    }

    conn.disconnect().await?;
    Ok(())
}
