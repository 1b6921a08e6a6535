use relay_stomp::{Connection, ConnectOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Expects a STOMP broker on localhost:61613 (e.g. RabbitMQ with the stomp plugin).
    let conn = Connection::connect("127.0.0.1", 61613, ConnectOptions::default().login("guest", "guest")).await?;

    let tx = conn.begin_new().await?;
    println!("Transaction {} started", tx);

    for body in ["message 1 in transaction", "message 2 in transaction"] {
        let headers = vec![("transaction".to_string(), tx.clone())];
        conn.send("/queue/test", headers, body).await?;
    }

    // Both messages are delivered atomically on commit
    conn.commit(&tx).await?;
    println!("Transaction {} committed", tx);

    let tx2 = "tx-example-2";
    conn.begin(tx2).await?;
    let headers = vec![("transaction".to_string(), tx2.to_string())];
    conn.send("/queue/test", headers, "this message will be aborted").await?;
    conn.abort(tx2).await?;
    println!("Transaction {} aborted", tx2);

    // The transaction is gone now; using it again fails locally
    if let Err(e) = conn.commit(tx2).await {
        println!("commit after abort: {}", e);
    }

    conn.disconnect().await?;
    Ok(())
}
