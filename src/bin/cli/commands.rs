use relay_stomp::{AckMode, Connection, Frame};
use std::io::{self, Write};

/// Result of executing a command
pub enum CommandResult {
    /// Command executed successfully
    Ok,
    /// Command succeeded and has something to report
    Info(String),
    /// Command requests exit
    Quit,
    /// Error executing command
    Error(String),
}

/// Parse and execute a command
pub async fn execute_command(line: &str, conn: &Connection, default_ack: AckMode) -> CommandResult {
    let parts: Vec<&str> = line.trim().splitn(3, ' ').collect();
    if parts.is_empty() || parts[0].is_empty() {
        return CommandResult::Ok;
    }

    match parts[0] {
        "quit" | "exit" | "q" => CommandResult::Quit,

        "send" => {
            if parts.len() < 3 {
                return CommandResult::Error("Usage: send <destination> <message>".to_string());
            }
            let headers = vec![("content-type".to_string(), "text/plain".to_string())];
            match conn.send(parts[1], headers, parts[2].as_bytes()).await {
                Ok(_) => CommandResult::Ok,
                Err(e) => CommandResult::Error(format!("Send error: {}", e)),
            }
        }

        "sub" | "subscribe" => {
            if parts.len() < 2 {
                return CommandResult::Error("Usage: sub <destination> [auto|client|client-individual]".to_string());
            }
            let ack = match parts.get(2).map(|s| s.trim()) {
                None => default_ack,
                Some("auto") => AckMode::Auto,
                Some("client") => AckMode::Client,
                Some("client-individual") => AckMode::ClientIndividual,
                Some(other) => return CommandResult::Error(format!("Unknown ack mode: {}", other)),
            };
            match subscribe_printing(conn, parts[1], ack).await {
                Ok(id) => CommandResult::Info(format!("Subscribed to {} as {}", parts[1], id)),
                Err(e) => CommandResult::Error(format!("Subscribe error: {}", e)),
            }
        }

        "unsub" | "unsubscribe" => {
            let Some(target) = parts.get(1).map(|s| s.trim()) else {
                return CommandResult::Error("Usage: unsub <subscription-id|destination>".to_string());
            };
            // destinations start with a slash, generated ids never do
            if target.starts_with('/') {
                match conn.unsubscribe_destination(target).await {
                    Ok(ids) => CommandResult::Info(format!("Unsubscribed {}", ids.join(", "))),
                    Err(e) => CommandResult::Error(format!("Unsubscribe error: {}", e)),
                }
            } else {
                report(conn.unsubscribe(target).await, "Unsubscribe")
            }
        }

        "ack" | "nack" => {
            let Some(ack_id) = parts.get(1) else {
                return CommandResult::Error(format!("Usage: {} <ack-id> [transaction]", parts[0]));
            };
            let result = match (parts[0], parts.get(2).map(|s| s.trim())) {
                ("ack", None) => conn.ack(ack_id).await,
                ("ack", Some(tx)) => conn.ack_with_transaction(ack_id, tx).await,
                (_, None) => conn.nack(ack_id).await,
                (_, Some(tx)) => conn.nack_with_transaction(ack_id, tx).await,
            };
            report(result, "Acknowledge")
        }

        "begin" => {
            let result = match parts.get(1) {
                Some(id) => conn.begin(id).await.map(|_| id.to_string()),
                None => conn.begin_new().await,
            };
            match result {
                Ok(id) => CommandResult::Info(format!("Transaction {} begun", id)),
                Err(e) => CommandResult::Error(format!("Begin error: {}", e)),
            }
        }

        "commit" | "abort" => {
            let Some(id) = parts.get(1) else {
                return CommandResult::Error(format!("Usage: {} <transaction>", parts[0]));
            };
            let result = if parts[0] == "commit" {
                conn.commit(id).await
            } else {
                conn.abort(id).await
            };
            report(result, "Transaction")
        }

        "status" => CommandResult::Info(format!(
            "state: {:?}, version: {}, session: {}, receipts pending: {}",
            conn.state(),
            conn.version(),
            conn.session().unwrap_or("-"),
            conn.pending_receipts().await
        )),

        "help" | "?" => {
            print_help();
            CommandResult::Ok
        }

        _ => CommandResult::Error(format!("Unknown command: {}. Type 'help' for commands.", parts[0])),
    }
}

fn report(result: Result<(), relay_stomp::ConnError>, what: &str) -> CommandResult {
    match result {
        Ok(()) => CommandResult::Ok,
        Err(e) => CommandResult::Error(format!("{} error: {}", what, e)),
    }
}

/// Subscribe and print every MESSAGE as it arrives.
pub async fn subscribe_printing(
    conn: &Connection,
    destination: &str,
    ack: AckMode,
) -> Result<String, relay_stomp::ConnError> {
    let dest = destination.to_string();
    conn.subscribe(destination, ack, move |frame| print_message(&dest, &frame))
        .await
}

fn print_message(dest: &str, frame: &Frame) {
    println!("\n[{}] MESSAGE received:", dest);
    for (k, v) in &frame.headers {
        println!("  {}: {}", k, v);
    }
    if !frame.body.is_empty() {
        match frame.body_str() {
            Some(s) => println!("  Body: {}", s),
            None => println!("  Body: ({} bytes, binary)", frame.body.len()),
        }
    }
    print!("> ");
    let _ = io::stdout().flush();
}

/// Print help text
pub fn print_help() {
    println!("Commands:");
    println!("  send <destination> <message>        - Send a message");
    println!("  sub <destination> [ack-mode]        - Subscribe to a destination");
    println!("  unsub <subscription-id|destination> - Cancel a subscription");
    println!("  ack <ack-id> [transaction]          - Acknowledge a message");
    println!("  nack <ack-id> [transaction]         - Reject a message");
    println!("  begin [transaction]                 - Begin a transaction");
    println!("  commit <transaction>                - Commit a transaction");
    println!("  abort <transaction>                 - Abort a transaction");
    println!("  status                              - Show connection state");
    println!("  quit                                - Disconnect and exit");
}
