use relay_stomp::{ConnError, Connection, ConnectOptions, parse_heartbeat_header};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;

use super::args::Cli;
use super::commands::{CommandResult, execute_command, print_help, subscribe_printing};
use super::exit_codes;

/// Run the interactive line-based client
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    let address = format!("{}:{}", cli.host, cli.port);
    println!("Connecting to {}...", address);

    let (send_ms, recv_ms) = parse_heartbeat_header(&cli.heartbeat);
    let mut options = ConnectOptions::default()
        .login(&cli.login, &cli.passcode)
        .heartbeat(send_ms, recv_ms)
        .on_error(|err| {
            eprintln!("\n[BROKER ERROR] {}", err);
            if let ConnError::Server(server) = err {
                for (k, v) in &server.frame.headers {
                    eprintln!("  {}: {}", k, v);
                }
            }
            print!("> ");
            let _ = io::stdout().flush();
        });
    if let Some(vhost) = &cli.vhost {
        options = options.host(vhost);
    }

    let conn = Connection::connect(&cli.host, cli.port, options)
        .await
        .map_err(|e| format_connection_error(&e, &address))?;

    println!(
        "Connected (STOMP {}, session {}).",
        conn.version(),
        conn.session().unwrap_or("-")
    );

    conn.connection_dropped_handler(|cause| {
        eprintln!("\nConnection lost: {}", cause);
    })
    .await;

    let default_ack = relay_stomp::AckMode::from(cli.ack);
    for dest in &cli.subscribe {
        let id = subscribe_printing(&conn, dest, default_ack)
            .await
            .map_err(|e| {
                (
                    format!("Failed to subscribe to '{}': {}", dest, e),
                    exit_codes::PROTOCOL_ERROR,
                )
            })?;
        println!("Subscribed to {} as {}", dest, id);
    }

    // Channel to receive user commands from stdin reader
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);

    // Spawn blocking stdin reader
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if cmd_tx.blocking_send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    println!();
    print_help();
    println!();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let line = tokio::select! {
            line = cmd_rx.recv() => match line {
                Some(l) => l,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        if conn.state().is_terminal() {
            return Err((
                "Connection is closed".to_string(),
                exit_codes::NETWORK_ERROR,
            ));
        }

        match execute_command(&line, &conn, default_ack).await {
            CommandResult::Ok => {}
            CommandResult::Info(msg) => println!("{}", msg),
            CommandResult::Quit => break,
            CommandResult::Error(msg) => eprintln!("{}", msg),
        }
    }

    println!("Disconnecting...");
    match conn.disconnect().await {
        Ok(()) | Err(ConnError::ConnectionClosed) => Ok(()),
        Err(e) => Err((format!("Disconnect failed: {}", e), exit_codes::NETWORK_ERROR)),
    }
}

/// Format a connection error with user-friendly messaging
pub fn format_connection_error(err: &ConnError, address: &str) -> (String, u8) {
    match err {
        ConnError::Io(io_err) => {
            let message = match io_err.kind() {
                io::ErrorKind::ConnectionRefused => format!("Connection refused: {}", address),
                io::ErrorKind::TimedOut => format!("Connection timed out: {}", address),
                _ => format!("Connection failed: {}", io_err),
            };
            (message, exit_codes::NETWORK_ERROR)
        }
        ConnError::ConnectTimeout => (
            format!("Connection timed out: {}", address),
            exit_codes::NETWORK_ERROR,
        ),
        ConnError::ServerRejected(server_err) => {
            let mut message = format!("Authentication failed: {}", server_err.message);
            if let Some(body) = &server_err.body {
                message.push_str(&format!(" ({})", body));
            }
            (message, exit_codes::AUTH_ERROR)
        }
        other => (format!("Protocol error: {}", other), exit_codes::PROTOCOL_ERROR),
    }
}
