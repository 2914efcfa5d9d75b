//! Interactive client for the notification RPC.
//!
//! Reads commands from stdin, sends them as JSON lines and prints the
//! server's reply:
//!
//!   all <entityId> <text>
//!   room <room> <entityId> <text>
//!   user <userId> <entityId> <text>
//!
//! Set `FANOUT_RPC_ADDR` to override the default `127.0.0.1:9090` and
//! `FANOUT_RPC_TOKEN` to attach a token to every call.

use std::env;
use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use fanout_core::Message;
use fanout_protocol::{decode_reply, encode_request, RpcCall, RpcRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let addr = env::var("FANOUT_RPC_ADDR").unwrap_or_else(|_| "127.0.0.1:9090".to_string());
    let token = env::var("FANOUT_RPC_TOKEN").ok();

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr).await?;
    let (read, mut write) = stream.into_split();
    let mut replies = BufReader::new(read).lines();
    println!("Connected.");
    println!("Commands:");
    println!("  all e1 hello everyone");
    println!("  room 2023-06-08 e2 hello room");
    println!("  user u1 e3 hello you");
    println!("Type 'quit' or 'exit' to leave.\n");

    let stdin = io::stdin();

    loop {
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!("\nEOF on stdin, exiting client.");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            println!("Exiting client.");
            break;
        }

        let Some(call) = parse_command(trimmed) else {
            eprintln!("Could not parse command. Expected all|room|user followed by arguments.");
            continue;
        };

        let request = RpcRequest {
            call,
            token: token.clone(),
        };
        let mut encoded = encode_request(&request)?;
        encoded.push('\n');
        write.write_all(encoded.as_bytes()).await?;

        match timeout(Duration::from_secs(2), replies.next_line()).await {
            Ok(Ok(Some(reply))) => match decode_reply(&reply) {
                Ok(r) if r.ok => println!("ok"),
                Ok(r) => println!("rejected: {}", r.error.unwrap_or_default()),
                Err(e) => eprintln!("unreadable reply {:?}: {}", reply, e),
            },
            Ok(Ok(None)) => {
                println!("Server closed the session.");
                break;
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => eprintln!("no reply within 2s"),
        }
    }

    Ok(())
}

fn parse_command(line: &str) -> Option<RpcCall> {
    let (verb, rest) = line.split_once(' ')?;
    match verb {
        "all" => {
            let (entity, text) = rest.split_once(' ')?;
            Some(RpcCall::Broadcast {
                message: Message::info(entity, text),
            })
        }
        "room" => {
            let mut parts = rest.splitn(3, ' ');
            let room = parts.next()?;
            let entity = parts.next()?;
            let text = parts.next()?;
            Some(RpcCall::NotifyRoom {
                message: Message::info(entity, text),
                room: room.to_string(),
            })
        }
        "user" => {
            let mut parts = rest.splitn(3, ' ');
            let user = parts.next()?;
            let entity = parts.next()?;
            let text = parts.next()?;
            Some(RpcCall::PrivateNotify {
                message: Message::info(entity, text),
                user_id: user.to_string(),
            })
        }
        _ => None,
    }
}
