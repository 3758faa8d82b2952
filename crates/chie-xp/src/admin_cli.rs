//! chie-admin CLI tool
//!
//! Local operations against a running chie-node.
//!
//! Usage:
//!   chie-admin register <user_id>
//!   chie-admin adjust <user_id> <delta> [note...]
//!   chie-admin audit <user_id>
//!   chie-admin audit-all
//!   chie-admin repair <user_id>
//!   chie-admin rank <user_id> [distinct|shared]
//!   chie-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Register {
        user_id: String,
    },
    Adjust {
        user_id: String,
        delta: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Audit {
        user_id: String,
    },
    AuditAll,
    Repair {
        user_id: String,
    },
    Rank {
        user_id: String,
        mode: String,
    },
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Report { value: serde_json::Value },
    Pong,
}

fn print_usage() {
    eprintln!("chie-admin - Manage experience data on a Chie node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  chie-admin register <user_id>              Create a level 1 user");
    eprintln!("  chie-admin adjust <user_id> <delta> [note] Apply a manual XP correction");
    eprintln!("  chie-admin audit <user_id>                 Compare aggregate with ledger");
    eprintln!("  chie-admin audit-all                       Audit every user");
    eprintln!("  chie-admin repair <user_id>                Rebuild aggregate from ledger");
    eprintln!("  chie-admin rank <user_id> [mode]           Show rank (distinct or shared)");
    eprintln!("  chie-admin ping                            Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CHIE_SOCKET  Path to admin socket (default: ./chie-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("CHIE_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./chie-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to chie-node at {:?}: {}\n\
             Is the chie-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn user_arg(args: &[String], command: &str) -> String {
    match args.get(2) {
        Some(user) => user.clone(),
        None => {
            eprintln!("Error: {} requires a user_id argument", command);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "register" => AdminCommand::Register {
            user_id: user_arg(&args, "register"),
        },
        "adjust" => {
            let user_id = user_arg(&args, "adjust");
            let delta = match args.get(3).map(|d| d.parse::<i64>()) {
                Some(Ok(delta)) => delta,
                Some(Err(e)) => {
                    eprintln!("Error: invalid delta: {}", e);
                    std::process::exit(1);
                }
                None => {
                    eprintln!("Error: adjust requires a delta argument");
                    std::process::exit(1);
                }
            };
            let note = (args.len() > 4).then(|| args[4..].join(" "));
            AdminCommand::Adjust {
                user_id,
                delta,
                note,
            }
        }
        "audit" => AdminCommand::Audit {
            user_id: user_arg(&args, "audit"),
        },
        "audit-all" => AdminCommand::AuditAll,
        "repair" => AdminCommand::Repair {
            user_id: user_arg(&args, "repair"),
        },
        "rank" => AdminCommand::Rank {
            user_id: user_arg(&args, "rank"),
            mode: args.get(3).cloned().unwrap_or_else(|| "distinct".to_string()),
        },
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Report { value } => match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("{}", value),
            },
            AdminResponse::Pong => {
                println!("pong - chie-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
