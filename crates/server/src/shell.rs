//! Line-oriented command shell over the coordinator.
//!
//! ```text
//! SET user:1 alice
//! GET user:1        -> alice
//! NUMEQUALTO alice  -> 1
//! UNSET user:1
//! GET user:1        -> NULL
//! END
//! ```

use anyhow::Result;
use tiergate_core::{Coordinator, CoreError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const NULL_REPLY: &str = "NULL";
pub const INVALID_REPLY: &str = "Invalid command";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Get { key: String },
    Unset { key: String },
    NumEqualTo { value: String },
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCommand;

/// `None` for blank lines.
pub fn parse_command(line: &str) -> Option<std::result::Result<Command, InvalidCommand>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (name, args) = parts.split_first()?;

    let command = match (name.to_ascii_uppercase().as_str(), args) {
        ("SET", [key, value]) => Command::Set {
            key: key.to_string(),
            value: value.to_string(),
        },
        ("GET", [key]) => Command::Get {
            key: key.to_string(),
        },
        ("UNSET", [key]) => Command::Unset {
            key: key.to_string(),
        },
        ("NUMEQUALTO", [value]) => Command::NumEqualTo {
            value: value.to_string(),
        },
        ("END", []) => Command::End,
        _ => return Some(Err(InvalidCommand)),
    };
    Some(Ok(command))
}

/// Runs one command. Returns the line to print, if any.
pub async fn apply(coordinator: &Coordinator, command: Command) -> Option<String> {
    let result = match command {
        Command::Set { key, value } => coordinator.put(&key, value).await.map(|_| None),
        Command::Get { key } => match coordinator.get(&key).await {
            Ok(record) => Ok(Some(String::from_utf8_lossy(&record.value).into_owned())),
            Err(CoreError::NotFound(_)) => Ok(Some(NULL_REPLY.to_string())),
            Err(e) => Err(e),
        },
        Command::Unset { key } => match coordinator.delete(&key).await {
            Ok(()) | Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        },
        Command::NumEqualTo { value } => coordinator
            .count_equal(value.as_bytes())
            .await
            .map(|count| Some(count.to_string())),
        Command::End => Ok(None),
    };

    result.unwrap_or_else(|e| {
        debug!("shell command failed: {}", e);
        Some(format!("ERROR {}: {}", e.kind(), e))
    })
}

/// Reads commands until `END` or end of input.
pub async fn run_shell<R, W>(coordinator: &Coordinator, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let reply = match parse_command(&line) {
            None => continue,
            Some(Ok(Command::End)) => break,
            Some(Ok(command)) => apply(coordinator, command).await,
            Some(Err(InvalidCommand)) => Some(INVALID_REPLY.to_string()),
        };

        if let Some(reply) = reply {
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
    }

    Ok(())
}
