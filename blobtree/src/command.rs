//! Line-oriented commands served by the `blobtree` binary.
//!
//! One command per line:
//!
//! - `put <key> <value>`: store the rest of the line as the value
//! - `get <key>`
//! - `check`: run the structural checker
//! - `stats`
//! - `dump`: log every page at debug level
//! - `quit`

use std::io::{BufRead, Write};

use crate::storage::{BTree, BTreeError};

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: i32, value: String },
    Get { key: i32 },
    Check,
    Stats,
    Dump,
    Quit,
}

/// Whether the command loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Command {
    /// Parse one input line. Blank lines parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim_start();

        let command = match name {
            "put" => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Self::Put {
                    key: parse_key(key)?,
                    value: value.trim_start().to_string(),
                }
            }
            "get" => Self::Get {
                key: parse_key(rest)?,
            },
            "check" => Self::Check,
            "stats" => Self::Stats,
            "dump" => Self::Dump,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Run the command against `tree`, writing the reply to `out`.
    pub fn execute(&self, tree: &mut BTree, out: &mut impl Write) -> Result<Flow, CommandError> {
        match self {
            Self::Put { key, value } => {
                tree.insert(*key, value.as_bytes())?;
                writeln!(out, "ok")?;
            }
            Self::Get { key } => match tree.lookup(*key)? {
                Some(value) => writeln!(out, "{}", String::from_utf8_lossy(&value))?,
                None => writeln!(out, "(not found)")?,
            },
            Self::Check => {
                let verdict = if tree.invariants_hold()? { "ok" } else { "corrupt" };
                writeln!(out, "{verdict}")?;
            }
            Self::Stats => {
                let stats = tree.stats()?;
                writeln!(
                    out,
                    "pages={} depth={} cached={} hits={} misses={} evictions={}",
                    stats.page_count,
                    stats.depth,
                    stats.cached_pages,
                    stats.cache.hits,
                    stats.cache.misses,
                    stats.cache.evictions
                )?;
            }
            Self::Dump => {
                tree.dump()?;
                writeln!(out, "ok")?;
            }
            Self::Quit => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }
}

/// Serve commands from `input` until `quit` or end of input.
///
/// Bad input lines and store failures are reported on `out` and the loop
/// keeps going. A failure to read input or to write a reply ends it.
pub fn serve(
    tree: &mut BTree,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    for line in input.lines() {
        let line = line.map_err(CommandError::Input)?;

        let result = Command::parse(&line).and_then(|command| match command {
            Some(command) => command.execute(tree, out),
            None => Ok(Flow::Continue),
        });

        match result {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => return Ok(()),
            Err(CommandError::Output(e)) => return Err(CommandError::Output(e)),
            Err(e) => {
                if e.is_input_error() {
                    tracing::warn!("{e}");
                } else {
                    tracing::error!("Command failed: {e}");
                }
                writeln!(out, "error: {e}")?;
            }
        }
    }
    Ok(())
}

fn parse_key(token: &str) -> Result<i32, CommandError> {
    token
        .parse()
        .map_err(|_| CommandError::InvalidKey(token.to_string()))
}

/// Errors from parsing or running a command.
#[derive(Debug)]
pub enum CommandError {
    /// The first word is not a known command.
    Unknown(String),
    /// The key is not an i32.
    InvalidKey(String),
    /// The store failed.
    Store(BTreeError),
    /// Reading the next line failed.
    Input(std::io::Error),
    /// Writing the reply failed.
    Output(std::io::Error),
}

impl CommandError {
    /// Whether the error came from the input line rather than the store.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::Unknown(_) | Self::InvalidKey(_))
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "unknown command: {name}"),
            Self::InvalidKey(token) => write!(f, "invalid key: '{token}'"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Input(e) => write!(f, "input error: {e}"),
            Self::Output(e) => write!(f, "output error: {e}"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Input(e) | Self::Output(e) => Some(e),
            Self::Unknown(_) | Self::InvalidKey(_) => None,
        }
    }
}

impl From<BTreeError> for CommandError {
    fn from(e: BTreeError) -> Self {
        Self::Store(e)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        Self::Output(e)
    }
}
