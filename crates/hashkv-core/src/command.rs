//! Command parsing.
//!
//! Turns a request (RESP array of bulk strings) into a typed [`Command`]
//! after checking the argument count. Arity and integer-argument errors are
//! returned as ready-made `-ERR` replies; nothing past this point validates
//! arguments again.

use crate::resp::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping(Option<String>),
    Set { key: String, value: String },
    Get { key: String },
    Del { key: String },
    Append { key: String, value: String },
    IncrBy { key: String, delta: i64 },
    DecrBy { key: String, delta: i64 },
    HSet { key: String, field: String, value: String },
    HGet { key: String, field: String },
    HDel { key: String, field: String },
    HGetAll { key: String },
    LPush { key: String, values: Vec<String> },
    RPush { key: String, values: Vec<String> },
    LPop { key: String },
    RPop { key: String },
    LRange { key: String, start: i64, end: i64 },
}

impl Command {
    /// Parse a request value. On failure returns the error reply to send.
    pub fn parse(request: &Value) -> Result<Command, Value> {
        let parts = match request {
            Value::Array(parts) if !parts.is_empty() => parts,
            _ => return Err(Value::error("ERR invalid request")),
        };

        let mut words = Vec::with_capacity(parts.len());
        for part in parts {
            match part.as_str() {
                Some(s) => words.push(s.to_string()),
                None => return Err(Value::error("ERR invalid request")),
            }
        }

        let name = words.remove(0).to_ascii_uppercase();
        let args = words;
        let arity = |ok: bool| -> Result<(), Value> {
            if ok {
                Ok(())
            } else {
                Err(Value::error(format!(
                    "ERR wrong number of arguments for '{}' command",
                    name.to_ascii_lowercase()
                )))
            }
        };

        let mut args = args.into_iter();
        let argc = args.len();
        let mut next = || args.next().unwrap_or_default();

        let command = match name.as_str() {
            "PING" => {
                arity(argc <= 1)?;
                Command::Ping(if argc == 1 { Some(next()) } else { None })
            }
            "SET" => {
                arity(argc == 2)?;
                Command::Set { key: next(), value: next() }
            }
            "GET" => {
                arity(argc == 1)?;
                Command::Get { key: next() }
            }
            "DEL" => {
                arity(argc == 1)?;
                Command::Del { key: next() }
            }
            "APPEND" => {
                arity(argc == 2)?;
                Command::Append { key: next(), value: next() }
            }
            "INCR" => {
                arity(argc == 1)?;
                Command::IncrBy { key: next(), delta: 1 }
            }
            "DECR" => {
                arity(argc == 1)?;
                Command::DecrBy { key: next(), delta: 1 }
            }
            "INCRBY" => {
                arity(argc == 2)?;
                let key = next();
                Command::IncrBy { key, delta: parse_integer(&next())? }
            }
            "DECRBY" => {
                arity(argc == 2)?;
                let key = next();
                Command::DecrBy { key, delta: parse_integer(&next())? }
            }
            "HSET" => {
                arity(argc == 3)?;
                Command::HSet { key: next(), field: next(), value: next() }
            }
            "HGET" => {
                arity(argc == 2)?;
                Command::HGet { key: next(), field: next() }
            }
            "HDEL" => {
                arity(argc == 2)?;
                Command::HDel { key: next(), field: next() }
            }
            "HGETALL" => {
                arity(argc == 1)?;
                Command::HGetAll { key: next() }
            }
            "LPUSH" | "RPUSH" => {
                arity(argc >= 2)?;
                let key = next();
                let values: Vec<String> = (1..argc).map(|_| next()).collect();
                if name == "LPUSH" {
                    Command::LPush { key, values }
                } else {
                    Command::RPush { key, values }
                }
            }
            "LPOP" => {
                arity(argc == 1)?;
                Command::LPop { key: next() }
            }
            "RPOP" => {
                arity(argc == 1)?;
                Command::RPop { key: next() }
            }
            "LRANGE" => {
                arity(argc == 3)?;
                let key = next();
                let start = parse_integer(&next())?;
                let end = parse_integer(&next())?;
                Command::LRange { key, start, end }
            }
            _ => {
                return Err(Value::error(format!(
                    "ERR unknown command '{}'",
                    name.to_ascii_lowercase()
                )))
            }
        };

        Ok(command)
    }

    /// Whether the command changes state and so must be logged.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Command::Ping(_)
                | Command::Get { .. }
                | Command::HGet { .. }
                | Command::HGetAll { .. }
                | Command::LRange { .. }
        )
    }
}

fn parse_integer(arg: &str) -> Result<i64, Value> {
    arg.parse::<i64>()
        .map_err(|_| Value::error("ERR value is not an integer or out of range"))
}
