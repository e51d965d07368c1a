//! Engine: stores + append-only log behind one `execute` call.
//!
//! **Read path**: parse, answer straight from the stores.
//! **Write path**: parse, append to the AOF, apply, all under the log lock.
//! **Startup**: replay the AOF through the same apply path before returning.

use std::path::Path;

use hashbrown::HashMap;
use tracing::info;

use crate::aof::Aof;
use crate::command::Command;
use crate::config::Config;
use crate::error::{KvError, KvResult};
use crate::field_store::FieldStore;
use crate::lists::ListStore;
use crate::resp::Value;
use crate::strings::{CounterError, StringStore};

/// The whole server state.
///
/// All methods take `&self`; share it between connection threads with `Arc`.
pub struct Engine {
    hashes: FieldStore,
    strings: StringStore,
    lists: ListStore,
    aof: Aof,
    config: Config,
}

impl Engine {
    /// Build empty stores, open the log at `config.aof_path` and replay it.
    ///
    /// Returns only after every logged command has been re-applied. A torn
    /// final entry is dropped. Any other replay failure is returned,
    /// including an entry that is not a valid command (`CorruptEntry`).
    pub fn open(config: Config) -> KvResult<Self> {
        config.validate()?;

        let aof = Aof::open(&config.aof_path, config.sync_interval)?;
        let engine = Self {
            hashes: FieldStore::new(&config),
            strings: StringStore::new(),
            lists: ListStore::new(),
            aof,
            config,
        };

        let replayed = engine.aof.replay(|offset, entry| {
            let command = Command::parse(&entry).map_err(|reply| KvError::CorruptEntry {
                offset,
                reason: match reply {
                    Value::Error(message) => message,
                    other => format!("{:?}", other),
                },
            })?;
            engine.apply(&command);
            Ok(())
        })?;

        info!(
            path = %engine.config.aof_path.display(),
            replayed,
            hash_fields = engine.hashes.len(),
            strings = engine.strings.len(),
            "engine ready"
        );
        Ok(engine)
    }

    /// Run one request and produce its reply.
    ///
    /// `Err` only when the log append fails; the command is then not applied.
    pub fn execute(&self, request: &Value) -> KvResult<Value> {
        let command = match Command::parse(request) {
            Ok(command) => command,
            Err(reply) => return Ok(reply),
        };

        if command.is_mutating() {
            self.aof.append_then(request, || self.apply(&command))
        } else {
            Ok(self.apply(&command))
        }
    }

    /// Apply a parsed command to the stores. Does not log.
    fn apply(&self, command: &Command) -> Value {
        match command {
            Command::Ping(None) => Value::Simple("PONG".to_string()),
            Command::Ping(Some(message)) => Value::bulk(message.as_str()),

            Command::Set { key, value } => {
                self.strings.set(key, value);
                Value::ok()
            }
            Command::Get { key } => self.strings.get(key).map_or(Value::Null, Value::Bulk),
            Command::Del { key } => Value::Integer(self.strings.delete(key) as i64),
            Command::Append { key, value } => Value::Integer(self.strings.append(key, value) as i64),
            Command::IncrBy { key, delta } => counter_reply(self.strings.incr_by(key, *delta)),
            Command::DecrBy { key, delta } => counter_reply(self.strings.decr_by(key, *delta)),

            Command::HSet { key, field, value } => {
                self.hashes.set(key, field, value);
                Value::ok()
            }
            Command::HGet { key, field } => self.hashes.get(key, field).map_or(Value::Null, Value::Bulk),
            Command::HDel { key, field } => Value::Integer(self.hashes.delete(key, field) as i64),
            Command::HGetAll { key } => match self.hashes.get_all(key) {
                Some(fields) => flatten_fields(fields),
                None => Value::Null,
            },

            Command::LPush { key, values } => Value::Integer(self.lists.push_front(key, values) as i64),
            Command::RPush { key, values } => Value::Integer(self.lists.push_back(key, values) as i64),
            Command::LPop { key } => self.lists.pop_front(key).map_or(Value::Null, Value::Bulk),
            Command::RPop { key } => self.lists.pop_back(key).map_or(Value::Null, Value::Bulk),
            Command::LRange { key, start, end } => match self.lists.range(key, *start, *end) {
                Some(items) => Value::Array(items.into_iter().map(Value::Bulk).collect()),
                None => Value::Null,
            },
        }
    }

    /// Close the log. Later mutating commands fail with `LogClosed`.
    pub fn close(&self) -> KvResult<()> {
        self.aof.close()
    }

    pub fn hashes(&self) -> &FieldStore {
        &self.hashes
    }

    pub fn strings(&self) -> &StringStore {
        &self.strings
    }

    pub fn lists(&self) -> &ListStore {
        &self.lists
    }

    pub fn aof(&self) -> &Aof {
        &self.aof
    }

    pub fn aof_path(&self) -> &Path {
        self.aof.path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// HGETALL reply: field, value, field, value... ordered by field.
fn flatten_fields(fields: HashMap<String, String>) -> Value {
    let mut pairs: Vec<(String, String)> = fields.into_iter().collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    Value::Array(
        pairs
            .into_iter()
            .flat_map(|(field, value)| [Value::Bulk(field), Value::Bulk(value)])
            .collect(),
    )
}

fn counter_reply(result: Result<i64, CounterError>) -> Value {
    match result {
        Ok(n) => Value::Integer(n),
        Err(CounterError::NotAnInteger) => Value::error("ERR value is not an integer or out of range"),
        Err(CounterError::Overflow) => Value::error("ERR increment or decrement would overflow"),
    }
}
