//! Command dispatch.
//!
//! Protocol handlers drive the engine through [`Executor::exec`]: an
//! instruction plus positional byte-string arguments in, a
//! [`CommandResult`] out. Integers and scores are rendered as ASCII
//! decimals and booleans as `1`/`0`.

use crate::error::{Error, Result};
use crate::structure::string::{TTL_MISSING, TTL_PERSISTENT};
use crate::Structure;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Commands understood by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `GET key`
    Get,
    /// `SET key value [ttl_seconds]`
    Set,
    /// `DELETE key`
    Delete,
    /// `EXPIRE key seconds`
    Expire,
    /// `TTL key`
    Ttl,
    /// `PERSIST key`
    Persist,
    /// `EXISTS key`
    Exists,
    /// `TYPE key`
    Type,
    /// `HSET key field value`
    HSet,
    /// `HGET key field`
    HGet,
    /// `HDEL key field`
    HDel,
    /// `HEXISTS key field`
    HExists,
    /// `HLEN key`
    HLen,
    /// `LPUSH key value`
    LPush,
    /// `RPUSH key value`
    RPush,
    /// `LPOP key`
    LPop,
    /// `RPOP key`
    RPop,
    /// `LLEN key`
    LLen,
    /// `LINDEX key index`
    LIndex,
    /// `SADD key member`
    SAdd,
    /// `SREM key member`
    SRem,
    /// `SISMEMBER key member`
    SIsMember,
    /// `SCARD key`
    SCard,
    /// `ZADD key score member`
    ZAdd,
    /// `ZSCORE key member`
    ZScore,
    /// `ZREM key member`
    ZRem,
    /// `ZCARD key`
    ZCard,
}

impl Instruction {
    /// Every instruction, in table order.
    pub const ALL: [Instruction; 27] = [
        Instruction::Get,
        Instruction::Set,
        Instruction::Delete,
        Instruction::Expire,
        Instruction::Ttl,
        Instruction::Persist,
        Instruction::Exists,
        Instruction::Type,
        Instruction::HSet,
        Instruction::HGet,
        Instruction::HDel,
        Instruction::HExists,
        Instruction::HLen,
        Instruction::LPush,
        Instruction::RPush,
        Instruction::LPop,
        Instruction::RPop,
        Instruction::LLen,
        Instruction::LIndex,
        Instruction::SAdd,
        Instruction::SRem,
        Instruction::SIsMember,
        Instruction::SCard,
        Instruction::ZAdd,
        Instruction::ZScore,
        Instruction::ZRem,
        Instruction::ZCard,
    ];

    /// Wire name of the instruction.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Get => "GET",
            Instruction::Set => "SET",
            Instruction::Delete => "DELETE",
            Instruction::Expire => "EXPIRE",
            Instruction::Ttl => "TTL",
            Instruction::Persist => "PERSIST",
            Instruction::Exists => "EXISTS",
            Instruction::Type => "TYPE",
            Instruction::HSet => "HSET",
            Instruction::HGet => "HGET",
            Instruction::HDel => "HDEL",
            Instruction::HExists => "HEXISTS",
            Instruction::HLen => "HLEN",
            Instruction::LPush => "LPUSH",
            Instruction::RPush => "RPUSH",
            Instruction::LPop => "LPOP",
            Instruction::RPop => "RPOP",
            Instruction::LLen => "LLEN",
            Instruction::LIndex => "LINDEX",
            Instruction::SAdd => "SADD",
            Instruction::SRem => "SREM",
            Instruction::SIsMember => "SISMEMBER",
            Instruction::SCard => "SCARD",
            Instruction::ZAdd => "ZADD",
            Instruction::ZScore => "ZSCORE",
            Instruction::ZRem => "ZREM",
            Instruction::ZCard => "ZCARD",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Instruction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Instruction::ALL
            .iter()
            .find(|instruction| instruction.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| Error::invalid_argument(format!("unknown instruction '{}'", s)))
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command succeeded
    pub success: bool,
    /// Reply payload; empty on failure
    pub data: Vec<u8>,
    /// Error message on failure
    pub error: Option<String>,
}

impl CommandResult {
    fn ok(data: Vec<u8>) -> Self {
        Self { success: true, data, error: None }
    }

    fn err(error: &Error) -> Self {
        Self { success: false, data: Vec::new(), error: Some(error.to_string()) }
    }
}

type Handler = fn(&Structure, &[Vec<u8>]) -> Result<Vec<u8>>;

/// Dispatches instructions to a [`Structure`].
///
/// # Example
///
/// ```rust,no_run
/// use caskdb::{Executor, Instruction, Options, Structure, DB};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), caskdb::Error> {
/// let db = Arc::new(DB::open("./data", Options::default())?);
/// let executor = Executor::new(Structure::new(db));
///
/// let args = vec![b"key".to_vec(), b"value".to_vec()];
/// let result = executor.exec("set".parse::<Instruction>()?, &args);
/// assert!(result.success);
/// # Ok(())
/// # }
/// ```
pub struct Executor {
    structure: Structure,
    handlers: HashMap<Instruction, Handler>,
}

impl Executor {
    /// Builds the dispatch table.
    pub fn new(structure: Structure) -> Self {
        let handlers = Instruction::ALL
            .iter()
            .map(|&instruction| (instruction, handler_for(instruction)))
            .collect();
        Self { structure, handlers }
    }

    /// The structure commands run against.
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Runs one command.
    pub fn exec(&self, instruction: Instruction, args: &[Vec<u8>]) -> CommandResult {
        let handler = match self.handlers.get(&instruction) {
            Some(handler) => handler,
            None => {
                let error = Error::internal(format!("no handler for {}", instruction));
                return CommandResult::err(&error);
            }
        };

        match handler(&self.structure, args) {
            Ok(data) => CommandResult::ok(data),
            Err(e) => {
                log::debug!("{} failed: {}", instruction, e);
                CommandResult::err(&e)
            }
        }
    }
}

fn handler_for(instruction: Instruction) -> Handler {
    match instruction {
        Instruction::Get => get,
        Instruction::Set => set,
        Instruction::Delete => delete,
        Instruction::Expire => expire,
        Instruction::Ttl => ttl,
        Instruction::Persist => persist,
        Instruction::Exists => exists,
        Instruction::Type => key_type,
        Instruction::HSet => hset,
        Instruction::HGet => hget,
        Instruction::HDel => hdel,
        Instruction::HExists => hexists,
        Instruction::HLen => hlen,
        Instruction::LPush => lpush,
        Instruction::RPush => rpush,
        Instruction::LPop => lpop,
        Instruction::RPop => rpop,
        Instruction::LLen => llen,
        Instruction::LIndex => lindex,
        Instruction::SAdd => sadd,
        Instruction::SRem => srem,
        Instruction::SIsMember => sismember,
        Instruction::SCard => scard,
        Instruction::ZAdd => zadd,
        Instruction::ZScore => zscore,
        Instruction::ZRem => zrem,
        Instruction::ZCard => zcard,
    }
}

// Argument parsing and reply rendering

fn check_args(name: &str, args: &[Vec<u8>], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(Error::invalid_argument(format!(
            "wrong number of arguments for '{}': got {}",
            name,
            args.len()
        )));
    }
    Ok(())
}

fn parse_number<T: FromStr>(arg: &[u8], what: &str) -> Result<T> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::invalid_argument(format!("{} is not a valid number", what)))
}

fn parse_seconds(arg: &[u8]) -> Result<Duration> {
    Ok(Duration::from_secs(parse_number::<u64>(arg, "ttl")?))
}

fn integer(n: impl fmt::Display) -> Vec<u8> {
    n.to_string().into_bytes()
}

fn boolean(b: bool) -> Vec<u8> {
    if b { b"1".to_vec() } else { b"0".to_vec() }
}

fn found(value: Option<Vec<u8>>, what: &str) -> Result<Vec<u8>> {
    value.ok_or_else(|| Error::not_found(what.to_string()))
}

// Handlers

fn get(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("GET", args, 1, 1)?;
    found(s.get(&args[0])?, "key")
}

fn set(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("SET", args, 2, 3)?;
    let ttl = match args.get(2) {
        Some(arg) => Some(parse_seconds(arg)?),
        None => None,
    };
    s.set(&args[0], &args[1], ttl)?;
    Ok(b"OK".to_vec())
}

fn delete(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("DELETE", args, 1, 1)?;
    Ok(boolean(s.del(&args[0])?))
}

fn expire(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("EXPIRE", args, 2, 2)?;
    Ok(boolean(s.expire(&args[0], parse_seconds(&args[1])?)?))
}

fn ttl(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("TTL", args, 1, 1)?;
    let seconds = match s.ttl(&args[0])? {
        code @ (TTL_MISSING | TTL_PERSISTENT) => code,
        millis => millis / 1000,
    };
    Ok(integer(seconds))
}

fn persist(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("PERSIST", args, 1, 1)?;
    Ok(boolean(s.persist(&args[0])?))
}

fn exists(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("EXISTS", args, 1, 1)?;
    Ok(boolean(s.exists(&args[0])?))
}

fn key_type(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("TYPE", args, 1, 1)?;
    let name = s.key_type(&args[0])?.map_or("none", |t| t.name());
    Ok(name.as_bytes().to_vec())
}

fn hset(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("HSET", args, 3, 3)?;
    Ok(boolean(s.hset(&args[0], &args[1], &args[2])?))
}

fn hget(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("HGET", args, 2, 2)?;
    found(s.hget(&args[0], &args[1])?, "field")
}

fn hdel(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("HDEL", args, 2, 2)?;
    Ok(boolean(s.hdel(&args[0], &args[1])?))
}

fn hexists(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("HEXISTS", args, 2, 2)?;
    Ok(boolean(s.hexists(&args[0], &args[1])?))
}

fn hlen(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("HLEN", args, 1, 1)?;
    Ok(integer(s.hlen(&args[0])?))
}

fn lpush(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("LPUSH", args, 2, 2)?;
    Ok(integer(s.lpush(&args[0], &args[1])?))
}

fn rpush(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("RPUSH", args, 2, 2)?;
    Ok(integer(s.rpush(&args[0], &args[1])?))
}

fn lpop(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("LPOP", args, 1, 1)?;
    found(s.lpop(&args[0])?, "list is empty")
}

fn rpop(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("RPOP", args, 1, 1)?;
    found(s.rpop(&args[0])?, "list is empty")
}

fn llen(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("LLEN", args, 1, 1)?;
    Ok(integer(s.llen(&args[0])?))
}

fn lindex(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("LINDEX", args, 2, 2)?;
    let index = parse_number::<i64>(&args[1], "index")?;
    found(s.lindex(&args[0], index)?, "index out of range")
}

fn sadd(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("SADD", args, 2, 2)?;
    Ok(boolean(s.sadd(&args[0], &args[1])?))
}

fn srem(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("SREM", args, 2, 2)?;
    Ok(boolean(s.srem(&args[0], &args[1])?))
}

fn sismember(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("SISMEMBER", args, 2, 2)?;
    Ok(boolean(s.sismember(&args[0], &args[1])?))
}

fn scard(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("SCARD", args, 1, 1)?;
    Ok(integer(s.scard(&args[0])?))
}

fn zadd(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("ZADD", args, 3, 3)?;
    let score = parse_number::<f64>(&args[1], "score")?;
    Ok(boolean(s.zadd(&args[0], score, &args[2])?))
}

fn zscore(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("ZSCORE", args, 2, 2)?;
    let score = s.zscore(&args[0], &args[1])?;
    found(score.map(integer), "member")
}

fn zrem(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("ZREM", args, 2, 2)?;
    Ok(boolean(s.zrem(&args[0], &args[1])?))
}

fn zcard(s: &Structure, args: &[Vec<u8>]) -> Result<Vec<u8>> {
    check_args("ZCARD", args, 1, 1)?;
    Ok(integer(s.zcard(&args[0])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Options, DB};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn executor() -> (TempDir, Executor) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(DB::open(temp_dir.path(), Options::default()).unwrap());
        (temp_dir, Executor::new(Structure::new(db)))
    }

    fn args(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn data(result: CommandResult) -> String {
        assert!(result.success, "command failed: {:?}", result.error);
        String::from_utf8(result.data).unwrap()
    }

    #[test]
    fn test_instruction_from_str() {
        assert_eq!("get".parse::<Instruction>().unwrap(), Instruction::Get);
        assert_eq!("ZScore".parse::<Instruction>().unwrap(), Instruction::ZScore);
        assert_eq!("SISMEMBER".parse::<Instruction>().unwrap(), Instruction::SIsMember);
        assert!("FLUSHALL".parse::<Instruction>().is_err());

        for instruction in Instruction::ALL {
            assert_eq!(instruction.name().parse::<Instruction>().unwrap(), instruction);
        }
    }

    #[test]
    fn test_string_commands() {
        let (_dir, exec) = executor();

        assert_eq!(data(exec.exec(Instruction::Set, &args(&["k", "v"]))), "OK");
        assert_eq!(data(exec.exec(Instruction::Get, &args(&["k"]))), "v");
        assert_eq!(data(exec.exec(Instruction::Exists, &args(&["k"]))), "1");
        assert_eq!(data(exec.exec(Instruction::Type, &args(&["k"]))), "string");
        assert_eq!(data(exec.exec(Instruction::Ttl, &args(&["k"]))), "-1");

        assert_eq!(data(exec.exec(Instruction::Expire, &args(&["k", "100"]))), "1");
        let ttl: i64 = data(exec.exec(Instruction::Ttl, &args(&["k"]))).parse().unwrap();
        assert!(ttl > 90 && ttl <= 100);
        assert_eq!(data(exec.exec(Instruction::Persist, &args(&["k"]))), "1");

        assert_eq!(data(exec.exec(Instruction::Delete, &args(&["k"]))), "1");
        assert_eq!(data(exec.exec(Instruction::Ttl, &args(&["k"]))), "-2");
        assert_eq!(data(exec.exec(Instruction::Type, &args(&["k"]))), "none");

        let missing = exec.exec(Instruction::Get, &args(&["k"]));
        assert!(!missing.success);
        assert!(missing.error.unwrap().starts_with("Not found"));
    }

    #[test]
    fn test_composite_commands() {
        let (_dir, exec) = executor();

        assert_eq!(data(exec.exec(Instruction::HSet, &args(&["h", "f", "v"]))), "1");
        assert_eq!(data(exec.exec(Instruction::HGet, &args(&["h", "f"]))), "v");
        assert_eq!(data(exec.exec(Instruction::HLen, &args(&["h"]))), "1");
        assert_eq!(data(exec.exec(Instruction::HDel, &args(&["h", "f"]))), "1");
        assert_eq!(data(exec.exec(Instruction::HExists, &args(&["h", "f"]))), "0");

        assert_eq!(data(exec.exec(Instruction::RPush, &args(&["l", "a"]))), "1");
        assert_eq!(data(exec.exec(Instruction::LPush, &args(&["l", "b"]))), "2");
        assert_eq!(data(exec.exec(Instruction::LIndex, &args(&["l", "-1"]))), "a");
        assert_eq!(data(exec.exec(Instruction::LPop, &args(&["l"]))), "b");
        assert_eq!(data(exec.exec(Instruction::LLen, &args(&["l"]))), "1");
        assert_eq!(data(exec.exec(Instruction::RPop, &args(&["l"]))), "a");
        assert!(!exec.exec(Instruction::RPop, &args(&["l"])).success);

        assert_eq!(data(exec.exec(Instruction::SAdd, &args(&["s", "m"]))), "1");
        assert_eq!(data(exec.exec(Instruction::SIsMember, &args(&["s", "m"]))), "1");
        assert_eq!(data(exec.exec(Instruction::SCard, &args(&["s"]))), "1");
        assert_eq!(data(exec.exec(Instruction::SRem, &args(&["s", "m"]))), "1");

        assert_eq!(data(exec.exec(Instruction::ZAdd, &args(&["z", "2.5", "m"]))), "1");
        assert_eq!(data(exec.exec(Instruction::ZScore, &args(&["z", "m"]))), "2.5");
        assert_eq!(data(exec.exec(Instruction::ZCard, &args(&["z"]))), "1");
        assert_eq!(data(exec.exec(Instruction::ZRem, &args(&["z", "m"]))), "1");
    }

    #[test]
    fn test_errors_are_reported() {
        let (_dir, exec) = executor();

        let result = exec.exec(Instruction::HSet, &args(&["h", "f"]));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("wrong number of arguments"));

        let result = exec.exec(Instruction::ZAdd, &args(&["z", "high", "m"]));
        assert!(result.error.unwrap().contains("score is not a valid number"));

        exec.exec(Instruction::Set, &args(&["plain", "v"]));
        let result = exec.exec(Instruction::SAdd, &args(&["plain", "m"]));
        assert_eq!(
            result.error.as_deref(),
            Some("Wrong type: expected set, found string")
        );
        assert!(result.data.is_empty());
    }
}
