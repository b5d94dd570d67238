//! Minimal RESP2 client: just the commands the game issues, over one TCP
//! connection behind a mutex. One command is one lock acquisition, so
//! request/reply pairs never interleave between tasks.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::StoreError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, PartialEq)]
pub enum Reply {
    Simple(String),
    Int(i64),
    Bulk(String),
    Nil,
    Array(Vec<Reply>),
}

#[derive(Debug)]
pub struct RespStore {
    conn: Mutex<BufStream<TcpStream>>,
}

impl RespStore {
    pub async fn connect(addr: &str, password: Option<&str>) -> Result<Self, StoreError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| StoreError::Protocol("connect timed out".to_string()))??;
        let store = Self {
            conn: Mutex::new(BufStream::new(stream)),
        };
        if let Some(pw) = password {
            expect_simple(store.cmd(&["AUTH", pw]).await?)?;
        }
        store.ping().await?;
        Ok(store)
    }

    async fn cmd(&self, args: &[&str]) -> Result<Reply, StoreError> {
        let mut conn = self.conn.lock().await;
        conn.write_all(&encode_command(args)).await?;
        conn.flush().await?;
        read_reply(&mut *conn).await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let pong = expect_simple(self.cmd(&["PING"]).await?)?;
        if pong != "PONG" {
            return Err(StoreError::Protocol(format!("unexpected ping reply: {pong}")));
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        expect_bulk(self.cmd(&["GET", key]).await?)
    }

    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        let reply = match ttl_secs {
            Some(ttl) => {
                let ttl = ttl.to_string();
                self.cmd(&["SET", key, value, "EX", &ttl]).await?
            }
            None => self.cmd(&["SET", key, value]).await?,
        };
        expect_simple(reply)?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<bool, StoreError> {
        Ok(expect_int(self.cmd(&["DEL", key]).await?)? > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(expect_int(self.cmd(&["EXISTS", key]).await?)? > 0)
    }

    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{prefix}*");
        let items = expect_array(self.cmd(&["KEYS", &pattern]).await?)?;
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Reply::Bulk(s) => keys.push(s),
                other => return Err(unexpected(other)),
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        expect_bulk(self.cmd(&["HGET", key, field]).await?)
    }

    pub async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut args = Vec::with_capacity(2 + fields.len() * 2);
        args.push("HSET");
        args.push(key);
        for (f, v) in fields {
            args.push(*f);
            args.push(v.as_str());
        }
        expect_int(self.cmd(&args).await?)?;
        Ok(())
    }

    pub async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let items = expect_array(self.cmd(&["HGETALL", key]).await?)?;
        pairs_to_map(items)
    }

    pub async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let delta = delta.to_string();
        expect_int(self.cmd(&["HINCRBY", key, field, &delta]).await?)
    }

    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let score = score.to_string();
        expect_int(self.cmd(&["ZADD", key, &score, member]).await?)?;
        Ok(())
    }

    pub async fn ztop(&self, key: &str, n: usize) -> Result<Vec<(String, i64)>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let stop = (n - 1).to_string();
        let items =
            expect_array(self.cmd(&["ZREVRANGE", key, "0", &stop, "WITHSCORES"]).await?)?;
        let mut out = Vec::with_capacity(items.len() / 2);
        let mut it = items.into_iter();
        while let Some(member) = it.next() {
            let (Reply::Bulk(member), Some(Reply::Bulk(score))) = (member, it.next()) else {
                return Err(StoreError::Protocol("odd ZREVRANGE reply".to_string()));
            };
            // Redis reports scores as floats even for integer members.
            let score = score
                .parse::<f64>()
                .map_err(|_| StoreError::Protocol(format!("bad score: {score}")))?;
            out.push((member, score as i64));
        }
        Ok(out)
    }
}

fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for a in args {
        out.extend_from_slice(format!("${}\r\n", a.len()).as_bytes());
        out.extend_from_slice(a.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_line<S: AsyncBufRead + Unpin>(s: &mut S) -> Result<String, StoreError> {
    let mut line = String::new();
    let n = s.read_line(&mut line).await?;
    if n == 0 {
        return Err(StoreError::Protocol("connection closed".to_string()));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

async fn read_bulk<S: AsyncBufRead + Unpin>(s: &mut S, len: usize) -> Result<String, StoreError> {
    let mut buf = vec![0u8; len + 2];
    s.read_exact(&mut buf).await?;
    if &buf[len..] != b"\r\n" {
        return Err(StoreError::Protocol("bulk string missing CRLF".to_string()));
    }
    buf.truncate(len);
    String::from_utf8(buf).map_err(|_| StoreError::Protocol("bulk string not utf-8".to_string()))
}

async fn read_reply<S: AsyncBufRead + Unpin>(s: &mut S) -> Result<Reply, StoreError> {
    let line = read_line(s).await?;
    let Some(count) = line.strip_prefix('*') else {
        return scalar_from_line(s, &line).await;
    };
    let count = count
        .parse::<i64>()
        .map_err(|_| StoreError::Protocol(format!("bad array length: {count}")))?;
    if count <= 0 {
        return Ok(Reply::Array(Vec::new()));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let line = read_line(s).await?;
        // Nested arrays never occur for the commands we issue.
        items.push(scalar_from_line(s, &line).await?);
    }
    Ok(Reply::Array(items))
}

/// Parse a non-array reply whose header line has already been read; bulk
/// string bodies are pulled from the stream.
async fn scalar_from_line<S: AsyncBufRead + Unpin>(
    s: &mut S,
    line: &str,
) -> Result<Reply, StoreError> {
    let Some(tag) = line.as_bytes().first().copied() else {
        return Err(StoreError::Protocol("empty reply line".to_string()));
    };
    let rest = &line[1..];
    match tag {
        b'+' => Ok(Reply::Simple(rest.to_string())),
        b'-' => Err(server_error(rest)),
        b':' => rest
            .parse::<i64>()
            .map(Reply::Int)
            .map_err(|_| StoreError::Protocol(format!("bad integer reply: {rest}"))),
        b'$' => {
            let len = rest
                .parse::<i64>()
                .map_err(|_| StoreError::Protocol(format!("bad bulk length: {rest}")))?;
            if len < 0 {
                Ok(Reply::Nil)
            } else {
                Ok(Reply::Bulk(read_bulk(s, len as usize).await?))
            }
        }
        other => Err(StoreError::Protocol(format!(
            "unexpected reply tag: 0x{other:02x}"
        ))),
    }
}

fn server_error(msg: &str) -> StoreError {
    if msg.starts_with("WRONGTYPE") {
        StoreError::WrongType
    } else if msg.contains("not an integer") {
        StoreError::NotAnInteger
    } else {
        StoreError::Server(msg.to_string())
    }
}

fn unexpected(r: Reply) -> StoreError {
    StoreError::Protocol(format!("unexpected reply: {r:?}"))
}

fn expect_simple(r: Reply) -> Result<String, StoreError> {
    match r {
        Reply::Simple(s) => Ok(s),
        other => Err(unexpected(other)),
    }
}

fn expect_int(r: Reply) -> Result<i64, StoreError> {
    match r {
        Reply::Int(n) => Ok(n),
        other => Err(unexpected(other)),
    }
}

fn expect_bulk(r: Reply) -> Result<Option<String>, StoreError> {
    match r {
        Reply::Bulk(s) => Ok(Some(s)),
        Reply::Nil => Ok(None),
        other => Err(unexpected(other)),
    }
}

fn expect_array(r: Reply) -> Result<Vec<Reply>, StoreError> {
    match r {
        Reply::Array(items) => Ok(items),
        other => Err(unexpected(other)),
    }
}

fn pairs_to_map(items: Vec<Reply>) -> Result<BTreeMap<String, String>, StoreError> {
    let mut out = BTreeMap::new();
    let mut it = items.into_iter();
    while let Some(field) = it.next() {
        let (Reply::Bulk(field), Some(Reply::Bulk(value))) = (field, it.next()) else {
            return Err(StoreError::Protocol("odd HGETALL reply".to_string()));
        };
        out.insert(field, value);
    }
    Ok(out)
}
