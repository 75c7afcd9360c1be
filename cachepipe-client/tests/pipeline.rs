use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use cachepipe_client::coerce::{field_map, positional_fields};
use cachepipe_client::{
    ConnectionConfig, ConnectionRegistry, Pipeline, PipelineError, StoreConfig,
};

type Handler = fn(usize, &[Vec<u8>], &mut TcpStream);

/// Accepts one connection per entry in `sessions`; each entry is how many
/// commands to read on that connection before moving on. Every command seen
/// is forwarded on the returned channel.
fn spawn_server(sessions: Vec<usize>, handler: Handler) -> (String, Receiver<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let mut idx = 0;
        for expected in sessions {
            let (mut stream, _) = listener.accept().expect("accept");
            let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            for _ in 0..expected {
                let args = match read_command(&mut reader) {
                    Ok(args) => args,
                    Err(_) => break,
                };
                let text = args
                    .iter()
                    .map(|arg| String::from_utf8_lossy(arg).into_owned())
                    .collect();
                let _ = tx.send(text);
                handler(idx, &args, &mut stream);
                idx += 1;
            }
        }
    });

    (addr, rx)
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
    if line.first() != Some(&b'*') {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
        if line.first() != Some(&b'$') {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "missing crlf"));
        }
        args.push(data);
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<Option<()>> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "digit"))
}

fn write_simple(stream: &mut TcpStream, msg: &str) {
    let _ = write!(stream, "+{}\r\n", msg);
    let _ = stream.flush();
}

fn write_integer(stream: &mut TcpStream, value: i64) {
    let _ = write!(stream, ":{}\r\n", value);
    let _ = stream.flush();
}

fn write_error(stream: &mut TcpStream, msg: &str) {
    let _ = write!(stream, "-{}\r\n", msg);
    let _ = stream.flush();
}

fn write_array(stream: &mut TcpStream, items: &[Option<&str>]) {
    let mut out = format!("*{}\r\n", items.len());
    for item in items {
        match item {
            Some(text) => out.push_str(&format!("${}\r\n{}\r\n", text.len(), text)),
            None => out.push_str("$-1\r\n"),
        }
    }
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.flush();
}

fn registry_for(addr: String, connection: ConnectionConfig) -> ConnectionRegistry {
    let mut config = StoreConfig::default().with_connection(
        "cache",
        ConnectionConfig {
            addr,
            read_timeout_ms: Some(1_000),
            write_timeout_ms: Some(1_000),
            connect_timeout_ms: Some(1_000),
            ..connection
        },
    );
    config.default_connection = "cache".to_string();
    ConnectionRegistry::new(config)
}

#[test]
fn pipeline_round_trip_over_tcp() {
    let (addr, commands) = spawn_server(vec![5], |idx, _args, stream| match idx {
        0 => write_simple(stream, "OK"),
        1 => write_integer(stream, 1),
        2 => write_array(
            stream,
            &[Some("name"), Some("Ann"), Some("gender"), Some("")],
        ),
        3 => write_array(stream, &[Some("Ann"), None]),
        _ => write_integer(stream, 0),
    });

    let registry = registry_for(addr, ConnectionConfig::default());
    let mut pipe = Pipeline::new(&registry, None).expect("pipeline");
    pipe.hash_multi_set("emp:1", [("name", "Ann"), ("gender", "")])
        .expect("hmset");
    pipe.expire("emp:1", Duration::from_secs(3600)).expect("expire");
    pipe.hash_get_all("emp:1").expect("hgetall");
    pipe.hash_multi_get("emp:1", &["name", "address"]).expect("hmget");
    pipe.hash_set_if_absent("emp:1", "name", "Bob").expect("hsetnx");
    assert_eq!(pipe.command_count(), 5);
    pipe.execute().expect("execute");

    let sent: Vec<Vec<String>> = commands.iter().take(5).collect();
    assert_eq!(sent[0], vec!["HMSET", "emp:1", "name", "Ann", "gender", ""]);
    assert_eq!(sent[1], vec!["EXPIRE", "emp:1", "3600"]);
    assert_eq!(sent[2], vec!["HGETALL", "emp:1"]);
    assert_eq!(sent[3], vec!["HMGET", "emp:1", "name", "address"]);
    assert_eq!(sent[4], vec!["HSETNX", "emp:1", "name", "Bob"]);

    assert_eq!(pipe.take_hash_multi_set(), "OK");
    assert!(pipe.take_expire());
    assert!(!pipe.take_hash_set_if_absent());

    let all = pipe.take(cachepipe_client::ResultTag::HashGetAll);
    let err = field_map(&all, &["name", "gender"], &["address"]).unwrap_err();
    match err {
        PipelineError::MissingField(fields) => {
            assert_eq!(fields.missing(), ["gender".to_string()]);
            assert_eq!(fields.partial()["name"], "Ann");
        }
        other => panic!("unexpected error {:?}", other),
    }

    let positional = pipe.take(cachepipe_client::ResultTag::HashMultiGet);
    let err = positional_fields(&positional, &["name", "address"]).unwrap_err();
    assert_eq!(err.partial().map(|p| p["name"].clone()), Some("Ann".to_string()));
}

#[test]
fn handshake_authenticates_and_selects_db() {
    let (addr, commands) = spawn_server(vec![3], |idx, _args, stream| match idx {
        0 | 1 => write_simple(stream, "OK"),
        _ => write_integer(stream, 2),
    });

    let registry = registry_for(
        addr,
        ConnectionConfig {
            password: Some("secret".to_string()),
            db: 3,
            ..ConnectionConfig::default()
        },
    );
    let mut pipe = Pipeline::new(&registry, Some("cache")).expect("pipeline");
    pipe.list_push("queue", &["a", "b"]).expect("rpush");
    pipe.execute().expect("execute");

    let sent: Vec<Vec<String>> = commands.iter().take(3).collect();
    assert_eq!(sent[0], vec!["AUTH", "secret"]);
    assert_eq!(sent[1], vec!["SELECT", "3"]);
    assert_eq!(sent[2], vec!["RPUSH", "queue", "a", "b"]);
    assert_eq!(pipe.take_list_push(), 2);
}

#[test]
fn rejected_auth_is_connection_error() {
    let (addr, _commands) = spawn_server(vec![1], |_idx, _args, stream| {
        write_error(stream, "WRONGPASS invalid password");
    });

    let registry = registry_for(
        addr,
        ConnectionConfig {
            password: Some("bad".to_string()),
            ..ConnectionConfig::default()
        },
    );
    let err = Pipeline::new(&registry, None).err().expect("connection error");
    assert!(matches!(err, PipelineError::Connection { ref name, .. } if name == "cache"));
}

#[test]
fn unknown_connection_name_is_connection_error() {
    let registry = ConnectionRegistry::new(StoreConfig::default());
    let err = Pipeline::new(&registry, Some("missing")).err().expect("connection error");
    assert!(matches!(err, PipelineError::Connection { .. }));
}

#[test]
fn failed_execute_reconnects_on_retry() {
    // First session reads the command and hangs up without answering.
    let (addr, commands) = spawn_server(vec![1, 1], |idx, _args, stream| {
        if idx == 0 {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        } else {
            write_integer(stream, 1);
        }
    });

    let registry = registry_for(addr, ConnectionConfig::default());
    let mut pipe = Pipeline::new(&registry, None).expect("pipeline");
    pipe.delete("stale").expect("del");

    let err = pipe.execute().unwrap_err();
    assert!(matches!(err, PipelineError::Execution { commands: 1, .. }));
    assert!(!pipe.is_executed());

    pipe.execute().expect("retry");
    assert!(pipe.is_executed());
    assert_eq!(pipe.take_delete(), 1);

    let sent: Vec<Vec<String>> = commands.iter().take(2).collect();
    assert_eq!(sent[0], sent[1]);
}
