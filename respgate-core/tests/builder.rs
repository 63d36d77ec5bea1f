use std::io::{BufRead, BufReader, Cursor, Read};

use respgate_common::{GatewayConfig, GatewayError};
use respgate_core::{
    classify, compile_locations, Classification, Location, QueryTemplate, Variables,
};

type Reader<'a> = BufReader<Cursor<&'a [u8]>>;

/// Reads every RESP command in `payload`, the way a backend would.
fn read_commands(payload: &[u8]) -> std::io::Result<Vec<Vec<Vec<u8>>>> {
    let mut reader = BufReader::new(Cursor::new(payload));
    let mut commands = Vec::new();
    let mut line = Vec::new();
    while read_line(&mut reader, &mut line)?.is_some() {
        if line.first() != Some(&b'*') {
            return Err(invalid("expected array"));
        }
        let count = parse_usize(&line[1..])?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            read_line(&mut reader, &mut line)?.ok_or_else(|| invalid("eof"))?;
            if line.first() != Some(&b'$') {
                return Err(invalid("expected bulk"));
            }
            let len = parse_usize(&line[1..])?;
            let mut data = vec![0u8; len];
            reader.read_exact(&mut data)?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf)?;
            if crlf != [b'\r', b'\n'] {
                return Err(invalid("missing crlf"));
            }
            args.push(data);
        }
        commands.push(args);
    }
    Ok(commands)
}

fn read_line(reader: &mut Reader<'_>, buf: &mut Vec<u8>) -> std::io::Result<Option<()>> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Ok(None);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    if data.is_empty() || (data.len() > 1 && data[0] == b'0') {
        return Err(invalid("bad length"));
    }
    let mut value = 0usize;
    for &b in data {
        if !b.is_ascii_digit() {
            return Err(invalid("digit"));
        }
        value = value * 10 + (b - b'0') as usize;
    }
    Ok(value)
}

fn invalid(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

fn config(json: &str) -> GatewayConfig {
    GatewayConfig::from_json_str(json).expect("config")
}

#[test]
fn multi_query_reaches_backend_in_order() {
    let locations = compile_locations(&config(
        r#"{ "locations": { "/swap": { "queries": [
            ["set", "$key", "$value"],
            ["expire", "$key", "${ttl}"],
            ["get", "$key"]
        ] } } }"#,
    ))
    .expect("compile");

    let vars = Variables::new()
        .with("key", "session:7")
        .with("value", vec![0u8, b'\r', b'\n', 255])
        .with("ttl", "30");
    let request = locations["/swap"].build(&vars).expect("build");
    assert_eq!(request.expected_reply_count(), 3);

    let commands = read_commands(request.payload()).expect("parse");
    assert_eq!(
        commands,
        vec![
            vec![b"set".to_vec(), b"session:7".to_vec(), vec![0u8, b'\r', b'\n', 255]],
            vec![b"expire".to_vec(), b"session:7".to_vec(), b"30".to_vec()],
            vec![b"get".to_vec(), b"session:7".to_vec()],
        ]
    );
}

#[test]
fn empty_arguments_keep_their_slot() {
    let template = QueryTemplate::multi(&[vec!["hset", "h", "", "$v"]]).expect("template");
    let location = Location::from_template(template);
    let request = location.build(&Variables::new().with("v", "")).expect("build");

    assert_eq!(
        request.payload(),
        b"*4\r\n$4\r\nhset\r\n$1\r\nh\r\n$0\r\n\r\n$0\r\n\r\n"
    );
    let commands = read_commands(request.payload()).expect("parse");
    assert_eq!(commands[0].len(), 4);
}

#[test]
fn large_arguments_are_framed_exactly() {
    let template = QueryTemplate::multi(&[vec!["set", "k", "$blob"]]).expect("template");
    let location = Location::from_template(template);

    for len in [9usize, 10, 99, 100, 999, 1000, 65_536] {
        let blob = vec![b'z'; len];
        let request = location
            .build(&Variables::new().with("blob", blob.clone()))
            .expect("build");
        let commands = read_commands(request.payload()).expect("parse");
        assert_eq!(commands, vec![vec![b"set".to_vec(), b"k".to_vec(), blob]]);
    }
}

#[test]
fn raw_query_count_from_request() {
    let locations = compile_locations(&config(
        r#"{ "locations": { "/raw": { "raw_query": "$q", "raw_query_count": "$n" } } }"#,
    ))
    .expect("compile");
    let raw = &locations["/raw"];

    let ok = Variables::new()
        .with("q", "*1\r\n$4\r\nping\r\n*1\r\n$4\r\nping\r\n*1\r\n$4\r\nping\r\n")
        .with("n", "3");
    let request = raw.build(&ok).expect("build");
    assert_eq!(request.expected_reply_count(), 3);
    assert_eq!(read_commands(request.payload()).expect("parse").len(), 3);

    for bad in ["0", "abc"] {
        let vars = Variables::new().with("q", "*1\r\n$4\r\nping\r\n").with("n", bad);
        assert!(matches!(
            raw.build(&vars),
            Err(GatewayError::InvalidReplyCount(_))
        ));
    }
}

#[test]
fn conflicting_directives_never_reach_request_time() {
    let err = compile_locations(&config(
        r#"{ "locations": {
            "/ok": { "queries": [["ping"]] },
            "/bad": { "literal_raw_query": "*1\r\n$4\r\nping\r\n", "raw_query": "$q" }
        } }"#,
    ))
    .unwrap_err();
    assert!(err.is_config());
    assert!(matches!(err, GatewayError::ConfigConflict { .. }));
}

#[test]
fn locations_are_shared_across_threads() {
    let template = QueryTemplate::multi(&[vec!["get", "$key"]]).expect("template");
    let location = std::sync::Arc::new(Location::from_template(template));

    let handles: Vec<_> = (0..8)
        .map(|idx| {
            let location = location.clone();
            std::thread::spawn(move || {
                let key = format!("key:{}", idx);
                let request = location
                    .build(&Variables::new().with("key", key.clone()))
                    .expect("build");
                let commands = read_commands(request.payload()).expect("parse");
                assert_eq!(commands[0][1], key.into_bytes());
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread");
    }
}

#[test]
fn classification_of_backend_replies() {
    assert_eq!(classify(b""), Classification::NeedMoreBytes);
    assert_eq!(classify(b"+OK\r\n"), Classification::Accepted);
    assert!(matches!(classify(b"!OK\r\n"), Classification::Rejected(_)));
}
