//! Request/response transport over loopback TCP.

use bluepacket::rpc::{bind, RpcClient, RpcConfig, RpcError, RpcServer};
use bluepacket::{parse, BluePacket, Codec, DynamicPacket, ResolvedSchema, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SCHEMA: &str = "\
Ping:
  seq int

Pong:
  seq int

Failure:
  reason string
";

fn codec() -> Codec {
    Codec::new(ResolvedSchema::resolve(parse(SCHEMA).unwrap()).unwrap())
}

fn hash(codec: &Codec, name: &str) -> i64 {
    codec.new_packet(name).unwrap().packet_hash()
}

fn server(codec: &Codec) -> RpcServer {
    let mut server = RpcServer::new(Arc::new(codec.registry().unwrap()));
    let pongs = codec.clone();
    server.on_receive(hash(codec, "Ping"), move |request| {
        let ping = request
            .as_any()
            .downcast_ref::<DynamicPacket>()
            .ok_or_else(|| anyhow::anyhow!("unexpected binding"))?;
        let seq = ping.get("seq").and_then(Value::as_i64).unwrap_or(0);
        let mut pong = pongs.new_packet("Pong")?;
        pong.set("seq", seq + 1)?;
        Ok(Some(Box::new(pong) as Box<dyn BluePacket>))
    });
    let failures = codec.clone();
    server.on_error(move |e| {
        let mut failure = failures.new_packet("Failure").ok()?;
        failure.set("reason", e.to_string()).ok()?;
        Some(Box::new(failure) as Box<dyn BluePacket>)
    });
    server
}

#[test]
fn ping_pong_over_loopback() {
    let codec = codec();
    let listener = bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let server = server(&codec);
    let handle = thread::spawn(move || server.run(&listener, 2, Some(2)));

    let mut config = RpcConfig::new(address);
    config.read_timeout = Some(Duration::from_secs(10));
    let client = RpcClient::new(config, Arc::new(codec.registry().unwrap()));

    let mut ping = codec.new_packet("Ping").unwrap();
    ping.set("seq", 41).unwrap();
    let response = client.send(&ping).unwrap().expect("pong");
    assert_eq!(response.type_name(), "Pong");
    assert_eq!(response.to_debug_string(), "{Pong seq=42}");

    let stray = codec.new_packet("Pong").unwrap();
    let response = client.send(&stray).unwrap().expect("failure");
    assert_eq!(response.to_debug_string(), "{Failure reason=\"No handler for packet Pong\"}");

    handle.join().expect("server thread").unwrap();
}

#[test]
fn execute_without_network() {
    let codec = codec();
    let server = server(&codec);
    let mut ping = codec.new_packet("Ping").unwrap();
    ping.set("seq", 1).unwrap();
    let response = server.execute(&ping.serialize().unwrap()).unwrap().expect("pong");
    let pong = response.as_any().downcast_ref::<DynamicPacket>().expect("dynamic");
    assert_eq!(pong.get("seq"), Some(&Value::Int(2)));

    assert!(matches!(server.execute(&[0u8; 8]), Err(RpcError::NullRequest)));
    assert!(matches!(server.execute(&[1u8; 8]), Err(RpcError::Codec(_))));
}

#[test]
fn silent_server_gives_empty_response() {
    let codec = codec();
    let listener = bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let server = RpcServer::new(Arc::new(codec.registry().unwrap()));
    let handle = thread::spawn(move || server.run(&listener, 1, Some(1)));

    let client = RpcClient::new(RpcConfig::new(address), Arc::new(codec.registry().unwrap()));
    let ping = codec.new_packet("Ping").unwrap();
    assert!(matches!(client.send(&ping), Err(RpcError::EmptyResponse)));
    handle.join().expect("server thread").unwrap();
}
