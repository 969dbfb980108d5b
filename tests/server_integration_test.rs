// End-to-end tests against a real listener on an ephemeral port

use greet_server::{client, Config, ServeMode, Server, ServerHandle, RESPONSE};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing_subscriber::fmt::MakeWriter;

/// Log sink shared between the subscriber and the test body.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

async fn start_server(mode: ServeMode, delay: Duration) -> ServerHandle {
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        mode,
        delay,
        ..Config::default()
    };
    Server::bind(&config).await.unwrap().start()
}

#[tokio::test]
async fn test_end_to_end_hello() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = start_server(ServeMode::Sequential, Duration::from_millis(10)).await;
    let port = server.local_addr().port();

    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    let client_addr = stream.local_addr().unwrap();
    stream.write_all(b"hello\n").await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, RESPONSE);

    server.stop().await.unwrap();

    let output = logs.contents();
    assert!(output.contains(&client_addr.to_string()), "{output}");
    assert!(output.contains("line=hello"), "{output}");
    assert!(output.contains(&format!("serving at port {port}")), "{output}");
}

#[tokio::test]
async fn test_half_close_without_input() {
    let server = start_server(ServeMode::Sequential, Duration::ZERO).await;

    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, RESPONSE);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_fixed_response_for_any_input() {
    let server = start_server(ServeMode::Sequential, Duration::ZERO).await;
    let addr = server.local_addr();

    let long_line = "x".repeat(64 * 1024 - 1);
    let inputs = ["", "   ", "\t\x0b\x0c", "GET / HTTP/1.1", "héllo wörld", long_line.as_str()];

    for input in inputs {
        let response = client::send_line(addr, input).await.unwrap();
        assert_eq!(&response[..], RESPONSE, "input {:?}", input);
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_many_sequential_connections() {
    let server = start_server(ServeMode::Sequential, Duration::ZERO).await;
    let addr = server.local_addr();

    for i in 0..500 {
        client::greet(addr, &format!("request {i}")).await.unwrap();
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_client_does_not_stop_server() {
    let server = start_server(ServeMode::Sequential, Duration::from_millis(100)).await;
    let addr = server.local_addr();

    // Connect and go away before the server reads or replies.
    let stream = TcpStream::connect(addr).await.unwrap();
    drop(stream);

    client::greet(addr, "still there?").await.unwrap();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_sees_eof_after_response() {
    let server = start_server(ServeMode::Concurrent, Duration::ZERO).await;

    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream.write_all(b"bye\n").await.unwrap();

    let mut response = vec![0u8; RESPONSE.len()];
    stream.read_exact(&mut response).await.unwrap();
    assert_eq!(response, RESPONSE);

    let mut rest = [0u8; 16];
    assert_eq!(stream.read(&mut rest).await.unwrap(), 0);

    server.stop().await.unwrap();
}
