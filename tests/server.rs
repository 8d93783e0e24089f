//! End-to-end tests against a live bank node on an ephemeral port.

use peerbank::{DurabilityPolicy, Ledger, NodeConfig, Server, SnapshotStore};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const BANK_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

async fn start_node(dir: &TempDir, idle_timeout: Duration) -> (SocketAddr, JoinHandle<()>) {
    let config = NodeConfig {
        port: 0,
        bank_addr: BANK_ADDR,
        idle_timeout,
        data_file: dir.path().join("bank_data.json"),
        durability: DurabilityPolicy::BestEffort,
        max_connections: 8,
    };

    let store = SnapshotStore::new(&config.data_file);
    let ledger = Arc::new(Ledger::open(store, config.durability));
    let server = Server::bind(&config, ledger).await.expect("bind bank node");
    let port = server.local_addr().expect("local addr").port();

    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    (SocketAddr::from((Ipv4Addr::LOCALHOST, port)), handle)
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to bank node");
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    /// Send one command line and wait for its response line.
    async fn send(&mut self, command: &str) -> String {
        self.send_raw(&format!("{}\n", command)).await;
        self.read_line()
            .await
            .expect("server closed the connection")
    }

    async fn send_raw(&mut self, bytes: &str) {
        self.write
            .write_all(bytes.as_bytes())
            .await
            .expect("write to bank node");
        self.write.flush().await.expect("flush to bank node");
    }

    /// `None` means the server closed the connection.
    async fn read_line(&mut self) -> Option<String> {
        self.lines.next_line().await.expect("read from bank node")
    }
}

#[tokio::test]
async fn bank_code_reports_the_configured_address() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_secs(5)).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.send("BC").await, "BC 10.0.0.5");
}

#[tokio::test]
async fn full_account_lifecycle() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_secs(5)).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.send("AC").await, "AC 10000/10.0.0.5");
    assert_eq!(client.send("AD 10000/10.0.0.5 500").await, "AD");
    assert_eq!(client.send("AB 10000/10.0.0.5").await, "AB 500");

    assert_eq!(
        client.send("AW 10000/10.0.0.5 600").await,
        "ER Insufficient funds"
    );
    assert_eq!(client.send("AB 10000/10.0.0.5").await, "AB 500");

    assert_eq!(
        client.send("AR 10000/10.0.0.5").await,
        "ER Cannot remove an account that still holds funds"
    );
    assert_eq!(client.send("AW 10000/10.0.0.5 500").await, "AW");
    assert_eq!(client.send("AR 10000/10.0.0.5").await, "AR");
    assert_eq!(
        client.send("AB 10000/10.0.0.5").await,
        "ER Account does not exist"
    );
}

#[tokio::test]
async fn rejected_lines_get_error_responses() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_secs(5)).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.send("XY").await, "ER Unknown command");
    assert_eq!(client.send("BC extra").await, "ER BC has wrong format");
    assert_eq!(
        client.send("AD 10000/9.9.9.9 500").await,
        "ER Bank does not match"
    );
    assert_eq!(
        client.send("AD 10000/10.0.0.5 abc").await,
        "ER account number and amount have invalid format"
    );
    assert_eq!(
        client.send("AB 123/10.0.0.5").await,
        "ER Account number has invalid format"
    );

    // the connection survives every rejection
    assert_eq!(client.send("BN").await, "BN 0");
}

#[tokio::test]
async fn aggregates_span_every_account() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_secs(5)).await;

    let mut first = TestClient::connect(addr).await;
    let mut second = TestClient::connect(addr).await;

    assert_eq!(first.send("AC").await, "AC 10000/10.0.0.5");
    assert_eq!(second.send("AC").await, "AC 10001/10.0.0.5");
    assert_eq!(first.send("AD 10000/10.0.0.5 300").await, "AD");
    assert_eq!(second.send("AD 10001/10.0.0.5 42").await, "AD");

    assert_eq!(first.send("BA").await, "BA 342");
    assert_eq!(second.send("BN").await, "BN 2");
}

#[tokio::test]
async fn blank_lines_get_no_response() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_secs(5)).await;
    let mut client = TestClient::connect(addr).await;

    client.send_raw("\n\r\n").await;
    assert_eq!(client.send("BC").await, "BC 10.0.0.5");
}

#[tokio::test]
async fn crlf_line_endings_are_accepted() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_secs(5)).await;
    let mut client = TestClient::connect(addr).await;

    client.send_raw("bc\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("BC 10.0.0.5"));
}

#[tokio::test]
async fn idle_connections_are_closed() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_millis(500)).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.send("BC").await, "BC 10.0.0.5");

    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(client.read_line().await, None);
}

#[tokio::test]
async fn activity_restarts_the_idle_clock() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_node(&dir, Duration::from_millis(1_000)).await;
    let mut client = TestClient::connect(addr).await;

    // stay connected longer than the timeout by sending within each window
    sleep(Duration::from_millis(600)).await;
    assert_eq!(client.send("BC").await, "BC 10.0.0.5");
    sleep(Duration::from_millis(600)).await;
    assert_eq!(client.send("BC").await, "BC 10.0.0.5");

    sleep(Duration::from_millis(3_000)).await;
    assert_eq!(client.read_line().await, None);
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = TempDir::new().unwrap();

    let (addr, server) = start_node(&dir, Duration::from_secs(5)).await;
    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.send("AC").await, "AC 10000/10.0.0.5");
    assert_eq!(client.send("AD 10000/10.0.0.5 500").await, "AD");
    drop(client);
    server.abort();

    let (addr, _server) = start_node(&dir, Duration::from_secs(5)).await;
    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.send("AB 10000/10.0.0.5").await, "AB 500");
    assert_eq!(client.send("BN").await, "BN 1");
    assert_eq!(client.send("AC").await, "AC 10001/10.0.0.5");
}
