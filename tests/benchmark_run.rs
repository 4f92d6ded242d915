//! Benchmark runs and connect retries against real sockets

use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tlsperf::harness::{self, ClientSettings, ServerSettings};
use tlsperf::net::{self, Endpoint, RetryPolicy, TransportOptions};
use tlsperf::protocol::RESPONSES;
use tlsperf::tls::{DemoPki, DemoPkiPaths, Identity};
use tlsperf::{BenchmarkConfig, Error, KeyExchangeGroups, RunBudget, SessionContext};

fn pki() -> (TempDir, DemoPkiPaths) {
    let dir = tempfile::tempdir().unwrap();
    let paths = DemoPki::generate().unwrap().write_to(dir.path()).unwrap();
    (dir, paths)
}

fn groups() -> KeyExchangeGroups {
    "P-256:X25519".parse().unwrap()
}

/// Port with nothing listening on it
fn closed_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

fn client_settings(paths: &DemoPkiPaths, endpoint: Endpoint, secs: u64) -> ClientSettings {
    ClientSettings {
        endpoint,
        transport: TransportOptions::default(),
        trust_roots: vec![paths.root_cert.clone()],
        identity: Identity::new(&paths.client_cert, &paths.client_key),
        ciphersuites: None,
        cipher_list: None,
        groups: groups(),
        bench: BenchmarkConfig::new(secs, false).unwrap(),
    }
}

#[test]
fn test_timed_run_counts_every_served_connection() {
    let (_dir, paths) = pki();
    let listener = net::listen(&Endpoint::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
    let endpoint = listener.local_endpoint().unwrap();

    let server_ctx = SessionContext::server()
        .identity(Identity::new(&paths.server_cert, &paths.server_key))
        .build()
        .unwrap();

    // Serve until a connection fails; the last one is a bare TCP connect
    let server = thread::spawn(move || {
        let mut served = 0u64;
        while harness::server_cycle(
            &server_ctx,
            &listener,
            &TransportOptions::default(),
            &groups(),
            &RESPONSES[..1],
        )
        .is_ok()
        {
            served += 1;
        }
        served
    });

    let started = Instant::now();
    let result = harness::run_client(&client_settings(&paths, endpoint, 1)).unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));

    assert!(result.count > 0);
    assert_eq!(result.window, Duration::from_secs(1));
    assert!(result.rate() > 0.0);

    drop(TcpStream::connect(endpoint.socket_addr()).unwrap());
    assert_eq!(server.join().unwrap(), result.count);
}

#[test]
fn test_serve_counted_connections() {
    let (_dir, paths) = pki();
    let listener = net::listen(&Endpoint::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
    let endpoint = listener.local_endpoint().unwrap();

    let settings = ServerSettings {
        endpoint,
        transport: TransportOptions::default(),
        identity: Identity::new(&paths.server_cert, &paths.server_key),
        groups: groups(),
        exchanges: 1,
        budget: RunBudget::Cycles(2),
        client_verify: None,
    };
    let server = thread::spawn(move || harness::serve(&settings, &listener));

    let client = harness::client_context(&client_settings(&paths, endpoint, 1)).unwrap();
    for _ in 0..2 {
        harness::client_cycle(&client, &endpoint, &TransportOptions::default(), &groups()).unwrap();
    }

    let result = server.join().unwrap().unwrap();
    assert_eq!(result.count, 2);
}

#[test]
fn test_run_client_without_server_exhausts_retries() {
    let (_dir, paths) = pki();
    let endpoint = Endpoint::new(Ipv4Addr::LOCALHOST, closed_port());

    let mut settings = client_settings(&paths, endpoint, 1);
    settings.transport.retry = RetryPolicy::new(3, Duration::from_millis(10));

    match harness::run_client(&settings) {
        Err(Error::Transport(net::Error::RetriesExhausted { attempts, .. })) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[test]
fn test_connect_gives_up_after_twenty_attempts() {
    let endpoint = Endpoint::new(Ipv4Addr::LOCALHOST, closed_port());
    let options = TransportOptions {
        retry: RetryPolicy::new(net::DEFAULT_CONNECT_ATTEMPTS, Duration::from_millis(5)),
        io_timeout: None,
    };

    match net::connect(&endpoint, &options) {
        Err(net::Error::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 20),
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[test]
fn test_connect_waits_for_late_listener() {
    let port = closed_port();
    let endpoint = Endpoint::new(Ipv4Addr::LOCALHOST, port);

    let late = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        let listener = net::listen(&endpoint).unwrap();
        net::accept(&listener, &TransportOptions::default()).unwrap();
    });

    let options = TransportOptions {
        retry: RetryPolicy::new(40, Duration::from_millis(50)),
        io_timeout: None,
    };
    let conn = net::connect(&endpoint, &options).unwrap();
    assert!(conn.attempts() > 1);
    late.join().unwrap();
}
