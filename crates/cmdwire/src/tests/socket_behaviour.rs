//! Behavioural tests for the command socket listener.

use std::cell::RefCell;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use cmdwire_config::SocketEndpoint;

use crate::transport::{CountingHandler, ListenerError, ListenerHandle, SocketListener, connect};

struct ListenerWorld {
    endpoint: SocketEndpoint,
    listener: Option<ListenerHandle>,
    accepted: Arc<AtomicUsize>,
    address: Option<SocketAddr>,
    bind_error: Option<ListenerError>,
    reserved: Option<TcpListener>,
    socket_dir: Option<TempDir>,
}

impl ListenerWorld {
    fn new() -> Self {
        Self {
            endpoint: SocketEndpoint::tcp("127.0.0.1", 0),
            listener: None,
            accepted: Arc::new(AtomicUsize::new(0)),
            address: None,
            bind_error: None,
            reserved: None,
            socket_dir: None,
        }
    }

    fn start_listener(&mut self) {
        let (count, handler) = CountingHandler::new();
        self.accepted = count;
        let started = SocketListener::bind(&self.endpoint).and_then(|listener| {
            self.address = listener.local_addr();
            listener.start(handler)
        });
        match started {
            Ok(handle) => self.listener = Some(handle),
            Err(error) => self.bind_error = Some(error),
        }
    }

    fn reserve_port(&mut self) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind reserved port");
        let port = listener.local_addr().expect("local addr").port();
        self.endpoint = SocketEndpoint::tcp("127.0.0.1", port);
        self.reserved = Some(listener);
    }

    #[cfg(unix)]
    fn leave_stale_socket(&mut self) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("cmdwire.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).expect("bind stale socket"));
        self.endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        self.socket_dir = Some(dir);
    }

    fn connect_clients(&self, count: usize) {
        match self.address {
            Some(addr) => {
                for _ in 0..count {
                    TcpStream::connect(addr).expect("connect client");
                }
            }
            None => {
                for _ in 0..count {
                    connect(&self.endpoint, Duration::from_secs(1)).expect("connect client");
                }
            }
        }
    }

    fn wait_for_connections(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.accepted.load(Ordering::SeqCst) >= expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl Drop for ListenerWorld {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            handle.join().ok();
        }
        self.reserved = None;
        self.socket_dir = None;
    }
}

#[fixture]
fn world() -> RefCell<ListenerWorld> {
    RefCell::new(ListenerWorld::new())
}

#[given("a TCP socket listener is running")]
fn given_tcp_listener(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().start_listener();
    assert!(
        world.borrow().bind_error.is_none(),
        "listener start failed: {:?}",
        world.borrow().bind_error
    );
}

#[given("a TCP socket is already bound")]
fn given_tcp_in_use(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().reserve_port();
}

#[given("a stale unix socket file is left behind")]
fn given_stale_unix_socket(world: &RefCell<ListenerWorld>) {
    #[cfg(unix)]
    world.borrow_mut().leave_stale_socket();
    #[cfg(not(unix))]
    let _ = world;
}

#[when("a client connects")]
fn when_client_connects(world: &RefCell<ListenerWorld>) {
    world.borrow().connect_clients(1);
}

#[when("two clients connect")]
fn when_two_clients_connect(world: &RefCell<ListenerWorld>) {
    world.borrow().connect_clients(2);
}

#[when("the listener starts on the same socket")]
fn when_listener_starts_same_socket(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().start_listener();
}

#[then("the listener records {count} connections")]
fn then_listener_records_plural(world: &RefCell<ListenerWorld>, count: usize) {
    assert_listener_records(world, count);
}

#[then("the listener records {count} connection")]
fn then_listener_records_singular(world: &RefCell<ListenerWorld>, count: usize) {
    assert_listener_records(world, count);
}

fn assert_listener_records(world: &RefCell<ListenerWorld>, count: usize) {
    assert!(
        world.borrow().wait_for_connections(count),
        "expected {count} connections, got {}",
        world.borrow().accepted.load(Ordering::SeqCst)
    );
}

#[then("starting the listener fails with an address in use")]
fn then_listener_fails(world: &RefCell<ListenerWorld>) {
    let world_ref = world.borrow();
    assert!(
        matches!(world_ref.bind_error, Some(ListenerError::BindTcp { .. })),
        "expected a TCP bind failure, got {:?}",
        world_ref.bind_error
    );
}

#[scenario(path = "tests/features/listener.feature")]
fn command_socket_listener(#[from(world)] world: RefCell<ListenerWorld>) {
    drop(world);
}
