//! In-process mock cluster nodes speaking the framed wire protocol.

#![allow(dead_code)]

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use gridlink_client::{
    CallbackError, ClientResponse, DisconnectCause, Distributor, ProcedureCallback,
    ProcedureInvocation, ResponseStatus, StatusListener, HEARTBEAT_HANDLE,
};
use gridlink_common::transport::auth::{LoginRequest, LoginResponse};
use gridlink_common::transport::codec;
use gridlink_common::transport::FrameCodec;

/// How a mock node treats traffic after a successful login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Answer every invocation (including heartbeats). Procedures named
    /// `Abort` come back as user aborts, `Fail` as unexpected failures,
    /// everything else succeeds.
    Answer,
    /// Read and record every frame but never answer anything.
    Silent,
    /// Stop reading from the socket entirely until [`MockServer::resume`],
    /// then behave like `Answer`. Used to build up write-queue backpressure.
    Stall,
}

struct ServerShared {
    mode: Mode,
    cluster_timestamp: i64,
    cluster_addr: i32,
    received: Mutex<Vec<ProcedureInvocation>>,
    pings: AtomicUsize,
    writers: Mutex<Vec<TcpStream>>,
    stalled: AtomicBool,
}

pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<ServerShared>,
}

impl MockServer {
    pub fn start(mode: Mode) -> Self {
        Self::start_with_identity(mode, 1_000, 0xAABB)
    }

    pub fn start_with_identity(mode: Mode, cluster_timestamp: i64, cluster_addr: i32) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(ServerShared {
            mode,
            cluster_timestamp,
            cluster_addr,
            received: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            writers: Mutex::new(Vec::new()),
            stalled: AtomicBool::new(mode == Mode::Stall),
        });

        let accept_shared = Arc::clone(&shared);
        thread::spawn(move || {
            let mut next_connection_id = 100;
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let connection_id = next_connection_id;
                next_connection_id += 1;
                let conn_shared = Arc::clone(&accept_shared);
                thread::spawn(move || serve_connection(stream, conn_shared, connection_id));
            }
        });

        Self { addr, shared }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connect(&self, distributor: &Distributor) -> gridlink_client::Result<()> {
        distributor.create_connection(&self.host(), self.port(), "tester", b"hashed-secret")
    }

    /// Invocations received so far, heartbeats excluded.
    pub fn received(&self) -> Vec<ProcedureInvocation> {
        self.shared.received.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.shared.received.lock().unwrap().len()
    }

    pub fn ping_count(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    /// Push a response to every live connection, out of band.
    pub fn send_response(&self, response: &ClientResponse) {
        let frame = FrameCodec::encode_response(response).unwrap();
        for writer in self.shared.writers.lock().unwrap().iter_mut() {
            let _ = writer.write_all(&frame);
        }
    }

    /// Hard-close every live connection from the server side.
    pub fn close_connections(&self) {
        for writer in self.shared.writers.lock().unwrap().iter() {
            let _ = writer.shutdown(Shutdown::Both);
        }
    }

    /// Leave `Stall` mode and start answering.
    pub fn resume(&self) {
        self.shared.stalled.store(false, Ordering::SeqCst);
    }
}

fn serve_connection(mut stream: TcpStream, shared: Arc<ServerShared>, connection_id: i64) {
    let Ok(body) = codec::read_frame(&mut stream) else {
        return;
    };
    let _login: LoginRequest = serde_json::from_slice(&body).unwrap();
    let login_response = LoginResponse {
        status: 0,
        error: None,
        host_id: 0,
        connection_id,
        cluster_timestamp: shared.cluster_timestamp,
        cluster_addr: shared.cluster_addr,
        build_string: "mock-build-1.0".to_string(),
    };
    if codec::write_frame(&mut stream, &serde_json::to_vec(&login_response).unwrap()).is_err() {
        return;
    }

    let mut writer = stream.try_clone().unwrap();
    shared
        .writers
        .lock()
        .unwrap()
        .push(stream.try_clone().unwrap());

    while shared.stalled.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(5));
    }

    loop {
        let Ok(body) = codec::read_frame(&mut stream) else {
            return;
        };
        let invocation = FrameCodec::decode_invocation(&body).unwrap();

        if invocation.client_handle == HEARTBEAT_HANDLE {
            shared.pings.fetch_add(1, Ordering::SeqCst);
            if shared.mode != Mode::Silent {
                let pong = ClientResponse::success(HEARTBEAT_HANDLE, Vec::new(), 0);
                let frame = FrameCodec::encode_response(&pong).unwrap();
                let _ = writer.write_all(&frame);
            }
            continue;
        }

        shared.received.lock().unwrap().push(invocation.clone());
        if shared.mode != Mode::Silent {
            let response = match invocation.procedure.as_str() {
                "Abort" => ClientResponse::failure(
                    invocation.client_handle,
                    ResponseStatus::UserAbort,
                    "aborted by procedure",
                ),
                "Fail" => ClientResponse::failure(
                    invocation.client_handle,
                    ResponseStatus::UnexpectedFailure,
                    "procedure blew up",
                ),
                _ => ClientResponse::success(invocation.client_handle, Vec::new(), 1),
            };
            let frame = FrameCodec::encode_response(&response).unwrap();
            let _ = writer.write_all(&frame);
        }
    }
}

/// Completion handler that records every response it sees.
#[derive(Default)]
pub struct RecordingCallback {
    responses: Mutex<Vec<ClientResponse>>,
}

impl RecordingCallback {
    pub fn count(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    pub fn responses(&self) -> Vec<ClientResponse> {
        self.responses.lock().unwrap().clone()
    }
}

impl ProcedureCallback for RecordingCallback {
    fn client_callback(&self, response: &ClientResponse) -> Result<(), CallbackError> {
        self.responses.lock().unwrap().push(response.clone());
        Ok(())
    }
}

/// Status listener that records every notification.
#[derive(Default)]
pub struct RecordingListener {
    lost: Mutex<Vec<(String, u16, usize, DisconnectCause)>>,
    backpressure_events: Mutex<Vec<bool>>,
    late_handles: Mutex<Vec<i64>>,
    uncaught: AtomicUsize,
}

impl RecordingListener {
    pub fn lost(&self) -> Vec<(String, u16, usize, DisconnectCause)> {
        self.lost.lock().unwrap().clone()
    }

    pub fn backpressure_on_count(&self) -> usize {
        self.backpressure_events.lock().unwrap().iter().filter(|&&on| on).count()
    }

    pub fn backpressure_off_count(&self) -> usize {
        self.backpressure_events.lock().unwrap().iter().filter(|&&on| !on).count()
    }

    pub fn late_handles(&self) -> Vec<i64> {
        self.late_handles.lock().unwrap().clone()
    }

    pub fn uncaught_count(&self) -> usize {
        self.uncaught.load(Ordering::SeqCst)
    }
}

impl StatusListener for RecordingListener {
    fn connection_lost(&self, hostname: &str, port: u16, connections_left: usize, cause: DisconnectCause) {
        self.lost
            .lock()
            .unwrap()
            .push((hostname.to_string(), port, connections_left, cause));
    }

    fn backpressure(&self, on: bool) {
        self.backpressure_events.lock().unwrap().push(on);
    }

    fn late_procedure_response(&self, response: &ClientResponse, _hostname: &str, _port: u16) {
        self.late_handles.lock().unwrap().push(response.client_handle);
    }

    fn uncaught_error(
        &self,
        _callback: &dyn ProcedureCallback,
        _response: &ClientResponse,
        _error: &CallbackError,
    ) {
        self.uncaught.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub fn wait_until(what: &str, timeout: Duration, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}
