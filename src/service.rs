//! Session driver (§5 concurrency model) and multi-device manager.
//!
//! [`SessionHandle`] owns the TCP socket and the 1-second tick for one
//! remote device and runs the cooperative event loop described in §5:
//! socket-readable, timer-tick, and command-channel are merged into a
//! single `tokio::select!`. [`DeviceService`] keeps a collection of
//! handles keyed by id, mirroring the corpus's multi-session manager
//! shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use crate::codec::FrameReader;
use crate::config::RemoteDeviceConfig;
use crate::discovery::{version_major_compatible, DiscoveryClient};
use crate::error::RemoteError;
use crate::events::HostEvent;
use crate::pins::PinType;
use crate::protocol;
use crate::registry::EndpointRegistry;
use crate::session::Session;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const INITIAL_READ_TIMEOUT: Duration = Duration::from_secs(5);
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Commands the host sends into a running session task.
#[derive(Debug)]
pub enum SessionCommand {
    Disconnect,
    MapPin { name: String, direction: PinType },
    SetInput { pin_id: u32, value: bool },
    AcceptQueue,
    DeclineQueue,
}

fn now_epoch_s() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A running session: the caller observes state through the shared
/// `Session`, issues commands through the channel, and receives
/// [`HostEvent`]s on `events`.
pub struct SessionHandle {
    pub state: Arc<Mutex<Session>>,
    commands: mpsc::Sender<SessionCommand>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Runs the full C4→C6 bootstrap: version gate, HTTP login, TCP
    /// connect, LOGIN frame, first server frame — then spawns the
    /// event-loop task and returns a handle to it.
    pub async fn connect(
        registry: &EndpointRegistry,
        config: RemoteDeviceConfig,
        events: mpsc::UnboundedSender<HostEvent>,
    ) -> Result<Self, RemoteError> {
        let option = registry
            .find(&config.service_name)
            .ok_or_else(|| RemoteError::config_missing(format!("unknown service '{}'", config.service_name)))?
            .clone();

        let discovery = DiscoveryClient::new();
        let status = discovery.status(&option.url).await?;
        if !version_major_compatible(&status.version) {
            return Err(RemoteError::version_incompatible(format!(
                "server major version '{}' incompatible with client major {}",
                status.version,
                DiscoveryClient::CLIENT_MAJOR_VERSION
            )));
        }

        let target = discovery
            .login(&option, &config.username, &config.password)
            .await?;

        let stream = timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect((target.host.as_str(), target.port)))
            .await
            .map_err(|_| RemoteError::timeout("tcp connect timed out"))??;

        let mut session = Session::new();
        session.begin_authenticating();
        session.on_login_ok(config.device_type_id, config.method_id, target.token.clone());
        session.on_tcp_connected(now_epoch_s());

        let (mut read_half, mut write_half) = tokio::io::split(stream);

        let login_frame = protocol::encode_login(config.device_type_id, config.method_id, &target.token);
        write_half.write_all(&login_frame).await?;

        let (first_opcode, first_payload) = timeout(INITIAL_READ_TIMEOUT, FrameReader::read_frame(&mut read_half))
            .await
            .map_err(|_| RemoteError::timeout("timed out waiting for START_SESSION"))??;
        let first_frame = protocol::decode(first_opcode, &first_payload)?;
        for event in session.on_frame(first_frame, now_epoch_s()) {
            let _ = events.send(event);
        }
        if session.phase == crate::session::Phase::Closed {
            return Err(RemoteError::auth_failure("session rejected the first frame after login"));
        }

        let state = Arc::new(Mutex::new(session));
        let (tx, rx) = mpsc::channel(32);

        let task = tokio::spawn(run_event_loop(
            state.clone(),
            BufReader::new(read_half),
            write_half,
            rx,
            events,
        ));

        Ok(Self {
            state,
            commands: tx,
            task,
        })
    }

    pub async fn send_command(&self, cmd: SessionCommand) -> Result<(), RemoteError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| RemoteError::network("session task has already exited"))
    }

    pub async fn disconnect(&self) -> Result<(), RemoteError> {
        self.send_command(SessionCommand::Disconnect).await
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run_event_loop<R, W>(
    state: Arc<Mutex<Session>>,
    mut reader: BufReader<R>,
    mut writer: W,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<HostEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut tick = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            frame = FrameReader::read_frame(&mut reader) => {
                let (opcode, payload) = match frame {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("session socket closed: {e}");
                        break;
                    }
                };
                let decoded = match protocol::decode(opcode, &payload) {
                    Ok(f) => f,
                    Err(e) => {
                        log::warn!("protocol error decoding opcode {opcode}: {e}");
                        continue;
                    }
                };
                let mut session = state.lock().await;
                for event in session.on_frame(decoded, now_epoch_s()) {
                    let _ = events.send(event);
                }
                if session.phase == crate::session::Phase::Closed {
                    break;
                }
            }
            _ = tick.tick() => {
                let ping = protocol::encode_ping(now_epoch_ms());
                if writer.write_all(&ping).await.is_err() {
                    break;
                }
                let mut session = state.lock().await;
                for event in session.on_tick(now_epoch_s()) {
                    let _ = events.send(event);
                }
                if session.phase == crate::session::Phase::Closed {
                    break;
                }
            }
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                if !handle_command(&state, &mut writer, cmd).await {
                    break;
                }
            }
        }
    }
}

/// Returns `false` when the loop should stop (disconnect requested).
async fn handle_command<W: tokio::io::AsyncWrite + Unpin>(
    state: &Arc<Mutex<Session>>,
    writer: &mut W,
    cmd: SessionCommand,
) -> bool {
    match cmd {
        SessionCommand::Disconnect => {
            state.lock().await.disconnect();
            false
        }
        SessionCommand::MapPin { name, direction } => {
            let mut session = state.lock().await;
            if session.map_pin(&name, direction).is_ok() {
                let mapped: Vec<(u32, PinType)> = session
                    .pins
                    .mapped
                    .iter()
                    .filter_map(|m| session.pins.available.find_by_name(&m.name).map(|p| (p.id, m.direction)))
                    .collect();
                let frame = protocol::encode_io_info(session.latency_ms as u16, &mapped);
                let _ = writer.write_all(&frame).await;
            }
            true
        }
        SessionCommand::SetInput { pin_id, value } => {
            let mut session = state.lock().await;
            if let Some(changed) = session.set_input(pin_id, value) {
                let frame = protocol::encode_update_input(pin_id, changed);
                let _ = writer.write_all(&frame).await;
            }
            true
        }
        SessionCommand::AcceptQueue => {
            let mut session = state.lock().await;
            session.user_accepts_queue(now_epoch_s());
            let frame = protocol::encode_enter_queue(
                &session.auth.user_token,
                session.auth.device_type_id,
                session.auth.method_id,
            );
            drop(session);
            let _ = writer.write_all(&frame).await;
            true
        }
        SessionCommand::DeclineQueue => {
            state.lock().await.user_declines_queue();
            false
        }
    }
}

/// Keeps a collection of device sessions keyed by id, for a host
/// managing more than one remote device at once.
pub struct DeviceService {
    sessions: HashMap<String, SessionHandle>,
}

impl DeviceService {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    pub async fn connect(
        &mut self,
        id: impl Into<String>,
        registry: &EndpointRegistry,
        config: RemoteDeviceConfig,
        events: mpsc::UnboundedSender<HostEvent>,
    ) -> Result<(), RemoteError> {
        let handle = SessionHandle::connect(registry, config, events).await?;
        self.sessions.insert(id.into(), handle);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&SessionHandle> {
        self.sessions.get(id)
    }

    pub async fn disconnect(&mut self, id: &str) -> Result<(), RemoteError> {
        let handle = self
            .sessions
            .get(id)
            .ok_or_else(|| RemoteError::network(format!("no session named '{id}'")))?;
        handle.disconnect().await
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if let Some(handle) = self.sessions.remove(id) {
            handle.abort();
            true
        } else {
            false
        }
    }
}

impl Default for DeviceService {
    fn default() -> Self {
        Self::new()
    }
}
