//! Session state machine (C6): the core lifecycle driven by HTTP login,
//! TCP frames, and the 1-second timer tick.
//!
//! This module is pure: no sockets, no timers, no HTTP. [`Session::apply`]
//! and its siblings take an already-decoded event and return the
//! [`HostEvent`]s the caller should surface; I/O lives in [`crate::service`].

use crate::error::RemoteError;
use crate::events::HostEvent;
use crate::heartbeat::{self, HeartbeatTracker, LatencyWarning};
use crate::pins::{PinCatalog, PinType};
use crate::protocol::{IncomingFrame, SessionBootstrap, SessionStartError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Authenticating,
    Connecting,
    WaitSessionStart,
    Queued,
    Active,
    Expiring,
    Closed,
}

/// Credentials and identity bound to the live TCP session.
#[derive(Debug, Clone, Default)]
pub struct SessionAuth {
    pub device_type_id: u8,
    pub method_id: u8,
    pub user_token: String,
    pub method_name: String,
    pub device_name: String,
    pub device_token: String,
}

/// Time-budget accounting (§4.6 invariants), all epoch fields in seconds.
#[derive(Debug, Clone, Default)]
pub struct TimeBudget {
    pub min_wait_time_s: u32,
    pub allow_until_epoch: u64,
    pub started_time_epoch: Option<u64>,
    pub after_time_started_epoch: Option<u64>,
    pub alive_since_epoch: Option<u64>,
}

impl TimeBudget {
    pub fn total_allowed(&self) -> u64 {
        let started = self.started_time_epoch.unwrap_or(0);
        (self.allow_until_epoch + self.min_wait_time_s as u64).saturating_sub(started)
    }

    fn grace_remaining(&self, now: u64, expiring: bool) -> u64 {
        if !expiring {
            return self.min_wait_time_s as u64;
        }
        let started = self.after_time_started_epoch.unwrap_or(now);
        (self.min_wait_time_s as u64).saturating_sub(now.saturating_sub(started))
    }

    pub fn time_remaining(&self, now: u64, expiring: bool) -> u64 {
        let until_allow = self.allow_until_epoch.saturating_sub(now);
        until_allow + self.grace_remaining(now, expiring)
    }

    pub fn init_time_count(&mut self, now: u64) {
        self.started_time_epoch = Some(now);
    }

    /// `true` once 10 s have elapsed without a PONG (§4.6 liveness rule).
    pub fn is_alive(&self, now: u64) -> bool {
        match self.alive_since_epoch {
            Some(since) => now < since + 10,
            None => false,
        }
    }
}

/// Queue position/ETA tracking while `Phase::Queued`.
#[derive(Debug, Clone, Default)]
pub struct QueueState {
    pub user_token: String,
    pub total_users: u8,
    pub position: u8,
    pub device_allowed_time_s: u32,
    pub estimated_epoch: u64,
    pub waiting_since_epoch: Option<u64>,
}

impl QueueState {
    /// Apply a new `QUEUE_INFO` sample under the ETA monotonicity rule
    /// (§4.6): `estimated_epoch` only decreases, unless the jump exceeds
    /// `min_wait_time_s + 20s`, read as a server reschedule. Position
    /// always updates.
    pub fn apply_update(
        &mut self,
        total_users: u8,
        position: u8,
        device_allowed_time_s: u32,
        estimated_epoch: u64,
        min_wait_time_s: u32,
    ) {
        self.total_users = total_users;
        self.position = position;
        self.device_allowed_time_s = device_allowed_time_s;

        let jump = estimated_epoch.saturating_sub(self.estimated_epoch);
        let reschedule_threshold = min_wait_time_s as u64 + 20;

        if self.estimated_epoch == 0
            || estimated_epoch < self.estimated_epoch
            || jump > reschedule_threshold
        {
            self.estimated_epoch = estimated_epoch;
        }
    }
}

/// The full session state. Owns pin mapping, time budget, queue state
/// and latency tracking; transitions are driven by the `on_*` methods.
#[derive(Debug, Clone)]
pub struct Session {
    pub phase: Phase,
    pub pins: PinCatalog,
    pub auth: SessionAuth,
    pub time: TimeBudget,
    pub queue: QueueState,
    pub latency_ms: u32,
    heartbeat: HeartbeatTracker,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            pins: PinCatalog::new(),
            auth: SessionAuth::default(),
            time: TimeBudget::default(),
            queue: QueueState::default(),
            latency_ms: 0,
            heartbeat: HeartbeatTracker::new(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(&mut self, next: Phase) -> HostEvent {
        self.phase = next;
        HostEvent::SessionStateChanged(next)
    }

    pub fn begin_authenticating(&mut self) -> Vec<HostEvent> {
        vec![self.transition(Phase::Authenticating)]
    }

    pub fn on_login_ok(&mut self, device_type_id: u8, method_id: u8, user_token: String) -> Vec<HostEvent> {
        self.auth.device_type_id = device_type_id;
        self.auth.method_id = method_id;
        self.auth.user_token = user_token;
        vec![self.transition(Phase::Connecting)]
    }

    pub fn on_login_failed(&mut self) -> Vec<HostEvent> {
        vec![self.transition(Phase::Idle)]
    }

    pub fn on_tcp_connected(&mut self, now: u64) -> Vec<HostEvent> {
        self.time.alive_since_epoch = Some(now);
        vec![self.transition(Phase::WaitSessionStart)]
    }

    /// Dispatch one decoded server frame. `now` is the session clock
    /// (seconds since epoch) at the moment the frame was processed.
    pub fn on_frame(&mut self, frame: IncomingFrame, now: u64) -> Vec<HostEvent> {
        match frame {
            IncomingFrame::SessionStarted(boot) => self.on_session_started(boot, now),
            IncomingFrame::SessionRejected(err) => self.on_session_rejected(err),
            IncomingFrame::Pong { timestamp_ms } => self.on_pong(timestamp_ms, now),
            IncomingFrame::UpdateOutput { pin_id, value } => {
                self.pins.set_output(pin_id, value);
                vec![HostEvent::OutputChanged { pin_id, value }]
            }
            IncomingFrame::TimeWarning {
                after_time_started_epoch,
            } => self.on_time_warning(after_time_started_epoch),
            IncomingFrame::QueueInfo {
                user_token,
                total_users,
                position,
                device_allowed_time_s,
                estimated_epoch,
            } => {
                self.queue.user_token = user_token;
                self.queue.apply_update(
                    total_users,
                    position,
                    device_allowed_time_s,
                    estimated_epoch,
                    self.time.min_wait_time_s,
                );
                vec![]
            }
            IncomingFrame::Unknown(_) => vec![],
        }
    }

    fn on_session_started(&mut self, boot: SessionBootstrap, now: u64) -> Vec<HostEvent> {
        let mut events = Vec::new();

        let reset = self.pins.apply_advertisement(boot.pins);
        if reset {
            events.push(HostEvent::MappingReset);
        }
        events.push(HostEvent::PinSetChanged);

        self.auth.method_name = boot.method_name;
        self.auth.device_name = boot.device_name;
        self.auth.device_token = boot.device_token;

        self.time.min_wait_time_s = boot.min_wait_time_s;
        self.time.allow_until_epoch = boot.allow_until_epoch;
        self.time.after_time_started_epoch = None;
        self.time.init_time_count(now);

        self.queue = QueueState::default();

        events.push(self.transition(Phase::Active));
        events.push(HostEvent::SessionEstablished);
        events
    }

    fn on_session_rejected(&mut self, err: SessionStartError) -> Vec<HostEvent> {
        match err {
            SessionStartError::NoDevicesAvailable(message) => {
                vec![HostEvent::NeedQueueDecision { message }]
            }
            SessionStartError::AuthFailure(_) | SessionStartError::Other(_, _) => {
                vec![self.transition(Phase::Closed)]
            }
        }
    }

    /// Host decided to wait after a `NotEnoughDevices` reply.
    pub fn user_accepts_queue(&mut self, now: u64) -> Vec<HostEvent> {
        self.queue.waiting_since_epoch = Some(now);
        vec![self.transition(Phase::Queued)]
    }

    /// Host declined to wait after a `NotEnoughDevices` reply.
    pub fn user_declines_queue(&mut self) -> Vec<HostEvent> {
        vec![self.transition(Phase::Closed)]
    }

    fn on_pong(&mut self, echoed_timestamp_ms: u64, now: u64) -> Vec<HostEvent> {
        self.time.alive_since_epoch = Some(now);

        let latency = heartbeat::compute_latency_ms(now * 1000, echoed_timestamp_ms) as u32;
        self.latency_ms = latency;

        let mut events = Vec::new();
        match self.heartbeat.observe(latency) {
            Some(LatencyWarning::Unstable) => {
                events.push(HostEvent::UnstableConnection { latency_ms: latency })
            }
            Some(LatencyWarning::Unusable) => events.push(HostEvent::UnusableConnection),
            None => {}
        }
        events
    }

    fn on_time_warning(&mut self, after_time_started_epoch: Option<u64>) -> Vec<HostEvent> {
        match after_time_started_epoch {
            None => vec![self.transition(Phase::Closed)],
            Some(started) => {
                self.time.after_time_started_epoch = Some(started);
                vec![self.transition(Phase::Expiring)]
            }
        }
    }

    /// Periodic 1-second tick: evaluate liveness and the time budget.
    pub fn on_tick(&mut self, now: u64) -> Vec<HostEvent> {
        if !matches!(self.phase, Phase::Active | Phase::Expiring) {
            return Vec::new();
        }

        if !self.time.is_alive(now) {
            return vec![HostEvent::UnusableConnection, self.transition(Phase::Closed)];
        }

        let expiring = matches!(self.phase, Phase::Expiring);
        if self.time.time_remaining(now, expiring) == 0 {
            return vec![self.transition(Phase::Closed)];
        }

        Vec::new()
    }

    /// User-initiated disconnect, or a fatal error: tear down the
    /// session but preserve `mapped_pins` (§5 cancellation rule).
    pub fn disconnect(&mut self) -> Vec<HostEvent> {
        self.pins.available = Default::default();
        self.pins.inputs.clear();
        self.pins.outputs.clear();
        self.time = TimeBudget::default();
        self.queue = QueueState::default();
        self.heartbeat = HeartbeatTracker::new();
        vec![self.transition(Phase::Closed)]
    }

    pub fn map_pin(&mut self, name: &str, dir: PinType) -> Result<(), RemoteError> {
        self.pins.map_pin(name, dir)
    }

    /// Returns `Some(value)` if the write actually changed state and an
    /// `UPDATE_INPUT` frame must be sent.
    pub fn set_input(&mut self, id: u32, value: bool) -> Option<bool> {
        self.pins.set_input(id, value)
    }
}
