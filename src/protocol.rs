//! Protocol dispatcher (C2): opcode encode/decode for the session wire
//! protocol.
//!
//! Opcodes pair request/response by row: `(LOGIN, START_SESSION) = 1`,
//! `(PING, PONG) = 2`, `(IO_INFO, TIME_WARNING) = 3`,
//! `(UPDATE_INPUT, UPDATE_OUTPUT) = 4`, `(ENTER_QUEUE, QUEUE_INFO) = 5`.
//! The byte space is shared between directions; a peer only ever
//! decodes frames originating from the other side of the connection.

use crate::codec::{MessageBuilder, MessageCursor};
use crate::error::RemoteError;
use crate::pins::{Pin, PinType};

pub const OP_LOGIN_OR_START_SESSION: u8 = 1;
pub const OP_PING_OR_PONG: u8 = 2;
pub const OP_IO_INFO_OR_TIME_WARNING: u8 = 3;
pub const OP_UPDATE_INPUT_OR_OUTPUT: u8 = 4;
pub const OP_ENTER_QUEUE_OR_QUEUE_INFO: u8 = 5;

/// Outcome of a `START_SESSION` bootstrap when `device_id == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStartError {
    /// error_code 0: credentials rejected.
    AuthFailure(String),
    /// error_code 1: device pool exhausted, client may opt into the queue.
    NoDevicesAvailable(String),
    /// Any other error_code.
    Other(u8, String),
}

/// A successfully bootstrapped session, as decoded from `START_SESSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBootstrap {
    pub device_id: u16,
    pub method_name: String,
    pub device_name: String,
    pub device_token: String,
    pub min_wait_time_s: u32,
    pub allow_until_epoch: u64,
    pub pins: Vec<Pin>,
}

/// Frames a client receives from the server, decoded from `(opcode, payload)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingFrame {
    SessionStarted(SessionBootstrap),
    SessionRejected(SessionStartError),
    Pong { timestamp_ms: u64 },
    UpdateOutput { pin_id: u32, value: bool },
    /// `is_warning == false` carries no grace deadline: the grace period
    /// has already ended and the socket must close.
    TimeWarning {
        after_time_started_epoch: Option<u64>,
    },
    QueueInfo {
        user_token: String,
        total_users: u8,
        position: u8,
        device_allowed_time_s: u32,
        estimated_epoch: u64,
    },
    /// Recognized opcode but not valid for this direction, or a value
    /// entirely outside the known set. Logged and skipped by the caller.
    Unknown(u8),
}

/// Decode one received frame. Pure function: no I/O, no shared state.
pub fn decode(opcode: u8, payload: &[u8]) -> Result<IncomingFrame, RemoteError> {
    let mut cur = MessageCursor::new(opcode, payload);

    let frame = match opcode {
        OP_LOGIN_OR_START_SESSION => decode_session_start(&mut cur)?,
        OP_PING_OR_PONG => IncomingFrame::Pong {
            timestamp_ms: cur.get_u64()?,
        },
        OP_UPDATE_INPUT_OR_OUTPUT => IncomingFrame::UpdateOutput {
            pin_id: cur.get_u32()?,
            value: cur.get_u8()? != 0,
        },
        OP_IO_INFO_OR_TIME_WARNING => decode_time_warning(&mut cur)?,
        OP_ENTER_QUEUE_OR_QUEUE_INFO => IncomingFrame::QueueInfo {
            user_token: cur.get_string()?,
            total_users: cur.get_u8()?,
            position: cur.get_u8()?,
            device_allowed_time_s: cur.get_u32()?,
            estimated_epoch: cur.get_u64()?,
        },
        other => {
            log::warn!("unknown opcode {other}, skipping frame");
            return Ok(IncomingFrame::Unknown(other));
        }
    };

    cur.finish()?;
    Ok(frame)
}

fn decode_session_start(cur: &mut MessageCursor<'_>) -> Result<IncomingFrame, RemoteError> {
    let _user_token = cur.get_string()?;
    let device_id = cur.get_u16()?;

    if device_id == 0 {
        let error_code = cur.get_u8()?;
        let error_message = cur.get_string()?;
        let err = match error_code {
            0 => SessionStartError::AuthFailure(error_message),
            1 => SessionStartError::NoDevicesAvailable(error_message),
            other => SessionStartError::Other(other, error_message),
        };
        return Ok(IncomingFrame::SessionRejected(err));
    }

    let method_name = cur.get_string()?;
    let device_name = cur.get_string()?;
    let device_token = cur.get_string()?;
    let min_wait_time_s = cur.get_u32()?;
    let allow_until_epoch = cur.get_u64()?;
    let pin_count = cur.get_u16()?;

    let mut pins = Vec::with_capacity(pin_count as usize);
    for _ in 0..pin_count {
        let id = cur.get_u32()?;
        let name = cur.get_string()?;
        let type_byte = cur.get_u8()?;
        let pin_type = PinType::from_byte(type_byte)
            .ok_or_else(|| RemoteError::protocol(format!("invalid pin type byte {type_byte}")))?;
        pins.push(Pin::new(id, name, pin_type));
    }

    Ok(IncomingFrame::SessionStarted(SessionBootstrap {
        device_id,
        method_name,
        device_name,
        device_token,
        min_wait_time_s,
        allow_until_epoch,
        pins,
    }))
}

fn decode_time_warning(cur: &mut MessageCursor<'_>) -> Result<IncomingFrame, RemoteError> {
    let is_warning = cur.get_u8()?;
    let after_time_started_epoch = if is_warning != 0 {
        Some(cur.get_u64()?)
    } else {
        None
    };
    Ok(IncomingFrame::TimeWarning {
        after_time_started_epoch,
    })
}

// ── Outgoing frame builders ──────────────────────────────────────────

pub fn encode_login(device_type_id: u8, method_id: u8, token: &str) -> Vec<u8> {
    MessageBuilder::new(OP_LOGIN_OR_START_SESSION)
        .put_u8(device_type_id)
        .put_u8(method_id)
        .put_string(token)
        .finish()
}

pub fn encode_ping(timestamp_ms: u64) -> Vec<u8> {
    MessageBuilder::new(OP_PING_OR_PONG)
        .put_u64(timestamp_ms)
        .finish()
}

pub fn encode_io_info(latency_ms: u16, mapped: &[(u32, PinType)]) -> Vec<u8> {
    let mut b = MessageBuilder::new(OP_IO_INFO_OR_TIME_WARNING)
        .put_u16(latency_ms)
        .put_u16(mapped.len() as u16);
    for (id, ty) in mapped {
        b = b.put_u32(*id).put_u8(ty.to_byte());
    }
    b.finish()
}

pub fn encode_update_input(pin_id: u32, value: bool) -> Vec<u8> {
    MessageBuilder::new(OP_UPDATE_INPUT_OR_OUTPUT)
        .put_u32(pin_id)
        .put_u8(value as u8)
        .finish()
}

pub fn encode_enter_queue(token: &str, device_type_id: u8, method_id: u8) -> Vec<u8> {
    MessageBuilder::new(OP_ENTER_QUEUE_OR_QUEUE_INFO)
        .put_string(token)
        .put_u8(device_type_id)
        .put_u8(method_id)
        .finish()
}
