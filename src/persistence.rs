//! Project-file persistence (§6): the remote-device sub-record embedded
//! in the project's binary stream, gated by the host on project version
//! ≥ 2.7. This module only encodes/decodes the record; the version gate
//! itself is the host's concern.

use crate::codec::{MessageBuilder, MessageCursor};
use crate::error::RemoteError;
use crate::pins::{MappedPin, Pin, PinType};

/// Minimum project stream version this sub-record requires.
pub const MIN_PROJECT_VERSION: f64 = 2.7;

/// Encode `available_pins` then `mapped_pins`, each as a
/// length-prefixed table, using the same big-endian/length-prefixed
/// string layout as the wire protocol.
pub fn encode(available: &[Pin], mapped: &[MappedPin]) -> Vec<u8> {
    let mut b = MessageBuilder::new(0).put_u32(available.len() as u32);
    for pin in available {
        b = b.put_u32(pin.id).put_string(&pin.name).put_u8(pin.pin_type.to_byte());
    }
    b = b.put_u32(mapped.len() as u32);
    for pin in mapped {
        b = b.put_string(&pin.name).put_u8(pin.direction.to_byte());
    }
    // Drop the throwaway opcode/size header added by MessageBuilder;
    // this is a record embedded in the project's own stream, not a
    // session frame.
    b.finish()[5..].to_vec()
}

pub struct DecodedSubRecord {
    pub available: Vec<Pin>,
    pub mapped: Vec<MappedPin>,
}

pub fn decode(bytes: &[u8]) -> Result<DecodedSubRecord, RemoteError> {
    let mut cur = MessageCursor::new(0, bytes);

    let available_count = cur.get_u32()?;
    let mut available = Vec::with_capacity(available_count as usize);
    for _ in 0..available_count {
        let id = cur.get_u32()?;
        let name = cur.get_string()?;
        let type_byte = cur.get_u8()?;
        let pin_type = PinType::from_byte(type_byte)
            .ok_or_else(|| RemoteError::protocol(format!("invalid pin type byte {type_byte}")))?;
        available.push(Pin::new(id, name, pin_type));
    }

    let mapped_count = cur.get_u32()?;
    let mut mapped = Vec::with_capacity(mapped_count as usize);
    for _ in 0..mapped_count {
        let name = cur.get_string()?;
        let type_byte = cur.get_u8()?;
        let direction = PinType::from_byte(type_byte)
            .ok_or_else(|| RemoteError::protocol(format!("invalid pin type byte {type_byte}")))?;
        mapped.push(MappedPin { name, direction });
    }

    cur.finish()?;
    Ok(DecodedSubRecord { available, mapped })
}
