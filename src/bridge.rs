//! Simulator bridge (C8): ferries bit values between the mapped-pin
//! tables and the host simulator on each simulator tick.
//!
//! The bridge only knows how to read/write a single bit per pin; the
//! host supplies that access through the [`SimulatorPins`] trait so this
//! crate never depends on the simulator engine's own types.

use crate::pins::PinType;
use crate::protocol::encode_update_input;
use crate::session::Session;

/// Host-provided access to the simulator's live circuit state.
pub trait SimulatorPins {
    fn read_bit(&self, pin_name: &str) -> bool;
    fn write_bit(&mut self, pin_name: &str, value: bool);
}

/// One simulator tick: pull mapped Input pins from the simulator into
/// the session (change-only), push mapped Output pins from the session
/// back into the simulator. Returns the `UPDATE_INPUT` frames that must
/// be sent to the server for inputs that actually changed.
pub fn tick(session: &mut Session, sim: &mut dyn SimulatorPins) -> Vec<Vec<u8>> {
    let mapped = session.pins.mapped.clone();
    let mut outgoing = Vec::new();

    for mapped_pin in &mapped {
        match mapped_pin.direction {
            PinType::Input => {
                let Some(pin) = session.pins.available.find_by_name(&mapped_pin.name) else {
                    continue;
                };
                let id = pin.id;
                let value = sim.read_bit(&mapped_pin.name);
                if let Some(changed) = session.set_input(id, value) {
                    outgoing.push(encode_update_input(id, changed));
                }
            }
            PinType::Output => {
                let Some(pin) = session.pins.available.find_by_name(&mapped_pin.name) else {
                    continue;
                };
                if let Some(value) = session.pins.outputs.get(&pin.id) {
                    sim.write_bit(&mapped_pin.name, *value);
                }
            }
            PinType::None | PinType::GeneralPurpose => {}
        }
    }

    outgoing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::Pin;
    use crate::protocol::{IncomingFrame, SessionBootstrap};
    use std::collections::HashMap;

    struct FakeSim {
        bits: HashMap<String, bool>,
    }

    impl SimulatorPins for FakeSim {
        fn read_bit(&self, pin_name: &str) -> bool {
            *self.bits.get(pin_name).unwrap_or(&false)
        }
        fn write_bit(&mut self, pin_name: &str, value: bool) {
            self.bits.insert(pin_name.to_string(), value);
        }
    }

    fn session_with_pins() -> Session {
        let mut s = Session::new();
        s.on_frame(
            IncomingFrame::SessionStarted(SessionBootstrap {
                device_id: 1,
                method_name: "m".into(),
                device_name: "d".into(),
                device_token: "t".into(),
                min_wait_time_s: 30,
                allow_until_epoch: 1_700_000_000,
                pins: vec![
                    Pin::new(1, "IN0", crate::pins::PinType::Input),
                    Pin::new(2, "OUT0", crate::pins::PinType::Output),
                ],
            }),
            0,
        );
        s.map_pin("IN0", crate::pins::PinType::Input).unwrap();
        s.map_pin("OUT0", crate::pins::PinType::Output).unwrap();
        s
    }

    #[test]
    fn input_change_produces_one_update_input_frame() {
        let mut session = session_with_pins();
        let mut sim = FakeSim {
            bits: HashMap::from([("IN0".to_string(), true)]),
        };

        let frames = tick(&mut session, &mut sim);
        assert_eq!(frames.len(), 1);

        let frames_again = tick(&mut session, &mut sim);
        assert!(frames_again.is_empty());
    }

    #[test]
    fn output_value_propagates_into_simulator() {
        let mut session = session_with_pins();
        session.pins.set_output(2, true);
        let mut sim = FakeSim { bits: HashMap::new() };

        tick(&mut session, &mut sim);
        assert_eq!(sim.bits.get("OUT0"), Some(&true));
    }
}
