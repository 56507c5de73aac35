use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::device::constants::{
    COMMAND_IDENTIFY, COMMAND_SET_POSITION, COMMAND_STOP, DEFAULT_BEEP_COUNT, POSITION_UNUSED,
};

/// A user intent, independent of sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetPosition(i32),
    Identify(u8),
    Stop,
}

impl Command {
    pub fn identify() -> Self {
        Command::Identify(DEFAULT_BEEP_COUNT)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SetPosition(percent) => write!(f, "set position {}%", percent),
            Command::Identify(beeps) => write!(f, "identify ({} beeps)", beeps),
            Command::Stop => write!(f, "stop"),
        }
    }
}

/// Plaintext packet: `[command id LE (2)] [sequence] [length] [payload...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    pub command_id: u16,
    pub sequence: u8,
    payload: Vec<u8>,
}

impl CommandPacket {
    fn new(command_id: u16, sequence: u8, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= u8::MAX as usize);
        CommandPacket { command_id, sequence, payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.payload.len());
        bytes.extend_from_slice(&self.command_id.to_le_bytes());
        bytes.push(self.sequence);
        bytes.push(self.length());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Builds command packets and stamps them with a wrapping sequence number.
///
/// Clones share the same counter, so handing a clone to several sessions gives them one
/// process-wide sequence. Use [`CommandCodec::new`] per session for independent counters.
#[derive(Debug, Clone, Default)]
pub struct CommandCodec {
    sequence: Arc<AtomicU8>,
}

impl CommandCodec {
    pub fn new() -> Self {
        CommandCodec::default()
    }

    /// The sequence number the next packet will carry.
    pub fn peek_sequence(&self) -> u8 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn next_sequence(&self) -> u8 {
        // fetch_add wraps 255 -> 0
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn build(&self, command: &Command) -> CommandPacket {
        match *command {
            Command::SetPosition(percent) => self.set_position(percent),
            Command::Identify(beeps) => self.identify(beeps),
            Command::Stop => self.stop(),
        }
    }

    /// Out of range percentages are clamped, not rejected.
    pub fn set_position(&self, percent: i32) -> CommandPacket {
        let position = (percent.clamp(0, 100) as u16) * 100;

        let mut payload = Vec::with_capacity(9);
        payload.extend_from_slice(&position.to_le_bytes());
        // secondary position, tertiary position, tilt
        for _ in 0..3 {
            payload.extend_from_slice(&POSITION_UNUSED.to_le_bytes());
        }
        payload.push(0x00); // velocity

        CommandPacket::new(COMMAND_SET_POSITION, self.next_sequence(), payload)
    }

    pub fn identify(&self, beep_count: u8) -> CommandPacket {
        CommandPacket::new(COMMAND_IDENTIFY, self.next_sequence(), vec![beep_count])
    }

    pub fn stop(&self) -> CommandPacket {
        CommandPacket::new(COMMAND_STOP, self.next_sequence(), vec![])
    }
}
