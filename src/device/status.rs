use crate::device::cipher::CipherLayer;
use crate::device::constants::POSITION_SCALE;
use crate::device::types::ShadeStatusSample;
use crate::error::DecodeError;

const MINIMUM_STATUS_LENGTH: usize = 3;

/// Interpret a decrypted notification:
/// byte 0 is a status code, bytes 1..=2 the big-endian position (0..=65535 maps onto 0..=100%).
pub fn parse_status(plaintext: &[u8]) -> Result<ShadeStatusSample, DecodeError> {
    if plaintext.len() < MINIMUM_STATUS_LENGTH {
        return Err(DecodeError::TooShort { length: plaintext.len(), minimum: MINIMUM_STATUS_LENGTH });
    }

    let raw = u16::from_be_bytes([plaintext[1], plaintext[2]]);
    let position_percent = (f32::from(raw) / POSITION_SCALE).clamp(0.0, 100.0);

    Ok(ShadeStatusSample {
        status_code: plaintext[0],
        position_percent,
    })
}

pub fn decode_notification(cipher: &CipherLayer, frame: &[u8]) -> Result<ShadeStatusSample, DecodeError> {
    parse_status(&cipher.decrypt(frame))
}
