/*!
Helpers for building wire frames that match the feed contract.
*/

use gridpulse_client::codec;

/// Builds frames for a single device id.
pub struct FrameBuilder {
    device_id: String,
}

impl FrameBuilder {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// `D1V07C42T19`-style frame; values must be in 0..=99.
    pub fn frame(&self, voltage: u8, current: u8, temperature: u8) -> String {
        codec::encode(&self.device_id, voltage, current, temperature)
    }
}

/// The informational greeting the demo feed server sends on connect. Not a
/// data frame; the client is expected to drop it.
pub fn greeting() -> String {
    "Connected to WebSocket server".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_decodable_frames() {
        let builder = FrameBuilder::new("D2");
        let raw = builder.frame(7, 42, 19);
        assert_eq!(raw, "D2V07C42T19");
        assert!(codec::decode(&raw).is_ok());
    }

    #[test]
    fn greeting_is_not_a_data_frame() {
        assert!(codec::decode(&greeting()).is_err());
    }
}
