use crate::InferenceConfig;

impl InferenceConfig {
    /// The hosted inference server. Requests travel further, so allow more headroom.
    pub fn production() -> Self {
        Self {
            base_url: String::from("https://inference.rpsense.app"),
            stream_addr: String::from("stream.rpsense.app:443"),
            request_timeout_ms: 7000,
            connect_timeout_ms: 4000,
        }
    }
}
