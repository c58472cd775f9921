use crate::InferenceConfig;

impl InferenceConfig {
    /// A locally running inference server.
    pub fn development() -> Self {
        Self {
            base_url: String::from("http://localhost:5000"),
            stream_addr: String::from("127.0.0.1:5001"),
            request_timeout_ms: 5000,
            connect_timeout_ms: 2000,
        }
    }
}
