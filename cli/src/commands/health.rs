use anyhow::{Context, Result};

use rpsense_config::RpsenseConfig;
use rpsense_inference_api::APIClient;
use rpsense_session::{StreamTransport, Transport};

use crate::TransportKind;

pub fn run(config: &RpsenseConfig, transport: TransportKind) -> Result<()> {
    let inference = &config.inference;

    match transport {
        TransportKind::Batch => {
            let client = APIClient::new(&inference.base_url, inference.request_timeout());
            let status = client
                .health_check()
                .with_context(|| format!("inference service at {} is not healthy", inference.base_url))?;

            println!(
                "{} is up (version {})",
                client.base_url(),
                status.version.as_deref().unwrap_or("unknown")
            );
        },

        TransportKind::Stream => {
            let mut stream = StreamTransport::from_config(inference);
            stream
                .health_check()
                .with_context(|| format!("stream channel at {} is unreachable", inference.stream_addr))?;

            println!("{} is accepting connections", inference.stream_addr);
            stream.shutdown();
        },
    }

    Ok(())
}
