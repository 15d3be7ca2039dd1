//! Playback example.
//!
//! Streams a 16-bit PCM WAV file to the default output device.
//!
//! Run with: cargo run --example play -- path/to/file.wav [--loop]

use std::time::Duration;
use stream_wav::{Streaming, StreamEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: play <file.wav> [--loop]")?;
    let looping = args.any(|arg| arg == "--loop");

    let stream = Streaming::builder()
        .looping(looping)
        .on_event(|event| {
            if let StreamEvent::StateChanged { current, .. } = event {
                println!("State: {current:?}");
            }
        })
        .open(&path)?;

    let format = stream.format();
    println!(
        "Playing {path}: {} channel(s) at {}Hz, {:.1}s",
        format.channels,
        format.sample_rate,
        format.duration().as_secs_f64()
    );

    if looping {
        println!("Looping for 10 seconds...");
        tokio::time::sleep(Duration::from_secs(10)).await;
        stream.request_stop();
    }

    let reason = stream.stopped().await;
    println!("Stopped: {reason:?}");
    println!("Stats: {:?}", stream.stats());

    Ok(())
}
