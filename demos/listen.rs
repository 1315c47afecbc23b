//! Listen to an audio upstream and record the stream.
//!
//! Connects to the audio proxy, negotiates, and records every segment into
//! a headless surface. On Ctrl+C the recorded container stream is written to
//! a file that any player for the codec can open.
//!
//! Usage:
//!
//! ```text
//! cargo run --example listen -- --host 127.0.0.1 --port 6081 --codec opus \
//!     --secret hunter2 --out audio.webm [--debug]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use remote_audio::{
    AudioSettings, Codec, Completion, LifecycleHandle, LifecycleState, MemorySurface,
    MemorySurfaceOptions, Result, TracingStatusSink,
};

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    host: String,
    port: u16,
    codec: Codec,
    secret: Option<String>,
    out: PathBuf,
    debug: bool,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let codec: Codec = value("--codec").as_deref().unwrap_or("opus").parse()?;
        let port = match value("--port") {
            Some(port) => port
                .parse()
                .map_err(|_| remote_audio::Error::config(format!("invalid port: {port}")))?,
            None => 6081,
        };
        let out = value("--out").map_or_else(
            || PathBuf::from(format!("audio.{}", extension(codec))),
            PathBuf::from,
        );

        Ok(Self {
            host: value("--host").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            codec,
            secret: value("--secret"),
            out,
            debug: args.iter().any(|a| a == "--debug"),
        })
    }
}

// ============================================================================
// Functions
// ============================================================================

fn extension(codec: Codec) -> &'static str {
    match codec {
        Codec::Opus | Codec::Vorbis => "webm",
        Codec::Aac => "mp4",
    }
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "remote_audio=debug"
    } else {
        "remote_audio=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse()?;
    init_logging(args.debug);

    let mut builder = AudioSettings::builder()
        .enabled(true)
        .host(&args.host)
        .port(args.port)
        .codec(args.codec)
        .connect_timeout(Duration::from_secs(5));
    if let Some(secret) = &args.secret {
        builder = builder.secret(secret);
    }
    let settings = builder.build()?;

    let surface = MemorySurface::new(
        MemorySurfaceOptions::default()
            .with_completion(Completion::Spawned)
            .with_bytes_per_second(f64::from(settings.bitrate) / 8.0),
    );
    let probe = surface.probe();

    let lifecycle =
        LifecycleHandle::spawn(settings, move || surface.clone(), TracingStatusSink)?;

    println!("Connecting to {}:{} ({})", args.host, args.port, args.codec);
    lifecycle.connected()?;
    // Headless, so there is no real gesture to wait for
    lifecycle.user_gesture()?;

    let mut state_rx = lifecycle.subscribe();
    println!("Press Ctrl+C to stop...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                println!("[State] {state}");
                if state == LifecycleState::Idle {
                    println!("Session ended, see log for the reason");
                }
            }
        }
    }

    lifecycle.disconnected().await?;
    lifecycle.shutdown().await;

    let segments = probe.appended();
    let data: Vec<u8> = segments.iter().flat_map(|s| s.iter().copied()).collect();
    tokio::fs::write(&args.out, &data).await?;

    println!(
        "Wrote {} segments ({} bytes) to {}",
        segments.len(),
        data.len(),
        args.out.display()
    );

    Ok(())
}
