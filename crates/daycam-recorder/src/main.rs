//! Daily camera recorder binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use daycam_media::{
    check_ffmpeg, FfmpegCamera, FfmpegConverter, FfmpegRunner, HeadlessPreview, PreviewSink,
    TranscodePipeline,
};
use daycam_recorder::{
    DailyScheduler, PreviewMode, RecorderConfig, RecordingCycle, SystemClock,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for a terminal, JSON for unattended installs
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting daycam");

    let config = match RecorderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Recorder config: {:?}", config);

    match check_ffmpeg() {
        Ok(path) => info!(ffmpeg = %path.display(), "FFmpeg found"),
        Err(e) => warn!("{}; capture and conversion will fail until it is installed", e),
    }

    // Ctrl-C closes the current segment cleanly, then stops the scheduler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    let clock = Arc::new(SystemClock);
    let transcoder = TranscodePipeline::new(Box::new(
        FfmpegConverter::new(FfmpegRunner::new().with_timeout(config.conversion_timeout))
            .with_input_fps(config.camera.fps),
    ));

    let cycle = RecordingCycle::new(
        config.clone(),
        Box::new(FfmpegCamera::new(config.camera.clone())),
        preview_sink(config.preview),
        transcoder,
        RecordingCycle::model_loader(),
        clock.clone(),
        shutdown_rx.clone(),
    );

    DailyScheduler::new(cycle, config.window, config.poll_interval, clock, shutdown_rx)
        .run_forever()
        .await;

    info!("Recorder shutdown complete");
}

#[cfg(feature = "opencv")]
fn preview_sink(mode: PreviewMode) -> Box<dyn PreviewSink> {
    match mode {
        PreviewMode::Window => Box::new(daycam_media::WindowPreview::new("daycam")),
        PreviewMode::Headless => Box::new(HeadlessPreview::new()),
    }
}

#[cfg(not(feature = "opencv"))]
fn preview_sink(mode: PreviewMode) -> Box<dyn PreviewSink> {
    if mode == PreviewMode::Window {
        warn!("Preview window needs the `opencv` feature, running headless");
    }
    Box::new(HeadlessPreview::new())
}
