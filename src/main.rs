//! Argus real-time detection viewer

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus::capture::SourceFactory;
use argus::detect::NullDetector;
use argus::display::{dispatch_channel, LogPresenter, Presenter, PresentationPump};
use argus::{Config, Detector, PipelineController, PipelineState};
use clap::Parser;
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "argus", version, about = "Camera -> object detection -> live view")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "ARGUS_CONFIG")]
    config: Option<PathBuf>,

    /// Capture device index (/dev/videoN)
    #[arg(short, long)]
    device: Option<u32>,

    /// YOLO ONNX model
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Show the raw, unmirrored image
    #[arg(long)]
    no_flip: bool,

    /// Offer only every Nth captured frame to the detector
    #[arg(long)]
    frame_skip: Option<usize>,

    /// Log results instead of opening a window
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(device) = cli.device {
        config.capture.device_index = Some(device);
    }
    if let Some(model) = cli.model.clone() {
        config.detector.model_path = Some(model);
    }
    if cli.no_flip {
        config.pipeline.flip = false;
    }
    if let Some(n) = cli.frame_skip {
        config.pipeline.frame_skip = n.max(1);
    }

    info!("Argus launching...");

    let (dispatcher, pump) = dispatch_channel(config.pipeline.dispatch_capacity);
    let controller = PipelineController::new(
        &config,
        source_factory(),
        build_detector(&config)?,
        dispatcher,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    controller.start()?;
    run_presenter(&config, cli.headless, &controller, &pump, &shutdown)?;
    controller.stop();

    if let Some(fault) = controller.last_fault() {
        warn!("Last run ended with: {}", fault);
    }
    let metrics = controller.metrics();
    info!(
        seen = metrics.total_frames_seen,
        processed = metrics.processed_frames,
        "Argus shutting down ({:.1}% processed)",
        metrics.efficiency_percent
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("argus=info"));
    let registry = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()),
    );

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

#[cfg(feature = "v4l2-capture")]
fn source_factory() -> SourceFactory {
    use argus::capture::{FrameSource, V4l2Source};
    Box::new(|config| {
        V4l2Source::open_configured(config).map(|s| Box::new(s) as Box<dyn FrameSource>)
    })
}

#[cfg(not(feature = "v4l2-capture"))]
fn source_factory() -> SourceFactory {
    use argus::capture::{FrameSource, SyntheticSource};
    warn!("Built without V4L2 support, using the synthetic test pattern");
    Box::new(|_| Ok(Box::new(SyntheticSource::new()) as Box<dyn FrameSource>))
}

fn build_detector(config: &Config) -> Result<Box<dyn Detector>> {
    #[cfg(feature = "yolo-tract")]
    if let Some(path) = &config.detector.model_path {
        let yolo = argus::detect::tract::TractYolo::load(
            path,
            config.detector.input_size,
            config.detector.labels.clone(),
        )?;
        return Ok(Box::new(yolo));
    }

    if config.detector.model_path.is_some() {
        warn!("Built without a detector backend, ignoring the model path");
    } else {
        warn!("No model configured, running capture only");
    }
    Ok(Box::new(NullDetector))
}

/// Drive the presenter on this thread until interrupted or the pipeline stops.
fn run_presenter(
    config: &Config,
    headless: bool,
    controller: &PipelineController,
    pump: &PresentationPump,
    shutdown: &AtomicBool,
) -> Result<()> {
    if !headless {
        #[cfg(feature = "sdl-display")]
        return run_window(config, controller, pump, shutdown);
    }

    let mut presenter = LogPresenter::new(config.display.log_every);
    pump_until_stopped(&mut presenter, controller, pump, shutdown);
    Ok(())
}

#[cfg(feature = "sdl-display")]
fn run_window(
    config: &Config,
    controller: &PipelineController,
    pump: &PresentationPump,
    shutdown: &AtomicBool,
) -> Result<()> {
    let sdl_context = sdl2::init().map_err(|e| color_eyre::eyre::eyre!(e))?;
    let mut presenter = argus::display::Sdl2Presenter::new(
        &sdl_context,
        config.display.width,
        config.display.height,
    )?;

    while !shutdown.load(Ordering::SeqCst) && !presenter.quit_requested() {
        pump.pump(&mut presenter, Duration::from_millis(16));
        if controller.state() == PipelineState::Stopped {
            break;
        }
    }
    pump.try_pump(&mut presenter);
    Ok(())
}

fn pump_until_stopped(
    presenter: &mut dyn Presenter,
    controller: &PipelineController,
    pump: &PresentationPump,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::SeqCst) {
        pump.pump(presenter, Duration::from_millis(100));
        if controller.state() == PipelineState::Stopped {
            break;
        }
    }
    // deliver the final status
    pump.try_pump(presenter);
}
