//! Raw-cam-capture simulator: runs one exposure against the scripted camera.
//!
//! Without `--raw-file` the simulated camera produces a synthetic gradient
//! decoded by the mock decoder. With it, the given RAW file is served as the
//! camera's payload and decoded by rawloader.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use raw_cam_capture::mock::{encode_test_raw, generate_plane, MockDecoder, MockSdk, TestPattern};
use raw_cam_capture::{
    Camera, CameraConfig, CameraError, CaptureState, RawDecoder, RawloaderDecoder, ThreadScheduler,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SYNTHETIC_WIDTH: u32 = 64;
const SYNTHETIC_HEIGHT: u32 = 48;

#[derive(Debug, Parser)]
#[command(name = "raw-cam-capture", about = "Simulated tethered RAW capture")]
struct Args {
    /// Exposure duration in seconds
    #[arg(short, long, default_value_t = 0.01)]
    duration: f64,

    /// Use a simulated body that supports bulb exposures
    #[arg(long)]
    bulb: bool,

    /// RAW file served as the camera payload
    #[arg(long)]
    raw_file: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, default_value = "rawcam.toml")]
    config: PathBuf,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> raw_cam_capture::Result<()> {
    let args = Args::parse();
    let config = CameraConfig::load_from(&args.config)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &args.raw_file {
        Some(path) => {
            let payload = std::fs::read(path).map_err(|err| {
                CameraError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
            })?;
            capture(simulated_body(&args, payload), RawloaderDecoder::new(), &args, &config)
        }
        None => {
            let plane = generate_plane(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, TestPattern::Gradient);
            let payload = encode_test_raw(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, &plane);
            capture(simulated_body(&args, payload), MockDecoder::new(), &args, &config)
        }
    }
}

fn simulated_body(args: &Args, payload: Vec<u8>) -> MockSdk {
    let sdk = MockSdk::new().with_raw_payload(payload);
    if args.bulb {
        sdk
    } else {
        sdk.without_bulb()
    }
}

fn capture<D: RawDecoder + Send + 'static>(
    sdk: MockSdk,
    decoder: D,
    args: &Args,
    config: &CameraConfig,
) -> raw_cam_capture::Result<()> {
    let camera = Camera::new(sdk, decoder, Arc::new(ThreadScheduler), config);
    camera.connect()?;

    if let Some(device) = camera.device_info() {
        println!("Device: {} (firmware {})", device.product, device.firmware);
    }
    println!(
        "Exposure range: {}..={} s, bulb: {}",
        camera.exposure_min()?,
        camera.exposure_max()?,
        camera.can_bulb()?
    );
    println!("ISO range: {}..={}", camera.gain_min()?, camera.gain_max()?);

    camera.start_exposure(args.duration, true)?;
    let started = Instant::now();
    while camera.state() == CaptureState::Exposing {
        thread::sleep(POLL_INTERVAL);
    }
    info!(elapsed = ?started.elapsed(), "exposure finished");

    if !camera.image_ready() {
        return Err(CameraError::ImageNotReady);
    }
    let image = camera.retrieve_image()?;
    println!("Image: {}x{}", image.width, image.height);
    if let Some((min, max)) = image.sample_range() {
        println!("Samples: {min}..={max}");
    }

    camera.disconnect()?;
    camera.shutdown();
    Ok(())
}
