//! Shadow mapping comparison demo
//!
//! Keys `1`..`6` switch between basic, biased, PCF, PCSS, VSSM and MSM
//! shadows. The mouse wheel moves the camera along X, Escape quits.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use shadow_lab::{app, BackendType, DemoConfig, ShadowAlgorithm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Wgpu,
    Dummy,
}

impl From<BackendArg> for BackendType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Wgpu => BackendType::Wgpu,
            BackendArg::Dummy => BackendType::Dummy,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "shadow-lab", version, about = "Compare shadow mapping algorithms")]
struct Args {
    /// Initial window width
    #[arg(long, default_value_t = 1600)]
    width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 1200)]
    height: u32,

    /// Directory containing shaders/, models/ and textures/
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Rendering backend; `dummy` runs headless
    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    backend: BackendArg,

    /// Stop after rendering this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Algorithm shown on the first frame
    #[arg(long, value_enum, default_value_t = ShadowAlgorithm::Basic)]
    algorithm: ShadowAlgorithm,

    /// Wait for Enter before exiting on a fatal error
    #[arg(long)]
    wait_on_error: bool,
}

impl Args {
    fn config(&self) -> DemoConfig {
        DemoConfig {
            width: self.width,
            height: self.height,
            asset_root: self.assets.clone(),
            backend: self.backend.into(),
            vsync: !self.no_vsync,
            algorithm: self.algorithm,
            max_frames: self.max_frames,
            ..DemoConfig::default()
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config();

    log::info!(
        "Starting {} ({}x{}, {:?} backend)",
        config.title,
        config.width,
        config.height,
        config.backend
    );

    let result = match config.backend {
        BackendType::Wgpu => app::run_windowed(&config),
        BackendType::Dummy => app::run_headless(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            if args.wait_on_error {
                eprintln!("Press Enter to exit");
                let mut line = String::new();
                let _ = std::io::stdin().lock().read_line(&mut line);
            }
            ExitCode::FAILURE
        }
    }
}
