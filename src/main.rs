use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use gauss_bench::convolution::BorderMode;
use gauss_bench::{AcceleratorKind, HarnessConfig, HarnessError};

#[derive(Parser, Debug)]
#[command(
    name = "gauss-bench",
    about = "Time a Gaussian blur on a CPU buffer and on an accelerator buffer",
    version,
    long_about = None
)]
struct Cli {
    /// TOML file with harness settings; flags given here override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Input image [default: example.png]
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// JPEG written from the CPU path [default: cvMatResult.jpg]
    #[arg(long, value_name = "FILE")]
    cpu_output: Option<PathBuf>,

    /// JPEG written from the accelerator path [default: cvUMatResult.jpg]
    #[arg(long, value_name = "FILE")]
    accelerator_output: Option<PathBuf>,

    /// Kernel width and height in pixels, odd [default: 91]
    #[arg(long, short = 'k')]
    kernel_size: Option<usize>,

    /// Gaussian sigma; 0 derives it from the kernel size
    #[arg(long, visible_alias = "variance")]
    sigma: Option<f32>,

    /// Edge handling
    #[arg(long, value_enum)]
    border: Option<BorderMode>,

    /// Accelerator backend
    #[arg(long, value_enum)]
    accelerator: Option<AcceleratorKind>,

    /// Blur a single luma channel instead of RGB
    #[arg(long)]
    grayscale: bool,

    /// JPEG quality, 1-100 [default: 95]
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Timed runs per path; the mean is reported [default: 1]
    #[arg(long)]
    samples: Option<usize>,

    /// Wait for Enter before exiting
    #[arg(long)]
    interactive: bool,

    /// Print the GPU adapters wgpu can see and exit
    #[arg(long)]
    list_adapters: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut HarnessConfig) {
        if let Some(p) = &self.input {
            cfg.input_path = p.clone();
        }
        if let Some(p) = &self.cpu_output {
            cfg.cpu_output_path = p.clone();
        }
        if let Some(p) = &self.accelerator_output {
            cfg.accelerator_output_path = p.clone();
        }
        if let Some(k) = self.kernel_size {
            cfg.kernel_size = k;
        }
        if let Some(s) = self.sigma {
            cfg.sigma = s;
        }
        if let Some(b) = self.border {
            cfg.border = b;
        }
        if let Some(a) = self.accelerator {
            cfg.accelerator = a;
        }
        if let Some(q) = self.jpeg_quality {
            cfg.jpeg_quality = q;
        }
        if let Some(n) = self.samples {
            cfg.samples = n;
        }
        cfg.grayscale |= self.grayscale;
        cfg.interactive |= self.interactive;
    }
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only the report lines.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list_adapters {
        list_adapters();
        return ExitCode::SUCCESS;
    }

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let outcome = gauss_bench::run(&config, io::stdout().lock());
    if config.interactive {
        pause();
    }
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => fail(&anyhow::Error::new(e)),
    }
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)
            .map_err(HarnessError::from)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    cli.apply(&mut config);
    Ok(config)
}

fn list_adapters() {
    let adapters = gauss_bench::gpu::list_adapters();
    if adapters.is_empty() {
        println!("no GPU adapters found");
    }
    for (i, a) in adapters.iter().enumerate() {
        println!("[{i}] {a}");
    }
}

fn pause() {
    print!("Press Enter to continue...");
    // A closed stdin just ends the pause.
    let _ = io::stdout().flush();
    let _ = io::stdin().lock().read_line(&mut String::new());
}

fn fail(err: &anyhow::Error) -> ExitCode {
    eprintln!("error: {err:#}");
    let code = err
        .chain()
        .find_map(|e| e.downcast_ref::<HarnessError>())
        .map_or(1, HarnessError::exit_code);
    ExitCode::from(code)
}
