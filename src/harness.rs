// harness.rs — One benchmark run, start to finish.
//
//   1. validate config, resolve kernel
//   2. load input                         -> LoadFailure
//   3. CPU blur (timed), write output     -> WriteFailure
//   4. acquire accelerator, upload        -> TransferFailure
//   5. accelerator blur (timed)           -> BlurFailure
//   6. download, write output             -> TransferFailure / WriteFailure
//
// The CPU output is written before the accelerator is touched, so a broken
// accelerator still leaves the reference result on disk. A load failure
// aborts before anything is written.

use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::accel::Accelerator;
use crate::config::HarnessConfig;
use crate::convolution::gaussian_blur;
use crate::error::HarnessError;
use crate::io::{load_image, write_jpeg};
use crate::report::Reporter;
use crate::timing::{measure, Measurement};

/// Outcome of one timed path.
#[derive(Debug, Clone)]
pub struct PathReport {
    pub width: usize,
    pub height: usize,
    pub measurement: Measurement,
    pub output: PathBuf,
}

/// Everything a run produced, for callers that want more than the console.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub kernel_size: usize,
    pub sigma: f32,
    pub cpu: PathReport,
    pub accelerator: PathReport,
    pub backend: String,
}

/// Execute a benchmark run, writing the console lines to `out`.
pub fn run<W: Write>(config: &HarnessConfig, out: W) -> Result<RunReport, HarnessError> {
    let params = config.validate()?;
    let k = params.kernel_size;
    info!(
        kernel_size = k,
        sigma = params.effective_sigma(),
        border = %params.border,
        samples = config.samples,
        "blur parameters"
    );

    let mut report = Reporter::new(out);
    report.reading(&config.input_path)?;
    let source = load_image(&config.input_path, config.layout())?;
    let (w, h) = (source.width(), source.height());

    // CPU path
    report.announce(k, "CPU buffer")?;
    let (cpu_result, cpu_time) = measure("cpu", config.samples, || {
        Ok::<_, HarnessError>(gaussian_blur(&source, &params))
    })?;
    report.duration("CPU", w, h, cpu_time.reported_millis())?;
    write_jpeg(&cpu_result, &config.cpu_output_path, config.jpeg_quality)?;

    // Accelerator path
    let accel = Accelerator::acquire(config.accelerator).map_err(HarnessError::TransferFailure)?;
    let backend = accel.name();
    let device_src = accel.upload(&source).map_err(HarnessError::TransferFailure)?;

    report.announce(k, &format!("accelerator buffer ({backend})"))?;
    let (device_result, accel_time) =
        measure("accelerator", config.samples, || accel.blur(&device_src, &params))
            .map_err(HarnessError::BlurFailure)?;
    report.duration(
        "Accelerator",
        device_src.width(),
        device_src.height(),
        accel_time.reported_millis(),
    )?;

    let accel_result = accel.download(&device_result).map_err(HarnessError::TransferFailure)?;
    write_jpeg(&accel_result, &config.accelerator_output_path, config.jpeg_quality)?;

    info!(
        cpu_ms = cpu_time.reported_millis() as u64,
        accelerator_ms = accel_time.reported_millis() as u64,
        "run complete"
    );

    Ok(RunReport {
        kernel_size: k,
        sigma: params.effective_sigma(),
        cpu: PathReport {
            width: w,
            height: h,
            measurement: cpu_time,
            output: config.cpu_output_path.clone(),
        },
        accelerator: PathReport {
            width: device_src.width(),
            height: device_src.height(),
            measurement: accel_time,
            output: config.accelerator_output_path.clone(),
        },
        backend,
    })
}
