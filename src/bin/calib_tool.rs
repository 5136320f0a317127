use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use stereo_calib::core::CALIB_LOG_ENV;
use stereo_calib::io::CalibrationFormat;
use stereo_calib::{init_thread_pool, CalibConfig, StereoCameraCalibration, StereoRectificationMaps};
use tracing::level_filters::LevelFilter;

/// Inspect, convert and rectify stereo calibration files.
#[derive(Debug, Parser)]
#[command(name = "calib-tool", version)]
struct Args {
    /// trace|debug|info|warn|error|off. Overrides CALIB_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Worker threads for remap generation. Overrides RUSTCV_CPU_THREADS.
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a summary of a calibration file.
    Info { path: PathBuf },
    /// Re-save a calibration; the output extension picks the format.
    Convert { input: PathBuf, output: PathBuf },
    /// Print rectified projections and the disparity-to-depth matrix.
    Rectify { path: PathBuf },
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, rejected_env) =
        resolve_config(args.log_level.as_deref(), std::env::var(CALIB_LOG_ENV).ok())?;
    init_logging(config.log_level);
    if let Some(raw) = rejected_env {
        tracing::warn!("{} has unrecognised value '{}', using 'info'", CALIB_LOG_ENV, raw);
    }

    match args.command {
        Command::Info { path } => info(&path, &config),
        Command::Convert { input, output } => convert(&input, &output, &config),
        Command::Rectify { path } => rectify(&path, args.threads, &config),
    }
}

/// `--log-level` wins over `CALIB_LOG`. A bad flag is an error; a bad
/// environment value falls back to INFO and is returned for reporting once
/// logging is up.
fn resolve_config(
    flag: Option<&str>,
    env: Option<String>,
) -> Result<(CalibConfig, Option<String>), String> {
    match flag {
        Some(raw) => {
            let level = stereo_calib::core::parse_log_level(raw)
                .ok_or_else(|| format!("unrecognised log level '{raw}'"))?;
            Ok((CalibConfig::new(level), None))
        }
        None => Ok(CalibConfig::from_log_setting(env)),
    }
}

fn init_logging(level: LevelFilter) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn format_name(path: &Path) -> &'static str {
    match CalibrationFormat::from_path(path) {
        CalibrationFormat::JsonV2 => "json v2",
        CalibrationFormat::BinaryV1 => "binary v1",
    }
}

fn summary(path: &Path, data: &StereoCameraCalibration) -> String {
    let mut out = format!("{} ({})\n", path.display(), format_name(path));
    let size = data.view[0].image_size_pixels;
    out += &format!("  model:      {}\n", data.view[0].distortion_model());
    out += &format!("  resolution: {}x{}\n", size.width, size.height);
    for (name, view) in ["left", "right"].iter().zip(&data.view) {
        out += &format!(
            "  {name:<6} fx={:.3} fy={:.3} cx={:.3} cy={:.3} distortion={:?}\n",
            view.fx(),
            view.fy(),
            view.cx(),
            view.cy(),
            view.distortion.coefficients()
        );
    }
    out += &format!("  baseline:   {:.6}\n", data.camera_translation.norm());
    out
}

fn info(path: &Path, config: &CalibConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data = stereo_calib::load_with(path, config)?;
    print!("{}", summary(path, &data));
    Ok(())
}

fn convert(input: &Path, output: &Path, config: &CalibConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data = stereo_calib::load_with(input, config)?;
    stereo_calib::save_with(output, &data, config)?;
    println!(
        "{} ({}) -> {} ({})",
        input.display(),
        format_name(input),
        output.display(),
        format_name(output)
    );
    Ok(())
}

fn rectify(
    path: &Path,
    threads: Option<usize>,
    config: &CalibConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let workers = init_thread_pool(threads)?;
    tracing::debug!("remap generation uses {} threads", workers);

    let data = stereo_calib::load_with(path, config)?;
    let maps = StereoRectificationMaps::new(&data, config)?;
    for (name, view) in ["left", "right"].iter().zip(&maps.view) {
        println!("{name} R ={}", view.rotation);
        println!("{name} P ={}", view.projection);
    }
    println!("Q ={}", maps.disparity_to_depth);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "calib-tool",
            "convert",
            "a.bin",
            "b.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(matches!(args.command, Command::Convert { .. }));
    }

    #[test]
    fn bad_env_level_is_returned_for_later_warning() {
        let (config, rejected) = resolve_config(None, Some("loud".to_string())).unwrap();
        assert_eq!(config, CalibConfig::default());
        assert_eq!(rejected.as_deref(), Some("loud"));

        let (config, rejected) = resolve_config(Some("warn"), Some("loud".to_string())).unwrap();
        assert_eq!(config.log_level, LevelFilter::WARN);
        assert_eq!(rejected, None);

        assert!(resolve_config(Some("loud"), None).is_err());
    }

    #[test]
    fn format_names_follow_extension() {
        assert_eq!(format_name(Path::new("x.json")), "json v2");
        assert_eq!(format_name(Path::new("x.JSON")), "binary v1");
    }
}
