use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;

/// Maps a textual level to a `log` filter. Unknown values fall back to `Info`.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" | "fatal" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Installs the global logger: stdout plus a timestamped file under `log_dir`.
///
/// Older log files of the same `app_name` are removed first so only the
/// previous run's file survives next to the new one.
pub fn setup_logging(app_name: &str, log_dir: &Path, log_level: &str) -> Result<PathBuf, fern::InitError> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    rotate_logs(app_name, log_dir);

    let log_file_name = format!("{}-{}.log", app_name, chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

/// Keeps only the newest `<app_name>-*.log` file in `log_dir`.
///
/// File names embed a sortable timestamp, so name order is age order.
pub(crate) fn rotate_logs(app_name: &str, log_dir: &Path) {
    let pattern = format!("{}/{}-*.log", log_dir.display(), app_name);
    let mut log_files: Vec<PathBuf> = match glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            eprintln!("Invalid log rotation pattern {}: {}", pattern, e);
            return;
        }
    };

    log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    for old_file in log_files.iter().skip(1) {
        if let Err(e) = fs::remove_file(old_file) {
            eprintln!("Error deleting old log file {}: {}", old_file.display(), e);
        }
    }
}
