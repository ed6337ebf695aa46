use std::{
    fmt,
    fs::File,
    path::Path,
    time::{Duration, Instant, SystemTime},
};
use tracing_subscriber::{
    fmt::{format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use crate::config::LogConfig;

/// Install a subscriber for the shim's own diagnostics, if logging was asked for.
///
/// `RUST_LOG` belongs to the host process, so the filter only ever comes from [crate::config::LOG_VAR].
pub fn create_subscriber(config: &LogConfig) -> eyre::Result<()> {
    let Some(directives) = config.directives.as_deref() else {
        return Ok(());
    };
    let env_filter = || EnvFilter::try_new(directives);
    let timer = SinceLoad::now();
    let format = tracing_subscriber::fmt::format()
        .with_source_location(false)
        .with_file(true)
        .with_timer(timer);

    let file_format = tracing_subscriber::fmt::format()
        .with_source_location(true)
        .with_file(true)
        .with_timer(timer)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .event_format(format)
            .with_filter(env_filter()?),
    );

    if let Some(log_file_dir) = &config.file_dir {
        let file_subscriber = get_log_file(log_file_dir)?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_subscriber)
            .event_format(file_format)
            .with_filter(env_filter()?);
        subscriber.with(file_layer).try_init()?;
    } else {
        subscriber.try_init()?;
    }

    Ok(())
}

/// Time since the shim was loaded into the host, millisecond resolution since socket calls come in bursts.
#[derive(Clone, Copy)]
struct SinceLoad(Instant);

impl SinceLoad {
    fn now() -> Self {
        SinceLoad(Instant::now())
    }

    fn write_elapsed(elapsed: Duration, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "+{}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis())
    }
}

impl FormatTime for SinceLoad {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        Self::write_elapsed(self.0.elapsed(), w)
    }
}

/// One file per process, several preloaded processes may share a directory.
fn get_log_file(log_file_dir: impl AsRef<Path>) -> eyre::Result<File> {
    let now = std::time::SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?;

    let file = log_file_dir
        .as_ref()
        .join(format!("freebind_{}_{}.txt", now.as_secs(), std::process::id()));
    Ok(std::fs::OpenOptions::new()
        .truncate(true)
        .create(true)
        .write(true)
        .open(file)?)
}
