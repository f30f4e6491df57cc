use log::LevelFilter;

/// Installs the process-wide logger writing timestamped lines to stdout.
/// Dependency crates are capped at `warn` so the websocket client stays quiet.
pub fn setup_with(level: LevelFilter) -> anyhow::Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level.min(LevelFilter::Warn))
        .level_for("waiting_list", level)
        .level_for("cli_common", level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
