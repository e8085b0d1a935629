use crate::CLIError;
use bacnet_core::StackConfig;

pub fn sub_command() -> clap::App<'static, 'static> {
    clap::SubCommand::with_name("config").about("Print the default StackConfig as JSON")
}

pub fn config_matches(
    parent_logger: &slog::Logger,
    _matches: &clap::ArgMatches,
) -> Result<(), CLIError> {
    let logger = parent_logger.new(o!());
    let config = StackConfig::default();
    info!(logger, "printing default config");
    serde_json::to_writer_pretty(std::io::stdout(), &config).map_err(CLIError::SerdeJSON)?;
    println!();
    Ok(())
}
