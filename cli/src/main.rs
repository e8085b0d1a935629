use slog::Drain;
#[macro_use]
extern crate slog;

use std::convert::TryFrom;

pub mod commands;

pub enum CLIError {
    IOError(String, std::io::Error),
    Clap(clap::Error),
    SerdeJSON(serde_json::Error),
}

fn main() {
    let app = clap::App::new("BACnet Core CLI")
        .version(clap::crate_version!())
        .author("Andrew Gilbrough <andrew@gilbrough.com>")
        .about("Demo/inspection tool for the bacnet_core transaction-layer engine")
        .arg(
            clap::Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .max_values(5)
                .help("Set the amount of logging from level 0 up to level 5"),
        )
        .subcommand(commands::config::sub_command())
        .subcommand(commands::demo::sub_command());
    let matches = app.get_matches();

    let log_level = slog::Level::from_usize(
        1 + usize::try_from(matches.occurrences_of("verbose"))
            .expect("verbose usize overflow (how??)"),
    )
    .expect("verbose limit set too low");
    let drain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let root = slog::Logger::root(
        slog::LevelFilter::new(slog_term::FullFormat::new(drain).build().fuse(), log_level).fuse(),
        slog::o!(),
    );
    slog_stdlog::init().ok();

    trace!(root, "main");
    let sub_cmd = matches.subcommand().0;
    debug!(root, "arg_match"; "sub_command" => sub_cmd);
    if let Err(e) = (|| -> Result<(), CLIError> {
        match matches.subcommand() {
            ("", None) => error!(root, "no command given"),
            ("config", Some(config_matches)) => commands::config::config_matches(&root, config_matches)?,
            ("demo", Some(demo_matches)) => commands::demo::demo_matches(&root, demo_matches)?,
            _ => unreachable!("unhandled sub_command"),
        }
        debug!(root, "matches_done");
        Ok(())
    })() {
        use std::io::Write;
        let mut stderr = std::io::stderr();
        match e {
            CLIError::IOError(path, error) => {
                writeln!(&mut stderr, "io error {} with path '{}'", error, path).ok()
            }
            CLIError::Clap(error) => writeln!(&mut stderr, "{}", &error.message).ok(),
            CLIError::SerdeJSON(error) => writeln!(&mut stderr, "json error {}", error).ok(),
        };
        std::process::exit(1);
    }
}
