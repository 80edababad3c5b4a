use apiward::handlers::{self, handle_init};
use apiward::{command_argument_builder, dispatch, exit_code, expand_path, open_database, user_message};
use colored::Colorize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries the JSON result, everything else goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    let quiet = matches.get_flag("quiet");
    init_tracing(quiet);

    let db_path = expand_path(
        matches
            .get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or(handlers::DEFAULT_DB_PATH),
    );

    let result = match matches.subcommand() {
        Some(("init", sub_matches)) => handle_init(sub_matches, &db_path),
        Some((command, sub_matches)) => match open_database(&db_path) {
            Ok(db) => dispatch(&db, command, sub_matches, !quiet).await,
            Err(e) => Err(e),
        },
        None => unreachable!("clap should ensure we don't get here"),
    };

    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), user_message(&e));
            std::process::exit(exit_code(&e));
        }
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("{} failed to render output: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}
