pub mod commands;
pub mod handlers;

pub use commands::command_argument_builder;
pub use handlers::{
    DEFAULT_DB_PATH, discovery_options, dispatch, exit_code, expand_path, load_payload,
    open_database, parse_target_url, user_message,
};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
