use crate::CLAP_STYLING;
use crate::handlers::DEFAULT_DB_PATH;
use clap::{arg, command};

fn collection_id_arg() -> clap::Arg {
    arg!(-c --"collection" <ID>)
        .required(true)
        .help("The collection id")
        .value_parser(clap::value_parser!(i64))
}

fn spec_id_arg() -> clap::Arg {
    arg!(-s --"spec" <SPEC_ID>)
        .help("The test specification id")
        .value_parser(clap::value_parser!(i64))
}

fn id_arg(help: &'static str) -> clap::Arg {
    arg!(<ID>)
        .required(true)
        .help(help)
        .value_parser(clap::value_parser!(i64))
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("apiward")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("apiward")
        .styles(CLAP_STYLING)
        .about("Discover the API endpoints a site calls and probe them with YAML-defined security tests")
        .arg(
            arg!(-q --"quiet" "Only log warnings and hide progress spinners")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--"db" <PATH>)
                .required(false)
                .global(true)
                .help("Location of the apiward database")
                .default_value(DEFAULT_DB_PATH),
        )
        .subcommand_required(true)
        .subcommand(
            command!("init")
                .about("Creates the apiward database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the database file (defaults to --db)"),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Replace an existing database at the location")
                        .required(false),
                ),
        )
        .subcommand(
            command!("discover")
                .about(
                    "Crawl a site, render every page in a headless browser and store the API \
                endpoints the pages call as a new collection",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The site to crawl, e.g. https://example.com"),
                )
                .arg(
                    arg!(-n --"name" <NAME>)
                        .required(true)
                        .help("Name of the collection to create"),
                )
                .arg(
                    arg!(--"delay-ms" <MS>)
                        .required(false)
                        .help("Pause between page fetches")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("1000"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout while crawling")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"max-pages" <NUM>)
                        .required(false)
                        .help("Stop crawling after this many pages (default: unbounded)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-duration" <SECONDS>)
                        .required(false)
                        .help("Stop crawling after this long (default: unbounded)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"render-timeout" <SECONDS>)
                        .required(false)
                        .help("Upper bound on rendering one page in the browser")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"chrome" <PATH>)
                        .required(false)
                        .help("Chrome/Chromium executable to use instead of auto-detection")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"keep-first")
                        .required(false)
                        .help("Keep the alphabetically first endpoint, which discovery drops by default")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("collection")
                .about("Inspect and remove collections")
                .subcommand_required(true)
                .subcommand(command!("list").about("List all collections"))
                .subcommand(
                    command!("show")
                        .about("Show one collection and its endpoints")
                        .arg(id_arg("The collection id")),
                )
                .subcommand(
                    command!("delete")
                        .about("Delete a collection with all of its assessments")
                        .arg(id_arg("The collection id")),
                ),
        )
        .subcommand(
            command!("spec")
                .about("Manage test specifications")
                .subcommand_required(true)
                .subcommand(
                    command!("add")
                        .about("Store a YAML test specification")
                        .arg(
                            arg!(-n --"name" <NAME>)
                                .required(true)
                                .help("Unique name; names like 'SQL Injection' or 'BOLA' pick the category"),
                        )
                        .arg(
                            arg!(-f --"file" <PATH>)
                                .required(true)
                                .help("Path of the YAML payload"),
                        )
                        .arg(
                            arg!(-d --"description" <TEXT>)
                                .required(false)
                                .help("Free-form description"),
                        ),
                )
                .subcommand(command!("list").about("List all test specifications"))
                .subcommand(
                    command!("show")
                        .about("Show one test specification")
                        .arg(id_arg("The test specification id")),
                ),
        )
        .subcommand(
            command!("assess")
                .about("Run test specifications against a collection")
                .subcommand_required(true)
                .subcommand(
                    command!("run")
                        .about(
                            "Run every specification against every endpoint and record an \
                        assessment, or a single specification with --spec",
                        )
                        .arg(collection_id_arg())
                        .arg(spec_id_arg().required(false))
                        .arg(
                            arg!(--"timeout" <SECONDS>)
                                .required(false)
                                .help("Per-request timeout for probes")
                                .value_parser(clap::value_parser!(u64))
                                .default_value("10"),
                        )
                        .arg(
                            arg!(--"continue-on-error")
                                .required(false)
                                .help("Count failed probe requests as no match instead of aborting")
                                .action(clap::ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    command!("list")
                        .about("List the assessments of a collection")
                        .arg(collection_id_arg()),
                )
                .subcommand(
                    command!("show")
                        .about("Show one assessment with its results")
                        .arg(id_arg("The assessment id")),
                ),
        )
        .subcommand(
            command!("probe")
                .about("Run one stored specification against a single URL")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to probe"),
                )
                .arg(spec_id_arg().required(true))
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                ),
        )
}
