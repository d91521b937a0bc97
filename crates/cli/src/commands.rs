//! clap command tree for the `bustrace` binary.

use clap::{Arg, ArgAction, Command};

/// Build the top-level command.
pub fn build_cli() -> Command {
    Command::new("bustrace")
        .about("Inspect trace directories written by bustrace")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("dir")
                .help("Trace directory (a run directory containing trace.log)")
                .required(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print JSON instead of text")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log store recovery details to stderr")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("records")
                .about("List records in record_id order")
                .arg(
                    Arg::new("direction")
                        .long("direction")
                        .value_parser(["sent", "received"])
                        .help("Only records of this direction"),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(clap::value_parser!(usize))
                        .help("Print at most this many records"),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Show one record by record_id")
                .arg(
                    Arg::new("record_id")
                        .required(true)
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(message_command("lookup", "Show the sent record of a message id"))
        .subcommand(message_command(
            "chain",
            "Walk from a message back to its root through first parents",
        ))
        .subcommand(message_command(
            "children",
            "List sent records that name a message as parent",
        ))
        .subcommand(message_command(
            "deliveries",
            "List received records of a message id",
        ))
        .subcommand(Command::new("summary").about("Record counts and log recovery info"))
}

fn message_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(Arg::new("message_id").required(true))
}
