//! ArgMatches → Query conversion.

use bustrace_core::Direction;
use clap::ArgMatches;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// All records, optionally filtered and limited
    Records {
        direction: Option<Direction>,
        limit: Option<usize>,
    },
    /// One record by id
    Get { record_id: u64 },
    /// Sent record of a message id
    Lookup { message_id: String },
    /// Ancestor chain of a message id
    Chain { message_id: String },
    /// Sent children of a message id
    Children { message_id: String },
    /// Received records of a message id
    Deliveries { message_id: String },
    /// Counts and recovery info
    Summary,
}

/// Convert clap ArgMatches into a Query.
pub fn matches_to_query(matches: &ArgMatches) -> Result<Query, String> {
    let (sub_name, m) = matches
        .subcommand()
        .ok_or_else(|| "No command provided".to_string())?;

    match sub_name {
        "records" => {
            let direction = match m.get_one::<String>("direction").map(String::as_str) {
                Some("sent") => Some(Direction::Sent),
                Some("received") => Some(Direction::Received),
                Some(other) => return Err(format!("Unknown direction: {}", other)),
                None => None,
            };
            let limit = m.get_one::<usize>("limit").copied();
            Ok(Query::Records { direction, limit })
        }
        "get" => {
            let record_id = *m
                .get_one::<u64>("record_id")
                .ok_or("Missing record_id")?;
            Ok(Query::Get { record_id })
        }
        "lookup" => Ok(Query::Lookup {
            message_id: message_id(m)?,
        }),
        "chain" => Ok(Query::Chain {
            message_id: message_id(m)?,
        }),
        "children" => Ok(Query::Children {
            message_id: message_id(m)?,
        }),
        "deliveries" => Ok(Query::Deliveries {
            message_id: message_id(m)?,
        }),
        "summary" => Ok(Query::Summary),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn message_id(m: &ArgMatches) -> Result<String, String> {
    m.get_one::<String>("message_id")
        .cloned()
        .ok_or_else(|| "Missing message_id".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build_cli;

    fn parse(args: &[&str]) -> Query {
        let matches = build_cli().try_get_matches_from(args).unwrap();
        matches_to_query(&matches).unwrap()
    }

    #[test]
    fn test_records_with_filters() {
        assert_eq!(
            parse(&["bustrace", "/tmp/run", "records", "--direction", "sent", "--limit", "5"]),
            Query::Records {
                direction: Some(Direction::Sent),
                limit: Some(5)
            }
        );
        assert_eq!(
            parse(&["bustrace", "/tmp/run", "records"]),
            Query::Records {
                direction: None,
                limit: None
            }
        );
    }

    #[test]
    fn test_get_parses_id() {
        assert_eq!(
            parse(&["bustrace", "/tmp/run", "get", "42"]),
            Query::Get { record_id: 42 }
        );
        assert!(build_cli()
            .try_get_matches_from(["bustrace", "/tmp/run", "get", "x"])
            .is_err());
    }

    #[test]
    fn test_message_commands() {
        assert_eq!(
            parse(&["bustrace", "/tmp/run", "chain", "abc"]),
            Query::Chain {
                message_id: "abc".into()
            }
        );
        assert_eq!(
            parse(&["bustrace", "/tmp/run", "--json", "lookup", "abc"]),
            Query::Lookup {
                message_id: "abc".into()
            }
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(build_cli()
            .try_get_matches_from(["bustrace", "/tmp/run"])
            .is_err());
    }
}
