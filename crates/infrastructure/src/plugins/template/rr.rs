//! Single resource records in zone file presentation format, read with the
//! hickory zone parser.

use chaindns_domain::DomainError;
use hickory_proto::rr::{Name, Record};
use hickory_proto::serialize::txt::Parser;

pub const DEFAULT_TTL: u32 = 3600;

fn malformed(line: &str, why: impl std::fmt::Display) -> DomainError {
    DomainError::MalformedRecord(format!("{}: {}", why, line))
}

/// Parses `owner [ttl] [class] type rdata...`. A missing TTL is
/// [`DEFAULT_TTL`] and a missing class IN. Relative names are taken to be
/// below the root. Anything other than exactly one record is rejected.
pub fn parse_record(line: &str) -> Result<Record, DomainError> {
    if line.contains(['\n', '\r']) || line.trim_start().starts_with('$') {
        return Err(malformed(line, "expected a single record"));
    }
    let zone = format!("$TTL {}\n{}\n", DEFAULT_TTL, line);
    let (_, sets) = Parser::new(zone, None, Some(Name::root()))
        .parse()
        .map_err(|e| malformed(line, e))?;

    let mut records = sets.into_values().flat_map(|set| set.into_iter());
    match (records.next(), records.next()) {
        (Some(record), None) => Ok(record),
        (None, _) => Err(malformed(line, "no record")),
        (Some(_), Some(_)) => Err(malformed(line, "expected a single record")),
    }
}
