use super::{invalid, Mode, Rule, RuleResult};
use chaindns_application::ports::ResponseWriter;
use chaindns_domain::DomainError;
use hickory_proto::op::Message;
use hickory_proto::rr::{DNSClass, RecordType};
use std::str::FromStr;

fn parse_class(s: &str) -> Option<DNSClass> {
    match s.to_ascii_uppercase().as_str() {
        "IN" => Some(DNSClass::IN),
        "CH" => Some(DNSClass::CH),
        "HS" => Some(DNSClass::HS),
        "NONE" => Some(DNSClass::NONE),
        "ANY" => Some(DNSClass::ANY),
        _ => None,
    }
}

fn parse_type(s: &str) -> Option<RecordType> {
    match RecordType::from_str(&s.to_ascii_uppercase()) {
        Ok(RecordType::Unknown(_)) | Err(_) => None,
        Ok(t) => Some(t),
    }
}

/// Swaps the query class.
#[derive(Debug, Clone)]
pub struct ClassRule {
    mode: Mode,
    from: DNSClass,
    to: DNSClass,
}

impl ClassRule {
    pub fn parse(mode: Mode, args: &[&str]) -> Result<Self, DomainError> {
        let [from, to] = args else {
            return Err(invalid(args, "class rule needs FROM and TO"));
        };
        let from = parse_class(from).ok_or_else(|| invalid(args, "invalid class"))?;
        let to = parse_class(to).ok_or_else(|| invalid(args, "invalid class"))?;
        Ok(Self { mode, from, to })
    }
}

impl Rule for ClassRule {
    fn rewrite(&self, _w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        match r.queries_mut().first_mut() {
            Some(q) if q.query_class() == self.from => {
                q.set_query_class(self.to);
                Ok(RuleResult::Done)
            }
            _ => Ok(RuleResult::Ignored),
        }
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

/// Swaps the query type.
#[derive(Debug, Clone)]
pub struct TypeRule {
    mode: Mode,
    from: RecordType,
    to: RecordType,
}

impl TypeRule {
    pub fn parse(mode: Mode, args: &[&str]) -> Result<Self, DomainError> {
        let [from, to] = args else {
            return Err(invalid(args, "type rule needs FROM and TO"));
        };
        let from = parse_type(from).ok_or_else(|| invalid(args, "invalid type"))?;
        let to = parse_type(to).ok_or_else(|| invalid(args, "invalid type"))?;
        Ok(Self { mode, from, to })
    }
}

impl Rule for TypeRule {
    fn rewrite(&self, _w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        match r.queries_mut().first_mut() {
            Some(q) if q.query_type() == self.from => {
                q.set_query_type(self.to);
                Ok(RuleResult::Done)
            }
            _ => Ok(RuleResult::Ignored),
        }
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}
