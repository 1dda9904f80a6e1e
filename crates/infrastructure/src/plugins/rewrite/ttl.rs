use super::name::NameMatch;
use super::{invalid, Mode, ResponseRule, Rule, RuleResult};
use chaindns_application::ports::ResponseWriter;
use chaindns_domain::dnsutil::name_to_string;
use chaindns_domain::DomainError;
use hickory_proto::op::Message;

/// Overrides the TTL of answers to matching names. The request itself is
/// left alone.
#[derive(Debug, Clone)]
pub struct TtlRule {
    mode: Mode,
    matcher: NameMatch,
    ttl: u32,
}

impl TtlRule {
    /// `NAME SECONDS` or `MATCH NAME SECONDS`.
    pub fn parse(mode: Mode, args: &[&str]) -> Result<Self, DomainError> {
        let (kind, name, ttl) = match args {
            [name, ttl] => ("exact", *name, *ttl),
            [kind, name, ttl] => (*kind, *name, *ttl),
            _ => return Err(invalid(args, "ttl rule needs a name and a ttl")),
        };
        let ttl = ttl
            .parse::<u32>()
            .map_err(|_| invalid(args, "invalid ttl"))?;
        let matcher = NameMatch::parse(kind, name, name, args)?;
        Ok(Self { mode, matcher, ttl })
    }
}

impl Rule for TtlRule {
    fn rewrite(&self, _w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        let Some(name) = r.queries().first().map(|q| name_to_string(q.name())) else {
            return Ok(RuleResult::Ignored);
        };
        if self.matcher.matches(&name)? {
            Ok(RuleResult::Done)
        } else {
            Ok(RuleResult::Ignored)
        }
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn response_rule(&self) -> Option<ResponseRule> {
        Some(ResponseRule::Ttl(self.ttl))
    }
}
