use super::{expand_groups, invalid, set_qname, Mode, ResponseRule, Rule, RuleResult};
use chaindns_application::ports::ResponseWriter;
use chaindns_domain::dnsutil::{name_to_string, normalize};
use chaindns_domain::DomainError;
use fancy_regex::Regex;
use hickory_proto::op::Message;

#[derive(Debug, Clone)]
pub enum NameMatch {
    Exact { from: String, to: String },
    Prefix { prefix: String, replacement: String },
    Suffix { suffix: String, replacement: String },
    Substring { substring: String, replacement: String },
    Regex { pattern: Regex, replacement: String },
}

impl NameMatch {
    pub(super) fn parse(
        kind: &str,
        from: &str,
        to: &str,
        args: &[&str],
    ) -> Result<Self, DomainError> {
        let matcher = match kind.to_ascii_lowercase().as_str() {
            "exact" => Self::Exact {
                from: normalize(from),
                to: normalize(to),
            },
            "prefix" => Self::Prefix {
                prefix: from.to_ascii_lowercase(),
                replacement: to.to_ascii_lowercase(),
            },
            "suffix" => Self::Suffix {
                suffix: normalize(from),
                replacement: normalize(to),
            },
            "substring" => Self::Substring {
                substring: from.to_ascii_lowercase(),
                replacement: to.to_ascii_lowercase(),
            },
            "regex" => Self::Regex {
                pattern: compile(from, args)?,
                replacement: normalize(to),
            },
            _ => return Err(invalid(args, "unknown name match type")),
        };
        Ok(matcher)
    }

    pub(super) fn matches(&self, name: &str) -> Result<bool, DomainError> {
        Ok(self.apply(name)?.is_some())
    }

    /// The rewritten name, or `None` when `name` does not match.
    fn apply(&self, name: &str) -> Result<Option<String>, DomainError> {
        let out = match self {
            NameMatch::Exact { from, to } => (name == from).then(|| to.clone()),
            NameMatch::Prefix {
                prefix,
                replacement,
            } => name
                .strip_prefix(prefix.as_str())
                .map(|rest| format!("{}{}", replacement, rest)),
            NameMatch::Suffix {
                suffix,
                replacement,
            } => name
                .strip_suffix(suffix.as_str())
                .map(|rest| format!("{}{}", rest, replacement)),
            NameMatch::Substring {
                substring,
                replacement,
            } => name
                .contains(substring.as_str())
                .then(|| name.replace(substring.as_str(), replacement)),
            NameMatch::Regex {
                pattern,
                replacement,
            } => {
                let caps = pattern
                    .captures(name)
                    .map_err(|e| DomainError::InvalidRewrite(e.to_string()))?;
                caps.map(|caps| {
                    let groups: Vec<&str> = caps
                        .iter()
                        .map(|m| m.map(|m| m.as_str()).unwrap_or(""))
                        .collect();
                    expand_groups(replacement, &groups)
                })
            }
        };
        Ok(out)
    }
}

fn compile(pattern: &str, args: &[&str]) -> Result<Regex, DomainError> {
    Regex::new(pattern).map_err(|e| invalid(args, &format!("invalid regex: {}", e)))
}

/// Rewrites the query name.
#[derive(Debug, Clone)]
pub struct NameRule {
    mode: Mode,
    matcher: NameMatch,
    response: Option<ResponseRule>,
}

impl NameRule {
    /// `FROM TO`, `MATCH FROM TO` or
    /// `regex FROM TO answer name FROM TO`.
    pub fn parse(mode: Mode, args: &[&str]) -> Result<Self, DomainError> {
        let (kind, from, to) = match args {
            [from, to] => ("exact", *from, *to),
            [kind, from, to] | [kind, from, to, _, _, _, _] => (*kind, *from, *to),
            _ => return Err(invalid(args, "name rule needs FROM and TO")),
        };

        let matcher = NameMatch::parse(kind, from, to, args)?;

        let response = match args {
            [_, _, _, answer, field, from, to] => {
                if !matches!(matcher, NameMatch::Regex { .. }) {
                    return Err(invalid(args, "answer rewrites need a regex name rule"));
                }
                if !answer.eq_ignore_ascii_case("answer") || !field.eq_ignore_ascii_case("name") {
                    return Err(invalid(args, "expected `answer name FROM TO`"));
                }
                Some(ResponseRule::Name {
                    pattern: compile(from, args)?,
                    replacement: normalize(to),
                })
            }
            _ => None,
        };

        Ok(Self {
            mode,
            matcher,
            response,
        })
    }
}

impl Rule for NameRule {
    fn rewrite(&self, _w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        let Some(name) = r.queries().first().map(|q| name_to_string(q.name())) else {
            return Ok(RuleResult::Ignored);
        };
        match self.matcher.apply(&name)? {
            Some(rewritten) => {
                set_qname(r, &rewritten)?;
                Ok(RuleResult::Done)
            }
            None => Ok(RuleResult::Ignored),
        }
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn response_rule(&self) -> Option<ResponseRule> {
        self.response.clone()
    }
}
