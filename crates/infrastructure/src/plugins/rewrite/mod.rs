//! Request rewriting with the answer put back into the shape the client
//! asked for.

mod class_type;
mod edns0;
mod name;
mod reverter;
mod ttl;

pub use class_type::{ClassRule, TypeRule};
pub use edns0::{Edns0Action, Edns0LocalRule, Edns0NsidRule, Edns0SubnetRule, Edns0VariableRule};
pub use name::{NameMatch, NameRule};
pub use reverter::ResponseReverter;
pub use ttl::TtlRule;

use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, ResponseWriter};
use chaindns_application::{client_write, next_or_failure, Next};
use chaindns_domain::config::RewriteConfig;
use chaindns_domain::dnsutil::{reply_to, to_name};
use chaindns_domain::DomainError;
use fancy_regex::Regex;
use hickory_proto::op::{Message, Query, ResponseCode};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleResult {
    Ignored,
    Done,
    /// Stop and answer with this rcode without calling the rest of the chain.
    /// The question is restored before the reply is written.
    Status(ResponseCode),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Stop,
    Continue,
}

/// Applied by the [`ResponseReverter`] to each answer record.
#[derive(Debug, Clone)]
pub enum ResponseRule {
    /// Rename owners matching `pattern`; `{n}` in `replacement` is group n.
    Name { pattern: Regex, replacement: String },
    Ttl(u32),
}

pub trait Rule: Send + Sync + std::fmt::Debug {
    fn rewrite(&self, w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError>;

    fn mode(&self) -> Mode;

    fn response_rule(&self) -> Option<ResponseRule> {
        None
    }
}

fn invalid(args: &[&str], why: &str) -> DomainError {
    DomainError::InvalidRewrite(format!("{}: {}", why, args.join(" ")))
}

/// Replaces `{n}` with capture group n.
pub(crate) fn expand_groups(template: &str, groups: &[&str]) -> String {
    let mut out = template.to_string();
    for (i, group) in groups.iter().enumerate() {
        out = out.replace(&format!("{{{}}}", i), group);
    }
    out
}

/// Sets the query name, refusing names that do not parse.
pub(crate) fn set_qname(r: &mut Message, name: &str) -> Result<(), DomainError> {
    let name = to_name(name).map_err(|_| DomainError::InvalidRewrite(name.to_string()))?;
    if let Some(q) = r.queries_mut().first_mut() {
        q.set_name(name);
    }
    Ok(())
}

/// Parses one rule from its tokens, e.g. `["continue", "name", "a.", "b."]`.
pub fn new_rule(args: &[&str]) -> Result<Box<dyn Rule>, DomainError> {
    let Some(first) = args.first() else {
        return Err(invalid(args, "empty rule"));
    };
    let (mode, rest) = match first.to_ascii_lowercase().as_str() {
        "stop" => (Mode::Stop, &args[1..]),
        "continue" => (Mode::Continue, &args[1..]),
        _ => (Mode::Stop, args),
    };
    let Some(kind) = rest.first() else {
        return Err(invalid(args, "missing rule type"));
    };
    let rule_args = &rest[1..];

    let rule: Box<dyn Rule> = match kind.to_ascii_lowercase().as_str() {
        "answer" => return Err(invalid(args, "response rewrites must begin with a name rule")),
        "name" => Box::new(NameRule::parse(mode, rule_args)?),
        "class" => Box::new(ClassRule::parse(mode, rule_args)?),
        "type" => Box::new(TypeRule::parse(mode, rule_args)?),
        "edns0" => edns0::parse(mode, rule_args)?,
        "ttl" => Box::new(TtlRule::parse(mode, rule_args)?),
        _ => return Err(invalid(args, "invalid rule type")),
    };
    Ok(rule)
}

pub struct Rewrite {
    rules: Vec<Box<dyn Rule>>,
    no_revert: bool,
    next: Next,
}

impl Rewrite {
    pub fn new(config: &RewriteConfig, next: Next) -> Result<Self, DomainError> {
        let rules = config
            .rules
            .iter()
            .map(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                new_rule(&tokens)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_rules(rules, config.no_revert, next))
    }

    pub fn from_rules(rules: Vec<Box<dyn Rule>>, no_revert: bool, next: Next) -> Self {
        Self {
            rules,
            no_revert,
            next,
        }
    }
}

fn restore_question(r: &mut Message, original: &Option<Query>) {
    if let (Some(q), Some(original)) = (r.queries_mut().first_mut(), original) {
        *q = original.clone();
    }
}

/// Writes a bare reply carrying `rcode`. Codes the dispatcher would answer
/// on its own come back as NOERROR since the reply is already out.
async fn write_rcode(w: &mut dyn ResponseWriter, r: &Message, rcode: ResponseCode) -> HandlerResult {
    let mut reply = reply_to(r);
    reply.set_response_code(rcode);
    w.write_msg(reply).await?;
    Ok(if client_write(rcode) {
        rcode
    } else {
        ResponseCode::NoError
    })
}

#[async_trait]
impl Handler for Rewrite {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let original = r.queries().first().cloned();
        let mut response_rules = Vec::new();
        let mut rewritten = false;

        for rule in &self.rules {
            match rule.rewrite(&*w, r) {
                Err(e) => {
                    restore_question(r, &original);
                    return Err(e);
                }
                Ok(RuleResult::Ignored) => {}
                Ok(RuleResult::Status(rcode)) => {
                    restore_question(r, &original);
                    return write_rcode(w, r, rcode).await;
                }
                Ok(RuleResult::Done) => {
                    rewritten = true;
                    if let Some(rr) = rule.response_rule() {
                        response_rules.push(rr);
                    }
                    if rule.mode() == Mode::Stop {
                        break;
                    }
                }
            }
        }

        let question = match original.clone() {
            Some(q) if rewritten && !self.no_revert => q,
            _ => return next_or_failure(self.name(), &self.next, w, r).await,
        };

        debug!(rules = response_rules.len(), "Rewrote request");
        let mut rw = ResponseReverter::new(w, question, response_rules);
        let result = next_or_failure(self.name(), &self.next, &mut rw, r).await;
        restore_question(r, &original);
        match result {
            // nothing reached the client yet, answer for the original question
            Ok(rcode) if !client_write(rcode) => write_rcode(&mut rw, r, rcode).await,
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        "rewrite"
    }
}
