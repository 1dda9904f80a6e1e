//! Answers synthesized from record templates for names matching a regex.

mod render;
mod rr;

pub use render::TemplateData;
pub use rr::{parse_record, DEFAULT_TTL};

use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, MetricsSink, ResponseWriter};
use chaindns_application::{client_write, next_or_failure, Next, Request};
use chaindns_domain::config::TemplateConfig;
use chaindns_domain::dnsutil::{normalize, reply_to};
use chaindns_domain::{DomainError, Fall, Zones};
use fancy_regex::Regex;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{DNSClass, Record, RecordType};
use rustc_hash::FxHashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub struct Template {
    zones: Zones,
    /// `None` matches any class.
    class: Option<DNSClass>,
    /// `None` matches any type.
    qtype: Option<RecordType>,
    regex: Vec<Regex>,
    answer: Vec<String>,
    additional: Vec<String>,
    authority: Vec<String>,
    rcode: ResponseCode,
    fall: Fall,
    metrics: Arc<dyn MetricsSink>,
    next: Next,
}

fn parse_rcode(s: &str) -> Result<ResponseCode, DomainError> {
    let rcode = match s.to_ascii_uppercase().as_str() {
        "NOERROR" => ResponseCode::NoError,
        "FORMERR" => ResponseCode::FormErr,
        "SERVFAIL" => ResponseCode::ServFail,
        "NXDOMAIN" => ResponseCode::NXDomain,
        "NOTIMP" => ResponseCode::NotImp,
        "REFUSED" => ResponseCode::Refused,
        other => return Err(DomainError::Config(format!("template: unknown rcode {}", other))),
    };
    Ok(rcode)
}

fn class_name(class: DNSClass) -> String {
    match class {
        DNSClass::IN => "IN".to_string(),
        DNSClass::CH => "CH".to_string(),
        DNSClass::HS => "HS".to_string(),
        DNSClass::NONE => "NONE".to_string(),
        DNSClass::ANY => "ANY".to_string(),
        other => format!("CLASS{}", u16::from(other)),
    }
}

impl Template {
    pub fn new(
        config: &TemplateConfig,
        metrics: Arc<dyn MetricsSink>,
        next: Next,
    ) -> Result<Self, DomainError> {
        let class = match config.class.to_ascii_uppercase().as_str() {
            "ANY" => None,
            "IN" => Some(DNSClass::IN),
            "CH" => Some(DNSClass::CH),
            "HS" => Some(DNSClass::HS),
            other => return Err(DomainError::Config(format!("template: unknown class {}", other))),
        };
        let qtype = match config.qtype.to_ascii_uppercase().as_str() {
            "ANY" => None,
            other => Some(RecordType::from_str(other).map_err(|_| {
                DomainError::Config(format!("template: unknown type {}", other))
            })?),
        };
        let regex = config
            .regex
            .iter()
            .map(|r| {
                Regex::new(r)
                    .map_err(|e| DomainError::Config(format!("template: bad regex {}: {}", r, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Templates must at least render as records once the name is known.
        for line in config.answer.iter().chain(&config.additional).chain(&config.authority) {
            if !line.contains("{{") {
                parse_record(line)?;
            }
        }

        Ok(Self {
            zones: Zones::new(&config.zones),
            class,
            qtype,
            regex,
            answer: config.answer.clone(),
            additional: config.additional.clone(),
            authority: config.authority.clone(),
            rcode: parse_rcode(&config.rcode)?,
            fall: Fall::from_config(config.fallthrough.as_deref()),
            metrics,
            next,
        })
    }

    /// Template data for `state`, or `None` when the template does not apply.
    fn matches(&self, state: &Request<'_>, zone: &str) -> Result<Option<TemplateData>, DomainError> {
        let qclass = state.qclass();
        let qtype = state.qtype();
        if let Some(class) = self.class {
            if qclass != DNSClass::ANY && qclass != class {
                return Ok(None);
            }
        }
        if let Some(t) = self.qtype {
            if qtype != RecordType::ANY && qtype != t {
                return Ok(None);
            }
        }

        let name = state.name();
        for regex in &self.regex {
            let Some(caps) = regex
                .captures(name)
                .map_err(|e| DomainError::MalformedRecord(e.to_string()))?
            else {
                continue;
            };

            let mut data = TemplateData {
                zone: zone.to_string(),
                name: name.to_string(),
                regex: regex.as_str().to_string(),
                class: match (qclass, self.class) {
                    (DNSClass::ANY, Some(c)) => class_name(c),
                    (c, _) => class_name(c),
                },
                qtype: match (qtype, self.qtype) {
                    (RecordType::ANY, Some(t)) => t.to_string(),
                    (t, _) => t.to_string(),
                },
                message_id: state.msg().id(),
                remote: state.ip().to_string(),
                group: FxHashMap::default(),
                matches: Vec::new(),
            };
            for i in 0..caps.len() {
                let m = caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default();
                data.group.insert(i.to_string(), m.clone());
                data.matches.push(m);
            }
            for (i, group) in regex.capture_names().enumerate() {
                if let (Some(group), Some(m)) = (group, caps.get(i)) {
                    data.group.insert(group.to_string(), m.as_str().to_string());
                }
            }
            return Ok(Some(data));
        }
        Ok(None)
    }

    fn render_all(
        &self,
        section: &str,
        lines: &[String],
        data: &TemplateData,
    ) -> Result<Vec<Record>, DomainError> {
        lines
            .iter()
            .map(|line| {
                let rendered = data.render(line)?;
                parse_record(&rendered).map_err(|e| {
                    debug!(section, template = %line, error = %e, "Template did not render a record");
                    e
                })
            })
            .collect()
    }

    fn build_reply(&self, state: &Request<'_>, data: &TemplateData) -> Result<Message, DomainError> {
        let mut reply = reply_to(state.msg());
        reply
            .set_response_code(self.rcode)
            .set_authoritative(true)
            .set_recursion_available(true);
        reply.insert_answers(self.render_all("answer", &self.answer, data)?);
        reply.insert_additionals(self.render_all("additional", &self.additional, data)?);
        reply.insert_name_servers(self.render_all("authority", &self.authority, data)?);
        Ok(state.scrub(reply))
    }
}

#[async_trait]
impl Handler for Template {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let reply = {
            let state = Request::new(r, &*w);
            let Some(zone) = self.zones.matches(state.name()).map(normalize) else {
                drop(state);
                return next_or_failure(self.name(), &self.next, w, r).await;
            };

            match self.matches(&state, &zone)? {
                Some(data) => {
                    self.metrics
                        .increment_counter("template_matches_total", &[("zone", zone.as_str())]);
                    if !client_write(self.rcode) {
                        return Ok(self.rcode);
                    }
                    self.build_reply(&state, &data)?
                }
                None if self.fall.through(state.name()) => {
                    drop(state);
                    return next_or_failure(self.name(), &self.next, w, r).await;
                }
                None => {
                    let mut reply = reply_to(state.msg());
                    reply
                        .set_response_code(ResponseCode::NXDomain)
                        .set_authoritative(true);
                    state.scrub(reply)
                }
            }
        };

        let rcode = reply.response_code();
        w.write_msg(reply).await?;
        Ok(rcode)
    }

    fn name(&self) -> &'static str {
        "template"
    }
}
