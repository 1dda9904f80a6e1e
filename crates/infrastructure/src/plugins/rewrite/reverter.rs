use super::{expand_groups, ResponseRule};
use async_trait::async_trait;
use chaindns_application::ports::{ResponseWriter, Transport};
use chaindns_domain::dnsutil::{name_to_string, to_name};
use chaindns_domain::DomainError;
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::Record;
use std::net::SocketAddr;
use tracing::debug;

/// Puts the client's original question back on the response and applies
/// the answer rules collected while rewriting.
pub struct ResponseReverter<'a> {
    inner: &'a mut dyn ResponseWriter,
    original: Query,
    rules: Vec<ResponseRule>,
}

impl<'a> ResponseReverter<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter, original: Query, rules: Vec<ResponseRule>) -> Self {
        Self {
            inner,
            original,
            rules,
        }
    }

    fn revert_record(&self, record: &mut Record) -> Result<(), DomainError> {
        for rule in &self.rules {
            match rule {
                ResponseRule::Name {
                    pattern,
                    replacement,
                } => {
                    let owner = name_to_string(record.name());
                    let caps = pattern
                        .captures(&owner)
                        .map_err(|e| DomainError::InvalidRewrite(e.to_string()))?;
                    let Some(caps) = caps else {
                        continue;
                    };
                    let groups: Vec<&str> = caps
                        .iter()
                        .map(|m| m.map(|m| m.as_str()).unwrap_or(""))
                        .collect();
                    let renamed = expand_groups(replacement, &groups);
                    match to_name(&renamed) {
                        Ok(name) => {
                            record.set_name(name);
                        }
                        Err(e) => debug!(name = %renamed, error = %e, "Skipping answer rename"),
                    }
                }
                ResponseRule::Ttl(ttl) => {
                    record.set_ttl(*ttl);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseWriter for ResponseReverter<'_> {
    async fn write_msg(&mut self, mut msg: Message) -> Result<(), DomainError> {
        if let Some(q) = msg.queries_mut().first_mut() {
            *q = self.original.clone();
        }
        if !self.rules.is_empty() {
            let mut answers = msg.take_answers();
            for record in &mut answers {
                self.revert_record(record)?;
            }
            msg.insert_answers(answers);
        }
        self.inner.write_msg(msg).await
    }

    fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr()
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    fn transport(&self) -> Transport {
        self.inner.transport()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaindns_application::writer::Recorder;
    use fancy_regex::Regex;
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, RecordType};

    #[tokio::test]
    async fn test_reverter_restores_question_and_renames_answers() {
        let original = Query::query(Name::from_ascii("www.a.com.").unwrap(), RecordType::A);
        let rules = vec![
            ResponseRule::Name {
                pattern: Regex::new(r"(.*)\.b\.com").unwrap(),
                replacement: "{1}.a.com.".to_string(),
            },
            ResponseRule::Ttl(9),
        ];

        let mut rec = Recorder::new();
        {
            let mut rw = ResponseReverter::new(&mut rec, original, rules);
            let mut msg = Message::new();
            msg.add_query(Query::query(Name::from_ascii("www.b.com.").unwrap(), RecordType::A));
            msg.add_answer(Record::from_rdata(
                Name::from_ascii("www.b.com.").unwrap(),
                300,
                RData::A(A::new(1, 2, 3, 4)),
            ));
            rw.write_msg(msg).await.unwrap();
        }

        let msg = rec.msg.unwrap();
        assert_eq!(msg.queries()[0].name().to_ascii(), "www.a.com.");
        assert_eq!(msg.answers()[0].name().to_ascii(), "www.a.com.");
        assert_eq!(msg.answers()[0].ttl(), 9);
    }
}
