//! `{{ ... }}` placeholder expansion for record templates.

use chaindns_domain::DomainError;
use rustc_hash::FxHashMap;

/// Values a template can refer to for one matched query.
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub zone: String,
    pub name: String,
    pub regex: String,
    /// Whole match first, then each capture group.
    pub matches: Vec<String>,
    /// Captures by index and by group name.
    pub group: FxHashMap<String, String>,
    pub class: String,
    pub qtype: String,
    pub message_id: u16,
    pub remote: String,
}

fn render_err(template: &str, why: String) -> DomainError {
    DomainError::MalformedRecord(format!("template {}: {}", template, why))
}

impl TemplateData {
    fn eval(&self, template: &str, expr: &str) -> Result<String, DomainError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        match parts.as_slice() {
            [".Name"] => Ok(self.name.clone()),
            [".Zone"] => Ok(self.zone.clone()),
            [".Regex"] => Ok(self.regex.clone()),
            [".Class"] => Ok(self.class.clone()),
            [".Type"] => Ok(self.qtype.clone()),
            [".Remote"] => Ok(self.remote.clone()),
            [".Message.Id"] => Ok(self.message_id.to_string()),
            ["index", ".Match", n] => {
                let i: usize = n
                    .parse()
                    .map_err(|_| render_err(template, format!("bad index {}", n)))?;
                self.matches
                    .get(i)
                    .cloned()
                    .ok_or_else(|| render_err(template, format!("index out of range: {}", i)))
            }
            [field] if field.starts_with(".Group.") => {
                let key = &field[".Group.".len()..];
                self.group
                    .get(key)
                    .cloned()
                    .ok_or_else(|| render_err(template, format!("no group {}", key)))
            }
            _ => Err(render_err(template, format!("unknown expression {}", expr))),
        }
    }

    /// Expands every `{{ expr }}` in `template`.
    pub fn render(&self, template: &str) -> Result<String, DomainError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| render_err(template, "unclosed action".to_string()))?;
            out.push_str(&self.eval(template, after[..end].trim())?);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TemplateData {
        let mut group = FxHashMap::default();
        group.insert("0".to_string(), "ip-10-95-12-8.example.".to_string());
        group.insert("b".to_string(), "95".to_string());
        TemplateData {
            zone: "example.".to_string(),
            name: "ip-10-95-12-8.example.".to_string(),
            matches: vec!["ip-10-95-12-8.example.".to_string(), "10".to_string()],
            group,
            class: "IN".to_string(),
            qtype: "A".to_string(),
            message_id: 4242,
            remote: "10.240.0.1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_fields() {
        let out = data()
            .render("{{ .Name }} 60 {{ .Class }} {{ .Type }} 10.{{ .Group.b }}.0.{{ index .Match 1 }}")
            .unwrap();
        assert_eq!(out, "ip-10-95-12-8.example. 60 IN A 10.95.0.10");
        assert_eq!(data().render("{{.Message.Id}}/{{ .Remote }}").unwrap(), "4242/10.240.0.1");
    }

    #[test]
    fn test_render_errors() {
        assert!(data().render("{{ index .Match 2 }}").is_err());
        assert!(data().render("{{ .Group.missing }}").is_err());
        assert!(data().render("{{ .Name ").is_err());
        assert!(data().render("{{ .Nope }}").is_err());
    }
}
