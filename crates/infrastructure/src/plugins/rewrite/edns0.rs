//! EDNS0 option rules: `local`, `nsid` and `subnet`.

use super::{invalid, Mode, Rule, RuleResult};
use chaindns_application::ports::{ResponseWriter, Transport};
use chaindns_domain::DomainError;
use hickory_proto::op::{Edns, Message};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

const EDNS_PAYLOAD: u16 = 4096;
const CODE_NSID: u16 = 3;
const CODE_SUBNET: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edns0Action {
    /// Add the option, overwriting one that is already there.
    Set,
    /// Add the option only when it is absent.
    Append,
    /// Overwrite the option only when it is present.
    Replace,
}

impl Edns0Action {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "set" => Some(Edns0Action::Set),
            "append" => Some(Edns0Action::Append),
            "replace" => Some(Edns0Action::Replace),
            _ => None,
        }
    }
}

/// Applies `action` for option `code`, creating the OPT record when the
/// request has none.
fn apply(r: &mut Message, action: Edns0Action, code: u16, data: Vec<u8>) -> RuleResult {
    let edns = r.extensions_mut().get_or_insert_with(|| {
        let mut edns = Edns::new();
        edns.set_max_payload(EDNS_PAYLOAD);
        edns
    });
    let opts = edns.options_mut();
    let present = opts.get(EdnsCode::from(code)).is_some();
    let write = match action {
        Edns0Action::Set => true,
        Edns0Action::Append => !present,
        Edns0Action::Replace => present,
    };
    if !write {
        return RuleResult::Ignored;
    }
    opts.insert(EdnsOption::Unknown(code, data));
    RuleResult::Done
}

fn parse_code(s: &str, args: &[&str]) -> Result<u16, DomainError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|_| invalid(args, "invalid EDNS0 option code"))
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

pub(super) fn parse(mode: Mode, args: &[&str]) -> Result<Box<dyn Rule>, DomainError> {
    let [kind, action, rest @ ..] = args else {
        return Err(invalid(args, "edns0 rule needs a type and an action"));
    };
    let action = Edns0Action::parse(action).ok_or_else(|| invalid(args, "invalid EDNS0 action"))?;

    match kind.to_ascii_lowercase().as_str() {
        "local" => {
            let [code, data] = rest else {
                return Err(invalid(args, "edns0 local needs a code and data"));
            };
            let code = parse_code(code, args)?;
            if let Some(var) = data.strip_prefix('{').and_then(|d| d.strip_suffix('}')) {
                let variable = Variable::parse(var)
                    .ok_or_else(|| invalid(args, "unsupported EDNS0 variable"))?;
                return Ok(Box::new(Edns0VariableRule {
                    mode,
                    action,
                    code,
                    variable,
                }));
            }
            let data = match data.strip_prefix("0x") {
                Some(hex) => decode_hex(hex).ok_or_else(|| invalid(args, "invalid hex data"))?,
                None => data.as_bytes().to_vec(),
            };
            Ok(Box::new(Edns0LocalRule {
                mode,
                action,
                code,
                data,
            }))
        }
        "nsid" => {
            if !rest.is_empty() {
                return Err(invalid(args, "edns0 nsid takes no arguments"));
            }
            Ok(Box::new(Edns0NsidRule { mode, action }))
        }
        "subnet" => {
            let [v4, v6] = rest else {
                return Err(invalid(args, "edns0 subnet needs IPv4 and IPv6 prefix lengths"));
            };
            let v4_bits = v4
                .parse::<u8>()
                .ok()
                .filter(|b| *b <= 32)
                .ok_or_else(|| invalid(args, "invalid IPv4 prefix length"))?;
            let v6_bits = v6
                .parse::<u8>()
                .ok()
                .filter(|b| *b <= 128)
                .ok_or_else(|| invalid(args, "invalid IPv6 prefix length"))?;
            Ok(Box::new(Edns0SubnetRule {
                mode,
                action,
                v4_bits,
                v6_bits,
            }))
        }
        _ => Err(invalid(args, "invalid EDNS0 rule type")),
    }
}

/// Sets an option with fixed bytes.
#[derive(Debug, Clone)]
pub struct Edns0LocalRule {
    mode: Mode,
    action: Edns0Action,
    code: u16,
    data: Vec<u8>,
}

impl Rule for Edns0LocalRule {
    fn rewrite(&self, _w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        Ok(apply(r, self.action, self.code, self.data.clone()))
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

/// Asks the server for its NSID by adding an empty option.
#[derive(Debug, Clone)]
pub struct Edns0NsidRule {
    mode: Mode,
    action: Edns0Action,
}

impl Rule for Edns0NsidRule {
    fn rewrite(&self, _w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        Ok(apply(r, self.action, CODE_NSID, Vec::new()))
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    Qname,
    Qtype,
    ClientIp,
    ClientPort,
    Protocol,
    ServerIp,
    ServerPort,
}

impl Variable {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "qname" => Some(Variable::Qname),
            "qtype" => Some(Variable::Qtype),
            "client_ip" => Some(Variable::ClientIp),
            "client_port" => Some(Variable::ClientPort),
            "protocol" => Some(Variable::Protocol),
            "server_ip" => Some(Variable::ServerIp),
            "server_port" => Some(Variable::ServerPort),
            _ => None,
        }
    }

    fn value(self, w: &dyn ResponseWriter, r: &Message) -> Vec<u8> {
        let ip_bytes = |ip: IpAddr| match ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        match self {
            Variable::Qname => r
                .queries()
                .first()
                .map(|q| q.name().to_ascii().into_bytes())
                .unwrap_or_default(),
            Variable::Qtype => r
                .queries()
                .first()
                .map(|q| u16::from(q.query_type()).to_be_bytes().to_vec())
                .unwrap_or_default(),
            Variable::ClientIp => ip_bytes(w.remote_addr().ip()),
            Variable::ClientPort => w.remote_addr().port().to_be_bytes().to_vec(),
            Variable::Protocol => match w.transport() {
                Transport::Udp => b"udp".to_vec(),
                Transport::Tcp => b"tcp".to_vec(),
            },
            Variable::ServerIp => ip_bytes(w.local_addr().ip()),
            Variable::ServerPort => w.local_addr().port().to_be_bytes().to_vec(),
        }
    }
}

/// Sets an option from request metadata such as `{client_ip}`.
#[derive(Debug, Clone)]
pub struct Edns0VariableRule {
    mode: Mode,
    action: Edns0Action,
    code: u16,
    variable: Variable,
}

impl Rule for Edns0VariableRule {
    fn rewrite(&self, w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        let data = self.variable.value(w, r);
        if data.is_empty() {
            return Ok(RuleResult::Ignored);
        }
        Ok(apply(r, self.action, self.code, data))
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

/// Adds an EDNS Client Subnet option carrying the client address,
/// truncated to the configured prefix length.
#[derive(Debug, Clone)]
pub struct Edns0SubnetRule {
    mode: Mode,
    action: Edns0Action,
    v4_bits: u8,
    v6_bits: u8,
}

impl Edns0SubnetRule {
    fn encode(&self, ip: IpAddr) -> Result<Vec<u8>, DomainError> {
        let (family, bits): (u16, u8) = match ip {
            IpAddr::V4(_) => (1, self.v4_bits),
            IpAddr::V6(_) => (2, self.v6_bits),
        };
        let network = IpNetwork::new(ip, bits)
            .map_err(|e| DomainError::InvalidCidr(e.to_string()))?
            .network();
        let address = match network {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };

        let mut data = Vec::with_capacity(4 + address.len());
        data.extend_from_slice(&family.to_be_bytes());
        data.push(bits);
        data.push(0);
        data.extend_from_slice(&address[..(bits as usize).div_ceil(8)]);
        Ok(data)
    }
}

impl Rule for Edns0SubnetRule {
    fn rewrite(&self, w: &dyn ResponseWriter, r: &mut Message) -> Result<RuleResult, DomainError> {
        let data = self.encode(w.remote_addr().ip())?;
        Ok(apply(r, self.action, CODE_SUBNET, data))
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}
