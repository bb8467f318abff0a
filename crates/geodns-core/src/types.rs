use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A resource record type this server understands. `Soa` is never persisted —
/// it is synthesized from `SoaConfig` plus a rotating serial. `LocRes` is the
/// sentinel type for geo-anchored services; it never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "MX")]
    Mx,
    #[serde(rename = "NS")]
    Ns,
    #[serde(rename = "PTR")]
    Ptr,
    #[serde(rename = "SRV")]
    Srv,
    #[serde(rename = "TXT")]
    Txt,
    #[serde(rename = "SOA")]
    Soa,
    #[serde(rename = "LOC_RES")]
    LocRes,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Ptr => "PTR",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
            RecordType::Soa => "SOA",
            RecordType::LocRes => "LOC_RES",
        };
        f.write_str(s)
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CNAME" => RecordType::Cname,
            "MX" => RecordType::Mx,
            "NS" => RecordType::Ns,
            "PTR" => RecordType::Ptr,
            "SRV" => RecordType::Srv,
            "TXT" => RecordType::Txt,
            "SOA" => RecordType::Soa,
            "LOC_RES" => RecordType::LocRes,
            other => return Err(Error::Config(format!("unknown record type: {other}"))),
        })
    }
}

/// Parsed form of a record's tab-separated `value` column. Storage keeps the
/// raw string (so it round-trips byte for byte); resolvers decode into this
/// shape to build wire records.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    A(String),
    Aaaa(String),
    Cname(String),
    Ns(String),
    Ptr(String),
    Mx { preference: u16, exchange: String },
    Srv { priority: u16, weight: u16, port: u16, target: String },
    Txt(String),
    Soa(SoaFields),
    LocRes(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoaFields {
    pub ns: String,
    pub mbox: String,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub min_ttl: u32,
}

impl RecordData {
    /// Encode back into the tab-separated wire grammar stored in `Record.value`.
    pub fn encode_value(&self) -> String {
        match self {
            RecordData::A(ip) => ip.clone(),
            RecordData::Aaaa(ip) => ip.clone(),
            RecordData::Cname(name) => name.clone(),
            RecordData::Ns(name) => name.clone(),
            RecordData::Ptr(name) => name.clone(),
            RecordData::Mx { preference, exchange } => format!("{preference}\t{exchange}"),
            RecordData::Srv { priority, weight, port, target } => {
                format!("{priority}\t{weight}\t{port}\t{target}")
            }
            RecordData::Txt(text) => text.clone(),
            RecordData::Soa(soa) => format!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                soa.ns, soa.mbox, soa.refresh, soa.retry, soa.expire, soa.min_ttl
            ),
            RecordData::LocRes(service) => service.clone(),
        }
    }

    /// Decode a stored `value` column for the given record type. Validates
    /// field arity and, for A/AAAA, address-family correctness. Errors carry
    /// the type and raw value but not the record's name — callers that know
    /// it should attach it with [`Error::with_record_name`].
    pub fn decode(rtype: RecordType, value: &str) -> Result<RecordData> {
        let fields: Vec<&str> = value.split('\t').collect();
        let invalid = |cause: String| Error::InvalidRecord {
            name: None,
            rtype,
            value: value.to_string(),
            cause,
        };
        let segment_count = |expected: usize| Error::InvalidSegmentCount {
            rtype,
            expected,
            actual: fields.len(),
        };

        Ok(match rtype {
            RecordType::A => {
                let addr: std::net::Ipv4Addr = require_field(&fields, 0, rtype, value)?
                    .parse()
                    .map_err(|_| invalid(format!("invalid IPv4 address: {value}")))?;
                RecordData::A(addr.to_string())
            }
            RecordType::Aaaa => {
                let addr: std::net::Ipv6Addr = require_field(&fields, 0, rtype, value)?
                    .parse()
                    .map_err(|_| invalid(format!("invalid IPv6 address: {value}")))?;
                RecordData::Aaaa(addr.to_string())
            }
            RecordType::Cname => RecordData::Cname(require_field(&fields, 0, rtype, value)?.to_string()),
            RecordType::Ns => RecordData::Ns(require_field(&fields, 0, rtype, value)?.to_string()),
            RecordType::Ptr => RecordData::Ptr(require_field(&fields, 0, rtype, value)?.to_string()),
            RecordType::Mx => {
                if fields.len() != 2 {
                    return Err(segment_count(2));
                }
                RecordData::Mx {
                    preference: fields[0]
                        .parse()
                        .map_err(|_| invalid(format!("invalid MX preference: {}", fields[0])))?,
                    exchange: fields[1].to_string(),
                }
            }
            RecordType::Srv => {
                if fields.len() != 4 {
                    return Err(segment_count(4));
                }
                RecordData::Srv {
                    priority: fields[0]
                        .parse()
                        .map_err(|_| invalid(format!("invalid SRV priority: {}", fields[0])))?,
                    weight: fields[1]
                        .parse()
                        .map_err(|_| invalid(format!("invalid SRV weight: {}", fields[1])))?,
                    port: fields[2]
                        .parse()
                        .map_err(|_| invalid(format!("invalid SRV port: {}", fields[2])))?,
                    target: fields[3].to_string(),
                }
            }
            RecordType::Txt => RecordData::Txt(value.to_string()),
            RecordType::Soa => {
                if fields.len() != 6 {
                    return Err(segment_count(6));
                }
                RecordData::Soa(SoaFields {
                    ns: fields[0].to_string(),
                    mbox: fields[1].to_string(),
                    refresh: fields[2]
                        .parse()
                        .map_err(|_| invalid(format!("invalid SOA refresh: {}", fields[2])))?,
                    retry: fields[3]
                        .parse()
                        .map_err(|_| invalid(format!("invalid SOA retry: {}", fields[3])))?,
                    expire: fields[4]
                        .parse()
                        .map_err(|_| invalid(format!("invalid SOA expire: {}", fields[4])))?,
                    min_ttl: fields[5]
                        .parse()
                        .map_err(|_| invalid(format!("invalid SOA min_ttl: {}", fields[5])))?,
                })
            }
            RecordType::LocRes => RecordData::LocRes(require_field(&fields, 0, rtype, value)?.to_string()),
        })
    }
}

fn require_field<'a>(fields: &[&'a str], idx: usize, rtype: RecordType, raw_value: &str) -> Result<&'a str> {
    fields
        .get(idx)
        .filter(|s| !s.is_empty())
        .copied()
        .ok_or_else(|| Error::InvalidRecord {
            name: None,
            rtype,
            value: raw_value.to_string(),
            cause: format!("{rtype} record missing value"),
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub zone: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub locked: bool,
    pub ttl: Option<u32>,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub available: bool,
}

/// A geo-anchored record for a service: the candidate answer (an A or AAAA
/// value) tagged with the anchor's lat/long.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub id: i64,
    pub service: i64,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub value: String,
    pub lat: f64,
    pub long: f64,
}
