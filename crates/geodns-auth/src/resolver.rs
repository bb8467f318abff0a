//! Question-to-answer resolution: wildcard fallback, CNAME fallback, and
//! synthesized SOA/NS records for zones this server is authoritative for.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{Name, Record as WireRecord, RecordType as WireRecordType};

use geodns_core::config::SoaConfig;
use geodns_core::db::RecordStore;
use geodns_core::error::Error;
use geodns_core::names::simplify;
use geodns_core::types::{RecordData, RecordType};
use geodns_geo::GeoResolver;

use crate::convert::{build_ns_records, build_soa_record, from_wire_rtype, to_rdata};

/// TTL applied to synthesized or stored records that don't carry their own.
pub const DEFAULT_TTL: u32 = 300;

pub struct AuthResolver {
    store: Arc<dyn RecordStore>,
    geo: Option<Arc<GeoResolver>>,
    soa: SoaConfig,
}

impl AuthResolver {
    pub fn new(store: Arc<dyn RecordStore>, geo: Option<Arc<GeoResolver>>, soa: SoaConfig) -> Self {
        Self { store, geo, soa }
    }

    /// The synthesized SOA for the zone covering `qname`, used to answer
    /// `ANY` queries with the single record RFC 8482 recommends instead of
    /// a full record dump.
    pub fn authority_soa(&self, qname: &Name) -> Option<WireRecord> {
        self.authority(qname)
    }

    /// Build a complete reply for `request`, addressed as seen from `client_ip`.
    pub fn lookup(&self, request: &Message, client_ip: IpAddr) -> Message {
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(OpCode::Query);
        response.set_recursion_desired(request.recursion_desired());
        response.set_recursion_available(false);
        response.set_authoritative(true);
        for query in request.queries() {
            response.add_query(query.clone());
        }

        let Some(query) = request.queries().first() else {
            response.set_response_code(ResponseCode::FormErr);
            return response;
        };

        let qname = query.name().clone();
        let qtype = query.query_type();
        metrics::counter!(format!("resolver.answers.question.{qtype}.{qname}")).increment(1);

        // Non-IN classes skip answer lookup entirely but still fall through
        // to NXDOMAIN/SOA negative handling below, same as any other miss.
        let (mut answers, mut errored) = if query.query_class() == hickory_proto::rr::DNSClass::IN {
            self.answer_question(&qname, qtype, client_ip)
        } else {
            (Vec::new(), false)
        };

        if answers.is_empty() && !errored && query.query_class() == hickory_proto::rr::DNSClass::IN {
            let parts: Vec<&str> = qname.to_string().trim_end_matches('.').split('.').collect();
            for level in 1..parts.len() {
                let domain = parts[level..].join(".");
                if domain.len() <= 1 {
                    continue;
                }
                let wildcard = match Name::from_str(&format!("*.{domain}.")) {
                    Ok(n) => n,
                    Err(_) => continue,
                };
                let (wc_answers, wc_errored) = self.answer_question(&wildcard, qtype, client_ip);
                errored = errored || wc_errored;
                if !wc_answers.is_empty() {
                    answers = wc_answers;
                    break;
                }
            }
        }

        if errored {
            metrics::counter!("resolver.answers.error").increment(1);
            response.set_response_code(ResponseCode::ServFail);
        } else if answers.is_empty() {
            metrics::counter!("resolver.answers.miss").increment(1);
            response.set_response_code(ResponseCode::NXDomain);
            match self.authority(&qname) {
                Some(soa) => {
                    response.add_name_server(soa);
                }
                None => response.set_authoritative(false),
            }
        } else {
            metrics::counter!("resolver.answers.hit").increment(1);
            for mut record in answers {
                record.set_name(qname.clone());
                response.add_answer(record);
            }
        }

        response
    }

    /// The SOA for the zone that is authoritative over `domain`, if we serve one.
    fn authority(&self, domain: &Name) -> Option<WireRecord> {
        let fqdn = domain.to_string();
        let fqdn = fqdn.trim_end_matches('.');
        match self.store.find_zone_for_fqdn(fqdn) {
            Ok(Some(zone)) => build_soa_record(&zone.name, &self.soa, self.soa.ttl),
            _ => {
                metrics::counter!("resolver.authority.missing_soa").increment(1);
                None
            }
        }
    }

    /// Resolve a single question, returning the matching wire records and
    /// whether resolution hit an unrecoverable error (which forces SERVFAIL).
    fn answer_question(&self, qname: &Name, qtype: WireRecordType, client_ip: IpAddr) -> (Vec<WireRecord>, bool) {
        metrics::counter!(format!("resolver.answers.type.{qtype}")).increment(1);

        // A type with no registered decoder (other than the synthesized
        // SOA/NS) gets an empty, error-free response with no CNAME fallback
        // attempted — it isn't "absent", it's unrecognized.
        if !matches!(qtype, WireRecordType::SOA | WireRecordType::NS) && from_wire_rtype(qtype).is_none() {
            return (Vec::new(), false);
        }

        match self.lookup_answers_for_type(qname, qtype, Some(client_ip)) {
            Ok(records) if !records.is_empty() => (records, false),
            Ok(_) => match self.lookup_answers_for_type(qname, WireRecordType::CNAME, None) {
                Ok(cnames) if cnames.len() > 1 => {
                    tracing::error!("multiple CNAME records for {qname}");
                    (Vec::new(), true)
                }
                Ok(cnames) => (cnames.into_iter().take(1).collect(), false),
                Err(e) => {
                    tracing::error!("CNAME fallback lookup failed for {qname}: {e}");
                    (Vec::new(), true)
                }
            },
            Err(e) => {
                tracing::error!("lookup failed for {qname} {qtype}: {e}");
                (Vec::new(), true)
            }
        }
    }

    fn lookup_answers_for_type(
        &self,
        qname: &Name,
        qtype: WireRecordType,
        client_ip: Option<IpAddr>,
    ) -> Result<Vec<WireRecord>, Error> {
        let fqdn = qname.to_string().to_ascii_lowercase();

        if qtype == WireRecordType::SOA {
            return Ok(self.authority(qname).into_iter().collect());
        }
        if qtype == WireRecordType::NS {
            let Some(zone) = self.store.find_zone_for_fqdn(fqdn.trim_end_matches('.'))? else {
                return Ok(Vec::new());
            };
            return Ok(build_ns_records(&zone.name, &self.soa.ns, self.soa.ttl));
        }

        let Some(rtype) = from_wire_rtype(qtype) else {
            return Ok(Vec::new());
        };

        let Some(zone) = self.store.find_zone_for_fqdn(fqdn.trim_end_matches('.'))? else {
            return Ok(Vec::new());
        };
        let short_name = simplify(fqdn.trim_end_matches('.'), zone.name.trim_end_matches('.'));

        let records = self.store.lookup_records_for_type(zone.id, &short_name, rtype)?;

        let mut wire_records = Vec::with_capacity(records.len());
        for record in &records {
            if matches!(record.rtype, RecordType::LocRes) {
                let Some(ip) = client_ip else { continue };
                let geo = self.geo.as_ref().ok_or(Error::GeoipDisabled)?;
                let resolved = geo.resolve(ip, &record.value)?;
                for data in resolved {
                    if let Some(rdata) = to_rdata(&data) {
                        wire_records.push(WireRecord::from_rdata(qname.clone(), geodns_geo::GEO_RESOLVED_TTL, rdata));
                    }
                }
                continue;
            }

            let data = RecordData::decode(record.rtype, &record.value)
                .map_err(|e| e.with_record_name(&record.name))?;
            if let Some(rdata) = to_rdata(&data) {
                let ttl = record.ttl.unwrap_or(DEFAULT_TTL);
                wire_records.push(WireRecord::from_rdata(qname.clone(), ttl, rdata));
            }
        }

        Ok(wire_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodns_core::db::RedbStore;
    use geodns_geo::{GeoResolver, StaticGeoIp};
    use hickory_proto::op::Query;
    use hickory_proto::rr::DNSClass;

    fn test_soa() -> SoaConfig {
        SoaConfig {
            ns: vec!["ns1.example.com.".to_string(), "ns2.example.com.".to_string()],
            mbox: "hostmaster.example.com.".to_string(),
            refresh: 3600,
            retry: 600,
            expire: 604800,
            ttl: 300,
        }
    }

    fn question(name: &str, rtype: WireRecordType) -> Message {
        let mut query = Query::new();
        query.set_name(Name::from_str(name).unwrap());
        query.set_query_type(rtype);
        query.set_query_class(DNSClass::IN);

        let mut msg = Message::new();
        msg.set_id(42);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(true);
        msg.add_query(query);
        msg
    }

    fn test_store() -> (Arc<RedbStore>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("resolver.redb")).unwrap();
        (Arc::new(store), dir)
    }

    #[test]
    fn answers_a_record_at_apex() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store.add_record(zone.id, "@", RecordType::A, "192.0.2.1", None, false).unwrap();

        let resolver = AuthResolver::new(store, None, test_soa());
        let request = question("example.com.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.answers()[0].name().to_string(), "example.com.");
    }

    #[test]
    fn answer_owner_preserves_the_querys_case_regardless_of_store_case() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store.add_record(zone.id, "@", RecordType::A, "192.0.2.1", None, false).unwrap();

        let resolver = AuthResolver::new(store, None, test_soa());
        // The store lookup is case-insensitive, but the client's exact
        // casing is what must come back as the owner name (RFC 1035 §4.3.2).
        let request = question("ExAmPlE.CoM.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers()[0].name().to_string(), "ExAmPlE.CoM.");
    }

    #[test]
    fn falls_back_to_wildcard() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store.add_record(zone.id, "*", RecordType::A, "192.0.2.9", None, false).unwrap();

        let resolver = AuthResolver::new(store, None, test_soa());
        let request = question("missing.example.com.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);
        // The owner name is rewritten to what was actually queried, not the
        // wildcard name used to find the record.
        assert_eq!(response.answers()[0].name().to_string(), "missing.example.com.");
    }

    #[test]
    fn falls_back_to_cname_when_requested_type_is_absent() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store
            .add_record(zone.id, "www", RecordType::Cname, "target.example.com", None, false)
            .unwrap();

        let resolver = AuthResolver::new(store, None, test_soa());
        let request = question("www.example.com.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.answers()[0].record_type(), WireRecordType::CNAME);
    }

    #[test]
    fn geo_resolves_loc_res_record() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store.add_record(zone.id, "www", RecordType::LocRes, "web", None, false).unwrap();
        let service = store.add_service("web", true).unwrap();
        store
            .add_anchor(service.id, RecordType::A, "203.0.113.10", 51.5, -0.1)
            .unwrap();

        let geoip = Arc::new(StaticGeoIp::new().with("198.51.100.1".parse().unwrap(), 51.4, -0.2));
        let geo = Arc::new(GeoResolver::new(store.clone(), Some(geoip)));
        let resolver = AuthResolver::new(store, Some(geo), test_soa());

        let request = question("www.example.com.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.answers()[0].record_type(), WireRecordType::A);
    }

    #[test]
    fn servfail_when_loc_res_hit_without_geoip_configured() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store.add_record(zone.id, "www", RecordType::LocRes, "web", None, false).unwrap();

        let resolver = AuthResolver::new(store, None, test_soa());
        let request = question("www.example.com.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::ServFail);
    }

    #[test]
    fn unknown_rr_type_gets_empty_answer_without_cname_fallback() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store
            .add_record(zone.id, "www", RecordType::Cname, "target.example.com", None, false)
            .unwrap();

        let resolver = AuthResolver::new(store, None, test_soa());
        // AXFR has no registered decoder; even though a CNAME exists at this
        // name, it must not be surfaced as an AXFR answer.
        let request = question("www.example.com.", WireRecordType::AXFR);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NXDomain);
        assert!(response.answers().is_empty());
    }

    #[test]
    fn ns_query_rotates_and_stays_authoritative() {
        let (store, _dir) = test_store();
        store.add_zone("example.com.").unwrap();

        let resolver = AuthResolver::new(store, None, test_soa());
        let request = question("example.com.", WireRecordType::NS);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 2);
        assert!(response.authoritative());
    }

    #[test]
    fn not_authoritative_for_unregistered_zone() {
        let (store, _dir) = test_store();
        let resolver = AuthResolver::new(store, None, test_soa());

        let request = question("nowhere.invalid.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NXDomain);
        assert!(!response.authoritative());
        assert!(response.name_servers().is_empty());
    }

    #[test]
    fn non_in_class_skips_lookup_but_still_gets_nxdomain_soa() {
        let (store, _dir) = test_store();
        let zone = store.add_zone("example.com.").unwrap();
        store.add_record(zone.id, "@", RecordType::A, "192.0.2.1", None, false).unwrap();

        let mut query = Query::new();
        query.set_name(Name::from_str("example.com.").unwrap());
        query.set_query_type(WireRecordType::A);
        query.set_query_class(DNSClass::CH);
        let mut request = Message::new();
        request.set_id(42);
        request.set_message_type(MessageType::Query);
        request.set_op_code(OpCode::Query);
        request.add_query(query);

        let resolver = AuthResolver::new(store, None, test_soa());
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NXDomain);
        assert!(response.answers().is_empty());
        assert_eq!(response.name_servers().len(), 1);
    }

    #[test]
    fn nxdomain_within_owned_zone_carries_soa() {
        let (store, _dir) = test_store();
        store.add_zone("example.com.").unwrap();
        let resolver = AuthResolver::new(store, None, test_soa());

        let request = question("missing.example.com.", WireRecordType::A);
        let response = resolver.lookup(&request, "198.51.100.1".parse().unwrap());

        assert_eq!(response.response_code(), ResponseCode::NXDomain);
        assert!(response.authoritative());
        assert_eq!(response.name_servers().len(), 1);
        assert_eq!(response.name_servers()[0].record_type(), WireRecordType::SOA);
    }
}
