//! Conversions between our stored record model and hickory's wire types.

use std::str::FromStr;

use hickory_proto::rr::rdata::{CNAME, MX, NS, PTR, SOA, SRV, TXT};
use hickory_proto::rr::{Name, RData, Record as WireRecord, RecordType as WireRecordType};

use geodns_core::config::SoaConfig;
use geodns_core::types::{RecordData, RecordType};

/// Convert our internal record type to hickory's wire type. `LocRes` has no
/// wire representation and is handled entirely before conversion.
pub fn to_wire_rtype(rt: RecordType) -> Option<WireRecordType> {
    Some(match rt {
        RecordType::A => WireRecordType::A,
        RecordType::Aaaa => WireRecordType::AAAA,
        RecordType::Cname => WireRecordType::CNAME,
        RecordType::Mx => WireRecordType::MX,
        RecordType::Ns => WireRecordType::NS,
        RecordType::Ptr => WireRecordType::PTR,
        RecordType::Soa => WireRecordType::SOA,
        RecordType::Srv => WireRecordType::SRV,
        RecordType::Txt => WireRecordType::TXT,
        RecordType::LocRes => return None,
    })
}

/// Convert hickory's wire type into our internal type, when we understand it.
pub fn from_wire_rtype(rt: WireRecordType) -> Option<RecordType> {
    Some(match rt {
        WireRecordType::A => RecordType::A,
        WireRecordType::AAAA => RecordType::Aaaa,
        WireRecordType::CNAME => RecordType::Cname,
        WireRecordType::MX => RecordType::Mx,
        WireRecordType::NS => RecordType::Ns,
        WireRecordType::PTR => RecordType::Ptr,
        WireRecordType::SOA => RecordType::Soa,
        WireRecordType::SRV => RecordType::Srv,
        WireRecordType::TXT => RecordType::Txt,
        _ => return None,
    })
}

fn ensure_fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Convert parsed record data into hickory `RData`, given the owner name
/// (used for targets stored relative to the record's zone is already resolved
/// by the caller — this function only encodes the value itself).
pub fn to_rdata(data: &RecordData) -> Option<RData> {
    Some(match data {
        RecordData::A(ip) => RData::A(ip.parse::<std::net::Ipv4Addr>().ok()?.into()),
        RecordData::Aaaa(ip) => RData::AAAA(ip.parse::<std::net::Ipv6Addr>().ok()?.into()),
        RecordData::Cname(target) => RData::CNAME(CNAME(Name::from_str(&ensure_fqdn(target)).ok()?)),
        RecordData::Ns(target) => RData::NS(NS(Name::from_str(&ensure_fqdn(target)).ok()?)),
        RecordData::Ptr(target) => RData::PTR(PTR(Name::from_str(&ensure_fqdn(target)).ok()?)),
        RecordData::Mx { preference, exchange } => {
            RData::MX(MX::new(*preference, Name::from_str(&ensure_fqdn(exchange)).ok()?))
        }
        RecordData::Srv { priority, weight, port, target } => {
            RData::SRV(SRV::new(*priority, *weight, *port, Name::from_str(&ensure_fqdn(target)).ok()?))
        }
        RecordData::Txt(text) => {
            let chunks = txt_chunks(text);
            RData::TXT(TXT::from_bytes(chunks.iter().map(|c| c.as_slice()).collect()))
        }
        RecordData::Soa(soa) => {
            let mname = Name::from_str(&ensure_fqdn(&soa.ns)).ok()?;
            let rname = Name::from_str(&ensure_fqdn(&soa.mbox)).ok()?;
            RData::SOA(SOA::new(
                mname,
                rname,
                synthesize_serial(),
                soa.refresh as i32,
                soa.retry as i32,
                soa.expire as i32,
                soa.min_ttl,
            ))
        }
        RecordData::LocRes(_) => return None,
    })
}

/// Split a TXT value into wire-sized character-strings of at most 255 octets.
/// A `<character-string>` is a length-prefixed octet string, not text, so the
/// split happens on raw byte boundaries — every chunk except possibly the
/// last is exactly 255 bytes, even if that cuts a multi-byte UTF-8 character
/// in half. An empty string still produces one (empty) chunk, matching a
/// single zero-length `<character-string>` on the wire.
fn txt_chunks(text: &str) -> Vec<Vec<u8>> {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return vec![Vec::new()];
    }

    bytes.chunks(255).map(|chunk| chunk.to_vec()).collect()
}

/// `YYYYMMDD01`: a daily-rotating serial that increases at least once a day
/// without needing a counter persisted anywhere.
pub fn synthesize_serial() -> u32 {
    serial_for_date(chrono::Utc::now().date_naive())
}

/// Pure date-to-serial mapping, split out from [`synthesize_serial`] so the
/// monotonicity property (non-decreasing within a day, strictly increasing
/// across a day boundary) is testable without depending on wall-clock time.
fn serial_for_date(date: chrono::NaiveDate) -> u32 {
    date.format("%Y%m%d").to_string().parse::<u32>().unwrap_or(0) * 100 + 1
}

/// Build the SOA record for a zone apex from the global SOA template.
pub fn build_soa_record(zone_fqdn: &str, soa: &SoaConfig, ttl: u32) -> Option<WireRecord> {
    let name = Name::from_str(&ensure_fqdn(zone_fqdn)).ok()?;
    let primary_ns = soa.ns.first()?.clone();
    let data = RecordData::Soa(geodns_core::types::SoaFields {
        ns: primary_ns,
        mbox: soa.mbox.clone(),
        refresh: soa.refresh,
        retry: soa.retry,
        expire: soa.expire,
        min_ttl: soa.ttl,
    });
    let rdata = to_rdata(&data)?;
    let mut record = WireRecord::from_rdata(name, ttl, rdata);
    record.set_record_type(WireRecordType::SOA);
    Some(record)
}

/// Build the NS records for a zone apex, rotating which nameserver is listed
/// first by swapping it with a random other entry (not a full shuffle).
pub fn build_ns_records(zone_fqdn: &str, ns: &[String], ttl: u32) -> Vec<WireRecord> {
    let name = match Name::from_str(&ensure_fqdn(zone_fqdn)) {
        Ok(n) => n,
        Err(_) => return Vec::new(),
    };

    let mut rotated = ns.to_vec();
    if rotated.len() > 1 {
        use rand::Rng;
        let swap_with = rand::thread_rng().gen_range(0..rotated.len());
        rotated.swap(0, swap_with);
    }

    rotated
        .into_iter()
        .filter_map(|target| {
            let target_name = Name::from_str(&ensure_fqdn(&target)).ok()?;
            Some(WireRecord::from_rdata(
                name.clone(),
                ttl,
                RData::NS(NS(target_name)),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_common_types() {
        assert_eq!(from_wire_rtype(to_wire_rtype(RecordType::A).unwrap()), Some(RecordType::A));
        assert_eq!(from_wire_rtype(to_wire_rtype(RecordType::Mx).unwrap()), Some(RecordType::Mx));
        assert_eq!(to_wire_rtype(RecordType::LocRes), None);
    }

    #[test]
    fn builds_soa_with_synthesized_serial() {
        let soa = SoaConfig {
            ns: vec!["ns1.example.com.".to_string()],
            mbox: "hostmaster.example.com.".to_string(),
            refresh: 3600,
            retry: 600,
            expire: 604800,
            ttl: 300,
        };
        let record = build_soa_record("example.com.", &soa, 300).unwrap();
        assert_eq!(record.record_type(), WireRecordType::SOA);
    }

    #[test]
    fn serial_is_stable_within_a_day_and_increases_across_one() {
        use chrono::NaiveDate;
        let day1 = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();

        let serial_day1_a = serial_for_date(day1);
        let serial_day1_b = serial_for_date(day1);
        let serial_day2 = serial_for_date(day2);

        assert_eq!(serial_day1_a, serial_day1_b);
        assert_eq!(serial_day1_a, 2026073001);
        assert!(serial_day2 > serial_day1_a);
    }

    #[test]
    fn serial_rolls_over_across_month_and_year_boundaries() {
        use chrono::NaiveDate;
        let end_of_month = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let start_of_next = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(serial_for_date(start_of_next) > serial_for_date(end_of_month));

        let end_of_year = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let start_of_next_year = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert!(serial_for_date(start_of_next_year) > serial_for_date(end_of_year));
    }

    #[test]
    fn txt_chunking_preserves_content_for_short_strings() {
        assert_eq!(txt_chunks("hello"), vec![b"hello".to_vec()]);
        assert_eq!(txt_chunks(""), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn txt_chunking_splits_long_strings_at_255_octets() {
        let long = "x".repeat(300);
        let chunks = txt_chunks(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 255);
        assert_eq!(chunks[1].len(), 45);
        assert_eq!(chunks.concat(), long.into_bytes());
    }

    #[test]
    fn txt_chunking_splits_a_multibyte_character_at_the_raw_byte_boundary() {
        // A 300-character string built entirely of 3-byte UTF-8 code points
        // (900 bytes) splits at exact 255-byte boundaries even though that
        // cuts the 86th code point in half — `<character-string>`s are
        // length-prefixed octets, not text, so concatenation must restore
        // the exact original bytes without any char-boundary accommodation.
        let long = "\u{20ac}".repeat(300);
        let bytes = long.into_bytes();
        let chunks = txt_chunks(std::str::from_utf8(&bytes).unwrap());
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].len(), 255);
        assert_eq!(chunks[1].len(), 255);
        assert_eq!(chunks[2].len(), 255);
        assert_eq!(chunks[3].len(), 135);
        assert_eq!(chunks.concat(), bytes);
    }

    #[test]
    fn ns_rotation_keeps_the_same_set() {
        let ns = vec![
            "ns1.example.com.".to_string(),
            "ns2.example.com.".to_string(),
            "ns3.example.com.".to_string(),
        ];
        let records = build_ns_records("example.com.", &ns, 300);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn single_ns_is_returned_verbatim_without_rotation_attempt() {
        let ns = vec!["ns1.example.com.".to_string()];
        let records = build_ns_records("example.com.", &ns, 300);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn ns_rotation_eventually_swaps_the_first_position() {
        // A uniform swap of index 0 with a random index in [0, N) means the
        // first-listed NS varies across calls (it need not change on every
        // call — it MAY swap with itself). Over enough samples we must see
        // more than one distinct name in first position.
        let ns = vec![
            "ns1.example.com.".to_string(),
            "ns2.example.com.".to_string(),
            "ns3.example.com.".to_string(),
        ];
        let mut first_positions = std::collections::HashSet::new();
        for _ in 0..200 {
            let records = build_ns_records("example.com.", &ns, 300);
            if let Some(RData::NS(NS(name))) = records.first().and_then(|r| r.data()) {
                first_positions.insert(name.to_string());
            }
        }
        assert!(first_positions.len() > 1, "expected rotation to surface more than one first entry");
    }
}
