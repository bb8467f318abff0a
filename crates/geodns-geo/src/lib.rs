//! Nearest-anchor service resolution: client IP -> approximate lat/long ->
//! nearest available anchor for a named service.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use geodns_core::db::RecordStore;
use geodns_core::error::{Error, Result};
use geodns_core::types::RecordData;

/// TTL applied to every geo-resolved answer. The original implementation
/// hardcodes this rather than deriving it from a stored record.
pub const GEO_RESOLVED_TTL: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatLong {
    pub lat: f64,
    pub long: f64,
}

/// Abstraction over a GeoIP city database, so the resolver can be exercised
/// without a real MaxMind database on disk.
pub trait GeoIpLookup: Send + Sync {
    fn locate(&self, ip: IpAddr) -> Result<LatLong>;
}

pub struct MaxMindGeoIp {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindGeoIp {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path)
            .map_err(|e| Error::Config(format!("failed to open geoip database: {e}")))?;
        Ok(Self { reader })
    }
}

impl GeoIpLookup for MaxMindGeoIp {
    fn locate(&self, ip: IpAddr) -> Result<LatLong> {
        let city: maxminddb::geoip2::City = self
            .reader
            .lookup(ip)
            .map_err(|_| Error::IpNotLocated(ip))?
            .ok_or(Error::IpNotLocated(ip))?;
        let location = city.location.ok_or(Error::IpNotLocated(ip))?;
        let (Some(lat), Some(long)) = (location.latitude, location.longitude) else {
            return Err(Error::IpNotLocated(ip));
        };
        Ok(LatLong { lat, long })
    }
}

/// In-memory [`GeoIpLookup`] for tests: an exact-match table of client
/// addresses to coordinates.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoIp {
    entries: std::collections::HashMap<IpAddr, LatLong>,
}

impl StaticGeoIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: IpAddr, lat: f64, long: f64) -> Self {
        self.entries.insert(ip, LatLong { lat, long });
        self
    }
}

impl GeoIpLookup for StaticGeoIp {
    fn locate(&self, ip: IpAddr) -> Result<LatLong> {
        self.entries.get(&ip).copied().ok_or(Error::IpNotLocated(ip))
    }
}

/// Resolves a geo-anchored service name to the nearest available anchor's
/// addresses for a given client IP.
pub struct GeoResolver {
    store: Arc<dyn RecordStore>,
    geoip: Option<Arc<dyn GeoIpLookup>>,
}

impl GeoResolver {
    pub fn new(store: Arc<dyn RecordStore>, geoip: Option<Arc<dyn GeoIpLookup>>) -> Self {
        Self { store, geoip }
    }

    /// Resolve `service_name` for a client at `client_ip`, returning the
    /// parsed address records of the nearest available anchor. The anchor's
    /// `value` column may hold a comma-separated list of addresses, each of
    /// which becomes its own A or AAAA record.
    pub fn resolve(&self, client_ip: IpAddr, service_name: &str) -> Result<Vec<RecordData>> {
        let geoip = self.geoip.as_ref().ok_or(Error::GeoipDisabled)?;
        let loc = geoip.locate(client_ip)?;
        tracing::debug!(%client_ip, service_name, lat = loc.lat, long = loc.long, "located client for geo resolution");
        let anchor = self.store.best_location_resolved_record(loc.lat, loc.long, service_name)?;

        anchor
            .value
            .split(',')
            .map(|addr| {
                if let Ok(v4) = addr.parse::<std::net::Ipv4Addr>() {
                    Ok(RecordData::A(v4.to_string()))
                } else if let Ok(v6) = addr.parse::<std::net::Ipv6Addr>() {
                    Ok(RecordData::Aaaa(v6.to_string()))
                } else {
                    Err(Error::MalformedAnchor(format!(
                        "anchor {} has unparsable address {addr}",
                        anchor.id
                    )))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodns_core::db::RedbStore;

    fn store_with_anchors() -> (Arc<RedbStore>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("geo.redb")).unwrap();
        let service = store.add_service("web", true).unwrap();
        store
            .add_anchor(service.id, geodns_core::types::RecordType::A, "203.0.113.10", 51.5, -0.1)
            .unwrap();
        store
            .add_anchor(
                service.id,
                geodns_core::types::RecordType::A,
                "203.0.113.20,2001:db8::1",
                40.7,
                -74.0,
            )
            .unwrap();
        (Arc::new(store), dir)
    }

    #[test]
    fn resolves_nearest_anchor() {
        let (store, _dir) = store_with_anchors();
        let geoip: Arc<dyn GeoIpLookup> = Arc::new(
            StaticGeoIp::new().with("198.51.100.1".parse().unwrap(), 51.4, -0.2),
        );
        let resolver = GeoResolver::new(store, Some(geoip));

        let records = resolver.resolve("198.51.100.1".parse().unwrap(), "web").unwrap();
        assert_eq!(records, vec![RecordData::A("203.0.113.10".to_string())]);
    }

    #[test]
    fn splits_multi_address_anchor_values() {
        let (store, _dir) = store_with_anchors();
        let geoip: Arc<dyn GeoIpLookup> = Arc::new(
            StaticGeoIp::new().with("198.51.100.1".parse().unwrap(), 40.6, -74.1),
        );
        let resolver = GeoResolver::new(store, Some(geoip));

        let records = resolver.resolve("198.51.100.1".parse().unwrap(), "web").unwrap();
        assert_eq!(
            records,
            vec![
                RecordData::A("203.0.113.20".to_string()),
                RecordData::Aaaa("2001:db8::1".to_string()),
            ]
        );
    }

    #[test]
    fn errors_without_geoip_configured() {
        let (store, _dir) = store_with_anchors();
        let resolver = GeoResolver::new(store, None);
        assert!(matches!(
            resolver.resolve("198.51.100.1".parse().unwrap(), "web"),
            Err(Error::GeoipDisabled)
        ));
    }

    #[test]
    fn errors_when_client_not_located() {
        let (store, _dir) = store_with_anchors();
        let geoip: Arc<dyn GeoIpLookup> = Arc::new(StaticGeoIp::new());
        let resolver = GeoResolver::new(store, Some(geoip));
        assert!(matches!(
            resolver.resolve("198.51.100.1".parse().unwrap(), "web"),
            Err(Error::IpNotLocated(_))
        ));
    }
}
