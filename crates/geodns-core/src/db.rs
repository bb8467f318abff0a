use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{Error, Result};
use crate::types::{Anchor, Record, RecordType, Service, Zone};

/// Zones: zone_id -> Zone (JSON)
const ZONES_TABLE: TableDefinition<i64, &str> = TableDefinition::new("zones");
/// Zone name -> zone_id
const ZONE_NAME_INDEX: TableDefinition<&str, i64> = TableDefinition::new("zone_name_index");

/// Records: record_id -> Record (JSON, `value` carries the raw tab-separated grammar)
const RECORDS_TABLE: TableDefinition<i64, &str> = TableDefinition::new("records");
/// "zone_id:name" -> comma-separated record_ids. Type filtering happens in Rust
/// so a lookup for type T can also surface LOC_RES rows at the same name.
const RECORDS_BY_ZONE_NAME: TableDefinition<&str, &str> = TableDefinition::new("records_by_zone_name");

/// Services: service_id -> Service (JSON)
const SERVICES_TABLE: TableDefinition<i64, &str> = TableDefinition::new("services");
const SERVICE_NAME_INDEX: TableDefinition<&str, i64> = TableDefinition::new("service_name_index");

/// Anchors: anchor_id -> Anchor (JSON)
const ANCHORS_TABLE: TableDefinition<i64, &str> = TableDefinition::new("anchors");
/// service_id -> comma-separated anchor_ids
const ANCHORS_BY_SERVICE: TableDefinition<i64, &str> = TableDefinition::new("anchors_by_service");

/// Monotonic id counters, one row per entity kind.
const COUNTERS_TABLE: TableDefinition<&str, i64> = TableDefinition::new("counters");

/// Storage-backed behavior the resolver and admin surface depend on. Kept as
/// a trait so the resolver can be built against a test double without
/// touching redb.
pub trait RecordStore: Send + Sync {
    fn get_zones(&self) -> Result<Vec<Zone>>;
    fn get_zone(&self, name: &str) -> Result<Option<Zone>>;
    /// Most-specific registered zone whose name is a suffix of `fqdn`.
    fn find_zone_for_fqdn(&self, fqdn: &str) -> Result<Option<Zone>>;
    fn get_zone_records(&self, zone_id: i64) -> Result<Vec<Record>>;
    /// Records at `name` within `zone_id` whose type is `rtype` or `LOC_RES`.
    fn lookup_records_for_type(&self, zone_id: i64, name: &str, rtype: RecordType) -> Result<Vec<Record>>;
    /// Nearest available anchor for `service_name` to the given coordinates.
    fn best_location_resolved_record(&self, lat: f64, long: f64, service_name: &str) -> Result<Anchor>;

    fn add_zone(&self, name: &str) -> Result<Zone>;
    fn add_record(
        &self,
        zone_id: i64,
        name: &str,
        rtype: RecordType,
        value: &str,
        ttl: Option<u32>,
        locked: bool,
    ) -> Result<Record>;
    fn get_record_by_id(&self, id: i64) -> Result<Record>;
    fn put_record_by_id(&self, id: i64, value: &str, ttl: Option<u32>) -> Result<Record>;
    fn delete_record_by_id(&self, id: i64) -> Result<()>;

    fn get_services(&self) -> Result<Vec<Service>>;
    fn add_service(&self, name: &str, available: bool) -> Result<Service>;
    fn add_anchor(&self, service_id: i64, rtype: RecordType, value: &str, lat: f64, long: f64) -> Result<Anchor>;
}

#[derive(Clone)]
pub struct RedbStore {
    inner: Arc<Database>,
    /// Set for the duration of a `tx()` call so a re-entrant `tx()` on the
    /// same handle is rejected rather than silently nesting.
    in_tx: Arc<AtomicBool>,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ZONES_TABLE)?;
            let _ = write_txn.open_table(ZONE_NAME_INDEX)?;
            let _ = write_txn.open_table(RECORDS_TABLE)?;
            let _ = write_txn.open_table(RECORDS_BY_ZONE_NAME)?;
            let _ = write_txn.open_table(SERVICES_TABLE)?;
            let _ = write_txn.open_table(SERVICE_NAME_INDEX)?;
            let _ = write_txn.open_table(ANCHORS_TABLE)?;
            let _ = write_txn.open_table(ANCHORS_BY_SERVICE)?;
            let _ = write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { inner: Arc::new(db), in_tx: Arc::new(AtomicBool::new(false)) })
    }

    /// Run a closure against this store inside a single logical operation.
    /// Exists so callers that need to perform several mutating calls as one
    /// unit (e.g. the admin API creating a zone and seeding its records) have
    /// a named place to do so, mirroring the "convert a handle into a
    /// transaction" pattern the original store exposed. Each call inside the
    /// closure still commits its own redb write transaction; if `f` fails,
    /// nothing is rolled back beyond what `f` itself already wrote, since
    /// each mutating call is already its own committed redb transaction.
    ///
    /// Rejects re-entrant calls on the same handle with
    /// [`Error::CannotConvertToTx`] — the store handle passed to the closure
    /// is already transaction-scoped, and a nested `tx()` on it would not be
    /// a real transaction boundary.
    pub fn tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RedbStore) -> Result<T>,
    {
        if self.in_tx.swap(true, Ordering::SeqCst) {
            return Err(Error::CannotConvertToTx(
                "store handle is already inside a tx() call".to_string(),
            ));
        }
        let result = f(self);
        self.in_tx.store(false, Ordering::SeqCst);
        result
    }

    fn next_id(&self, kind: &str) -> Result<i64> {
        let write_txn = self.inner.begin_write()?;
        let id;
        {
            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
            let next = counters.get(kind)?.map(|v| v.value()).unwrap_or(0) + 1;
            counters.insert(kind, next)?;
            id = next;
        }
        write_txn.commit()?;
        Ok(id)
    }
}

impl RecordStore for RedbStore {
    fn get_zones(&self) -> Result<Vec<Zone>> {
        let read_txn = self.inner.begin_read()?;
        let zones = read_txn.open_table(ZONES_TABLE)?;
        let mut result = Vec::new();
        for entry in zones.iter()? {
            let (_, v) = entry.map_err(|e| Error::Database(e.to_string()))?;
            result.push(serde_json::from_str(v.value())?);
        }
        Ok(result)
    }

    fn get_zone(&self, name: &str) -> Result<Option<Zone>> {
        let read_txn = self.inner.begin_read()?;
        let name_idx = read_txn.open_table(ZONE_NAME_INDEX)?;
        let id = match name_idx.get(name)? {
            Some(v) => v.value(),
            None => return Ok(None),
        };
        let zones = read_txn.open_table(ZONES_TABLE)?;
        match zones.get(id)? {
            Some(v) => Ok(Some(serde_json::from_str(v.value())?)),
            None => Ok(None),
        }
    }

    fn find_zone_for_fqdn(&self, fqdn: &str) -> Result<Option<Zone>> {
        let fqdn = fqdn.trim_end_matches('.');
        let zones = self.get_zones()?;
        let mut best: Option<Zone> = None;
        for zone in zones {
            let zone_name = zone.name.trim_end_matches('.');
            let matches = fqdn == zone_name || fqdn.ends_with(&format!(".{zone_name}"));
            if matches && best.as_ref().map(|b| zone.name.len() > b.name.len()).unwrap_or(true) {
                best = Some(zone);
            }
        }
        Ok(best)
    }

    fn get_zone_records(&self, zone_id: i64) -> Result<Vec<Record>> {
        let read_txn = self.inner.begin_read()?;
        let records = read_txn.open_table(RECORDS_TABLE)?;
        let mut result = Vec::new();
        for entry in records.iter()? {
            let (_, v) = entry.map_err(|e| Error::Database(e.to_string()))?;
            let record: Record = serde_json::from_str(v.value())?;
            if record.zone == zone_id {
                result.push(record);
            }
        }
        Ok(result)
    }

    fn lookup_records_for_type(&self, zone_id: i64, name: &str, rtype: RecordType) -> Result<Vec<Record>> {
        let read_txn = self.inner.begin_read()?;
        let by_name = read_txn.open_table(RECORDS_BY_ZONE_NAME)?;
        let records = read_txn.open_table(RECORDS_TABLE)?;

        let index_key = format!("{zone_id}:{name}");
        let ids = match by_name.get(index_key.as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(Vec::new()),
        };

        let mut result = Vec::new();
        for rid in ids.split(',') {
            let Ok(rid) = rid.parse::<i64>() else { continue };
            if let Some(v) = records.get(rid)? {
                let record: Record = serde_json::from_str(v.value())?;
                if record.rtype == rtype || matches!(record.rtype, RecordType::LocRes) {
                    result.push(record);
                }
            }
        }
        Ok(result)
    }

    fn best_location_resolved_record(&self, lat: f64, long: f64, service_name: &str) -> Result<Anchor> {
        let read_txn = self.inner.begin_read()?;
        let service_idx = read_txn.open_table(SERVICE_NAME_INDEX)?;
        let services = read_txn.open_table(SERVICES_TABLE)?;

        let service_id = match service_idx.get(service_name)? {
            Some(v) => v.value(),
            None => return Err(Error::ServiceNotFound(service_name.to_string())),
        };
        let service: Service = match services.get(service_id)? {
            Some(v) => serde_json::from_str(v.value())?,
            None => return Err(Error::ServiceNotFound(service_name.to_string())),
        };
        if !service.available {
            return Err(Error::NoAnchorsForService(service_name.to_string()));
        }

        let anchors_by_service = read_txn.open_table(ANCHORS_BY_SERVICE)?;
        let anchors = read_txn.open_table(ANCHORS_TABLE)?;
        let ids = match anchors_by_service.get(service_id)? {
            Some(v) => v.value().to_string(),
            None => return Err(Error::NoAnchorsForService(service_name.to_string())),
        };

        let mut best: Option<(Anchor, f64)> = None;
        for aid in ids.split(',') {
            let Ok(aid) = aid.parse::<i64>() else { continue };
            let Some(v) = anchors.get(aid)? else { continue };
            let anchor: Anchor = serde_json::from_str(v.value())?;

            let lat_diff = lat - anchor.lat;
            let long_diff = long - anchor.long;
            let d1 = lat_diff * lat_diff + long_diff * long_diff;
            let d2 = lat_diff * lat_diff + (long_diff + 360.0) * (long_diff + 360.0);
            let d3 = lat_diff * lat_diff + (long_diff - 360.0) * (long_diff - 360.0);
            let distance = d1.min(d2).min(d3);

            match &best {
                Some((_, best_distance)) if distance >= *best_distance => {}
                _ => best = Some((anchor, distance)),
            }
        }

        best.map(|(anchor, _)| anchor)
            .ok_or_else(|| Error::NoAnchorsForService(service_name.to_string()))
    }

    fn add_zone(&self, name: &str) -> Result<Zone> {
        {
            let read_txn = self.inner.begin_read()?;
            let name_idx = read_txn.open_table(ZONE_NAME_INDEX)?;
            if name_idx.get(name)?.is_some() {
                return Err(Error::DuplicateZone(name.to_string()));
            }
        }

        // Allocate the id (its own committed write transaction) before
        // opening this method's write transaction — redb allows only one
        // live write transaction per `Database`, and `next_id` would
        // deadlock against a `write_txn` still held open here.
        let id = self.next_id("zones")?;
        let zone = Zone { id, name: name.to_string() };
        let json = serde_json::to_string(&zone)?;

        let write_txn = self.inner.begin_write()?;
        {
            let mut zones = write_txn.open_table(ZONES_TABLE)?;
            zones.insert(id, json.as_str())?;
            let mut name_idx = write_txn.open_table(ZONE_NAME_INDEX)?;
            name_idx.insert(name, id)?;
        }
        write_txn.commit()?;
        Ok(zone)
    }

    fn add_record(
        &self,
        zone_id: i64,
        name: &str,
        rtype: RecordType,
        value: &str,
        ttl: Option<u32>,
        locked: bool,
    ) -> Result<Record> {
        let id = self.next_id("records")?;
        let record = Record { id, zone: zone_id, name: name.to_string(), rtype, locked, ttl, value: value.to_string() };

        let write_txn = self.inner.begin_write()?;
        {
            let json = serde_json::to_string(&record)?;
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            records.insert(id, json.as_str())?;

            let index_key = format!("{zone_id}:{name}");
            let mut by_name = write_txn.open_table(RECORDS_BY_ZONE_NAME)?;
            let new_val = match by_name.get(index_key.as_str())? {
                Some(v) => format!("{},{id}", v.value()),
                None => id.to_string(),
            };
            by_name.insert(index_key.as_str(), new_val.as_str())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    fn get_record_by_id(&self, id: i64) -> Result<Record> {
        let read_txn = self.inner.begin_read()?;
        let records = read_txn.open_table(RECORDS_TABLE)?;
        match records.get(id)? {
            Some(v) => Ok(serde_json::from_str(v.value())?),
            None => Err(Error::RecordNotFound(id.to_string())),
        }
    }

    fn put_record_by_id(&self, id: i64, value: &str, ttl: Option<u32>) -> Result<Record> {
        let write_txn = self.inner.begin_write()?;
        let record;
        {
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let existing = records
                .get(id)?
                .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
            let mut current: Record = serde_json::from_str(existing.value())?;
            drop(existing);

            if current.locked {
                return Err(Error::RecordLocked(id));
            }

            current.value = value.to_string();
            if ttl.is_some() {
                current.ttl = ttl;
            }
            record = current;
            let json = serde_json::to_string(&record)?;
            records.insert(id, json.as_str())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    fn delete_record_by_id(&self, id: i64) -> Result<()> {
        let write_txn = self.inner.begin_write()?;
        {
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let existing = records
                .get(id)?
                .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
            let record: Record = serde_json::from_str(existing.value())?;
            drop(existing);

            if record.locked {
                return Err(Error::RecordLocked(id));
            }

            records.remove(id)?;

            let index_key = format!("{}:{}", record.zone, record.name);
            let id_str = id.to_string();
            let mut by_name = write_txn.open_table(RECORDS_BY_ZONE_NAME)?;
            if let Some(v) = by_name.get(index_key.as_str())? {
                let remaining: Vec<&str> = v.value().split(',').filter(|s| *s != id_str).collect();
                let remaining = remaining.join(",");
                drop(v);
                if remaining.is_empty() {
                    by_name.remove(index_key.as_str())?;
                } else {
                    by_name.insert(index_key.as_str(), remaining.as_str())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_services(&self) -> Result<Vec<Service>> {
        let read_txn = self.inner.begin_read()?;
        let services = read_txn.open_table(SERVICES_TABLE)?;
        let mut result = Vec::new();
        for entry in services.iter()? {
            let (_, v) = entry.map_err(|e| Error::Database(e.to_string()))?;
            result.push(serde_json::from_str(v.value())?);
        }
        Ok(result)
    }

    fn add_service(&self, name: &str, available: bool) -> Result<Service> {
        let id = self.next_id("services")?;
        let service = Service { id, name: name.to_string(), available };

        let write_txn = self.inner.begin_write()?;
        {
            let json = serde_json::to_string(&service)?;
            let mut services = write_txn.open_table(SERVICES_TABLE)?;
            services.insert(id, json.as_str())?;
            let mut name_idx = write_txn.open_table(SERVICE_NAME_INDEX)?;
            name_idx.insert(name, id)?;
        }
        write_txn.commit()?;
        Ok(service)
    }

    fn add_anchor(&self, service_id: i64, rtype: RecordType, value: &str, lat: f64, long: f64) -> Result<Anchor> {
        let id = self.next_id("anchors")?;
        let anchor = Anchor { id, service: service_id, rtype, value: value.to_string(), lat, long };

        let write_txn = self.inner.begin_write()?;
        {
            let json = serde_json::to_string(&anchor)?;
            let mut anchors = write_txn.open_table(ANCHORS_TABLE)?;
            anchors.insert(id, json.as_str())?;

            let mut by_service = write_txn.open_table(ANCHORS_BY_SERVICE)?;
            let new_val = match by_service.get(service_id)? {
                Some(v) => format!("{},{id}", v.value()),
                None => id.to_string(),
            };
            by_service.insert(service_id, new_val.as_str())?;
        }
        write_txn.commit()?;
        Ok(anchor)
    }
}
