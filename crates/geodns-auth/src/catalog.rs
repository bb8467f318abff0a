use std::str::FromStr;
use std::sync::Arc;

use hickory_proto::rr::LowerName;

use geodns_core::db::RecordStore;

/// Tracks the set of zones this server is authoritative for, backed by the
/// same store the resolver reads records from.
pub struct ZoneCatalog {
    store: Arc<dyn RecordStore>,
}

impl ZoneCatalog {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn zone_names(&self) -> Vec<LowerName> {
        match self.store.get_zones() {
            Ok(zones) => zones
                .iter()
                .filter_map(|z| {
                    let fqdn = if z.name.ends_with('.') {
                        z.name.clone()
                    } else {
                        format!("{}.", z.name)
                    };
                    LowerName::from_str(&fqdn).ok()
                })
                .collect(),
            Err(e) => {
                tracing::error!("failed to list zones: {e}");
                Vec::new()
            }
        }
    }
}
