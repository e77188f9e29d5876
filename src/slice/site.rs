use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

use super::TopologyError;
use crate::models::Record;

/// Free capacity of one site, as far as placement cares
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCapacity {
    pub name: String,
    pub cores_available: u64,
    pub ram_available: u64,
    pub disk_available: u64,
}

impl SiteCapacity {
    /// Read a site record. Sites that are not active or have no hosts are
    /// not placement candidates and yield `None`.
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = record.get("name")?.as_str()?.to_string();
        if record.get("state").and_then(Value::as_str) != Some("Active") {
            return None;
        }
        let hosts = match record.get("hosts") {
            Some(Value::Array(hosts)) => hosts.len() as u64,
            Some(v) => v.as_u64().unwrap_or(0),
            None => 0,
        };
        if hosts == 0 {
            return None;
        }
        let num = |key: &str| {
            record
                .get(key)
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
                .unwrap_or(0)
        };
        Some(Self {
            name,
            cores_available: num("cores_available"),
            ram_available: num("ram_available"),
            disk_available: num("disk_available"),
        })
    }

    pub fn fits(&self, req: &ResourceRequest) -> bool {
        self.cores_available >= req.cores as u64
            && self.ram_available >= req.ram as u64
            && self.disk_available >= req.disk as u64
    }
}

/// Capacity a node needs from its site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRequest {
    pub cores: u32,
    pub ram: u32,
    pub disk: u32,
}

/// Pick a site with room for `req`, preferring sites not yet used in this
/// pass. Diversity is a preference only: when every feasible site is already
/// used, one of them is reused.
pub fn select_site<R: Rng + ?Sized>(
    pool: &[SiteCapacity],
    req: &ResourceRequest,
    used: &[String],
    rng: &mut R,
) -> Result<String, TopologyError> {
    let feasible: Vec<&SiteCapacity> = pool.iter().filter(|s| s.fits(req)).collect();
    if feasible.is_empty() {
        return Err(TopologyError::NoFeasibleSite {
            cores: req.cores,
            ram: req.ram,
            disk: req.disk,
        });
    }

    let unused: Vec<&SiteCapacity> = feasible
        .iter()
        .copied()
        .filter(|s| !used.iter().any(|u| u == &s.name))
        .collect();
    let candidates = if unused.is_empty() { &feasible } else { &unused };

    candidates
        .choose(rng)
        .map(|s| s.name.clone())
        .ok_or(TopologyError::NoFeasibleSite {
            cores: req.cores,
            ram: req.ram,
            disk: req.disk,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn site(name: &str, cores: u64) -> SiteCapacity {
        SiteCapacity {
            name: name.to_string(),
            cores_available: cores,
            ram_available: 512,
            disk_available: 4096,
        }
    }

    const SMALL: ResourceRequest = ResourceRequest { cores: 2, ram: 8, disk: 10 };

    #[test]
    fn test_from_record_filters_inactive_and_empty_sites() {
        let active = record(json!({
            "name": "STAR", "state": "Active", "hosts": 3,
            "cores_available": 64, "ram_available": 256, "disk_available": 1000
        }));
        assert_eq!(SiteCapacity::from_record(&active).unwrap().cores_available, 64);

        let hosts_list = record(json!({"name": "UTAH", "state": "Active", "hosts": ["h1"]}));
        assert!(SiteCapacity::from_record(&hosts_list).is_some());

        let maint = record(json!({"name": "WASH", "state": "Maint", "hosts": 3}));
        assert!(SiteCapacity::from_record(&maint).is_none());

        let no_hosts = record(json!({"name": "TACC", "state": "Active", "hosts": 0}));
        assert!(SiteCapacity::from_record(&no_hosts).is_none());
    }

    #[test]
    fn test_prefers_unused_sites() {
        let pool = vec![site("STAR", 64), site("UTAH", 64)];
        let used = vec!["STAR".to_string()];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(select_site(&pool, &SMALL, &used, &mut rng).unwrap(), "UTAH");
        }
    }

    #[test]
    fn test_reuses_sites_when_all_used() {
        let pool = vec![site("STAR", 64)];
        let used = vec!["STAR".to_string()];
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(select_site(&pool, &SMALL, &used, &mut rng).unwrap(), "STAR");
    }

    #[test]
    fn test_no_feasible_site() {
        let pool = vec![site("STAR", 1)];
        let mut rng = StdRng::seed_from_u64(7);
        let err = select_site(&pool, &SMALL, &[], &mut rng).unwrap_err();
        assert_eq!(err.kind(), "NoFeasibleSite");
        assert!(err.to_string().contains("cores>=2"));
    }
}
