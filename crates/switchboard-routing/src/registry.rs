use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use switchboard_core::{SwitchboardError, SwitchboardResult, WorkerId};
use tracing::{debug, info, warn};

/// Whether a worker can take new work right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    /// `current_load >= max_concurrent`.
    Busy,
    Offline,
}

/// Capabilities, limits and rolling performance stats for one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub worker_id: WorkerId,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub specializations: BTreeSet<String>,
    pub max_concurrent: u32,
    #[serde(default)]
    pub current_load: u32,
    /// Exponential moving average in `[0, 100]`.
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    /// Exponential moving average of completion latency.
    #[serde(default)]
    pub avg_response_time_ms: f64,
    #[serde(default)]
    pub offline: bool,
}

fn default_success_rate() -> f64 {
    100.0
}

impl CapabilityProfile {
    pub fn new(worker_id: impl Into<WorkerId>, max_concurrent: u32) -> Self {
        Self {
            worker_id: worker_id.into(),
            capabilities: BTreeSet::new(),
            specializations: BTreeSet::new(),
            max_concurrent,
            current_load: 0,
            success_rate: default_success_rate(),
            avg_response_time_ms: 0.0,
            offline: false,
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(caps.into_iter().map(Into::into));
        self
    }

    pub fn with_specializations<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specializations.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn with_stats(mut self, success_rate: f64, avg_response_time_ms: f64) -> Self {
        self.success_rate = success_rate;
        self.avg_response_time_ms = avg_response_time_ms;
        self
    }

    /// Derived from the offline flag and the load.
    pub fn availability(&self) -> Availability {
        if self.offline {
            Availability::Offline
        } else if self.current_load >= self.max_concurrent {
            Availability::Busy
        } else {
            Availability::Available
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.capabilities.contains(tag) || self.specializations.contains(tag)
    }

    /// Capability ∪ specialization set is a superset of `required`.
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|r| self.has_tag(r))
    }

    /// How many of `required` this worker has.
    pub fn matched_count(&self, required: &[String]) -> usize {
        required.iter().filter(|r| self.has_tag(r)).count()
    }

    fn validate(&self) -> SwitchboardResult<()> {
        if self.max_concurrent == 0 {
            return Err(SwitchboardError::Config(format!(
                "Worker '{}' must have max_concurrent > 0",
                self.worker_id
            )));
        }
        if self.current_load > self.max_concurrent {
            return Err(SwitchboardError::CapacityExceeded {
                worker: self.worker_id.clone(),
                current: self.current_load,
                max: self.max_concurrent,
            });
        }
        Ok(())
    }
}

fn ema(current: f64, sample: f64, weight: f64) -> f64 {
    current * (1.0 - weight) + sample * weight
}

/// Default smoothing weight for the rolling stats.
pub const DEFAULT_EMA_WEIGHT: f64 = 0.1;

/// Shared, thread-safe registry of worker profiles.
///
/// Every mutation happens under one write lock, so load checks and
/// increments cannot interleave between callers.
pub struct CapabilityRegistry {
    /// Registration order is preserved; it is the tie-break order for scoring.
    profiles: RwLock<Vec<CapabilityProfile>>,
    ema_weight: f64,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::with_ema_weight(DEFAULT_EMA_WEIGHT)
    }

    pub fn with_ema_weight(ema_weight: f64) -> Self {
        Self {
            profiles: RwLock::new(Vec::new()),
            ema_weight,
        }
    }

    pub fn ema_weight(&self) -> f64 {
        self.ema_weight
    }

    /// Register a worker. Re-registering an id replaces its static attributes
    /// and keeps its live load.
    pub fn register(&self, mut profile: CapabilityProfile) -> SwitchboardResult<()> {
        profile.validate()?;
        let mut profiles = self.profiles.write();
        if let Some(existing) = profiles.iter_mut().find(|p| p.worker_id == profile.worker_id) {
            if existing.current_load > profile.max_concurrent {
                return Err(SwitchboardError::Config(format!(
                    "Worker '{}' has {} tasks in flight, cannot shrink max_concurrent to {}",
                    profile.worker_id, existing.current_load, profile.max_concurrent
                )));
            }
            profile.current_load = existing.current_load;
            info!(worker = %profile.worker_id, "Worker profile re-registered");
            *existing = profile;
        } else {
            info!(
                worker = %profile.worker_id,
                max_concurrent = profile.max_concurrent,
                capabilities = profile.capabilities.len(),
                "Worker registered"
            );
            profiles.push(profile);
        }
        Ok(())
    }

    pub fn get(&self, worker: &str) -> Option<CapabilityProfile> {
        self.profiles
            .read()
            .iter()
            .find(|p| p.worker_id == worker)
            .cloned()
    }

    /// All profiles in registration order.
    pub fn list(&self) -> Vec<CapabilityProfile> {
        self.profiles.read().clone()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    /// Available workers that cover every required capability.
    pub fn list_eligible(&self, required: &[String]) -> Vec<CapabilityProfile> {
        self.profiles
            .read()
            .iter()
            .filter(|p| p.availability() == Availability::Available && p.covers(required))
            .cloned()
            .collect()
    }

    /// First online worker that covers `required`, whatever its load.
    pub fn any_capable(&self, required: &[String], exclude: Option<&str>) -> Option<CapabilityProfile> {
        self.profiles
            .read()
            .iter()
            .find(|p| !p.offline && p.covers(required) && Some(p.worker_id.as_str()) != exclude)
            .cloned()
    }

    /// Add `delta` to a worker's load and return the new load.
    ///
    /// Increments past `max_concurrent` fail with `CapacityExceeded`;
    /// decrements saturate at zero.
    pub fn adjust_load(&self, worker: &str, delta: i64) -> SwitchboardResult<u32> {
        let mut profiles = self.profiles.write();
        let profile = find_mut(&mut profiles, worker)?;
        let next = i64::from(profile.current_load) + delta;
        if delta > 0 && next > i64::from(profile.max_concurrent) {
            warn!(
                worker = %worker,
                load = profile.current_load,
                max = profile.max_concurrent,
                "Load increment rejected"
            );
            return Err(SwitchboardError::CapacityExceeded {
                worker: worker.to_string(),
                current: profile.current_load,
                max: profile.max_concurrent,
            });
        }
        profile.current_load = next.max(0) as u32;
        debug!(worker = %worker, load = profile.current_load, "Load adjusted");
        Ok(profile.current_load)
    }

    /// Fold one finished task into the rolling stats.
    pub fn record_outcome(&self, worker: &str, success: bool, latency_ms: f64) -> SwitchboardResult<()> {
        let mut profiles = self.profiles.write();
        let profile = find_mut(&mut profiles, worker)?;
        apply_outcome(profile, success, latency_ms, self.ema_weight);
        Ok(())
    }

    /// Release one load unit and record the outcome as one atomic step.
    pub fn release(&self, worker: &str, success: bool, latency_ms: f64) -> SwitchboardResult<()> {
        let mut profiles = self.profiles.write();
        let profile = find_mut(&mut profiles, worker)?;
        profile.current_load = profile.current_load.saturating_sub(1);
        apply_outcome(profile, success, latency_ms, self.ema_weight);
        debug!(
            worker = %worker,
            load = profile.current_load,
            success_rate = profile.success_rate,
            "Load released"
        );
        Ok(())
    }

    pub fn set_offline(&self, worker: &str, offline: bool) -> SwitchboardResult<()> {
        let mut profiles = self.profiles.write();
        let profile = find_mut(&mut profiles, worker)?;
        profile.offline = offline;
        info!(worker = %worker, offline, "Worker availability changed");
        Ok(())
    }

    /// Dashboard-style JSON view of every profile.
    pub fn to_json(&self) -> serde_json::Value {
        let profiles = self.profiles.read();
        serde_json::Value::Array(
            profiles
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "worker_id": p.worker_id,
                        "availability": p.availability(),
                        "current_load": p.current_load,
                        "max_concurrent": p.max_concurrent,
                        "success_rate": p.success_rate,
                        "avg_response_time_ms": p.avg_response_time_ms,
                        "capabilities": p.capabilities,
                        "specializations": p.specializations,
                    })
                })
                .collect(),
        )
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_mut<'a>(
    profiles: &'a mut [CapabilityProfile],
    worker: &str,
) -> SwitchboardResult<&'a mut CapabilityProfile> {
    profiles
        .iter_mut()
        .find(|p| p.worker_id == worker)
        .ok_or_else(|| SwitchboardError::UnknownWorker(worker.to_string()))
}

fn apply_outcome(profile: &mut CapabilityProfile, success: bool, latency_ms: f64, weight: f64) {
    let sample = if success { 100.0 } else { 0.0 };
    profile.success_rate = ema(profile.success_rate, sample, weight);
    profile.avg_response_time_ms = ema(profile.avg_response_time_ms, latency_ms.max(0.0), weight);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn caps(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn registry_with(profiles: Vec<CapabilityProfile>) -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        for p in profiles {
            registry.register(p).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_rejects_zero_capacity() {
        let registry = CapabilityRegistry::new();
        let err = registry.register(CapabilityProfile::new("w", 0)).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_eligible_requires_superset_of_union() {
        let registry = registry_with(vec![
            CapabilityProfile::new("a", 2).with_capabilities(["billing"]),
            CapabilityProfile::new("b", 2)
                .with_capabilities(["billing"])
                .with_specializations(["refunds"]),
        ]);
        let eligible = registry.list_eligible(&caps(&["billing", "refunds"]));
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].worker_id, "b");

        // Empty requirement matches everyone.
        assert_eq!(registry.list_eligible(&[]).len(), 2);
    }

    #[test]
    fn test_busy_and_offline_are_not_eligible() {
        let registry = registry_with(vec![
            CapabilityProfile::new("busy", 1).with_capabilities(["x"]),
            CapabilityProfile::new("off", 1).with_capabilities(["x"]),
            CapabilityProfile::new("free", 1).with_capabilities(["x"]),
        ]);
        registry.adjust_load("busy", 1).unwrap();
        registry.set_offline("off", true).unwrap();

        let ids: Vec<_> = registry
            .list_eligible(&caps(&["x"]))
            .into_iter()
            .map(|p| p.worker_id)
            .collect();
        assert_eq!(ids, vec!["free".to_string()]);
        assert_eq!(registry.get("busy").unwrap().availability(), Availability::Busy);
        assert_eq!(registry.get("off").unwrap().availability(), Availability::Offline);
        assert_eq!(registry.any_capable(&caps(&["x"]), None).unwrap().worker_id, "busy");
        assert_eq!(registry.any_capable(&caps(&["x"]), Some("busy")).unwrap().worker_id, "free");
    }

    #[test]
    fn test_adjust_load_rejects_overflow_and_saturates_at_zero() {
        let registry = registry_with(vec![CapabilityProfile::new("w", 2)]);
        assert_eq!(registry.adjust_load("w", 1).unwrap(), 1);
        assert_eq!(registry.adjust_load("w", 1).unwrap(), 2);
        let err = registry.adjust_load("w", 1).unwrap_err();
        assert!(matches!(
            err,
            SwitchboardError::CapacityExceeded { current: 2, max: 2, .. }
        ));
        assert_eq!(registry.get("w").unwrap().current_load, 2);

        assert_eq!(registry.adjust_load("w", -5).unwrap(), 0);
        assert_eq!(registry.adjust_load("w", -1).unwrap(), 0);
    }

    #[test]
    fn test_unknown_worker() {
        let registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.adjust_load("ghost", 1),
            Err(SwitchboardError::UnknownWorker(_))
        ));
        assert!(registry.record_outcome("ghost", true, 1.0).is_err());
    }

    #[test]
    fn test_record_outcome_ema() {
        let registry = registry_with(vec![CapabilityProfile::new("w", 1).with_stats(80.0, 2000.0)]);
        registry.record_outcome("w", false, 1000.0).unwrap();
        let p = registry.get("w").unwrap();
        assert!((p.success_rate - 72.0).abs() < 1e-9);
        assert!((p.avg_response_time_ms - 1900.0).abs() < 1e-9);

        registry.record_outcome("w", true, 1900.0).unwrap();
        let p = registry.get("w").unwrap();
        assert!((p.success_rate - 74.8).abs() < 1e-9);
        assert!((p.avg_response_time_ms - 1900.0).abs() < 1e-9);
    }

    #[test]
    fn test_release_is_decrement_plus_outcome() {
        let registry = registry_with(vec![CapabilityProfile::new("w", 1)]);
        registry.adjust_load("w", 1).unwrap();
        registry.release("w", true, 500.0).unwrap();
        let p = registry.get("w").unwrap();
        assert_eq!(p.current_load, 0);
        assert!((p.success_rate - 100.0).abs() < 1e-9);
        assert!((p.avg_response_time_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_reregister_keeps_live_load() {
        let registry = registry_with(vec![CapabilityProfile::new("w", 3)]);
        registry.adjust_load("w", 2).unwrap();
        registry
            .register(CapabilityProfile::new("w", 4).with_capabilities(["new"]))
            .unwrap();
        let p = registry.get("w").unwrap();
        assert_eq!(p.current_load, 2);
        assert_eq!(p.max_concurrent, 4);
        assert!(p.has_tag("new"));

        assert!(registry.register(CapabilityProfile::new("w", 1)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_to_json_reports_derived_availability() {
        let registry = registry_with(vec![CapabilityProfile::new("w", 1)]);
        registry.adjust_load("w", 1).unwrap();
        let json = registry.to_json();
        assert_eq!(json[0]["availability"], "busy");
        assert_eq!(json[0]["current_load"], 1);
    }
}
