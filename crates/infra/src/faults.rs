//! Fault injection for the in-memory backends.
//!
//! Lets tests and local runs make a specific backend operation fail a given
//! number of times, to exercise compensation paths without a real outage.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Armed failures keyed by operation.
#[derive(Debug)]
pub struct FaultPlan<K> {
    armed: Mutex<HashMap<K, u32>>,
}

impl<K> Default for FaultPlan<K> {
    fn default() -> Self {
        Self {
            armed: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash> FaultPlan<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` invocations of `op` fail.
    pub fn arm(&self, op: K, times: u32) {
        let mut armed = self.armed.lock().unwrap_or_else(|p| p.into_inner());
        *armed.entry(op).or_insert(0) += times;
    }

    /// Consume one armed failure for `op`; `true` means "fail this call".
    pub fn trip(&self, op: &K) -> bool {
        let mut armed = self.armed.lock().unwrap_or_else(|p| p.into_inner());
        match armed.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                if *remaining == 0 {
                    armed.remove(op);
                }
                true
            }
            _ => false,
        }
    }

    pub fn clear(&self) {
        self.armed.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armed_faults_are_consumed() {
        let plan = FaultPlan::new();
        plan.arm("insert", 2);
        assert!(plan.trip(&"insert"));
        assert!(plan.trip(&"insert"));
        assert!(!plan.trip(&"insert"));
        assert!(!plan.trip(&"delete"));
    }

    #[test]
    fn clear_disarms_everything() {
        let plan = FaultPlan::new();
        plan.arm(1u8, 5);
        plan.clear();
        assert!(!plan.trip(&1));
    }
}
