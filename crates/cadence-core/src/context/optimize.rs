use cadence_types::Session;
use serde::Serialize;

/// One strategy: estimated saving as a fraction of tokens used, and whether
/// applying it can change observable behavior.
struct Strategy {
    name: &'static str,
    fraction: f64,
    high_risk: bool,
    side_effect: &'static str,
}

// Ascending risk. Applied in order until the target reduction is met.
const STRATEGIES: [Strategy; 4] = [
    Strategy {
        name: "remove_comments",
        fraction: 0.03,
        high_risk: false,
        side_effect: "inline commentary dropped from working context",
    },
    Strategy {
        name: "consolidate_imports",
        fraction: 0.02,
        high_risk: false,
        side_effect: "import lists deduplicated",
    },
    Strategy {
        name: "drop_low_priority_context",
        fraction: 0.10,
        high_risk: false,
        side_effect: "background references unloaded",
    },
    Strategy {
        name: "summarize_history",
        fraction: 0.25,
        high_risk: true,
        side_effect: "earlier conversation replaced by a summary",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub optimizations_applied: Vec<String>,
    pub tokens_saved: u64,
    pub side_effects: Vec<String>,
    /// Capacity left after the saving is realized
    pub new_capacity: u64,
    pub target_met: bool,
}

/// Pick strategies until the target is met. The sample ledger is never
/// rewritten; savings are realized by the caller re-packing its context.
pub fn plan(session: &Session, target_reduction: u64, preserve_functionality: bool) -> OptimizationResult {
    let used = session.context_used;
    let mut saved: u64 = 0;
    let mut applied = Vec::new();
    let mut side_effects = Vec::new();

    for strategy in STRATEGIES.iter() {
        if saved >= target_reduction {
            break;
        }
        if preserve_functionality && strategy.high_risk {
            continue;
        }
        let gain = (used as f64 * strategy.fraction) as u64;
        if gain == 0 {
            continue;
        }
        saved += gain;
        applied.push(strategy.name.to_string());
        side_effects.push(strategy.side_effect.to_string());
    }

    let remaining_before = session.context_budget.saturating_sub(used);
    OptimizationResult {
        target_met: saved >= target_reduction,
        optimizations_applied: applied,
        tokens_saved: saved,
        side_effects,
        new_capacity: remaining_before + saved,
    }
}

/// Usage-scaled advice strings shared with `predict`
pub fn suggestions_for(usage_percent: f64) -> Vec<String> {
    let mut out = Vec::new();
    if usage_percent > 80.0 {
        out.push("summarize prior conversation before continuing".to_string());
    }
    if usage_percent > 60.0 {
        out.push("drop low-priority context".to_string());
    }
    if usage_percent > 40.0 {
        out.push("consolidate duplicated imports and snippets".to_string());
    }
    out
}
