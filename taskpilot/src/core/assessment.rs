//! Criticality scoring for the orient phase.

use crate::core::types::TaskAssessment;
use crate::task::{MAX_PRIORITY, Task};

const IMPACT_KEYWORDS: [&str; 5] = ["revenue", "customer", "critical", "production", "security"];
const BASE_IMPACT: f64 = 0.5;
const IMPACT_PER_KEYWORD: f64 = 0.2;
const MAX_PRIORITY_IMPACT_FLOOR: f64 = 0.9;
const FILES_FOR_FULL_COMPLEXITY: f64 = 10.0;

/// Score a task. Pure; every component is clipped to `[0, 1]`.
pub fn assess(task: &Task) -> TaskAssessment {
    let urgency = clip(f64::from(task.priority) / f64::from(MAX_PRIORITY));
    let complexity = clip(task.affected_files.len() as f64 / FILES_FOR_FULL_COMPLEXITY);
    let business_impact = business_impact(task);
    let overall_criticality = clip(0.4 * urgency + 0.2 * complexity + 0.4 * business_impact);

    TaskAssessment {
        urgency,
        complexity,
        business_impact,
        overall_criticality,
    }
}

fn business_impact(task: &Task) -> f64 {
    let description = task
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let hits = IMPACT_KEYWORDS
        .iter()
        .filter(|keyword| description.contains(*keyword))
        .count();
    let mut impact = clip(BASE_IMPACT + IMPACT_PER_KEYWORD * hits as f64);
    if task.priority >= MAX_PRIORITY {
        impact = impact.max(MAX_PRIORITY_IMPACT_FLOOR);
    }
    impact
}

fn clip(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn outage_description_saturates_impact() {
        let mut t = task("t", 3);
        t.description = Some("Production outage affecting customer revenue".to_string());
        let assessment = assess(&t);
        assert!(assessment.business_impact >= 0.9);
        assert!(close(assessment.business_impact, 1.0));
        assert!(close(assessment.urgency, 1.0));
    }

    #[test]
    fn max_priority_floors_impact_without_keywords() {
        let t = task("t", 3);
        assert!(close(assess(&t).business_impact, 0.9));
    }

    #[test]
    fn plain_low_priority_task_scores_baseline() {
        let t = task("t", 0);
        let assessment = assess(&t);
        assert!(close(assessment.urgency, 0.0));
        assert!(close(assessment.complexity, 0.0));
        assert!(close(assessment.business_impact, 0.5));
        assert!(close(assessment.overall_criticality, 0.2));
    }

    #[test]
    fn criticality_stays_in_unit_interval() {
        for priority in 0..=MAX_PRIORITY {
            for files in [0usize, 1, 9, 10, 11, 250] {
                let mut t = task("t", priority);
                t.affected_files = (0..files).map(|i| format!("f{i}.rs")).collect();
                t.description = Some("critical security production revenue customer".to_string());
                let a = assess(&t);
                for value in [a.urgency, a.complexity, a.business_impact, a.overall_criticality] {
                    assert!((0.0..=1.0).contains(&value), "{value} out of range");
                }
            }
        }
    }

    #[test]
    fn complexity_saturates_at_ten_files() {
        let mut t = task("t", 1);
        t.affected_files = (0..4).map(|i| format!("f{i}")).collect();
        assert!(close(assess(&t).complexity, 0.4));
        t.affected_files = (0..40).map(|i| format!("f{i}")).collect();
        assert!(close(assess(&t).complexity, 1.0));
    }
}
