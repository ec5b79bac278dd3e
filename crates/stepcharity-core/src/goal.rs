//! Goal achievement and charity accounting.

use serde::{Deserialize, Serialize};

use crate::ledger::GlobalSettings;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub goal_achieved: bool,
    pub charity_earned: f64,
}

/// `goal_achieved` iff `steps >= daily_step_goal`; charity is the fixed
/// per-goal amount when achieved, otherwise 0.
pub fn evaluate(steps: u64, settings: &GlobalSettings) -> GoalOutcome {
    let goal_achieved = steps >= settings.daily_step_goal;
    GoalOutcome {
        goal_achieved,
        charity_earned: if goal_achieved {
            settings.charity_amount_per_goal
        } else {
            0.0
        },
    }
}

/// Progress toward the goal in percent, capped at 100.
pub fn progress_pct(steps: u64, settings: &GlobalSettings) -> f64 {
    if settings.daily_step_goal == 0 {
        return 100.0;
    }
    (steps as f64 / settings.daily_step_goal as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GlobalSettings {
        GlobalSettings {
            daily_step_goal: 10_000,
            charity_amount_per_goal: 1.5,
        }
    }

    #[test]
    fn test_goal_boundary_is_inclusive() {
        assert_eq!(
            evaluate(10_000, &settings()),
            GoalOutcome {
                goal_achieved: true,
                charity_earned: 1.5
            }
        );
        assert_eq!(
            evaluate(9_999, &settings()),
            GoalOutcome {
                goal_achieved: false,
                charity_earned: 0.0
            }
        );
    }

    #[test]
    fn test_progress_caps_at_full() {
        assert_eq!(progress_pct(5_000, &settings()), 50.0);
        assert_eq!(progress_pct(25_000, &settings()), 100.0);
    }
}
