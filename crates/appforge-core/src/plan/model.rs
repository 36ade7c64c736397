//! Plan domain model.
//!
//! A plan is the TodoList the agent proposes before executing long-running work.
//! It is a plain value owned by its session; steps refer to their group by id.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Confirmed,
    InProgress,
    Completed,
    Failed,
}

/// Status of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    /// Completed and failed steps are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

/// A visual grouping of steps (e.g. data layer, UI layer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanGroup {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    /// Tool the step is expected to use, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub groups: Vec<PlanGroup>,
    pub steps: Vec<PlanStep>,
}

/// Step counters used for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlanProgress {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Plan {
    /// Builds a draft plan and normalises it.
    ///
    /// Steps without an id receive `step_<n>` (1-based). A `group_id` that does not
    /// match any group is cleared.
    pub fn draft(
        title: impl Into<String>,
        summary: impl Into<String>,
        groups: Vec<PlanGroup>,
        steps: Vec<PlanStep>,
    ) -> Self {
        let mut plan = Self {
            title: title.into(),
            status: PlanStatus::Draft,
            summary: summary.into(),
            groups,
            steps,
        };
        plan.normalize();
        plan
    }

    fn normalize(&mut self) {
        let group_ids: Vec<String> = self.groups.iter().map(|g| g.id.clone()).collect();
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.id.trim().is_empty() {
                step.id = format!("step_{}", index + 1);
            }
            if let Some(group_id) = &step.group_id {
                if !group_ids.iter().any(|id| id == group_id) {
                    step.group_id = None;
                }
            }
        }
    }

    pub fn find_step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn find_step_mut(&mut self, step_id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// True when the plan has steps and every one of them is completed or failed.
    pub fn all_steps_terminal(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status.is_terminal())
    }

    pub fn progress(&self) -> PlanProgress {
        let mut progress = PlanProgress {
            total: self.steps.len(),
            ..Default::default()
        };
        for step in &self.steps {
            match step.status {
                StepStatus::Pending => progress.pending += 1,
                StepStatus::InProgress => progress.in_progress += 1,
                StepStatus::Completed => progress.completed += 1,
                StepStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, group: Option<&str>) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            description: format!("do {id}"),
            tool: None,
            status: StepStatus::Pending,
            note: None,
            group_id: group.map(str::to_string),
        }
    }

    #[test]
    fn test_draft_assigns_default_step_ids() {
        let plan = Plan::draft("App", "", vec![], vec![step("", None), step("", None)]);
        assert_eq!(plan.steps[0].id, "step_1");
        assert_eq!(plan.steps[1].id, "step_2");
        assert_eq!(plan.status, PlanStatus::Draft);
    }

    #[test]
    fn test_draft_clears_unknown_group_ids() {
        let groups = vec![PlanGroup {
            id: "data".into(),
            label: "Data".into(),
            icon: None,
        }];
        let plan = Plan::draft(
            "App",
            "",
            groups,
            vec![step("a", Some("data")), step("b", Some("ghost"))],
        );
        assert_eq!(plan.steps[0].group_id.as_deref(), Some("data"));
        assert_eq!(plan.steps[1].group_id, None);
    }

    #[test]
    fn test_all_steps_terminal_requires_steps() {
        let mut plan = Plan::draft("App", "", vec![], vec![]);
        assert!(!plan.all_steps_terminal());

        plan.steps.push(step("a", None));
        plan.steps.push(step("b", None));
        plan.steps[0].status = StepStatus::Completed;
        assert!(!plan.all_steps_terminal());
        plan.steps[1].status = StepStatus::Failed;
        assert!(plan.all_steps_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(PlanStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_value(StepStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
        assert_eq!("completed".parse::<StepStatus>().unwrap(), StepStatus::Completed);
    }
}
