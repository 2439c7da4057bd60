// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Plan
//!
//! The declarative, possibly nested graph of validation steps.
//!
//! ## Overview
//!
//! A plan is an ordered list of steps; a step either invokes a filter or
//! groups child steps. Group steps with `parallel = true` dispatch their
//! enabled children concurrently (bounded by
//! `global_config.max_parallelism`); sequential groups recurse in order.
//! Each step carries enablement, an optional condition, an optional per-step
//! config, timeout, failure policy, and retry configuration.
//!
//! ## Reproducibility
//!
//! `PlanBuilder::build` validates the tree and computes `config_hash` over
//! the canonical JSON of the steps (excluding the hash itself). Two plans
//! that are semantically equal always carry the same hash, which is what
//! ties a validation report back to the exact plan that produced it.
//!
//! ## Construction
//!
//! ```
//! use invoice_gate_domain::entities::execution_plan::{PlanBuilder, PlanStep};
//! use invoice_gate_domain::value_objects::FilterId;
//!
//! let plan = PlanBuilder::new()
//!     .id("minimal")
//!     .version("1.0.0")
//!     .add_step(PlanStep::filter(FilterId::new("parser").unwrap(), 0))
//!     .add_step(PlanStep::filter(FilterId::new("kosit").unwrap(), 1))
//!     .build()
//!     .unwrap();
//! assert!(plan.config_hash().as_str().starts_with("sha256:"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::services::canonical_json::canonical_hash;
use crate::services::filter::FilterConfig;
use crate::value_objects::{AuditHash, FailurePolicy, FilterId, RetryConfig};
use crate::PipelineError;

/// Condition gating a step's execution against the current run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepCondition {
    /// The referenced step ran and emitted no error diagnostics.
    #[serde(rename_all = "camelCase")]
    FilterPassed { filter_id: FilterId },
    /// The referenced step ran and emitted at least one error diagnostic.
    #[serde(rename_all = "camelCase")]
    FilterFailed { filter_id: FilterId },
    /// The dotted path resolves in the parsed invoice.
    #[serde(rename_all = "camelCase")]
    FieldExists { path: String },
}

/// One node of the plan tree.
///
/// A step with children is a group: it never invokes a filter itself, its
/// `filter_id` only labels the group in results and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub filter_id: FilterId,
    pub enabled: bool,
    pub order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "FilterConfig::is_empty")]
    pub config: FilterConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl PlanStep {
    /// A leaf step invoking the given filter.
    pub fn filter(filter_id: FilterId, order: u32) -> Self {
        Self {
            filter_id,
            enabled: true,
            order,
            condition: None,
            parallel: false,
            children: Vec::new(),
            config: FilterConfig::new(),
            timeout_ms: None,
            continue_on_failure: false,
            failure_policy: FailurePolicy::default(),
            retry: None,
        }
    }

    /// A group step with child steps.
    pub fn group(label: FilterId, order: u32, parallel: bool, children: Vec<PlanStep>) -> Self {
        let mut step = Self::filter(label, order);
        step.parallel = parallel;
        step.children = children;
        step
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_config(mut self, config: FilterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Plan-wide execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    /// Concurrency bound for parallel groups.
    pub max_parallelism: usize,
    /// Per-attempt timeout for steps without an explicit `timeout_ms`.
    pub default_filter_timeout_ms: u64,
    pub strict_mode: bool,
    pub retry_on_error: bool,
    pub max_retries: u32,
    pub locale: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 5,
            default_filter_timeout_ms: 10_000,
            strict_mode: false,
            retry_on_error: true,
            max_retries: 2,
            locale: "en".to_string(),
        }
    }
}

/// A validated, hashed execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    id: String,
    version: String,
    name: String,
    steps: Vec<PlanStep>,
    config_hash: AuditHash,
    global_config: GlobalConfig,
    created_at: DateTime<Utc>,
    #[serde(default)]
    is_default: bool,
}

impl ExecutionPlan {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level steps in plan order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn config_hash(&self) -> &AuditHash {
        &self.config_hash
    }

    pub fn global_config(&self) -> &GlobalConfig {
        &self.global_config
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Depth-first iterator over every step, groups included.
    pub fn iter_steps(&self) -> impl Iterator<Item = &PlanStep> {
        fn walk<'a>(steps: &'a [PlanStep], out: &mut Vec<&'a PlanStep>) {
            for step in steps {
                out.push(step);
                walk(&step.children, out);
            }
        }
        let mut flattened = Vec::new();
        walk(&self.steps, &mut flattened);
        flattened.into_iter()
    }

    /// Finds a step anywhere in the tree by filter id.
    pub fn find_step(&self, filter_id: &FilterId) -> Option<&PlanStep> {
        self.iter_steps().find(|s| &s.filter_id == filter_id)
    }

    /// The built-in EN16931 validation plan.
    ///
    /// Parser and schema check fail fast; the live verifiers run in
    /// parallel as soft-fail steps with retries; fingerprint and policy
    /// gate always run, even after an abort.
    pub fn default_plan() -> Result<Self, PipelineError> {
        let id = |s: &str| FilterId::new(s);
        let verifier_retry = RetryConfig {
            max_retries: 2,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
            total_budget_ms: Some(15_000),
            ..Default::default()
        };

        PlanBuilder::new()
            .id("default")
            .version("1.0.0")
            .name("EN16931 default validation plan")
            .is_default(true)
            .add_step(PlanStep::filter(id("parser")?, 0))
            .add_step(PlanStep::filter(id("kosit")?, 1).with_timeout_ms(15_000))
            .add_step(PlanStep::group(
                id("live-verifiers")?,
                2,
                true,
                vec![
                    PlanStep::filter(id("vies")?, 0)
                        .with_failure_policy(FailurePolicy::SoftFail)
                        .with_retry(verifier_retry.clone()),
                    PlanStep::filter(id("ecb-rates")?, 1)
                        .with_failure_policy(FailurePolicy::SoftFail)
                        .with_retry(verifier_retry.clone()),
                    PlanStep::filter(id("peppol")?, 2)
                        .with_failure_policy(FailurePolicy::SoftFail)
                        .with_retry(verifier_retry),
                ],
            ))
            .add_step(
                PlanStep::filter(id("steps-amount-validation")?, 3).with_condition(
                    StepCondition::FilterPassed {
                        filter_id: id("parser")?,
                    },
                ),
            )
            .add_step(
                PlanStep::filter(id("semantic-risk")?, 4)
                    .with_failure_policy(FailurePolicy::BestEffort),
            )
            .add_step(
                PlanStep::filter(id("fingerprint")?, 5)
                    .with_failure_policy(FailurePolicy::AlwaysRun),
            )
            .add_step(
                PlanStep::filter(id("policy-gate")?, 6)
                    .with_failure_policy(FailurePolicy::AlwaysRun),
            )
            .build()
    }
}

/// Builder for execution plans.
///
/// `build` validates the step tree and computes the config hash; an invalid
/// plan can never become an `ExecutionPlan` value.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    id: String,
    version: String,
    name: String,
    steps: Vec<PlanStep>,
    global_config: GlobalConfig,
    is_default: bool,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.0.0".to_string(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn global_config(mut self, config: GlobalConfig) -> Self {
        self.global_config = config;
        self
    }

    pub fn is_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn add_step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Removes the step with the given id anywhere in the tree.
    pub fn remove_step(mut self, filter_id: &FilterId) -> Self {
        fn remove(steps: &mut Vec<PlanStep>, filter_id: &FilterId) {
            steps.retain(|s| &s.filter_id != filter_id);
            for step in steps.iter_mut() {
                remove(&mut step.children, filter_id);
            }
        }
        remove(&mut self.steps, filter_id);
        self
    }

    pub fn enable_step(self, filter_id: &FilterId) -> Self {
        self.set_enabled(filter_id, true)
    }

    pub fn disable_step(self, filter_id: &FilterId) -> Self {
        self.set_enabled(filter_id, false)
    }

    fn set_enabled(mut self, filter_id: &FilterId, enabled: bool) -> Self {
        fn apply(steps: &mut [PlanStep], filter_id: &FilterId, enabled: bool) {
            for step in steps {
                if &step.filter_id == filter_id {
                    step.enabled = enabled;
                }
                apply(&mut step.children, filter_id, enabled);
            }
        }
        apply(&mut self.steps, filter_id, enabled);
        self
    }

    /// Replaces the per-step config of the step with the given id.
    pub fn set_step_config(mut self, filter_id: &FilterId, config: FilterConfig) -> Self {
        fn apply(steps: &mut [PlanStep], filter_id: &FilterId, config: &FilterConfig) {
            for step in steps {
                if &step.filter_id == filter_id {
                    step.config = config.clone();
                }
                apply(&mut step.children, filter_id, config);
            }
        }
        apply(&mut self.steps, filter_id, &config);
        self
    }

    /// Validates the tree and produces the hashed plan.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidPlan` for an empty plan, a blank id,
    /// duplicate filter ids, or a parallel flag on a leaf step.
    pub fn build(self) -> Result<ExecutionPlan, PipelineError> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::invalid_plan("Plan id cannot be empty"));
        }
        if self.steps.is_empty() {
            return Err(PipelineError::invalid_plan("Plan must have at least one step"));
        }

        let mut seen = HashSet::new();
        fn validate(steps: &[PlanStep], seen: &mut HashSet<FilterId>) -> Result<(), PipelineError> {
            for step in steps {
                if !seen.insert(step.filter_id.clone()) {
                    return Err(PipelineError::InvalidPlan(format!(
                        "Duplicate step id '{}' in plan",
                        step.filter_id
                    )));
                }
                if step.parallel && step.children.is_empty() {
                    return Err(PipelineError::InvalidPlan(format!(
                        "Step '{}' is marked parallel but has no children",
                        step.filter_id
                    )));
                }
                if step.parallel && step.children.iter().any(PlanStep::is_group) {
                    // Parallel dispatch addresses leaves; nested grouping
                    // belongs in a sequential group.
                    return Err(PipelineError::InvalidPlan(format!(
                        "Parallel group '{}' may only contain leaf steps",
                        step.filter_id
                    )));
                }
                validate(&step.children, seen)?;
            }
            Ok(())
        }
        validate(&self.steps, &mut seen)?;

        let mut steps = self.steps;
        sort_by_order(&mut steps);

        // The hash covers the steps tree only; global config is hashed
        // separately into the effective-config snapshot.
        let config_hash = canonical_hash(&steps)?;

        Ok(ExecutionPlan {
            id: self.id,
            version: self.version,
            name: self.name,
            steps,
            config_hash,
            global_config: self.global_config,
            created_at: Utc::now(),
            is_default: self.is_default,
        })
    }
}

fn sort_by_order(steps: &mut [PlanStep]) {
    steps.sort_by_key(|s| s.order);
    for step in steps {
        sort_by_order(&mut step.children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> FilterId {
        FilterId::new(s).unwrap()
    }

    #[test]
    fn test_build_rejects_empty_plan() {
        assert!(matches!(
            PlanBuilder::new().id("x").build(),
            Err(PipelineError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let result = PlanBuilder::new()
            .id("dup")
            .add_step(PlanStep::filter(id("parser"), 0))
            .add_step(PlanStep::filter(id("parser"), 1))
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidPlan(_))));
    }

    #[test]
    fn test_build_rejects_parallel_leaf() {
        let mut leaf = PlanStep::filter(id("parser"), 0);
        leaf.parallel = true;
        let result = PlanBuilder::new().id("bad").add_step(leaf).build();
        assert!(matches!(result, Err(PipelineError::InvalidPlan(_))));
    }

    #[test]
    fn test_build_rejects_group_inside_parallel_group() {
        let inner = PlanStep::group(id("inner"), 0, false, vec![PlanStep::filter(id("leaf"), 0)]);
        let result = PlanBuilder::new()
            .id("nested")
            .add_step(PlanStep::group(id("outer"), 0, true, vec![inner]))
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidPlan(_))));
    }

    #[test]
    fn test_steps_are_sorted_by_order() {
        let plan = PlanBuilder::new()
            .id("ordered")
            .add_step(PlanStep::filter(id("second"), 5))
            .add_step(PlanStep::filter(id("first"), 1))
            .build()
            .unwrap();
        assert_eq!(plan.steps()[0].filter_id, "first");
        assert_eq!(plan.steps()[1].filter_id, "second");
    }

    #[test]
    fn test_config_hash_ignores_insertion_order() {
        let a = PlanBuilder::new()
            .id("p")
            .add_step(PlanStep::filter(id("parser"), 0))
            .add_step(PlanStep::filter(id("kosit"), 1))
            .build()
            .unwrap();
        let b = PlanBuilder::new()
            .id("p")
            .add_step(PlanStep::filter(id("kosit"), 1))
            .add_step(PlanStep::filter(id("parser"), 0))
            .build()
            .unwrap();
        assert_eq!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn test_config_hash_tracks_step_config() {
        let mut config = FilterConfig::new();
        config.insert("strict".to_string(), serde_json::json!(true));
        let a = PlanBuilder::new()
            .id("p")
            .add_step(PlanStep::filter(id("kosit"), 0))
            .build()
            .unwrap();
        let b = PlanBuilder::new()
            .id("p")
            .add_step(PlanStep::filter(id("kosit"), 0).with_config(config))
            .build()
            .unwrap();
        assert_ne!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn test_builder_step_operations() {
        let mut config = FilterConfig::new();
        config.insert("mode".to_string(), serde_json::json!("fast"));

        let plan = PlanBuilder::new()
            .id("ops")
            .add_step(PlanStep::filter(id("parser"), 0))
            .add_step(PlanStep::filter(id("kosit"), 1))
            .add_step(PlanStep::filter(id("vies"), 2))
            .remove_step(&id("vies"))
            .disable_step(&id("kosit"))
            .set_step_config(&id("parser"), config)
            .build()
            .unwrap();

        assert!(plan.find_step(&id("vies")).is_none());
        assert!(!plan.find_step(&id("kosit")).unwrap().enabled);
        assert_eq!(
            plan.find_step(&id("parser")).unwrap().config.get("mode"),
            Some(&serde_json::json!("fast"))
        );
    }

    #[test]
    fn test_default_plan_shape() {
        let plan = ExecutionPlan::default_plan().unwrap();
        assert!(plan.is_default());
        assert_eq!(plan.steps().len(), 7);

        let group = plan.find_step(&id("live-verifiers")).unwrap();
        assert!(group.parallel);
        assert_eq!(group.children.len(), 3);

        let gate = plan.find_step(&id("policy-gate")).unwrap();
        assert_eq!(gate.failure_policy, FailurePolicy::AlwaysRun);
        let fingerprint = plan.find_step(&id("fingerprint")).unwrap();
        assert_eq!(fingerprint.failure_policy, FailurePolicy::AlwaysRun);
    }

    #[test]
    fn test_iter_steps_flattens_tree() {
        let plan = ExecutionPlan::default_plan().unwrap();
        let ids: Vec<&str> = plan.iter_steps().map(|s| s.filter_id.as_str()).collect();
        assert!(ids.contains(&"vies"));
        assert!(ids.contains(&"live-verifiers"));
        assert_eq!(ids.len(), 10);
    }
}
