//! Plan creation and execution across multiple agents.
//!
//! The [`Orchestrator`] turns an orchestration request into an
//! [`OrchestrationPlan`] — a DAG of [`PlanStep`]s — and executes it:
//! eligible steps (all dependencies completed) run concurrently up to a
//! configured bound, each step sends its task to its agent, failures mark
//! every transitive dependent `Skipped`, and a progress tick goes to the
//! caller-supplied [`ProgressSink`] after every step transition.
//!
//! # Strategies
//!
//! - **Sequential** — steps form a chain; step *i* depends on step *i-1*.
//! - **Parallel** — no dependencies; every step is runnable immediately.
//! - **Adaptive** — reserved extension point; currently executes with
//!   sequential semantics.
//!
//! # Example
//!
//! ```rust,no_run
//! use agenthub::orchestrator::{Orchestrator, OrchestrationStrategy, PlanRequest, NullProgressSink};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(orchestrator: Orchestrator) -> Result<(), agenthub::error::HubError> {
//! let mut plan = orchestrator.create_plan(&PlanRequest {
//!     session_id: "s1".into(),
//!     goal: "Summarize the incident".into(),
//!     agent_ids: vec!["triage".into(), "writer".into()],
//!     strategy: OrchestrationStrategy::Sequential,
//! })?;
//!
//! let result = orchestrator
//!     .execute_plan(&mut plan, Arc::new(NullProgressSink), CancellationToken::new())
//!     .await?;
//! assert_eq!(result.step_results.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::agenthub::agent_registry::AgentRegistry;
use crate::agenthub::config::HubConfig;
use crate::agenthub::error::{HubError, HubResult};
use crate::agenthub::event_bus::EventBus;
use crate::agenthub::events::OrchestrationStepCompletedEvent;
use crate::agenthub::message::AgentMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How a plan's steps relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestrationStrategy {
    /// Steps form a chain executed one after another.
    Sequential,
    /// Steps are independent and all runnable immediately.
    Parallel,
    /// Extension point for plans that grow while running; executes with
    /// sequential semantics.
    Adaptive,
}

/// Lifecycle state of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One unit of work inside a plan, bound to a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique step id, referenced by `depends_on` of later steps.
    pub id: String,
    /// 1-based position consistent with a topological order of the DAG.
    pub order: usize,
    /// Agent that executes this step.
    pub agent_id: String,
    /// Task text sent to the agent.
    pub task: String,
    /// Ids of steps that must complete before this one is eligible.
    pub depends_on: Vec<String>,
    /// Current lifecycle state.
    pub status: StepStatus,
    /// Agent output once the step completed.
    pub result: Option<String>,
}

/// A DAG of steps executed to achieve a goal across one or more agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    /// Unique plan id.
    pub id: String,
    /// Session the plan runs in.
    pub session_id: String,
    /// Overall goal driving the plan.
    pub goal: String,
    /// Strategy the plan was built with.
    pub strategy: OrchestrationStrategy,
    /// Steps in order.
    pub steps: Vec<PlanStep>,
}

/// Snapshot of a running plan's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationProgress {
    /// Order of the step that just transitioned.
    pub current_step: usize,
    /// Total number of steps in the plan.
    pub total_steps: usize,
    /// Agent of the step that just transitioned.
    pub current_agent: String,
    /// Task of the step that just transitioned.
    pub current_task: String,
    /// Terminal steps over total steps, in percent (0..=100).
    pub percent_complete: f32,
}

/// Terminal record of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step this record belongs to.
    pub step_id: String,
    /// Agent the step ran on.
    pub agent_id: String,
    /// Terminal status of the step.
    pub status: StepStatus,
    /// Agent output for completed steps.
    pub output: Option<String>,
    /// Failure description for failed steps.
    pub error: Option<String>,
}

/// Terminal record of a plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Plan this result belongs to.
    pub plan_id: String,
    /// True when every step completed.
    pub success: bool,
    /// Per-step terminal records, in step order.
    pub step_results: Vec<StepResult>,
    /// Execution start time.
    pub started_at: DateTime<Utc>,
    /// Execution end time.
    pub completed_at: DateTime<Utc>,
}

/// What the orchestrator needs to build a plan.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Session the plan will run in.
    pub session_id: String,
    /// Goal text; becomes the task of every step.
    pub goal: String,
    /// Agents participating, one step per agent in the given order.
    pub agent_ids: Vec<String>,
    /// Dependency shape of the plan.
    pub strategy: OrchestrationStrategy,
}

/// Push target for progress ticks, supplied by the caller.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Receive one progress tick.
    async fn report(&self, progress: &OrchestrationProgress);
}

/// Sink that discards every tick.
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn report(&self, _progress: &OrchestrationProgress) {}
}

/// Outcome of one executed step, as returned by the spawned task.
struct ExecutedStep {
    index: usize,
    result: Result<String, String>,
}

/// Builds and executes orchestration plans.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    bus: Arc<EventBus>,
    config: HubConfig,
}

impl Orchestrator {
    /// Create an orchestrator resolving agents from the given registry.
    pub fn new(registry: Arc<AgentRegistry>, bus: Arc<EventBus>, config: HubConfig) -> Self {
        Self {
            registry,
            bus,
            config,
        }
    }

    /// Build a plan for the request: one step per agent, with dependencies
    /// shaped by the strategy.
    pub fn create_plan(&self, request: &PlanRequest) -> HubResult<OrchestrationPlan> {
        if request.session_id.is_empty() {
            return Err(HubError::invalid_argument("session id must not be empty"));
        }
        if request.agent_ids.is_empty() {
            return Err(HubError::invalid_argument(
                "a plan needs at least one agent",
            ));
        }

        let chained = matches!(
            request.strategy,
            OrchestrationStrategy::Sequential | OrchestrationStrategy::Adaptive
        );

        let mut steps: Vec<PlanStep> = Vec::with_capacity(request.agent_ids.len());
        for (index, agent_id) in request.agent_ids.iter().enumerate() {
            let depends_on = if chained && index > 0 {
                vec![steps[index - 1].id.clone()]
            } else {
                Vec::new()
            };
            steps.push(PlanStep {
                id: Uuid::new_v4().to_string(),
                order: index + 1,
                agent_id: agent_id.clone(),
                task: request.goal.clone(),
                depends_on,
                status: StepStatus::Pending,
                result: None,
            });
        }

        Ok(OrchestrationPlan {
            id: Uuid::new_v4().to_string(),
            session_id: request.session_id.clone(),
            goal: request.goal.clone(),
            strategy: request.strategy,
            steps,
        })
    }

    /// Execute the plan to a terminal state.
    ///
    /// Steps become eligible when all their dependencies completed; eligible
    /// steps run concurrently, bounded by the number of distinct agents in
    /// the plan capped by the configured parallelism. A failed step marks
    /// every transitive dependent `Skipped`. Cancellation stops launching
    /// new steps and forwards the signal to in-flight ones; steps that
    /// already completed stay completed.
    pub async fn execute_plan(
        &self,
        plan: &mut OrchestrationPlan,
        progress: Arc<dyn ProgressSink>,
        cancellation: CancellationToken,
    ) -> HubResult<OrchestrationResult> {
        Self::ensure_acyclic(plan)?;

        let started_at = Utc::now();
        let total_steps = plan.steps.len();
        let distinct_agents: HashSet<&str> =
            plan.steps.iter().map(|s| s.agent_id.as_str()).collect();
        let parallelism = distinct_agents
            .len()
            .max(1)
            .min(self.config.orchestrator_parallelism);
        let semaphore = Arc::new(Semaphore::new(parallelism));

        let mut completed: HashSet<String> = HashSet::new();
        let mut blocked: HashSet<String> = HashSet::new();

        loop {
            if cancellation.is_cancelled() {
                log::info!("plan {} cancelled; no further steps launched", plan.id);
                break;
            }

            let eligible: Vec<usize> = plan
                .steps
                .iter()
                .enumerate()
                .filter(|(_, step)| {
                    step.status == StepStatus::Pending
                        && step.depends_on.iter().all(|dep| completed.contains(dep))
                })
                .map(|(index, _)| index)
                .collect();

            if eligible.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(eligible.len());
            for index in eligible {
                plan.steps[index].status = StepStatus::Running;
                let step = plan.steps[index].clone();
                let session_id = plan.session_id.clone();
                let registry = Arc::clone(&self.registry);
                let semaphore = Arc::clone(&semaphore);
                let step_timeout = self.config.default_step_timeout;
                let token = cancellation.child_token();

                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let result =
                        Self::run_step(&registry, &session_id, &step, step_timeout, token).await;
                    ExecutedStep { index, result }
                }));
            }

            for handle in handles {
                let executed = match handle.await {
                    Ok(executed) => executed,
                    Err(join_err) => {
                        return Err(HubError::internal(format!(
                            "plan {} step task panicked: {}",
                            plan.id, join_err
                        )))
                    }
                };

                let success = executed.result.is_ok();
                {
                    let step = &mut plan.steps[executed.index];
                    match executed.result {
                        Ok(output) => {
                            step.status = StepStatus::Completed;
                            step.result = Some(output);
                            completed.insert(step.id.clone());
                        }
                        Err(error) => {
                            log::warn!(
                                "plan {} step {} ({}) failed: {}",
                                plan.id,
                                step.order,
                                step.agent_id,
                                error
                            );
                            step.status = StepStatus::Failed;
                            step.result = Some(error);
                            blocked.insert(step.id.clone());
                        }
                    }
                }

                Self::skip_dependents(plan, &mut blocked);
                let step = &plan.steps[executed.index];

                self.bus
                    .publish(&OrchestrationStepCompletedEvent::new(
                        plan.id.clone(),
                        plan.session_id.clone(),
                        step.id.clone(),
                        step.order,
                        step.agent_id.clone(),
                        success,
                    ))
                    .await;
                progress
                    .report(&Self::progress_for(plan, executed.index, total_steps))
                    .await;
            }
        }

        let step_results: Vec<StepResult> = plan
            .steps
            .iter()
            .map(|step| StepResult {
                step_id: step.id.clone(),
                agent_id: step.agent_id.clone(),
                status: step.status,
                output: match step.status {
                    StepStatus::Completed => step.result.clone(),
                    _ => None,
                },
                error: match step.status {
                    StepStatus::Failed => step.result.clone(),
                    _ => None,
                },
            })
            .collect();

        Ok(OrchestrationResult {
            plan_id: plan.id.clone(),
            success: plan
                .steps
                .iter()
                .all(|step| step.status == StepStatus::Completed),
            step_results,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Send one step's task to its agent and await the reply.
    async fn run_step(
        registry: &AgentRegistry,
        session_id: &str,
        step: &PlanStep,
        timeout: std::time::Duration,
        cancellation: CancellationToken,
    ) -> Result<String, String> {
        let agent = registry
            .get_agent(&step.agent_id)
            .await
            .ok_or_else(|| format!("Agent {} not found", step.agent_id))?;

        let message = AgentMessage::user(session_id, step.task.clone());
        match tokio::time::timeout(timeout, agent.send_message(&message, cancellation)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("timeout".to_string()),
        }
    }

    /// Mark every pending step that depends (transitively) on a blocked step
    /// as skipped.
    fn skip_dependents(plan: &mut OrchestrationPlan, blocked: &mut HashSet<String>) {
        loop {
            let mut changed = false;
            for step in plan.steps.iter_mut() {
                if step.status == StepStatus::Pending
                    && step.depends_on.iter().any(|dep| blocked.contains(dep))
                {
                    step.status = StepStatus::Skipped;
                    blocked.insert(step.id.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn progress_for(
        plan: &OrchestrationPlan,
        index: usize,
        total_steps: usize,
    ) -> OrchestrationProgress {
        let terminal = plan
            .steps
            .iter()
            .filter(|s| {
                matches!(
                    s.status,
                    StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
                )
            })
            .count();
        let step = &plan.steps[index];
        OrchestrationProgress {
            current_step: step.order,
            total_steps,
            current_agent: step.agent_id.clone(),
            current_task: step.task.clone(),
            percent_complete: if total_steps == 0 {
                100.0
            } else {
                (terminal as f32 / total_steps as f32) * 100.0
            },
        }
    }

    /// Reject plans whose dependency graph contains a cycle or references an
    /// unknown step id.
    fn ensure_acyclic(plan: &OrchestrationPlan) -> HubResult<()> {
        let ids: HashSet<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for step in &plan.steps {
            in_degree.entry(step.id.as_str()).or_insert(0);
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(HubError::invalid_argument(format!(
                        "step {} depends on unknown step {}",
                        step.id, dep
                    )));
                }
                *in_degree.entry(step.id.as_str()).or_insert(0) += 1;
                dependents
                    .entry(dep.as_str())
                    .or_insert_with(Vec::new)
                    .push(step.id.as_str());
            }
        }

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            if let Some(next) = dependents.get(id) {
                for dependent in next {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(dependent);
                        }
                    }
                }
            }
        }

        if visited != plan.steps.len() {
            return Err(HubError::invalid_argument(format!(
                "plan {} has a dependency cycle",
                plan.id
            )));
        }
        Ok(())
    }
}
