//! Phase Orchestrator service.
//!
//! A deterministic state machine that drives one task through the phase
//! pipeline. Every agent invocation passes the circuit breaker and the rate
//! limiter first, failures are classified and retried with backoff, and each
//! phase is verified by the quality gates before the resume checkpoint moves
//! forward.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapters::{AutoApproval, NoopHooks, NullTaskBoard, SystemClock, TemplatePromptSource};
use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{
    AccumulatedContext, AttemptLedger, AttemptOutcome, Autonomy, ConfidenceAssessment,
    InvocationRequest, InvocationStatus, OutputProgress, Phase, PhaseState, PhaseStatus,
    PipelineConfig, ResumeCheckpoint, RunOutcome, RunReport, Task,
};
use crate::domain::ports::{
    AgentBackend, ApprovalDecision, ApprovalGate, ChangeDetector, ChangeSnapshot, Clock,
    PhaseHooks, PromptSource, PromptVars, StateStore, TaskBoard,
};
use crate::services::circuit_breaker::{CircuitBreaker, IterationObservation};
use crate::services::confidence::{gather_signals, ConfidenceTracker};
use crate::services::error_classifier::{FailureClass, FailureClassifier, MarkerClassifier};
use crate::services::liveness::LivenessMonitor;
use crate::services::model_fallback::ModelFallbackState;
use crate::services::quality_gates::gates_from_config;
use crate::services::rate_limiter::RateLimiter;
use crate::services::verification::{GateOutcome, PhaseInvocation, PhaseInvoker, VerificationGateRunner};

/// Commits included in the `git_log` prompt variable.
const GIT_LOG_ENTRIES: usize = 10;

/// Longest single sleep while the circuit is open.
const BREAKER_WAIT_CHUNK: Duration = Duration::from_secs(60);

/// Per-run bookkeeping.
struct RunState {
    phases: Vec<PhaseState>,
    context: AccumulatedContext,
    skip_next: bool,
    last_assessment: Option<ConfidenceAssessment>,
    premature_warning: bool,
}

/// The phase orchestrator service.
///
/// Owns the model fallback state, the attempt ledger and the confidence
/// tracker for the task it is running. Phases run strictly one after another.
pub struct PhaseOrchestrator {
    config: PipelineConfig,
    backend: Arc<dyn AgentBackend>,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    store: Arc<dyn StateStore>,
    interrupt: Interrupt,
    prompts: Arc<dyn PromptSource>,
    hooks: Arc<dyn PhaseHooks>,
    approval: Arc<dyn ApprovalGate>,
    changes: Option<Arc<dyn ChangeDetector>>,
    task_board: Arc<dyn TaskBoard>,
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn FailureClassifier>,
    log_dir: Option<PathBuf>,
    fallback: ModelFallbackState,
    confidence: ConfidenceTracker,
    ledger: AttemptLedger,
    /// Files changed by the most recent successful invocation
    last_changed_files: usize,
}

impl PhaseOrchestrator {
    /// Create an orchestrator for the configured backend and model.
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn AgentBackend>,
        rate_limiter: RateLimiter,
        breaker: CircuitBreaker,
        store: Arc<dyn StateStore>,
        interrupt: Interrupt,
    ) -> DomainResult<Self> {
        let spec = backend.spec();
        let model = config.model.clone().unwrap_or_else(|| spec.default_model.clone());
        if !spec.supports_model(&model) {
            return Err(EngineError::UnsupportedModel {
                backend: spec.id.clone(),
                model,
            });
        }

        Ok(Self {
            confidence: ConfidenceTracker::new(config.confidence.clone()),
            fallback: ModelFallbackState::new(model),
            config,
            backend,
            rate_limiter,
            breaker,
            store,
            interrupt,
            prompts: Arc::new(TemplatePromptSource::builtin()),
            hooks: Arc::new(NoopHooks),
            approval: Arc::new(AutoApproval),
            changes: None,
            task_board: Arc::new(NullTaskBoard),
            clock: Arc::new(SystemClock),
            classifier: Arc::new(MarkerClassifier::new()),
            log_dir: None,
            ledger: AttemptLedger::new(),
            last_changed_files: 0,
        })
    }

    /// Replace the built-in phase templates.
    pub fn with_prompts(mut self, prompts: Arc<dyn PromptSource>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Run `hooks` before and after every phase.
    pub fn with_hooks(mut self, hooks: Arc<dyn PhaseHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Gate phase transitions in supervised mode.
    pub fn with_approval(mut self, approval: Arc<dyn ApprovalGate>) -> Self {
        self.approval = approval;
        self
    }

    /// Measure progress by files changed per invocation. Without a detector
    /// no iteration counts as progress.
    pub fn with_change_detector(mut self, changes: Arc<dyn ChangeDetector>) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Read the task-done signal for confidence scoring from `board`.
    pub fn with_task_board(mut self, board: Arc<dyn TaskBoard>) -> Self {
        self.task_board = board;
        self
    }

    /// Time source for checkpoints and attempt records.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Classify failed invocations with `classifier`.
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Write per-attempt invocation logs under `<dir>/<task_id>/`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Model the next invocation will use.
    pub fn current_model(&self) -> &str {
        self.fallback.current()
    }

    /// The breaker guarding this backend identity.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// Drive `task` through the pipeline.
    ///
    /// Agent-side outcomes are reported in the returned report; `Err` means
    /// the engine itself failed.
    pub async fn run(&mut self, task: &Task) -> DomainResult<RunReport> {
        let run_id = Uuid::new_v4();
        let pipeline = self.config.pipeline.clone();
        info!(
            run_id = %run_id,
            task_id = %task.id,
            identity = %self.config.identity,
            phases = pipeline.len(),
            model = %self.fallback.current(),
            "starting run"
        );

        self.ledger = AttemptLedger::new();
        self.confidence.reset();
        self.last_changed_files = 0;

        let mut run = RunState {
            phases: pipeline.phases().iter().map(PhaseState::pending).collect(),
            context: AccumulatedContext::new(self.config.context.max_lines),
            skip_next: false,
            last_assessment: None,
            premature_warning: false,
        };

        let outcome = self.run_phases(task, pipeline.phases(), &mut run).await?;

        if outcome == RunOutcome::Completed {
            self.store.clear_checkpoint(&self.config.identity)?;
            self.fallback.reset();
            info!(run_id = %run_id, task_id = %task.id, "run completed, checkpoint cleared");
        } else {
            info!(run_id = %run_id, task_id = %task.id, outcome = outcome.as_str(), "run stopped");
        }

        Ok(RunReport {
            run_id,
            task_id: task.id.clone(),
            outcome,
            phases: run.phases,
            attempts: std::mem::take(&mut self.ledger).into_records(),
            confidence: run.last_assessment,
            premature_completion_warning: run.premature_warning,
        })
    }

    async fn run_phases(&mut self, task: &Task, phases: &[Phase], run: &mut RunState) -> DomainResult<RunOutcome> {
        let checkpoint = self.load_checkpoint(task)?;
        let interrupt = self.interrupt.clone();
        let runner = VerificationGateRunner::new(self.config.working_dir.clone());

        for phase in phases {
            let index = phase.order_index;

            if checkpoint.as_ref().is_some_and(|c| c.covers(&task.id, index)) {
                debug!(phase = %phase.name, index, "phase completed in an earlier run");
                run.phases[index].status = PhaseStatus::Resumed;
                continue;
            }
            if phase.skip {
                info!(phase = %phase.name, reason = "configured", "skipping phase");
                run.phases[index].status = PhaseStatus::Skipped;
                continue;
            }
            if run.skip_next {
                info!(phase = %phase.name, reason = "operator", "skipping phase");
                run.skip_next = false;
                run.phases[index].status = PhaseStatus::Skipped;
                continue;
            }
            if interrupt.is_triggered() {
                run.phases[index].status = PhaseStatus::Interrupted;
                return Ok(RunOutcome::Interrupted {
                    phase: Some(phase.name.clone()),
                });
            }

            info!(phase = %phase.name, index, budget = phase.verification_retry_budget, "starting phase");
            run.phases[index].status = PhaseStatus::Running;

            if let Err(e) = self.hooks.before_phase(phase, task, &interrupt).await {
                warn!(phase = %phase.name, error = %e, "before-phase hook failed, continuing");
            }

            let gates = gates_from_config(self.config.gates_for(phase));
            let outcome = runner
                .run_phase_with_gates(phase, &gates, task, &mut run.context, self, &interrupt)
                .await?;
            run.phases[index].verification_attempts = outcome.verification_attempts();

            let output = match outcome {
                GateOutcome::Passed { output, gates_evaluated, verification_attempts } => {
                    info!(
                        phase = %phase.name,
                        gates_evaluated,
                        verification_attempt = verification_attempts,
                        "phase verified"
                    );
                    output
                }
                GateOutcome::NeedsHumanInput { verification_attempts, .. } => {
                    run.phases[index].status = PhaseStatus::NeedsHumanInput;
                    return Ok(RunOutcome::NeedsHumanInput {
                        phase: phase.name.clone(),
                        reason: format!(
                            "quality gates still failing after {verification_attempts} verification attempts"
                        ),
                    });
                }
                GateOutcome::InvocationFailed { reason, .. } => {
                    error!(phase = %phase.name, reason = %reason, "phase failed");
                    run.phases[index].status = PhaseStatus::Failed;
                    return Ok(RunOutcome::Failed {
                        phase: phase.name.clone(),
                        reason,
                    });
                }
                GateOutcome::Interrupted { .. } => {
                    run.phases[index].status = PhaseStatus::Interrupted;
                    return Ok(RunOutcome::Interrupted {
                        phase: Some(phase.name.clone()),
                    });
                }
            };

            self.assess_confidence(phase, task, &output, run);

            // An interrupt here reruns the phase on resume
            if interrupt.is_triggered() {
                run.phases[index].status = PhaseStatus::Interrupted;
                return Ok(RunOutcome::Interrupted {
                    phase: Some(phase.name.clone()),
                });
            }

            if let Err(e) = self.hooks.after_phase(phase, task, &interrupt).await {
                warn!(phase = %phase.name, error = %e, "after-phase hook failed, continuing");
            }

            self.save_checkpoint(task, phase)?;
            run.phases[index].status = PhaseStatus::Completed;

            let next = phases.get(index + 1);
            if interrupt.is_triggered() {
                return Ok(RunOutcome::Interrupted {
                    phase: next.map(|p| p.name.clone()),
                });
            }

            if self.config.autonomy == Autonomy::Supervised {
                let decision = self.approval.decide(phase, next).await?;
                info!(phase = %phase.name, decision = decision.as_str(), "approval decision");
                match decision {
                    ApprovalDecision::Continue => {}
                    ApprovalDecision::SkipNext => run.skip_next = true,
                    ApprovalDecision::Pause => {
                        return Ok(RunOutcome::NeedsHumanInput {
                            phase: phase.name.clone(),
                            reason: "paused by operator".to_string(),
                        });
                    }
                    ApprovalDecision::Abort => {
                        return Ok(RunOutcome::Failed {
                            phase: phase.name.clone(),
                            reason: "aborted by operator".to_string(),
                        });
                    }
                }
            }
        }

        Ok(RunOutcome::Completed)
    }

    fn assess_confidence(&mut self, phase: &Phase, task: &Task, output: &str, run: &mut RunState) {
        let signals = gather_signals(
            output,
            self.last_changed_files > 0,
            self.task_board.is_done(&task.id),
            self.confidence.keywords(),
        );
        let assessment = self.confidence.assess(&phase.name, signals);
        run.phases[phase.order_index].confidence = Some(assessment.score);
        run.premature_warning |= assessment.premature_warning;
        run.last_assessment = Some(assessment);
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    fn load_checkpoint(&self, task: &Task) -> DomainResult<Option<ResumeCheckpoint>> {
        let Some(checkpoint) = self.store.load_checkpoint(&self.config.identity)? else {
            return Ok(None);
        };
        if checkpoint.task_id == task.id {
            info!(
                task_id = %task.id,
                last_completed = %checkpoint.last_completed_phase_name,
                index = checkpoint.last_completed_phase_index,
                "resuming from checkpoint"
            );
            Ok(Some(checkpoint))
        } else {
            warn!(
                task_id = %task.id,
                checkpoint_task = %checkpoint.task_id,
                "ignoring checkpoint left by another task"
            );
            Ok(None)
        }
    }

    fn save_checkpoint(&self, task: &Task, phase: &Phase) -> DomainResult<()> {
        let checkpoint = ResumeCheckpoint {
            task_id: task.id.clone(),
            last_completed_phase_index: phase.order_index,
            last_completed_phase_name: phase.name.clone(),
            timestamp: self.clock.now(),
        };
        self.store.save_checkpoint(&self.config.identity, &checkpoint)?;
        info!(phase = %phase.name, index = phase.order_index, "checkpoint written");
        Ok(())
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Wait until the circuit breaker allows an attempt. `false` if interrupted.
    async fn wait_for_breaker(&mut self, phase: &Phase) -> DomainResult<bool> {
        loop {
            if self.breaker.should_proceed()? {
                return Ok(true);
            }
            let remaining = self.breaker.cooldown_remaining().unwrap_or(Duration::ZERO);
            warn!(
                phase = %phase.name,
                state = self.breaker.state().as_str(),
                remaining_secs = remaining.as_secs(),
                "circuit breaker open, waiting for cooldown"
            );
            let chunk = remaining.clamp(Duration::from_millis(1), BREAKER_WAIT_CHUNK);
            if self.interrupt.sleep(chunk).await.is_err() {
                return Ok(false);
            }
        }
    }

    async fn snapshot(&self) -> Option<ChangeSnapshot> {
        let changes = self.changes.as_ref()?;
        match changes.snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "cannot snapshot working tree");
                None
            }
        }
    }

    async fn changed_files(&self, snapshot: Option<&ChangeSnapshot>) -> usize {
        let (Some(changes), Some(snapshot)) = (self.changes.as_ref(), snapshot) else {
            return 0;
        };
        match changes.changed_files_since(snapshot).await {
            Ok(files) => {
                debug!(files = files.len(), "changed files since invocation start");
                files.len()
            }
            Err(e) => {
                warn!(error = %e, "cannot list changed files");
                0
            }
        }
    }

    async fn git_log(&self) -> String {
        let Some(changes) = self.changes.as_ref() else {
            return String::new();
        };
        changes.recent_log(GIT_LOG_ENTRIES).await.unwrap_or_else(|e| {
            debug!(error = %e, "cannot read recent commits");
            String::new()
        })
    }

    fn log_path(&self, task: &Task, phase: &Phase, verification_attempt: u32, attempt: u32) -> Option<PathBuf> {
        let dir = self.log_dir.as_ref()?;
        let task_dir: String = task
            .id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Some(
            dir.join(task_dir)
                .join(format!("{}-v{verification_attempt}-a{attempt}.log", phase.name)),
        )
    }

    fn close_attempt(&mut self, outcome: AttemptOutcome) -> DomainResult<()> {
        self.ledger.close(outcome, self.clock.now())
    }
}

#[async_trait]
impl PhaseInvoker for PhaseOrchestrator {
    /// One verification round: invoke the agent, retrying transient failures.
    async fn invoke_phase(
        &mut self,
        phase: &Phase,
        task: &Task,
        verification_attempt: u32,
        context: &AccumulatedContext,
    ) -> DomainResult<PhaseInvocation> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if self.interrupt.is_triggered() || !self.wait_for_breaker(phase).await? {
                return Ok(PhaseInvocation::Interrupted);
            }
            if self.rate_limiter.check(&phase.name, &self.interrupt).await.is_err() {
                return Ok(PhaseInvocation::Interrupted);
            }

            let snapshot = self.snapshot().await;
            let vars = PromptVars {
                task_id: task.id.clone(),
                task_prompt: task.prompt.clone(),
                timestamp: self.clock.now().to_rfc3339(),
                git_log: self.git_log().await,
                verification_context: context.render(),
                phase: phase.name.clone(),
            };
            let prompt = self.prompts.render(phase, &vars)?;
            let model = self.fallback.current().to_string();
            let log_path = self.log_path(task, phase, verification_attempt, attempt);

            self.rate_limiter.record()?;
            self.ledger.open(
                &phase.name,
                attempt,
                verification_attempt,
                &model,
                log_path.clone(),
                self.clock.now(),
            )?;
            info!(
                phase = %phase.name,
                attempt,
                verification_attempt,
                model = %model,
                "invoking agent"
            );

            let progress = OutputProgress::new();
            let monitor = LivenessMonitor::spawn(
                &self.config.liveness,
                progress.clone(),
                phase.name.clone(),
                phase.timeout(),
                self.interrupt.child(),
            );
            let request = InvocationRequest {
                task_id: task.id.clone(),
                phase: phase.name.clone(),
                prompt,
                model: model.clone(),
                autonomous: self.config.autonomy == Autonomy::Autonomous,
                working_dir: self.config.working_dir.clone(),
                timeout: phase.timeout(),
                log_path,
                progress,
            };
            let result = self.backend.invoke(request, &self.interrupt).await;
            monitor.stop().await;

            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    self.close_attempt(AttemptOutcome::FatalError)?;
                    error!(phase = %phase.name, attempt, error = %e, "agent could not be started");
                    return Ok(PhaseInvocation::Failed {
                        reason: format!("agent invocation failed: {e}"),
                    });
                }
            };

            match result.status {
                InvocationStatus::Success => {
                    self.close_attempt(AttemptOutcome::Success)?;
                    self.last_changed_files = self.changed_files(snapshot.as_ref()).await;
                    self.breaker.record(&IterationObservation::success(
                        self.last_changed_files,
                        result.output_bytes(),
                    ))?;
                    return Ok(PhaseInvocation::Succeeded { output: result.output });
                }
                InvocationStatus::Interrupted => {
                    self.close_attempt(AttemptOutcome::Interrupted)?;
                    return Ok(PhaseInvocation::Interrupted);
                }
                InvocationStatus::TimedOut => {
                    self.close_attempt(AttemptOutcome::FatalTimeout)?;
                    self.breaker.record(&IterationObservation::failure(&result.output))?;
                    error!(
                        phase = %phase.name,
                        attempt,
                        timeout_secs = phase.timeout_seconds,
                        "phase timed out"
                    );
                    return Ok(PhaseInvocation::Failed {
                        reason: format!("phase timed out after {}s", phase.timeout_seconds),
                    });
                }
                InvocationStatus::Failed { exit_code } => {
                    let class = self.classifier.classify(&result.output);
                    self.breaker.record(&IterationObservation::failure(&result.output))?;

                    // Only a timeout ends the phase early; every other failure
                    // spends the retry budget.
                    if attempt >= max_attempts {
                        self.close_attempt(AttemptOutcome::FatalError)?;
                        error!(
                            phase = %phase.name,
                            attempt,
                            exit_code = ?exit_code,
                            reason = class.as_str(),
                            "agent invocation failed"
                        );
                        return Ok(PhaseInvocation::Failed {
                            reason: format!("agent failed after {attempt} attempts (exit code {exit_code:?})"),
                        });
                    }

                    self.close_attempt(AttemptOutcome::RetryableFailure)?;
                    let delay = self.config.retry.backoff(attempt);
                    warn!(
                        phase = %phase.name,
                        attempt,
                        max_attempts,
                        exit_code = ?exit_code,
                        reason = class.as_str(),
                        delay_secs = delay.as_secs(),
                        "agent invocation failed, retrying"
                    );
                    if self.interrupt.sleep(delay).await.is_err() {
                        return Ok(PhaseInvocation::Interrupted);
                    }
                    if class == FailureClass::Retryable {
                        let chain = self.backend.spec().fallback_chain.clone();
                        self.fallback.fall_back(&chain);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backends::{ScriptedBackend, ScriptedResponse};
    use crate::adapters::state::MemoryStateStore;
    use crate::adapters::VirtualClock;
    use crate::domain::models::{
        CircuitBreakerConfig, Config, GatesConfig, PipelineDefinition, RateLimitConfig,
    };
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Reports one changed file per invocation.
    struct AlwaysChanged;

    #[async_trait]
    impl ChangeDetector for AlwaysChanged {
        async fn snapshot(&self) -> DomainResult<ChangeSnapshot> {
            Ok(ChangeSnapshot {
                head: None,
                dirty: BTreeSet::new(),
            })
        }

        async fn changed_files_since(&self, _: &ChangeSnapshot) -> DomainResult<Vec<String>> {
            Ok(vec!["src/lib.rs".to_string()])
        }

        async fn recent_log(&self, _: usize) -> DomainResult<String> {
            Ok("abc123 initial commit".to_string())
        }
    }

    /// Replays a fixed list of decisions.
    struct ScriptedApproval(Mutex<Vec<ApprovalDecision>>);

    #[async_trait]
    impl ApprovalGate for ScriptedApproval {
        async fn decide(&self, _: &Phase, _: Option<&Phase>) -> DomainResult<ApprovalDecision> {
            let mut decisions = self.0.lock().unwrap();
            Ok(if decisions.is_empty() {
                ApprovalDecision::Continue
            } else {
                decisions.remove(0)
            })
        }
    }

    struct Harness {
        backend: Arc<ScriptedBackend>,
        store: Arc<MemoryStateStore>,
        interrupt: Interrupt,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                backend: Arc::new(ScriptedBackend::new()),
                store: Arc::new(MemoryStateStore::new()),
                interrupt: Interrupt::new(),
            }
        }

        fn orchestrator(&self, phases: Vec<Phase>, autonomy: Autonomy) -> PhaseOrchestrator {
            let mut config = PipelineConfig::from_config(&Config::default()).unwrap();
            config.pipeline = PipelineDefinition::new(phases).unwrap();
            config.autonomy = autonomy;
            config.retry.base_delay_secs = 1;
            let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
            let store: Arc<dyn StateStore> = self.store.clone();
            let limiter = RateLimiter::load(RateLimitConfig::default(), "claude", store.clone(), clock.clone()).unwrap();
            let breaker =
                CircuitBreaker::load(CircuitBreakerConfig::default(), "claude", store.clone(), clock.clone()).unwrap();
            PhaseOrchestrator::new(config, self.backend.clone(), limiter, breaker, store, self.interrupt.clone())
                .unwrap()
                .with_change_detector(Arc::new(AlwaysChanged))
                .with_clock(clock)
        }
    }

    fn phases(names: &[&str]) -> Vec<Phase> {
        names.iter().enumerate().map(|(i, n)| Phase::new(*n, i, 60)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_phase_in_order() {
        let harness = Harness::new();
        let mut orchestrator = harness.orchestrator(phases(&["plan", "implement", "test"]), Autonomy::Autonomous);

        let report = orchestrator.run(&Task::new("t-1", "add a health endpoint")).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        let called: Vec<String> = harness.backend.calls().into_iter().map(|c| c.phase).collect();
        assert_eq!(called, vec!["plan", "implement", "test"]);
        assert!(report.phases.iter().all(|p| p.status == PhaseStatus::Completed));
        assert_eq!(report.attempts.len(), 3);
        assert!(report.attempts.iter().all(|a| !a.is_open()));
        assert!(harness.store.load_checkpoint("claude").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_backs_off_and_falls_back() {
        let harness = Harness::new();
        harness.backend.push(ScriptedResponse::failure("API Error: 529 overloaded"));
        let mut orchestrator = harness.orchestrator(phases(&["implement"]), Autonomy::Autonomous);
        assert_eq!(orchestrator.current_model(), "sonnet");

        let started = tokio::time::Instant::now();
        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_secs(1));

        let calls = harness.backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "sonnet");
        assert_eq!(calls[1].model, "haiku");
        assert_eq!(report.attempts[0].outcome, Some(AttemptOutcome::RetryableFailure));
        assert_eq!(report.attempts[1].attempt_number, 2);
        // Completed runs restore the default model
        assert_eq!(orchestrator.current_model(), "sonnet");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_failure_retries_without_fallback() {
        let harness = Harness::new();
        harness.backend.push(ScriptedResponse::failure("something odd happened"));
        let mut orchestrator = harness.orchestrator(phases(&["implement"]), Autonomy::Autonomous);

        orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        let models: Vec<String> = harness.backend.calls().into_iter().map(|c| c.model).collect();
        assert_eq!(models, vec!["sonnet", "sonnet"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_marker_failure_is_retried_on_the_same_model() {
        let harness = Harness::new();
        harness
            .backend
            .push(ScriptedResponse::failure("cp: cannot create 'src/x.rs': Permission denied"));
        let mut orchestrator = harness.orchestrator(phases(&["implement", "test"]), Autonomy::Autonomous);

        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        let models: Vec<String> = harness.backend.calls().into_iter().map(|c| c.model).collect();
        assert_eq!(models, vec!["sonnet", "sonnet", "sonnet"]);
        assert_eq!(report.attempts[0].outcome, Some(AttemptOutcome::RetryableFailure));
        assert_eq!(report.phase("test").unwrap().status, PhaseStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_fatal_marker_exhausts_the_retry_budget() {
        let harness = Harness::new();
        for _ in 0..3 {
            harness.backend.push(ScriptedResponse::failure("Invalid API key"));
        }
        let mut orchestrator = harness.orchestrator(phases(&["implement", "test"]), Autonomy::Autonomous);

        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert!(matches!(report.outcome, RunOutcome::Failed { ref phase, .. } if phase == "implement"));
        assert_eq!(harness.backend.call_count(), 3);
        assert_eq!(report.phase("test").unwrap().status, PhaseStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhaustion_fails_phase() {
        let harness = Harness::new();
        for _ in 0..3 {
            harness.backend.push(ScriptedResponse::failure("exit 1"));
        }
        let mut orchestrator = harness.orchestrator(phases(&["implement"]), Autonomy::Autonomous);

        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert_eq!(report.outcome.as_str(), "failed");
        assert_eq!(harness.backend.call_count(), 3);
        assert_eq!(report.attempts[2].outcome, Some(AttemptOutcome::FatalError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_fatal() {
        let harness = Harness::new();
        harness
            .backend
            .push(ScriptedResponse::success("slow").with_delay(Duration::from_secs(120)));
        let mut orchestrator = harness.orchestrator(phases(&["implement"]), Autonomy::Autonomous);

        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert!(matches!(report.outcome, RunOutcome::Failed { ref reason, .. } if reason.contains("timed out")));
        assert_eq!(harness.backend.call_count(), 1);
        assert_eq!(report.attempts[0].outcome, Some(AttemptOutcome::FatalTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_from_other_task_is_ignored() {
        let harness = Harness::new();
        harness
            .store
            .save_checkpoint(
                "claude",
                &ResumeCheckpoint {
                    task_id: "other".to_string(),
                    last_completed_phase_index: 0,
                    last_completed_phase_name: "plan".to_string(),
                    timestamp: chrono::Utc::now(),
                },
            )
            .unwrap();
        let mut orchestrator = harness.orchestrator(phases(&["plan", "implement"]), Autonomy::Autonomous);

        orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert_eq!(harness.backend.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervised_skip_next_and_pause() {
        let harness = Harness::new();
        let mut orchestrator = harness
            .orchestrator(phases(&["plan", "implement", "test", "docs"]), Autonomy::Supervised)
            .with_approval(Arc::new(ScriptedApproval(Mutex::new(vec![
                ApprovalDecision::SkipNext,
                ApprovalDecision::Pause,
            ]))));

        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::NeedsHumanInput {
                phase: "test".to_string(),
                reason: "paused by operator".to_string()
            }
        );
        assert_eq!(report.phase("implement").unwrap().status, PhaseStatus::Skipped);
        assert_eq!(report.phase("docs").unwrap().status, PhaseStatus::Pending);

        let checkpoint = harness.store.load_checkpoint("claude").unwrap().unwrap();
        assert_eq!(checkpoint.last_completed_phase_name, "test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervised_abort_fails() {
        let harness = Harness::new();
        let mut orchestrator = harness
            .orchestrator(phases(&["plan", "implement"]), Autonomy::Supervised)
            .with_approval(Arc::new(ScriptedApproval(Mutex::new(vec![ApprovalDecision::Abort]))));

        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                phase: "plan".to_string(),
                reason: "aborted by operator".to_string()
            }
        );
        assert!(!report.outcome.is_resumable());
    }

    // Real time: gate subprocesses must not race a paused clock
    #[tokio::test]
    async fn test_phase_gates_override_pipeline_gates() {
        let harness = Harness::new();
        let mut list = phases(&["plan", "test"]);
        list[1] = list[1].clone().with_gates(GatesConfig {
            test: "false".to_string(),
            ..GatesConfig::default()
        });
        let mut orchestrator = harness.orchestrator(list, Autonomy::Autonomous);

        let report = orchestrator.run(&Task::new("t-1", "p")).await.unwrap();
        assert_eq!(report.outcome.as_str(), "needs_human_input");
        assert_eq!(report.phase("plan").unwrap().verification_attempts, 1);
        assert_eq!(report.phase("test").unwrap().verification_attempts, 3);
        assert_eq!(report.phase("test").unwrap().status, PhaseStatus::NeedsHumanInput);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_model_is_rejected() {
        let harness = Harness::new();
        let mut config = PipelineConfig::from_config(&Config::default()).unwrap();
        config.model = Some("gpt-5".to_string());
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
        let store: Arc<dyn StateStore> = harness.store.clone();
        let limiter = RateLimiter::load(RateLimitConfig::default(), "claude", store.clone(), clock.clone()).unwrap();
        let breaker = CircuitBreaker::load(CircuitBreakerConfig::default(), "claude", store.clone(), clock).unwrap();

        let result = PhaseOrchestrator::new(config, harness.backend.clone(), limiter, breaker, store, Interrupt::new());
        assert!(matches!(result, Err(EngineError::UnsupportedModel { .. })));
    }
}
