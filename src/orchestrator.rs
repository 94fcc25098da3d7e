//! Orchestrator: threads the pipeline stages and owns the two-phase
//! analyze/execute protocol.
//!
//! `analyze` runs classification, planning, validation, and synthesis, and
//! persists a session only after synthesis succeeds, so a failed turn leaves
//! no state behind. `execute` consumes the session before touching the
//! executor, which gives concurrent executes on one id at-most-once
//! semantics. Errors are routed to outcome shapes, never rewritten.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{
    DescriptiveResponder, IntentClassifier, IntentLabel, Interpreter, PlanMode, PlanValidator,
    Planner, SqlDebugger, SqlSynthesizer, SqlWarning, Verdict,
};
use crate::agents::sql_lint;
use crate::context::ContextProvider;
use crate::error::AgentError;
use crate::llm::LlmGateway;
use crate::session::{Session, SessionStore};
use crate::store::{DataStore, QueryRow};

/// Result rows beyond this cap are truncated; the true count is reported
pub const ROW_CAP: usize = 10_000;

/// Outcome of an analyze turn
#[derive(Debug)]
pub enum AnalyzeOutcome {
    /// Specific intent: SQL awaiting user approval
    NeedsSqlApproval {
        session_id: Uuid,
        sql: String,
        warnings: Vec<SqlWarning>,
        plan: Vec<String>,
    },
    /// Analytical intent: proposed analyses
    Suggestions { suggestions: Vec<String> },
    /// Descriptive intent: dataset overview
    Description { text: String },
    /// Unrecoverable pipeline error
    Failed {
        stage: &'static str,
        reason: String,
    },
}

/// Outcome of an execute turn
#[derive(Debug)]
pub enum ExecuteOutcome {
    Success {
        rows: Vec<QueryRow>,
        interpretation: String,
        row_count: usize,
        truncated: bool,
    },
    ExecutionFailed {
        engine_error: String,
        debug_suggestion: Option<String>,
    },
    SessionMissing,
    Failed {
        stage: &'static str,
        reason: String,
    },
}

/// The request-scoped pipeline driver
pub struct Orchestrator {
    store: Arc<dyn DataStore>,
    gateway: Arc<LlmGateway>,
    sessions: SessionStore,
    provider: ContextProvider,
    intent: IntentClassifier,
    planner: Planner,
    validator: PlanValidator,
    synthesizer: SqlSynthesizer,
    debugger: SqlDebugger,
    interpreter: Interpreter,
    responder: DescriptiveResponder,
    row_cap: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DataStore>,
        gateway: Arc<LlmGateway>,
        sessions: SessionStore,
        provider: ContextProvider,
    ) -> Self {
        Self {
            store,
            gateway,
            sessions,
            provider,
            intent: IntentClassifier,
            planner: Planner,
            validator: PlanValidator,
            synthesizer: SqlSynthesizer,
            debugger: SqlDebugger,
            interpreter: Interpreter,
            responder: DescriptiveResponder,
            row_cap: ROW_CAP,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run the analysis pipeline for one utterance.
    pub async fn analyze(&self, utterance: &str, prior_session: Option<Uuid>) -> AnalyzeOutcome {
        // A retry replaces the pending turn instead of appending to it
        if let Some(prior) = prior_session {
            if self.sessions.remove(prior).await.is_some() {
                info!(session_id = %prior, "replacing prior pending session");
            }
            self.gateway.forget(prior).await;
        }

        let ctx = match self.provider.build(&self.store).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "context construction failed");
                return AnalyzeOutcome::Failed {
                    stage: "context",
                    reason: e.to_string(),
                };
            }
        };

        let classification = self
            .intent
            .classify(&self.gateway, None, utterance, &ctx)
            .await;
        let label = if !classification.from_fallback && classification.confidence < 0.5 {
            warn!(
                label = %classification.label,
                confidence = classification.confidence,
                "low-confidence classification, defaulting to specific"
            );
            IntentLabel::Specific
        } else {
            classification.label
        };
        info!(intent = %label, confidence = classification.confidence, "utterance classified");

        match label {
            IntentLabel::ExploratoryDescriptive => {
                match self.responder.describe(&self.gateway, None, &ctx).await {
                    Ok(text) => AnalyzeOutcome::Description { text },
                    Err(e) => Self::analyze_failure(e),
                }
            }
            IntentLabel::ExploratoryAnalytical => {
                match self
                    .planner
                    .run(&self.gateway, None, PlanMode::Insights, utterance, &ctx)
                    .await
                {
                    Ok(suggestions) => AnalyzeOutcome::Suggestions { suggestions },
                    Err(e) => Self::analyze_failure(e),
                }
            }
            IntentLabel::Specific => self.analyze_specific(utterance, &ctx).await,
        }
    }

    async fn analyze_specific(
        &self,
        utterance: &str,
        ctx: &crate::context::DatabaseContext,
    ) -> AnalyzeOutcome {
        // Memory for this turn's LLM calls is keyed by the future session id
        let turn_id = Uuid::new_v4();

        let outcome = self.run_specific_pipeline(turn_id, utterance, ctx).await;
        if !matches!(outcome, AnalyzeOutcome::NeedsSqlApproval { .. }) {
            // Failed turns leave no memory behind
            self.gateway.forget(turn_id).await;
        }
        outcome
    }

    async fn run_specific_pipeline(
        &self,
        turn_id: Uuid,
        utterance: &str,
        ctx: &crate::context::DatabaseContext,
    ) -> AnalyzeOutcome {
        let plan = match self
            .planner
            .run(&self.gateway, Some(turn_id), PlanMode::Plan, utterance, ctx)
            .await
        {
            Ok(plan) => plan,
            Err(e) => return Self::analyze_failure(e),
        };

        let verdict = match self
            .validator
            .validate(&self.gateway, Some(turn_id), utterance, &plan, ctx)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => return Self::analyze_failure(e),
        };
        let plan = match verdict {
            Verdict::Feasible { plan } => plan,
            Verdict::Revised { plan, rationale } => {
                info!(rationale = %rationale, "plan revised by validator");
                plan
            }
            Verdict::Infeasible { rationale } => {
                info!(rationale = %rationale, "plan rejected as infeasible");
                return AnalyzeOutcome::Failed {
                    stage: "plan",
                    reason: rationale,
                };
            }
        };

        let generated = match self
            .synthesizer
            .synthesize(&self.gateway, Some(turn_id), &plan, ctx)
            .await
        {
            Ok(generated) => generated,
            Err(e) => return Self::analyze_failure(e),
        };
        if !generated.warnings.is_empty() {
            warn!(warnings = ?generated.warnings, "sql surfaced with warnings");
        }

        let session = Session {
            id: turn_id,
            utterance: utterance.to_string(),
            intent: IntentLabel::Specific,
            plan: plan.clone(),
            sql: generated.sql.clone(),
            created_at: chrono::Utc::now(),
        };
        self.sessions.put(session).await;
        info!(session_id = %turn_id, "sql awaiting approval");

        AnalyzeOutcome::NeedsSqlApproval {
            session_id: turn_id,
            sql: generated.sql,
            warnings: generated.warnings,
            plan,
        }
    }

    /// Execute user-approved SQL for a pending session.
    pub async fn execute(&self, session_id: Uuid, approved_sql: &str) -> ExecuteOutcome {
        // Consume-on-attempt: the session is removed before execution starts,
        // so a duplicate execute observes SessionMissing
        let Some(session) = self.sessions.take(session_id).await else {
            return ExecuteOutcome::SessionMissing;
        };
        self.gateway.forget(session_id).await;

        // The execution surface is read-only regardless of user edits
        if let Some(keyword) = sql_lint::forbidden_keyword(approved_sql) {
            warn!(keyword, "approved sql rejected by read-only check");
            return ExecuteOutcome::ExecutionFailed {
                engine_error: format!(
                    "statement rejected: {keyword} is not allowed on this read-only surface"
                ),
                debug_suggestion: None,
            };
        }

        let rows = match self.store.run(approved_sql).await {
            Ok(rows) => rows,
            Err(exec_err) => {
                warn!(error = %exec_err, "sql execution failed, consulting debugger");
                let debug_suggestion = match self.provider.build(&self.store).await {
                    Ok(ctx) => {
                        self.debugger
                            .suggest(
                                &self.gateway,
                                None,
                                &session.utterance,
                                approved_sql,
                                &exec_err.to_string(),
                                &session.plan,
                                &ctx,
                            )
                            .await
                    }
                    Err(e) => {
                        warn!(error = %e, "context unavailable for debugger");
                        None
                    }
                };
                return ExecuteOutcome::ExecutionFailed {
                    engine_error: exec_err.to_string(),
                    debug_suggestion,
                };
            }
        };

        let row_count = rows.len();
        let truncated = row_count > self.row_cap;
        let sample_len = row_count.min(self.row_cap);
        let interpretation = match self
            .interpreter
            .interpret(
                &self.gateway,
                None,
                &session.utterance,
                &rows[..sample_len],
                row_count,
                truncated,
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "interpretation failed");
                return ExecuteOutcome::Failed {
                    stage: e.stage(),
                    reason: e.to_string(),
                };
            }
        };

        let mut rows = rows;
        rows.truncate(self.row_cap);
        ExecuteOutcome::Success {
            rows,
            interpretation,
            row_count,
            truncated,
        }
    }

    fn analyze_failure(e: AgentError) -> AnalyzeOutcome {
        error!(stage = e.stage(), error = %e, "analyze turn failed");
        AnalyzeOutcome::Failed {
            stage: e.stage(),
            reason: e.to_string(),
        }
    }
}
