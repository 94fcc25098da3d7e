//! Plan validation: the gate between planning and SQL synthesis.
//!
//! Two checks combine into one verdict. The LLM reviews the plan for
//! semantic feasibility against the context; a lexical gate then checks
//! every identifier-shaped token the surviving plan references. Unknown
//! identifiers force `infeasible` unless a close near-match exists, in which
//! case the plan is revised with the substitution applied. The validator is
//! authoritative: the synthesizer will catch stray names too, but only after
//! a wasted LLM round-trip.

use std::collections::BTreeSet;

use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::context::DatabaseContext;
use crate::error::{AgentError, Result};
use crate::llm::LlmGateway;
use crate::prompts;

/// Minimum Jaro-Winkler similarity for a near-match substitution
const NEAR_MATCH_THRESHOLD: f64 = 0.85;

/// Feasibility verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Feasible {
        plan: Vec<String>,
    },
    Revised {
        plan: Vec<String>,
        rationale: String,
    },
    Infeasible {
        rationale: String,
    },
}

#[derive(Deserialize)]
struct RawVerdict {
    verdict: String,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    revised_plan: Option<Vec<String>>,
}

/// Validates plans against the database context
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanValidator;

impl PlanValidator {
    pub async fn validate(
        &self,
        gateway: &LlmGateway,
        session: Option<Uuid>,
        utterance: &str,
        plan: &[String],
        ctx: &DatabaseContext,
    ) -> Result<Verdict> {
        let plan_text = render_plan(plan);
        let prompt = prompts::plan_validation_prompt(utterance, &plan_text, &ctx.render());
        let reply = gateway
            .complete(session, prompts::VALIDATOR_SYSTEM, &prompt)
            .await?;

        let raw: RawVerdict = serde_json::from_str(reply.trim()).map_err(|e| {
            AgentError::Plan(format!("plan validator returned an unparseable verdict: {e}"))
        })?;

        let rationale = raw.rationale.unwrap_or_default();
        let verdict = match raw.verdict.to_lowercase().as_str() {
            "feasible" => Verdict::Feasible {
                plan: plan.to_vec(),
            },
            "revised" => Verdict::Revised {
                plan: raw.revised_plan.unwrap_or_else(|| plan.to_vec()),
                rationale,
            },
            "infeasible" => {
                return Ok(Verdict::Infeasible {
                    rationale: if rationale.is_empty() {
                        "the plan is not feasible with the available tables".to_string()
                    } else {
                        rationale
                    },
                })
            }
            other => {
                return Err(AgentError::Plan(format!(
                    "plan validator returned an unknown verdict: {other}"
                )))
            }
        };

        // Lexical gate over the plan that would proceed
        let (current_plan, prior_rationale) = match &verdict {
            Verdict::Feasible { plan } => (plan.clone(), String::new()),
            Verdict::Revised { plan, rationale } => (plan.clone(), rationale.clone()),
            Verdict::Infeasible { .. } => unreachable!(),
        };
        Ok(apply_identifier_gate(current_plan, prior_rationale, ctx))
    }
}

/// Check identifier-shaped tokens in the plan against the context.
fn apply_identifier_gate(
    plan: Vec<String>,
    prior_rationale: String,
    ctx: &DatabaseContext,
) -> Verdict {
    let identifiers = ctx.identifiers();
    let mut unknown: BTreeSet<String> = BTreeSet::new();
    let mut substitutions: Vec<(String, String)> = Vec::new();

    for line in &plan {
        for token in identifier_candidates(line) {
            if identifiers.contains(&token) {
                continue;
            }
            match best_near_match(&token, &identifiers) {
                Some(replacement) => substitutions.push((token, replacement)),
                None => {
                    unknown.insert(token);
                }
            }
        }
    }

    if !unknown.is_empty() {
        let names: Vec<String> = unknown.into_iter().collect();
        return Verdict::Infeasible {
            rationale: format!(
                "the plan references names that do not exist in the schema: {}",
                names.join(", ")
            ),
        };
    }

    if substitutions.is_empty() {
        if prior_rationale.is_empty() {
            return Verdict::Feasible { plan };
        }
        return Verdict::Revised {
            plan,
            rationale: prior_rationale,
        };
    }

    let mut revised = plan;
    let mut notes = Vec::new();
    for (from, to) in &substitutions {
        for line in &mut revised {
            *line = line.replace(from.as_str(), to.as_str());
        }
        notes.push(format!("substituted '{from}' with '{to}'"));
    }
    let note_text = notes.join("; ");
    let rationale = if prior_rationale.is_empty() {
        note_text
    } else {
        format!("{prior_rationale}; {note_text}")
    };
    Verdict::Revised {
        plan: revised,
        rationale,
    }
}

/// Tokens in a plan line that look like schema identifiers rather than
/// prose: snake_case words and backtick-quoted names.
fn identifier_candidates(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let backticked = Regex::new(r"`([^`]+)`").unwrap();
    for captures in backticked.captures_iter(line) {
        out.push(captures[1].to_lowercase());
    }
    let snake = Regex::new(r"\b[a-zA-Z][a-zA-Z0-9]*(?:_[a-zA-Z0-9]+)+\b").unwrap();
    for token in snake.find_iter(line) {
        out.push(token.as_str().to_lowercase());
    }
    out
}

/// Best near-match for a token among the context identifiers, if any clears
/// the threshold. Ties break alphabetically for determinism.
fn best_near_match(token: &str, identifiers: &std::collections::HashSet<String>) -> Option<String> {
    let mut sorted: Vec<&String> = identifiers.iter().collect();
    sorted.sort();
    let mut best: Option<(f64, &String)> = None;
    for candidate in sorted {
        let score = strsim::jaro_winkler(token, candidate);
        if score >= NEAR_MATCH_THRESHOLD {
            match best {
                Some((existing, _)) if existing >= score => {}
                _ => best = Some((score, candidate)),
            }
        }
    }
    best.map(|(_, candidate)| candidate.clone())
}

fn render_plan(plan: &[String]) -> String {
    plan.iter()
        .enumerate()
        .map(|(index, step)| format!("{}. {step}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextProvider;
    use crate::schema::SchemaFile;
    use crate::store::{DataStore, StaticStore};
    use std::sync::Arc;

    async fn sales_context() -> DatabaseContext {
        let schema = SchemaFile::parse(
            r#"
tables:
  - name: Sales
    table: sales
    columns:
      - name: sale_id
        type: integer
      - name: product_id
        type: integer
      - name: sale_date
        type: text
"#,
        )
        .unwrap();
        let store: Arc<dyn DataStore> = Arc::new(StaticStore::new());
        ContextProvider::from_schema(schema)
            .build(&store)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_gate_passes_known_identifiers() {
        let ctx = sales_context().await;
        let verdict = apply_identifier_gate(
            vec!["Filter sales by sale_date".to_string()],
            String::new(),
            &ctx,
        );
        assert!(matches!(verdict, Verdict::Feasible { .. }));
    }

    #[tokio::test]
    async fn test_gate_substitutes_near_match() {
        let ctx = sales_context().await;
        let verdict = apply_identifier_gate(
            vec!["Group rows by sale_dates".to_string()],
            String::new(),
            &ctx,
        );
        match verdict {
            Verdict::Revised { plan, rationale } => {
                assert_eq!(plan, vec!["Group rows by sale_date"]);
                assert!(rationale.contains("sale_dates"));
                assert!(rationale.contains("sale_date"));
            }
            other => panic!("expected revision, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gate_rejects_unknown_identifier() {
        let ctx = sales_context().await;
        let verdict = apply_identifier_gate(
            vec!["Join with the customer_accounts table".to_string()],
            String::new(),
            &ctx,
        );
        match verdict {
            Verdict::Infeasible { rationale } => {
                assert!(rationale.contains("customer_accounts"));
            }
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn test_identifier_candidates() {
        let candidates = identifier_candidates("Join `products` with sales on product_id");
        assert!(candidates.contains(&"products".to_string()));
        assert!(candidates.contains(&"product_id".to_string()));
        // Plain prose words are not candidates
        assert!(!candidates.contains(&"join".to_string()));
    }

    #[test]
    fn test_render_plan_numbering() {
        let rendered = render_plan(&["first".to_string(), "second".to_string()]);
        assert_eq!(rendered, "1. first\n2. second");
    }
}
