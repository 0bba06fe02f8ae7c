//! Report review and refinement

use crate::llm::ReasoningClient;
use crate::models::{FallbackKind, FallbackNote, Report};
use crate::pipeline::Stage;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ReportValidator {
    client: Arc<dyn ReasoningClient>,
}

impl ReportValidator {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    /// Refine a draft. Falls back to the draft itself on any failure.
    pub async fn refine(&self, draft: String) -> (Report, Option<FallbackNote>) {
        let prompt = build_prompt(&draft);

        let (refined, note) = match self.client.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), "Report refined");
                (text.trim().to_string(), None)
            }
            Ok(_) => {
                warn!("Refinement was empty, keeping draft");
                (
                    draft.clone(),
                    Some(FallbackNote::new(
                        Stage::ValidateReport.as_str(),
                        FallbackKind::ParseFailure,
                        "Refinement was empty; draft kept",
                    )),
                )
            }
            Err(e) => {
                warn!(error = %e, "Refinement call failed, keeping draft");
                (
                    draft.clone(),
                    Some(FallbackNote::new(
                        Stage::ValidateReport.as_str(),
                        FallbackKind::CallFailure,
                        e.to_string(),
                    )),
                )
            }
        };

        (Report { draft, refined }, note)
    }
}

fn build_prompt(draft: &str) -> String {
    format!(
        r#"You are a senior risk report reviewer and editor.

Review the liquidity risk report below. Fix factual inconsistencies, tighten
the language and make the recommendations concrete. Keep every section and
all figures. Return only the final report text.

REPORT:
{draft}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedReasoner;

    async fn refine_with(reply: Result<&str, &str>) -> (Report, Option<FallbackNote>) {
        let validator = ReportValidator::new(Arc::new(ScriptedReasoner::new(vec![reply])));
        validator.refine("Draft report".to_string()).await
    }

    #[tokio::test]
    async fn test_refined_text_replaces_draft() {
        let (report, note) = refine_with(Ok("Refined report")).await;
        assert_eq!(report.draft, "Draft report");
        assert_eq!(report.refined, "Refined report");
        assert!(note.is_none());
    }

    #[tokio::test]
    async fn test_failure_passes_draft_through() {
        let (report, note) = refine_with(Err("503")).await;
        assert_eq!(report.refined, report.draft);
        assert_eq!(note.unwrap().kind, FallbackKind::CallFailure);

        let (report, _) = refine_with(Ok("")).await;
        assert_eq!(report.refined, "Draft report");
    }
}
