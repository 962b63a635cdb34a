//! Natural-language query to [`SearchPlan`].

use std::sync::Arc;
use tracing::{debug, info};

use super::extract::find_json_candidate;
use super::prompts::planner_messages;
use super::PlanError;
use crate::llm::LlmClient;
use crate::models::SearchPlan;

/// Asks an LLM to turn a query into a search plan
pub struct QueryPlanner {
    llm: Arc<dyn LlmClient>,
}

impl QueryPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn plan(&self, raw_query: &str) -> Result<SearchPlan, PlanError> {
        info!("Planning query '{}'", raw_query);
        let response = self.llm.chat(&planner_messages(raw_query)).await?;
        debug!("Planner response: {}", response);
        parse_plan(&response, raw_query)
    }
}

/// Parse a planner reply into a plan for `raw_query`.
///
/// Absent fields take their defaults. A zero limit is rejected.
pub fn parse_plan(response: &str, raw_query: &str) -> Result<SearchPlan, PlanError> {
    let candidate = find_json_candidate(response).ok_or(PlanError::NoJson)?;
    let mut plan: SearchPlan =
        serde_json::from_str(candidate).map_err(|e| PlanError::Invalid(e.to_string()))?;

    if plan.limit == 0 {
        return Err(PlanError::Invalid("limit must be at least 1".to_string()));
    }
    plan.raw_query = raw_query.to_string();
    Ok(plan)
}
