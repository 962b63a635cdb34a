use tracing::info;

use super::{PipelineError, PlanExecutor, QueryPlanner};
use crate::models::{ProcessingOutcome, SearchPlan};

/// Plans a query, then executes the plan
pub struct ResearchAgent {
    planner: QueryPlanner,
    executor: PlanExecutor,
}

impl ResearchAgent {
    pub fn new(planner: QueryPlanner, executor: PlanExecutor) -> Self {
        Self { planner, executor }
    }

    pub async fn run(
        &self,
        raw_query: &str,
    ) -> Result<(SearchPlan, Vec<ProcessingOutcome>), PipelineError> {
        self.run_with(raw_query, |_| {}).await
    }

    /// Like [`run`](Self::run), letting the caller adjust the plan before
    /// it executes
    pub async fn run_with<F>(
        &self,
        raw_query: &str,
        adjust: F,
    ) -> Result<(SearchPlan, Vec<ProcessingOutcome>), PipelineError>
    where
        F: FnOnce(&mut SearchPlan) + Send,
    {
        let mut plan = self.planner.plan(raw_query).await?;
        adjust(&mut plan);
        info!("Plan created");

        let outcomes = self.executor.execute(&plan).await?;
        info!("Execution finished with {} results", outcomes.len());
        Ok((plan, outcomes))
    }
}
