//! Integration tests for SummX
//!
//! The whole chain from plan to summaries, with an in-memory arXiv tool
//! server speaking framed JSON-RPC on the other end of the wire.

use serde_json::{json, Value};
use std::sync::Arc;
use summx::llm::StaticLlm;
use summx::mcp::{frame, McpError, RpcClient, Transport};
use summx::models::{SearchPlan, SummaryDepth};
use summx::pipeline::{PipelineError, PlanExecutor, QueryPlanner, ResearchAgent};
use summx::sources::{ArxivToolGateway, SourceError};
use tokio::io::{BufReader, DuplexStream, ReadHalf, WriteHalf};

const SUMMARY_REPLY: &str = r#"Sure, here it is:
```json
{
  "tldr": ["Hypergraph transformers beat message passing."],
  "problem": "Higher-order relations.",
  "method": "Attention over hyperedges.",
  "results": "State of the art on three benchmarks.",
  "limitations": "Quadratic memory.",
  "future_work": "Sparse attention."
}
```"#;

/// Client end of an in-memory connection
struct InMemory {
    writer: WriteHalf<DuplexStream>,
    reader: BufReader<ReadHalf<DuplexStream>>,
}

impl Transport for InMemory {
    type Writer = WriteHalf<DuplexStream>;
    type Reader = BufReader<ReadHalf<DuplexStream>>;

    fn channel(&mut self) -> Result<(&mut Self::Writer, &mut Self::Reader), McpError> {
        Ok((&mut self.writer, &mut self.reader))
    }
}

fn text_envelope(payload: Value) -> Value {
    json!({"content": [{"type": "text", "text": payload.to_string()}]})
}

fn answer(tool: &str, arguments: &Value) -> Value {
    match tool {
        "search_papers" => text_envelope(json!({
            "total_results": 3,
            "results": [
                {
                    "id": "2401.00001v2",
                    "title": "Hypergraph Transformers",
                    "authors": ["Ada Lovelace"],
                    "categories": ["cs.LG"],
                    "published": "2024-01-02T00:00:00Z",
                    "abstract": "We apply attention to hyperedges.",
                    "pdf_url": "https://arxiv.org/pdf/2401.00001v2"
                },
                {
                    "id": "2305.00002v1",
                    "title": "An Older Paper",
                    "authors": ["Grace Hopper"],
                    "published": "2023-05-01T00:00:00Z",
                    "abstract": "Filtered out by date."
                },
                {
                    "id": "2401.00003v1",
                    "title": "Withdrawn Paper",
                    "authors": ["Alan Turing"],
                    "published": "2024-02-01T00:00:00Z",
                    "abstract": "Cannot be downloaded."
                }
            ]
        })),
        "download_paper" => {
            if arguments["arxiv_id"] == "2401.00003" {
                text_envelope(json!({"status": "error", "message": "paper withdrawn"}))
            } else {
                text_envelope(json!({
                    "status": "success",
                    "resource_uri": "file:///tmp/papers/2401.00001.md"
                }))
            }
        }
        "read_paper" => json!({"content": [{
            "type": "text",
            "text": "# Abstract\nWe apply attention to hyperedges.\n\n# 1 Introduction\nGraphs are not enough.\n\n# 7 Conclusion\nIt works."
        }]}),
        other => json!({"content": [{"type": "text", "text": format!("unknown tool {}", other)}], "isError": true}),
    }
}

/// Answer tool calls until the client hangs up; returns the tools called
async fn serve(stream: DuplexStream) -> Vec<String> {
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut called = Vec::new();

    while let Ok(request) = frame::read_frame(&mut reader).await {
        let tool = request["params"]["name"].as_str().unwrap_or_default().to_string();
        let result = answer(&tool, &request["params"]["arguments"]);
        called.push(tool);

        let notice = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
        frame::write_frame(&mut writer, &notice).await.unwrap();
        let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
        frame::write_frame(&mut writer, &response).await.unwrap();
    }
    called
}

fn connect() -> (Arc<RpcClient<InMemory>>, tokio::task::JoinHandle<Vec<String>>) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let (read_half, writer) = tokio::io::split(client_end);
    let client = RpcClient::new(InMemory {
        writer,
        reader: BufReader::new(read_half),
    });
    (Arc::new(client), tokio::spawn(serve(server_end)))
}

fn plan() -> SearchPlan {
    let mut plan = SearchPlan::new("recent papers on hypergraph transformers")
        .topic("hypergraph transformers")
        .limit(3)
        .depth(SummaryDepth::AbstractIntroConclusion);
    plan.filters.date_from = Some("2024-01-01".to_string());
    plan
}

#[tokio::test]
async fn test_plan_execution_end_to_end() {
    let (client, server) = connect();
    let source = Arc::new(ArxivToolGateway::new(client.clone()));
    let executor = PlanExecutor::new(source, Arc::new(StaticLlm::new(SUMMARY_REPLY)))
        .with_max_concurrency(2);

    let outcomes = executor.execute(&plan()).await.unwrap();

    let ids: Vec<&str> = outcomes.iter().map(|o| o.meta().id.as_str()).collect();
    assert_eq!(ids, vec!["2401.00001", "2401.00003"]);

    let first = &outcomes[0];
    let summary = first.summary().unwrap();
    assert!(summary.is_structured());
    assert_eq!(summary.record().limitations, "Quadratic memory.");
    assert_eq!(
        first.content().unwrap().section("introduction"),
        Some("Graphs are not enough.")
    );

    let reason = outcomes[1].failure().unwrap();
    assert!(reason.contains("2401.00003"), "unexpected reason: {}", reason);

    drop(executor);
    drop(client);
    let called = server.await.unwrap();
    assert_eq!(called[0], "search_papers");
    assert_eq!(called.iter().filter(|t| *t == "download_paper").count(), 2);
    assert_eq!(called.iter().filter(|t| *t == "read_paper").count(), 1);
}

#[tokio::test]
async fn test_agent_end_to_end() {
    let (client, _server) = connect();
    let planner = QueryPlanner::new(Arc::new(StaticLlm::new(
        r#"{"filters": {"topic": "hypergraph transformers", "date_from": "2024-01-01"}, "limit": 3, "summarization": {"enabled": false}}"#,
    )));
    let executor = PlanExecutor::new(
        Arc::new(ArxivToolGateway::new(client)),
        Arc::new(StaticLlm::new(SUMMARY_REPLY)),
    );
    let agent = ResearchAgent::new(planner, executor);

    let (plan, outcomes) = agent.run("hypergraph transformers this year").await.unwrap();

    assert_eq!(plan.raw_query, "hypergraph transformers this year");
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|o| o.summary().is_none() && o.failure().is_none()));
}

#[tokio::test]
async fn test_tool_error_fails_search() {
    let (client, _server) = connect();
    let executor = PlanExecutor::new(
        Arc::new(ArxivToolGateway::new(client.clone())),
        Arc::new(StaticLlm::default()),
    );

    let plan = SearchPlan::new("q").author("Ada Lovelace");
    let err = executor.execute(&plan).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Fetch(SourceError::Mcp(McpError::Tool { ref tool, .. })) if tool == "search_by_author"
    ));

    // the session stays usable after a tool-level error
    let outcomes = executor.execute(&crate::plan().without_summaries()).await.unwrap();
    assert_eq!(outcomes.len(), 2);
}

#[test]
fn test_outcomes_serialize_for_output() {
    let meta = summx::models::PaperMetaBuilder::new("2401.00001", "T").build();
    let outcome = summx::ProcessingOutcome::degraded(meta, "read failed");
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["status"], "meta_only");
    assert_eq!(json["reason"], "read failed");
    assert_eq!(json["meta"]["id"], "2401.00001");
}
