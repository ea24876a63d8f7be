//! JSON tool handlers for a routing layer
//!
//! Every handler returns a JSON value with an explicit `success` flag;
//! governor failures become `{success: false, error}` values.

use crate::governor::GovernorService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

// Tool parameter structures

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Command line to run, `&&` chains allowed
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// Command line to check
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnderstandRequest {
    /// Natural language request
    pub text: String,
    /// Run the translated command as well
    #[serde(default)]
    pub execute: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeRequest {
    /// Command output to summarize
    pub output: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ServiceInfoRequest {}

// Tool handler implementations

/// Execute a governed command
pub async fn handle_execute(
    request: ExecuteRequest,
    service: Option<Arc<GovernorService>>,
) -> Result<Value, anyhow::Error> {
    let service = service.ok_or_else(|| anyhow::anyhow!("Governor service not initialized"))?;

    let result = service.execute(&request.command).await;
    let mut value = serde_json::to_value(&result)?;
    value["command"] = json!(request.command);
    Ok(value)
}

/// Check a command against the policy
pub async fn handle_validate(
    request: ValidateRequest,
    service: Option<Arc<GovernorService>>,
) -> Result<Value, anyhow::Error> {
    let service = service.ok_or_else(|| anyhow::anyhow!("Governor service not initialized"))?;

    Ok(match service.validate(&request.command) {
        Ok(()) => json!({
            "success": true,
            "command": request.command,
            "mode": service.mode(),
        }),
        Err(e) => json!({
            "success": false,
            "command": request.command,
            "mode": service.mode(),
            "error": e.to_string(),
        }),
    })
}

/// Translate natural language, optionally running the result
pub async fn handle_understand(
    request: UnderstandRequest,
    service: Option<Arc<GovernorService>>,
) -> Result<Value, anyhow::Error> {
    let service = service.ok_or_else(|| anyhow::anyhow!("Governor service not initialized"))?;

    if request.execute {
        return Ok(match service.run_natural_language(&request.text).await {
            Ok(outcome) => json!({
                "success": outcome.result.success,
                "command": outcome.command,
                "response": outcome.response,
                "result": outcome.result,
            }),
            Err(e) => {
                error!("Natural language request failed: {}", e);
                json!({ "success": false, "error": e.to_string() })
            }
        });
    }

    Ok(match service.understand(&request.text).await {
        Ok(translation) => json!({
            "success": true,
            "command": translation.command,
            "response": translation.response,
        }),
        Err(e) => {
            error!("Translation failed: {}", e);
            json!({ "success": false, "error": e.to_string() })
        }
    })
}

/// Summarize command output
pub async fn handle_summarize(
    request: SummarizeRequest,
    service: Option<Arc<GovernorService>>,
) -> Result<Value, anyhow::Error> {
    let service = service.ok_or_else(|| anyhow::anyhow!("Governor service not initialized"))?;

    Ok(match service.summarize_output(&request.output).await {
        Ok(summary) => json!({ "success": true, "summary": summary }),
        Err(e) => json!({ "success": false, "error": e.to_string() }),
    })
}

/// Capabilities and execution statistics
pub async fn handle_service_info(
    _request: ServiceInfoRequest,
    service: Option<Arc<GovernorService>>,
) -> Result<Value, anyhow::Error> {
    let service = service.ok_or_else(|| anyhow::anyhow!("Governor service not initialized"))?;

    let info = service.service_info().await;
    Ok(json!({
        "status": "success",
        "services": {
            "kubernetes": {
                "name": info.name,
                "security_mode": info.security_mode,
                "capabilities": info.capabilities,
                "failure_states": info.failure_states,
                "stats": {
                    "total_executions": info.stats.total_executions,
                    "successful_executions": info.stats.successful_executions,
                    "failed_executions": info.stats.failed_executions,
                    "rejected_executions": info.stats.rejected_executions,
                    "average_duration_ms": info.stats.average_duration.map(|d| d.as_millis() as u64),
                    "max_duration_ms": info.stats.max_duration.map(|d| d.as_millis() as u64),
                    "last_execution": info.stats.last_execution,
                },
            },
            "llm": info.translator,
        },
    }))
}
