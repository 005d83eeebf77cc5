mod pricing;

use std::collections::HashMap;

use conductor_types::{
    BashCommandRecord, BehavioralMetrics, EventKind, FileOperationRecord, SessionData,
    ToolExecution, TokenUsageSummary,
};

pub use pricing::{estimate_cost, resolve_price, Price};

/// Groups the events of one parsed session into a `BehavioralMetrics`
/// value. Pure and total: `None` (the "no session parsed yet" case) yields
/// the zero value, which already satisfies every rate invariant.
pub fn extract(data: Option<&SessionData>) -> BehavioralMetrics {
    let Some(data) = data else {
        return BehavioralMetrics::default();
    };

    let mut tool_totals: HashMap<String, ToolTotals> = HashMap::new();
    let mut bash_commands = Vec::new();
    let mut file_operations = Vec::new();
    let mut token_usage = TokenUsageSummary::default();

    for event in &data.events {
        match &event.kind {
            EventKind::ToolCall(call) => {
                let totals = tool_totals.entry(call.tool_name.clone()).or_default();
                totals.count += 1;
                if call.success {
                    totals.success += 1;
                } else {
                    totals.errors += 1;
                }
                if let Some(ms) = call.duration_ms {
                    totals.duration_sum_ms += ms as f64;
                    totals.duration_samples += 1;
                }
            }
            EventKind::BashCommand(cmd) => {
                bash_commands.push(BashCommandRecord {
                    command: cmd.command.clone(),
                    exit_code: cmd.exit_code,
                    success: cmd.success,
                    duration_ms: cmd.duration_ms,
                });
            }
            EventKind::FileOperation(op) => {
                file_operations.push(FileOperationRecord {
                    operation: op.operation.clone(),
                    path: op.path.clone(),
                    size_bytes: op.size_bytes,
                });
            }
            EventKind::TokenUsage(usage) => {
                token_usage.input += usage.input_tokens;
                token_usage.output += usage.output_tokens;
                token_usage.cost += usage
                    .cost_usd
                    .unwrap_or_else(|| estimate_cost(usage.input_tokens, usage.output_tokens, usage.model_name.as_deref()));
                if token_usage.model_name.is_none() {
                    token_usage.model_name = usage.model_name.clone();
                }
            }
            EventKind::Text(_) | EventKind::SessionStart(_) | EventKind::Skip(_) => {}
        }
    }

    let mut tool_executions: Vec<ToolExecution> = tool_totals
        .into_iter()
        .map(|(name, totals)| totals.into_execution(name))
        .collect();
    tool_executions.sort_by(|a, b| a.name.cmp(&b.name));

    let mut agent_performance = HashMap::new();
    if let Some(agent_name) = &data.session.agent_name {
        agent_performance.insert(agent_name.clone(), 1);
    }

    let (total_success, total_errors) = tool_executions.iter().fold((0u64, 0u64), |acc, t| {
        (acc.0 + t.total_success, acc.1 + t.total_errors)
    });
    let total_calls = total_success + total_errors;
    let success_rate = if total_calls > 0 {
        total_success as f64 / total_calls as f64
    } else if data.session.success {
        1.0
    } else {
        0.0
    };
    let error_rate = 1.0 - success_rate;

    BehavioralMetrics {
        total_sessions: 1,
        success_rate,
        error_rate,
        total_errors: data.session.error_count,
        average_duration: data.session.duration_ms as f64,
        total_cost: token_usage.cost,
        token_usage,
        agent_performance,
        tool_executions,
        bash_commands,
        file_operations,
    }
}

#[derive(Default)]
struct ToolTotals {
    count: u64,
    success: u64,
    errors: u64,
    duration_sum_ms: f64,
    duration_samples: u64,
}

impl ToolTotals {
    fn into_execution(self, name: String) -> ToolExecution {
        let success_rate = if self.count > 0 {
            self.success as f64 / self.count as f64
        } else {
            0.0
        };
        let avg_duration_ms = if self.duration_samples > 0 {
            self.duration_sum_ms / self.duration_samples as f64
        } else {
            0.0
        };
        ToolExecution {
            name,
            count: self.count,
            total_success: self.success,
            total_errors: self.errors,
            success_rate,
            error_rate: 1.0 - success_rate,
            avg_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use conductor_types::{
        BashCommandEvent, Event, FileOperationEvent, Session, ToolCallEvent, TokenUsageEvent,
    };
    use serde_json::Value;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn session() -> Session {
        Session {
            id: "s1".to_string(),
            project: "demo".to_string(),
            timestamp: ts(),
            status: "completed".to_string(),
            agent_name: Some("claude".to_string()),
            duration_ms: 4_200,
            success: true,
            error_count: 0,
        }
    }

    #[test]
    fn none_input_is_empty_and_valid() {
        let metrics = extract(None);
        assert_eq!(metrics.total_sessions, 0);
        assert!(metrics.validate().is_ok());
    }

    #[test]
    fn tool_calls_group_by_name_with_success_rate() {
        let mut data = SessionData::new(session());
        data.events.push(Event::new(
            ts(),
            EventKind::ToolCall(ToolCallEvent {
                tool_name: "Read".to_string(),
                parameters: Value::Null,
                success: true,
                duration_ms: Some(10),
                tool_use_id: None,
                is_result: false,
            }),
        ));
        data.events.push(Event::new(
            ts(),
            EventKind::ToolCall(ToolCallEvent {
                tool_name: "Read".to_string(),
                parameters: Value::Null,
                success: false,
                duration_ms: Some(30),
                tool_use_id: None,
                is_result: false,
            }),
        ));

        let metrics = extract(Some(&data));
        assert_eq!(metrics.tool_executions.len(), 1);
        let read = &metrics.tool_executions[0];
        assert_eq!(read.name, "Read");
        assert_eq!(read.count, 2);
        assert_eq!(read.total_success, 1);
        assert_eq!(read.total_errors, 1);
        assert!((read.success_rate - 0.5).abs() < 1e-9);
        assert!((read.avg_duration_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn bash_and_file_events_pass_through_unaggregated() {
        let mut data = SessionData::new(session());
        data.events.push(Event::new(
            ts(),
            EventKind::BashCommand(BashCommandEvent {
                command: "ls".to_string(),
                exit_code: Some(0),
                output: None,
                output_length: None,
                success: true,
                duration_ms: Some(5),
            }),
        ));
        data.events.push(Event::new(
            ts(),
            EventKind::FileOperation(FileOperationEvent {
                operation: "read".to_string(),
                path: "/tmp/a".to_string(),
                size_bytes: 128,
            }),
        ));

        let metrics = extract(Some(&data));
        assert_eq!(metrics.bash_commands.len(), 1);
        assert_eq!(metrics.file_operations.len(), 1);
        assert_eq!(metrics.file_operations[0].size_bytes, 128);
    }

    #[test]
    fn token_usage_sums_and_fills_cost_from_pricing_table() {
        let mut data = SessionData::new(session());
        data.events.push(Event::new(
            ts(),
            EventKind::TokenUsage(TokenUsageEvent {
                input_tokens: 1_000_000,
                output_tokens: 0,
                cost_usd: None,
                model_name: Some("claude-sonnet-4-5".to_string()),
            }),
        ));

        let metrics = extract(Some(&data));
        assert_eq!(metrics.token_usage.input, 1_000_000);
        assert!((metrics.total_cost - 3.0).abs() < 1e-6);
    }

    #[test]
    fn explicit_cost_usd_is_not_overridden() {
        let mut data = SessionData::new(session());
        data.events.push(Event::new(
            ts(),
            EventKind::TokenUsage(TokenUsageEvent {
                input_tokens: 100,
                output_tokens: 50,
                cost_usd: Some(0.0),
                model_name: None,
            }),
        ));

        let metrics = extract(Some(&data));
        assert_eq!(metrics.total_cost, 0.0);
    }

    #[test]
    fn no_tool_calls_falls_back_to_session_success_flag() {
        let data = SessionData::new(session());
        let metrics = extract(Some(&data));
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.error_rate, 0.0);
    }
}
