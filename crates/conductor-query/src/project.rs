use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use chrono::{DateTime, Utc};

use conductor_cache::Cache;
use conductor_discovery::discover;
use conductor_types::{BehavioralMetrics, Session, SessionData, TokenUsageSummary, ToolExecution};

use crate::error::{Error, Result};
use crate::filter::SessionFilter;

/// Parses one session file end to end: reads every line, decodes events via
/// the two-dialect parser, extracts session metadata independently from
/// `session_start`/`session_metadata` lines, and runs the extractor.
/// This is the loader injected into [`Cache::load_session`] — the cache
/// itself has no knowledge of JSONL or the dialects.
fn load_session_file(path: &Path, project: &str) -> Result<BehavioralMetrics> {
    let file = std::fs::File::open(path)?;
    let reader = conductor_parser::buffered_reader(file);

    let mut events = Vec::new();
    let mut meta: Option<conductor_parser::SessionMeta> = None;
    let mut error_count: u64 = 0;

    for line in reader.lines() {
        let line = line?;
        if let Some(m) = conductor_parser::parse_session_meta(&line) {
            meta = Some(m);
            continue;
        }
        match conductor_parser::parse_line(&line) {
            Ok(parsed) => events.extend(parsed),
            Err(_) => {
                error_count += 1;
                continue;
            }
        }
    }

    let session_id = meta
        .as_ref()
        .and_then(|m| m.session_id.clone())
        .unwrap_or_default();

    if session_id.is_empty() && events.is_empty() {
        return Err(Error::EmptySession(path.to_path_buf()));
    }

    let first_ts = events.first().map(|e: &conductor_types::Event| e.timestamp);
    let last_ts = events.last().map(|e: &conductor_types::Event| e.timestamp);
    let duration_ms = match (first_ts, last_ts) {
        (Some(first), Some(last)) => (last - first).num_milliseconds().max(0),
        _ => 0,
    };

    let timestamp = meta
        .as_ref()
        .and_then(|m| m.timestamp)
        .or(first_ts)
        .unwrap_or_else(Utc::now);

    let session = Session {
        id: if session_id.is_empty() {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string()
        } else {
            session_id
        },
        project: project.to_string(),
        timestamp,
        status: meta
            .as_ref()
            .and_then(|m| m.status.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        agent_name: meta.as_ref().and_then(|m| m.agent_name.clone()),
        duration_ms,
        success: meta.as_ref().and_then(|m| m.success).unwrap_or(true),
        error_count,
    };

    let data = SessionData { session, events };
    Ok(conductor_aggregate::extract(Some(&data)))
}

/// Cumulative metrics across every session folded into a project query.
/// Shares its shape with `BehavioralMetrics`; `total_sessions` doubles as
/// the fold's session count.
pub type AggregateProjectMetrics = BehavioralMetrics;

/// Discovers sessions under `project`, applies `filter`'s time range against
/// file-system mtime and `filter.search` against agent mentions, loads each
/// surviving session through `cache`, and folds the per-session metrics.
pub fn get_project_metrics(
    project: &str,
    base_dir: &Path,
    filter: &SessionFilter,
    cache: &Cache,
) -> Result<AggregateProjectMetrics> {
    filter.validate()?;

    let sessions = discover(base_dir);
    let mut per_session = Vec::new();

    for info in sessions {
        if info.project != project {
            continue;
        }
        if let Some(modified) = info.modified {
            let modified: DateTime<Utc> = modified.into();
            if let Some(since) = filter.since {
                if modified < since {
                    continue;
                }
            }
            if let Some(until) = filter.until {
                if modified > until {
                    continue;
                }
            }
        }

        let project_owned = project.to_string();
        let metrics = cache.load_session(&info.path, |p| {
            load_session_file(p, &project_owned).map_err(|e| conductor_cache::Error::Load(Box::new(e)))
        })?;

        if !filter.search.is_empty() {
            let needle = filter.search.to_lowercase();
            let mentions = metrics
                .agent_performance
                .keys()
                .any(|agent| agent.to_lowercase().contains(&needle));
            if !mentions {
                continue;
            }
        }

        per_session.push(metrics);
    }

    Ok(fold(&per_session))
}

fn fold(per_session: &[BehavioralMetrics]) -> AggregateProjectMetrics {
    let count = per_session.len() as u64;
    if count == 0 {
        return BehavioralMetrics::default();
    }

    let mut agent_performance: HashMap<String, u64> = HashMap::new();
    let mut tool_totals: HashMap<String, ToolExecution> = HashMap::new();
    let mut bash_commands = Vec::new();
    let mut file_operations = Vec::new();
    let mut token_usage = TokenUsageSummary::default();
    let mut total_errors = 0u64;
    let mut total_cost = 0.0;
    let mut duration_sum = 0.0;
    let mut successful_sessions = 0u64;

    for metrics in per_session {
        total_errors += metrics.total_errors;
        total_cost += metrics.total_cost;
        duration_sum += metrics.average_duration;
        if metrics.success_rate >= 0.5 {
            successful_sessions += 1;
        }

        for (agent, count) in &metrics.agent_performance {
            *agent_performance.entry(agent.clone()).or_insert(0) += count;
        }

        for exec in &metrics.tool_executions {
            let entry = tool_totals.entry(exec.name.clone()).or_insert_with(|| ToolExecution {
                name: exec.name.clone(),
                ..Default::default()
            });
            let prior_count = entry.count;
            entry.count += exec.count;
            entry.total_success += exec.total_success;
            entry.total_errors += exec.total_errors;
            let combined_count = (prior_count + exec.count).max(1) as f64;
            entry.avg_duration_ms = (entry.avg_duration_ms * prior_count as f64
                + exec.avg_duration_ms * exec.count as f64)
                / combined_count;
        }

        bash_commands.extend(metrics.bash_commands.iter().cloned());
        file_operations.extend(metrics.file_operations.iter().cloned());

        token_usage.input += metrics.token_usage.input;
        token_usage.output += metrics.token_usage.output;
        token_usage.cost += metrics.token_usage.cost;
        if metrics.token_usage.model_name.is_some() {
            token_usage.model_name = metrics.token_usage.model_name.clone();
        }
    }

    let mut tool_executions: Vec<ToolExecution> = tool_totals
        .into_values()
        .map(|mut exec| {
            exec.success_rate = if exec.count > 0 {
                exec.total_success as f64 / exec.count as f64
            } else {
                0.0
            };
            exec.error_rate = 1.0 - exec.success_rate;
            exec
        })
        .collect();
    tool_executions.sort_by(|a, b| a.name.cmp(&b.name));

    BehavioralMetrics {
        total_sessions: count,
        success_rate: successful_sessions as f64 / count as f64,
        error_rate: total_errors as f64 / count as f64,
        total_errors,
        average_duration: duration_sum / count as f64,
        total_cost,
        token_usage,
        agent_performance,
        tool_executions,
        bash_commands,
        file_operations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::{BashCommandRecord, FileOperationRecord};

    fn metrics_with(success_rate: f64, errors: u64, agent: &str) -> BehavioralMetrics {
        let mut agent_performance = HashMap::new();
        agent_performance.insert(agent.to_string(), 1);
        BehavioralMetrics {
            total_sessions: 1,
            success_rate,
            error_rate: 1.0 - success_rate,
            total_errors: errors,
            average_duration: 100.0,
            total_cost: 1.5,
            token_usage: TokenUsageSummary {
                input: 10,
                output: 5,
                cost: 1.5,
                model_name: Some("claude-sonnet-4-5".to_string()),
            },
            agent_performance,
            tool_executions: vec![ToolExecution {
                name: "Read".to_string(),
                count: 2,
                total_success: 2,
                total_errors: 0,
                success_rate: 1.0,
                error_rate: 0.0,
                avg_duration_ms: 10.0,
            }],
            bash_commands: vec![BashCommandRecord {
                command: "ls".to_string(),
                exit_code: Some(0),
                success: true,
                duration_ms: Some(5),
            }],
            file_operations: vec![FileOperationRecord {
                operation: "read".to_string(),
                path: "/a".to_string(),
                size_bytes: 1,
            }],
        }
    }

    #[test]
    fn empty_input_folds_to_default() {
        let result = fold(&[]);
        assert_eq!(result.total_sessions, 0);
    }

    #[test]
    fn fold_sums_and_applies_success_threshold() {
        let sessions = vec![metrics_with(1.0, 0, "claude"), metrics_with(0.3, 2, "claude")];
        let folded = fold(&sessions);
        assert_eq!(folded.total_sessions, 2);
        assert_eq!(folded.total_errors, 2);
        assert!((folded.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(*folded.agent_performance.get("claude").unwrap(), 2);
        assert_eq!(folded.tool_executions.len(), 1);
        assert_eq!(folded.tool_executions[0].count, 4);
        assert_eq!(folded.bash_commands.len(), 2);
    }
}
