//! MetricsQL range queries.

use chrono::Utc;
use serde_json::Value;

use crate::client::OpsRampClient;
use crate::error::Result;

/// Builds `metric_name{k="v",...}`. Dots in the metric name become
/// underscores; filters keep the given order.
pub fn metric_selector(metric: &str, filters: &[(&str, &str)]) -> String {
    let labels: Vec<String> = filters.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect();
    format!("{}{{{}}}", metric.replace('.', "_"), labels.join(","))
}

/// Query parameters for a trailing window ending at `end` (epoch seconds).
pub fn range_params(selector: &str, end: i64, window_mins: u32, step_mins: u32) -> String {
    let start = end - i64::from(window_mins) * 60;
    let step = u64::from(step_mins) * 60;
    format!(
        "query={}&start={start}&end={end}&step={step}",
        urlencoding::encode(selector)
    )
}

/// Samples of `metric` over the last `window_mins`, one per `step_mins`.
pub async fn query_metrics(
    client: &OpsRampClient,
    tenant: &str,
    metric: &str,
    filters: &[(&str, &str)],
    window_mins: u32,
    step_mins: u32,
) -> Result<Value> {
    let selector = metric_selector(metric, filters);
    let params = range_params(&selector, Utc::now().timestamp(), window_mins, step_mins);
    let path = format!("metricsql/api/v3/tenants/{tenant}/metrics?{params}");
    client
        .get_json(&path, &format!("All Metrics for {selector} {tenant}"))
        .await
}
