use pgverify_azure::ServerConfiguration;
use pgverify_check::{CheckInputs, CheckReport};
use pgverify_domain::ValueMode;

/// Render a passing check as human-readable text.
pub fn render_report(report: &CheckReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== RUN   {}\n", report.check));
    for v in &report.verified {
        out.push_str(&format!("  ok  {}\n", v.key));
    }
    if report.has_drift() {
        out.push_str("\nValue differences (not compared");
        if report.value_mode == ValueMode::NameOnly {
            out.push_str(", pass --strict-values to enforce");
        }
        out.push_str("):\n");
        for d in &report.value_drift {
            out.push_str(&format!(
                "  ~ {}: deployment {:?}, server {:?}\n",
                d.key,
                d.expected,
                d.observed.as_deref().unwrap_or("")
            ));
        }
    }
    let elapsed = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
    out.push_str(&format!(
        "--- PASS: {} ({} key(s) on {}, {:.2}s)\n",
        report.check,
        report.verified.len(),
        report.server,
        elapsed
    ));
    out
}

/// Render the deployment outputs the check consumes.
pub fn render_inputs(inputs: &CheckInputs) -> String {
    let mut out = String::new();
    out.push_str(&format!("Resource group: {}\n", inputs.server.resource_group));
    out.push_str(&format!("Server:         {}\n", inputs.server.server_name));
    if inputs.expected.is_empty() {
        out.push_str("Configuration:  (none)\n");
        return out;
    }
    out.push_str("Configuration:\n");
    let width = inputs.expected.keys().map(str::len).max().unwrap_or(0);
    for (k, v) in inputs.expected.iter() {
        out.push_str(&format!("  {:width$} = {}\n", k, v, width = width));
    }
    out
}

/// Render live server configurations as a table.
pub fn render_configurations(configs: &[ServerConfiguration]) -> String {
    if configs.is_empty() {
        return "No configurations.\n".to_string();
    }
    let name_of = |c: &ServerConfiguration| c.name.clone().unwrap_or_default();
    let width = configs.iter().map(|c| name_of(c).len()).max().unwrap_or(0).max(4);

    let mut out = format!("{:width$}  {:<24}  {}\n", "NAME", "VALUE", "SOURCE", width = width);
    for c in configs {
        out.push_str(&format!(
            "{:width$}  {:<24}  {}\n",
            name_of(c),
            c.properties.value.as_deref().unwrap_or(""),
            c.properties.source.as_deref().unwrap_or(""),
            width = width
        ));
    }
    out
}
