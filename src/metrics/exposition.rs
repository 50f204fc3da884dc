use crate::cli::KVPair;

use super::{Metric, ScrapeResult};

const TYPE_GAUGE: &str = "gauge";

const HEADER_HELP: &str = "# HELP";
const HEADER_TYPE: &str = "# TYPE";

/// Renders a [`ScrapeResult`] in the Prometheus text exposition format (`version=0.0.4`).
///
/// Samples are grouped by [`Metric`], each group preceded by its headers.
/// The `const_labels` are appended to the labels of every sample.
pub fn render(result: &ScrapeResult, const_labels: &[KVPair]) -> String {
    let mut res: Vec<String> = Vec::with_capacity(result.len() + Metric::ALL.len() * 2);

    for metric in Metric::ALL.iter() {
        let mut samples = result.samples().iter().filter(|s| s.metric == *metric).peekable();
        if samples.peek().is_none() {
            continue;
        }

        append_headers(*metric, &mut res);
        for s in samples {
            let labels = metric
                .labels()
                .iter()
                .zip(s.label_values.iter())
                .map(|(k, v)| (*k, v.as_str()))
                .chain(const_labels.iter().map(|(k, v)| (k.as_str(), v.as_str())));

            append_metric(metric.name(), labels, s.value, &mut res);
        }
    }

    let mut body = res.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    body
}

fn append_headers(metric: Metric, res: &mut Vec<String>) {
    res.push(format!("{HEADER_HELP} {} {}", metric.name(), metric.help()));
    res.push(format!("{HEADER_TYPE} {} {TYPE_GAUGE}", metric.name()));
}

fn append_metric<'a>(name: &str, labels: impl Iterator<Item = (&'a str, &'a str)>, value: i64, res: &mut Vec<String>) {
    let labels = labels.map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v))).collect::<Vec<String>>();

    if labels.is_empty() {
        res.push(format!("{name} {value}"));
    } else {
        res.push(format!("{name}{{{}}} {value}", labels.join(",")));
    }
}

fn escape_label_value(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
