use serde_json::Value;

use crate::http::{HttpGet, HttpResponse};
use crate::keybinds::SpellId;
use crate::wowhead::{spell_page_url, tooltip_urls};

const SAMPLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    Json { keys: Vec<String> },
    Markup { spell_markers: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Response {
        status: u16,
        content_type: Option<String>,
        length: usize,
        body: Option<BodyKind>,
        sample: String,
    },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub outcome: ProbeOutcome,
}

/// Every scrape endpoint plus the spell page, in the order they are probed.
pub fn probe_urls(id: SpellId) -> Vec<String> {
    let mut urls = tooltip_urls(id);
    urls.push(spell_page_url(id));
    urls
}

/// Only successful bodies are classified.
pub fn summarize_probe(response: &HttpResponse) -> ProbeOutcome {
    let body = response.is_ok().then(|| classify_body(&response.body));
    ProbeOutcome::Response {
        status: response.status,
        content_type: response.content_type.clone(),
        length: response.body.len(),
        body,
        sample: sample(&response.body),
    }
}

fn classify_body(body: &str) -> BodyKind {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => BodyKind::Json {
            keys: map.keys().cloned().collect(),
        },
        Ok(_) => BodyKind::Json { keys: Vec::new() },
        Err(_) => BodyKind::Markup {
            spell_markers: body.contains("iconId") || body.contains("spell="),
        },
    }
}

fn sample(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SAMPLE_CHARS)
        .collect()
}

pub fn probe_endpoints<H: HttpGet>(http: &mut H, id: SpellId) -> Vec<ProbeResult> {
    probe_urls(id)
        .into_iter()
        .map(|url| {
            let outcome = match http.get(&url, "application/json, text/html, */*", None) {
                Ok(response) => summarize_probe(&response),
                Err(error) => ProbeOutcome::Error(format!("{error:#}")),
            };
            ProbeResult { url, outcome }
        })
        .collect()
}

pub fn render_probe_report(results: &[ProbeResult]) -> String {
    let mut lines = Vec::new();
    for (index, result) in results.iter().enumerate() {
        lines.push(format!("[{}] {}", index + 1, result.url));
        match &result.outcome {
            ProbeOutcome::Error(message) => lines.push(format!("  error: {message}")),
            ProbeOutcome::Response {
                status,
                content_type,
                length,
                body,
                sample,
            } => {
                lines.push(format!("  status: {status}"));
                lines.push(format!(
                    "  content-type: {}",
                    content_type.as_deref().unwrap_or("<none>")
                ));
                lines.push(format!("  body length: {length} bytes"));
                match body {
                    Some(BodyKind::Json { keys }) => {
                        lines.push("  valid JSON".to_string());
                        if !keys.is_empty() {
                            lines.push(format!("  keys: {}", keys.join(", ")));
                        }
                    }
                    Some(BodyKind::Markup { spell_markers }) => {
                        lines.push("  not JSON (markup)".to_string());
                        if *spell_markers {
                            lines.push("  contains spell data markers".to_string());
                        }
                    }
                    None => lines.push("  failed".to_string()),
                }
                if body.is_some() && !sample.is_empty() {
                    lines.push(format!("  sample: {sample}"));
                }
            }
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockHttp;

    fn id(value: u32) -> SpellId {
        SpellId::new(value).expect("spell id")
    }

    #[test]
    fn probe_classifies_each_endpoint() {
        let urls = probe_urls(id(23922));
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[3], "https://www.wowhead.com/spell=23922");

        let mut http = MockHttp::new()
            .with(&urls[0], 200, r#"{"name":"Shield Slam","icon":"inv_shield_05"}"#)
            .with_transport_error(&urls[1])
            .with_html(&urls[3], "<html>\n  <script>var iconId = 1;</script>\n</html>");
        let results = probe_endpoints(&mut http, id(23922));

        match &results[0].outcome {
            ProbeOutcome::Response { body, .. } => assert_eq!(
                body,
                &Some(BodyKind::Json {
                    keys: vec!["icon".to_string(), "name".to_string()]
                })
            ),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(results[1].outcome, ProbeOutcome::Error(_)));
        match &results[2].outcome {
            ProbeOutcome::Response { status, body, .. } => {
                assert_eq!(*status, 404);
                assert_eq!(body, &None);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &results[3].outcome {
            ProbeOutcome::Response { body, sample, .. } => {
                assert_eq!(body, &Some(BodyKind::Markup { spell_markers: true }));
                assert_eq!(sample, "<html> <script>var iconId = 1;</script> </html>");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let report = render_probe_report(&results);
        assert!(report.contains("[1] https://www.wowhead.com/tooltip/spell/23922?dataEnv=1"));
        assert!(report.contains("keys: icon, name"));
        assert!(report.contains("contains spell data markers"));
    }
}
