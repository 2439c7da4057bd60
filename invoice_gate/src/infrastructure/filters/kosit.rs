// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # KoSIT Runner Filter
//!
//! Schema/schematron validation through the KoSIT validator daemon.
//!
//! ## Wire semantics
//!
//! `POST /validate` with an `application/xml` body:
//!
//! - `200` - accepted, no findings
//! - `406` - rejected with a report; the report body is parsed for rule
//!   codes which become error diagnostics
//! - `422` - the body is matched against the configured pattern list; a
//!   match ("no matching scenario" and friends) means the profile is
//!   unsupported and the step is `skipped`, anything else is a system
//!   error and the step is `errored`
//! - other `4xx`/`5xx` - execution error (retryable per the step's retry
//!   configuration)
//!
//! `GET /health` is polled at most every 30 seconds; while the daemon is
//! down the filter falls back to the configured CLI command, writing the
//! XML into an isolated scratch directory that is removed on every exit
//! path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use invoice_gate_domain::entities::{
    Diagnostic, StepError, StepResult, ValidationContext,
};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::services::temp_store::TempStore;
use invoice_gate_domain::value_objects::{ContentType, FilterId};

const DEFAULT_UNSUPPORTED_PATTERNS: [&str; 4] = [
    "no matching scenario",
    "scenario not found",
    "kein passendes szenario",
    "keine szenario-konfiguration",
];

/// Typed view of the filter config.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct KositConfig {
    daemon_url: String,
    unsupported_profile_patterns: Vec<String>,
    health_check_interval_ms: u64,
    cli_command: Option<String>,
}

impl Default for KositConfig {
    fn default() -> Self {
        Self {
            daemon_url: "http://127.0.0.1:8081".to_string(),
            unsupported_profile_patterns: DEFAULT_UNSUPPORTED_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            health_check_interval_ms: 30_000,
            cli_command: None,
        }
    }
}

/// Classified daemon response.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Accepted,
    RejectedWithReport,
    ProfileUnsupported,
    SystemError,
}

fn classify_response(status: u16, body: &str, patterns: &[String]) -> Verdict {
    match status {
        200 => Verdict::Accepted,
        406 => Verdict::RejectedWithReport,
        422 => {
            let lowered = body.to_lowercase();
            if patterns.iter().any(|p| lowered.contains(&p.to_lowercase())) {
                Verdict::ProfileUnsupported
            } else {
                Verdict::SystemError
            }
        }
        _ => Verdict::SystemError,
    }
}

struct HealthProbe {
    checked_at: Instant,
    healthy: bool,
}

/// KoSIT daemon client filter.
pub struct KositFilter {
    id: FilterId,
    client: reqwest::Client,
    temp_store: Arc<dyn TempStore>,
    health: Mutex<Option<HealthProbe>>,
}

impl KositFilter {
    pub fn new(temp_store: Arc<dyn TempStore>) -> Self {
        Self {
            id: FilterId::new("kosit").unwrap_or_else(|_| unreachable!()),
            client: reqwest::Client::new(),
            temp_store,
            health: Mutex::new(None),
        }
    }

    fn rejected_result(&self, report_body: &str) -> StepResult {
        let mut diagnostics = parse_report_codes(report_body)
            .into_iter()
            .map(|code| {
                Diagnostic::error(
                    code,
                    "business-rule",
                    self.id.clone(),
                    "Rule violation reported by the schema validator",
                )
            })
            .collect::<Vec<_>>();
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::error(
                "KOSIT-REJECTED",
                "schema",
                self.id.clone(),
                "Document rejected by the schema validator",
            ));
        }
        StepResult::ran(self.id.clone())
            .with_diagnostics(diagnostics)
            .with_metadata_value("errorKind", json!("schematron"))
    }

    fn interpret(&self, status: u16, body: String, config: &KositConfig) -> StepResult {
        match classify_response(status, &body, &config.unsupported_profile_patterns) {
            Verdict::Accepted => StepResult::ran(self.id.clone()),
            Verdict::RejectedWithReport => self.rejected_result(&body),
            Verdict::ProfileUnsupported => StepResult::skipped(self.id.clone())
                .with_diagnostics(vec![Diagnostic::warning(
                    "KOSIT-PROFILE-UNSUPPORTED",
                    "schema",
                    self.id.clone(),
                    "No validation scenario matches this document profile",
                )])
                .with_metadata_value("reasonCode", json!("KOSIT_PROFILE_UNSUPPORTED"))
                .with_metadata_value("profileUnsupported", json!(true)),
            Verdict::SystemError => StepResult::errored(
                self.id.clone(),
                StepError::new("KOSIT_SYSTEM_ERROR", "validator reported a system error")
                    .with_status(status),
            )
            .with_metadata_value("systemError", json!(true)),
        }
    }

    /// Cached daemon liveness, refreshed at most once per interval.
    async fn daemon_healthy(&self, config: &KositConfig) -> bool {
        let interval = Duration::from_millis(config.health_check_interval_ms);
        {
            let probe = self.health.lock();
            if let Some(probe) = probe.as_ref() {
                if probe.checked_at.elapsed() < interval {
                    return probe.healthy;
                }
            }
        }

        let healthy = match self
            .client
            .get(format!("{}/health", config.daemon_url.trim_end_matches('/')))
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "KoSIT health probe failed");
                false
            }
        };

        *self.health.lock() = Some(HealthProbe {
            checked_at: Instant::now(),
            healthy,
        });
        healthy
    }

    async fn validate_via_daemon(
        &self,
        xml: Vec<u8>,
        config: &KositConfig,
    ) -> Result<StepResult, StepError> {
        let response = self
            .client
            .post(format!("{}/validate", config.daemon_url.trim_end_matches('/')))
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .header(reqwest::header::ACCEPT, "application/xml")
            .body(xml)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(self.interpret(status, body, config))
    }

    /// CLI fallback: writes the XML into an isolated scratch directory and
    /// runs the configured command against it. The directory is removed on
    /// every exit path by its RAII guard.
    async fn validate_via_cli(
        &self,
        xml: Vec<u8>,
        command_line: &str,
    ) -> Result<StepResult, StepError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| StepError::new("IO_ERROR", format!("scratch dir creation failed: {}", e)))?;
        let input_path = scratch.path().join("invoice.xml");
        tokio::fs::write(&input_path, &xml)
            .await
            .map_err(|e| StepError::new("IO_ERROR", format!("scratch write failed: {}", e)))?;

        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| StepError::new("CONFIG_ERROR", "empty CLI fallback command"))?;

        let output = tokio::process::Command::new(program)
            .args(parts)
            .arg(&input_path)
            .output()
            .await
            .map_err(|e| {
                StepError::new("SERVICE_UNAVAILABLE", format!("CLI fallback failed to start: {}", e))
            })?;

        let report = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(StepResult::ran(self.id.clone()).with_metadata_value("cliFallback", json!(true)))
        } else {
            Ok(self
                .rejected_result(&report)
                .with_metadata_value("cliFallback", json!(true)))
        }
    }
}

fn request_error(e: reqwest::Error) -> StepError {
    if e.is_timeout() {
        StepError::timeout("KoSIT daemon request timed out")
    } else if e.is_connect() {
        StepError::new("ECONNREFUSED", "could not connect to the KoSIT daemon")
    } else {
        StepError::new("NETWORK_ERROR", "KoSIT daemon request failed")
    }
}

/// Extracts distinct rule codes (`BR-DE-01`, `XR-24`, `PEPPOL-EN16931-R020`)
/// from a validator report.
fn parse_report_codes(report: &str) -> Vec<String> {
    static CODE_REGEX: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"\b((?:BR|XR|PEPPOL|UBL|CII)(?:-[A-Z0-9]+)+)\b")
            .unwrap_or_else(|_| regex::Regex::new(r"[^\s\S]").unwrap_or_else(|_| unreachable!()))
    });
    let mut codes: Vec<String> = Vec::new();
    for capture in CODE_REGEX.find_iter(report) {
        let code = capture.as_str().to_string();
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

#[async_trait]
impl Filter for KositFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "KoSIT Schema Validator"
    }

    fn version(&self) -> &str {
        "1.5.0"
    }

    fn description(&self) -> Option<&str> {
        Some("Validates XML submissions against the KoSIT scenario catalog")
    }

    fn tags(&self) -> Vec<String> {
        vec!["schema".to_string(), "external".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let typed: KositConfig = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| StepError::new("CONFIG_ERROR", format!("invalid config: {}", e)))?;

        if ctx.raw_invoice().content_type != ContentType::Xml {
            return Ok(StepResult::skipped(self.id.clone())
                .with_metadata_value("reasonCode", json!("KOSIT_NOT_APPLICABLE"))
                .with_metadata_value("skipReason", json!("content_type_not_xml")));
        }

        let xml = self
            .temp_store
            .get(ctx.raw_invoice().temp_key.as_str())
            .await
            .map_err(StepError::from)?
            .ok_or_else(|| {
                StepError::new("TEMP_STORE_MISS", "raw invoice entry is missing or expired")
            })?;

        if self.daemon_healthy(&typed).await {
            self.validate_via_daemon(xml, &typed).await
        } else if let Some(command) = typed.cli_command.as_deref() {
            warn!("KoSIT daemon unreachable, using CLI fallback");
            self.validate_via_cli(xml, command).await
        } else {
            Err(StepError::new(
                "SERVICE_UNAVAILABLE",
                "KoSIT daemon is not reachable and no CLI fallback is configured",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        KositConfig::default().unsupported_profile_patterns
    }

    #[test]
    fn test_classify_accepted_and_rejected() {
        assert_eq!(classify_response(200, "", &patterns()), Verdict::Accepted);
        assert_eq!(
            classify_response(406, "<report/>", &patterns()),
            Verdict::RejectedWithReport
        );
    }

    #[test]
    fn test_classify_422_profile_patterns() {
        assert_eq!(
            classify_response(422, "No matching scenario found for document", &patterns()),
            Verdict::ProfileUnsupported
        );
        assert_eq!(
            classify_response(422, "Kein passendes Szenario vorhanden", &patterns()),
            Verdict::ProfileUnsupported
        );
        assert_eq!(
            classify_response(422, "internal assertion failure", &patterns()),
            Verdict::SystemError
        );
    }

    #[test]
    fn test_classify_other_statuses_are_system_errors() {
        assert_eq!(classify_response(500, "", &patterns()), Verdict::SystemError);
        assert_eq!(classify_response(400, "", &patterns()), Verdict::SystemError);
    }

    #[test]
    fn test_parse_report_codes_extracts_and_dedups() {
        let report = r#"
            <failed-assert id="BR-DE-01">missing buyer</failed-assert>
            <failed-assert id="BR-DE-01">again</failed-assert>
            <failed-assert id="PEPPOL-EN16931-R020">rule</failed-assert>
            <failed-assert id="XR-24">other</failed-assert>
        "#;
        let codes = parse_report_codes(report);
        assert_eq!(codes, vec!["BR-DE-01", "PEPPOL-EN16931-R020", "XR-24"]);
    }

    #[test]
    fn test_interpret_unsupported_profile_is_skipped() {
        let store: Arc<dyn TempStore> = Arc::new(crate::infrastructure::stores::MemoryTempStore::new());
        let filter = KositFilter::new(store);
        let result = filter.interpret(422, "no matching scenario".to_string(), &KositConfig::default());
        assert_eq!(
            result.metadata["reasonCode"],
            json!("KOSIT_PROFILE_UNSUPPORTED")
        );
        assert_eq!(result.metadata["profileUnsupported"], json!(true));
    }

    #[test]
    fn test_interpret_rejection_builds_schematron_findings() {
        let store: Arc<dyn TempStore> = Arc::new(crate::infrastructure::stores::MemoryTempStore::new());
        let filter = KositFilter::new(store);
        let result = filter.interpret(
            406,
            "<report><failed-assert id=\"BR-DE-15\"/></report>".to_string(),
            &KositConfig::default(),
        );
        assert!(result.has_error_diagnostics());
        assert_eq!(result.diagnostics[0].code, "BR-DE-15");
        assert_eq!(result.metadata["errorKind"], json!("schematron"));
    }
}
