// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! PII redline: no finished report and no persisted job row may carry raw
//! invoice values, emails, IBANs, VAT ids, phone numbers, or XML content,
//! no matter how careless a filter was with its message text.

use std::sync::Arc;

use serde_json::json;

use crate::common::{fid, StubBehavior, StubFilter, TestEngine};
use invoice_gate::infrastructure::filters::FilterRegistry;
use invoice_gate_domain::entities::{Diagnostic, PlanBuilder, PlanStep};
use invoice_gate_domain::repositories::job_repository::{JobResult, JobStatus};
use invoice_gate_domain::services::filter::FilterConfig;
use invoice_gate_domain::services::masking::contains_pii;

#[tokio::test]
async fn test_report_survives_a_leaky_filter() {
    // A filter that stuffs everything forbidden into its message text
    let leaky = StubFilter::new(
        "leaky",
        StubBehavior::Findings {
            diagnostics: vec![Diagnostic::error(
                "LEAK-1",
                "business-rule",
                fid("leaky"),
                "bad element <ram:Name>ACME GmbH</ram:Name>, contact billing@acme.example, \
                 pay DE89370400440532013000, vat DE123456789, call +49 30 1234567",
            )],
            error_kind: None,
        },
    );
    let registry = FilterRegistry::new();
    registry.register(Arc::new(leaky), FilterConfig::new()).unwrap();

    let plan = PlanBuilder::new()
        .id("redline")
        .add_step(PlanStep::filter(fid("leaky"), 0))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    let serialized = serde_json::to_string(&report).unwrap();
    assert!(!serialized.contains("ACME"));
    assert!(!serialized.contains("billing@acme.example"));
    assert!(!serialized.contains("DE89370400440532013000"));
    assert!(!serialized.contains("DE123456789"));
    assert!(!contains_pii(&serialized), "report still matches a PII pattern");
}

#[tokio::test]
async fn test_parsed_run_report_masks_invoice_identifiers() {
    let registry = FilterRegistry::new();
    registry
        .register(
            Arc::new(StubFilter::new("parser", StubBehavior::ParseInvoice)),
            FilterConfig::new(),
        )
        .unwrap();

    let plan = PlanBuilder::new()
        .id("masked-summary")
        .add_step(PlanStep::filter(fid("parser"), 0))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    // The summary exists but every identifier is masked
    assert_eq!(report.invoice_summary.invoice_number.as_deref(), Some("RE***42"));
    assert_eq!(report.invoice_summary.seller_vat_id.as_deref(), Some("DE***89"));
    assert_eq!(report.invoice_summary.buyer_vat_id.as_deref(), Some("DE***21"));

    let serialized = serde_json::to_string(&report).unwrap();
    assert!(!serialized.contains("RE-2025-0042"));
    assert!(!serialized.contains("DE123456789"));
    assert!(!contains_pii(&serialized));
}

#[tokio::test]
async fn test_persisted_job_row_is_clean() {
    use invoice_gate::infrastructure::repositories::SqliteJobRepository;
    use invoice_gate_domain::repositories::job_repository::{JobRepository, ValidationJob};

    let repo = SqliteJobRepository::in_memory().await.unwrap();
    let job = ValidationJob::enqueued("job-1", "raw-invoice:abc");
    repo.create_job(&job).await.unwrap();
    repo.update_job_status("job-1", JobStatus::Processing)
        .await
        .unwrap();

    repo.store_job_result(
        "job-1",
        JobResult {
            status: JobStatus::Blocked,
            fingerprint_id: Some("FL-x-000000".to_string()),
            report_summary: Some(json!({
                "decision": "BLOCK",
                "reasonCodes": ["ERROR_PRESENT"],
                "diagnosticCounts": {"errors": 2, "warnings": 0, "infos": 0, "hints": 0}
            })),
            error_summary: None,
        },
    )
    .await
    .unwrap();

    let row = repo.get_job_by_id("job-1").await.unwrap().unwrap();
    let serialized = serde_json::to_string(&row).unwrap();
    assert!(!contains_pii(&serialized), "job row matches a PII pattern");
    // Raw content reference is already nulled
    assert!(row.invoice_content_key.is_none());
}
