//! Stage functions for the invoice-to-pay graph.
//!
//! Each stage receives the current state read-only and returns a
//! [`StageUpdate`]; the executor owns the fold. Tool selections and
//! ability calls are returned as accumulator values inside the update,
//! never written to shared structures from inside a stage.

use crate::engine::WorkflowEngine;
use chrono::Utc;
use payflow_decision::checkpoint_priority;
use payflow_tools::{Ability, AbilityContext};
use payflow_types::{
    AbilityCall, ApprovalStatus, AuditLogEntry, HumanDecision, LineItem, MatchEvidence,
    MatchResult, PurchaseOrder, RiskFlags, Stage, StageUpdate, VendorProfile, WorkflowError,
    WorkflowResult, WorkflowState, WorkflowStatus,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

impl WorkflowEngine {
    pub(crate) async fn run_stage(
        &self,
        stage: Stage,
        state: &WorkflowState,
    ) -> WorkflowResult<StageUpdate> {
        match stage {
            Stage::Intake => self.stage_intake(state).await,
            Stage::Understand => self.stage_understand(state).await,
            Stage::Prepare => self.stage_prepare(state).await,
            Stage::Retrieve => self.stage_retrieve(state).await,
            Stage::Match => self.stage_match(state).await,
            Stage::Checkpoint => self.stage_checkpoint(state).await,
            Stage::HitlDecision => self.stage_hitl_decision(state).await,
            Stage::Reconcile => self.stage_reconcile(state).await,
            Stage::Approve => self.stage_approve(state).await,
            Stage::Posting => self.stage_posting(state).await,
            Stage::Notify => self.stage_notify(state).await,
            Stage::Complete => self.stage_complete(state).await,
        }
    }

    /// Invoke one ability, recording the call in the update's audit
    /// accumulator. An envelope failure aborts the stage.
    async fn call(
        &self,
        state: &WorkflowState,
        stage: Stage,
        ability: Ability,
        payload: Value,
        update: &mut StageUpdate,
    ) -> WorkflowResult<Value> {
        let context = AbilityContext::new(state.workflow_id.as_str(), stage);
        let outcome = self.invoker.execute(ability.as_str(), payload, &context).await?;
        update.ability_calls.push(AbilityCall::new(
            stage,
            ability.as_str(),
            ability.provider_group(),
        ));
        outcome.into_data(ability)
    }

    fn selection_context(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([(
            "environment".to_string(),
            Value::String(self.config.environment.clone()),
        )])
    }

    // ── INTAKE ───────────────────────────────────────────────────────

    /// Accept and validate the invoice payload. A payload missing
    /// required fields fails the run before any downstream stage.
    async fn stage_intake(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let storage = self.selector.select("db", &self.selection_context())?;

        let data = self
            .call(
                state,
                Stage::Intake,
                Ability::ValidateSchema,
                json!({ "invoice_payload": state.invoice }),
                &mut update,
            )
            .await?;

        if !data["validated"].as_bool().unwrap_or(false) {
            let violations: Vec<String> =
                serde_json::from_value(data["validation_errors"].clone()).unwrap_or_default();
            return Err(WorkflowError::Validation(violations.join("; ")));
        }

        let raw_id = format!("raw_{}", short_hex(12));
        let ingest_ts = Utc::now();

        update.raw_id = Some(raw_id.clone());
        update.ingest_ts = Some(ingest_ts);
        update.validated = Some(true);
        update.status = Some(WorkflowStatus::InProgress);
        update.tool_selections.push(("storage".to_string(), storage));
        update.output_data = json!({
            "raw_id": raw_id,
            "ingest_ts": ingest_ts,
            "validated": true,
        });
        Ok(finish(update))
    }

    // ── UNDERSTAND ───────────────────────────────────────────────────

    /// OCR extraction and line-item parsing.
    async fn stage_understand(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let mut context = self.selection_context();
        context.insert("document_quality".to_string(), json!(0.8));
        let ocr = self.selector.select("ocr", &context)?;

        let data = self
            .call(
                state,
                Stage::Understand,
                Ability::OcrExtract,
                json!({
                    "attachments": state.invoice.attachments,
                    "ocr_tool": ocr.selected,
                }),
                &mut update,
            )
            .await?;

        let parsed_line_items: Vec<LineItem> =
            serde_json::from_value(list(&data, "parsed_line_items"))?;
        let detected_pos: Vec<String> = serde_json::from_value(list(&data, "detected_pos"))?;

        update.invoice_text = data["invoice_text"].as_str().map(str::to_string);
        update.parsed_line_items = Some(parsed_line_items);
        update.detected_pos = Some(detected_pos);
        update.tool_selections.push(("ocr".to_string(), ocr));
        update.output_data = data;
        Ok(finish(update))
    }

    // ── PREPARE ──────────────────────────────────────────────────────

    /// Normalize the vendor name, enrich the profile, compute risk flags.
    async fn stage_prepare(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let normalized = self
            .call(
                state,
                Stage::Prepare,
                Ability::NormalizeVendor,
                json!({ "vendor_name": state.invoice.vendor_name }),
                &mut update,
            )
            .await?;
        let normalized_name = normalized["normalized"]
            .as_str()
            .unwrap_or(&state.invoice.vendor_name)
            .to_string();

        let enrichment = self.selector.select("enrichment", &self.selection_context())?;
        let enriched = self
            .call(
                state,
                Stage::Prepare,
                Ability::EnrichVendor,
                json!({
                    "vendor_name": normalized_name,
                    "vendor_tax_id": state.invoice.vendor_tax_id,
                    "enrichment_tool": enrichment.selected,
                }),
                &mut update,
            )
            .await?;

        let vendor_profile = VendorProfile {
            normalized_name,
            tax_id: enriched["tax_id"].as_str().map(str::to_string),
            risk_score: enriched["risk_score"].as_f64().unwrap_or(0.0),
            credit_score: enriched["credit_score"].as_f64(),
            enrichment_meta: enriched["enrichment_meta"].clone(),
        };

        let flags_data = self
            .call(
                state,
                Stage::Prepare,
                Ability::ComputeFlags,
                json!({
                    "invoice": state.invoice,
                    "vendor_profile": vendor_profile,
                }),
                &mut update,
            )
            .await?;
        let flags: RiskFlags = serde_json::from_value(flags_data.clone())?;

        update.output_data = json!({
            "vendor_profile": vendor_profile,
            "flags": flags_data,
        });
        update.vendor_profile = Some(vendor_profile);
        update.flags = Some(flags);
        update.tool_selections.push(("enrichment".to_string(), enrichment));
        Ok(finish(update))
    }

    // ── RETRIEVE ─────────────────────────────────────────────────────

    /// Fetch POs, GRNs, and vendor history from the ERP.
    async fn stage_retrieve(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let erp = self.selector.select("erp_connector", &self.selection_context())?;

        // OCR-detected references win over the one supplied on the payload.
        let po_reference = state
            .detected_pos
            .first()
            .cloned()
            .or_else(|| state.invoice.po_reference.clone());

        let po_data = self
            .call(
                state,
                Stage::Retrieve,
                Ability::FetchPo,
                json!({ "po_reference": po_reference, "erp_tool": erp.selected }),
                &mut update,
            )
            .await?;
        let matched_pos: Vec<PurchaseOrder> = serde_json::from_value(list(&po_data, "matched_pos"))?;

        let grn_data = self
            .call(
                state,
                Stage::Retrieve,
                Ability::FetchGrn,
                json!({ "po_reference": po_reference, "erp_tool": erp.selected }),
                &mut update,
            )
            .await?;
        let matched_grns: Vec<Value> = serde_json::from_value(list(&grn_data, "matched_grns"))?;

        let vendor_name = state
            .vendor_profile
            .as_ref()
            .map(|p| p.normalized_name.clone())
            .unwrap_or_default();
        let history_data = self
            .call(
                state,
                Stage::Retrieve,
                Ability::FetchHistory,
                json!({ "vendor_name": vendor_name, "erp_tool": erp.selected }),
                &mut update,
            )
            .await?;
        let history: Vec<Value> = serde_json::from_value(list(&history_data, "history"))?;

        tracing::info!(
            workflow_id = %state.workflow_id,
            pos_found = matched_pos.len(),
            "ERP retrieval finished"
        );

        update.output_data = json!({
            "matched_pos": matched_pos,
            "matched_grns": matched_grns,
            "history": history,
        });
        update.matched_pos = Some(matched_pos);
        update.matched_grns = Some(matched_grns);
        update.history = Some(history);
        update.tool_selections.push(("erp_connector".to_string(), erp));
        Ok(finish(update))
    }

    // ── MATCH ────────────────────────────────────────────────────────

    /// Two-way match between the invoice and the first retrieved PO.
    async fn stage_match(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let data = self
            .call(
                state,
                Stage::Match,
                Ability::ComputeMatchScore,
                json!({
                    "invoice": state.invoice,
                    "po": state.primary_po(),
                    "match_threshold": self.config.match_policy.match_threshold,
                    "tolerance_pct": self.config.match_policy.tolerance_pct,
                }),
                &mut update,
            )
            .await?;

        let match_score = data["match_score"].as_f64().unwrap_or(0.0);
        let match_result: MatchResult = serde_json::from_value(data["match_result"].clone())?;
        let match_evidence: MatchEvidence = serde_json::from_value(data["match_evidence"].clone())?;

        tracing::info!(
            workflow_id = %state.workflow_id,
            match_score,
            ?match_result,
            "two-way match finished"
        );

        update.match_score = Some(match_score);
        update.match_result = Some(match_result);
        update.match_evidence = Some(match_evidence);
        update.requires_human_review = Some(match_result == MatchResult::Failed);
        update.output_data = data;
        Ok(finish(update))
    }

    // ── CHECKPOINT ───────────────────────────────────────────────────

    /// Persist a checkpoint for human review. The executor suspends
    /// immediately after this stage's update is folded in.
    async fn stage_checkpoint(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let discrepancy = state
            .match_evidence
            .as_ref()
            .map(|e| e.discrepancy)
            .unwrap_or(state.invoice.amount);
        let reason = format!(
            "Match score {:.2} below threshold. Discrepancy: ${:.2}",
            state.match_score, discrepancy
        );
        let priority = checkpoint_priority(state.match_score);

        let checkpoint = self.store.create(state, &reason, priority).await?;

        update.checkpoint_id = Some(checkpoint.checkpoint_id.clone());
        update.review_url = Some(checkpoint.review_url.clone());
        update.paused_reason = Some(checkpoint.reason_for_hold.clone());
        update.status = Some(WorkflowStatus::AwaitingHuman);
        update.output_data = json!({
            "checkpoint_id": checkpoint.checkpoint_id,
            "review_url": checkpoint.review_url,
            "paused_reason": checkpoint.reason_for_hold,
            "priority": priority,
        });
        Ok(finish(update))
    }

    // ── HITL_DECISION ────────────────────────────────────────────────

    /// Apply the human decision attached by `resume` and route the run.
    async fn stage_hitl_decision(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let decision = state.human_decision.ok_or_else(|| {
            WorkflowError::stage(Stage::HitlDecision, "no decision attached to state")
        })?;

        if let Some(checkpoint_id) = &state.checkpoint_id {
            self.store.mark_resumed(checkpoint_id).await?;
        }

        let (next_stage, status) = if decision == HumanDecision::Accept {
            (Stage::Reconcile, WorkflowStatus::InProgress)
        } else {
            (Stage::Complete, WorkflowStatus::ManualHandoff)
        };

        tracing::info!(
            workflow_id = %state.workflow_id,
            decision = %decision,
            next_stage = %next_stage,
            "human decision applied"
        );

        update.next_stage = Some(next_stage);
        update.status = Some(status);
        update.output_data = json!({
            "decision": decision,
            "reviewer_id": state.reviewer_id,
            "next_stage": next_stage,
        });
        Ok(finish(update))
    }

    // ── RECONCILE ────────────────────────────────────────────────────

    /// Build the accounting entries.
    async fn stage_reconcile(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let vendor_profile = state.vendor_profile.clone().ok_or_else(|| {
            WorkflowError::stage(Stage::Reconcile, "vendor profile missing from state")
        })?;

        let data = self
            .call(
                state,
                Stage::Reconcile,
                Ability::BuildAccountingEntries,
                json!({
                    "invoice": state.invoice,
                    "vendor_profile": vendor_profile,
                }),
                &mut update,
            )
            .await?;

        update.accounting_entries =
            Some(serde_json::from_value(list(&data, "accounting_entries"))?);
        update.reconciliation_report =
            Some(serde_json::from_value(data["reconciliation_report"].clone())?);
        update.output_data = data;
        Ok(finish(update))
    }

    // ── APPROVE ──────────────────────────────────────────────────────

    async fn stage_approve(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let data = self
            .call(
                state,
                Stage::Approve,
                Ability::ApplyApprovalPolicy,
                json!({
                    "amount": state.invoice.amount,
                    "invoice_id": state.invoice.invoice_id,
                    "auto_approve_threshold": self.config.approval_policy.auto_approve_threshold,
                }),
                &mut update,
            )
            .await?;

        let approval_status: ApprovalStatus =
            serde_json::from_value(data["approval_status"].clone())?;

        update.approval_status = Some(approval_status);
        update.approver_id = data["approver_id"].as_str().map(str::to_string);
        update.output_data = data;
        Ok(finish(update))
    }

    // ── POSTING ──────────────────────────────────────────────────────

    /// Post to the ERP and schedule the payment.
    async fn stage_posting(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let erp = self.selector.select("erp_connector", &self.selection_context())?;

        let post_data = self
            .call(
                state,
                Stage::Posting,
                Ability::PostToErp,
                json!({
                    "accounting_entries": state.accounting_entries,
                    "invoice_id": state.invoice.invoice_id,
                    "erp_tool": erp.selected,
                }),
                &mut update,
            )
            .await?;

        let payment_data = self
            .call(
                state,
                Stage::Posting,
                Ability::SchedulePayment,
                json!({
                    "amount": state.invoice.amount,
                    "due_date": state.invoice.due_date,
                    "invoice_id": state.invoice.invoice_id,
                }),
                &mut update,
            )
            .await?;

        update.posted = Some(post_data["posted"].as_bool().unwrap_or(false));
        update.erp_txn_id = post_data["erp_txn_id"].as_str().map(str::to_string);
        update.scheduled_payment_id = payment_data["scheduled_payment_id"]
            .as_str()
            .map(str::to_string);
        update.tool_selections.push(("erp_connector".to_string(), erp));
        update.output_data = post_data;
        Ok(finish(update))
    }

    // ── NOTIFY ───────────────────────────────────────────────────────

    async fn stage_notify(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let email = self.selector.select("email", &self.selection_context())?;
        let vendor_name = state
            .vendor_profile
            .as_ref()
            .map(|p| p.normalized_name.clone())
            .unwrap_or_else(|| state.invoice.vendor_name.clone());

        self.call(
            state,
            Stage::Notify,
            Ability::NotifyVendor,
            json!({
                "vendor_name": vendor_name,
                "invoice_id": state.invoice.invoice_id,
                "notification_tool": email.selected,
            }),
            &mut update,
        )
        .await?;

        self.call(
            state,
            Stage::Notify,
            Ability::NotifyFinanceTeam,
            json!({
                "invoice_id": state.invoice.invoice_id,
                "status": "COMPLETED",
                "notification_tool": email.selected,
            }),
            &mut update,
        )
        .await?;

        update.notified_parties = Some(vec!["vendor".to_string(), "finance_team".to_string()]);
        update.tool_selections.push(("email".to_string(), email));
        update.output_data = json!({
            "notified_parties": ["vendor", "finance_team"],
        });
        Ok(finish(update))
    }

    // ── COMPLETE ─────────────────────────────────────────────────────

    /// Assemble the final payload and audit log, and fix the terminal
    /// status. Any decision other than ACCEPT ends as a manual handoff.
    async fn stage_complete(&self, state: &WorkflowState) -> WorkflowResult<StageUpdate> {
        let mut update = StageUpdate::default();

        let final_status = match state.human_decision {
            None | Some(HumanDecision::Accept) => WorkflowStatus::Completed,
            Some(_) => WorkflowStatus::ManualHandoff,
        };

        let vendor_name = state
            .vendor_profile
            .as_ref()
            .map(|p| p.normalized_name.clone())
            .unwrap_or_else(|| state.invoice.vendor_name.clone());

        let final_payload = json!({
            "workflow_id": state.workflow_id,
            "invoice_id": state.invoice.invoice_id,
            "vendor": vendor_name,
            "amount": state.invoice.amount,
            "status": final_status,
            "match_score": state.match_score,
            "posted": state.posted,
            "erp_txn_id": state.erp_txn_id,
            "completed_at": Utc::now(),
        });

        let audit_log: Vec<AuditLogEntry> = state
            .stage_outputs
            .iter()
            .map(|output| AuditLogEntry {
                stage: output.stage,
                status: output.status,
                timestamp: output.timestamp,
            })
            .collect();

        update.status = Some(final_status);
        update.audit_log = Some(audit_log);
        update.output_data = final_payload.clone();
        update.final_payload = Some(final_payload);
        Ok(finish(update))
    }
}

/// Mark the update's stage output COMPLETED.
fn finish(mut update: StageUpdate) -> StageUpdate {
    update.output_status = payflow_types::StageStatus::Completed;
    update
}

/// A list-valued field, defaulting to an empty array when absent.
fn list(data: &Value, key: &str) -> Value {
    data.get(key).cloned().unwrap_or_else(|| json!([]))
}

fn short_hex(len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..len.min(hex.len())].to_string()
}
