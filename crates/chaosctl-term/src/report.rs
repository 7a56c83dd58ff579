//! Plain-text rendering of plans, probe reports and run results

use chaos_rs::ChaosError;
use chaosctl_core::{
    CapabilityReport, PlanSummary, ProvisionError, ProvisionFailure, ProvisionOutcome, Stage,
};
use std::fmt::Write;

/// Negotiated plan shown at the confirmation gate
pub fn render_plan(summary: &PlanSummary) -> String {
    let mut out = String::new();
    let namespace_note = if summary.namespace.exists {
        "existing"
    } else {
        "will be created"
    };
    let sa_note = if summary.service_account.exists {
        "existing, reused"
    } else {
        "will be created"
    };

    let _ = writeln!(
        out,
        "  Name:             {} (project {})",
        summary.identity.name, summary.identity.project_id
    );
    let _ = writeln!(out, "  Installation:     {}", summary.scope);
    let _ = writeln!(
        out,
        "  Namespace:        {} ({})",
        summary.namespace.name, namespace_note
    );
    let _ = writeln!(
        out,
        "  Service account:  {} ({})",
        summary.service_account.name, sa_note
    );
    let _ = writeln!(out, "  Platform:         {}", summary.platform);
    if !summary.description.is_empty() {
        let _ = writeln!(out, "  Description:      {}", summary.description);
    }
    if let Some(env) = &summary.environment_id {
        let _ = writeln!(out, "  Environment:      {}", env);
    }
    if let Some(selector) = &summary.node_selector {
        let _ = writeln!(out, "  Node selector:    {}", selector);
    }
    if summary.skip_ssl {
        let _ = writeln!(out, "  SSL verification: skipped");
    }
    out
}

/// Per-resource result of a capability probe
pub fn render_report(report: &CapabilityReport) -> String {
    let mut out = String::new();
    let _ = match &report.namespace {
        Some(ns) => writeln!(out, "Permissions for {} scope in namespace {}:", report.scope, ns),
        None => writeln!(out, "Permissions for {} scope:", report.scope),
    };

    for (kind, allowed) in &report.allowed {
        let mark = if *allowed { "ok" } else { "denied" };
        match report.errors.get(kind) {
            Some(err) => {
                let _ = writeln!(out, "  create {:<20} {} ({})", kind, mark, shorten(err));
            }
            None => {
                let _ = writeln!(out, "  create {:<20} {}", kind, mark);
            }
        }
    }

    if report.sufficient() {
        out.push_str("Sufficient to install a chaos infrastructure\n");
    } else {
        let _ = writeln!(out, "Missing: {}", report.missing().join(", "));
    }
    out
}

/// Summary printed after a successful run
pub fn render_outcome(outcome: &ProvisionOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Chaos infrastructure '{}' is connected (id {})",
        outcome.registration.name, outcome.registration.infra_id
    );
    let _ = writeln!(
        out,
        "  Namespace: {}{}",
        outcome.summary.namespace.name,
        if outcome.namespace_created {
            " (created)"
        } else {
            ""
        }
    );
    for object in &outcome.apply.objects {
        let _ = writeln!(out, "  {} {}", object.object, object.action);
    }
    let _ = writeln!(out, "  Agent: {}", outcome.rollout);
    out
}

/// Diagnostic printed when a run ends in failure
pub fn render_failure(failure: &ProvisionFailure) -> String {
    let mut out = String::new();
    let step = failure.stage.step_number();
    if step > 0 {
        let _ = writeln!(
            out,
            "Error: step {}/{} ({}): {}",
            step,
            Stage::total_steps(),
            failure.stage,
            failure.error
        );
    } else {
        let _ = writeln!(out, "Error: {}", failure.error);
    }

    for unwound in &failure.unwound {
        match &unwound.result {
            Ok(()) => {
                let _ = writeln!(out, "  rolled back: {}", unwound.compensation);
            }
            Err(e) => {
                let _ = writeln!(
                    out,
                    "  rollback failed: {} ({})",
                    unwound.compensation,
                    shorten(&e.to_string())
                );
            }
        }
    }

    if let Some(hint) = hint(&failure.error) {
        let _ = writeln!(out, "Hint: {}", hint);
    }
    out
}

/// Operator-facing next step for a fatal error
pub fn hint(error: &ProvisionError) -> Option<String> {
    let hint = match error {
        ProvisionError::PermissionDenied {
            namespace: None, ..
        } => "Ask a cluster admin for these permissions, or install with --installation-mode namespace"
            .to_string(),
        ProvisionError::PermissionDenied {
            namespace: Some(ns),
            ..
        } => format!("Ask for create access on roles and rolebindings in namespace {}", ns),
        ProvisionError::NameCollision { .. } => {
            "Another client registered this name first - run again with a different --name"
                .to_string()
        }
        ProvisionError::Registration(e) if e.is_unreachable() => {
            "Control plane not reachable - check --endpoint or the current account".to_string()
        }
        ProvisionError::Registration(e) if e.is_unauthorized() => {
            "Access token rejected - pass a fresh --token or log in again".to_string()
        }
        ProvisionError::ManifestApply(ChaosError::Io(e))
            if e.kind() == std::io::ErrorKind::NotFound =>
        {
            "kubectl not found - install it and make sure it is on PATH".to_string()
        }
        ProvisionError::ManifestApply(_) => {
            "Check that kubectl can reach the cluster with the same context".to_string()
        }
        ProvisionError::Cluster(e) if e.is_unreachable() => {
            "Cluster API not reachable - check the kubeconfig context".to_string()
        }
        ProvisionError::Cluster(e) if e.is_unauthorized() => {
            "Cluster credentials rejected - refresh the kubeconfig".to_string()
        }
        ProvisionError::RolloutTimedOut(_) | ProvisionError::RolloutFailed(_) => {
            "Inspect the agent pods with kubectl get pods -l app=subscriber".to_string()
        }
        ProvisionError::ExhaustedRetries { .. } => {
            "Pass different values with flags, or run without --non-interactive".to_string()
        }
        _ => return None,
    };
    Some(hint)
}

/// Truncate long error messages
fn shorten(msg: &str) -> String {
    if msg.chars().count() > 80 {
        let head: String = msg.chars().take(77).collect();
        format!("{}...", head)
    } else {
        msg.to_string()
    }
}
