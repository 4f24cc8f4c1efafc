//! The decision core: pagination, victim accumulation, and the
//! execute-or-simulate termination step.

use crate::classify::{classify, Classification, InstanceRecord};
use crate::config::Settings;
use crate::error::ReaperError;
use anyhow::Result;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use tracing::{error, info, warn};

/// One page of the instance inventory.
#[derive(Debug, Clone, Default)]
pub struct InstancePage {
    /// Instances in this page, in the order the provider returned them
    pub instances: Vec<InstanceRecord>,
    /// Opaque cursor for the next page; `None` or empty means exhausted
    pub next_token: Option<String>,
}

/// Terminal classification of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No instance matched; nothing was called beyond the inventory
    NoVictims,
    /// Victims were identified but dry-run mode suppressed all side effects
    DryRunReport(Vec<String>),
    /// Victims were terminated with a single batched call
    Terminated(Vec<String>),
}

/// Inventory and termination collaborator, implemented by the AWS adapter
/// and by mocks in tests.
///
/// The core never constructs clients itself; one of these is always
/// injected into [`run`].
pub trait InstanceSource: Send + Sync {
    /// Fetch one page of running instances, continuing from `continuation`
    /// when present.
    fn list_running_instances(
        &self,
        continuation: Option<String>,
    ) -> impl Future<Output = Result<InstancePage>> + Send;

    /// Terminate all given instances in a single batched call.
    fn terminate_instances(&self, instance_ids: &[String])
        -> impl Future<Output = Result<()>> + Send;

    /// Disable EC2 API termination protection for one instance.
    fn disable_termination_protection(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Execute one reaper run against the given inventory source.
///
/// Pages are fetched strictly sequentially (each continuation token is only
/// known once the previous page resolves) and the source is called at least
/// once: N linked pages mean exactly N list calls. Victims accumulate in
/// discovery order, deduplicated defensively.
///
/// The terminate call, when it happens, is issued exactly once per run and
/// carries every victim, regardless of how many pages they came from.
pub async fn run<S: InstanceSource>(
    settings: &Settings,
    source: &S,
) -> Result<RunOutcome, ReaperError> {
    let victims = collect_victims(settings, source).await?;

    if victims.is_empty() {
        info!("nothing to act on");
        return Ok(RunOutcome::NoVictims);
    }

    if settings.dry_run {
        info!(
            instances = %victims.join(", "),
            "dry run: would have terminated"
        );
        return Ok(RunOutcome::DryRunReport(victims));
    }

    if settings.ignore_termination_protection {
        disable_protection_for_all(source, &victims).await;
    }

    info!(instances = %victims.join(", "), "terminating instances");
    if let Err(e) = source.terminate_instances(&victims).await {
        error!(error = ?e, "Failed to terminate instances");
        return Err(ReaperError::Termination(e));
    }

    Ok(RunOutcome::Terminated(victims))
}

/// Drive the paginated inventory and classify every instance.
async fn collect_victims<S: InstanceSource>(
    settings: &Settings,
    source: &S,
) -> Result<Vec<String>, ReaperError> {
    let mut victims: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = source
            .list_running_instances(continuation.take())
            .await
            .map_err(ReaperError::Inventory)?;

        for instance in &page.instances {
            if classify(instance, settings.cutoff, &settings.immunity_tags)
                == Classification::Victim
                && seen.insert(instance.id.clone())
            {
                victims.push(instance.id.clone());
            }
        }

        match page.next_token {
            Some(token) if !token.is_empty() => continuation = Some(token),
            _ => break,
        }
    }

    Ok(victims)
}

/// Best-effort parallel disable of termination protection.
///
/// Every disable is initiated and awaited before the caller issues the
/// batched terminate call; individual failures are logged and do not block
/// the other victims or the termination itself.
async fn disable_protection_for_all<S: InstanceSource>(source: &S, victims: &[String]) {
    let disables: Vec<_> = victims
        .iter()
        .map(|id| async move { (id, source.disable_termination_protection(id).await) })
        .collect();

    for (instance_id, result) in join_all(disables).await {
        match result {
            Ok(()) => {
                info!(instance_id = %instance_id, "Termination protection disabled");
            }
            Err(e) => {
                warn!(
                    instance_id = %instance_id,
                    error = ?e,
                    "Failed to disable termination protection"
                );
            }
        }
    }
}
