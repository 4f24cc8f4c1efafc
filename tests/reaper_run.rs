//! End-to-end runs of the decision core against a mock inventory
//!
//! These tests pin the pagination contract (N pages, exactly N list
//! calls), the dry-run/terminate state machine, immunity semantics, and
//! the best-effort protection-disable fan-out.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use ec2_reaper::classify::InstanceRecord;
use ec2_reaper::config::Settings;
use ec2_reaper::error::ReaperError;
use ec2_reaper::reaper::{run, InstancePage, InstanceSource, RunOutcome};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted inventory that records every call made by the core.
#[derive(Default)]
struct MockInventory {
    /// Pages (or failures) handed out in order, one per list call
    pages: Mutex<VecDeque<Result<InstancePage>>>,
    list_calls: AtomicUsize,
    /// Continuation tokens the core passed to each list call
    tokens_seen: Mutex<Vec<Option<String>>>,
    /// One entry per terminate call, holding the batched id list
    terminations: Mutex<Vec<Vec<String>>>,
    /// Instance ids whose protection disable was requested
    protection_disabled: Mutex<Vec<String>>,
    /// Instance ids whose protection disable should fail
    fail_protection_for: HashSet<String>,
}

impl MockInventory {
    fn with_pages(pages: Vec<Result<InstancePage>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        }
    }

    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn terminations(&self) -> Vec<Vec<String>> {
        self.terminations.lock().unwrap().clone()
    }

    fn protection_disabled(&self) -> Vec<String> {
        let mut ids = self.protection_disabled.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

impl InstanceSource for MockInventory {
    async fn list_running_instances(&self, continuation: Option<String>) -> Result<InstancePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(continuation);
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("unexpected extra list call")))
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.terminations.lock().unwrap().push(instance_ids.to_vec());
        Ok(())
    }

    async fn disable_termination_protection(&self, instance_id: &str) -> Result<()> {
        self.protection_disabled
            .lock()
            .unwrap()
            .push(instance_id.to_string());
        if self.fail_protection_for.contains(instance_id) {
            Err(anyhow!("protection disable refused for {instance_id}"))
        } else {
            Ok(())
        }
    }
}

fn settings(dry_run: bool, cutoff: DateTime<Utc>, immunities: &[&str]) -> Settings {
    Settings {
        dry_run,
        max_age_days: 7,
        cutoff,
        immunity_tags: immunities.iter().map(|s| s.to_string()).collect(),
        ignore_termination_protection: false,
    }
}

fn instance(id: &str, launch_time: DateTime<Utc>, tags: &[(&str, &str)]) -> InstanceRecord {
    InstanceRecord {
        id: id.to_string(),
        launch_time,
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn page(instances: Vec<InstanceRecord>, next_token: Option<&str>) -> Result<InstancePage> {
    Ok(InstancePage {
        instances,
        next_token: next_token.map(String::from),
    })
}

#[tokio::test]
async fn empty_first_page_yields_no_victims_after_one_call() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![page(vec![], None)]);

    let outcome = run(&settings(false, cutoff, &[]), &inventory).await.unwrap();

    assert_eq!(outcome, RunOutcome::NoVictims);
    assert_eq!(inventory.list_calls(), 1);
    assert!(inventory.terminations().is_empty());
}

#[tokio::test]
async fn young_instances_are_not_victims() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![page(
        vec![instance("i-young", cutoff + Duration::days(1), &[])],
        None,
    )]);

    let outcome = run(&settings(false, cutoff, &[]), &inventory).await.unwrap();

    assert_eq!(outcome, RunOutcome::NoVictims);
    assert!(inventory.terminations().is_empty());
}

#[tokio::test]
async fn paginated_victim_is_terminated_with_one_batched_call() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![
        page(
            vec![instance("i-shouldnotbevictimised", cutoff + Duration::days(1), &[])],
            Some("DummyToken"),
        ),
        page(
            vec![instance("i-amavictim", cutoff - Duration::days(1), &[("Environment", "Prod")])],
            None,
        ),
    ]);

    let outcome = run(&settings(false, cutoff, &[]), &inventory).await.unwrap();

    assert_eq!(outcome, RunOutcome::Terminated(vec!["i-amavictim".to_string()]));
    assert_eq!(inventory.list_calls(), 2);
    assert_eq!(
        *inventory.tokens_seen.lock().unwrap(),
        vec![None, Some("DummyToken".to_string())]
    );
    assert_eq!(
        inventory.terminations(),
        vec![vec!["i-amavictim".to_string()]]
    );
}

#[tokio::test]
async fn empty_continuation_token_ends_pagination() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![page(vec![], Some(""))]);

    let outcome = run(&settings(false, cutoff, &[]), &inventory).await.unwrap();

    assert_eq!(outcome, RunOutcome::NoVictims);
    assert_eq!(inventory.list_calls(), 1);
}

#[tokio::test]
async fn dry_run_reports_without_terminating() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![page(
        vec![
            instance("i-amavictim", cutoff - Duration::days(1), &[]),
            instance("i-shouldnotbevictimised", cutoff + Duration::days(1), &[]),
        ],
        None,
    )]);

    let outcome = run(&settings(true, cutoff, &[]), &inventory).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::DryRunReport(vec!["i-amavictim".to_string()])
    );
    assert!(inventory.terminations().is_empty());
    assert!(inventory.protection_disabled().is_empty());
}

#[tokio::test]
async fn immunity_tag_spares_an_old_instance() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![page(
        vec![instance("i-immune", cutoff - Duration::days(30), &[("Keeper", "true")])],
        None,
    )]);

    let outcome = run(
        &settings(false, cutoff, &["keeper", "donoteuthanise"]),
        &inventory,
    )
    .await
    .unwrap();

    assert_eq!(outcome, RunOutcome::NoVictims);
    assert!(inventory.terminations().is_empty());
}

#[tokio::test]
async fn victims_accumulate_across_pages_in_discovery_order() {
    let cutoff = Utc::now() - Duration::days(7);
    let old = cutoff - Duration::days(1);
    let inventory = MockInventory::with_pages(vec![
        page(
            vec![instance("i-first", old, &[]), instance("i-second", old, &[])],
            Some("t1"),
        ),
        // i-second appears again on page two; the defensive dedupe keeps one
        page(
            vec![instance("i-second", old, &[]), instance("i-third", old, &[])],
            None,
        ),
    ]);

    let outcome = run(&settings(false, cutoff, &[]), &inventory).await.unwrap();

    let expected: Vec<String> = ["i-first", "i-second", "i-third"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(outcome, RunOutcome::Terminated(expected.clone()));
    assert_eq!(inventory.terminations(), vec![expected]);
}

#[tokio::test]
async fn protection_disable_runs_for_every_victim_before_termination() {
    let cutoff = Utc::now() - Duration::days(7);
    let old = cutoff - Duration::days(1);
    let inventory = MockInventory::with_pages(vec![page(
        vec![instance("i-one", old, &[]), instance("i-two", old, &[])],
        None,
    )]);

    let mut cfg = settings(false, cutoff, &[]);
    cfg.ignore_termination_protection = true;

    let outcome = run(&cfg, &inventory).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Terminated(vec!["i-one".to_string(), "i-two".to_string()])
    );
    assert_eq!(
        inventory.protection_disabled(),
        vec!["i-one".to_string(), "i-two".to_string()]
    );
    assert_eq!(inventory.terminations().len(), 1);
}

#[tokio::test]
async fn protection_disable_failure_does_not_block_termination() {
    let cutoff = Utc::now() - Duration::days(7);
    let old = cutoff - Duration::days(1);
    let mut inventory = MockInventory::with_pages(vec![page(
        vec![instance("i-one", old, &[]), instance("i-two", old, &[])],
        None,
    )]);
    inventory.fail_protection_for.insert("i-one".to_string());

    let mut cfg = settings(false, cutoff, &[]);
    cfg.ignore_termination_protection = true;

    let outcome = run(&cfg, &inventory).await.unwrap();

    // Both disables were attempted and the batched terminate still fired
    assert_eq!(
        inventory.protection_disabled(),
        vec!["i-one".to_string(), "i-two".to_string()]
    );
    assert_eq!(
        inventory.terminations(),
        vec![vec!["i-one".to_string(), "i-two".to_string()]]
    );
    assert!(matches!(outcome, RunOutcome::Terminated(_)));
}

#[tokio::test]
async fn protection_is_untouched_when_override_disabled() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![page(
        vec![instance("i-amavictim", cutoff - Duration::days(1), &[])],
        None,
    )]);

    let outcome = run(&settings(false, cutoff, &[]), &inventory).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Terminated(_)));
    assert!(inventory.protection_disabled().is_empty());
}

#[tokio::test]
async fn inventory_failure_aborts_the_run_without_terminating() {
    let cutoff = Utc::now() - Duration::days(7);
    let inventory = MockInventory::with_pages(vec![
        page(
            vec![instance("i-amavictim", cutoff - Duration::days(1), &[])],
            Some("t1"),
        ),
        Err(anyhow!("transport failure")),
    ]);

    let result = run(&settings(false, cutoff, &[]), &inventory).await;

    assert!(matches!(result, Err(ReaperError::Inventory(_))));
    // Victims from the successful first page are discarded, not acted on
    assert!(inventory.terminations().is_empty());
}

#[tokio::test]
async fn termination_failure_is_propagated() {
    /// Inventory whose terminate call always fails
    struct FailingTerminator {
        inner: MockInventory,
    }

    impl InstanceSource for FailingTerminator {
        async fn list_running_instances(
            &self,
            continuation: Option<String>,
        ) -> Result<InstancePage> {
            self.inner.list_running_instances(continuation).await
        }

        async fn terminate_instances(&self, _instance_ids: &[String]) -> Result<()> {
            Err(anyhow!("terminate refused"))
        }

        async fn disable_termination_protection(&self, instance_id: &str) -> Result<()> {
            self.inner.disable_termination_protection(instance_id).await
        }
    }

    let cutoff = Utc::now() - Duration::days(7);
    let inventory = FailingTerminator {
        inner: MockInventory::with_pages(vec![page(
            vec![instance("i-amavictim", cutoff - Duration::days(1), &[])],
            None,
        )]),
    };

    let result = run(&settings(false, cutoff, &[]), &inventory).await;

    assert!(matches!(result, Err(ReaperError::Termination(_))));
}

#[tokio::test]
async fn tag_keys_compare_case_insensitively_against_immunities() {
    let cutoff = Utc::now() - Duration::days(7);
    let mut tags = HashMap::new();
    tags.insert("DONOTEUTHANISE".to_string(), String::new());
    let inventory = MockInventory::with_pages(vec![page(
        vec![InstanceRecord {
            id: "i-immune".to_string(),
            launch_time: cutoff - Duration::days(30),
            tags,
        }],
        None,
    )]);

    let outcome = run(&settings(false, cutoff, &["donoteuthanise"]), &inventory)
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::NoVictims);
}
