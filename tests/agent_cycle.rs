// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end agent cycles against a real mission directory and a scripted model.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use concord::agent::{Agent, AgentOptions, AgentSpec, AgentStatus, CycleOutcome, RoleKind};
use concord::error::ProposalError;
use concord::llm::ScriptedModel;
use concord::mutation::section_body;
use concord::store::templates::{ACTIVITY_LOG, MANAGEMENT, PRODUCTION, REQUEST, SPECIFICATION};
use concord::store::{DocumentStore, Missions};

async fn mission(temp: &TempDir) -> Arc<DocumentStore> {
    let store = Missions::new(temp.path()).create("haiku").await.unwrap();
    assert!(
        store
            .write(REQUEST, "# Request\nWrite a haiku about the borrow checker.\n")
            .await
    );
    Arc::new(store)
}

fn agent_for(store: &Arc<DocumentStore>, role: RoleKind, model: &Arc<ScriptedModel>) -> Agent {
    let options = AgentOptions::new(store.clone(), model.clone())
        .with_llm_timeout(Duration::from_secs(5));
    Agent::new(&AgentSpec::for_role(role), &options)
}

#[tokio::test]
async fn test_management_reply_is_canonicalized() {
    let temp = TempDir::new().unwrap();
    let store = mission(&temp).await;
    let model = Arc::new(ScriptedModel::always(
        "```markdown\n\
         # Directives\n\
         Keep it to three lines.\n\
         # Tasks\n\
         - [high] Draft the poem\n\
         - [URGENT] Not a priority\n\
         - [low]   Tidy wording\n\
         # Actions\n\
         - [2026-03-01 14:05] Scope | major | Narrowed to one poem\n\
         - yesterday | minor | no timestamp\n\
         ```",
    ));
    let mut agent = agent_for(&store, RoleKind::Management, &model);

    let outcome = agent.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Written { .. }), "{outcome:?}");

    let doc = store.read(MANAGEMENT).await.unwrap();
    assert_eq!(
        section_body(&doc, "Directives").map(str::trim),
        Some("Keep it to three lines.")
    );
    let tasks = section_body(&doc, "Tasks").unwrap();
    assert!(tasks.contains("- [HIGH] Draft the poem\n"));
    assert!(tasks.contains("- [LOW] Tidy wording"));
    assert!(!tasks.contains("URGENT"));

    let actions = section_body(&doc, "Actions").unwrap();
    assert!(actions.contains("- [2026-03-01 14:05] Scope | major | Narrowed to one poem"));
    assert!(!actions.contains("yesterday"));

    let log = store.read(ACTIVITY_LOG).await.unwrap();
    assert!(log.contains("management updated management"), "log: {log}");
}

#[tokio::test]
async fn test_downstream_agent_sees_upstream_changes() {
    let temp = TempDir::new().unwrap();
    let store = mission(&temp).await;

    let spec_model = Arc::new(ScriptedModel::always(
        "# Objective\nA haiku on ownership.\n# Deliverables\nThree lines, 5-7-5.\n",
    ));
    let mut specification = agent_for(&store, RoleKind::Specification, &spec_model);
    assert!(matches!(
        specification.run_cycle().await,
        CycleOutcome::Written { .. }
    ));

    let prod_model = Arc::new(ScriptedModel::always(
        "# Content\nValues move away\nborrowed twice, then given back\nthe checker is pleased\n",
    ));
    let mut production = agent_for(&store, RoleKind::Production, &prod_model);
    assert!(matches!(
        production.run_cycle().await,
        CycleOutcome::Written { .. }
    ));

    let prompt = prod_model.prompts().pop().unwrap();
    assert!(prompt.contains("A haiku on ownership."));
    assert!(prompt.contains("## Your document: production"));

    let poem = store.read(PRODUCTION).await.unwrap();
    assert!(poem.contains("the checker is pleased"));

    let log = store.read(ACTIVITY_LOG).await.unwrap();
    let spec_line = log.find("specification updated specification").unwrap();
    let prod_line = log.find("production updated production").unwrap();
    assert!(spec_line < prod_line);
}

#[tokio::test]
async fn test_listeners_see_agent_writes() {
    let temp = TempDir::new().unwrap();
    let store = mission(&temp).await;

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    store.subscribe(Arc::new(move |name: &str, _: &str| {
        sink.lock().unwrap().push(name.to_string());
    }));

    let model = Arc::new(ScriptedModel::always("# Scope\nOne poem only.\n"));
    let mut agent = agent_for(&store, RoleKind::Specification, &model);
    agent.run_cycle().await;

    let changes = changes.lock().unwrap().clone();
    assert_eq!(changes, vec![SPECIFICATION.to_string(), ACTIVITY_LOG.to_string()]);
}

#[tokio::test]
async fn test_recovery_resets_retries() {
    let temp = TempDir::new().unwrap();
    let store = mission(&temp).await;
    let model = Arc::new(ScriptedModel::new([
        Err(ProposalError::RequestFailed("HTTP 503: overloaded".to_string())),
        Err(ProposalError::Timeout(Duration::from_secs(1))),
        Ok("# Objective\nRecovered.\n".to_string()),
    ]));
    let mut agent = agent_for(&store, RoleKind::Specification, &model);

    assert!(agent.run_cycle().await.is_error());
    assert!(agent.run_cycle().await.is_error());
    assert_eq!(agent.state().snapshot().retries, 2);

    assert!(matches!(agent.run_cycle().await, CycleOutcome::Written { .. }));
    let state = agent.state().snapshot();
    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(state.retries, 0);
    assert!(state.error_message.is_none());
}
