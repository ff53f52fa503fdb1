//! End-to-end election sagas over the in-memory substrate and simulated ledger

use evote_saga_engine::steps::calls;
use evote_saga_engine::{
    ElectionService, InMemoryJobQueue, JobQueue, QueueConfig, RawLedgerFailure, SimulatedLedger,
    SimulatedRegistrar, Worker, WorkerConfig,
};
use evote_saga_types::{
    Candidate, ElectionRequest, ElectionStep, JobId, JobState, Participant, Progress,
};
use std::sync::Arc;

struct Harness {
    ledger: Arc<SimulatedLedger>,
    registrar: Arc<SimulatedRegistrar>,
    queue: Arc<InMemoryJobQueue>,
    service: ElectionService,
    worker: Worker,
}

impl Harness {
    fn new() -> Self {
        let ledger = Arc::new(SimulatedLedger::new().unwrap());
        let registrar = Arc::new(SimulatedRegistrar::new());
        let queue = Arc::new(InMemoryJobQueue::with_attempts(5));
        let service = ElectionService::new(queue.clone(), QueueConfig::default());
        let worker = Worker::new(
            queue.clone(),
            ledger.clone(),
            registrar.clone(),
            WorkerConfig::default(),
        );
        Self {
            ledger,
            registrar,
            queue,
            service,
            worker,
        }
    }

    async fn state(&self, job_id: &JobId) -> JobState {
        self.queue.get(job_id).await.unwrap().unwrap().state
    }
}

fn election() -> ElectionRequest {
    ElectionRequest {
        election_name: "Student Council 2026".into(),
        election_date: vec!["2026-11-01".into(), "2026-11-02".into()],
        election_location: "Main Hall".into(),
        candidate_list: vec![
            Candidate::new("Ada", "Runs on infrastructure"),
            Candidate::new("Alan", "Runs on computation"),
        ],
        participant_list: vec![
            Participant::new(101, "Grace"),
            Participant::new(102, "Edsger"),
            Participant::new(103, "Barbara"),
        ],
    }
}

#[tokio::test]
async fn full_election_reaches_finish() {
    let h = Harness::new();
    let job_id = h.service.enqueue_workflow(election(), "admin").await.unwrap();

    h.worker.run_until_idle().await.unwrap();

    assert_eq!(
        h.service.get_progress(&job_id).await.unwrap(),
        Progress { percent: 100, is_terminal: true }
    );
    let ctx = h.service.get_workflow(&job_id).await.unwrap();
    assert!(!ctx.election_id().unwrap().is_empty());
    assert_eq!(ctx.derived.registered_identities.len(), 3);
    assert_eq!(ctx.terminal_status.as_deref(), Some("ballots created"));
    assert_eq!(h.state(&job_id).await, JobState::Completed);

    // One ledger transaction per writing step
    assert_eq!(h.ledger.committed_ids().len(), 3);
    for step in [
        ElectionStep::CreateElection,
        ElectionStep::CreateCandidates,
        ElectionStep::CreateBallots,
    ] {
        assert_eq!(ctx.attempt_for(step).identity_count(), 1, "{step}");
    }
}

#[tokio::test]
async fn rejected_election_halts_at_first_step() {
    let h = Harness::new();
    h.ledger.fail_next(
        calls::CREATE_ELECTION,
        RawLedgerFailure::message(
            "No valid responses from any peers. Errors:\n peer=peer0, status=500, message=election already exists",
        ),
    );
    let job_id = h.service.enqueue_workflow(election(), "admin").await.unwrap();

    h.worker.run_until_idle().await.unwrap();

    assert_eq!(
        h.service.get_progress(&job_id).await.unwrap(),
        Progress { percent: 20, is_terminal: false }
    );
    let ctx = h.service.get_workflow(&job_id).await.unwrap();
    assert_eq!(ctx.step, ElectionStep::CreateElection);
    assert!(ctx.terminal_status.is_none());

    let record = h.queue.get(&job_id).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Failed);
    assert!(record
        .failed_reason
        .unwrap()
        .contains("election already exists"));
    assert!(h.ledger.committed_ids().is_empty());
}

#[tokio::test]
async fn timeout_is_resumed_with_same_transaction() {
    let h = Harness::new();
    h.ledger.fail_next(
        calls::CREATE_ELECTION,
        RawLedgerFailure::timed_out("request timed out waiting for commit"),
    );
    let job_id = h.service.enqueue_workflow(election(), "admin").await.unwrap();

    h.worker.run_until_idle().await.unwrap();

    let ctx = h.service.get_workflow(&job_id).await.unwrap();
    assert_eq!(ctx.step, ElectionStep::Finish);
    let attempt = ctx.attempt_for(ElectionStep::CreateElection);
    assert_eq!(attempt.history.len(), 1);

    let sent: Vec<_> = h
        .ledger
        .submissions()
        .into_iter()
        .filter(|s| s.call_name == calls::CREATE_ELECTION)
        .collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].transaction_id, sent[1].transaction_id);
    assert_eq!(Some(sent[0].transaction_id.as_str()), attempt.logical_id());
}

#[tokio::test]
async fn failed_registration_does_not_stop_saga() {
    let h = Harness::new();
    let failing = election().participant_list[1].content_hash().unwrap();
    h.registrar.fail_for(&failing);
    let job_id = h.service.enqueue_workflow(election(), "admin").await.unwrap();

    h.worker.run_until_idle().await.unwrap();

    let ctx = h.service.get_workflow(&job_id).await.unwrap();
    assert_eq!(ctx.step, ElectionStep::Finish);
    assert_eq!(ctx.terminal_status.as_deref(), Some("ballots created"));
    assert_eq!(ctx.derived.registered_identities.len(), 2);
    assert_eq!(h.registrar.registered_count(), 2);

    // Ballots still cover every participant
    let ballots = h
        .ledger
        .submissions()
        .into_iter()
        .find(|s| s.call_name == calls::CREATE_BALLOT)
        .unwrap();
    let batch: serde_json::Value = serde_json::from_str(&ballots.args[0]).unwrap();
    assert_eq!(batch["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn transient_failure_mints_new_transaction_for_step() {
    let h = Harness::new();
    h.ledger.fail_next(
        calls::CREATE_CANDIDATE,
        RawLedgerFailure::message("14 UNAVAILABLE: failed to connect to all addresses"),
    );
    let job_id = h.service.enqueue_workflow(election(), "admin").await.unwrap();

    h.worker.run_until_idle().await.unwrap();

    let ctx = h.service.get_workflow(&job_id).await.unwrap();
    assert!(ctx.is_terminal());
    let attempt = ctx.attempt_for(ElectionStep::CreateCandidates);
    assert_eq!(attempt.history.len(), 2);
    assert_ne!(attempt.history[0], attempt.history[1]);
}

#[tokio::test]
async fn corrupted_step_cursor_fails_job() {
    let h = Harness::new();
    let job_id = h.service.enqueue_workflow(election(), "admin").await.unwrap();
    let mut data = h.queue.get(&job_id).await.unwrap().unwrap().data;
    data["step"] = serde_json::json!(42);
    h.queue.persist(&job_id, data).await.unwrap();

    h.worker.run_until_idle().await.unwrap();

    let record = h.queue.get(&job_id).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Failed);
    assert_eq!(record.attempts_made, 1);
    assert!(h.ledger.submissions().is_empty());
}

#[tokio::test]
async fn single_submission_summary() {
    let h = Harness::new();
    let job_id = h
        .service
        .enqueue_submission("voter-1", "CastVote", vec!["ballot-1".into(), "cand-1".into()])
        .await
        .unwrap();

    h.worker.run_until_idle().await.unwrap();

    let summary = h.service.get_job_summary(&job_id).await.unwrap();
    assert_eq!(summary.tx_ids.len(), 1);
    assert!(summary.tx_payload.unwrap().contains(&summary.tx_ids[0]));
    assert!(summary.tx_error.is_none());
}

#[tokio::test]
async fn single_submission_rejection_summary() {
    let h = Harness::new();
    h.ledger.fail_next(
        "ReadBallot",
        RawLedgerFailure::message("You dont have access to read Ballot b7"),
    );
    let job_id = h
        .service
        .enqueue_submission("voter-1", "ReadBallot", vec!["b7".into()])
        .await
        .unwrap();

    h.worker.run_until_idle().await.unwrap();

    let summary = h.service.get_job_summary(&job_id).await.unwrap();
    assert_eq!(summary.tx_ids.len(), 1);
    assert_eq!(summary.tx_payload, None);
    assert_eq!(
        summary.tx_error.as_deref(),
        Some("You dont have access to read Ballot b7")
    );
    assert_eq!(h.state(&job_id).await, JobState::Completed);
}
