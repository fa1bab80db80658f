use super::common::*;
use std::sync::Arc;
use std::thread;

use crate::workflows::approvals::{
    ApprovalError, ApprovalEventKind, ApprovalStatus, ApprovalStore, ApprovalWorkflowService,
    ExpenseClaim, FixedClock, InMemoryDefinitionStore, MemoryApprovalStore, PerdiemRequest,
    RepositoryError, StepTemplate, SubjectStatus, TransitionOutcome, TravelRequest, WorkflowKind,
};

#[test]
fn initialize_opens_first_step_and_binds_instance() {
    let (service, _, _) = build_travel_service(&["manager", "finance"]);
    service
        .register(travel_request("tr-100", Some("BC-100")))
        .expect("registers");

    let view = service.initialize(&subject("tr-100")).expect("initializes");

    assert_eq!(view.status, SubjectStatus::InReview);
    assert_eq!(
        view.statuses(),
        vec![ApprovalStatus::Open, ApprovalStatus::Pending]
    );
    assert_eq!(view.current_step, Some(1));
    let binding = view.binding.expect("bound to an instance");
    assert_eq!(binding.definition_name, "Travel approval");
    assert_eq!(binding.bound_at, fixed_time());
}

#[test]
fn two_step_chain_approves_in_order() {
    let (service, _, notifier) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-101", Some("BC-101"));

    let first = service.approve(&id, &actor("manager")).expect("manager approves");
    assert_eq!(
        first.outcome,
        TransitionOutcome::Advanced {
            step_order: 1,
            next_step: 2,
            next_approver: actor("finance"),
        }
    );
    assert_eq!(
        first.approvals.statuses(),
        vec![ApprovalStatus::Approved, ApprovalStatus::Open]
    );
    assert_eq!(first.approvals.status, SubjectStatus::InReview);

    let second = service.approve(&id, &actor("finance")).expect("finance approves");
    assert_eq!(second.outcome, TransitionOutcome::Approved { step_order: 2 });
    assert_eq!(
        second.approvals.statuses(),
        vec![ApprovalStatus::Approved, ApprovalStatus::Approved]
    );
    assert_eq!(second.approvals.status, SubjectStatus::Approved);
    assert_eq!(second.approvals.approved_by, Some(actor("finance")));
    assert_eq!(second.approvals.approved_at, Some(fixed_time()));
    assert_eq!(second.approvals.current_step, None);

    let events = notifier.events();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].kind,
        ApprovalEventKind::StepAdvanced {
            next_step: 2,
            next_approver: actor("finance"),
        }
    );
    assert_eq!(events[1].kind, ApprovalEventKind::SubjectApproved);
    assert_eq!(events[1].workflow_kind, WorkflowKind::TravelRequest);
}

#[test]
fn long_chain_keeps_a_single_open_record() {
    let approvers = ["a1", "a2", "a3", "a4", "a5"];
    let (service, _, _) = build_travel_service(&approvers);
    let id = submitted(&service, "tr-102", Some("BC-102"));

    for (index, approver) in approvers.iter().enumerate() {
        let report = service.approve(&id, &actor(approver)).expect("approves");
        let open = report
            .approvals
            .statuses()
            .into_iter()
            .filter(|status| *status == ApprovalStatus::Open)
            .count();
        let approved = report
            .approvals
            .statuses()
            .into_iter()
            .filter(|status| *status == ApprovalStatus::Approved)
            .count();
        assert_eq!(approved, index + 1);
        let expected_open = usize::from(index + 1 < approvers.len());
        assert_eq!(open, expected_open);
    }

    assert_eq!(
        service.get_status(&id).expect("status").status,
        SubjectStatus::Approved
    );
}

#[test]
fn same_approver_on_consecutive_steps_acts_twice() {
    let (service, _, _) = build_travel_service(&["manager", "manager"]);
    let id = submitted(&service, "tr-103", Some("BC-103"));

    service.approve(&id, &actor("manager")).expect("first step");
    let report = service.approve(&id, &actor("manager")).expect("second step");
    assert_eq!(report.outcome, TransitionOutcome::Approved { step_order: 2 });
}

#[test]
fn out_of_turn_approval_changes_nothing() {
    let (service, _, notifier) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-104", Some("BC-104"));
    let before = ledger(&service, &id);

    match service.approve(&id, &actor("finance")) {
        Err(ApprovalError::NotYourTurn { subject, actor: who }) => {
            assert_eq!(subject, id);
            assert_eq!(who, actor("finance"));
        }
        other => panic!("expected not-your-turn, got {other:?}"),
    }
    match service.reject(&id, &actor("stranger"), "not mine") {
        Err(ApprovalError::NotYourTurn { .. }) => {}
        other => panic!("expected not-your-turn, got {other:?}"),
    }

    assert_eq!(ledger(&service, &id), before);
    assert!(notifier.events().is_empty());
}

#[test]
fn acting_twice_reports_already_acted() {
    let (service, _, _) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-105", Some("BC-105"));
    service.approve(&id, &actor("manager")).expect("approves");

    match service.approve(&id, &actor("manager")) {
        Err(ApprovalError::AlreadyActed { .. }) => {}
        other => panic!("expected already-acted, got {other:?}"),
    }
    match service.reject(&id, &actor("manager"), "changed my mind") {
        Err(ApprovalError::AlreadyActed { .. }) => {}
        other => panic!("expected already-acted, got {other:?}"),
    }
}

#[test]
fn rejection_stops_chain_and_keeps_other_records() {
    let (service, _, notifier) = build_travel_service(&["manager", "finance", "treasury"]);
    let id = submitted(&service, "tr-106", Some("BC-106"));
    service.approve(&id, &actor("manager")).expect("approves");

    let report = service
        .reject(&id, &actor("finance"), "  Budget exhausted  ")
        .expect("rejects");

    assert_eq!(
        report.outcome,
        TransitionOutcome::Rejected {
            step_order: 2,
            reason: "Budget exhausted".to_string(),
        }
    );
    assert_eq!(
        report.approvals.statuses(),
        vec![
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
            ApprovalStatus::Pending
        ]
    );
    let rejected = report.approvals.step(2).expect("step two");
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Budget exhausted"));
    assert_eq!(rejected.rejected_at, Some(fixed_time()));

    assert_eq!(report.approvals.status, SubjectStatus::Rejected);
    assert_eq!(report.approvals.rejected_by, Some(actor("finance")));
    assert_eq!(
        report.approvals.rejection_reason.as_deref(),
        Some("Budget exhausted")
    );

    match service.approve(&id, &actor("treasury")) {
        Err(ApprovalError::NotYourTurn { .. }) => {}
        other => panic!("expected not-your-turn after rejection, got {other:?}"),
    }

    let last = notifier.events().pop().expect("event published");
    assert_eq!(
        last.kind,
        ApprovalEventKind::SubjectRejected {
            reason: "Budget exhausted".to_string(),
        }
    );
}

#[test]
fn blank_rejection_reason_is_refused_before_lookup() {
    let (service, _, _) = build_travel_service(&["manager"]);

    match service.reject(&subject("does-not-exist"), &actor("manager"), "   ") {
        Err(ApprovalError::Validation { fields, .. }) => assert_eq!(fields, vec!["reason"]),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn final_approval_requires_budget_code() {
    let (service, _, notifier) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-107", None);
    service.approve(&id, &actor("manager")).expect("step one");
    let before = ledger(&service, &id);

    match service.approve(&id, &actor("finance")) {
        Err(ApprovalError::Validation { fields, subject, .. }) => {
            assert_eq!(fields, vec!["budget_code"]);
            assert_eq!(subject, id);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(ledger(&service, &id), before);
    assert_eq!(notifier.events().len(), 1);

    service
        .store()
        .transact(&id, |ledger| {
            ledger.subject.budget_code = Some("BC-107".to_string());
            Ok::<_, RepositoryError>(())
        })
        .expect("budget code recorded");

    let report = service.approve(&id, &actor("finance")).expect("finance approves");
    assert_eq!(report.approvals.status, SubjectStatus::Approved);
}

#[test]
fn intermediate_steps_do_not_check_final_fields() {
    let (service, _, _) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-108", None);

    let report = service.approve(&id, &actor("manager")).expect("step one");
    assert!(matches!(report.outcome, TransitionOutcome::Advanced { .. }));
}

#[test]
fn expense_claims_need_a_cost_center() {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    register_active(
        &definitions,
        WorkflowKind::ExpenseClaim,
        "Claims",
        &["finance"],
    );
    let service = service_with::<ExpenseClaim>(definitions, Arc::new(MemoryNotifier::default()));
    service.register(expense_claim("ec-1", None)).expect("registers");
    service.initialize(&subject("ec-1")).expect("initializes");

    match service.approve(&subject("ec-1"), &actor("finance")) {
        Err(ApprovalError::Validation { fields, .. }) => assert_eq!(fields, vec!["cost_center"]),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn perdiem_requests_need_a_daily_rate() {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    register_active(&definitions, WorkflowKind::PerDiem, "Per diem", &["manager"]);
    let service =
        service_with::<PerdiemRequest>(definitions, Arc::new(MemoryNotifier::default()));
    service.register(perdiem_request("pd-1", 0)).expect("registers");
    service.register(perdiem_request("pd-2", 9_500)).expect("registers");
    service.initialize(&subject("pd-1")).expect("initializes");
    service.initialize(&subject("pd-2")).expect("initializes");

    match service.approve(&subject("pd-1"), &actor("manager")) {
        Err(ApprovalError::Validation { fields, .. }) => assert_eq!(fields, vec!["daily_rate"]),
        other => panic!("expected validation error, got {other:?}"),
    }
    let report = service
        .approve(&subject("pd-2"), &actor("manager"))
        .expect("approves");
    assert_eq!(report.approvals.status, SubjectStatus::Approved);
}

#[test]
fn kinds_resolve_their_own_definitions() {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    register_active(
        &definitions,
        WorkflowKind::TravelRequest,
        "Travel",
        &["manager"],
    );
    let claims = service_with::<ExpenseClaim>(definitions, Arc::new(MemoryNotifier::default()));
    claims
        .register(expense_claim("ec-2", Some("CC-1")))
        .expect("registers");

    match claims.initialize(&subject("ec-2")) {
        Err(ApprovalError::NoActiveWorkflow { kind, tenant: scope }) => {
            assert_eq!(kind, WorkflowKind::ExpenseClaim);
            assert_eq!(scope, tenant());
        }
        other => panic!("expected no-active-workflow, got {other:?}"),
    }
}

#[test]
fn initialize_without_active_definition_leaves_draft() {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    let service =
        service_with::<TravelRequest>(definitions, Arc::new(MemoryNotifier::default()));
    service
        .register(travel_request("tr-109", Some("BC-109")))
        .expect("registers");

    match service.initialize(&subject("tr-109")) {
        Err(ApprovalError::NoActiveWorkflow { .. }) => {}
        other => panic!("expected no-active-workflow, got {other:?}"),
    }
    let view = service.get_status(&subject("tr-109")).expect("status");
    assert_eq!(view.status, SubjectStatus::Draft);
    assert!(view.steps.is_empty());
    assert!(view.binding.is_none());
}

#[test]
fn initialize_with_empty_definition_reports_missing_steps() {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    let definition = register_active(&definitions, WorkflowKind::TravelRequest, "Empty", &[]);
    let service =
        service_with::<TravelRequest>(definitions, Arc::new(MemoryNotifier::default()));
    service
        .register(travel_request("tr-110", Some("BC-110")))
        .expect("registers");

    match service.initialize(&subject("tr-110")) {
        Err(ApprovalError::NoStepsConfigured { definition: id }) => {
            assert_eq!(id, definition.id)
        }
        other => panic!("expected no-steps-configured, got {other:?}"),
    }
    assert_eq!(
        service.get_status(&subject("tr-110")).expect("status").status,
        SubjectStatus::Draft
    );
}

#[test]
fn initialize_refuses_subjects_already_in_review() {
    let (service, _, _) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-111", Some("BC-111"));
    service.approve(&id, &actor("manager")).expect("approves");
    let before = ledger(&service, &id);

    match service.initialize(&id) {
        Err(ApprovalError::InvalidSubjectState {
            status, operation, ..
        }) => {
            assert_eq!(status, SubjectStatus::InReview);
            assert_eq!(operation, "initialize");
        }
        other => panic!("expected invalid state, got {other:?}"),
    }
    assert_eq!(ledger(&service, &id), before);
}

#[test]
fn rejected_subjects_can_be_resubmitted() {
    let (service, _, _) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-112", Some("BC-112"));
    let first_instance = ledger(&service, &id)
        .subject
        .approval
        .binding
        .expect("bound")
        .instance_id;
    service
        .reject(&id, &actor("manager"), "Wrong dates")
        .expect("rejects");

    let view = service.initialize(&id).expect("resubmits");
    assert_eq!(view.status, SubjectStatus::InReview);
    assert_eq!(
        view.statuses(),
        vec![ApprovalStatus::Open, ApprovalStatus::Pending]
    );
    assert!(view.rejected_by.is_none());
    assert!(view.rejection_reason.is_none());
    let binding = view.binding.expect("bound");
    assert_ne!(binding.instance_id, first_instance);
}

#[test]
fn reset_rebuilds_a_fresh_chain() {
    let (service, _, _) = build_travel_service(&["manager", "finance", "treasury"]);
    let id = submitted(&service, "tr-113", Some("BC-113"));
    service.approve(&id, &actor("manager")).expect("approves");

    let first = service.reset(&id).expect("resets");
    assert_eq!(
        first.statuses(),
        vec![
            ApprovalStatus::Open,
            ApprovalStatus::Pending,
            ApprovalStatus::Pending
        ]
    );
    assert!(first.steps.iter().all(|step| step.approved_at.is_none()));
    assert_eq!(first.status, SubjectStatus::InReview);

    let second = service.reset(&id).expect("resets again");
    assert_eq!(second.statuses(), first.statuses());
    assert_eq!(ledger(&service, &id).records.len(), 3);
    assert_ne!(
        second.binding.expect("bound").instance_id,
        first.binding.expect("bound").instance_id
    );
}

#[test]
fn reset_follows_the_currently_active_definition() {
    let (service, definitions, _) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-114", Some("BC-114"));

    let original = definitions
        .definitions(&tenant())
        .expect("lists")
        .pop()
        .expect("one definition");
    definitions.deactivate(&original.id).expect("deactivates");
    let replacement = register_active(
        &definitions,
        WorkflowKind::TravelRequest,
        "Travel approval v2",
        &["manager", "finance", "treasury"],
    );

    let view = service.reset(&id).expect("resets");
    assert_eq!(view.steps.len(), 3);
    let binding = view.binding.expect("bound");
    assert_eq!(binding.definition_id, replacement.id);
    assert_eq!(binding.definition_name, "Travel approval v2");
}

#[test]
fn failed_reset_keeps_the_existing_chain() {
    let (service, definitions, _) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-115", Some("BC-115"));
    service.approve(&id, &actor("manager")).expect("approves");
    let before = ledger(&service, &id);

    for definition in definitions.definitions(&tenant()).expect("lists") {
        definitions.deactivate(&definition.id).expect("deactivates");
    }

    match service.reset(&id) {
        Err(ApprovalError::NoActiveWorkflow { .. }) => {}
        other => panic!("expected no-active-workflow, got {other:?}"),
    }
    assert_eq!(ledger(&service, &id), before);
}

#[test]
fn approved_subjects_cannot_be_reset() {
    let (service, _, _) = build_travel_service(&["manager"]);
    let id = submitted(&service, "tr-116", Some("BC-116"));
    service.approve(&id, &actor("manager")).expect("approves");

    match service.reset(&id) {
        Err(ApprovalError::InvalidSubjectState {
            status, operation, ..
        }) => {
            assert_eq!(status, SubjectStatus::Approved);
            assert_eq!(operation, "reset");
        }
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn running_instances_keep_their_copied_steps() {
    let (service, definitions, _) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-117", Some("BC-117"));
    let definition = definitions
        .definitions(&tenant())
        .expect("lists")
        .pop()
        .expect("one definition");

    definitions
        .replace_steps(
            &definition.id,
            vec![StepTemplate::new(1, "treasury")],
        )
        .expect("replaces");

    let view = service.get_status(&id).expect("status");
    assert_eq!(view.steps.len(), 2);
    assert_eq!(view.steps[0].approver, actor("manager"));
    service.approve(&id, &actor("manager")).expect("old chain still applies");
}

#[test]
fn notification_failures_do_not_roll_back() {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    register_active(
        &definitions,
        WorkflowKind::TravelRequest,
        "Travel",
        &["manager"],
    );
    let service = ApprovalWorkflowService::<TravelRequest, _, _, _>::with_clock(
        Arc::new(MemoryApprovalStore::<TravelRequest>::default()),
        definitions,
        Arc::new(FailingNotifier),
        Arc::new(FixedClock(fixed_time())),
    );
    service
        .register(travel_request("tr-118", Some("BC-118")))
        .expect("registers");
    service.initialize(&subject("tr-118")).expect("initializes");

    let report = service
        .approve(&subject("tr-118"), &actor("manager"))
        .expect("transition commits despite notifier failure");
    assert_eq!(report.approvals.status, SubjectStatus::Approved);
    assert_eq!(
        service
            .get_status(&subject("tr-118"))
            .expect("status")
            .status,
        SubjectStatus::Approved
    );
}

#[test]
fn storage_failures_surface_as_storage_errors() {
    let definitions = Arc::new(InMemoryDefinitionStore::default());
    let service = ApprovalWorkflowService::<TravelRequest, _, _, _>::new(
        Arc::new(UnavailableStore),
        definitions,
        Arc::new(MemoryNotifier::default()),
    );

    match service.approve(&subject("tr-119"), &actor("manager")) {
        Err(ApprovalError::Storage(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected storage failure, got {other:?}"),
    }
    match service.get_status(&subject("tr-119")) {
        Err(error) => assert_eq!(error.code(), "storage_failure"),
        Ok(view) => panic!("expected storage failure, got {view:?}"),
    }
}

#[test]
fn unknown_subjects_are_not_found() {
    let (service, _, _) = build_travel_service(&["manager"]);
    match service.approve(&subject("missing"), &actor("manager")) {
        Err(ApprovalError::NotFound(id)) => assert_eq!(id, subject("missing")),
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[test]
fn register_discards_supplied_approval_data_and_rejects_duplicates() {
    let (service, _, _) = build_travel_service(&["manager"]);
    let mut request = travel_request("tr-120", Some("BC-120"));
    request.approval.status = SubjectStatus::Approved;
    request.approval.approved_by = Some(actor("intruder"));

    let view = service.register(request.clone()).expect("registers");
    assert_eq!(view.status, SubjectStatus::Draft);
    assert!(view.approved_by.is_none());

    match service.register(request) {
        Err(ApprovalError::Storage(RepositoryError::Conflict)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn racing_approvals_on_one_subject_commit_once() {
    let (service, _, notifier) = build_travel_service(&["manager", "finance"]);
    let id = submitted(&service, "tr-121", Some("BC-121"));
    let service = Arc::new(service);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = id.clone();
                scope.spawn(move || service.approve(&id, &actor("manager")))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let committed = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(committed, 1);
    assert!(results.iter().all(|result| matches!(
        result,
        Ok(_) | Err(ApprovalError::AlreadyActed { .. })
    )));
    assert_eq!(notifier.events().len(), 1);
    assert_eq!(
        service.get_status(&id).expect("status").statuses(),
        vec![ApprovalStatus::Approved, ApprovalStatus::Open]
    );
}

#[test]
fn approvals_on_different_subjects_proceed_independently() {
    let (service, _, _) = build_travel_service(&["manager"]);
    let ids: Vec<_> = (0..6)
        .map(|index| submitted(&service, &format!("tr-2{index:02}"), Some("BC-200")))
        .collect();
    let service = Arc::new(service);

    thread::scope(|scope| {
        for id in &ids {
            let service = Arc::clone(&service);
            scope.spawn(move || {
                service
                    .approve(id, &actor("manager"))
                    .expect("independent approval succeeds");
            });
        }
    });

    for id in &ids {
        assert_eq!(
            service.get_status(id).expect("status").status,
            SubjectStatus::Approved
        );
    }
}

#[test]
fn pending_for_lists_subjects_waiting_on_an_actor() {
    let (service, _, _) = build_travel_service(&["manager", "finance"]);
    let first = submitted(&service, "tr-130", Some("BC-130"));
    let second = submitted(&service, "tr-131", Some("BC-131"));

    assert_eq!(
        service.pending_for(&actor("manager")).expect("inbox"),
        vec![first.clone(), second.clone()]
    );
    assert!(service
        .pending_for(&actor("finance"))
        .expect("inbox")
        .is_empty());

    service.approve(&first, &actor("manager")).expect("approves");
    assert_eq!(
        service.pending_for(&actor("manager")).expect("inbox"),
        vec![second]
    );
    assert_eq!(
        service.pending_for(&actor("finance")).expect("inbox"),
        vec![first]
    );
}

#[test]
fn approve_then_reject_then_reset_round_trip() {
    let (service, _, _) = build_travel_service(&["approver-a", "approver-b"]);
    let id = submitted(&service, "tr-140", Some("BC-140"));

    service.approve(&id, &actor("approver-a")).expect("A approves");
    let rejected = service
        .reject(&id, &actor("approver-b"), "budget too high")
        .expect("B rejects");
    assert_eq!(rejected.approvals.status, SubjectStatus::Rejected);
    assert_eq!(
        rejected.approvals.rejection_reason.as_deref(),
        Some("budget too high")
    );
    assert!(rejected.approvals.approved_by.is_none());
    assert_eq!(
        rejected.approvals.statuses(),
        vec![ApprovalStatus::Approved, ApprovalStatus::Rejected]
    );

    let view = service.reset(&id).expect("resets");
    assert_eq!(view.steps[0].approver, actor("approver-a"));
    assert_eq!(
        view.statuses(),
        vec![ApprovalStatus::Open, ApprovalStatus::Pending]
    );
    assert_eq!(view.status, SubjectStatus::InReview);
    assert!(view.rejected_by.is_none());
}
