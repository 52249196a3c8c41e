//! Reviewer capacity under the reassignment workflow.
//!
//! These tests drive the engine end to end against a real SQLite file and
//! check that no committed state ever puts a bounded reviewer over capacity:
//! 1. A full reviewer rejects approvals until a slot frees up
//! 2. Concurrent approvals for the last slot admit exactly one learner
//! 3. Super reviewers are never full
//! 4. Registration and profile edits cannot overfill a reviewer either

use std::sync::Arc;

use mentorship_engine::config::EngineConfig;
use mentorship_engine::db::persons;
use mentorship_engine::error::AppError;
use mentorship_engine::models::{
    Capability, CapabilitySet, Decision, NewPerson, Person, ProfileUpdate, RequestState,
};
use mentorship_engine::services::{ChangeRequest, DirectoryScope, SlotLimit};
use mentorship_engine::MentorshipEngine;
use tempfile::tempdir;

async fn open_engine() -> MentorshipEngine {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("capacity.db");
    // Keep the dir alive for the whole test
    std::mem::forget(dir);

    MentorshipEngine::open(&db_path, EngineConfig::default())
        .await
        .unwrap()
}

async fn add(engine: &MentorshipEngine, person: NewPerson) -> Person {
    engine.register_person(person).await.unwrap()
}

fn change(learner: &Person, reviewer: &Person) -> ChangeRequest {
    ChangeRequest {
        learner_id: learner.id,
        requested_reviewer_id: reviewer.id,
        current_reviewer_id: None,
        reason: Some("Schedules line up better".into()),
    }
}

#[tokio::test]
async fn test_full_reviewer_frees_a_slot_then_approval_succeeds() {
    let engine = open_engine().await;
    let admin = add(&engine, NewPerson::named("Admin").with_capability(Capability::Administrator)).await;
    let a = add(
        &engine,
        NewPerson::named("A")
            .with_capability(Capability::Reviewer)
            .with_capacity(2),
    )
    .await;
    let l1 = add(&engine, NewPerson::named("L1").mentored_by(a.id)).await;
    add(&engine, NewPerson::named("L2").mentored_by(a.id)).await;
    let l3 = add(&engine, NewPerson::named("L3")).await;

    let snapshot = engine.directory().capacity_of(a.id).await.unwrap();
    assert_eq!(snapshot.available, SlotLimit::Limited(0));

    let request = engine.workflow().request_change(change(&l3, &a)).await.unwrap();
    assert_eq!(request.state, RequestState::Pending);
    let l3_row = persons::require_person(engine.pool(), l3.id).await.unwrap();
    assert_eq!(l3_row.pending_mentor_link, Some(a.id));

    let err = engine
        .workflow()
        .decide(request.id, admin.id, Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::CapacityExceeded { reviewer_id, capacity: 2 } if reviewer_id == a.id
    ));

    // Nothing moved.
    let stored = engine.workflow().requests_for_learner(l3.id).await.unwrap();
    assert_eq!(stored[0].state, RequestState::Pending);
    assert_eq!(stored[0].decided_at, None);
    let l3_row = persons::require_person(engine.pool(), l3.id).await.unwrap();
    assert_eq!(l3_row.mentor_link, None);
    assert_eq!(l3_row.pending_mentor_link, Some(a.id));

    assert!(engine.release_reviewee(l1.id).await.unwrap());
    let snapshot = engine.directory().capacity_of(a.id).await.unwrap();
    assert_eq!(snapshot.available, SlotLimit::Limited(1));

    let approved = engine
        .workflow()
        .decide(request.id, admin.id, Decision::Approve, Some("Slot opened".into()))
        .await
        .unwrap();
    assert_eq!(approved.state, RequestState::Approved);
    assert_eq!(approved.decided_by, Some(admin.id));

    let l3_row = persons::require_person(engine.pool(), l3.id).await.unwrap();
    assert_eq!(l3_row.mentor_link, Some(a.id));
    assert_eq!(l3_row.pending_mentor_link, None);
    assert_eq!(persons::count_reviewees(engine.pool(), a.id).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_for_last_slot() {
    let engine = Arc::new(open_engine().await);
    let admin = add(&engine, NewPerson::named("Admin").with_capability(Capability::Administrator)).await;
    let associate = add(
        &engine,
        NewPerson::named("Associate")
            .with_capability(Capability::AcademicAssociate)
            .on_campus("north"),
    )
    .await;
    let reviewer = add(
        &engine,
        NewPerson::named("R")
            .with_capability(Capability::Reviewer)
            .with_capacity(1),
    )
    .await;

    let mut request_ids = Vec::new();
    for name in ["L1", "L2", "L3", "L4"] {
        let learner = add(&engine, NewPerson::named(name).on_campus("north")).await;
        let request = engine
            .workflow()
            .request_change(change(&learner, &reviewer))
            .await
            .unwrap();
        request_ids.push(request.id);
    }

    let mut handles = Vec::new();
    for (i, request_id) in request_ids.iter().copied().enumerate() {
        let engine = engine.clone();
        let actor = if i % 2 == 0 { admin.id } else { associate.id };
        handles.push(tokio::spawn(async move {
            engine
                .workflow()
                .decide(request_id, actor, Decision::Approve, None)
                .await
        }));
    }

    let mut approved = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(request) => {
                assert_eq!(request.state, RequestState::Approved);
                approved += 1;
            }
            Err(AppError::CapacityExceeded { .. }) => full += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(approved, 1);
    assert_eq!(full, 3);

    assert_eq!(
        persons::count_reviewees(engine.pool(), reviewer.id).await.unwrap(),
        1
    );
    let pending = engine.workflow().pending_requests().await.unwrap();
    assert_eq!(pending.len(), 3);
}

#[tokio::test]
async fn test_super_reviewer_is_never_full() {
    let engine = open_engine().await;
    let admin = add(&engine, NewPerson::named("Admin").with_capability(Capability::Administrator)).await;
    let sup = add(
        &engine,
        NewPerson::named("Sup")
            .with_capability(Capability::SuperReviewer)
            .with_capacity(0),
    )
    .await;

    for i in 0..5 {
        let learner = add(&engine, NewPerson::named(format!("L{}", i))).await;
        let request = engine.workflow().request_change(change(&learner, &sup)).await.unwrap();
        engine
            .workflow()
            .decide(request.id, admin.id, Decision::Approve, None)
            .await
            .unwrap();
    }

    let snapshot = engine.directory().capacity_of(sup.id).await.unwrap();
    assert_eq!(snapshot.current, 5);
    assert_eq!(snapshot.max, SlotLimit::Unbounded);
    assert!(snapshot.has_room());
}

#[tokio::test]
async fn test_directory_listing_reflects_approvals() {
    let engine = open_engine().await;
    let admin = add(&engine, NewPerson::named("Admin").with_capability(Capability::Administrator)).await;
    let reviewer = add(
        &engine,
        NewPerson::named("R")
            .with_capability(Capability::Reviewer)
            .on_campus("south"),
    )
    .await;
    let learner = add(&engine, NewPerson::named("L").on_campus("south")).await;

    let before = engine
        .directory()
        .list_all_with_capacity(DirectoryScope::campus("south"))
        .await
        .unwrap();
    let row = before.iter().find(|s| s.reviewer_id == reviewer.id).unwrap();
    assert_eq!(row.current, 0);

    let request = engine
        .workflow()
        .request_change(change(&learner, &reviewer))
        .await
        .unwrap();
    engine
        .workflow()
        .decide(request.id, admin.id, Decision::Approve, None)
        .await
        .unwrap();

    // The approval invalidated the cached listing.
    let after = engine
        .directory()
        .list_all_with_capacity(DirectoryScope::campus("south"))
        .await
        .unwrap();
    let row = after.iter().find(|s| s.reviewer_id == reviewer.id).unwrap();
    assert_eq!(row.current, 1);
    assert_eq!(row.reviewee_ids, vec![learner.id]);
}

#[tokio::test]
async fn test_registration_cannot_overfill_reviewer() {
    let engine = open_engine().await;
    let a = add(
        &engine,
        NewPerson::named("A")
            .with_capability(Capability::Reviewer)
            .with_capacity(2),
    )
    .await;
    add(&engine, NewPerson::named("L1").mentored_by(a.id)).await;
    add(&engine, NewPerson::named("L2").mentored_by(a.id)).await;

    let err = engine
        .register_person(NewPerson::named("L3").mentored_by(a.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::CapacityExceeded { reviewer_id, capacity: 2 } if reviewer_id == a.id
    ));

    let snapshot = engine.directory().capacity_of(a.id).await.unwrap();
    assert_eq!(snapshot.current, 2);
    assert_eq!(snapshot.available, SlotLimit::Limited(0));
    assert!(persons::list_persons(engine.pool())
        .await
        .unwrap()
        .iter()
        .all(|p| p.name != "L3"));
}

#[tokio::test]
async fn test_profile_edit_cannot_shrink_below_load() {
    let engine = open_engine().await;
    let a = add(
        &engine,
        NewPerson::named("A")
            .with_capability(Capability::Reviewer)
            .with_capacity(2),
    )
    .await;
    add(&engine, NewPerson::named("L1").mentored_by(a.id)).await;
    add(&engine, NewPerson::named("L2").mentored_by(a.id)).await;

    let err = engine
        .update_profile(
            a.id,
            ProfileUpdate {
                capacity_override: Some(Some(1)),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::CapacityExceeded { reviewer_id, capacity: 1 } if reviewer_id == a.id
    ));

    let snapshot = engine.directory().capacity_of(a.id).await.unwrap();
    assert_eq!(snapshot.max, SlotLimit::Limited(2));
    assert_eq!(snapshot.current, 2);

    // Raising the limit is always allowed.
    let raised = engine
        .update_profile(
            a.id,
            ProfileUpdate {
                capacity_override: Some(Some(3)),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(raised.capacity_override, Some(3));
}

#[tokio::test]
async fn test_losing_super_reviewer_role_checks_load() {
    let engine = open_engine().await;
    let admin = add(&engine, NewPerson::named("Admin").with_capability(Capability::Administrator)).await;
    let sup = add(&engine, NewPerson::named("Sup").with_capability(Capability::SuperReviewer)).await;

    for i in 0..3 {
        let learner = add(&engine, NewPerson::named(format!("L{}", i))).await;
        let request = engine.workflow().request_change(change(&learner, &sup)).await.unwrap();
        engine
            .workflow()
            .decide(request.id, admin.id, Decision::Approve, None)
            .await
            .unwrap();
    }

    let err = engine
        .update_profile(
            sup.id,
            ProfileUpdate {
                capabilities: Some(CapabilitySet::new().with(Capability::Reviewer)),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::CapacityExceeded { reviewer_id, capacity: 2 } if reviewer_id == sup.id
    ));

    let snapshot = engine.directory().capacity_of(sup.id).await.unwrap();
    assert_eq!(snapshot.max, SlotLimit::Unbounded);
    assert_eq!(snapshot.current, 3);
}
