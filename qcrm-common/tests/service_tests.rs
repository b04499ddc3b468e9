//! CRM service layer against an in-memory database

use chrono::{Duration, TimeZone, Utc};
use qcrm_common::crm::{
    ActivityInput, ActivityStatus, CompanyInput, ContactInput, CrmService, DealInput, DealStatus,
    DealProductInput, Entity, EntityKind, EntityPayload, ListFilter, Paging, ProductInput,
    SortSpec,
};
use qcrm_common::db::{init_database, init_memory_database, profiles, RetryPolicy};
use qcrm_common::qualification::{
    AnswersInput, Classification, QualificationSession, ScoringConfig, SessionStart,
};
use qcrm_common::time::LocalWindows;
use qcrm_common::{Error, Identity, Role};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, SqliteConnection};
use uuid::Uuid;

async fn service() -> CrmService {
    CrmService::new(init_memory_database().await.unwrap())
}

fn rep() -> Identity {
    Identity::new(Uuid::new_v4(), Role::Rep)
}

async fn create_company(svc: &CrmService, who: &Identity, name: &str) -> Entity {
    svc.upsert(
        who,
        EntityPayload::Company(CompanyInput {
            name: Some(name.to_string()),
            ..Default::default()
        }),
    )
    .await
    .unwrap()
}

async fn create_deal(svc: &CrmService, who: &Identity, name: &str, stage: &str, value: f64) {
    svc.upsert(
        who,
        EntityPayload::Deal(DealInput {
            name: Some(name.to_string()),
            stage: Some(stage.to_string()),
            value: Some(value),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
}

fn validation_fields(err: Error) -> Vec<String> {
    match err {
        Error::Validation(v) => v.fields().into_iter().map(str::to_string).collect(),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upsert_then_list_round_trip() {
    let svc = service().await;
    let who = rep();

    let created = svc
        .upsert(
            &who,
            EntityPayload::Contact(ContactInput {
                first_name: Some("Dana".into()),
                last_name: Some("Reyes".into()),
                email: Some("dana@acme.io".into()),
                job_title: Some("CTO".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let listed = svc
        .list(EntityKind::Contact, &ListFilter::search("reyes"))
        .await
        .unwrap();
    assert_eq!(listed, vec![created.clone()]);

    match created {
        Entity::Contact(contact) => {
            assert_eq!(contact.email.as_deref(), Some("dana@acme.io"));
            assert_eq!(contact.job_title.as_deref(), Some("CTO"));
            assert_eq!(contact.assigned_to, Some(who.user_id));
            assert_eq!(contact.created_by, Some(who.user_id));
        }
        other => panic!("expected contact, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_overlays_stored_fields() {
    let svc = service().await;
    let who = rep();
    let created = svc
        .upsert(
            &who,
            EntityPayload::Company(CompanyInput {
                name: Some("Acme".into()),
                industry: Some("Manufacturing".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let updated = svc
        .upsert(
            &who,
            EntityPayload::Company(CompanyInput {
                guid: Some(created.guid()),
                employee_count: Some(120),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    match (created, updated) {
        (Entity::Company(before), Entity::Company(after)) => {
            assert_eq!(after.guid, before.guid);
            assert_eq!(after.name, "Acme");
            assert_eq!(after.industry.as_deref(), Some("Manufacturing"));
            assert_eq!(after.employee_count, Some(120));
            assert_eq!(after.created_at, before.created_at);
            assert!(after.updated_at >= before.updated_at);
        }
        other => panic!("unexpected entities {:?}", other),
    }
    assert_eq!(
        svc.count(EntityKind::Company, &ListFilter::default())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_update_of_missing_row_is_not_found() {
    let svc = service().await;
    let err = svc
        .upsert(
            &rep(),
            EntityPayload::Deal(DealInput {
                guid: Some(Uuid::new_v4()),
                name: Some("Ghost".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_every_violation_reported() {
    let svc = service().await;
    let err = svc
        .upsert(
            &rep(),
            EntityPayload::Company(CompanyInput {
                name: Some("   ".into()),
                annual_revenue: Some(-10.0),
                employee_count: Some(-1),
                email: Some("nope".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();

    let fields = validation_fields(err);
    for field in ["name", "annual_revenue", "employee_count", "email"] {
        assert!(fields.iter().any(|f| f == field), "missing {}", field);
    }
    assert_eq!(
        svc.count(EntityKind::Company, &ListFilter::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_wrong_json_type_reported_with_other_violations() {
    let svc = service().await;
    let payload = EntityPayload::from_json(
        EntityKind::Deal,
        serde_json::json!({"value": "lots", "stage": "bogus", "probability": 400}),
    )
    .unwrap();
    let err = svc.upsert(&rep(), payload).await.unwrap_err();

    let fields = validation_fields(err);
    for field in ["value", "name", "stage", "probability"] {
        assert!(fields.iter().any(|f| f == field), "missing {}", field);
    }
}

#[tokio::test]
async fn test_deal_stage_drives_status_on_update() {
    let svc = service().await;
    let who = rep();
    let deal = svc
        .upsert(
            &who,
            EntityPayload::Deal(DealInput {
                name: Some("Renewal".into()),
                value: Some(12_000.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let won = svc
        .upsert(
            &who,
            EntityPayload::Deal(DealInput {
                guid: Some(deal.guid()),
                stage: Some("closed-won".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    match won {
        Entity::Deal(d) => {
            assert_eq!(d.status, DealStatus::Won);
            assert_eq!(d.probability, 100);
            assert_eq!(d.value, 12_000.0);
        }
        other => panic!("expected deal, got {:?}", other),
    }

    let err = svc
        .upsert(
            &who,
            EntityPayload::Deal(DealInput {
                guid: Some(deal.guid()),
                status: Some("lost".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["status"]);
}

#[tokio::test]
async fn test_activity_completion_stamp_follows_status() {
    let svc = service().await;
    let who = rep();
    let activity = svc
        .upsert(
            &who,
            EntityPayload::Activity(ActivityInput {
                activity_type: Some("call".into()),
                subject: Some("Intro call".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let completed = svc
        .upsert(
            &who,
            EntityPayload::Activity(ActivityInput {
                guid: Some(activity.guid()),
                status: Some("completed".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    match &completed {
        Entity::Activity(a) => {
            assert_eq!(a.status, ActivityStatus::Completed);
            assert!(a.completed_at.is_some());
        }
        other => panic!("expected activity, got {:?}", other),
    }

    let reopened = svc
        .upsert(
            &who,
            EntityPayload::Activity(ActivityInput {
                guid: Some(activity.guid()),
                status: Some("pending".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    match reopened {
        Entity::Activity(a) => assert_eq!(a.completed_at, None),
        other => panic!("expected activity, got {:?}", other),
    }
}

#[tokio::test]
async fn test_soft_references_are_tolerated() {
    let svc = service().await;
    let missing_company = Uuid::new_v4();
    let contact = svc
        .upsert(
            &rep(),
            EntityPayload::Contact(ContactInput {
                company_id: Some(missing_company),
                first_name: Some("Lee".into()),
                last_name: Some("Park".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let fetched = svc.get(EntityKind::Contact, contact.guid()).await.unwrap();
    match fetched {
        Entity::Contact(c) => assert_eq!(c.company_id, Some(missing_company)),
        other => panic!("expected contact, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let svc = service().await;
    let err = svc
        .get(EntityKind::Product, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_line_item_takes_list_price() {
    let svc = service().await;
    let who = rep();
    let product = svc
        .upsert(
            &who,
            EntityPayload::Product(ProductInput {
                name: Some("Seat licence".into()),
                price: Some(49.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let line = svc
        .upsert(
            &who,
            EntityPayload::DealProduct(DealProductInput {
                deal_id: Some(Uuid::new_v4()),
                product_id: Some(product.guid()),
                quantity: Some(10),
                discount_percent: Some(20.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    match line {
        Entity::DealProduct(l) => {
            assert_eq!(l.unit_price, 49.0);
            assert!((l.line_total() - 392.0).abs() < 1e-9);
        }
        other => panic!("expected deal product, got {:?}", other),
    }
}

#[tokio::test]
async fn test_filters_sort_and_paging() {
    let svc = service().await;
    let alice = rep();
    let bob = rep();

    create_deal(&svc, &alice, "Alpha", "prospecting", 100.0).await;
    create_deal(&svc, &alice, "Bravo", "closed-won", 300.0).await;
    create_deal(&svc, &bob, "Charlie", "negotiation", 200.0).await;

    let alices = ListFilter {
        assignee: Some(alice.user_id),
        ..Default::default()
    };
    assert_eq!(svc.count(EntityKind::Deal, &alices).await.unwrap(), 2);

    let won = ListFilter {
        status: Some("won".into()),
        ..Default::default()
    };
    let listed = svc.list(EntityKind::Deal, &won).await.unwrap();
    assert_eq!(listed.len(), 1);

    let by_value = ListFilter {
        sort: Some(SortSpec {
            field: "value".into(),
            descending: true,
        }),
        paging: Some(Paging {
            limit: 2,
            offset: 0,
        }),
        ..Default::default()
    };
    let names: Vec<String> = svc
        .list(EntityKind::Deal, &by_value)
        .await
        .unwrap()
        .into_iter()
        .map(|e| match e {
            Entity::Deal(d) => d.name,
            other => panic!("expected deal, got {:?}", other),
        })
        .collect();
    assert_eq!(names, vec!["Bravo", "Charlie"]);
    assert_eq!(svc.count(EntityKind::Deal, &by_value).await.unwrap(), 3);

    // Default order is insertion order
    let all = svc
        .list(EntityKind::Deal, &ListFilter::default())
        .await
        .unwrap();
    let first = match &all[0] {
        Entity::Deal(d) => d.name.clone(),
        other => panic!("expected deal, got {:?}", other),
    };
    assert_eq!(first, "Alpha");

    let nothing = svc
        .list(EntityKind::Deal, &ListFilter::search("zulu"))
        .await
        .unwrap();
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn test_inapplicable_filter_rejected() {
    let svc = service().await;
    let filter = ListFilter {
        stage: Some("proposal".into()),
        ..Default::default()
    };
    let err = svc.list(EntityKind::Contact, &filter).await.unwrap_err();
    assert_eq!(validation_fields(err), vec!["stage"]);
}

#[tokio::test]
async fn test_search_wildcards_are_literal() {
    let svc = service().await;
    let who = rep();
    create_company(&svc, &who, "100% Juice").await;
    create_company(&svc, &who, "1000 Lakes").await;

    let hits = svc
        .list(EntityKind::Company, &ListFilter::search("100%"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_dashboard_on_empty_database() {
    let svc = service().await;
    let stats = svc.compute_dashboard_stats().await.unwrap();
    assert_eq!(stats.pipeline.total_deals, 0);
    assert_eq!(stats.pipeline.avg_deal_size, 0.0);
    assert_eq!(stats.pipeline.conversion_rate, 0.0);
    assert_eq!(stats.activities.activities_due_today, 0);
}

#[tokio::test]
async fn test_dashboard_aggregates() {
    let svc = service().await;
    let who = rep();
    create_company(&svc, &who, "Acme").await;
    create_deal(&svc, &who, "Open A", "proposal", 1_000.0).await;
    create_deal(&svc, &who, "Open B", "negotiation", 500.0).await;
    create_deal(&svc, &who, "Won A", "closed-won", 4_000.0).await;
    create_deal(&svc, &who, "Won B", "closed-won", 2_000.0).await;
    create_deal(&svc, &who, "Lost", "closed-lost", 900.0).await;

    let now = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
    let due = |due_date, status: &str| ActivityInput {
        activity_type: Some("task".into()),
        subject: Some("Follow up".into()),
        status: Some(status.to_string()),
        due_date: Some(due_date),
        ..Default::default()
    };
    for input in [
        due(now + Duration::hours(2), "pending"),
        due(now + Duration::days(2), "pending"),
        due(now + Duration::days(10), "pending"),
        due(now + Duration::hours(1), "cancelled"),
    ] {
        svc.upsert(&who, EntityPayload::Activity(input)).await.unwrap();
    }

    let stats = svc
        .compute_dashboard_stats_in(LocalWindows::at(&now))
        .await
        .unwrap();

    assert_eq!(stats.total_companies, 1);
    assert_eq!(stats.pipeline.total_deals, 5);
    assert_eq!(stats.pipeline.pipeline_value, 1_500.0);
    assert_eq!(stats.pipeline.won_deals, 2);
    assert_eq!(stats.pipeline.won_value, 6_000.0);
    assert_eq!(stats.pipeline.lost_deals, 1);
    assert_eq!(stats.pipeline.avg_deal_size, 3_000.0);
    assert!((stats.pipeline.conversion_rate - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.activities.total_activities, 4);
    assert_eq!(stats.activities.pending_activities, 3);
    assert_eq!(stats.activities.activities_due_today, 1);
    assert_eq!(stats.activities.activities_due_this_week, 2);
}

#[tokio::test]
async fn test_sales_performance_groups() {
    let pool = init_memory_database().await.unwrap();
    let svc = CrmService::new(pool.clone());

    let named = profiles::create_profile(&pool, "ana@example.com", Some("Ana"), Role::Rep)
        .await
        .unwrap()
        .identity();
    let orphan = rep();

    create_deal(&svc, &named, "A1", "closed-won", 5_000.0).await;
    create_deal(&svc, &named, "A2", "proposal", 700.0).await;
    create_deal(&svc, &orphan, "O1", "closed-won", 1_000.0).await;

    let groups = svc.compute_sales_performance(true).await.unwrap();
    assert_eq!(groups.len(), 2);

    assert_eq!(groups[0].assignee, Some(named.user_id));
    assert_eq!(groups[0].assignee_name.as_deref(), Some("Ana"));
    assert_eq!(groups[0].pipeline.won_value, 5_000.0);
    assert_eq!(groups[0].pipeline.pipeline_value, 700.0);

    // Assigned to an id with no profile: counted, name unknown
    assert_eq!(groups[1].assignee, Some(orphan.user_id));
    assert_eq!(groups[1].assignee_name, None);

    let overall = svc.compute_sales_performance(false).await.unwrap();
    assert_eq!(overall.len(), 1);
    assert!(overall[0].overall);
    assert_eq!(overall[0].pipeline.won_deals, 2);
}

#[tokio::test]
async fn test_completed_session_persists_deal_activity_and_record() {
    let svc = service().await;
    let who = rep();
    let mut session = QualificationSession::start(
        &who,
        SessionStart {
            client_name: Some("Globex".into()),
            ..Default::default()
        },
    )
    .unwrap();
    session.set_answers(
        AnswersInput {
            budget: Some("high".into()),
            authority: Some("sole".into()),
            need: Some(9),
            timeline: Some("immediate".into()),
        }
        .parse()
        .unwrap(),
    );

    let done = svc
        .complete_qualification(&who, &session, &ScoringConfig::default())
        .await
        .unwrap();

    assert_eq!(done.record.score, 98);
    assert_eq!(done.record.classification, Classification::Hot);
    assert!(done.booking_eligible);
    assert_eq!(done.deal.probability, 98);
    assert_eq!(done.activity.deal_id, Some(done.deal.guid));
    assert_eq!(done.activity.status, ActivityStatus::Completed);
    assert_eq!(done.record.deal_id, Some(done.deal.guid));

    let stored = svc.get_qualification(done.record.guid).await.unwrap();
    assert_eq!(stored, done.record);

    let hot = svc
        .list_qualifications(Some(Classification::Hot))
        .await
        .unwrap();
    assert_eq!(hot.len(), 1);
    let cold = svc
        .list_qualifications(Some(Classification::Cold))
        .await
        .unwrap();
    assert!(cold.is_empty());
}

#[tokio::test]
async fn test_only_owner_can_complete() {
    let svc = service().await;
    let owner = rep();
    let session = QualificationSession::start(
        &owner,
        SessionStart {
            client_name: Some("Initech".into()),
            ..Default::default()
        },
    )
    .unwrap();

    let err = svc
        .complete_qualification(&rep(), &session, &ScoringConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(
        svc.count(EntityKind::Deal, &ListFilter::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_padded_filter_values_match_stored_spelling() {
    let svc = service().await;
    let who = rep();
    create_deal(&svc, &who, "Won", "closed-won", 100.0).await;
    create_deal(&svc, &who, "Open", "proposal", 100.0).await;

    let by_status = ListFilter {
        status: Some(" won ".into()),
        ..Default::default()
    };
    assert_eq!(svc.count(EntityKind::Deal, &by_status).await.unwrap(), 1);

    let by_stage = ListFilter {
        stage: Some("proposal\t".into()),
        ..Default::default()
    };
    assert_eq!(svc.count(EntityKind::Deal, &by_stage).await.unwrap(), 1);
}

#[tokio::test]
async fn test_write_lock_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    init_database(&path, 1).await.unwrap().close().await;

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_millis(20));

    // A second connection holds the write lock for the whole attempt window
    let mut holder = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut holder)
        .await
        .unwrap();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    let svc = CrmService::with_retry(
        pool,
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: std::time::Duration::from_millis(1),
            max_backoff: std::time::Duration::from_millis(4),
        },
    );
    let who = rep();
    let payload = EntityPayload::Company(CompanyInput {
        name: Some("Blocked".into()),
        ..Default::default()
    });

    let err = svc.upsert(&who, payload.clone()).await.unwrap_err();
    match err {
        Error::StorageUnavailable(message) => assert!(message.contains("after 3 attempts")),
        other => panic!("expected storage unavailable, got {:?}", other),
    }

    // Once the lock is released the same write goes through
    sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();
    svc.upsert(&who, payload).await.unwrap();
    assert_eq!(
        svc.count(EntityKind::Company, &ListFilter::default())
            .await
            .unwrap(),
        1
    );
}
