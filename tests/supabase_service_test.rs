mod common;

use common::{date, fake_service};
use gym_attendance::{
    dto::{attendance_dto::AttendanceUpsert, member_dto::UpdateMemberPayload},
    error::Error,
    models::attendance::{RecordId, SubjectScope},
    services::repository::{AttendanceRepository, DirectoryRepository},
};
use tokio_test::assert_ok;
use uuid::Uuid;

#[tokio::test]
async fn upsert_then_fetch_returns_the_written_fields() {
    let (fake, service) = fake_service().await;
    let member = fake.add_member("Dana Reyes", "dana@example.com", "555-0100");

    let row = AttendanceUpsert::new(
        Some(member),
        Some(date(2)),
        Some("present"),
        Some("08:00"),
        Some("09:30"),
    )
    .unwrap();
    assert_eq!(assert_ok!(service.upsert_attendance(&[row]).await), 1);

    let records = assert_ok!(service.fetch_attendance(&SubjectScope::day(date(2))).await);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.user_id, member);
    assert_eq!(record.status.as_deref(), Some("present"));
    assert_eq!(record.check_in.as_deref(), Some("08:00"));
    assert_eq!(record.duration.as_deref(), Some("1h 30m"));
    assert_eq!(record.user_name.as_deref(), Some("Dana Reyes"));
}

#[tokio::test]
async fn re_marking_replaces_times_and_duration() {
    let (fake, service) = fake_service().await;
    let member = Uuid::new_v4();

    let first = AttendanceUpsert::new(
        Some(member),
        Some(date(2)),
        Some("present"),
        Some("08:00"),
        Some("09:00"),
    )
    .unwrap();
    assert_ok!(service.upsert_attendance(&[first]).await);

    let later_check_in =
        AttendanceUpsert::new(Some(member), Some(date(2)), Some("present"), Some("10:00"), None)
            .unwrap();
    assert_ok!(service.upsert_attendance(&[later_check_in]).await);

    assert_eq!(fake.attendance.lock().unwrap().len(), 1);
    let records = assert_ok!(service.fetch_attendance(&SubjectScope::member(member)).await);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].check_in.as_deref(), Some("10:00"));
    assert_eq!(records[0].check_out, None);
    assert_eq!(records[0].duration, None);

    let absent = AttendanceUpsert::new(Some(member), Some(date(2)), Some("absent"), None, None).unwrap();
    assert_ok!(service.upsert_attendance(&[absent]).await);

    let records = assert_ok!(service.fetch_attendance(&SubjectScope::member(member)).await);
    assert_eq!(records[0].status.as_deref(), Some("absent"));
    assert_eq!(records[0].check_in, None);
    assert_eq!(records[0].check_out, None);
    assert_eq!(records[0].duration, None);
}

#[tokio::test]
async fn member_fetch_honors_range_and_recency() {
    let (fake, service) = fake_service().await;
    let member = Uuid::new_v4();
    fake.seed(member, date(1), "present");
    fake.seed(member, date(5), "absent");
    fake.seed(member, date(3), "present");
    fake.seed(Uuid::new_v4(), date(3), "present");

    let scope = SubjectScope::Member {
        user_id: member,
        start: Some(date(2)),
        end: Some(date(5)),
    };
    let records = assert_ok!(service.fetch_attendance(&scope).await);
    let dates: Vec<_> = records.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date(5), date(3)]);
}

#[tokio::test]
async fn delete_of_a_missing_id_is_not_an_error() {
    let (fake, service) = fake_service().await;
    let id = fake.seed(Uuid::new_v4(), date(2), "present");

    assert_ok!(service.delete_attendance(&RecordId::from(id)).await);
    assert_ok!(service.delete_attendance(&RecordId::from(id)).await);
    assert!(fake.attendance.lock().unwrap().is_empty());
}

#[tokio::test]
async fn remote_failures_carry_the_postgrest_message() {
    let (fake, service) = fake_service().await;
    fake.set_failing(true);

    let err = service
        .fetch_attendance(&SubjectScope::day(date(2)))
        .await
        .unwrap_err();
    match err {
        Error::Remote { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn directory_counts_use_exact_totals() {
    let (fake, service) = fake_service().await;
    let a = fake.add_member("Ana", "ana@example.com", "555-0101");
    let b = fake.add_member("Ben", "ben@example.com", "555-0102");
    fake.add_member("Cy", "cy@example.com", "555-0103");
    fake.seed(a, date(2), "present");
    fake.seed(b, date(2), "absent");
    fake.seed(b, date(3), "present");

    assert_eq!(assert_ok!(service.count_members().await), 3);
    assert_eq!(assert_ok!(service.count_present(date(2)).await), 1);
    assert_eq!(assert_ok!(service.count_present(date(4)).await), 0);
    assert_eq!(assert_ok!(service.fetch_members().await).len(), 3);
}

#[tokio::test]
async fn member_update_patches_only_the_sent_fields() {
    let (fake, service) = fake_service().await;
    let member = fake.add_member("Dana Reyes", "dana@example.com", "555-0100");
    let other = fake.add_member("Eli Park", "eli@example.com", "555-0200");

    let update = UpdateMemberPayload {
        phone: Some("555-0199".to_string()),
        role: Some("Trainer".to_string()),
        ..Default::default()
    };
    let updated = assert_ok!(service.update_member(member, &update).await);
    assert_eq!(updated.id, member);
    assert_eq!(updated.phone.as_deref(), Some("555-0199"));
    assert_eq!(updated.role_label(), "Trainer");
    assert_eq!(updated.full_name.as_deref(), Some("Dana Reyes"));

    assert_eq!(fake.member(other).unwrap()["phone"], "555-0200");

    let missing = service.update_member(Uuid::new_v4(), &update).await.unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));
}

#[tokio::test]
async fn one_broken_row_does_not_blank_the_day() {
    let (fake, service) = fake_service().await;
    let member = Uuid::new_v4();
    fake.seed(member, date(2), "present");
    fake.attendance.lock().unwrap().push(serde_json::json!({
        "id": 999,
        "user_id": null,
        "date": "2024-01-02",
        "status": "present",
        "created_at": "2024-01-02T07:00:00+00:00",
    }));

    let records = assert_ok!(service.fetch_attendance(&SubjectScope::day(date(2))).await);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, member);
}
