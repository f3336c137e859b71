use caseline_core::event::case::{CaseStatus, StatusChanged, StepOutcome};
use caseline_core::event::task::{Task, TaskEvent, TaskEventKind};
use caseline_core::ids::{ActivityCode, CaseRef, OrgUnit, Worker};
use caseline_core::snapshot::snapshots;
use chrono::{DateTime, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn synthetic_case(transitions: usize) -> (Vec<StatusChanged>, Vec<Task>) {
    let case_ref = CaseRef::from("b-bench");
    let mut history = Vec::with_capacity(transitions);
    let mut tasks = Vec::with_capacity(transitions);

    let mut base = 0i64;
    for i in 0..transitions {
        let activity = ActivityCode::new(format!("50{:02}", i % 8));
        history.push(StatusChanged {
            case_ref: case_ref.clone(),
            timestamp: at(base),
            status: CaseStatus::UnderProcessing,
            activity_code: Some(activity.clone()),
            last_completed_activity: (i > 0).then(|| ActivityCode::new(format!("50{:02}", (i - 1) % 8))),
            last_worker: Some(Worker::from("A")),
            wait_reason: None,
            step_outcome: Some(StepOutcome::Completed),
        });
        tasks.push(Task {
            case_ref: Some(case_ref.clone()),
            events: vec![
                TaskEvent {
                    timestamp: at(base + 10),
                    kind: TaskEventKind::Reserved,
                    activity_code: activity.clone(),
                    unit: OrgUnit::from("4806"),
                    reserved_by: Some(Worker::from("A")),
                },
                TaskEvent {
                    timestamp: at(base + 90),
                    kind: TaskEventKind::Closed,
                    activity_code: activity,
                    unit: OrgUnit::from("4806"),
                    reserved_by: None,
                },
            ],
        });
        base += 100;
    }
    (history, tasks)
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot.fold");
    let case_ref = CaseRef::from("b-bench");

    for transitions in [10usize, 100, 1000] {
        let (history, tasks) = synthetic_case(transitions);
        group.throughput(Throughput::Elements((transitions * 3) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(transitions),
            &(history, tasks),
            |b, (history, tasks)| {
                b.iter(|| black_box(snapshots(&case_ref, history, tasks)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_fold);
criterion_main!(benches);
