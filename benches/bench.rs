// Criterion benchmarks for Trial Match

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trial_match::core::aggregate::select_matches;
use trial_match::core::evaluator::classify;
use trial_match::core::filters::{condition_matches, filter_candidates};
use trial_match::core::scoring::sort_by_rank;
use trial_match::models::{Decision, EvaluationOutcome, RawVerdict, Trial, TrialStatus};

const CONDITIONS: [&str; 5] = [
    "Non-Small Cell Lung Cancer",
    "Breast Cancer",
    "Diabetes Type 2",
    "Small Cell Lung Cancer",
    "Advanced Melanoma",
];

fn create_trial(id: usize) -> Trial {
    Trial {
        id: format!("NCT{:06}", id),
        title: format!("Trial {}", id),
        condition: CONDITIONS[id % CONDITIONS.len()].to_string(),
        phase: "3".to_string(),
        status: if id % 4 == 0 {
            TrialStatus::Completed
        } else {
            TrialStatus::Recruiting
        },
        min_age: Some(18),
        max_age: Some(80),
        required_markers: Default::default(),
        inclusions: vec!["Measurable disease".to_string()],
        exclusions: vec!["Active infection".to_string()],
        eligibility_text: None,
        url: None,
    }
}

fn create_outcomes(count: usize) -> Vec<EvaluationOutcome> {
    (0..count)
        .map(|i| {
            let trial = create_trial(i);
            match i % 3 {
                0 => EvaluationOutcome::degraded(trial.id, 2, "oracle unavailable"),
                1 => classify(
                    &trial,
                    Decision::Accepted,
                    RawVerdict {
                        decision: Some("Potential Match".to_string()),
                        flags: (0..i % 5).map(|f| f.to_string()).collect(),
                        ..RawVerdict::default()
                    },
                ),
                _ => classify(&trial, Decision::Rejected, RawVerdict::default()),
            }
        })
        .collect()
}

fn bench_condition_matches(c: &mut Criterion) {
    c.bench_function("condition_matches", |b| {
        b.iter(|| condition_matches(black_box("Non-Small Cell Lung Cancer"), black_box("lung cancer")));
    });
}

fn bench_discovery_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery_filter");

    for catalog_size in [100, 1_000, 10_000].iter() {
        let catalog: Vec<Trial> = (0..*catalog_size).map(create_trial).collect();

        group.bench_with_input(
            BenchmarkId::new("filter_candidates", catalog_size),
            catalog_size,
            |b, _| {
                b.iter(|| filter_candidates(black_box(catalog.clone()), black_box("Lung Cancer")));
            },
        );
    }

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let outcomes = create_outcomes(500);

    c.bench_function("aggregate_500_outcomes", |b| {
        b.iter(|| {
            let mut matches = select_matches(black_box(&outcomes)).unwrap_or_default();
            sort_by_rank(&mut matches);
            black_box(matches)
        });
    });
}

criterion_group!(
    benches,
    bench_condition_matches,
    bench_discovery_filter,
    bench_aggregation
);

criterion_main!(benches);
