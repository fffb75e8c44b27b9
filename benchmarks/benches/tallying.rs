use assembly_vote::AssemblyService;
use assembly_vote::config::ElectionConfig;
use assembly_vote::types::{Caller, PositionId, Voter};
use assembly_vote::voting::{NewPosition, Pagination};
use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::Rng;
use rust_decimal::Decimal;
use std::hint::black_box;
use std::time::Duration;

const CANDIDATES: u32 = 7;

/// Position with `voters` shareholders, each voting for three random candidates
fn populated(voters: usize) -> (AssemblyService, PositionId) {
    let (service, _) = AssemblyService::in_memory(ElectionConfig::default());
    let admin = Caller::admin();
    let day = NaiveDate::from_ymd_opt(2026, 12, 20).unwrap();
    let election = service.create_open_election(&admin, "Bench AGM", day).unwrap();
    let position = service
        .create_position(
            &admin,
            election.id,
            NewPosition {
                name: "Board".into(),
                description: String::new(),
                max_candidates: Some(CANDIDATES),
                max_votes: 3,
            },
        )
        .unwrap();

    let candidates: Vec<_> = (0..CANDIDATES)
        .map(|i| {
            let candidate = service
                .register_candidate(&admin, &format!("Candidate {i}"), "", None)
                .unwrap();
            service.assign_candidate(&admin, candidate.id, position.id).unwrap();
            candidate.id
        })
        .collect();
    service.activate_position(&admin, position.id).unwrap();

    let mut rng = rand::thread_rng();
    for i in 0..voters {
        let shareholder_id = format!("SH-{i}");
        let weight = Decimal::new(rng.gen_range(1..1_000_000), 2);
        service
            .register_voter(&admin, Voter::new(&shareholder_id, "", weight, true).unwrap())
            .unwrap();

        let first = rng.gen_range(0..candidates.len());
        for offset in 0..3 {
            let candidate = candidates[(first + offset) % candidates.len()];
            service
                .cast_candidate_vote(&admin, &shareholder_id, position.id, candidate)
                .unwrap();
        }
    }

    (service, position.id)
}

fn bench_tallies(c: &mut Criterion) {
    let mut group = c.benchmark_group("tallies");
    group.warm_up_time(Duration::from_millis(100));

    for voters in [100usize, 1_000, 5_000] {
        let (service, position) = populated(voters);

        group.bench_with_input(BenchmarkId::new("tally_candidate_votes", voters), &voters, |b, _| {
            b.iter(|| black_box(service.tally_candidate_votes(black_box(position)).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("candidate_rankings", voters), &voters, |b, _| {
            b.iter(|| black_box(service.candidate_rankings(black_box(position)).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("total_voters", voters), &voters, |b, _| {
            b.iter(|| black_box(service.total_voters_for_position(black_box(position)).unwrap()))
        });
    }

    group.finish();
}

fn bench_voter_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("voter_history");

    let (service, position) = populated(2_000);
    for page_size in [10usize, 100, 500] {
        let pagination = Pagination::new(3, page_size).unwrap();
        group.bench_with_input(BenchmarkId::new("page", page_size), &pagination, |b, &pagination| {
            b.iter(|| {
                black_box(
                    service
                        .voter_history_by_position_paginated(position, pagination)
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tallies, bench_voter_history);
criterion_main!(benches);
