//! Benchmarks for output classification.
//!
//! The parser runs once per answered question on the request path, so the
//! cases below cover the shapes seen in practice: a bare answer object, an
//! object buried under a long diagnostic prefix, sentinel framing, and plain
//! prose that exhausts every strategy before falling through.

use std::time::Duration;

use calgpt_bridge::parser::{parse_output, OutputParser};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn course_json(index: usize) -> String {
    format!(
        r#"{{"id":"c{i}","abbreviation":"COMPSCI","courseNumber":"{n}","title":"Special Topics {i}","openSeats":{s},"enrolledPercentage":0.{p},"units":"4.0","letterAverage":"B+","gradeAverage":3.3}}"#,
        i = index,
        n = 100 + index,
        s = index % 40,
        p = 10 + index % 89
    )
}

fn answer_json(courses: usize) -> String {
    let courses: Vec<String> = (0..courses).map(course_json).collect();
    format!(
        r#"{{"text":"Here are some options that fit your schedule.","courses":[{}]}}"#,
        courses.join(",")
    )
}

fn diagnostic_prefix(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("[retriever] scored chunk {} of course catalogue in 0.{}ms\n", i, i % 10))
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let bare = answer_json(10);
    let prefixed = format!("{}{}", diagnostic_prefix(500), answer_json(10));
    let framed = format!("{}@@ANSWER@@\n{}", diagnostic_prefix(500), answer_json(10));
    let prose = "CS 61A is usually taken in the first year. ".repeat(200);

    let marker_parser = OutputParser::default();
    let sentinel_parser = OutputParser::new(Some("@@ANSWER@@".to_string()), true);

    let mut group = c.benchmark_group("output_parser");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("bare_object_10_courses", |b| {
        b.iter(|| parse_output(black_box(&bare)))
    });

    group.bench_function("marker_after_500_diagnostic_lines", |b| {
        b.iter(|| marker_parser.parse(black_box(&prefixed)))
    });

    group.bench_function("sentinel_after_500_diagnostic_lines", |b| {
        b.iter(|| sentinel_parser.parse(black_box(&framed)))
    });

    group.bench_function("plain_prose", |b| {
        b.iter(|| marker_parser.parse(black_box(&prose)))
    });

    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
