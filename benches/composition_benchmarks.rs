// Copyright 2025 Cowboy AI, LLC.

use cim_roles::builder::ModuleBuilder;
use cim_roles::interp::Evaluator;
use cim_roles::model::{Module, TypeRef};
use cim_roles::{weave, WeaveConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// `roles` roles with `members` methods each, all composed by `classes` classes
fn module(roles: usize, members: usize, classes: usize) -> Module {
    let mut builder = ModuleBuilder::new("Bench");
    for role in 0..roles {
        builder = builder.role(&format!("R{role}"), |mut r| {
            r = r.field("state", TypeRef::Int32);
            for member in 0..members {
                r = r.method(&format!("R{role}M{member}"), TypeRef::Int32, |m| {
                    m.returns_int(member as i64)
                });
            }
            r
        });
    }
    for class in 0..classes {
        builder = builder.class(&format!("C{class}"), |mut c| {
            for role in 0..roles {
                c = c.does(format!("R{role}").as_str());
            }
            c
        });
    }
    builder.build().unwrap()
}

fn benchmark_weave_by_role_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave_roles");
    for roles in [1, 4, 16] {
        let source = module(roles, 8, 4);
        group.bench_with_input(BenchmarkId::from_parameter(roles), &source, |b, source| {
            b.iter(|| {
                let mut module = source.clone();
                black_box(weave(&mut module, WeaveConfig::default()))
            })
        });
    }
    group.finish();
}

fn benchmark_weave_by_composition_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave_compositions");
    for classes in [1, 16, 64] {
        let source = module(2, 8, classes);
        group.bench_with_input(BenchmarkId::from_parameter(classes), &source, |b, source| {
            b.iter(|| {
                let mut module = source.clone();
                black_box(weave(&mut module, WeaveConfig::default()))
            })
        });
    }
    group.finish();
}

fn benchmark_verified_weave(c: &mut Criterion) {
    let source = module(4, 8, 8);
    let config = WeaveConfig::default().with_verification(true);
    c.bench_function("weave_with_verification", |b| {
        b.iter(|| {
            let mut module = source.clone();
            black_box(weave(&mut module, config.clone()))
        })
    });
}

fn benchmark_forwarded_call(c: &mut Criterion) {
    let mut woven = module(2, 4, 1);
    weave(&mut woven, WeaveConfig::default());
    c.bench_function("forwarded_call", |b| {
        let mut evaluator = Evaluator::new(&woven);
        let instance = evaluator.instantiate("C0", vec![]).unwrap();
        b.iter(|| black_box(evaluator.call_method(&instance, "R1M3", vec![]).unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_weave_by_role_count,
    benchmark_weave_by_composition_count,
    benchmark_verified_weave,
    benchmark_forwarded_call
);
criterion_main!(benches);
