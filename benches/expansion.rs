use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sentence_gen::optional::expand_optional;
use sentence_gen::{ExpansionConfig, ProductionTable, expand};

const COMMANDS: &str = r#"
<main> : [please] <verb> [the] <object> [<when>] ;
<verb> : open | close | lock | unlock | dim | brighten ;
<object> : door | window | garage | light | <room> light ;
<room> : kitchen | bedroom | hallway | living room ;
<when> : now | later | in <minutes> minutes ;
<minutes> : 1 | 5 | 10 | 15 | 30 ;
"#;

fn bench_command_grammar(c: &mut Criterion) {
    let table = ProductionTable::parse(COMMANDS).unwrap();
    let config = ExpansionConfig::default();

    c.bench_function("expand command grammar", |b| {
        b.iter(|| expand(black_box(&table), "<main>", &config).unwrap())
    });
}

fn bench_cutoff(c: &mut Criterion) {
    let table = ProductionTable::parse(
        "<n> : <d> | <d> <n> ; <d> : 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 ;",
    )
    .unwrap();
    let config = ExpansionConfig::default().with_cutoff(10_000);

    c.bench_function("expand digits to 10k cutoff", |b| {
        b.iter(|| expand(black_box(&table), "<n>", &config).unwrap())
    });
}

fn bench_optional(c: &mut Criterion) {
    c.bench_function("expand 10 optional fragments", |b| {
        b.iter(|| expand_optional(black_box("[a] [b] [c] [d] [e] [f] [g] [h] [i] [j] end")).unwrap())
    });
}

criterion_group!(benches, bench_command_grammar, bench_cutoff, bench_optional);
criterion_main!(benches);
