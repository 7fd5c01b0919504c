use clap::Parser;
use clap::ValueEnum;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use swiss_table::ByteHasher;
use swiss_table::Fnv1a;
use swiss_table::Global;
use swiss_table::RawTable;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HasherKind {
    Fnv,
    Foldhash,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "initial_capacity", default_value_t = 16)]
    initial_capacity: usize,

    #[arg(short = 'n', long = "count", default_value_t = 100_000)]
    count: usize,

    /// Delete every Nth inserted key afterwards (0 disables deletion).
    #[arg(short = 'd', long = "delete_every", default_value_t = 3)]
    delete_every: usize,

    #[arg(long = "hasher", value_enum, default_value_t = HasherKind::Fnv)]
    hasher: HasherKind,
}

/// Random keys, pairwise distinct, in random order.
fn distinct_keys(count: usize, rng: &mut SmallRng) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count).map(|_| rng.random()).collect();
    keys.sort_unstable();
    keys.dedup();
    while keys.len() < count {
        let key = rng.random();
        if let Err(pos) = keys.binary_search(&key) {
            keys.insert(pos, key);
        }
    }
    keys.shuffle(rng);
    keys
}

fn run<H: ByteHasher>(args: &Args, hasher: H) {
    let mut table = RawTable::with_capacity_in(
        args.initial_capacity,
        core::alloc::Layout::new::<u64>(),
        core::alloc::Layout::new::<u64>(),
        Global,
        hasher,
    );
    println!("Initial capacity: {}", table.capacity());

    let mut rng = SmallRng::from_os_rng();
    let keys = distinct_keys(args.count, &mut rng);

    for (i, key) in keys.iter().enumerate() {
        let (value, inserted) = table.get_or_insert(&key.to_ne_bytes());
        assert!(inserted, "key {key:#x} inserted twice");
        value.copy_from_slice(&(i as u64).to_ne_bytes());
    }
    println!("Inserted {} keys, capacity {}", table.len(), table.capacity());

    if args.delete_every > 0 {
        let removed = keys
            .iter()
            .step_by(args.delete_every)
            .filter(|key| table.remove(&key.to_ne_bytes()))
            .count();
        println!("Removed {removed} keys");
    }

    let missing = keys
        .iter()
        .enumerate()
        .filter(|(i, key)| {
            let deleted = args.delete_every > 0 && i % args.delete_every == 0;
            !deleted && !table.contains(&key.to_ne_bytes())
        })
        .count();
    println!("Live keys not found: {missing}");

    table.probe_histogram().print();
    table.debug_stats().print();
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.hasher {
        HasherKind::Fnv => run(&args, Fnv1a),
        HasherKind::Foldhash => run(&args, foldhash::fast::FixedState::with_seed(0x5EED)),
    }
}
