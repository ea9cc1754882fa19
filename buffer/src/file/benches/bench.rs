use commonware_buffer::{
    compression::Gzip,
    file::{Config, RecordBuffer},
};
use criterion::criterion_main;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::path::Path;

mod add;

criterion_main!(add::benches, add_all::benches, read_sequential::benches);

/// Size of each item in bytes.
const ITEM_SIZE: usize = 256;

/// Open a buffer storing raw byte items in `dir`, discarding anything written before.
fn get_buffer(dir: &Path) -> RecordBuffer<[u8; ITEM_SIZE]> {
    let buffer = RecordBuffer::init(Config {
        data: dir.join("bench.bin"),
        index: None,
        codec_config: (),
        compressor: Gzip::default(),
    })
    .unwrap();
    buffer.reset().unwrap();
    buffer
}

/// Generate `count` random items.
fn random_items(count: usize) -> Vec<[u8; ITEM_SIZE]> {
    let mut rng = StdRng::seed_from_u64(0);
    (0..count)
        .map(|_| {
            let mut item = [0u8; ITEM_SIZE];
            rng.fill_bytes(&mut item);
            item
        })
        .collect()
}
