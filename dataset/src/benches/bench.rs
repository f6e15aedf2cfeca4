use criterion::criterion_main;

mod get_record;

criterion_main!(get_record::benches, set_read_offset::benches);
