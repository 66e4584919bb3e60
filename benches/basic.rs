use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lua_board_agent::inspector::{classify, InspectorMode, StreamInspector};
use std::time::Duration;

pub fn bench_classify(c: &mut Criterion) {
    let lines = [
        "rst:0x1 (POWERON_RESET),boot:0x13 (SPI_FAST_FLASH_BOOT)",
        "<blockError,a1,attempt to index a nil value>",
        "main:12: attempt to call a nil value",
        "plain program output that matches nothing",
    ];
    c.bench_function("classify_console_lines", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(classify(black_box(line), true));
            }
        })
    });
}

pub fn bench_inspect_stream(c: &mut Criterion) {
    let stream: Vec<u8> = b"<blockStart,a1>\r\nhello from the board\r\n<blockEnd,a1>\r\n"
        .repeat(64);
    let mode = InspectorMode::default();
    c.bench_function("inspect_byte_stream", |b| {
        b.iter(|| {
            let mut inspector = StreamInspector::new();
            for &byte in &stream {
                black_box(inspector.inspect(byte, &mode));
            }
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_classify, bench_inspect_stream
}
criterion_main!(benches);
