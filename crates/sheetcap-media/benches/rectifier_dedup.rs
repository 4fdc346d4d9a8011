use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sheetcap_media::{Dedup, Rectifier, TrackerEvent};
use sheetcap_models::{BoundingBox, Frame, PerceptualHash, Point, Quadrilateral, RectifiedCapture, Sensitivity};

fn sample_frame(width: u32, height: u32) -> Frame {
    let mut pixels = vec![230u8; (width * height * 3) as usize];
    for y in (height / 4)..(height / 2) {
        for x in (width / 4)..(width / 2) {
            let idx = ((y * width + x) * 3) as usize;
            pixels[idx] = 20;
            pixels[idx + 1] = 20;
            pixels[idx + 2] = 20;
        }
    }
    Frame::new(0, 0.0, width, height, pixels)
}

fn full_frame_quad(w: f64, h: f64) -> Quadrilateral {
    Quadrilateral::new(Point::new(0.0, 0.0), Point::new(w, 0.0), Point::new(w, h), Point::new(0.0, h))
}

fn bench_rectifier(c: &mut Criterion) {
    let frame = sample_frame(1280, 720);
    let quad = full_frame_quad(1280.0, 720.0);
    let rectifier = Rectifier::new();
    c.bench_function("rectify_1280x720", |b| {
        b.iter(|| {
            let capture = rectifier.rectify(black_box(&frame), black_box(&quad)).unwrap();
            black_box(capture);
        })
    });
}

fn bench_dedup(c: &mut Criterion) {
    let captures: Vec<RectifiedCapture> = (0..200u64)
        .map(|i| {
            RectifiedCapture::new(
                i,
                PerceptualHash(i.wrapping_mul(0x9E3779B97F4A7C15)),
                BoundingBox { x: 0, y: 0, width: 100, height: 100 },
                1200,
                1200,
                vec![0u8; 4],
            )
        })
        .collect();

    c.bench_function("dedup_filter_200_captures", |b| {
        b.iter(|| {
            let mut dedup = Dedup::new(Sensitivity::Normal);
            let pairs = captures.clone().into_iter().map(|c| (c, TrackerEvent::None));
            black_box(dedup.filter(pairs));
        })
    });
}

criterion_group!(benches, bench_rectifier, bench_dedup);
criterion_main!(benches);
