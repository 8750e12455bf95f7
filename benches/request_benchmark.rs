use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;

use gzip_static::{
    negotiator::negotiate_encoding,
    request::Request,
    util::{resolve_url_path, url_pathname},
};

fn simple_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test\r\n\r\n";

    c.bench_function("simple_request_parse", |b| {
        b.iter(|| {
            let buffer = black_box(request.to_vec());
            let _ = Request::try_from(&buffer, 0).unwrap();
        });
    });
}

fn complex_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /js/app.js?v=123 HTTP/1.1\r\n\
                    Host: localhost:7878\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: */*\r\n\
                    Accept-Language: en-US,en;q=0.9\r\n\
                    Accept-Encoding: gzip, deflate, br\r\n\
                    If-Modified-Since: Wed, 21 Oct 2015 07:28:00 GMT\r\n\
                    Connection: keep-alive\r\n\
                    \r\n";

    c.bench_function("complex_request_parse", |b| {
        b.iter(|| {
            let buffer = black_box(request.to_vec());
            let _ = Request::try_from(&buffer, 0).unwrap();
        });
    });
}

fn negotiate_encoding_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("negotiate_encoding");

    let headers = [
        ("none", None),
        ("gzip_only", Some("gzip")),
        ("deflate_only", Some("deflate")),
        ("browser", Some("gzip, deflate, br, zstd")),
        ("unsupported", Some("br, identity")),
        ("wildcard", Some("*")),
    ];

    for (name, header) in headers.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), header, |b, header| {
            b.iter(|| negotiate_encoding(black_box(*header)));
        });
    }

    group.finish();
}

fn resolve_path_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_url_path");
    let root = Path::new("/srv/public");

    let urls = [
        ("plain", "/js/app.js"),
        ("query", "/js/app.js?v=123"),
        ("encoded", "/%E4%B8%AD%E6%96%87/%20a.txt"),
        ("dot_segments", "/a/b/../../js/./app.js"),
        ("traversal", "/%2e%2e/%2e%2e/etc/passwd"),
    ];

    for (name, url) in urls.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), url, |b, url| {
            b.iter(|| resolve_url_path(root, url_pathname(black_box(url))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    simple_request_parse_benchmark,
    complex_request_parse_benchmark,
    negotiate_encoding_benchmark,
    resolve_path_benchmark
);
criterion_main!(benches);
