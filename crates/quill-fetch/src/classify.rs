use quill_net::Headers;

/// What a response means relative to the job's resume offset.
///
/// Evaluated once, before any streaming, so the rest of the job is a plain
/// consume loop. `total_bytes` is `0` when the server did not say.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ResponseClass {
    /// 200 against a fresh request.
    Fresh { total_bytes: u64 },
    /// 206 honoring the range; total is start + Content-Length.
    Resumed { total_bytes: u64 },
    /// 200 against a ranged request: the server ignored the range header.
    /// Clear persisted state and consume this same body from offset 0.
    RangeIgnored { total_bytes: u64 },
    /// 416 whose Content-Range total equals our resume offset exactly: the
    /// persisted data already covers the whole resource.
    AlreadyComplete { total_bytes: u64 },
    /// 416 naming any other total: persisted accounting disagrees with the
    /// server, restart from zero exactly once.
    RestartFromScratch,
    /// Any other status; surfaced as-is, store untouched.
    Http { status: u16 },
}

pub(crate) fn classify_response(start_byte: u64, status: u16, headers: &Headers) -> ResponseClass {
    match status {
        206 => ResponseClass::Resumed {
            total_bytes: headers
                .content_length()
                .map_or(0, |len| start_byte + len),
        },
        // A 416 whose total is *below* our offset means the persisted
        // accounting overshoots the real resource; that state is corrupt and
        // only a restart recovers it.
        416 => match headers.content_range().and_then(parse_content_range_total) {
            Some(total) if start_byte == total => ResponseClass::AlreadyComplete {
                total_bytes: total,
            },
            _ => ResponseClass::RestartFromScratch,
        },
        s if (200..300).contains(&s) => {
            let total_bytes = headers.content_length().unwrap_or(0);
            if start_byte == 0 {
                ResponseClass::Fresh { total_bytes }
            } else {
                ResponseClass::RangeIgnored { total_bytes }
            }
        }
        s => ResponseClass::Http { status: s },
    }
}

/// Total from a `Content-Range` value: `bytes */N`, `*/N` or `bytes a-b/N`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        let mut headers = Headers::new();
        for (k, v) in pairs {
            headers.insert(*k, *v);
        }
        headers
    }

    #[rstest]
    #[case("bytes */50", Some(50))]
    #[case("*/50", Some(50))]
    #[case("bytes 0-9/50", Some(50))]
    #[case("bytes */", None)]
    #[case("junk", None)]
    fn content_range_totals(#[case] value: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_content_range_total(value), expected);
    }

    #[test]
    fn fresh_200_with_length() {
        let class = classify_response(0, 200, &headers(&[("content-length", "7")]));
        assert_eq!(class, ResponseClass::Fresh { total_bytes: 7 });
    }

    #[test]
    fn fresh_200_without_length_leaves_total_unknown() {
        let class = classify_response(0, 200, &headers(&[]));
        assert_eq!(class, ResponseClass::Fresh { total_bytes: 0 });
    }

    #[test]
    fn resumed_206_adds_the_range_start() {
        let class = classify_response(5, 206, &headers(&[("content-length", "5")]));
        assert_eq!(class, ResponseClass::Resumed { total_bytes: 10 });
    }

    #[test]
    fn ranged_200_means_the_server_ignored_us() {
        let class = classify_response(5, 200, &headers(&[("content-length", "13")]));
        assert_eq!(class, ResponseClass::RangeIgnored { total_bytes: 13 });
    }

    #[rstest]
    #[case(50, 50, ResponseClass::AlreadyComplete { total_bytes: 50 })]
    #[case(100, 50, ResponseClass::RestartFromScratch)]
    #[case(10, 50, ResponseClass::RestartFromScratch)]
    fn range_not_satisfiable(
        #[case] start_byte: u64,
        #[case] server_total: u64,
        #[case] expected: ResponseClass,
    ) {
        let value = format!("bytes */{server_total}");
        let headers = headers(&[("content-range", value.as_str())]);
        assert_eq!(classify_response(start_byte, 416, &headers), expected);
    }

    #[test]
    fn unparsable_416_restarts() {
        let class = classify_response(10, 416, &headers(&[]));
        assert_eq!(class, ResponseClass::RestartFromScratch);
    }

    #[rstest]
    #[case(404)]
    #[case(500)]
    #[case(301)]
    fn other_statuses_surface(#[case] status: u16) {
        assert_eq!(
            classify_response(0, status, &headers(&[])),
            ResponseClass::Http { status }
        );
    }
}
