use recipe_offline_proto::*;

// Entries shaped like what the offline layer stores for the app shell
pub fn sample_entries() -> Vec<CachedEntry> {
    vec![
        CachedEntry {
            request: RequestSnapshot {
                method: "GET".to_string(),
                url: "http://127.0.0.1:5000/index.html".to_string(),
                vary: vec![],
            },
            response: ResponseSnapshot {
                status: 200,
                status_text: "OK".to_string(),
                headers: vec![
                    ("content-type".to_string(), "text/html; charset=utf-8".to_string()),
                    ("etag".to_string(), "\"abc123\"".to_string()),
                ],
                kind: ResponseKind::Basic,
                body: b"<!doctype html><title>Recipe Analyzer</title>".to_vec(),
            },
            stored_at: 1_760_000_000_000,
        },
        CachedEntry {
            request: RequestSnapshot {
                method: "GET".to_string(),
                url: "http://127.0.0.1:5000/assets/logo.svg".to_string(),
                vary: vec![
                    ("accept-encoding".to_string(), Some("gzip".to_string())),
                    ("accept-language".to_string(), None),
                ],
            },
            response: ResponseSnapshot {
                status: 200,
                status_text: "OK".to_string(),
                headers: vec![
                    ("content-type".to_string(), "image/svg+xml".to_string()),
                    ("vary".to_string(), "Accept-Encoding, Accept-Language".to_string()),
                ],
                kind: ResponseKind::Basic,
                body: vec![0x3c, 0x73, 0x76, 0x67, 0x00, 0xff, 0x3e],
            },
            stored_at: 1_760_000_000_500,
        },
    ]
}
