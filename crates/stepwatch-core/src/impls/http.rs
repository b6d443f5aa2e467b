//! reqwest 共通の小物（URL 組み立て、エラーボディの取り出し）

use reqwest::{Response, Url};
use serde_json::Value;

/// `{base}{prefix}/{segments...}`
///
/// セグメントは 1 つずつ percent-encode するので、`/` や `?` を含む id も
/// 1 つのパスセグメントのままです。
pub(crate) fn endpoint(base: &str, prefix: &str, segments: &[&str]) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|e| format!("invalid base url {base:?}: {e}"))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| format!("base url {base:?} cannot carry a path"))?;
        path.pop_if_empty();
        path.extend(prefix.split('/').filter(|s| !s.is_empty()));
        path.extend(segments);
    }
    Ok(url)
}

/// 2xx 以外のレスポンスの本文
///
/// `{"detail": "..."}` は中身を取り出します。空の本文は status の reason phrase にします。
pub(crate) async fn error_body(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string));

    match detail {
        Some(detail) => detail,
        None if text.trim().is_empty() => status.canonical_reason().unwrap_or("").to_string(),
        None => text,
    }
}
