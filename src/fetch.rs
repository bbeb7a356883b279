//! Plain-text HTTP GET for the TLE feed and the world atlas.
//!
//! Native builds block on `ureq` and are only called from worker threads.
//! The wasm build goes through the browser's `fetch`.

use crate::error::{http_err, Result};

#[cfg(not(target_arch = "wasm32"))]
pub fn fetch_text(url: &str) -> Result<String> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| http_err(url, e))?;
    let body = response.into_string()?;
    Ok(body)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn dirs_cache() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".cache"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

/// Returns the cached copy under `~/.cache/starlink-globe/` when present,
/// otherwise downloads and stores it. Cache write failures are ignored.
#[cfg(not(target_arch = "wasm32"))]
pub fn fetch_or_cache(filename: &str, url: &str) -> Result<String> {
    let cache_dir = dirs_cache().join("starlink-globe");
    let path = cache_dir.join(filename);
    if path.exists() {
        log::debug!("Using cached {}", path.display());
        return Ok(std::fs::read_to_string(&path)?);
    }
    let data = fetch_text(url)?;
    if std::fs::create_dir_all(&cache_dir).is_ok() {
        if let Err(e) = std::fs::write(&path, &data) {
            log::warn!("Could not cache {}: {}", path.display(), e);
        }
    }
    Ok(data)
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn fetch_text(url: &str) -> Result<String> {
    use wasm_bindgen::JsCast as _;
    use web_sys::{Request, RequestInit, RequestMode, Response};

    let opts = RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(RequestMode::Cors);

    let request = Request::new_with_str_and_init(url, &opts)
        .map_err(|e| http_err(url, format!("{:?}", e)))?;

    let window = web_sys::window().ok_or_else(|| http_err(url, "no window"))?;
    let resp_value = wasm_bindgen_futures::JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| http_err(url, format!("fetch failed: {:?}", e)))?;

    let resp: Response = resp_value
        .dyn_into()
        .map_err(|_| http_err(url, "response is not a Response"))?;

    if !resp.ok() {
        return Err(http_err(url, format!("HTTP {}", resp.status())));
    }

    let array_buffer = wasm_bindgen_futures::JsFuture::from(
        resp.array_buffer().map_err(|e| http_err(url, format!("{:?}", e)))?,
    )
    .await
    .map_err(|e| http_err(url, format!("{:?}", e)))?;

    let bytes = js_sys::Uint8Array::new(&array_buffer).to_vec();
    String::from_utf8(bytes).map_err(|e| http_err(url, e))
}

/// Gives the browser event loop a turn during long parses.
#[cfg(target_arch = "wasm32")]
pub(crate) async fn yield_now() {
    let promise = js_sys::Promise::new(&mut |resolve, _| {
        let scheduled = web_sys::window()
            .map(|w| w.set_timeout_with_callback(&resolve).is_ok())
            .unwrap_or(false);
        if !scheduled {
            let _ = resolve.call0(&wasm_bindgen::JsValue::NULL);
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}
