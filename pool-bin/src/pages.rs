//! Hand-built HTML for the two pages the dispatcher itself renders. No
//! templating crate appears anywhere in the example pack this was learned
//! from, so these are plain `format!` strings, same as the teacher renders
//! its JSON bodies inline.

/// Shown at `GET /` and any unmatched path while the redirect target warms up.
pub fn loading_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Starting your server</title></head>
<body>
<h1>Your server is starting</h1>
<p>This page will redirect once a container is ready. If it doesn't,
visit <a href="/spawn">/spawn</a> to try again.</p>
</body>
</html>"#
    )
}

/// Shown when `acquire()` reports the pool is empty: every container is
/// claimed and none are ready yet.
pub fn pool_full_page(cull_period_secs: u64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Servers are full</title></head>
<body>
<h1>All servers are in use</h1>
<p>Every pre-launched container is currently claimed. The pool checks for
containers to reclaim every {cull_period_secs} seconds &mdash; please try
again shortly.</p>
</body>
</html>"#
    )
}
