/// Assert a snapshot with a set of filters applied.
#[macro_export]
macro_rules! assert_snapshot_filtered {
    ($output:expr, $filters:expr, @$expected:literal) => {
        insta::with_settings!({filters => $filters.clone()}, {
            insta::assert_snapshot!($output, @$expected);
        });
    };
}

/// Run a sync and capture whether it succeeded along with its stdout.
#[macro_export]
macro_rules! run_and_capture {
    ($app:expr, $dry_run:expr) => {{
        let mut out = Vec::new();
        let ok = $app.cmd_sync($dry_run, &mut out).await?;
        (ok, String::from_utf8(out)?)
    }};
}
