//! Workspace umbrella crate: nothing lives here but the end-to-end scenario
//! tests under `tests/integration/`, which exercise `lsp-client` and
//! `lsp-server` together the way a real deployment would.
