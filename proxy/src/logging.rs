//! Installs the `env_logger` backend for the `log` facade. Idempotent
//! so it is safe to call from both the binary's `main` and from tests;
//! matches the teacher's single-idempotent-init-routine pattern without
//! the global `OnceLock` it wraps that routine in (no shared mutable
//! state here to guard, just a backend registration).
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
