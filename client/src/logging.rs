//! Installs the `env_logger` backend for the `log` facade, mirroring
//! the proxy's idempotent init routine.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
