use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = tcrif::cli::run().await {
        tracing::error!("{e:?}");
        let code = if e.chain().any(|cause| cause.downcast_ref::<tcrif::errors::InvariantViolation>().is_some()) {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}
