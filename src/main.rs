//! `icvsb` binary entry point: starts the conditional-request HTTP server.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    icvsb_server::run().await
}
