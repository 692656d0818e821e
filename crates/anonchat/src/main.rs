use std::sync::Arc;

use anonchat_core::{app::ChatApp, config::Config};
use anonchat_gateway::HttpGateway;

mod repl;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    anonchat_core::logging::init("anonchat")?;

    let cfg = Config::load()?;
    let gateway = Arc::new(HttpGateway::from_config(&cfg));
    let app = Arc::new(ChatApp::new(&cfg, gateway));

    repl::run(app).await
}
