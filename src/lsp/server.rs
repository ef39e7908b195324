use std::thread;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{stdin, stdout};
use tower_lsp::{LspService, Server};

use crate::lsp::backend::Backend;
use crate::Config;

/// Environment variable that makes the server exit shortly after start
pub const TEST_EXIT_ENV: &str = "SHAPE_LS_TEST_EXIT";

/// Start the LSP server on stdin/stdout
pub async fn serve() -> Result<()> {
    let config = Config::from_args_and_env()?;
    config.init_logging();

    log::info!(
        "Starting shape-ls (default shape: {})",
        config.get_effective_shape().as_deref().unwrap_or("none")
    );
    for dir in &config.shape_dirs {
        log::debug!("Shape directory {:?}: {}", dir.priority, dir.path.display());
    }

    // Under the integration test, exit after a short delay so the test can read stdout to EOF
    if std::env::var(TEST_EXIT_ENV).as_deref() == Ok("1") {
        thread::spawn(|| {
            thread::sleep(Duration::from_secs(1));
            std::process::exit(0);
        });
    }

    let (service, socket) = LspService::build(|client| Backend::new(client, &config)).finish();

    Server::new(stdin(), stdout(), socket).serve(service).await;

    Ok(())
}
