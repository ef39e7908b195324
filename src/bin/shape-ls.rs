use anyhow::Result;
use shape_language_server::lsp::server::serve;

#[tokio::main]
async fn main() -> Result<()> {
    serve().await
}
