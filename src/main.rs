#[tokio::main]
async fn main() -> anyhow::Result<()> {
    microblog::start().await
}
