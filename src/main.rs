#[tokio::main]
async fn main() -> anyhow::Result<()> {
    spineband_lib::run().await
}
