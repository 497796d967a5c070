#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ralendar_oauth::app::run().await
}
