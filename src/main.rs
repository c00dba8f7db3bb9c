#[tokio::main]
async fn main() -> anyhow::Result<()> {
	car_marketplace::start_server().await
}
