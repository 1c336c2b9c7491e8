#[tokio::main]
async fn main() {
    packlist::start_server().await;
}
