#[tokio::main]
async fn main() {
    mon_panier_local::start_server().await;
}
