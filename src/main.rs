use query_cluster::management_server_start;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env_file = args
        .windows(2)
        .find(|w| w[0] == "--env-file")
        .map(|w| w[1].clone());
    management_server_start(env_file.as_deref()).await
}
